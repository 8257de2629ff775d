//! Snapshot collection orchestrator.
//!
//! Drives a [`ClusterClient`] through the full collection sequence:
//! connectivity probe, server metadata, topology, then a bounded
//! concurrent fan-out over databases and collections, a sequential
//! enhancement pass (index and structure analysis) and a final health
//! evaluation. A run fails only when the cluster is unreachable or
//! the core server counters cannot be fetched; every per-database and
//! per-collection failure is logged and skipped.

use std::collections::BTreeMap;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::analysis::{health, indexes, structure};
use crate::client::{ClientError, ClusterClient, ClusterTopology};
use crate::model::{
    BuildInfo, ClusterSnapshot, CollectionStats, DatabaseStats, HostInfo, PerformanceMetrics,
    ServerStatus,
};

// ====== tuning ======

/// Databases processed concurrently.
const DATABASE_CONCURRENCY: usize = 5;
/// Collections processed concurrently within one database.
const COLLECTION_CONCURRENCY: usize = 10;
/// Documents kept on each collection for display.
const SAMPLE_DOC_COUNT: usize = 3;
/// Documents fed to structure analysis per collection.
const STRUCTURE_SAMPLE_SIZE: usize = 50;

/// Name prefixes of databases that hold server internals rather than
/// user data.
const SYSTEM_DATABASE_PREFIXES: &[&str] = &["admin", "local", "config"];

// ====== errors ======

/// Fatal collection-run failures. Everything else is recovered per
/// entity inside the run.
#[derive(Debug)]
pub enum CollectError {
    /// The connectivity probe failed; nothing was collected.
    Unreachable(ClientError),
    /// A required cluster-wide fetch failed.
    Client(ClientError),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Unreachable(e) => write!(f, "cluster unreachable: {}", e),
            CollectError::Client(e) => write!(f, "collection failed: {}", e),
        }
    }
}

impl std::error::Error for CollectError {}

// ====== options ======

/// Run configuration.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// When non-empty, exactly these databases are collected, system
    /// databases included when named.
    pub include_databases: Vec<String>,
    /// Skip the enhancement pass and health evaluation.
    pub fast_mode: bool,
}

// ====== collector ======

/// Executes collection runs against one cluster.
pub struct StatsCollector<C: ClusterClient> {
    client: C,
    options: CollectOptions,
}

impl<C: ClusterClient> StatsCollector<C> {
    pub fn new(client: C, options: CollectOptions) -> Self {
        Self { client, options }
    }

    /// Runs one full collection and returns the snapshot.
    pub async fn collect(&self) -> Result<ClusterSnapshot, CollectError> {
        let started = Instant::now();

        self.client.ping().await.map_err(CollectError::Unreachable)?;

        let info = self.client.server_info().await.map_err(CollectError::Client)?;
        let build_info = BuildInfo::from_raw(&info.build_info);
        let host_info = HostInfo::from_raw(&info.host_info);
        let server_status = ServerStatus::from_raw(&info.server_status);

        let topology = match self.client.topology().await {
            Ok(topology) => topology,
            Err(e) => {
                warn!(error = %e, "topology detection failed, assuming standalone");
                ClusterTopology::default()
            }
        };

        let names = self.client.list_databases().await.map_err(CollectError::Client)?;
        // An explicit include list wins outright, system databases
        // included; the prefix exclusion applies only without one.
        let names: Vec<String> = if self.options.include_databases.is_empty() {
            names
                .into_iter()
                .filter(|name| {
                    !SYSTEM_DATABASE_PREFIXES
                        .iter()
                        .any(|prefix| name.starts_with(prefix))
                })
                .collect()
        } else {
            names
                .into_iter()
                .filter(|name| self.options.include_databases.contains(name))
                .collect()
        };

        let mut results: Vec<(DatabaseStats, Vec<CollectionStats>)> =
            stream::iter(names.iter().map(|db| self.collect_database(db)))
                .buffer_unordered(DATABASE_CONCURRENCY)
                .filter_map(|result| async move { result })
                .collect()
                .await;

        // Concurrency makes arrival order nondeterministic; sort for
        // stable snapshots.
        results.sort_by(|a, b| a.0.name.cmp(&b.0.name));
        let mut databases = Vec::with_capacity(results.len());
        let mut collections = Vec::new();
        for (db, colls) in results {
            databases.push(db);
            collections.extend(colls);
        }
        collections.sort_by(|a, b| a.namespace.cmp(&b.namespace));

        let performance = performance_metrics(&server_status, &databases);

        let mut health = None;
        if !self.options.fast_mode {
            self.enhance_collections(&mut collections).await;
            let fresh = self
                .client
                .server_info()
                .await
                .map(|info| ServerStatus::from_raw(&info.server_status));
            health = Some(health::evaluate(fresh, &collections));
        }

        let snapshot = ClusterSnapshot {
            cluster_type: topology.cluster_type,
            host: server_status.host.clone(),
            version: if server_status.version.is_empty() {
                build_info.version.clone()
            } else {
                server_status.version.clone()
            },
            collected_at: chrono::Utc::now(),
            build_info,
            host_info,
            server_status,
            topology,
            databases,
            collections,
            performance,
            health,
        };

        info!(
            databases = snapshot.databases.len(),
            collections = snapshot.collections.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collection run finished"
        );
        Ok(snapshot)
    }

    /// Collects one database and its collections. Returns `None` when
    /// the database stats fetch fails; the run continues without it.
    async fn collect_database(&self, db: &str) -> Option<(DatabaseStats, Vec<CollectionStats>)> {
        let stats = match self.client.database_stats(db).await {
            Ok(raw) => DatabaseStats::from_raw(db, &raw),
            Err(e) => {
                warn!(db, error = %e, "skipping database");
                return None;
            }
        };

        let names = match self.client.list_collections(db).await {
            Ok(names) => names,
            Err(e) => {
                warn!(db, error = %e, "listing collections failed");
                Vec::new()
            }
        };

        let collections: Vec<CollectionStats> =
            stream::iter(names.iter().map(|coll| self.collect_collection(db, coll)))
                .buffer_unordered(COLLECTION_CONCURRENCY)
                .filter_map(|result| async move { result })
                .collect()
                .await;

        Some((stats, collections))
    }

    /// Collects one collection. System collections, views and
    /// failures yield `None`.
    async fn collect_collection(&self, db: &str, coll: &str) -> Option<CollectionStats> {
        if coll.starts_with("system.") {
            debug!(db, coll, "skipping system collection");
            return None;
        }

        match self.client.is_view(db, coll).await {
            Ok(true) => {
                debug!(db, coll, "skipping view");
                return None;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(db, coll, error = %e, "view check failed, skipping");
                return None;
            }
        }

        let mut stats = match self.client.collection_stats(db, coll).await {
            Ok(raw) => CollectionStats::from_raw(db, coll, &raw),
            Err(e) => {
                warn!(db, coll, error = %e, "skipping collection");
                return None;
            }
        };

        match self.client.list_indexes(db, coll).await {
            Ok(indexes) => stats.indexes = indexes,
            Err(e) => warn!(db, coll, error = %e, "listing indexes failed"),
        }

        match self.client.sample_documents(db, coll, SAMPLE_DOC_COUNT).await {
            Ok(docs) => stats.sample_docs = docs,
            Err(e) => warn!(db, coll, error = %e, "document sampling failed"),
        }

        Some(stats)
    }

    /// Sequential enhancement pass: index analysis against usage
    /// counters, then structure analysis over a larger sample, with
    /// fragmentation fed from the sizes already collected.
    async fn enhance_collections(&self, collections: &mut [CollectionStats]) {
        let size_cache: BTreeMap<String, structure::SizeStats> = collections
            .iter()
            .map(|coll| {
                (
                    coll.namespace.clone(),
                    structure::SizeStats {
                        storage_size: coll.storage_size,
                        data_size: coll.size,
                    },
                )
            })
            .collect();

        for coll in collections.iter_mut() {
            let Some((db, name)) = coll.namespace.split_once('.') else {
                continue;
            };

            let usage = match self.client.index_usage(db, name).await {
                Ok(docs) => Some(docs),
                Err(ClientError::Unsupported(msg)) => {
                    debug!(namespace = %coll.namespace, msg, "index usage unavailable");
                    None
                }
                Err(e) => {
                    warn!(namespace = %coll.namespace, error = %e, "index usage fetch failed");
                    None
                }
            };
            coll.detailed_indexes = indexes::analyze(&coll.indexes, usage.as_deref(), None);

            let sample = match self
                .client
                .sample_documents(db, name, STRUCTURE_SAMPLE_SIZE)
                .await
            {
                Ok(docs) => docs,
                Err(e) => {
                    warn!(namespace = %coll.namespace, error = %e, "structure sampling failed");
                    coll.sample_docs.clone()
                }
            };
            coll.structure_analysis = Some(structure::analyze(
                &sample,
                &coll.namespace,
                size_cache.get(&coll.namespace),
            ));
        }
    }
}

/// Derived performance figures over the finished snapshot inputs.
fn performance_metrics(status: &ServerStatus, databases: &[DatabaseStats]) -> PerformanceMetrics {
    let ops_per_second = if status.uptime > 0 {
        status.total_operations() as f64 / status.uptime as f64
    } else {
        0.0
    };

    // Some deployments report zero resident memory; fall back to the
    // virtual figure rather than reporting nothing.
    let total_memory_usage_mb = if status.mem_resident > 0 {
        status.mem_resident
    } else {
        status.mem_virtual
    };

    let total_storage: i64 = databases.iter().map(|db| db.storage_size).sum();
    let connection_limit = status.connections_current + status.connections_available;

    PerformanceMetrics {
        ops_per_second,
        total_memory_usage_mb,
        total_storage_size_gb: total_storage as f64 / (1024.0 * 1024.0 * 1024.0),
        current_connections: status.connections_current,
        available_connections: status.connections_available,
        connection_pool_utilization: if connection_limit > 0 {
            status.connections_current as f64 / connection_limit as f64 * 100.0
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::health::HealthStatus;
    use crate::client::mock::MockClusterClient;

    fn collector(client: MockClusterClient) -> StatsCollector<MockClusterClient> {
        StatsCollector::new(client, CollectOptions::default())
    }

    #[tokio::test]
    async fn typical_cluster_produces_a_full_snapshot() {
        let snapshot = collector(MockClusterClient::typical_cluster())
            .collect()
            .await
            .unwrap();

        // System databases are filtered out.
        assert_eq!(snapshot.databases.len(), 1);
        assert_eq!(snapshot.databases[0].name, "app");

        // The view is skipped; real collections arrive sorted.
        let namespaces: Vec<&str> = snapshot
            .collections
            .iter()
            .map(|c| c.namespace.as_str())
            .collect();
        assert_eq!(namespaces, vec!["app.orders", "app.users"]);

        let orders = &snapshot.collections[0];
        assert_eq!(orders.count, 120000);
        assert_eq!(orders.indexes.len(), 3);
        assert_eq!(orders.sample_docs.len(), 3);
        assert_eq!(orders.detailed_indexes.len(), 3);
        assert!(orders.structure_analysis.is_some());

        // status_1 is both unused and a prefix of status_1_created_1.
        let status_idx = orders
            .detailed_indexes
            .iter()
            .find(|i| i.name == "status_1")
            .unwrap();
        assert!(status_idx.issues.iter().any(|i| i.contains("Redundant prefix")));
        assert!(status_idx.issues.iter().any(|i| i.contains("Unused index")));

        let health = snapshot.health.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);

        assert!(snapshot.performance.ops_per_second > 0.0);
        assert_eq!(snapshot.performance.current_connections, 24);
    }

    #[tokio::test]
    async fn system_collections_are_skipped() {
        let snapshot = collector(MockClusterClient::typical_cluster())
            .collect()
            .await
            .unwrap();
        // typical_cluster seeds app.system.profile; it must not show
        // up in the snapshot or its enhancement pass.
        assert!(snapshot
            .collections
            .iter()
            .all(|c| !c.name.starts_with("system.")));
        assert_eq!(snapshot.collections.len(), 2);
    }

    #[tokio::test]
    async fn explicitly_included_system_database_is_collected() {
        let collector = StatsCollector::new(
            MockClusterClient::typical_cluster(),
            CollectOptions {
                include_databases: vec!["admin".to_string()],
                ..Default::default()
            },
        );
        let snapshot = collector.collect().await.unwrap();
        assert_eq!(snapshot.databases.len(), 1);
        assert_eq!(snapshot.databases[0].name, "admin");
    }

    #[tokio::test]
    async fn system_database_exclusion_matches_by_prefix() {
        let mut client = MockClusterClient::typical_cluster();
        client.add_database("config_backup", mongodb::bson::doc! { "objects": 1_i64 });

        let snapshot = collector(client).collect().await.unwrap();
        let names: Vec<&str> = snapshot.databases.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["app"]);
    }

    #[tokio::test]
    async fn failing_collection_does_not_kill_siblings() {
        let client = MockClusterClient::typical_cluster().with_failing("app.orders");
        let snapshot = collector(client).collect().await.unwrap();

        let namespaces: Vec<&str> = snapshot
            .collections
            .iter()
            .map(|c| c.namespace.as_str())
            .collect();
        assert_eq!(namespaces, vec!["app.users"]);
    }

    #[tokio::test]
    async fn failing_database_does_not_kill_the_run() {
        let client = MockClusterClient::typical_cluster().with_failing("app");
        let snapshot = collector(client).collect().await.unwrap();
        assert!(snapshot.databases.is_empty());
        assert!(snapshot.collections.is_empty());
    }

    #[tokio::test]
    async fn unreachable_cluster_aborts_before_collecting() {
        let result = collector(MockClusterClient::typical_cluster().unreachable())
            .collect()
            .await;
        assert!(matches!(result, Err(CollectError::Unreachable(_))));
    }

    #[tokio::test]
    async fn fast_mode_skips_enhancement_and_health() {
        let collector = StatsCollector::new(
            MockClusterClient::typical_cluster(),
            CollectOptions {
                fast_mode: true,
                ..Default::default()
            },
        );
        let snapshot = collector.collect().await.unwrap();
        assert!(snapshot.health.is_none());
        for coll in &snapshot.collections {
            assert!(coll.detailed_indexes.is_empty());
            assert!(coll.structure_analysis.is_none());
        }
    }

    #[tokio::test]
    async fn database_filter_limits_the_run() {
        let mut client = MockClusterClient::typical_cluster();
        client.add_database("other", mongodb::bson::doc! { "objects": 1_i64 });

        let collector = StatsCollector::new(
            client,
            CollectOptions {
                include_databases: vec!["other".to_string()],
                ..Default::default()
            },
        );
        let snapshot = collector.collect().await.unwrap();
        assert_eq!(snapshot.databases.len(), 1);
        assert_eq!(snapshot.databases[0].name, "other");
    }

    #[tokio::test]
    async fn missing_index_usage_defaults_counters_to_zero() {
        let client = MockClusterClient::typical_cluster().without_index_usage();
        let snapshot = collector(client).collect().await.unwrap();

        let users = snapshot
            .collections
            .iter()
            .find(|c| c.namespace == "app.users")
            .unwrap();
        let email_idx = users
            .detailed_indexes
            .iter()
            .find(|i| i.name == "email_1")
            .unwrap();
        assert_eq!(email_idx.total_ops, 0);
        assert!(email_idx.issues.iter().any(|i| i.contains("Unused index")));
    }
}
