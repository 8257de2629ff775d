//! In-memory [`ClusterClient`] for tests.
//!
//! Scenarios are fixed documents behind the same trait the real
//! driver implements, with switches for the failure modes the
//! collector has to survive: unreachable cluster, per-namespace
//! command failures, servers without `$indexStats`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use mongodb::bson::{doc, Document};

use super::{ClientError, ClusterClient, ClusterTopology, ServerInfo};

/// One scripted collection.
#[derive(Debug, Clone, Default)]
pub struct MockCollection {
    pub stats: Document,
    pub indexes: Vec<Document>,
    pub index_usage: Vec<Document>,
    pub sample: Vec<Document>,
    pub view: bool,
}

#[derive(Debug, Clone, Default)]
struct MockDatabase {
    stats: Document,
    collections: BTreeMap<String, MockCollection>,
}

/// Scripted cluster. `typical_cluster()` is the baseline scenario;
/// the `with_*` builders layer failures on top.
#[derive(Debug, Clone)]
pub struct MockClusterClient {
    server_info: ServerInfo,
    topology: ClusterTopology,
    databases: BTreeMap<String, MockDatabase>,
    reachable: bool,
    index_usage_supported: bool,
    /// `db` or `db.coll` entries whose commands fail.
    failing: HashSet<String>,
}

impl MockClusterClient {
    pub fn empty() -> Self {
        Self {
            server_info: ServerInfo::default(),
            topology: ClusterTopology::default(),
            databases: BTreeMap::new(),
            reachable: true,
            index_usage_supported: true,
            failing: HashSet::new(),
        }
    }

    /// A healthy standalone with system databases, one application
    /// database holding two collections, a view and a profiler
    /// collection, and realistic index definitions.
    pub fn typical_cluster() -> Self {
        let mut mock = Self::empty();

        mock.server_info = ServerInfo {
            build_info: doc! { "version": "7.0.5", "gitVersion": "abc123", "modules": [] },
            host_info: doc! {
                "system": { "hostname": "db-1", "cpuArch": "x86_64", "numCores": 8, "memSizeMB": 16384 },
                "os": { "name": "Ubuntu", "type": "Linux" },
            },
            server_status: doc! {
                "host": "db-1:27017",
                "version": "7.0.5",
                "process": "mongod",
                "uptime": 86400_i64,
                "connections": { "current": 24, "available": 976, "totalCreated": 310, "active": 6 },
                "mem": { "resident": 512, "virtual": 2048 },
                "opcounters": {
                    "command": 60000_i64, "insert": 12000_i64, "query": 8000_i64,
                    "update": 4000_i64, "delete": 200_i64, "getmore": 2200_i64,
                },
                "storageEngine": { "name": "wiredTiger" },
            },
        };

        mock.add_database("admin", doc! { "db": "admin", "objects": 5_i64 });
        mock.add_database("local", doc! { "db": "local", "objects": 10_i64 });
        mock.add_database(
            "app",
            doc! {
                "db": "app",
                "collections": 2_i64,
                "objects": 150000_i64,
                "dataSize": 90000000_i64,
                "storageSize": 100000000_i64,
                "indexSize": 8000000_i64,
                "indexes": 5_i64,
                "avgObjSize": 600.0,
            },
        );

        mock.add_collection(
            "app",
            "orders",
            MockCollection {
                stats: doc! {
                    "count": 120000_i64,
                    "size": 72000000_i64,
                    "storageSize": 80000000_i64,
                    "totalIndexSize": 6000000_i64,
                    "avgObjSize": 600.0,
                    "nindexes": 3_i64,
                },
                indexes: vec![
                    doc! { "name": "_id_", "key": { "_id": 1 }, "v": 2 },
                    doc! { "name": "status_1", "key": { "status": 1 }, "v": 2 },
                    doc! { "name": "status_1_created_1", "key": { "status": 1, "created": 1 }, "v": 2 },
                ],
                index_usage: vec![
                    doc! { "name": "_id_", "accesses": { "ops": 90000_i64 } },
                    doc! { "name": "status_1", "accesses": { "ops": 0_i64 } },
                    doc! { "name": "status_1_created_1", "accesses": { "ops": 4200_i64 } },
                ],
                sample: vec![
                    doc! { "_id": 3, "status": "open", "created": 3, "items": [ { "sku": "a", "qty": 2 } ] },
                    doc! { "_id": 2, "status": "done", "created": 2, "items": [ { "sku": "b", "qty": 1 } ] },
                    doc! { "_id": 1, "status": "open", "created": 1, "items": [] },
                ],
                view: false,
            },
        );
        mock.add_collection(
            "app",
            "users",
            MockCollection {
                stats: doc! {
                    "count": 30000_i64,
                    "size": 18000000_i64,
                    "storageSize": 20000000_i64,
                    "totalIndexSize": 2000000_i64,
                    "avgObjSize": 600.0,
                    "nindexes": 2_i64,
                },
                indexes: vec![
                    doc! { "name": "_id_", "key": { "_id": 1 }, "v": 2 },
                    doc! { "name": "email_1", "key": { "email": 1 }, "unique": true, "v": 2 },
                ],
                index_usage: vec![
                    doc! { "name": "_id_", "accesses": { "ops": 20000_i64 } },
                    doc! { "name": "email_1", "accesses": { "ops": 15000_i64 } },
                ],
                sample: vec![
                    doc! { "_id": 2, "email": "b@example.com", "profile": { "name": "B" } },
                    doc! { "_id": 1, "email": "a@example.com", "profile": { "name": "A" } },
                ],
                view: false,
            },
        );
        mock.add_collection(
            "app",
            "active_users",
            MockCollection {
                view: true,
                ..Default::default()
            },
        );
        mock.add_collection(
            "app",
            "system.profile",
            MockCollection {
                stats: doc! { "count": 400_i64, "capped": true },
                ..Default::default()
            },
        );

        mock
    }

    pub fn add_database(&mut self, name: &str, stats: Document) {
        self.databases.insert(
            name.to_string(),
            MockDatabase {
                stats,
                collections: BTreeMap::new(),
            },
        );
    }

    pub fn add_collection(&mut self, db: &str, name: &str, coll: MockCollection) {
        self.databases
            .entry(db.to_string())
            .or_default()
            .collections
            .insert(name.to_string(), coll);
    }

    /// Makes `ping` fail, simulating an unreachable cluster.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Makes every command against `db` or `db.coll` fail.
    pub fn with_failing(mut self, target: &str) -> Self {
        self.failing.insert(target.to_string());
        self
    }

    /// Simulates a server without the `$indexStats` stage.
    pub fn without_index_usage(mut self) -> Self {
        self.index_usage_supported = false;
        self
    }

    fn check_failure(&self, db: &str, coll: Option<&str>) -> Result<(), ClientError> {
        if self.failing.contains(db) {
            return Err(ClientError::Command(format!("injected failure for {}", db)));
        }
        if let Some(coll) = coll {
            let namespace = format!("{}.{}", db, coll);
            if self.failing.contains(&namespace) {
                return Err(ClientError::Command(format!(
                    "injected failure for {}",
                    namespace
                )));
            }
        }
        Ok(())
    }

    fn database(&self, db: &str) -> Result<&MockDatabase, ClientError> {
        self.databases
            .get(db)
            .ok_or_else(|| ClientError::Command(format!("database {} not found", db)))
    }

    fn collection(&self, db: &str, coll: &str) -> Result<&MockCollection, ClientError> {
        self.database(db)?
            .collections
            .get(coll)
            .ok_or_else(|| ClientError::Command(format!("collection {}.{} not found", db, coll)))
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn ping(&self) -> Result<(), ClientError> {
        if self.reachable {
            Ok(())
        } else {
            Err(ClientError::Connection("no servers available".to_string()))
        }
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        Ok(self.server_info.clone())
    }

    async fn topology(&self) -> Result<ClusterTopology, ClientError> {
        Ok(self.topology.clone())
    }

    async fn list_databases(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.databases.keys().cloned().collect())
    }

    async fn database_stats(&self, db: &str) -> Result<Document, ClientError> {
        self.check_failure(db, None)?;
        Ok(self.database(db)?.stats.clone())
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>, ClientError> {
        self.check_failure(db, None)?;
        Ok(self.database(db)?.collections.keys().cloned().collect())
    }

    async fn is_view(&self, db: &str, coll: &str) -> Result<bool, ClientError> {
        Ok(self.collection(db, coll)?.view)
    }

    async fn collection_stats(&self, db: &str, coll: &str) -> Result<Document, ClientError> {
        self.check_failure(db, Some(coll))?;
        Ok(self.collection(db, coll)?.stats.clone())
    }

    async fn list_indexes(&self, db: &str, coll: &str) -> Result<Vec<Document>, ClientError> {
        self.check_failure(db, Some(coll))?;
        Ok(self.collection(db, coll)?.indexes.clone())
    }

    async fn index_usage(&self, db: &str, coll: &str) -> Result<Vec<Document>, ClientError> {
        if !self.index_usage_supported {
            return Err(ClientError::Unsupported(
                "Unrecognized pipeline stage name: '$indexStats'".to_string(),
            ));
        }
        self.check_failure(db, Some(coll))?;
        Ok(self.collection(db, coll)?.index_usage.clone())
    }

    async fn sample_documents(
        &self,
        db: &str,
        coll: &str,
        limit: usize,
    ) -> Result<Vec<Document>, ClientError> {
        self.check_failure(db, Some(coll))?;
        let sample = &self.collection(db, coll)?.sample;
        Ok(sample.iter().take(limit).cloned().collect())
    }
}
