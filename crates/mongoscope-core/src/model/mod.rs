//! Snapshot data models.
//!
//! One struct per administrative data source, each with a `from_raw`
//! constructor that destructures the command response defensively:
//! a missing or mistyped key yields the field's default, never an
//! error. The root aggregate is [`ClusterSnapshot`], owned by the
//! collection run that produced it and immutable after return.

use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use serde::Serialize;

use crate::analysis::health::ClusterHealth;
use crate::analysis::indexes::DetailedIndex;
use crate::analysis::structure::StructureAnalysis;
use crate::client::{ClusterTopology, ClusterType};
use crate::util;

/// Build information from `buildInfo`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub git_version: String,
    pub modules: Vec<String>,
}

impl BuildInfo {
    pub fn from_raw(raw: &Document) -> Self {
        Self {
            version: util::get_str(raw, "version"),
            git_version: util::get_str(raw, "gitVersion"),
            modules: util::get_str_array(raw, "modules"),
        }
    }
}

/// Host hardware facts from `hostInfo`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os_name: String,
    pub os_type: String,
    pub cpu_arch: String,
    pub num_cores: i64,
    pub mem_size_mb: i64,
    pub mem_limit_mb: i64,
}

impl HostInfo {
    pub fn from_raw(raw: &Document) -> Self {
        let os = util::get_doc(raw, "os");
        let system = util::get_doc(raw, "system");
        let hostname = match util::get_str(&system, "hostname") {
            h if h.is_empty() => util::get_str(raw, "hostname"),
            h => h,
        };
        Self {
            hostname,
            os_name: util::get_str(&os, "name"),
            os_type: util::get_str(&os, "type"),
            cpu_arch: util::get_str(&system, "cpuArch"),
            num_cores: util::get_i64(&system, "numCores"),
            mem_size_mb: util::get_i64(&system, "memSizeMB"),
            mem_limit_mb: util::get_i64(&system, "memLimitMB"),
        }
    }
}

/// Live server counters from `serverStatus`.
///
/// `opcounters_raw` keeps the counter group as reported so downstream
/// analysis can flatten nested sub-counters without re-fetching.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStatus {
    pub host: String,
    pub version: String,
    pub process: String,
    pub uptime: i64,

    pub connections_current: i64,
    pub connections_available: i64,
    pub connections_total_created: i64,
    pub connections_active: i64,

    /// Resident memory in MB, as reported.
    pub mem_resident: i64,
    /// Virtual memory in MB, as reported.
    pub mem_virtual: i64,

    pub opcounters_command: i64,
    pub opcounters_insert: i64,
    pub opcounters_query: i64,
    pub opcounters_update: i64,
    pub opcounters_delete: i64,
    pub opcounters_getmore: i64,
    pub opcounters_raw: Document,

    pub repl_set_name: String,
    pub repl_is_master: bool,
    pub repl_secondary: bool,
    pub repl_hosts: Vec<String>,

    pub sharding_configsvr: String,
    pub sharding_max_chunk_size: i64,

    pub storage_engine: String,
}

impl ServerStatus {
    pub fn from_raw(raw: &Document) -> Self {
        let conn = util::get_doc(raw, "connections");
        let mem = util::get_doc(raw, "mem");
        let ops = util::get_doc(raw, "opcounters");
        let repl = util::get_doc(raw, "repl");
        let sharding = util::get_doc(raw, "sharding");
        let storage = util::get_doc(raw, "storageEngine");
        Self {
            host: util::get_str(raw, "host"),
            version: util::get_str(raw, "version"),
            process: util::get_str(raw, "process"),
            uptime: util::get_i64(raw, "uptime"),
            connections_current: util::get_i64(&conn, "current"),
            connections_available: util::get_i64(&conn, "available"),
            connections_total_created: util::get_i64(&conn, "totalCreated"),
            connections_active: util::get_i64(&conn, "active"),
            mem_resident: util::get_i64(&mem, "resident"),
            mem_virtual: util::get_i64(&mem, "virtual"),
            opcounters_command: util::get_i64(&ops, "command"),
            opcounters_insert: util::get_i64(&ops, "insert"),
            opcounters_query: util::get_i64(&ops, "query"),
            opcounters_update: util::get_i64(&ops, "update"),
            opcounters_delete: util::get_i64(&ops, "delete"),
            opcounters_getmore: util::get_i64(&ops, "getmore"),
            opcounters_raw: ops,
            repl_set_name: util::get_str(&repl, "setName"),
            repl_is_master: util::get_bool(&repl, "isMaster"),
            repl_secondary: util::get_bool(&repl, "secondary"),
            repl_hosts: util::get_str_array(&repl, "hosts"),
            sharding_configsvr: util::get_str(&sharding, "configsvrConnectionString"),
            sharding_max_chunk_size: util::get_i64(&sharding, "maxChunkSizeInBytes"),
            storage_engine: util::get_str(&storage, "name"),
        }
    }

    /// Sum of the six operation counters.
    pub fn total_operations(&self) -> i64 {
        self.opcounters_command
            + self.opcounters_insert
            + self.opcounters_query
            + self.opcounters_update
            + self.opcounters_delete
            + self.opcounters_getmore
    }
}

/// Statistics for one database, from `dbStats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseStats {
    pub name: String,
    pub size_on_disk: i64,
    /// True iff objects, collection count and data size are all zero.
    pub empty: bool,
    pub data_size: i64,
    pub storage_size: i64,
    pub index_size: i64,
    pub objects: i64,
    pub collections: i64,
    pub indexes: i64,
    pub avg_obj_size: f64,
}

impl DatabaseStats {
    pub fn from_raw(name: &str, raw: &Document) -> Self {
        let objects = util::get_i64(raw, "objects");
        let collections = util::get_i64(raw, "collections");
        let data_size = util::get_i64(raw, "dataSize");
        let index_size = util::get_i64(raw, "indexSize");
        Self {
            name: name.to_string(),
            size_on_disk: data_size + index_size,
            // Any positive signal overrides emptiness.
            empty: objects == 0 && collections == 0 && data_size == 0,
            data_size,
            storage_size: util::get_i64(raw, "storageSize"),
            index_size,
            objects,
            collections,
            indexes: util::get_i64(raw, "indexes"),
            avg_obj_size: util::get_f64(raw, "avgObjSize"),
        }
    }
}

/// Statistics for one collection, from `collStats` plus its raw index
/// list and a small document sample.
///
/// Produced by exactly one collection task and never mutated
/// concurrently; the enhancement fields (`detailed_indexes`,
/// `structure_analysis`) are filled by a later sequential pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionStats {
    pub name: String,
    /// `db.collection`.
    pub namespace: String,
    pub count: i64,
    pub size: i64,
    pub storage_size: i64,
    pub total_index_size: i64,
    pub avg_obj_size: f64,
    pub capped: bool,
    pub sharded: bool,
    pub nindexes: i64,
    pub indexes: Vec<Document>,
    pub sample_docs: Vec<Document>,

    pub detailed_indexes: Vec<DetailedIndex>,
    pub structure_analysis: Option<StructureAnalysis>,
}

impl CollectionStats {
    pub fn from_raw(db: &str, name: &str, raw: &Document) -> Self {
        Self {
            name: name.to_string(),
            namespace: format!("{}.{}", db, name),
            count: util::get_i64(raw, "count"),
            size: util::get_i64(raw, "size"),
            storage_size: util::get_i64(raw, "storageSize"),
            total_index_size: util::get_i64(raw, "totalIndexSize"),
            avg_obj_size: util::get_f64(raw, "avgObjSize"),
            capped: util::get_bool(raw, "capped"),
            sharded: util::get_bool(raw, "sharded"),
            nindexes: util::get_i64(raw, "nindexes"),
            indexes: Vec::new(),
            sample_docs: Vec::new(),
            detailed_indexes: Vec::new(),
            structure_analysis: None,
        }
    }
}

/// Derived performance figures over the whole snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceMetrics {
    /// Six-counter operation total divided by process uptime.
    pub ops_per_second: f64,
    pub total_memory_usage_mb: i64,
    pub total_storage_size_gb: f64,
    pub current_connections: i64,
    pub available_connections: i64,
    pub connection_pool_utilization: f64,
}

/// Root aggregate of one collection run.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub cluster_type: ClusterType,
    pub host: String,
    pub version: String,
    pub collected_at: DateTime<Utc>,

    pub build_info: BuildInfo,
    pub host_info: HostInfo,
    pub server_status: ServerStatus,
    pub topology: ClusterTopology,

    pub databases: Vec<DatabaseStats>,
    pub collections: Vec<CollectionStats>,

    pub performance: PerformanceMetrics,
    pub health: Option<ClusterHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn database_empty_requires_all_three_zero_signals() {
        let empty = DatabaseStats::from_raw(
            "app",
            &doc! { "objects": 0, "collections": 0, "dataSize": 0 },
        );
        assert!(empty.empty);

        let with_objects = DatabaseStats::from_raw(
            "app",
            &doc! { "objects": 1, "collections": 0, "dataSize": 0 },
        );
        assert!(!with_objects.empty);

        let with_collections = DatabaseStats::from_raw(
            "app",
            &doc! { "objects": 0, "collections": 1, "dataSize": 0 },
        );
        assert!(!with_collections.empty);

        let with_data = DatabaseStats::from_raw(
            "app",
            &doc! { "objects": 0, "collections": 0, "dataSize": 42 },
        );
        assert!(!with_data.empty);
    }

    #[test]
    fn database_stats_size_on_disk_is_data_plus_index() {
        let db = DatabaseStats::from_raw(
            "app",
            &doc! { "dataSize": 1000_i64, "indexSize": 200_i64, "storageSize": 1500_i64 },
        );
        assert_eq!(db.size_on_disk, 1200);
        assert_eq!(db.storage_size, 1500);
    }

    #[test]
    fn server_status_destructures_nested_groups() {
        let raw = doc! {
            "host": "db1:27017",
            "uptime": 3600_i64,
            "connections": { "current": 10, "available": 90 },
            "mem": { "resident": 512, "virtual": 2048 },
            "opcounters": {
                "command": 100_i64, "insert": 50_i64, "query": 25_i64,
                "update": 10_i64, "delete": 5_i64, "getmore": 10_i64,
            },
            "repl": { "setName": "rs0", "isMaster": true, "hosts": ["a:27017", "b:27017"] },
            "storageEngine": { "name": "wiredTiger" },
        };
        let status = ServerStatus::from_raw(&raw);
        assert_eq!(status.connections_current, 10);
        assert_eq!(status.mem_resident, 512);
        assert_eq!(status.total_operations(), 200);
        assert_eq!(status.repl_set_name, "rs0");
        assert_eq!(status.repl_hosts.len(), 2);
        assert_eq!(status.storage_engine, "wiredTiger");
    }

    #[test]
    fn missing_keys_default_instead_of_erroring() {
        let status = ServerStatus::from_raw(&doc! {});
        assert_eq!(status.uptime, 0);
        assert_eq!(status.total_operations(), 0);
        assert!(status.repl_hosts.is_empty());

        let coll = CollectionStats::from_raw("app", "orders", &doc! {});
        assert_eq!(coll.namespace, "app.orders");
        assert_eq!(coll.count, 0);
        assert!(!coll.capped);
    }

    #[test]
    fn host_info_prefers_system_hostname() {
        let raw = doc! {
            "system": { "hostname": "node-1", "numCores": 8, "memSizeMB": 16384 },
            "os": { "name": "Ubuntu", "type": "Linux" },
        };
        let host = HostInfo::from_raw(&raw);
        assert_eq!(host.hostname, "node-1");
        assert_eq!(host.num_cores, 8);
        assert_eq!(host.os_name, "Ubuntu");
    }
}
