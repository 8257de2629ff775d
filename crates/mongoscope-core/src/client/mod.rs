//! Cluster client abstraction.
//!
//! The engine consumes the cluster through the [`ClusterClient`]
//! capability trait rather than a concrete driver. Responses are
//! opaque structured documents the engine destructures defensively —
//! missing keys default, they never error.
//!
//! Implementations:
//! - [`mongo::MongoClusterClient`] — real MongoDB deployments via the
//!   official async driver
//! - [`mock::MockClusterClient`] — in-memory scenarios for tests

pub mod mock;
pub mod mongo;

use async_trait::async_trait;
use mongodb::bson::Document;

/// Error type for cluster client operations.
///
/// The three kinds map to distinct recovery strategies: `Connection`
/// is fatal to a collection run, `Command` is recovered per entity,
/// and `Unsupported` is treated as an empty result (logged at debug
/// severity only).
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Cluster unreachable, authentication failure or timeout.
    Connection(String),
    /// A command failed against a reachable cluster.
    Command(String),
    /// The server does not support the requested capability
    /// (e.g. `$indexStats` on older versions).
    Unsupported(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connection(msg) => write!(f, "connection error: {}", msg),
            ClientError::Command(msg) => write!(f, "command error: {}", msg),
            ClientError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

/// Raw server metadata: the three admin command responses the snapshot
/// header is built from. Fields are kept as opaque documents; the
/// model layer destructures them.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// `buildInfo` response.
    pub build_info: Document,
    /// `hostInfo` response (may be empty when unauthorized).
    pub host_info: Document,
    /// `serverStatus` response.
    pub server_status: Document,
}

/// Cluster deployment shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    Standalone,
    Replica,
    Sharded,
}

/// Topology details for the deployment shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClusterTopology {
    pub cluster_type: ClusterType,
    /// `replSetGetStatus` response for replica sets.
    pub replica_set_status: Option<Document>,
    /// Shard list from `listShards` for sharded clusters.
    pub shards: Vec<Document>,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self {
            cluster_type: ClusterType::Standalone,
            replica_set_status: None,
            shards: Vec::new(),
        }
    }
}

/// Read-only capabilities the engine needs from a cluster.
///
/// Per-call failures are returned, never panicked; the collector
/// decides which ones are fatal (only connectivity) and which are
/// recovered per entity.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Connectivity probe. The collector calls this first; an error
    /// here aborts the whole run.
    async fn ping(&self) -> Result<(), ClientError>;

    /// Build/version, host hardware facts and live server counters.
    async fn server_info(&self) -> Result<ServerInfo, ClientError>;

    /// Deployment shape plus replica-set status or shard list.
    async fn topology(&self) -> Result<ClusterTopology, ClientError>;

    /// All database names visible to the connection.
    async fn list_databases(&self) -> Result<Vec<String>, ClientError>;

    /// `dbStats` response for one database.
    async fn database_stats(&self, db: &str) -> Result<Document, ClientError>;

    /// Collection names within a database (views included; callers
    /// filter them via [`ClusterClient::is_view`]).
    async fn list_collections(&self, db: &str) -> Result<Vec<String>, ClientError>;

    /// Whether the named collection is actually a view.
    async fn is_view(&self, db: &str, coll: &str) -> Result<bool, ClientError>;

    /// `collStats` response for one collection.
    async fn collection_stats(&self, db: &str, coll: &str) -> Result<Document, ClientError>;

    /// Raw index definition documents for one collection.
    async fn list_indexes(&self, db: &str, coll: &str) -> Result<Vec<Document>, ClientError>;

    /// Per-index usage counters (`$indexStats`). Servers that do not
    /// support the aggregation stage return
    /// [`ClientError::Unsupported`]; callers treat that as "all zero".
    async fn index_usage(&self, db: &str, coll: &str) -> Result<Vec<Document>, ClientError>;

    /// Up to `limit` documents in a stable most-recently-inserted
    /// order. Determinism across repeated runs on an unchanged
    /// collection is part of the contract — no random sampling.
    async fn sample_documents(
        &self,
        db: &str,
        coll: &str,
        limit: usize,
    ) -> Result<Vec<Document>, ClientError>;
}
