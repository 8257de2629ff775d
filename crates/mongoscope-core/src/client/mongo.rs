//! MongoDB driver-backed cluster client.
//!
//! Issues administrative commands (`buildInfo`, `hostInfo`,
//! `serverStatus`, `dbStats`, `collStats`, `listCollections`,
//! `listIndexes`, `listShards`, `replSetGetStatus`) and drains
//! cursors for `$indexStats` and document sampling. Responses are
//! returned as opaque documents; the model layer destructures them.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use tracing::debug;

use super::{ClientError, ClusterClient, ClusterTopology, ClusterType, ServerInfo};
use crate::util;

/// Cluster client over the official async MongoDB driver.
///
/// The driver connects lazily; [`ClusterClient::ping`] performs the
/// first real round trip and is where connectivity failures surface.
pub struct MongoClusterClient {
    client: mongodb::Client,
}

impl MongoClusterClient {
    /// Creates a client from a connection string
    /// (`mongodb://` or `mongodb+srv://`).
    pub async fn connect(uri: &str) -> Result<Self, ClientError> {
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .map_err(|e| ClientError::Connection(friendly_message(&e)))?;
        Ok(Self { client })
    }

    async fn run_admin(&self, command: Document) -> Result<Document, ClientError> {
        self.client
            .database("admin")
            .run_command(command)
            .await
            .map_err(map_error)
    }

    async fn run_on(&self, db: &str, command: Document) -> Result<Document, ClientError> {
        self.client
            .database(db)
            .run_command(command)
            .await
            .map_err(map_error)
    }
}

#[async_trait]
impl ClusterClient for MongoClusterClient {
    async fn ping(&self) -> Result<(), ClientError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ClientError::Connection(friendly_message(&e)))?;
        Ok(())
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let server_status = self.run_admin(doc! { "serverStatus": 1 }).await?;

        // buildInfo and hostInfo are best-effort: shared-tier and
        // restricted deployments commonly deny hostInfo.
        let build_info = match self.run_admin(doc! { "buildInfo": 1 }).await {
            Ok(doc) => doc,
            Err(e) => {
                debug!(error = %e, "buildInfo unavailable");
                Document::new()
            }
        };
        let host_info = match self.run_admin(doc! { "hostInfo": 1 }).await {
            Ok(doc) => doc,
            Err(e) => {
                debug!(error = %e, "hostInfo unavailable");
                Document::new()
            }
        };

        Ok(ServerInfo {
            build_info,
            host_info,
            server_status,
        })
    }

    async fn topology(&self) -> Result<ClusterTopology, ClientError> {
        let status = self.run_admin(doc! { "serverStatus": 1 }).await?;

        let sharding = util::get_doc(&status, "sharding");
        if !util::get_str(&sharding, "configsvrConnectionString").is_empty() {
            let shards = match self.run_admin(doc! { "listShards": 1 }).await {
                Ok(resp) => util::get_array(&resp, "shards")
                    .iter()
                    .filter_map(|v| v.as_document().cloned())
                    .collect(),
                Err(e) => {
                    debug!(error = %e, "listShards unavailable");
                    Vec::new()
                }
            };
            return Ok(ClusterTopology {
                cluster_type: ClusterType::Sharded,
                replica_set_status: None,
                shards,
            });
        }

        let repl = util::get_doc(&status, "repl");
        if !util::get_str(&repl, "setName").is_empty() {
            let replica_set_status = match self.run_admin(doc! { "replSetGetStatus": 1 }).await {
                Ok(resp) => Some(resp),
                Err(e) => {
                    debug!(error = %e, "replSetGetStatus unavailable");
                    None
                }
            };
            return Ok(ClusterTopology {
                cluster_type: ClusterType::Replica,
                replica_set_status,
                shards: Vec::new(),
            });
        }

        Ok(ClusterTopology::default())
    }

    async fn list_databases(&self) -> Result<Vec<String>, ClientError> {
        self.client.list_database_names().await.map_err(map_error)
    }

    async fn database_stats(&self, db: &str) -> Result<Document, ClientError> {
        self.run_on(db, doc! { "dbStats": 1 }).await
    }

    async fn list_collections(&self, db: &str) -> Result<Vec<String>, ClientError> {
        self.client
            .database(db)
            .list_collection_names()
            .await
            .map_err(map_error)
    }

    async fn is_view(&self, db: &str, coll: &str) -> Result<bool, ClientError> {
        let resp = self
            .run_on(db, doc! { "listCollections": 1, "filter": { "name": coll } })
            .await?;
        let cursor = util::get_doc(&resp, "cursor");
        Ok(util::get_array(&cursor, "firstBatch")
            .iter()
            .filter_map(Bson::as_document)
            .any(|entry| util::get_str(entry, "type") == "view"))
    }

    async fn collection_stats(&self, db: &str, coll: &str) -> Result<Document, ClientError> {
        self.run_on(db, doc! { "collStats": coll }).await
    }

    async fn list_indexes(&self, db: &str, coll: &str) -> Result<Vec<Document>, ClientError> {
        let resp = self.run_on(db, doc! { "listIndexes": coll }).await?;
        let cursor = util::get_doc(&resp, "cursor");
        Ok(util::get_array(&cursor, "firstBatch")
            .iter()
            .filter_map(|v| v.as_document().cloned())
            .collect())
    }

    async fn index_usage(&self, db: &str, coll: &str) -> Result<Vec<Document>, ClientError> {
        let cursor = self
            .client
            .database(db)
            .collection::<Document>(coll)
            .aggregate(vec![doc! { "$indexStats": {} }])
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }

    async fn sample_documents(
        &self,
        db: &str,
        coll: &str,
        limit: usize,
    ) -> Result<Vec<Document>, ClientError> {
        // Most-recently-inserted ordering: stable across repeated runs
        // on an unchanged collection, unlike a `$sample` stage.
        let cursor = self
            .client
            .database(db)
            .collection::<Document>(coll)
            .find(doc! {})
            .sort(doc! { "_id": -1 })
            .limit(limit as i64)
            .await
            .map_err(map_error)?;
        cursor.try_collect().await.map_err(map_error)
    }
}

/// Maps a driver error onto the client error taxonomy.
fn map_error(e: mongodb::error::Error) -> ClientError {
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { message, .. } => ClientError::Connection(message.clone()),
        ErrorKind::Authentication { message, .. } => ClientError::Connection(message.clone()),
        ErrorKind::Io(io) => ClientError::Connection(io.to_string()),
        ErrorKind::Command(cmd) if is_unsupported(cmd.code, &cmd.code_name, &cmd.message) => {
            ClientError::Unsupported(cmd.message.clone())
        }
        _ => ClientError::Command(friendly_message(&e)),
    }
}

/// Whether a command error means the server lacks the capability
/// rather than the call having failed.
fn is_unsupported(code: i32, code_name: &str, message: &str) -> bool {
    // 59: CommandNotFound; 40324: unrecognized pipeline stage.
    code == 59
        || code == 40324
        || code_name == "CommandNotFound"
        || message.contains("Unrecognized pipeline stage")
}

/// Condenses driver error text for display, in the spirit of keeping
/// connection failures to one readable line.
fn friendly_message(e: &mongodb::error::Error) -> String {
    let msg = e.to_string();
    if msg.contains("Connection refused") {
        "connection refused".to_string()
    } else if msg.contains("authentication") || msg.contains("Authentication") {
        "authentication failed".to_string()
    } else {
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_detection_covers_known_codes() {
        assert!(is_unsupported(59, "CommandNotFound", "no such command"));
        assert!(is_unsupported(
            40324,
            "Location40324",
            "Unrecognized pipeline stage name: '$indexStats'"
        ));
        assert!(!is_unsupported(13, "Unauthorized", "not authorized"));
    }
}
