//! Cluster health evaluation.
//!
//! Turns live server counters and the per-collection analyses into a
//! single verdict, a flat list of human-readable issues and one paired
//! recommendation per issue. The evaluation itself never fails: a
//! failed counter fetch becomes the `error` verdict with the failure
//! as its only issue.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::ClientError;
use crate::model::{CollectionStats, ServerStatus};
use crate::util;

/// Resident/virtual memory ratio above which pressure is reported.
const MEMORY_PRESSURE_RATIO: f64 = 0.75;
/// Connection-limit fraction above which pressure is reported.
const CONNECTION_PRESSURE_RATIO: f64 = 0.75;
/// Deepest per-collection nesting tolerated without an issue.
const MAX_HEALTHY_DEPTH: usize = 6;
/// Largest per-collection array tolerated without an issue.
const MAX_HEALTHY_ARRAY_SIZE: usize = 1000;
/// Most indexes per collection tolerated without an issue.
const MAX_HEALTHY_INDEXES: i64 = 10;
/// Delete share of total operations above which churn is reported.
const DELETE_RATIO_THRESHOLD: f64 = 0.1;

/// Overall cluster verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Warning,
    Critical,
    /// The evaluation inputs themselves could not be fetched.
    Error,
}

/// Counters backing the verdict, kept for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthMetrics {
    pub memory_usage_mb: i64,
    pub current_connections: i64,
    /// Flattened sum of every numeric op-counter leaf.
    pub total_operations: i64,
}

/// Verdict, issues, paired recommendations and the counters they were
/// derived from. Derived fresh on every evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    /// One entry per issue, in issue order.
    pub recommendations: Vec<String>,
    pub metrics: HealthMetrics,
    pub checked_at: DateTime<Utc>,
}

/// Evaluates cluster health from a fresh `serverStatus` fetch and the
/// collected per-collection stats.
///
/// Zero issues is healthy, one or two is a warning, three or more is
/// critical. When the counter fetch failed the verdict is `error` and
/// the failure is reported as the sole issue.
pub fn evaluate(
    status: Result<ServerStatus, ClientError>,
    collections: &[CollectionStats],
) -> ClusterHealth {
    let status = match status {
        Ok(status) => status,
        Err(e) => {
            return ClusterHealth {
                status: HealthStatus::Error,
                issues: vec![format!("Health check failed: {}", e)],
                recommendations: Vec::new(),
                metrics: HealthMetrics::default(),
                checked_at: Utc::now(),
            };
        }
    };

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    let total_operations = util::sum_numeric_leaves(&status.opcounters_raw);
    let metrics = HealthMetrics {
        memory_usage_mb: status.mem_resident,
        current_connections: status.connections_current,
        total_operations,
    };

    // Memory pressure is judged on the resident share of virtual
    // memory, not of physical RAM.
    if status.mem_virtual > 0 {
        let ratio = status.mem_resident as f64 / status.mem_virtual as f64;
        if ratio > MEMORY_PRESSURE_RATIO {
            issues.push(format!(
                "High memory usage: {:.1}% of virtual memory resident",
                ratio * 100.0
            ));
            recommendations
                .push("Consider increasing available memory or optimizing queries".to_string());
        }
    }

    let connection_limit = status.connections_current + status.connections_available;
    if connection_limit > 0 {
        let ratio = status.connections_current as f64 / connection_limit as f64;
        if ratio > CONNECTION_PRESSURE_RATIO {
            issues.push(format!(
                "High connection usage: {:.1}% of connection limit in use",
                ratio * 100.0
            ));
            recommendations
                .push("Monitor connection pooling and consider increasing limits".to_string());
        }
    }

    for coll in collections {
        if let Some(structure) = &coll.structure_analysis {
            if structure.max_nesting_depth > MAX_HEALTHY_DEPTH {
                issues.push(format!(
                    "Collection {} has deep nesting (depth {})",
                    coll.namespace, structure.max_nesting_depth
                ));
                recommendations.push(format!(
                    "Consider flattening the document structure in {}",
                    coll.namespace
                ));
            }
            if structure.max_array_size > MAX_HEALTHY_ARRAY_SIZE {
                issues.push(format!(
                    "Collection {} has large arrays (max size {})",
                    coll.namespace, structure.max_array_size
                ));
                recommendations.push(format!(
                    "Consider splitting large arrays in {} into separate collections",
                    coll.namespace
                ));
            }
        }
        if coll.nindexes > MAX_HEALTHY_INDEXES {
            issues.push(format!(
                "Collection {} has {} indexes",
                coll.namespace, coll.nindexes
            ));
            recommendations.push(format!(
                "Review index usage in {} and drop unused indexes",
                coll.namespace
            ));
        }
    }

    // Total operations are the sum of every numeric leaf in the raw
    // counter group, sub-counters included.
    if total_operations > 0 {
        let ratio = status.opcounters_delete as f64 / total_operations as f64;
        if ratio > DELETE_RATIO_THRESHOLD {
            issues.push(format!(
                "High delete ratio: {:.1}% of operations are deletes",
                ratio * 100.0
            ));
            recommendations
                .push("Review data lifecycle - consider TTL indexes or archiving".to_string());
        }
    }

    let status = match issues.len() {
        0 => HealthStatus::Healthy,
        1 | 2 => HealthStatus::Warning,
        _ => HealthStatus::Critical,
    };

    ClusterHealth {
        status,
        issues,
        recommendations,
        metrics,
        checked_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::structure::StructureAnalysis;
    use mongodb::bson::doc;

    fn quiet_status() -> ServerStatus {
        ServerStatus {
            connections_current: 10,
            connections_available: 990,
            mem_resident: 512,
            mem_virtual: 2048,
            opcounters_delete: 5,
            opcounters_raw: doc! { "command": 900_i64, "delete": 5_i64, "query": 95_i64 },
            ..Default::default()
        }
    }

    fn collection(namespace: &str) -> CollectionStats {
        CollectionStats {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn quiet_cluster_is_healthy() {
        let health = evaluate(Ok(quiet_status()), &[collection("app.orders")]);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.issues.is_empty());
        assert!(health.recommendations.is_empty());
        assert_eq!(health.metrics.memory_usage_mb, 512);
        assert_eq!(health.metrics.current_connections, 10);
        assert_eq!(health.metrics.total_operations, 1000);
    }

    #[test]
    fn memory_pressure_uses_resident_over_virtual() {
        let status = ServerStatus {
            mem_resident: 800,
            mem_virtual: 1000,
            ..quiet_status()
        };
        let health = evaluate(Ok(status), &[]);
        assert_eq!(health.status, HealthStatus::Warning);
        assert_eq!(
            health.issues,
            vec!["High memory usage: 80.0% of virtual memory resident".to_string()]
        );
        assert_eq!(health.recommendations.len(), 1);
    }

    #[test]
    fn zero_virtual_memory_reports_no_pressure() {
        let status = ServerStatus {
            mem_resident: 800,
            mem_virtual: 0,
            ..quiet_status()
        };
        let health = evaluate(Ok(status), &[]);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[test]
    fn connection_pressure_is_fraction_of_limit() {
        let status = ServerStatus {
            connections_current: 80,
            connections_available: 20,
            ..quiet_status()
        };
        let health = evaluate(Ok(status), &[]);
        assert_eq!(
            health.issues,
            vec!["High connection usage: 80.0% of connection limit in use".to_string()]
        );
    }

    #[test]
    fn collection_issues_name_the_namespace() {
        let mut deep = collection("app.deep");
        deep.structure_analysis = Some(StructureAnalysis {
            max_nesting_depth: 8,
            ..Default::default()
        });

        let mut wide = collection("app.wide");
        wide.structure_analysis = Some(StructureAnalysis {
            max_array_size: 5000,
            ..Default::default()
        });

        let mut indexed = collection("app.indexed");
        indexed.nindexes = 14;

        let health = evaluate(Ok(quiet_status()), &[deep, wide, indexed]);
        assert_eq!(health.status, HealthStatus::Critical);
        assert!(health
            .issues
            .contains(&"Collection app.deep has deep nesting (depth 8)".to_string()));
        assert!(health
            .issues
            .contains(&"Collection app.wide has large arrays (max size 5000)".to_string()));
        assert!(health
            .issues
            .contains(&"Collection app.indexed has 14 indexes".to_string()));
        // One paired recommendation per issue, in issue order.
        assert_eq!(health.recommendations.len(), health.issues.len());
        assert!(health.recommendations[0].contains("app.deep"));
    }

    #[test]
    fn delete_ratio_flattens_nested_counters() {
        let status = ServerStatus {
            opcounters_delete: 30,
            // 30 deletes over 30 + 50 + (10 + 10) = 100 total.
            opcounters_raw: doc! {
                "delete": 30_i64,
                "query": 50_i64,
                "deprecated": { "query": 10_i64, "getmore": 10_i64 },
            },
            ..quiet_status()
        };
        let health = evaluate(Ok(status), &[]);
        assert_eq!(
            health.issues,
            vec!["High delete ratio: 30.0% of operations are deletes".to_string()]
        );
        assert_eq!(health.metrics.total_operations, 100);
    }

    #[test]
    fn verdict_bands_over_issue_count() {
        // Two issues: memory and connections.
        let status = ServerStatus {
            mem_resident: 900,
            mem_virtual: 1000,
            connections_current: 90,
            connections_available: 10,
            ..quiet_status()
        };
        let health = evaluate(Ok(status.clone()), &[]);
        assert_eq!(health.issues.len(), 2);
        assert_eq!(health.status, HealthStatus::Warning);

        // A third issue tips it to critical.
        let mut indexed = collection("app.indexed");
        indexed.nindexes = 20;
        let health = evaluate(Ok(status), &[indexed]);
        assert_eq!(health.issues.len(), 3);
        assert_eq!(health.status, HealthStatus::Critical);
    }

    #[test]
    fn failed_fetch_becomes_error_verdict_with_one_issue() {
        let err = ClientError::Command("serverStatus: not authorized".to_string());
        let health = evaluate(Err(err), &[collection("app.orders")]);
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.issues.len(), 1);
        assert!(health.issues[0].starts_with("Health check failed:"));
        assert!(health.recommendations.is_empty());
    }
}
