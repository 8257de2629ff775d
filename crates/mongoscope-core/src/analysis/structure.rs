//! Document structure analysis for one collection.
//!
//! Operates over a bounded, order-stable document sample (most
//! recently inserted N) and computes nesting depth, array size
//! distribution, field cardinality and storage fragmentation, plus
//! deterministic recommendations. Pure computation — the sample and
//! cached size stats are fetched by the collector beforehand.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use mongodb::bson::{Bson, Document};
use serde::Serialize;

/// Nesting depth beyond which a document counts as deeply nested.
const DEEP_NESTING_THRESHOLD: usize = 5;
/// Array length beyond which an array counts as large.
const LARGE_ARRAY_THRESHOLD: usize = 1000;
/// Example documents retained per finding.
const MAX_EXAMPLE_DOCS: usize = 3;
/// Most frequent field paths retained.
const TOP_FIELDS: usize = 10;

// ============================================================
// Result types
// ============================================================

/// Categorical fragmentation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentationLevel {
    /// On-disk size below logical size (compression or externally
    /// reported storage).
    Compressed,
    Low,
    Medium,
    High,
    Critical,
    #[default]
    Unknown,
}

/// Fragmentation figures derived from (storageSize, dataSize).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentationMetrics {
    pub fragmentation_percent: f64,
    pub storage_efficiency_percent: f64,
    pub wasted_bytes: i64,
    pub level: FragmentationLevel,
}

/// Cached per-namespace size stats feeding fragmentation analysis.
#[derive(Debug, Clone, Copy)]
pub struct SizeStats {
    pub storage_size: i64,
    pub data_size: i64,
}

/// Aggregate structure analysis over one collection's sample.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructureAnalysis {
    pub namespace: String,

    pub max_nesting_depth: usize,
    pub avg_nesting_depth: f64,
    pub has_deep_nesting: bool,
    pub deep_nesting_samples: Vec<Document>,

    pub has_large_arrays: bool,
    pub max_array_size: usize,
    pub avg_array_size: f64,
    pub large_array_samples: Vec<Document>,

    /// Distinct field names across the whole sample (array-element
    /// field names counted once per name, not once per element).
    pub total_fields: usize,
    /// Average per-document count of concrete paths including
    /// explicit array indices.
    pub avg_queryable_paths: f64,
    /// Top field paths by document occurrence, count descending.
    pub common_fields: Vec<(String, usize)>,
    /// Field path → BSON type name, first encounter wins.
    pub field_types: BTreeMap<String, String>,

    pub fragmentation_percent: f64,
    pub storage_efficiency_percent: f64,
    pub wasted_bytes: i64,
    pub fragmentation_level: FragmentationLevel,

    pub recommendations: Vec<String>,
    pub issues: Vec<String>,
}

// ============================================================
// Entry point
// ============================================================

/// Analyzes a collection's document sample.
///
/// An empty sample yields a zeroed analysis. `size_stats` is the
/// read-mostly cache entry for the namespace; when absent the
/// fragmentation level stays `unknown`.
pub fn analyze(
    sample: &[Document],
    namespace: &str,
    size_stats: Option<&SizeStats>,
) -> StructureAnalysis {
    let mut analysis = StructureAnalysis {
        namespace: namespace.to_string(),
        ..Default::default()
    };

    if sample.is_empty() {
        return analysis;
    }

    let mut nesting_depths = Vec::with_capacity(sample.len());
    let mut array_sizes = Vec::new();
    let mut queryable_counts = Vec::with_capacity(sample.len());
    let mut field_occurrences: HashMap<String, usize> = HashMap::new();

    for doc in sample {
        let depth = document_depth(doc);
        nesting_depths.push(depth);
        if depth > analysis.max_nesting_depth {
            analysis.max_nesting_depth = depth;
        }
        if depth > DEEP_NESTING_THRESHOLD {
            analysis.has_deep_nesting = true;
            if analysis.deep_nesting_samples.len() < MAX_EXAMPLE_DOCS {
                analysis.deep_nesting_samples.push(doc.clone());
            }
        }

        let mut doc_array_sizes = Vec::new();
        for value in doc.values() {
            collect_array_sizes(value, &mut doc_array_sizes);
        }
        if let Some(&largest) = doc_array_sizes.iter().max() {
            if largest > analysis.max_array_size {
                analysis.max_array_size = largest;
            }
            if largest > LARGE_ARRAY_THRESHOLD {
                analysis.has_large_arrays = true;
                if analysis.large_array_samples.len() < MAX_EXAMPLE_DOCS {
                    analysis.large_array_samples.push(doc.clone());
                }
            }
        }
        array_sizes.extend(doc_array_sizes);

        let fields = distinct_fields(doc, &mut analysis.field_types);
        for field in fields {
            *field_occurrences.entry(field).or_insert(0) += 1;
        }

        queryable_counts.push(queryable_paths(doc).len());
    }

    analysis.avg_nesting_depth = mean_usize(&nesting_depths);
    analysis.avg_array_size = mean_usize(&array_sizes);
    analysis.avg_queryable_paths = mean_usize(&queryable_counts);
    analysis.total_fields = field_occurrences.len();

    let mut common: Vec<(String, usize)> = field_occurrences.into_iter().collect();
    common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    common.truncate(TOP_FIELDS);
    analysis.common_fields = common;

    if let Some(stats) = size_stats {
        let metrics = fragmentation(stats.storage_size, stats.data_size);
        analysis.fragmentation_percent = metrics.fragmentation_percent;
        analysis.storage_efficiency_percent = metrics.storage_efficiency_percent;
        analysis.wasted_bytes = metrics.wasted_bytes;
        analysis.fragmentation_level = metrics.level;
    }

    apply_recommendations(&mut analysis);
    analysis
}

/// Fragmentation classification as a pure function of
/// (storageSize, dataSize).
pub fn fragmentation(storage_size: i64, data_size: i64) -> FragmentationMetrics {
    if storage_size <= 0 {
        return FragmentationMetrics {
            fragmentation_percent: 0.0,
            storage_efficiency_percent: 100.0,
            wasted_bytes: 0,
            level: FragmentationLevel::Unknown,
        };
    }

    // On-disk smaller than logical: compression or externally reported
    // storage figures. No waste to report.
    if storage_size < data_size {
        return FragmentationMetrics {
            fragmentation_percent: 0.0,
            storage_efficiency_percent: round2(data_size as f64 / storage_size as f64 * 100.0),
            wasted_bytes: 0,
            level: FragmentationLevel::Compressed,
        };
    }

    let wasted = storage_size - data_size;
    let fragmentation_percent = wasted as f64 / storage_size as f64 * 100.0;
    let level = if fragmentation_percent < 10.0 {
        FragmentationLevel::Low
    } else if fragmentation_percent < 25.0 {
        FragmentationLevel::Medium
    } else if fragmentation_percent < 50.0 {
        FragmentationLevel::High
    } else {
        FragmentationLevel::Critical
    };

    FragmentationMetrics {
        fragmentation_percent: round2(fragmentation_percent),
        storage_efficiency_percent: round2(data_size as f64 / storage_size as f64 * 100.0),
        wasted_bytes: wasted,
        level,
    }
}

// ============================================================
// Document traversal
// ============================================================

/// Maximum nesting depth: a container value (document or array)
/// contributes 1 plus its deepest child; scalars contribute 0.
pub fn document_depth(doc: &Document) -> usize {
    doc.values().map(value_depth).max().unwrap_or(0)
}

fn value_depth(value: &Bson) -> usize {
    match value {
        Bson::Document(d) => 1 + d.values().map(value_depth).max().unwrap_or(0),
        Bson::Array(a) => 1 + a.iter().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Collects the length of every array at any level.
fn collect_array_sizes(value: &Bson, sizes: &mut Vec<usize>) {
    match value {
        Bson::Array(a) => {
            sizes.push(a.len());
            for element in a {
                collect_array_sizes(element, sizes);
            }
        }
        Bson::Document(d) => {
            for nested in d.values() {
                collect_array_sizes(nested, sizes);
            }
        }
        _ => {}
    }
}

/// Distinct dotted field paths of one document. For arrays of
/// documents the union of element field paths is produced — a name is
/// counted once no matter how many elements carry it. Records each
/// path's BSON type name on first encounter.
pub fn distinct_fields(doc: &Document, types: &mut BTreeMap<String, String>) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    collect_distinct(doc, "", &mut fields, types);
    fields
}

fn collect_distinct(
    doc: &Document,
    prefix: &str,
    fields: &mut BTreeSet<String>,
    types: &mut BTreeMap<String, String>,
) {
    for (key, value) in doc {
        let path = join_path(prefix, key);
        types
            .entry(path.clone())
            .or_insert_with(|| bson_type_name(value).to_string());
        fields.insert(path.clone());
        collect_distinct_value(value, &path, fields, types);
    }
}

fn collect_distinct_value(
    value: &Bson,
    path: &str,
    fields: &mut BTreeSet<String>,
    types: &mut BTreeMap<String, String>,
) {
    match value {
        Bson::Document(d) => collect_distinct(d, path, fields, types),
        Bson::Array(a) => {
            for element in a {
                collect_distinct_value(element, path, fields, types);
            }
        }
        _ => {}
    }
}

/// Every concrete path of one document, with explicit array indices:
/// each array element contributes its indexed path (`c[0]`) and, for
/// container elements, its children's paths (`c[0].x`).
pub fn queryable_paths(doc: &Document) -> Vec<String> {
    let mut paths = Vec::new();
    collect_queryable(doc, "", &mut paths);
    paths
}

fn collect_queryable(doc: &Document, prefix: &str, paths: &mut Vec<String>) {
    for (key, value) in doc {
        let path = join_path(prefix, key);
        paths.push(path.clone());
        collect_queryable_value(value, &path, paths);
    }
}

fn collect_queryable_value(value: &Bson, path: &str, paths: &mut Vec<String>) {
    match value {
        Bson::Document(d) => collect_queryable(d, path, paths),
        Bson::Array(a) => {
            for (i, element) in a.iter().enumerate() {
                let indexed = format!("{}[{}]", path, i);
                paths.push(indexed.clone());
                collect_queryable_value(element, &indexed, paths);
            }
        }
        _ => {}
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal",
        Bson::Binary(_) => "binData",
        Bson::RegularExpression(_) => "regex",
        _ => "other",
    }
}

fn mean_usize(values: &[usize]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<usize>() as f64 / values.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================
// Recommendations
// ============================================================

fn apply_recommendations(analysis: &mut StructureAnalysis) {
    let mut recommendations = Vec::new();
    let mut issues = Vec::new();

    if analysis.has_deep_nesting {
        issues.push(format!(
            "Deep nesting detected (max depth: {})",
            analysis.max_nesting_depth
        ));
        recommendations.push(
            "Consider denormalizing deeply nested documents for better query performance"
                .to_string(),
        );
        recommendations
            .push("Use aggregation pipelines to flatten nested data when needed".to_string());
    }

    if analysis.has_large_arrays {
        issues.push(format!(
            "Large arrays detected (max size: {})",
            analysis.max_array_size
        ));
        recommendations.push("Consider splitting large arrays into separate collections".to_string());
        recommendations.push("Use pagination when working with large arrays".to_string());
    }

    if analysis.total_fields > 50 {
        issues.push(format!("High field count ({})", analysis.total_fields));
        recommendations.push("Consider document schema optimization".to_string());
    }

    if analysis.avg_array_size > 100.0 {
        recommendations.push("Monitor array growth patterns".to_string());
        recommendations.push("Consider using capped arrays or separate collections".to_string());
    }

    if analysis.fragmentation_percent > 0.0 {
        match analysis.fragmentation_level {
            FragmentationLevel::Critical => {
                issues.push(format!(
                    "Critical fragmentation detected ({}% wasted space)",
                    analysis.fragmentation_percent
                ));
                recommendations
                    .push("Consider compacting the collection to reclaim space".to_string());
                recommendations.push(
                    "Review data deletion patterns and consider archiving old data".to_string(),
                );
            }
            FragmentationLevel::High => {
                issues.push(format!(
                    "High fragmentation detected ({}% wasted space)",
                    analysis.fragmentation_percent
                ));
                recommendations.push(
                    "Monitor fragmentation trends and consider compaction if it worsens"
                        .to_string(),
                );
                recommendations
                    .push("Review update patterns that may cause document growth".to_string());
            }
            FragmentationLevel::Medium => {
                recommendations
                    .push("Fragmentation is moderate - monitor for trends".to_string());
            }
            _ => {}
        }
    }

    analysis.recommendations = recommendations;
    analysis.issues = issues;
}
