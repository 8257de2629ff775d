//! Index quality analysis for one collection.
//!
//! Given raw index definitions and optional per-index usage counters,
//! produces an annotated, deduplicated, issue-tagged index report:
//!
//! 1. build one [`DetailedIndex`] per definition, merging usage
//!    counters by index name (an absent usage source means "all zero")
//! 2. duplicate pass — equal effective keys flag both indexes
//! 3. redundancy pass — a strict compound-prefix index is flagged in
//!    favor of the longer index
//! 4. property pass — TTL/sparse/partial/unused/compound/text
//!    heuristics (idempotent, pure per index)
//!
//! Passes accumulate annotations; recommendations concatenate across
//! passes and are never overwritten. `_id`-only and shard-key indexes
//! are exempt from duplicate/redundancy flagging.

use std::collections::HashMap;

use mongodb::bson::{Bson, Document};
use serde::{Serialize, Serializer};

use crate::util;

// ============================================================
// Result types
// ============================================================

/// One component of an index key specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexField {
    pub name: String,
    pub direction: IndexDirection,
}

/// Index key direction: ascending, descending, or an opaque tag such
/// as `"text"`, `"hashed"` or `"2dsphere"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDirection {
    Ascending,
    Descending,
    Other(String),
}

impl IndexDirection {
    fn from_bson(value: &Bson) -> Self {
        match util::as_i64(value) {
            Some(v) if v < 0 => IndexDirection::Descending,
            Some(_) => IndexDirection::Ascending,
            None => match value.as_str() {
                Some(tag) => IndexDirection::Other(tag.to_string()),
                None => IndexDirection::Other(value.to_string()),
            },
        }
    }

    fn render(&self) -> String {
        match self {
            IndexDirection::Ascending => "1".to_string(),
            IndexDirection::Descending => "-1".to_string(),
            IndexDirection::Other(tag) => format!("\"{}\"", tag),
        }
    }

    /// Descending normalized to ascending, used for the effective key.
    fn normalized(&self) -> IndexDirection {
        match self {
            IndexDirection::Descending => IndexDirection::Ascending,
            other => other.clone(),
        }
    }

    /// Sign-insensitive comparison: ±1 match each other, opaque tags
    /// must match exactly.
    fn compatible(&self, other: &IndexDirection) -> bool {
        match (self, other) {
            (IndexDirection::Other(a), IndexDirection::Other(b)) => a == b,
            (IndexDirection::Other(_), _) | (_, IndexDirection::Other(_)) => false,
            _ => true,
        }
    }
}

impl Serialize for IndexDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IndexDirection::Ascending => serializer.serialize_i32(1),
            IndexDirection::Descending => serializer.serialize_i32(-1),
            IndexDirection::Other(tag) => serializer.serialize_str(tag),
        }
    }
}

/// How an index was found to overlap with another index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyKind {
    #[default]
    None,
    /// Equal effective key with another index.
    Duplicate,
    /// Strict, direction-compatible prefix of a longer compound index.
    RedundantPrefix,
}

/// Annotated index report entry.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetailedIndex {
    pub name: String,
    pub key: Vec<IndexField>,
    /// Rendered key: `"{a: 1, b: -1}"`.
    pub key_string: String,
    /// Field names in key order.
    pub fields: Vec<String>,
    /// Key with descending directions normalized to ascending; equal
    /// effective keys mean direction-insensitive duplicates.
    pub effective_key: String,

    pub unique: bool,
    pub sparse: bool,
    pub background: bool,
    pub partial_filter_expression: Option<Document>,
    pub expire_after_seconds: Option<i64>,
    pub weights: Option<Document>,
    pub version: i64,

    pub is_shard_key: bool,
    pub is_duplicate: bool,
    pub redundancy: RedundancyKind,
    pub total_ops: i64,

    /// Ordered, never contains duplicate messages.
    pub issues: Vec<String>,
    pub recommendation: String,
}

impl DetailedIndex {
    fn from_raw(raw: &Document, ops_by_name: &HashMap<String, i64>, shard_key: Option<&Document>) -> Self {
        let name = util::get_str(raw, "name");
        let key_doc = util::get_doc(raw, "key");
        let key: Vec<IndexField> = key_doc
            .iter()
            .map(|(field, direction)| IndexField {
                name: field.clone(),
                direction: IndexDirection::from_bson(direction),
            })
            .collect();
        let fields: Vec<String> = key.iter().map(|f| f.name.clone()).collect();
        let key_string = render_key(&key, false);
        let effective_key = render_key(&key, true);

        let partial_filter_expression = raw
            .get_document("partialFilterExpression")
            .ok()
            .filter(|d| !d.is_empty())
            .cloned();
        let weights = raw
            .get_document("weights")
            .ok()
            .filter(|d| !d.is_empty())
            .cloned();
        let expire_after_seconds = raw.get("expireAfterSeconds").and_then(util::as_i64);

        let is_shard_key = shard_key.is_some_and(|sk| key_matches_shard_key(&key, sk));
        let total_ops = ops_by_name.get(&name).copied().unwrap_or(0);

        Self {
            name,
            key,
            key_string,
            fields,
            effective_key,
            unique: util::get_bool(raw, "unique"),
            sparse: util::get_bool(raw, "sparse"),
            background: util::get_bool(raw, "background"),
            partial_filter_expression,
            expire_after_seconds,
            weights,
            version: match raw.get("v").and_then(util::as_i64) {
                Some(v) => v,
                None => 2,
            },
            is_shard_key,
            is_duplicate: false,
            redundancy: RedundancyKind::None,
            total_ops,
            issues: Vec::new(),
            recommendation: String::new(),
        }
    }

    /// `_id`-only and shard-key indexes never participate in
    /// duplicate/redundancy flagging.
    fn exempt(&self) -> bool {
        self.fields == ["_id"] || self.is_shard_key
    }
}

fn render_key(key: &[IndexField], normalized: bool) -> String {
    let parts: Vec<String> = key
        .iter()
        .map(|f| {
            let direction = if normalized {
                f.direction.normalized()
            } else {
                f.direction.clone()
            };
            format!("{}: {}", f.name, direction.render())
        })
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn key_matches_shard_key(key: &[IndexField], shard_key: &Document) -> bool {
    if key.len() != shard_key.len() {
        return false;
    }
    key.iter().zip(shard_key.iter()).all(|(field, (name, dir))| {
        field.name == *name && field.direction.compatible(&IndexDirection::from_bson(dir))
    })
}

// ============================================================
// Pass annotations
// ============================================================

/// What one pass learned about one index. Merged into the accumulator
/// afterwards; passes never mutate shared state.
#[derive(Debug, Clone, Default)]
struct Annotation {
    duplicate: bool,
    redundancy: RedundancyKind,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

impl Annotation {
    fn merge_into(self, index: &mut DetailedIndex, recommendations: &mut Vec<String>) {
        if self.duplicate {
            index.is_duplicate = true;
        }
        if index.redundancy == RedundancyKind::None {
            index.redundancy = self.redundancy;
        }
        for issue in self.issues {
            if !index.issues.contains(&issue) {
                index.issues.push(issue);
            }
        }
        recommendations.extend(self.recommendations);
    }
}

// ============================================================
// Entry point
// ============================================================

/// Analyzes one collection's indexes.
///
/// `usage` is the `$indexStats` output; `None` means the capability is
/// unavailable and all counters are treated as zero. `shard_key` is
/// the declared shard key specification when known; matching indexes
/// become exempt from duplicate/redundancy flagging.
///
/// Output is sorted by effective key (name as tiebreak) for
/// deterministic reports.
pub fn analyze(
    raw: &[Document],
    usage: Option<&[Document]>,
    shard_key: Option<&Document>,
) -> Vec<DetailedIndex> {
    let ops_by_name = parse_usage(usage);

    let mut indexes: Vec<DetailedIndex> = raw
        .iter()
        .map(|def| DetailedIndex::from_raw(def, &ops_by_name, shard_key))
        .collect();
    indexes.sort_by(|a, b| {
        a.effective_key
            .cmp(&b.effective_key)
            .then_with(|| a.name.cmp(&b.name))
    });

    let duplicate = duplicate_pass(&indexes);
    let redundancy = redundancy_pass(&indexes);

    for (i, index) in indexes.iter_mut().enumerate() {
        let property = property_pass(index);
        let mut recommendations = Vec::new();
        duplicate[i].clone().merge_into(index, &mut recommendations);
        redundancy[i].clone().merge_into(index, &mut recommendations);
        property.merge_into(index, &mut recommendations);

        index.recommendation = if recommendations.is_empty() {
            "No issues detected".to_string()
        } else {
            recommendations.join("; ")
        };
    }

    indexes
}

fn parse_usage(usage: Option<&[Document]>) -> HashMap<String, i64> {
    let mut ops_by_name = HashMap::new();
    for entry in usage.unwrap_or_default() {
        let name = util::get_str(entry, "name");
        if name.is_empty() {
            continue;
        }
        let accesses = util::get_doc(entry, "accesses");
        ops_by_name.insert(name, util::get_i64(&accesses, "ops"));
    }
    ops_by_name
}

// ============================================================
// Passes
// ============================================================

/// Flags every unordered pair of non-exempt indexes with equal
/// effective keys, cross-referencing each other by name.
fn duplicate_pass(indexes: &[DetailedIndex]) -> Vec<Annotation> {
    let mut annotations = vec![Annotation::default(); indexes.len()];
    for i in 0..indexes.len() {
        if indexes[i].exempt() {
            continue;
        }
        for j in (i + 1)..indexes.len() {
            if indexes[j].exempt() || indexes[i].effective_key != indexes[j].effective_key {
                continue;
            }
            annotations[i].duplicate = true;
            annotations[i].redundancy = RedundancyKind::Duplicate;
            annotations[i]
                .issues
                .push(format!("Duplicate of index {}", indexes[j].name));
            annotations[j].duplicate = true;
            annotations[j].redundancy = RedundancyKind::Duplicate;
            annotations[j]
                .issues
                .push(format!("Duplicate of index {}", indexes[i].name));
        }
    }
    annotations
}

/// Flags every non-exempt index whose field sequence is a strict,
/// direction-compatible prefix of a longer index's field sequence.
/// The longer index is unaffected.
fn redundancy_pass(indexes: &[DetailedIndex]) -> Vec<Annotation> {
    let mut annotations = vec![Annotation::default(); indexes.len()];
    for (i, longer) in indexes.iter().enumerate() {
        if longer.exempt() {
            continue;
        }
        for (j, shorter) in indexes.iter().enumerate() {
            if i == j || shorter.exempt() || shorter.key.is_empty() {
                continue;
            }
            if shorter.key.len() >= longer.key.len() {
                continue;
            }
            let is_prefix = shorter.key.iter().zip(longer.key.iter()).all(|(s, l)| {
                s.name == l.name && s.direction.compatible(&l.direction)
            });
            if !is_prefix {
                continue;
            }
            annotations[j].duplicate = true;
            annotations[j].redundancy = RedundancyKind::RedundantPrefix;
            annotations[j]
                .issues
                .push(format!("Redundant prefix of compound index {}", longer.name));
            annotations[j].recommendations.push(format!(
                "Consider dropping this index - {} can serve the same queries",
                longer.name
            ));
        }
    }
    annotations
}

/// Per-index property heuristics. Pure function of the index itself,
/// safe to re-run.
fn property_pass(index: &DetailedIndex) -> Annotation {
    let mut annotation = Annotation::default();

    if let Some(ttl) = index.expire_after_seconds
        && ttl > 0
        && ttl < 60
    {
        annotation
            .issues
            .push(format!("TTL index with very short expiration ({}s)", ttl));
        annotation
            .recommendations
            .push("Consider if TTL expiration is appropriate for your use case".to_string());
    }

    if index.partial_filter_expression.is_some() {
        annotation
            .recommendations
            .push("Partial index detected - ensure queries match the filter expression".to_string());
    }

    if index.sparse {
        annotation
            .recommendations
            .push("Sparse index detected - ensure queries handle null values correctly".to_string());
    }

    if index.total_ops == 0 && index.name != "_id_" {
        annotation.issues.push("Unused index".to_string());
        annotation
            .recommendations
            .push("Consider dropping unused indexes to improve write performance".to_string());
    }

    if index.fields.len() > 1 {
        annotation.recommendations.push(
            "Compound index - ensure optimal field ordering (equality before range)".to_string(),
        );
    }

    if index.weights.is_some() {
        annotation
            .recommendations
            .push("Text index detected - monitor performance for text search queries".to_string());
    }

    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn index(name: &str, key: Document) -> Document {
        doc! { "name": name, "key": key, "v": 2 }
    }

    fn usage(name: &str, ops: i64) -> Document {
        doc! { "name": name, "accesses": { "ops": ops } }
    }

    fn find<'a>(indexes: &'a [DetailedIndex], name: &str) -> &'a DetailedIndex {
        indexes.iter().find(|i| i.name == name).unwrap()
    }

    #[test]
    fn duplicate_pairs_flag_both_with_cross_references() {
        let raw = vec![
            index("_id_", doc! { "_id": 1 }),
            index("user_asc", doc! { "user": 1 }),
            index("user_desc", doc! { "user": -1 }),
        ];
        let used = vec![usage("_id_", 5), usage("user_asc", 3), usage("user_desc", 2)];
        let result = analyze(&raw, Some(&used), None);

        let asc = find(&result, "user_asc");
        let desc = find(&result, "user_desc");
        assert!(asc.is_duplicate);
        assert!(desc.is_duplicate);
        assert_eq!(asc.redundancy, RedundancyKind::Duplicate);
        assert!(asc.issues.contains(&"Duplicate of index user_desc".to_string()));
        assert!(desc.issues.contains(&"Duplicate of index user_asc".to_string()));
        assert!(!find(&result, "_id_").is_duplicate);
    }

    #[test]
    fn prefix_redundancy_flags_only_the_shorter_index() {
        let raw = vec![
            index("_id_", doc! { "_id": 1 }),
            index("a_1", doc! { "a": 1 }),
            index("a_1_b_1", doc! { "a": 1, "b": 1 }),
        ];
        let used = vec![usage("a_1", 1), usage("a_1_b_1", 1), usage("_id_", 1)];
        let result = analyze(&raw, Some(&used), None);

        let shorter = find(&result, "a_1");
        assert!(shorter.is_duplicate);
        assert_eq!(shorter.redundancy, RedundancyKind::RedundantPrefix);
        assert!(shorter
            .issues
            .contains(&"Redundant prefix of compound index a_1_b_1".to_string()));
        assert!(shorter
            .recommendation
            .contains("a_1_b_1 can serve the same queries"));

        let longer = find(&result, "a_1_b_1");
        assert!(!longer.is_duplicate);
        assert!(!longer.issues.iter().any(|i| i.contains("Redundant")));
    }

    #[test]
    fn prefix_redundancy_is_sign_insensitive() {
        let raw = vec![
            index("a_desc", doc! { "a": -1 }),
            index("a_1_b_1", doc! { "a": 1, "b": 1 }),
        ];
        let used = vec![usage("a_desc", 1), usage("a_1_b_1", 1)];
        let result = analyze(&raw, Some(&used), None);
        assert!(find(&result, "a_desc").is_duplicate);
    }

    #[test]
    fn text_index_tag_must_match_exactly_for_redundancy() {
        let raw = vec![
            index("a_text", doc! { "a": "text" }),
            index("a_1_b_1", doc! { "a": 1, "b": 1 }),
        ];
        let used = vec![usage("a_text", 1), usage("a_1_b_1", 1)];
        let result = analyze(&raw, Some(&used), None);
        assert!(!find(&result, "a_text").is_duplicate);
    }

    #[test]
    fn id_only_index_is_exempt_regardless_of_overlap() {
        let raw = vec![
            index("_id_", doc! { "_id": 1 }),
            index("id_again", doc! { "_id": 1 }),
        ];
        let used = vec![usage("_id_", 1), usage("id_again", 1)];
        let result = analyze(&raw, Some(&used), None);
        // The _id_ index never participates; the extra index has no
        // non-exempt partner to be a duplicate of.
        assert!(!find(&result, "_id_").is_duplicate);
        assert!(!find(&result, "id_again").is_duplicate);
    }

    #[test]
    fn shard_key_index_is_exempt() {
        let shard_key = doc! { "tenant": 1 };
        let raw = vec![
            index("tenant_1", doc! { "tenant": 1 }),
            index("tenant_1_ts_1", doc! { "tenant": 1, "ts": 1 }),
        ];
        let used = vec![usage("tenant_1", 1), usage("tenant_1_ts_1", 1)];
        let result = analyze(&raw, Some(&used), Some(&shard_key));

        let shard = find(&result, "tenant_1");
        assert!(shard.is_shard_key);
        assert!(!shard.is_duplicate);
    }

    #[test]
    fn absent_usage_source_means_all_zero_not_an_error() {
        let raw = vec![index("_id_", doc! { "_id": 1 }), index("a_1", doc! { "a": 1 })];
        let result = analyze(&raw, None, None);

        let a = find(&result, "a_1");
        assert_eq!(a.total_ops, 0);
        assert!(a.issues.contains(&"Unused index".to_string()));
        // _id_ is never reported unused.
        assert!(!find(&result, "_id_").issues.contains(&"Unused index".to_string()));
    }

    #[test]
    fn short_ttl_is_an_issue() {
        let raw = vec![doc! {
            "name": "session_ttl",
            "key": { "created": 1 },
            "expireAfterSeconds": 30_i64,
        }];
        let used = vec![usage("session_ttl", 10)];
        let result = analyze(&raw, Some(&used), None);
        let ttl = find(&result, "session_ttl");
        assert!(ttl
            .issues
            .contains(&"TTL index with very short expiration (30s)".to_string()));
    }

    #[test]
    fn sparse_and_partial_are_recommendations_not_issues() {
        let raw = vec![doc! {
            "name": "email_sparse",
            "key": { "email": 1 },
            "sparse": true,
            "partialFilterExpression": { "email": { "$exists": true } },
        }];
        let used = vec![usage("email_sparse", 10)];
        let result = analyze(&raw, Some(&used), None);
        let idx = find(&result, "email_sparse");
        assert!(idx.issues.is_empty());
        assert!(idx.recommendation.contains("Partial index detected"));
        assert!(idx.recommendation.contains("Sparse index detected"));
    }

    #[test]
    fn redundancy_recommendation_survives_the_property_pass() {
        // The redundant index is also unused: the property pass adds
        // its own fragment after the redundancy fragment, nothing is
        // overwritten.
        let raw = vec![
            index("a_1", doc! { "a": 1 }),
            index("a_1_b_1", doc! { "a": 1, "b": 1 }),
        ];
        let used = vec![usage("a_1_b_1", 5)];
        let result = analyze(&raw, Some(&used), None);

        let shorter = find(&result, "a_1");
        let drop_pos = shorter
            .recommendation
            .find("a_1_b_1 can serve the same queries")
            .unwrap();
        let unused_pos = shorter
            .recommendation
            .find("Consider dropping unused indexes")
            .unwrap();
        assert!(drop_pos < unused_pos);
        assert!(shorter.recommendation.contains("; "));
    }

    #[test]
    fn issue_without_fragments_falls_back_to_default_recommendation() {
        // An actively used single-field duplicate pair: the duplicate
        // pass adds issues but no recommendation fragments, and the
        // property pass adds nothing for a used single-field index.
        let raw = vec![
            index("user_asc", doc! { "user": 1 }),
            index("user_desc", doc! { "user": -1 }),
        ];
        let used = vec![usage("user_asc", 10), usage("user_desc", 10)];
        let result = analyze(&raw, Some(&used), None);

        let asc = find(&result, "user_asc");
        assert!(!asc.issues.is_empty());
        assert_eq!(asc.recommendation, "No issues detected");
    }

    #[test]
    fn clean_index_reports_no_issues_detected() {
        let raw = vec![index("a_1", doc! { "a": 1 })];
        let used = vec![usage("a_1", 100)];
        let result = analyze(&raw, Some(&used), None);
        let a = find(&result, "a_1");
        assert!(a.issues.is_empty());
        assert_eq!(a.recommendation, "No issues detected");
    }

    #[test]
    fn compound_and_text_indexes_get_informational_notes() {
        let raw = vec![
            index("a_1_b_neg1", doc! { "a": 1, "b": -1 }),
            doc! {
                "name": "content_text",
                "key": { "_fts": "text", "_ftsx": 1 },
                "weights": { "content": 1 },
            },
        ];
        let used = vec![usage("a_1_b_neg1", 4), usage("content_text", 4)];
        let result = analyze(&raw, Some(&used), None);
        assert!(find(&result, "a_1_b_neg1")
            .recommendation
            .contains("Compound index"));
        assert!(find(&result, "content_text")
            .recommendation
            .contains("Text index detected"));
    }

    #[test]
    fn output_is_sorted_by_effective_key() {
        let raw = vec![
            index("z_last", doc! { "z": 1 }),
            index("m_mid", doc! { "m": -1 }),
            index("a_first", doc! { "a": 1 }),
        ];
        let used = vec![usage("z_last", 1), usage("m_mid", 1), usage("a_first", 1)];
        let result = analyze(&raw, Some(&used), None);
        let names: Vec<&str> = result.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["a_first", "m_mid", "z_last"]);
    }

    #[test]
    fn effective_key_normalizes_descending_directions() {
        let raw = vec![index("a", doc! { "x": -1, "y": 1 })];
        let result = analyze(&raw, None, None);
        assert_eq!(result[0].key_string, "{x: -1, y: 1}");
        assert_eq!(result[0].effective_key, "{x: 1, y: 1}");
    }

    #[test]
    fn issues_are_never_duplicated() {
        let raw = vec![
            index("a_1", doc! { "a": 1 }),
            index("a_1_b_1", doc! { "a": 1, "b": 1 }),
            index("a_1_c_1", doc! { "a": 1, "c": 1 }),
        ];
        let result = analyze(&raw, None, None);
        let shorter = find(&result, "a_1");
        let mut seen = std::collections::HashSet::new();
        for issue in &shorter.issues {
            assert!(seen.insert(issue.clone()), "duplicate issue: {}", issue);
        }
        // Redundant against both compound indexes.
        assert_eq!(
            shorter
                .issues
                .iter()
                .filter(|i| i.contains("Redundant prefix"))
                .count(),
            2
        );
    }
}
