//! Defensive BSON accessors.
//!
//! Administrative command responses vary across server versions and
//! deployment flavors: numeric fields come back as int32, int64 or
//! double depending on magnitude, and whole sub-documents may be
//! absent. These helpers destructure such responses without erroring —
//! a missing or mistyped key yields the default.

use mongodb::bson::{Bson, Document};

/// Numeric value of a BSON scalar, if it is one.
pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(*v as i64),
        _ => None,
    }
}

/// Numeric value of a BSON scalar as f64, if it is one.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Integer field, coercing int32/int64/double. Missing or non-numeric ⇒ 0.
pub fn get_i64(doc: &Document, key: &str) -> i64 {
    doc.get(key).and_then(as_i64).unwrap_or(0)
}

/// Float field, coercing int32/int64/double. Missing or non-numeric ⇒ 0.0.
pub fn get_f64(doc: &Document, key: &str) -> f64 {
    doc.get(key).and_then(as_f64).unwrap_or(0.0)
}

/// String field. Missing or non-string ⇒ empty string.
pub fn get_str(doc: &Document, key: &str) -> String {
    doc.get_str(key).unwrap_or_default().to_string()
}

/// Boolean field. Missing or non-boolean ⇒ false.
pub fn get_bool(doc: &Document, key: &str) -> bool {
    doc.get_bool(key).unwrap_or(false)
}

/// Sub-document field. Missing or mistyped ⇒ empty document.
pub fn get_doc(doc: &Document, key: &str) -> Document {
    doc.get_document(key).cloned().unwrap_or_default()
}

/// Array field as a vector of values. Missing or mistyped ⇒ empty.
pub fn get_array(doc: &Document, key: &str) -> Vec<Bson> {
    doc.get_array(key).cloned().unwrap_or_default()
}

/// String-array field, skipping non-string elements.
pub fn get_str_array(doc: &Document, key: &str) -> Vec<String> {
    get_array(doc, key)
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Sums every numeric leaf in a document, descending into nested
/// documents and arrays. Used to flatten op-counter groups that carry
/// nested sub-counters (e.g. deprecated-op breakdowns).
pub fn sum_numeric_leaves(doc: &Document) -> i64 {
    doc.values().map(sum_numeric_leaves_value).sum()
}

fn sum_numeric_leaves_value(value: &Bson) -> i64 {
    match value {
        Bson::Document(d) => sum_numeric_leaves(d),
        Bson::Array(a) => a.iter().map(sum_numeric_leaves_value).sum(),
        other => as_i64(other).unwrap_or(0),
    }
}
