//! Analysis engines over already-fetched cluster data.
//!
//! All analysis is pure computation — no I/O, no suspension points:
//!
//! - [`indexes`] — per-collection index quality (duplicates, redundant
//!   prefixes, usage-based dead indexes, TTL/sparse/partial heuristics)
//! - [`structure`] — document-schema health over a bounded sample
//!   (nesting, arrays, field cardinality, storage fragmentation)
//! - [`health`] — cluster-wide verdict combining server counters with
//!   the per-collection analyses
//!
//! Analyzers annotate in passes: each pass produces an immutable
//! annotation that is merged into the result afterwards, so passes
//! stay composable and testable in isolation.

pub mod health;
pub mod indexes;
pub mod structure;
