//! mongoscope-core — MongoDB cluster statistics and analysis engine.
//!
//! Provides:
//! - `client` — cluster client abstraction (real MongoDB driver + mock)
//! - `model` — snapshot data models (databases, collections, topology)
//! - `collector` — concurrent cluster-wide statistics collection
//! - `analysis` — index quality, document structure, cluster health
//! - `util` — defensive BSON accessors
//! - `fmt` — shared formatting helpers (bytes, percentages)
//!
//! The engine is read-only from the cluster's perspective: it issues
//! administrative commands and samples documents, then derives quality
//! signals over the fetched data. Downstream renderers consume the
//! returned [`model::ClusterSnapshot`] without calling back.

pub mod analysis;
pub mod client;
pub mod collector;
pub mod fmt;
pub mod model;
pub mod util;
