//! Erlink core library: privacy-preserving multi-party entity resolution.
//!
//! Each party encodes its records into Bloom filters (one over the record's
//! own attributes, one over its graph neighbours), clusters them, signs every
//! cluster with a MinHash cluster representative vector and announces only the
//! LSH bucket ids of those signatures. Buckets shared by enough parties name
//! the cluster pairs worth comparing; their filters are matched by Dice
//! coefficient and the pairwise matches are synchronized around a ring into
//! the set of entities every party holds.
//!
//! With the `python` feature the crate also builds as the `erlink_core`
//! extension module.

pub mod cluster;
pub mod config;
pub mod encoder;
pub mod errors;
pub mod exchange;
pub mod lsh;
pub mod matcher;
pub mod models;
pub mod parallel;
pub mod pipeline;
pub mod signature;
pub mod sync;

#[cfg(feature = "python")]
mod python;

pub use config::PipelineConfig;
pub use errors::{ErlinkError, ErlinkResult};
pub use models::{Diagnostic, Entity, EntityId, FilterSpace, PartyId};
pub use pipeline::{resolve_in_memory, Coordinator, PartyPipeline, Resolution};
pub use sync::chain::GlobalCommonEntityMap;
