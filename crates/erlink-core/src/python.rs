//! Python bindings (`erlink_core` extension module).
//!
//! Filters cross the boundary as bit strings and composite results as JSON,
//! so the Python side needs no knowledge of the Rust types.

use std::collections::{BTreeMap, HashMap};

use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::cluster::KMeans;
use crate::config::{FilterConfig, PipelineConfig};
use crate::encoder::bloom::BloomFilter;
use crate::encoder::entity::encode_all;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::matcher::dice;
use crate::models::{Entity, EntityId, FilterSpace, PartyId};
use crate::signature::minhash::Crv;
use crate::sync::chain::{self, MatchChain};

fn parse_space(space: &str) -> ErlinkResult<FilterSpace> {
    FilterSpace::ALL
        .into_iter()
        .find(|s| s.as_str() == space)
        .ok_or_else(|| ErlinkError::InvalidArgument(format!("unknown filter space {space:?}")))
}

fn parse_filters(bits: &[String], hashes: usize, seed: u64) -> ErlinkResult<Vec<BloomFilter>> {
    bits.iter()
        .map(|b| BloomFilter::from_bit_string(b, hashes, seed))
        .collect()
}

#[pyfunction]
#[pyo3(signature = (values, width=256, hashes=4, seed=0))]
pub fn encode_filter(
    values: Vec<String>,
    width: usize,
    hashes: usize,
    seed: u64,
) -> PyResult<String> {
    let mut filter = BloomFilter::with_seed(width, hashes, seed)?;
    for v in &values {
        filter.insert(v);
    }
    Ok(filter.to_bit_string())
}

/// Encode a JSON list of entities; returns `(id, attribute_bits, structural_bits)` rows.
#[pyfunction]
#[pyo3(signature = (entities_json, width=256, hashes=4, seed=0))]
pub fn encode_entities(
    entities_json: &str,
    width: usize,
    hashes: usize,
    seed: u64,
) -> PyResult<Vec<(EntityId, String, String)>> {
    let entities: Vec<Entity> = serde_json::from_str(entities_json).map_err(ErlinkError::from)?;
    let lookup: HashMap<EntityId, Entity> = entities.iter().map(|e| (e.id, e.clone())).collect();
    let config = FilterConfig {
        width,
        hashes,
        hash_seed: seed,
    };
    let encoded = encode_all(&entities, &lookup, &config, crate::config::DEFAULT_WORKERS)?;
    Ok(encoded
        .into_iter()
        .map(|e| (e.id, e.attribute.to_bit_string(), e.structural.to_bit_string()))
        .collect())
}

#[pyfunction]
pub fn dice_coefficient(a: &str, b: &str) -> PyResult<f64> {
    let a = BloomFilter::from_bit_string(a, 1, 0)?;
    let b = BloomFilter::from_bit_string(b, 1, 0)?;
    Ok(a.dice(&b)?)
}

#[pyfunction]
pub fn band_and_hash(values: Vec<u32>, band_width: usize) -> PyResult<Vec<u64>> {
    Ok(crate::lsh::bucket::band_and_hash(&Crv { values }, band_width)?)
}

/// Returns `(self_to_other, other_to_self)` index maps.
#[pyfunction]
#[pyo3(signature = (self_bits, other_bits, threshold=0.9))]
pub fn compare_filters(
    self_bits: Vec<String>,
    other_bits: Vec<String>,
    threshold: f64,
) -> PyResult<(BTreeMap<usize, usize>, BTreeMap<usize, usize>)> {
    let mine = parse_filters(&self_bits, 1, 0)?;
    let theirs = parse_filters(&other_bits, 1, 0)?;
    let mine: Vec<&BloomFilter> = mine.iter().collect();
    let theirs: Vec<&BloomFilter> = theirs.iter().collect();
    let matches = dice::compare_filters(&mine, &theirs, threshold)?;
    Ok((matches.self_to_other, matches.other_to_self))
}

/// Ring synchronization; returns `(party, ids)` pairs in ring order.
#[pyfunction]
pub fn synchronize_common_entities(
    parties: Vec<PartyId>,
    links: Vec<BTreeMap<EntityId, EntityId>>,
) -> PyResult<Vec<(PartyId, Vec<EntityId>)>> {
    let chain = MatchChain::new(parties, links)?;
    Ok(chain::synchronize_common_entities(&chain)?.into_iter().collect())
}

/// Run the whole pipeline in-process.
///
/// `parties_json` is a list of `[party, [entity, ...]]`; the result is the
/// serialized resolution.
#[pyfunction]
#[pyo3(signature = (parties_json, space="attribute", config_json=None))]
pub fn resolve(parties_json: &str, space: &str, config_json: Option<&str>) -> PyResult<String> {
    let config = match config_json {
        Some(raw) => serde_json::from_str::<PipelineConfig>(raw).map_err(ErlinkError::from)?,
        None => PipelineConfig::default(),
    }
    .apply_env_overrides();
    let parties: Vec<(PartyId, Vec<Entity>)> =
        serde_json::from_str(parties_json).map_err(ErlinkError::from)?;
    let primitive = KMeans::new(config.clustering.seed);
    let resolution =
        crate::pipeline::resolve_in_memory(&config, &primitive, &parties, parse_space(space)?)?;
    Ok(serde_json::to_string(&resolution).map_err(ErlinkError::from)?)
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[pymodule]
fn erlink_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("DEFAULT_FILTER_WIDTH", crate::config::DEFAULT_FILTER_WIDTH)?;
    m.add("DEFAULT_FILTER_HASHES", crate::config::DEFAULT_FILTER_HASHES)?;
    m.add("DEFAULT_SIMILARITY_THRESHOLD", crate::config::DEFAULT_SIMILARITY_THRESHOLD)?;

    m.add_function(wrap_pyfunction!(encode_filter, m)?)?;
    m.add_function(wrap_pyfunction!(encode_entities, m)?)?;
    m.add_function(wrap_pyfunction!(dice_coefficient, m)?)?;
    m.add_function(wrap_pyfunction!(band_and_hash, m)?)?;
    m.add_function(wrap_pyfunction!(compare_filters, m)?)?;
    m.add_function(wrap_pyfunction!(synchronize_common_entities, m)?)?;
    m.add_function(wrap_pyfunction!(resolve, m)?)?;
    Ok(())
}
