//! Per-entity attribute and structural encoding with Rayon-based parallelism.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FilterConfig;
use crate::encoder::bloom::BloomFilter;
use crate::errors::ErlinkResult;
use crate::models::{Diagnostic, Entity, EntityId, FilterSpace, NeighborLookup};
use crate::parallel;

/// The two filters built for one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncodedEntity {
    pub id: EntityId,
    pub attribute: BloomFilter,
    pub structural: BloomFilter,
    /// Neighbor ids with no record (or no attributes); they contributed nothing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_neighbors: Vec<EntityId>,
}

impl EncodedEntity {
    pub fn filter(&self, space: FilterSpace) -> &BloomFilter {
        match space {
            FilterSpace::Attribute => &self.attribute,
            FilterSpace::Structural => &self.structural,
        }
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = Diagnostic> + '_ {
        self.missing_neighbors
            .iter()
            .map(move |&neighbor| Diagnostic::MissingNeighbor {
                entity: self.id,
                neighbor,
            })
    }
}

/// Encode one entity into its attribute and structural filters.
///
/// Every attribute goes into the attribute filter. For each neighbor, the
/// neighbor's first attribute goes into the structural filter; neighbors that
/// cannot be resolved are skipped and reported.
pub fn encode_entity<L: NeighborLookup + ?Sized>(
    entity: &Entity,
    neighbors: &L,
    config: &FilterConfig,
) -> ErlinkResult<EncodedEntity> {
    let mut attribute = BloomFilter::with_seed(config.width, config.hashes, config.hash_seed)?;
    for attr in &entity.attributes {
        attribute.insert(attr);
    }

    let mut structural = BloomFilter::with_seed(config.width, config.hashes, config.hash_seed)?;
    let mut missing_neighbors = Vec::new();
    for &neighbor in &entity.neighbors {
        match neighbors.first_attribute_of(neighbor) {
            Some(name) => structural.insert(name),
            None => missing_neighbors.push(neighbor),
        }
    }

    Ok(EncodedEntity {
        id: entity.id,
        attribute,
        structural,
        missing_neighbors,
    })
}

/// Encode a whole party's entities on a pool of `workers` threads.
///
/// Output order follows input order.
pub fn encode_all<L: NeighborLookup + Sync + ?Sized>(
    entities: &[Entity],
    neighbors: &L,
    config: &FilterConfig,
    workers: usize,
) -> ErlinkResult<Vec<EncodedEntity>> {
    if entities.is_empty() {
        return Ok(vec![]);
    }

    let encoded: ErlinkResult<Vec<EncodedEntity>> = parallel::install(workers, || {
        entities
            .par_iter()
            .map(|e| encode_entity(e, neighbors, config))
            .collect()
    });
    let encoded = encoded?;

    let missing: usize = encoded.iter().map(|e| e.missing_neighbors.len()).sum();
    if missing > 0 {
        warn!("{missing} neighbor links had no matching record and were skipped");
    }
    debug!(
        "encoded {} entities into {}-bit filters",
        encoded.len(),
        config.width
    );
    Ok(encoded)
}
