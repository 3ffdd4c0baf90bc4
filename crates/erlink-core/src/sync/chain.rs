//! Ring synchronization of pairwise match maps into globally common entities.
//!
//! Parties form a ring `P0 -> P1 -> ... -> Pn-1 -> P0`; link `i` maps ids of
//! `Pi` to ids of `P(i+1 mod n)`. A forward sweep visits every party once and
//! keeps the `P0` ids whose matches survive the whole ring. A second sweep
//! walks the survivors around again and records each party's id for them, so
//! position `t` of every party's list names the same entity.

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ErlinkError, ErlinkResult};
use crate::matcher::dice::PairwiseMatchMap;
use crate::models::{Diagnostic, EntityId, PartyId};

/// Party -> ordered ids of the entities every party recognises.
pub type GlobalCommonEntityMap = IndexMap<PartyId, Vec<EntityId>>;

/// A fixed traversal order plus one self->next link per party.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchChain {
    parties: Vec<PartyId>,
    links: Vec<BTreeMap<EntityId, EntityId>>,
}

impl MatchChain {
    pub fn new(
        parties: Vec<PartyId>,
        links: Vec<BTreeMap<EntityId, EntityId>>,
    ) -> ErlinkResult<Self> {
        if parties.len() != links.len() {
            return Err(ErlinkError::InvalidArgument(format!(
                "{} parties but {} links",
                parties.len(),
                links.len()
            )));
        }
        Ok(Self { parties, links })
    }

    /// Build the ring for `order` out of whatever pairwise maps are available.
    ///
    /// A link `Pi -> Pi+1` comes from a map with that direction, or failing
    /// that from the inverse half of a map computed the other way round.
    /// Links with no map are left empty.
    pub fn from_maps(order: &[PartyId], maps: &[PairwiseMatchMap]) -> Self {
        let n = order.len();
        let links = (0..n)
            .map(|i| {
                let me = &order[i];
                let next = &order[(i + 1) % n];
                if let Some(m) = maps
                    .iter()
                    .find(|m| &m.self_party == me && &m.other_party == next)
                {
                    return m.self_to_other.clone();
                }
                if let Some(m) = maps
                    .iter()
                    .find(|m| &m.self_party == next && &m.other_party == me)
                {
                    return m.other_to_self.clone();
                }
                BTreeMap::new()
            })
            .collect();
        Self {
            parties: order.to_vec(),
            links,
        }
    }

    pub fn parties(&self) -> &[PartyId] {
        &self.parties
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }
}

/// Result of a synchronization run plus every chain break seen on the way.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSync {
    pub common: GlobalCommonEntityMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run both sweeps over `chain`.
///
/// An empty chain is a precondition violation. A single party, or any empty
/// link, yields an empty result.
pub fn synchronize(chain: &MatchChain) -> ErlinkResult<ChainSync> {
    let n = chain.len();
    if n == 0 {
        return Err(ErlinkError::InvalidArgument("chain has no parties".into()));
    }
    let mut outcome = ChainSync::default();
    if n < 2 {
        debug!("chain of one party has no common entities");
        return Ok(outcome);
    }
    if let Some(i) = chain.links.iter().position(BTreeMap::is_empty) {
        warn!(
            "party {} has no matches toward {}; nothing is common",
            chain.parties[i],
            chain.parties[(i + 1) % n]
        );
        return Ok(outcome);
    }

    // Forward sweep: carry P0's ids once around the ring.
    let mut ids: Vec<EntityId> = chain.links[0].keys().copied().collect();
    for (hop, link) in chain.links.iter().enumerate() {
        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(ids.len());
        for id in ids {
            match link.get(&id) {
                Some(&mapped) => {
                    if seen.insert(mapped) {
                        next.push(mapped);
                    }
                }
                None => outcome.diagnostics.push(Diagnostic::ChainBreak {
                    party: chain.parties[hop].clone(),
                    entity: id,
                }),
            }
        }
        ids = next;
    }

    // Second sweep: record every party's id for each survivor. A survivor
    // whose walk breaks or does not close back on itself is dropped from all
    // parties together.
    let mut rows: Vec<Vec<EntityId>> = Vec::with_capacity(ids.len());
    'survivors: for start in ids {
        let mut row = Vec::with_capacity(n);
        let mut current = start;
        for (hop, link) in chain.links.iter().enumerate() {
            row.push(current);
            match link.get(&current) {
                Some(&mapped) => current = mapped,
                None => {
                    outcome.diagnostics.push(Diagnostic::ChainBreak {
                        party: chain.parties[hop].clone(),
                        entity: current,
                    });
                    continue 'survivors;
                }
            }
        }
        if current != start {
            outcome.diagnostics.push(Diagnostic::ChainBreak {
                party: chain.parties[n - 1].clone(),
                entity: row[n - 1],
            });
            continue;
        }
        rows.push(row);
    }

    if !rows.is_empty() {
        for (i, party) in chain.parties.iter().enumerate() {
            outcome
                .common
                .insert(party.clone(), rows.iter().map(|row| row[i]).collect());
        }
    }
    info!(
        "{} entities common to all {n} parties ({} chain breaks)",
        rows.len(),
        outcome.diagnostics.len()
    );
    Ok(outcome)
}

/// [`synchronize`] without the diagnostics.
pub fn synchronize_common_entities(chain: &MatchChain) -> ErlinkResult<GlobalCommonEntityMap> {
    Ok(synchronize(chain)?.common)
}
