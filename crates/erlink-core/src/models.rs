//! Shared typed models used across encoding, clustering, bucketing and
//! matching stages.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity identifier, unique within one party.
pub type EntityId = u64;

/// Party identifier as agreed by all participants (e.g. `"A"`).
pub type PartyId = String;

/// Identifier of one LSH bucket (hash of one signature band).
pub type BucketId = u64;

// ---------------------------------------------------------------------------
// 1. Entity
// ---------------------------------------------------------------------------

/// One private record: ordered attributes plus neighbor links.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub attributes: Vec<String>,
    #[serde(default)]
    pub neighbors: Vec<EntityId>,
}

impl Entity {
    pub fn new(id: EntityId, attributes: Vec<String>, neighbors: Vec<EntityId>) -> Self {
        Self {
            id,
            attributes,
            neighbors,
        }
    }

    /// The canonical "name" field used as the structural proxy of this
    /// entity when it appears as someone else's neighbor.
    pub fn first_attribute(&self) -> Option<&str> {
        self.attributes.first().map(String::as_str)
    }
}

/// Lookup used by the structural encoder to resolve neighbor ids.
pub trait NeighborLookup {
    fn first_attribute_of(&self, id: EntityId) -> Option<&str>;
}

impl NeighborLookup for HashMap<EntityId, Entity> {
    fn first_attribute_of(&self, id: EntityId) -> Option<&str> {
        self.get(&id).and_then(Entity::first_attribute)
    }
}

impl NeighborLookup for BTreeMap<EntityId, Entity> {
    fn first_attribute_of(&self, id: EntityId) -> Option<&str> {
        self.get(&id).and_then(Entity::first_attribute)
    }
}

// ---------------------------------------------------------------------------
// 2. FilterSpace
// ---------------------------------------------------------------------------

/// The two independent filter spaces each entity is encoded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSpace {
    Attribute,
    Structural,
}

impl FilterSpace {
    pub const ALL: [FilterSpace; 2] = [FilterSpace::Attribute, FilterSpace::Structural];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterSpace::Attribute => "attribute",
            FilterSpace::Structural => "structural",
        }
    }
}

impl fmt::Display for FilterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// 3. ClusterTag
// ---------------------------------------------------------------------------

/// A `(party, cluster-index)` pair attached to every bucket entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterTag {
    pub party: PartyId,
    pub cluster: usize,
}

impl ClusterTag {
    pub fn new(party: impl Into<PartyId>, cluster: usize) -> Self {
        Self {
            party: party.into(),
            cluster,
        }
    }
}

impl fmt::Display for ClusterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.party, self.cluster)
    }
}

// ---------------------------------------------------------------------------
// 4. Diagnostic
// ---------------------------------------------------------------------------

/// Recoverable conditions observed during a run.
///
/// None of these abort a multi-party run; they are surfaced so the caller can
/// decide whether to retry a stage or re-request a party's artifacts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    MissingNeighbor {
        entity: EntityId,
        neighbor: EntityId,
    },
    ClusteringFailed {
        space: FilterSpace,
        reason: String,
    },
    EmptyCluster {
        space: FilterSpace,
        cluster: usize,
    },
    NoMatches {
        self_party: PartyId,
        other_party: PartyId,
        self_cluster: usize,
        other_cluster: usize,
    },
    MissingClusterFilters {
        party: PartyId,
        cluster: usize,
    },
    ChainBreak {
        party: PartyId,
        entity: EntityId,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingNeighbor { entity, neighbor } => {
                write!(f, "entity {entity}: neighbor {neighbor} has no record")
            }
            Diagnostic::ClusteringFailed { space, reason } => {
                write!(f, "{space} clustering failed: {reason}")
            }
            Diagnostic::EmptyCluster { space, cluster } => {
                write!(f, "{space} cluster {cluster} has no members")
            }
            Diagnostic::NoMatches {
                self_party,
                other_party,
                self_cluster,
                other_cluster,
            } => write!(
                f,
                "no match above threshold between {self_party}{self_cluster} and {other_party}{other_cluster}"
            ),
            Diagnostic::MissingClusterFilters { party, cluster } => {
                write!(f, "filters of cluster {party}{cluster} are unavailable")
            }
            Diagnostic::ChainBreak { party, entity } => {
                write!(f, "chain broken at party {party} for entity {entity}")
            }
        }
    }
}
