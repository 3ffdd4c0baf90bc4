//! Artifact exchange between parties.
//!
//! Real transports live outside this crate. What is fixed here is the
//! envelope: a JSON payload, the sending party, the artifact kind and a CRC32
//! of the payload that the receiver checks before decoding.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::encoder::bloom::BloomFilter;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::lsh::bucket::BucketTable;
use crate::models::{EntityId, FilterSpace, PartyId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Buckets,
    ClusterFilters,
    MatchMap,
}

/// A party's bucket table for one filter space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketAnnouncement {
    pub party: PartyId,
    pub space: FilterSpace,
    pub table: BucketTable,
}

/// The member filters of one cluster, released for a matched candidate pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterFilters {
    pub party: PartyId,
    pub space: FilterSpace,
    pub cluster: usize,
    pub members: Vec<(EntityId, BloomFilter)>,
}

impl ClusterFilters {
    pub fn borrowed(&self) -> Vec<(EntityId, &BloomFilter)> {
        self.members.iter().map(|(id, f)| (*id, f)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: PartyId,
    pub kind: ArtifactKind,
    pub payload: String,
    pub checksum: u32,
}

impl Envelope {
    pub fn seal<T: Serialize>(from: &str, kind: ArtifactKind, artifact: &T) -> ErlinkResult<Self> {
        let payload = serde_json::to_string(artifact)?;
        let checksum = crc32fast::hash(payload.as_bytes());
        Ok(Self {
            from: from.to_string(),
            kind,
            payload,
            checksum,
        })
    }

    pub fn open<T: DeserializeOwned>(&self, expected: ArtifactKind) -> ErlinkResult<T> {
        if self.kind != expected {
            return Err(ErlinkError::Exchange(format!(
                "expected {expected:?} from {}, got {:?}",
                self.from, self.kind
            )));
        }
        let actual = crc32fast::hash(self.payload.as_bytes());
        if actual != self.checksum {
            return Err(ErlinkError::Exchange(format!(
                "checksum mismatch on {:?} from {}: {actual:#010x} != {:#010x}",
                self.kind, self.from, self.checksum
            )));
        }
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Delivery of sealed artifacts between parties.
pub trait Exchange: Send + Sync {
    fn publish(&self, envelope: Envelope) -> ErlinkResult<()>;

    /// Every envelope of `kind`, in publish order.
    fn collect(&self, kind: ArtifactKind) -> Vec<Envelope>;
}

/// Decode every envelope of `kind`; corrupt ones are skipped with a warning.
pub fn collect_artifacts<T: DeserializeOwned>(
    exchange: &dyn Exchange,
    kind: ArtifactKind,
) -> Vec<T> {
    exchange
        .collect(kind)
        .iter()
        .filter_map(|env| match env.open(kind) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!("dropping artifact from {}: {e}", env.from);
                None
            }
        })
        .collect()
}

/// Single-process exchange used when every party runs in one address space.
#[derive(Default)]
pub struct InMemoryExchange {
    envelopes: RwLock<Vec<Envelope>>,
}

impl InMemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.envelopes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.read().is_empty()
    }
}

impl Exchange for InMemoryExchange {
    fn publish(&self, envelope: Envelope) -> ErlinkResult<()> {
        debug!(
            "{} published {:?} ({} bytes)",
            envelope.from,
            envelope.kind,
            envelope.payload.len()
        );
        self.envelopes.write().push(envelope);
        Ok(())
    }

    fn collect(&self, kind: ArtifactKind) -> Vec<Envelope> {
        self.envelopes
            .read()
            .iter()
            .filter(|env| env.kind == kind)
            .cloned()
            .collect()
    }
}
