//! LSH banding of CRVs, bucket tables, cross-party merge and quorum filtering.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::{ErlinkError, ErlinkResult};
use crate::models::{BucketId, ClusterTag, PartyId};
use crate::signature::minhash::Crv;

// ---------------------------------------------------------------------------
// Banding
// ---------------------------------------------------------------------------

/// Contiguous, non-overlapping bands of `band_width` positions. A trailing
/// short band is kept.
pub fn band_ranges(length: usize, band_width: usize) -> ErlinkResult<Vec<Range<usize>>> {
    if band_width == 0 {
        return Err(ErlinkError::InvalidArgument("band width must be > 0".into()));
    }
    Ok((0..length)
        .step_by(band_width)
        .map(|start| start..(start + band_width).min(length))
        .collect())
}

/// `"{band}:{v1},{v2},..."`; the band index keeps equal values in different
/// bands apart and the separator keeps `1,23` distinct from `12,3`.
fn canonical_band(band: usize, values: &[u32]) -> String {
    let joined: Vec<String> = values.iter().map(u32::to_string).collect();
    format!("{band}:{}", joined.join(","))
}

/// Bucket id of a canonical band string: the first 8 bytes of its SHA-256.
pub fn hash_band(canonical: &str) -> BucketId {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// One bucket id per band of `signature`.
pub fn band_and_hash(signature: &Crv, band_width: usize) -> ErlinkResult<Vec<BucketId>> {
    Ok(band_ranges(signature.len(), band_width)?
        .into_iter()
        .enumerate()
        .map(|(band, range)| hash_band(&canonical_band(band, &signature.values[range])))
        .collect())
}

// ---------------------------------------------------------------------------
// Local bucket tables
// ---------------------------------------------------------------------------

/// Bucket id -> cluster tags, as built by one party (or one worker).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTable {
    buckets: BTreeMap<BucketId, BTreeSet<ClusterTag>>,
}

impl BucketTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Band `signature` and tag each of its buckets with `tag`.
    pub fn insert_signature(
        &mut self,
        tag: &ClusterTag,
        signature: &Crv,
        band_width: usize,
    ) -> ErlinkResult<()> {
        for bucket in band_and_hash(signature, band_width)? {
            self.buckets.entry(bucket).or_default().insert(tag.clone());
        }
        Ok(())
    }

    /// Table for all CRVs of one party, keyed by cluster index.
    pub fn from_signatures(
        party: &str,
        signatures: &BTreeMap<usize, Crv>,
        band_width: usize,
    ) -> ErlinkResult<Self> {
        let mut table = Self::new();
        for (&cluster, crv) in signatures {
            table.insert_signature(&ClusterTag::new(party, cluster), crv, band_width)?;
        }
        Ok(table)
    }

    pub fn get(&self, bucket: BucketId) -> Option<&BTreeSet<ClusterTag>> {
        self.buckets.get(&bucket)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BucketId, &BTreeSet<ClusterTag>)> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Union the tables built by several workers of the same party.
pub fn merge_local_tables(tables: &[BucketTable]) -> BucketTable {
    let mut combined = BucketTable::new();
    for table in tables {
        for (&bucket, tags) in &table.buckets {
            combined
                .buckets
                .entry(bucket)
                .or_default()
                .extend(tags.iter().cloned());
        }
    }
    combined
}

// ---------------------------------------------------------------------------
// Cross-party merge
// ---------------------------------------------------------------------------

/// Bucket id -> party -> cluster indices, across every party's table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedBuckets {
    buckets: BTreeMap<BucketId, BTreeMap<PartyId, BTreeSet<usize>>>,
}

impl MergedBuckets {
    pub fn get(&self, bucket: BucketId) -> Option<&BTreeMap<PartyId, BTreeSet<usize>>> {
        self.buckets.get(&bucket)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Every party that contributed at least one tag.
    pub fn parties(&self) -> BTreeSet<PartyId> {
        self.buckets
            .values()
            .flat_map(|by_party| by_party.keys().cloned())
            .collect()
    }
}

/// Set union of all tables keyed by bucket id. A party with no entry for a
/// bucket simply contributes nothing to it.
pub fn merge_buckets<'a, I>(tables: I) -> MergedBuckets
where
    I: IntoIterator<Item = &'a BucketTable>,
{
    let mut merged = MergedBuckets::default();
    for table in tables {
        for (&bucket, tags) in &table.buckets {
            let by_party = merged.buckets.entry(bucket).or_default();
            for tag in tags {
                by_party
                    .entry(tag.party.clone())
                    .or_default()
                    .insert(tag.cluster);
            }
        }
    }
    debug!("merged bucket tables into {} buckets", merged.len());
    merged
}

// ---------------------------------------------------------------------------
// Candidate filtering
// ---------------------------------------------------------------------------

/// A bucket shared by enough distinct parties to be worth comparing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateBucket {
    pub bucket: BucketId,
    pub clusters: BTreeMap<PartyId, BTreeSet<usize>>,
}

/// Keep buckets whose distinct-party count is at least `quorum`.
pub fn candidate_buckets(
    merged: &MergedBuckets,
    quorum: usize,
) -> ErlinkResult<Vec<CandidateBucket>> {
    if quorum == 0 {
        return Err(ErlinkError::InvalidArgument("quorum must be > 0".into()));
    }
    let candidates: Vec<CandidateBucket> = merged
        .buckets
        .iter()
        .filter(|(_, by_party)| by_party.len() >= quorum)
        .map(|(&bucket, by_party)| CandidateBucket {
            bucket,
            clusters: by_party.clone(),
        })
        .collect();
    debug!(
        "{} of {} buckets reach a quorum of {quorum}",
        candidates.len(),
        merged.len()
    );
    Ok(candidates)
}

/// Distinct `(self cluster, other cluster)` pairs that share a candidate bucket.
pub fn candidate_cluster_pairs(
    candidates: &[CandidateBucket],
    self_party: &str,
    other_party: &str,
) -> BTreeSet<(usize, usize)> {
    let mut pairs = BTreeSet::new();
    for candidate in candidates {
        let (Some(mine), Some(theirs)) = (
            candidate.clusters.get(self_party),
            candidate.clusters.get(other_party),
        ) else {
            continue;
        };
        for &a in mine {
            for &b in theirs {
                pairs.insert((a, b));
            }
        }
    }
    pairs
}
