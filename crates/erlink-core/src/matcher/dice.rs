//! Filter-level matching of candidate cluster pairs by Dice coefficient.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoder::bloom::BloomFilter;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::models::{EntityId, PartyId};

/// Index-level result of [`compare_filters`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexMatches {
    pub self_to_other: BTreeMap<usize, usize>,
    pub other_to_self: BTreeMap<usize, usize>,
    /// Dice score of each recorded `self_to_other` entry.
    pub scores: BTreeMap<usize, f64>,
}

impl IndexMatches {
    pub fn is_empty(&self) -> bool {
        self.self_to_other.is_empty()
    }
}

/// For each self filter, pick the other filter with the highest Dice
/// coefficient and record the pair if it scores strictly above `threshold`.
///
/// The first index reaching the maximum wins. Several self filters may pick
/// the same other filter; the inverse map then keeps the best-scoring source
/// (lowest index on ties).
pub fn compare_filters(
    self_filters: &[&BloomFilter],
    other_filters: &[&BloomFilter],
    threshold: f64,
) -> ErlinkResult<IndexMatches> {
    let mut result = IndexMatches::default();
    let Some(first) = self_filters.first().or(other_filters.first()) else {
        return Ok(result);
    };
    let width = first.width();
    if self_filters
        .iter()
        .chain(other_filters)
        .any(|f| f.width() != width)
    {
        return Err(ErlinkError::InvalidArgument(
            "filters of a candidate pair must share one width".into(),
        ));
    }

    let other_counts: Vec<usize> = other_filters.iter().map(|f| f.count_ones()).collect();
    let mut inverse_scores: BTreeMap<usize, f64> = BTreeMap::new();

    for (i, mine) in self_filters.iter().enumerate() {
        let my_count = mine.count_ones();
        let mut best: Option<(usize, f64)> = None;
        for (j, theirs) in other_filters.iter().enumerate() {
            let denominator = my_count + other_counts[j];
            let score = if denominator == 0 {
                0.0
            } else {
                2.0 * mine.intersection_count(theirs)? as f64 / denominator as f64
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((j, score));
            }
        }

        let Some((j, score)) = best else { continue };
        if score > threshold {
            result.self_to_other.insert(i, j);
            result.scores.insert(i, score);
            if inverse_scores.get(&j).map_or(true, |&s| score > s) {
                inverse_scores.insert(j, score);
                result.other_to_self.insert(j, i);
            }
        }
    }

    Ok(result)
}

/// Entity-level matches between one party (`self`) and another.
///
/// `self_to_other` holds at most one entry per self entity. The map is not a
/// bijection: several self entities may point at the same other entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairwiseMatchMap {
    pub self_party: PartyId,
    pub other_party: PartyId,
    pub self_to_other: BTreeMap<EntityId, EntityId>,
    pub other_to_self: BTreeMap<EntityId, EntityId>,
    scores: BTreeMap<EntityId, f64>,
}

impl PairwiseMatchMap {
    pub fn new(self_party: impl Into<PartyId>, other_party: impl Into<PartyId>) -> Self {
        Self {
            self_party: self_party.into(),
            other_party: other_party.into(),
            self_to_other: BTreeMap::new(),
            other_to_self: BTreeMap::new(),
            scores: BTreeMap::new(),
        }
    }

    /// Record a match; an existing entry for `self_id` is kept unless
    /// `score` is strictly higher.
    pub fn record(&mut self, self_id: EntityId, other_id: EntityId, score: f64) {
        if self.scores.get(&self_id).is_some_and(|&s| s >= score) {
            return;
        }
        self.self_to_other.insert(self_id, other_id);
        self.scores.insert(self_id, score);
        self.rebuild_inverse();
    }

    pub fn score(&self, self_id: EntityId) -> Option<f64> {
        self.scores.get(&self_id).copied()
    }

    pub fn len(&self) -> usize {
        self.self_to_other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.self_to_other.is_empty()
    }

    /// Merge matches found in another candidate cluster pair of the same
    /// two parties. The higher score wins a conflict.
    pub fn combine(&mut self, other: &PairwiseMatchMap) -> ErlinkResult<()> {
        if self.self_party != other.self_party || self.other_party != other.other_party {
            return Err(ErlinkError::InvalidArgument(format!(
                "cannot combine {}->{} with {}->{}",
                self.self_party, self.other_party, other.self_party, other.other_party
            )));
        }
        for (&self_id, &other_id) in &other.self_to_other {
            let score = other.scores.get(&self_id).copied().unwrap_or(0.0);
            if self.scores.get(&self_id).is_some_and(|&s| s >= score) {
                continue;
            }
            self.self_to_other.insert(self_id, other_id);
            self.scores.insert(self_id, score);
        }
        self.rebuild_inverse();
        Ok(())
    }

    /// The same matches seen from the other party.
    ///
    /// Only the inverse entries survive, so a many-to-one collapse loses
    /// the weaker sources.
    pub fn reversed(&self) -> PairwiseMatchMap {
        let mut flipped = PairwiseMatchMap::new(self.other_party.clone(), self.self_party.clone());
        for (&other_id, &self_id) in &self.other_to_self {
            let score = self.scores.get(&self_id).copied().unwrap_or(0.0);
            flipped.self_to_other.insert(other_id, self_id);
            flipped.scores.insert(other_id, score);
        }
        flipped.rebuild_inverse();
        flipped
    }

    fn rebuild_inverse(&mut self) {
        let mut best: BTreeMap<EntityId, (EntityId, f64)> = BTreeMap::new();
        for (&self_id, &other_id) in &self.self_to_other {
            let score = self.scores.get(&self_id).copied().unwrap_or(0.0);
            if best.get(&other_id).map_or(true, |&(_, s)| score > s) {
                best.insert(other_id, (self_id, score));
            }
        }
        self.other_to_self = best.into_iter().map(|(o, (s, _))| (o, s)).collect();
    }
}

/// Compare the member filters of one candidate cluster pair and translate the
/// index-level matches to entity ids.
pub fn match_clusters(
    self_party: &str,
    other_party: &str,
    self_members: &[(EntityId, &BloomFilter)],
    other_members: &[(EntityId, &BloomFilter)],
    threshold: f64,
) -> ErlinkResult<PairwiseMatchMap> {
    let self_filters: Vec<&BloomFilter> = self_members.iter().map(|(_, f)| *f).collect();
    let other_filters: Vec<&BloomFilter> = other_members.iter().map(|(_, f)| *f).collect();
    let matches = compare_filters(&self_filters, &other_filters, threshold)?;

    let mut map = PairwiseMatchMap::new(self_party, other_party);
    for (&i, &j) in &matches.self_to_other {
        let score = matches.scores.get(&i).copied().unwrap_or(0.0);
        map.self_to_other.insert(self_members[i].0, other_members[j].0);
        map.scores.insert(self_members[i].0, score);
    }
    map.rebuild_inverse();
    debug!(
        "{self_party}->{other_party}: {} of {} filters matched above {threshold}",
        map.len(),
        self_members.len()
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_of(values: &[&str]) -> BloomFilter {
        let mut f = BloomFilter::new(256, 4).unwrap();
        for v in values {
            f.insert(v);
        }
        f
    }

    #[test]
    fn identical_filters_match_each_other() {
        let a = filter_of(&["John", "Doe", "24"]);
        let b = filter_of(&["Jane", "Dawson", "24"]);
        let a2 = a.clone();
        let b2 = b.clone();
        let m = compare_filters(&[&a, &b], &[&b2, &a2], 0.9).unwrap();
        assert_eq!(m.self_to_other, BTreeMap::from([(0, 1), (1, 0)]));
        assert_eq!(m.other_to_self, BTreeMap::from([(1, 0), (0, 1)]));
        assert_eq!(m.scores[&0], 1.0);
    }

    #[test]
    fn weak_overlap_stays_below_threshold() {
        let a = filter_of(&["John", "Doe", "24"]);
        let b = filter_of(&["Jane", "Dawson", "24"]);
        let m = compare_filters(&[&a], &[&b], 0.9).unwrap();
        assert!(m.is_empty());
        assert!(m.other_to_self.is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let a = filter_of(&["John"]);
        let m = compare_filters(&[&a], &[&a], 1.0).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn ties_pick_first_index() {
        let a = filter_of(&["John", "Doe"]);
        let m = compare_filters(&[&a], &[&a, &a], 0.5).unwrap();
        assert_eq!(m.self_to_other[&0], 0);
    }

    #[test]
    fn many_to_one_keeps_best_inverse() {
        let target = filter_of(&["John", "Doe", "24", "London"]);
        let close = filter_of(&["John", "Doe", "24", "London"]);
        let closer_but_less = filter_of(&["John", "Doe", "24"]);
        let m = compare_filters(&[&closer_but_less, &close], &[&target], 0.5).unwrap();
        assert_eq!(m.self_to_other.len(), 2);
        assert_eq!(m.other_to_self[&0], 1);
    }

    #[test]
    fn empty_inputs_and_width_mismatch() {
        assert!(compare_filters(&[], &[], 0.9).unwrap().is_empty());
        let a = filter_of(&["John"]);
        assert!(compare_filters(&[&a], &[], 0.9).unwrap().is_empty());
        let narrow = BloomFilter::new(64, 4).unwrap();
        assert!(compare_filters(&[&a], &[&narrow], 0.9).is_err());
    }

    #[test]
    fn cluster_match_uses_entity_ids() {
        let a = filter_of(&["John", "Doe", "24"]);
        let b = filter_of(&["Jane", "Dawson", "24"]);
        let map = match_clusters("A", "B", &[(1, &a), (2, &b)], &[(11, &b), (10, &a)], 0.9)
            .unwrap();
        assert_eq!(map.self_to_other, BTreeMap::from([(1, 10), (2, 11)]));
        assert_eq!(map.other_to_self, BTreeMap::from([(10, 1), (11, 2)]));
        assert_eq!(map.score(1), Some(1.0));
    }

    #[test]
    fn combine_prefers_higher_scores() {
        let mut left = PairwiseMatchMap::new("A", "B");
        left.record(1, 10, 0.92);
        let mut right = PairwiseMatchMap::new("A", "B");
        right.record(1, 12, 0.97);
        right.record(2, 11, 0.95);
        left.combine(&right).unwrap();
        assert_eq!(left.self_to_other, BTreeMap::from([(1, 12), (2, 11)]));
        assert_eq!(left.other_to_self, BTreeMap::from([(11, 2), (12, 1)]));

        let wrong = PairwiseMatchMap::new("A", "C");
        assert!(left.combine(&wrong).is_err());
    }

    #[test]
    fn reversed_swaps_direction() {
        let mut map = PairwiseMatchMap::new("A", "B");
        map.record(1, 10, 0.95);
        map.record(2, 10, 0.99);
        let back = map.reversed();
        assert_eq!(back.self_party, "B");
        assert_eq!(back.self_to_other, BTreeMap::from([(10, 2)]));
        assert_eq!(back.other_to_self, BTreeMap::from([(2, 10)]));
    }
}
