//! Cluster representative vectors (CRVs) via MinHash over filter bit positions.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SignatureConfig;
use crate::encoder::bloom::BloomFilter;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::parallel;

/// Fixed-length MinHash signature summarising one cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crv {
    pub values: Vec<u32>,
}

impl Crv {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fraction of agreeing slots, the MinHash estimate of Jaccard similarity.
    pub fn agreement(&self, other: &Crv) -> f64 {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return 0.0;
        }
        let same = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        same as f64 / self.values.len() as f64
    }
}

/// Holds `L` seeded permutations of the bit positions `[0, width)`.
///
/// Two generators built with the same seed, length and width are
/// interchangeable, which is what lets parties compare CRVs without sharing
/// filters.
#[derive(Clone, Debug)]
pub struct MinHashGenerator {
    width: usize,
    sample_limit: usize,
    seed: u64,
    /// `ranks[p][bit]` is the position of `bit` in permutation `p`.
    ranks: Vec<Vec<u32>>,
}

impl MinHashGenerator {
    pub fn new(length: usize, width: usize, sample_limit: usize, seed: u64) -> ErlinkResult<Self> {
        if length == 0 || width == 0 || sample_limit == 0 {
            return Err(ErlinkError::InvalidArgument(format!(
                "signature length ({length}), width ({width}) and sample limit ({sample_limit}) must be > 0"
            )));
        }
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut ranks = Vec::with_capacity(length);
        for _ in 0..length {
            let mut order: Vec<u32> = (0..width as u32).collect();
            order.shuffle(&mut rng);
            let mut rank = vec![0u32; width];
            for (position, &bit) in order.iter().enumerate() {
                rank[bit as usize] = position as u32;
            }
            ranks.push(rank);
        }
        Ok(Self {
            width,
            sample_limit,
            seed,
            ranks,
        })
    }

    pub fn from_config(config: &SignatureConfig, width: usize) -> ErlinkResult<Self> {
        Self::new(config.length, width, config.sample_limit, config.seed)
    }

    pub fn length(&self) -> usize {
        self.ranks.len()
    }

    /// Signature of a cluster given its member filters.
    ///
    /// Members are put in a canonical order and at most `sample_limit` of them
    /// are drawn with a seeded shuffle, so the result depends only on cluster
    /// content. The sample is OR-ed together and each slot records the rank of
    /// the first set bit under that slot's permutation. An all-zero aggregate
    /// yields `width` in every slot.
    pub fn generate_crv(&self, members: &[&BloomFilter]) -> ErlinkResult<Crv> {
        if members.is_empty() {
            return Err(ErlinkError::Signature("cannot sign an empty cluster".into()));
        }
        if let Some(bad) = members.iter().find(|f| f.width() != self.width) {
            return Err(ErlinkError::InvalidArgument(format!(
                "member filter width {} differs from signature width {}",
                bad.width(),
                self.width
            )));
        }

        let mut ordered: Vec<&BloomFilter> = members.to_vec();
        ordered.sort();
        if ordered.len() > self.sample_limit {
            let mut rng = ChaCha20Rng::seed_from_u64(self.seed ^ ordered.len() as u64);
            ordered.shuffle(&mut rng);
            ordered.truncate(self.sample_limit);
        }

        let mut aggregate = ordered[0].clone();
        for filter in &ordered[1..] {
            aggregate.union_with(filter)?;
        }
        let set_bits: Vec<usize> = aggregate.ones().collect();

        let values = self
            .ranks
            .iter()
            .map(|rank| {
                set_bits
                    .iter()
                    .map(|&bit| rank[bit])
                    .min()
                    .unwrap_or(self.width as u32)
            })
            .collect();
        Ok(Crv { values })
    }

    /// Sign many clusters on a pool of `workers` threads. Order follows input.
    pub fn generate_all(
        &self,
        clusters: &[Vec<&BloomFilter>],
        workers: usize,
    ) -> Vec<ErlinkResult<Crv>> {
        parallel::install(workers, || {
            clusters
                .par_iter()
                .map(|members| self.generate_crv(members))
                .collect()
        })
    }
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
    fn same_seed_same_signature() {
        let a = filter_of(&["John", "Doe", "24"]);
        let b = filter_of(&["Jane", "Dawson", "24"]);
        let g1 = MinHashGenerator::new(100, 256, 50, 7).unwrap();
        let g2 = MinHashGenerator::new(100, 256, 50, 7).unwrap();
        let s1 = g1.generate_crv(&[&a, &b]).unwrap();
        let s2 = g2.generate_crv(&[&a, &b]).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 100);
        assert!(s1.values.iter().all(|&v| v < 256));
    }

    #[test]
    fn member_order_does_not_matter() {
        let a = filter_of(&["John", "Doe"]);
        let b = filter_of(&["Jane"]);
        let c = filter_of(&["Dawson", "31"]);
        let g = MinHashGenerator::new(64, 256, 2, 3).unwrap();
        let s1 = g.generate_crv(&[&a, &b, &c]).unwrap();
        let s2 = g.generate_crv(&[&c, &a, &b]).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn similar_clusters_agree_more_than_dissimilar() {
        let g = MinHashGenerator::new(100, 256, 50, 11).unwrap();
        let base = filter_of(&["John", "Doe", "24", "London", "Engineer"]);
        let near = filter_of(&["John", "Doe", "24", "London", "Teacher"]);
        let far = filter_of(&["Mary", "Smith", "57", "Paris", "Pilot"]);
        let s_base = g.generate_crv(&[&base]).unwrap();
        let s_near = g.generate_crv(&[&near]).unwrap();
        let s_far = g.generate_crv(&[&far]).unwrap();
        assert!(s_base.agreement(&s_near) > s_base.agreement(&s_far));
        assert_eq!(s_base.agreement(&s_base), 1.0);
    }

    #[test]
    fn empty_cluster_fails() {
        let g = MinHashGenerator::new(10, 256, 5, 0).unwrap();
        assert!(matches!(g.generate_crv(&[]), Err(ErlinkError::Signature(_))));
    }

    #[test]
    fn all_zero_cluster_uses_width_sentinel() {
        let g = MinHashGenerator::new(10, 256, 5, 0).unwrap();
        let empty = BloomFilter::new(256, 4).unwrap();
        let s = g.generate_crv(&[&empty]).unwrap();
        assert!(s.values.iter().all(|&v| v == 256));
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let g = MinHashGenerator::new(10, 128, 5, 0).unwrap();
        let f = filter_of(&["John"]);
        assert!(g.generate_crv(&[&f]).is_err());
    }

    #[test]
    fn parallel_generation_keeps_order_and_errors() {
        let g = MinHashGenerator::new(20, 256, 5, 1).unwrap();
        let a = filter_of(&["John"]);
        let b = filter_of(&["Jane"]);
        let clusters = vec![vec![&a], vec![], vec![&b]];
        let out = g.generate_all(&clusters, 2);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), &g.generate_crv(&[&a]).unwrap());
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().unwrap(), &g.generate_crv(&[&b]).unwrap());
    }
}
