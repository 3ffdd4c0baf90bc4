//! Seeded k-means, the default clustering primitive.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::cluster::{ClusterPrimitive, Partition};
use crate::errors::{ErlinkError, ErlinkResult};

/// Lloyd's k-means with spread-out seeded initialisation.
///
/// The same seed, input order and iteration budget always produce the same
/// partition.
#[derive(Clone, Debug)]
pub struct KMeans {
    seed: u64,
}

impl KMeans {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Fit `k` means from scratch.
    pub fn fit(&self, data: &[Vec<f32>], k: usize, iterations: usize) -> ErlinkResult<Partition> {
        check_input(data, k)?;
        let means = self.spread_init(data, k);
        Ok(lloyd(data, means, iterations))
    }

    /// Continue from existing means instead of reseeding.
    pub fn fit_from(
        &self,
        data: &[Vec<f32>],
        means: Vec<Vec<f32>>,
        iterations: usize,
    ) -> ErlinkResult<Partition> {
        check_input(data, means.len())?;
        let dim = data[0].len();
        if means.iter().any(|m| m.len() != dim) {
            return Err(ErlinkError::Clustering(
                "existing means do not match data dimension".into(),
            ));
        }
        Ok(lloyd(data, means, iterations))
    }

    /// k-means++ style seeding: each next mean is drawn with probability
    /// proportional to its squared distance from the closest chosen mean.
    fn spread_init(&self, data: &[Vec<f32>], k: usize) -> Vec<Vec<f32>> {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        let mut chosen: Vec<usize> = vec![rng.gen_range(0..data.len())];

        while chosen.len() < k {
            let weights: Vec<f64> = data
                .iter()
                .map(|point| {
                    chosen
                        .iter()
                        .map(|&c| squared_distance(point, &data[c]))
                        .fold(f64::INFINITY, f64::min)
                })
                .collect();
            let total: f64 = weights.iter().sum();

            let next = if total <= 0.0 {
                // Every remaining point duplicates a chosen one.
                (0..data.len()).find(|i| !chosen.contains(i)).unwrap_or(0)
            } else {
                let mut target = rng.gen::<f64>() * total;
                let mut pick = data.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    if *w <= 0.0 {
                        continue;
                    }
                    if target < *w {
                        pick = i;
                        break;
                    }
                    target -= w;
                }
                pick
            };
            chosen.push(next);
        }

        chosen.into_iter().map(|i| data[i].clone()).collect()
    }
}

impl ClusterPrimitive for KMeans {
    fn partition(
        &self,
        vectors: &[Vec<f32>],
        k: usize,
        iterations: usize,
    ) -> ErlinkResult<Partition> {
        self.fit(vectors, k, iterations)
    }
}

fn check_input(data: &[Vec<f32>], k: usize) -> ErlinkResult<()> {
    if k == 0 {
        return Err(ErlinkError::InvalidArgument("cluster count k must be > 0".into()));
    }
    if data.is_empty() {
        return Err(ErlinkError::Clustering("no vectors to cluster".into()));
    }
    if k > data.len() {
        return Err(ErlinkError::Clustering(format!(
            "cannot form {k} clusters from {} vectors",
            data.len()
        )));
    }
    let dim = data[0].len();
    if dim == 0 || data.iter().any(|v| v.len() != dim) {
        return Err(ErlinkError::Clustering("vectors have inconsistent dimensions".into()));
    }
    Ok(())
}

fn lloyd(data: &[Vec<f32>], mut means: Vec<Vec<f32>>, iterations: usize) -> Partition {
    let dim = data[0].len();
    let mut labels: Vec<usize> = data.iter().map(|p| nearest(p, &means)).collect();

    for _ in 0..iterations {
        let mut sums = vec![vec![0f64; dim]; means.len()];
        let mut counts = vec![0usize; means.len()];
        for (point, &label) in data.iter().zip(&labels) {
            counts[label] += 1;
            for (acc, &x) in sums[label].iter_mut().zip(point) {
                *acc += x as f64;
            }
        }
        for (g, mean) in means.iter_mut().enumerate() {
            // An empty cluster keeps its previous mean.
            if counts[g] == 0 {
                continue;
            }
            for (m, s) in mean.iter_mut().zip(&sums[g]) {
                *m = (*s / counts[g] as f64) as f32;
            }
        }

        let next: Vec<usize> = data.iter().map(|p| nearest(p, &means)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    Partition {
        labels,
        centroids: means,
    }
}

/// Index of the closest mean; the lowest index wins ties.
pub(crate) fn nearest(point: &[f32], means: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (g, mean) in means.iter().enumerate() {
        let dist = squared_distance(point, mean);
        if dist < best_dist {
            best_dist = dist;
            best = g;
        }
    }
    best
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum()
}
