//! Cluster indexing of per-entity filters behind an opaque clustering primitive.

pub mod kmeans;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::encoder::entity::EncodedEntity;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::models::{EntityId, FilterSpace};

pub use kmeans::KMeans;

/// Raw output of a clustering primitive, indexed by input position.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f32>>,
}

/// Any partition-based clustering over numeric vectors.
///
/// Implementations must return exactly `k` centroids and one label in
/// `[0, k)` per input vector, or an error. They are never asked for `k == 0`.
pub trait ClusterPrimitive: Send + Sync {
    fn partition(&self, vectors: &[Vec<f32>], k: usize, iterations: usize)
        -> ErlinkResult<Partition>;
}

/// Entity-to-cluster mapping plus the centroid matrix of one clustering run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub space: FilterSpace,
    assignments: BTreeMap<EntityId, usize>,
    centroids: Vec<Vec<f32>>,
}

impl ClusterAssignment {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    pub fn cluster_of(&self, entity: EntityId) -> Option<usize> {
        self.assignments.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Member ids of every cluster, indexed by cluster; empty clusters included.
    pub fn members(&self) -> Vec<Vec<EntityId>> {
        let mut groups = vec![Vec::new(); self.k()];
        for (&entity, &cluster) in &self.assignments {
            groups[cluster].push(entity);
        }
        groups
    }

    /// Nearest centroid for a vector that was not part of the clustering run.
    pub fn predict(&self, vector: &[f32]) -> ErlinkResult<usize> {
        if self.centroids.first().map(Vec::len) != Some(vector.len()) {
            return Err(ErlinkError::InvalidArgument(format!(
                "vector of length {} does not match centroid dimension",
                vector.len()
            )));
        }
        Ok(kmeans::nearest(vector, &self.centroids))
    }
}

/// Partition the filters of one space into `k` clusters.
///
/// `k == 0` is a precondition violation; anything the primitive reports, or
/// an inconsistent partition, comes back as a recoverable
/// [`ErlinkError::Clustering`].
pub fn cluster_space(
    encoded: &[EncodedEntity],
    space: FilterSpace,
    primitive: &dyn ClusterPrimitive,
    k: usize,
    iterations: usize,
) -> ErlinkResult<ClusterAssignment> {
    if k == 0 {
        return Err(ErlinkError::InvalidArgument("cluster count k must be > 0".into()));
    }
    if encoded.is_empty() {
        return Err(ErlinkError::Clustering(format!("no {space} filters to cluster")));
    }

    let vectors: Vec<Vec<f32>> = encoded.iter().map(|e| e.filter(space).to_vector()).collect();
    debug!("clustering {} {space} filters into {k} groups", vectors.len());

    let partition = primitive.partition(&vectors, k, iterations).inspect_err(|e| {
        warn!("{space} clustering failed: {e}");
    })?;

    if partition.labels.len() != encoded.len() {
        return Err(ErlinkError::Clustering(format!(
            "primitive labelled {} of {} vectors",
            partition.labels.len(),
            encoded.len()
        )));
    }
    if partition.centroids.len() != k {
        return Err(ErlinkError::Clustering(format!(
            "primitive returned {} centroids, expected {k}",
            partition.centroids.len()
        )));
    }
    if let Some(bad) = partition.labels.iter().find(|&&label| label >= k) {
        return Err(ErlinkError::Clustering(format!("label {bad} outside [0, {k})")));
    }

    let assignments = encoded
        .iter()
        .zip(&partition.labels)
        .map(|(e, &label)| (e.id, label))
        .collect();

    Ok(ClusterAssignment {
        space,
        assignments,
        centroids: partition.centroids,
    })
}
