//! Pipeline orchestration: per-party encoding/indexing and cross-party
//! candidate matching and synchronization.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::{cluster_space, ClusterAssignment, ClusterPrimitive};
use crate::config::PipelineConfig;
use crate::encoder::bloom::BloomFilter;
use crate::encoder::entity::{encode_all, EncodedEntity};
use crate::encoder::export::FilterRecord;
use crate::errors::{ErlinkError, ErlinkResult};
use crate::exchange::{
    collect_artifacts, ArtifactKind, BucketAnnouncement, ClusterFilters, Envelope, Exchange,
    InMemoryExchange,
};
use crate::lsh::bucket::{
    candidate_buckets, candidate_cluster_pairs, merge_buckets, BucketTable, CandidateBucket,
};
use crate::matcher::dice::{match_clusters, PairwiseMatchMap};
use crate::models::{Diagnostic, Entity, EntityId, FilterSpace, PartyId};
use crate::parallel;
use crate::signature::minhash::{Crv, MinHashGenerator};
use crate::sync::chain::{synchronize, ChainSync, MatchChain};

// ---------------------------------------------------------------------------
// Per-party stage
// ---------------------------------------------------------------------------

/// Clustering, signatures and buckets of one filter space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpaceArtifacts {
    pub assignment: ClusterAssignment,
    /// CRV per non-empty cluster index.
    pub signatures: BTreeMap<usize, Crv>,
    pub buckets: BucketTable,
}

/// Everything one party computes locally before any exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyRun {
    pub party: PartyId,
    pub encoded: Vec<EncodedEntity>,
    /// Spaces whose clustering failed are absent.
    pub spaces: BTreeMap<FilterSpace, SpaceArtifacts>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PartyRun {
    /// Member filters of one cluster, in entity id order.
    pub fn members(&self, space: FilterSpace, cluster: usize) -> Vec<(EntityId, &BloomFilter)> {
        let Some(artifacts) = self.spaces.get(&space) else {
            return vec![];
        };
        let mut members: Vec<(EntityId, &BloomFilter)> = self
            .encoded
            .iter()
            .filter(|e| artifacts.assignment.cluster_of(e.id) == Some(cluster))
            .map(|e| (e.id, e.filter(space)))
            .collect();
        members.sort_by_key(|(id, _)| *id);
        members
    }

    /// Releasable copy of one cluster's filters, `None` for an unknown cluster.
    pub fn cluster_filters(&self, space: FilterSpace, cluster: usize) -> Option<ClusterFilters> {
        let artifacts = self.spaces.get(&space)?;
        if cluster >= artifacts.assignment.k() {
            return None;
        }
        Some(ClusterFilters {
            party: self.party.clone(),
            space,
            cluster,
            members: self
                .members(space, cluster)
                .into_iter()
                .map(|(id, f)| (id, f.clone()))
                .collect(),
        })
    }

    pub fn filter_records(&self, space: FilterSpace) -> Vec<FilterRecord> {
        self.encoded
            .iter()
            .map(|e| FilterRecord::new(e.id, e.filter(space)))
            .collect()
    }

    pub fn announcement(&self, space: FilterSpace) -> Option<BucketAnnouncement> {
        self.spaces.get(&space).map(|a| BucketAnnouncement {
            party: self.party.clone(),
            space,
            table: a.buckets.clone(),
        })
    }
}

/// Local stages for one party: encode, cluster both spaces, sign, bucket.
pub struct PartyPipeline<'a> {
    party: PartyId,
    config: PipelineConfig,
    primitive: &'a dyn ClusterPrimitive,
    minhash: MinHashGenerator,
}

impl<'a> PartyPipeline<'a> {
    pub fn new(
        party: impl Into<PartyId>,
        config: PipelineConfig,
        primitive: &'a dyn ClusterPrimitive,
    ) -> ErlinkResult<Self> {
        config.validate()?;
        let minhash = MinHashGenerator::from_config(&config.signature, config.filter.width)?;
        Ok(Self {
            party: party.into(),
            config,
            primitive,
            minhash,
        })
    }

    pub fn party(&self) -> &str {
        &self.party
    }

    pub fn run(&self, entities: &[Entity]) -> ErlinkResult<PartyRun> {
        let started = Instant::now();
        let lookup: HashMap<EntityId, Entity> =
            entities.iter().map(|e| (e.id, e.clone())).collect();
        let encoded = encode_all(entities, &lookup, &self.config.filter, self.config.workers)?;
        let mut diagnostics: Vec<Diagnostic> =
            encoded.iter().flat_map(EncodedEntity::diagnostics).collect();

        let mut spaces = BTreeMap::new();
        for space in FilterSpace::ALL {
            match self.index_space(&encoded, space, &mut diagnostics) {
                Ok(artifacts) => {
                    spaces.insert(space, artifacts);
                }
                Err(e) if e.is_recoverable() => {
                    diagnostics.push(Diagnostic::ClusteringFailed {
                        space,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "party {}: {} entities, {} spaces indexed, {} diagnostics in {} ms",
            self.party,
            encoded.len(),
            spaces.len(),
            diagnostics.len(),
            started.elapsed().as_millis()
        );
        Ok(PartyRun {
            party: self.party.clone(),
            encoded,
            spaces,
            diagnostics,
        })
    }

    fn index_space(
        &self,
        encoded: &[EncodedEntity],
        space: FilterSpace,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ErlinkResult<SpaceArtifacts> {
        let assignment = cluster_space(
            encoded,
            space,
            self.primitive,
            self.config.clustering.k,
            self.config.clustering.iterations,
        )?;

        let by_id: HashMap<EntityId, &EncodedEntity> = encoded.iter().map(|e| (e.id, e)).collect();
        let clusters: Vec<Vec<&BloomFilter>> = assignment
            .members()
            .iter()
            .map(|ids| ids.iter().map(|id| by_id[id].filter(space)).collect())
            .collect();

        let mut signatures = BTreeMap::new();
        let results = self.minhash.generate_all(&clusters, self.config.workers);
        for (cluster, result) in results.into_iter().enumerate() {
            match result {
                Ok(crv) => {
                    signatures.insert(cluster, crv);
                }
                Err(ErlinkError::Signature(_)) => {
                    warn!("party {}: {space} cluster {cluster} is empty", self.party);
                    diagnostics.push(Diagnostic::EmptyCluster { space, cluster });
                }
                Err(e) => return Err(e),
            }
        }

        let buckets =
            BucketTable::from_signatures(&self.party, &signatures, self.config.lsh.band_width)?;
        debug!(
            "party {}: {space} space has {} signatures in {} buckets",
            self.party,
            signatures.len(),
            buckets.len()
        );
        Ok(SpaceArtifacts {
            assignment,
            signatures,
            buckets,
        })
    }

    /// Publish this party's bucket tables, one envelope per indexed space.
    pub fn publish_buckets(&self, run: &PartyRun, exchange: &dyn Exchange) -> ErlinkResult<()> {
        for space in FilterSpace::ALL {
            if let Some(announcement) = run.announcement(space) {
                let envelope = Envelope::seal(&self.party, ArtifactKind::Buckets, &announcement)?;
                exchange.publish(envelope)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cross-party stage
// ---------------------------------------------------------------------------

/// Matches between two parties plus the conditions met while computing them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub map: PairwiseMatchMap,
    pub cluster_pairs: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Cross-party steps that run once every party's artifacts are available.
pub struct Coordinator {
    config: PipelineConfig,
}

impl Coordinator {
    pub fn new(config: PipelineConfig) -> ErlinkResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Merge the announced tables of `space` and keep buckets that reach the
    /// configured quorum.
    ///
    /// `participants` is the number of parties taking part in the run, whether
    /// or not they managed to announce; [`Quorum::All`] resolves against it.
    /// A run with no participants or no announcements has no candidates.
    ///
    /// [`Quorum::All`]: crate::config::Quorum::All
    pub fn candidates(
        &self,
        space: FilterSpace,
        announcements: &[BucketAnnouncement],
        participants: usize,
    ) -> ErlinkResult<Vec<CandidateBucket>> {
        let tables: Vec<&BucketTable> = announcements
            .iter()
            .filter(|a| a.space == space)
            .map(|a| &a.table)
            .collect();
        let quorum = self.config.lsh.quorum.resolve(participants);
        if quorum == 0 || tables.is_empty() {
            warn!("no {space} buckets announced by {participants} parties; no candidates");
            return Ok(vec![]);
        }
        let announced: BTreeSet<&str> = announcements
            .iter()
            .filter(|a| a.space == space)
            .map(|a| a.party.as_str())
            .collect();
        if announced.len() < participants {
            warn!(
                "{space} buckets announced by {} of {participants} parties",
                announced.len()
            );
        }
        candidate_buckets(&merge_buckets(tables), quorum)
    }

    /// Compare every candidate cluster pair between `self_party` and
    /// `other_party` and combine the results into one match map.
    ///
    /// Cluster pairs are compared in parallel; combination follows pair order.
    pub fn match_parties(
        &self,
        candidates: &[CandidateBucket],
        self_party: &str,
        self_clusters: &[ClusterFilters],
        other_party: &str,
        other_clusters: &[ClusterFilters],
    ) -> ErlinkResult<MatchReport> {
        let pairs: Vec<(usize, usize)> =
            candidate_cluster_pairs(candidates, self_party, other_party)
                .into_iter()
                .collect();
        let find = |clusters: &[ClusterFilters], party: &str, cluster: usize| {
            clusters
                .iter()
                .find(|c| c.party == party && c.cluster == cluster)
                .cloned()
        };

        let threshold = self.config.matching.threshold;
        let outcomes: Vec<ErlinkResult<(PairwiseMatchMap, Option<Diagnostic>)>> =
            parallel::install(self.config.workers, || {
                pairs
                    .par_iter()
                    .map(|&(a, b)| {
                        let Some(mine) = find(self_clusters, self_party, a) else {
                            return Ok((
                                PairwiseMatchMap::new(self_party, other_party),
                                Some(Diagnostic::MissingClusterFilters {
                                    party: self_party.to_string(),
                                    cluster: a,
                                }),
                            ));
                        };
                        let Some(theirs) = find(other_clusters, other_party, b) else {
                            return Ok((
                                PairwiseMatchMap::new(self_party, other_party),
                                Some(Diagnostic::MissingClusterFilters {
                                    party: other_party.to_string(),
                                    cluster: b,
                                }),
                            ));
                        };
                        let map = match_clusters(
                            self_party,
                            other_party,
                            &mine.borrowed(),
                            &theirs.borrowed(),
                            threshold,
                        )?;
                        let note = map.is_empty().then(|| Diagnostic::NoMatches {
                            self_party: self_party.to_string(),
                            other_party: other_party.to_string(),
                            self_cluster: a,
                            other_cluster: b,
                        });
                        Ok((map, note))
                    })
                    .collect()
            });

        let mut combined = PairwiseMatchMap::new(self_party, other_party);
        let mut diagnostics = Vec::new();
        for outcome in outcomes {
            let (map, note) = outcome?;
            combined.combine(&map)?;
            diagnostics.extend(note);
        }
        info!(
            "{self_party}->{other_party}: {} matches from {} cluster pairs",
            combined.len(),
            pairs.len()
        );
        Ok(MatchReport {
            map: combined,
            cluster_pairs: pairs.len(),
            diagnostics,
        })
    }

    /// Run the chain synchronizer over `order` using the given pairwise maps.
    pub fn synchronize(
        &self,
        order: &[PartyId],
        maps: &[PairwiseMatchMap],
    ) -> ErlinkResult<ChainSync> {
        synchronize(&MatchChain::from_maps(order, maps))
    }
}

// ---------------------------------------------------------------------------
// Single-process run
// ---------------------------------------------------------------------------

/// Outcome of [`resolve_in_memory`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub runs: Vec<PartyRun>,
    pub candidates: Vec<CandidateBucket>,
    pub matches: Vec<PairwiseMatchMap>,
    pub sync: ChainSync,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run every party and the coordinator in one process over an
/// [`InMemoryExchange`], matching in `space` along the ring given by the
/// order of `parties`.
pub fn resolve_in_memory(
    config: &PipelineConfig,
    primitive: &dyn ClusterPrimitive,
    parties: &[(PartyId, Vec<Entity>)],
    space: FilterSpace,
) -> ErlinkResult<Resolution> {
    if parties.is_empty() {
        return Err(ErlinkError::InvalidArgument("no parties to resolve".into()));
    }
    let exchange = InMemoryExchange::new();
    let mut runs = Vec::with_capacity(parties.len());
    let mut diagnostics = Vec::new();

    for (party, entities) in parties {
        let pipeline = PartyPipeline::new(party.clone(), config.clone(), primitive)?;
        let run = pipeline.run(entities)?;
        pipeline.publish_buckets(&run, &exchange)?;
        diagnostics.extend(run.diagnostics.iter().cloned());
        runs.push(run);
    }

    let coordinator = Coordinator::new(config.clone())?;
    let announcements: Vec<BucketAnnouncement> =
        collect_artifacts(&exchange, ArtifactKind::Buckets);
    let candidates = coordinator.candidates(space, &announcements, parties.len())?;

    // Each party releases only the clusters that appear in some candidate.
    for run in &runs {
        let mut released = BTreeSet::new();
        for candidate in &candidates {
            if let Some(clusters) = candidate.clusters.get(&run.party) {
                released.extend(clusters.iter().copied());
            }
        }
        for cluster in released {
            if let Some(filters) = run.cluster_filters(space, cluster) {
                let envelope = Envelope::seal(&run.party, ArtifactKind::ClusterFilters, &filters)?;
                exchange.publish(envelope)?;
            }
        }
    }
    let released: Vec<ClusterFilters> = collect_artifacts(&exchange, ArtifactKind::ClusterFilters);

    let order: Vec<PartyId> = parties.iter().map(|(p, _)| p.clone()).collect();
    let n = order.len();
    let mut matches: Vec<PairwiseMatchMap> = Vec::new();
    if n >= 2 {
        for i in 0..n {
            let me = &order[i];
            let next = &order[(i + 1) % n];
            let report = coordinator.match_parties(&candidates, me, &released, next, &released)?;
            diagnostics.extend(report.diagnostics);
            exchange.publish(Envelope::seal(me, ArtifactKind::MatchMap, &report.map)?)?;
        }
        matches = collect_artifacts(&exchange, ArtifactKind::MatchMap);
    }

    let sync = coordinator.synchronize(&order, &matches)?;
    diagnostics.extend(sync.diagnostics.iter().cloned());
    Ok(Resolution {
        runs,
        candidates,
        matches,
        sync,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::KMeans;
    use crate::config::Quorum;

    fn people(ids: [EntityId; 2]) -> Vec<Entity> {
        vec![
            Entity::new(
                ids[0],
                vec!["John".into(), "Doe".into(), "24".into()],
                vec![ids[1]],
            ),
            Entity::new(
                ids[1],
                vec!["Jane".into(), "Dawson".into(), "24".into()],
                vec![ids[0]],
            ),
        ]
    }

    /// Three people linked in a ring: John -> Jane -> Mary -> John.
    fn trio(ids: [EntityId; 3]) -> Vec<Entity> {
        vec![
            Entity::new(ids[0], vec!["John".into(), "Doe".into(), "24".into()], vec![ids[1]]),
            Entity::new(ids[1], vec!["Jane".into(), "Dawson".into(), "24".into()], vec![ids[2]]),
            Entity::new(ids[2], vec!["Mary".into(), "Smith".into(), "57".into()], vec![ids[0]]),
        ]
    }

    fn two_cluster_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.clustering.k = 2;
        config
    }

    #[test]
    fn rerun_reproduces_every_artifact() {
        let config = two_cluster_config();
        let km = KMeans::new(config.clustering.seed);
        let first = PartyPipeline::new("A", config.clone(), &km)
            .unwrap()
            .run(&people([0, 1]))
            .unwrap();
        let second = PartyPipeline::new("A", config, &km)
            .unwrap()
            .run(&people([0, 1]))
            .unwrap();
        assert_eq!(first, second);

        let attr = &first.spaces[&FilterSpace::Attribute];
        assert_ne!(attr.assignment.cluster_of(0), attr.assignment.cluster_of(1));
        assert_eq!(attr.signatures.len(), 2);
        assert_eq!(attr.signatures[&0].len(), 100);
        assert!(!attr.buckets.is_empty());
        assert!(first.diagnostics.is_empty());
    }

    #[test]
    fn shared_attribute_alone_does_not_match() {
        let run = PartyPipeline::new("A", two_cluster_config(), &KMeans::new(1))
            .unwrap()
            .run(&people([0, 1]))
            .unwrap();
        let assignment = &run.spaces[&FilterSpace::Attribute].assignment;
        let john = run.members(FilterSpace::Attribute, assignment.cluster_of(0).unwrap());
        let jane = run.members(FilterSpace::Attribute, assignment.cluster_of(1).unwrap());
        let map = match_clusters("A", "A", &john, &jane, 0.9).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn failed_clustering_is_reported_not_fatal() {
        let mut config = PipelineConfig::default();
        config.clustering.k = 3;
        let run = PartyPipeline::new("A", config, &KMeans::new(1))
            .unwrap()
            .run(&people([0, 1]))
            .unwrap();
        assert!(run.spaces.is_empty());
        assert_eq!(run.diagnostics.len(), 2);
        assert!(matches!(
            run.diagnostics[0],
            Diagnostic::ClusteringFailed {
                space: FilterSpace::Attribute,
                ..
            }
        ));
        assert!(run.announcement(FilterSpace::Attribute).is_none());
    }

    #[test]
    fn empty_clusters_are_skipped_with_a_diagnostic() {
        // No neighbors: both structural filters are empty and identical.
        let entities = vec![
            Entity::new(0, vec!["John".into()], vec![]),
            Entity::new(1, vec!["Jane".into()], vec![]),
        ];
        let run = PartyPipeline::new("A", two_cluster_config(), &KMeans::new(1))
            .unwrap()
            .run(&entities)
            .unwrap();
        let structural = &run.spaces[&FilterSpace::Structural];
        assert_eq!(structural.signatures.len(), 1);
        assert!(run.diagnostics.contains(&Diagnostic::EmptyCluster {
            space: FilterSpace::Structural,
            cluster: 1
        }));
    }

    #[test]
    fn missing_neighbors_surface_as_diagnostics() {
        let entities = vec![
            Entity::new(0, vec!["John".into()], vec![1, 42]),
            Entity::new(1, vec!["Jane".into()], vec![0]),
        ];
        let run = PartyPipeline::new("A", two_cluster_config(), &KMeans::new(1))
            .unwrap()
            .run(&entities)
            .unwrap();
        assert!(run.diagnostics.contains(&Diagnostic::MissingNeighbor {
            entity: 0,
            neighbor: 42
        }));
    }

    #[test]
    fn filter_records_cover_every_entity() {
        let run = PartyPipeline::new("A", two_cluster_config(), &KMeans::new(1))
            .unwrap()
            .run(&people([3, 4]))
            .unwrap();
        let records = run.filter_records(FilterSpace::Attribute);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.bits.len() == 256));
        assert!(run.cluster_filters(FilterSpace::Attribute, 9).is_none());
    }

    #[test]
    fn three_parties_resolve_common_entities() {
        let mut config = two_cluster_config();
        config.lsh.quorum = Quorum::AtLeast(3);
        let parties = vec![
            ("A".to_string(), people([0, 1])),
            ("B".to_string(), people([10, 11])),
            ("C".to_string(), people([100, 101])),
        ];
        let resolution =
            resolve_in_memory(&config, &KMeans::new(5), &parties, FilterSpace::Attribute).unwrap();

        assert!(!resolution.candidates.is_empty());
        assert_eq!(resolution.matches.len(), 3);
        let common = &resolution.sync.common;
        assert_eq!(common["A"], vec![0, 1]);
        assert_eq!(common["B"], vec![10, 11]);
        assert_eq!(common["C"], vec![100, 101]);
    }

    #[test]
    fn default_quorum_requires_every_party() {
        let config = two_cluster_config();
        assert_eq!(config.lsh.quorum, Quorum::All);
        let parties = vec![
            ("A".to_string(), people([0, 1])),
            ("B".to_string(), people([10, 11])),
            ("C".to_string(), people([100, 101])),
        ];
        let resolution =
            resolve_in_memory(&config, &KMeans::new(5), &parties, FilterSpace::Attribute).unwrap();

        assert!(!resolution.candidates.is_empty());
        assert!(resolution.candidates.iter().all(|c| c.clusters.len() == 3));
        let common = &resolution.sync.common;
        assert_eq!(common["A"], vec![0, 1]);
        assert_eq!(common["B"], vec![10, 11]);
        assert_eq!(common["C"], vec![100, 101]);
    }

    #[test]
    fn clustering_failure_everywhere_yields_empty_resolution() {
        let mut config = PipelineConfig::default();
        config.clustering.k = 3;
        let parties = vec![
            ("A".to_string(), people([0, 1])),
            ("B".to_string(), people([10, 11])),
            ("C".to_string(), people([100, 101])),
        ];
        let resolution =
            resolve_in_memory(&config, &KMeans::new(5), &parties, FilterSpace::Attribute).unwrap();

        assert!(resolution.candidates.is_empty());
        assert!(resolution.sync.common.is_empty());
        let failures = resolution
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::ClusteringFailed { .. }))
            .count();
        assert_eq!(failures, 6);
    }

    #[test]
    fn failed_party_still_counts_toward_the_quorum() {
        let mut config = PipelineConfig::default();
        config.clustering.k = 3;
        let parties = vec![
            ("A".to_string(), trio([0, 1, 2])),
            ("B".to_string(), trio([10, 11, 12])),
            ("C".to_string(), people([100, 101])),
        ];
        let resolution =
            resolve_in_memory(&config, &KMeans::new(5), &parties, FilterSpace::Attribute).unwrap();
        assert!(resolution.candidates.is_empty());
        assert!(resolution.sync.common.is_empty());
        assert!(resolution.diagnostics.contains(&Diagnostic::ClusteringFailed {
            space: FilterSpace::Attribute,
            reason: "Clustering error: cannot form 3 clusters from 2 vectors".into(),
        }));

        // The same announcements pass once the quorum is lowered to the two
        // parties that did announce.
        let announcements: Vec<BucketAnnouncement> = resolution
            .runs
            .iter()
            .filter_map(|run| run.announcement(FilterSpace::Attribute))
            .collect();
        assert_eq!(announcements.len(), 2);
        let strict = Coordinator::new(config.clone()).unwrap();
        assert!(strict
            .candidates(FilterSpace::Attribute, &announcements, 3)
            .unwrap()
            .is_empty());
        config.lsh.quorum = Quorum::AtLeast(2);
        let relaxed = Coordinator::new(config).unwrap();
        let candidates = relaxed
            .candidates(FilterSpace::Attribute, &announcements, 3)
            .unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.clusters.len() == 2));
    }

    #[test]
    fn no_participants_means_no_candidates() {
        let coordinator = Coordinator::new(PipelineConfig::default()).unwrap();
        assert!(coordinator
            .candidates(FilterSpace::Attribute, &[], 0)
            .unwrap()
            .is_empty());
        assert!(coordinator
            .candidates(FilterSpace::Structural, &[], 3)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn party_without_overlap_leaves_nothing_common() {
        let parties = vec![
            ("A".to_string(), people([0, 1])),
            ("B".to_string(), people([10, 11])),
            (
                "C".to_string(),
                vec![
                    Entity::new(100, vec!["Mary".into(), "Smith".into(), "57".into()], vec![101]),
                    Entity::new(101, vec!["Omar".into(), "Haddad".into(), "33".into()], vec![100]),
                ],
            ),
        ];
        let resolution = resolve_in_memory(
            &two_cluster_config(),
            &KMeans::new(5),
            &parties,
            FilterSpace::Attribute,
        )
        .unwrap();
        assert!(resolution.sync.common.is_empty());
    }

    #[test]
    fn missing_cluster_filters_are_reported() {
        let coordinator = Coordinator::new(PipelineConfig::default()).unwrap();
        let candidate = CandidateBucket {
            bucket: 1,
            clusters: BTreeMap::from([
                ("A".to_string(), BTreeSet::from([0])),
                ("B".to_string(), BTreeSet::from([0])),
            ]),
        };
        let report = coordinator
            .match_parties(&[candidate], "A", &[], "B", &[])
            .unwrap();
        assert!(report.map.is_empty());
        assert_eq!(report.cluster_pairs, 1);
        assert_eq!(
            report.diagnostics,
            vec![Diagnostic::MissingClusterFilters {
                party: "A".into(),
                cluster: 0
            }]
        );
    }
}
