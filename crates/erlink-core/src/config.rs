//! Pipeline configuration: defaults, JSON loading and `ERLINK_*` overrides.
//!
//! Every party in a run must use the same filter, signature and LSH
//! parameters, otherwise their filters and buckets are not comparable.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ErlinkError, ErlinkResult};

pub const DEFAULT_FILTER_WIDTH: usize = 256;
pub const DEFAULT_FILTER_HASHES: usize = 4;
pub const DEFAULT_CLUSTER_COUNT: usize = 3;
pub const DEFAULT_CLUSTER_ITERATIONS: usize = 10;
pub const DEFAULT_SIGNATURE_LENGTH: usize = 100;
pub const DEFAULT_SAMPLE_LIMIT: usize = 50;
pub const DEFAULT_BAND_WIDTH: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;
pub const DEFAULT_WORKERS: usize = 4;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Bit width `m` of every Bloom filter.
    pub width: usize,
    /// Number of hash functions `k`.
    pub hashes: usize,
    /// Shared seed mixed into every hash function.
    pub hash_seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_FILTER_WIDTH,
            hashes: DEFAULT_FILTER_HASHES,
            hash_seed: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub k: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_CLUSTER_COUNT,
            iterations: DEFAULT_CLUSTER_ITERATIONS,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Signature length `L` (one permutation per slot).
    pub length: usize,
    /// Maximum number of member filters aggregated into one signature.
    pub sample_limit: usize,
    pub seed: u64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_SIGNATURE_LENGTH,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            seed: 7,
        }
    }
}

/// How many distinct parties a bucket needs before it becomes a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quorum {
    /// Every party taking part in the run.
    #[default]
    All,
    AtLeast(usize),
}

impl Quorum {
    /// Resolve to a concrete party count for a run with `total_parties`.
    pub fn resolve(&self, total_parties: usize) -> usize {
        match self {
            Quorum::All => total_parties,
            Quorum::AtLeast(n) => *n,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        let v = value.trim().to_lowercase();
        if v == "all" {
            return Some(Quorum::All);
        }
        v.parse::<usize>().ok().map(Quorum::AtLeast)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshConfig {
    pub band_width: usize,
    pub quorum: Quorum,
}

impl Default for LshConfig {
    fn default() -> Self {
        Self {
            band_width: DEFAULT_BAND_WIDTH,
            quorum: Quorum::All,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Strict lower bound on the Dice coefficient of a recorded match.
    pub threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub clustering: ClusteringConfig,
    pub signature: SignatureConfig,
    pub lsh: LshConfig,
    pub matching: MatchingConfig,
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            clustering: ClusteringConfig::default(),
            signature: SignatureConfig::default(),
            lsh: LshConfig::default(),
            matching: MatchingConfig::default(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> ErlinkResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ERLINK_*` environment overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(v) = env_usize("ERLINK_FILTER_WIDTH") {
            self.filter.width = v;
        }
        if let Some(v) = env_usize("ERLINK_FILTER_HASHES") {
            self.filter.hashes = v;
        }
        if let Some(v) = env_usize("ERLINK_CLUSTERS") {
            self.clustering.k = v;
        }
        if let Some(v) = env_usize("ERLINK_CLUSTER_ITERATIONS") {
            self.clustering.iterations = v;
        }
        if let Some(v) = env_usize("ERLINK_SIGNATURE_LENGTH") {
            self.signature.length = v;
        }
        if let Some(v) = env_usize("ERLINK_BAND_WIDTH") {
            self.lsh.band_width = v;
        }
        if let Some(q) = env_value("ERLINK_QUORUM").and_then(|v| Quorum::parse(&v)) {
            self.lsh.quorum = q;
        }
        if let Some(v) = env_value("ERLINK_THRESHOLD").and_then(|v| v.parse::<f64>().ok()) {
            self.matching.threshold = v;
        }
        if let Some(v) = env_usize("ERLINK_WORKERS") {
            self.workers = v;
        }
        self
    }

    /// Reject parameter combinations that make a stage meaningless.
    pub fn validate(&self) -> ErlinkResult<()> {
        if self.filter.width == 0 {
            return Err(ErlinkError::InvalidArgument("filter width must be > 0".into()));
        }
        if self.filter.hashes == 0 {
            return Err(ErlinkError::InvalidArgument("filter hash count must be > 0".into()));
        }
        if self.clustering.k == 0 {
            return Err(ErlinkError::InvalidArgument("cluster count k must be > 0".into()));
        }
        if self.signature.length == 0 {
            return Err(ErlinkError::InvalidArgument("signature length must be > 0".into()));
        }
        if self.signature.sample_limit == 0 {
            return Err(ErlinkError::InvalidArgument("sample limit must be > 0".into()));
        }
        if self.lsh.band_width == 0 {
            return Err(ErlinkError::InvalidArgument("band width must be > 0".into()));
        }
        if self.lsh.quorum == Quorum::AtLeast(0) {
            return Err(ErlinkError::InvalidArgument("quorum must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(ErlinkError::InvalidArgument(format!(
                "similarity threshold {} outside [0, 1]",
                self.matching.threshold
            )));
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(val) => {
            let v = val.trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        }
        Err(_) => None,
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env_value(name).and_then(|v| v.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.width, 256);
        assert_eq!(config.filter.hashes, 4);
        assert_eq!(config.signature.length, 100);
        assert_eq!(config.lsh.quorum, Quorum::All);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"clustering": {{"k": 2}}, "lsh": {{"quorum": {{"at_least": 3}}}}}}"#
        )
        .unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.clustering.k, 2);
        assert_eq!(config.clustering.iterations, DEFAULT_CLUSTER_ITERATIONS);
        assert_eq!(config.lsh.quorum, Quorum::AtLeast(3));
        assert_eq!(config.filter.width, DEFAULT_FILTER_WIDTH);
    }

    #[test]
    fn invalid_json_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"clustering": {{"k": 0}}}}"#).unwrap();
        let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ErlinkError::InvalidArgument(_)));
    }

    #[test]
    fn threshold_outside_unit_interval_is_invalid() {
        let mut config = PipelineConfig::default();
        config.matching.threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply_and_skip_garbage() {
        // The only test touching ERLINK_* variables.
        let vars = [
            ("ERLINK_CLUSTERS", "5"),
            ("ERLINK_BAND_WIDTH", " 20 "),
            ("ERLINK_QUORUM", "all"),
            ("ERLINK_THRESHOLD", "abc"),
            ("ERLINK_WORKERS", ""),
        ];
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
        let mut base = PipelineConfig::default();
        base.lsh.quorum = Quorum::AtLeast(2);
        let config = base.apply_env_overrides();
        for (name, _) in vars {
            std::env::remove_var(name);
        }

        assert_eq!(config.clustering.k, 5);
        assert_eq!(config.lsh.band_width, 20);
        assert_eq!(config.lsh.quorum, Quorum::All);
        assert_eq!(config.matching.threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.filter.width, DEFAULT_FILTER_WIDTH);
    }

    #[test]
    fn quorum_resolves_against_party_count() {
        assert_eq!(Quorum::All.resolve(4), 4);
        assert_eq!(Quorum::AtLeast(3).resolve(5), 3);
        assert_eq!(Quorum::parse("ALL"), Some(Quorum::All));
        assert_eq!(Quorum::parse("3"), Some(Quorum::AtLeast(3)));
        assert_eq!(Quorum::parse("three"), None);
    }
}
