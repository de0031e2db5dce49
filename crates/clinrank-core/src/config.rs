use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ClinrankError, Result};

/// Top-level configuration for the relevance engine.
///
/// Loaded from `~/.clinrank/config.toml` by default. Each section corresponds
/// to one component of the scoring pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinrankConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub centrality: CentralityConfig,
    #[serde(default)]
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ClinrankConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClinrankConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist, cannot be parsed, or fails validation.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would break the bounded-score or search invariants.
    pub fn validate(&self) -> Result<()> {
        self.centrality.validate()?;
        self.authority.validate()?;
        self.scoring.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ClinrankError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite sidecar and snapshots.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.clinrank/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Eigenvector centrality (power iteration) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralityConfig {
    /// Convergence threshold on the L2 change between iterations.
    pub tolerance: f64,
    /// Iteration cap; reaching it yields an unconverged estimate.
    pub max_iterations: usize,
    /// Adjacency weight for relation kinds absent from `relation_weights`.
    pub default_relation_weight: f64,
    /// Per relation kind adjacency weight (case-insensitive keys).
    pub relation_weights: BTreeMap<String, f64>,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 100,
            default_relation_weight: 1.0,
            relation_weights: BTreeMap::new(),
        }
    }
}

impl CentralityConfig {
    fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ClinrankError::Config(format!(
                "centrality.tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(ClinrankError::Config(
                "centrality.max_iterations must be at least 1".to_string(),
            ));
        }
        check_unit(
            "centrality.default_relation_weight",
            self.default_relation_weight,
        )?;
        for (kind, weight) in &self.relation_weights {
            check_unit(&format!("centrality.relation_weights.{}", kind), *weight)?;
        }
        Ok(())
    }
}

/// Authority weight for one vocabulary source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRule {
    /// Weight applied to every concept of the source.
    pub base: f64,
    /// Per semantic type overrides of `base`.
    #[serde(default)]
    pub semantic_types: BTreeMap<String, f64>,
}

impl SourceRule {
    pub fn new(base: f64) -> Self {
        Self {
            base,
            semantic_types: BTreeMap::new(),
        }
    }
}

/// Fallback rule matched by case-insensitive substring on the source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityPattern {
    pub contains: String,
    pub weight: f64,
}

impl AuthorityPattern {
    fn new(contains: &str, weight: f64) -> Self {
        Self {
            contains: contains.to_string(),
            weight,
        }
    }
}

/// Curated vocabulary authority table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Weight for vocabulary sources that match no rule.
    pub floor: f64,
    /// Exact source rules.
    pub sources: BTreeMap<String, SourceRule>,
    /// Ordered fallback patterns consulted after an exact miss.
    pub patterns: Vec<AuthorityPattern>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        let sources = [
            ("SNOMED", 1.0),
            ("ICD10CM", 0.9),
            ("ICD10", 0.9),
            ("LOINC", 0.8),
            ("RxNorm", 0.8),
            ("ICD9CM", 0.7),
            ("CPT4", 0.7),
            ("HCPCS", 0.7),
            ("ATC", 0.7),
            ("NDC", 0.6),
            ("UCUM", 0.6),
            ("OMOP Extension", 0.5),
            ("OMOP Genomic", 0.5),
        ]
        .into_iter()
        .map(|(name, base)| (name.to_string(), SourceRule::new(base)))
        .collect();

        Self {
            floor: 0.1,
            sources,
            patterns: vec![
                AuthorityPattern::new("SNOMED", 1.0),
                AuthorityPattern::new("ICD10", 0.9),
                AuthorityPattern::new("LOINC", 0.8),
                AuthorityPattern::new("RXNORM", 0.8),
                AuthorityPattern::new("ICD9", 0.7),
                AuthorityPattern::new("CPT", 0.7),
                AuthorityPattern::new("HCPCS", 0.7),
            ],
        }
    }
}

impl AuthorityConfig {
    /// Check every weight lies in [0, 1] and every pattern is non-empty.
    pub fn validate(&self) -> Result<()> {
        check_unit("authority.floor", self.floor)?;
        for (source, rule) in &self.sources {
            check_unit(&format!("authority.sources.{}.base", source), rule.base)?;
            for (semantic_type, weight) in &rule.semantic_types {
                check_unit(
                    &format!("authority.sources.{}.semantic_types.{}", source, semantic_type),
                    *weight,
                )?;
            }
        }
        for pattern in &self.patterns {
            if pattern.contains.trim().is_empty() {
                return Err(ClinrankError::Config(
                    "authority.patterns entries need a non-empty 'contains'".to_string(),
                ));
            }
            check_unit(
                &format!("authority.patterns[{}].weight", pattern.contains),
                pattern.weight,
            )?;
        }
        Ok(())
    }
}

/// Weight of each relevance feature in the linear blend.
///
/// Unknown keys are rejected at load time so a typo cannot silently drop a
/// feature from the formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureWeights {
    pub centrality: f64,
    pub density: f64,
    pub authority: f64,
    pub similarity: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            centrality: 0.4,
            density: 0.2,
            authority: 0.1,
            similarity: 0.3,
        }
    }
}

impl FeatureWeights {
    pub fn sum(&self) -> f64 {
        self.centrality + self.density + self.authority + self.similarity
    }

    fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("centrality", self.centrality),
            ("density", self.density),
            ("authority", self.authority),
            ("similarity", self.similarity),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ClinrankError::Config(format!(
                    "scoring.weights.{} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }
        if self.sum() <= 0.0 {
            return Err(ClinrankError::Config(
                "scoring.weights must contain at least one positive weight".to_string(),
            ));
        }
        Ok(())
    }
}

/// Saturating transform applied to the weighted feature blend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Saturation {
    /// `1 / (1 + e^-x)`
    #[default]
    Logistic,
    /// `(tanh(x) + 1) / 2`
    Tanh,
}

/// Relevance formula settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: FeatureWeights,
    pub transform: Saturation,
    /// Steepness applied to the centred blend before saturation.
    pub gain: f64,
    /// Blend value mapped to a score of 0.5.
    pub midpoint: f64,
    /// Depth decay constant in `density = 1 / (1 + decay * depth)`.
    pub depth_decay: f64,
    /// Bump when the formula's code changes; parameter edits are picked up on their own.
    pub formula_revision: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            transform: Saturation::Logistic,
            gain: 6.0,
            midpoint: 0.5,
            depth_decay: 1.0,
            formula_revision: 1,
        }
    }
}

impl ScoringConfig {
    /// Canonical text of every parameter the score depends on.
    ///
    /// Stored scores record this string; any weight, transform, gain, midpoint,
    /// decay, or revision change makes it differ and forces a recompute.
    /// Floats print in shortest round-trip form, so equal configs give equal text.
    pub fn fingerprint(&self) -> String {
        let transform = match self.transform {
            Saturation::Logistic => "logistic",
            Saturation::Tanh => "tanh",
        };
        let w = &self.weights;
        format!(
            "r{};{};w={:?},{:?},{:?},{:?};gain={:?};mid={:?};decay={:?}",
            self.formula_revision,
            transform,
            w.centrality,
            w.density,
            w.authority,
            w.similarity,
            self.gain,
            self.midpoint,
            self.depth_decay
        )
    }

    fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(ClinrankError::Config(format!(
                "scoring.gain must be positive, got {}",
                self.gain
            )));
        }
        if !self.midpoint.is_finite() {
            return Err(ClinrankError::Config(
                "scoring.midpoint must be finite".to_string(),
            ));
        }
        if !(self.depth_decay.is_finite() && self.depth_decay >= 0.0) {
            return Err(ClinrankError::Config(format!(
                "scoring.depth_decay must be non-negative, got {}",
                self.depth_decay
            )));
        }
        Ok(())
    }
}

/// Hybrid search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Embedding model whose vectors populate the index; records from any
    /// other model are rejected on load.
    pub embedding_model: String,
    /// Vector length every indexed embedding must have.
    pub embedding_dim: usize,
    /// Candidate pool multiplier over the requested limit.
    pub oversample_factor: usize,
    /// Minimum candidate pool size regardless of limit.
    pub candidate_floor: usize,
    /// Default number of results for callers that do not pass a limit.
    pub default_limit: usize,
    /// Largest accepted limit.
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_model: "BAAI/bge-large-en-v1.5".to_string(),
            embedding_dim: 1024,
            oversample_factor: 5,
            candidate_floor: 50,
            default_limit: 10,
            max_limit: 1000,
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<()> {
        if self.embedding_model.trim().is_empty() {
            return Err(ClinrankError::Config(
                "search.embedding_model must not be empty".to_string(),
            ));
        }
        if self.embedding_dim == 0 {
            return Err(ClinrankError::Config(
                "search.embedding_dim must be at least 1".to_string(),
            ));
        }
        if self.oversample_factor == 0 {
            return Err(ClinrankError::Config(
                "search.oversample_factor must be at least 1".to_string(),
            ));
        }
        if self.max_limit == 0 {
            return Err(ClinrankError::Config(
                "search.max_limit must be at least 1".to_string(),
            ));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ClinrankError::Config(format!(
                "search.default_limit must be within 1..={}, got {}",
                self.max_limit, self.default_limit
            )));
        }
        Ok(())
    }
}

/// Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file for the metric sidecar and relevance store; in-memory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Deadline for a whole batch of store reads or writes, in milliseconds.
    pub io_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            io_timeout_ms: 30_000,
        }
    }
}
