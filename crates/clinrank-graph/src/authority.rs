//! Vocabulary authority weights.
//!
//! Lookup order: exact source rule (with its semantic-type override), then the
//! ordered case-insensitive substring patterns, then the floor. An unknown
//! source is never an error.

use std::sync::{Arc, RwLock};

use tracing::info;

use clinrank_core::config::AuthorityConfig;
use clinrank_core::error::{ClinrankError, Result};
use clinrank_core::types::ConceptNode;

/// One immutable version of the rule table.
#[derive(Debug, Clone)]
pub struct AuthorityRules {
    version: u32,
    config: AuthorityConfig,
    /// Upper-cased patterns, same order as `config.patterns`.
    patterns: Vec<(String, f64)>,
}

impl AuthorityRules {
    fn new(version: u32, config: AuthorityConfig) -> Self {
        let patterns = config
            .patterns
            .iter()
            .map(|p| (p.contains.to_uppercase(), p.weight))
            .collect();
        Self {
            version,
            config,
            patterns,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Weight in [0, 1] for a vocabulary source and semantic type.
    pub fn weight(&self, vocabulary: &str, semantic_type: &str) -> f64 {
        if let Some(rule) = self.config.sources.get(vocabulary) {
            return rule
                .semantic_types
                .get(semantic_type)
                .copied()
                .unwrap_or(rule.base);
        }

        let upper = vocabulary.to_uppercase();
        self.patterns
            .iter()
            .find(|(needle, _)| upper.contains(needle.as_str()))
            .map(|(_, weight)| *weight)
            .unwrap_or(self.config.floor)
    }

    pub fn weight_for(&self, concept: &ConceptNode) -> f64 {
        self.weight(&concept.vocabulary, &concept.semantic_type)
    }
}

/// Versioned holder of the current rule table.
///
/// Readers take an `Arc` snapshot so a batch sees one version throughout,
/// even if the table is replaced mid-run.
#[derive(Debug)]
pub struct AuthorityScorer {
    rules: RwLock<Arc<AuthorityRules>>,
}

impl AuthorityScorer {
    /// Start at version 1 with the given table.
    pub fn new(config: AuthorityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rules: RwLock::new(Arc::new(AuthorityRules::new(1, config))),
        })
    }

    pub fn rules(&self) -> Result<Arc<AuthorityRules>> {
        let rules = self
            .rules
            .read()
            .map_err(|e| ClinrankError::Config(format!("Authority rules lock poisoned: {}", e)))?;
        Ok(Arc::clone(&rules))
    }

    pub fn version(&self) -> Result<u32> {
        Ok(self.rules()?.version())
    }

    /// Replace the rule table and return the new version.
    ///
    /// Scores computed against the previous version become stale.
    pub fn update_rules(&self, config: AuthorityConfig) -> Result<u32> {
        config.validate()?;
        let mut rules = self
            .rules
            .write()
            .map_err(|e| ClinrankError::Config(format!("Authority rules lock poisoned: {}", e)))?;
        let version = rules.version + 1;
        *rules = Arc::new(AuthorityRules::new(version, config));
        info!(version, "Authority rule table updated");
        Ok(version)
    }
}
