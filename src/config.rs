//! Tuning configuration

use crate::error::{ClassifierError, Result};
use crate::metrics::Scoring;
use crate::search::SearchOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings the facade hands to the search capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Number of parallel search workers
    pub n_jobs: usize,

    /// Verbosity level of the search (0 = silent)
    pub verbose: u8,

    /// Cross-validation folds per candidate
    pub cv_folds: usize,

    /// Shuffle samples before splitting into folds
    pub shuffle: bool,

    /// Random seed used when shuffling
    pub random_state: Option<u64>,

    /// Metric used when a tuning call names none
    pub default_scoring: String,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            n_jobs: 4,
            verbose: 1,
            cv_folds: 5,
            shuffle: false,
            random_state: None,
            default_scoring: "f1".to_string(),
        }
    }
}

impl TuningConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the worker count
    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builder method to set CV folds
    pub fn with_cv(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Shuffle before splitting, seeded for reproducibility
    pub fn with_shuffle(mut self, random_state: Option<u64>) -> Self {
        self.shuffle = true;
        self.random_state = random_state;
        self
    }

    pub fn with_default_scoring(mut self, scoring: impl Into<String>) -> Self {
        self.default_scoring = scoring.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_jobs == 0 {
            return Err(ClassifierError::ConfigError("n_jobs must be at least 1".to_string()));
        }
        if self.cv_folds < 2 {
            return Err(ClassifierError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        self.default_scoring.parse::<Scoring>()?;
        Ok(())
    }

    /// Search options for one tuning call
    pub fn search_options(&self, scoring: Scoring) -> SearchOptions {
        SearchOptions {
            n_jobs: self.n_jobs,
            verbose: self.verbose,
            scoring,
            cv_folds: self.cv_folds,
            shuffle: self.shuffle,
            random_state: self.random_state,
        }
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TuningConfig::default();
        assert_eq!(config.n_jobs, 4);
        assert_eq!(config.verbose, 1);
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.default_scoring, "f1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TuningConfig::new().with_cv(1).validate().is_err());
        assert!(TuningConfig::new().with_n_jobs(0).validate().is_err());
        assert!(TuningConfig::new().with_default_scoring("roc").validate().is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.json");
        let config = TuningConfig::new()
            .with_n_jobs(2)
            .with_cv(3)
            .with_shuffle(Some(7))
            .with_default_scoring("accuracy");
        config.save(&path).unwrap();

        let loaded = TuningConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TuningConfig = serde_json::from_str(r#"{"cv_folds": 3}"#).unwrap();
        assert_eq!(config.cv_folds, 3);
        assert_eq!(config.n_jobs, 4);
    }
}
