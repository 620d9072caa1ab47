//! Typed hyperparameter records for the two training phases.
//!
//! Records can be built in code (with [`Default`] as a starting point) or
//! parsed from JSON. Either way the drivers call `validate()` once before any
//! parameter is allocated or touched.

use crate::core::{DbnError, DbnResult};
use serde::{Deserialize, Serialize};

/// Greedy layer-wise pretraining settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainConfig {
    /// Width of each hidden layer, bottom to top. The last one is the RNN-RBM.
    pub hidden_layer_sizes: Vec<usize>,
    pub learning_rate: f32,
    pub batch_size: usize,
    /// Epochs per layer. Zero skips pretraining and leaves the initial weights.
    pub epochs: usize,
    /// Recurrent-state width of the RNN-RBM.
    pub hidden_recurrent: usize,
    /// Gibbs steps per CD update.
    pub k: usize,
    /// Output dimension: number of classes, or target width for regression.
    pub n_outs: usize,
}

impl Default for PretrainConfig {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![500, 500],
            learning_rate: 0.01,
            batch_size: 10,
            epochs: 100,
            hidden_recurrent: 150,
            k: 1,
            n_outs: 1,
        }
    }
}

impl PretrainConfig {
    /// Parse a JSON record; a missing or mistyped key is a configuration error.
    pub fn from_json(json: &str) -> DbnResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbnError::Configuration(format!("pretraining record: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// - `Configuration` on an empty or zero layer size, zero batch size,
    ///   zero `k`, zero output or recurrent width, or a non-positive learning rate
    pub fn validate(&self) -> DbnResult<()> {
        if self.hidden_layer_sizes.is_empty() {
            return Err(DbnError::Configuration(
                "hidden_layer_sizes must name at least one layer".to_string(),
            ));
        }
        if self.hidden_layer_sizes.contains(&0) {
            return Err(DbnError::Configuration(
                "hidden layer sizes must be positive".to_string(),
            ));
        }
        check_learning_rate(self.learning_rate)?;
        check_positive("batch_size", self.batch_size)?;
        check_positive("hidden_recurrent", self.hidden_recurrent)?;
        check_positive("k", self.k)?;
        check_positive("n_outs", self.n_outs)
    }
}

/// Early-stopping constants for fine-tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingPolicy {
    /// Initial patience is this many epochs' worth of minibatches.
    pub patience_epochs: usize,
    /// On a significant improvement at `iter`, patience becomes at least `iter * patience_increase`.
    pub patience_increase: f32,
    /// A new loss below `best * improvement_threshold` counts as significant.
    pub improvement_threshold: f32,
}

impl Default for EarlyStoppingPolicy {
    fn default() -> Self {
        Self {
            patience_epochs: 30,
            patience_increase: 2.0,
            improvement_threshold: 0.995,
        }
    }
}

impl EarlyStoppingPolicy {
    pub fn validate(&self) -> DbnResult<()> {
        check_positive("patience_epochs", self.patience_epochs)?;
        if !(self.patience_increase.is_finite() && self.patience_increase >= 1.0) {
            return Err(DbnError::Configuration(format!(
                "patience_increase must be >= 1, got {}",
                self.patience_increase
            )));
        }
        if !(self.improvement_threshold > 0.0 && self.improvement_threshold <= 1.0) {
            return Err(DbnError::Configuration(format!(
                "improvement_threshold must be in (0, 1], got {}",
                self.improvement_threshold
            )));
        }
        Ok(())
    }
}

/// Supervised fine-tuning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetuneConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    /// Upper bound on epochs; early stopping may end the run sooner.
    pub epochs: usize,
    #[serde(default)]
    pub early_stopping: EarlyStoppingPolicy,
}

impl Default for FinetuneConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            batch_size: 10,
            epochs: 1000,
            early_stopping: EarlyStoppingPolicy::default(),
        }
    }
}

impl FinetuneConfig {
    /// Parse a JSON record; a missing or mistyped key is a configuration error.
    pub fn from_json(json: &str) -> DbnResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbnError::Configuration(format!("fine-tuning record: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DbnResult<()> {
        check_learning_rate(self.learning_rate)?;
        check_positive("batch_size", self.batch_size)?;
        check_positive("epochs", self.epochs)?;
        self.early_stopping.validate()
    }
}

fn check_positive(name: &str, value: usize) -> DbnResult<()> {
    if value == 0 {
        return Err(DbnError::Configuration(format!("{name} must be > 0")));
    }
    Ok(())
}

fn check_learning_rate(lr: f32) -> DbnResult<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(DbnError::Configuration(format!(
            "learning_rate must be finite and > 0, got {lr}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PretrainConfig::default().validate().is_ok());
        assert!(FinetuneConfig::default().validate().is_ok());
    }

    #[test]
    fn test_pretrain_from_json() {
        let json = r#"{
            "hidden_layer_sizes": [20, 10],
            "learning_rate": 0.05,
            "batch_size": 5,
            "epochs": 3,
            "hidden_recurrent": 4,
            "k": 1,
            "n_outs": 2
        }"#;
        let config = PretrainConfig::from_json(json).unwrap();
        assert_eq!(config.hidden_layer_sizes, vec![20, 10]);
        assert_eq!(config.k, 1);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let json = r#"{ "hidden_layer_sizes": [20], "learning_rate": 0.05 }"#;
        assert!(matches!(
            PretrainConfig::from_json(json),
            Err(DbnError::Configuration(_))
        ));
        assert!(matches!(
            FinetuneConfig::from_json(r#"{ "learning_rate": 0.1, "epochs": 5 }"#),
            Err(DbnError::Configuration(_))
        ));
    }

    #[test]
    fn test_finetune_json_uses_default_policy() {
        let config =
            FinetuneConfig::from_json(r#"{ "learning_rate": 0.1, "batch_size": 4, "epochs": 5 }"#)
                .unwrap();
        assert_eq!(config.early_stopping, EarlyStoppingPolicy::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = PretrainConfig {
            hidden_layer_sizes: vec![],
            ..PretrainConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FinetuneConfig {
            learning_rate: f32::NAN,
            ..FinetuneConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = FinetuneConfig::default();
        config.early_stopping.improvement_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
