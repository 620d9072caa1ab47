//! Patience-based early stopping.
//!
//! ```text
//! patience             = patience_epochs * n_train_batches
//! validation_frequency = min(n_train_batches, patience / 2)
//! validate when          (iter + 1) % validation_frequency == 0
//! on loss < best:        if loss < best * threshold { patience = max(patience, iter * increase) }
//! stop when              patience <= iter
//! ```
//!
//! Patience never decreases.

use crate::config::EarlyStoppingPolicy;
use crate::core::{DbnError, DbnResult};

/// Result of feeding one validation loss to [`EarlyStopping::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoImprovement,
    /// Strictly better than the previous best; `significant` if patience was extended.
    Improved { significant: bool },
}

impl CheckOutcome {
    pub fn improved(self) -> bool {
        matches!(self, CheckOutcome::Improved { .. })
    }

    pub fn significant(self) -> bool {
        matches!(self, CheckOutcome::Improved { significant: true })
    }
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    policy: EarlyStoppingPolicy,
    n_train_batches: usize,
    patience: usize,
    validation_frequency: usize,
    best_validation_loss: f32,
    best_iter: Option<usize>,
    best_epoch: usize,
}

impl EarlyStopping {
    /// # Errors
    /// - `Configuration` if there are no training batches
    pub fn new(n_train_batches: usize, policy: EarlyStoppingPolicy) -> DbnResult<Self> {
        if n_train_batches == 0 {
            return Err(DbnError::Configuration(
                "training split is smaller than one batch".to_string(),
            ));
        }
        let patience = policy.patience_epochs * n_train_batches;
        let validation_frequency = n_train_batches.min(patience / 2).max(1);
        Ok(Self {
            policy,
            n_train_batches,
            patience,
            validation_frequency,
            best_validation_loss: f32::INFINITY,
            best_iter: None,
            best_epoch: 0,
        })
    }

    /// Global 0-based iteration of `minibatch_index` in 1-based `epoch`.
    ///
    /// Epoch 0 is treated as epoch 1.
    pub fn iteration(&self, epoch: usize, minibatch_index: usize) -> usize {
        debug_assert!(epoch >= 1, "epochs are counted from 1");
        epoch.saturating_sub(1) * self.n_train_batches + minibatch_index
    }

    pub fn should_validate(&self, iter: usize) -> bool {
        (iter + 1) % self.validation_frequency == 0
    }

    /// Update the best-so-far state with the validation loss measured at `iter`.
    pub fn record(&mut self, iter: usize, epoch: usize, loss: f32) -> CheckOutcome {
        // NaN never improves
        if loss.is_nan() || loss >= self.best_validation_loss {
            return CheckOutcome::NoImprovement;
        }
        self.best_epoch = epoch;
        let significant = loss < self.best_validation_loss * self.policy.improvement_threshold;
        if significant {
            let extended = (iter as f64 * f64::from(self.policy.patience_increase)) as usize;
            self.patience = self.patience.max(extended);
        }
        self.best_validation_loss = loss;
        self.best_iter = Some(iter);
        CheckOutcome::Improved { significant }
    }

    /// True once the run has used up its patience at `iter`.
    pub fn exhausted(&self, iter: usize) -> bool {
        self.patience <= iter
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn validation_frequency(&self) -> usize {
        self.validation_frequency
    }

    pub fn n_train_batches(&self) -> usize {
        self.n_train_batches
    }

    pub fn best_validation_loss(&self) -> f32 {
        self.best_validation_loss
    }

    pub fn best_iter(&self) -> Option<usize> {
        self.best_iter
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}
