//! Progress observers for both training phases.
//!
//! Monitors are purely observational: the drivers make every decision before
//! notifying them, and nothing a monitor does feeds back into training.

use super::finetune::FinetuneReport;
use ndarray::Array1;
use tracing::{debug, info};

/// One validation check during fine-tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationEvent {
    /// 1-based epoch.
    pub epoch: usize,
    /// 1-based minibatch within the epoch.
    pub minibatch: usize,
    pub n_train_batches: usize,
    /// Global 0-based iteration.
    pub iter: usize,
    pub validation_loss: f32,
    /// Validation strictly beat the previous best.
    pub improved: bool,
    /// Improvement was large enough to extend patience.
    pub significant: bool,
    /// Patience after this check.
    pub patience: usize,
    /// Test score measured at this check; only present on improvement.
    pub test_score: Option<f32>,
}

/// Callbacks invoked by the pretraining and fine-tuning drivers.
///
/// Every method has an empty default, so implementors pick what they need.
pub trait TrainingMonitor {
    /// A generative layer is about to be pretrained.
    fn on_pretrain_layer(&mut self, _layer: usize, _recurrent: bool) {}

    fn on_pretrain_batch(&mut self, _layer: usize, _epoch: usize, _batch: usize, _cost: f32) {}

    /// Recurrent state handed from batch `batch` to batch `batch + 1`.
    fn on_recurrent_state(
        &mut self,
        _epoch: usize,
        _batch: usize,
        _seed: &Array1<f32>,
        _next: &Array1<f32>,
    ) {
    }

    fn on_pretrain_epoch(&mut self, _layer: usize, _epoch: usize, _mean_cost: f32) {}

    fn on_validation(&mut self, _event: &ValidationEvent) {}

    fn on_finetune_end(&mut self, _report: &FinetuneReport) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl TrainingMonitor for NoopMonitor {}

/// Emits line-oriented progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMonitor;

impl TrainingMonitor for LogMonitor {
    fn on_pretrain_layer(&mut self, layer: usize, recurrent: bool) {
        let kind = if recurrent { "rnn-rbm" } else { "rbm" };
        info!(layer, kind, "pre-training layer");
    }

    fn on_pretrain_batch(&mut self, layer: usize, epoch: usize, batch: usize, cost: f32) {
        debug!(layer, epoch, batch, cost, "pre-training batch");
    }

    fn on_pretrain_epoch(&mut self, layer: usize, epoch: usize, mean_cost: f32) {
        info!(
            "Pre-training layer {}, epoch {}, cost {:.6}",
            layer, epoch, mean_cost
        );
    }

    fn on_validation(&mut self, event: &ValidationEvent) {
        info!(
            "epoch {}, minibatch {}/{}, validation error {:.4} %",
            event.epoch,
            event.minibatch,
            event.n_train_batches,
            event.validation_loss * 100.0
        );
        if let Some(test) = event.test_score {
            info!(
                "     epoch {}, minibatch {}/{}, test error of best model {:.4} %",
                event.epoch,
                event.minibatch,
                event.n_train_batches,
                test * 100.0
            );
        }
    }

    fn on_finetune_end(&mut self, report: &FinetuneReport) {
        info!(
            best_validation_loss = report.best_validation_loss,
            test_score = ?report.test_score,
            best_epoch = report.best_epoch,
            iterations = report.iterations,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "fine-tuning finished"
        );
    }
}
