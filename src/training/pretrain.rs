//! Greedy layer-wise pretraining.
//!
//! Layers are trained bottom to top. Each batch is pushed through the hidden
//! transforms below the current layer using the current shared weights, so a
//! lower layer's training is visible to everything above it. The top layer is
//! an RNN-RBM whose recurrent state is chained from batch to batch and reset
//! to `u0` at every epoch start.

use super::monitor::TrainingMonitor;
use crate::config::PretrainConfig;
use crate::core::{DbnError, DbnResult};
use crate::data::{Dataset, Split};
use crate::layers::LabelMode;
use crate::model::{Architecture, Dbn};
use rand::Rng;
use std::time::{Duration, Instant};

/// Per-layer, per-epoch mean costs of one pretraining run.
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainReport {
    /// `layer_costs[layer][epoch]`
    pub layer_costs: Vec<Vec<f32>>,
    pub elapsed: Duration,
}

impl PretrainReport {
    /// Mean cost of the last epoch of `layer`, if it ran at all.
    pub fn final_cost(&self, layer: usize) -> Option<f32> {
        self.layer_costs.get(layer).and_then(|c| c.last().copied())
    }
}

/// Build a network sized for `dataset` and pretrain every generative layer.
///
/// # Errors
/// - `Configuration` if `config` is invalid or the training split holds
///   fewer rows than one batch
/// - `ShapeMismatch` if the dataset's labels do not match `mode` or do not
///   fit `n_outs` outputs
pub fn pretrain<R: Rng + ?Sized>(
    dataset: &Dataset,
    config: &PretrainConfig,
    mode: LabelMode,
    rng: &mut R,
    monitor: &mut dyn TrainingMonitor,
) -> DbnResult<(Dbn, PretrainReport)> {
    config.validate()?;
    if dataset.label_mode() != mode {
        return Err(DbnError::ShapeMismatch(format!(
            "dataset labels are {:?}, network expects {:?}",
            dataset.label_mode(),
            mode
        )));
    }
    check_batches(&dataset.train, config.batch_size)?;
    dataset.check_outputs(config.n_outs)?;

    let arch = Architecture {
        n_ins: dataset.n_features(),
        hidden_layer_sizes: config.hidden_layer_sizes.clone(),
        hidden_recurrent: config.hidden_recurrent,
        n_outs: config.n_outs,
        mode,
    };
    let mut dbn = Dbn::new(arch, rng)?;
    let report = dbn.pretrain_layers(&dataset.train, config, rng, monitor)?;
    Ok((dbn, report))
}

impl Dbn {
    /// Run the layer-wise CD schedule of `config` on an existing network.
    ///
    /// Only `learning_rate`, `batch_size`, `epochs` and `k` are read from
    /// `config`; the network keeps its own dimensions.
    pub fn pretrain_layers<R: Rng + ?Sized>(
        &mut self,
        train: &Split,
        config: &PretrainConfig,
        rng: &mut R,
        monitor: &mut dyn TrainingMonitor,
    ) -> DbnResult<PretrainReport> {
        let start = Instant::now();
        let n_batches = check_batches(train, config.batch_size)?;
        let top = self.n_layers() - 1;
        let mut layer_costs = Vec::with_capacity(self.n_layers());

        for layer in 0..self.n_layers() {
            let recurrent = layer == top;
            monitor.on_pretrain_layer(layer, recurrent);
            let mut epoch_costs = Vec::with_capacity(config.epochs);

            for epoch in 0..config.epochs {
                let mut seed = self.initial_recurrent_state();
                let mut total = 0.0;

                for batch in 0..n_batches {
                    let x = train.batch_x(batch, config.batch_size);
                    let visible = self.layer_input(layer, x)?;
                    let cost = if recurrent {
                        let cost = self.rnn_rbm_step(
                            visible.view(),
                            &seed,
                            config.k,
                            config.learning_rate,
                            rng,
                        )?;
                        let next = self.advance_recurrent_state(visible.view(), &seed)?;
                        monitor.on_recurrent_state(epoch, batch, &seed, &next);
                        seed = next;
                        cost
                    } else {
                        self.rbm_step(layer, visible.view(), config.k, config.learning_rate, rng)?
                    };
                    monitor.on_pretrain_batch(layer, epoch, batch, cost);
                    total += cost;
                }

                let mean = total / n_batches as f32;
                monitor.on_pretrain_epoch(layer, epoch, mean);
                epoch_costs.push(mean);
            }
            layer_costs.push(epoch_costs);
        }

        Ok(PretrainReport {
            layer_costs,
            elapsed: start.elapsed(),
        })
    }
}

fn check_batches(train: &Split, batch_size: usize) -> DbnResult<usize> {
    let n_batches = train.n_batches(batch_size);
    if n_batches == 0 {
        return Err(DbnError::Configuration(format!(
            "batch_size {} exceeds the {} training rows",
            batch_size,
            train.len()
        )));
    }
    Ok(n_batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Labels;
    use crate::training::NoopMonitor;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dataset(rows: usize) -> Dataset {
        let x = Array2::from_shape_fn((rows, 6), |(i, j)| ((i + j) % 2) as f32);
        let y = Array1::from_shape_fn(rows, |i| i % 2);
        Dataset::chronological(x, Labels::Classes(y), 0.2, 0.2).unwrap()
    }

    fn config() -> PretrainConfig {
        PretrainConfig {
            hidden_layer_sizes: vec![4, 3],
            learning_rate: 0.1,
            batch_size: 4,
            epochs: 2,
            hidden_recurrent: 2,
            k: 1,
            n_outs: 2,
        }
    }

    #[test]
    fn test_report_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let (dbn, report) = pretrain(
            &dataset(20),
            &config(),
            LabelMode::Classification,
            &mut rng,
            &mut NoopMonitor,
        )
        .unwrap();
        assert_eq!(dbn.n_layers(), 2);
        assert_eq!(report.layer_costs.len(), 2);
        assert!(report.layer_costs.iter().all(|c| c.len() == 2));
        assert!(report.final_cost(1).is_some());
    }

    #[test]
    fn test_batch_larger_than_split_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = PretrainConfig {
            batch_size: 50,
            ..config()
        };
        let err = pretrain(
            &dataset(20),
            &cfg,
            LabelMode::Classification,
            &mut rng,
            &mut NoopMonitor,
        )
        .unwrap_err();
        assert!(matches!(err, DbnError::Configuration(_)));
    }

    #[test]
    fn test_label_mode_mismatch_rejected() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = pretrain(
            &dataset(20),
            &config(),
            LabelMode::Regression,
            &mut rng,
            &mut NoopMonitor,
        )
        .unwrap_err();
        assert!(matches!(err, DbnError::ShapeMismatch(_)));
    }

    #[test]
    fn test_out_of_range_class_rejected_before_training() {
        let x = Array2::from_shape_fn((20, 6), |(i, j)| ((i + j) % 2) as f32);
        let y = Array1::from_shape_fn(20, |i| if i == 3 { 5 } else { i % 2 });
        let ds = Dataset::chronological(x, Labels::Classes(y), 0.2, 0.2).unwrap();

        #[derive(Default)]
        struct Layers(usize);
        impl TrainingMonitor for Layers {
            fn on_pretrain_layer(&mut self, _layer: usize, _recurrent: bool) {
                self.0 += 1;
            }
        }

        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = Layers::default();
        let err = pretrain(&ds, &config(), LabelMode::Classification, &mut rng, &mut seen)
            .unwrap_err();
        assert!(matches!(err, DbnError::ShapeMismatch(_)));
        assert_eq!(seen.0, 0);
    }

    #[test]
    fn test_zero_epochs_leaves_weights() {
        let mut rng = StdRng::seed_from_u64(9);
        let cfg = PretrainConfig {
            epochs: 0,
            ..config()
        };
        let (_, report) = pretrain(
            &dataset(20),
            &cfg,
            LabelMode::Classification,
            &mut rng,
            &mut NoopMonitor,
        )
        .unwrap();
        assert!(report.layer_costs.iter().all(Vec::is_empty));
        assert_eq!(report.final_cost(0), None);
    }
}
