//! Supervised fine-tuning with patience-based early stopping.

use super::early_stopping::EarlyStopping;
use super::monitor::{TrainingMonitor, ValidationEvent};
use crate::config::FinetuneConfig;
use crate::core::{check_width, DbnError, DbnResult};
use crate::data::{Dataset, Split};
use crate::model::Dbn;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Outcome of one fine-tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct FinetuneReport {
    /// Lowest validation loss seen; infinite if no check ever improved.
    pub best_validation_loss: f32,
    /// Test score frozen at the last validation improvement.
    pub test_score: Option<f32>,
    /// 1-based epoch of the best validation loss, 0 if none.
    pub best_epoch: usize,
    pub best_iter: Option<usize>,
    pub final_patience: usize,
    /// Minibatch updates performed.
    pub iterations: usize,
    pub epochs_run: usize,
    pub elapsed: Duration,
}

/// Fine-tune every parameter of `dbn` by minibatch SGD until patience runs out
/// or `config.epochs` is reached.
///
/// # Errors
/// - `Configuration` if `config` is invalid, the training split holds fewer
///   rows than one batch, or the validation or test split is empty
/// - `ShapeMismatch` if the dataset's width or label kind disagrees with `dbn`,
///   or any split holds a label the output layer cannot represent; `dbn` is
///   left untouched
pub fn finetune(
    dataset: &Dataset,
    dbn: &mut Dbn,
    config: &FinetuneConfig,
    monitor: &mut dyn TrainingMonitor,
) -> DbnResult<FinetuneReport> {
    config.validate()?;
    check_width("dataset features", dataset.n_features(), dbn.architecture().n_ins)?;
    if dataset.label_mode() != dbn.label_mode() {
        return Err(DbnError::ShapeMismatch(format!(
            "dataset labels are {:?}, network expects {:?}",
            dataset.label_mode(),
            dbn.label_mode()
        )));
    }
    dataset.check_outputs(dbn.architecture().n_outs)?;
    if dataset.valid.is_empty() || dataset.test.is_empty() {
        return Err(DbnError::Configuration(
            "validation and test splits must be non-empty".to_string(),
        ));
    }

    let start = Instant::now();
    let batch_size = config.batch_size;
    let n_train_batches = dataset.train.n_batches(batch_size);
    let mut stopper = EarlyStopping::new(n_train_batches, config.early_stopping)?;

    let mut test_score = None;
    let mut iterations = 0;
    let mut epoch = 0;
    let mut done = false;

    while epoch < config.epochs && !done {
        epoch += 1;
        for minibatch in 0..n_train_batches {
            let (x, labels) = dataset.train.batch(minibatch, batch_size);
            dbn.sgd_step(x, labels, config.learning_rate)?;

            let iter = stopper.iteration(epoch, minibatch);
            iterations = iter + 1;

            if stopper.should_validate(iter) {
                let validation_loss = score_split(dbn, &dataset.valid, batch_size)?;
                let outcome = stopper.record(iter, epoch, validation_loss);
                let mut event_test = None;
                if outcome.improved() {
                    let score = score_split(dbn, &dataset.test, batch_size)?;
                    test_score = Some(score);
                    event_test = Some(score);
                }
                monitor.on_validation(&ValidationEvent {
                    epoch,
                    minibatch: minibatch + 1,
                    n_train_batches,
                    iter,
                    validation_loss,
                    improved: outcome.improved(),
                    significant: outcome.significant(),
                    patience: stopper.patience(),
                    test_score: event_test,
                });
            }

            if stopper.exhausted(iter) {
                done = true;
                break;
            }
        }
    }

    let report = FinetuneReport {
        best_validation_loss: stopper.best_validation_loss(),
        test_score,
        best_epoch: stopper.best_epoch(),
        best_iter: stopper.best_iter(),
        final_patience: stopper.patience(),
        iterations,
        epochs_run: epoch,
        elapsed: start.elapsed(),
    };
    monitor.on_finetune_end(&report);
    Ok(report)
}

/// Per-example mean error of `dbn` over the whole of `split`.
///
/// Chunks of `chunk_size` rows are scored in parallel and pooled by example
/// count, so a short last chunk carries its true weight.
pub fn score_split(dbn: &Dbn, split: &Split, chunk_size: usize) -> DbnResult<f32> {
    if split.is_empty() {
        return Err(DbnError::Configuration("cannot score an empty split".to_string()));
    }
    let sums = split
        .chunks(chunk_size)
        .par_iter()
        .map(|(x, labels)| dbn.error_sum(*x, *labels))
        .collect::<DbnResult<Vec<f32>>>()?;
    Ok(sums.iter().sum::<f32>() / split.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Labels;
    use crate::layers::LabelMode;
    use crate::model::Architecture;
    use crate::training::NoopMonitor;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn classification() -> (Dataset, Dbn) {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| if (i + j) % 3 == 0 { 1.0 } else { 0.0 });
        let y = Array1::from_shape_fn(40, |i| i % 3 % 2);
        let ds = Dataset::chronological(x, Labels::Classes(y), 0.25, 0.25).unwrap();
        let arch = Architecture {
            n_ins: 3,
            hidden_layer_sizes: vec![4],
            hidden_recurrent: 2,
            n_outs: 2,
            mode: LabelMode::Classification,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let dbn = Dbn::new(arch, &mut rng).unwrap();
        (ds, dbn)
    }

    #[test]
    fn test_score_split_matches_whole_batch() {
        let (ds, dbn) = classification();
        let whole = dbn.errors(ds.valid.x().view(), ds.valid.y().view()).unwrap();
        let chunked = score_split(&dbn, &ds.valid, 3).unwrap();
        assert_abs_diff_eq!(whole, chunked, epsilon = 1e-6);
    }

    #[test]
    fn test_first_check_always_improves() {
        let (ds, mut dbn) = classification();
        let config = FinetuneConfig {
            learning_rate: 0.1,
            batch_size: 5,
            epochs: 1,
            ..FinetuneConfig::default()
        };
        let report = finetune(&ds, &mut dbn, &config, &mut NoopMonitor).unwrap();
        assert_eq!(report.epochs_run, 1);
        assert_eq!(report.iterations, 4);
        assert_eq!(report.best_iter, Some(3));
        assert!(report.test_score.is_some());
        assert_eq!(report.final_patience, 120);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let (ds, _) = classification();
        let arch = Architecture {
            n_ins: 5,
            hidden_layer_sizes: vec![4],
            hidden_recurrent: 2,
            n_outs: 2,
            mode: LabelMode::Classification,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let mut dbn = Dbn::new(arch, &mut rng).unwrap();
        let err = finetune(&ds, &mut dbn, &FinetuneConfig::default(), &mut NoopMonitor)
            .unwrap_err();
        assert!(matches!(err, DbnError::ShapeMismatch(_)));
    }
}
