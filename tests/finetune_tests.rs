//! Integration tests for early-stopped fine-tuning.
//!
//! These tests verify the supervised loop:
//! - Validation cadence and initial patience follow the training split size
//! - The test score is only refreshed when validation strictly improves
//! - Patience never shrinks and bounds the number of updates
//! - A run with no progress stops as soon as its patience is spent

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rnnrbm_dbn::training::{CheckOutcome, EarlyStopping};
use rnnrbm_dbn::{
    finetune, Architecture, Dataset, Dbn, EarlyStoppingPolicy, FinetuneConfig, FinetuneReport,
    LabelMode, Labels, Split, TrainingMonitor, ValidationEvent,
};

#[derive(Default)]
struct Recorder {
    events: Vec<ValidationEvent>,
    finished: Option<FinetuneReport>,
}

impl TrainingMonitor for Recorder {
    fn on_validation(&mut self, event: &ValidationEvent) {
        self.events.push(event.clone());
    }

    fn on_finetune_end(&mut self, report: &FinetuneReport) {
        self.finished = Some(report.clone());
    }
}

fn split(rows: usize, offset: usize) -> Split {
    let x = Array2::from_shape_fn((rows, 4), |(i, j)| {
        if ((i + offset) + j) % 4 < 2 {
            1.0
        } else {
            0.0
        }
    });
    let y = Array1::from_shape_fn(rows, |i| ((i + offset) % 4 < 2) as usize);
    Split::new(x, Labels::Classes(y)).expect("matching rows")
}

/// 100 training rows, 20 validation rows, 20 test rows.
fn dataset() -> Dataset {
    Dataset::new(split(100, 0), split(20, 100), split(20, 120)).expect("consistent splits")
}

fn network(seed: u64) -> Dbn {
    let arch = Architecture {
        n_ins: 4,
        hidden_layer_sizes: vec![6, 5],
        hidden_recurrent: 3,
        n_outs: 2,
        mode: LabelMode::Classification,
    };
    let mut rng = StdRng::seed_from_u64(seed);
    Dbn::new(arch, &mut rng).expect("valid architecture")
}

#[test]
fn test_validation_cadence_for_hundred_rows() {
    let config = FinetuneConfig {
        learning_rate: 0.1,
        batch_size: 10,
        epochs: 3,
        ..FinetuneConfig::default()
    };
    let mut dbn = network(1);
    let mut rec = Recorder::default();
    let report = finetune(&dataset(), &mut dbn, &config, &mut rec).expect("fine-tuning runs");

    let iters: Vec<usize> = rec.events.iter().map(|e| e.iter).collect();
    assert_eq!(iters, vec![9, 19, 29]);
    let first = &rec.events[0];
    assert_eq!(first.epoch, 1);
    assert_eq!(first.minibatch, 10);
    assert_eq!(first.n_train_batches, 10);
    assert!(first.improved);
    assert_eq!(first.patience, 300);

    assert_eq!(report.iterations, 30);
    assert_eq!(report.epochs_run, 3);
    assert_eq!(rec.finished.as_ref(), Some(&report));
}

#[test]
fn test_test_score_only_changes_on_improvement() {
    let config = FinetuneConfig {
        learning_rate: 0.5,
        batch_size: 10,
        epochs: 20,
        ..FinetuneConfig::default()
    };
    let mut dbn = network(2);
    let mut rec = Recorder::default();
    let report = finetune(&dataset(), &mut dbn, &config, &mut rec).expect("fine-tuning runs");

    let mut best = f32::INFINITY;
    let mut last_test = None;
    for event in &rec.events {
        assert_eq!(event.improved, event.validation_loss < best);
        assert_eq!(event.test_score.is_some(), event.improved);
        if event.improved {
            best = event.validation_loss;
            last_test = event.test_score;
        }
    }
    assert_eq!(report.test_score, last_test);
    assert_eq!(report.best_validation_loss, best);
}

#[test]
fn test_patience_monotone_and_bounds_iterations() {
    let config = FinetuneConfig {
        learning_rate: 0.3,
        batch_size: 10,
        epochs: 15,
        ..FinetuneConfig::default()
    };
    let mut dbn = network(3);
    let mut rec = Recorder::default();
    let report = finetune(&dataset(), &mut dbn, &config, &mut rec).expect("fine-tuning runs");

    let mut patience = 300;
    for event in &rec.events {
        assert!(event.patience >= patience, "patience decreased at iter {}", event.iter);
        patience = event.patience;
    }
    assert_eq!(report.final_patience, patience);

    let last_iter = report.iterations - 1;
    assert!(last_iter <= report.final_patience.max(config.epochs * 10));
}

#[test]
fn test_stalled_run_stops_when_patience_is_spent() {
    let targets = |rows: usize, offset: usize| {
        let x = Array2::from_shape_fn((rows, 4), |(i, j)| ((i + offset + j) % 2) as f32);
        let y = Array2::from_shape_fn((rows, 1), |(i, _)| 0.5 + ((i + offset) % 3) as f32);
        Split::new(x, Labels::Targets(y)).expect("matching rows")
    };
    let dataset =
        Dataset::new(targets(100, 0), targets(20, 100), targets(20, 120)).expect("consistent splits");
    let arch = Architecture {
        n_ins: 4,
        hidden_layer_sizes: vec![3],
        hidden_recurrent: 2,
        n_outs: 1,
        mode: LabelMode::Regression,
    };
    let mut rng = StdRng::seed_from_u64(4);
    let mut dbn = Dbn::new(arch, &mut rng).expect("valid architecture");

    // a vanishing step size can never beat the improvement threshold
    let config = FinetuneConfig {
        learning_rate: 1e-9,
        batch_size: 10,
        epochs: 100,
        early_stopping: EarlyStoppingPolicy {
            patience_epochs: 1,
            ..EarlyStoppingPolicy::default()
        },
    };
    let mut rec = Recorder::default();
    let report = finetune(&dataset, &mut dbn, &config, &mut rec).expect("fine-tuning runs");

    assert_eq!(rec.events[0].iter, 4);
    assert!(rec.events[0].significant);
    assert!(rec.events.iter().skip(1).all(|e| !e.significant));
    assert_eq!(report.final_patience, 10);
    assert_eq!(report.iterations, 11);
    assert_eq!(report.epochs_run, 2);
    assert_eq!(report.best_epoch, 1);
}

#[test]
fn test_threshold_boundary_through_public_api() {
    let mut stopper =
        EarlyStopping::new(10, EarlyStoppingPolicy::default()).expect("ten batches");
    stopper.record(9, 1, 0.4);
    let patience = stopper.patience();

    let above = stopper.record(199, 20, 0.4 * 0.995 + 1e-4);
    assert_eq!(above, CheckOutcome::Improved { significant: false });
    assert_eq!(stopper.patience(), patience);

    let below = stopper.record(209, 21, stopper.best_validation_loss() * 0.995 - 1e-4);
    assert_eq!(below, CheckOutcome::Improved { significant: true });
    assert_eq!(stopper.patience(), 418);
}

#[test]
fn test_out_of_range_validation_label_leaves_network_untouched() {
    let x = Array2::from_shape_fn((20, 4), |(i, j)| ((i + j) % 2) as f32);
    let y = Array1::from_shape_fn(20, |i| if i == 19 { 7 } else { i % 2 });
    let valid = Split::new(x, Labels::Classes(y)).expect("matching rows");
    let ds = Dataset::new(split(100, 0), valid, split(20, 120)).expect("consistent splits");

    let mut dbn = network(4);
    let before = dbn.output_params().clone();
    let mut rec = Recorder::default();
    let err = finetune(&ds, &mut dbn, &FinetuneConfig::default(), &mut rec).unwrap_err();

    assert!(matches!(err, rnnrbm_dbn::DbnError::ShapeMismatch(_)));
    assert_eq!(dbn.output_params(), &before);
    assert!(rec.events.is_empty());
    assert!(rec.finished.is_none());
}
