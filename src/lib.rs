//! # RNN-RBM Deep Belief Network
//!
//! A deep belief network for time-ordered data. The stack is a series of
//! sigmoid hidden layers whose weights are shared with generative models:
//! plain RBMs below, and an RNN-RBM at the top whose biases are driven by a
//! recurrent state carried across the sequence.
//!
//! Training happens in two phases on the same parameters:
//!
//! 1. **Pretraining**: greedy layer-wise contrastive divergence (CD-k), bottom
//!    to top, with the recurrent state chained from batch to batch.
//! 2. **Fine-tuning**: minibatch SGD on the supervised objective (softmax
//!    negative log-likelihood or squared error) with patience-based early
//!    stopping.
//!
//! ## Structure
//!
//! - [`core`]: Error types, activations, parameter stores
//! - [`layers`]: RBM, RNN-RBM, hidden, and output layers
//! - [`model`]: The layer stack builder ([`Dbn`])
//! - [`data`]: Dataset splits and minibatch slicing
//! - [`config`]: Typed hyperparameter records
//! - [`training`]: Pretraining and fine-tuning drivers, monitors
//! - [`checkpoint`]: JSON snapshots
//! - [`utils`]: Math utilities
//!
//! ## Example
//!
//! ```no_run
//! use rand::{rngs::StdRng, SeedableRng};
//! use rnnrbm_dbn::{finetune, pretrain, Dataset, FinetuneConfig, LabelMode, LogMonitor, PretrainConfig};
//!
//! # fn run(dataset: Dataset) -> rnnrbm_dbn::DbnResult<()> {
//! let mut rng = StdRng::seed_from_u64(42);
//! let (mut dbn, _) = pretrain(
//!     &dataset,
//!     &PretrainConfig::default(),
//!     LabelMode::Classification,
//!     &mut rng,
//!     &mut LogMonitor,
//! )?;
//! let report = finetune(&dataset, &mut dbn, &FinetuneConfig::default(), &mut LogMonitor)?;
//! println!("best validation loss {}", report.best_validation_loss);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod data;
pub mod layers;
pub mod model;
pub mod training;
pub mod utils;

pub use crate::core::{Activation, DbnError, DbnResult, LayerParams, OutputParams, RecurrentParams};
pub use config::{EarlyStoppingPolicy, FinetuneConfig, PretrainConfig};
pub use data::{Dataset, LabelBatch, Labels, Split};
pub use layers::{LabelMode, Prediction};
pub use model::{Architecture, Dbn};
pub use training::{
    finetune, pretrain, FinetuneReport, LogMonitor, NoopMonitor, PretrainReport, TrainingMonitor,
    ValidationEvent,
};
