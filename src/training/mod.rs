//! Training drivers: greedy pretraining, then supervised fine-tuning.
//!
//! Both drivers mutate one [`Dbn`](crate::model::Dbn) in place and report
//! progress through a [`TrainingMonitor`].

pub mod early_stopping;
pub mod finetune;
pub mod monitor;
pub mod pretrain;

pub use early_stopping::{CheckOutcome, EarlyStopping};
pub use finetune::{finetune, score_split, FinetuneReport};
pub use monitor::{LogMonitor, NoopMonitor, TrainingMonitor, ValidationEvent};
pub use pretrain::{pretrain, PretrainReport};
