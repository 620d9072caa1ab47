//! Layer primitives.
//!
//! ## Submodules
//!
//! - [`rbm`]: plain RBM, the generative view of lower layer positions
//! - [`rnn_rbm`]: recurrent RBM, the generative view of the last position
//! - [`hidden`]: sigmoid transform, the discriminative view of every position
//! - [`output`]: softmax / linear output layer and [`LabelMode`]

pub mod hidden;
pub mod output;
pub mod rbm;
pub mod rnn_rbm;

pub use hidden::{HiddenGrads, HiddenLayer};
pub use output::{LabelMode, OutputGrads, OutputLayer, Prediction};
pub use rbm::{GibbsChain, Rbm};
pub use rnn_rbm::{BiasSequence, RnnRbm, RnnRbmGrads};
