//! Core building blocks shared by every layer.
//!
//! - [`DbnError`] / [`DbnResult`]: the crate error taxonomy
//! - [`Activation`]: elementwise nonlinearities with output-side derivatives
//! - [`params`]: canonical parameter stores, one per layer position
//!
//! Parameters live in exactly one place. Generative training borrows a store
//! mutably, discriminative forward passes borrow it shared, so an update made
//! through either view is visible to the other without copying.

pub mod params;

use ndarray::Array2;
use thiserror::Error;

pub use params::{Gradient, LayerParams, OutputParams, ParamMut, RecurrentParams};

/// Error type for model construction and training.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbnError {
    /// Missing or invalid hyperparameters, or an impossible architecture.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// A batch or label array disagrees with a layer's configured shape.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Snapshot could not be written, read, or rebuilt.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

pub type DbnResult<T> = Result<T, DbnError>;

/// Fail with [`DbnError::ShapeMismatch`] unless `actual == expected`.
pub(crate) fn check_width(what: &str, actual: usize, expected: usize) -> DbnResult<()> {
    if actual != expected {
        return Err(DbnError::ShapeMismatch(format!(
            "{what}: expected width {expected}, got {actual}"
        )));
    }
    Ok(())
}

/// Fail with [`DbnError::ShapeMismatch`] unless a matrix has the expected shape.
pub(crate) fn check_dim(what: &str, actual: (usize, usize), expected: (usize, usize)) -> DbnResult<()> {
    if actual != expected {
        return Err(DbnError::ShapeMismatch(format!(
            "{what}: expected shape {expected:?}, got {actual:?}"
        )));
    }
    Ok(())
}

/// Activation function trait for layer nonlinearities.
///
/// The derivative is expressed in terms of the activation's *output*, which is
/// what back-propagation has on hand after a forward pass.
pub trait Activation: Send + Sync {
    /// Apply activation to a matrix (elementwise): f(X)
    fn apply_matrix(&self, x: &Array2<f32>) -> Array2<f32>;

    /// f'(x) evaluated from y = f(x), elementwise.
    fn derivative_from_output(&self, y: &Array2<f32>) -> Array2<f32>;

    /// Name for debugging and snapshots
    fn name(&self) -> &'static str;
}

/// Logistic sigmoid: f(x) = 1 / (1 + e^-x), f'(x) = f(x)(1 - f(x))
///
/// The fixed nonlinearity of every hidden transform layer.
#[derive(Debug, Clone, Copy)]
pub struct SigmoidActivation;

impl Activation for SigmoidActivation {
    fn apply_matrix(&self, x: &Array2<f32>) -> Array2<f32> {
        x.mapv(crate::utils::sigmoid)
    }

    fn derivative_from_output(&self, y: &Array2<f32>) -> Array2<f32> {
        y.mapv(crate::utils::d_sigmoid_from_output)
    }

    fn name(&self) -> &'static str {
        "sigmoid"
    }
}

/// Tanh activation: f(x) = tanh(x), f'(x) = 1 - tanh²(x)
///
/// Drives the recurrent state of the RNN-RBM.
#[derive(Debug, Clone, Copy)]
pub struct TanhActivation;

impl Activation for TanhActivation {
    fn apply_matrix(&self, x: &Array2<f32>) -> Array2<f32> {
        x.mapv(f32::tanh)
    }

    fn derivative_from_output(&self, y: &Array2<f32>) -> Array2<f32> {
        y.mapv(|t| 1.0 - t * t)
    }

    fn name(&self) -> &'static str {
        "tanh"
    }
}
