//! Discriminative hidden transform: `σ(x · W + hbias)`.

use crate::core::{check_width, Activation, DbnResult, LayerParams, SigmoidActivation};
use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Stateless sigmoid layer over a borrowed parameter store.
///
/// It has no training step of its own: its weights move when the generative
/// layer sharing the store is pretrained, or when fine-tuning back-propagates
/// through it.
pub struct HiddenLayer {
    pub n_in: usize,
    pub n_out: usize,
    activation: Box<dyn Activation>,
}

impl std::fmt::Debug for HiddenLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiddenLayer")
            .field("n_in", &self.n_in)
            .field("n_out", &self.n_out)
            .field("activation", &self.activation.name())
            .finish()
    }
}

/// Gradients of one hidden layer, plus the error signal for the layer below.
#[derive(Debug, Clone)]
pub struct HiddenGrads {
    pub w: Array2<f32>,
    pub b: Array1<f32>,
    pub delta_in: Array2<f32>,
}

impl HiddenLayer {
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self {
            n_in,
            n_out,
            activation: Box::new(SigmoidActivation),
        }
    }

    /// Forward pass for a batch of shape `(B, n_in)`.
    pub fn forward(&self, params: &LayerParams, input: ArrayView2<f32>) -> DbnResult<Array2<f32>> {
        check_width("hidden layer input", input.ncols(), self.n_in)?;
        check_width("hidden layer weights", params.n_out(), self.n_out)?;
        let mut z = input.dot(&params.w);
        z += &params.hbias;
        Ok(self.activation.apply_matrix(&z))
    }

    /// Back-propagate `delta_out = ∂loss/∂output` through the layer.
    ///
    /// `output` must be the value returned by [`HiddenLayer::forward`] for `input`.
    pub fn backward(
        &self,
        params: &LayerParams,
        input: ArrayView2<f32>,
        output: &Array2<f32>,
        delta_out: &Array2<f32>,
    ) -> HiddenGrads {
        let dz = delta_out * &self.activation.derivative_from_output(output);
        HiddenGrads {
            w: input.t().dot(&dz),
            b: dz.sum_axis(Axis(0)),
            delta_in: dz.dot(&params.w.t()),
        }
    }
}
