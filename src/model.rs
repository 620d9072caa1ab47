//! Layer stack builder: a deep belief network with an RNN-RBM top layer.
//!
//! ## Architecture
//!
//! ```text
//!            output layer (softmax / linear)
//!                     ▲
//!   position L-1:  HiddenLayer ── shares W, b_h ── RnnRbm  (generative primary)
//!                     ▲
//!   position i:    HiddenLayer ── shares W, b_h ── Rbm     (discriminative primary)
//!                     ▲
//!                   input x
//! ```
//!
//! Each position owns one [`LayerParams`] store. Pretraining mutates it through
//! the generative view, fine-tuning through the discriminative view. Because the
//! store is never duplicated, both phases train the same weights.

use crate::core::{
    check_dim, check_width, DbnError, DbnResult, Gradient, LayerParams, OutputParams, ParamMut,
    RecurrentParams,
};
use crate::data::LabelBatch;
use crate::layers::{HiddenLayer, LabelMode, OutputLayer, Prediction, Rbm, RnnRbm};
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Standard deviation of the RNN-RBM visible-hidden weights at initialisation.
const RNN_RBM_WEIGHT_STD: f32 = 0.01;
/// Standard deviation of the recurrent weights at initialisation.
const RECURRENT_WEIGHT_STD: f32 = 0.0001;

/// Shape of a network: every dimension the stack builder needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub n_ins: usize,
    pub hidden_layer_sizes: Vec<usize>,
    pub hidden_recurrent: usize,
    pub n_outs: usize,
    pub mode: LabelMode,
}

impl Architecture {
    /// # Errors
    /// - `Configuration` if there are no hidden layers or any dimension is zero
    pub fn validate(&self) -> DbnResult<()> {
        if self.hidden_layer_sizes.is_empty() {
            return Err(DbnError::Configuration(
                "at least one hidden layer is required".to_string(),
            ));
        }
        if self.n_ins == 0 || self.n_outs == 0 || self.hidden_recurrent == 0 {
            return Err(DbnError::Configuration(format!(
                "dimensions must be positive: n_ins={}, n_outs={}, hidden_recurrent={}",
                self.n_ins, self.n_outs, self.hidden_recurrent
            )));
        }
        if let Some(i) = self.hidden_layer_sizes.iter().position(|&s| s == 0) {
            return Err(DbnError::Configuration(format!(
                "hidden layer {i} has size 0"
            )));
        }
        Ok(())
    }

    pub fn n_layers(&self) -> usize {
        self.hidden_layer_sizes.len()
    }

    /// Input width of hidden position `i`.
    pub fn layer_input_size(&self, i: usize) -> usize {
        if i == 0 {
            self.n_ins
        } else {
            self.hidden_layer_sizes[i - 1]
        }
    }
}

/// Deep belief network: RBM stack, RNN-RBM top layer, supervised output layer.
#[derive(Debug)]
pub struct Dbn {
    arch: Architecture,
    layers: Vec<LayerParams>,
    recurrent: RecurrentParams,
    output: OutputParams,
    hidden: Vec<HiddenLayer>,
    rbms: Vec<Rbm>,
    rnn_rbm: RnnRbm,
    output_layer: OutputLayer,
}

impl Dbn {
    /// Build the stack, drawing every initial weight from `rng`.
    ///
    /// Positions below the top get freshly initialised sigmoid-layer weights
    /// that their RBM then shares. The top position is created as an RNN-RBM
    /// first and the hidden transform reads its weights.
    ///
    /// # Errors
    /// - `Configuration` if the architecture is invalid; nothing is allocated
    pub fn new<R: Rng + ?Sized>(arch: Architecture, rng: &mut R) -> DbnResult<Self> {
        arch.validate()?;
        let n_layers = arch.n_layers();
        let top = n_layers - 1;

        let mut layers = Vec::with_capacity(n_layers);
        for i in 0..top {
            let n_in = arch.layer_input_size(i);
            let n_out = arch.hidden_layer_sizes[i];
            layers.push(LayerParams::sigmoid_uniform(n_in, n_out, rng));
        }

        let n_visible = arch.layer_input_size(top);
        let n_hidden = arch.hidden_layer_sizes[top];
        layers.push(LayerParams::gaussian(
            n_visible,
            n_hidden,
            RNN_RBM_WEIGHT_STD,
            rng,
        ));
        let recurrent = RecurrentParams::gaussian(
            n_visible,
            n_hidden,
            arch.hidden_recurrent,
            RECURRENT_WEIGHT_STD,
            rng,
        );
        let output = OutputParams::zeros(n_hidden, arch.n_outs);

        Self::from_parts(arch, layers, recurrent, output)
    }

    /// Assemble a network around existing parameter stores.
    ///
    /// # Errors
    /// - `Configuration` if the architecture is invalid
    /// - `ShapeMismatch` if any store disagrees with the architecture
    pub fn from_parts(
        arch: Architecture,
        layers: Vec<LayerParams>,
        recurrent: RecurrentParams,
        output: OutputParams,
    ) -> DbnResult<Self> {
        arch.validate()?;
        let n_layers = arch.n_layers();
        check_width("layer parameter count", layers.len(), n_layers)?;
        for (i, p) in layers.iter().enumerate() {
            check_width(&format!("layer {i} inputs"), p.n_in(), arch.layer_input_size(i))?;
            check_width(&format!("layer {i} outputs"), p.n_out(), arch.hidden_layer_sizes[i])?;
            check_width(&format!("layer {i} hidden bias"), p.hbias.len(), p.n_out())?;
            check_width(&format!("layer {i} visible bias"), p.vbias.len(), p.n_in())?;
        }

        let top = n_layers - 1;
        let n_visible = arch.layer_input_size(top);
        let n_hidden = arch.hidden_layer_sizes[top];
        let n_rec = arch.hidden_recurrent;
        check_dim("recurrent w_uh", recurrent.w_uh.dim(), (n_rec, n_hidden))?;
        check_dim("recurrent w_uv", recurrent.w_uv.dim(), (n_rec, n_visible))?;
        check_dim("recurrent w_vu", recurrent.w_vu.dim(), (n_visible, n_rec))?;
        check_dim("recurrent w_uu", recurrent.w_uu.dim(), (n_rec, n_rec))?;
        check_width("recurrent bu", recurrent.bu.len(), n_rec)?;
        check_width("recurrent u0", recurrent.u0.len(), n_rec)?;
        check_dim("output weights", output.w.dim(), (n_hidden, arch.n_outs))?;
        check_width("output bias", output.b.len(), arch.n_outs)?;

        let hidden = (0..n_layers)
            .map(|i| HiddenLayer::new(arch.layer_input_size(i), arch.hidden_layer_sizes[i]))
            .collect();
        let rbms = (0..top)
            .map(|i| Rbm::new(arch.layer_input_size(i), arch.hidden_layer_sizes[i]))
            .collect();
        let rnn_rbm = RnnRbm::new(n_visible, n_hidden, n_rec);
        let output_layer = OutputLayer::new(n_hidden, arch.n_outs, arch.mode);

        Ok(Self {
            arch,
            layers,
            recurrent,
            output,
            hidden,
            rbms,
            rnn_rbm,
            output_layer,
        })
    }

    pub fn architecture(&self) -> &Architecture {
        &self.arch
    }

    pub fn n_layers(&self) -> usize {
        self.arch.n_layers()
    }

    pub fn label_mode(&self) -> LabelMode {
        self.arch.mode
    }

    /// Canonical parameter store of hidden position `i`, if the stack has one.
    pub fn layer_params(&self, i: usize) -> Option<&LayerParams> {
        self.layers.get(i)
    }

    pub fn layers(&self) -> &[LayerParams] {
        &self.layers
    }

    pub fn recurrent_params(&self) -> &RecurrentParams {
        &self.recurrent
    }

    pub fn output_params(&self) -> &OutputParams {
        &self.output
    }

    /// Flat list of trainable tensors: each position's `(W, b_h)`, then the output `(W, b)`.
    pub fn params_mut(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = Vec::with_capacity(2 * self.layers.len() + 2);
        for layer in &mut self.layers {
            params.push(ParamMut::Matrix(&mut layer.w));
            params.push(ParamMut::Vector(&mut layer.hbias));
        }
        params.push(ParamMut::Matrix(&mut self.output.w));
        params.push(ParamMut::Vector(&mut self.output.b));
        params
    }

    /// Outputs of every hidden position for input `x`.
    pub fn activations(&self, x: ArrayView2<f32>) -> DbnResult<Vec<Array2<f32>>> {
        check_width("network input", x.ncols(), self.arch.n_ins)?;
        let mut acts: Vec<Array2<f32>> = Vec::with_capacity(self.hidden.len());
        for (layer, params) in self.hidden.iter().zip(&self.layers) {
            let next = match acts.last() {
                Some(prev) => layer.forward(params, prev.view())?,
                None => layer.forward(params, x)?,
            };
            acts.push(next);
        }
        Ok(acts)
    }

    /// Input seen by hidden position `layer`: `x` propagated through the positions below it.
    pub fn layer_input(&self, layer: usize, x: ArrayView2<f32>) -> DbnResult<Array2<f32>> {
        check_width("network input", x.ncols(), self.arch.n_ins)?;
        let mut current = x.to_owned();
        for i in 0..layer.min(self.hidden.len()) {
            current = self.hidden[i].forward(&self.layers[i], current.view())?;
        }
        Ok(current)
    }

    fn top_activation(&self, x: ArrayView2<f32>) -> DbnResult<Array2<f32>> {
        self.layer_input(self.hidden.len(), x)
    }

    /// Predicted class indices or continuous values for a batch.
    pub fn predict(&self, x: ArrayView2<f32>) -> DbnResult<Prediction> {
        let top = self.top_activation(x)?;
        self.output_layer.predict(&self.output, top.view())
    }

    /// Class distribution of shape `(B, n_outs)`; the raw output in regression mode.
    pub fn predict_proba(&self, x: ArrayView2<f32>) -> DbnResult<Array2<f32>> {
        let top = self.top_activation(x)?;
        self.output_layer.p_y_given_x(&self.output, top.view())
    }

    /// Sum of per-example scores (misclassifications or squared errors).
    pub fn error_sum(&self, x: ArrayView2<f32>, labels: LabelBatch<'_>) -> DbnResult<f32> {
        let top = self.top_activation(x)?;
        self.output_layer.error_sum(&self.output, top.view(), labels)
    }

    /// Mean score over a batch: 0/1 error rate or mean squared error.
    pub fn errors(&self, x: ArrayView2<f32>, labels: LabelBatch<'_>) -> DbnResult<f32> {
        let top = self.top_activation(x)?;
        self.output_layer.errors(&self.output, top.view(), labels)
    }

    /// Fine-tuning loss on a batch with gradients in [`Dbn::params_mut`] order.
    pub fn loss_and_gradients(
        &self,
        x: ArrayView2<f32>,
        labels: LabelBatch<'_>,
    ) -> DbnResult<(f32, Vec<Gradient>)> {
        let acts = self.activations(x)?;
        let top = acts.len() - 1;
        let (loss, delta) = self
            .output_layer
            .loss_and_delta(&self.output, acts[top].view(), labels)?;
        let out = self.output_layer.backward(&self.output, acts[top].view(), &delta);

        // collected top-down, reversed at the end
        let mut grads = vec![Gradient::Vector(out.b), Gradient::Matrix(out.w)];
        let mut delta = out.delta_in;
        for i in (0..acts.len()).rev() {
            let input = if i == 0 { x.view() } else { acts[i - 1].view() };
            let g = self.hidden[i].backward(&self.layers[i], input, &acts[i], &delta);
            grads.push(Gradient::Vector(g.b));
            grads.push(Gradient::Matrix(g.w));
            delta = g.delta_in;
        }
        grads.reverse();
        Ok((loss, grads))
    }

    /// One gradient-descent step on every trainable tensor; returns the batch loss.
    pub fn sgd_step(
        &mut self,
        x: ArrayView2<f32>,
        labels: LabelBatch<'_>,
        learning_rate: f32,
    ) -> DbnResult<f32> {
        let (loss, grads) = self.loss_and_gradients(x, labels)?;
        for (mut param, grad) in self.params_mut().into_iter().zip(&grads) {
            param.descend(grad, learning_rate)?;
        }
        Ok(loss)
    }

    /// Initial recurrent state, the seed at the start of every pretraining epoch.
    pub fn initial_recurrent_state(&self) -> Array1<f32> {
        self.recurrent.u0.clone()
    }

    /// CD-k update of plain RBM position `layer` on its (already propagated) input.
    ///
    /// # Errors
    /// - `Configuration` if `layer` is the recurrent top position or out of range
    pub fn rbm_step<R: Rng + ?Sized>(
        &mut self,
        layer: usize,
        visible: ArrayView2<f32>,
        k: usize,
        learning_rate: f32,
        rng: &mut R,
    ) -> DbnResult<f32> {
        let rbm = self.rbms.get_mut(layer).ok_or_else(|| {
            DbnError::Configuration(format!("layer {layer} is not a plain RBM position"))
        })?;
        rbm.contrastive_divergence(&mut self.layers[layer], visible, k, learning_rate, rng)
    }

    /// CD-k update of the RNN-RBM top position seeded with `state`.
    pub fn rnn_rbm_step<R: Rng + ?Sized>(
        &mut self,
        visible: ArrayView2<f32>,
        state: &Array1<f32>,
        k: usize,
        learning_rate: f32,
        rng: &mut R,
    ) -> DbnResult<f32> {
        let top = self.layers.len() - 1;
        self.rnn_rbm.contrastive_divergence(
            &mut self.layers[top],
            &mut self.recurrent,
            visible,
            state,
            k,
            learning_rate,
            rng,
        )
    }

    /// Recurrent state after `visible`, the seed for the next batch.
    pub fn advance_recurrent_state(
        &self,
        visible: ArrayView2<f32>,
        state: &Array1<f32>,
    ) -> DbnResult<Array1<f32>> {
        let top = self.layers.len() - 1;
        self.rnn_rbm
            .advance_state(&self.layers[top], &self.recurrent, visible, state)
    }
}
