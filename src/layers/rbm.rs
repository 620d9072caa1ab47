//! Bernoulli–Bernoulli Restricted Boltzmann Machine trained with CD-k.
//!
//! ## Energy
//!
//! ```text
//! E(v, h) = -v·b_v - h·b_h - vᵀ W h
//! F(v)    = -v·b_v - Σ_j softplus((v W + b_h)_j)        (free energy)
//! ```
//!
//! ## CD-k update
//!
//! ```text
//! ΔW   = lr · (v0ᵀ p(h|v0) - vkᵀ p(h|vk)) / B
//! Δb_v = lr · mean(v0 - vk)
//! Δb_h = lr · mean(p(h|v0) - p(h|vk))
//! ```
//!
//! The chain starts from a hidden sample driven by the data and alternates
//! `k` times between visible and hidden sampling.

use crate::core::{check_width, DbnResult, LayerParams};
use crate::utils::{log_sigmoid, sample_bernoulli, sigmoid, softplus};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

/// Generative view of a layer position.
///
/// Parameters are not owned here: every call borrows the canonical
/// [`LayerParams`] store, which the discriminative view reads as well.
#[derive(Debug, Clone)]
pub struct Rbm {
    pub n_visible: usize,
    pub n_hidden: usize,
    /// Visible unit flipped by the next pseudo-likelihood estimate.
    bit_index: usize,
}

/// Result of a Gibbs chain: final visible sample and hidden means at both ends.
#[derive(Debug, Clone)]
pub struct GibbsChain {
    pub ph0: Array2<f32>,
    /// Visible means that produced `vk`
    pub pvk: Array2<f32>,
    pub vk: Array2<f32>,
    pub phk: Array2<f32>,
}

impl Rbm {
    pub fn new(n_visible: usize, n_hidden: usize) -> Self {
        Self {
            n_visible,
            n_hidden,
            bit_index: 0,
        }
    }

    /// `p(h = 1 | v)` with hidden bias `hbias` (row vector or per-row matrix).
    pub fn propup(params: &LayerParams, v: ArrayView2<f32>, hbias: &Array2<f32>) -> Array2<f32> {
        (v.dot(&params.w) + hbias).mapv(sigmoid)
    }

    /// `p(v = 1 | h)` with visible bias `vbias`.
    pub fn propdown(params: &LayerParams, h: &Array2<f32>, vbias: &Array2<f32>) -> Array2<f32> {
        (h.dot(&params.w.t()) + vbias).mapv(sigmoid)
    }

    /// Free energy of every row of `v` under the given biases.
    pub fn free_energy(
        params: &LayerParams,
        v: ArrayView2<f32>,
        vbias: &Array2<f32>,
        hbias: &Array2<f32>,
    ) -> Array1<f32> {
        let wx_b = v.dot(&params.w) + hbias;
        let vbias_term = (&v * vbias).sum_axis(Axis(1));
        let hidden_term = wx_b.mapv(softplus).sum_axis(Axis(1));
        -vbias_term - hidden_term
    }

    /// Run `k` steps of block Gibbs sampling starting from the data.
    ///
    /// Bias matrices broadcast against the batch, so a single row acts as a
    /// fixed bias and a `(B, n)` matrix gives every row its own bias.
    pub fn gibbs_chain<R: Rng + ?Sized>(
        params: &LayerParams,
        v0: ArrayView2<f32>,
        vbias: &Array2<f32>,
        hbias: &Array2<f32>,
        k: usize,
        rng: &mut R,
    ) -> GibbsChain {
        let ph0 = Self::propup(params, v0, hbias);
        let mut h = sample_bernoulli(&ph0, rng);
        let mut pvk = v0.to_owned();
        let mut vk = v0.to_owned();
        let mut phk = ph0.clone();
        for _ in 0..k.max(1) {
            pvk = Self::propdown(params, &h, vbias);
            vk = sample_bernoulli(&pvk, rng);
            phk = Self::propup(params, vk.view(), hbias);
            h = sample_bernoulli(&phk, rng);
        }
        GibbsChain { ph0, pvk, vk, phk }
    }

    /// One CD-k update of `params` on a batch.
    ///
    /// Returns the pseudo-likelihood cost measured before the update.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the batch width is not `n_visible`
    pub fn contrastive_divergence<R: Rng + ?Sized>(
        &mut self,
        params: &mut LayerParams,
        batch: ArrayView2<f32>,
        k: usize,
        learning_rate: f32,
        rng: &mut R,
    ) -> DbnResult<f32> {
        check_width("rbm visible units", batch.ncols(), self.n_visible)?;
        check_width("rbm weights", params.n_in(), self.n_visible)?;
        check_width("rbm hidden units", params.n_out(), self.n_hidden)?;

        let vbias = params.vbias.clone().insert_axis(Axis(0));
        let hbias = params.hbias.clone().insert_axis(Axis(0));
        let chain = Self::gibbs_chain(params, batch, &vbias, &hbias, k, rng);
        let cost = self.pseudo_likelihood(params, batch);

        let n = batch.nrows().max(1) as f32;
        let positive = batch.t().dot(&chain.ph0);
        let negative = chain.vk.t().dot(&chain.phk);
        let dw = (positive - negative) / n;
        let dvbias = (&batch - &chain.vk).sum_axis(Axis(0)) / n;
        let dhbias = (&chain.ph0 - &chain.phk).sum_axis(Axis(0)) / n;

        params.w.scaled_add(learning_rate, &dw);
        params.vbias.scaled_add(learning_rate, &dvbias);
        params.hbias.scaled_add(learning_rate, &dhbias);

        Ok(cost)
    }

    /// Stochastic pseudo-log-likelihood of the binarised batch.
    ///
    /// Flips one visible bit per call, cycling through all visible units.
    /// A layer with no visible units has nothing to flip and scores zero.
    pub fn pseudo_likelihood(&mut self, params: &LayerParams, batch: ArrayView2<f32>) -> f32 {
        if self.n_visible == 0 {
            return 0.0;
        }
        let vbias = params.vbias.clone().insert_axis(Axis(0));
        let hbias = params.hbias.clone().insert_axis(Axis(0));
        let xi = batch.mapv(f32::round);
        let fe_xi = Self::free_energy(params, xi.view(), &vbias, &hbias);

        let mut xi_flip = xi;
        let idx = self.bit_index;
        xi_flip.column_mut(idx).mapv_inplace(|v| 1.0 - v);
        let fe_flip = Self::free_energy(params, xi_flip.view(), &vbias, &hbias);

        self.bit_index = (self.bit_index + 1) % self.n_visible;

        let n_visible = self.n_visible as f32;
        let mean_log = (&fe_flip - &fe_xi).mapv(log_sigmoid).mean().unwrap_or(0.0);
        n_visible * mean_log
    }
}
