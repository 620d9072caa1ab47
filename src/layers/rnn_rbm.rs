//! RNN-RBM: an RBM whose biases are driven by a recurrent state.
//!
//! Rows of a batch are consecutive timesteps. With `u_{-1}` the seed state:
//!
//! ```text
//! u_t    = tanh(b_u + v_t W_vu + u_{t-1} W_uu)
//! b_v(t) = b_v + u_{t-1} W_uv
//! b_h(t) = b_h + u_{t-1} W_uh
//! ```
//!
//! Training holds the bias sequence fixed while sampling, then descends the
//! free-energy difference
//!
//! ```text
//! C = mean_t [ F_t(v_t) - F_t(ṽ_t) ]
//! ```
//!
//! where `ṽ_t` is the end of the CD-k chain (a constant). Gradients reach the
//! RBM weights directly and the recurrent weights by back-propagation through
//! time. The seed state is an input, not a trained parameter.

use super::rbm::{GibbsChain, Rbm};
use crate::core::{check_width, Activation, DbnResult, LayerParams, RecurrentParams, TanhActivation};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;

/// Recurrent states and per-timestep biases for one batch.
#[derive(Debug, Clone)]
pub struct BiasSequence {
    /// Row `t` is `u_{t-1}`; row 0 is the seed.
    pub u_prev: Array2<f32>,
    /// Row `t` is `u_t`.
    pub u: Array2<f32>,
    pub bv_t: Array2<f32>,
    pub bh_t: Array2<f32>,
}

impl BiasSequence {
    /// State after the last timestep, the seed for the following batch.
    pub fn last_state(&self) -> Option<Array1<f32>> {
        let t = self.u.nrows();
        (t > 0).then(|| self.u.row(t - 1).to_owned())
    }
}

/// Gradients of the free-energy cost `C` for every RNN-RBM parameter.
#[derive(Debug, Clone)]
pub struct RnnRbmGrads {
    pub w: Array2<f32>,
    pub vbias: Array1<f32>,
    pub hbias: Array1<f32>,
    pub w_uh: Array2<f32>,
    pub w_uv: Array2<f32>,
    pub w_vu: Array2<f32>,
    pub w_uu: Array2<f32>,
    pub bu: Array1<f32>,
}

/// Generative view of the last layer position.
pub struct RnnRbm {
    pub n_visible: usize,
    pub n_hidden: usize,
    pub n_recurrent: usize,
    recurrence: Box<dyn Activation>,
}

impl std::fmt::Debug for RnnRbm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RnnRbm")
            .field("n_visible", &self.n_visible)
            .field("n_hidden", &self.n_hidden)
            .field("n_recurrent", &self.n_recurrent)
            .field("recurrence", &self.recurrence.name())
            .finish()
    }
}

impl RnnRbm {
    pub fn new(n_visible: usize, n_hidden: usize, n_recurrent: usize) -> Self {
        Self {
            n_visible,
            n_hidden,
            n_recurrent,
            recurrence: Box::new(TanhActivation),
        }
    }

    fn check_shapes(
        &self,
        params: &LayerParams,
        rec: &RecurrentParams,
        batch: ArrayView2<f32>,
        seed: &Array1<f32>,
    ) -> DbnResult<()> {
        check_width("rnn-rbm visible units", batch.ncols(), self.n_visible)?;
        check_width("rnn-rbm weights", params.n_in(), self.n_visible)?;
        check_width("rnn-rbm hidden units", params.n_out(), self.n_hidden)?;
        check_width("rnn-rbm recurrent units", rec.n_recurrent(), self.n_recurrent)?;
        check_width("rnn-rbm seed state", seed.len(), self.n_recurrent)
    }

    /// Compute the recurrent states and timestep biases for a whole batch.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the batch or seed disagree with the layer widths
    pub fn bias_sequence(
        &self,
        params: &LayerParams,
        rec: &RecurrentParams,
        batch: ArrayView2<f32>,
        seed: &Array1<f32>,
    ) -> DbnResult<BiasSequence> {
        self.check_shapes(params, rec, batch, seed)?;
        let steps = batch.nrows();
        let mut u_prev = Array2::zeros((steps, self.n_recurrent));
        let mut u = Array2::zeros((steps, self.n_recurrent));

        let mut state = seed.clone();
        for t in 0..steps {
            u_prev.row_mut(t).assign(&state);
            let mut a = batch.row(t).dot(&rec.w_vu) + state.dot(&rec.w_uu);
            a += &rec.bu;
            let next = self.recurrence.apply_matrix(&a.insert_axis(Axis(0)));
            state = next.row(0).to_owned();
            u.row_mut(t).assign(&state);
        }

        let mut bv_t = u_prev.dot(&rec.w_uv);
        bv_t += &params.vbias;
        let mut bh_t = u_prev.dot(&rec.w_uh);
        bh_t += &params.hbias;

        Ok(BiasSequence { u_prev, u, bv_t, bh_t })
    }

    /// Recurrent state after the batch, to seed the next batch in order.
    pub fn advance_state(
        &self,
        params: &LayerParams,
        rec: &RecurrentParams,
        batch: ArrayView2<f32>,
        seed: &Array1<f32>,
    ) -> DbnResult<Array1<f32>> {
        let seq = self.bias_sequence(params, rec, batch, seed)?;
        Ok(seq.last_state().unwrap_or_else(|| seed.clone()))
    }

    /// Free-energy difference `C` between the data and a fixed negative sample.
    pub fn free_energy_cost(
        &self,
        params: &LayerParams,
        rec: &RecurrentParams,
        batch: ArrayView2<f32>,
        negative: ArrayView2<f32>,
        seed: &Array1<f32>,
    ) -> DbnResult<f32> {
        let seq = self.bias_sequence(params, rec, batch, seed)?;
        let positive = Rbm::free_energy(params, batch, &seq.bv_t, &seq.bh_t);
        let negative = Rbm::free_energy(params, negative, &seq.bv_t, &seq.bh_t);
        Ok((positive - negative).mean().unwrap_or(0.0))
    }

    /// Analytic gradient of `C` given the bias sequence and a finished chain.
    pub fn gradients(
        &self,
        rec: &RecurrentParams,
        batch: ArrayView2<f32>,
        seq: &BiasSequence,
        chain: &GibbsChain,
    ) -> RnnRbmGrads {
        let steps = batch.nrows();
        let n = steps.max(1) as f32;

        // ∂C/∂b_v(t) = (ṽ_t - v_t) / T,  ∂C/∂b_h(t) = (p(h|ṽ_t) - p(h|v_t)) / T
        let d_bv = (&chain.vk - &batch) / n;
        let d_bh = (&chain.phk - &chain.ph0) / n;
        let w = (chain.vk.t().dot(&chain.phk) - batch.t().dot(&chain.ph0)) / n;

        let w_uv = seq.u_prev.t().dot(&d_bv);
        let w_uh = seq.u_prev.t().dot(&d_bh);
        // gradient reaching u_{t-1} through the timestep-t biases
        let g_u_prev = d_bv.dot(&rec.w_uv.t()) + d_bh.dot(&rec.w_uh.t());

        let du = self.recurrence.derivative_from_output(&seq.u);
        let mut g_a = Array2::<f32>::zeros((steps, self.n_recurrent));
        let mut carry = Array1::<f32>::zeros(self.n_recurrent);
        for t in (0..steps).rev() {
            let mut g_u = carry;
            if t + 1 < steps {
                g_u += &g_u_prev.row(t + 1);
            }
            let g_at = &g_u * &du.row(t);
            carry = g_at.dot(&rec.w_uu.t());
            g_a.row_mut(t).assign(&g_at);
        }

        RnnRbmGrads {
            w,
            vbias: d_bv.sum_axis(Axis(0)),
            hbias: d_bh.sum_axis(Axis(0)),
            w_uh,
            w_uv,
            w_vu: batch.t().dot(&g_a),
            w_uu: seq.u_prev.t().dot(&g_a),
            bu: g_a.sum_axis(Axis(0)),
        }
    }

    /// One CD-k update of the RBM and recurrent parameters on a batch.
    ///
    /// The seed is the recurrent state carried over from the previous batch.
    /// Returns the reconstruction cross-entropy of the chain's visible means,
    /// measured before the update.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the batch or seed disagree with the layer widths
    #[allow(clippy::too_many_arguments)]
    pub fn contrastive_divergence<R: Rng + ?Sized>(
        &self,
        params: &mut LayerParams,
        rec: &mut RecurrentParams,
        batch: ArrayView2<f32>,
        seed: &Array1<f32>,
        k: usize,
        learning_rate: f32,
        rng: &mut R,
    ) -> DbnResult<f32> {
        let seq = self.bias_sequence(params, rec, batch, seed)?;
        let chain = Rbm::gibbs_chain(params, batch, &seq.bv_t, &seq.bh_t, k, rng);
        let cost = reconstruction_cross_entropy(batch, &chain.pvk);
        let g = self.gradients(rec, batch, &seq, &chain);

        params.w.scaled_add(-learning_rate, &g.w);
        params.vbias.scaled_add(-learning_rate, &g.vbias);
        params.hbias.scaled_add(-learning_rate, &g.hbias);
        rec.w_uh.scaled_add(-learning_rate, &g.w_uh);
        rec.w_uv.scaled_add(-learning_rate, &g.w_uv);
        rec.w_vu.scaled_add(-learning_rate, &g.w_vu);
        rec.w_uu.scaled_add(-learning_rate, &g.w_uu);
        rec.bu.scaled_add(-learning_rate, &g.bu);

        Ok(cost)
    }
}

/// `-mean_t Σ_i [v ln p + (1 - v) ln(1 - p)]`
fn reconstruction_cross_entropy(v: ArrayView2<f32>, p: &Array2<f32>) -> f32 {
    let eps = 1e-7f32;
    let mut total = 0.0;
    ndarray::Zip::from(&v).and(p).for_each(|&x, &q| {
        let q = q.clamp(eps, 1.0 - eps);
        total -= x * q.ln() + (1.0 - x) * (1.0 - q).ln();
    });
    total / v.nrows().max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::s;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rows(batch: &Array2<f32>, start: usize, end: usize) -> ArrayView2<'_, f32> {
        batch.slice(s![start..end, ..])
    }

    fn setup(seed: u64) -> (RnnRbm, LayerParams, RecurrentParams, Array2<f32>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let layer = RnnRbm::new(4, 3, 2);
        let params = LayerParams::gaussian(4, 3, 0.5, &mut rng);
        let rec = RecurrentParams::gaussian(4, 3, 2, 0.5, &mut rng);
        let data = ndarray::arr2(&[
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 1.0, 1.0, 1.0],
        ]);
        (layer, params, rec, data)
    }

    #[test]
    fn test_bias_sequence_first_row_uses_seed() {
        let (layer, params, rec, data) = setup(1);
        let seed = ndarray::arr1(&[0.3, -0.2]);
        let seq = layer.bias_sequence(&params, &rec, data.view(), &seed).unwrap();
        assert_eq!(seq.u_prev.row(0), seed.view());
        let expected_bh0 = seed.dot(&rec.w_uh) + &params.hbias;
        for j in 0..3 {
            assert_abs_diff_eq!(seq.bh_t[[0, j]], expected_bh0[j], epsilon = 1e-6);
        }
        for t in 1..data.nrows() {
            assert_eq!(seq.u_prev.row(t), seq.u.row(t - 1));
        }
    }

    #[test]
    fn test_advance_state_chains_across_split_batches() {
        let (layer, params, rec, data) = setup(2);
        let seed = Array1::zeros(2);
        let whole = layer.advance_state(&params, &rec, data.view(), &seed).unwrap();
        let mid = layer
            .advance_state(&params, &rec, rows(&data, 0, 2), &seed)
            .unwrap();
        let split = layer
            .advance_state(&params, &rec, rows(&data, 2, 5), &mid)
            .unwrap();
        for i in 0..2 {
            assert_abs_diff_eq!(whole[i], split[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rejects_wrong_seed_length() {
        let (layer, params, rec, data) = setup(3);
        let seed = Array1::zeros(3);
        assert!(layer.bias_sequence(&params, &rec, data.view(), &seed).is_err());
    }

    #[test]
    fn test_recurrent_gradients_match_finite_difference() {
        let (layer, params, rec, data) = setup(4);
        let mut rng = StdRng::seed_from_u64(40);
        let seed = ndarray::arr1(&[0.1, -0.4]);
        let seq = layer.bias_sequence(&params, &rec, data.view(), &seed).unwrap();
        let chain = Rbm::gibbs_chain(&params, data.view(), &seq.bv_t, &seq.bh_t, 1, &mut rng);
        let g = layer.gradients(&rec, data.view(), &seq, &chain);

        let h = 1e-2f32;
        let cost = |rec: &RecurrentParams| {
            layer
                .free_energy_cost(&params, rec, data.view(), chain.vk.view(), &seed)
                .unwrap()
        };

        let mut bumped = rec.clone();
        bumped.w_vu[[1, 0]] += h;
        let up = cost(&bumped);
        bumped.w_vu[[1, 0]] -= 2.0 * h;
        let down = cost(&bumped);
        assert_abs_diff_eq!(g.w_vu[[1, 0]], (up - down) / (2.0 * h), epsilon = 2e-3);

        let mut bumped = rec.clone();
        bumped.w_uu[[0, 1]] += h;
        let up = cost(&bumped);
        bumped.w_uu[[0, 1]] -= 2.0 * h;
        let down = cost(&bumped);
        assert_abs_diff_eq!(g.w_uu[[0, 1]], (up - down) / (2.0 * h), epsilon = 2e-3);

        let mut bumped = rec.clone();
        bumped.w_uh[[1, 2]] += h;
        let up = cost(&bumped);
        bumped.w_uh[[1, 2]] -= 2.0 * h;
        let down = cost(&bumped);
        assert_abs_diff_eq!(g.w_uh[[1, 2]], (up - down) / (2.0 * h), epsilon = 2e-3);
    }

    #[test]
    fn test_cd_moves_recurrent_weights() {
        let (layer, mut params, mut rec, data) = setup(5);
        let mut rng = StdRng::seed_from_u64(50);
        let before = rec.clone();
        let seed = Array1::zeros(2);
        let cost = layer
            .contrastive_divergence(&mut params, &mut rec, data.view(), &seed, 2, 0.05, &mut rng)
            .unwrap();
        assert!(cost.is_finite() && cost >= 0.0);
        assert_ne!(rec.w_vu, before.w_vu);
        assert_eq!(rec.u0, before.u0);
    }
}
