//! Parameter stores and the flat trainable-parameter view.

use super::{DbnError, DbnResult};
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::Rng;

/// Weight and biases for one layer position.
///
/// `w` has shape `(n_in, n_out)`. `hbias` is shared with the discriminative
/// hidden transform; `vbias` is only used by the generative view.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    pub w: Array2<f32>,
    pub hbias: Array1<f32>,
    pub vbias: Array1<f32>,
}

impl LayerParams {
    /// Glorot-uniform weights scaled by 4 for sigmoid units, zero biases.
    ///
    /// `W ~ U(-limit, limit)` with `limit = 4 * sqrt(6 / (n_in + n_out))`.
    pub fn sigmoid_uniform<R: Rng + ?Sized>(n_in: usize, n_out: usize, rng: &mut R) -> Self {
        let limit = 4.0 * (6.0f32 / (n_in + n_out) as f32).sqrt();
        let dist = Uniform::new(-limit, limit);
        Self {
            w: Array2::random_using((n_in, n_out), dist, rng),
            hbias: Array1::zeros(n_out),
            vbias: Array1::zeros(n_in),
        }
    }

    /// Gaussian weights with standard deviation `std`, zero biases.
    pub fn gaussian<R: Rng + ?Sized>(n_in: usize, n_out: usize, std: f32, rng: &mut R) -> Self {
        Self {
            w: gaussian_matrix((n_in, n_out), std, rng),
            hbias: Array1::zeros(n_out),
            vbias: Array1::zeros(n_in),
        }
    }

    pub fn n_in(&self) -> usize {
        self.w.nrows()
    }

    pub fn n_out(&self) -> usize {
        self.w.ncols()
    }
}

/// Recurrent-state parameters of the RNN-RBM layer.
///
/// Shapes, with `v` visible, `h` hidden and `r` recurrent units:
/// `w_uh (r, h)`, `w_uv (r, v)`, `w_vu (v, r)`, `w_uu (r, r)`, `bu (r)`, `u0 (r)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentParams {
    pub w_uh: Array2<f32>,
    pub w_uv: Array2<f32>,
    pub w_vu: Array2<f32>,
    pub w_uu: Array2<f32>,
    pub bu: Array1<f32>,
    /// Initial recurrent state, used as the seed at the start of each epoch.
    pub u0: Array1<f32>,
}

impl RecurrentParams {
    pub fn gaussian<R: Rng + ?Sized>(
        n_visible: usize,
        n_hidden: usize,
        n_recurrent: usize,
        std: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            w_uh: gaussian_matrix((n_recurrent, n_hidden), std, rng),
            w_uv: gaussian_matrix((n_recurrent, n_visible), std, rng),
            w_vu: gaussian_matrix((n_visible, n_recurrent), std, rng),
            w_uu: gaussian_matrix((n_recurrent, n_recurrent), std, rng),
            bu: Array1::zeros(n_recurrent),
            u0: Array1::zeros(n_recurrent),
        }
    }

    pub fn n_recurrent(&self) -> usize {
        self.bu.len()
    }
}

/// Output layer weight `(n_in, n_outs)` and bias `(n_outs)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParams {
    pub w: Array2<f32>,
    pub b: Array1<f32>,
}

impl OutputParams {
    pub fn zeros(n_in: usize, n_out: usize) -> Self {
        Self {
            w: Array2::zeros((n_in, n_out)),
            b: Array1::zeros(n_out),
        }
    }
}

fn gaussian_matrix<R: Rng + ?Sized>(shape: (usize, usize), std: f32, rng: &mut R) -> Array2<f32> {
    match Normal::new(0.0f32, std) {
        Ok(dist) => Array2::random_using(shape, dist, rng),
        // std is a fixed positive constant at every call site
        Err(_) => Array2::zeros(shape),
    }
}

/// Mutable handle to one trainable tensor inside a model.
#[derive(Debug)]
pub enum ParamMut<'a> {
    Matrix(&'a mut Array2<f32>),
    Vector(&'a mut Array1<f32>),
}

/// Gradient of a scalar loss with respect to one trainable tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Gradient {
    Matrix(Array2<f32>),
    Vector(Array1<f32>),
}

impl ParamMut<'_> {
    /// Plain gradient-descent step: `param <- param - lr * grad`.
    pub fn descend(&mut self, grad: &Gradient, learning_rate: f32) -> DbnResult<()> {
        match (self, grad) {
            (ParamMut::Matrix(p), Gradient::Matrix(g)) if p.dim() == g.dim() => {
                p.scaled_add(-learning_rate, g);
                Ok(())
            }
            (ParamMut::Vector(p), Gradient::Vector(g)) if p.len() == g.len() => {
                p.scaled_add(-learning_rate, g);
                Ok(())
            }
            (p, g) => Err(DbnError::ShapeMismatch(format!(
                "gradient {:?} does not fit parameter {:?}",
                g.shape(),
                p.shape()
            ))),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            ParamMut::Matrix(p) => p.shape().to_vec(),
            ParamMut::Vector(p) => p.shape().to_vec(),
        }
    }
}

impl Gradient {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Gradient::Matrix(g) => g.shape().to_vec(),
            Gradient::Vector(g) => g.shape().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sigmoid_uniform_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let p = LayerParams::sigmoid_uniform(6, 4, &mut rng);
        let limit = 4.0 * (6.0f32 / 10.0).sqrt();
        assert_eq!(p.w.dim(), (6, 4));
        assert_eq!(p.hbias.len(), 4);
        assert_eq!(p.vbias.len(), 6);
        assert!(p.w.iter().all(|&v| v.abs() <= limit));
        assert!(p.hbias.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_recurrent_shapes() {
        let mut rng = StdRng::seed_from_u64(2);
        let r = RecurrentParams::gaussian(5, 3, 2, 1e-4, &mut rng);
        assert_eq!(r.w_uh.dim(), (2, 3));
        assert_eq!(r.w_uv.dim(), (2, 5));
        assert_eq!(r.w_vu.dim(), (5, 2));
        assert_eq!(r.w_uu.dim(), (2, 2));
        assert_eq!(r.n_recurrent(), 2);
        assert!(r.u0.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_descend() {
        let mut w = ndarray::arr2(&[[1.0, 2.0]]);
        let grad = Gradient::Matrix(ndarray::arr2(&[[10.0, -10.0]]));
        ParamMut::Matrix(&mut w).descend(&grad, 0.1).unwrap();
        assert_eq!(w, ndarray::arr2(&[[0.0, 3.0]]));
    }

    #[test]
    fn test_descend_shape_mismatch() {
        let mut b = ndarray::arr1(&[1.0, 2.0]);
        let grad = Gradient::Vector(ndarray::arr1(&[1.0]));
        assert!(matches!(
            ParamMut::Vector(&mut b).descend(&grad, 0.1),
            Err(DbnError::ShapeMismatch(_))
        ));
    }
}
