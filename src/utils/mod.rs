//! Math utilities: logistic functions, softmax, and Bernoulli sampling.

use ndarray::{Array2, Axis};
use rand::Rng;

/// Logistic sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of the sigmoid expressed through its output: s * (1 - s).
#[inline]
pub fn d_sigmoid_from_output(s: f32) -> f32 {
    s * (1.0 - s)
}

/// Numerically stable softplus: ln(1 + e^x).
#[inline]
pub fn softplus(x: f32) -> f32 {
    if x > 20.0 {
        x
    } else if x < -20.0 {
        x.exp()
    } else {
        x.exp().ln_1p()
    }
}

/// Numerically stable log-sigmoid: ln σ(x) = -softplus(-x).
#[inline]
pub fn log_sigmoid(x: f32) -> f32 {
    -softplus(-x)
}

/// Row-wise softmax with max subtraction.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}

/// Draw binary samples with per-element success probabilities.
pub fn sample_bernoulli<R: Rng + ?Sized>(probs: &Array2<f32>, rng: &mut R) -> Array2<f32> {
    probs.mapv(|p| if rng.gen::<f32>() < p { 1.0 } else { 0.0 })
}

/// Index of the largest entry in each row.
pub fn argmax_rows(values: &Array2<f32>) -> Vec<usize> {
    values
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
        assert!((d_sigmoid_from_output(0.5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_softplus_stable() {
        assert!((softplus(0.0) - 2.0f32.ln()).abs() < 1e-6);
        assert_eq!(softplus(100.0), 100.0);
        assert!(softplus(-100.0) >= 0.0);
        assert!((log_sigmoid(0.0) - 0.5f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_rows_normalized() {
        let logits = ndarray::arr2(&[[1.0, 2.0, 3.0], [1000.0, 0.0, -1000.0]]);
        let p = softmax_rows(&logits);
        for row in p.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
        assert!(p[[0, 2]] > p[[0, 1]]);
    }

    #[test]
    fn test_sample_bernoulli_extremes() {
        let mut rng = StdRng::seed_from_u64(7);
        let probs = ndarray::arr2(&[[0.0, 1.0], [0.0, 1.0]]);
        let s = sample_bernoulli(&probs, &mut rng);
        assert_eq!(s, ndarray::arr2(&[[0.0, 1.0], [0.0, 1.0]]));
    }

    #[test]
    fn test_argmax_rows() {
        let v = ndarray::arr2(&[[0.1, 0.7, 0.2], [0.9, 0.05, 0.05]]);
        assert_eq!(argmax_rows(&v), vec![1, 0]);
    }
}
