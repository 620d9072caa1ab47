//! Supervised output layer: softmax classifier or linear regressor.

use crate::core::{check_width, DbnError, DbnResult, OutputParams};
use crate::data::LabelBatch;
use crate::utils::{argmax_rows, softmax_rows};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Selects the loss, prediction, and scoring semantics of the whole model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Continuous targets, squared-error loss and score.
    Regression,
    /// Integer class labels, negative log-likelihood loss, 0/1 error score.
    Classification,
}

/// Output of [`OutputLayer::predict`].
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Classes(Vec<usize>),
    Values(Array2<f32>),
}

/// Gradients of the output layer plus the error signal for the top hidden layer.
#[derive(Debug, Clone)]
pub struct OutputGrads {
    pub w: Array2<f32>,
    pub b: Array1<f32>,
    pub delta_in: Array2<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputLayer {
    pub n_in: usize,
    pub n_out: usize,
    pub mode: LabelMode,
}

impl OutputLayer {
    pub fn new(n_in: usize, n_out: usize, mode: LabelMode) -> Self {
        Self { n_in, n_out, mode }
    }

    fn logits(&self, params: &OutputParams, input: ArrayView2<f32>) -> DbnResult<Array2<f32>> {
        check_width("output layer input", input.ncols(), self.n_in)?;
        let mut z = input.dot(&params.w);
        z += &params.b;
        Ok(z)
    }

    /// Class distribution (classification) or continuous prediction (regression).
    pub fn p_y_given_x(&self, params: &OutputParams, input: ArrayView2<f32>) -> DbnResult<Array2<f32>> {
        let z = self.logits(params, input)?;
        Ok(match self.mode {
            LabelMode::Classification => softmax_rows(&z),
            LabelMode::Regression => z,
        })
    }

    pub fn predict(&self, params: &OutputParams, input: ArrayView2<f32>) -> DbnResult<Prediction> {
        let p = self.p_y_given_x(params, input)?;
        Ok(match self.mode {
            LabelMode::Classification => Prediction::Classes(argmax_rows(&p)),
            LabelMode::Regression => Prediction::Values(p),
        })
    }

    /// Mean loss over the batch and its gradient with respect to the logits.
    ///
    /// Classification: `-mean log p(y)`. Regression: `mean_b Σ_c (ŷ - y)²`.
    pub fn loss_and_delta(
        &self,
        params: &OutputParams,
        input: ArrayView2<f32>,
        labels: LabelBatch<'_>,
    ) -> DbnResult<(f32, Array2<f32>)> {
        self.check_labels(input.nrows(), labels)?;
        let p = self.p_y_given_x(params, input)?;
        let n = p.nrows().max(1) as f32;
        match labels {
            LabelBatch::Classes(classes) => {
                let mut delta = p.clone();
                let mut nll = 0.0;
                for (i, &c) in classes.iter().enumerate() {
                    nll -= p[[i, c]].max(f32::MIN_POSITIVE).ln();
                    delta[[i, c]] -= 1.0;
                }
                delta.mapv_inplace(|v| v / n);
                Ok((nll / n, delta))
            }
            LabelBatch::Targets(targets) => {
                let residual = &p - &targets;
                let loss = residual.mapv(|r| r * r).sum() / n;
                Ok((loss, residual.mapv(|r| 2.0 * r / n)))
            }
        }
    }

    /// Sum of per-example scores over the batch: misclassifications or squared errors.
    ///
    /// Summing rather than averaging lets callers pool chunks of unequal size exactly.
    pub fn error_sum(
        &self,
        params: &OutputParams,
        input: ArrayView2<f32>,
        labels: LabelBatch<'_>,
    ) -> DbnResult<f32> {
        self.check_labels(input.nrows(), labels)?;
        match (self.predict(params, input)?, labels) {
            (Prediction::Classes(pred), LabelBatch::Classes(classes)) => Ok(pred
                .iter()
                .zip(classes.iter())
                .filter(|(p, y)| p != y)
                .count() as f32),
            (Prediction::Values(pred), LabelBatch::Targets(targets)) => {
                Ok((&pred - &targets).mapv(|r| r * r).sum())
            }
            _ => Err(DbnError::ShapeMismatch(
                "label kind does not match label mode".to_string(),
            )),
        }
    }

    /// Mean score over the batch: 0/1 error rate or mean squared error.
    pub fn errors(
        &self,
        params: &OutputParams,
        input: ArrayView2<f32>,
        labels: LabelBatch<'_>,
    ) -> DbnResult<f32> {
        let rows = input.nrows().max(1) as f32;
        Ok(self.error_sum(params, input, labels)? / rows)
    }

    pub fn backward(
        &self,
        params: &OutputParams,
        input: ArrayView2<f32>,
        delta_logits: &Array2<f32>,
    ) -> OutputGrads {
        OutputGrads {
            w: input.t().dot(delta_logits),
            b: delta_logits.sum_axis(Axis(0)),
            delta_in: delta_logits.dot(&params.w.t()),
        }
    }

    fn check_labels(&self, rows: usize, labels: LabelBatch<'_>) -> DbnResult<()> {
        if labels.len() != rows {
            return Err(DbnError::ShapeMismatch(format!(
                "{} labels for {rows} rows",
                labels.len()
            )));
        }
        match (self.mode, labels) {
            (LabelMode::Classification, LabelBatch::Classes(classes)) => {
                match classes.iter().find(|&&c| c >= self.n_out) {
                    Some(c) => Err(DbnError::ShapeMismatch(format!(
                        "class label {c} out of range for {} outputs",
                        self.n_out
                    ))),
                    None => Ok(()),
                }
            }
            (LabelMode::Regression, LabelBatch::Targets(targets)) => {
                check_width("regression targets", targets.ncols(), self.n_out)
            }
            (mode, _) => Err(DbnError::ShapeMismatch(format!(
                "labels do not match {mode:?} mode"
            ))),
        }
    }
}
