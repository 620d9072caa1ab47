//! Dataset splits, label storage, and minibatch slicing.
//!
//! The core never parses files. Callers assemble a [`Dataset`] from in-memory
//! arrays, either split by hand or with [`Dataset::chronological`].

use crate::core::{check_width, DbnError, DbnResult};
use crate::layers::LabelMode;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Labels of one split: class indices or continuous targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    Classes(Array1<usize>),
    Targets(Array2<f32>),
}

/// Borrowed labels for a batch of rows.
#[derive(Debug, Clone, Copy)]
pub enum LabelBatch<'a> {
    Classes(ArrayView1<'a, usize>),
    Targets(ArrayView2<'a, f32>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Classes(c) => c.len(),
            Labels::Targets(t) => t.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> LabelMode {
        match self {
            Labels::Classes(_) => LabelMode::Classification,
            Labels::Targets(_) => LabelMode::Regression,
        }
    }

    /// Fail unless every label fits an output layer of width `n_outs`.
    ///
    /// # Errors
    /// - `ShapeMismatch` if a class index is `>= n_outs` or the target width is not `n_outs`
    pub fn check_outputs(&self, n_outs: usize) -> DbnResult<()> {
        match self {
            Labels::Classes(c) => match c.iter().find(|&&k| k >= n_outs) {
                Some(k) => Err(DbnError::ShapeMismatch(format!(
                    "class label {k} out of range for {n_outs} outputs"
                ))),
                None => Ok(()),
            },
            Labels::Targets(t) => check_width("regression targets", t.ncols(), n_outs),
        }
    }

    pub fn view(&self) -> LabelBatch<'_> {
        match self {
            Labels::Classes(c) => LabelBatch::Classes(c.view()),
            Labels::Targets(t) => LabelBatch::Targets(t.view()),
        }
    }

    fn rows(&self, start: usize, end: usize) -> LabelBatch<'_> {
        match self {
            Labels::Classes(c) => LabelBatch::Classes(c.slice(s![start..end])),
            Labels::Targets(t) => LabelBatch::Targets(t.slice(s![start..end, ..])),
        }
    }

    fn take_rows(&self, start: usize, end: usize) -> Labels {
        match self.rows(start, end) {
            LabelBatch::Classes(c) => Labels::Classes(c.to_owned()),
            LabelBatch::Targets(t) => Labels::Targets(t.to_owned()),
        }
    }
}

impl LabelBatch<'_> {
    pub fn len(&self) -> usize {
        match self {
            LabelBatch::Classes(c) => c.len(),
            LabelBatch::Targets(t) => t.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aligned features and labels. Row `i` of `x` belongs to label `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    x: Array2<f32>,
    y: Labels,
}

impl Split {
    /// # Errors
    /// - `ShapeMismatch` if feature and label row counts differ
    pub fn new(x: Array2<f32>, y: Labels) -> DbnResult<Self> {
        if x.nrows() != y.len() {
            return Err(DbnError::ShapeMismatch(format!(
                "split has {} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    pub fn y(&self) -> &Labels {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Number of whole batches; a trailing partial batch is dropped.
    pub fn n_batches(&self, batch_size: usize) -> usize {
        if batch_size == 0 {
            0
        } else {
            self.len() / batch_size
        }
    }

    /// Features of batch `index`: rows `[index * size, (index + 1) * size)`.
    pub fn batch_x(&self, index: usize, batch_size: usize) -> ArrayView2<'_, f32> {
        let (start, end) = self.bounds(index, batch_size);
        self.x.slice(s![start..end, ..])
    }

    /// Features and labels of batch `index`.
    pub fn batch(&self, index: usize, batch_size: usize) -> (ArrayView2<'_, f32>, LabelBatch<'_>) {
        let (start, end) = self.bounds(index, batch_size);
        (self.x.slice(s![start..end, ..]), self.y.rows(start, end))
    }

    /// Contiguous chunks covering every row, the last one possibly short.
    pub fn chunks(&self, chunk_size: usize) -> Vec<(ArrayView2<'_, f32>, LabelBatch<'_>)> {
        let n = self.len();
        let size = chunk_size.max(1);
        (0..n)
            .step_by(size)
            .map(|start| {
                let end = (start + size).min(n);
                (self.x.slice(s![start..end, ..]), self.y.rows(start, end))
            })
            .collect()
    }

    fn bounds(&self, index: usize, batch_size: usize) -> (usize, usize) {
        let start = (index * batch_size).min(self.len());
        let end = (start + batch_size).min(self.len());
        (start, end)
    }

    fn take_rows(&self, start: usize, end: usize) -> Split {
        Split {
            x: self.x.slice(s![start..end, ..]).to_owned(),
            y: self.y.take_rows(start, end),
        }
    }
}

/// Train, validation, and test splits sharing one feature width and label kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub train: Split,
    pub valid: Split,
    pub test: Split,
}

impl Dataset {
    /// # Errors
    /// - `ShapeMismatch` if the splits disagree on feature width or label kind
    pub fn new(train: Split, valid: Split, test: Split) -> DbnResult<Self> {
        for (name, split) in [("valid", &valid), ("test", &test)] {
            check_width(
                &format!("{name} split features"),
                split.n_features(),
                train.n_features(),
            )?;
            if split.y.mode() != train.y.mode() {
                return Err(DbnError::ShapeMismatch(format!(
                    "{name} split labels are {:?} but train labels are {:?}",
                    split.y.mode(),
                    train.y.mode()
                )));
            }
            if let (Labels::Targets(t), Labels::Targets(train_t)) = (&split.y, &train.y) {
                check_width(&format!("{name} split targets"), t.ncols(), train_t.ncols())?;
            }
        }
        Ok(Self { train, valid, test })
    }

    /// Split a time-ordered series into consecutive train, valid, and test blocks.
    ///
    /// Rows are never shuffled, so the recurrent layer sees the series in order.
    ///
    /// # Errors
    /// - `Configuration` if the fractions leave any split empty
    pub fn chronological(
        x: Array2<f32>,
        y: Labels,
        valid_fraction: f32,
        test_fraction: f32,
    ) -> DbnResult<Self> {
        let all = Split::new(x, y)?;
        let n = all.len();
        let valid_count = ((n as f32) * valid_fraction) as usize;
        let test_count = ((n as f32) * test_fraction) as usize;
        if valid_count == 0 || test_count == 0 || valid_count + test_count >= n {
            return Err(DbnError::Configuration(format!(
                "fractions {valid_fraction}/{test_fraction} leave an empty split of {n} rows"
            )));
        }
        let train_count = n - valid_count - test_count;
        Self::new(
            all.take_rows(0, train_count),
            all.take_rows(train_count, train_count + valid_count),
            all.take_rows(train_count + valid_count, n),
        )
    }

    pub fn n_features(&self) -> usize {
        self.train.n_features()
    }

    pub fn label_mode(&self) -> LabelMode {
        self.train.y.mode()
    }

    /// Check the labels of all three splits against an output width, before any training.
    pub fn check_outputs(&self, n_outs: usize) -> DbnResult<()> {
        for split in [&self.train, &self.valid, &self.test] {
            split.y.check_outputs(n_outs)?;
        }
        Ok(())
    }
}

/// Scale every column of `data` into `[0, 1]` in place.
///
/// Generative layers use binary visible units, so inputs should lie in the
/// unit interval. Constant columns are left untouched.
pub fn normalize_columns(data: &mut Array2<f32>) {
    for mut col in data.axis_iter_mut(Axis(1)) {
        let min = col.fold(f32::INFINITY, |a, &b| a.min(b));
        let max = col.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let range = max - min;
        if range == 0.0 {
            continue;
        }
        col.mapv_inplace(|v| (v - min) / range);
    }
}
