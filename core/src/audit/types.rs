use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::audit::error::AuditError;
use crate::audit::slopes::calc_slopes_sorted;

/// Index of a feature (column) in the training data.
pub type FeatureIndex = usize;

/// Named raw training data: one column per feature, one row per sample.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    names: Vec<String>,
    values: Array2<f64>,
}

impl FeatureFrame {
    /// Creates a frame from feature names and an `(n_samples, n_features)` matrix.
    ///
    /// # Errors
    /// - `FeatureNameMismatch` if the number of names differs from the number of columns.
    /// - `NonFiniteValue` if any raw value is NaN or infinite.
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, AuditError> {
        if names.len() != values.ncols() {
            return Err(AuditError::FeatureNameMismatch {
                names: names.len(),
                columns: values.ncols(),
            });
        }
        check_finite(&names, &values.view())?;
        Ok(Self { names, values })
    }

    /// Creates a frame with generated names `f0, f1, ...`.
    pub fn unnamed(values: Array2<f64>) -> Result<Self, AuditError> {
        let names = (0..values.ncols()).map(|j| format!("f{j}")).collect();
        Self::new(names, values)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, feature: FeatureIndex) -> &str {
        &self.names[feature]
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn column(&self, feature: FeatureIndex) -> ArrayView1<'_, f64> {
        self.values.column(feature)
    }

    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Checks that an embedding matrix lines up with this frame.
    ///
    /// Embeddings must have the same shape as the raw data (row order is the
    /// caller's responsibility) and contain only finite values.
    pub fn check_embeddings(&self, embeddings: &ArrayView2<f64>) -> Result<(), AuditError> {
        if embeddings.dim() != self.values.dim() {
            return Err(AuditError::ShapeMismatch {
                expected: vec![self.n_samples(), self.n_features()],
                actual: embeddings.shape().to_vec(),
            });
        }
        check_finite(&self.names, embeddings)
    }
}

fn check_finite(names: &[String], values: &ArrayView2<f64>) -> Result<(), AuditError> {
    for ((row, feature), value) in values.indexed_iter() {
        if !value.is_finite() {
            return Err(AuditError::NonFiniteValue {
                feature: names[feature].clone(),
                row,
            });
        }
    }
    Ok(())
}

/// One feature's shape-function samples, ordered by ascending x.
///
/// The sort is stable, so samples with tied x keep their original row order.
/// `order[k]` is the original row of sorted position `k`.
#[derive(Debug, Clone)]
pub struct SortedShape {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub order: Vec<usize>,
}

impl SortedShape {
    /// Sorts the (x, y) pairs of one feature by x.
    ///
    /// # Errors
    /// Returns `LengthMismatch` if `x` and `y` differ in length.
    pub fn new(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<Self, AuditError> {
        if x.len() != y.len() {
            return Err(AuditError::LengthMismatch {
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));

        let sorted_x = order.iter().map(|&i| x[i]).collect();
        let sorted_y = order.iter().map(|&i| y[i]).collect();
        Ok(Self {
            x: sorted_x,
            y: sorted_y,
            order,
        })
    }

    /// Builds the sorted view of column `feature` of the frame and embeddings.
    pub fn from_frame(
        frame: &FeatureFrame,
        embeddings: &ArrayView2<f64>,
        feature: FeatureIndex,
    ) -> Result<Self, AuditError> {
        Self::new(frame.column(feature), embeddings.column(feature))
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Slopes between consecutive sorted samples.
    pub fn slopes(&self) -> Array1<f64> {
        calc_slopes_sorted(&self.x.view(), &self.y.view())
    }

    /// Reorders values given in original row order into this view's sorted order.
    ///
    /// # Errors
    /// Returns `LengthMismatch` if `values` does not have one entry per sample.
    pub fn permute(&self, values: ArrayView1<f64>) -> Result<Array1<f64>, AuditError> {
        if values.len() != self.len() {
            return Err(AuditError::LengthMismatch {
                x_len: self.len(),
                y_len: values.len(),
            });
        }
        Ok(self.order.iter().map(|&i| values[i]).collect())
    }
}
