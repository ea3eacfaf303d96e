use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::audit::error::AuditError;
use crate::audit::parallel::ParallelSettings;
use crate::audit::types::{FeatureFrame, SortedShape};

/// Computes per-interval slopes of a shape function sampled at sorted `x`.
///
/// `slope[i] = (y[i+1] - y[i]) / (x[i+1] - x[i])`. Intervals with a zero
/// x-difference (tied feature values) have slope exactly `0.0`, never NaN or
/// infinity. The result always has `x.len() - 1` entries (empty for fewer
/// than two samples).
///
/// # Arguments
/// * `x` - Feature values, sorted ascending by the caller
/// * `y` - Shape-function values at each `x`
///
/// # Errors
/// Returns `AuditError::LengthMismatch` if `x` and `y` differ in length.
pub fn calc_slopes(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Result<Array1<f64>, AuditError> {
    if x.len() != y.len() {
        return Err(AuditError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    Ok(calc_slopes_sorted(x, y))
}

/// Slope computation without the length check; callers guarantee equal lengths.
pub(crate) fn calc_slopes_sorted(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Array1<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return Array1::zeros(0);
    }
    (0..n - 1)
        .map(|i| {
            let dx = x[i + 1] - x[i];
            if dx == 0.0 {
                return 0.0;
            }
            let slope = (y[i + 1] - y[i]) / dx;
            if slope.is_finite() {
                slope
            } else {
                0.0
            }
        })
        .collect()
}

/// Computes the sorted slope sequence of every feature's shape function.
///
/// # Arguments
/// * `frame` - Raw training data
/// * `embeddings` - Per-feature contributions, same shape and row order as `frame`
/// * `parallel` - Parallelization settings for the per-feature loop
///
/// # Returns
/// Matrix of shape `(n_samples - 1, n_features)`; column `j` holds the slopes
/// of feature `j` after sorting its samples by value.
pub fn calculate_slopes(
    frame: &FeatureFrame,
    embeddings: &ArrayView2<f64>,
    parallel: ParallelSettings,
) -> Result<Array2<f64>, AuditError> {
    frame.check_embeddings(embeddings)?;

    let n_slopes = frame.n_samples().saturating_sub(1);
    let columns = parallel.map_features(frame.n_features(), |j| {
        Ok(SortedShape::from_frame(frame, embeddings, j)?.slopes())
    })?;

    let mut slopes = Array2::zeros((n_slopes, frame.n_features()));
    for (j, column) in columns.into_iter().enumerate() {
        slopes.index_axis_mut(Axis(1), j).assign(&column);
    }
    Ok(slopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_slopes_of_increasing_function_are_positive() {
        let x = arr1(&[0.0, 1.0, 2.5, 3.0, 7.0]);
        let y = arr1(&[-1.0, 0.0, 0.5, 2.0, 2.1]);
        let slopes = calc_slopes(&x.view(), &y.view()).unwrap();
        assert_eq!(slopes.len(), 4);
        assert!(slopes.iter().all(|&s| s > 0.0));
        assert_eq!(slopes[0], 1.0);
    }

    #[test]
    fn test_slopes_of_constant_function_are_zero() {
        let x = arr1(&[0.0, 1.0, 2.0, 3.0]);
        let y = arr1(&[4.0, 4.0, 4.0, 4.0]);
        let slopes = calc_slopes(&x.view(), &y.view()).unwrap();
        assert_eq!(slopes.to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_repeated_x_gives_zero_slope_only_there() {
        let x = arr1(&[0.0, 1.0, 1.0, 2.0]);
        let y = arr1(&[0.0, 1.0, 5.0, 7.0]);
        let slopes = calc_slopes(&x.view(), &y.view()).unwrap();
        assert_eq!(slopes.to_vec(), vec![1.0, 0.0, 2.0]);
        assert!(slopes.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_short_inputs() {
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(calc_slopes(&empty.view(), &empty.view()).unwrap().len(), 0);
        let single = arr1(&[1.0]);
        assert_eq!(calc_slopes(&single.view(), &single.view()).unwrap().len(), 0);
    }

    #[test]
    fn test_length_mismatch() {
        let x = arr1(&[0.0, 1.0]);
        let y = arr1(&[0.0]);
        assert!(matches!(
            calc_slopes(&x.view(), &y.view()),
            Err(AuditError::LengthMismatch { x_len: 2, y_len: 1 })
        ));
    }

    #[test]
    fn test_calculate_slopes_sorts_each_feature() {
        let frame = FeatureFrame::unnamed(arr2(&[[2.0, 0.0], [0.0, 1.0], [1.0, 2.0]])).unwrap();
        let embeddings = arr2(&[[4.0, 0.0], [0.0, -1.0], [1.0, -2.0]]);
        let slopes =
            calculate_slopes(&frame, &embeddings.view(), ParallelSettings::sequential()).unwrap();
        assert_eq!(slopes.dim(), (2, 2));
        assert_eq!(slopes.column(0).to_vec(), vec![1.0, 3.0]);
        assert_eq!(slopes.column(1).to_vec(), vec![-1.0, -1.0]);

        let parallel =
            calculate_slopes(&frame, &embeddings.view(), ParallelSettings::with_n_threads(2))
                .unwrap();
        assert_eq!(slopes, parallel);
    }
}
