use ndarray::ArrayView2;
use serde::Deserialize;

use crate::audit::changepoint::{validate_threshold, ChangepointDetector};
use crate::audit::error::AuditError;
use crate::audit::parallel::ParallelSettings;
use crate::audit::results::NonMonotonicityTable;
use crate::audit::types::{FeatureFrame, SortedShape};

/// Slopes with magnitude at or below this are treated as flat.
pub const FLAT_SLOPE_TOLERANCE: f64 = 1e-8;

/// Features with fewer informative slopes than this are skipped.
pub const MIN_SIGNED_SLOPES: usize = 3;

/// Options for non-monotonicity detection.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct NonMonotonicityOptions {
    /// Minimum posterior changepoint probability.
    pub prob_threshold: f64,
    /// Keep only flips from rising to falling contribution.
    pub counter_causal_only: bool,
}

impl Default for NonMonotonicityOptions {
    fn default() -> Self {
        Self {
            prob_threshold: 0.2,
            counter_causal_only: false,
        }
    }
}

impl NonMonotonicityOptions {
    pub fn validate(&self) -> Result<(), AuditError> {
        validate_threshold(self.prob_threshold)
    }
}

/// Signs (+1/-1) of the informative slopes of one sorted shape function,
/// with the feature value each sign is reported at.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedSlopes {
    pub x: Vec<f64>,
    pub signs: Vec<f64>,
}

impl SignedSlopes {
    /// Drops flat slopes and reduces the rest to their sign.
    ///
    /// The slope between sorted samples `i` and `i + 1` is reported at `x[i]`.
    pub fn from_shape(shape: &SortedShape) -> Self {
        let slopes = shape.slopes();
        let (x, signs): (Vec<f64>, Vec<f64>) = slopes
            .iter()
            .enumerate()
            .filter(|(_, slope)| slope.abs() > FLAT_SLOPE_TOLERANCE)
            .map(|(i, slope)| (shape.x[i], slope / slope.abs()))
            .unzip();
        Self { x, signs }
    }

    pub fn len(&self) -> usize {
        self.signs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signs.is_empty()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Checks whether a changepoint in a sign sequence is "counter-causal".
///
/// A flip from rising risk to falling risk is counter-causal; a flip from
/// falling to rising is not. The mean sign just before the changepoint is
/// compared with the mean sign starting at it: `signs[c-1..c]` against
/// `signs[c..min(c+1, len-1)]`. If either window is empty the changepoint
/// is not counter-causal.
pub fn is_counter_causal(signs: &[f64], changepoint: usize) -> bool {
    if changepoint >= signs.len() {
        return false;
    }
    let prev_start = changepoint.saturating_sub(1);
    let next_end = (changepoint + 1).min(signs.len() - 1);
    let next_window: &[f64] = if changepoint < next_end {
        &signs[changepoint..next_end]
    } else {
        &[]
    };
    match (mean(&signs[prev_start..changepoint]), mean(next_window)) {
        (Some(prev), Some(next)) => prev > next,
        _ => false,
    }
}

/// Finds the feature values at which one shape function's slope flips sign.
///
/// # Arguments
/// * `shape` - The feature's shape-function samples, sorted by value
/// * `detector` - Changepoint-detection capability run over the slope signs
/// * `options` - Threshold and counter-causal filter
///
/// # Returns
/// Feature values at the surviving changepoints, ascending by changepoint
/// index. Only changepoints in `[1, len - 2]` of the sign sequence are
/// reported. Empty if fewer than [`MIN_SIGNED_SLOPES`] slopes are informative.
pub fn non_monotonicities_in_sorted<D>(
    shape: &SortedShape,
    detector: &D,
    options: &NonMonotonicityOptions,
) -> Result<Vec<f64>, AuditError>
where
    D: ChangepointDetector + ?Sized,
{
    let signed = SignedSlopes::from_shape(shape);
    if signed.len() < MIN_SIGNED_SLOPES {
        log::debug!(
            "{} informative slopes (< {}), skipping",
            signed.len(),
            MIN_SIGNED_SLOPES
        );
        return Ok(Vec::new());
    }

    let changepoints = detector.detect(&signed.signs, options.prob_threshold)?;
    log::debug!(
        "{} informative slopes, {} changepoint candidates",
        signed.len(),
        changepoints.len()
    );
    // Both neighbours must exist, so flips on the first or last sign are dropped.
    Ok(changepoints
        .into_iter()
        .filter(|&cp| cp >= 1 && cp + 1 < signed.len())
        .filter(|&cp| !options.counter_causal_only || is_counter_causal(&signed.signs, cp))
        .map(|cp| signed.x[cp])
        .collect())
}

/// Finds non-monotonicities in every feature's shape function.
///
/// # Arguments
/// * `frame` - Raw training data
/// * `embeddings` - Per-feature contributions, same shape and row order as `frame`
/// * `detector` - Changepoint-detection capability
/// * `options` - Threshold and counter-causal filter
/// * `parallel` - Parallelization settings for the per-feature loop
///
/// # Errors
/// Returns `AuditError` if the inputs do not line up, the options are invalid,
/// or the detector fails.
pub fn find_non_monotonicities_from_embeddings<D>(
    frame: &FeatureFrame,
    embeddings: &ArrayView2<f64>,
    detector: &D,
    options: &NonMonotonicityOptions,
    parallel: ParallelSettings,
) -> Result<NonMonotonicityTable, AuditError>
where
    D: ChangepointDetector + ?Sized,
{
    options.validate()?;
    frame.check_embeddings(embeddings)?;

    let per_feature = parallel.map_features(frame.n_features(), |j| {
        let shape = SortedShape::from_frame(frame, embeddings, j)?;
        let values = non_monotonicities_in_sorted(&shape, detector, options)?;
        log::debug!(
            "feature '{}': {} non-monotonicities",
            frame.name(j),
            values.len()
        );
        Ok(values)
    })?;

    let table = NonMonotonicityTable::from_feature_rows(
        frame
            .names()
            .iter()
            .map(String::as_str)
            .zip(per_feature),
    );
    log::info!(
        "scanned {} features for non-monotonicities, found {}",
        frame.n_features(),
        table.len()
    );
    Ok(table)
}
