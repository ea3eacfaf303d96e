//! Likelihood-based discontinuity scoring.
//!
//! Shape-function values are treated as log-probabilities of the positive
//! class and outcomes must be binary (0 or 1). Around every nonzero jump the
//! shape function is compared, over the window spanning its neighbouring
//! jumps, as a step function versus a straight line between the window
//! ends; a positive summed score means the step explains the outcomes better.

use ndarray::{ArrayView1, ArrayView2};
use serde::Deserialize;

use crate::audit::error::AuditError;
use crate::audit::parallel::ParallelSettings;
use crate::audit::results::{DiscontinuityScore, DiscontinuityTable};
use crate::audit::types::{FeatureFrame, SortedShape};

/// Options for discontinuity detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscontinuityOptions {
    /// A window must hold strictly more samples than this to be reported.
    pub min_samples: usize,
}

impl Default for DiscontinuityOptions {
    fn default() -> Self {
        Self { min_samples: 100 }
    }
}

/// Evaluation window `[prev, changepoint, next]` of sorted sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub prev: usize,
    pub changepoint: usize,
    pub next: usize,
}

impl Window {
    /// Number of samples scored over the window.
    pub fn n_samples(&self) -> usize {
        self.next - self.prev
    }
}

/// Checks that every outcome is exactly 0 or 1.
pub fn validate_outcomes(y_true: &ArrayView1<f64>) -> Result<(), AuditError> {
    match y_true
        .iter()
        .enumerate()
        .find(|(_, value)| **value != 0.0 && **value != 1.0)
    {
        Some((index, &value)) => Err(AuditError::NonBinaryOutcome { index, value }),
        None => Ok(()),
    }
}

/// Score contribution of one sample.
///
/// For a negative outcome the lower of the two predictions is rewarded, for a
/// positive outcome the higher one; the sign is chosen so that a positive
/// value favours the step function.
pub fn evaluate_discontinuity_sample(continuous: f64, discontinuous: f64, outcome: f64) -> f64 {
    if outcome == 0.0 {
        continuous - discontinuous
    } else {
        discontinuous - continuous
    }
}

/// Log-likelihood gain of the step hypothesis over the linear one across a window.
///
/// # Arguments
/// * `shape` - Sorted shape-function samples
/// * `y_true` - Outcomes in the same sorted order as `shape`
/// * `window` - `prev < changepoint <= next`, all valid sample indices
pub fn evaluate_discontinuity(
    shape: &SortedShape,
    y_true: &ArrayView1<f64>,
    window: Window,
) -> f64 {
    let Window {
        prev,
        changepoint,
        next,
    } = window;
    let (begin_x, end_x) = (shape.x[prev], shape.x[next]);
    let (begin_y, end_y) = (shape.y[prev], shape.y[next]);

    let span = end_x - begin_x;
    let continuous_slope = if span == 0.0 {
        0.0
    } else {
        (end_y - begin_y) / span
    };

    (prev..next)
        .map(|sample| {
            let continuous = begin_y + (shape.x[sample] - begin_x) * continuous_slope;
            let discontinuous = if sample <= changepoint { begin_y } else { end_y };
            evaluate_discontinuity_sample(continuous, discontinuous, y_true[sample])
        })
        .sum()
}

/// Finds discontinuities in one sorted shape function.
///
/// Every nonzero slope is a candidate. Each candidate after the first is
/// scored over the window from the previous candidate to the next one (or
/// the last slope index for the final candidate) and kept when the score is
/// positive and the window holds more than `min_samples` samples.
///
/// # Arguments
/// * `shape` - Sorted shape-function samples
/// * `y_true` - Binary outcomes in the same sorted order as `shape`
/// * `options` - Minimum window support
///
/// # Errors
/// Returns `LengthMismatch` if `y_true` does not have one entry per sample.
pub fn find_discontinuities_in_sorted(
    shape: &SortedShape,
    y_true: &ArrayView1<f64>,
    options: &DiscontinuityOptions,
) -> Result<Vec<DiscontinuityScore>, AuditError> {
    if y_true.len() != shape.len() {
        return Err(AuditError::LengthMismatch {
            x_len: shape.len(),
            y_len: y_true.len(),
        });
    }

    let slopes = shape.slopes();
    let candidates: Vec<usize> = slopes
        .iter()
        .enumerate()
        .filter(|(_, slope)| slope.abs() > 0.0)
        .map(|(i, _)| i)
        .collect();
    let last_slope = slopes.len().saturating_sub(1);
    log::debug!(
        "{} slopes, {} discontinuity candidates",
        slopes.len(),
        candidates.len()
    );

    let mut found = Vec::new();
    for (k, &changepoint) in candidates.iter().enumerate().skip(1) {
        let window = Window {
            prev: candidates[k - 1],
            changepoint,
            next: candidates.get(k + 1).copied().unwrap_or(last_slope),
        };
        let log_p_diff = evaluate_discontinuity(shape, y_true, window);
        let n_samples = window.n_samples();
        if log_p_diff > 0.0 && n_samples > options.min_samples {
            found.push(DiscontinuityScore {
                value: shape.x[changepoint],
                n_samples,
                effect_size: (log_p_diff / n_samples as f64).exp(),
                log_p_diff,
            });
        }
    }
    Ok(found)
}

/// Finds discontinuities in every feature's shape function.
///
/// # Arguments
/// * `frame` - Raw training data
/// * `embeddings` - Per-feature contributions (log-probability scale), same
///   shape and row order as `frame`
/// * `y_true` - Binary outcomes in the frame's row order
/// * `options` - Minimum window support
/// * `parallel` - Parallelization settings for the per-feature loop
///
/// # Returns
/// Table sorted by `P-Ratio` descending.
///
/// # Errors
/// - `NonBinaryOutcome` if any outcome is not 0 or 1.
/// - `LengthMismatch`/`ShapeMismatch` if the inputs do not line up.
pub fn find_discontinuities_from_embeddings(
    frame: &FeatureFrame,
    embeddings: &ArrayView2<f64>,
    y_true: &ArrayView1<f64>,
    options: &DiscontinuityOptions,
    parallel: ParallelSettings,
) -> Result<DiscontinuityTable, AuditError> {
    frame.check_embeddings(embeddings)?;
    if y_true.len() != frame.n_samples() {
        return Err(AuditError::LengthMismatch {
            x_len: frame.n_samples(),
            y_len: y_true.len(),
        });
    }
    validate_outcomes(y_true)?;

    let per_feature = parallel.map_features(frame.n_features(), |j| {
        let shape = SortedShape::from_frame(frame, embeddings, j)?;
        let sorted_outcomes = shape.permute(y_true.view())?;
        let found = find_discontinuities_in_sorted(&shape, &sorted_outcomes.view(), options)?;
        log::debug!(
            "feature '{}': {} discontinuities",
            frame.name(j),
            found.len()
        );
        Ok(found)
    })?;

    let table = DiscontinuityTable::from_feature_rows(
        frame
            .names()
            .iter()
            .map(String::as_str)
            .zip(per_feature),
    );
    log::info!(
        "scanned {} features for discontinuities, found {}",
        frame.n_features(),
        table.len()
    );
    Ok(table)
}
