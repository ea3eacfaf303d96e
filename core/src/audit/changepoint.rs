//! Changepoint-detection capability.
//!
//! Detectors consume this through the [`ChangepointDetector`] trait so the
//! inference procedure can be swapped without touching them. [`BayesOffline`]
//! is the exact offline Bayesian segmentation of Fearnhead (2006) with a
//! constant prior over segment lengths and a Gaussian observation model with
//! unknown mean and variance.

use ndarray::{Array1, Array2};
use serde::Deserialize;
use statrs::function::gamma::ln_gamma;

use crate::audit::error::AuditError;

const LOG_2PI: f64 = 1.837_877_066_409_345_5;

/// A procedure that locates changepoints in a 1-D sequence.
pub trait ChangepointDetector: Send + Sync {
    /// Returns the ascending, de-duplicated indices at which a new segment
    /// starts with posterior probability at least `prob_threshold`.
    ///
    /// Implementations must be deterministic for identical inputs.
    fn detect(&self, sequence: &[f64], prob_threshold: f64) -> Result<Vec<usize>, AuditError>;
}

/// Checks that a changepoint probability threshold is usable.
pub fn validate_threshold(prob_threshold: f64) -> Result<(), AuditError> {
    if prob_threshold.is_finite() && (0.0..=1.0).contains(&prob_threshold) {
        Ok(())
    } else {
        Err(AuditError::InvalidThreshold(prob_threshold))
    }
}

/// Constant prior over segment lengths.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstPrior {
    /// Every segment length has probability `1 / (n + 1)` for a sequence of length `n`.
    #[default]
    Uniform,
    /// Every segment length has probability `p`, with `0 < p < 1`.
    Fixed { p: f64 },
}

impl ConstPrior {
    pub fn validate(&self) -> Result<(), AuditError> {
        match *self {
            ConstPrior::Uniform => Ok(()),
            ConstPrior::Fixed { p } if p.is_finite() && p > 0.0 && p < 1.0 => Ok(()),
            ConstPrior::Fixed { p } => Err(AuditError::InvalidPrior(format!(
                "constant prior probability must lie in (0, 1); got {p}"
            ))),
        }
    }

    fn probability(&self, n: usize) -> f64 {
        match *self {
            ConstPrior::Uniform => 1.0 / (n as f64 + 1.0),
            ConstPrior::Fixed { p } => p,
        }
    }
}

/// Gaussian observation model with a Normal-Inverse-Gamma prior on
/// (mean, variance).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GaussianObservation {
    pub mu0: f64,
    pub kappa0: f64,
    pub alpha0: f64,
    pub beta0: f64,
}

impl Default for GaussianObservation {
    fn default() -> Self {
        Self {
            mu0: 0.0,
            kappa0: 1.0,
            alpha0: 1.0,
            beta0: 1.0,
        }
    }
}

impl GaussianObservation {
    pub fn validate(&self) -> Result<(), AuditError> {
        let positive = [self.kappa0, self.alpha0, self.beta0];
        if !self.mu0.is_finite() || positive.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(AuditError::InvalidPrior(format!(
                "gaussian prior needs finite mu0 and positive kappa0/alpha0/beta0; got {self:?}"
            )));
        }
        Ok(())
    }

    /// Log marginal likelihood of `data[start..end]` as a single segment.
    fn segment_log_marginal(&self, stats: &PrefixStats, start: usize, end: usize) -> f64 {
        let m = (end - start) as f64;
        let sum = stats.sum[end] - stats.sum[start];
        let sum_sq = stats.sum_sq[end] - stats.sum_sq[start];
        let mean = sum / m;
        let sse = (sum_sq - sum * sum / m).max(0.0);

        let kappa_n = self.kappa0 + m;
        let alpha_n = self.alpha0 + 0.5 * m;
        let mean_delta = mean - self.mu0;
        let shrinkage = (self.kappa0 * m * mean_delta * mean_delta) / (2.0 * kappa_n);
        let beta_n = (self.beta0 + 0.5 * sse + shrinkage).max(f64::MIN_POSITIVE);

        ln_gamma(alpha_n) - ln_gamma(self.alpha0) + self.alpha0 * self.beta0.ln()
            - alpha_n * beta_n.ln()
            + 0.5 * (self.kappa0.ln() - kappa_n.ln())
            - 0.5 * m * LOG_2PI
    }
}

/// Prefix sums for O(1) segment statistics.
struct PrefixStats {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl PrefixStats {
    fn new(data: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(data.len() + 1);
        let mut sum_sq = Vec::with_capacity(data.len() + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for &x in data {
            sum.push(sum[sum.len() - 1] + x);
            sum_sq.push(sum_sq[sum_sq.len() - 1] + x * x);
        }
        Self { sum, sum_sq }
    }
}

/// Exact Bayesian offline changepoint detection.
///
/// Computes, for every position `t`, the posterior probability that a
/// segment ends at `t` (so a new one starts at `t + 1`), summed over the
/// ordinal of the changepoint.
///
/// Time and memory are quadratic in the sequence length: two dense `n x n`
/// `f64` matrices are allocated (about 16 * n^2 bytes, so ~1.6 GB at
/// n = 10_000). Binned shape functions yield short sign sequences; callers
/// with very long sequences should plug in a different [`ChangepointDetector`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BayesOffline {
    pub prior: ConstPrior,
    pub observation: GaussianObservation,
    /// Log-space cutoff below which further segment ends are not explored.
    pub truncate: f64,
}

impl Default for BayesOffline {
    fn default() -> Self {
        Self {
            prior: ConstPrior::Uniform,
            observation: GaussianObservation::default(),
            truncate: -20.0,
        }
    }
}

impl BayesOffline {
    pub fn new(prior: ConstPrior, observation: GaussianObservation) -> Result<Self, AuditError> {
        let detector = Self {
            prior,
            observation,
            ..Self::default()
        };
        detector.validate()?;
        Ok(detector)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        self.prior.validate()?;
        self.observation.validate()?;
        if self.truncate.is_nan() {
            return Err(AuditError::InvalidPrior("truncate must not be NaN".to_string()));
        }
        Ok(())
    }

    /// Posterior changepoint probabilities.
    ///
    /// # Returns
    /// Array of length `n - 1` (empty for `n < 2`); entry `t` is the
    /// probability that a new segment starts at index `t + 1`.
    pub fn changepoint_probabilities(&self, sequence: &[f64]) -> Result<Array1<f64>, AuditError> {
        self.validate()?;
        let n = sequence.len();
        if n < 2 {
            return Ok(Array1::zeros(0));
        }

        let stats = PrefixStats::new(sequence);
        let obs = &self.observation;
        let p = self.prior.probability(n);
        let log_g = p.ln();
        // log P(segment length > len) under the constant prior.
        let log_tail = |len: usize| {
            let mass = len as f64 * p;
            if mass < 1.0 {
                (-mass).ln_1p()
            } else {
                f64::NEG_INFINITY
            }
        };

        // seg[[t, s]]: log likelihood of data[t..=s] as one segment.
        // q[t]: log likelihood of data[t..] given a segment starts at t.
        let mut seg = Array2::from_elem((n, n), f64::NEG_INFINITY);
        let mut q = Array1::from_elem(n, f64::NEG_INFINITY);

        seg[[n - 1, n - 1]] = obs.segment_log_marginal(&stats, n - 1, n);
        q[n - 1] = seg[[n - 1, n - 1]];

        for t in (0..n - 1).rev() {
            let mut next_cp = f64::NEG_INFINITY;
            for s in t..n - 1 {
                seg[[t, s]] = obs.segment_log_marginal(&stats, t, s + 1);
                let summand = seg[[t, s]] + q[s + 1] + log_g;
                next_cp = log_add_exp(next_cp, summand);
                if summand - next_cp < self.truncate {
                    break;
                }
            }
            seg[[t, n - 1]] = obs.segment_log_marginal(&stats, t, n);
            q[t] = log_add_exp(next_cp, seg[[t, n - 1]] + log_tail(n - 1 - t));
        }

        // cp[[j, t]]: log probability that the (j+1)-th changepoint follows t.
        let mut cp = Array2::from_elem((n - 1, n - 1), f64::NEG_INFINITY);
        for t in 0..n - 1 {
            cp[[0, t]] = finite_or_neg_inf(seg[[0, t]] + q[t + 1] + log_g - q[0]);
        }
        for j in 1..n - 1 {
            let prev_row_max = cp
                .row(j - 1)
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            if prev_row_max < self.truncate {
                break;
            }
            for t in j..n - 1 {
                let mut acc = f64::NEG_INFINITY;
                for i in (j - 1)..t {
                    let prev = cp[[j - 1, i]];
                    let segment = seg[[i + 1, t]];
                    if prev == f64::NEG_INFINITY || segment == f64::NEG_INFINITY {
                        continue;
                    }
                    acc = log_add_exp(acc, prev + segment + q[t + 1] + log_g - q[i + 1]);
                }
                cp[[j, t]] = finite_or_neg_inf(acc);
            }
        }

        Ok(cp.map_axis(ndarray::Axis(0), |column| {
            column.iter().map(|log_prob| log_prob.exp()).sum::<f64>()
        }))
    }
}

impl ChangepointDetector for BayesOffline {
    fn detect(&self, sequence: &[f64], prob_threshold: f64) -> Result<Vec<usize>, AuditError> {
        validate_threshold(prob_threshold)?;
        let probabilities = self.changepoint_probabilities(sequence)?;
        Ok(probabilities
            .iter()
            .enumerate()
            .filter(|(_, prob)| **prob >= prob_threshold)
            .map(|(t, _)| t + 1)
            .collect())
    }
}

fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

fn finite_or_neg_inf(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signs(pattern: &[(f64, usize)]) -> Vec<f64> {
        pattern
            .iter()
            .flat_map(|&(sign, count)| std::iter::repeat(sign).take(count))
            .collect()
    }

    #[test]
    fn test_sign_flip_is_detected_at_inflection() {
        let detector = BayesOffline::default();
        let falling_then_rising = signs(&[(-1.0, 4), (1.0, 5)]);
        assert_eq!(detector.detect(&falling_then_rising, 0.2).unwrap(), vec![4]);

        let rising_then_falling = signs(&[(1.0, 5), (-1.0, 4)]);
        assert_eq!(detector.detect(&rising_then_falling, 0.2).unwrap(), vec![5]);
    }

    #[test]
    fn test_constant_sequence_has_no_changepoints() {
        let detector = BayesOffline::default();
        assert!(detector.detect(&[1.0; 9], 0.2).unwrap().is_empty());
    }

    #[test]
    fn test_probabilities_peak_at_flip() {
        let detector = BayesOffline::default();
        let probs = detector
            .changepoint_probabilities(&signs(&[(-1.0, 4), (1.0, 5)]))
            .unwrap();
        assert_eq!(probs.len(), 8);
        assert!(probs[3] > 0.7);
        for (t, &prob) in probs.iter().enumerate() {
            assert!((0.0..=1.0 + 1e-9).contains(&prob));
            if t != 3 {
                assert!(prob < 0.2, "unexpected mass {prob} at {t}");
            }
        }
    }

    #[test]
    fn test_short_sequences() {
        let detector = BayesOffline::default();
        assert!(detector.detect(&[], 0.2).unwrap().is_empty());
        assert!(detector.detect(&[1.0], 0.2).unwrap().is_empty());
    }

    #[test]
    fn test_detect_is_deterministic() {
        let detector = BayesOffline::default();
        let data = signs(&[(1.0, 6), (-1.0, 3), (1.0, 7), (-1.0, 2)]);
        let first = detector.changepoint_probabilities(&data).unwrap();
        let second = detector.changepoint_probabilities(&data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_threshold_and_prior() {
        let detector = BayesOffline::default();
        assert!(matches!(
            detector.detect(&[1.0, -1.0], 1.5),
            Err(AuditError::InvalidThreshold(_))
        ));
        assert!(matches!(
            detector.detect(&[1.0, -1.0], f64::NAN),
            Err(AuditError::InvalidThreshold(_))
        ));
        assert!(BayesOffline::new(ConstPrior::Fixed { p: 0.0 }, GaussianObservation::default())
            .is_err());
        let bad_obs = GaussianObservation {
            beta0: -1.0,
            ..GaussianObservation::default()
        };
        assert!(BayesOffline::new(ConstPrior::Uniform, bad_obs).is_err());
    }

    #[test]
    fn test_deserialize_detector_config() {
        let detector: BayesOffline =
            serde_json::from_str(r#"{"prior": {"kind": "fixed", "p": 0.05}}"#).unwrap();
        assert_eq!(detector.prior, ConstPrior::Fixed { p: 0.05 });
        assert_eq!(detector.observation, GaussianObservation::default());
        assert_eq!(detector.truncate, -20.0);
    }
}
