//! End-to-end audits: fit an additive model, embed the training data through
//! its shape functions, and run both detectors.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::Deserialize;

use crate::audit::changepoint::{BayesOffline, ChangepointDetector};
use crate::audit::discontinuity::{find_discontinuities_from_embeddings, DiscontinuityOptions};
use crate::audit::error::{AuditError, PipelineError};
use crate::audit::monotonicity::{find_non_monotonicities_from_embeddings, NonMonotonicityOptions};
use crate::audit::parallel::ParallelSettings;
use crate::audit::results::{DiscontinuityTable, NonMonotonicityTable};
use crate::audit::slopes::calculate_slopes;
use crate::audit::types::FeatureFrame;

/// A fitted additive model (or its global explanation) that can evaluate each
/// feature's shape function on raw inputs.
pub trait ShapeEmbedding {
    /// Per-feature additive contributions for every row of `raw`.
    ///
    /// # Returns
    /// Matrix with the same shape and row order as `raw`; entry `[i, j]` is
    /// feature `j`'s contribution at sample `i`.
    fn embed(&self, raw: &ArrayView2<f64>) -> Result<Array2<f64>, AuditError>;
}

/// Trains an additive model on a frame and binary outcomes.
///
/// Constructor and fit options belong to the implementor.
pub trait AdditiveModelFitter {
    type Model: ShapeEmbedding;
    type Error: std::error::Error + 'static;

    fn fit(&self, frame: &FeatureFrame, y: &ArrayView1<f64>) -> Result<Self::Model, Self::Error>;
}

/// Serializable configuration for a [`ShapeAuditor`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub changepoint: BayesOffline,
    pub non_monotonicity: NonMonotonicityOptions,
    pub discontinuity: DiscontinuityOptions,
    pub parallel: ParallelSettings,
}

impl AuditConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// High-level auditor for the shape functions of an additive model.
///
/// Bundles the changepoint-detection capability with detector options and
/// parallelization settings.
#[derive(Debug, Clone)]
pub struct ShapeAuditor<D: ChangepointDetector = BayesOffline> {
    detector: D,
    non_monotonicity: NonMonotonicityOptions,
    discontinuity: DiscontinuityOptions,
    parallel: ParallelSettings,
}

impl Default for ShapeAuditor<BayesOffline> {
    fn default() -> Self {
        Self::new(BayesOffline::default())
    }
}

impl ShapeAuditor<BayesOffline> {
    /// Creates an auditor from a configuration, validating every option.
    pub fn from_config(config: AuditConfig) -> Result<Self, AuditError> {
        config.changepoint.validate()?;
        config.non_monotonicity.validate()?;
        Ok(Self {
            detector: config.changepoint,
            non_monotonicity: config.non_monotonicity,
            discontinuity: config.discontinuity,
            parallel: config.parallel,
        })
    }
}

impl<D: ChangepointDetector> ShapeAuditor<D> {
    /// Creates an auditor with default options around a changepoint detector.
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            non_monotonicity: NonMonotonicityOptions::default(),
            discontinuity: DiscontinuityOptions::default(),
            parallel: ParallelSettings::default(),
        }
    }

    pub fn with_non_monotonicity(mut self, options: NonMonotonicityOptions) -> Self {
        self.non_monotonicity = options;
        self
    }

    pub fn with_discontinuity(mut self, options: DiscontinuityOptions) -> Self {
        self.discontinuity = options;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelSettings) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn non_monotonicity_options(&self) -> &NonMonotonicityOptions {
        &self.non_monotonicity
    }

    pub fn discontinuity_options(&self) -> &DiscontinuityOptions {
        &self.discontinuity
    }

    pub fn parallel(&self) -> ParallelSettings {
        self.parallel
    }

    /// Embeds the frame through the model's shape functions.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the model returns a matrix that does not
    /// match the frame, or `NonFiniteValue` if it contains NaN/infinity.
    pub fn embed<M>(&self, model: &M, frame: &FeatureFrame) -> Result<Array2<f64>, AuditError>
    where
        M: ShapeEmbedding + ?Sized,
    {
        let embeddings = model.embed(&frame.values())?;
        frame.check_embeddings(&embeddings.view())?;
        Ok(embeddings)
    }

    /// Sorted slopes of every feature's shape function, one column per feature.
    pub fn slopes<M>(&self, model: &M, frame: &FeatureFrame) -> Result<Array2<f64>, AuditError>
    where
        M: ShapeEmbedding + ?Sized,
    {
        let embeddings = self.embed(model, frame)?;
        calculate_slopes(frame, &embeddings.view(), self.parallel)
    }

    /// Non-monotonicities of a fitted model's shape functions.
    pub fn non_monotonicities<M>(
        &self,
        model: &M,
        frame: &FeatureFrame,
    ) -> Result<NonMonotonicityTable, AuditError>
    where
        M: ShapeEmbedding + ?Sized,
    {
        let embeddings = self.embed(model, frame)?;
        find_non_monotonicities_from_embeddings(
            frame,
            &embeddings.view(),
            &self.detector,
            &self.non_monotonicity,
            self.parallel,
        )
    }

    /// Discontinuities of a fitted model's shape functions, scored against
    /// binary outcomes `y_true` in the frame's row order.
    pub fn discontinuities<M>(
        &self,
        model: &M,
        frame: &FeatureFrame,
        y_true: &ArrayView1<f64>,
    ) -> Result<DiscontinuityTable, AuditError>
    where
        M: ShapeEmbedding + ?Sized,
    {
        let embeddings = self.embed(model, frame)?;
        find_discontinuities_from_embeddings(
            frame,
            &embeddings.view(),
            y_true,
            &self.discontinuity,
            self.parallel,
        )
    }

    /// Fits a model with `fitter`, then finds its non-monotonicities.
    ///
    /// # Errors
    /// Fitting failures are returned unmodified as `PipelineError::Fit`.
    pub fn fit_non_monotonicities<F>(
        &self,
        fitter: &F,
        frame: &FeatureFrame,
        y: &ArrayView1<f64>,
    ) -> Result<NonMonotonicityTable, PipelineError<F::Error>>
    where
        F: AdditiveModelFitter,
    {
        let model = fitter.fit(frame, y).map_err(PipelineError::Fit)?;
        Ok(self.non_monotonicities(&model, frame)?)
    }

    /// Fits a model with `fitter`, then finds its discontinuities against `y`.
    ///
    /// # Errors
    /// Fitting failures are returned unmodified as `PipelineError::Fit`.
    pub fn fit_discontinuities<F>(
        &self,
        fitter: &F,
        frame: &FeatureFrame,
        y: &ArrayView1<f64>,
    ) -> Result<DiscontinuityTable, PipelineError<F::Error>>
    where
        F: AdditiveModelFitter,
    {
        let model = fitter.fit(frame, y).map_err(PipelineError::Fit)?;
        Ok(self.discontinuities(&model, frame, y)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use thiserror::Error;

    /// Model whose shape function for every feature is a fixed closure of x.
    struct FnModel(fn(usize, f64) -> f64);

    impl ShapeEmbedding for FnModel {
        fn embed(&self, raw: &ArrayView2<f64>) -> Result<Array2<f64>, AuditError> {
            let mut out = raw.to_owned();
            for ((_, j), value) in out.indexed_iter_mut() {
                *value = (self.0)(j, *value);
            }
            Ok(out)
        }
    }

    #[derive(Debug, Error)]
    #[error("solver diverged")]
    struct DivergedError;

    struct FailingFitter;

    impl AdditiveModelFitter for FailingFitter {
        type Model = FnModel;
        type Error = DivergedError;

        fn fit(
            &self,
            _frame: &FeatureFrame,
            _y: &ArrayView1<f64>,
        ) -> Result<FnModel, DivergedError> {
            Err(DivergedError)
        }
    }

    struct ShapeFitter;

    impl AdditiveModelFitter for ShapeFitter {
        type Model = FnModel;
        type Error = DivergedError;

        fn fit(
            &self,
            _frame: &FeatureFrame,
            _y: &ArrayView1<f64>,
        ) -> Result<FnModel, DivergedError> {
            Ok(FnModel(|j, x| match j {
                // Rise then fall, peaking at 4.
                0 => -(x - 4.0).abs(),
                // Step between 149 and 150 with small jumps at both ends.
                _ => match x as usize {
                    0 => -2.5,
                    1..=149 => -2.0,
                    150..=298 => 2.0,
                    _ => 2.5,
                },
            }))
        }
    }

    fn frame(n: usize) -> FeatureFrame {
        let mut values = Array2::zeros((n, 2));
        for i in 0..n {
            values[[i, 0]] = (i % 10) as f64;
            values[[i, 1]] = i as f64;
        }
        FeatureFrame::new(vec!["peak".to_string(), "step".to_string()], values).unwrap()
    }

    #[test]
    fn test_fit_error_propagates_unmodified() {
        let auditor: ShapeAuditor = ShapeAuditor::default();
        let frame = frame(20);
        let y = Array1::zeros(20);
        let err = auditor
            .fit_non_monotonicities(&FailingFitter, &frame, &y.view())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fit(DivergedError)));
        assert_eq!(err.to_string(), "Model fitting failed: solver diverged");
    }

    #[test]
    fn test_fit_and_audit_end_to_end() {
        let n = 300;
        let frame = frame(n);
        let y: Array1<f64> = (0..n).map(|i| if i < 150 { 0.0 } else { 1.0 }).collect();
        let auditor: ShapeAuditor =
            ShapeAuditor::default().with_parallel(ParallelSettings::with_n_threads(2));

        let discontinuities = auditor
            .fit_discontinuities(&ShapeFitter, &frame, &y.view())
            .unwrap();
        assert_eq!(discontinuities.features(), vec!["step"]);
        assert_eq!(discontinuities.values(), vec![149.0]);

        let model = ShapeFitter.fit(&frame, &y.view()).unwrap();
        let slopes = auditor.slopes(&model, &frame).unwrap();
        assert_eq!(slopes.dim(), (n - 1, 2));
    }

    #[test]
    fn test_embedding_shape_is_checked() {
        struct Truncating;
        impl ShapeEmbedding for Truncating {
            fn embed(&self, raw: &ArrayView2<f64>) -> Result<Array2<f64>, AuditError> {
                Ok(Array2::zeros((raw.nrows() - 1, raw.ncols())))
            }
        }
        let auditor: ShapeAuditor = ShapeAuditor::default();
        assert!(matches!(
            auditor.non_monotonicities(&Truncating, &frame(5)),
            Err(AuditError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_config_from_json() {
        let config = AuditConfig::from_json(
            r#"{"non_monotonicity": {"counter_causal_only": true}, "discontinuity": {"min_samples": 5}}"#,
        )
        .unwrap();
        assert!(config.non_monotonicity.counter_causal_only);
        assert_eq!(config.non_monotonicity.prob_threshold, 0.2);
        assert_eq!(config.discontinuity.min_samples, 5);
        assert_eq!(config.parallel, ParallelSettings::sequential());

        let auditor = ShapeAuditor::from_config(config).unwrap();
        assert_eq!(auditor.discontinuity_options().min_samples, 5);

        let invalid = AuditConfig {
            non_monotonicity: NonMonotonicityOptions {
                prob_threshold: 3.0,
                counter_causal_only: false,
            },
            ..AuditConfig::default()
        };
        assert!(ShapeAuditor::from_config(invalid).is_err());
    }
}
