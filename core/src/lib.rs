// Shape-function audit core crate
// Pure Rust: detection of non-monotonicities and discontinuities in the
// shape functions of additive models. Independent of PyO3.

pub mod audit;
pub mod ebm;

// Re-export commonly used types
pub use audit::changepoint::{BayesOffline, ChangepointDetector, ConstPrior, GaussianObservation};
pub use audit::discontinuity::{
    find_discontinuities_from_embeddings, find_discontinuities_in_sorted, DiscontinuityOptions,
};
pub use audit::error::{AuditError, ExplanationError, PipelineError};
pub use audit::monotonicity::{
    find_non_monotonicities_from_embeddings, is_counter_causal, NonMonotonicityOptions,
};
pub use audit::parallel::ParallelSettings;
pub use audit::pipeline::{AdditiveModelFitter, AuditConfig, ShapeAuditor, ShapeEmbedding};
pub use audit::results::{
    Discontinuity, DiscontinuityScore, DiscontinuityTable, NonMonotonicity, NonMonotonicityTable,
};
pub use audit::slopes::{calc_slopes, calculate_slopes};
pub use audit::types::{FeatureFrame, SortedShape};
pub use ebm::{parse_explanation_json, AdditiveExplanation, AdditiveTerm, ShapeFunction};
