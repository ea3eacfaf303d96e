use thiserror::Error;

/// Errors that can occur while loading a binned additive explanation
/// (e.g., an EBM global explanation exported as JSON).
#[derive(Debug, Error)]
pub enum ExplanationError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Explanation has no terms")]
    NoTerms,

    #[error("Term '{term}' has {edges} bin edges for {scores} scores (expected scores + 1 edges)")]
    EdgeScoreMismatch {
        term: String,
        edges: usize,
        scores: usize,
    },

    #[error("Term '{0}' has bin edges that are not sorted ascending")]
    UnsortedEdges(String),

    #[error("Term '{0}' contains a non-finite edge, level or score")]
    NonFiniteValue(String),

    #[error("Term '{term}' has unknown type '{kind}'")]
    UnknownTermType { term: String, kind: String },

    #[error("Term '{term}' has {levels} levels for {scores} scores")]
    LevelScoreMismatch {
        term: String,
        levels: usize,
        scores: usize,
    },

    #[error("Explanation has {terms} terms but the data has {features} features")]
    TermCountMismatch { terms: usize, features: usize },
}

/// Errors that can occur while auditing shape functions.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Length mismatch: x has {x_len} values, y has {y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },

    #[error("Array shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Got {names} feature names for {columns} columns")]
    FeatureNameMismatch { names: usize, columns: usize },

    #[error("Non-finite value in feature '{feature}' at row {row}")]
    NonFiniteValue { feature: String, row: usize },

    #[error("Outcome at index {index} is {value}; outcomes must be 0 or 1")]
    NonBinaryOutcome { index: usize, value: f64 },

    #[error("Probability threshold {0} must lie in [0, 1]")]
    InvalidThreshold(f64),

    #[error("Invalid changepoint prior: {0}")]
    InvalidPrior(String),

    #[error("Failed to build thread pool: {0}")]
    ThreadPoolError(String),

    #[error(transparent)]
    Explanation(#[from] ExplanationError),
}

/// Errors from the end-to-end fit -> embed -> detect pipeline.
///
/// Failures of the model-fitting capability are carried unmodified in
/// [`PipelineError::Fit`].
#[derive(Debug, Error)]
pub enum PipelineError<E>
where
    E: std::error::Error + 'static,
{
    #[error("Model fitting failed: {0}")]
    Fit(#[source] E),

    #[error(transparent)]
    Audit(#[from] AuditError),
}
