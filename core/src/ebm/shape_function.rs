use ndarray::{Array2, ArrayView2};

use crate::audit::error::{AuditError, ExplanationError};
use crate::audit::pipeline::ShapeEmbedding;

/// A single feature's binned shape function.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeFunction {
    /// Piecewise-constant over bins `[edges[k], edges[k+1])`; values outside
    /// the edges fall into the first or last bin.
    Continuous { edges: Vec<f64>, scores: Vec<f64> },
    /// One score per numeric level; unseen levels contribute 0.
    Categorical { levels: Vec<f64>, scores: Vec<f64> },
}

impl ShapeFunction {
    /// Creates a continuous shape function, validating its bins.
    ///
    /// # Errors
    /// - `EdgeScoreMismatch` unless there is at least one score and exactly
    ///   one more edge than scores.
    /// - `NonFiniteValue` if any edge or score is NaN/infinite.
    /// - `UnsortedEdges` if the edges decrease anywhere.
    pub fn continuous(
        term: &str,
        edges: Vec<f64>,
        scores: Vec<f64>,
    ) -> Result<Self, ExplanationError> {
        if scores.is_empty() || edges.len() != scores.len() + 1 {
            return Err(ExplanationError::EdgeScoreMismatch {
                term: term.to_string(),
                edges: edges.len(),
                scores: scores.len(),
            });
        }
        if edges.iter().chain(&scores).any(|v| !v.is_finite()) {
            return Err(ExplanationError::NonFiniteValue(term.to_string()));
        }
        if edges.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(ExplanationError::UnsortedEdges(term.to_string()));
        }
        Ok(ShapeFunction::Continuous { edges, scores })
    }

    /// Creates a categorical shape function.
    pub fn categorical(
        term: &str,
        levels: Vec<f64>,
        scores: Vec<f64>,
    ) -> Result<Self, ExplanationError> {
        if levels.len() != scores.len() {
            return Err(ExplanationError::LevelScoreMismatch {
                term: term.to_string(),
                levels: levels.len(),
                scores: scores.len(),
            });
        }
        if levels.iter().chain(&scores).any(|v| !v.is_finite()) {
            return Err(ExplanationError::NonFiniteValue(term.to_string()));
        }
        Ok(ShapeFunction::Categorical { levels, scores })
    }

    /// Contribution of this feature at raw value `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            ShapeFunction::Continuous { edges, scores } => {
                // Bin k covers [edges[k], edges[k+1]); clamp to the outer bins.
                let n_at_or_below = edges.partition_point(|&edge| edge <= x);
                let bin = n_at_or_below.saturating_sub(1).min(scores.len() - 1);
                scores[bin]
            }
            ShapeFunction::Categorical { levels, scores } => levels
                .iter()
                .position(|&level| level == x)
                .map_or(0.0, |idx| scores[idx]),
        }
    }

    pub fn n_bins(&self) -> usize {
        match self {
            ShapeFunction::Continuous { scores, .. } | ShapeFunction::Categorical { scores, .. } => {
                scores.len()
            }
        }
    }
}

/// A named main-effect term.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveTerm {
    pub name: String,
    pub shape: ShapeFunction,
}

/// Global explanation of an additive model: one shape function per feature
/// plus an intercept.
///
/// Term `j` describes column `j` of the data it embeds.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditiveExplanation {
    terms: Vec<AdditiveTerm>,
    intercept: f64,
}

impl AdditiveExplanation {
    pub fn new(terms: Vec<AdditiveTerm>, intercept: f64) -> Result<Self, ExplanationError> {
        if terms.is_empty() {
            return Err(ExplanationError::NoTerms);
        }
        Ok(Self { terms, intercept })
    }

    pub fn terms(&self) -> &[AdditiveTerm] {
        &self.terms
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name.clone()).collect()
    }
}

impl ShapeEmbedding for AdditiveExplanation {
    fn embed(&self, raw: &ArrayView2<f64>) -> Result<Array2<f64>, AuditError> {
        if raw.ncols() != self.terms.len() {
            return Err(ExplanationError::TermCountMismatch {
                terms: self.terms.len(),
                features: raw.ncols(),
            }
            .into());
        }
        let mut embeddings = Array2::zeros(raw.dim());
        for ((row, feature), value) in raw.indexed_iter() {
            embeddings[[row, feature]] = self.terms[feature].shape.evaluate(*value);
        }
        Ok(embeddings)
    }
}
