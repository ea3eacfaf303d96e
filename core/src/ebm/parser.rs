use crate::audit::error::ExplanationError;
use crate::ebm::json_schema::{JsonExplanation, JsonLevel, JsonTerm};
use crate::ebm::shape_function::{AdditiveExplanation, AdditiveTerm, ShapeFunction};

/// Parses one edge or level into a number.
fn parse_level(term: &str, level: &JsonLevel) -> Result<f64, ExplanationError> {
    match level {
        JsonLevel::Number(value) => Ok(*value),
        JsonLevel::Text(text) => text.trim().parse::<f64>().map_err(|_| {
            ExplanationError::InvalidJson(format!(
                "Term '{}' has non-numeric edge or level: {}",
                term, text
            ))
        }),
    }
}

/// Converts a JSON term into a validated shape function.
///
/// `continuous` terms use `names` as bin edges; `nominal`, `ordinal` and
/// `categorical` terms use them as levels. Anything else (e.g. pairwise
/// interactions) is rejected.
pub fn convert_term(json_term: &JsonTerm) -> Result<AdditiveTerm, ExplanationError> {
    let name = json_term.name.as_str();
    let values = json_term
        .names
        .iter()
        .map(|level| parse_level(name, level))
        .collect::<Result<Vec<f64>, _>>()?;
    let scores = json_term.scores.clone();

    let shape = match json_term.kind.as_str() {
        "continuous" => ShapeFunction::continuous(name, values, scores)?,
        "nominal" | "ordinal" | "categorical" => ShapeFunction::categorical(name, values, scores)?,
        other => {
            return Err(ExplanationError::UnknownTermType {
                term: name.to_string(),
                kind: other.to_string(),
            })
        }
    };
    Ok(AdditiveTerm {
        name: name.to_string(),
        shape,
    })
}

/// Parses a binned additive explanation from its JSON export.
///
/// # Errors
/// Returns `ExplanationError` if the JSON is malformed, has no terms, or any
/// term fails validation.
pub fn parse_explanation_json(json_str: &str) -> Result<AdditiveExplanation, ExplanationError> {
    let json: JsonExplanation =
        serde_json::from_str(json_str).map_err(|e| ExplanationError::InvalidJson(e.to_string()))?;

    let terms = json
        .terms
        .iter()
        .map(convert_term)
        .collect::<Result<Vec<_>, _>>()?;
    AdditiveExplanation::new(terms, json.intercept.unwrap_or(0.0))
}
