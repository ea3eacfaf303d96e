use ndarray::ArrayView1;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use shapeaudit_core::ebm::json_schema::{JsonLevel, JsonTerm};
use shapeaudit_core::ebm::parser::convert_term;
use shapeaudit_core::{AdditiveExplanation, AdditiveModelFitter, FeatureFrame};

/// Converts numpy arrays to plain lists so they extract as `Vec`.
fn to_list<'py>(obj: Bound<'py, PyAny>) -> PyResult<Bound<'py, PyAny>> {
    if obj.hasattr("tolist")? {
        obj.call_method0("tolist")
    } else {
        Ok(obj)
    }
}

fn extract_levels(names: Bound<'_, PyAny>) -> PyResult<Vec<JsonLevel>> {
    let items: Vec<Bound<'_, PyAny>> = to_list(names)?.extract()?;
    items
        .into_iter()
        .map(|item| match item.extract::<f64>() {
            Ok(value) => Ok(JsonLevel::Number(value)),
            Err(_) => Ok(JsonLevel::Text(item.str()?.to_string())),
        })
        .collect()
}

/// Reads the `feature_types` list of an explanation, if it has one.
fn feature_types(ebm_global: &Bound<'_, PyAny>) -> PyResult<Option<Vec<String>>> {
    if !ebm_global.hasattr("feature_types")? {
        return Ok(None);
    }
    let types = ebm_global.getattr("feature_types")?;
    if types.is_none() {
        return Ok(None);
    }
    Ok(Some(to_list(types)?.extract()?))
}

/// Builds an [`AdditiveExplanation`] from an interpret global explanation.
///
/// Reads `ebm_global.data(i)` for the first `feature_names.len()` terms, which
/// are the main effects in column order. Each term's `names` hold bin edges
/// (continuous) or levels (nominal/ordinal).
///
/// # Errors
/// Returns `PyErr` if a term cannot be read, or `ValueError` if a term is not
/// a valid binned shape function (e.g. an interaction in a main-effect slot).
pub fn explanation_from_ebm_global(
    ebm_global: &Bound<'_, PyAny>,
    feature_names: &[String],
    intercept: f64,
) -> PyResult<AdditiveExplanation> {
    let kinds = feature_types(ebm_global)?;

    let mut terms = Vec::with_capacity(feature_names.len());
    for (i, name) in feature_names.iter().enumerate() {
        let data = ebm_global.call_method1("data", (i,))?;
        if data.is_none() {
            return Err(PyValueError::new_err(format!(
                "Explanation has no data for term {} ('{}')",
                i, name
            )));
        }
        let names = extract_levels(data.get_item("names")?)?;
        let scores: Vec<f64> = to_list(data.get_item("scores")?)?.extract()?;

        let term_type: Option<String> = data.get_item("type").ok().and_then(|t| t.extract().ok());
        let kind = match (term_type.as_deref(), kinds.as_ref().and_then(|k| k.get(i))) {
            (Some("interaction"), _) => "interaction".to_string(),
            (_, Some(kind)) => kind.clone(),
            // No declared type: edges outnumber scores only for continuous bins.
            (_, None) if names.len() == scores.len() + 1 => "continuous".to_string(),
            (_, None) => "nominal".to_string(),
        };

        let json_term = JsonTerm {
            name: name.clone(),
            kind,
            names,
            scores,
        };
        terms.push(convert_term(&json_term).map_err(|e| PyValueError::new_err(e.to_string()))?);
    }

    AdditiveExplanation::new(terms, intercept).map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Reads a fitted EBM's intercept (scalar or single-element array).
fn ebm_intercept(ebm: &Bound<'_, PyAny>) -> PyResult<f64> {
    if !ebm.hasattr("intercept_")? {
        return Ok(0.0);
    }
    let intercept = to_list(ebm.getattr("intercept_")?)?;
    if let Ok(value) = intercept.extract::<f64>() {
        return Ok(value);
    }
    let values: Vec<f64> = intercept.extract()?;
    Ok(values.first().copied().unwrap_or(0.0))
}

/// Fits `interpret.glassbox.ExplainableBoostingClassifier` on the caller's
/// original Python training data.
///
/// The Python objects are passed to interpret untouched so column dtypes
/// survive; the frame supplies feature names for the resulting explanation.
pub struct EbmFitter<'py> {
    pub x_train: Bound<'py, PyAny>,
    pub y_train: Bound<'py, PyAny>,
    pub constructor_kwargs: Option<Bound<'py, PyDict>>,
    pub fit_kwargs: Option<Bound<'py, PyDict>>,
}

impl<'py> AdditiveModelFitter for EbmFitter<'py> {
    type Model = AdditiveExplanation;
    type Error = PyErr;

    fn fit(&self, frame: &FeatureFrame, _y: &ArrayView1<f64>) -> PyResult<AdditiveExplanation> {
        let py = self.x_train.py();
        let classifier = py
            .import("interpret.glassbox")?
            .getattr("ExplainableBoostingClassifier")?;
        let ebm = classifier.call((), self.constructor_kwargs.as_ref())?;
        ebm.call_method("fit", (&self.x_train, &self.y_train), self.fit_kwargs.as_ref())?;

        let ebm_global = ebm.call_method0("explain_global")?;
        explanation_from_ebm_global(&ebm_global, frame.names(), ebm_intercept(&ebm)?)
    }
}
