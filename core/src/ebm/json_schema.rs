use serde::Deserialize;

/// Binned additive explanation as exported from an EBM global explanation.
///
/// ```json
/// {
///   "intercept": -1.3,
///   "terms": [
///     {"name": "age", "type": "continuous", "names": [18, 30, 45, 90], "scores": [-0.4, 0.1, 0.6]},
///     {"name": "smoker", "type": "nominal", "names": ["0", "1"], "scores": [-0.2, 0.9]}
///   ]
/// }
/// ```
#[derive(Debug, Deserialize, Clone)]
pub struct JsonExplanation {
    #[serde(default)]
    pub intercept: Option<f64>,
    pub terms: Vec<JsonTerm>,
}

/// One main-effect term.
///
/// For continuous terms `names` holds the bin edges (one more than `scores`);
/// for categorical terms it holds one level per score.
#[derive(Debug, Deserialize, Clone)]
pub struct JsonTerm {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub names: Vec<JsonLevel>,
    pub scores: Vec<f64>,
}

/// Edges and levels may be stored as numbers or as numeric strings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum JsonLevel {
    Number(f64),
    Text(String),
}
