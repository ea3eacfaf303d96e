//! Result rows and tables for both detectors.
//!
//! Tables only stack and order rows; nothing is recomputed here.

use serde::Serialize;

/// One detected sign flip of a feature's shape-function slope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonMonotonicity {
    #[serde(rename = "Feature")]
    pub feature: String,
    /// Feature value at the changepoint.
    #[serde(rename = "Value")]
    pub value: f64,
}

/// One step in a feature's shape function that explains the outcomes better
/// than a linear interpolation across its window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discontinuity {
    #[serde(rename = "Feature")]
    pub feature: String,
    /// Feature value at the changepoint.
    #[serde(rename = "Value")]
    pub value: f64,
    /// Number of samples in the evaluation window.
    #[serde(rename = "# Samples")]
    pub n_samples: usize,
    /// `exp(log_p_diff / n_samples)`: per-sample likelihood ratio.
    #[serde(rename = "Effect Size")]
    pub effect_size: f64,
    /// Raw summed log-likelihood difference; the table's sort key.
    #[serde(rename = "P-Ratio")]
    pub p_ratio: f64,
}

/// Discontinuity found within one feature, before it is tagged with the
/// feature name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscontinuityScore {
    pub value: f64,
    pub n_samples: usize,
    pub effect_size: f64,
    pub log_p_diff: f64,
}

impl DiscontinuityScore {
    pub fn into_row(self, feature: &str) -> Discontinuity {
        Discontinuity {
            feature: feature.to_string(),
            value: self.value,
            n_samples: self.n_samples,
            effect_size: self.effect_size,
            p_ratio: self.log_p_diff,
        }
    }
}

/// Table of non-monotonicities with columns `Feature`, `Value`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NonMonotonicityTable {
    rows: Vec<NonMonotonicity>,
}

impl NonMonotonicityTable {
    pub const COLUMNS: [&'static str; 2] = ["Feature", "Value"];

    /// Stacks per-feature changepoint values into one table.
    ///
    /// # Arguments
    /// * `per_feature` - `(feature name, changepoint values)` in feature order
    pub fn from_feature_rows<'a, I>(per_feature: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<f64>)>,
    {
        let rows = per_feature
            .into_iter()
            .flat_map(|(feature, values)| {
                values.into_iter().map(move |value| NonMonotonicity {
                    feature: feature.to_string(),
                    value,
                })
            })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[NonMonotonicity] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<NonMonotonicity> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NonMonotonicity> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn features(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.feature.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }
}

/// Table of discontinuities with columns `Feature`, `Value`, `# Samples`,
/// `Effect Size`, `P-Ratio`, sorted by `P-Ratio` descending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DiscontinuityTable {
    rows: Vec<Discontinuity>,
}

impl DiscontinuityTable {
    pub const COLUMNS: [&'static str; 5] =
        ["Feature", "Value", "# Samples", "Effect Size", "P-Ratio"];

    /// Stacks per-feature scores into one table sorted by `P-Ratio` descending.
    ///
    /// The sort is stable: rows with equal scores keep feature order.
    pub fn from_feature_rows<'a, I>(per_feature: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Vec<DiscontinuityScore>)>,
    {
        let mut rows: Vec<Discontinuity> = per_feature
            .into_iter()
            .flat_map(|(feature, scores)| scores.into_iter().map(move |s| s.into_row(feature)))
            .collect();
        rows.sort_by(|a, b| b.p_ratio.total_cmp(&a.p_ratio));
        Self { rows }
    }

    pub fn rows(&self) -> &[Discontinuity] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Discontinuity> {
        self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Discontinuity> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn features(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.feature.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    pub fn n_samples(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.n_samples).collect()
    }

    pub fn effect_sizes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.effect_size).collect()
    }

    pub fn p_ratios(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.p_ratio).collect()
    }
}

impl<'a> IntoIterator for &'a NonMonotonicityTable {
    type Item = &'a NonMonotonicity;
    type IntoIter = std::slice::Iter<'a, NonMonotonicity>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a DiscontinuityTable {
    type Item = &'a Discontinuity;
    type IntoIter = std::slice::Iter<'a, Discontinuity>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(value: f64, log_p_diff: f64) -> DiscontinuityScore {
        DiscontinuityScore {
            value,
            n_samples: 10,
            effect_size: (log_p_diff / 10.0).exp(),
            log_p_diff,
        }
    }

    #[test]
    fn test_empty_tables() {
        let non_mono = NonMonotonicityTable::from_feature_rows(Vec::<(&str, Vec<f64>)>::new());
        assert!(non_mono.is_empty());
        let disc = DiscontinuityTable::from_feature_rows(vec![("a", vec![]), ("b", vec![])]);
        assert!(disc.is_empty());
        assert_eq!(disc.len(), 0);
    }

    #[test]
    fn test_non_monotonicity_rows_keep_feature_order() {
        let table = NonMonotonicityTable::from_feature_rows(vec![
            ("age", vec![30.0, 60.0]),
            ("bmi", vec![]),
            ("sbp", vec![140.0]),
        ]);
        assert_eq!(table.features(), vec!["age", "age", "sbp"]);
        assert_eq!(table.values(), vec![30.0, 60.0, 140.0]);
    }

    #[test]
    fn test_discontinuities_sorted_by_p_ratio_descending() {
        let table = DiscontinuityTable::from_feature_rows(vec![
            ("a", vec![score(1.0, 2.0), score(2.0, 7.5)]),
            ("b", vec![score(3.0, 5.0)]),
            ("c", vec![score(4.0, 7.5)]),
        ]);
        assert_eq!(table.p_ratios(), vec![7.5, 7.5, 5.0, 2.0]);
        // Ties keep feature order.
        assert_eq!(table.features(), vec!["a", "c", "b", "a"]);
    }

    #[test]
    fn test_rows_serialize_with_column_headers() {
        let table = DiscontinuityTable::from_feature_rows(vec![("a", vec![score(1.5, 3.0)])]);
        let json = serde_json::to_value(&table).unwrap();
        let row = &json[0];
        for column in DiscontinuityTable::COLUMNS {
            assert!(row.get(column).is_some(), "missing column {column}");
        }
        assert_eq!(row["# Samples"], 10);

        let non_mono = NonMonotonicityTable::from_feature_rows(vec![("a", vec![2.0])]);
        let json = serde_json::to_value(&non_mono).unwrap();
        assert_eq!(json[0]["Feature"], "a");
        assert_eq!(json[0]["Value"], 2.0);
    }
}
