//! Feature preprocessing
//!
//! Numeric columns are median-imputed then standardized; categorical columns
//! are filled with `"missing"` then one-hot encoded. Statistics are fit once on
//! the training table and frozen into [`FittedPreprocessor`], which the
//! artifact carries so inference applies exactly the same transform.

use crate::constants::{CATEGORICAL_FEATURES, MISSING_CATEGORY, NUMERIC_FEATURES};
use crate::error::{PricerError, Result};
use crate::table::{Table, Value};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which columns get which treatment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingSpec {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl PreprocessingSpec {
    /// Partition feature names into the canonical numeric and categorical groups.
    /// Names outside both groups are ignored.
    pub fn for_features<S: AsRef<str>>(names: &[S]) -> Self {
        let pick = |group: &[&str]| -> Vec<String> {
            names
                .iter()
                .map(|n| n.as_ref())
                .filter(|n| group.contains(n))
                .map(str::to_string)
                .collect()
        };
        Self {
            numeric: pick(&NUMERIC_FEATURES),
            categorical: pick(&CATEGORICAL_FEATURES),
        }
    }

    pub fn fit(&self, x: &Table) -> Result<FittedPreprocessor> {
        if x.is_empty() {
            return Err(PricerError::Training(
                "cannot fit preprocessing on an empty table".to_string(),
            ));
        }

        let numeric = self
            .numeric
            .iter()
            .map(|name| NumericScaler::fit(name, x))
            .collect();
        let categorical = self
            .categorical
            .iter()
            .map(|name| OneHotEncoder::fit(name, x))
            .collect();

        Ok(FittedPreprocessor {
            numeric,
            categorical,
        })
    }
}

/// Frozen median/mean/scale of one numeric column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub column: String,
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

impl NumericScaler {
    fn fit(column: &str, x: &Table) -> Self {
        let observed = numeric_cells(x, column);
        let median = median(observed.iter().flatten().copied().collect()).unwrap_or(0.0);

        let imputed: Vec<f64> = observed.iter().map(|v| v.unwrap_or(median)).collect();
        let n = imputed.len() as f64;
        let mean = imputed.iter().sum::<f64>() / n;
        let var = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();

        Self {
            column: column.to_string(),
            median,
            mean,
            scale: if std > 0.0 && std.is_finite() { std } else { 1.0 },
        }
    }

    fn transform(&self, cell: Option<f64>) -> f64 {
        (cell.unwrap_or(self.median) - self.mean) / self.scale
    }
}

/// Frozen category list of one categorical column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub column: String,
    /// Sorted, unique
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    fn fit(column: &str, x: &Table) -> Self {
        let categories: BTreeSet<String> = category_cells(x, column).into_iter().collect();
        Self {
            column: column.to_string(),
            categories: categories.into_iter().collect(),
        }
    }

    /// Position of the hot indicator; `None` for a category not seen at fit time
    fn position(&self, category: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(category))
            .ok()
    }
}

/// Preprocessing with every statistic frozen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub numeric: Vec<NumericScaler>,
    pub categorical: Vec<OneHotEncoder>,
}

impl FittedPreprocessor {
    /// Number of columns produced by [`FittedPreprocessor::transform`]
    pub fn output_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|e| e.categories.len())
                .sum::<usize>()
    }

    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|s| s.column.clone()).collect();
        for enc in &self.categorical {
            names.extend(enc.categories.iter().map(|c| format!("{}_{}", enc.column, c)));
        }
        names
    }

    /// Build the design matrix for `x`.
    ///
    /// Columns absent from `x` are treated as entirely missing and imputed.
    pub fn transform(&self, x: &Table) -> Result<Array2<f64>> {
        let rows = x.height();
        let mut out = Array2::<f64>::zeros((rows, self.output_width()));

        for (j, scaler) in self.numeric.iter().enumerate() {
            for (i, cell) in numeric_cells(x, &scaler.column).into_iter().enumerate() {
                out[[i, j]] = scaler.transform(cell);
            }
        }

        let mut offset = self.numeric.len();
        for enc in &self.categorical {
            for (i, category) in category_cells(x, &enc.column).iter().enumerate() {
                if let Some(k) = enc.position(category) {
                    out[[i, offset + k]] = 1.0;
                }
            }
            offset += enc.categories.len();
        }

        if out.iter().any(|v| !v.is_finite()) {
            return Err(PricerError::Prediction(
                "preprocessing produced a non-finite feature value".to_string(),
            ));
        }
        Ok(out)
    }
}

fn numeric_cells(x: &Table, column: &str) -> Vec<Option<f64>> {
    match x.column_values(column) {
        Some(values) => values
            .into_iter()
            .map(|v| v.coerce_f64().filter(|n| n.is_finite()))
            .collect(),
        None => vec![None; x.height()],
    }
}

fn category_cells(x: &Table, column: &str) -> Vec<String> {
    match x.column_values(column) {
        Some(values) => values
            .into_iter()
            .map(|v| match v {
                Value::Missing => MISSING_CATEGORY.to_string(),
                other => other.to_string(),
            })
            .collect(),
        None => vec![MISSING_CATEGORY.to_string(); x.height()],
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
