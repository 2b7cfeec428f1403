use crate::constants::{CATEGORICAL_FEATURES, NUMERIC_FEATURES, TARGET};
use crate::error::{PricerError, Result};
use crate::table::Table;

/// Model inputs split from a merged history table, row for row
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Table,
    /// Target per row; `None` where the price is missing or not numeric
    pub target: Vec<Option<f64>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.features.columns().to_vec()
    }
}

/// Canonical feature names present in `table`, numeric first, in schema order
pub fn feature_columns(table: &Table) -> Vec<&'static str> {
    NUMERIC_FEATURES
        .iter()
        .chain(CATEGORICAL_FEATURES.iter())
        .copied()
        .filter(|c| table.has_column(c))
        .collect()
}

/// Split the history into features and target.
///
/// A table without a `price` column cannot be trained on and fails with a
/// schema error; nothing partial is returned.
pub fn extract(table: &Table) -> Result<Dataset> {
    let target = table
        .column_values(TARGET)
        .ok_or_else(|| {
            PricerError::Schema(format!("column '{}' is required for training", TARGET))
        })?
        .into_iter()
        .map(|v| v.coerce_f64())
        .collect();

    let columns = feature_columns(table);
    if columns.is_empty() {
        return Err(PricerError::Schema(
            "no recognized feature columns in training data".to_string(),
        ));
    }

    Ok(Dataset {
        features: table.select(&columns),
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_missing_target_is_schema_error() {
        let err = extract(&table("area,neighborhood\n50,Moema\n")).unwrap_err();
        assert_eq!(err.kind(), "schema_error");
    }

    #[test]
    fn test_features_follow_canonical_order() {
        let t = table("neighborhood,price,bedrooms,area\nMoema,100,2,50\nCentro,,1,30\n");
        let ds = extract(&t).unwrap();
        assert_eq!(ds.feature_names(), vec!["area", "bedrooms", "neighborhood"]);
        assert_eq!(ds.target, vec![Some(100.0), None]);
        assert_eq!(ds.features.height(), ds.len());
    }

    #[test]
    fn test_target_only_table_has_no_features() {
        let err = extract(&table("price\n100\n")).unwrap_err();
        assert!(matches!(err, PricerError::Schema(_)));
    }
}
