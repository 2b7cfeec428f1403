use crate::error::{PricerError, Result};
use crate::model::preprocessing::{FittedPreprocessor, PreprocessingSpec};
use crate::model::regressor::Regressor;
use crate::table::Table;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Frozen preprocessing composed with a fitted regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingModel {
    pub preprocessor: FittedPreprocessor,
    pub regressor: Regressor,
}

impl PricingModel {
    /// Fit preprocessing on `x`, then `regressor` on the transformed matrix
    pub fn fit(mut regressor: Regressor, x: &Table, y: &[f64]) -> Result<Self> {
        if x.height() != y.len() {
            return Err(PricerError::Training(format!(
                "{} feature rows but {} targets",
                x.height(),
                y.len()
            )));
        }
        let preprocessor = PreprocessingSpec::for_features(x.columns()).fit(x)?;
        let design = preprocessor.transform(x)?;
        regressor.fit(&design, &Array1::from(y.to_vec()))?;
        Ok(Self {
            preprocessor,
            regressor,
        })
    }

    /// Transform `x` with the frozen preprocessing.
    ///
    /// Individual fitted columns may be absent and are imputed, but a record
    /// carrying none of them is refused rather than priced from imputed values.
    pub fn design_matrix(&self, x: &Table) -> Result<Array2<f64>> {
        let fitted = self
            .preprocessor
            .numeric
            .iter()
            .map(|s| s.column.as_str())
            .chain(self.preprocessor.categorical.iter().map(|e| e.column.as_str()));
        if !fitted.clone().any(|c| x.has_column(c)) {
            return Err(PricerError::Prediction(format!(
                "record has none of the fitted feature columns ({})",
                fitted.collect::<Vec<_>>().join(", ")
            )));
        }
        self.preprocessor.transform(x)
    }

    pub fn predict(&self, x: &Table) -> Result<Array1<f64>> {
        let design = self.design_matrix(x)?;
        self.regressor.predict(&design)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::regressor::{ModelFamily, ModelSettings};

    #[test]
    fn test_fit_then_predict_on_missing_features() {
        let x = Table::from_csv_reader(
            "area,neighborhood\n50,Moema\n60,Moema\n70,Centro\n80,Centro\n".as_bytes(),
        )
        .unwrap();
        let y = [500.0, 600.0, 700.0, 800.0];
        let model = PricingModel::fit(
            Regressor::new(ModelFamily::Linear, &ModelSettings::default()),
            &x,
            &y,
        )
        .unwrap();

        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-3);
        }

        let partial = Table::from_csv_reader("neighborhood\nPinheiros\n".as_bytes()).unwrap();
        assert!(model.predict(&partial).unwrap()[0].is_finite());
    }

    #[test]
    fn test_record_without_fitted_columns_is_prediction_error() {
        let x = Table::from_csv_reader("area,neighborhood\n50,Moema\n60,Centro\n".as_bytes())
            .unwrap();
        let model = PricingModel::fit(
            Regressor::new(ModelFamily::Linear, &ModelSettings::default()),
            &x,
            &[500.0, 600.0],
        )
        .unwrap();

        let unrelated = Table::from_csv_reader("rooms_total,city\n3,Santos\n".as_bytes()).unwrap();
        let err = model.predict(&unrelated).unwrap_err();
        assert_eq!(err.kind(), "prediction_failure");
    }

    #[test]
    fn test_row_count_mismatch_is_training_error() {
        let x = Table::from_csv_reader("area\n1\n2\n".as_bytes()).unwrap();
        let err = PricingModel::fit(
            Regressor::new(ModelFamily::Linear, &ModelSettings::default()),
            &x,
            &[1.0],
        )
        .unwrap_err();
        assert_eq!(err.kind(), "training_failure");
    }
}
