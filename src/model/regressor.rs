//! Regressor families and their hyperparameters
//!
//! [`Regressor`] is the closed set of model families the trainer can fit. Each
//! family starts from its typed parameter struct (configured defaults) and
//! can be overridden key by key from a [`HyperParams`] map, which is what grid
//! search enumerates and what artifacts and reports record.

use crate::error::{PricerError, Result};
use crate::model::boosting::{BoostingParams, GradientBoosting};
use crate::model::forest::{ForestParams, RandomForest};
use crate::model::linear::{LinearParams, LinearRegression};
use crate::model::tree::MaxFeatures;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "LR")]
    Linear,
    #[serde(rename = "RFR")]
    RandomForest,
    #[serde(rename = "GBT", alias = "XGB")]
    GradientBoosting,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::Linear,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ModelFamily::Linear => "LR",
            ModelFamily::RandomForest => "RFR",
            ModelFamily::GradientBoosting => "GBT",
        }
    }

    /// Search space used by grid search
    pub fn param_grid(&self) -> ParamGrid {
        use ParamValue::*;
        match self {
            ModelFamily::Linear => vec![("fit_intercept", vec![Bool(true), Bool(false)])],
            ModelFamily::RandomForest => vec![
                ("n_estimators", vec![Int(50), Int(100)]),
                ("max_depth", vec![Int(10), Int(20), Null]),
                ("min_samples_split", vec![Int(2), Int(5)]),
                ("max_features", vec![Text("sqrt".into()), Float(1.0)]),
            ],
            ModelFamily::GradientBoosting => vec![
                ("n_estimators", vec![Int(100), Int(150)]),
                ("learning_rate", vec![Float(0.05), Float(0.1), Float(0.2)]),
                ("max_depth", vec![Int(3), Int(5), Int(7)]),
                ("subsample", vec![Float(0.8), Float(1.0)]),
                ("colsample_bytree", vec![Float(0.8), Float(1.0)]),
            ],
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ModelFamily {
    type Err = PricerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LR" | "LINEAR" => Ok(ModelFamily::Linear),
            "RFR" | "RF" | "RANDOM_FOREST" => Ok(ModelFamily::RandomForest),
            "GBT" | "XGB" | "GRADIENT_BOOSTING" => Ok(ModelFamily::GradientBoosting),
            other => Err(PricerError::Config(format!("unknown model family '{}'", other))),
        }
    }
}

/// One hyperparameter value as it appears in grids and reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn as_usize(&self, key: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(invalid(key, other)),
        }
    }

    fn as_f64(&self, key: &str) -> Result<f64> {
        match self {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(invalid(key, other)),
        }
    }

    fn as_bool(&self, key: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(invalid(key, other)),
        }
    }

    fn as_max_features(&self, key: &str) -> Result<MaxFeatures> {
        match self {
            ParamValue::Text(s) if s == "sqrt" => Ok(MaxFeatures::Sqrt),
            ParamValue::Text(s) if s == "all" => Ok(MaxFeatures::All),
            ParamValue::Float(v) if *v == 1.0 => Ok(MaxFeatures::All),
            ParamValue::Int(1) | ParamValue::Null => Ok(MaxFeatures::All),
            other => Err(invalid(key, other)),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "None"),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

fn invalid(key: &str, value: &ParamValue) -> PricerError {
    PricerError::Training(format!("invalid value {} for hyperparameter '{}'", value, key))
}

/// Named hyperparameter values, ordered by name
pub type HyperParams = BTreeMap<String, ParamValue>;

/// Candidate values per hyperparameter
pub type ParamGrid = Vec<(&'static str, Vec<ParamValue>)>;

/// Every combination of a grid, last key varying fastest
pub fn expand_grid(grid: &ParamGrid) -> Vec<HyperParams> {
    let mut combos = vec![HyperParams::new()];
    for (key, values) in grid {
        combos = combos
            .into_iter()
            .flat_map(|base| {
                values.iter().map(move |v| {
                    let mut next = base.clone();
                    next.insert(key.to_string(), v.clone());
                    next
                })
            })
            .collect();
    }
    combos
}

/// Configured defaults for every family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub linear: LinearParams,
    pub random_forest: ForestParams,
    pub gradient_boosting: BoostingParams,
}

/// An unfitted or fitted model of one family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model")]
pub enum Regressor {
    #[serde(rename = "LR")]
    Linear(LinearRegression),
    #[serde(rename = "RFR")]
    RandomForest(RandomForest),
    #[serde(rename = "GBT")]
    GradientBoosting(GradientBoosting),
}

impl Regressor {
    /// Unfitted model of `family` with the configured parameters
    pub fn new(family: ModelFamily, settings: &ModelSettings) -> Self {
        match family {
            ModelFamily::Linear => {
                Regressor::Linear(LinearRegression::new(settings.linear.clone()))
            }
            ModelFamily::RandomForest => {
                Regressor::RandomForest(RandomForest::new(settings.random_forest.clone()))
            }
            ModelFamily::GradientBoosting => {
                let params = settings.gradient_boosting.clone();
                Regressor::GradientBoosting(GradientBoosting::new(params))
            }
        }
    }

    /// Unfitted model with `overrides` applied on top of the configured parameters
    pub fn with_overrides(
        family: ModelFamily,
        settings: &ModelSettings,
        overrides: &HyperParams,
    ) -> Result<Self> {
        match family {
            ModelFamily::Linear => {
                let mut p = settings.linear.clone();
                for (key, value) in overrides {
                    match key.as_str() {
                        "fit_intercept" => p.fit_intercept = value.as_bool(key)?,
                        _ => return Err(unknown(family, key)),
                    }
                }
                Ok(Regressor::Linear(LinearRegression::new(p)))
            }
            ModelFamily::RandomForest => {
                let mut p = settings.random_forest.clone();
                for (key, value) in overrides {
                    match key.as_str() {
                        "n_estimators" => p.n_estimators = value.as_usize(key)?,
                        "max_depth" => {
                            p.max_depth = match value {
                                ParamValue::Null => None,
                                v => Some(v.as_usize(key)?),
                            }
                        }
                        "min_samples_split" => p.min_samples_split = value.as_usize(key)?,
                        "max_features" => p.max_features = value.as_max_features(key)?,
                        "seed" | "random_state" => p.seed = value.as_usize(key)? as u64,
                        _ => return Err(unknown(family, key)),
                    }
                }
                Ok(Regressor::RandomForest(RandomForest::new(p)))
            }
            ModelFamily::GradientBoosting => {
                let mut p = settings.gradient_boosting.clone();
                for (key, value) in overrides {
                    match key.as_str() {
                        "n_estimators" => p.n_estimators = value.as_usize(key)?,
                        "learning_rate" => p.learning_rate = value.as_f64(key)?,
                        "max_depth" => p.max_depth = value.as_usize(key)?,
                        "subsample" => p.subsample = value.as_f64(key)?,
                        "colsample_bytree" => p.colsample_bytree = value.as_f64(key)?,
                        "min_samples_split" => p.min_samples_split = value.as_usize(key)?,
                        "seed" | "random_state" => p.seed = value.as_usize(key)? as u64,
                        _ => return Err(unknown(family, key)),
                    }
                }
                Ok(Regressor::GradientBoosting(GradientBoosting::new(p)))
            }
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            Regressor::Linear(_) => ModelFamily::Linear,
            Regressor::RandomForest(_) => ModelFamily::RandomForest,
            Regressor::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    /// Effective hyperparameters, for artifacts and reports
    pub fn hyper_params(&self) -> HyperParams {
        let mut out = HyperParams::new();
        let mut put = |k: &str, v: ParamValue| {
            out.insert(k.to_string(), v);
        };
        match self {
            Regressor::Linear(m) => {
                put("fit_intercept", ParamValue::Bool(m.params().fit_intercept))
            }
            Regressor::RandomForest(m) => {
                let p = m.params();
                put("n_estimators", ParamValue::Int(p.n_estimators as i64));
                put(
                    "max_depth",
                    p.max_depth.map_or(ParamValue::Null, |d| ParamValue::Int(d as i64)),
                );
                put("min_samples_split", ParamValue::Int(p.min_samples_split as i64));
                put(
                    "max_features",
                    match p.max_features {
                        MaxFeatures::Sqrt => ParamValue::Text("sqrt".into()),
                        MaxFeatures::All => ParamValue::Float(1.0),
                    },
                );
                put("seed", ParamValue::Int(p.seed as i64));
            }
            Regressor::GradientBoosting(m) => {
                let p = m.params();
                put("n_estimators", ParamValue::Int(p.n_estimators as i64));
                put("learning_rate", ParamValue::Float(p.learning_rate));
                put("max_depth", ParamValue::Int(p.max_depth as i64));
                put("subsample", ParamValue::Float(p.subsample));
                put("colsample_bytree", ParamValue::Float(p.colsample_bytree));
                put("min_samples_split", ParamValue::Int(p.min_samples_split as i64));
                put("seed", ParamValue::Int(p.seed as i64));
            }
        }
        out
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Regressor::Linear(m) => m.fit(x, y),
            Regressor::RandomForest(m) => m.fit(x, y),
            Regressor::GradientBoosting(m) => m.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Regressor::Linear(m) => m.predict(x),
            Regressor::RandomForest(m) => m.predict(x),
            Regressor::GradientBoosting(m) => m.predict(x),
        }
    }
}

fn unknown(family: ModelFamily, key: &str) -> PricerError {
    PricerError::Training(format!("{} has no hyperparameter '{}'", family, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_codes_parse() {
        assert_eq!("gbt".parse::<ModelFamily>().unwrap(), ModelFamily::GradientBoosting);
        assert_eq!("XGB".parse::<ModelFamily>().unwrap(), ModelFamily::GradientBoosting);
        assert_eq!("RFR".parse::<ModelFamily>().unwrap(), ModelFamily::RandomForest);
        assert!("SVM".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn test_grid_sizes() {
        assert_eq!(expand_grid(&ModelFamily::Linear.param_grid()).len(), 2);
        assert_eq!(expand_grid(&ModelFamily::RandomForest.param_grid()).len(), 24);
        assert_eq!(expand_grid(&ModelFamily::GradientBoosting.param_grid()).len(), 72);
    }

    #[test]
    fn test_every_grid_combination_builds() {
        let settings = ModelSettings::default();
        for family in ModelFamily::ALL {
            for combo in expand_grid(&family.param_grid()) {
                let model = Regressor::with_overrides(family, &settings, &combo).unwrap();
                assert_eq!(model.family(), family);
            }
        }
    }

    #[test]
    fn test_overrides_show_up_in_hyper_params() {
        let mut overrides = HyperParams::new();
        overrides.insert("max_depth".into(), ParamValue::Null);
        overrides.insert("max_features".into(), ParamValue::Text("sqrt".into()));
        let settings = ModelSettings::default();
        let model =
            Regressor::with_overrides(ModelFamily::RandomForest, &settings, &overrides).unwrap();
        let params = model.hyper_params();
        assert_eq!(params["max_depth"], ParamValue::Null);
        assert_eq!(params["max_features"], ParamValue::Text("sqrt".into()));
    }

    #[test]
    fn test_unknown_or_mistyped_override_is_rejected() {
        let settings = ModelSettings::default();
        let mut bad = HyperParams::new();
        bad.insert("alpha".into(), ParamValue::Float(1.0));
        assert!(Regressor::with_overrides(ModelFamily::Linear, &settings, &bad).is_err());

        let mut mistyped = HyperParams::new();
        mistyped.insert("n_estimators".into(), ParamValue::Float(1.5));
        let built = Regressor::with_overrides(ModelFamily::GradientBoosting, &settings, &mistyped);
        assert!(built.is_err());
    }

    #[test]
    fn test_production_defaults() {
        let model = Regressor::new(ModelFamily::GradientBoosting, &ModelSettings::default());
        let params = model.hyper_params();
        assert_eq!(params["n_estimators"], ParamValue::Int(100));
        assert_eq!(params["learning_rate"], ParamValue::Float(0.1));
        assert_eq!(params["max_depth"], ParamValue::Int(6));
        assert_eq!(params["seed"], ParamValue::Int(42));
    }
}
