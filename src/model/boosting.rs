//! Gradient-boosted regression trees (squared error)
//!
//! Starts from the target mean and fits each tree to the current residuals,
//! shrunk by the learning rate. Rows and columns can be subsampled per round.

use crate::error::{PricerError, Result};
use crate::model::tree::{DecisionTree, MaxFeatures, TreeParams};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows drawn (without replacement) for each tree
    pub subsample: f64,
    /// Fraction of feature columns drawn for each tree
    pub colsample_bytree: f64,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl BoostingParams {
    fn validate(&self) -> Result<()> {
        let fraction = |v: f64| v > 0.0 && v <= 1.0;
        if self.n_estimators == 0 {
            return Err(PricerError::Training("n_estimators must be positive".to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PricerError::Training(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !fraction(self.subsample) || !fraction(self.colsample_bytree) {
            return Err(PricerError::Training(
                "subsample and colsample_bytree must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    base_score: f64,
    trees: Vec<DecisionTree>,
}

impl GradientBoosting {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            base_score: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.params.validate()?;
        let (n, p) = x.dim();
        if n == 0 || n != y.len() {
            return Err(PricerError::Training(format!(
                "cannot fit boosting on {} rows with {} targets",
                n,
                y.len()
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let n_rows = fraction_of(n, self.params.subsample);
        let n_cols = fraction_of(p, self.params.colsample_bytree);

        self.base_score = y.mean().unwrap_or(0.0);
        self.trees = Vec::with_capacity(self.params.n_estimators);
        let mut current = Array1::<f64>::from_elem(n, self.base_score);

        for round in 0..self.params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(current.iter()).map(|(t, c)| t - c).collect();

            let rows: Vec<usize> = if n_rows < n {
                sample(&mut rng, n, n_rows).into_vec()
            } else {
                (0..n).collect()
            };
            let mut cols: Vec<usize> = if n_cols < p {
                sample(&mut rng, p, n_cols).into_vec()
            } else {
                (0..p).collect()
            };
            cols.sort_unstable();

            let mut tree = DecisionTree::new(TreeParams {
                max_depth: Some(self.params.max_depth),
                min_samples_split: self.params.min_samples_split,
                min_samples_leaf: 1,
                max_features: MaxFeatures::All,
                seed: self.params.seed.wrapping_add(round as u64),
            });
            tree.fit_subset(x, &residuals, rows, &cols, &mut rng)?;

            let step = tree.predict(x)?;
            current.scaled_add(self.params.learning_rate, &step);
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PricerError::Prediction("boosting model is not fitted".to_string()));
        }
        let mut out = Array1::<f64>::from_elem(x.nrows(), self.base_score);
        for tree in &self.trees {
            out.scaled_add(self.params.learning_rate, &tree.predict(x)?);
        }
        Ok(out)
    }
}

fn fraction_of(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction).round() as usize).clamp(1.min(total), total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array::from_shape_fn((50, 3), |(i, j)| (i * (j + 1)) as f64 % 17.0);
        let y = x.column(0).mapv(|v| 1000.0 + 50.0 * v);
        (x, y)
    }

    fn r2(y: &Array1<f64>, pred: &Array1<f64>) -> f64 {
        let mean = y.mean().unwrap();
        let ss_tot: f64 = y.iter().map(|t| (t - mean).powi(2)).sum();
        let ss_res: f64 = y.iter().zip(pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
        1.0 - ss_res / ss_tot
    }

    #[test]
    fn test_boosting_fits_training_data() {
        let (x, y) = data();
        let mut model = GradientBoosting::new(BoostingParams::default());
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 100);
        assert!(r2(&y, &model.predict(&x).unwrap()) > 0.95);
    }

    #[test]
    fn test_subsampling_is_deterministic_under_seed() {
        let (x, y) = data();
        let params = BoostingParams {
            n_estimators: 20,
            subsample: 0.8,
            colsample_bytree: 0.8,
            ..Default::default()
        };
        let mut a = GradientBoosting::new(params.clone());
        let mut b = GradientBoosting::new(params);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_invalid_fraction_is_training_error() {
        let (x, y) = data();
        let mut model = GradientBoosting::new(BoostingParams {
            subsample: 0.0,
            ..Default::default()
        });
        assert_eq!(model.fit(&x, &y).unwrap_err().kind(), "training_failure");
    }

    #[test]
    fn test_single_row_predicts_its_target() {
        let x = Array2::from_elem((1, 2), 1.0);
        let y = Array1::from_elem(1, 42.0);
        let mut model = GradientBoosting::new(BoostingParams::default());
        model.fit(&x, &y).unwrap();
        assert!((model.predict(&x).unwrap()[0] - 42.0).abs() < 1e-9);
    }
}
