//! Random forest regressor: bootstrap-sampled trees grown in parallel

use crate::error::{PricerError, Result};
use crate::model::tree::{DecisionTree, MaxFeatures, TreeParams};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: MaxFeatures::All,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if self.params.n_estimators == 0 {
            return Err(PricerError::Training("n_estimators must be positive".to_string()));
        }
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(PricerError::Training(format!(
                "cannot fit forest on {} rows with {} targets",
                n,
                y.len()
            )));
        }

        let y = y.as_slice().map(|s| s.to_vec()).unwrap_or_else(|| y.to_vec());
        let features: Vec<usize> = (0..x.ncols()).collect();
        let params = &self.params;

        let trees: Result<Vec<DecisionTree>> = (0..params.n_estimators)
            .into_par_iter()
            .map(|i| {
                let seed = params.seed.wrapping_add(i as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

                let mut tree = DecisionTree::new(TreeParams {
                    max_depth: params.max_depth,
                    min_samples_split: params.min_samples_split,
                    min_samples_leaf: 1,
                    max_features: params.max_features,
                    seed,
                });
                tree.fit_subset(x, &y, rows, &features, &mut rng)?;
                Ok(tree)
            })
            .collect();

        self.trees = trees?;
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PricerError::Prediction("forest is not fitted".to_string()));
        }
        let mut sum = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x)?;
        }
        Ok(sum / self.trees.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array::from_shape_fn((40, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i % 3) as f64
            }
        });
        let y = Array::from_shape_fn(40, |i| if i < 20 { 100.0 } else { 300.0 });
        (x, y)
    }

    #[test]
    fn test_forest_separates_two_regimes() {
        let (x, y) = data();
        let mut forest = RandomForest::new(ForestParams {
            n_estimators: 20,
            ..Default::default()
        });
        forest.fit(&x, &y).unwrap();
        assert_eq!(forest.n_trees(), 20);

        let pred = forest.predict(&x).unwrap();
        assert!(pred[0] < 200.0);
        assert!(pred[39] > 200.0);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = data();
        let params = ForestParams {
            n_estimators: 8,
            max_features: MaxFeatures::Sqrt,
            max_depth: Some(3),
            ..Default::default()
        };
        let mut a = RandomForest::new(params.clone());
        let mut b = RandomForest::new(params);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_unfitted_forest_refuses_to_predict() {
        let (x, _) = data();
        assert!(RandomForest::new(ForestParams::default()).predict(&x).is_err());
    }
}
