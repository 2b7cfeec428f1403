//! K-fold splitting and grid search

use crate::error::{PricerError, Result};
use crate::model::pricing::PricingModel;
use crate::model::regressor::{expand_grid, HyperParams, ModelFamily, ModelSettings, Regressor};
use crate::model::scoring::{RegressionScores, ScoringCriterion};
use crate::table::Table;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// K-fold splitter. The first `n % k` folds hold one extra test row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    /// Shuffle row order with this seed before cutting folds
    pub shuffle_seed: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle_seed: None,
        }
    }

    pub fn shuffled(n_splits: usize, seed: u64) -> Self {
        Self {
            n_splits,
            shuffle_seed: Some(seed),
        }
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(PricerError::Training(format!(
                "k-fold needs at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if n_samples < self.n_splits {
            return Err(PricerError::Training(format!(
                "cannot split {} rows into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut order: Vec<usize> = (0..n_samples).collect();
        if let Some(seed) = self.shuffle_seed {
            order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let size = base + usize::from(i < extra);
            let end = start + size;
            folds.push(Fold {
                test: order[start..end].to_vec(),
                train: order[..start].iter().chain(&order[end..]).copied().collect(),
            });
            start = end;
        }
        Ok(folds)
    }
}

/// Fit on one subset of rows and score on another
pub fn fit_and_score(
    regressor: Regressor,
    x: &Table,
    y: &[f64],
    fold: &Fold,
) -> Result<(PricingModel, RegressionScores)> {
    let pick = |idx: &[usize]| -> Vec<f64> { idx.iter().map(|&i| y[i]).collect() };

    let model = PricingModel::fit(regressor, &x.take_rows(&fold.train), &pick(&fold.train))?;
    let predicted = model.predict(&x.take_rows(&fold.test))?;
    let scores = RegressionScores::compute(&pick(&fold.test), &predicted.to_vec())?;
    Ok((model, scores))
}

#[derive(Debug, Clone, Serialize)]
pub struct GridSearchResult {
    pub best_params: HyperParams,
    /// Mean criterion value of the best combination across inner folds
    pub best_score: f64,
    pub candidates: usize,
}

/// Exhaustive search over the family's grid, scoring each combination by its
/// mean criterion across `cv` folds. Combinations run in parallel; ties go to
/// the earliest combination. A combination that fails is ranked out.
pub fn grid_search(
    family: ModelFamily,
    settings: &ModelSettings,
    x: &Table,
    y: &[f64],
    criterion: ScoringCriterion,
    cv: &KFold,
) -> Result<GridSearchResult> {
    let folds = cv.split(y.len())?;
    let combos = expand_grid(&family.param_grid());

    let scored: Vec<Option<f64>> = combos
        .par_iter()
        .map(|combo| {
            let outcome: Result<f64> = (|| {
                let mut total = 0.0;
                for fold in &folds {
                    let regressor = Regressor::with_overrides(family, settings, combo)?;
                    let (_, scores) = fit_and_score(regressor, x, y, fold)?;
                    total += criterion.score(&scores);
                }
                Ok(total / folds.len() as f64)
            })();
            match outcome {
                Ok(score) if score.is_finite() => Some(score),
                Ok(_) => None,
                Err(e) => {
                    warn!(family = %family, params = ?combo, error = %e, "Grid candidate failed");
                    None
                }
            }
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (i, score) in scored.iter().enumerate() {
        if let Some(s) = score {
            if best.map_or(true, |(_, b)| *s > b) {
                best = Some((i, *s));
            }
        }
    }

    let (idx, best_score) = best.ok_or_else(|| {
        PricerError::Training(format!("every {} grid combination failed", family))
    })?;
    debug!(family = %family, params = ?combos[idx], score = best_score, "Grid search done");

    Ok(GridSearchResult {
        best_params: combos[idx].clone(),
        best_score,
        candidates: combos.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_sizes_follow_remainder_rule() {
        let folds = KFold::new(5).split(12).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![3, 3, 2, 2, 2]);
        assert_eq!(folds[0].test, vec![0, 1, 2]);
        assert_eq!(folds[0].train.len(), 9);
    }

    #[test]
    fn test_folds_partition_rows() {
        let folds = KFold::shuffled(5, 42).split(23).unwrap();
        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..23).collect::<Vec<_>>());
        for f in &folds {
            assert!(f.test.iter().all(|t| !f.train.contains(t)));
        }
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let a = KFold::shuffled(3, 42).split(10).unwrap();
        let b = KFold::shuffled(3, 42).split(10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_rows_is_training_error() {
        assert_eq!(KFold::new(5).split(4).unwrap_err().kind(), "training_failure");
        assert!(KFold::new(1).split(4).is_err());
    }

    #[test]
    fn test_linear_grid_search_picks_intercept() {
        let mut csv = String::from("area,neighborhood\n");
        let mut y = Vec::new();
        for i in 0..12 {
            let hood = if i % 2 == 0 { "Moema" } else { "Centro" };
            csv.push_str(&format!("{},{}\n", 30 + i * 5, hood));
            y.push(1000.0 + 10.0 * (30 + i * 5) as f64);
        }
        let x = Table::from_csv_reader(csv.as_bytes()).unwrap();

        let result = grid_search(
            ModelFamily::Linear,
            &ModelSettings::default(),
            &x,
            &y,
            ScoringCriterion::R2,
            &KFold::new(3),
        )
        .unwrap();
        assert_eq!(result.candidates, 2);
        assert!(result.best_score > 0.99);
    }
}
