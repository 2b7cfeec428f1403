//! Offline benchmark: k-fold comparison of candidate families
//!
//! Each candidate is scored on the same shuffled outer folds, optionally tuning
//! its hyperparameters on every outer training split with an inner grid
//! search. Nothing is persisted; the report names the champion.

use crate::error::{PricerError, Result};
use crate::metrics::TrainingMetrics;
use crate::model::cv::{fit_and_score, grid_search, KFold};
use crate::model::{
    HyperParams, ModelFamily, ModelSettings, RegressionScores, Regressor, ScoringCriterion,
};
use crate::pipeline::Dataset;
use crate::training::trainer::target_values;
use serde::Serialize;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BenchmarkOptions {
    /// Candidates, in tie-breaking order
    pub models: Vec<ModelFamily>,
    pub grid_search: bool,
    pub criterion: ScoringCriterion,
    pub outer: KFold,
    pub inner: KFold,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            models: vec![ModelFamily::GradientBoosting, ModelFamily::RandomForest],
            grid_search: false,
            criterion: ScoringCriterion::R2,
            outer: KFold::shuffled(5, 42),
            inner: KFold::new(3),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FoldResult {
    pub fold: usize,
    pub scores: RegressionScores,
    pub best_params: HyperParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub family: ModelFamily,
    pub folds: Vec<FoldResult>,
    pub mean: Option<RegressionScores>,
    /// Set when the candidate failed; it is then excluded from selection
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub criterion: ScoringCriterion,
    pub grid_search: bool,
    pub rows: usize,
    pub candidates: Vec<CandidateReport>,
    pub champion: Option<ModelFamily>,
}

impl BenchmarkReport {
    pub fn champion_report(&self) -> Option<&CandidateReport> {
        let champion = self.champion?;
        self.candidates.iter().find(|c| c.family == champion)
    }
}

/// Highest mean R² wins; a later candidate must be strictly better to take over
pub fn select_champion(candidates: &[CandidateReport]) -> Option<ModelFamily> {
    let mut best: Option<(ModelFamily, f64)> = None;
    for c in candidates {
        let Some(mean) = c.mean.filter(|_| c.error.is_none()) else {
            continue;
        };
        if best.map_or(true, |(_, r2)| mean.r2 > r2) {
            best = Some((c.family, mean.r2));
        }
    }
    best.map(|(family, _)| family)
}

#[instrument(skip_all, fields(rows = dataset.len(), grid_search = options.grid_search))]
pub fn run_benchmark(
    dataset: &Dataset,
    settings: &ModelSettings,
    options: &BenchmarkOptions,
) -> Result<BenchmarkReport> {
    if options.models.is_empty() {
        return Err(PricerError::Config("no benchmark candidates selected".to_string()));
    }
    let y = target_values(dataset)?;
    let folds = options.outer.split(y.len())?;

    let mut candidates = Vec::with_capacity(options.models.len());
    for &family in &options.models {
        let report = match evaluate_candidate(family, dataset, &y, &folds, settings, options) {
            Ok(fold_results) => {
                let scores: Vec<RegressionScores> = fold_results.iter().map(|f| f.scores).collect();
                let mean = RegressionScores::mean(&scores);
                if let Some(m) = &mean {
                    info!(
                        family = %family,
                        r2 = m.r2,
                        mae = m.mae,
                        rmse = m.rmse,
                        "Candidate scored"
                    );
                }
                TrainingMetrics::record_benchmark_candidate(family.code(), true);
                CandidateReport {
                    family,
                    folds: fold_results,
                    mean,
                    error: None,
                }
            }
            Err(e) => {
                warn!(family = %family, error = %e, "Candidate failed, excluded from selection");
                TrainingMetrics::record_benchmark_candidate(family.code(), false);
                CandidateReport {
                    family,
                    folds: Vec::new(),
                    mean: None,
                    error: Some(e.to_string()),
                }
            }
        };
        candidates.push(report);
    }

    let champion = select_champion(&candidates);
    if champion.is_none() {
        return Err(PricerError::Training("every benchmark candidate failed".to_string()));
    }
    info!(champion = ?champion.map(|c| c.code()), "Benchmark finished");

    Ok(BenchmarkReport {
        criterion: options.criterion,
        grid_search: options.grid_search,
        rows: y.len(),
        candidates,
        champion,
    })
}

fn evaluate_candidate(
    family: ModelFamily,
    dataset: &Dataset,
    y: &[f64],
    folds: &[crate::model::cv::Fold],
    settings: &ModelSettings,
    options: &BenchmarkOptions,
) -> Result<Vec<FoldResult>> {
    let mut results = Vec::with_capacity(folds.len());
    for (i, fold) in folds.iter().enumerate() {
        let regressor = if options.grid_search {
            let train_x = dataset.features.take_rows(&fold.train);
            let train_y: Vec<f64> = fold.train.iter().map(|&r| y[r]).collect();
            let tuned = grid_search(
                family,
                settings,
                &train_x,
                &train_y,
                options.criterion,
                &options.inner,
            )?;
            Regressor::with_overrides(family, settings, &tuned.best_params)?
        } else {
            Regressor::new(family, settings)
        };
        let best_params = regressor.hyper_params();

        let (_, scores) = fit_and_score(regressor, &dataset.features, y, fold)?;
        results.push(FoldResult {
            fold: i + 1,
            scores,
            best_params,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract;
    use crate::table::Table;

    fn listings(rows: usize) -> Dataset {
        let mut csv = String::from("area,bathrooms,neighborhood,price\n");
        for i in 0..rows {
            let area = 35 + (i * 7) % 90;
            let hood = ["Moema", "Centro", "Pinheiros", "Lapa"][i % 4];
            let premium = if hood == "Moema" { 150_000 } else { 0 };
            csv.push_str(&format!("{},{},{},{}\n", area, 1 + i % 2, hood, area * 8_000 + premium));
        }
        extract(&Table::from_csv_reader(csv.as_bytes()).unwrap()).unwrap()
    }

    fn report(family: ModelFamily, r2: Option<f64>) -> CandidateReport {
        CandidateReport {
            family,
            folds: Vec::new(),
            mean: r2.map(|r2| RegressionScores { r2, mae: 0.0, rmse: 0.0 }),
            error: if r2.is_none() { Some("boom".into()) } else { None },
        }
    }

    #[test]
    fn test_champion_ties_go_to_first_candidate() {
        let candidates = vec![
            report(ModelFamily::GradientBoosting, Some(0.8)),
            report(ModelFamily::RandomForest, Some(0.8)),
        ];
        assert_eq!(select_champion(&candidates), Some(ModelFamily::GradientBoosting));
    }

    #[test]
    fn test_failed_candidate_is_excluded() {
        let candidates = vec![
            report(ModelFamily::GradientBoosting, None),
            report(ModelFamily::Linear, Some(-0.5)),
        ];
        assert_eq!(select_champion(&candidates), Some(ModelFamily::Linear));
        assert_eq!(select_champion(&[report(ModelFamily::Linear, None)]), None);
    }

    #[test]
    fn test_benchmark_reports_every_fold() {
        let options = BenchmarkOptions {
            models: vec![ModelFamily::Linear, ModelFamily::RandomForest],
            ..Default::default()
        };
        let settings = ModelSettings {
            random_forest: crate::model::forest::ForestParams {
                n_estimators: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = run_benchmark(&listings(40), &settings, &options).unwrap();

        assert_eq!(report.rows, 40);
        assert_eq!(report.candidates.len(), 2);
        for c in &report.candidates {
            assert_eq!(c.folds.len(), 5);
            assert!(c.error.is_none());
        }
        // Price is linear in the features here
        assert_eq!(report.champion, Some(ModelFamily::Linear));
    }

    #[test]
    fn test_failing_candidate_is_isolated_and_others_continue() {
        let options = BenchmarkOptions {
            models: vec![ModelFamily::RandomForest, ModelFamily::Linear],
            ..Default::default()
        };
        let settings = ModelSettings {
            random_forest: crate::model::forest::ForestParams {
                n_estimators: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let report = run_benchmark(&listings(30), &settings, &options).unwrap();

        let forest = &report.candidates[0];
        assert_eq!(forest.family, ModelFamily::RandomForest);
        assert!(forest.error.is_some());
        assert!(forest.folds.is_empty());
        assert!(forest.mean.is_none());

        let linear = &report.candidates[1];
        assert!(linear.error.is_none());
        assert_eq!(linear.folds.len(), 5);
        assert_eq!(report.champion, Some(ModelFamily::Linear));
    }

    #[test]
    fn test_grid_search_records_chosen_params() {
        let options = BenchmarkOptions {
            models: vec![ModelFamily::Linear],
            grid_search: true,
            ..Default::default()
        };
        let report = run_benchmark(&listings(30), &ModelSettings::default(), &options).unwrap();
        let folds = &report.candidates[0].folds;
        assert!(folds.iter().all(|f| f.best_params.contains_key("fit_intercept")));
    }

    #[test]
    fn test_fewer_rows_than_folds_fails() {
        let options = BenchmarkOptions::default();
        let err = run_benchmark(&listings(4), &ModelSettings::default(), &options).unwrap_err();
        assert_eq!(err.kind(), "training_failure");
    }
}
