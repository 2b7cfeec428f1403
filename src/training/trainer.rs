//! Production retrain: one full refit of the configured family

use crate::error::{PricerError, Result};
use crate::metrics::TrainingMetrics;
use crate::model::artifact::{ArtifactMetadata, TrainedArtifact, ARTIFACT_FORMAT_VERSION};
use crate::model::{ModelFamily, ModelSettings, PricingModel, RegressionScores, Regressor};
use crate::pipeline::Dataset;
use chrono::Utc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// Target values ready for fitting.
///
/// Empty datasets and missing or non-finite prices are rejected; imputation
/// only happens upstream during normalization.
pub fn target_values(dataset: &Dataset) -> Result<Vec<f64>> {
    if dataset.is_empty() {
        return Err(PricerError::Training("training table has no rows".to_string()));
    }
    dataset
        .target
        .iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(p) if p.is_finite() => Ok(*p),
            Some(p) => Err(PricerError::Training(format!(
                "row {} has non-finite price {}",
                row, p
            ))),
            None => Err(PricerError::Training(format!("row {} has no price", row))),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Trainer {
    family: ModelFamily,
    settings: ModelSettings,
}

impl Trainer {
    pub fn new(family: ModelFamily, settings: ModelSettings) -> Self {
        Self { family, settings }
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// Fit preprocessing and regressor on the whole dataset and score in-sample
    #[instrument(skip_all, fields(family = %self.family, rows = dataset.len()))]
    pub fn train(&self, dataset: &Dataset) -> Result<TrainedArtifact> {
        let started = Instant::now();
        let result = self.fit(dataset);
        match &result {
            Ok(artifact) => {
                let elapsed = started.elapsed().as_secs_f64();
                TrainingMetrics::record_fit(
                    self.family.code(),
                    artifact.metadata.training_rows,
                    elapsed,
                    artifact.metadata.r2,
                );
                info!(
                    r2 = artifact.metadata.r2,
                    elapsed_secs = elapsed,
                    artifact = %artifact.metadata.id,
                    "Model trained"
                );
            }
            Err(_) => TrainingMetrics::record_fit_failure(self.family.code()),
        }
        result
    }

    fn fit(&self, dataset: &Dataset) -> Result<TrainedArtifact> {
        let y = target_values(dataset)?;
        let regressor = Regressor::new(self.family, &self.settings);
        let hyper_params = regressor.hyper_params();

        let model = PricingModel::fit(regressor, &dataset.features, &y)?;
        let fitted = model.predict(&dataset.features)?;
        let scores = RegressionScores::compute(&y, &fitted.to_vec())?;

        Ok(TrainedArtifact {
            metadata: ArtifactMetadata {
                id: Uuid::new_v4(),
                format_version: ARTIFACT_FORMAT_VERSION,
                trained_at: Utc::now(),
                family: self.family,
                hyper_params,
                features: dataset.feature_names(),
                training_rows: y.len(),
                r2: scores.r2,
            },
            model,
        })
    }
}
