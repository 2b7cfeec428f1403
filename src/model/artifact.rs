//! Persisted model artifact
//!
//! One JSON document holding the frozen preprocessing, the fitted regressor
//! and metadata about the training run. It is replaced wholesale through
//! [`write_atomic`] after every successful retrain.

use crate::error::{PricerError, Result};
use crate::model::pricing::PricingModel;
use crate::model::regressor::{HyperParams, ModelFamily};
use crate::storage::write_atomic;
use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub id: Uuid,
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub family: ModelFamily,
    pub hyper_params: HyperParams,
    /// Input feature columns, in training order
    pub features: Vec<String>,
    pub training_rows: usize,
    /// In-sample R² on the training table
    pub r2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub metadata: ArtifactMetadata,
    pub model: PricingModel,
}

impl TrainedArtifact {
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| Ok(serde_json::to_writer(w, self)?))?;
        info!(path = %path.display(), id = %self.metadata.id, "Artifact persisted");
        Ok(())
    }

    /// Read the artifact at `path`; `Ok(None)` when there is none yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let artifact: TrainedArtifact = serde_json::from_reader(BufReader::new(file))?;
        if artifact.metadata.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PricerError::Config(format!(
                "artifact format {} is not supported (expected {})",
                artifact.metadata.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        Ok(Some(artifact))
    }

    /// Estimate the price of every row of `record`
    pub fn estimate(&self, record: &Table) -> Result<Vec<f64>> {
        let estimates = self.model.predict(record)?;
        if let Some(bad) = estimates.iter().find(|v| !v.is_finite()) {
            return Err(PricerError::Prediction(format!(
                "model produced a non-finite estimate ({})",
                bad
            )));
        }
        Ok(estimates.to_vec())
    }
}
