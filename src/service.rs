//! Ingest and predict use cases shared by the HTTP server and the CLI

use crate::config::Config;
use crate::constants::PRICE;
use crate::error::{PricerError, Result};
use crate::ingest_log::{IngestLog, IngestOutcome, IngestRecord};
use crate::metrics::IngestMetrics;
use crate::model::{ArtifactMetadata, TrainedArtifact};
use crate::pipeline::normalize::resolve_column;
use crate::pipeline::{extract, CsvHistoryStore, HistoryStore, NormalizationPipeline};
use crate::predictor::{self, round_to, ListingFeatures, ModelHandle, PriceEstimate};
use crate::table::Table;
use crate::training::Trainer;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn, Span};

/// Result of one successful ingest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub rows_received: usize,
    pub rows_normalized: usize,
    /// Rows in the historical table after the merge
    pub rows_in_history: usize,
    /// In-sample R², rounded to 4 decimals
    pub r2: f64,
    pub artifact_id: uuid::Uuid,
}

pub struct PricingService {
    normalizer: Arc<NormalizationPipeline>,
    history: Arc<dyn HistoryStore>,
    trainer: Trainer,
    artifact_path: PathBuf,
    model: Arc<ModelHandle>,
    ingest_lock: Arc<Mutex<()>>,
    ingest_log: Option<IngestLog>,
}

impl PricingService {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        trainer: Trainer,
        artifact_path: PathBuf,
        ingest_log: Option<IngestLog>,
    ) -> Self {
        let artifact = match TrainedArtifact::load(&artifact_path) {
            Ok(Some(a)) => {
                info!(path = %artifact_path.display(), id = %a.metadata.id, "Loaded artifact");
                Some(a)
            }
            Ok(None) => {
                info!(
                    path = %artifact_path.display(),
                    "No artifact yet, predictions unavailable until first ingest"
                );
                None
            }
            Err(e) => {
                warn!(
                    path = %artifact_path.display(),
                    error = %e,
                    "Could not load artifact, starting without a model"
                );
                None
            }
        };

        Self {
            normalizer: Arc::new(NormalizationPipeline::standard()),
            history,
            trainer,
            artifact_path,
            model: Arc::new(ModelHandle::new(artifact)),
            ingest_lock: Arc::new(Mutex::new(())),
            ingest_log,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(CsvHistoryStore::new(&config.storage.history_path)),
            Trainer::new(config.training.family, config.training.model_settings()),
            config.storage.artifact_path.clone(),
            Some(IngestLog::new(&config.storage.ingest_log_path)),
        )
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn model_info(&self) -> Option<ArtifactMetadata> {
        self.model.snapshot().map(|a| a.metadata.clone())
    }

    pub fn predict(&self, features: &ListingFeatures) -> Result<PriceEstimate> {
        predictor::estimate(&self.model, features)
    }

    /// Normalize an uploaded batch, merge it into the history, retrain and
    /// swap in the new model.
    ///
    /// Ingests run one at a time. The history is written only after the fit
    /// succeeded and before the artifact, and the in-memory model is swapped
    /// last; a failure at any step leaves the previous artifact in service.
    /// Dropping the returned future does not abandon a started ingest: the
    /// blocking task owns the lock guard and finishes the whole unit, swap
    /// included, before the next ingest can start.
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<IngestSummary> {
        let guard = Arc::clone(&self.ingest_lock).lock_owned().await;
        let job = IngestJob {
            normalizer: Arc::clone(&self.normalizer),
            history: Arc::clone(&self.history),
            trainer: self.trainer.clone(),
            artifact_path: self.artifact_path.clone(),
            model: Arc::clone(&self.model),
            ingest_log: self.ingest_log.clone(),
            filename: filename.to_string(),
            bytes: bytes.to_vec(),
        };

        let span = Span::current();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let _entered = span.enter();
            job.run()
        })
        .await
        .map_err(|e| PricerError::Training(format!("ingest task aborted: {}", e)))?
    }
}

/// One ingest, owning everything it touches
struct IngestJob {
    normalizer: Arc<NormalizationPipeline>,
    history: Arc<dyn HistoryStore>,
    trainer: Trainer,
    artifact_path: PathBuf,
    model: Arc<ModelHandle>,
    ingest_log: Option<IngestLog>,
    filename: String,
    bytes: Vec<u8>,
}

impl IngestJob {
    fn run(self) -> Result<IngestSummary> {
        let started = Instant::now();
        let mut record = IngestRecord::started(&self.filename, &self.bytes);

        let result = self.retrain(&mut record);
        match &result {
            Ok(summary) => {
                let elapsed = started.elapsed().as_secs_f64();
                IngestMetrics::record_success(summary.rows_in_history, elapsed);
                info!(
                    rows_in_history = summary.rows_in_history,
                    r2 = summary.r2,
                    elapsed_secs = elapsed,
                    "Ingest complete, model swapped"
                );

                record.outcome = IngestOutcome::Trained;
                record.rows_normalized = Some(summary.rows_normalized);
                record.history_rows = Some(summary.rows_in_history);
                record.artifact_id = Some(summary.artifact_id);
                record.r2 = Some(summary.r2);
            }
            Err(e) => {
                IngestMetrics::record_failure(e.kind());
                error!(kind = e.kind(), error = %e, "Ingest rejected");
                record.error_kind = Some(e.kind().to_string());
                record.error = Some(e.to_string());
            }
        }

        if let Some(log) = &self.ingest_log {
            if let Err(e) = log.append(&record) {
                warn!(path = %log.path().display(), error = %e, "Failed to append ingest log");
            }
        }
        result
    }

    fn retrain(&self, record: &mut IngestRecord) -> Result<IngestSummary> {
        let raw = Table::from_upload(&self.filename, &self.bytes)?;
        if resolve_column(&raw, PRICE).is_none() {
            return Err(PricerError::Schema(format!("upload has no '{}' column", PRICE)));
        }
        IngestMetrics::record_batch_received(raw.height());
        record.rows_received = Some(raw.height());

        let batch = self.normalizer.run(&raw)?;
        let rows_normalized = batch.table.height();
        IngestMetrics::record_normalized(
            rows_normalized,
            batch.report.rows_in.saturating_sub(rows_normalized),
        );

        let merged = self.history.merge(&batch.table)?;
        let dataset = extract(&merged)?;
        let artifact = self.trainer.train(&dataset)?;

        self.history.commit(&merged)?;
        artifact.save(&self.artifact_path)?;

        let summary = IngestSummary {
            rows_received: raw.height(),
            rows_normalized,
            rows_in_history: merged.height(),
            r2: round_to(artifact.metadata.r2, 4),
            artifact_id: artifact.metadata.id,
        };
        self.model.swap(artifact);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelFamily, ModelSettings};
    use crate::pipeline::InMemoryHistoryStore;
    use std::time::Duration;
    use tempfile::tempdir;

    fn service(dir: &std::path::Path) -> PricingService {
        PricingService::new(
            Arc::new(InMemoryHistoryStore::new()),
            Trainer::new(ModelFamily::Linear, ModelSettings::default()),
            dir.join("model.json"),
            Some(IngestLog::new(dir.join("ingest.ndjson"))),
        )
    }

    fn upload() -> Vec<u8> {
        upload_rows(12)
    }

    fn upload_rows(rows: usize) -> Vec<u8> {
        let mut csv = String::from("Adress,area,Bedroom,price,lat,lng\n");
        for i in 0..rows {
            let hood = if i % 2 == 0 { "Moema" } else { "Centro" };
            csv.push_str(&format!(
                "\"Rua {}, {} - São Paulo\",{},{},{},-23.5,-46.6\n",
                i,
                hood,
                40 + i * 5,
                1 + i % 3,
                (40 + i * 5) * 10_000
            ));
        }
        csv.into_bytes()
    }

    #[tokio::test]
    async fn test_ingest_trains_and_swaps() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        assert!(svc.model_info().is_none());

        let summary = svc.ingest("batch.csv", &upload()).await.unwrap();
        assert_eq!(summary.rows_in_history, 12);
        assert!(summary.r2 > 0.9);
        assert_eq!(svc.model_info().unwrap().id, summary.artifact_id);
        assert!(dir.path().join("model.json").exists());

        let log = IngestLog::new(dir.path().join("ingest.ndjson")).read_all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].outcome, IngestOutcome::Trained);
    }

    #[tokio::test]
    async fn test_missing_price_is_rejected_before_processing() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let err = svc.ingest("batch.csv", b"area,bedrooms\n50,2\n").await.unwrap_err();
        assert_eq!(err.kind(), "schema_error");
        assert!(!dir.path().join("model.json").exists());

        let log = IngestLog::new(dir.path().join("ingest.ndjson")).read_all().unwrap();
        assert_eq!(log[0].error_kind.as_deref(), Some("schema_error"));
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_format_error() {
        let dir = tempdir().unwrap();
        let err = service(dir.path()).ingest("batch.json", b"{}").await.unwrap_err();
        assert_eq!(err.kind(), "format_error");
    }

    #[tokio::test]
    async fn test_failed_training_keeps_previous_model_and_history() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let first = svc.ingest("batch.csv", &upload()).await.unwrap();

        // Bad year prefix fails normalization
        let bad = b"area,price,created_date\n50,100,abc\n";
        assert!(svc.ingest("bad.csv", bad).await.is_err());
        assert_eq!(svc.model_info().unwrap().id, first.artifact_id);

        let again = svc.ingest("batch.csv", &upload()).await.unwrap();
        assert_eq!(again.rows_in_history, 24);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_ingest_finishes_before_the_next_one() {
        let dir = tempdir().unwrap();
        let history_path = dir.path().join("history.csv");
        let svc = PricingService::new(
            Arc::new(CsvHistoryStore::new(&history_path)),
            Trainer::new(ModelFamily::GradientBoosting, ModelSettings::default()),
            dir.path().join("model.json"),
            None,
        );

        // The caller gives up long before a 3000-row boosting fit can finish
        let big = upload_rows(3000);
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), svc.ingest("big.csv", &big)).await;
        assert!(abandoned.is_err());

        let small = svc.ingest("small.csv", &upload_rows(12)).await.unwrap();
        assert_eq!(small.rows_in_history, 3012);

        let history = CsvHistoryStore::new(&history_path).load().unwrap().unwrap();
        assert_eq!(history.height(), 3012);

        let current = svc.model_info().unwrap();
        assert_eq!(current.id, small.artifact_id);
        assert_eq!(current.training_rows, 3012);
        let on_disk = TrainedArtifact::load(&dir.path().join("model.json")).unwrap().unwrap();
        assert_eq!(on_disk.metadata.id, small.artifact_id);
    }
}
