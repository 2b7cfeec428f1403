//! Ingest phase metrics: uploads received, rows kept, history growth

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_batch_received(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "batches_received")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "rows_received"))
            .record(rows as f64);
    }

    pub fn record_normalized(rows_out: usize, rows_dropped: usize) {
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "rows_normalized"))
            .record(rows_out as f64);
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_dropped"))
            .increment(rows_dropped as u64);
    }

    pub fn record_success(history_rows: usize, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "batches_success")).increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "ingest", "history_rows")).set(history_rows as f64);
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_failure(kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "batches_failed"), "kind" => kind)
            .increment(1);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "ingest", "batches_received"));
        let _ = counter!(phase_metric!(counter, "ingest", "batches_success"));
        let _ = counter!(phase_metric!(counter, "ingest", "batches_failed"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_dropped"));
        let _ = histogram!(phase_metric!(histogram, "ingest", "rows_received"));
        let _ = histogram!(phase_metric!(histogram, "ingest", "rows_normalized"));
        let _ = histogram!(phase_metric!(histogram, "ingest", "duration_seconds"));
        let _ = gauge!(phase_metric!(gauge, "ingest", "history_rows"));
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "batches_received"),
                metric_type: MetricType::Counter,
                help: "Uploaded batches accepted for processing",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "batches_success"),
                metric_type: MetricType::Counter,
                help: "Batches that ended in a new artifact",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "batches_failed"),
                metric_type: MetricType::Counter,
                help: "Batches rejected or aborted, by error kind",
                labels: vec!["kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows removed by normalization (missing coordinates, duplicates)",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "rows_received"),
                metric_type: MetricType::Histogram,
                help: "Rows per uploaded batch",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "rows_normalized"),
                metric_type: MetricType::Histogram,
                help: "Rows per batch after normalization",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a successful ingest, retrain included",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "ingest", "history_rows"),
                metric_type: MetricType::Gauge,
                help: "Rows in the historical table after the last ingest",
                labels: vec![],
            },
        ]
    }
}
