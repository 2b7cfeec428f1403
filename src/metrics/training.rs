use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct TrainingMetrics;

impl TrainingMetrics {
    pub fn record_fit(family: &'static str, rows: usize, duration_secs: f64, r2: f64) {
        ::metrics::counter!(phase_metric!(counter, "training", "fits"), "family" => family)
            .increment(1);
        ::metrics::histogram!(
            phase_metric!(histogram, "training", "fit_duration_seconds"),
            "family" => family
        )
        .record(duration_secs);
        ::metrics::gauge!(phase_metric!(gauge, "training", "rows")).set(rows as f64);
        ::metrics::gauge!(phase_metric!(gauge, "training", "in_sample_r2")).set(r2);
    }

    pub fn record_fit_failure(family: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "training", "fit_failures"), "family" => family)
            .increment(1);
    }

    pub fn record_benchmark_candidate(family: &'static str, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        ::metrics::counter!(
            phase_metric!(counter, "training", "benchmark_candidates"),
            "family" => family,
            "outcome" => outcome
        )
        .increment(1);
    }
}

impl PhaseMetrics for TrainingMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "training", "fits"));
        let _ = counter!(phase_metric!(counter, "training", "fit_failures"));
        let _ = counter!(phase_metric!(counter, "training", "benchmark_candidates"));
        let _ = histogram!(phase_metric!(histogram, "training", "fit_duration_seconds"));
        let _ = gauge!(phase_metric!(gauge, "training", "rows"));
        let _ = gauge!(phase_metric!(gauge, "training", "in_sample_r2"));
    }

    fn phase_name() -> &'static str {
        "training"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "training", "fits"),
                metric_type: MetricType::Counter,
                help: "Production fits completed",
                labels: vec!["family"],
            },
            MetricDoc {
                name: phase_metric!(counter, "training", "fit_failures"),
                metric_type: MetricType::Counter,
                help: "Production fits that failed",
                labels: vec!["family"],
            },
            MetricDoc {
                name: phase_metric!(counter, "training", "benchmark_candidates"),
                metric_type: MetricType::Counter,
                help: "Benchmark candidates evaluated",
                labels: vec!["family", "outcome"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "training", "fit_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent fitting preprocessing and regressor",
                labels: vec!["family"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "training", "rows"),
                metric_type: MetricType::Gauge,
                help: "Rows used by the last production fit",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "training", "in_sample_r2"),
                metric_type: MetricType::Gauge,
                help: "In-sample R² of the current artifact",
                labels: vec![],
            },
        ]
    }
}
