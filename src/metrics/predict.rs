use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct PredictMetrics;

impl PredictMetrics {
    pub fn record_success(latency_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "predict", "requests"), "outcome" => "ok")
            .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "predict", "latency_seconds"))
            .record(latency_secs);
    }

    pub fn record_failure(kind: &'static str) {
        ::metrics::counter!(phase_metric!(counter, "predict", "requests"), "outcome" => kind)
            .increment(1);
    }

    pub fn record_model_swap() {
        ::metrics::counter!(phase_metric!(counter, "predict", "model_swaps")).increment(1);
    }
}

impl PhaseMetrics for PredictMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "predict", "requests"));
        let _ = counter!(phase_metric!(counter, "predict", "model_swaps"));
        let _ = histogram!(phase_metric!(histogram, "predict", "latency_seconds"));
    }

    fn phase_name() -> &'static str {
        "predict"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "predict", "requests"),
                metric_type: MetricType::Counter,
                help: "Prediction requests by outcome (ok or error kind)",
                labels: vec!["outcome"],
            },
            MetricDoc {
                name: phase_metric!(counter, "predict", "model_swaps"),
                metric_type: MetricType::Counter,
                help: "Times the in-memory artifact was replaced",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "predict", "latency_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time to produce one estimate",
                labels: vec![],
            },
        ]
    }
}
