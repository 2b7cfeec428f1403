//! Registration of every phase's metrics, with conflict detection

use crate::metrics::{IngestMetrics, MetricDoc, PhaseMetrics, PredictMetrics, TrainingMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub fn register_all_metrics() -> usize {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<IngestMetrics>(&mut all_metrics);
    register_phase_metrics::<TrainingMetrics>(&mut all_metrics);
    register_phase_metrics::<PredictMetrics>(&mut all_metrics);

    info!("Registered {} metrics across all phases", all_metrics.len());
    all_metrics.len()
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, MetricDoc>) {
    T::register_metrics();
    let phase = T::phase_name();

    for doc in T::metrics_documentation() {
        if extract_phase_from_metric_name(doc.name) != phase {
            warn!("Metric '{}' does not carry its phase prefix '{}'", doc.name, phase);
        }
        if all_metrics.contains_key(doc.name) {
            warn!("Metric name conflict: '{}' registered twice (phase '{}')", doc.name, phase);
            continue;
        }
        debug!(metric = doc.name, kind = ?doc.metric_type, labels = ?doc.labels, "{}", doc.help);
        all_metrics.insert(doc.name, doc);
    }
}

/// Phase segment of a metric name, e.g. `pricer_ingest_rows_received` -> `ingest`
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    metric_name
        .strip_prefix("pricer_")
        .and_then(|rest| rest.split('_').next())
        .unwrap_or("unknown")
}
