//! Phase-organized metrics
//!
//! Each phase of the service (ingest, training, predict) owns its metric names
//! in a dedicated submodule. Names are built with [`phase_metric!`] so every
//! series follows `pricer_{phase}_{name}[_total]`.

pub mod ingest;
pub mod predict;
pub mod registry;
pub mod training;

pub use ingest::IngestMetrics;
pub use predict::PredictMetrics;
pub use training::TrainingMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register every phase's metrics.
///
/// Idempotent. No listener is started; the server renders the handle on
/// `/metrics` instead.
pub fn init_metrics() {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            registry::register_all_metrics();
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    });
}

/// Current metrics in Prometheus text format, if the recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Describe and pre-register every metric of the phase
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Build a metric name: `pricer_{phase}_{name}` with `_total` for counters
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("pricer_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("pricer_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("pricer_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
