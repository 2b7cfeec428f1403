//! Single-listing price estimation against the current artifact

use crate::constants::{
    AREA, BATHROOMS, BEDROOMS, CREATED_DATE, LATITUDE, LONGITUDE, NEIGHBORHOOD, PARKING_SPACES,
};
use crate::error::{PricerError, Result};
use crate::metrics::PredictMetrics;
use crate::model::TrainedArtifact;
use crate::table::{Table, Value};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::debug;

/// Shared pointer to the artifact in use.
///
/// Readers clone the inner `Arc` and release the lock immediately, so a swap
/// never waits on a running prediction and a prediction never sees a
/// half-replaced model.
#[derive(Default)]
pub struct ModelHandle {
    current: RwLock<Option<Arc<TrainedArtifact>>>,
}

impl ModelHandle {
    pub fn new(artifact: Option<TrainedArtifact>) -> Self {
        Self {
            current: RwLock::new(artifact.map(Arc::new)),
        }
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedArtifact>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn swap(&self, artifact: TrainedArtifact) {
        let next = Some(Arc::new(artifact));
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        PredictMetrics::record_model_swap();
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }
}

fn default_coordinate() -> f64 {
    0.0
}

/// Features of one listing to price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingFeatures {
    pub area: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub parking_spaces: i64,
    pub neighborhood: String,
    #[serde(default = "default_coordinate")]
    pub latitude: f64,
    #[serde(default = "default_coordinate")]
    pub longitude: f64,
    /// Listing year; imputed when absent
    #[serde(default)]
    pub created_date: Option<i64>,
}

impl ListingFeatures {
    /// One-row table in canonical column names
    pub fn to_table(&self) -> Result<Table> {
        let columns = [
            AREA,
            BEDROOMS,
            BATHROOMS,
            PARKING_SPACES,
            LATITUDE,
            LONGITUDE,
            CREATED_DATE,
            NEIGHBORHOOD,
        ];
        let row = vec![
            Value::number(self.area),
            Value::Number(self.bedrooms as f64),
            Value::Number(self.bathrooms as f64),
            Value::Number(self.parking_spaces as f64),
            Value::number(self.latitude),
            Value::number(self.longitude),
            self.created_date
                .map_or(Value::Missing, |y| Value::Number(y as f64)),
            Value::Text(self.neighborhood.clone()),
        ];
        Table::from_rows(columns.iter().map(|c| c.to_string()).collect(), vec![row])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    /// Rounded to cents
    pub estimated_price: f64,
    pub neighborhood: String,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Price one listing with whatever artifact is current
pub fn estimate(handle: &ModelHandle, features: &ListingFeatures) -> Result<PriceEstimate> {
    let started = Instant::now();
    let result = estimate_with(handle.snapshot(), features);
    match &result {
        Ok(_) => PredictMetrics::record_success(started.elapsed().as_secs_f64()),
        Err(e) => PredictMetrics::record_failure(e.kind()),
    }
    result
}

fn estimate_with(
    artifact: Option<Arc<TrainedArtifact>>,
    features: &ListingFeatures,
) -> Result<PriceEstimate> {
    let artifact = artifact.ok_or(PricerError::ModelUnavailable)?;
    if !features.area.is_finite() {
        return Err(PricerError::Prediction(format!(
            "area must be a finite number, got {}",
            features.area
        )));
    }

    let record = features.to_table()?;
    let price = artifact
        .estimate(&record)?
        .into_iter()
        .next()
        .ok_or_else(|| PricerError::Prediction("model returned no estimate".to_string()))?;
    debug!(artifact = %artifact.metadata.id, price, "Estimated price");

    Ok(PriceEstimate {
        estimated_price: round_to(price, 2),
        neighborhood: features.neighborhood.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> ListingFeatures {
        serde_json::from_str(
            r#"{"area": 70.0, "bedrooms": 2, "bathrooms": 1,
                "parking_spaces": 1, "neighborhood": "Moema"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_optional_fields_default() {
        let f = features();
        assert_eq!(f.latitude, 0.0);
        assert_eq!(f.longitude, 0.0);
        assert_eq!(f.created_date, None);

        let t = f.to_table().unwrap();
        assert_eq!(t.height(), 1);
        assert!(t.column_values(CREATED_DATE).unwrap()[0].is_missing());
    }

    #[test]
    fn test_without_model_is_unavailable() {
        let handle = ModelHandle::default();
        let err = estimate(&handle, &features()).unwrap_err();
        assert!(matches!(err, PricerError::ModelUnavailable));
        assert!(!handle.is_loaded());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(1234.5678, 2), 1234.57);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }
}
