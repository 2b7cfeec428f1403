use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricerError {
    #[error("Unreadable upload: {0}")]
    Format(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Model not available, ingest a training batch first")]
    ModelUnavailable,

    #[error("Upload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PricerError {
    /// Stable classification used in HTTP bodies and the ingest log
    pub fn kind(&self) -> &'static str {
        match self {
            PricerError::Format(_) => "format_error",
            PricerError::Schema(_) => "schema_error",
            PricerError::Normalization(_) => "normalization_failure",
            PricerError::Training(_) => "training_failure",
            PricerError::PayloadTooLarge(_) => "payload_too_large",
            PricerError::ModelUnavailable => "model_unavailable",
            PricerError::Prediction(_) => "prediction_failure",
            PricerError::Json(_) | PricerError::Io(_) => "storage_failure",
            PricerError::Toml(_) | PricerError::Config(_) => "config_error",
        }
    }
}

impl From<csv::Error> for PricerError {
    fn from(e: csv::Error) -> Self {
        PricerError::Format(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PricerError>;
