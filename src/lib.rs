pub mod config;
pub mod constants;
pub mod error;
pub mod ingest_log;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod server;
pub mod service;
pub mod storage;
pub mod table;

// Model fitting and offline evaluation
pub mod training;
