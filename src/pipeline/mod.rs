// Data preparation: raw batch -> canonical batch -> history -> model inputs

pub mod address;
pub mod features;
pub mod history;
pub mod normalize;

pub use features::{extract, Dataset};
pub use history::{CsvHistoryStore, HistoryStore, InMemoryHistoryStore};
pub use normalize::{NormalizationPipeline, NormalizationReport, NormalizedBatch};
