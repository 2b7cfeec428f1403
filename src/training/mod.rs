pub mod benchmark;
pub mod trainer;

pub use benchmark::{run_benchmark, BenchmarkOptions, BenchmarkReport, CandidateReport, FoldResult};
pub use trainer::{target_values, Trainer};
