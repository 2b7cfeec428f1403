// Preprocessing, regressors, evaluation and the persisted artifact

pub mod artifact;
pub mod boosting;
pub mod cv;
pub mod forest;
pub mod linear;
pub mod preprocessing;
pub mod pricing;
pub mod regressor;
pub mod scoring;
pub mod tree;

pub use artifact::{ArtifactMetadata, TrainedArtifact};
pub use pricing::PricingModel;
pub use regressor::{HyperParams, ModelFamily, ModelSettings, ParamValue, Regressor};
pub use scoring::{RegressionScores, ScoringCriterion};
