use crate::error::{PricerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Regression quality of one prediction set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionScores {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl RegressionScores {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        let n = y_true.len();
        if n == 0 || n != y_pred.len() {
            return Err(PricerError::Training(format!(
                "cannot score {} predictions against {} targets",
                y_pred.len(),
                n
            )));
        }

        let mean = y_true.iter().sum::<f64>() / n as f64;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        let abs: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();

        // Constant target: perfect predictions score 1, anything else 0
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            r2,
            mae: abs / n as f64,
            rmse: (ss_res / n as f64).sqrt(),
        })
    }

    /// Column-wise mean over folds
    pub fn mean(scores: &[RegressionScores]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        Some(Self {
            r2: scores.iter().map(|s| s.r2).sum::<f64>() / n,
            mae: scores.iter().map(|s| s.mae).sum::<f64>() / n,
            rmse: scores.iter().map(|s| s.rmse).sum::<f64>() / n,
        })
    }
}

/// What grid search maximizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoringCriterion {
    #[default]
    #[serde(rename = "r2")]
    R2,
    #[serde(rename = "neg_mean_absolute_error")]
    NegMae,
    #[serde(rename = "neg_root_mean_squared_error")]
    NegRmse,
}

impl ScoringCriterion {
    /// Higher is better for every criterion
    pub fn score(&self, scores: &RegressionScores) -> f64 {
        match self {
            ScoringCriterion::R2 => scores.r2,
            ScoringCriterion::NegMae => -scores.mae,
            ScoringCriterion::NegRmse => -scores.rmse,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringCriterion::R2 => "r2",
            ScoringCriterion::NegMae => "neg_mean_absolute_error",
            ScoringCriterion::NegRmse => "neg_root_mean_squared_error",
        }
    }
}

impl fmt::Display for ScoringCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringCriterion {
    type Err = PricerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "r2" => Ok(ScoringCriterion::R2),
            "neg_mean_absolute_error" | "mae" => Ok(ScoringCriterion::NegMae),
            "neg_root_mean_squared_error" | "rmse" => Ok(ScoringCriterion::NegRmse),
            other => Err(PricerError::Config(format!(
                "unknown scoring criterion '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_against_known_values() {
        let s = RegressionScores::compute(&[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]).unwrap();
        assert!((s.mae - 1.0 / 3.0).abs() < 1e-12);
        assert!((s.rmse - (1.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((s.r2 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_target_r2() {
        assert_eq!(RegressionScores::compute(&[5.0, 5.0], &[5.0, 5.0]).unwrap().r2, 1.0);
        assert_eq!(RegressionScores::compute(&[5.0, 5.0], &[4.0, 6.0]).unwrap().r2, 0.0);
    }

    #[test]
    fn test_criterion_parsing_and_direction() {
        let c: ScoringCriterion = "neg_mean_absolute_error".parse().unwrap();
        assert_eq!(c, ScoringCriterion::NegMae);
        let s = RegressionScores { r2: 0.5, mae: 3.0, rmse: 4.0 };
        assert_eq!(c.score(&s), -3.0);
        assert!("accuracy".parse::<ScoringCriterion>().is_err());
    }

    #[test]
    fn test_mean_over_folds() {
        let a = RegressionScores { r2: 0.2, mae: 1.0, rmse: 2.0 };
        let b = RegressionScores { r2: 0.4, mae: 3.0, rmse: 4.0 };
        let m = RegressionScores::mean(&[a, b]).unwrap();
        assert!((m.r2 - 0.3).abs() < 1e-12);
        assert_eq!(m.mae, 2.0);
        assert!(RegressionScores::mean(&[]).is_none());
    }
}
