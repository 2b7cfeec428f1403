//! Ordinary least squares

use crate::error::{PricerError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParams {
    pub fit_intercept: bool,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    params: LinearParams,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new(params: LinearParams) -> Self {
        Self {
            params,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Solve the normal equations `(X'X) b = X'y`.
    ///
    /// With an intercept, X and y are centered first and the intercept is
    /// recovered from the means. One-hot blocks make `X'X` singular, so a
    /// ridge term is added and grown until the Cholesky factorization succeeds.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PricerError::Training(format!(
                "dimension mismatch: {} rows, {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(PricerError::Training("no rows to fit".to_string()));
        }

        let (xc, yc, x_mean, y_mean) = if self.params.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
            let y_mean = y.mean().unwrap_or(0.0);
            (x - &x_mean, y - y_mean, x_mean, y_mean)
        } else {
            (x.clone(), y.clone(), Array1::zeros(x.ncols()), 0.0)
        };

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);
        let beta = solve_normal_equations(&xtx, &xty)?;

        self.intercept = if self.params.fit_intercept {
            y_mean - x_mean.dot(&beta)
        } else {
            0.0
        };
        self.coefficients = Some(beta);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| PricerError::Prediction("linear model is not fitted".to_string()))?;
        if x.ncols() != coefficients.len() {
            return Err(PricerError::Prediction(format!(
                "expected {} features, got {}",
                coefficients.len(),
                x.ncols()
            )));
        }
        Ok(x.dot(coefficients) + self.intercept)
    }
}

fn solve_normal_equations(xtx: &Array2<f64>, xty: &Array1<f64>) -> Result<Array1<f64>> {
    let n = xtx.nrows();
    if n == 0 {
        return Ok(Array1::zeros(0));
    }
    let scale = (0..n).map(|i| xtx[[i, i]]).sum::<f64>() / n as f64;
    let mut ridge = 1e-10 * scale.max(1.0);

    for _ in 0..8 {
        let mut reg = xtx.clone();
        for i in 0..n {
            reg[[i, i]] += ridge;
        }
        if let Some(beta) = cholesky_solve(&reg, xty) {
            return Ok(beta);
        }
        ridge *= 100.0;
    }
    Err(PricerError::Training(
        "normal equations are singular".to_string(),
    ))
}

/// Solve `A x = b` for symmetric positive definite `A`; `None` if `A` is not
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L' x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(x)
}
