//! Regression model mapping sensor features to a pump-speed command.
//!
//! The controller only needs two operations from a model, captured by the
//! [`Predictor`] trait.  [`LinearRegression`] is the stock implementation:
//! ordinary least squares with an intercept, solved in closed form on
//! mean-centred features.

use thiserror::Error;
use tracing::warn;

use crate::sim::{Features, FEATURE_COUNT};

/// Pivots smaller than this fraction of the largest diagonal entry are
/// treated as zero (rank-deficient direction).
const RELATIVE_PIVOT_EPS: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Predictor capability
// ---------------------------------------------------------------------------

pub trait Predictor {
    /// Fit the model to labelled rows.  Replaces any previous fit.
    fn fit(&mut self, features: &[Features], targets: &[f64]) -> Result<(), FitError>;

    /// Evaluate the fitted model.  `None` until a fit has succeeded.
    fn predict(&self, x: &Features) -> Option<f64>;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// No training rows were supplied.
    #[error("no training rows")]
    Empty,
    /// Feature and target row counts differ.
    #[error("feature rows ({features}) and targets ({targets}) differ in length")]
    LengthMismatch { features: usize, targets: usize },
    /// A feature or target value is NaN or infinite.
    #[error("training data contains NaN or infinite values")]
    NonFinite,
}

// ---------------------------------------------------------------------------
// Ordinary least squares
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Fitted {
    intercept: f64,
    weights: Features,
}

#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    fitted: Option<Fitted>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.map(|f| f.intercept)
    }

    /// Per-feature weights in `(ph, nutrient_conc, temp)` order.
    pub fn weights(&self) -> Option<Features> {
        self.fitted.map(|f| f.weights)
    }
}

impl Predictor for LinearRegression {
    fn fit(&mut self, features: &[Features], targets: &[f64]) -> Result<(), FitError> {
        if features.is_empty() {
            return Err(FitError::Empty);
        }
        if features.len() != targets.len() {
            return Err(FitError::LengthMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }
        let all_finite = features.iter().flatten().chain(targets).all(|v| v.is_finite());
        if !all_finite {
            return Err(FitError::NonFinite);
        }
        if features.len() <= FEATURE_COUNT {
            warn!(
                rows = features.len(),
                min_rows = FEATURE_COUNT + 1,
                "regression is underdetermined; fit will not be unique"
            );
        }

        let n = features.len() as f64;

        // Column means.
        let mut x_mean = [0.0; FEATURE_COUNT];
        for row in features {
            for (m, v) in x_mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let y_mean = targets.iter().sum::<f64>() / n;

        // Normal equations on centred data: (XcᵀXc) w = Xcᵀyc.
        let mut xtx = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
        let mut xty = [0.0; FEATURE_COUNT];
        for (row, &y) in features.iter().zip(targets) {
            let yc = y - y_mean;
            for i in 0..FEATURE_COUNT {
                let xi = row[i] - x_mean[i];
                xty[i] += xi * yc;
                for j in 0..FEATURE_COUNT {
                    xtx[i][j] += xi * (row[j] - x_mean[j]);
                }
            }
        }

        let weights = solve_normal_equations(xtx, xty);
        let intercept = y_mean
            - weights
                .iter()
                .zip(&x_mean)
                .map(|(w, m)| w * m)
                .sum::<f64>();

        self.fitted = Some(Fitted { intercept, weights });
        Ok(())
    }

    fn predict(&self, x: &Features) -> Option<f64> {
        self.fitted.map(|f| {
            f.intercept + f.weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
        })
    }
}

/// Gaussian elimination with partial pivoting.  Columns without a usable
/// pivot get a zero weight, which still satisfies the normal equations.
fn solve_normal_equations(
    mut a: [[f64; FEATURE_COUNT]; FEATURE_COUNT],
    mut b: [f64; FEATURE_COUNT],
) -> Features {
    let scale = (0..FEATURE_COUNT).map(|i| a[i][i].abs()).fold(0.0, f64::max);
    let tol = scale * RELATIVE_PIVOT_EPS;

    let mut pivot_cols: Vec<usize> = Vec::with_capacity(FEATURE_COUNT);
    let mut row = 0;

    for col in 0..FEATURE_COUNT {
        if row == FEATURE_COUNT {
            break;
        }
        let best = (row..FEATURE_COUNT)
            .max_by(|&p, &q| a[p][col].abs().total_cmp(&a[q][col].abs()))
            .unwrap_or(row);
        if scale == 0.0 || a[best][col].abs() <= tol {
            continue;
        }
        a.swap(row, best);
        b.swap(row, best);

        for r in (row + 1)..FEATURE_COUNT {
            let factor = a[r][col] / a[row][col];
            for c in col..FEATURE_COUNT {
                a[r][c] -= factor * a[row][c];
            }
            b[r] -= factor * b[row];
        }

        pivot_cols.push(col);
        row += 1;
    }

    let mut w = [0.0; FEATURE_COUNT];
    for (r, &col) in pivot_cols.iter().enumerate().rev() {
        let tail: f64 = ((col + 1)..FEATURE_COUNT).map(|c| a[r][c] * w[c]).sum();
        w[col] = (b[r] - tail) / a[r][col];
    }
    w
}

// ===========================================================================
// Tests
// ===========================================================================
