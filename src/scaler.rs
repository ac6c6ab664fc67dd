//! Zero-mean / unit-variance feature scaling

use serde::{Deserialize, Serialize};

use crate::error::{HydrateError, Result};

/// Standardizes each column with statistics learned from a training matrix
///
/// Statistics come from the finite values of each column only, so a row
/// carrying an infinite ratio neither poisons the mean nor gets dropped.
/// Such values stay non-finite after [`StandardScaler::transform`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a row-major matrix
    ///
    /// # Errors
    /// * `ComputeFailure` if the matrix is empty or ragged
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let n_features = rows
            .first()
            .map(|r| r.len())
            .ok_or_else(|| HydrateError::compute("Cannot fit a scaler on zero rows"))?;
        if rows.iter().any(|r| r.len() != n_features) {
            return Err(HydrateError::compute("Scaler input rows have different lengths"));
        }

        let mut mean = vec![0.0; n_features];
        let mut scale = vec![1.0; n_features];

        for j in 0..n_features {
            let finite: Vec<f64> = rows.iter().map(|r| r[j]).filter(|v| v.is_finite()).collect();
            if finite.is_empty() {
                continue;
            }
            let n = finite.len() as f64;
            let m = finite.iter().sum::<f64>() / n;
            let variance = finite.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();

            mean[j] = m;
            // constant columns are centred but not scaled
            if std.is_finite() && std > 10.0 * f64::EPSILON * m.abs().max(1.0) {
                scale[j] = std;
            }
        }

        Ok(StandardScaler { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    /// Scale every row with the fitted statistics
    ///
    /// # Errors
    /// * `ComputeFailure` if a row has the wrong width
    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.n_features() {
                    return Err(HydrateError::compute(format!(
                        "Expected {} features, got {}",
                        self.n_features(),
                        row.len()
                    )));
                }
                Ok(self.transform_row(row))
            })
            .collect()
    }
}
