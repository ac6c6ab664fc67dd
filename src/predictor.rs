//! Scoring uploaded datasets with a fitted model

use log::{debug, warn};
use serde::Serialize;

use crate::error::Result;
use crate::features::build_features;
use crate::record::RecordBatch;
use crate::risk::{AlertLevel, RiskBand};
use crate::table::Table;
use crate::trainer::FittedModel;

/// Outcome of scoring a dataset
///
/// `Unavailable` means no model could be trained yet; callers should offer a
/// retry rather than treat it as a numeric result.
#[derive(Clone, Debug, PartialEq)]
pub enum Predictions {
    Available(Vec<f64>),
    Unavailable,
}

impl Predictions {
    pub fn is_available(&self) -> bool {
        matches!(self, Predictions::Available(_))
    }

    pub fn values(&self) -> Option<&[f64]> {
        match self {
            Predictions::Available(values) => Some(values),
            Predictions::Unavailable => None,
        }
    }
}

/// Predict hydrate likelihood for every row of `table`
///
/// # Arguments
/// * `table` - Uploaded data with the three raw pipeline columns
/// * `model` - Fitted model, or `None` when training has not succeeded
///
/// # Returns
/// * `Predictions::Available` with one value per row, or
///   `Predictions::Unavailable` when `model` is `None`
///
/// # Errors
/// * `MissingColumn` if a raw pipeline column is absent
/// * `ComputeFailure` if a cell cannot be parsed
pub fn predict(table: &Table, model: Option<&FittedModel>) -> Result<Predictions> {
    let Some(model) = model else {
        debug!("No model available, skipping prediction");
        return Ok(Predictions::Unavailable);
    };

    let batch = RecordBatch::from_table(table)?;
    let features = build_features(&batch);

    let non_finite = features.iter().filter(|f| !f.is_finite()).count();
    if non_finite > 0 {
        warn!(
            "{} of {} rows have a non-finite feature (zero setpoint?)",
            non_finite,
            features.len()
        );
    }

    Ok(Predictions::Available(model.predict_features(&features)))
}

/// Risk band of every prediction
pub fn risk_levels(predictions: &[f64]) -> Vec<RiskBand> {
    predictions.iter().map(|&p| RiskBand::classify(p)).collect()
}

/// Headline numbers for one scored dataset
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub max: f64,
    pub mean: f64,
    pub high_risk_points: usize,
    pub total: usize,
    pub alert: AlertLevel,
}

impl PredictionSummary {
    /// Summarise a set of predictions; `None` when there are none
    pub fn from_predictions(predictions: &[f64]) -> Option<Self> {
        if predictions.is_empty() {
            return None;
        }
        let max = predictions.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = predictions.iter().sum::<f64>() / predictions.len() as f64;
        let high_risk_points = predictions
            .iter()
            .filter(|&&p| RiskBand::classify(p).is_high())
            .count();

        Some(PredictionSummary {
            max,
            mean,
            high_risk_points,
            total: predictions.len(),
            alert: AlertLevel::from_max(max),
        })
    }
}
