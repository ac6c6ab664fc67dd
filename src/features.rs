//! Feature engineering shared by training and prediction
//!
//! Both the trainer and the predictor go through [`build_features`], so the
//! formulas can never drift apart between fit time and scoring time.

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::record::{INSTANTANEOUS, ROLLING_STD, RecordBatch, SETPOINT, VALVE_PERCENT};

/// Trailing window used when the table has no `Rolling Std` column
pub const ROLLING_WINDOW: usize = 5;

pub const N_FEATURES: usize = 8;

/// Feature names in model column order
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    INSTANTANEOUS,
    SETPOINT,
    VALVE_PERCENT,
    ROLLING_STD,
    "Volume_Diff",
    "Volume_Ratio",
    "Hour",
    "Day",
];

/// The eight model inputs derived from one record
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub instantaneous: f64,
    pub setpoint: f64,
    pub valve_percent: f64,
    pub rolling_std: f64,
    pub volume_diff: f64,
    /// `instantaneous / setpoint`; infinite when the setpoint is zero
    pub volume_ratio: f64,
    pub hour: f64,
    pub day: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [
            self.instantaneous,
            self.setpoint,
            self.valve_percent,
            self.rolling_std,
            self.volume_diff,
            self.volume_ratio,
            self.hour,
            self.day,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// Build one feature vector per record
///
/// Missing inputs are imputed with 0. A difference or ratio computed from a
/// missing input is 0 as well, and so is the 0/0 ratio; a non-zero value over
/// a zero setpoint stays infinite.
pub fn build_features(batch: &RecordBatch) -> Vec<FeatureVector> {
    let derived_std = if batch.has_rolling_std {
        None
    } else {
        let instantaneous: Vec<Option<f64>> =
            batch.records.iter().map(|r| r.instantaneous).collect();
        Some(rolling_std(&instantaneous, ROLLING_WINDOW))
    };

    batch
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let (hour, day) = if batch.has_time {
                record
                    .timestamp
                    .map(|ts| (ts.hour() as f64, ts.day() as f64))
                    .unwrap_or((0.0, 0.0))
            } else {
                (0.0, 1.0)
            };

            let rolling = match &derived_std {
                Some(values) => values[i],
                None => record.rolling_std.unwrap_or(0.0),
            };

            FeatureVector {
                instantaneous: record.instantaneous.unwrap_or(0.0),
                setpoint: record.setpoint.unwrap_or(0.0),
                valve_percent: record.valve_percent.unwrap_or(0.0),
                rolling_std: rolling,
                volume_diff: volume_diff(record.instantaneous, record.setpoint),
                volume_ratio: volume_ratio(record.instantaneous, record.setpoint),
                hour,
                day,
            }
        })
        .collect()
}

fn volume_diff(instantaneous: Option<f64>, setpoint: Option<f64>) -> f64 {
    match (instantaneous, setpoint) {
        (Some(a), Some(b)) => a - b,
        _ => 0.0,
    }
}

fn volume_ratio(instantaneous: Option<f64>, setpoint: Option<f64>) -> f64 {
    match (instantaneous, setpoint) {
        (Some(a), Some(b)) => {
            let ratio = a / b;
            if ratio.is_nan() { 0.0 } else { ratio }
        }
        _ => 0.0,
    }
}

/// Trailing sample standard deviation (n - 1 denominator)
///
/// Positions without a full window, and windows containing a missing value,
/// are 0.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![0.0; values.len()];
    }

    (0..values.len())
        .map(|end| {
            if end + 1 < window {
                return 0.0;
            }
            let slice = &values[end + 1 - window..=end];
            let Some(samples) = slice.iter().copied().collect::<Option<Vec<f64>>>() else {
                return 0.0;
            };

            // shift by the first sample so a constant window is exactly zero
            let shift = samples[0];
            let (sum, sum_sq) = samples.iter().fold((0.0, 0.0), |(s, sq), v| {
                let d = v - shift;
                (s + d, sq + d * d)
            });
            let n = window as f64;
            let variance = (sum_sq - sum * sum / n) / (n - 1.0);
            if variance.is_nan() { 0.0 } else { variance.max(0.0).sqrt() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_csv_bytes;
    use crate::record::RecordBatch;

    fn batch(csv: &str) -> RecordBatch {
        RecordBatch::from_table(&from_csv_bytes(csv.as_bytes()).unwrap()).unwrap()
    }

    fn sample_std(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    }

    #[test]
    fn ten_row_table_without_rolling_std() {
        let mut csv = String::from(
            "Time,Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open\n",
        );
        let volumes = [410.0, 415.5, 398.2, 420.0, 405.1, 430.7, 390.3, 401.0, 412.8, 425.4];
        for (i, v) in volumes.iter().enumerate() {
            csv.push_str(&format!("2024-02-{:02} {:02}:15:00,{},400,55\n", i + 1, i, v));
        }

        let features = build_features(&batch(&csv));
        assert_eq!(features.len(), 10);
        for f in &features[..4] {
            assert_eq!(f.rolling_std, 0.0);
        }
        for end in 4..10 {
            let expected = sample_std(&volumes[end - 4..=end]);
            assert!((features[end].rolling_std - expected).abs() < 1e-9);
            assert!(features[end].rolling_std > 0.0);
        }
        assert_eq!(features[3].hour, 3.0);
        assert_eq!(features[3].day, 4.0);
    }

    #[test]
    fn rolling_std_of_constant_column_is_zero() {
        let values = vec![Some(0.1); 12];
        assert!(rolling_std(&values, 5).iter().all(|&v| v == 0.0));

        let values = vec![Some(123456.789); 7];
        assert!(rolling_std(&values, 5).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn window_with_a_gap_is_zero() {
        let values = vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0)];
        let stds = rolling_std(&values, 5);
        assert_eq!(stds[4], 0.0);
        assert_eq!(stds[5], 0.0);
    }

    #[test]
    fn diff_plus_setpoint_recovers_instantaneous() {
        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open\n\
                   412.3,400.1,50\n0.7,1e3,12\n-3.5,2.25,0\n";
        let features = build_features(&batch(csv));
        for f in features {
            assert!((f.volume_diff + f.setpoint - f.instantaneous).abs() < 1e-9);
            assert_eq!(f.hour, 0.0);
            assert_eq!(f.day, 1.0);
        }
    }

    #[test]
    fn missing_values_are_imputed_with_zero() {
        let csv = "Time,Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open,Rolling Std\n\
                   ,NA,400,,\n";
        let f = build_features(&batch(csv))[0];
        assert_eq!(f.instantaneous, 0.0);
        assert_eq!(f.valve_percent, 0.0);
        assert_eq!(f.rolling_std, 0.0);
        assert_eq!(f.volume_diff, 0.0);
        assert_eq!(f.volume_ratio, 0.0);
        assert_eq!((f.hour, f.day), (0.0, 0.0));
    }

    #[test]
    fn zero_setpoint_gives_non_finite_ratio_for_that_row_only() {
        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open\n\
                   10,0,50\n0,0,50\n10,5,50\n";
        let features = build_features(&batch(csv));
        assert_eq!(features[0].volume_ratio, f64::INFINITY);
        assert!(!features[0].is_finite());
        assert_eq!(features[1].volume_ratio, 0.0);
        assert_eq!(features[2].volume_ratio, 2.0);
        assert!(features[2].is_finite());
    }

    #[test]
    fn supplied_rolling_std_is_used_verbatim() {
        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open,Rolling Std\n\
                   1,1,1,0.25\n2,1,1,0.5\n";
        let features = build_features(&batch(csv));
        assert_eq!(features[0].rolling_std, 0.25);
        assert_eq!(features[1].rolling_std, 0.5);
    }
}
