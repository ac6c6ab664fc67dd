//! Model training
//!
//! Splits the historical table 80/20 with a seeded shuffle, fits a
//! [`StandardScaler`] and a [`RandomForest`] on the training part and scores
//! the held-out part. The scaler and forest only ever travel together inside a
//! [`FittedModel`].

use chrono::{DateTime, Utc};
use log::{info, warn};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::config::TrainingConfig;
use crate::error::{HydrateError, Result};
use crate::features::{FEATURE_NAMES, FeatureVector, build_features};
use crate::forest::{ForestConfig, RandomForest};
use crate::loader;
use crate::record::RecordBatch;
use crate::scaler::StandardScaler;
use crate::table::Table;

/// Shuffle `0..n` with a seeded RNG and hold out `ceil(n * test_ratio)` rows
///
/// # Returns
/// * `(train, test)` row indices; the test part is never empty and never the
///   whole table
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if n < 2 {
        return Err(HydrateError::compute(format!(
            "At least 2 rows are needed to train, got {}",
            n
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_ratio).ceil() as usize).clamp(1, n - 1);
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}

/// Coefficient of determination
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f64,
    pub r2: f64,
}

impl Metrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        Metrics {
            mse: mean_squared_error(y_true, y_pred),
            r2: r2_score(y_true, y_pred),
        }
    }
}

/// A trained regressor together with the scaler fitted in the same pass
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FittedModel {
    id: Uuid,
    trained_at: DateTime<Utc>,
    scaler: StandardScaler,
    forest: RandomForest,
    metrics: Metrics,
    test_rows: Vec<usize>,
    n_train: usize,
}

impl FittedModel {
    /// Unique identity; every training run gets a new one
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Metrics measured on the held-out split
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Row indices of the training table that were held out
    pub fn test_rows(&self) -> &[usize] {
        &self.test_rows
    }

    pub fn n_train(&self) -> usize {
        self.n_train
    }

    pub fn n_trees(&self) -> usize {
        self.forest.n_trees()
    }

    pub fn feature_importance_ranking(&self) -> Vec<(&str, f64)> {
        self.forest.feature_importance_ranking()
    }

    /// Scale then predict, one value per feature vector
    pub fn predict_features(&self, features: &[FeatureVector]) -> Vec<f64> {
        features
            .iter()
            .map(|f| self.forest.predict_one(&self.scaler.transform_row(&f.to_array())))
            .collect()
    }

    /// Score this model on the labelled rows of a table
    pub fn evaluate(&self, table: &Table) -> Result<Metrics> {
        let batch = RecordBatch::from_table(table)?;
        let targets = batch.targets()?;
        let predictions = self.predict_features(&build_features(&batch));
        Ok(Metrics::compute(&targets, &predictions))
    }
}

/// Train a model on a labelled table
///
/// # Arguments
/// * `table` - Historical data with the raw pipeline columns and the target
/// * `config` - Seed, tree count and split ratio
///
/// # Returns
/// * `Result<FittedModel>` - The model with its held-out metrics
///
/// # Errors
/// * `MissingColumn` if a raw column or the target column is absent
/// * `LoadFailure` if a row has no target value
/// * `ComputeFailure` for unparseable cells or too few rows
pub fn train(table: &Table, config: &TrainingConfig) -> Result<FittedModel> {
    config.validate()?;

    let batch = RecordBatch::from_table(table)?;
    let targets = batch.targets().map_err(|e| match e {
        HydrateError::ComputeFailure(reason) => HydrateError::LoadFailure {
            path: "training table".to_string(),
            reason,
        },
        other => other,
    })?;

    let features: Vec<Vec<f64>> = build_features(&batch)
        .iter()
        .map(|f| f.to_array().to_vec())
        .collect();

    let non_finite = features
        .iter()
        .filter(|row| row.iter().any(|v| !v.is_finite()))
        .count();
    if non_finite > 0 {
        warn!("{} training rows carry a non-finite feature", non_finite);
    }

    let (train_rows, test_rows) = train_test_split(features.len(), config.test_ratio, config.seed)?;

    let pick = |rows: &[usize]| -> (Vec<Vec<f64>>, Vec<f64>) {
        rows.iter()
            .map(|&i| (features[i].clone(), targets[i]))
            .unzip()
    };
    let (x_train, y_train) = pick(&train_rows);
    let (x_test, y_test) = pick(&test_rows);

    let scaler = StandardScaler::fit(&x_train)?;
    let x_train = scaler.transform(&x_train)?;
    let x_test = scaler.transform(&x_test)?;

    let mut forest = RandomForest::new(ForestConfig::from(config));
    forest.fit(&x_train, &y_train, &FEATURE_NAMES)?;

    let metrics = Metrics::compute(&y_test, &forest.predict(&x_test));
    info!(
        "Model trained successfully! MSE: {:.4}, R²: {:.4}",
        metrics.mse, metrics.r2
    );

    Ok(FittedModel {
        id: Uuid::new_v4(),
        trained_at: Utc::now(),
        scaler,
        forest,
        metrics,
        test_rows,
        n_train: train_rows.len(),
    })
}

/// Load the training CSV and train on it
///
/// Read and parse failures of the file become `LoadFailure` naming the path.
pub fn train_from_path(path: &Path, config: &TrainingConfig) -> Result<FittedModel> {
    let load_failure = |reason: String| HydrateError::LoadFailure {
        path: path.display().to_string(),
        reason,
    };

    let table = loader::from_csv(path).map_err(|e| load_failure(e.to_string()))?;
    info!("Loaded {} training rows from {}", table.len(), path.display());

    train(&table, config).map_err(|e| match e {
        HydrateError::LoadFailure { reason, .. } => load_failure(reason),
        HydrateError::ComputeFailure(reason) => load_failure(reason),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_csv_bytes;

    fn training_csv(n: usize) -> String {
        let mut csv = String::from(
            "Time,Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open,Likelihood of Hydrate\n",
        );
        for i in 0..n {
            let valve = (i % 50) as f64 * 2.0;
            let volume = 400.0 + (i % 13) as f64 * 3.0;
            let target = valve / 10.0;
            csv.push_str(&format!(
                "2024-01-{:02} {:02}:00:00,{},400,{},{}\n",
                i % 28 + 1,
                i % 24,
                volume,
                valve,
                target
            ));
        }
        csv
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            n_trees: 10,
            ..Default::default()
        }
    }

    #[test]
    fn split_sizes_and_reproducibility() {
        let (train, test) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!(test.len(), 2);
        assert_eq!(train.len(), 8);

        let (train2, test2) = train_test_split(10, 0.2, 42).unwrap();
        assert_eq!((train, test.clone()), (train2, test2));

        let (_, other) = train_test_split(10, 0.2, 7).unwrap();
        assert_ne!(test, other);

        // ceil(11 * 0.2) = 3
        assert_eq!(train_test_split(11, 0.2, 42).unwrap().1.len(), 3);
        assert!(train_test_split(1, 0.2, 42).is_err());
    }

    #[test]
    fn split_covers_every_row_once() {
        let (mut train, test) = train_test_split(37, 0.2, 1).unwrap();
        train.extend(test);
        train.sort();
        assert_eq!(train, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn r2_edge_cases() {
        assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 3.0]), 0.0);
        assert!((r2_score(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0])).abs() < 1e-12);
        assert_eq!(mean_squared_error(&[1.0, 3.0], &[2.0, 2.0]), 1.0);
    }

    #[test]
    fn trains_a_useful_model() {
        let table = from_csv_bytes(training_csv(200).as_bytes()).unwrap();
        let model = train(&table, &small_config()).unwrap();

        assert_eq!(model.test_rows().len(), 40);
        assert_eq!(model.n_train(), 160);
        assert_eq!(model.n_trees(), 10);
        assert!(model.metrics().r2 > 0.9, "r2 {}", model.metrics().r2);
        assert_eq!(model.feature_importance_ranking()[0].0, "Inj Gas Valve Percent Open");
    }

    #[test]
    fn same_seed_same_metrics() {
        let table = from_csv_bytes(training_csv(80).as_bytes()).unwrap();
        let a = train(&table, &small_config()).unwrap();
        let b = train(&table, &small_config()).unwrap();
        assert_eq!(a.metrics(), b.metrics());
        assert_eq!(a.test_rows(), b.test_rows());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn missing_target_column_and_value() {
        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open\n1,2,3\n4,5,6\n";
        let table = from_csv_bytes(csv.as_bytes()).unwrap();
        assert!(train(&table, &small_config()).unwrap_err().is_missing_column());

        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open,Likelihood of Hydrate\n1,2,3,1\n4,5,6,\n";
        let table = from_csv_bytes(csv.as_bytes()).unwrap();
        assert!(matches!(
            train(&table, &small_config()),
            Err(HydrateError::LoadFailure { .. })
        ));
    }

    #[test]
    fn unreadable_training_file_is_a_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = train_from_path(&dir.path().join("final.csv"), &small_config()).unwrap_err();
        match err {
            HydrateError::LoadFailure { path, .. } => assert!(path.ends_with("final.csv")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
