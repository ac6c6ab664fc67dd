//! Application state: the dataset registry and the memoized model
//!
//! All mutation goes through `&mut AppState`. The model is trained lazily on
//! first use and replaced wholesale by [`AppState::retrain`].

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::fmt;

use crate::config::AppConfig;
use crate::downloader::{self, Export, ExportFormat};
use crate::error::{HydrateError, Result};
use crate::graph::{self, ChartKind, ChartOutcome};
use crate::loader;
use crate::predictor::{self, PredictionSummary, Predictions};
use crate::record::PREDICTION;
use crate::risk::RiskBand;
use crate::table::{Table, format_number};
use crate::trainer::{self, FittedModel};

/// An uploaded table stored under a user-chosen name
#[derive(Clone, Debug)]
pub struct Dataset {
    pub name: String,
    pub table: Table,
    pub uploaded_at: DateTime<Utc>,
}

/// Memoized training outcome
#[derive(Debug, Default)]
pub enum ModelStatus {
    #[default]
    NotTrained,
    Ready(Box<FittedModel>),
    /// Training failed; kept until the next retrain
    Failed(String),
}

impl ModelStatus {
    pub fn fitted(&self) -> Option<&FittedModel> {
        match self {
            ModelStatus::Ready(model) => Some(model.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelStatus::NotTrained => f.write_str("not trained"),
            ModelStatus::Ready(model) => write!(
                f,
                "ready ({}, MSE {:.4}, R² {:.4})",
                model.id(),
                model.metrics().mse,
                model.metrics().r2
            ),
            ModelStatus::Failed(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// A dataset with the prediction column appended when a model is available
#[derive(Clone, Debug)]
pub struct ScoredDataset {
    pub table: Table,
    pub predictions: Predictions,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Dashboard overview of everything loaded
#[derive(Clone, Debug, Serialize)]
pub struct Overview {
    pub datasets: Vec<DatasetInfo>,
    pub total_rows: usize,
    pub model: String,
}

#[derive(Debug, Default)]
pub struct AppState {
    config: AppConfig,
    datasets: Vec<Dataset>,
    model: ModelStatus,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        AppState {
            config,
            datasets: Vec::new(),
            model: ModelStatus::NotTrained,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Store `table` under `name`, replacing any dataset of that name
    ///
    /// # Returns
    /// * `Ok(true)` if an existing dataset was replaced
    ///
    /// # Errors
    /// * `InvalidDatasetName` if the name is blank
    pub fn add_dataset(&mut self, name: &str, table: Table) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HydrateError::InvalidDatasetName(name.to_string()));
        }

        let dataset = Dataset {
            name: name.to_string(),
            table,
            uploaded_at: Utc::now(),
        };
        info!(
            "Dataset '{}' loaded: {} rows, {} columns",
            name,
            dataset.table.len(),
            dataset.table.n_columns()
        );

        match self.datasets.iter_mut().find(|d| d.name == name) {
            Some(existing) => {
                *existing = dataset;
                Ok(true)
            }
            None => {
                self.datasets.push(dataset);
                Ok(false)
            }
        }
    }

    /// Parse CSV bytes and store the result under `name`
    pub fn add_dataset_csv(&mut self, name: &str, bytes: &[u8]) -> Result<bool> {
        let table = loader::from_csv_bytes(bytes)?;
        self.add_dataset(name, table)
    }

    pub fn remove_dataset(&mut self, name: &str) -> Result<Dataset> {
        let name = name.trim();
        let index = self
            .datasets
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| HydrateError::UnknownDataset(name.to_string()))?;
        info!("Dataset '{}' removed", name);
        Ok(self.datasets.remove(index))
    }

    /// Dataset names in upload order
    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name.as_str()).collect()
    }

    /// Look up a dataset; surrounding whitespace in `name` is ignored
    pub fn dataset(&self, name: &str) -> Result<&Dataset> {
        let name = name.trim();
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| HydrateError::UnknownDataset(name.to_string()))
    }

    /// Current model status, training from the configured file on first use
    pub fn model(&mut self) -> &ModelStatus {
        if matches!(self.model, ModelStatus::NotTrained) {
            self.model = self.train();
        }
        &self.model
    }

    /// Status without triggering training
    pub fn model_status(&self) -> &ModelStatus {
        &self.model
    }

    /// Discard the memoized model or failure and train again now
    pub fn retrain(&mut self) -> &ModelStatus {
        info!("Retraining hydrate model");
        self.model = ModelStatus::NotTrained;
        self.model()
    }

    /// Use an already fitted model (e.g. a loaded snapshot) as the memo
    pub fn install_model(&mut self, model: FittedModel) {
        info!("Installed model {}", model.id());
        self.model = ModelStatus::Ready(Box::new(model));
    }

    fn train(&self) -> ModelStatus {
        match trainer::train_from_path(&self.config.training_data, &self.config.training) {
            Ok(model) => ModelStatus::Ready(Box::new(model)),
            Err(e) => {
                error!("{}", e);
                ModelStatus::Failed(e.to_string())
            }
        }
    }

    pub fn predict(&mut self, name: &str) -> Result<Predictions> {
        self.model();
        let dataset = self.dataset(name)?;
        let predictions = predictor::predict(&dataset.table, self.model.fitted())?;
        if !predictions.is_available() {
            warn!("Model not available, '{}' was not scored", name);
        }
        Ok(predictions)
    }

    /// The dataset with `Predicted_Hydrate_Likelihood` appended when possible
    ///
    /// A dataset that cannot be scored (e.g. a missing input column) comes
    /// back unscored, so charts and exports that do not need predictions
    /// still work. Only an unknown dataset name is an error.
    pub fn scored_table(&mut self, name: &str) -> Result<ScoredDataset> {
        self.dataset(name)?;
        let predictions = match self.predict(name) {
            Ok(predictions) => predictions,
            Err(e) => {
                warn!("'{}' was not scored: {}", name.trim(), e);
                Predictions::Unavailable
            }
        };
        let table = &self.dataset(name)?.table;

        let table = match predictions.values() {
            Some(values) => {
                table.with_column(PREDICTION, values.iter().map(|&v| format_number(v)).collect())?
            }
            None => table.clone(),
        };
        Ok(ScoredDataset { table, predictions })
    }

    pub fn summary(&mut self, name: &str) -> Result<Option<PredictionSummary>> {
        Ok(self
            .predict(name)?
            .values()
            .and_then(PredictionSummary::from_predictions))
    }

    pub fn risk_levels(&mut self, name: &str) -> Result<Option<Vec<RiskBand>>> {
        Ok(self.predict(name)?.values().map(predictor::risk_levels))
    }

    pub fn chart(&mut self, name: &str, kind: ChartKind) -> Result<ChartOutcome> {
        let scored = self.scored_table(name)?;
        graph::create_chart(&scored.table, kind, name.trim(), &self.config.chart)
    }

    pub fn export_csv(&mut self, name: &str) -> Result<Export> {
        let scored = self.scored_table(name)?;
        Ok(Export {
            file_name: downloader::export_file_name(
                name.trim(),
                scored.predictions.is_available(),
                ExportFormat::Csv,
            ),
            contents: downloader::to_csv(&scored.table)?.into_bytes(),
        })
    }

    pub fn export_xlsx(&mut self, name: &str) -> Result<Export> {
        let scored = self.scored_table(name)?;
        Ok(Export {
            file_name: downloader::export_file_name(
                name.trim(),
                scored.predictions.is_available(),
                ExportFormat::Xlsx,
            ),
            contents: downloader::to_xlsx(&scored.table)?,
        })
    }

    pub fn overview(&self) -> Overview {
        let datasets: Vec<DatasetInfo> = self
            .datasets
            .iter()
            .map(|d| DatasetInfo {
                name: d.name.clone(),
                rows: d.table.len(),
                columns: d.table.n_columns(),
                column_names: d.table.headers().to_vec(),
                uploaded_at: d.uploaded_at,
            })
            .collect();

        Overview {
            total_rows: datasets.iter().map(|d| d.rows).sum(),
            datasets,
            model: self.model.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn state_without_training_data() -> AppState {
        AppState::new(AppConfig {
            training_data: PathBuf::from("/nonexistent/final.csv"),
            ..Default::default()
        })
    }

    fn small_model() -> FittedModel {
        let mut csv = String::from(
            "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open,Likelihood of Hydrate\n",
        );
        for i in 0..20 {
            csv.push_str(&format!("{},400,{},{}\n", 400 + i, i * 5, i as f64 / 2.0));
        }
        let table = loader::from_csv_bytes(csv.as_bytes()).unwrap();
        let config = crate::config::TrainingConfig {
            n_trees: 3,
            ..Default::default()
        };
        trainer::train(&table, &config).unwrap()
    }

    const UPLOAD: &[u8] = b"Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open\n410,400,50\n";

    #[test]
    fn datasets_keep_insertion_order_and_replace_by_name() {
        let mut state = state_without_training_data();
        assert!(!state.add_dataset_csv("march", UPLOAD).unwrap());
        assert!(!state.add_dataset_csv("april", UPLOAD).unwrap());
        assert!(state.add_dataset_csv(" march ", b"a\n1\n2\n").unwrap());

        assert_eq!(state.dataset_names(), vec!["march", "april"]);
        assert_eq!(state.dataset("march").unwrap().table.len(), 2);

        state.remove_dataset("march").unwrap();
        assert_eq!(state.dataset_names(), vec!["april"]);
        assert!(matches!(
            state.remove_dataset("march"),
            Err(HydrateError::UnknownDataset(_))
        ));
        assert!(matches!(
            state.add_dataset_csv("  ", UPLOAD),
            Err(HydrateError::InvalidDatasetName(_))
        ));
    }

    #[test]
    fn failed_training_degrades_to_unavailable() {
        let mut state = state_without_training_data();
        state.add_dataset_csv("march", UPLOAD).unwrap();

        assert!(matches!(state.model(), ModelStatus::Failed(_)));
        assert_eq!(state.predict("march").unwrap(), Predictions::Unavailable);
        assert!(state.summary("march").unwrap().is_none());

        let export = state.export_csv("march").unwrap();
        assert_eq!(export.file_name, "march_original.csv");
        assert_eq!(export.contents, UPLOAD);
    }

    #[test]
    fn names_are_trimmed_at_every_entry_point() {
        let mut state = state_without_training_data();
        state.add_dataset_csv(" march ", UPLOAD).unwrap();

        assert_eq!(state.dataset_names(), vec!["march"]);
        assert!(state.dataset(" march ").is_ok());
        assert_eq!(
            state.export_csv(" march ").unwrap().file_name,
            "march_original.csv"
        );
        assert_eq!(state.remove_dataset(" march ").unwrap().name, "march");
        assert!(state.dataset_names().is_empty());
    }

    #[test]
    fn unscorable_dataset_still_exports_and_charts() {
        let mut state = state_without_training_data();
        state.install_model(small_model());
        state
            .add_dataset_csv("no-valve", b"Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint\n405,400\n410,400\n")
            .unwrap();

        assert!(state.predict("no-valve").unwrap_err().is_missing_column());

        let scored = state.scored_table("no-valve").unwrap();
        assert_eq!(scored.predictions, Predictions::Unavailable);
        assert!(scored.table.column_index(PREDICTION).is_none());

        let export = state.export_csv("no-valve").unwrap();
        assert_eq!(export.file_name, "no-valve_original.csv");
        assert!(matches!(
            state.chart("no-valve", ChartKind::CorrelationHeatmap).unwrap(),
            ChartOutcome::Rendered(_)
        ));
        assert!(matches!(
            state.chart("missing", ChartKind::CorrelationHeatmap),
            Err(HydrateError::UnknownDataset(_))
        ));
    }

    #[test]
    fn overview_counts_rows() {
        let mut state = state_without_training_data();
        state.add_dataset_csv("a", UPLOAD).unwrap();
        state.add_dataset_csv("b", UPLOAD).unwrap();

        let overview = state.overview();
        assert_eq!(overview.datasets.len(), 2);
        assert_eq!(overview.total_rows, 2);
        assert_eq!(overview.model, "not trained");
    }
}
