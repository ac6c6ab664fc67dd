use thiserror::Error;

/// Errors produced by the hydrate analysis pipeline
///
/// Every variant degrades a single feature (one chart, one prediction, one
/// export). None of them is meant to stop the process.
#[derive(Debug, Error)]
pub enum HydrateError {
    /// One or more required input columns are absent from a table
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumn(Vec<String>),

    /// The historical training data could not be read or parsed
    #[error("Error loading training data from {path}: {reason}")]
    LoadFailure { path: String, reason: String },

    /// Any other failure while building features, predicting, rendering or exporting
    #[error("{0}")]
    ComputeFailure(String),

    #[error("Dataset not found: {0}")]
    UnknownDataset(String),

    #[error("Invalid dataset name: {0:?}")]
    InvalidDatasetName(String),

    #[error("Model snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl HydrateError {
    pub fn compute(message: impl Into<String>) -> Self {
        HydrateError::ComputeFailure(message.into())
    }

    pub fn missing<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HydrateError::MissingColumn(columns.into_iter().map(Into::into).collect())
    }

    /// True for the "required column absent" family of failures
    pub fn is_missing_column(&self) -> bool {
        matches!(self, HydrateError::MissingColumn(_))
    }
}

pub type Result<T> = std::result::Result<T, HydrateError>;
