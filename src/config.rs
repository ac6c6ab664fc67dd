use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HydrateError, Result};

// Defaults
const DEFAULT_TRAINING_DATA: &str = "data/final.csv";
const DEFAULT_SEED: u64 = 42;
const DEFAULT_TREES: usize = 100;
const DEFAULT_TEST_RATIO: f64 = 0.2;

/// Hyper-parameters for training the hydrate model
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed shared by the train/test split and the forest
    pub seed: u64,

    /// Number of trees in the forest
    pub n_trees: usize,

    /// Share of rows held out for evaluation
    pub test_ratio: f64,

    /// Maximum tree depth; `None` grows trees until leaves are pure
    pub max_depth: Option<usize>,

    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,

    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            n_trees: DEFAULT_TREES,
            test_ratio: DEFAULT_TEST_RATIO,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(HydrateError::Config("n_trees must be at least 1".to_string()));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(HydrateError::Config(format!(
                "test_ratio must be between 0 and 1, got {}",
                self.test_ratio
            )));
        }
        if self.min_samples_split < 2 {
            return Err(HydrateError::Config(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(HydrateError::Config(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pixel size of rendered charts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
        }
    }
}

impl ChartConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HydrateError::Config(format!(
                "chart size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Application configuration
///
/// Values come from the built-in defaults, then an optional JSON file, then
/// `HYDRATE_*` environment variables.
///
/// # Examples
/// ```
/// use hydrate_alert::config::AppConfig;
///
/// let config = AppConfig::default();
/// assert_eq!(config.training.n_trees, 100);
/// assert_eq!(config.training.seed, 42);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Historical CSV the model is trained on
    pub training_data: PathBuf,

    /// Directory that exports and charts are written to
    pub output_dir: PathBuf,

    pub training: TrainingConfig,

    pub chart: ChartConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            training_data: PathBuf::from(DEFAULT_TRAINING_DATA),
            output_dir: PathBuf::from("."),
            training: TrainingConfig::default(),
            chart: ChartConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional JSON file plus the process environment
    ///
    /// # Arguments
    /// * `path` - JSON file to read, or `None` to start from the defaults
    ///
    /// # Returns
    /// * `Result<AppConfig>` - The merged configuration or a `Config` error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Read a JSON configuration file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            HydrateError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&contents).map_err(|e| {
            HydrateError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HYDRATE_*` overrides using `lookup` to resolve variables
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("HYDRATE_TRAINING_DATA") {
            self.training_data = PathBuf::from(path);
        }
        if let Some(dir) = lookup("HYDRATE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup("HYDRATE_SEED") {
            self.training.seed = parse_var("HYDRATE_SEED", &seed)?;
        }
        if let Some(trees) = lookup("HYDRATE_TREES") {
            self.training.n_trees = parse_var("HYDRATE_TREES", &trees)?;
        }
        if let Some(ratio) = lookup("HYDRATE_TEST_RATIO") {
            self.training.test_ratio = parse_var("HYDRATE_TEST_RATIO", &ratio)?;
        }
        if let Some(width) = lookup("HYDRATE_CHART_WIDTH") {
            self.chart.width = parse_var("HYDRATE_CHART_WIDTH", &width)?;
        }
        if let Some(height) = lookup("HYDRATE_CHART_HEIGHT") {
            self.chart.height = parse_var("HYDRATE_CHART_HEIGHT", &height)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.chart.validate()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HydrateError::Config(format!("{} has an invalid value: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_the_reference_model() {
        let config = AppConfig::default();
        assert_eq!(config.training_data, PathBuf::from("data/final.csv"));
        assert_eq!(config.training.test_ratio, 0.2);
        assert_eq!(config.training.max_depth, None);
        assert!(config.training.validate().is_ok());
    }

    #[test]
    fn environment_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("HYDRATE_SEED", "7"),
            ("HYDRATE_TREES", "25"),
            ("HYDRATE_TRAINING_DATA", "/tmp/history.csv"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.n_trees, 25);
        assert_eq!(config.training_data, PathBuf::from("/tmp/history.csv"));
    }

    #[test]
    fn invalid_override_is_a_config_error() {
        let result = AppConfig::default().with_overrides(|key| {
            (key == "HYDRATE_TEST_RATIO").then(|| "1.5".to_string())
        });
        assert!(matches!(result, Err(HydrateError::Config(_))));

        let result = AppConfig::default()
            .with_overrides(|key| (key == "HYDRATE_TREES").then(|| "many".to_string()));
        assert!(matches!(result, Err(HydrateError::Config(_))));
    }

    #[test]
    fn zero_chart_size_is_rejected() {
        let result = AppConfig::default()
            .with_overrides(|key| (key == "HYDRATE_CHART_WIDTH").then(|| "0".to_string()));
        assert!(matches!(result, Err(HydrateError::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "chart": {{ "height": 0 }} }}"#).unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(HydrateError::Config(_))
        ));
        assert!(ChartConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "training": {{ "n_trees": 10 }}, "chart": {{ "width": 640 }} }}"#)
            .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.training.n_trees, 10);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.chart.width, 640);
        assert_eq!(config.chart.height, 600);
    }
}
