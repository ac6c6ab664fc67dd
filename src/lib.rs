/*!
# Hydrate Alert

Hydrate formation risk analysis for gas injection pipeline data.

## Overview

Operators upload sensor exports (CSV) from gas injection meters. A random
forest regressor trained on a fixed historical dataset estimates the
likelihood of hydrate formation for every row, and the results are shown as
a summary, an alert level, charts, and downloadable tables.

## Architecture

### Data Layer
- **Table / Loader** - CSV ingestion into a pass-through table of raw cells
- **Record** - typed view of the pipeline columns (`Time`,
  `Inj Gas Meter Volume Instantaneous`, `Inj Gas Meter Volume Setpoint`,
  `Inj Gas Valve Percent Open`, `Rolling Std`, `Likelihood of Hydrate`)

### Model Layer
- **Feature Builder** - eight features per row, shared by training and scoring
- **Scaler** - zero-mean / unit-variance standardization
- **Random Forest** - bootstrap-aggregated regression trees, seeded
- **Trainer** - seeded 80/20 split, fit, MSE and R² on the held-out rows
- **Predictor** - applies a fitted model; `Unavailable` when there is none

### Presentation Layer
- **Risk** - Low / Medium / High / Critical bands and the dataset alert
- **Graph** - five SVG chart types, each declaring its required columns
- **Downloader** - CSV and XLSX exports with derived file names

### Persistence
- Model snapshots with Gzip compression and bincode serialization

## Key Features

- Lazy, memoized training with explicit retrain
- Training failures degrade predictions to "unavailable" instead of failing
- Missing columns make a single chart unavailable, never the whole dataset
- Reproducible training: same seed, same split, same metrics

## Modules

- **config**: Application configuration (JSON file and `HYDRATE_*` variables)
- **error**: The `HydrateError` type
- **table**, **loader**: CSV tables
- **record**, **features**: Pipeline records and feature engineering
- **scaler**, **forest**, **trainer**: The model
- **predictor**, **risk**: Scoring and risk classification
- **graph**: Chart generation
- **downloader**: Export functionality (CSV, XLSX)
- **saving**: Model persistence with compression
- **state**: Dataset registry and memoized model
*/

pub mod config;
pub mod downloader;
pub mod error;
pub mod features;
pub mod forest;
pub mod graph;
pub mod loader;
pub mod predictor;
pub mod record;
pub mod risk;
pub mod saving;
pub mod scaler;
pub mod state;
pub mod table;
pub mod trainer;

pub use error::{HydrateError, Result};
pub use graph::{ChartKind, ChartOutcome};
pub use predictor::{PredictionSummary, Predictions};
pub use risk::{AlertLevel, RiskBand};
pub use state::{AppState, ModelStatus};
pub use table::Table;
pub use trainer::FittedModel;
