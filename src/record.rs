//! Typed view of the pipeline columns of an uploaded table

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{HydrateError, Result};
use crate::table::{Table, is_missing};

pub const TIME: &str = "Time";
pub const INSTANTANEOUS: &str = "Inj Gas Meter Volume Instantaneous";
pub const SETPOINT: &str = "Inj Gas Meter Volume Setpoint";
pub const VALVE_PERCENT: &str = "Inj Gas Valve Percent Open";
pub const ROLLING_STD: &str = "Rolling Std";
pub const TARGET: &str = "Likelihood of Hydrate";
pub const PREDICTION: &str = "Predicted_Hydrate_Likelihood";

/// Raw columns every scored dataset must carry
pub const RAW_COLUMNS: [&str; 3] = [INSTANTANEOUS, SETPOINT, VALVE_PERCENT];

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a timestamp cell
///
/// Accepts RFC 3339 (offset dropped to local wall time), the common
/// `Y-m-d H:M:S` family, US `m/d/Y` forms and bare dates.
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// One timestamped measurement
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub timestamp: Option<NaiveDateTime>,
    pub instantaneous: Option<f64>,
    pub setpoint: Option<f64>,
    pub valve_percent: Option<f64>,
    pub rolling_std: Option<f64>,
    pub hydrate_likelihood: Option<f64>,
}

/// Records of one table plus which optional columns the table carried
#[derive(Clone, Debug)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    pub has_time: bool,
    pub has_rolling_std: bool,
    pub has_target: bool,
}

impl RecordBatch {
    /// Extract pipeline records from a table
    ///
    /// # Errors
    /// * `MissingColumn` naming every absent raw pipeline column
    /// * `ComputeFailure` for a non-numeric value or unparseable timestamp
    pub fn from_table(table: &Table) -> Result<Self> {
        table.require_columns(&RAW_COLUMNS)?;

        let instantaneous = table.numeric_column(INSTANTANEOUS)?;
        let setpoint = table.numeric_column(SETPOINT)?;
        let valve = table.numeric_column(VALVE_PERCENT)?;
        let rolling = optional_numeric(table, ROLLING_STD)?;
        let target = optional_numeric(table, TARGET)?;
        let timestamps = if table.has_column(TIME) {
            Some(timestamp_column(table)?)
        } else {
            None
        };

        let records = (0..table.len())
            .map(|i| Record {
                timestamp: timestamps.as_ref().and_then(|ts| ts[i]),
                instantaneous: instantaneous[i],
                setpoint: setpoint[i],
                valve_percent: valve[i],
                rolling_std: rolling.as_ref().and_then(|r| r[i]),
                hydrate_likelihood: target.as_ref().and_then(|t| t[i]),
            })
            .collect();

        Ok(RecordBatch {
            records,
            has_time: timestamps.is_some(),
            has_rolling_std: rolling.is_some(),
            has_target: target.is_some(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Training labels; every row must carry one
    pub fn targets(&self) -> Result<Vec<f64>> {
        if !self.has_target {
            return Err(HydrateError::missing([TARGET]));
        }
        self.records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                record.hydrate_likelihood.ok_or_else(|| {
                    HydrateError::compute(format!("Row {} has no '{}' value", row, TARGET))
                })
            })
            .collect()
    }
}

fn optional_numeric(table: &Table, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    if table.has_column(name) {
        table.numeric_column(name).map(Some)
    } else {
        Ok(None)
    }
}

/// Parsed `Time` column; empty cells are `None`, anything else must parse
pub fn timestamp_column(table: &Table) -> Result<Vec<Option<NaiveDateTime>>> {
    table
        .text_column(TIME)?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| {
            if is_missing(cell) {
                return Ok(None);
            }
            parse_timestamp(cell).map(Some).ok_or_else(|| {
                HydrateError::compute(format!("Row {}: cannot parse time {:?}", row, cell))
            })
        })
        .collect()
}
