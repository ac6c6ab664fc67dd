use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{HydrateError, Result};

lazy_static! {
    /// Cell contents treated as a missing value
    static ref MISSING_TOKENS: HashSet<&'static str> = [
        "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND",
        "1.#QNAN", "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
    ]
    .into_iter()
    .collect();
}

/// Returns true when a raw cell represents a missing value
pub fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS.contains(cell.trim())
}

/// Parse a raw cell as a number
///
/// # Returns
/// * `Some(Some(v))` - a number
/// * `Some(None)` - a missing value
/// * `None` - text that is neither
pub fn parse_number(cell: &str) -> Option<Option<f64>> {
    if is_missing(cell) {
        return Some(None);
    }
    cell.trim().parse::<f64>().ok().map(Some)
}

/// Render a float the way dataframe CSV writers do (`3.0`, `2.75`, `inf`, empty for NaN)
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// An uploaded table of raw CSV cells
///
/// Cells are kept verbatim so columns the pipeline does not understand pass
/// through to exports unchanged. Typed access goes through
/// [`Table::numeric_column`] and [`Table::text_column`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, checking that every row has one cell per header
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(HydrateError::compute(format!("Duplicate column name: {}", header)));
            }
        }

        for (index, row) in rows.iter().enumerate() {
            if row.len() != headers.len() {
                return Err(HydrateError::compute(format!(
                    "Row {} has {} cells but the header has {} columns",
                    index,
                    row.len(),
                    headers.len()
                )));
            }
        }

        Ok(Table { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_columns(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Names from `required` that this table lacks, in the order given
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| name.to_string())
            .collect()
    }

    pub fn require_columns(&self, required: &[&str]) -> Result<()> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HydrateError::MissingColumn(missing))
        }
    }

    /// Raw cells of one column
    pub fn text_column(&self, name: &str) -> Result<Vec<&str>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| HydrateError::missing([name]))?;
        Ok(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// Numeric view of one column; missing cells become `None`
    ///
    /// # Errors
    /// * `MissingColumn` if the column does not exist
    /// * `ComputeFailure` if a cell is neither a number nor a missing value
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| HydrateError::missing([name]))?;

        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                parse_number(&cells[index]).ok_or_else(|| {
                    HydrateError::compute(format!(
                        "Column '{}' row {}: {:?} is not a number",
                        name, row, cells[index]
                    ))
                })
            })
            .collect()
    }

    /// A column is numeric when every cell is a number or a missing value
    pub fn is_numeric_column(&self, index: usize) -> bool {
        index < self.headers.len()
            && self
                .rows
                .iter()
                .all(|row| parse_number(&row[index]).is_some())
    }

    /// All numeric columns with their values, in header order
    pub fn numeric_columns(&self) -> Vec<(&str, Vec<Option<f64>>)> {
        (0..self.headers.len())
            .filter(|&index| self.is_numeric_column(index))
            .map(|index| {
                let values = self
                    .rows
                    .iter()
                    .map(|row| parse_number(&row[index]).flatten())
                    .collect();
                (self.headers[index].as_str(), values)
            })
            .collect()
    }

    /// Copy of this table with `name` set to `values`
    ///
    /// An existing column of that name is overwritten in place, otherwise the
    /// column is appended at the end.
    pub fn with_column(&self, name: &str, values: Vec<String>) -> Result<Table> {
        if values.len() != self.rows.len() {
            return Err(HydrateError::compute(format!(
                "Column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        let mut table = self.clone();
        match table.column_index(name) {
            Some(index) => {
                for (row, value) in table.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                table.headers.push(name.to_string());
                for (row, value) in table.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(table)
    }
}
