use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use rust_xlsxwriter::{Workbook, Worksheet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HydrateError, Result};
use crate::table::{Table, parse_number};

lazy_static! {
    static ref UNSAFE_FILE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
}

/// Export file format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// Download name for a dataset export
///
/// `{name}_with_predictions` when the table carries predictions, otherwise
/// `{name}_original`.
///
/// # Examples
/// ```
/// use hydrate_alert::downloader::{ExportFormat, export_file_name};
///
/// assert_eq!(export_file_name("march", true, ExportFormat::Csv), "march_with_predictions.csv");
/// assert_eq!(export_file_name("march", false, ExportFormat::Xlsx), "march_original.xlsx");
/// ```
pub fn export_file_name(dataset_name: &str, with_predictions: bool, format: ExportFormat) -> String {
    let suffix = if with_predictions {
        "with_predictions"
    } else {
        "original"
    };
    format!("{}_{}.{}", dataset_name, suffix, format.extension())
}

/// Collapse anything outside `[A-Za-z0-9._-]` to `_` so a name is safe on disk
pub fn safe_file_name(name: &str) -> String {
    let cleaned = UNSAFE_FILE_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "dataset".to_string()
    } else {
        cleaned.to_string()
    }
}

/// An export ready to be downloaded or written to disk
#[derive(Clone, Debug)]
pub struct Export {
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl Export {
    /// Write into `dir` under a sanitized version of the file name
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(safe_file_name(&self.file_name));
        fs::write(&path, &self.contents)?;
        info!("Wrote {} ({} bytes)", path.display(), self.contents.len());
        Ok(path)
    }
}

/// Convert a table to CSV text
///
/// Cells are written verbatim, quoted where needed, with the header row first.
///
/// # Arguments
/// * `table` - The table to convert
///
/// # Returns
/// * `Result<String>` - CSV content or a CSV error
pub fn to_csv(table: &Table) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| HydrateError::compute(format!("Failed to generate CSV: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| HydrateError::compute(format!("Failed to generate CSV: {}", e)))
}

/// Convert a table to XLSX bytes
///
/// Finite numeric cells become numbers, missing cells stay blank and anything
/// else (text, `inf`) is written as a string.
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>> {
    let xlsx_error = |e: rust_xlsxwriter::XlsxError| {
        HydrateError::compute(format!("Failed to generate XLSX: {}", e))
    };

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();

    for (c, header) in table.headers().iter().enumerate() {
        worksheet
            .write_string(0, xlsx_column(c)?, header.as_str())
            .map_err(xlsx_error)?;
    }

    for (r, row) in table.rows().iter().enumerate() {
        let row_index = xlsx_row(r + 1)?;
        for (c, cell) in row.iter().enumerate() {
            let col = xlsx_column(c)?;
            match parse_number(cell) {
                Some(Some(value)) if value.is_finite() => {
                    worksheet
                        .write_number(row_index, col, value)
                        .map_err(xlsx_error)?;
                }
                Some(None) => {}
                _ => {
                    worksheet
                        .write_string(row_index, col, cell.as_str())
                        .map_err(xlsx_error)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(xlsx_error)
}

fn xlsx_row(index: usize) -> Result<u32> {
    u32::try_from(index)
        .map_err(|_| HydrateError::compute(format!("Row {} does not fit in a worksheet", index)))
}

fn xlsx_column(index: usize) -> Result<u16> {
    u16::try_from(index).map_err(|_| {
        HydrateError::compute(format!("Column {} does not fit in a worksheet", index))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_csv_bytes;

    #[test]
    fn csv_round_trips_quoted_cells() {
        let source = "Site,Value\n\"North, Pad 3\",1.25\nplain,\n";
        let table = from_csv_bytes(source.as_bytes()).unwrap();
        let csv = to_csv(&table).unwrap();
        assert_eq!(csv, source);
    }

    #[test]
    fn xlsx_is_a_zip_archive() {
        let table = from_csv_bytes(b"Site,Value,Ratio\nnorth,1.5,inf\n").unwrap();
        let bytes = to_xlsx(&table).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn oversized_positions_are_rejected_not_wrapped() {
        assert_eq!(xlsx_column(3).unwrap(), 3);
        assert!(matches!(
            xlsx_column(usize::from(u16::MAX) + 1),
            Err(HydrateError::ComputeFailure(_))
        ));
        assert!(matches!(
            xlsx_row(u32::MAX as usize + 1),
            Err(HydrateError::ComputeFailure(_))
        ));
    }

    #[test]
    fn file_names_are_sanitized_for_disk() {
        assert_eq!(safe_file_name("march data/pad 3.csv"), "march_data_pad_3.csv");
        assert_eq!(safe_file_name("../etc"), "_etc");
        assert_eq!(safe_file_name("   "), "dataset");
    }

    #[test]
    fn export_writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let export = Export {
            file_name: export_file_name("pad 7", true, ExportFormat::Csv),
            contents: b"a\n1\n".to_vec(),
        };
        let path = export.write_to(dir.path()).unwrap();
        assert!(path.ends_with("pad_7_with_predictions.csv"));
        assert_eq!(fs::read(path).unwrap(), b"a\n1\n");
    }
}
