use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{HydrateError, Result};
use crate::table::Table;

/// Load a table from any CSV reader
///
/// The first record is the header row. Rows must have the same number of
/// cells as the header; cells are kept verbatim.
///
/// # Arguments
/// * `reader` - Source of CSV text
///
/// # Returns
/// * `Result<Table>` - The loaded table or a CSV error
///
/// # Examples
/// ```
/// use hydrate_alert::loader::from_csv_reader;
///
/// let csv = "Time,Inj Gas Meter Volume Instantaneous\n2024-03-01 10:00:00,412.5\n";
/// let table = from_csv_reader(csv.as_bytes()).unwrap();
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.headers()[1], "Inj Gas Meter Volume Instantaneous");
/// ```
pub fn from_csv_reader<R: Read>(reader: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(HydrateError::compute("CSV file has no header row"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect());
    }

    debug!("Parsed CSV with {} columns and {} rows", headers.len(), rows.len());
    Table::new(headers, rows)
}

/// Load a table from an in-memory CSV upload
pub fn from_csv_bytes(bytes: &[u8]) -> Result<Table> {
    from_csv_reader(bytes)
}

/// Load a table from a CSV file on disk
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Table> {
    let file = File::open(filepath)?;
    from_csv_reader(std::io::BufReader::new(file))
}

/// Detect the file type from its extension and load it
///
/// Only CSV is accepted; anything else is rejected with a message naming the
/// extension.
///
/// # Examples
/// ```no_run
/// use hydrate_alert::loader::load_table;
///
/// match load_table("pipeline_march.csv") {
///     Ok(table) => println!("Loaded {} rows", table.len()),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_table(filepath: impl AsRef<Path>) -> Result<Table> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path),
        Some(ext) => Err(HydrateError::compute(format!(
            "Unsupported file extension: {}",
            ext
        ))),
        None => Err(HydrateError::compute("File has no extension")),
    }
}
