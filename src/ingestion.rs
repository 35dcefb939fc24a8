use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::EnrichedRecord;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// One decoded spreadsheet row, keeping the header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed value of `column`, empty when the column is missing.
    pub fn text(&self, column: &str) -> &str {
        self.get(column).map(str::trim).unwrap_or_default()
    }

}

pub fn validate_input(path: &Path) -> AppResult<()> {
    if !path.exists() {
        return Err(AppError::Input(format!(
            "input file does not exist: {}",
            path.display()
        )));
    }
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(AppError::Input(format!(
            "input file must be a .csv file: {}",
            path.display()
        )));
    }
    Ok(())
}

pub fn read_rows(path: &Path) -> AppResult<Vec<Row>> {
    let file = File::open(path)?;
    let rows = parse_rows(file)?;
    debug!(path = %path.display(), rows = rows.len(), "decoded input rows");
    Ok(rows)
}

/// Decodes CSV with a mandatory header row. Rows shorter than the header
/// simply lack the trailing columns; extra fields are ignored.
pub fn parse_rows<R: Read>(reader: R) -> AppResult<Vec<Row>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = csv_reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            if idx == 0 {
                name.trim_start_matches(BYTE_ORDER_MARK).to_string()
            } else {
                name.to_string()
            }
        })
        .collect();

    if header.iter().all(|name| name.trim().is_empty()) {
        return Err(AppError::Input("input is missing its header row".into()));
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(Row::from_pairs(
            header
                .iter()
                .zip(record.iter())
                .map(|(name, value)| (name.as_str(), value)),
        ));
    }
    Ok(rows)
}

pub fn write_records(path: &Path, records: &[EnrichedRecord]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_vec_pretty(records)?;
    fs::write(path, serialized)?;
    Ok(())
}
