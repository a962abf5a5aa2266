use std::io::Read;
use std::path::Path;

use crate::error::Result;
use crate::models::{RawValue, Row};

/// Headers plus one `Row` per record, in file order.
#[derive(Debug, Clone, Default)]
pub struct LoadedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

pub fn load_csv_path(path: &Path) -> Result<LoadedCsv> {
    let file = std::fs::File::open(path)?;
    let loaded = load_csv_reader(file)?;
    tracing::info!(
        "Loaded {} rows ({} columns) from {}",
        loaded.rows.len(),
        loaded.headers.len(),
        path.display()
    );
    Ok(loaded)
}

/// Empty cells become null. Short records are padded with nulls and extra
/// cells are kept under `column_<n>`. A record that cannot be decoded is
/// logged and kept as an empty row so row numbering stays aligned.
pub fn load_csv_reader<R: Read>(reader: R) -> Result<LoadedCsv> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping undecodable CSV record {}: {}", line + 1, e);
                rows.push(Row::new());
                continue;
            }
        };

        let mut row = Row::new();
        for (i, header) in headers.iter().enumerate() {
            let value = match record.get(i) {
                Some(cell) if !cell.is_empty() => RawValue::Text(cell.to_string()),
                _ => RawValue::Null,
            };
            row.insert(header.clone(), value);
        }
        for (i, cell) in record.iter().enumerate().skip(headers.len()) {
            if !cell.is_empty() {
                row.insert(format!("column_{}", i + 1), RawValue::Text(cell.to_string()));
            }
        }
        rows.push(row);
    }

    Ok(LoadedCsv { headers, rows })
}
