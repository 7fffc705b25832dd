use csv::ReaderBuilder;

use crate::error::IngestError;
use crate::models::{CellValue, Dataset};

/// Reads delimited text with a mandatory header row. Empty fields become
/// nulls; rows with a different field count than the header are rejected.
pub fn read_delimited(data: &[u8], delimiter: u8) -> Result<Dataset, IngestError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Parse(format!("Failed to read header row: {}", e)))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::Parse("file has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| IngestError::Parse(format!("Failed to read row {}: {}", idx + 1, e)))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Null
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }

    tracing::debug!("Read {} rows x {} columns", rows.len(), headers.len());
    Dataset::from_rows(headers, rows)
}
