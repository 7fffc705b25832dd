use std::io::Cursor;

use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};

use crate::error::IngestError;
use crate::models::{CellValue, Dataset};

/// Reads one worksheet (the first, unless `sheet` names another). The first
/// row is the header; rows with no value in any cell are skipped.
pub fn read_spreadsheet(file_data: Bytes, sheet: Option<&str>) -> Result<Dataset, IngestError> {
    let cursor = Cursor::new(file_data);
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| {
        tracing::error!("Failed to open spreadsheet: {}", e);
        IngestError::Parse(format!("Failed to open spreadsheet: {}", e))
    })?;

    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!("Found {} sheets: {:?}", sheet_names.len(), sheet_names);

    let sheet_name = match sheet {
        Some(wanted) => sheet_names
            .iter()
            .find(|name| name.as_str() == wanted)
            .cloned()
            .ok_or_else(|| IngestError::Parse(format!("No sheet named {:?}", wanted)))?,
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| IngestError::Parse("No sheets found in workbook".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IngestError::Parse(format!("Failed to read worksheet {}: {}", sheet_name, e)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| IngestError::Parse(format!("Sheet {} is empty", sheet_name)))?
        .iter()
        .map(|cell| cell.to_string())
        .collect();

    let data: Vec<Vec<CellValue>> = rows
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.iter().map(to_cell_value).collect())
        .collect();

    tracing::info!("Sheet {} has {} data rows x {} columns", sheet_name, data.len(), headers.len());
    Dataset::from_rows(headers, data)
}

fn to_cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) if s.is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        other => match other.as_datetime() {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Text(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    // Sheets "People" (id, name, joined as date-formatted cells, one blank
    // row) and "Totals".
    static PEOPLE_XLSX: &[u8] = include_bytes!("../../../tests/fixtures/people.xlsx");

    fn people_workbook() -> Bytes {
        Bytes::from_static(PEOPLE_XLSX)
    }

    #[test]
    fn first_sheet_header_and_rows() {
        let ds = read_spreadsheet(people_workbook(), None).unwrap();
        let names: Vec<&str> = ds.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "joined"]);
        // The blank third row is skipped.
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.columns()[0].values, vec![CellValue::Float(1.0), CellValue::Float(2.0)]);
        assert_eq!(ds.columns()[1].values, vec![CellValue::from("Ada"), CellValue::from("Grace")]);
    }

    #[test]
    fn date_formatted_cells_become_datetimes() {
        let ds = read_spreadsheet(people_workbook(), None).unwrap();
        let new_year = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(ds.columns()[2].values[0], CellValue::DateTime(new_year));
    }

    #[test]
    fn named_sheet_is_read() {
        let ds = read_spreadsheet(people_workbook(), Some("Totals")).unwrap();
        assert_eq!(ds.columns()[0].name, "total");
        assert_eq!(ds.columns()[0].values, vec![CellValue::Float(3.5)]);
    }

    #[test]
    fn missing_sheet_is_a_parse_error() {
        let err = read_spreadsheet(people_workbook(), Some("Archive")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        assert!(err.to_string().contains("Archive"));
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = read_spreadsheet(Bytes::from_static(b"not a workbook"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn scalar_cells_map_directly() {
        assert_eq!(to_cell_value(&Data::Empty), CellValue::Null);
        assert_eq!(to_cell_value(&Data::String(String::new())), CellValue::Null);
        assert_eq!(to_cell_value(&Data::Int(7)), CellValue::Int(7));
        assert_eq!(to_cell_value(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(to_cell_value(&Data::String("x".into())), CellValue::from("x"));
    }
}
