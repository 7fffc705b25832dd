use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, IngestError};

/// A raw scalar as handed over by a reader, before any type inference.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self { name: name.into(), values }
    }
}

/// Ordered named columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Result<Self, IngestError> {
        if columns.is_empty() {
            return Err(IngestError::Parse("dataset has no columns".to_string()));
        }

        let row_count = columns[0].values.len();
        if let Some(ragged) = columns.iter().find(|c| c.values.len() != row_count) {
            return Err(IngestError::Parse(format!(
                "column {:?} has {} values, expected {}",
                ragged.name,
                ragged.values.len(),
                row_count
            )));
        }

        Ok(Self { columns, row_count })
    }

    /// Builds a dataset from a header row and row-major data. Every row must
    /// have exactly one value per header.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, IngestError> {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();

        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(IngestError::Parse(format!(
                    "row {} has {} fields, header has {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Self::new(columns)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericKind {
    /// Every value is a whole number; stored as text so ids keep every digit.
    Integral,
    Fractional,
}

/// The single text layout every value of a DATETIME column was read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "layout", content = "pattern")]
pub enum DateFormat {
    /// chrono pattern with a time part.
    Timestamp(&'static str),
    /// RFC 3339, offsets normalized to UTC.
    Rfc3339,
    /// chrono pattern without a time part; read as midnight.
    Date(&'static str),
}

impl DateFormat {
    /// Parses `s` under this layout only.
    pub fn parse(self, s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        match self {
            DateFormat::Timestamp(pattern) => NaiveDateTime::parse_from_str(s, pattern).ok(),
            DateFormat::Rfc3339 => chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()),
            DateFormat::Date(pattern) => NaiveDate::parse_from_str(s, pattern)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum InferredType {
    Text,
    Number { kind: NumericKind },
    #[serde(rename = "DATETIME")]
    DateTime { format: DateFormat },
    Boolean,
}

impl InferredType {
    /// Declared column type in the destination table.
    pub fn sql_type(&self) -> &'static str {
        match self {
            InferredType::Text => "TEXT",
            InferredType::Number { kind: NumericKind::Integral } => "TEXT",
            InferredType::Number { kind: NumericKind::Fractional } => "REAL",
            InferredType::DateTime { .. } => "DATETIME",
            InferredType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferredType::Text => write!(f, "TEXT"),
            InferredType::Number { .. } => write!(f, "NUMBER"),
            InferredType::DateTime { .. } => write!(f, "DATETIME"),
            InferredType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchemaEntry {
    pub original_name: String,
    pub sanitized_name: String,
    pub inferred_type: InferredType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub table_name: String,
    pub columns: Vec<ColumnSchemaEntry>,
    /// True when the table was already present before this run.
    pub existed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestionState {
    Idle,
    Parsing,
    SchemaResolution,
    Loading,
    Done,
    Failed,
}

impl IngestionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, IngestionState::Done | IngestionState::Failed)
    }
}

/// Outcome of one ingestion run.
#[derive(Debug)]
pub struct IngestionResult {
    pub rows_attempted: usize,
    pub rows_loaded: usize,
    pub error: Option<IngestError>,
    pub states: Vec<IngestionState>,
    /// Resolved columns; empty when the run failed before schema resolution
    /// finished.
    pub columns: Vec<ColumnSchemaEntry>,
}

impl IngestionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Zero rows because there was nothing to load, as opposed to a failure.
    pub fn is_empty_input(&self) -> bool {
        self.error.is_none() && self.rows_attempted == 0
    }

    pub fn final_state(&self) -> IngestionState {
        self.states.last().copied().unwrap_or(IngestionState::Idle)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(IngestError::kind)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
}

impl Serialize for IngestionResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let error = self.error.as_ref().map(|e| ErrorBody {
            kind: e.kind(),
            message: e.to_string(),
        });

        let mut state = serializer.serialize_struct("IngestionResult", 6)?;
        state.serialize_field("rows_attempted", &self.rows_attempted)?;
        state.serialize_field("rows_loaded", &self.rows_loaded)?;
        state.serialize_field("empty_input", &self.is_empty_input())?;
        state.serialize_field("error", &error)?;
        state.serialize_field("final_state", &self.final_state())?;
        state.serialize_field("columns", &self.columns)?;
        state.end()
    }
}

/// Destination database credentials, supplied by the caller for a single run.
///
/// With the SQLite backend `database` is the database file path; `host`,
/// `user` and `password` are accepted for interface parity and ignored.
#[derive(Clone, Deserialize)]
pub struct ConnectionCredentials {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

impl ConnectionCredentials {
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            database: database.into(),
        }
    }
}

impl fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}
