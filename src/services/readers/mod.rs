pub mod delimited;
pub mod spreadsheet;

use bytes::Bytes;

use crate::error::IngestError;
use crate::models::Dataset;

pub use delimited::read_delimited;
pub use spreadsheet::read_spreadsheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Tsv,
    Spreadsheet,
}

impl FileKind {
    /// Picks a reader from the file extension; `None` for unsupported files.
    pub fn from_filename(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileKind::Csv),
            "tsv" => Some(FileKind::Tsv),
            "xlsx" | "xls" | "xlsm" | "ods" => Some(FileKind::Spreadsheet),
            _ => None,
        }
    }
}

/// Anything that can hand the orchestrator a parsed dataset.
pub trait DatasetSource {
    fn read_dataset(self) -> Result<Dataset, IngestError>;
}

impl DatasetSource for Dataset {
    fn read_dataset(self) -> Result<Dataset, IngestError> {
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
    /// Worksheet to read; the first one when unset. Ignored for CSV/TSV.
    pub sheet: Option<String>,
}

impl DatasetSource for UploadedFile {
    fn read_dataset(self) -> Result<Dataset, IngestError> {
        let kind = FileKind::from_filename(&self.file_name).ok_or_else(|| {
            IngestError::Parse(format!("unsupported file type: {}", self.file_name))
        })?;
        tracing::info!("Reading {} ({:?}, {}KB)", self.file_name, kind, self.data.len() / 1024);

        match kind {
            FileKind::Csv => read_delimited(&self.data, b','),
            FileKind::Tsv => read_delimited(&self.data, b'\t'),
            FileKind::Spreadsheet => read_spreadsheet(self.data, self.sheet.as_deref()),
        }
    }
}
