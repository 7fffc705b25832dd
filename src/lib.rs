//! Loads delimited and spreadsheet files of unknown shape into relational
//! tables: infers a column type per column, sanitizes names, creates the
//! table if needed and inserts every row in one transaction.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

pub use error::{ErrorKind, IngestError};
pub use models::{CellValue, Column, ConnectionCredentials, Dataset, IngestionResult, IngestionState};
pub use services::{ingest, IngestionRun};

/// Shared, read-only state of the HTTP service.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self { config }
    }
}
