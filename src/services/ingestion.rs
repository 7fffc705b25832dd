use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::error::IngestError;
use crate::models::{ColumnSchemaEntry, ConnectionCredentials, IngestionResult, IngestionState};
use crate::services::connection::open_connection;
use crate::services::db_loader::{load_rows, LoadOptions};
use crate::services::readers::DatasetSource;
use crate::services::schema_builder::{ensure_table, resolve_schema};

#[derive(Debug)]
struct StateLog {
    states: Vec<IngestionState>,
}

impl StateLog {
    fn new() -> Self {
        Self { states: vec![IngestionState::Idle] }
    }

    fn current(&self) -> IngestionState {
        self.states.last().copied().unwrap_or(IngestionState::Idle)
    }

    fn enter(&mut self, next: IngestionState) {
        let current = self.current();
        debug_assert!(!current.is_terminal(), "transition out of terminal state {:?}", current);
        debug!("Ingestion state {:?} -> {:?}", current, next);
        self.states.push(next);
    }
}

/// What a run has learned so far, kept when a later stage fails.
#[derive(Debug, Default)]
struct Progress {
    rows_attempted: usize,
    columns: Vec<ColumnSchemaEntry>,
}

/// One ingestion of one dataset into one table.
///
/// `run` consumes the value, so a run cannot be repeated or reused for a
/// second file. Moves through `Idle → Parsing → SchemaResolution → Loading`
/// and ends in `Done` or, on the first error, `Failed`.
pub struct IngestionRun<S> {
    source: S,
    credentials: ConnectionCredentials,
    table_name: String,
    options: LoadOptions,
}

impl<S: DatasetSource> IngestionRun<S> {
    pub fn new(source: S, credentials: ConnectionCredentials, table_name: impl Into<String>) -> Self {
        Self {
            source,
            credentials,
            table_name: table_name.into(),
            options: LoadOptions::default(),
        }
    }

    /// Abandons and rolls back the load if it is still running at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.options.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn run(self) -> IngestionResult {
        let IngestionRun { source, credentials, table_name, options } = self;
        let start = Instant::now();
        info!("Starting ingestion into table {:?}", table_name);

        let mut log = StateLog::new();
        let mut progress = Progress::default();
        let outcome = execute(source, &credentials, &table_name, &options, &mut log, &mut progress);

        match outcome {
            Ok(rows_loaded) => {
                log.enter(IngestionState::Done);
                info!(
                    "Ingestion into {:?} finished: {} rows in {:?}",
                    table_name,
                    rows_loaded,
                    start.elapsed()
                );
                IngestionResult {
                    rows_attempted: progress.rows_attempted,
                    rows_loaded,
                    error: None,
                    states: log.states,
                    columns: progress.columns,
                }
            }
            Err(e) => {
                error!("Ingestion into {:?} failed during {:?}: {}", table_name, log.current(), e);
                log.enter(IngestionState::Failed);
                IngestionResult {
                    rows_attempted: progress.rows_attempted,
                    rows_loaded: 0,
                    error: Some(e),
                    states: log.states,
                    columns: progress.columns,
                }
            }
        }
    }
}

// The connection opened here is dropped on every return path, which also
// rolls back any transaction left open.
fn execute<S: DatasetSource>(
    source: S,
    credentials: &ConnectionCredentials,
    table_name: &str,
    options: &LoadOptions,
    log: &mut StateLog,
    progress: &mut Progress,
) -> Result<usize, IngestError> {
    log.enter(IngestionState::Parsing);
    let dataset = source.read_dataset()?;
    progress.rows_attempted = dataset.row_count();
    info!("Parsed {} rows x {} columns", dataset.row_count(), dataset.column_count());

    log.enter(IngestionState::SchemaResolution);
    let (table, entries) = resolve_schema(table_name, &dataset)?;
    progress.columns = entries;
    let mut conn = open_connection(credentials)?;
    let target = ensure_table(&conn, &table, &progress.columns)?;

    log.enter(IngestionState::Loading);
    load_rows(&mut conn, &target, &dataset, options)
}

/// Runs a single ingestion with default options.
pub fn ingest<S: DatasetSource>(
    source: S,
    credentials: ConnectionCredentials,
    table_name: &str,
) -> IngestionResult {
    IngestionRun::new(source, credentials, table_name).run()
}
