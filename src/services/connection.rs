use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, error, info};

use crate::error::IngestError;
use crate::models::ConnectionCredentials;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a fresh connection for one ingestion run. The connection is closed
/// when the returned value is dropped.
pub fn open_connection(credentials: &ConnectionCredentials) -> Result<Connection, IngestError> {
    if credentials.database.trim().is_empty() {
        return Err(IngestError::Connection("no database given".to_string()));
    }

    debug!("Opening database connection: {:?}", credentials);
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(&credentials.database, flags).map_err(|e| {
        error!("Failed to open database {}: {}", credentials.database, e);
        IngestError::Connection(e.to_string())
    })?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| IngestError::Connection(e.to_string()))?;

    // Opening is lazy; a query proves the file really is a database.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|e| {
            error!("Database {} is not usable: {}", credentials.database, e);
            IngestError::Connection(e.to_string())
        })?;

    Ok(conn)
}

/// Reachability check used before accepting uploads.
pub fn test_connection(credentials: &ConnectionCredentials) -> bool {
    match open_connection(credentials) {
        Ok(_) => {
            info!("Connection to {} succeeded", credentials.database);
            true
        }
        Err(e) => {
            info!("Connection to {} failed: {}", credentials.database, e);
            false
        }
    }
}
