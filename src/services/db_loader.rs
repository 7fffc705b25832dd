use std::time::Instant;

use rusqlite::{params_from_iter, types::Value, Connection};
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::models::{Dataset, TableTarget};
use crate::services::identifiers::quote_identifier;
use crate::services::type_inference::convert_value;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// When set, the load is abandoned and rolled back once this passes.
    pub deadline: Option<Instant>,
}

pub fn generate_insert_sql(target: &TableTarget) -> String {
    let columns: Vec<String> = target
        .columns
        .iter()
        .map(|c| quote_identifier(&c.sanitized_name))
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(&target.table_name),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Inserts every row of `dataset` in one transaction.
///
/// All or nothing: the first rejected row rolls the whole load back and is
/// reported as an `Insert` error. Returns the number of rows inserted.
pub fn load_rows(
    conn: &mut Connection,
    target: &TableTarget,
    dataset: &Dataset,
    options: &LoadOptions,
) -> Result<usize, IngestError> {
    let table = target.table_name.as_str();
    if target.columns.len() != dataset.column_count() {
        return Err(IngestError::Schema {
            table: table.to_string(),
            reason: format!(
                "{} schema columns for {} dataset columns",
                target.columns.len(),
                dataset.column_count()
            ),
        });
    }

    let row_count = dataset.row_count();
    info!("Loading {} rows into table {}", row_count, table);

    let tx = conn.transaction().map_err(|e| {
        error!("Failed to begin transaction: {}", e);
        IngestError::Connection(e.to_string())
    })?;

    {
        let insert_sql = generate_insert_sql(target);
        debug!("Insert SQL template: {}", insert_sql);

        // Preparing fails when a reused table lacks one of our columns.
        let mut stmt = tx.prepare(&insert_sql).map_err(|e| {
            error!("Failed to prepare insert statement for {}: {}", table, e);
            IngestError::Schema {
                table: table.to_string(),
                reason: e.to_string(),
            }
        })?;

        let columns = dataset.columns();
        let mut params: Vec<Value> = Vec::with_capacity(columns.len());

        for row_idx in 0..row_count {
            if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!("Deadline passed at row {}/{}, rolling back", row_idx, row_count);
                return Err(IngestError::DeadlineExceeded { rows_attempted: row_idx });
            }
            if row_idx % 100 == 0 {
                debug!("Processing row {}/{}", row_idx, row_count);
            }

            params.clear();
            for (column, entry) in columns.iter().zip(&target.columns) {
                let value = convert_value(&column.values[row_idx], entry.inferred_type).map_err(|e| {
                    IngestError::Insert {
                        row: row_idx + 1,
                        reason: format!("column {}: {}", entry.sanitized_name, e),
                    }
                })?;
                params.push(value);
            }

            if let Err(e) = stmt.execute(params_from_iter(params.iter())) {
                error!("Failed to insert row {}: {}", row_idx + 1, e);
                return Err(IngestError::Insert {
                    row: row_idx + 1,
                    reason: e.to_string(),
                });
            }
        }
    }

    tx.commit().map_err(|e| {
        error!("Failed to commit load into {}: {}", table, e);
        IngestError::Insert {
            row: row_count,
            reason: format!("commit failed: {}", e),
        }
    })?;

    info!("Successfully loaded {} rows into table {}", row_count, table);
    Ok(row_count)
}
