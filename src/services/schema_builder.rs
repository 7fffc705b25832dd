use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::models::{ColumnSchemaEntry, Dataset, InferredType, NumericKind, TableTarget};
use crate::services::identifiers::{
    quote_identifier, sanitize_column_names, sanitize_identifier, INGESTED_AT_COLUMN, ROW_ID_COLUMN,
};
use crate::services::type_inference::infer_dataset_types;

/// Sanitizes the table and column names and infers every column type.
/// Touches no database.
pub fn resolve_schema(
    table_name: &str,
    dataset: &Dataset,
) -> Result<(String, Vec<ColumnSchemaEntry>), IngestError> {
    let table = sanitize_identifier(table_name)?;

    let originals: Vec<&str> = dataset.columns().iter().map(|c| c.name.as_str()).collect();
    let sanitized = sanitize_column_names(&originals)?;
    let types = infer_dataset_types(dataset);

    let entries = originals
        .into_iter()
        .zip(sanitized)
        .zip(types)
        .map(|((original, sanitized), inferred)| ColumnSchemaEntry {
            original_name: original.to_string(),
            sanitized_name: sanitized,
            inferred_type: inferred,
        })
        .collect();

    Ok((table, entries))
}

fn column_definition(entry: &ColumnSchemaEntry) -> String {
    let name = quote_identifier(&entry.sanitized_name);
    let check = match entry.inferred_type {
        InferredType::Number { kind: NumericKind::Fractional } => {
            Some(format!("typeof({}) IN ('real', 'integer')", name))
        }
        InferredType::DateTime { .. } => Some(format!("datetime({}) IS NOT NULL", name)),
        InferredType::Boolean => Some(format!("{} IN (0, 1)", name)),
        InferredType::Text | InferredType::Number { kind: NumericKind::Integral } => None,
    };

    match check {
        Some(check) => format!(
            "{} {} CHECK ({} IS NULL OR {})",
            name,
            entry.inferred_type.sql_type(),
            name,
            check
        ),
        None => format!("{} {}", name, entry.inferred_type.sql_type()),
    }
}

pub fn generate_create_table_sql(table_name: &str, entries: &[ColumnSchemaEntry]) -> String {
    let mut columns = Vec::with_capacity(entries.len() + 2);
    columns.push(format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_identifier(ROW_ID_COLUMN)));
    columns.extend(entries.iter().map(column_definition));
    columns.push(format!(
        "{} DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP",
        quote_identifier(INGESTED_AT_COLUMN)
    ));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table_name),
        columns.join(", ")
    )
}

pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
        [table_name],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|found| found.is_some())
}

/// `(name, declared type)` for every column of an existing table.
pub fn existing_columns(conn: &Connection, table_name: &str) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let cols = stmt
        .query_map([table_name], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

/// Creates the table when it is missing. An existing table is left as it is;
/// columns it lacks are reported here and make the later insert fail.
pub fn ensure_table(
    conn: &Connection,
    table_name: &str,
    entries: &[ColumnSchemaEntry],
) -> Result<TableTarget, IngestError> {
    let schema_err = |e: rusqlite::Error| IngestError::Schema {
        table: table_name.to_string(),
        reason: e.to_string(),
    };

    let existed = table_exists(conn, table_name).map_err(schema_err)?;

    if existed {
        let current = existing_columns(conn, table_name).map_err(schema_err)?;
        info!("Table {} already exists with {} columns, reusing it", table_name, current.len());

        for entry in entries {
            match current
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&entry.sanitized_name))
            {
                None => warn!(
                    "Table {} has no column {}; insert will fail",
                    table_name, entry.sanitized_name
                ),
                Some((_, declared)) if !declared.eq_ignore_ascii_case(entry.inferred_type.sql_type()) => warn!(
                    "Column {}.{} is declared {} but data looks like {}",
                    table_name,
                    entry.sanitized_name,
                    declared,
                    entry.inferred_type.sql_type()
                ),
                Some(_) => {}
            }
        }
    } else {
        let create_table_sql = generate_create_table_sql(table_name, entries);
        debug!("Create table SQL: {}", create_table_sql);

        conn.execute(&create_table_sql, []).map_err(|e| {
            error!("Failed to create table {}: {}", table_name, e);
            schema_err(e)
        })?;
        info!("Created table {} with {} data columns", table_name, entries.len());
    }

    Ok(TableTarget {
        table_name: table_name.to_string(),
        columns: entries.to_vec(),
        existed,
    })
}
