use std::collections::HashMap;

use crate::error::IngestError;

/// Surrogate key added to every created table.
pub const ROW_ID_COLUMN: &str = "ingest_row_id";
/// Insertion timestamp added to every created table.
pub const INGESTED_AT_COLUMN: &str = "ingested_at";

/// Keeps ASCII letters, digits and underscores; drops everything else.
pub fn sanitize_identifier(name: &str) -> Result<String, IngestError> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if cleaned.is_empty() {
        return Err(IngestError::InvalidIdentifier { name: name.to_string() });
    }

    Ok(cleaned)
}

/// Sanitizes every column name, failing if two of them (or one and a
/// bookkeeping column) end up the same. Comparison ignores ASCII case since
/// the database does.
pub fn sanitize_column_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>, IngestError> {
    let mut seen: HashMap<String, String> = HashMap::new();
    seen.insert(ROW_ID_COLUMN.to_string(), ROW_ID_COLUMN.to_string());
    seen.insert(INGESTED_AT_COLUMN.to_string(), INGESTED_AT_COLUMN.to_string());

    let mut sanitized = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        let cleaned = sanitize_identifier(name)?;

        if let Some(first) = seen.insert(cleaned.to_ascii_lowercase(), name.to_string()) {
            return Err(IngestError::DuplicateColumn {
                first,
                second: name.to_string(),
                sanitized: cleaned,
            });
        }
        sanitized.push(cleaned);
    }

    Ok(sanitized)
}

/// Wraps an already sanitized identifier in double quotes for SQL text.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn only_identifier_chars(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    #[test]
    fn strips_punctuation_and_spaces() {
        assert_eq!(sanitize_identifier("Order Date (UTC)").unwrap(), "OrderDateUTC");
        assert_eq!(sanitize_identifier("unit_price").unwrap(), "unit_price");
        assert_eq!(sanitize_identifier("2024 sales").unwrap(), "2024sales");
    }

    #[test]
    fn output_is_always_restricted() {
        let inputs = [
            "naïve café",
            "名前 id",
            "tab\tand\nnewline",
            "emoji 🚀 rocket",
            "a\"; DROP TABLE users; --",
            "~!@#x$%^&*()",
        ];
        for input in inputs {
            let out = sanitize_identifier(input).unwrap();
            assert!(only_identifier_chars(&out), "{input:?} -> {out:?}");
        }
    }

    #[test]
    fn all_symbols_is_invalid() {
        for input in ["", "   ", "!@#$%", "日本語", "-.-"] {
            let err = sanitize_identifier(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        }
    }

    #[test]
    fn collapsing_names_are_duplicates() {
        let err = sanitize_column_names(&["a-b", "a.b"]).unwrap_err();
        match err {
            IngestError::DuplicateColumn { first, second, sanitized } => {
                assert_eq!(first, "a-b");
                assert_eq!(second, "a.b");
                assert_eq!(sanitized, "ab");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn case_only_difference_is_a_duplicate() {
        let err = sanitize_column_names(&["Name", "name"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateColumn);
    }

    #[test]
    fn bookkeeping_columns_are_reserved() {
        let err = sanitize_column_names(&["ingested_at"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateColumn);
        assert!(sanitize_column_names(&["id", "ingested"]).is_ok());
    }

    #[test]
    fn order_is_preserved() {
        let out = sanitize_column_names(&["b col", "a-col", "c"]).unwrap();
        assert_eq!(out, vec!["bcol", "acol", "c"]);
    }

    #[test]
    fn quoting_doubles_quotes() {
        assert_eq!(quote_identifier("orders"), "\"orders\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
