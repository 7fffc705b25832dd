use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use rusqlite::types::Value;
use thiserror::Error;

use crate::models::{CellValue, Dataset, DateFormat, InferredType, NumericKind};

static INTEGER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d+$").expect("integer pattern compiles")
});

static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("decimal pattern compiles")
});

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
];

/// Canonical text form written into DATETIME columns.
const STORED_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// 2^53: past this an f64 no longer holds every integer exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Infers the storage type of a column from every value in it.
pub fn infer_column_type(values: &[CellValue]) -> InferredType {
    let non_null: Vec<&CellValue> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return InferredType::Text;
    }

    let numeric: Option<Vec<NumericKind>> = non_null.iter().map(|v| numeric_kind(v)).collect();
    if let Some(kinds) = numeric {
        let kind = if kinds.iter().all(|k| *k == NumericKind::Integral) {
            NumericKind::Integral
        } else {
            NumericKind::Fractional
        };
        return InferredType::Number { kind };
    }

    if let Some(format) = column_date_format(&non_null) {
        return InferredType::DateTime { format };
    }

    if non_null.iter().all(|v| as_bool(v).is_some()) {
        return InferredType::Boolean;
    }

    InferredType::Text
}

/// Infers every column of the dataset, one rayon task per column.
pub fn infer_dataset_types(dataset: &Dataset) -> Vec<InferredType> {
    dataset
        .columns()
        .par_iter()
        .map(|column| {
            let inferred = infer_column_type(&column.values);
            tracing::debug!("Column {:?} inferred as {:?}", column.name, inferred);
            inferred
        })
        .collect()
}

fn numeric_kind(value: &CellValue) -> Option<NumericKind> {
    match value {
        CellValue::Int(_) => Some(NumericKind::Integral),
        CellValue::Float(f) if is_integral_float(*f) => Some(NumericKind::Integral),
        CellValue::Float(f) if f.is_finite() => Some(NumericKind::Fractional),
        CellValue::Text(s) => {
            let s = s.trim();
            if INTEGER_RE.is_match(s) {
                Some(NumericKind::Integral)
            } else if DECIMAL_RE.is_match(s) && parse_finite(s).is_some() {
                Some(NumericKind::Fractional)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_integral_float(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT
}

// Overflowing exponents such as "1e400" match the decimal pattern but parse to inf.
fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn date_format_candidates() -> impl Iterator<Item = DateFormat> {
    DATETIME_FORMATS
        .iter()
        .copied()
        .map(DateFormat::Timestamp)
        .chain(std::iter::once(DateFormat::Rfc3339))
        .chain(DATE_FORMATS.iter().copied().map(DateFormat::Date))
}

/// First layout under which every value of the column parses. One column never
/// mixes layouts, so "01/02/2024" means the same day in every row.
fn column_date_format(non_null: &[&CellValue]) -> Option<DateFormat> {
    if !non_null.iter().any(|v| matches!(v, CellValue::Text(_))) {
        return non_null
            .iter()
            .all(|v| matches!(v, CellValue::DateTime(_)))
            .then_some(DateFormat::Timestamp(STORED_DATETIME_FORMAT));
    }
    date_format_candidates().find(|format| non_null.iter().all(|v| as_datetime(v, *format).is_some()))
}

fn as_datetime(value: &CellValue, format: DateFormat) -> Option<NaiveDateTime> {
    match value {
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Text(s) => format.parse(s),
        _ => None,
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn as_bool(value: &CellValue) -> Option<bool> {
    match value {
        CellValue::Bool(b) => Some(*b),
        CellValue::Text(s) => parse_bool(s),
        _ => None,
    }
}

#[derive(Debug, Error)]
#[error("cannot store {value} in a {target} column")]
pub struct ConversionError {
    pub value: String,
    pub target: InferredType,
}

/// Converts one cell to the SQL value stored for a column of type `target`.
/// Null always maps to SQL NULL.
pub fn convert_value(value: &CellValue, target: InferredType) -> Result<Value, ConversionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let converted = match target {
        InferredType::Text => Some(Value::Text(render_text(value))),
        InferredType::Number { kind: NumericKind::Integral } => to_integral_text(value),
        InferredType::Number { kind: NumericKind::Fractional } => to_real(value),
        InferredType::DateTime { format } => as_datetime(value, format)
            .map(|dt| Value::Text(dt.format(STORED_DATETIME_FORMAT).to_string())),
        InferredType::Boolean => as_bool(value).map(|b| Value::Integer(i64::from(b))),
    };

    converted.ok_or_else(|| ConversionError {
        value: format!("{:?}", value),
        target,
    })
}

fn render_text(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::Text(s) => s.clone(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) if is_integral_float(*f) => format!("{}", *f as i64),
        CellValue::Float(f) => f.to_string(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::DateTime(dt) => dt.format(STORED_DATETIME_FORMAT).to_string(),
    }
}

fn to_integral_text(value: &CellValue) -> Option<Value> {
    match value {
        CellValue::Text(s) if INTEGER_RE.is_match(s.trim()) => Some(Value::Text(s.trim().to_string())),
        CellValue::Int(i) => Some(Value::Text(i.to_string())),
        CellValue::Float(f) if is_integral_float(*f) => Some(Value::Text(format!("{}", *f as i64))),
        _ => None,
    }
}

fn to_real(value: &CellValue) -> Option<Value> {
    match value {
        CellValue::Text(s) if DECIMAL_RE.is_match(s.trim()) => parse_finite(s.trim()).map(Value::Real),
        CellValue::Int(i) => Some(Value::Real(*i as f64)),
        CellValue::Float(f) if f.is_finite() => Some(Value::Real(*f)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::from(*v)).collect()
    }

    #[test]
    fn integer_columns_are_integral_numbers() {
        let col = texts(&["1", "2", "-3", "123456789012345678901234"]);
        assert_eq!(
            infer_column_type(&col),
            InferredType::Number { kind: NumericKind::Integral }
        );
    }

    #[test]
    fn long_ids_round_trip_unchanged() {
        let t = InferredType::Number { kind: NumericKind::Integral };
        for id in ["900719925474099312345", "0042", "123456789012345"] {
            let stored = convert_value(&CellValue::from(id), t).unwrap();
            assert_eq!(stored, Value::Text(id.to_string()));
        }
    }

    #[test]
    fn mixed_integer_and_decimal_is_fractional() {
        let col = texts(&["1", "2.5", "1e3", ".5"]);
        assert_eq!(
            infer_column_type(&col),
            InferredType::Number { kind: NumericKind::Fractional }
        );
    }

    #[test]
    fn one_stray_word_makes_text() {
        let mut col = texts(&["1"; 500]);
        col.push(CellValue::from("n/a"));
        assert_eq!(infer_column_type(&col), InferredType::Text);
    }

    #[test]
    fn special_float_spellings_are_not_numbers() {
        assert_eq!(infer_column_type(&texts(&["1", "NaN"])), InferredType::Text);
        assert_eq!(infer_column_type(&texts(&["inf"])), InferredType::Text);
    }

    #[test]
    fn nulls_are_ignored_but_all_null_is_text() {
        let col = vec![CellValue::Null, CellValue::from("4"), CellValue::Null];
        assert!(matches!(infer_column_type(&col), InferredType::Number { .. }));
        assert_eq!(infer_column_type(&[CellValue::Null, CellValue::Null]), InferredType::Text);
        assert_eq!(infer_column_type(&[]), InferredType::Text);
    }

    #[test]
    fn overflowing_exponents_are_not_numbers() {
        assert_eq!(infer_column_type(&texts(&["1.5", "1e400"])), InferredType::Text);
        assert_eq!(infer_column_type(&texts(&["-1e400"])), InferredType::Text);

        let real = InferredType::Number { kind: NumericKind::Fractional };
        assert!(convert_value(&CellValue::from("1e400"), real).is_err());
        assert_eq!(convert_value(&CellValue::from("1e300"), real).unwrap(), Value::Real(1e300));
    }

    fn datetime(format: DateFormat) -> InferredType {
        InferredType::DateTime { format }
    }

    #[test]
    fn date_columns() {
        let col = texts(&["2024-02-29 13:45:00", "2024-03-01 08:00:00"]);
        assert_eq!(infer_column_type(&col), datetime(DateFormat::Timestamp("%Y-%m-%d %H:%M:%S")));
        assert_eq!(
            infer_column_type(&texts(&["2024-03-01T08:00:00Z", "2024-03-01T10:00:00+02:00"])),
            datetime(DateFormat::Rfc3339)
        );
        assert_eq!(
            infer_column_type(&texts(&["05/01/2024", "31/12/2023"])),
            datetime(DateFormat::Date("%d/%m/%Y"))
        );
        assert_eq!(infer_column_type(&texts(&["2024-01-05", "soon"])), InferredType::Text);
    }

    #[test]
    fn a_column_mixing_date_layouts_is_text() {
        let col = texts(&["2024-01-05", "2024-02-29 13:45:00"]);
        assert_eq!(infer_column_type(&col), InferredType::Text);
    }

    #[test]
    fn month_first_column_is_read_month_first_in_every_row() {
        let col = texts(&["01/02/2024", "12/31/2024"]);
        let t = infer_column_type(&col);
        assert_eq!(t, datetime(DateFormat::Date("%m/%d/%Y")));

        let stored: Vec<Value> = col.iter().map(|v| convert_value(v, t).unwrap()).collect();
        assert_eq!(
            stored,
            vec![
                Value::Text("2024-01-02 00:00:00".to_string()),
                Value::Text("2024-12-31 00:00:00".to_string()),
            ]
        );
    }

    #[test]
    fn conversion_uses_only_the_column_layout() {
        let day_first = datetime(DateFormat::Date("%d/%m/%Y"));
        assert!(convert_value(&CellValue::from("12/31/2024"), day_first).is_err());
        assert!(convert_value(&CellValue::from("2024-12-31"), day_first).is_err());
    }

    #[test]
    fn date_only_values_get_midnight() {
        let t = infer_column_type(&texts(&["2024-01-05"]));
        let stored = convert_value(&CellValue::from("2024-01-05"), t).unwrap();
        assert_eq!(stored, Value::Text("2024-01-05 00:00:00".to_string()));
    }

    #[test]
    fn native_datetimes_mix_with_text_of_one_layout() {
        let native = NaiveDateTime::parse_from_str("2024-01-01 09:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let col = vec![CellValue::DateTime(native), CellValue::from("2024-01-02")];
        let t = infer_column_type(&col);
        assert_eq!(t, datetime(DateFormat::Date("%Y-%m-%d")));
        assert_eq!(
            convert_value(&col[0], t).unwrap(),
            Value::Text("2024-01-01 09:30:00".to_string())
        );
    }

    #[test]
    fn boolean_columns() {
        let col = vec![CellValue::from("Yes"), CellValue::from("no"), CellValue::Bool(true)];
        assert_eq!(infer_column_type(&col), InferredType::Boolean);
        assert_eq!(
            convert_value(&CellValue::from("FALSE"), InferredType::Boolean).unwrap(),
            Value::Integer(0)
        );
    }

    #[test]
    fn zero_one_columns_stay_numeric() {
        assert!(matches!(infer_column_type(&texts(&["0", "1", "1"])), InferredType::Number { .. }));
    }

    #[test]
    fn spreadsheet_whole_floats_are_integral() {
        let col = vec![CellValue::Float(1.0), CellValue::Int(2)];
        let t = infer_column_type(&col);
        assert_eq!(t, InferredType::Number { kind: NumericKind::Integral });
        assert_eq!(convert_value(&col[0], t).unwrap(), Value::Text("1".to_string()));
    }

    #[test]
    fn null_converts_to_sql_null_for_every_type() {
        for t in [
            InferredType::Text,
            InferredType::Number { kind: NumericKind::Integral },
            InferredType::Number { kind: NumericKind::Fractional },
            InferredType::DateTime { format: DateFormat::Rfc3339 },
            InferredType::Boolean,
        ] {
            assert_eq!(convert_value(&CellValue::Null, t).unwrap(), Value::Null);
        }
    }

    #[test]
    fn conversion_rejects_values_outside_the_type() {
        let err = convert_value(&CellValue::from("abc"), InferredType::Number {
            kind: NumericKind::Fractional,
        })
        .unwrap_err();
        assert!(err.to_string().contains("NUMBER"));
    }
}
