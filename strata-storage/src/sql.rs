//! Identifier quoting and JSON ↔ SQLite value mapping

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};
use strata_core::StorageError;

/// Double-quote an identifier, doubling embedded quotes.
///
/// Only names already present in the catalog reach this function; the
/// schema loader rejects names that cannot be quoted.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `name` can be used as a quoted identifier.
pub fn is_quotable(name: &str) -> bool {
    !name.is_empty() && !name.contains('\0')
}

/// `?, ?, ?` with `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Map a JSON cell value to an SQLite value.
///
/// Arrays and objects are stored as their JSON text.
pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Map an SQLite cell to JSON. BLOBs become arrays of byte values.
pub fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Escape `%`, `_` and `\` for a `LIKE … ESCAPE '\'` needle.
pub fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub(crate) fn sqlite_err(e: rusqlite::Error) -> StorageError {
    StorageError::Sqlite {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Index"), "\"Index\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert!(!is_quotable("bad\0name"));
        assert!(!is_quotable(""));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_value_mapping() {
        assert_eq!(to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(to_sql(&json!(["a"])), SqlValue::Text("[\"a\"]".to_string()));
        assert_eq!(from_sql(ValueRef::Integer(3)), json!(3));
        assert_eq!(from_sql(ValueRef::Text(b"hi")), json!("hi"));
        assert_eq!(from_sql(ValueRef::Blob(&[1, 2])), json!([1, 2]));
        assert_eq!(from_sql(ValueRef::Null), Value::Null);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
