//! Conversions between JSON payloads and MySQL values
//!
//! Request bodies arrive as `serde_json::Value`, rows leave as JSON objects.
//! Values are always bound through `?` placeholders, never formatted into SQL.

use serde_json::{Map, Value};
use sqlx::mysql::{MySql, MySqlArguments, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// A prepared MySQL query with positional arguments
pub type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// One row as an ordered `column -> value` object
pub type JsonRow = Map<String, Value>;

/// Bind a JSON scalar to the next `?` placeholder
pub fn bind_json<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        // Arrays and objects go to JSON / text columns as their serialized form
        other => query.bind(other.to_string()),
    }
}

/// Bind every value in order
pub fn bind_all<'q, 'v>(
    mut query: MySqlQuery<'q>,
    values: impl IntoIterator<Item = &'v Value>,
) -> MySqlQuery<'q> {
    for value in values {
        query = bind_json(query, value);
    }
    query
}

/// Convert a database row to a JSON object, keeping column order
pub fn row_to_json(row: &MySqlRow) -> JsonRow {
    let mut map = Map::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, idx));
    }
    map
}

fn try_as<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<T>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<T, _>(idx).ok()
}

fn decode_column(row: &MySqlRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let type_name = row.column(idx).type_info().name().to_ascii_uppercase();
    let base = type_name.split_whitespace().next().unwrap_or("");

    let decoded = match base {
        "BOOLEAN" => try_as::<bool>(row, idx).map(Value::from),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" | "BIT" => {
            if type_name.contains("UNSIGNED") {
                try_as::<u64>(row, idx).map(Value::from)
            } else {
                try_as::<i64>(row, idx).map(Value::from)
            }
            .or_else(|| try_as::<i64>(row, idx).map(Value::from))
            .or_else(|| try_as::<u64>(row, idx).map(Value::from))
        }
        // Money stays exact: decimals are rendered as strings
        "DECIMAL" => try_as::<rust_decimal::Decimal>(row, idx).map(|d| Value::String(d.to_string())),
        "FLOAT" => try_as::<f32>(row, idx)
            .map(|f| Value::from(f as f64))
            .or_else(|| try_as::<f64>(row, idx).map(Value::from)),
        "DOUBLE" => try_as::<f64>(row, idx).map(Value::from),
        "DATE" => try_as::<chrono::NaiveDate>(row, idx)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
        "DATETIME" | "TIMESTAMP" => try_as::<chrono::NaiveDateTime>(row, idx)
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .or_else(|| {
                try_as::<chrono::DateTime<chrono::Utc>>(row, idx)
                    .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            }),
        "TIME" => try_as::<chrono::NaiveTime>(row, idx)
            .map(|t| Value::String(t.format("%H:%M:%S").to_string())),
        "JSON" => try_as::<Value>(row, idx),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            try_as::<String>(row, idx).map(Value::String).or_else(|| {
                try_as::<Vec<u8>>(row, idx)
                    .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            })
        }
        _ => None,
    };

    decoded
        .or_else(|| try_as::<String>(row, idx).map(Value::String))
        .or_else(|| {
            try_as::<Vec<u8>>(row, idx)
                .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        })
        .unwrap_or_else(|| {
            log::debug!("Undecodable column '{}' of type {}", row.column(idx).name(), type_name);
            Value::Null
        })
}

/// Render a scalar as the text the user would type into a form field
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
        other => Some(other.to_string()),
    }
}

/// Interpret a scalar as a number, accepting numeric strings
pub fn scalar_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Build a JSON number, keeping integers integral
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!("abc")), Some("abc".to_string()));
        assert_eq!(scalar_text(&json!(12)), Some("12".to_string()));
        assert_eq!(scalar_text(&json!(true)), Some("1".to_string()));
        assert_eq!(scalar_text(&Value::Null), None);
    }

    #[test]
    fn test_scalar_number() {
        assert_eq!(scalar_number(&json!(3)), Some(3.0));
        assert_eq!(scalar_number(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(scalar_number(&json!("abc")), None);
        assert_eq!(scalar_number(&json!("NaN")), None);
        assert_eq!(scalar_number(&Value::Null), None);
    }

    #[test]
    fn test_number_value_keeps_integers() {
        assert_eq!(number_value(42.0), json!(42));
        assert_eq!(number_value(0.5), json!(0.5));
    }
}
