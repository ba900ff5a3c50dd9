//! Example-data synthesis for insert forms
//!
//! Per column, first match wins: auto-generated columns are skipped, then
//! object overrides, foreign keys, temporal columns, enums, numbers and finally
//! strings. Unique suffixes and offsets are derived from the clock plus a random
//! component; they make collisions unlikely, not impossible.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, Local, NaiveDateTime};
use rand::Rng;
use serde_json::Value;
use sqlx::mysql::MySqlConnection;

use super::catalog::{ColumnInfo, ForeignKey, SchemaCatalog};
use crate::rbac::{Authorized, Insert};
use crate::sql::{self, JsonRow};
use crate::{Error, Result};

const NUMERIC_TYPES: [&str; 10] = [
    "tinyint", "smallint", "mediumint", "int", "integer", "bigint", "decimal", "numeric", "float",
    "double",
];

const TEMPORAL_HINTS: [&str; 4] = ["日期", "时间", "date", "time"];

/// What to do for one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSynth {
    /// Leave absent; the database assigns it
    Skip,
    Value(Value),
    /// Pick an existing referenced value
    ForeignKey(ForeignKey),
}

/// Everything the per-column rules look at
#[derive(Debug, Clone)]
pub struct SynthContext<'a> {
    pub foreign_keys: &'a BTreeMap<String, ForeignKey>,
    pub unique_columns: &'a BTreeSet<String>,
    pub sample: Option<&'a JsonRow>,
    pub now: NaiveDateTime,
    pub suffix: String,
}

impl<'a> SynthContext<'a> {
    pub fn new(
        foreign_keys: &'a BTreeMap<String, ForeignKey>,
        unique_columns: &'a BTreeSet<String>,
        sample: Option<&'a JsonRow>,
    ) -> Self {
        Self { foreign_keys, unique_columns, sample, now: Local::now().naive_local(), suffix: unique_suffix() }
    }

    fn sample_value(&self, column: &str) -> Option<&Value> {
        self.sample.and_then(|row| row.get(column)).filter(|v| !v.is_null())
    }

    fn is_unique(&self, column: &ColumnInfo) -> bool {
        self.unique_columns.contains(&column.name)
    }

    /// Generic rules (everything except object overrides)
    pub fn column(&self, column: &ColumnInfo) -> ColumnSynth {
        if column.is_auto_generated() {
            return ColumnSynth::Skip;
        }
        if let Some(fk) = self.foreign_keys.get(&column.name) {
            return ColumnSynth::ForeignKey(fk.clone());
        }
        if is_temporal(column) {
            return ColumnSynth::Value(Value::String(format_temporal(column, self.now + Duration::hours(1))));
        }
        if !column.enum_values.is_empty() {
            return ColumnSynth::Value(self.enum_value(column));
        }
        if NUMERIC_TYPES.contains(&column.data_type.as_str()) {
            return ColumnSynth::Value(self.numeric_value(column));
        }
        ColumnSynth::Value(self.text_value(column))
    }

    fn enum_value(&self, column: &ColumnInfo) -> Value {
        let current = self
            .sample_value(&column.name)
            .and_then(sql::scalar_text)
            .filter(|v| column.enum_values.contains(v));
        let chosen = current
            .or_else(|| column.default.clone().filter(|d| column.enum_values.contains(d)))
            .or_else(|| column.enum_values.first().cloned());
        chosen.map(Value::String).unwrap_or(Value::Null)
    }

    fn numeric_value(&self, column: &ColumnInfo) -> Value {
        let base = self
            .sample_value(&column.name)
            .and_then(sql::scalar_number)
            .or_else(|| column.default.as_deref().and_then(|d| d.trim().parse::<f64>().ok()))
            .unwrap_or(1.0);

        if !self.is_unique(column) {
            return sql::number_value(base);
        }
        let (low, high) = numeric_range(column);
        let base = base.clamp(low.max(0.0), high);
        let room = (high - base).floor().min(MAX_UNIQUE_OFFSET);
        let mut rng = rand::thread_rng();
        if room >= 1.0 {
            sql::number_value(base + rng.gen_range(1..=room as i64) as f64)
        } else {
            // no headroom above the base: any other value in range
            sql::number_value(rng.gen_range(low.max(0.0) as i64..=high as i64) as f64)
        }
    }

    fn text_value(&self, column: &ColumnInfo) -> Value {
        let base = self
            .sample_value(&column.name)
            .and_then(sql::scalar_text)
            .or_else(|| column.default.clone());

        if column.data_type == "json" {
            let parsed = base.and_then(|b| serde_json::from_str::<Value>(&b).ok());
            return parsed.unwrap_or_else(|| Value::Object(JsonRow::new()));
        }

        match base {
            Some(value) if self.is_unique(column) => Value::String(with_suffix(&value, &self.suffix, column.max_length)),
            Some(value) => Value::String(truncate_chars(&value, column.max_length)),
            None => Value::String(with_suffix(&column.name, &self.suffix, column.max_length)),
        }
    }
}

const MAX_UNIQUE_OFFSET: f64 = 99_999.0;

/// Inclusive value range implied by the column type
fn numeric_range(column: &ColumnInfo) -> (f64, f64) {
    let unsigned = column.column_type.to_ascii_lowercase().contains("unsigned");
    let bits = match column.data_type.as_str() {
        "tinyint" => Some(8),
        "smallint" => Some(16),
        "mediumint" => Some(24),
        "int" | "integer" => Some(32),
        // capped where f64 stops being exact
        "bigint" => Some(53),
        _ => None,
    };
    if let Some(bits) = bits {
        let span = 2f64.powi(bits);
        return if unsigned { (0.0, span - 1.0) } else { (-span / 2.0, span / 2.0 - 1.0) };
    }
    if matches!(column.data_type.as_str(), "decimal" | "numeric") {
        if let Some((precision, scale)) = decimal_shape(&column.column_type) {
            let high = 10f64.powi(precision.saturating_sub(scale) as i32) - 1.0;
            return (if unsigned { 0.0 } else { -high }, high);
        }
    }
    (f64::MIN, f64::MAX)
}

/// `(precision, scale)` from e.g. `decimal(10,2)`
fn decimal_shape(column_type: &str) -> Option<(u32, u32)> {
    let start = column_type.find('(')? + 1;
    let end = column_type[start..].find(')')? + start;
    let mut parts = column_type[start..end].split(',').map(|p| p.trim().parse::<u32>());
    let precision = parts.next()?.ok()?;
    let scale = match parts.next() {
        Some(scale) => scale.ok()?,
        None => 0,
    };
    Some((precision, scale))
}

/// `base_suffix`, shortening the base so the suffix always fits
fn with_suffix(base: &str, suffix: &str, max_length: Option<i64>) -> String {
    let Some(max) = max_length.filter(|m| *m > 0).map(|m| m as usize) else {
        return format!("{}_{}", base, suffix);
    };
    let suffix_len = suffix.chars().count();
    if suffix_len + 1 < max {
        let head: String = base.chars().take(max - suffix_len - 1).collect();
        format!("{}_{}", head, suffix)
    } else {
        // keep the tail, where the random part lives
        suffix.chars().skip(suffix_len.saturating_sub(max)).collect()
    }
}

/// Clock-derived suffix with a random tail, e.g. `m1x2k9_417`
pub fn unique_suffix() -> String {
    let millis = Local::now().timestamp_millis().max(0) as u64;
    format!("{}_{}", to_base36(millis), rand::thread_rng().gen_range(0..1000))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn truncate_chars(text: &str, max_length: Option<i64>) -> String {
    match max_length {
        Some(max) if max > 0 => text.chars().take(max as usize).collect(),
        _ => text.to_string(),
    }
}

fn is_temporal(column: &ColumnInfo) -> bool {
    matches!(column.data_type.as_str(), "datetime" | "timestamp" | "date" | "time")
        || (is_text_type(column)
            && TEMPORAL_HINTS.iter().any(|hint| column.comment.to_lowercase().contains(hint)))
}

fn format_temporal(column: &ColumnInfo, at: NaiveDateTime) -> String {
    let text = match column.data_type.as_str() {
        "date" => at.format("%Y-%m-%d").to_string(),
        "time" => at.format("%H:%M:%S").to_string(),
        _ => at.format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    truncate_chars(&text, if is_text_type(column) { column.max_length } else { None })
}

fn is_text_type(column: &ColumnInfo) -> bool {
    matches!(column.data_type.as_str(), "char" | "varchar")
}

fn has_column(columns: &[ColumnInfo], name: &str) -> bool {
    columns.iter().any(|c| c.name == name)
}

/// Values for workflow tables whose constraints span rows
async fn object_overrides(
    conn: &mut MySqlConnection,
    object: &str,
    columns: &[ColumnInfo],
    now: NaiveDateTime,
) -> Result<JsonRow> {
    let mut values = JsonRow::new();

    match object {
        "lab_result" if has_column(columns, "lab_order_item_id") => {
            let item: Option<(i64,)> = sqlx::query_as(
                "SELECT CAST(i.lab_order_item_id AS SIGNED) \
                 FROM lab_order_item i \
                 LEFT JOIN lab_result r ON r.lab_order_item_id = i.lab_order_item_id \
                 WHERE r.lab_order_item_id IS NULL \
                 ORDER BY i.lab_order_item_id DESC \
                 LIMIT 1",
            )
            .fetch_optional(&mut *conn)
            .await?;
            let (item_id,) = item.ok_or_else(|| {
                Error::ExampleUnavailable(
                    "No unresulted lab order item found; create a lab order first".to_string(),
                )
            })?;
            values.insert("lab_order_item_id".to_string(), Value::from(item_id));
        }
        "bed_assignment" if has_column(columns, "bed_id") && has_column(columns, "start_at") => {
            let start = now + Duration::hours(1);
            let end = start + Duration::days(1);
            let start_text = start.format("%Y-%m-%d %H:%M:%S").to_string();
            let end_text = end.format("%Y-%m-%d %H:%M:%S").to_string();

            let bed: Option<(i64,)> = sqlx::query_as(
                "SELECT CAST(b.bed_id AS SIGNED) FROM bed b \
                 WHERE NOT EXISTS ( \
                   SELECT 1 FROM bed_assignment a \
                   WHERE a.bed_id = b.bed_id \
                     AND a.start_at < ? \
                     AND (a.end_at IS NULL OR a.end_at > ?)) \
                 ORDER BY RAND() \
                 LIMIT 1",
            )
            .bind(&end_text)
            .bind(&start_text)
            .fetch_optional(&mut *conn)
            .await?;
            let (bed_id,) = bed.ok_or_else(|| {
                Error::ExampleUnavailable(
                    "No bed is free for the example window; release a bed assignment first".to_string(),
                )
            })?;

            values.insert("bed_id".to_string(), Value::from(bed_id));
            values.insert("start_at".to_string(), Value::String(start_text));
            if has_column(columns, "end_at") {
                values.insert("end_at".to_string(), Value::String(end_text));
            }
        }
        _ => {}
    }

    Ok(values)
}

async fn random_reference(conn: &mut MySqlConnection, fk: &ForeignKey) -> Result<Option<Value>> {
    let table = sql::require(&fk.ref_table, "referenced table")?;
    let column = sql::require(&fk.ref_column, "referenced column")?;
    let statement = format!(
        "SELECT {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY RAND() LIMIT 1",
        col = sql::quote(&column),
        table = sql::quote(&table),
    );
    let row = sqlx::query(&statement).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(sql::row_to_json).and_then(|r| r.get(&column).cloned()))
}

/// Build a plausible insertable row for the authorized object
pub async fn synthesize(
    conn: &mut MySqlConnection,
    catalog: &SchemaCatalog,
    grant: &Authorized<Insert>,
) -> Result<JsonRow> {
    let object = grant.object_name();
    let columns = catalog.columns_of(&mut *conn, object).await?;
    let foreign_keys = catalog.foreign_keys_of(&mut *conn, object).await?;
    let unique_columns = catalog.unique_columns_of(&mut *conn, object).await?;

    let sample = sqlx::query(&format!("SELECT * FROM {} LIMIT 1", sql::quote(object)))
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(sql::row_to_json);

    let ctx = SynthContext::new(&foreign_keys, &unique_columns, sample.as_ref());
    let overrides = object_overrides(&mut *conn, object, &columns, ctx.now).await?;

    let mut example = JsonRow::new();
    for column in &columns {
        if column.is_auto_generated() {
            continue;
        }
        if let Some(value) = overrides.get(&column.name) {
            example.insert(column.name.clone(), value.clone());
            continue;
        }
        match ctx.column(column) {
            ColumnSynth::Skip => {}
            ColumnSynth::Value(value) => {
                example.insert(column.name.clone(), value);
            }
            ColumnSynth::ForeignKey(fk) => {
                let value = match random_reference(&mut *conn, &fk).await? {
                    Some(value) => value,
                    None => ctx.sample_value(&column.name).cloned().unwrap_or(Value::Null),
                };
                example.insert(column.name.clone(), value);
            }
        }
    }

    log::debug!("Synthesized example for '{}' with {} column(s)", object, example.len());
    Ok(example)
}
