//! Dynamic row gateway
//!
//! Paginated read, single-row update and insert against any catalog object.
//! Entry points take an [`Authorized`] token instead of a bare name, so the
//! access policy has always run first. The database still enforces its own
//! role privileges underneath, because these run inside the role session.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlConnection;
use sqlx::Row;

use super::catalog::{ColumnInfo, SchemaCatalog};
use crate::rbac::{Authorized, Insert, Read, Write};
use crate::sql::{self, JsonRow};
use crate::{Error, Result};

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page: page.max(1), page_size: page_size.max(1) }
    }
}

/// `(limit, offset)` for a 1-based page
pub fn page_window(page: u32, page_size: u32) -> (u64, u64) {
    let page = u64::from(page.max(1));
    let size = u64::from(page_size.max(1));
    (size, (page - 1) * size)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    /// `None` when the count query failed
    pub total: Option<i64>,
}

/// One page of rows with the column metadata
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<JsonRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub inserted: u64,
    pub insert_id: Option<u64>,
}

/// `UPDATE` bounded to one row; every where column is matched by equality
pub fn build_update(object: &str, set_columns: &[&str], where_columns: &[&str]) -> String {
    let set_clause = set_columns
        .iter()
        .map(|c| format!("{} = ?", sql::quote(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let where_clause = where_columns
        .iter()
        .map(|c| format!("{} = ?", sql::quote(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("UPDATE {} SET {} WHERE {} LIMIT 1", sql::quote(object), set_clause, where_clause)
}

pub fn build_insert(object: &str, columns: &[&str]) -> String {
    let names = columns.iter().map(|c| sql::quote(c)).collect::<Vec<_>>().join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!("INSERT INTO {} ({}) VALUES ({})", sql::quote(object), names, placeholders)
}

/// Entries whose key is a real, sanitizable column of the object, in payload order
fn known_entries<'a>(payload: &'a JsonRow, columns: &HashSet<&str>) -> Vec<(&'a str, &'a Value)> {
    payload
        .iter()
        .filter(|(key, _)| columns.contains(key.as_str()) && sql::sanitize(key).is_some())
        .map(|(key, value)| (key.as_str(), value))
        .collect()
}

pub async fn read_page(
    conn: &mut MySqlConnection,
    catalog: &SchemaCatalog,
    grant: &Authorized<Read>,
    request: PageRequest,
) -> Result<Page> {
    let object = grant.object_name();
    let columns = catalog.columns_of(&mut *conn, object).await?;

    let (limit, offset) = page_window(request.page, request.page_size);
    let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT ? OFFSET ?", sql::quote(object)))
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
    let rows = rows.iter().map(sql::row_to_json).collect();

    let total = match sqlx::query(&format!("SELECT COUNT(*) AS total FROM {}", sql::quote(object)))
        .fetch_one(&mut *conn)
        .await
        .and_then(|row| row.try_get::<i64, _>("total"))
    {
        Ok(total) => Some(total),
        Err(e) => {
            log::warn!("Row count for '{}' unavailable: {}", object, e);
            None
        }
    };

    Ok(Page {
        columns,
        rows,
        pagination: Pagination { page: request.page, page_size: request.page_size, total },
    })
}

/// Update at most one row; returns the affected count (0 or 1)
pub async fn update_row(
    conn: &mut MySqlConnection,
    catalog: &SchemaCatalog,
    grant: &Authorized<Write>,
    data: &JsonRow,
    conditions: &JsonRow,
) -> Result<u64> {
    let object = grant.object_name();
    let columns = catalog.columns_of(&mut *conn, object).await?;
    let names: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();

    let set = known_entries(data, &names);
    let matches = known_entries(conditions, &names);
    if set.is_empty() {
        return Err(Error::InvalidInput("No valid columns to update".to_string()));
    }
    if matches.is_empty() {
        return Err(Error::InvalidInput("No valid conditions supplied".to_string()));
    }

    let set_columns: Vec<&str> = set.iter().map(|(c, _)| *c).collect();
    let where_columns: Vec<&str> = matches.iter().map(|(c, _)| *c).collect();
    let statement = build_update(object, &set_columns, &where_columns);

    let query = sql::bind_all(sqlx::query(&statement), set.iter().map(|(_, v)| *v));
    let query = sql::bind_all(query, matches.iter().map(|(_, v)| *v));
    let result = query.execute(&mut *conn).await?;

    log::info!("Updated {} row(s) in '{}' as role '{}'", result.rows_affected(), object, grant.role());
    Ok(result.rows_affected())
}

pub async fn insert_row(
    conn: &mut MySqlConnection,
    catalog: &SchemaCatalog,
    grant: &Authorized<Insert>,
    data: &JsonRow,
) -> Result<InsertOutcome> {
    let object = grant.object_name();
    let columns = catalog.columns_of(&mut *conn, object).await?;
    let names: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();

    let values = known_entries(data, &names);
    if values.is_empty() {
        return Err(Error::InvalidInput("No valid columns to insert".to_string()));
    }

    let insert_columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
    let statement = build_insert(object, &insert_columns);
    let result = sql::bind_all(sqlx::query(&statement), values.iter().map(|(_, v)| *v))
        .execute(&mut *conn)
        .await?;

    let insert_id = Some(result.last_insert_id()).filter(|id| *id != 0);
    log::info!("Inserted into '{}' as role '{}' (id {:?})", object, grant.role(), insert_id);
    Ok(InsertOutcome { inserted: result.rows_affected(), insert_id })
}
