//! Schema catalog introspected from `information_schema`
//!
//! The object list is loaded once per process and cached; column, key and
//! uniqueness metadata are fetched per call because they accompany live data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySql, MySqlPool, MySqlRow};
use sqlx::{Executor, Row};
use tokio::sync::OnceCell;

use crate::Result;

/// Table or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    #[serde(rename = "BASE TABLE")]
    Table,
    #[serde(rename = "VIEW")]
    View,
}

impl ObjectKind {
    /// Anything that is not literally a view is a base table
    pub fn from_table_type(table_type: &str) -> Self {
        if table_type.trim().eq_ignore_ascii_case("VIEW") {
            ObjectKind::View
        } else {
            ObjectKind::Table
        }
    }
}

/// A table or view visible in the configured schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaObject {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub comment: String,
}

impl SchemaObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind, comment: impl Into<String>) -> Self {
        Self { name: name.into(), kind, comment: comment.into() }
    }
}

/// Key role of a column, from `COLUMN_KEY`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyRole {
    #[serde(rename = "PRI")]
    Primary,
    #[serde(rename = "UNI")]
    Unique,
    #[serde(rename = "")]
    None,
}

impl KeyRole {
    fn from_column_key(key: &str) -> Self {
        match key.trim().to_ascii_uppercase().as_str() {
            "PRI" => KeyRole::Primary,
            "UNI" => KeyRole::Unique,
            _ => KeyRole::None,
        }
    }
}

/// Column metadata in ordinal order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(rename = "columnKey")]
    pub key_role: KeyRole,
    #[serde(rename = "columnComment")]
    pub comment: String,
    pub default: Option<String>,
    pub max_length: Option<i64>,
    pub column_type: String,
    pub auto_increment: bool,
    /// Virtual/stored generated column; never written
    pub generated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl ColumnInfo {
    /// Columns the database fills in by itself
    pub fn is_auto_generated(&self) -> bool {
        self.auto_increment || self.generated
    }

    fn from_row(row: &MySqlRow) -> Result<Self> {
        let data_type: String = row.try_get("data_type")?;
        let column_type: String = row.try_get("column_type")?;
        let extra: Option<String> = row.try_get("extra")?;
        let extra = extra.unwrap_or_default().to_ascii_lowercase();
        let is_nullable: String = row.try_get("is_nullable")?;
        let column_key: Option<String> = row.try_get("column_key")?;

        Ok(Self {
            name: row.try_get("name")?,
            data_type: data_type.to_ascii_lowercase(),
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            key_role: KeyRole::from_column_key(column_key.as_deref().unwrap_or("")),
            comment: row.try_get::<Option<String>, _>("column_comment")?.unwrap_or_default(),
            default: row.try_get("column_default")?,
            max_length: row.try_get("max_length")?,
            enum_values: parse_enum_values(&column_type),
            column_type,
            auto_increment: extra.contains("auto_increment"),
            generated: extra.contains("generated") && !extra.contains("default_generated"),
        })
    }
}

/// Referenced side of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub ref_table: String,
    pub ref_column: String,
}

/// Members of an `enum('a','b')` / `set(...)` column type
pub fn parse_enum_values(column_type: &str) -> Vec<String> {
    let lower = column_type.trim_start().to_ascii_lowercase();
    let body = if lower.starts_with("enum(") || lower.starts_with("set(") {
        let start = column_type.find('(').map(|i| i + 1).unwrap_or(0);
        let end = column_type.rfind(')').unwrap_or(column_type.len());
        &column_type[start..end]
    } else {
        return Vec::new();
    };

    let mut values = Vec::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            continue;
        }
        let mut value = String::new();
        while let Some(c) = chars.next() {
            if c == '\'' {
                // '' is an escaped quote inside the literal
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                    continue;
                }
                break;
            }
            value.push(c);
        }
        values.push(value);
    }
    values
}

/// Columns covered by a single-column unique index (including the primary key)
pub fn single_column_uniques(index_columns: &[(String, String)]) -> BTreeSet<String> {
    let mut by_index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (index, column) in index_columns {
        by_index.entry(index.as_str()).or_default().push(column.as_str());
    }
    by_index
        .into_values()
        .filter(|cols| cols.len() == 1)
        .map(|cols| cols[0].to_string())
        .collect()
}

/// Source of the object list used by the access policy
#[async_trait]
pub trait ObjectCatalog: Send + Sync {
    /// Every table and view of the schema, ordered by name
    async fn list_objects(&self) -> Result<Arc<[SchemaObject]>>;

    async fn find_object(&self, name: &str) -> Result<Option<SchemaObject>> {
        Ok(self.list_objects().await?.iter().find(|o| o.name == name).cloned())
    }

    /// Forget cached metadata so the next call reloads it
    fn invalidate(&self) {}
}

/// Fixed object list, for offline tooling and tests
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    objects: Arc<[SchemaObject]>,
}

impl StaticCatalog {
    pub fn new(mut objects: Vec<SchemaObject>) -> Self {
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Self { objects: objects.into() }
    }
}

#[async_trait]
impl ObjectCatalog for StaticCatalog {
    async fn list_objects(&self) -> Result<Arc<[SchemaObject]>> {
        Ok(self.objects.clone())
    }
}

const LIST_OBJECTS_SQL: &str = "SELECT CAST(table_name AS CHAR) AS name, \
        CAST(table_type AS CHAR) AS table_type, \
        CAST(IFNULL(table_comment, '') AS CHAR) AS comment \
     FROM information_schema.tables \
     WHERE table_schema = ? \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT CAST(column_name AS CHAR) AS name, \
        CAST(data_type AS CHAR) AS data_type, \
        CAST(is_nullable AS CHAR) AS is_nullable, \
        CAST(column_key AS CHAR) AS column_key, \
        CAST(IFNULL(column_comment, '') AS CHAR) AS column_comment, \
        CAST(column_default AS CHAR) AS column_default, \
        CAST(character_maximum_length AS SIGNED) AS max_length, \
        CAST(column_type AS CHAR) AS column_type, \
        CAST(extra AS CHAR) AS extra \
     FROM information_schema.columns \
     WHERE table_schema = ? AND table_name = ? \
     ORDER BY ordinal_position";

const FOREIGN_KEYS_SQL: &str = "SELECT CAST(column_name AS CHAR) AS column_name, \
        CAST(referenced_table_name AS CHAR) AS ref_table, \
        CAST(referenced_column_name AS CHAR) AS ref_column \
     FROM information_schema.key_column_usage \
     WHERE table_schema = ? AND table_name = ? AND referenced_table_name IS NOT NULL";

const UNIQUE_INDEXES_SQL: &str = "SELECT CAST(index_name AS CHAR) AS index_name, \
        CAST(column_name AS CHAR) AS column_name \
     FROM information_schema.statistics \
     WHERE table_schema = ? AND table_name = ? AND non_unique = 0";

/// MySQL-backed catalog for one schema
pub struct SchemaCatalog {
    pool: MySqlPool,
    schema: String,
    objects: RwLock<Arc<OnceCell<Arc<[SchemaObject]>>>>,
}

impl SchemaCatalog {
    pub fn new(pool: MySqlPool, schema: impl Into<String>) -> Self {
        Self { pool, schema: schema.into(), objects: RwLock::new(Arc::new(OnceCell::new())) }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    async fn load_objects(&self) -> Result<Arc<[SchemaObject]>> {
        let rows = sqlx::query(LIST_OBJECTS_SQL).bind(&self.schema).fetch_all(&self.pool).await?;
        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            let table_type: String = row.try_get("table_type")?;
            objects.push(SchemaObject {
                name: row.try_get("name")?,
                kind: ObjectKind::from_table_type(&table_type),
                comment: row.try_get::<Option<String>, _>("comment")?.unwrap_or_default(),
            });
        }
        log::info!("Schema catalog loaded: {} object(s) in '{}'", objects.len(), self.schema);
        Ok(objects.into())
    }

    /// Ordered column metadata of `object`
    pub async fn columns_of<'e, E>(&self, executor: E, object: &str) -> Result<Vec<ColumnInfo>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let rows = sqlx::query(COLUMNS_SQL)
            .bind(&self.schema)
            .bind(object)
            .fetch_all(executor)
            .await?;
        rows.iter().map(ColumnInfo::from_row).collect()
    }

    /// Column -> referenced table/column
    pub async fn foreign_keys_of<'e, E>(
        &self,
        executor: E,
        object: &str,
    ) -> Result<BTreeMap<String, ForeignKey>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let rows = sqlx::query(FOREIGN_KEYS_SQL)
            .bind(&self.schema)
            .bind(object)
            .fetch_all(executor)
            .await?;
        let mut keys = BTreeMap::new();
        for row in &rows {
            keys.insert(
                row.try_get::<String, _>("column_name")?,
                ForeignKey { ref_table: row.try_get("ref_table")?, ref_column: row.try_get("ref_column")? },
            );
        }
        Ok(keys)
    }

    /// Columns that must hold distinct values on their own
    pub async fn unique_columns_of<'e, E>(&self, executor: E, object: &str) -> Result<BTreeSet<String>>
    where
        E: Executor<'e, Database = MySql>,
    {
        let rows = sqlx::query(UNIQUE_INDEXES_SQL)
            .bind(&self.schema)
            .bind(object)
            .fetch_all(executor)
            .await?;
        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            pairs.push((row.try_get::<String, _>("index_name")?, row.try_get::<String, _>("column_name")?));
        }
        Ok(single_column_uniques(&pairs))
    }
}

#[async_trait]
impl ObjectCatalog for SchemaCatalog {
    async fn list_objects(&self) -> Result<Arc<[SchemaObject]>> {
        let cell = self.objects.read().unwrap_or_else(PoisonError::into_inner).clone();
        let objects = cell.get_or_try_init(|| self.load_objects()).await?;
        Ok(objects.clone())
    }

    fn invalidate(&self) {
        *self.objects.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new());
        log::info!("Schema catalog cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_normalization() {
        assert_eq!(ObjectKind::from_table_type("VIEW"), ObjectKind::View);
        assert_eq!(ObjectKind::from_table_type("view"), ObjectKind::View);
        assert_eq!(ObjectKind::from_table_type("BASE TABLE"), ObjectKind::Table);
        assert_eq!(ObjectKind::from_table_type("SYSTEM VIEW"), ObjectKind::Table);
    }

    #[test]
    fn test_kind_serializes_catalog_names() {
        let obj = SchemaObject::new("patient", ObjectKind::Table, "患者信息表");
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "BASE TABLE");
        assert_eq!(json["name"], "patient");
    }

    #[test]
    fn test_parse_enum_values() {
        assert_eq!(parse_enum_values("enum('M','F','U')"), vec!["M", "F", "U"]);
        assert_eq!(parse_enum_values("ENUM('it''s','x')"), vec!["it's", "x"]);
        assert_eq!(parse_enum_values("set('a','b')"), vec!["a", "b"]);
        assert!(parse_enum_values("varchar(32)").is_empty());
    }

    #[test]
    fn test_single_column_uniques() {
        let pairs = vec![
            ("PRIMARY".to_string(), "patient_id".to_string()),
            ("uk_patient_no".to_string(), "patient_no".to_string()),
            ("uk_pair".to_string(), "a".to_string()),
            ("uk_pair".to_string(), "b".to_string()),
        ];
        let uniques = single_column_uniques(&pairs);
        assert!(uniques.contains("patient_id"));
        assert!(uniques.contains("patient_no"));
        assert!(!uniques.contains("a"));
        assert_eq!(uniques.len(), 2);
    }

    #[tokio::test]
    async fn test_static_catalog_sorted_lookup() {
        let catalog = StaticCatalog::new(vec![
            SchemaObject::new("v_lab_worklist", ObjectKind::View, ""),
            SchemaObject::new("bed", ObjectKind::Table, "床位"),
        ]);
        let objects = catalog.list_objects().await.unwrap();
        assert_eq!(objects[0].name, "bed");
        assert!(catalog.find_object("v_lab_worklist").await.unwrap().is_some());
        assert!(catalog.find_object("missing").await.unwrap().is_none());
    }
}
