//! Routine invocation
//!
//! Parameters are validated against the definition before any database work.
//! A call is then one role session: reset the output variables, `CALL` with
//! bound inputs followed by `@output` placeholders, collect the result sets,
//! and read the outputs back with a `SELECT`.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlConnection;
use sqlx::Either;
use sqlx::Executor;

use super::{ParamSpec, ParamType, RoutineDefinition, RoutineRegistry};
use crate::db::RoleSessions;
use crate::rbac::AccessContext;
use crate::sql::{self, JsonRow};
use crate::{Error, Result};

/// Coerce one raw argument according to its type hint
///
/// Missing values and empty strings become NULL; required checks happen after.
pub fn normalize_param(spec: &ParamSpec, raw: Option<&Value>) -> Result<Value> {
    let value = match raw {
        None | Some(Value::Null) => return Ok(Value::Null),
        Some(value) => value,
    };

    match spec.param_type {
        ParamType::Text => Ok(value.clone()),
        ParamType::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            other => sql::scalar_number(other)
                .filter(|_| !other.is_boolean())
                .map(sql::number_value)
                .ok_or_else(|| Error::InvalidInput(format!("Parameter {} must be a number", spec.label))),
        },
        ParamType::Date => match value {
            Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| {
                    Error::InvalidInput(format!("Parameter {} must be a date (YYYY-MM-DD)", spec.label))
                }),
            _ => Err(Error::InvalidInput(format!("Parameter {} must be a date (YYYY-MM-DD)", spec.label))),
        },
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A validated call, ready to run
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub routine: String,
    /// Input values in declaration order
    pub args: Vec<Value>,
    pub outputs: Vec<String>,
}

impl PreparedCall {
    /// Validate `payload` against the definition
    pub fn new(definition: &RoutineDefinition, payload: &JsonRow) -> Result<Self> {
        let mut args = Vec::with_capacity(definition.params.len());
        for spec in &definition.params {
            let value = normalize_param(spec, payload.get(&spec.name))?;
            if spec.required && is_blank(&value) {
                return Err(Error::InvalidInput(format!("Parameter {} is required", spec.label)));
            }
            args.push(value);
        }

        Ok(Self {
            routine: definition.name.clone(),
            args,
            outputs: definition.outputs.iter().map(|o| o.name.clone()).collect(),
        })
    }

    /// `SET @o_a = NULL, ...`, so a pooled connection cannot leak old outputs
    pub fn reset_sql(&self) -> Option<String> {
        if self.outputs.is_empty() {
            return None;
        }
        let assignments: Vec<String> = self.outputs.iter().map(|o| format!("@{} = NULL", o)).collect();
        Some(format!("SET {}", assignments.join(", ")))
    }

    pub fn call_sql(&self) -> String {
        let placeholders: Vec<String> = self
            .args
            .iter()
            .map(|_| "?".to_string())
            .chain(self.outputs.iter().map(|o| format!("@{}", o)))
            .collect();
        format!("CALL {}({})", sql::quote(&self.routine), placeholders.join(", "))
    }

    pub fn select_outputs_sql(&self) -> Option<String> {
        if self.outputs.is_empty() {
            return None;
        }
        let columns: Vec<String> = self.outputs.iter().map(|o| format!("@{} AS {}", o, sql::quote(o))).collect();
        Some(format!("SELECT {}", columns.join(", ")))
    }
}

/// Named outputs plus every non-empty result set, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineOutcome {
    pub routine: String,
    pub outputs: JsonRow,
    pub result_sets: Vec<Vec<JsonRow>>,
}

async fn run_call(conn: &mut MySqlConnection, call: PreparedCall) -> Result<RoutineOutcome> {
    if let Some(reset) = call.reset_sql() {
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&reset)).await?;
    }

    let call_sql = call.call_sql();
    let mut result_sets = Vec::new();
    {
        let query = sql::bind_all(sqlx::query(&call_sql), call.args.iter());
        let mut stream = (&mut *conn).fetch_many(query);
        let mut current = Vec::new();
        while let Some(step) = stream.try_next().await? {
            match step {
                // end of one result set (or the call's own status)
                Either::Left(_) => {
                    if !current.is_empty() {
                        result_sets.push(std::mem::take(&mut current));
                    }
                }
                Either::Right(row) => current.push(sql::row_to_json(&row)),
            }
        }
        if !current.is_empty() {
            result_sets.push(current);
        }
    }

    let outputs = match call.select_outputs_sql() {
        Some(select) => sqlx::query(&select)
            .fetch_optional(&mut *conn)
            .await?
            .map(|row| sql::row_to_json(&row))
            .unwrap_or_default(),
        None => JsonRow::new(),
    };

    Ok(RoutineOutcome { routine: call.routine, outputs, result_sets })
}

/// Lists, prepares and executes registered routines
#[derive(Clone)]
pub struct RoutineInvoker {
    registry: Arc<RoutineRegistry>,
    sessions: RoleSessions,
}

impl RoutineInvoker {
    pub fn new(registry: Arc<RoutineRegistry>, sessions: RoleSessions) -> Self {
        Self { registry, sessions }
    }

    pub fn list(&self) -> &[RoutineDefinition] {
        self.registry.list()
    }

    /// Lookup and validation only; never touches the database
    pub fn prepare(&self, name: &str, payload: &JsonRow) -> Result<PreparedCall> {
        PreparedCall::new(self.registry.require(name)?, payload)
    }

    /// Example arguments, from the routine's builder when it has one
    pub async fn build_example(&self, name: &str, ctx: &AccessContext) -> Result<JsonRow> {
        let definition = self.registry.require(name)?;
        let Some(builder) = definition.example.clone() else {
            return Ok(definition.placeholder_example());
        };

        self.sessions
            .with_role(&ctx.role, ctx.username(), move |conn| {
                Box::pin(async move { builder.build(conn).await })
            })
            .await
    }

    pub async fn execute(&self, name: &str, ctx: &AccessContext, payload: &JsonRow) -> Result<RoutineOutcome> {
        let call = self.prepare(name, payload)?;
        log::info!("Executing {} as role '{}' ({} arg(s))", call.routine, ctx.role, call.args.len());

        self.sessions
            .with_role(&ctx.role, ctx.username(), move |conn| Box::pin(run_call(conn, call)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> JsonRow {
        value.as_object().cloned().unwrap_or_default()
    }

    fn registry() -> RoutineRegistry {
        RoutineRegistry::builtin()
    }

    #[test]
    fn test_patient_create_with_name_only() {
        let registry = registry();
        let def = registry.require("sp_patient_create").unwrap();
        let call = PreparedCall::new(def, &payload(json!({"p_patient_name": "李雷", "p_gender": "F"}))).unwrap();
        assert_eq!(call.args.len(), 10);
        assert_eq!(call.args[0], json!("李雷"));
        assert_eq!(call.args[1], json!("F"));
        assert!(call.args[2..].iter().all(Value::is_null));
        assert_eq!(call.outputs, vec!["o_patient_id", "o_patient_no"]);
    }

    #[test]
    fn test_patient_birth_date_passes_through_as_text() {
        let registry = registry();
        let def = registry.require("sp_patient_create").unwrap();
        let call = PreparedCall::new(
            def,
            &payload(json!({"p_patient_name": "韩梅梅", "p_birth_date": "1995/05/20"})),
        )
        .unwrap();
        assert_eq!(call.args[2], json!("1995/05/20"));
    }

    #[test]
    fn test_required_parameter_missing() {
        let registry = registry();
        let def = registry.require("sp_patient_create").unwrap();
        let err = PreparedCall::new(def, &payload(json!({"p_patient_name": ""}))).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("患者姓名")));
    }

    #[test]
    fn test_numeric_parameter_coercion() {
        let registry = registry();
        let def = registry.require("sp_payment_create").unwrap();

        let call = PreparedCall::new(def, &payload(json!({"p_invoice_id": "12", "p_amount": "30.5"}))).unwrap();
        assert_eq!(call.args[0], json!(12));
        assert_eq!(call.args[2], json!(30.5));

        let err = PreparedCall::new(def, &payload(json!({"p_invoice_id": "abc", "p_amount": 1}))).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("发票ID") && m.contains("number")));

        // an empty number is absent, so the required check reports it
        let err = PreparedCall::new(def, &payload(json!({"p_invoice_id": " ", "p_amount": 1}))).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("required")));
    }

    #[test]
    fn test_date_parameter_format() {
        let spec = ParamSpec::date("p_start_date", "开始日期");
        assert_eq!(normalize_param(&spec, Some(&json!("2024-03-01"))).unwrap(), json!("2024-03-01"));
        assert_eq!(normalize_param(&spec, Some(&json!(""))).unwrap(), Value::Null);
        assert!(normalize_param(&spec, Some(&json!("03/01/2024"))).is_err());
        assert!(normalize_param(&spec, Some(&json!(20240301))).is_err());
    }

    #[test]
    fn test_call_statements() {
        let registry = registry();
        let def = registry.require("sp_invoice_void").unwrap();
        let call = PreparedCall::new(def, &payload(json!({"p_invoice_id": 7}))).unwrap();
        assert_eq!(call.call_sql(), "CALL `sp_invoice_void`(?, ?, @o_detached_count)");
        assert_eq!(call.reset_sql().unwrap(), "SET @o_detached_count = NULL");
        assert_eq!(call.select_outputs_sql().unwrap(), "SELECT @o_detached_count AS `o_detached_count`");

        let def = registry.require("sp_patient_update_contact").unwrap();
        let call = PreparedCall::new(def, &payload(json!({"p_patient_id": 1}))).unwrap();
        assert!(call.reset_sql().is_none());
        assert!(call.select_outputs_sql().is_none());
        assert_eq!(call.call_sql(), "CALL `sp_patient_update_contact`(?, ?, ?, ?, ?)");
    }

    #[tokio::test]
    async fn test_unknown_routine_fails_before_database() {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .connect_lazy("mysql://nobody@127.0.0.1:9/none")
            .unwrap();
        let sessions = RoleSessions::new(pool, crate::rbac::RoleSpec::default(), String::new());
        let invoker = RoutineInvoker::new(Arc::new(registry()), sessions);
        let ctx = AccessContext::new(&crate::rbac::RoleSpec::default(), None, None);

        let err = invoker.execute("unknown_sp", &ctx, &JsonRow::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownRoutine(_)));
        let err = invoker.build_example("unknown_sp", &ctx).await.unwrap_err();
        assert!(matches!(err, Error::UnknownRoutine(_)));
    }
}
