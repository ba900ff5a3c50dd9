//! Stored-procedure registry and invoker
//!
//! Routines are declared once at startup: a calling contract (inputs and
//! outputs) plus an optional [`ExampleBuilder`] that looks at live data to
//! propose realistic arguments. New routines are added by registering another
//! definition; nothing dispatches on routine names.

mod builtin;
mod invoker;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::MySqlConnection;

pub use builtin::{
    ActivePatientContact, EncounterWithUnbilledCharges, PayableInvoice, RandomPatientProfile,
    RefundablePayment, RegistrationCandidate, TrailingDateRange, VoidableInvoice,
};
pub use invoker::{normalize_param, PreparedCall, RoutineInvoker, RoutineOutcome};

use crate::sql::{self, JsonRow};
use crate::{Error, Result};

/// Input type hint; drives coercion before the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Text,
    Number,
    /// `YYYY-MM-DD`
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub label: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl ParamSpec {
    fn new(name: &str, label: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            required: false,
            param_type,
            placeholder: None,
        }
    }

    pub fn text(name: &str, label: &str) -> Self {
        Self::new(name, label, ParamType::Text)
    }

    pub fn number(name: &str, label: &str) -> Self {
        Self::new(name, label, ParamType::Number)
    }

    pub fn date(name: &str, label: &str) -> Self {
        Self::new(name, label, ParamType::Date).placeholder("YYYY-MM-DD")
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSpec {
    pub name: String,
    pub label: String,
}

impl OutputSpec {
    pub fn new(name: &str, label: &str) -> Self {
        Self { name: name.to_string(), label: label.to_string() }
    }
}

/// Proposes example arguments for a routine from live data
///
/// Runs inside the caller's role session. A builder that finds no usable
/// candidate returns [`Error::ExampleUnavailable`] saying what to create first.
#[async_trait]
pub trait ExampleBuilder: Send + Sync {
    async fn build(&self, conn: &mut MySqlConnection) -> Result<JsonRow>;
}

/// Calling contract of one stored procedure
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineDefinition {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub outputs: Vec<OutputSpec>,
    #[serde(skip)]
    pub example: Option<Arc<dyn ExampleBuilder>>,
}

impl fmt::Debug for RoutineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutineDefinition")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("outputs", &self.outputs.len())
            .field("example", &self.example.is_some())
            .finish()
    }
}

impl RoutineDefinition {
    pub fn new(name: &str, display_name: &str, category: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            params: Vec::new(),
            outputs: Vec::new(),
            example: None,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn output(mut self, name: &str, label: &str) -> Self {
        self.outputs.push(OutputSpec::new(name, label));
        self
    }

    pub fn example(mut self, builder: impl ExampleBuilder + 'static) -> Self {
        self.example = Some(Arc::new(builder));
        self
    }

    /// Placeholder arguments for routines without a builder
    pub fn placeholder_example(&self) -> JsonRow {
        self.params
            .iter()
            .map(|p| {
                let value = if p.required {
                    Value::String(p.placeholder.clone().unwrap_or_default())
                } else {
                    Value::Null
                };
                (p.name.clone(), value)
            })
            .collect()
    }

    /// Every name that ends up as SQL text must pass the sanitizer
    fn check_identifiers(&self) -> Result<()> {
        sql::require(&self.name, "routine name")?;
        for p in &self.params {
            sql::require(&p.name, "parameter name")?;
        }
        for o in &self.outputs {
            sql::require(&o.name, "output name")?;
        }
        Ok(())
    }
}

/// Name-keyed routine table, in declaration order
#[derive(Debug, Clone, Default)]
pub struct RoutineRegistry {
    routines: Vec<RoutineDefinition>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the clinic's stored procedures
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for definition in builtin::definitions() {
            // builtin names are static and valid
            if let Err(e) = registry.register(definition) {
                log::error!("Skipping builtin routine: {}", e);
            }
        }
        registry
    }

    /// Add a routine, replacing any previous one with the same name
    pub fn register(&mut self, definition: RoutineDefinition) -> Result<()> {
        definition.check_identifiers()?;
        match self.routines.iter_mut().find(|r| r.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.routines.push(definition),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RoutineDefinition> {
        let name = sql::sanitize(name)?;
        self.routines.iter().find(|r| r.name == name)
    }

    /// Lookup that fails with [`Error::UnknownRoutine`]
    pub fn require(&self, name: &str) -> Result<&RoutineDefinition> {
        self.get(name).ok_or_else(|| Error::UnknownRoutine(name.to_string()))
    }

    pub fn list(&self) -> &[RoutineDefinition] {
        &self.routines
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_registry() {
        let registry = RoutineRegistry::builtin();
        assert_eq!(registry.len(), 11);
        assert!(registry.get("sp_patient_create").is_some());
        assert!(registry.get("unknown_sp").is_none());
        assert!(registry.get("sp_patient_create; DROP").is_none());
        assert!(registry.list().iter().all(|r| r.example.is_some()));
    }

    #[test]
    fn test_register_rejects_bad_identifiers() {
        let mut registry = RoutineRegistry::new();
        let bad = RoutineDefinition::new("sp_x", "x", "c", "d").output("o bad", "label");
        assert!(matches!(registry.register(bad), Err(Error::InvalidIdentifier(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut registry = RoutineRegistry::new();
        registry.register(RoutineDefinition::new("sp_a", "first", "c", "d")).unwrap();
        registry.register(RoutineDefinition::new("sp_a", "second", "c", "d")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.require("sp_a").unwrap().display_name, "second");
        assert!(matches!(registry.require("sp_b"), Err(Error::UnknownRoutine(_))));
    }

    #[test]
    fn test_definition_serialization_hides_builder() {
        let registry = RoutineRegistry::builtin();
        let json = serde_json::to_value(registry.require("sp_stats_billing_trend").unwrap()).unwrap();
        assert_eq!(json["displayName"], "收费日报（游标）");
        assert_eq!(json["params"][0]["type"], "date");
        assert_eq!(json["outputs"][1], json!({"name": "o_total_net_payment", "label": "净收款汇总"}));
        assert!(json.get("example").is_none());
    }

    #[test]
    fn test_placeholder_example() {
        let def = RoutineDefinition::new("sp_a", "a", "c", "d")
            .param(ParamSpec::text("p_name", "名称").required().placeholder("李雷"))
            .param(ParamSpec::number("p_age", "年龄"));
        let example = def.placeholder_example();
        assert_eq!(example["p_name"], json!("李雷"));
        assert_eq!(example["p_age"], Value::Null);
    }
}
