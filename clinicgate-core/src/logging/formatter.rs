//! Log entries and their output formats

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::Value;

/// A structured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: log::Level,
    pub message: String,
    /// Usually the module path
    pub target: String,
    /// Context fields added to every entry (`service=clinicgate`, ...)
    pub fields: BTreeMap<String, Value>,
}

impl LogEntry {
    pub fn new(level: log::Level, message: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
            target: target.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn from_record(record: &log::Record, context: &BTreeMap<String, Value>) -> Self {
        let mut entry = Self::new(record.level(), record.args().to_string(), record.target());
        entry.fields = context.clone();
        entry
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// How entries are rendered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// `{"timestamp":"…","level":"INFO","message":"…","target":"…","service":"clinicgate"}`
    Json,
    /// `2024-01-15 10:30:00.000 INFO  [clinicgate_core::app] message service=clinicgate`
    Human,
    /// `timestamp=… level=INFO target=… message="…" service="clinicgate"`
    Logfmt,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "human" => Ok(LogFormat::Human),
            "logfmt" => Ok(LogFormat::Logfmt),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl LogFormat {
    pub fn format_entry(&self, entry: &LogEntry) -> String {
        match self {
            LogFormat::Json => format_json(entry),
            LogFormat::Human => format_human(entry),
            LogFormat::Logfmt => format_logfmt(entry),
        }
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn format_json(entry: &LogEntry) -> String {
    let mut json = serde_json::Map::new();
    json.insert("timestamp".to_string(), Value::String(entry.timestamp.to_rfc3339()));
    json.insert("level".to_string(), Value::String(entry.level.to_string()));
    json.insert("message".to_string(), Value::String(entry.message.clone()));
    json.insert("target".to_string(), Value::String(entry.target.clone()));
    for (key, value) in &entry.fields {
        json.insert(key.clone(), value.clone());
    }
    serde_json::to_string(&json).unwrap_or_else(|_| "Failed to serialize log entry".to_string())
}

fn format_human(entry: &LogEntry) -> String {
    let mut line = format!(
        "{} {:5} [{}] {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        entry.level.to_string(),
        entry.target,
        entry.message
    );
    for (key, value) in &entry.fields {
        line.push_str(&format!(" {}={}", key, plain(value)));
    }
    line
}

fn format_logfmt(entry: &LogEntry) -> String {
    let mut parts = vec![
        format!("timestamp={}", entry.timestamp.to_rfc3339()),
        format!("level={}", entry.level),
        format!("target={}", entry.target),
        format!("message={}", quoted(&entry.message)),
    ];
    for (key, value) in &entry.fields {
        let rendered = match value {
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => quoted(&plain(other)),
        };
        parts.push(format!("{}={}", key, rendered));
    }
    parts.join(" ")
}
