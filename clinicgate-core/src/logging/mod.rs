//! Structured logging behind the `log` facade
//!
//! Install once at startup with [`init_logging`], then use the standard
//! macros (`log::info!`, `log::warn!`, ...) anywhere.
//!
//! ```rust,no_run
//! use clinicgate_core::config::LoggingConfig;
//!
//! clinicgate_core::logging::init_logging(&LoggingConfig::default()).unwrap();
//! log::info!("Console listening on {}", "127.0.0.1:3000");
//! ```

pub mod formatter;

pub use formatter::{LogEntry, LogFormat};

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, Once, PoisonError};

use anyhow::{anyhow, Context};
use serde_json::Value;

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Install the global logger; later calls are no-ops
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let mut outcome = Ok(());
    INIT.call_once(|| {
        outcome = init_logging_internal(config);
    });
    outcome
}

fn init_logging_internal(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = log::LevelFilter::from_str(&config.level)
        .map_err(|_| anyhow!("Invalid log level: {}", config.level))?;
    let format = LogFormat::from_str(&config.format).map_err(|e| anyhow!(e))?;

    let mut writers: Vec<Box<dyn LogWriter>> = vec![Box::new(StdoutWriter { format })];
    if let Some(path) = &config.file {
        writers.push(Box::new(FileWriter::open(path, format)?));
    }

    let mut context = BTreeMap::new();
    context.insert("service".to_string(), Value::String("clinicgate".to_string()));

    log::set_boxed_logger(Box::new(ConsoleLogger { level, writers, context }))?;
    log::set_max_level(level);
    Ok(())
}

struct ConsoleLogger {
    level: log::LevelFilter,
    writers: Vec<Box<dyn LogWriter>>,
    context: BTreeMap<String, Value>,
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record, &self.context);
        for writer in &self.writers {
            let _ = writer.write_log(&entry);
        }
    }

    fn flush(&self) {
        for writer in &self.writers {
            let _ = writer.flush();
        }
    }
}

trait LogWriter: Send + Sync {
    fn write_log(&self, entry: &LogEntry) -> anyhow::Result<()>;
    fn flush(&self) -> anyhow::Result<()>;
}

struct StdoutWriter {
    format: LogFormat,
}

impl LogWriter for StdoutWriter {
    fn write_log(&self, entry: &LogEntry) -> anyhow::Result<()> {
        println!("{}", self.format.format_entry(entry));
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Append-only file output
struct FileWriter {
    file: Mutex<File>,
    format: LogFormat,
}

impl FileWriter {
    fn open(path: &Path, format: LogFormat) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self { file: Mutex::new(file), format })
    }
}

impl LogWriter for FileWriter {
    fn write_log(&self, entry: &LogEntry) -> anyhow::Result<()> {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(file, "{}", self.format.format_entry(entry))?;
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        Ok(())
    }
}
