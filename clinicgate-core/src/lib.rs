//! ClinicGate - Core
//!
//! A role-scoped console over a clinic information system's MySQL schema.
//!
//! # Overview
//!
//! Every request acts as an application role. The role's privileges are read
//! from the database's own grant script, so the console shows (and lets the
//! caller touch) exactly what the database would allow that role to do. Each
//! data operation runs inside one transaction that first switches to the
//! matching database role, so the database enforces the same rules again.
//!
//! # Architecture
//!
//! - [`sql`] - Identifier sanitizer and JSON value binding
//! - [`rbac`] - Privilege table, display names, access policy and capability tokens
//! - [`db`] - Connection pool, role sessions, schema catalog, row gateway, example synthesis
//! - [`routines`] - Stored-procedure registry and invoker
//! - [`app`] - HTTP server (`ConsoleServer`)
//! - [`config`] - Layered TOML + environment configuration
//! - [`logging`] - Structured logger behind the `log` facade
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use clinicgate_core::app::ConsoleServer;
//! use clinicgate_core::config::ConsoleConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConsoleConfig::load()?;
//!     config.validate()?;
//!     ConsoleServer::connect(config).await?.serve().await
//! }
//! ```

pub mod app;
pub mod config;
pub mod db;
pub mod logging;
pub mod rbac;
pub mod routines;
pub mod sql;

pub use app::ConsoleServer;
pub use config::ConsoleConfig;

use http::StatusCode;

/// Main result type
pub type Result<T> = std::result::Result<T, Error>;

/// What kind of operation an error came out of
///
/// Database failures are 500 on reads and 400 on mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Mutation,
}

/// Domain error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidIdentifier(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Unknown routine: {0}")]
    UnknownRoutine(String),
    /// No data to build an example from; the message says what to create first
    #[error("{0}")]
    ExampleUnavailable(String),
    #[error("Failed to switch to database role '{role}': {source}. {hint}")]
    RoleSwitch {
        role: String,
        #[source]
        source: sqlx::Error,
        hint: String,
    },
    #[error("Grant source error: {0}")]
    GrantSource(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn status(&self, operation: Operation) -> StatusCode {
        match self {
            Error::InvalidIdentifier(_)
            | Error::InvalidInput(_)
            | Error::UnknownRoutine(_)
            | Error::ExampleUnavailable(_)
            | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RoleSwitch { .. } | Error::Database(_) => match operation {
                Operation::Read => StatusCode::INTERNAL_SERVER_ERROR,
                Operation::Mutation => StatusCode::BAD_REQUEST,
            },
            Error::GrantSource(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable snake_case code for error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidIdentifier(_) => "invalid_identifier",
            Error::InvalidInput(_) => "invalid_input",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::UnknownRoutine(_) => "unknown_routine",
            Error::ExampleUnavailable(_) => "example_unavailable",
            Error::RoleSwitch { .. } => "role_switch_failed",
            Error::GrantSource(_) => "grant_source",
            Error::Database(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "invalid_json",
        }
    }
}
