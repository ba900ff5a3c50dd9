//! MySQL access: pool, role sessions, catalog, row gateway, example synthesis

mod catalog;
mod gateway;
mod session;
mod synth;

use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};

pub use catalog::{
    parse_enum_values, single_column_uniques, ColumnInfo, ForeignKey, KeyRole, ObjectCatalog,
    ObjectKind, SchemaCatalog, SchemaObject, StaticCatalog,
};
pub use gateway::{
    build_insert, build_update, insert_row, page_window, read_page, update_row, InsertOutcome,
    Page, PageRequest, Pagination,
};
pub use session::{grant_hint, RoleSessions};
pub use synth::{synthesize, unique_suffix, ColumnSynth, SynthContext};

use crate::config::DatabaseConfig;
use crate::Result;

fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .charset("utf8mb4")
}

fn pool_options(config: &DatabaseConfig) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .after_release(|conn, _meta| {
            Box::pin(async move {
                // a dropped session may not have reached its own reset
                sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(session::RESET_SESSION_SQL)).await?;
                Ok(true)
            })
        })
}

/// Open the pool and verify the database is reachable
pub async fn connect(config: &DatabaseConfig) -> Result<MySqlPool> {
    let pool = pool_options(config).connect_with(connect_options(config)).await?;
    log::info!(
        "Connected to MySQL {}:{}/{} as '{}' (max {} connections)",
        config.host,
        config.port,
        config.name,
        config.user,
        config.max_connections
    );
    Ok(pool)
}

/// Pool that connects on first use
pub fn connect_lazy(config: &DatabaseConfig) -> MySqlPool {
    pool_options(config).connect_lazy_with(connect_options(config))
}
