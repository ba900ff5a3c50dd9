//! Console HTTP server
//!
//! `ConsoleServer` wires the access policy, role sessions and routine invoker
//! behind a small JSON API served by hyper.
//!
//! # Example
//!
//! ```rust,no_run
//! use clinicgate_core::app::ConsoleServer;
//! use clinicgate_core::config::ConsoleConfig;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ConsoleConfig::load()?;
//! ConsoleServer::connect(config).await?.serve().await
//! # }
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/health` | liveness |
//! | GET | `/api/roles` | roles in the privilege table |
//! | GET | `/api/menu?role=` | objects visible to the role |
//! | GET / PUT / POST | `/api/objects/{name}?role=` | read page, update one row, insert |
//! | GET | `/api/objects/{name}/example?role=` | synthesized insert example |
//! | GET | `/api/routines` | routine definitions |
//! | GET | `/api/routines/{name}/example?role=` | example parameters |
//! | POST | `/api/routines/{name}/execute?role=` | call the routine |
//! | POST | `/api/admin/reload` | drop cached grants and catalog |

mod handlers;
pub mod request;
pub mod response;

pub use request::ApiRequest;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bytes::Bytes;
use http::header::HeaderValue;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{Request, Response};
use sqlx::mysql::MySqlPool;

use crate::config::{ConsoleConfig, ServerConfig};
use crate::db::{self, grant_hint, ObjectCatalog, RoleSessions, SchemaCatalog};
use crate::rbac::{AccessPolicy, GrantStore, RoleSpec};
use crate::routines::{RoutineInvoker, RoutineRegistry};
use crate::Operation;
use response::Resp;

/// Header echoing the per-request correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The console server
pub struct ConsoleServer {
    config: ServerConfig,
    policy: Arc<AccessPolicy>,
    catalog: Arc<SchemaCatalog>,
    sessions: RoleSessions,
    invoker: RoutineInvoker,
}

impl ConsoleServer {
    /// Connect to MySQL, load the privilege table and build the server
    pub async fn connect(config: ConsoleConfig) -> Result<Self> {
        let pool = db::connect(&config.database)
            .await
            .with_context(|| format!("Failed to connect to MySQL at {}:{}", config.database.host, config.database.port))?;

        let grants = Arc::new(GrantStore::from_file(
            &config.access.grants_file,
            config.grant_schema(),
            config.access.strict_grants,
        ));
        grants
            .table()
            .with_context(|| format!("Failed to load grants from {}", config.access.grants_file.display()))?;

        Ok(Self::new(&config, pool, grants))
    }

    /// Build from an open pool; the object list comes from `information_schema`
    pub fn new(config: &ConsoleConfig, pool: MySqlPool, grants: Arc<GrantStore>) -> Self {
        let catalog = Arc::new(SchemaCatalog::new(pool.clone(), config.database.name.clone()));
        Self::with_catalog(config, pool, grants, catalog.clone(), catalog)
    }

    /// Build with a separate object list for menus and authorization
    ///
    /// Column metadata still comes from `catalog`; `objects` only decides
    /// which objects exist.
    pub fn with_catalog(
        config: &ConsoleConfig,
        pool: MySqlPool,
        grants: Arc<GrantStore>,
        objects: Arc<dyn ObjectCatalog>,
        catalog: Arc<SchemaCatalog>,
    ) -> Self {
        let roles = RoleSpec::from_config(&config.access);
        let hint = grant_hint(&config.database.user, &config.database.host, &config.access.managed_roles);
        let sessions = RoleSessions::new(pool, roles.clone(), hint);
        let policy = Arc::new(AccessPolicy::new(grants, objects, roles));
        let invoker = RoutineInvoker::new(Arc::new(RoutineRegistry::builtin()), sessions.clone());

        Self { config: config.server.clone(), policy, catalog, sessions, invoker }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Bind and serve until the process exits
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        log::info!("Console listening on http://{}", addr);
        log::info!(
            "   {} routine(s), page size {} (max {})",
            self.invoker.list().len(),
            self.config.default_page_size,
            self.config.max_page_size
        );

        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = server.clone();

            tokio::spawn(async move {
                let io = hyper_util::rt::TokioIo::new(stream);

                let service = hyper::service::service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.handle_request(req).await) }
                });

                if let Err(err) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    log::error!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }

    /// Buffer the body, route, and log the outcome
    async fn handle_request(&self, req: Request<hyper::body::Incoming>) -> Resp {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        let (parts, body) = req.into_parts();

        let mut resp = match Limited::new(body, self.config.max_body_size).collect().await {
            Ok(collected) => {
                let api = ApiRequest::new(
                    parts.method,
                    parts.uri.path(),
                    parts.uri.query(),
                    parts.headers,
                    collected.to_bytes(),
                );
                let resp = self.route(&api).await;
                log::info!(
                    "{} {} {} -> {} ({} ms)",
                    request_id,
                    api.method,
                    api.path,
                    resp.status().as_u16(),
                    started.elapsed().as_millis()
                );
                resp
            }
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                log::warn!("{} {} {} -> body over {} bytes", request_id, parts.method, parts.uri.path(), self.config.max_body_size);
                response::error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", "Request body too large")
            }
            Err(err) => {
                log::warn!("{} {} {} -> unreadable body: {}", request_id, parts.method, parts.uri.path(), err);
                response::error(StatusCode::BAD_REQUEST, "invalid_body", "Failed to read request body")
            }
        };

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            resp.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        resp
    }

    /// Dispatch a buffered request
    pub async fn route(&self, req: &ApiRequest) -> Response<Full<Bytes>> {
        let segments = req.segments();
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        let (operation, result) = match (&req.method, parts.as_slice()) {
            (&Method::GET, ["health"]) => return self.handle_health(),
            (&Method::GET, ["api", "roles"]) => (Operation::Read, self.handle_roles()),
            (&Method::GET, ["api", "menu"]) => (Operation::Read, self.handle_menu(req).await),
            (&Method::GET, ["api", "objects", name]) => (Operation::Read, self.handle_read_object(req, name).await),
            (&Method::PUT, ["api", "objects", name]) => {
                (Operation::Mutation, self.handle_update_object(req, name).await)
            }
            (&Method::POST, ["api", "objects", name]) => {
                (Operation::Mutation, self.handle_insert_object(req, name).await)
            }
            (&Method::GET, ["api", "objects", name, "example"]) => {
                (Operation::Mutation, self.handle_object_example(req, name).await)
            }
            (&Method::GET, ["api", "routines"]) => return self.handle_list_routines(),
            (&Method::GET, ["api", "routines", name, "example"]) => {
                (Operation::Mutation, self.handle_routine_example(req, name).await)
            }
            (&Method::POST, ["api", "routines", name, "execute"]) => {
                (Operation::Mutation, self.handle_execute_routine(req, name).await)
            }
            (&Method::POST, ["api", "admin", "reload"]) => (Operation::Read, self.handle_reload(req)),
            (_, path) if is_known_path(path) => return response::method_not_allowed(),
            _ => return response::not_found(),
        };

        match result {
            Ok(resp) => resp,
            Err(err) => {
                log::debug!("{} {} failed: {}", req.method, req.path, err);
                response::from_error(&err, operation)
            }
        }
    }
}

fn is_known_path(path: &[&str]) -> bool {
    matches!(
        path,
        ["health"]
            | ["api", "roles"]
            | ["api", "menu"]
            | ["api", "objects", _]
            | ["api", "objects", _, "example"]
            | ["api", "routines"]
            | ["api", "routines", _, "example"]
            | ["api", "routines", _, "execute"]
            | ["api", "admin", "reload"]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_paths() {
        assert!(is_known_path(&["api", "objects", "patient"]));
        assert!(is_known_path(&["api", "routines", "sp_x", "execute"]));
        assert!(!is_known_path(&["api", "objects"]));
        assert!(!is_known_path(&["api", "routines", "sp_x", "run"]));
    }
}
