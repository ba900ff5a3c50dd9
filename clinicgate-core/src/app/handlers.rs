//! Endpoint handlers
//!
//! Object endpoints authorize first (400 bad name, 403 denied, 404 unknown
//! object), then run the gateway inside a role session for the caller.

use std::sync::Arc;

use serde_json::{json, Value};

use super::request::{object_member, ApiRequest};
use super::response::{self, Resp};
use super::ConsoleServer;
use crate::db::{self, PageRequest};
use crate::rbac::{resolve_display_name, Authorized, Capability, Insert, Read, Write};
use crate::sql;
use crate::{Error, Result};

impl ConsoleServer {
    /// GET /health
    pub(crate) fn handle_health(&self) -> Resp {
        response::ok(&json!({ "status": "ok" }))
    }

    /// GET /api/roles
    pub(crate) fn handle_roles(&self) -> Result<Resp> {
        Ok(response::ok(&json!({ "roles": self.policy.list_roles()? })))
    }

    /// GET /api/menu?role=R
    pub(crate) async fn handle_menu(&self, req: &ApiRequest) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        let items = self.policy.build_menu(&ctx.role).await?;
        Ok(response::ok(&json!({ "role": ctx.role, "items": items })))
    }

    /// GET /api/objects/{name}?role=R&page=&pageSize=
    pub(crate) async fn handle_read_object(&self, req: &ApiRequest, name: &str) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        let grant = self.policy.authorize::<Read>(&ctx.role, name).await?;
        let object = object_summary(&grant);

        let page_size = req.positive("pageSize", self.config.default_page_size).min(self.config.max_page_size);
        let request = PageRequest::new(req.positive("page", 1), page_size);

        let catalog = Arc::clone(&self.catalog);
        let page = self
            .sessions
            .with_role(&ctx.role, ctx.username(), move |conn| {
                Box::pin(async move { db::read_page(conn, &catalog, &grant, request).await })
            })
            .await?;

        Ok(response::ok(&json!({
            "role": ctx.role,
            "object": object,
            "columns": page.columns,
            "rows": page.rows,
            "pagination": page.pagination,
        })))
    }

    /// PUT /api/objects/{name}?role=R with `{data, where}`
    pub(crate) async fn handle_update_object(&self, req: &ApiRequest, name: &str) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        sql::require(name, "object name")?;

        // body shape is checked before any grant or catalog lookup
        let body = req.json_body()?;
        let (Some(Value::Object(data)), Some(Value::Object(conditions))) = (body.get("data"), body.get("where")) else {
            return Err(Error::InvalidInput("Request body must include data and where".to_string()));
        };
        let (data, conditions) = (data.clone(), conditions.clone());

        let grant = self.policy.authorize::<Write>(&ctx.role, name).await?;
        if data.is_empty() {
            return Err(Error::InvalidInput("No valid columns to update".to_string()));
        }
        if conditions.is_empty() {
            return Err(Error::InvalidInput("No valid conditions supplied".to_string()));
        }

        let catalog = Arc::clone(&self.catalog);
        let updated = self
            .sessions
            .with_role(&ctx.role, ctx.username(), move |conn| {
                Box::pin(async move { db::update_row(conn, &catalog, &grant, &data, &conditions).await })
            })
            .await?;

        Ok(response::ok(&json!({ "updated": updated })))
    }

    /// POST /api/objects/{name}?role=R with `{data}`
    pub(crate) async fn handle_insert_object(&self, req: &ApiRequest, name: &str) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        let grant = self.policy.authorize::<Insert>(&ctx.role, name).await?;

        let data = object_member(&req.json_body()?, "data")?;
        if data.is_empty() {
            return Err(Error::InvalidInput("No valid columns to insert".to_string()));
        }

        let catalog = Arc::clone(&self.catalog);
        let outcome = self
            .sessions
            .with_role(&ctx.role, ctx.username(), move |conn| {
                Box::pin(async move { db::insert_row(conn, &catalog, &grant, &data).await })
            })
            .await?;

        Ok(response::ok(&outcome))
    }

    /// GET /api/objects/{name}/example?role=R
    pub(crate) async fn handle_object_example(&self, req: &ApiRequest, name: &str) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        let grant = self.policy.authorize::<Insert>(&ctx.role, name).await?;

        let catalog = Arc::clone(&self.catalog);
        let example = self
            .sessions
            .with_role(&ctx.role, ctx.username(), move |conn| {
                Box::pin(async move { db::synthesize(conn, &catalog, &grant).await })
            })
            .await?;

        Ok(response::ok(&json!({ "example": example })))
    }

    /// GET /api/routines
    pub(crate) fn handle_list_routines(&self) -> Resp {
        response::ok(&json!({ "routines": self.invoker.list() }))
    }

    /// GET /api/routines/{name}/example?role=R
    pub(crate) async fn handle_routine_example(&self, req: &ApiRequest, name: &str) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        let params = self.invoker.build_example(name, &ctx).await?;
        Ok(response::ok(&json!({ "params": params })))
    }

    /// POST /api/routines/{name}/execute?role=R with `{params}`
    pub(crate) async fn handle_execute_routine(&self, req: &ApiRequest, name: &str) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        let params = object_member(&req.json_body()?, "params")?;
        let outcome = self.invoker.execute(name, &ctx, &params).await?;
        Ok(response::ok(&outcome))
    }

    /// POST /api/admin/reload (super-role only)
    pub(crate) fn handle_reload(&self, req: &ApiRequest) -> Result<Resp> {
        let ctx = req.access_context(self.sessions.roles());
        if !self.sessions.roles().is_super(&ctx.role) {
            return Err(Error::Forbidden("Reload requires the super role".to_string()));
        }
        self.policy.reload();
        // a broken grant file fails this request
        let roles = self.policy.list_roles()?;
        Ok(response::ok(&json!({ "reloaded": true, "roles": roles.len() })))
    }
}

/// `object` member of the read response
fn object_summary<C: Capability>(grant: &Authorized<C>) -> serde_json::Value {
    let object = grant.object();
    let decision = grant.decision();
    json!({
        "name": object.name,
        "type": object.kind,
        "displayName": resolve_display_name(&object.name, Some(&object.comment)),
        "accessMode": decision.access_mode,
        "writable": decision.access_mode.is_writable(),
        "insertable": decision.insertable,
    })
}
