//! Tests against a live MySQL 8 with the clinic schema loaded
//!
//! Ignored by default. Point the `CG_DB_*` variables at a disposable database
//! whose user holds the managed roles, then run
//! `cargo test -p clinicgate-core --test mysql_sessions -- --ignored`.
//! The tests create their own `cg_test_*` tables and leave inserted rows behind.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::mysql::MySqlPool;

use clinicgate_core::app::{ApiRequest, ConsoleServer};
use clinicgate_core::config::ConsoleConfig;
use clinicgate_core::db;
use clinicgate_core::rbac::GrantStore;

fn config() -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    config.apply_env_vars();
    config
}

async fn pool(config: &ConsoleConfig) -> MySqlPool {
    db::connect(&config.database).await.expect("MySQL from CG_DB_* must be reachable")
}

/// `rows` rows, all with `grp = 1`
async fn scratch_table(pool: &MySqlPool, table: &str, rows: usize) {
    sqlx::query(&format!("DROP TABLE IF EXISTS `{}`", table)).execute(pool).await.unwrap();
    sqlx::query(&format!(
        "CREATE TABLE `{}` (id INT AUTO_INCREMENT PRIMARY KEY, label VARCHAR(32) NOT NULL, grp INT NOT NULL)",
        table
    ))
    .execute(pool)
    .await
    .unwrap();
    for i in 0..rows {
        sqlx::query(&format!("INSERT INTO `{}` (label, grp) VALUES (?, 1)", table))
            .bind(format!("row_{}", i))
            .execute(pool)
            .await
            .unwrap();
    }
}

fn server(config: &ConsoleConfig, pool: MySqlPool) -> ConsoleServer {
    let schema = &config.database.name;
    let grants = format!(
        "GRANT ALL PRIVILEGES ON {schema}.* TO role_admin;\n\
         GRANT SELECT ON {schema}.cg_test_paging_role TO role_cg_unassigned;\n",
        schema = schema
    );
    ConsoleServer::new(config, pool, Arc::new(GrantStore::inline(grants, schema.clone())))
}

async fn call(server: &ConsoleServer, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    };
    let body = if body.is_null() { Bytes::new() } else { Bytes::from(body.to_string()) };
    let req = ApiRequest::new(method, path, query, HeaderMap::new(), body);
    let resp = server.route(&req).await;
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[ignore = "needs MySQL; configure CG_DB_* and run with --ignored"]
#[tokio::test]
async fn pages_past_the_end_are_empty() {
    let config = config();
    let pool = pool(&config).await;
    scratch_table(&pool, "cg_test_paging", 25).await;
    let server = server(&config, pool);

    let (status, body) = call(&server, Method::GET, "/api/objects/cg_test_paging?page=2&pageSize=20", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["total"], 25);

    let (status, body) = call(&server, Method::GET, "/api/objects/cg_test_paging?page=3&pageSize=20", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["rows"].as_array().unwrap().is_empty());
    assert_eq!(body["pagination"]["page"], 3);
    assert_eq!(body["pagination"]["total"], 25);
}

#[ignore = "needs MySQL; configure CG_DB_* and run with --ignored"]
#[tokio::test]
async fn update_changes_at_most_one_row() {
    let config = config();
    let pool = pool(&config).await;
    scratch_table(&pool, "cg_test_update", 4).await;
    let server = server(&config, pool.clone());

    let (status, body) = call(
        &server,
        Method::PUT,
        "/api/objects/cg_test_update",
        json!({"data": {"label": "changed", "not_a_column": 1}, "where": {"grp": 1}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["updated"].as_u64().unwrap() <= 1);

    let (changed,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cg_test_update WHERE label = 'changed'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(changed, 1);
}

#[ignore = "needs MySQL; configure CG_DB_* and run with --ignored"]
#[tokio::test]
async fn synthesized_patient_example_inserts() {
    let config = config();
    let server = server(&config, pool(&config).await);

    let (status, body) = call(&server, Method::GET, "/api/objects/patient/example", Value::Null).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let example = body["example"].clone();
    assert!(example.as_object().is_some_and(|row| !row.is_empty()));

    let (status, body) = call(&server, Method::POST, "/api/objects/patient", json!({ "data": example })).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["inserted"], 1);
}

#[ignore = "needs MySQL; configure CG_DB_* and run with --ignored"]
#[tokio::test]
async fn patient_create_returns_its_outputs() {
    let config = config();
    let server = server(&config, pool(&config).await);

    let (status, body) = call(
        &server,
        Method::POST,
        "/api/routines/sp_patient_create/execute?role=role_reception",
        json!({"params": {"p_patient_name": "李雷", "p_gender": "M"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["routine"], "sp_patient_create");
    assert!(!body["outputs"]["o_patient_id"].is_null());
    assert!(!body["outputs"]["o_patient_no"].is_null());
}

#[ignore = "needs MySQL; configure CG_DB_* and run with --ignored"]
#[tokio::test]
async fn missing_database_role_reports_grant_hint() {
    let config = config();
    let pool = pool(&config).await;
    scratch_table(&pool, "cg_test_paging_role", 1).await;
    let server = server(&config, pool);

    // the grant script allows the object, but no such database role exists
    let (status, body) =
        call(&server, Method::GET, "/api/objects/cg_test_paging_role?role=role_cg_unassigned", Value::Null).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "role_switch_failed");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("role_cg_unassigned"));
    assert!(message.contains("GRANT "));
    assert!(message.contains("SET DEFAULT ROLE ALL"));
}
