#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, Set,
    Statement,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use warehouse_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{quality_check::QualityVerdict, reception},
    services::quality_checks::{QualityCheckWorkflow, RecordQualityCheckCommand},
    AppState,
};

/// Application state and router over a private SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    // keeps a file-backed database alive for the lifetime of the app
    _dir: Option<TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// In-memory database on a single pooled connection.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = base_config("sqlite::memory:".to_string());
        // every pooled connection to sqlite::memory: would otherwise see its own database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        Self::build(cfg, None).await
    }

    /// File-backed database shared by `connections` pooled connections, so
    /// concurrent transactions really contend for the SQLite write lock.
    pub async fn file_backed(connections: u32, adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("warehouse.db");
        let mut cfg = base_config(format!("sqlite://{}?mode=rwc", path.display()));
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        adjust(&mut cfg);

        Self::build(cfg, Some(dir)).await
    }

    async fn build(cfg: AppConfig, dir: Option<TempDir>) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg);
        let router = warehouse_api::app_router(state.clone());

        Self {
            router,
            state,
            _dir: dir,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.state.db.as_ref()
    }

    pub fn workflow(&self) -> Arc<QualityCheckWorkflow> {
        self.state.services.quality_checks.clone()
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Send a raw body with a JSON content type, for malformed payloads.
    pub async fn request_raw(&self, method: Method, uri: &str, body: &str) -> axum::response::Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("failed to build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Run raw SQL, e.g. to install a fault-injection trigger.
    pub async fn execute(&self, sql: &str) {
        self.db()
            .execute(Statement::from_string(
                self.db().get_database_backend(),
                sql.to_string(),
            ))
            .await
            .unwrap_or_else(|e| panic!("failed to execute `{sql}`: {e}"));
    }

    pub async fn count<E>(&self) -> u64
    where
        E: EntityTrait,
        E::Model: Send + Sync,
    {
        E::find().count(self.db()).await.expect("count rows")
    }

    pub async fn seed_reception(&self, supplier: &str) -> reception::Model {
        reception::ActiveModel {
            supplier: Set(supplier.to_string()),
            status: Set("RECEIVED".to_string()),
            notes: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed reception")
    }
}

fn base_config(database_url: String) -> AppConfig {
    AppConfig::new(
        database_url,
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    )
}

pub fn pass(product_name: &str, quantity: i32) -> RecordQualityCheckCommand {
    RecordQualityCheckCommand {
        reception_id: 1,
        product_name: product_name.to_string(),
        quantity,
        verdict: QualityVerdict::Pass,
        notes: String::new(),
    }
}

pub fn fail(product_name: &str, quantity: i32, notes: &str) -> RecordQualityCheckCommand {
    RecordQualityCheckCommand {
        reception_id: 1,
        product_name: product_name.to_string(),
        quantity,
        verdict: QualityVerdict::Fail,
        notes: notes.to_string(),
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
