/*!
 * # Warehouse API
 *
 * Receiving-dock backend: quality checks recorded against receptions are
 * reconciled into either stock on hand (PASS) or a pending supplier return (FAIL).
 *
 * - `services::quality_checks` holds the reconciliation workflow
 * - `handlers` exposes it over HTTP under `/api/v1`
 * - `migrator` embeds the schema
 */

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod services;
pub mod telemetry;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

use crate::{errors::ServiceError, services::quality_checks::WorkflowSettings};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let services = handlers::AppServices::new(db.clone(), WorkflowSettings::from(&config));
        Self {
            db,
            config,
            services,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: telemetry::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ServiceError>;

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
}

async fn api_status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
    })
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthStatus>, ServiceError> {
    db::check_connection(&state.db).await?;
    Ok(Json(HealthStatus {
        status: "healthy",
        database: "ok",
    }))
}

/// Routes served under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route(
            "/quality-checks",
            post(handlers::quality_checks::create_quality_check)
                .get(handlers::quality_checks::list_quality_checks),
        )
        .route(
            "/quality-checks/:id",
            get(handlers::quality_checks::get_quality_check),
        )
        .route(
            "/quality-checks/:id/reconcile",
            post(handlers::quality_checks::reconcile_quality_check),
        )
        .route(
            "/returns",
            get(handlers::returns::list_returns).post(handlers::returns::create_return),
        )
        .route(
            "/returns/:id/status",
            put(handlers::returns::update_return_status),
        )
        .route(
            "/inventory",
            get(handlers::inventory::list_inventory).post(handlers::inventory::receive_stock),
        )
}

/// Full application router with request ids and HTTP tracing applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "warehouse-api up" }))
        .nest("/api/v1", api_v1_routes())
        .layer(telemetry::configure_http_tracing())
        .layer(axum::middleware::from_fn(telemetry::request_id_middleware))
        .with_state(state)
}
