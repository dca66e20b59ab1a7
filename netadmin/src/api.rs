//! HTTP API — firewall rules, routes, system info and login
//!
//! All handlers go through the `StateStore`; none of them touch the external
//! tools directly except system info.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::{header, Method},
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::auth::{self, LoginRequest, LoginResponse, SessionRegistry};
use crate::error::ApiError;
use crate::firewall::{FirewallRule, RuleRequest};
use crate::routes::{Route, RouteRequest};
use crate::store::StateStore;

/// Shared state for all handlers
pub struct AppState {
    pub store: Arc<StateStore>,
    pub sessions: Arc<SessionRegistry>,
}

/// Router options that don't belong in handler state
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    pub require_auth: bool,
    pub frontend_dir: Option<PathBuf>,
}

// --- API Types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct RulesResponse {
    pub rules: Vec<FirewallRule>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoutesResponse {
    pub routes: Vec<Route>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemInfoResponse {
    pub hostname: String,
    pub uptime: String,
    pub rules_count: usize,
    pub routes_count: usize,
}

/// Build the full application router
pub fn router(state: Arc<AppState>, options: &RouterOptions) -> Router {
    let mut api = Router::new()
        .route("/firewall/rules", get(list_rules).post(add_rule))
        .route("/firewall/rules/reload", post(reload_rules))
        .route("/firewall/rules/:id", delete(delete_rule))
        .route("/routes", get(list_routes).post(add_route))
        .route("/routes/:id", delete(delete_route))
        .route("/system/info", get(system_info));

    if options.require_auth {
        api = api.route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.sessions),
            auth::require_session,
        ));
    }

    // Added after the auth layer so it stays reachable without a token
    let api = api.route("/login", post(login));

    let mut app = Router::new().nest("/api", api).with_state(state);

    if let Some(dir) = &options.frontend_dir {
        app = app
            .nest_service("/static", ServeDir::new(dir))
            .route_service("/", ServeFile::new(dir.join("index.html")));
    }

    app.layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// --- Handlers ---

async fn login(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .sessions
        .login(&req)
        .map(|token| Json(LoginResponse { token }))
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))
}

async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: state.store.rules().await,
    })
}

async fn add_rule(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RuleRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .add_rule(&req)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to add rule"))?;
    Ok(MessageResponse::new("Rule added successfully"))
}

async fn delete_rule(
    State(state): State<Arc<AppState>>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .delete_rule(id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to delete rule"))?;
    Ok(MessageResponse::new("Rule deleted successfully"))
}

async fn reload_rules(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    let count = state.store.reload_rules().await;
    info!("Reloaded {count} firewall rules on request");
    MessageResponse::new("Rules reloaded successfully")
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Json<RoutesResponse> {
    Json(RoutesResponse {
        routes: state.store.routes().await,
    })
}

async fn add_route(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RouteRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .add_route(&req)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to add route"))?;
    Ok(MessageResponse::new("Route added successfully"))
}

async fn delete_route(
    State(state): State<Arc<AppState>>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .delete_route(id)
        .await
        .map_err(|e| ApiError::from_store(e, "Failed to delete route"))?;
    Ok(MessageResponse::new("Route deleted successfully"))
}

async fn system_info(State(state): State<Arc<AppState>>) -> Json<SystemInfoResponse> {
    let hostname = command_text(&state.store, "hostname").await;
    let uptime = command_text(&state.store, "uptime").await;

    Json(SystemInfoResponse {
        hostname,
        uptime,
        rules_count: state.store.rule_count().await,
        routes_count: state.store.route_count().await,
    })
}

/// Trimmed stdout of a no-argument command, empty on failure
async fn command_text(store: &StateStore, program: &str) -> String {
    store
        .run(program, Vec::new())
        .await
        .map(|out| String::from_utf8_lossy(&out).trim().to_string())
        .unwrap_or_default()
}
