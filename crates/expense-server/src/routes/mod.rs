mod admin;
mod auth;
mod expenses;

use std::sync::Arc;

use axum::{
    extract::FromRequest,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::require_auth;
use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
}

/// JSON request body whose rejections render through [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

async fn root() -> Json<Value> {
    Json(json!({ "message": "Backend running successfully" }))
}

async fn health() -> &'static str {
    "ok"
}

pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/health", get(health));

    // Credential-checking routes
    let mut auth_routes = Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/er-login", post(auth::er_login))
        .route("/api/register", post(auth::register))
        .route("/api/er-register", post(auth::er_register));

    if state.config.auth_rate_limit {
        // 10 requests burst per IP, refilling one every 6 seconds
        let auth_governor = GovernorConfigBuilder::default()
            .per_second(6)
            .burst_size(10)
            .finish()
            .expect("auth rate limit settings are non-zero");
        auth_routes = auth_routes.layer(GovernorLayer::new(Arc::new(auth_governor)));
    }

    // Session lookups that must also work without a valid session
    let session_routes = Router::new()
        .route("/api/logout", get(auth::logout))
        .route("/api/user", get(auth::current_user));

    let protected = Router::new()
        // Admin management
        .route("/api/admin/employees", get(admin::list_employees))
        .route("/api/admin/managers", get(admin::list_managers))
        .route("/api/admin/create-user", post(admin::create_user))
        .route("/api/admin/update-role/{id}", put(admin::update_role))
        .route("/api/admin/delete-user/{id}", delete(admin::delete_user))
        // Employee self-service
        .route("/api/expenses", post(expenses::submit))
        .route("/api/expenses/user/me", get(expenses::mine))
        // Manager review
        .route("/api/expenses/pending", get(expenses::pending))
        .route("/api/expenses/processed", get(expenses::processed))
        .route("/api/expenses/{id}/approve", post(expenses::approve))
        .route("/api/expenses/{id}/reject", post(expenses::reject))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(session_routes)
        .merge(protected)
        .with_state(state)
}
