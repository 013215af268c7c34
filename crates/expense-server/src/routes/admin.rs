use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::auth::guard::AdminCaller;
use crate::error::AppResult;
use crate::models::{EmployeeRecord, User};
use crate::routes::{AppState, JsonBody};
use crate::services::admin::{self, CreateUserRequest, RoleUpdate};
use crate::services::directory;

pub async fn list_employees(
    _admin: AdminCaller,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<EmployeeRecord>>> {
    Ok(Json(directory::list_employees(&state.db)?))
}

pub async fn list_managers(
    _admin: AdminCaller,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(directory::list_managers(&state.db)?))
}

pub async fn create_user(
    AdminCaller(admin): AdminCaller,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = admin::create_user(&state.db, body)?;
    tracing::debug!(admin_id = %admin.user_id, user_id = %user.id, "create-user");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created", "user": user })),
    ))
}

pub async fn update_role(
    AdminCaller(admin): AdminCaller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RoleUpdate>,
) -> AppResult<Json<Value>> {
    let user = admin::update_role(&state.db, &id, body)?;
    tracing::debug!(admin_id = %admin.user_id, user_id = %user.id, "update-role");
    Ok(Json(json!({ "message": "User updated", "user": user })))
}

pub async fn delete_user(
    AdminCaller(admin): AdminCaller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let user = admin::delete_user(&state.db, &id)?;
    tracing::debug!(admin_id = %admin.user_id, user_id = %user.id, "delete-user");
    Ok(Json(json!({ "message": "User deleted", "user": user })))
}
