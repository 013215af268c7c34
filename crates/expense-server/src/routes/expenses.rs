use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::guard::{EmployeeCaller, ManagerCaller};
use crate::error::{AppError, AppResult};
use crate::models::{Decision, Expense};
use crate::routes::{AppState, JsonBody};
use crate::services::expenses::{self, ExpenseSubmission};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DecisionRequest {
    comment: Option<String>,
}

pub async fn submit(
    caller: EmployeeCaller,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ExpenseSubmission>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let expense = expenses::submit(&state.db, &caller.employee_id, &body)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Expense submitted", "expense": expense })),
    ))
}

pub async fn mine(
    caller: EmployeeCaller,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Expense>>> {
    Ok(Json(expenses::list_mine(&state.db, &caller.employee_id)?))
}

pub async fn pending(
    caller: ManagerCaller,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Expense>>> {
    Ok(Json(expenses::list_pending(&state.db, &caller.manager_id)?))
}

pub async fn processed(
    caller: ManagerCaller,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Expense>>> {
    Ok(Json(expenses::list_processed(&state.db, &caller.manager_id)?))
}

pub async fn approve(
    caller: ManagerCaller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    decide(&state, &caller, &id, Decision::Approve, &body)
}

pub async fn reject(
    caller: ManagerCaller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    decide(&state, &caller, &id, Decision::Reject, &body)
}

fn decide(
    state: &AppState,
    caller: &ManagerCaller,
    expense_id: &str,
    decision: Decision,
    body: &Bytes,
) -> AppResult<Json<Value>> {
    // The comment body is optional; an empty request means no comment
    let request: DecisionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DecisionRequest::default()
    } else {
        serde_json::from_slice(body).map_err(|_| AppError::Validation(vec!["comment".into()]))?
    };

    let expense = expenses::decide(
        &state.db,
        expense_id,
        &caller.manager_id,
        decision,
        request.comment,
    )?;
    let message = match decision {
        Decision::Approve => "Expense approved",
        Decision::Reject => "Expense rejected",
    };
    Ok(Json(json!({ "message": message, "expense": expense })))
}
