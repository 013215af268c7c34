use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::models::ExpenseStatus;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Access denied")]
    AccessDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Missing or invalid fields: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid manager ID")]
    InvalidManager,

    #[error("Expense has already been {0}")]
    InvalidTransition(ExpenseStatus),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccessDenied => "access_denied",
            AppError::Forbidden(_) => "forbidden",
            AppError::Validation(_) => "validation_error",
            AppError::DuplicateEmail => "duplicate_email",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidManager => "invalid_manager",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::Conflict(_) => "conflict",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => "storage_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthenticated | AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::AccessDenied => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Validation(_) | AppError::InvalidManager => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::DuplicateEmail | AppError::InvalidTransition(_) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = match &self {
            AppError::Validation(fields) => {
                json!({ "error": self.kind(), "message": message, "fields": fields })
            }
            _ => json!({ "error": self.kind(), "message": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Body extraction failures are validation errors. A wrongly typed field is
/// reported by name; anything else (bad syntax, missing content type) as `body`.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let field = match &rejection {
            JsonRejection::JsonDataError(err) => rejected_field(&err.body_text()),
            _ => None,
        };
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AppError::Validation(vec![field.unwrap_or_else(|| "body".to_string())])
    }
}

/// Extract the top-level field from axum's
/// `"...target type: <path>: <serde message>"` data error text.
fn rejected_field(text: &str) -> Option<String> {
    let (_, detail) = text.split_once("target type: ")?;
    let (path, _) = detail.split_once(": ")?;
    let field = path.split(['.', '[']).next()?;
    (!field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .then(|| field.to_string())
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_do_not_leak_detail() {
        let err = AppError::Internal("disk on fire at /var/lib/db".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = AppError::Validation(vec!["amount".into(), "date".into()]);
        assert_eq!(err.to_string(), "Missing or invalid fields: amount, date");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn rejected_field_reads_the_serde_path() {
        assert_eq!(
            rejected_field(
                "Failed to deserialize the JSON body into the target type: role: invalid type: integer `5`, expected a string at line 1 column 9"
            )
            .as_deref(),
            Some("role")
        );
        assert_eq!(
            rejected_field("Failed to deserialize the JSON body into the target type: invalid type: integer `5`, expected struct Credentials at line 1 column 1"),
            None
        );
    }

    #[test]
    fn transition_conflict_names_current_status() {
        let err = AppError::InvalidTransition(ExpenseStatus::Rejected);
        assert_eq!(err.to_string(), "Expense has already been rejected");
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
