use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::auth::session;
use crate::error::AppError;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "expense_session";

/// Resolve the session cookie once and attach the caller's `Identity` and `User`
/// to the request for the guard extractors and handlers downstream.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthenticated)?;

    let (identity, user) = session::validate_session(&state.db, &state.config.session_secret, &token)?;

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
