use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use serde_json::json;

use crate::auth::guard::LoginSurface;
use crate::auth::{middleware::SESSION_COOKIE, session};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{Role, User};
use crate::routes::{AppState, JsonBody};
use crate::services::accounts::{self, Credentials, Registration, RegistrationSurface};

#[derive(Debug, Serialize)]
struct AdminLoginResponse {
    message: &'static str,
    user: User,
}

#[derive(Debug, Serialize)]
struct StaffProfile {
    id: String,
    name: String,
    email: String,
    role: Role,
}

/// Admin login.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<Credentials>,
) -> AppResult<impl IntoResponse> {
    let outcome = accounts::login(&state.db, &state.config, &body, LoginSurface::Admin)?;
    let cookie = build_session_cookie(&state.config, outcome.session.token);

    Ok((
        jar.add(cookie),
        Json(AdminLoginResponse {
            message: "login_success",
            user: outcome.user,
        }),
    ))
}

/// Employee and manager login.
pub async fn er_login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(body): JsonBody<Credentials>,
) -> AppResult<impl IntoResponse> {
    let outcome = accounts::login(&state.db, &state.config, &body, LoginSurface::Staff)?;
    let cookie = build_session_cookie(&state.config, outcome.session.token);
    let user = outcome.user;

    Ok((
        jar.add(cookie),
        Json(StaffProfile {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> AppResult<impl IntoResponse> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        session::delete_session(&state.db, &state.config.session_secret, cookie.value())?;
    }

    let removal = Cookie::build(SESSION_COOKIE)
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build();

    Ok((jar.add(removal), Json(json!({ "success": true }))))
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Registration>,
) -> AppResult<impl IntoResponse> {
    accounts::register(&state.db, RegistrationSurface::Public, body)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "registered_successfully" })),
    ))
}

pub async fn er_register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Registration>,
) -> AppResult<impl IntoResponse> {
    let user = accounts::register(&state.db, RegistrationSurface::Staff, body)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered", "user": user })),
    ))
}

/// The caller's account, or `null` without a live session.
pub async fn current_user(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let user = match jar.get(SESSION_COOKIE) {
        Some(cookie) => session::current_user(&state.db, &state.config.session_secret, cookie.value())?,
        None => None,
    };
    Ok(Json(json!({ "user": user })))
}

fn build_session_cookie(config: &Config, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .max_age(time::Duration::minutes(config.session_ttl_minutes))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}
