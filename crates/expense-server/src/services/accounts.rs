use serde::Deserialize;

use crate::auth::guard::LoginSurface;
use crate::auth::{password, session};
use crate::config::Config;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Role, Session, User};
use crate::services::directory::{self, NewUser};
use crate::services::{non_blank, FieldErrors};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Self-registration fields. `role` and `manager_id` only apply on the staff surface.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "managerId")]
    pub manager_id: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub session: Session,
    pub user: User,
}

pub fn login(
    pool: &DbPool,
    config: &Config,
    credentials: &Credentials,
    surface: LoginSurface,
) -> AppResult<LoginOutcome> {
    let mut errors = FieldErrors::default();
    let email = errors.required("email", credentials.email.as_deref());
    let password = credentials.password.clone().unwrap_or_default();
    if password.is_empty() {
        errors.invalid("password");
    }
    errors.finish()?;

    let conn = pool.get()?;
    let Some(user) = directory::find_by_email(&conn, &email)? else {
        password::verify_dummy(&password);
        tracing::info!("Login failed: no account for {email}");
        return Err(AppError::InvalidCredentials);
    };

    if !password::verify_password(&password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    if !surface.admits(user.role) {
        tracing::warn!(user_id = %user.id, role = %user.role, ?surface, "Login refused on this surface");
        return Err(AppError::AccessDenied);
    }

    let session = session::create_session(
        pool,
        &config.session_secret,
        &user,
        config.session_ttl_minutes,
    )?;
    tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

    Ok(LoginOutcome { session, user })
}

/// Validate the account fields shared by every account-creating operation.
pub(crate) fn validate_account_fields(
    errors: &mut FieldErrors,
    name: Option<&str>,
    email: Option<&str>,
    password: Option<&str>,
) -> (String, String, String) {
    let name = errors.required("name", name);
    let email = errors.required("email", email);
    if !email.is_empty() && !email.contains('@') {
        errors.invalid("email");
    }
    let password = password.unwrap_or_default().to_string();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.invalid("password");
    }
    (name, email, password)
}

/// Which registration entry point is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationSurface {
    /// Open sign-up: always an employee without a manager.
    Public,
    /// Employee/manager sign-up: role is required and may carry a manager choice.
    Staff,
}

/// Register an account. On the staff surface a manager choice that does not
/// reference an existing manager is dropped rather than failing the registration.
pub fn register(
    pool: &DbPool,
    surface: RegistrationSurface,
    registration: Registration,
) -> AppResult<User> {
    let mut errors = FieldErrors::default();
    let (name, email, password) = validate_account_fields(
        &mut errors,
        registration.name.as_deref(),
        registration.email.as_deref(),
        registration.password.as_deref(),
    );
    let (role, requested_manager) = match surface {
        RegistrationSurface::Public => (Role::Employee, None),
        RegistrationSurface::Staff => {
            let role = match non_blank(registration.role).as_deref().map(str::parse::<Role>) {
                Some(Ok(role @ (Role::Employee | Role::Manager))) => role,
                _ => {
                    errors.invalid("role");
                    Role::Employee
                }
            };
            (role, non_blank(registration.manager_id))
        }
    };
    errors.finish()?;

    let conn = pool.get()?;
    if directory::find_by_email(&conn, &email)?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let manager_id = match (role, requested_manager) {
        (Role::Employee, Some(id)) if directory::is_manager(&conn, &id)? => Some(id),
        (_, Some(id)) => {
            tracing::warn!("Ignoring manager {id} on {role} registration for {email}");
            None
        }
        (_, None) => None,
    };

    let country = non_blank(registration.country);
    let password_hash = password::hash_password(&password)?;
    let user = directory::insert_user(
        &conn,
        &NewUser {
            name: &name,
            email: &email,
            password_hash: &password_hash,
            role,
            manager_id: manager_id.as_deref(),
            country: country.as_deref(),
        },
    )?;
    tracing::info!(user_id = %user.id, role = %user.role, ?surface, "Registered new account");
    Ok(user)
}
