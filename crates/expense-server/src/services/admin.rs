use rusqlite::TransactionBehavior;
use serde::Deserialize;

use crate::auth::password;
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Role, User};
use crate::services::accounts::validate_account_fields;
use crate::services::directory::{self, NewUser};
use crate::services::{non_blank, FieldErrors};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    #[serde(rename = "managerId", alias = "manager_id")]
    pub manager_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RoleUpdate {
    pub role: Option<String>,
    #[serde(rename = "managerId", alias = "manager_id")]
    pub manager_id: Option<String>,
}

/// Create an employee or manager. A manager's `managerId` is dropped; an
/// employee's must reference an existing manager.
pub fn create_user(pool: &DbPool, request: CreateUserRequest) -> AppResult<User> {
    let mut errors = FieldErrors::default();
    let (name, email, password) = validate_account_fields(
        &mut errors,
        request.name.as_deref(),
        request.email.as_deref(),
        request.password.as_deref(),
    );
    let role = match non_blank(request.role).as_deref().map(str::parse::<Role>) {
        Some(Ok(role @ (Role::Employee | Role::Manager))) => Some(role),
        _ => {
            errors.invalid("role");
            None
        }
    };
    errors.finish()?;
    let role = role.ok_or_else(|| AppError::Validation(vec!["role".into()]))?;

    let conn = pool.get()?;
    if directory::find_by_email(&conn, &email)?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let manager_id = match role {
        Role::Employee => non_blank(request.manager_id),
        Role::Manager | Role::Admin => None,
    };
    if let Some(id) = &manager_id {
        if !directory::is_manager(&conn, id)? {
            return Err(AppError::InvalidManager);
        }
    }

    let password_hash = password::hash_password(&password)?;
    let user = directory::insert_user(
        &conn,
        &NewUser {
            name: &name,
            email: &email,
            password_hash: &password_hash,
            role,
            manager_id: manager_id.as_deref(),
            country: None,
        },
    )?;
    tracing::info!(user_id = %user.id, role = %user.role, "Admin created account");
    Ok(user)
}

/// Change a user's role and manager assignment.
///
/// `managerId` only applies to employees and is silently dropped for other roles.
/// A manager moved to another role leaves their reports without a manager.
pub fn update_role(pool: &DbPool, user_id: &str, update: RoleUpdate) -> AppResult<User> {
    let role = match non_blank(update.role).as_deref().map(str::parse::<Role>) {
        Some(Ok(role)) => role,
        _ => return Err(AppError::Validation(vec!["role".into()])),
    };

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let user = directory::find_by_id(&tx, user_id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if user.role == Role::Admin && role != Role::Admin {
        return Err(AppError::Forbidden("Cannot change an admin's role".into()));
    }

    let manager_id = match role {
        Role::Employee => non_blank(update.manager_id),
        Role::Manager | Role::Admin => {
            if let Some(dropped) = non_blank(update.manager_id) {
                tracing::debug!(user_id, "Dropping manager {dropped} for {role} role");
            }
            None
        }
    };
    if let Some(id) = &manager_id {
        if id == user_id || !directory::is_manager(&tx, id)? {
            return Err(AppError::InvalidManager);
        }
    }

    let now = db::timestamp();
    if user.role == Role::Manager && role != Role::Manager {
        let orphaned = tx.execute(
            "UPDATE users SET manager_id = NULL, updated_at = ?1 WHERE manager_id = ?2",
            rusqlite::params![now, user_id],
        )?;
        tracing::info!(user_id, orphaned, "Manager demoted, reports unassigned");
    }

    tx.execute(
        "UPDATE users SET role = ?1, manager_id = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![role, manager_id, now, user_id],
    )?;
    let updated = directory::find_by_id(&tx, user_id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    tx.commit()?;

    tracing::info!(user_id, from = %user.role, to = %updated.role, "Admin updated role");
    Ok(updated)
}

/// Delete a non-admin account. Employees reporting to it are kept, unassigned.
pub fn delete_user(pool: &DbPool, user_id: &str) -> AppResult<User> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let user = directory::find_by_id(&tx, user_id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if user.role == Role::Admin {
        return Err(AppError::Forbidden("Cannot delete admin".into()));
    }

    let has_expenses: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM expenses WHERE employee_id = ?1)",
        rusqlite::params![user_id],
        |row| row.get(0),
    )?;
    if has_expenses {
        return Err(AppError::Conflict(
            "User has submitted expenses and cannot be deleted".into(),
        ));
    }

    let orphaned = tx.execute(
        "UPDATE users SET manager_id = NULL, updated_at = ?1 WHERE manager_id = ?2",
        rusqlite::params![db::timestamp(), user_id],
    )?;
    tx.execute("DELETE FROM users WHERE id = ?1", rusqlite::params![user_id])?;
    tx.commit()?;

    tracing::info!(user_id, role = %user.role, orphaned, "Admin deleted account");
    Ok(user)
}
