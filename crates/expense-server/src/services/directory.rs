use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::auth::password;
use crate::config::AdminSeed;
use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{EmployeeRecord, Role, User, USER_COLUMNS};

/// A row about to enter the directory. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub manager_id: Option<&'a str>,
    pub country: Option<&'a str>,
}

pub fn insert_user(conn: &Connection, new: &NewUser<'_>) -> AppResult<User> {
    if find_by_email(conn, new.email)?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let id = Uuid::new_v4().to_string();
    let now = db::timestamp();
    let result = conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, manager_id, country, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            id,
            new.name,
            new.email,
            new.password_hash,
            new.role,
            new.manager_id,
            new.country,
            now,
            now
        ],
    );

    match result {
        Ok(_) => {}
        // Lost a race with a concurrent insert of the same email
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            return Err(AppError::DuplicateEmail);
        }
        Err(e) => return Err(AppError::Database(e)),
    }

    Ok(User {
        id,
        name: new.name.to_string(),
        email: new.email.to_string(),
        password_hash: new.password_hash.to_string(),
        role: new.role,
        manager_id: new.manager_id.map(str::to_string),
        country: new.country.map(str::to_string),
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1"),
            rusqlite::params![email],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
            rusqlite::params![id],
            User::from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn is_manager(conn: &Connection, id: &str) -> AppResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1 AND role = 'manager')",
        rusqlite::params![id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn list_employees(pool: &DbPool) -> AppResult<Vec<EmployeeRecord>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS}, m.name
         FROM users u
         LEFT JOIN users m ON m.id = u.manager_id
         WHERE u.role = 'employee'
         ORDER BY u.created_at DESC"
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(EmployeeRecord {
            user: User::from_row(row)?,
            manager_name: row.get(9)?,
        })
    })?;
    let employees: Result<Vec<_>, _> = rows.collect();
    Ok(employees?)
}

pub fn list_managers(pool: &DbPool) -> AppResult<Vec<User>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users u WHERE u.role = 'manager' ORDER BY u.created_at DESC"
    ))?;
    let rows = stmt.query_map([], User::from_row)?;
    let managers: Result<Vec<_>, _> = rows.collect();
    Ok(managers?)
}

/// Create the configured admin account unless its email is already taken.
/// Returns whether an account was created.
pub fn ensure_admin(pool: &DbPool, seed: &AdminSeed) -> AppResult<bool> {
    let conn = pool.get()?;
    if let Some(existing) = find_by_email(&conn, &seed.email)? {
        if existing.role != Role::Admin {
            tracing::warn!(
                "Admin seed email {} belongs to a {} account, not promoting it",
                seed.email,
                existing.role
            );
        }
        return Ok(false);
    }

    let password_hash = password::hash_password(&seed.password)?;
    let admin = insert_user(
        &conn,
        &NewUser {
            name: &seed.name,
            email: &seed.email,
            password_hash: &password_hash,
            role: Role::Admin,
            manager_id: None,
            country: None,
        },
    )?;
    tracing::info!(user_id = %admin.id, "Seeded admin account {}", admin.email);
    Ok(true)
}
