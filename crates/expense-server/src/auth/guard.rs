//! Per-request authorization.
//!
//! Every guarded handler names the [`Surface`] it belongs to. [`authorize`] matches
//! the caller's role against that surface exhaustively and hands back the [`Scope`]
//! the handler must bind into its queries.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::{AppError, AppResult};
use crate::models::{Identity, Role};

/// A family of endpoints sharing one authorization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Admin,
    EmployeeSelfService,
    ManagerReview,
}

/// The records a caller may touch on a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    /// Expenses whose `employee_id` equals this id.
    OwnExpenses(String),
    /// Expenses of employees whose `manager_id` equals this id.
    DirectReports(String),
}

pub fn authorize(identity: &Identity, surface: Surface) -> AppResult<Scope> {
    let granted = match (identity.role, surface) {
        (Role::Admin, Surface::Admin) => Some(Scope::All),
        (Role::Employee, Surface::EmployeeSelfService) => {
            Some(Scope::OwnExpenses(identity.user_id.clone()))
        }
        (Role::Manager, Surface::ManagerReview) => {
            Some(Scope::DirectReports(identity.user_id.clone()))
        }
        (Role::Admin, Surface::EmployeeSelfService | Surface::ManagerReview)
        | (Role::Employee, Surface::Admin | Surface::ManagerReview)
        | (Role::Manager, Surface::Admin | Surface::EmployeeSelfService) => None,
    };

    granted.ok_or_else(|| {
        tracing::warn!(
            user_id = %identity.user_id,
            role = %identity.role,
            ?surface,
            "Denied access to surface"
        );
        AppError::Forbidden(match surface {
            Surface::Admin => "Admin access required".to_string(),
            Surface::EmployeeSelfService => "Employee access required".to_string(),
            Surface::ManagerReview => "Manager access required".to_string(),
        })
    })
}

/// Which login entry point admits which roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSurface {
    Admin,
    Staff,
}

impl LoginSurface {
    pub fn admits(&self, role: Role) -> bool {
        match (self, role) {
            (LoginSurface::Admin, Role::Admin) => true,
            (LoginSurface::Admin, Role::Manager | Role::Employee) => false,
            (LoginSurface::Staff, Role::Manager | Role::Employee) => true,
            (LoginSurface::Staff, Role::Admin) => false,
        }
    }
}

fn guard_parts(parts: &Parts, surface: Surface) -> AppResult<(Identity, Scope)> {
    let identity = parts
        .extensions
        .get::<Identity>()
        .cloned()
        .ok_or(AppError::Unauthenticated)?;
    let scope = authorize(&identity, surface)?;
    Ok((identity, scope))
}

/// Caller admitted to the admin surface.
#[derive(Debug, Clone)]
pub struct AdminCaller(pub Identity);

/// Caller admitted to employee self-service; carries the employee's own id.
#[derive(Debug, Clone)]
pub struct EmployeeCaller {
    pub identity: Identity,
    pub employee_id: String,
}

/// Caller admitted to manager review; carries the manager id that scopes queries.
#[derive(Debug, Clone)]
pub struct ManagerCaller {
    pub identity: Identity,
    pub manager_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for AdminCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let (identity, _) = guard_parts(parts, Surface::Admin)?;
        Ok(Self(identity))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for EmployeeCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match guard_parts(parts, Surface::EmployeeSelfService)? {
            (identity, Scope::OwnExpenses(employee_id)) => Ok(Self { identity, employee_id }),
            _ => Err(AppError::Internal("Employee surface produced a foreign scope".into())),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ManagerCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match guard_parts(parts, Surface::ManagerReview)? {
            (identity, Scope::DirectReports(manager_id)) => Ok(Self { identity, manager_id }),
            _ => Err(AppError::Internal("Manager surface produced a foreign scope".into())),
        }
    }
}
