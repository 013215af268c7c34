use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Decision, Expense, ExpenseStatus, EXPENSE_COLUMNS};
use crate::services::{non_blank, FieldErrors};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw expense fields as submitted. `amount` may be a JSON number or a numeric string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExpenseSubmission {
    pub amount: Option<Value>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug)]
struct ValidExpense {
    amount: f64,
    currency: String,
    category: String,
    description: String,
    date: String,
}

impl ExpenseSubmission {
    fn validate(&self) -> AppResult<ValidExpense> {
        let mut errors = FieldErrors::default();

        let amount = parse_amount(self.amount.as_ref());
        if amount.is_none() {
            errors.invalid("amount");
        }

        let currency = errors.required("currency", self.currency.as_deref()).to_uppercase();
        if !currency.is_empty()
            && !(currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()))
        {
            errors.invalid("currency");
        }

        let category = errors.required("category", self.category.as_deref());
        let description = errors.required("description", self.description.as_deref());

        let raw_date = errors.required("date", self.date.as_deref());
        let date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).ok();
        if !raw_date.is_empty() && date.is_none() {
            errors.invalid("date");
        }

        errors.finish()?;
        match (amount, date) {
            (Some(amount), Some(date)) => Ok(ValidExpense {
                amount,
                currency,
                category,
                description,
                date: date.format(DATE_FORMAT).to_string(),
            }),
            _ => Err(AppError::Internal("Expense validation let an invalid field through".into())),
        }
    }
}

fn parse_amount(value: Option<&Value>) -> Option<f64> {
    let amount = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (amount.is_finite() && amount > 0.0).then_some(amount)
}

/// Record a new expense for `employee_id` in state `Pending`.
pub fn submit(pool: &DbPool, employee_id: &str, submission: &ExpenseSubmission) -> AppResult<Expense> {
    let valid = submission.validate()?;
    let conn = pool.get()?;
    let id = Uuid::new_v4().to_string();
    let now = db::timestamp();

    conn.execute(
        "INSERT INTO expenses (id, employee_id, amount, currency, category, description, date, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            id,
            employee_id,
            valid.amount,
            valid.currency,
            valid.category,
            valid.description,
            valid.date,
            ExpenseStatus::Pending,
            now,
            now
        ],
    )?;
    tracing::info!(expense_id = %id, employee_id, amount = valid.amount, "Expense submitted");

    find_expense(&conn, &id)?
        .ok_or_else(|| AppError::Internal(format!("Expense {id} vanished after insert")))
}

pub fn list_mine(pool: &DbPool, employee_id: &str) -> AppResult<Vec<Expense>> {
    let conn = pool.get()?;
    select_expenses(&conn, "e.employee_id = ?1", rusqlite::params![employee_id])
}

/// Pending expenses of the manager's direct reports.
pub fn list_pending(pool: &DbPool, manager_id: &str) -> AppResult<Vec<Expense>> {
    let conn = pool.get()?;
    select_expenses(
        &conn,
        "u.manager_id = ?1 AND e.status = 'Pending'",
        rusqlite::params![manager_id],
    )
}

/// Approved and rejected expenses of the manager's direct reports.
pub fn list_processed(pool: &DbPool, manager_id: &str) -> AppResult<Vec<Expense>> {
    let conn = pool.get()?;
    select_expenses(
        &conn,
        "u.manager_id = ?1 AND e.status IN ('Approved', 'Rejected')",
        rusqlite::params![manager_id],
    )
}

/// Move a pending expense to its terminal state on behalf of `manager_id`.
///
/// The write is a single conditional `UPDATE` guarded on `status = 'Pending'` and on
/// the reporting line, so of two racing decisions exactly one takes effect and the
/// other fails with `InvalidTransition`.
pub fn decide(
    pool: &DbPool,
    expense_id: &str,
    manager_id: &str,
    decision: Decision,
    comment: Option<String>,
) -> AppResult<Expense> {
    let conn = pool.get()?;
    let comment = non_blank(comment);

    let (status, owner) = decision_state(&conn, expense_id)?
        .ok_or_else(|| AppError::NotFound("Expense not found".into()))?;
    check_decidable(expense_id, manager_id, decision, status, owner.as_deref())?;

    let affected = conn.execute(
        "UPDATE expenses SET status = ?1, comments = ?2, updated_at = ?3
         WHERE id = ?4
           AND status = 'Pending'
           AND employee_id IN (SELECT id FROM users WHERE manager_id = ?5)",
        rusqlite::params![decision.outcome(), comment, db::timestamp(), expense_id, manager_id],
    )?;

    if affected == 0 {
        // Someone changed the row between our read and the update
        let (status, owner) = decision_state(&conn, expense_id)?
            .ok_or_else(|| AppError::NotFound("Expense not found".into()))?;
        check_decidable(expense_id, manager_id, decision, status, owner.as_deref())?;
        return Err(AppError::Internal(format!(
            "Decision on expense {expense_id} matched no row"
        )));
    }

    tracing::info!(
        expense_id,
        manager_id,
        status = %decision.outcome(),
        "Expense decided"
    );
    find_expense(&conn, expense_id)?.ok_or_else(|| AppError::NotFound("Expense not found".into()))
}

fn decision_state(
    conn: &Connection,
    expense_id: &str,
) -> AppResult<Option<(ExpenseStatus, Option<String>)>> {
    let state = conn
        .query_row(
            "SELECT e.status, u.manager_id FROM expenses e JOIN users u ON u.id = e.employee_id WHERE e.id = ?1",
            rusqlite::params![expense_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(state)
}

fn check_decidable(
    expense_id: &str,
    manager_id: &str,
    decision: Decision,
    status: ExpenseStatus,
    owner: Option<&str>,
) -> AppResult<()> {
    if owner != Some(manager_id) {
        tracing::warn!(expense_id, manager_id, "Manager tried to decide a foreign expense");
        return Err(AppError::Forbidden(format!(
            "Not authorized to {} this expense",
            decision.verb()
        )));
    }
    if status.is_terminal() {
        return Err(AppError::InvalidTransition(status));
    }
    Ok(())
}

fn find_expense(conn: &Connection, expense_id: &str) -> AppResult<Option<Expense>> {
    let expense = conn
        .query_row(
            &format!(
                "SELECT {EXPENSE_COLUMNS} FROM expenses e JOIN users u ON u.id = e.employee_id WHERE e.id = ?1"
            ),
            rusqlite::params![expense_id],
            Expense::from_row,
        )
        .optional()?;
    Ok(expense)
}

fn select_expenses(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> AppResult<Vec<Expense>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EXPENSE_COLUMNS}
         FROM expenses e
         JOIN users u ON u.id = e.employee_id
         WHERE {filter}
         ORDER BY e.date DESC, e.created_at DESC"
    ))?;
    let rows = stmt.query_map(params, Expense::from_row)?;
    let expenses: Result<Vec<_>, _> = rows.collect();
    Ok(expenses?)
}
