//! Expense submission and approval service.
//!
//! Admins manage employee and manager accounts, employees submit expenses, and
//! each employee's manager approves or rejects them exactly once.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
