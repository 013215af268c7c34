pub mod accounts;
pub mod admin;
pub mod directory;
pub mod expenses;

use crate::error::{AppError, AppResult};

/// Collects missing or malformed request fields so they are reported together.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors(Vec<String>);

impl FieldErrors {
    /// Returns the trimmed value, recording `field` when it is absent or blank.
    pub fn required(&mut self, field: &str, value: Option<&str>) -> String {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => {
                self.invalid(field);
                String::new()
            }
        }
    }

    pub fn invalid(&mut self, field: &str) {
        if !self.0.iter().any(|f| f == field) {
            self.0.push(field.to_string());
        }
    }

    pub fn finish(self) -> AppResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

/// Blank optional strings (`""`, `"  "`) count as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
