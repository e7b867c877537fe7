use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Category;

/// Core error type shared across WhoDB crates.
///
/// Backend failures keep the store's own message inside the variant so callers
/// can render store-specific diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage unit, column, or row is absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// The operation is not meaningful for this store category.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Condition operator outside the active category's operator set.
    #[error("operator '{operator}' is not supported for {category} storage units")]
    UnsupportedOperator { operator: String, category: Category },
    /// Uniqueness, foreign-key, nullability or type failure reported by the store.
    #[error("constraint violation on '{unit}': {detail}")]
    ConstraintViolation { unit: String, detail: String },
    /// Foreign-key cycle among the units of a generation request.
    #[error("foreign key cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),
    /// Rejected import data.
    #[error("validation failed: {0}")]
    Validation(ValidationError),
    /// Driver or transport failure that is not a constraint violation.
    #[error("database error: {0}")]
    Db(String),
    /// Failure writing an export or reading an input stream.
    #[error("io error: {0}")]
    Io(String),
}

/// Stable discriminant of [`Error`] for structured rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unsupported,
    UnsupportedOperator,
    ConstraintViolation,
    CycleDetected,
    ValidationError,
    Database,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::UnsupportedOperator => "UnsupportedOperator",
            ErrorKind::ConstraintViolation => "ConstraintViolation",
            ErrorKind::CycleDetected => "CycleDetected",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::Database => "Database",
            ErrorKind::Io => "Io",
        };
        f.write_str(label)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::UnsupportedOperator { .. } => ErrorKind::UnsupportedOperator,
            Error::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Error::CycleDetected(_) => ErrorKind::CycleDetected,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Db(_) => ErrorKind::Database,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    pub fn constraint(unit: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::ConstraintViolation {
            unit: unit.into(),
            detail: detail.into(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation(ValidationError::new(code, message))
    }
}

/// Structured validation failure with a stable code (e.g. `import.validation.duplicateHeader`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    /// 1-based data row the failure refers to, when it is row-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl ValidationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            row: None,
            column: None,
        }
    }

    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    pub fn at_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(row) = self.row {
            write!(f, " at row {row}")?;
        }
        if let Some(column) = &self.column {
            write!(f, " in column '{column}'")?;
        }
        Ok(())
    }
}

/// Convenience alias for results returned by WhoDB crates.
pub type Result<T> = std::result::Result<T, Error>;
