//! Shared primitives for all Rust crates in gpuaudit.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across gpuaudit crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    ///
    /// `field` names the input that carried the value and is reported back on
    /// validation failures.
    pub fn new(field: &str, value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::validation(
                field,
                "value must not be empty or whitespace",
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new("value", value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
///
/// Every variant carries the offending field or operation so callers can log
/// and alert without parsing messages.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input. Not retryable.
    #[error("validation error on '{field}': {message}")]
    Validation {
        /// Input field that failed validation.
        field: String,
        /// Human-readable reason.
        message: String,
    },

    /// Point lookup miss.
    #[error("not found: {0}")]
    NotFound(String),

    /// The durability layer could not complete the operation. Retry with backoff.
    #[error("store unavailable during {operation}: {message}")]
    StoreUnavailable {
        /// Store operation that failed.
        operation: &'static str,
        /// Underlying failure description.
        message: String,
    },

    /// The operation did not finish within the caller deadline.
    #[error("{operation} exceeded timeout of {timeout_ms}ms")]
    TimeoutExceeded {
        /// Operation that was cut off.
        operation: &'static str,
        /// Deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds a validation error for one input field.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds a store failure for one storage operation.
    #[must_use]
    pub fn store_unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation,
            message: message.into(),
        }
    }

    /// Returns a stable label for the error category.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::TimeoutExceeded { .. } => "timeout_exceeded",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns whether a caller may retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::TimeoutExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{AppError, NonEmptyString};

    #[test]
    fn non_empty_string_rejects_whitespace() {
        let result = NonEmptyString::new("model_name", "   ");
        assert!(matches!(
            result,
            Err(AppError::Validation { ref field, .. }) if field == "model_name"
        ));
    }

    #[test]
    fn non_empty_string_rejects_blank_json() {
        let parsed = serde_json::from_str::<NonEmptyString>("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(
            AppError::validation("status", "missing").kind(),
            "validation_error"
        );
        assert_eq!(
            AppError::store_unavailable("append", "disk full").kind(),
            "store_unavailable"
        );
        assert!(
            AppError::TimeoutExceeded {
                operation: "scan",
                timeout_ms: 5
            }
            .is_retryable()
        );
        assert!(!AppError::NotFound("log".to_owned()).is_retryable());
    }
}
