//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures of the invitation pipeline
/// (validation, conflicts, missing work). Infrastructure concerns belong to
/// the store and dispatch layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Required configuration is missing or malformed. Fatal: nothing may be
    /// sent before this is resolved.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value failed validation (e.g. malformed email address). Per-record,
    /// never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A conflict occurred (e.g. an email already has an active invitation).
    #[error("conflict: {0}")]
    Conflict(String),

    /// No matching pending work. Benign: callers report it, not throw it.
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
