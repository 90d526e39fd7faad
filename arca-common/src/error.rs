//! Error taxonomy shared by every ARCA component.
//!
//! The kind drives client retry policy; the message is for humans only.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyExists,
    NetworkConflict,
    CapacityExhausted,
    Transient,
    StateMachine,
    Corruption,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum ArcaError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("network resource conflict: {0}")]
    NetworkConflict(String),

    #[error("capacity exhausted: {0}")]
    CapacityExhausted(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("invalid state transition: {0}")]
    StateMachine(String),

    #[error("corrupted state: {0}")]
    Corruption(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArcaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArcaError::Validation(_) => ErrorKind::Validation,
            ArcaError::NotFound(_) => ErrorKind::NotFound,
            ArcaError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ArcaError::NetworkConflict(_) => ErrorKind::NetworkConflict,
            ArcaError::CapacityExhausted(_) => ErrorKind::CapacityExhausted,
            ArcaError::Transient(_) => ErrorKind::Transient,
            ArcaError::StateMachine(_) => ErrorKind::StateMachine,
            ArcaError::Corruption(_) => ErrorKind::Corruption,
            ArcaError::Unavailable(_) => ErrorKind::Unavailable,
            ArcaError::Other(_) => ErrorKind::Transient,
        }
    }

    /// Whether a caller should retry this error with backoff (§7 "Transient").
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Unavailable)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ArcaError::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        ArcaError::AlreadyExists(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        ArcaError::Validation(what.into())
    }
}

pub type Result<T> = std::result::Result<T, ArcaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ArcaError::not_found("svm x").kind(), ErrorKind::NotFound);
        assert_eq!(
            ArcaError::already_exists("svm x").kind(),
            ErrorKind::AlreadyExists
        );
        assert!(ArcaError::Transient("timeout".into()).is_retryable());
        assert!(!ArcaError::Validation("bad name".into()).is_retryable());
    }
}
