// Central Error Type for the Application

use crate::port::ExecutionError;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: ExecutionError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The execution error behind this failure, if any
    pub fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            AppError::Execution(e) | AppError::RetryExhausted { last: e, .. } => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.execution_error(), Some(ExecutionError::Timeout(_)))
    }
}

impl From<crate::domain::DomainError> for AppError {
    fn from(err: crate::domain::DomainError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
