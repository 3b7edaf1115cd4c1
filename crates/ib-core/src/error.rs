//! # AppError
//!
//! Centralized error handling for the Interview-Board ecosystem.
//! Maps domain-specific failures to the four outcomes the API reports.

use thiserror::Error;

/// The primary error type for all ib-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Missing or out-of-domain parameters (e.g., limit above 50, unknown sort key)
    #[error("{0}")]
    InvalidInput(String),

    /// PIN mismatch or token failure
    #[error("{0}")]
    Unauthorized(String),

    /// Resource not found (e.g., Post)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Infrastructure failure (e.g., DB down, disk full, SMTP refused)
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn post_not_found(id: i64) -> Self {
        Self::NotFound("Post".to_string(), id.to_string())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP-equivalent status code carried in the error envelope.
    pub fn code(&self) -> u16 {
        match self {
            AppError::InvalidInput(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(..) => 404,
            AppError::Internal(_) => 500,
        }
    }
}

/// Failure of the bearer-token collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization token")]
    Missing,

    #[error("authorization token expired")]
    Expired,

    #[error("invalid authorization token: {0}")]
    Invalid(String),
}

/// A specialized Result type for Interview-Board logic.
pub type Result<T> = std::result::Result<T, AppError>;
