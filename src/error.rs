//! Error types for the voice banking assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, BankingError>;

/// How an error is surfaced to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    Internal,
}

#[derive(Error, Debug)]
pub enum BankingError {

    // =============================
    // Authentication
    // =============================

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Unknown refresh token")]
    UnknownToken,

    // =============================
    // Missing records
    // =============================

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Voice profile missing for user {0}")]
    VoiceProfileMissing(String),

    #[error("Session missing for user {0}")]
    SessionMissing(String),

    #[error("Transfer session missing: {0}")]
    TransferSessionMissing(String),

    // =============================
    // Request validation
    // =============================

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Amount {amount} exceeds daily limit {limit}")]
    LimitExceeded { amount: f64, limit: f64 },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: f64, available: f64 },

    // =============================
    // Infrastructure
    // =============================

    #[error("External service degraded: {0}")]
    ExternalServiceDegraded(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BankingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BankingError::AuthenticationFailed(_)
            | BankingError::TokenInvalid(_)
            | BankingError::TokenExpired
            | BankingError::UnknownToken => ErrorKind::Unauthorized,

            BankingError::Forbidden(_) => ErrorKind::Forbidden,

            BankingError::NotFound(_)
            | BankingError::VoiceProfileMissing(_)
            | BankingError::SessionMissing(_)
            | BankingError::TransferSessionMissing(_) => ErrorKind::NotFound,

            BankingError::ValidationFailed(_)
            | BankingError::LimitExceeded { .. }
            | BankingError::InsufficientFunds { .. }
            | BankingError::InvalidAudio(_)
            | BankingError::SerializationError(_) => ErrorKind::BadRequest,

            BankingError::ExternalServiceDegraded(_)
            | BankingError::DatabaseError(_)
            | BankingError::Internal(_)
            | BankingError::HttpError(_)
            | BankingError::IoError(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for BankingError {
    fn from(e: sqlx::Error) -> Self {
        BankingError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_kinds() {
        assert_eq!(
            BankingError::AuthenticationFailed("otp".into()).kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(BankingError::TokenExpired.kind(), ErrorKind::Unauthorized);
        assert_eq!(BankingError::UnknownToken.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            BankingError::TransferSessionMissing("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BankingError::LimitExceeded { amount: 60000.0, limit: 50000.0 }.kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            BankingError::DatabaseError("down".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_limit_message() {
        let err = BankingError::LimitExceeded { amount: 60000.0, limit: 50000.0 };
        assert_eq!(err.to_string(), "Amount 60000 exceeds daily limit 50000");
    }
}
