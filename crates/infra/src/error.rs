//! Service-level error taxonomy.
//!
//! Every failure that reaches the request boundary is one of these. The API
//! layer owns the HTTP status mapping.

use thiserror::Error;

use churchos_auth::{AuthzError, PasswordError, TokenError};
use churchos_core::DomainError;

use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    DuplicateEntity(String),

    /// Same variant for unknown user and wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Wrong value, expired, or no matching entity: indistinguishable.
    #[error("Invalid or expired token")]
    SecretInvalidOrExpired,

    /// Issuance was rolled back. `debug_secret` is only populated outside
    /// production.
    #[error("{message}")]
    DeliveryFailed {
        message: String,
        debug_secret: Option<String>,
    },

    /// Details are for logs only.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IdentityError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<StoreError> for IdentityError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate(msg) => IdentityError::DuplicateEntity(msg),
            StoreError::NotFound => IdentityError::NotFound("not found".to_string()),
            StoreError::Backend(msg) => IdentityError::Internal(msg),
        }
    }
}

impl From<DomainError> for IdentityError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => IdentityError::Validation(msg),
        }
    }
}

impl From<TokenError> for IdentityError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::InvalidToken => IdentityError::InvalidToken,
            TokenError::TokenExpired => IdentityError::TokenExpired,
            TokenError::InvalidRefreshToken => IdentityError::InvalidRefreshToken,
            TokenError::Signing(msg) => IdentityError::Internal(msg),
        }
    }
}

impl From<PasswordError> for IdentityError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::TooShort => IdentityError::Validation(value.to_string()),
            PasswordError::InvalidParams(msg) | PasswordError::Hash(msg) => IdentityError::Internal(msg),
        }
    }
}

impl From<AuthzError> for IdentityError {
    fn from(value: AuthzError) -> Self {
        IdentityError::Forbidden(value.to_string())
    }
}
