//! Signed bearer tokens (HS256).
//!
//! Access and refresh tokens use different keys and carry a `typ` claim.
//! Expiry is checked against the injected [`Clock`], not the wall clock, so
//! `jsonwebtoken`'s own `exp` validation is disabled.

use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use thiserror::Error;

use churchos_core::{Clock, UserId};

use crate::claims::{JwtClaims, TokenKind, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Issues and verifies access/refresh tokens. Cheap to clone.
#[derive(Clone)]
pub struct TokenService {
    access: Arc<Keys>,
    refresh: Arc<Keys>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            access: Arc::new(Keys::from_secret(access_secret)),
            refresh: Arc::new(Keys::from_secret(refresh_secret)),
            access_ttl,
            refresh_ttl,
            clock,
        }
    }

    pub fn issue_pair(&self, subject: UserId) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject)?,
            refresh_token: self.sign(subject, TokenKind::Refresh)?,
        })
    }

    pub fn issue_access(&self, subject: UserId) -> Result<String, TokenError> {
        self.sign(subject, TokenKind::Access)
    }

    pub fn verify_access(&self, token: &str) -> Result<UserId, TokenError> {
        let claims = self.decode(token, &self.access.decoding).ok_or(TokenError::InvalidToken)?;
        match validate_claims(&claims, TokenKind::Access, self.clock.now()) {
            Ok(()) => Ok(claims.sub),
            Err(TokenValidationError::Expired) => Err(TokenError::TokenExpired),
            Err(_) => Err(TokenError::InvalidToken),
        }
    }

    /// Any refresh failure (signature, kind, expiry) collapses to
    /// [`TokenError::InvalidRefreshToken`].
    pub fn verify_refresh(&self, token: &str) -> Result<UserId, TokenError> {
        let claims = self
            .decode(token, &self.refresh.decoding)
            .ok_or(TokenError::InvalidRefreshToken)?;
        validate_claims(&claims, TokenKind::Refresh, self.clock.now())
            .map_err(|_| TokenError::InvalidRefreshToken)?;
        Ok(claims.sub)
    }

    fn sign(&self, subject: UserId, kind: TokenKind) -> Result<String, TokenError> {
        let (keys, ttl) = match kind {
            TokenKind::Access => (&self.access, self.access_ttl),
            TokenKind::Refresh => (&self.refresh, self.refresh_ttl),
        };
        let now = self.clock.now();
        let claims = JwtClaims::new(subject, kind, now, now + ttl);
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn decode(&self, token: &str, key: &DecodingKey) -> Option<JwtClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        decode::<JwtClaims>(token, key, &validation).ok().map(|data| data.claims)
    }
}
