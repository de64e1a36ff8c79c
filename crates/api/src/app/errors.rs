use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use churchos_auth::AuthzError;
use churchos_infra::IdentityError;

/// Uniform failure body: `{ "success": false, "message": ... }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_secret: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    debug_secret: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            debug_secret: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let status = status_for(&err);
        match err {
            IdentityError::Internal(detail) => {
                error!(error = %detail, "internal error");
                Self::new(status, "Internal server error")
            }
            IdentityError::DeliveryFailed { message, debug_secret } => {
                warn!(message = %message, "delivery failed");
                Self {
                    status,
                    message,
                    debug_secret,
                }
            }
            other => Self::new(status, other.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        IdentityError::from(err).into()
    }
}

fn status_for(err: &IdentityError) -> StatusCode {
    match err {
        IdentityError::Validation(_) | IdentityError::DuplicateEntity(_) | IdentityError::SecretInvalidOrExpired => {
            StatusCode::BAD_REQUEST
        }
        IdentityError::InvalidCredentials
        | IdentityError::InvalidToken
        | IdentityError::TokenExpired
        | IdentityError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
        IdentityError::Forbidden(_) => StatusCode::FORBIDDEN,
        IdentityError::NotFound(_) => StatusCode::NOT_FOUND,
        IdentityError::DeliveryFailed { .. } | IdentityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                success: false,
                message: self.message,
                debug_secret: self.debug_secret,
            }),
        )
            .into_response()
    }
}
