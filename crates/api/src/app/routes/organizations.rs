//! `/organizations/:id/verify-*`: contact verification for an organization.
//! Authenticated; any signed-in user may drive it.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    response::Response,
    routing::post,
};

use churchos_core::OrganizationId;
use churchos_infra::IdentityServices;

use crate::app::dto::{self, ApiJson, OtpRequest, TokenRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;

pub fn router() -> Router {
    Router::new()
        .route("/organizations/:id/verify-email/send", post(send_email_verification))
        .route("/organizations/:id/verify-email/confirm", post(confirm_email))
        .route("/organizations/:id/verify-phone/send", post(send_phone_otp))
        .route("/organizations/:id/verify-phone/confirm", post(confirm_phone))
}

pub async fn send_email_verification(
    Extension(services): Extension<Arc<IdentityServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: OrganizationId = parse_id(&id)?;
    services.organizations.send_email_verification(id).await?;
    Ok(dto::message("Verification email sent"))
}

pub async fn confirm_email(
    Extension(services): Extension<Arc<IdentityServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<TokenRequest>,
) -> Result<Response, ApiError> {
    let id: OrganizationId = parse_id(&id)?;
    let organization = services.organizations.confirm_email(id, &body.token).await?;
    Ok(dto::ok_with_message("Email verified successfully", organization))
}

pub async fn send_phone_otp(
    Extension(services): Extension<Arc<IdentityServices>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: OrganizationId = parse_id(&id)?;
    services.organizations.send_phone_otp(id).await?;
    Ok(dto::message("OTP sent"))
}

pub async fn confirm_phone(
    Extension(services): Extension<Arc<IdentityServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<OtpRequest>,
) -> Result<Response, ApiError> {
    let id: OrganizationId = parse_id(&id)?;
    let organization = services.organizations.confirm_phone(id, &body.otp).await?;
    Ok(dto::ok_with_message("Phone number verified successfully", organization))
}
