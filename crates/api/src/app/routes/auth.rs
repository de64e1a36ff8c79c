//! `/auth/*`: registration, login, token refresh, verification secrets and
//! the caller's own account.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    response::Response,
    routing::{delete, get, post},
};

use churchos_core::UserId;
use churchos_infra::IdentityServices;
use churchos_infra::services::{RegisterInput, UpdateProfileInput};

use crate::app::dto::{
    self, AccessTokenResponse, ApiJson, ChangePasswordRequest, EmailRequest, LoginRequest, PhoneRequest,
    RefreshRequest, ResetPasswordRequest, TokenRequest, VerifyOtpRequest, VerifyPhoneOtpRequest,
};
use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;
use crate::context::PrincipalContext;

type Services = Extension<Arc<IdentityServices>>;

pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/send-email-verification", post(send_email_verification))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/send-phone-otp", post(send_phone_otp))
        .route("/auth/verify-phone-otp", post(verify_phone_otp))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/me", get(me).patch(update_me))
        .route("/auth/change-password", post(change_password))
        .route("/auth/delete/:id", delete(delete_account))
}

pub async fn register(
    Extension(services): Services,
    ApiJson(body): ApiJson<RegisterInput>,
) -> Result<Response, ApiError> {
    let session = services.accounts.register(body).await?;
    Ok(dto::created(session))
}

pub async fn login(Extension(services): Services, ApiJson(body): ApiJson<LoginRequest>) -> Result<Response, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Please provide email and password"));
    }
    let session = services.accounts.login(&body.email, &body.password).await?;
    Ok(dto::ok(session))
}

pub async fn refresh(
    Extension(services): Services,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> Result<Response, ApiError> {
    let access_token = services.accounts.refresh(&body.refresh_token).await?;
    Ok(dto::ok(AccessTokenResponse { access_token }))
}

pub async fn send_email_verification(
    Extension(services): Services,
    ApiJson(body): ApiJson<EmailRequest>,
) -> Result<Response, ApiError> {
    services.recovery.send_email_verification(&body.email).await?;
    Ok(dto::message("Verification email sent"))
}

pub async fn verify_email(
    Extension(services): Services,
    ApiJson(body): ApiJson<TokenRequest>,
) -> Result<Response, ApiError> {
    let user = services.recovery.verify_email(&body.token).await?;
    Ok(dto::ok_with_message("Email verified successfully", user))
}

pub async fn send_otp(Extension(services): Services, ApiJson(body): ApiJson<EmailRequest>) -> Result<Response, ApiError> {
    services.recovery.send_otp(&body.email).await?;
    Ok(dto::message("OTP sent"))
}

pub async fn verify_otp(
    Extension(services): Services,
    ApiJson(body): ApiJson<VerifyOtpRequest>,
) -> Result<Response, ApiError> {
    services.recovery.verify_otp(&body.email, &body.otp).await?;
    Ok(dto::message("OTP verified successfully"))
}

pub async fn send_phone_otp(
    Extension(services): Services,
    ApiJson(body): ApiJson<PhoneRequest>,
) -> Result<Response, ApiError> {
    services.recovery.send_phone_otp(&body.phone_number).await?;
    Ok(dto::message("OTP sent"))
}

pub async fn verify_phone_otp(
    Extension(services): Services,
    ApiJson(body): ApiJson<VerifyPhoneOtpRequest>,
) -> Result<Response, ApiError> {
    let user = services.recovery.verify_phone_otp(&body.phone_number, &body.otp).await?;
    Ok(dto::ok_with_message("Phone number verified successfully", user))
}

pub async fn forgot_password(
    Extension(services): Services,
    ApiJson(body): ApiJson<EmailRequest>,
) -> Result<Response, ApiError> {
    services.recovery.forgot_password(&body.email).await?;
    Ok(dto::message("Password reset email sent"))
}

pub async fn reset_password(
    Extension(services): Services,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    let session = services.recovery.reset_password(&body.token, &body.new_password).await?;
    Ok(dto::ok_with_message("Password updated successfully", session))
}

pub async fn me(
    Extension(services): Services,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    let user = services.accounts.me(principal.user_id()).await?;
    Ok(dto::ok(user))
}

pub async fn update_me(
    Extension(services): Services,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<UpdateProfileInput>,
) -> Result<Response, ApiError> {
    let user = services.accounts.update_profile(principal.user_id(), body).await?;
    Ok(dto::ok(user))
}

pub async fn change_password(
    Extension(services): Services,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    services
        .accounts
        .change_password(principal.user_id(), &body.current_password, &body.new_password)
        .await?;
    Ok(dto::message("Password updated successfully"))
}

pub async fn delete_account(
    Extension(services): Services,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let target: UserId = parse_id(&id)?;
    services.accounts.delete_user(principal.principal(), target).await?;
    Ok(dto::message("User deleted successfully"))
}
