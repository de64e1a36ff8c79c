//! `/users`: account administration.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    response::Response,
    routing::{get, put},
};

use churchos_core::UserId;
use churchos_infra::IdentityServices;
use churchos_infra::services::CreateUserInput;

use crate::app::dto::{self, ApiJson, AssignRoleRequest};
use crate::app::errors::ApiError;
use crate::app::routes::common::parse_id;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/role", put(assign_role))
}

/// POST /users - requires `user.create`.
pub async fn create_user(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateUserInput>,
) -> Result<Response, ApiError> {
    authz::require(&principal, &["user.create"])?;
    let user = services.accounts.create_user(body).await?;
    Ok(dto::created(user))
}

/// GET /users - requires `user.read`.
pub async fn list_users(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&principal, &["user.read"])?;
    let users = services.accounts.list_users().await?;
    Ok(dto::ok(users))
}

/// PUT /users/:id/role - requires `user.update`.
pub async fn assign_role(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AssignRoleRequest>,
) -> Result<Response, ApiError> {
    authz::require(&principal, &["user.update"])?;
    let target: UserId = parse_id(&id)?;
    let user = services.accounts.assign_role(target, &body.role).await?;
    Ok(dto::ok(user))
}
