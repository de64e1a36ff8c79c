//! Read-only RBAC catalog.

use std::sync::Arc;

use axum::{
    Router,
    extract::Extension,
    response::Response,
    routing::get,
};

use churchos_infra::IdentityServices;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/permissions", get(list_permissions))
}

/// GET /roles - roles with their permission names.
pub async fn list_roles(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&principal, &["system.view"])?;
    let roles = services.rbac.list_roles().await?;
    Ok(dto::ok(roles))
}

/// GET /permissions
pub async fn list_permissions(
    Extension(services): Extension<Arc<IdentityServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&principal, &["system.view"])?;
    let permissions = services.rbac.list_permissions().await?;
    Ok(dto::ok(permissions))
}
