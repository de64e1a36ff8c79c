//! Route-level permission checks.
//!
//! Handlers call [`require`] before touching services. The check is a pure
//! function of the permission set resolved by the auth middleware.

use tracing::info;

use churchos_auth::authorize;

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

/// Passes when the principal holds any of `required`.
pub fn require(principal: &PrincipalContext, required: &[&str]) -> Result<(), ApiError> {
    authorize(principal.principal(), required).map_err(|err| {
        info!(
            user_id = %principal.user_id(),
            role = %principal.role_name(),
            required = ?required,
            "permission denied"
        );
        ApiError::from(err)
    })
}
