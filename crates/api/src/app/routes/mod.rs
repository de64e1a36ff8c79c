use axum::Router;

pub mod auth;
pub mod common;
pub mod organizations;
pub mod rbac;
pub mod system;
pub mod users;

/// Endpoints reachable without a bearer token.
pub fn public_router() -> Router {
    auth::public_router()
}

/// Endpoints that run behind the auth middleware.
pub fn protected_router() -> Router {
    Router::new()
        .merge(auth::protected_router())
        .merge(users::router())
        .merge(rbac::router())
        .merge(organizations::router())
}
