use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::Principal;

/// Resolved set of permission names held by a principal.
///
/// Computed once per request from the principal's role and carried in the
/// request context, so the authorization predicate is a pure function of
/// this value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True if any of `required` is held (match-any).
    pub fn intersects<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().any(|p| self.contains(p.as_ref()))
    }

    /// True if every one of `required` is held (match-all).
    pub fn covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|p| self.contains(p.as_ref()))
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("role not found/assigned")]
    NoRole,

    #[error("role '{role}' is not authorized to access this route")]
    Forbidden { role: String, required: Vec<String> },
}

/// Authorize a principal against a list of required permissions.
///
/// Passes when the principal holds **any** of `required`. An empty
/// requirement list never passes.
///
/// - No IO
/// - No panics
pub fn authorize<S: AsRef<str>>(principal: &Principal, required: &[S]) -> Result<(), AuthzError> {
    if principal.permissions.intersects(required) {
        Ok(())
    } else {
        Err(forbidden(principal, required))
    }
}

/// Strict variant of [`authorize`]: passes only when **every** permission in
/// `required` is held. An empty requirement list never passes.
pub fn authorize_all<S: AsRef<str>>(principal: &Principal, required: &[S]) -> Result<(), AuthzError> {
    if !required.is_empty() && principal.permissions.covers(required) {
        Ok(())
    } else {
        Err(forbidden(principal, required))
    }
}

fn forbidden<S: AsRef<str>>(principal: &Principal, required: &[S]) -> AuthzError {
    AuthzError::Forbidden {
        role: principal.role_name.clone(),
        required: required.iter().map(|p| p.as_ref().to_string()).collect(),
    }
}
