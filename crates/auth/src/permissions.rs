use serde::{Deserialize, Serialize};

use churchos_core::{DomainError, Entity, PermissionId, ValueObject};

/// Permission name in `module.action` form (e.g. `"user.read"`).
///
/// Names are globally unique and are the unit the authorization predicate
/// works on. Construction normalizes surrounding whitespace and rejects
/// anything that is not at least two non-empty dot-separated segments of
/// lowercase ASCII, digits or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName(String);

impl PermissionName {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let name = raw.trim();
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() < 2 {
            return Err(DomainError::validation(format!(
                "permission '{name}' must be in module.action form"
            )));
        }
        let valid_segment = |s: &&str| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        };
        if !segments.iter().all(valid_segment) {
            return Err(DomainError::validation(format!(
                "permission '{name}' contains an invalid segment"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading segment, used as the default module tag.
    pub fn module(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl ValueObject for PermissionName {}

impl TryFrom<String> for PermissionName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionName> for String {
    fn from(value: PermissionName) -> Self {
        value.0
    }
}

impl core::fmt::Display for PermissionName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named capability, grouped under a module tag for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: PermissionName,
    pub description: Option<String>,
    pub module: String,
}

impl Permission {
    pub fn new(name: PermissionName, description: Option<String>, module: impl Into<String>) -> Self {
        Self {
            id: PermissionId::new(),
            name,
            description,
            module: module.into(),
        }
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
