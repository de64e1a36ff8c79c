//! `churchos-auth` — pure identity and access-control domain.
//!
//! No HTTP, no storage. Everything here is deterministic given a clock
//! value, except password hashing and secret generation which draw from the
//! OS RNG.

pub mod authorize;
pub mod claims;
pub mod organization;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod secret;
pub mod seed;
pub mod tokens;
pub mod user;

pub use authorize::{AuthzError, PermissionSet, authorize, authorize_all};
pub use claims::{JwtClaims, TokenKind, TokenValidationError, validate_claims};
pub use organization::{Organization, OrganizationSummary};
pub use password::{HashCost, MIN_PASSWORD_LEN, PasswordError, PasswordHash, PasswordHasher, check_password_policy};
pub use permissions::{Permission, PermissionName};
pub use principal::{Principal, ResolvedIdentity, ResolvedRole};
pub use roles::{Role, SUPER_ADMIN};
pub use secret::{
    EntityKind, SecretHolder, SecretLookup, SecretPurpose, SecretShape, SecretSlot, generate_plaintext, hash_secret,
};
pub use seed::{Grant, PermissionSpec, ResolvedGrant, RoleSpec, SeedPlan, default_plan};
pub use tokens::{TokenError, TokenPair, TokenService};
pub use user::{Email, NewUser, PhoneNumber, User, UserProfile};
