//! `cardvault-auth` — pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. Tokens come
//! in, resolved sessions with a flattened permission set come out.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod roles;
pub mod session;

pub use authorize::{AuthzError, authorize};
pub use claims::{
    Hs256TokenValidator, JwtClaims, TokenValidationError, TokenValidator, validate_claims,
};
pub use permissions::{Action, Module, Permission, PermissionParseError, PermissionSet};
pub use roles::{Role, resolve_permissions, role_grants};
pub use session::Session;
