use cardvault_core::UserId;

use crate::authorize::{AuthzError, authorize};
use crate::claims::JwtClaims;
use crate::permissions::{Permission, PermissionSet};
use crate::roles::{Role, resolve_permissions};

/// A fully resolved caller.
///
/// Built once per authenticated request from verified claims. Role-to-grant
/// flattening happens here and only here; every later check is a lookup
/// against the resolved set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: UserId,
    roles: Vec<Role>,
    permissions: PermissionSet,
}

impl Session {
    pub fn resolve(claims: &JwtClaims) -> Self {
        Self {
            user_id: claims.sub,
            permissions: resolve_permissions(&claims.roles),
            roles: claims.roles.clone(),
        }
    }

    /// Assemble a session from already-resolved parts (tests, tooling).
    pub fn from_parts(user_id: UserId, roles: Vec<Role>, permissions: PermissionSet) -> Self {
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn require(&self, permission: Permission) -> Result<(), AuthzError> {
        authorize(self, permission)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::permissions::{Action, Module};

    use super::*;

    #[test]
    fn resolves_roles_into_grants_once() {
        let claims = JwtClaims {
            sub: UserId::new(),
            roles: vec![Role::new("operator")],
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let session = Session::resolve(&claims);
        assert_eq!(session.user_id(), claims.sub);
        assert!(session
            .require(Permission::new(Module::Movements, Action::Create))
            .is_ok());
        let err = session
            .require(Permission::new(Module::Movements, Action::Delete))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "forbidden: missing permission 'movements:delete'"
        );
    }
}
