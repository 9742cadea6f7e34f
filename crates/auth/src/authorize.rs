use thiserror::Error;

use crate::permissions::Permission;
use crate::session::Session;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(Permission),
}

/// Authorize a resolved session against one required permission.
///
/// - No IO
/// - No panics
/// - No string parsing (that happened at session resolution)
pub fn authorize(session: &Session, required: Permission) -> Result<(), AuthzError> {
    if session.permissions().allows(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required))
    }
}

#[cfg(test)]
mod tests {
    use cardvault_core::UserId;

    use crate::permissions::{Action, Module, PermissionSet};

    use super::*;

    #[test]
    fn allows_only_whats_in_the_set() {
        let set = PermissionSet::from_grants(["audit:view"]).unwrap();
        let session = Session::from_parts(UserId::new(), Vec::new(), set);
        assert!(authorize(&session, Permission::new(Module::Audit, Action::View)).is_ok());
        assert_eq!(
            authorize(&session, Permission::new(Module::Audit, Action::Delete)),
            Err(AuthzError::Forbidden(Permission::new(
                Module::Audit,
                Action::Delete
            )))
        );
    }
}
