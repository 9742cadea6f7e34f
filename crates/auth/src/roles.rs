use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions::PermissionSet;

/// Role identifier carried in tokens.
///
/// Roles stay opaque strings at the token boundary; what a role *means* is
/// decided here, once, when the session's permission set is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Branch staff: work the stock, touch nothing else. The `read` spellings
/// are kept as the old role exports wrote them; parsing normalizes them.
const OPERATOR_GRANTS: &[&str] = &[
    "cards:read",
    "locations:read",
    "movements:read",
    "movements:create",
];

/// Inventory managers: full stock control plus catalog upkeep.
const MANAGER_GRANTS: &[&str] = &[
    "banks:view",
    "cards:view",
    "cards:create",
    "cards:edit",
    "locations:view",
    "locations:create",
    "locations:edit",
    "movements:view",
    "movements:create",
    "movements:edit",
    "movements:delete",
    "reports:view",
    "audit:view",
];

/// Read-only oversight across the whole system.
const AUDITOR_GRANTS: &[&str] = &[
    "banks:view",
    "cards:view",
    "locations:view",
    "movements:view",
    "reports:view",
    "audit:view",
];

/// The grant template behind a built-in role, if the role is known.
pub fn role_grants(role: &Role) -> Option<&'static [&'static str]> {
    match role.as_str() {
        "operator" => Some(OPERATOR_GRANTS),
        "manager" => Some(MANAGER_GRANTS),
        "auditor" => Some(AUDITOR_GRANTS),
        _ => None,
    }
}

/// Flatten roles into one permission set.
///
/// "admin" short-circuits to the full set. Unknown roles grant nothing; a
/// token minted against a newer role catalog degrades instead of failing.
/// Built-in templates are pinned parseable by test, so a grant that fails to
/// parse is skipped rather than propagated.
pub fn resolve_permissions(roles: &[Role]) -> PermissionSet {
    let mut set = PermissionSet::empty();
    for role in roles {
        if role.as_str() == "admin" {
            return PermissionSet::full();
        }
        let Some(grants) = role_grants(role) else {
            continue;
        };
        for grant in grants {
            if let Ok(permission) = grant.parse() {
                set.insert(permission);
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use crate::permissions::{Action, Module, Permission};

    use super::*;

    #[test]
    fn every_builtin_grant_parses() {
        for grants in [OPERATOR_GRANTS, MANAGER_GRANTS, AUDITOR_GRANTS] {
            for grant in grants {
                grant.parse::<Permission>().unwrap_or_else(|e| {
                    panic!("built-in grant '{grant}' does not parse: {e}");
                });
            }
        }
    }

    #[test]
    fn operator_reads_normalize_to_view() {
        let set = resolve_permissions(&[Role::new("operator")]);
        assert!(set.allows(Permission::new(Module::Cards, Action::View)));
        assert!(set.allows(Permission::new(Module::Movements, Action::Create)));
        assert!(!set.allows(Permission::new(Module::Movements, Action::Delete)));
        assert!(!set.allows(Permission::new(Module::Banks, Action::View)));
    }

    #[test]
    fn admin_gets_everything() {
        let set = resolve_permissions(&[Role::new("admin")]);
        assert_eq!(set, PermissionSet::full());
    }

    #[test]
    fn roles_union() {
        let set = resolve_permissions(&[Role::new("operator"), Role::new("auditor")]);
        assert!(set.allows(Permission::new(Module::Movements, Action::Create)));
        assert!(set.allows(Permission::new(Module::Audit, Action::View)));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let set = resolve_permissions(&[Role::new("wizard")]);
        assert!(set.is_empty());
    }
}
