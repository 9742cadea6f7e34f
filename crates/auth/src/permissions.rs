use core::fmt;
use core::str::FromStr;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Module / Action
// ─────────────────────────────────────────────────────────────────────────────

/// Functional area a permission applies to.
///
/// The set is closed: adding a module is a code change, not a data migration.
/// A check against a module that does not exist cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Banks,
    Cards,
    Locations,
    Movements,
    Audit,
    Users,
    Reports,
    Settings,
}

impl Module {
    pub const ALL: [Module; 8] = [
        Module::Banks,
        Module::Cards,
        Module::Locations,
        Module::Movements,
        Module::Audit,
        Module::Users,
        Module::Reports,
        Module::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Banks => "banks",
            Module::Cards => "cards",
            Module::Locations => "locations",
            Module::Movements => "movements",
            Module::Audit => "audit",
            Module::Users => "users",
            Module::Reports => "reports",
            Module::Settings => "settings",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What may be done within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        // "read" is the spelling older role exports used for "view".
        if s == "read" {
            return Some(Action::View);
        }
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission
// ─────────────────────────────────────────────────────────────────────────────

/// One grant: an action on a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub module: Module,
    pub action: Action,
}

impl Permission {
    pub const fn new(module: Module, action: Action) -> Self {
        Self { module, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("malformed permission grant '{0}' (expected module:action)")]
    Malformed(String),

    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

impl FromStr for Permission {
    type Err = PermissionParseError;

    /// Parse a `module:action` grant string.
    ///
    /// Grant strings only exist at the edges (role templates, token audits);
    /// everything past parsing works with the typed form. Parsing is where
    /// legacy spellings get normalized.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(module), Some(action), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(PermissionParseError::Malformed(s.to_string()));
        };
        let module = module.trim().to_ascii_lowercase();
        let action = action.trim().to_ascii_lowercase();
        if module.is_empty() || action.is_empty() {
            return Err(PermissionParseError::Malformed(s.to_string()));
        }
        let module = Module::parse(&module)
            .ok_or_else(|| PermissionParseError::UnknownModule(module.clone()))?;
        let action = Action::parse(&action)
            .ok_or_else(|| PermissionParseError::UnknownAction(action.clone()))?;
        Ok(Permission::new(module, action))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PermissionSet
// ─────────────────────────────────────────────────────────────────────────────

/// The flattened set of grants a session operates with.
///
/// Resolved once when a session starts. A permission check afterwards is a
/// set lookup; no string is parsed, no role is consulted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionSet {
    grants: HashSet<Permission>,
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every action on every module. What "admin" flattens to.
    pub fn full() -> Self {
        let mut grants = HashSet::new();
        for module in Module::ALL {
            for action in Action::ALL {
                grants.insert(Permission::new(module, action));
            }
        }
        Self { grants }
    }

    /// Parse a batch of grant strings. Fails on the first bad grant.
    pub fn from_grants<I, S>(grants: I) -> Result<Self, PermissionParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::empty();
        for grant in grants {
            set.insert(grant.as_ref().parse()?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, permission: Permission) {
        self.grants.insert(permission);
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.grants.contains(&permission)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Grant strings, sorted, for display and audit output.
    pub fn grant_strings(&self) -> Vec<String> {
        let mut grants: Vec<String> = self.grants.iter().map(Permission::to_string).collect();
        grants.sort();
        grants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_grants() {
        let p: Permission = "cards:view".parse().unwrap();
        assert_eq!(p, Permission::new(Module::Cards, Action::View));
        assert_eq!(p.to_string(), "cards:view");
    }

    #[test]
    fn normalizes_legacy_read_and_loose_spelling() {
        let p: Permission = " Movements:READ ".parse().unwrap();
        assert_eq!(p, Permission::new(Module::Movements, Action::View));
    }

    #[test]
    fn rejects_malformed_and_unknown_grants() {
        assert!(matches!(
            "cards".parse::<Permission>(),
            Err(PermissionParseError::Malformed(_))
        ));
        assert!(matches!(
            "cards:view:extra".parse::<Permission>(),
            Err(PermissionParseError::Malformed(_))
        ));
        assert!(matches!(
            "widgets:view".parse::<Permission>(),
            Err(PermissionParseError::UnknownModule(_))
        ));
        assert!(matches!(
            "cards:destroy".parse::<Permission>(),
            Err(PermissionParseError::UnknownAction(_))
        ));
    }

    #[test]
    fn set_membership_is_exact() {
        let set = PermissionSet::from_grants(["cards:view", "movements:create"]).unwrap();
        assert!(set.allows(Permission::new(Module::Cards, Action::View)));
        assert!(!set.allows(Permission::new(Module::Cards, Action::Edit)));
        assert!(!set.allows(Permission::new(Module::Banks, Action::View)));
    }

    #[test]
    fn full_set_covers_every_module_action_pair() {
        let full = PermissionSet::full();
        assert_eq!(full.len(), Module::ALL.len() * Action::ALL.len());
        for module in Module::ALL {
            for action in Action::ALL {
                assert!(full.allows(Permission::new(module, action)));
            }
        }
    }

    #[test]
    fn batch_parse_fails_fast() {
        let err = PermissionSet::from_grants(["cards:view", "nope"]).unwrap_err();
        assert!(matches!(err, PermissionParseError::Malformed(_)));
    }
}
