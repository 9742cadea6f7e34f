use chrono::{DateTime, Utc};

use cardvault_core::{BankId, DomainError, DomainResult, LocationId};

/// A physical place stock sits in: a vault, a branch, a warehouse shelf.
/// Every location belongs to exactly one bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    id: LocationId,
    bank_id: BankId,
    name: String,
    site: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Location {
    pub fn new(
        id: LocationId,
        bank_id: BankId,
        name: impl Into<String>,
        site: Option<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(DomainError::validation("location name cannot be empty"));
        }
        let site = site.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        Ok(Self {
            id,
            bank_id,
            name,
            site,
            is_active: true,
            created_at,
        })
    }

    /// Rebuild from storage. Values are assumed already validated.
    pub fn restore(
        id: LocationId,
        bank_id: BankId,
        name: String,
        site: Option<String>,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bank_id,
            name,
            site,
            is_active,
            created_at,
        }
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn bank_id(&self) -> BankId {
        self.bank_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_name() {
        let err = Location::new(LocationId::new(), BankId::new(), "  ", None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn blank_site_is_normalized_to_none() {
        let location = Location::new(
            LocationId::new(),
            BankId::new(),
            "Main Vault",
            Some("   ".into()),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(location.site(), None);
    }
}
