use chrono::{DateTime, Utc};

use cardvault_core::{BankId, DomainError, DomainResult};

/// A card-issuing bank. Banks own cards and locations; the two never mix
/// across bank boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    id: BankId,
    code: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl Bank {
    pub fn new(
        id: BankId,
        code: impl Into<String>,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let code = code.into().trim().to_owned();
        let name = name.into().trim().to_owned();
        if code.is_empty() {
            return Err(DomainError::validation("bank code cannot be empty"));
        }
        if name.is_empty() {
            return Err(DomainError::validation("bank name cannot be empty"));
        }
        Ok(Self {
            id,
            code,
            name,
            is_active: true,
            created_at,
        })
    }

    /// Rebuild from storage. Values are assumed already validated.
    pub fn restore(
        id: BankId,
        code: String,
        name: String,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            name,
            is_active,
            created_at,
        }
    }

    pub fn id(&self) -> BankId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
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

/// Bank reference fields as they appear on a card import row.
///
/// Import templates are inconsistent: newer ones carry an explicit bank id
/// column, older ones reuse the row's generic "ID" column for the bank, and
/// the oldest only have a free-text code or name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportBankRef {
    /// Explicit bank id column.
    pub bank_id: Option<String>,
    /// The row's generic "ID" column.
    pub row_id: Option<String>,
    /// Free-text bank code or name.
    pub bank: Option<String>,
}

/// Resolve which bank an import row refers to.
///
/// Resolution is staged, most explicit first:
/// 1. an explicit bank id column must resolve or the row fails (a typo in an
///    explicit id must not silently fall through to name matching),
/// 2. the generic "ID" column counts only when it names a known bank,
///    otherwise it is assumed to be the row's own id and skipped,
/// 3. free text is matched against codes, then names, case-insensitively.
///    No fuzzy matching: an ambiguous name is an error, not a guess.
pub fn resolve_bank_for_import<'a>(
    banks: &'a [Bank],
    reference: &ImportBankRef,
) -> DomainResult<&'a Bank> {
    let mut referenced = false;

    if let Some(raw) = non_blank(&reference.bank_id) {
        let id: BankId = raw.parse()?;
        return banks
            .iter()
            .find(|b| b.id() == id)
            .ok_or_else(|| DomainError::not_found("bank", raw));
    }

    if let Some(raw) = non_blank(&reference.row_id) {
        referenced = true;
        if let Ok(id) = raw.parse::<BankId>() {
            if let Some(bank) = banks.iter().find(|b| b.id() == id) {
                return Ok(bank);
            }
        }
    }

    if let Some(raw) = non_blank(&reference.bank) {
        let matches: Vec<&Bank> = banks
            .iter()
            .filter(|b| b.code().eq_ignore_ascii_case(raw))
            .collect();
        let matches = if matches.is_empty() {
            banks
                .iter()
                .filter(|b| b.name().eq_ignore_ascii_case(raw))
                .collect()
        } else {
            matches
        };
        return match matches.as_slice() {
            [bank] => Ok(bank),
            [] => Err(DomainError::not_found("bank", raw)),
            _ => Err(DomainError::validation(format!(
                "bank reference '{raw}' matches more than one bank"
            ))),
        };
    }

    if referenced {
        // Only the overloaded "ID" column was set and it named no bank.
        return Err(DomainError::validation(
            "import row's ID column does not name a known bank",
        ));
    }
    Err(DomainError::validation(
        "import row does not reference a bank",
    ))
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
