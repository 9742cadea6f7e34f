//! Audit trail: human-readable entries derived from ledger events.
//!
//! The writer is an observer, so an entry is only ever produced for a write
//! that committed, and a slow or broken audit sink can never fail a movement.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use cardvault_core::{CardId, UserId};
use cardvault_events::EventObserver;
use cardvault_ledger::{LedgerEvent, Movement};

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// Stable event name (e.g. "ledger.movement.recorded").
    pub event_type: &'static str,
    pub card_id: CardId,
    pub user_id: Option<UserId>,
    /// Business-language description of what happened.
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Where audit entries go.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry);

    /// Most recent entries first, at most `limit`.
    async fn recent(&self, limit: usize) -> Vec<AuditEntry>;
}

/// In-process audit sink. Fine for dev and tests; production would put a
/// table-backed implementation behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) {
        // A poisoned lock only drops audit lines, never the movement.
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        entries.iter().rev().take(limit).cloned().collect()
    }
}

/// Observer that turns committed ledger events into audit entries.
pub struct AuditWriter {
    log: Arc<dyn AuditLog>,
}

impl AuditWriter {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl EventObserver<LedgerEvent> for AuditWriter {
    async fn notify(&self, event: &LedgerEvent) {
        if let Some(entry) = entry_for(event) {
            self.log.append(entry).await;
        }
    }
}

/// Render the audit line for an event. Stock-low alerts are the notifier's
/// concern, not the audit trail's.
fn entry_for(event: &LedgerEvent) -> Option<AuditEntry> {
    match event {
        LedgerEvent::MovementRecorded(e) => Some(AuditEntry {
            event_type: "ledger.movement.recorded",
            card_id: e.movement.card_id,
            user_id: Some(e.movement.recorded_by),
            message: format!(
                "{} of '{}'; card total is now {}",
                describe(&e.movement),
                e.card_name,
                e.card_quantity
            ),
            occurred_at: e.occurred_at,
        }),
        LedgerEvent::MovementReverted(e) => Some(AuditEntry {
            event_type: "ledger.movement.reverted",
            card_id: e.movement.card_id,
            user_id: Some(e.movement.recorded_by),
            message: format!(
                "reverted {} of '{}'; card total is now {}",
                describe(&e.movement),
                e.card_name,
                e.card_quantity
            ),
            occurred_at: e.occurred_at,
        }),
        LedgerEvent::MovementCorrected(e) => Some(AuditEntry {
            event_type: "ledger.movement.corrected",
            card_id: e.after.card_id,
            user_id: Some(e.after.recorded_by),
            message: format!(
                "corrected {} to {} for '{}'; card total is now {}",
                describe(&e.before),
                describe(&e.after),
                e.card_name,
                e.card_quantity
            ),
            occurred_at: e.occurred_at,
        }),
        LedgerEvent::StockLow(_) => None,
    }
}

fn describe(movement: &Movement) -> String {
    match (movement.from_location_id, movement.to_location_id) {
        (None, Some(to)) => format!(
            "entry of {} units into location {to} ({})",
            movement.quantity, movement.reason
        ),
        (Some(from), None) => format!(
            "exit of {} units from location {from} ({})",
            movement.quantity, movement.reason
        ),
        (Some(from), Some(to)) => format!(
            "transfer of {} units from location {from} to location {to} ({})",
            movement.quantity, movement.reason
        ),
        // Unreachable for lines written through the ledger; still render
        // something rather than lose the audit line.
        (None, None) => format!(
            "{} of {} units ({})",
            movement.movement_type, movement.quantity, movement.reason
        ),
    }
}

#[cfg(test)]
mod tests {
    use cardvault_core::{LocationId, MovementId};
    use cardvault_ledger::{MovementKind, MovementRecorded};

    use super::*;

    fn movement(kind: MovementKind) -> Movement {
        Movement::record(
            MovementId::new(),
            CardId::new(),
            kind,
            25,
            "quarterly restock",
            UserId::new(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn recorded_movement_becomes_a_readable_entry() {
        let log = Arc::new(InMemoryAuditLog::new());
        let writer = AuditWriter::new(log.clone());
        let to = LocationId::new();
        let movement = movement(MovementKind::Entry { to });

        writer
            .notify(&LedgerEvent::MovementRecorded(MovementRecorded {
                movement: movement.clone(),
                card_name: "Platinum Credit".into(),
                card_quantity: 25,
                occurred_at: Utc::now(),
            }))
            .await;

        let entries = log.recent(10).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "ledger.movement.recorded");
        assert_eq!(entries[0].user_id, Some(movement.recorded_by));
        assert!(entries[0].message.contains("entry of 25 units"));
        assert!(entries[0].message.contains("Platinum Credit"));
        assert!(entries[0].message.contains("quarterly restock"));
        assert!(entries[0].message.contains(&to.to_string()));
    }

    #[tokio::test]
    async fn stock_low_is_not_an_audit_entry() {
        let log = Arc::new(InMemoryAuditLog::new());
        let writer = AuditWriter::new(log.clone());
        writer
            .notify(&LedgerEvent::StockLow(cardvault_ledger::StockLow {
                card_id: CardId::new(),
                card_name: "Platinum Credit".into(),
                quantity: 3,
                min_threshold: 5,
                occurred_at: Utc::now(),
            }))
            .await;
        assert!(log.recent(10).await.is_empty());
    }

    #[tokio::test]
    async fn recent_returns_newest_first_and_respects_limit() {
        let log = InMemoryAuditLog::new();
        for i in 0..5 {
            log.append(AuditEntry {
                event_type: "ledger.movement.recorded",
                card_id: CardId::new(),
                user_id: None,
                message: format!("line {i}"),
                occurred_at: Utc::now(),
            })
            .await;
        }
        let recent = log.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "line 4");
        assert_eq!(recent[1].message, "line 3");
    }
}
