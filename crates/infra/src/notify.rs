//! Low-stock alerting.
//!
//! The notifier only warns; replenishment is a human decision. Alerts are kept
//! in memory so operations dashboards (and tests) can read back what fired.

use std::sync::Mutex;

use async_trait::async_trait;

use cardvault_events::EventObserver;
use cardvault_ledger::{LedgerEvent, StockLow};

/// Observer that reacts to [`StockLow`] events.
#[derive(Debug, Default)]
pub struct LowStockNotifier {
    alerts: Mutex<Vec<StockLow>>,
}

impl LowStockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts fired so far, oldest first.
    pub fn alerts(&self) -> Vec<StockLow> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventObserver<LedgerEvent> for LowStockNotifier {
    async fn notify(&self, event: &LedgerEvent) {
        let LedgerEvent::StockLow(alert) = event else {
            return;
        };
        tracing::warn!(
            card_id = %alert.card_id,
            card_name = alert.card_name,
            quantity = alert.quantity,
            min_threshold = alert.min_threshold,
            "card stock at or below minimum threshold"
        );
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use cardvault_core::CardId;

    use super::*;

    #[tokio::test]
    async fn captures_only_stock_low_events() {
        let notifier = LowStockNotifier::new();
        let alert = StockLow {
            card_id: CardId::new(),
            card_name: "Platinum Credit".into(),
            quantity: 4,
            min_threshold: 5,
            occurred_at: Utc::now(),
        };

        notifier.notify(&LedgerEvent::StockLow(alert.clone())).await;
        assert_eq!(notifier.alerts(), vec![alert]);
    }
}
