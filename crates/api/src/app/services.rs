use std::sync::Arc;

use cardvault_events::ObserverSet;
use cardvault_infra::{
    AuditLog, AuditWriter, CatalogService, InMemoryAuditLog, InMemoryVault, LedgerService,
    LowStockNotifier, PostgresVault, VaultStore,
};
use cardvault_ledger::LedgerEvent;

/// Everything the handlers need, behind one `Arc` extension.
pub struct AppServices {
    pub catalog: CatalogService,
    pub ledger: LedgerService,
    pub audit: Arc<dyn AuditLog>,
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let store: Arc<dyn VaultStore> = if use_persistent {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        let vault = PostgresVault::connect(&database_url)
            .await
            .expect("failed to connect to Postgres");
        vault
            .ensure_schema()
            .await
            .expect("failed to apply database schema");
        tracing::info!("using Postgres-backed vault store");
        Arc::new(vault)
    } else {
        tracing::info!("using in-memory vault store");
        Arc::new(InMemoryVault::new())
    };

    wire(store)
}

fn wire(store: Arc<dyn VaultStore>) -> AppServices {
    let audit: Arc<InMemoryAuditLog> = Arc::new(InMemoryAuditLog::new());

    let mut observers: ObserverSet<LedgerEvent> = ObserverSet::new();
    observers.attach(Arc::new(AuditWriter::new(audit.clone())));
    observers.attach(Arc::new(LowStockNotifier::new()));

    AppServices {
        catalog: CatalogService::new(store.clone()),
        ledger: LedgerService::new(store, observers),
        audit,
    }
}
