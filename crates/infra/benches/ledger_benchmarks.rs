use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use cardvault_catalog::{CardClass, CardThresholds};
use cardvault_core::{CardId, LocationId, UserId};
use cardvault_events::ObserverSet;
use cardvault_infra::{
    CatalogService, InMemoryVault, LedgerService, NewBank, NewCard, NewLocation,
};
use cardvault_ledger::{MovementRequest, MovementType};

struct Bench {
    ledger: LedgerService,
    card_id: CardId,
    vault_loc: LocationId,
    branch_loc: LocationId,
    user: UserId,
}

async fn setup() -> Bench {
    let store = Arc::new(InMemoryVault::new());
    let catalog = CatalogService::new(store.clone());
    let ledger = LedgerService::new(store, ObserverSet::new());

    let bank = catalog
        .create_bank(NewBank {
            code: "FNB".into(),
            name: "First National".into(),
        })
        .await
        .unwrap();
    let card = catalog
        .create_card(NewCard {
            bank_id: bank.id(),
            name: "Platinum Credit".into(),
            class: CardClass::new("credit", Some("platinum".into()), None).unwrap(),
            thresholds: CardThresholds::new(5, 1_000_000_000).unwrap(),
        })
        .await
        .unwrap();
    let vault_loc = catalog
        .create_location(NewLocation {
            bank_id: bank.id(),
            name: "Main Vault".into(),
            site: None,
        })
        .await
        .unwrap();
    let branch_loc = catalog
        .create_location(NewLocation {
            bank_id: bank.id(),
            name: "Branch 12".into(),
            site: None,
        })
        .await
        .unwrap();

    Bench {
        ledger,
        card_id: card.id(),
        vault_loc: vault_loc.id(),
        branch_loc: branch_loc.id(),
        user: UserId::new(),
    }
}

fn entry(b: &Bench, quantity: i64) -> MovementRequest {
    MovementRequest {
        card_id: b.card_id,
        movement_type: MovementType::Entry,
        quantity,
        from_location_id: None,
        to_location_id: Some(b.vault_loc),
        reason: "bench".into(),
        recorded_by: b.user,
    }
}

fn transfer(b: &Bench, quantity: i64) -> MovementRequest {
    MovementRequest {
        card_id: b.card_id,
        movement_type: MovementType::Transfer,
        quantity,
        from_location_id: Some(b.vault_loc),
        to_location_id: Some(b.branch_loc),
        reason: "bench".into(),
        recorded_by: b.user,
    }
}

/// Seed `count` alternating entries and transfers so the history has both
/// one-row and two-row movements.
async fn seed_history(b: &Bench, count: usize) {
    b.ledger
        .record_movement(entry(b, count as i64 + 1))
        .await
        .unwrap();
    for i in 0..count {
        let request = if i % 2 == 0 {
            entry(b, 10)
        } else {
            transfer(b, 1)
        };
        b.ledger.record_movement(request).await.unwrap();
    }
}

fn bench_record_movement(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let bench = rt.block_on(setup());

    c.bench_function("record_movement/entry", |bencher| {
        bencher.iter(|| {
            rt.block_on(async {
                black_box(bench.ledger.record_movement(entry(&bench, 1)).await.unwrap())
            })
        })
    });

    rt.block_on(async { bench.ledger.record_movement(entry(&bench, 1_000_000)).await })
        .unwrap();
    c.bench_function("record_movement/transfer", |bencher| {
        bencher.iter(|| {
            rt.block_on(async {
                black_box(
                    bench
                        .ledger
                        .record_movement(transfer(&bench, 1))
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

fn bench_rebuild_from_history(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("rebuild_from_history");
    for history_len in [100usize, 1_000, 10_000] {
        let bench = rt.block_on(async {
            let bench = setup().await;
            seed_history(&bench, history_len).await;
            bench
        });
        group.throughput(Throughput::Elements(history_len as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(history_len),
            &history_len,
            |bencher, _| {
                bencher.iter(|| {
                    rt.block_on(async {
                        black_box(bench.ledger.rebuild_from_history(bench.card_id).await.unwrap())
                    })
                })
            },
        );
    }
    group.finish();
}

/// Live balance rows against full-history replay for the same answer. The gap
/// is why reads never go through replay.
fn bench_read_vs_replay(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let bench = rt.block_on(async {
        let bench = setup().await;
        seed_history(&bench, 1_000).await;
        bench
    });

    let mut group = c.benchmark_group("stock_read");
    group.bench_function("live_balance_rows", |bencher| {
        bencher.iter(|| {
            rt.block_on(async {
                black_box(
                    bench
                        .ledger
                        .available_stock(bench.card_id, bench.vault_loc)
                        .await
                        .unwrap(),
                )
            })
        })
    });
    group.bench_function("replay_full_history", |bencher| {
        bencher.iter(|| {
            rt.block_on(async {
                black_box(bench.ledger.verify_consistency(bench.card_id).await.unwrap())
            })
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_record_movement,
    bench_rebuild_from_history,
    bench_read_vs_replay
);
criterion_main!(benches);
