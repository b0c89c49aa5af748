use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use stockroom_core::{Actor, AggregateId, Money, StoreId};
use stockroom_events::{EventEnvelope, InMemoryEventBus};
use stockroom_infra::command_dispatcher::CommandDispatcher;
use stockroom_infra::event_store::{EventStore, InMemoryEventStore, JsonFileEventStore};
use stockroom_infra::projections::Projections;
use stockroom_inventory::{InventoryCommand, MovementRequest, RecordEntry, StockLedger, STOCK_LEDGER_AGGREGATE_TYPE};
use stockroom_products::ProductId;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

fn entry(store_id: StoreId, product_id: ProductId, quantity: u64) -> InventoryCommand {
    InventoryCommand::RecordEntry(RecordEntry(MovementRequest {
        store_id,
        product_id,
        movement_id: Uuid::now_v7(),
        product_name: "Bench item".to_string(),
        quantity,
        unit_price: Money::from_cents(250),
        reason: None,
        document_number: None,
        actor: Actor::named("bench").unwrap(),
        occurred_at: Utc::now(),
    }))
}

fn record<S: EventStore>(dispatcher: &CommandDispatcher<S, Bus>, store_id: StoreId, product_id: ProductId) {
    dispatcher
        .dispatch(
            store_id,
            product_id.0,
            STOCK_LEDGER_AGGREGATE_TYPE,
            entry(store_id, product_id, black_box(1)),
            |_, id| StockLedger::empty(ProductId::new(id)),
        )
        .unwrap();
}

/// Dispatch latency grows with the stream length (full rehydration per command).
fn bench_entry_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_dispatch");

    for history in [0usize, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("in_memory", history), &history, |b, &history| {
            let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), Bus::default());
            let store_id = StoreId::new();
            let product_id = ProductId::new(AggregateId::new());
            for _ in 0..history {
                record(&dispatcher, store_id, product_id);
            }
            b.iter(|| record(&dispatcher, store_id, product_id));
        });
    }

    group.sample_size(20);
    group.bench_function("json_file", |b| {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonFileEventStore::open(dir.path().join("bench.json")).unwrap();
        let dispatcher = CommandDispatcher::new(log, Bus::default());
        let store_id = StoreId::new();
        let product_id = ProductId::new(AggregateId::new());
        b.iter(|| record(&dispatcher, store_id, product_id));
    });

    group.finish();
}

/// Full read-model rebuild from a log of ledger events spread over products.
fn bench_projection_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_replay");

    for event_count in [100usize, 1_000, 10_000] {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = CommandDispatcher::new(store.clone(), Bus::default());
        let store_id = StoreId::new();
        let products: Vec<ProductId> = (0..10).map(|_| ProductId::new(AggregateId::new())).collect();
        for i in 0..event_count {
            record(&dispatcher, store_id, products[i % products.len()]);
        }
        let envelopes: Vec<EventEnvelope<JsonValue>> =
            store.load_all().unwrap().iter().map(|e| e.to_envelope()).collect();

        group.throughput(Throughput::Elements(event_count as u64));
        group.bench_with_input(BenchmarkId::new("rebuild", event_count), &envelopes, |b, envelopes| {
            let projections = Projections::new();
            b.iter(|| {
                projections
                    .rebuild_from_scratch(black_box(envelopes.iter().cloned()))
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_entry_dispatch, bench_projection_replay);
criterion_main!(benches);
