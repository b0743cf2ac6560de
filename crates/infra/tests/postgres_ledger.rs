//! PostgreSQL ledger tests. Skipped unless `DATABASE_URL` is set.

use std::time::Duration;

use evento_core::{CustomerId, EventId, Money, TicketTypeId};
use evento_customers::NewCustomer;
use evento_infra::ledger_store::{LedgerStore, PostgresLedgerStore, StoreError, UnitOfWork};
use evento_infra::order_orchestrator::OrderOrchestrator;
use evento_infra::ServiceError;
use evento_inventory::NewTicketType;
use evento_orders::{LineItemRequest, OrderRequest};

async fn store() -> Option<PostgresLedgerStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PostgresLedgerStore::connect(&url, 16, Duration::from_secs(5))
        .await
        .expect("connect to DATABASE_URL")
        .with_timeouts(Duration::from_millis(500), Duration::from_secs(5));
    store.ensure_schema().await.expect("schema");
    Some(store)
}

fn unique(prefix: &str) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}_{}_{}", std::process::id(), nanos % 1_000_000_000)
}

async fn seed(
    store: &PostgresLedgerStore,
    balance: i64,
    price: i64,
    quantity: i64,
) -> (CustomerId, TicketTypeId) {
    let c = store
        .insert_customer(NewCustomer {
            username: unique("pg"),
            credential_hash: "hash".to_string(),
            balance: Money::from_minor(balance),
        })
        .await
        .unwrap();
    let t = store
        .insert_ticket_type(NewTicketType {
            event_id: EventId::new(1),
            price: Money::from_minor(price),
            quantity_available: quantity,
        })
        .await
        .unwrap();
    (c.id, t.id)
}

fn request(c: CustomerId, t: TicketTypeId, count: i64) -> OrderRequest {
    OrderRequest::new(
        c,
        vec![LineItemRequest {
            ticket_type_id: t,
            count,
        }],
    )
}

#[tokio::test]
async fn placement_scenario_against_postgres() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let (c, t) = seed(&store, 10_000, 1_000, 5).await;
    let o = OrderOrchestrator::new(store.clone());

    let order = o.place_order(&request(c, t, 3)).await.unwrap();
    assert_eq!(order.total_cost, Money::from_minor(3_000));
    assert_eq!(store.customer(c).await.unwrap().balance, Money::from_minor(7_000));
    assert_eq!(store.ticket_type(t).await.unwrap().quantity_available, 2);
    assert_eq!(store.order(order.id).await.unwrap().line_items, order.line_items);

    assert_eq!(
        o.place_order(&request(c, t, 3)).await.unwrap_err(),
        ServiceError::InsufficientInventory { ticket_type_id: t }
    );
    assert_eq!(store.customer(c).await.unwrap().balance, Money::from_minor(7_000));

    o.cancel_order(order.id).await.unwrap();
    assert_eq!(store.customer(c).await.unwrap().balance, Money::from_minor(10_000));
    assert_eq!(store.ticket_type(t).await.unwrap().quantity_available, 5);
}

#[tokio::test]
async fn rolled_back_transaction_leaves_rows_untouched() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let (c, t) = seed(&store, 500, 100, 3).await;

    let mut uow = store.begin().await.unwrap();
    uow.reserve_quantity(t, 3).await.unwrap();
    assert_eq!(
        uow.debit(c, Money::from_minor(501)).await.unwrap_err(),
        StoreError::Domain(evento_core::DomainError::InsufficientBalance { customer_id: c })
    );
    uow.rollback().await.unwrap();

    assert_eq!(store.ticket_type(t).await.unwrap().quantity_available, 3);
    assert_eq!(store.customer(c).await.unwrap().balance, Money::from_minor(500));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_orders_never_oversell_in_postgres() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let (c, t) = seed(&store, 1_000_000, 10, 5).await;
    let o = OrderOrchestrator::new(store.clone());

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let o = o.clone();
            tokio::spawn(async move { o.place_order(&request(c, t, 1)).await })
        })
        .collect();

    let mut ok = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ServiceError::InsufficientInventory { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(ok, 5);
    assert_eq!(store.ticket_type(t).await.unwrap().quantity_available, 0);
}

#[tokio::test]
async fn duplicate_username_is_a_conflict_in_postgres() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let username = unique("dup");
    let new = NewCustomer {
        username,
        credential_hash: "hash".to_string(),
        balance: Money::ZERO,
    };
    store.insert_customer(new.clone()).await.unwrap();
    assert!(matches!(
        store.insert_customer(new).await.unwrap_err(),
        StoreError::Domain(evento_core::DomainError::Conflict(_))
    ));
}

#[tokio::test]
async fn counter_overflow_is_a_validation_error_in_postgres() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let (c, t) = seed(&store, i64::MAX - 1, 100, i64::MAX - 1).await;

    let mut uow = store.begin().await.unwrap();
    assert!(matches!(
        uow.release_quantity(t, 2).await.unwrap_err(),
        StoreError::Domain(evento_core::DomainError::Validation(_))
    ));
    uow.rollback().await.unwrap();

    let mut uow = store.begin().await.unwrap();
    assert!(matches!(
        uow.credit(c, Money::from_minor(2)).await.unwrap_err(),
        StoreError::Domain(evento_core::DomainError::Validation(_))
    ));
    uow.rollback().await.unwrap();

    assert_eq!(store.ticket_type(t).await.unwrap().quantity_available, i64::MAX - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_cancels_refund_once_in_postgres() {
    let Some(store) = store().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let (c, t) = seed(&store, 10_000, 1_000, 5).await;
    let o = OrderOrchestrator::new(store.clone());
    let order = o.place_order(&request(c, t, 2)).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let o = o.clone();
            tokio::spawn(async move { o.cancel_order(order.id).await })
        })
        .collect();

    let mut cancelled = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => cancelled += 1,
            Err(ServiceError::NotFound(_)) => {}
            Err(e) if e.is_transient() => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(cancelled, 1);
    assert_eq!(store.customer(c).await.unwrap().balance, Money::from_minor(10_000));
    assert_eq!(store.ticket_type(t).await.unwrap().quantity_available, 5);
}
