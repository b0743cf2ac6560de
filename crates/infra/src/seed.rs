//! Demo catalog loaded at startup so a fresh service has something to sell.

use tracing::info;

use evento_core::{EventId, Money};
use evento_customers::NewCustomer;
use evento_inventory::NewTicketType;

use crate::ledger_store::{LedgerStore, StoreResult};

/// `(username, balance in cents)`
const DEMO_CUSTOMERS: &[(&str, i64)] = &[("alice", 100_000), ("bob", 50_000), ("carol", 0)];

/// `(event, price in cents, quantity)`
const DEMO_TICKET_TYPES: &[(i64, i64, i64)] = &[
    (1, 5_000, 100),
    (1, 12_500, 20),
    (2, 2_500, 500),
    (2, 0, 50),
];

/// Seed demo customers and ticket types unless the catalog is already
/// populated. Returns whether anything was written.
pub async fn seed_demo_catalog<S: LedgerStore>(store: &S) -> StoreResult<bool> {
    if !store.list_ticket_types().await?.is_empty() {
        info!("catalog already populated; skipping demo seed");
        return Ok(false);
    }

    for &(username, balance) in DEMO_CUSTOMERS {
        store
            .insert_customer(NewCustomer {
                username: username.to_string(),
                credential_hash: String::new(),
                balance: Money::from_minor(balance),
            })
            .await?;
    }
    for &(event, price, quantity) in DEMO_TICKET_TYPES {
        store
            .insert_ticket_type(NewTicketType {
                event_id: EventId::new(event),
                price: Money::from_minor(price),
                quantity_available: quantity,
            })
            .await?;
    }

    info!(
        customers = DEMO_CUSTOMERS.len(),
        ticket_types = DEMO_TICKET_TYPES.len(),
        "demo catalog seeded"
    );
    Ok(true)
}
