use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use evento_core::{
    CustomerId, DomainError, EventId, Money, OrderId, Resource, TicketTypeId,
};
use evento_customers::{Customer, NewCustomer};
use evento_inventory::{NewTicketType, TicketType};
use evento_orders::{NewOrder, Order};

use super::r#trait::{LedgerStore, StoreError, StoreResult, UnitOfWork};

/// Default bound on waiting for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct CustomerRow {
    username: String,
    credential_hash: String,
    balance: Arc<Mutex<Money>>,
}

#[derive(Debug, Clone)]
struct TicketTypeRow {
    event_id: EventId,
    price: Money,
    quantity: Arc<Mutex<i64>>,
}

#[derive(Debug, Default)]
struct Tables {
    customers: RwLock<BTreeMap<CustomerId, CustomerRow>>,
    ticket_types: RwLock<BTreeMap<TicketTypeId, TicketTypeRow>>,
    orders: RwLock<BTreeMap<OrderId, Order>>,
    /// Orders claimed for removal by an open unit of work.
    claimed_orders: StdMutex<BTreeSet<OrderId>>,
    customer_seq: AtomicI64,
    ticket_type_seq: AtomicI64,
    order_seq: AtomicI64,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::internal(format!("{what} lock poisoned"))
}

impl Tables {
    fn customer_row(&self, id: CustomerId) -> StoreResult<CustomerRow> {
        let customers = self.customers.read().map_err(|_| poisoned("customers"))?;
        customers
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::customer_not_found(id).into())
    }

    fn ticket_type_row(&self, id: TicketTypeId) -> StoreResult<TicketTypeRow> {
        let ticket_types = self.ticket_types.read().map_err(|_| poisoned("ticket_types"))?;
        ticket_types
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::ticket_type_not_found(id).into())
    }
}

/// Wait for a row lock, bounded by `timeout`.
async fn lock_row<T>(
    cell: Arc<Mutex<T>>,
    timeout: Duration,
    row: Resource,
) -> StoreResult<OwnedMutexGuard<T>> {
    tokio::time::timeout(timeout, cell.lock_owned())
        .await
        .map_err(|_| {
            StoreError::Transient(format!(
                "timed out after {}ms waiting for {row}",
                timeout.as_millis()
            ))
        })
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Each quantity and balance lives behind its own
/// async mutex; a unit of work keeps the guards of the rows it touched until
/// it commits or rolls back, so no other unit of work or reader observes an
/// intermediate value. Immutable attributes (price, username) are read
/// without locking.
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    async fn read_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        let row = self.tables.customer_row(id)?;
        let balance = *lock_row(row.balance.clone(), self.lock_timeout, Resource::Customer(id)).await?;
        Ok(Customer {
            id,
            username: row.username,
            credential_hash: row.credential_hash,
            balance,
        })
    }

    async fn read_ticket_type(&self, id: TicketTypeId) -> StoreResult<TicketType> {
        let row = self.tables.ticket_type_row(id)?;
        let quantity_available =
            *lock_row(row.quantity.clone(), self.lock_timeout, Resource::TicketType(id)).await?;
        Ok(TicketType {
            id,
            event_id: row.event_id,
            price: row.price,
            quantity_available,
        })
    }

    fn committed_orders(&self, filter: impl Fn(&Order) -> bool) -> StoreResult<Vec<Order>> {
        let orders = self.tables.orders.read().map_err(|_| poisoned("orders"))?;
        Ok(orders.values().filter(|o| filter(o)).cloned().collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        Ok(InMemoryUnitOfWork {
            tables: self.tables.clone(),
            lock_timeout: self.lock_timeout,
            quantities: BTreeMap::new(),
            balances: BTreeMap::new(),
            inserted: Vec::new(),
            removed: Vec::new(),
            finished: false,
        })
    }

    async fn customer(&self, id: CustomerId) -> StoreResult<Customer> {
        self.read_customer(id).await
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let ids: Vec<CustomerId> = {
            let customers = self.tables.customers.read().map_err(|_| poisoned("customers"))?;
            customers.keys().copied().collect()
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.read_customer(id).await?);
        }
        Ok(out)
    }

    async fn ticket_type(&self, id: TicketTypeId) -> StoreResult<TicketType> {
        self.read_ticket_type(id).await
    }

    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>> {
        let ids: Vec<TicketTypeId> = {
            let ticket_types = self.tables.ticket_types.read().map_err(|_| poisoned("ticket_types"))?;
            ticket_types.keys().copied().collect()
        };
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.read_ticket_type(id).await?);
        }
        Ok(out)
    }

    async fn order(&self, id: OrderId) -> StoreResult<Order> {
        let orders = self.tables.orders.read().map_err(|_| poisoned("orders"))?;
        orders
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::order_not_found(id).into())
    }

    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        self.committed_orders(|_| true)
    }

    async fn orders_for_customer(&self, id: CustomerId) -> StoreResult<Vec<Order>> {
        self.tables.customer_row(id)?;
        self.committed_orders(|o| o.customer_id == id)
    }

    async fn insert_customer(&self, customer: NewCustomer) -> StoreResult<Customer> {
        customer.validate()?;
        let mut customers = self.tables.customers.write().map_err(|_| poisoned("customers"))?;
        if customers.values().any(|c| c.username == customer.username) {
            return Err(DomainError::conflict("customer already exists").into());
        }
        let id = CustomerId::new(self.tables.customer_seq.fetch_add(1, Ordering::SeqCst) + 1);
        customers.insert(
            id,
            CustomerRow {
                username: customer.username.clone(),
                credential_hash: customer.credential_hash.clone(),
                balance: Arc::new(Mutex::new(customer.balance)),
            },
        );
        Ok(Customer {
            id,
            username: customer.username,
            credential_hash: customer.credential_hash,
            balance: customer.balance,
        })
    }

    async fn insert_ticket_type(&self, ticket_type: NewTicketType) -> StoreResult<TicketType> {
        ticket_type.validate()?;
        let mut ticket_types = self.tables.ticket_types.write().map_err(|_| poisoned("ticket_types"))?;
        let id = TicketTypeId::new(self.tables.ticket_type_seq.fetch_add(1, Ordering::SeqCst) + 1);
        ticket_types.insert(
            id,
            TicketTypeRow {
                event_id: ticket_type.event_id,
                price: ticket_type.price,
                quantity: Arc::new(Mutex::new(ticket_type.quantity_available)),
            },
        );
        Ok(TicketType {
            id,
            event_id: ticket_type.event_id,
            price: ticket_type.price,
            quantity_available: ticket_type.quantity_available,
        })
    }

    async fn delete_all_orders(&self) -> StoreResult<u64> {
        let mut orders = self.tables.orders.write().map_err(|_| poisoned("orders"))?;
        let removed = orders.len() as u64;
        orders.clear();
        Ok(removed)
    }
}

/// A locked row plus its value when the unit of work first touched it.
#[derive(Debug)]
struct HeldRow<T> {
    guard: OwnedMutexGuard<T>,
    before: T,
}

/// Unit of work over [`InMemoryLedgerStore`].
///
/// Mutations are applied in place under the row guard and undone from the
/// recorded pre-image on rollback. Order inserts and removals are staged and
/// applied to the orders table at commit, while the row guards are still held.
#[derive(Debug)]
pub struct InMemoryUnitOfWork {
    tables: Arc<Tables>,
    lock_timeout: Duration,
    quantities: BTreeMap<TicketTypeId, HeldRow<i64>>,
    balances: BTreeMap<CustomerId, HeldRow<Money>>,
    inserted: Vec<Order>,
    removed: Vec<OrderId>,
    finished: bool,
}

impl InMemoryUnitOfWork {
    async fn quantity_row(&mut self, id: TicketTypeId) -> StoreResult<&mut HeldRow<i64>> {
        if !self.quantities.contains_key(&id) {
            let row = self.tables.ticket_type_row(id)?;
            let guard = lock_row(row.quantity, self.lock_timeout, Resource::TicketType(id)).await?;
            let before = *guard;
            self.quantities.insert(id, HeldRow { guard, before });
        }
        self.quantities
            .get_mut(&id)
            .ok_or_else(|| StoreError::internal("held ticket type row vanished"))
    }

    async fn balance_row(&mut self, id: CustomerId) -> StoreResult<&mut HeldRow<Money>> {
        if !self.balances.contains_key(&id) {
            let row = self.tables.customer_row(id)?;
            let guard = lock_row(row.balance, self.lock_timeout, Resource::Customer(id)).await?;
            let before = *guard;
            self.balances.insert(id, HeldRow { guard, before });
        }
        self.balances
            .get_mut(&id)
            .ok_or_else(|| StoreError::internal("held customer row vanished"))
    }

    /// Restore every touched row and release order claims.
    fn undo(&mut self) {
        for held in self.quantities.values_mut() {
            *held.guard = held.before;
        }
        for held in self.balances.values_mut() {
            *held.guard = held.before;
        }
        self.inserted.clear();
        self.release_claims();
        self.finished = true;
    }

    fn release_claims(&mut self) {
        if self.removed.is_empty() {
            return;
        }
        // A poisoned claim set is recovered: claims are plain ids.
        let mut claimed = self
            .tables
            .claimed_orders
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for id in self.removed.drain(..) {
            claimed.remove(&id);
        }
    }
}

impl Drop for InMemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.finished {
            debug!("in-memory unit of work dropped without commit; rolling back");
            self.undo();
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn customer(&mut self, id: CustomerId) -> StoreResult<Customer> {
        let row = self.tables.customer_row(id)?;
        let balance = match self.balances.get(&id) {
            Some(held) => *held.guard,
            None => *lock_row(row.balance.clone(), self.lock_timeout, Resource::Customer(id)).await?,
        };
        Ok(Customer {
            id,
            username: row.username,
            credential_hash: row.credential_hash,
            balance,
        })
    }

    async fn ticket_type(&mut self, id: TicketTypeId) -> StoreResult<TicketType> {
        let row = self.tables.ticket_type_row(id)?;
        let quantity_available = match self.quantities.get(&id) {
            Some(held) => *held.guard,
            None => *lock_row(row.quantity.clone(), self.lock_timeout, Resource::TicketType(id)).await?,
        };
        Ok(TicketType {
            id,
            event_id: row.event_id,
            price: row.price,
            quantity_available,
        })
    }

    async fn reserve_quantity(&mut self, id: TicketTypeId, amount: i64) -> StoreResult<i64> {
        let held = self.quantity_row(id).await?;
        let next = TicketType::quantity_after_reserve(id, *held.guard, amount)?;
        *held.guard = next;
        Ok(next)
    }

    async fn release_quantity(&mut self, id: TicketTypeId, amount: i64) -> StoreResult<i64> {
        let held = self.quantity_row(id).await?;
        let next = TicketType::quantity_after_release(*held.guard, amount)?;
        *held.guard = next;
        Ok(next)
    }

    async fn debit(&mut self, id: CustomerId, amount: Money) -> StoreResult<Money> {
        let held = self.balance_row(id).await?;
        let next = Customer::balance_after_debit(id, *held.guard, amount)?;
        *held.guard = next;
        Ok(next)
    }

    async fn credit(&mut self, id: CustomerId, amount: Money) -> StoreResult<Money> {
        let held = self.balance_row(id).await?;
        let next = Customer::balance_after_credit(*held.guard, amount)?;
        *held.guard = next;
        Ok(next)
    }

    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        self.tables.customer_row(order.customer_id)?;
        let id = OrderId::new(self.tables.order_seq.fetch_add(1, Ordering::SeqCst) + 1);
        let order = Order::from_new(id, order, Utc::now());
        self.inserted.push(order.clone());
        Ok(order)
    }

    async fn remove_order(&mut self, id: OrderId) -> StoreResult<Order> {
        // Lookup and claim happen under the orders read guard: a committing
        // remover takes the write guard, so it either still holds its claim or
        // has already dropped the row.
        let orders = self.tables.orders.read().map_err(|_| poisoned("orders"))?;
        let order = orders
            .get(&id)
            .cloned()
            .ok_or(DomainError::order_not_found(id))?;
        let mut claimed = self
            .tables
            .claimed_orders
            .lock()
            .map_err(|_| poisoned("claimed_orders"))?;
        if !claimed.insert(id) {
            return Err(StoreError::Transient(format!(
                "order {id} is being removed by another unit of work"
            )));
        }
        drop(claimed);
        drop(orders);
        self.removed.push(id);
        Ok(order)
    }

    async fn commit(mut self) -> StoreResult<()> {
        {
            let mut orders = self.tables.orders.write().map_err(|_| poisoned("orders"))?;
            for order in self.inserted.drain(..) {
                orders.insert(order.id, order);
            }
            for id in &self.removed {
                orders.remove(id);
            }
        }
        self.release_claims();
        self.finished = true;
        // Row guards drop with `self`, after the order table reflects the commit.
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        self.undo();
        Ok(())
    }
}
