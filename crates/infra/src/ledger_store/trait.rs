use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use evento_core::{CustomerId, DomainError, Money, OrderId, TicketTypeId};
use evento_customers::{Customer, NewCustomer};
use evento_inventory::{NewTicketType, TicketType};
use evento_orders::{NewOrder, Order};

pub type StoreResult<T> = Result<T, StoreError>;

/// Ledger store operation error.
///
/// Business failures (insufficient quantity/balance, missing rows) travel as
/// [`DomainError`]; the remaining variants are infrastructure failures.
///
/// - **Transient**: lock or transaction contention, lock/statement timeouts,
///   pool exhaustion. Safe to retry with backoff.
/// - **Internal**: the store is unavailable or returned something unexpected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// A set of ledger mutations committed or aborted together.
///
/// Row access follows one global order across all units of work: the order
/// row (cancellation only), then ticket types by ascending id, then the
/// customer. Callers that touch several rows must keep to it.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it
/// back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a customer as seen by this unit of work.
    async fn customer(&mut self, id: CustomerId) -> StoreResult<Customer>;

    /// Read a ticket type as seen by this unit of work.
    async fn ticket_type(&mut self, id: TicketTypeId) -> StoreResult<TicketType>;

    /// Decrement quantity by `amount` if at least `amount` is available.
    ///
    /// Returns the new quantity; fails with `InsufficientInventory` and
    /// changes nothing otherwise.
    async fn reserve_quantity(&mut self, id: TicketTypeId, amount: i64) -> StoreResult<i64>;

    /// Increment quantity by `amount` unconditionally. Returns the new quantity.
    async fn release_quantity(&mut self, id: TicketTypeId, amount: i64) -> StoreResult<i64>;

    /// Subtract `amount` from the balance if at least `amount` is held.
    ///
    /// Returns the new balance; fails with `InsufficientBalance` and changes
    /// nothing otherwise.
    async fn debit(&mut self, id: CustomerId, amount: Money) -> StoreResult<Money>;

    /// Add `amount` to the balance unconditionally. Returns the new balance.
    async fn credit(&mut self, id: CustomerId, amount: Money) -> StoreResult<Money>;

    /// Persist an order record. It becomes visible to readers at commit.
    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order>;

    /// Remove an order record and return it. The removal becomes visible at commit.
    async fn remove_order(&mut self, id: OrderId) -> StoreResult<Order>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Ledger store: committed reads, seeding, and units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: UnitOfWork;

    /// Open a unit of work.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn customer(&self, id: CustomerId) -> StoreResult<Customer>;

    /// All customers, ascending by id.
    async fn list_customers(&self) -> StoreResult<Vec<Customer>>;

    async fn ticket_type(&self, id: TicketTypeId) -> StoreResult<TicketType>;

    /// All ticket types, ascending by id.
    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>>;

    async fn order(&self, id: OrderId) -> StoreResult<Order>;

    /// All committed orders, ascending by id.
    async fn list_orders(&self) -> StoreResult<Vec<Order>>;

    async fn orders_for_customer(&self, id: CustomerId) -> StoreResult<Vec<Order>>;

    async fn insert_customer(&self, customer: NewCustomer) -> StoreResult<Customer>;

    async fn insert_ticket_type(&self, ticket_type: NewTicketType) -> StoreResult<TicketType>;

    /// Remove every order record and return how many were removed.
    ///
    /// This is record removal only: inventory and balances keep the effects
    /// of the removed orders.
    async fn delete_all_orders(&self) -> StoreResult<u64>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore,
{
    type Tx = S::Tx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        (**self).begin().await
    }

    async fn customer(&self, id: CustomerId) -> StoreResult<Customer> {
        (**self).customer(id).await
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        (**self).list_customers().await
    }

    async fn ticket_type(&self, id: TicketTypeId) -> StoreResult<TicketType> {
        (**self).ticket_type(id).await
    }

    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>> {
        (**self).list_ticket_types().await
    }

    async fn order(&self, id: OrderId) -> StoreResult<Order> {
        (**self).order(id).await
    }

    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        (**self).list_orders().await
    }

    async fn orders_for_customer(&self, id: CustomerId) -> StoreResult<Vec<Order>> {
        (**self).orders_for_customer(id).await
    }

    async fn insert_customer(&self, customer: NewCustomer) -> StoreResult<Customer> {
        (**self).insert_customer(customer).await
    }

    async fn insert_ticket_type(&self, ticket_type: NewTicketType) -> StoreResult<TicketType> {
        (**self).insert_ticket_type(ticket_type).await
    }

    async fn delete_all_orders(&self) -> StoreResult<u64> {
        (**self).delete_all_orders().await
    }
}
