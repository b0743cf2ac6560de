//! Order placement protocol (application-level orchestration).
//!
//! ## Placement Flow
//!
//! ```text
//! OrderRequest
//!   ↓
//! 1. Validate and merge line items (pure)
//!   ↓
//! 2. Open unit of work; check the customer exists; price every ticket type
//!   ↓
//! 3. Reserve quantity per ticket type, ascending id
//!   ↓
//! 4. Debit the customer for the total (skipped for free orders)
//!   ↓
//! 5. Insert the order record and commit
//! ```
//!
//! Any failure in steps 2-5 rolls the unit of work back, so a failed
//! placement leaves no observable effect. Transient contention on the whole
//! attempt is retried with backoff; business failures are returned at once.
//!
//! The lock order every unit of work follows is: order row (cancellation
//! only), ticket types by ascending id, then the customer. Placement and
//! cancellation both keep to it, so concurrent multi-ticket orders in
//! opposite line-item order cannot deadlock.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use evento_core::{CustomerId, Money, OrderId, TicketTypeId};
use evento_customers::{BalanceAction, Customer, NewCustomer};
use evento_inventory::TicketType;
use evento_orders::{NewOrder, Order, OrderRequest, OrderStatus};

use crate::balance_manager::BalanceManager;
use crate::error::ServiceResult;
use crate::inventory_manager::InventoryManager;
use crate::ledger_store::{LedgerStore, StoreError, StoreResult, UnitOfWork};
use crate::retry::{retry_transient, RetryPolicy};

/// Customer with their committed orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerOrders {
    pub customer: Customer,
    pub orders: Vec<Order>,
}

/// Applies orders, cancellations and direct adjustments to a ledger store.
#[derive(Debug)]
pub struct OrderOrchestrator<S> {
    store: Arc<S>,
    inventory: InventoryManager<S>,
    balances: BalanceManager<S>,
    retry: RetryPolicy,
}

impl<S> Clone for OrderOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            inventory: self.inventory.clone(),
            balances: self.balances.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S: LedgerStore> OrderOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry(Arc::new(store), RetryPolicy::default())
    }

    pub fn with_retry(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            inventory: InventoryManager::new(store.clone(), retry.clone()),
            balances: BalanceManager::new(store.clone(), retry.clone()),
            store,
            retry,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn inventory(&self) -> &InventoryManager<S> {
        &self.inventory
    }

    pub fn balances(&self) -> &BalanceManager<S> {
        &self.balances
    }

    /// Place an order: reserve every line, debit the total, persist the
    /// record, all in one unit of work.
    ///
    /// A placement that times out with `Transient` may still have committed;
    /// do not resubmit it blindly.
    #[instrument(
        skip(self, request),
        fields(customer_id = %request.customer_id, lines = request.items.len())
    )]
    pub async fn place_order(&self, request: &OrderRequest) -> ServiceResult<Order> {
        // 1) Validate and merge (pure)
        let quantities = request.quantities()?;

        let order = retry_transient(&self.retry, "place_order", || {
            self.place_once(request.customer_id, &quantities)
        })
        .await?;

        info!(
            order_id = %order.id,
            total_cost = %order.total_cost,
            tickets = order.ticket_count(),
            "order placed"
        );
        Ok(order)
    }

    async fn place_once(
        &self,
        customer_id: CustomerId,
        quantities: &BTreeMap<TicketTypeId, i64>,
    ) -> StoreResult<Order> {
        let mut status = OrderStatus::Requested;
        let mut uow = self.store.begin().await?;

        match self.apply_order(&mut uow, customer_id, quantities, &mut status).await {
            Ok(order) => {
                uow.commit().await?;
                status.transition(OrderStatus::Committed)?;
                Ok(order)
            }
            Err(err) => {
                let reached = status;
                status.transition(OrderStatus::Aborted)?;
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed placement failed");
                }
                warn!(stage = ?reached, error = %err, "order placement aborted");
                Err(err)
            }
        }
    }

    async fn apply_order(
        &self,
        uow: &mut S::Tx,
        customer_id: CustomerId,
        quantities: &BTreeMap<TicketTypeId, i64>,
        status: &mut OrderStatus,
    ) -> StoreResult<Order> {
        // 2) Customer must exist; prices are immutable, read them up front
        uow.customer(customer_id).await?;
        let mut prices = BTreeMap::new();
        for &id in quantities.keys() {
            prices.insert(id, uow.ticket_type(id).await?.price);
        }
        let new_order = NewOrder::price(customer_id, quantities, &prices)?;

        // 3) Reserve in ascending ticket-type order (BTreeMap iteration order)
        *status = status.transition(OrderStatus::Reserving)?;
        for (&id, &count) in quantities {
            self.inventory.reserve_quantity(uow, id, count).await?;
        }

        // 4) Debit; free orders have nothing to take
        *status = status.transition(OrderStatus::Debiting)?;
        if new_order.total_cost.is_positive() {
            self.balances
                .debit(uow, customer_id, new_order.total_cost)
                .await?;
        }

        // 5) Persist; visible to readers only once the unit commits
        uow.insert_order(new_order).await
    }

    /// Undo an order's economic effect: remove the record, release every line,
    /// credit the total back. One unit of work.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel_order(&self, id: OrderId) -> ServiceResult<Order> {
        let order = retry_transient(&self.retry, "cancel_order", || self.cancel_once(id)).await?;
        info!(
            customer_id = %order.customer_id,
            refunded = %order.total_cost,
            "order cancelled"
        );
        Ok(order)
    }

    async fn cancel_once(&self, id: OrderId) -> StoreResult<Order> {
        let mut uow = self.store.begin().await?;
        match self.revert_order(&mut uow, id).await {
            Ok(order) => {
                uow.commit().await?;
                Ok(order)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed cancellation failed");
                }
                Err(err)
            }
        }
    }

    async fn revert_order(&self, uow: &mut S::Tx, id: OrderId) -> StoreResult<Order> {
        let order = uow.remove_order(id).await?;

        let mut lines = order.line_items.clone();
        lines.sort_by_key(|l| l.ticket_type_id);
        for line in &lines {
            self.inventory
                .release_quantity(uow, line.ticket_type_id, line.count)
                .await?;
        }

        if order.total_cost.is_positive() {
            self.balances
                .credit(uow, order.customer_id, order.total_cost)
                .await?;
        }
        Ok(order)
    }

    /// Remove every order record. Quantities and balances are left as they
    /// are; use [`OrderOrchestrator::cancel_order`] to undo an order.
    #[instrument(skip(self))]
    pub async fn delete_all_orders(&self) -> ServiceResult<u64> {
        let removed =
            retry_transient(&self.retry, "delete_all_orders", || self.store.delete_all_orders())
                .await?;
        info!(removed, "orders deleted");
        Ok(removed)
    }

    pub async fn adjust_ticket_quantity(
        &self,
        id: TicketTypeId,
        delta: i64,
    ) -> ServiceResult<TicketType> {
        self.inventory.adjust_quantity(id, delta).await
    }

    pub async fn adjust_customer_balance(
        &self,
        id: CustomerId,
        action: BalanceAction,
        amount: Money,
    ) -> ServiceResult<Customer> {
        self.balances.adjust_balance(id, action, amount).await
    }

    /// Register a customer. The credential is stored as given; hashing is the
    /// caller's concern.
    #[instrument(skip(self, customer), fields(username = %customer.username))]
    pub async fn register_customer(&self, customer: NewCustomer) -> ServiceResult<Customer> {
        customer.validate()?;
        let created = self
            .retried("insert_customer", || self.store.insert_customer(customer.clone()))
            .await?;
        info!(customer_id = %created.id, "customer registered");
        Ok(created)
    }

    /// Every customer with their orders, ascending by customer id.
    pub async fn customers_with_orders(&self) -> ServiceResult<Vec<CustomerOrders>> {
        let customers = self.retried("list_customers", || self.store.list_customers()).await?;
        let mut by_customer: BTreeMap<CustomerId, Vec<Order>> = BTreeMap::new();
        for order in self.retried("list_orders", || self.store.list_orders()).await? {
            by_customer.entry(order.customer_id).or_default().push(order);
        }
        Ok(customers
            .into_iter()
            .map(|customer| CustomerOrders {
                orders: by_customer.remove(&customer.id).unwrap_or_default(),
                customer,
            })
            .collect())
    }

    pub async fn customer_with_orders(&self, id: CustomerId) -> ServiceResult<CustomerOrders> {
        let customer = self.retried("customer", || self.store.customer(id)).await?;
        let orders = self
            .retried("orders_for_customer", || self.store.orders_for_customer(id))
            .await?;
        Ok(CustomerOrders { customer, orders })
    }

    pub async fn ticket_types(&self) -> ServiceResult<Vec<TicketType>> {
        self.retried("list_ticket_types", || self.store.list_ticket_types())
            .await
    }

    pub async fn ticket_type(&self, id: TicketTypeId) -> ServiceResult<TicketType> {
        self.retried("ticket_type", || self.store.ticket_type(id)).await
    }

    pub async fn orders(&self) -> ServiceResult<Vec<Order>> {
        self.retried("list_orders", || self.store.list_orders()).await
    }

    pub async fn order(&self, id: OrderId) -> ServiceResult<Order> {
        self.retried("order", || self.store.order(id)).await
    }

    async fn retried<T, F, Fut>(&self, name: &str, op: F) -> ServiceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        Ok(retry_transient(&self.retry, name, op).await?)
    }
}
