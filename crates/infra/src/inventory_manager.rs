//! Ticket quantity operations.
//!
//! `reserve_quantity`/`release_quantity` run inside a caller-provided unit of
//! work so they compose into multi-row protocols. `adjust_quantity` is the
//! standalone mutation used by the quantity test hook; it opens its own unit
//! of work and retries transient contention.

use std::sync::Arc;

use tracing::{debug, instrument};

use evento_core::TicketTypeId;
use evento_inventory::{QuantityChange, TicketType};

use crate::error::ServiceResult;
use crate::ledger_store::{LedgerStore, StoreResult, UnitOfWork};
use crate::retry::{retry_transient, RetryPolicy};

#[derive(Debug)]
pub struct InventoryManager<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for InventoryManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S: LedgerStore> InventoryManager<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Take `amount` tickets, failing with `InsufficientInventory` (and
    /// changing nothing) if fewer are available. Returns the new quantity.
    #[instrument(skip(self, uow), fields(ticket_type_id = %id))]
    pub async fn reserve_quantity<U: UnitOfWork>(
        &self,
        uow: &mut U,
        id: TicketTypeId,
        amount: i64,
    ) -> StoreResult<i64> {
        let left = uow.reserve_quantity(id, amount).await?;
        debug!(amount, left, "reserved");
        Ok(left)
    }

    /// Return `amount` tickets to the pool. Returns the new quantity.
    #[instrument(skip(self, uow), fields(ticket_type_id = %id))]
    pub async fn release_quantity<U: UnitOfWork>(
        &self,
        uow: &mut U,
        id: TicketTypeId,
        amount: i64,
    ) -> StoreResult<i64> {
        let left = uow.release_quantity(id, amount).await?;
        debug!(amount, left, "released");
        Ok(left)
    }

    /// Apply a signed change to one ticket type in its own unit of work.
    ///
    /// Positive deltas release, negative deltas reserve, zero is rejected.
    #[instrument(skip(self), fields(ticket_type_id = %id))]
    pub async fn adjust_quantity(&self, id: TicketTypeId, delta: i64) -> ServiceResult<TicketType> {
        let change = QuantityChange::from_delta(delta)?;
        let ticket_type =
            retry_transient(&self.retry, "adjust_quantity", || self.apply_once(id, change)).await?;
        Ok(ticket_type)
    }

    async fn apply_once(&self, id: TicketTypeId, change: QuantityChange) -> StoreResult<TicketType> {
        let mut uow = self.store.begin().await?;
        match change {
            QuantityChange::Reserve(amount) => self.reserve_quantity(&mut uow, id, amount).await?,
            QuantityChange::Release(amount) => self.release_quantity(&mut uow, id, amount).await?,
        };
        let ticket_type = uow.ticket_type(id).await?;
        uow.commit().await?;
        Ok(ticket_type)
    }
}
