//! Customer balance operations.
//!
//! Same shape as the inventory manager: `debit`/`credit` compose into a
//! caller's unit of work, `adjust_balance` runs standalone for the balance
//! test hook.

use std::sync::Arc;

use tracing::{debug, instrument};

use evento_core::{CustomerId, Money};
use evento_customers::{BalanceAction, Customer};

use crate::error::ServiceResult;
use crate::ledger_store::{LedgerStore, StoreResult, UnitOfWork};
use crate::retry::{retry_transient, RetryPolicy};

#[derive(Debug)]
pub struct BalanceManager<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for BalanceManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S: LedgerStore> BalanceManager<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Take `amount` from the customer, failing with `InsufficientBalance`
    /// (and changing nothing) if the balance is short. Returns the new balance.
    #[instrument(skip(self, uow), fields(customer_id = %id, amount = %amount))]
    pub async fn debit<U: UnitOfWork>(
        &self,
        uow: &mut U,
        id: CustomerId,
        amount: Money,
    ) -> StoreResult<Money> {
        let balance = uow.debit(id, amount).await?;
        debug!(balance = %balance, "debited");
        Ok(balance)
    }

    #[instrument(skip(self, uow), fields(customer_id = %id, amount = %amount))]
    pub async fn credit<U: UnitOfWork>(
        &self,
        uow: &mut U,
        id: CustomerId,
        amount: Money,
    ) -> StoreResult<Money> {
        let balance = uow.credit(id, amount).await?;
        debug!(balance = %balance, "credited");
        Ok(balance)
    }

    #[instrument(skip(self), fields(customer_id = %id, amount = %amount))]
    pub async fn adjust_balance(
        &self,
        id: CustomerId,
        action: BalanceAction,
        amount: Money,
    ) -> ServiceResult<Customer> {
        amount.ensure_positive("amount")?;
        let customer =
            retry_transient(&self.retry, "adjust_balance", || self.apply_once(id, action, amount))
                .await?;
        Ok(customer)
    }

    async fn apply_once(
        &self,
        id: CustomerId,
        action: BalanceAction,
        amount: Money,
    ) -> StoreResult<Customer> {
        let mut uow = self.store.begin().await?;
        match action {
            BalanceAction::Add => self.credit(&mut uow, id, amount).await?,
            BalanceAction::Deduct => self.debit(&mut uow, id, amount).await?,
        };
        let customer = uow.customer(id).await?;
        uow.commit().await?;
        Ok(customer)
    }
}
