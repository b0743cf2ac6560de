use std::sync::Arc;

use anyhow::Context;

use evento_core::{CustomerId, Money, OrderId, TicketTypeId};
use evento_customers::{BalanceAction, Customer, NewCustomer};
use evento_infra::ledger_store::{InMemoryLedgerStore, PostgresLedgerStore};
use evento_infra::order_orchestrator::{CustomerOrders, OrderOrchestrator};
use evento_infra::{seed, AppConfig, RetryPolicy, ServiceResult, StoreResult};
use evento_inventory::TicketType;
use evento_orders::{Order, OrderRequest};

/// Ledger backend selected at startup.
///
/// Both variants expose the same operations; handlers never see which store
/// is behind them.
#[derive(Debug)]
pub enum AppServices {
    InMemory {
        orchestrator: OrderOrchestrator<InMemoryLedgerStore>,
    },
    Postgres {
        orchestrator: OrderOrchestrator<PostgresLedgerStore>,
    },
}

/// Run `$body` against whichever orchestrator is configured.
macro_rules! with_orchestrator {
    ($services:expr, $o:ident => $body:expr) => {
        match $services {
            AppServices::InMemory { orchestrator: $o } => $body,
            AppServices::Postgres { orchestrator: $o } => $body,
        }
    };
}

impl AppServices {
    pub fn in_memory(store: InMemoryLedgerStore, retry: RetryPolicy) -> Self {
        AppServices::InMemory {
            orchestrator: OrderOrchestrator::with_retry(Arc::new(store), retry),
        }
    }

    pub fn postgres(store: PostgresLedgerStore, retry: RetryPolicy) -> Self {
        AppServices::Postgres {
            orchestrator: OrderOrchestrator::with_retry(Arc::new(store), retry),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Postgres { .. } => "postgres",
        }
    }

    pub async fn seed_demo_catalog(&self) -> StoreResult<bool> {
        with_orchestrator!(self, o => seed::seed_demo_catalog(o.store().as_ref()).await)
    }

    pub async fn place_order(&self, request: &OrderRequest) -> ServiceResult<Order> {
        with_orchestrator!(self, o => o.place_order(request).await)
    }

    pub async fn cancel_order(&self, id: OrderId) -> ServiceResult<Order> {
        with_orchestrator!(self, o => o.cancel_order(id).await)
    }

    pub async fn delete_all_orders(&self) -> ServiceResult<u64> {
        with_orchestrator!(self, o => o.delete_all_orders().await)
    }

    pub async fn orders(&self) -> ServiceResult<Vec<Order>> {
        with_orchestrator!(self, o => o.orders().await)
    }

    pub async fn adjust_ticket_quantity(
        &self,
        id: TicketTypeId,
        delta: i64,
    ) -> ServiceResult<TicketType> {
        with_orchestrator!(self, o => o.adjust_ticket_quantity(id, delta).await)
    }

    pub async fn adjust_customer_balance(
        &self,
        id: CustomerId,
        action: BalanceAction,
        amount: Money,
    ) -> ServiceResult<Customer> {
        with_orchestrator!(self, o => o.adjust_customer_balance(id, action, amount).await)
    }

    pub async fn register_customer(&self, customer: NewCustomer) -> ServiceResult<Customer> {
        with_orchestrator!(self, o => o.register_customer(customer).await)
    }

    pub async fn customers_with_orders(&self) -> ServiceResult<Vec<CustomerOrders>> {
        with_orchestrator!(self, o => o.customers_with_orders().await)
    }

    pub async fn customer_with_orders(&self, id: CustomerId) -> ServiceResult<CustomerOrders> {
        with_orchestrator!(self, o => o.customer_with_orders(id).await)
    }

    pub async fn ticket_types(&self) -> ServiceResult<Vec<TicketType>> {
        with_orchestrator!(self, o => o.ticket_types().await)
    }

    pub async fn ticket_type(&self, id: TicketTypeId) -> ServiceResult<TicketType> {
        with_orchestrator!(self, o => o.ticket_type(id).await)
    }
}

/// Wire the ledger backend chosen by `config`.
///
/// `DATABASE_URL` selects PostgreSQL (schema created if missing); otherwise
/// an in-memory store is used.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let retry = config.retry_policy();

    let services = match &config.database_url {
        Some(url) => {
            let store = PostgresLedgerStore::connect(
                url,
                config.db_max_connections,
                config.db_acquire_timeout,
            )
            .await
            .context("failed to connect to postgres")?
            .with_timeouts(config.lock_timeout, config.statement_timeout);
            store
                .ensure_schema()
                .await
                .context("failed to create schema")?;
            AppServices::postgres(store, retry)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory ledger (state is lost on exit)");
            AppServices::in_memory(InMemoryLedgerStore::with_lock_timeout(config.lock_timeout), retry)
        }
    };

    if config.seed_demo_data {
        services
            .seed_demo_catalog()
            .await
            .context("failed to seed demo catalog")?;
    }

    tracing::info!(backend = services.backend(), "services ready");
    Ok(services)
}
