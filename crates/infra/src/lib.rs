//! Infrastructure layer: ledger stores, the order protocol, config.
//!
//! Everything that touches storage or time lives here; the domain crates
//! stay pure.

pub mod balance_manager;
pub mod config;
pub mod error;
pub mod inventory_manager;
pub mod ledger_store;
pub mod order_orchestrator;
pub mod retry;
pub mod seed;


pub use balance_manager::BalanceManager;
pub use config::{AppConfig, ConfigError};
pub use error::{ServiceError, ServiceResult};
pub use inventory_manager::InventoryManager;
pub use ledger_store::{
    InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError, StoreResult, UnitOfWork,
};
pub use order_orchestrator::{CustomerOrders, OrderOrchestrator};
pub use retry::RetryPolicy;
