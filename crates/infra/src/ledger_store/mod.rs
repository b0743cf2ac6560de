//! Ledger store boundary.
//!
//! Durable storage for customer balances, ticket-type quantities and order
//! records. Every mutation happens inside a [`UnitOfWork`] and is applied as a
//! single conditional update on one row; a unit of work commits or rolls back
//! as a whole.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryLedgerStore, InMemoryUnitOfWork};
pub use postgres::{PostgresLedgerStore, PostgresUnitOfWork};
pub use r#trait::{LedgerStore, StoreError, StoreResult, UnitOfWork};
