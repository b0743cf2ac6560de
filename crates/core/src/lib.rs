//! `evento-core`: ids, money and domain errors shared by every crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, and the business error model shared by the ledger,
//! inventory, customer and order crates.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult, Resource};
pub use id::{CustomerId, EventId, OrderId, TicketTypeId};
pub use money::Money;
