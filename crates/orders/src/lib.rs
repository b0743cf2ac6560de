//! Orders domain module.
//!
//! Order requests, pricing and the order lifecycle state machine. Pure,
//! deterministic domain logic; the transactional protocol that applies an
//! order to the ledger lives in `evento-infra`.

pub mod order;
pub mod status;

pub use order::{LineItem, LineItemRequest, NewOrder, Order, OrderRequest};
pub use status::OrderStatus;
