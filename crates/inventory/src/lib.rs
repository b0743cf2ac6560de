//! Inventory domain module.
//!
//! Ticket types and the quantity rules every ledger backend applies when it
//! reserves or releases tickets. Pure domain logic (no IO, no storage).

pub mod ticket_type;

pub use ticket_type::{ensure_amount, NewTicketType, QuantityChange, TicketType};
