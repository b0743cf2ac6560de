//! Domain error model.

use thiserror::Error;

use crate::id::{CustomerId, OrderId, TicketTypeId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// A resource the core looks up by identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Resource {
    Customer(CustomerId),
    TicketType(TicketTypeId),
    Order(OrderId),
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Resource::Customer(id) => write!(f, "customer {id}"),
            Resource::TicketType(id) => write!(f, "ticket type {id}"),
            Resource::Order(id) => write!(f, "order {id}"),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// insufficiency, missing rows). Contention and storage failures belong to the
/// ledger layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive amount).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An order request was malformed (no line items, non-positive count, overflow).
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("{0} not found")]
    NotFound(Resource),

    /// Not enough quantity left on a ticket type.
    #[error("insufficient ticket quantity for ticket type {ticket_type_id}")]
    InsufficientInventory { ticket_type_id: TicketTypeId },

    /// Not enough balance left on a customer.
    #[error("insufficient balance for customer {customer_id}")]
    InsufficientBalance { customer_id: CustomerId },

    /// A domain invariant would be violated (e.g. illegal lifecycle transition).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A uniqueness rule was violated (e.g. duplicate username).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_order(msg: impl Into<String>) -> Self {
        Self::InvalidOrder(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn customer_not_found(id: CustomerId) -> Self {
        Self::NotFound(Resource::Customer(id))
    }

    pub fn ticket_type_not_found(id: TicketTypeId) -> Self {
        Self::NotFound(Resource::TicketType(id))
    }

    pub fn order_not_found(id: OrderId) -> Self {
        Self::NotFound(Resource::Order(id))
    }
}
