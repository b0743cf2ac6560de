use thiserror::Error;
use tracing::error;

use evento_core::{CustomerId, DomainError, Resource, TicketTypeId};

use crate::ledger_store::StoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcome taxonomy of ledger operations, one variant per failure class the
/// HTTP boundary distinguishes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("insufficient ticket quantity for ticket type {ticket_type_id}")]
    InsufficientInventory { ticket_type_id: TicketTypeId },

    #[error("insufficient balance for customer {customer_id}")]
    InsufficientBalance { customer_id: CustomerId },

    /// Malformed order request (no line items, non-positive count, overflow).
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// Malformed adjustment or identifier.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Contention that outlived the retry policy. Safe to retry later, but a
    /// timed-out order may still have committed.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidOrder(msg) => ServiceError::InvalidOrder(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(resource) => ServiceError::NotFound(resource),
            DomainError::InsufficientInventory { ticket_type_id } => {
                ServiceError::InsufficientInventory { ticket_type_id }
            }
            DomainError::InsufficientBalance { customer_id } => {
                ServiceError::InsufficientBalance { customer_id }
            }
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::InvariantViolation(msg) => {
                error!(error = %msg, "domain invariant violated");
                ServiceError::Internal(msg)
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(e) => e.into(),
            StoreError::Transient(msg) => ServiceError::Transient(msg),
            StoreError::Internal(msg) => {
                error!(error = %msg, "ledger store failure");
                ServiceError::Internal(msg)
            }
        }
    }
}
