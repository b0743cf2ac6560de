use serde::{Deserialize, Serialize};

use evento_core::{DomainError, DomainResult, EventId, Money, TicketTypeId};

/// A sellable ticket type of one event, with a bounded quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    pub id: TicketTypeId,
    pub event_id: EventId,
    pub price: Money,
    pub quantity_available: i64,
}

/// Seed data for a ticket type (the store assigns the id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicketType {
    pub event_id: EventId,
    pub price: Money,
    pub quantity_available: i64,
}

impl NewTicketType {
    pub fn validate(&self) -> DomainResult<()> {
        if self.price.is_negative() {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if self.quantity_available < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Ok(())
    }
}

/// A direct quantity adjustment, decomposed into the two atomic primitives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QuantityChange {
    /// Decrement contingent on availability.
    Reserve(i64),
    /// Unconditional increment.
    Release(i64),
}

impl QuantityChange {
    pub fn from_delta(delta: i64) -> DomainResult<Self> {
        match delta {
            0 => Err(DomainError::validation("quantity delta cannot be zero")),
            d if d > 0 => Ok(QuantityChange::Release(d)),
            // i64::MIN has no positive counterpart.
            d => d
                .checked_neg()
                .map(QuantityChange::Reserve)
                .ok_or_else(|| DomainError::validation("quantity delta out of range")),
        }
    }
}

/// Reservation amounts must be strictly positive.
pub fn ensure_amount(amount: i64) -> DomainResult<i64> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(DomainError::validation("quantity must be greater than zero"))
    }
}

impl TicketType {
    /// Quantity left after reserving `amount`, or `InsufficientInventory`.
    pub fn quantity_after_reserve(
        id: TicketTypeId,
        available: i64,
        amount: i64,
    ) -> DomainResult<i64> {
        ensure_amount(amount)?;
        if available < amount {
            return Err(DomainError::InsufficientInventory { ticket_type_id: id });
        }
        Ok(available - amount)
    }

    /// Quantity after releasing `amount` back to the pool.
    pub fn quantity_after_release(available: i64, amount: i64) -> DomainResult<i64> {
        ensure_amount(amount)?;
        available
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("quantity overflow"))
    }
}
