use serde::{Deserialize, Serialize};

use evento_core::{CustomerId, DomainError, DomainResult, Money, TicketTypeId};
use evento_customers::{BalanceAction, Customer, NewCustomer};
use evento_orders::{LineItemRequest, Order, OrderRequest};

use crate::app::credentials::{MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};

// -------------------------
// Request DTOs
// -------------------------

/// `POST /api/customers`. New customers start with a zero balance.
#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub username: String,
    pub password: String,
}

impl RegisterCustomerRequest {
    /// Check the username and password, returning the customer to insert
    /// (credential still empty) and the password to hash.
    pub fn validate(self) -> DomainResult<(NewCustomer, String)> {
        let customer = NewCustomer {
            username: self.username,
            credential_hash: String::new(),
            balance: Money::ZERO,
        };
        customer.validate()?;
        if self.password.len() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must not be more than {MAX_PASSWORD_LEN} characters long"
            )));
        }
        Ok((customer, self.password))
    }
}

/// `PATCH /api/customers/:id/balances`. `amount` is in cents.
#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub action: String,
    pub amount: i64,
}

impl AdjustBalanceRequest {
    pub fn into_parts(self) -> DomainResult<(BalanceAction, Money)> {
        let action: BalanceAction = self.action.parse()?;
        let amount = Money::from_minor(self.amount).ensure_positive("amount")?;
        Ok((action, amount))
    }
}

/// `PATCH /api/tickets/:id/quantities`.
#[derive(Debug, Deserialize)]
pub struct AdjustQuantityRequest {
    pub action: String,
    pub quantity: i64,
}

impl AdjustQuantityRequest {
    /// Signed delta: `add` releases, `deduct` reserves.
    pub fn delta(&self) -> DomainResult<i64> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        match self.action.parse::<BalanceAction>() {
            Ok(BalanceAction::Add) => Ok(self.quantity),
            Ok(BalanceAction::Deduct) => Ok(-self.quantity),
            Err(_) => Err(DomainError::validation("action should be 'add' or 'deduct'")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub ticket_type_id: TicketTypeId,
    pub quantity: i64,
}

/// `POST /api/orders`.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

impl From<PlaceOrderRequest> for OrderRequest {
    fn from(value: PlaceOrderRequest) -> Self {
        OrderRequest::new(
            value.customer_id,
            value
                .items
                .into_iter()
                .map(|i| LineItemRequest {
                    ticket_type_id: i.ticket_type_id,
                    count: i.quantity,
                })
                .collect(),
        )
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    #[serde(flatten)]
    pub customer: Customer,
    pub orders: Vec<Order>,
}

#[derive(Debug, Serialize)]
pub struct DeletedOrdersResponse {
    pub deleted: u64,
}
