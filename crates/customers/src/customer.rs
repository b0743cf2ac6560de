use core::str::FromStr;

use serde::{Deserialize, Serialize};

use evento_core::{CustomerId, DomainError, DomainResult, Money};

/// A customer holding a cash balance.
///
/// `credential_hash` is opaque to the core and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub username: String,
    #[serde(skip)]
    pub credential_hash: String,
    pub balance: Money,
}

/// Registration data for a customer (the store assigns the id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub username: String,
    pub credential_hash: String,
    pub balance: Money,
}

impl NewCustomer {
    /// Usernames start with a letter and hold 3..=30 letters, digits or underscores.
    pub fn validate(&self) -> DomainResult<()> {
        let name = self.username.as_str();
        let mut chars = name.chars();
        let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !starts_with_letter || !rest_ok || !(3..=30).contains(&name.len()) {
            return Err(DomainError::validation("username is invalid"));
        }
        if self.balance.is_negative() {
            return Err(DomainError::validation("balance cannot be negative"));
        }
        Ok(())
    }
}

/// Direction of a direct balance adjustment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceAction {
    Add,
    Deduct,
}

impl FromStr for BalanceAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "add" => Ok(BalanceAction::Add),
            "deduct" => Ok(BalanceAction::Deduct),
            _ => Err(DomainError::validation("action should be 'add' or 'deduct'")),
        }
    }
}

impl Customer {
    /// Balance left after debiting `amount`, or `InsufficientBalance`.
    pub fn balance_after_debit(id: CustomerId, balance: Money, amount: Money) -> DomainResult<Money> {
        amount.ensure_positive("debit amount")?;
        if balance < amount {
            return Err(DomainError::InsufficientBalance { customer_id: id });
        }
        balance
            .checked_sub(amount)
            .ok_or_else(|| DomainError::validation("balance underflow"))
    }

    /// Balance after crediting `amount`.
    pub fn balance_after_credit(balance: Money, amount: Money) -> DomainResult<Money> {
        amount.ensure_positive("credit amount")?;
        balance
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("balance overflow"))
    }
}
