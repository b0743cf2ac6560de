//! Customer domain module.
//!
//! Customers and the balance rules shared by every ledger backend. Pure
//! domain logic (no IO, no storage).

pub mod customer;

pub use customer::{BalanceAction, Customer, NewCustomer};
