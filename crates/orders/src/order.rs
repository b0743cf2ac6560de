use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evento_core::{CustomerId, DomainError, DomainResult, Money, OrderId, TicketTypeId};

/// One requested line: `count` tickets of a ticket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub ticket_type_id: TicketTypeId,
    pub count: i64,
}

/// An order placement request as received from the boundary layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: CustomerId,
    pub items: Vec<LineItemRequest>,
}

impl OrderRequest {
    pub fn new(customer_id: CustomerId, items: Vec<LineItemRequest>) -> Self {
        Self { customer_id, items }
    }

    /// Validate the request and merge lines per ticket type.
    ///
    /// The result is keyed (and therefore iterated) in ascending ticket type
    /// id, which is the lock acquisition order for reservations.
    pub fn quantities(&self) -> DomainResult<BTreeMap<TicketTypeId, i64>> {
        if self.items.is_empty() {
            return Err(DomainError::invalid_order("order must contain at least one line item"));
        }

        let mut merged: BTreeMap<TicketTypeId, i64> = BTreeMap::new();
        let mut total: i64 = 0;
        for (idx, item) in self.items.iter().enumerate() {
            if item.count <= 0 {
                return Err(DomainError::invalid_order(format!(
                    "line item {idx}: count must be greater than zero"
                )));
            }
            let slot = merged.entry(item.ticket_type_id).or_insert(0);
            *slot = slot.checked_add(item.count).ok_or_else(|| {
                DomainError::invalid_order(format!("line item {idx}: count overflow"))
            })?;
            total = total
                .checked_add(item.count)
                .ok_or_else(|| DomainError::invalid_order("order ticket count overflow"))?;
        }
        Ok(merged)
    }
}

/// A priced order line, captured at placement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub ticket_type_id: TicketTypeId,
    pub count: i64,
    pub unit_price: Money,
}

impl LineItem {
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_times(self.count)
    }
}

/// A fully priced order, ready to be persisted inside a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub line_items: Vec<LineItem>,
    pub total_cost: Money,
}

impl NewOrder {
    /// Price merged quantities with the given unit prices.
    ///
    /// Every ticket type in `quantities` must have a price.
    pub fn price(
        customer_id: CustomerId,
        quantities: &BTreeMap<TicketTypeId, i64>,
        prices: &BTreeMap<TicketTypeId, Money>,
    ) -> DomainResult<NewOrder> {
        let mut line_items = Vec::with_capacity(quantities.len());
        let mut total_cost = Money::ZERO;

        for (&ticket_type_id, &count) in quantities {
            let unit_price = *prices
                .get(&ticket_type_id)
                .ok_or(DomainError::ticket_type_not_found(ticket_type_id))?;
            let line = LineItem {
                ticket_type_id,
                count,
                unit_price,
            };
            let subtotal = line
                .subtotal()
                .ok_or_else(|| DomainError::invalid_order("order total overflow"))?;
            total_cost = total_cost
                .checked_add(subtotal)
                .ok_or_else(|| DomainError::invalid_order("order total overflow"))?;
            line_items.push(line);
        }

        Ok(NewOrder {
            customer_id,
            line_items,
            total_cost,
        })
    }
}

/// A committed order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub line_items: Vec<LineItem>,
    pub total_cost: Money,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_new(id: OrderId, new: NewOrder, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            customer_id: new.customer_id,
            line_items: new.line_items,
            total_cost: new.total_cost,
            created_at,
        }
    }

    /// Whether `Σ count × unit_price == total_cost`.
    pub fn total_matches_lines(&self) -> bool {
        self.line_items
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.subtotal()?))
            == Some(self.total_cost)
    }

    /// Total tickets across all lines, saturating at `i64::MAX`.
    pub fn ticket_count(&self) -> i64 {
        self.line_items
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tt(id: i64) -> TicketTypeId {
        TicketTypeId::new(id)
    }

    fn request(items: &[(i64, i64)]) -> OrderRequest {
        OrderRequest::new(
            CustomerId::new(1),
            items
                .iter()
                .map(|&(t, c)| LineItemRequest {
                    ticket_type_id: tt(t),
                    count: c,
                })
                .collect(),
        )
    }

    #[test]
    fn empty_order_is_invalid() {
        assert!(matches!(request(&[]).quantities(), Err(DomainError::InvalidOrder(_))));
    }

    #[test]
    fn non_positive_count_is_invalid() {
        assert!(matches!(request(&[(1, 2), (2, 0)]).quantities(), Err(DomainError::InvalidOrder(_))));
        assert!(matches!(request(&[(1, -1)]).quantities(), Err(DomainError::InvalidOrder(_))));
    }

    #[test]
    fn duplicate_lines_merge_in_ascending_order() {
        let q = request(&[(9, 1), (2, 3), (9, 4)]).quantities().unwrap();
        let ordered: Vec<_> = q.into_iter().collect();
        assert_eq!(ordered, vec![(tt(2), 3), (tt(9), 5)]);
    }

    #[test]
    fn pricing_computes_total() {
        let q = request(&[(1, 3), (2, 2)]).quantities().unwrap();
        let prices = BTreeMap::from([(tt(1), Money::from_minor(1000)), (tt(2), Money::from_minor(250))]);
        let new = NewOrder::price(CustomerId::new(1), &q, &prices).unwrap();
        assert_eq!(new.total_cost, Money::from_minor(3500));
        assert_eq!(new.line_items.len(), 2);

        let order = Order::from_new(OrderId::new(1), new, Utc::now());
        assert!(order.total_matches_lines());
        assert_eq!(order.ticket_count(), 5);
    }

    #[test]
    fn ticket_count_overflow_is_rejected_and_never_panics() {
        let err = request(&[(1, i64::MAX), (2, 1)]).quantities().unwrap_err();
        assert!(matches!(err, DomainError::InvalidOrder(_)));

        let order = Order {
            id: OrderId::new(1),
            customer_id: CustomerId::new(1),
            line_items: vec![
                LineItem { ticket_type_id: tt(1), count: i64::MAX, unit_price: Money::ZERO },
                LineItem { ticket_type_id: tt(2), count: i64::MAX, unit_price: Money::ZERO },
            ],
            total_cost: Money::ZERO,
            created_at: Utc::now(),
        };
        assert_eq!(order.ticket_count(), i64::MAX);
    }

    #[test]
    fn pricing_requires_every_price() {
        let q = request(&[(1, 1), (4, 1)]).quantities().unwrap();
        let prices = BTreeMap::from([(tt(1), Money::from_minor(1000))]);
        assert_eq!(
            NewOrder::price(CustomerId::new(1), &q, &prices),
            Err(DomainError::ticket_type_not_found(tt(4)))
        );
    }

    #[test]
    fn pricing_reports_overflow_as_invalid_order() {
        let q = request(&[(1, 2)]).quantities().unwrap();
        let prices = BTreeMap::from([(tt(1), Money::from_minor(i64::MAX))]);
        assert!(matches!(
            NewOrder::price(CustomerId::new(1), &q, &prices),
            Err(DomainError::InvalidOrder(_))
        ));
    }

    proptest! {
        #[test]
        fn total_equals_sum_of_lines(lines in proptest::collection::vec((1i64..20, 1i64..50, 0i64..100_000), 1..12)) {
            let req = request(&lines.iter().map(|&(t, c, _)| (t, c)).collect::<Vec<_>>());
            let q = req.quantities().unwrap();
            let prices: BTreeMap<_, _> = lines.iter().map(|&(t, _, p)| (tt(t), Money::from_minor(p))).collect();
            let new = NewOrder::price(CustomerId::new(1), &q, &prices).unwrap();

            let requested: i64 = lines.iter().map(|&(_, c, _)| c).sum();
            let order = Order::from_new(OrderId::new(1), new, Utc::now());
            prop_assert_eq!(order.ticket_count(), requested);
            prop_assert!(order.total_matches_lines());
        }
    }
}
