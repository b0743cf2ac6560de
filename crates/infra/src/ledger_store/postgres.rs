//! Postgres-backed ledger store.
//!
//! Each unit of work is one database transaction. Quantity and balance
//! mutations are single conditional `UPDATE ... RETURNING` statements, so the
//! row lock taken by the update is the only serialization point and no value
//! is ever read into application memory and written back.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `40001` | `Transient` | Serialization failure |
//! | Database | `40P01` | `Transient` | Deadlock detected |
//! | Database | `55P03` | `Transient` | `lock_timeout` elapsed |
//! | Database | `57014` | `Transient` | `statement_timeout` elapsed |
//! | Database | `23505` on `customers_username_key` | `Domain(Conflict)` | Duplicate username |
//! | Database | `22003` | `Domain(Validation)` | Counter would overflow `BIGINT` |
//! | Database (other) | Any other | `Internal` | Check constraint, foreign key, etc. |
//! | PoolTimedOut | N/A | `Transient` | Pool exhausted |
//! | Other | N/A | `Internal` | Network errors, pool closed, decode failures |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use evento_core::{CustomerId, DomainError, EventId, Money, OrderId, TicketTypeId};
use evento_customers::{Customer, NewCustomer};
use evento_inventory::{ensure_amount, NewTicketType, TicketType};
use evento_orders::{LineItem, NewOrder, Order};

use super::r#trait::{LedgerStore, StoreError, StoreResult, UnitOfWork};

const SCHEMA: &str = include_str!("schema.sql");

const CUSTOMER_COLUMNS: &str = "id, username, credential_hash, balance";
const TICKET_TYPE_COLUMNS: &str = "id, event_id, price, quantity_available";

/// Postgres-backed ledger store.
///
/// `Send + Sync`; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    lock_timeout: Duration,
    statement_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            lock_timeout: Duration::from_millis(2_000),
            statement_timeout: Duration::from_millis(5_000),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Per-transaction `lock_timeout` and `statement_timeout`.
    pub fn with_timeouts(mut self, lock_timeout: Duration, statement_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self.statement_timeout = statement_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn conn(&self) -> StoreResult<sqlx::pool::PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    type Tx = PostgresUnitOfWork;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> StoreResult<Self::Tx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query(
            "SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)",
        )
        .bind(format!("{}ms", self.lock_timeout.as_millis()))
        .bind(format!("{}ms", self.statement_timeout.as_millis()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(PostgresUnitOfWork { tx })
    }

    async fn customer(&self, id: CustomerId) -> StoreResult<Customer> {
        let mut conn = self.conn().await?;
        fetch_customer(&mut conn, id).await
    }

    async fn list_customers(&self) -> StoreResult<Vec<Customer>> {
        let rows = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY id ASC"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;

        rows.iter().map(customer_from_row).collect()
    }

    async fn ticket_type(&self, id: TicketTypeId) -> StoreResult<TicketType> {
        let mut conn = self.conn().await?;
        fetch_ticket_type(&mut conn, id).await
    }

    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>> {
        let rows = sqlx::query(&format!(
            "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types ORDER BY id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_ticket_types", e))?;

        rows.iter().map(ticket_type_from_row).collect()
    }

    async fn order(&self, id: OrderId) -> StoreResult<Order> {
        let mut conn = self.conn().await?;
        let headers = sqlx::query(
            "SELECT id, customer_id, total_cost, created_at FROM orders WHERE id = $1",
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("order", e))?;

        assemble_orders(&mut conn, headers)
            .await?
            .pop()
            .ok_or_else(|| DomainError::order_not_found(id).into())
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        let mut conn = self.conn().await?;
        let headers = sqlx::query(
            "SELECT id, customer_id, total_cost, created_at FROM orders ORDER BY id ASC",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        assemble_orders(&mut conn, headers).await
    }

    async fn orders_for_customer(&self, id: CustomerId) -> StoreResult<Vec<Order>> {
        let mut conn = self.conn().await?;
        fetch_customer(&mut conn, id).await?;
        let headers = sqlx::query(
            "SELECT id, customer_id, total_cost, created_at FROM orders WHERE customer_id = $1 ORDER BY id ASC",
        )
        .bind(id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("orders_for_customer", e))?;

        assemble_orders(&mut conn, headers).await
    }

    #[instrument(skip(self, customer), fields(username = %customer.username), err)]
    async fn insert_customer(&self, customer: NewCustomer) -> StoreResult<Customer> {
        customer.validate()?;
        let row = sqlx::query(&format!(
            "INSERT INTO customers (username, credential_hash, balance) VALUES ($1, $2, $3) RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(&customer.username)
        .bind(&customer.credential_hash)
        .bind(customer.balance.minor_units())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;

        customer_from_row(&row)
    }

    #[instrument(skip(self, ticket_type), fields(event_id = %ticket_type.event_id), err)]
    async fn insert_ticket_type(&self, ticket_type: NewTicketType) -> StoreResult<TicketType> {
        ticket_type.validate()?;
        let row = sqlx::query(&format!(
            "INSERT INTO ticket_types (event_id, price, quantity_available) VALUES ($1, $2, $3) RETURNING {TICKET_TYPE_COLUMNS}"
        ))
        .bind(ticket_type.event_id.get())
        .bind(ticket_type.price.minor_units())
        .bind(ticket_type.quantity_available)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_ticket_type", e))?;

        ticket_type_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn delete_all_orders(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM orders")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_all_orders", e))?;
        Ok(result.rows_affected())
    }
}

/// Unit of work over [`PostgresLedgerStore`]: one open transaction.
///
/// Dropping it without commit lets sqlx roll the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn customer(&mut self, id: CustomerId) -> StoreResult<Customer> {
        fetch_customer(&mut self.tx, id).await
    }

    async fn ticket_type(&mut self, id: TicketTypeId) -> StoreResult<TicketType> {
        fetch_ticket_type(&mut self.tx, id).await
    }

    async fn reserve_quantity(&mut self, id: TicketTypeId, amount: i64) -> StoreResult<i64> {
        ensure_amount(amount)?;
        let row = sqlx::query(
            "UPDATE ticket_types SET quantity_available = quantity_available - $2 \
             WHERE id = $1 AND quantity_available >= $2 RETURNING quantity_available",
        )
        .bind(id.get())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_quantity", e))?;

        match row {
            Some(row) => decode(&row, "quantity_available"),
            None => {
                // Distinguish a missing row from a short one.
                fetch_ticket_type(&mut self.tx, id).await?;
                Err(DomainError::InsufficientInventory { ticket_type_id: id }.into())
            }
        }
    }

    async fn release_quantity(&mut self, id: TicketTypeId, amount: i64) -> StoreResult<i64> {
        ensure_amount(amount)?;
        let row = sqlx::query(
            "UPDATE ticket_types SET quantity_available = quantity_available + $2 \
             WHERE id = $1 RETURNING quantity_available",
        )
        .bind(id.get())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("release_quantity", e))?;

        match row {
            Some(row) => decode(&row, "quantity_available"),
            None => Err(DomainError::ticket_type_not_found(id).into()),
        }
    }

    async fn debit(&mut self, id: CustomerId, amount: Money) -> StoreResult<Money> {
        amount.ensure_positive("debit amount")?;
        let row = sqlx::query(
            "UPDATE customers SET balance = balance - $2 WHERE id = $1 AND balance >= $2 RETURNING balance",
        )
        .bind(id.get())
        .bind(amount.minor_units())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("debit", e))?;

        match row {
            Some(row) => decode(&row, "balance").map(Money::from_minor),
            None => {
                fetch_customer(&mut self.tx, id).await?;
                Err(DomainError::InsufficientBalance { customer_id: id }.into())
            }
        }
    }

    async fn credit(&mut self, id: CustomerId, amount: Money) -> StoreResult<Money> {
        amount.ensure_positive("credit amount")?;
        let row = sqlx::query(
            "UPDATE customers SET balance = balance + $2 WHERE id = $1 RETURNING balance",
        )
        .bind(id.get())
        .bind(amount.minor_units())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("credit", e))?;

        match row {
            Some(row) => decode(&row, "balance").map(Money::from_minor),
            None => Err(DomainError::customer_not_found(id).into()),
        }
    }

    async fn insert_order(&mut self, order: NewOrder) -> StoreResult<Order> {
        let row = sqlx::query(
            "INSERT INTO orders (customer_id, total_cost) VALUES ($1, $2) RETURNING id, created_at",
        )
        .bind(order.customer_id.get())
        .bind(order.total_cost.minor_units())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        let id = OrderId::new(decode(&row, "id")?);
        let created_at: DateTime<Utc> = decode(&row, "created_at")?;

        for line in &order.line_items {
            sqlx::query(
                "INSERT INTO order_line_items (order_id, ticket_type_id, count, unit_price) VALUES ($1, $2, $3, $4)",
            )
            .bind(id.get())
            .bind(line.ticket_type_id.get())
            .bind(line.count)
            .bind(line.unit_price.minor_units())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        }

        Ok(Order::from_new(id, order, created_at))
    }

    async fn remove_order(&mut self, id: OrderId) -> StoreResult<Order> {
        let headers = sqlx::query(
            "SELECT id, customer_id, total_cost, created_at FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("remove_order", e))?;

        let order = assemble_orders(&mut self.tx, headers)
            .await?
            .pop()
            .ok_or(DomainError::order_not_found(id))?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("remove_order", e))?;

        Ok(order)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

async fn fetch_customer(conn: &mut PgConnection, id: CustomerId) -> StoreResult<Customer> {
    let row = sqlx::query(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
        .bind(id.get())
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("customer", e))?;

    match row {
        Some(row) => customer_from_row(&row),
        None => Err(DomainError::customer_not_found(id).into()),
    }
}

async fn fetch_ticket_type(conn: &mut PgConnection, id: TicketTypeId) -> StoreResult<TicketType> {
    let row = sqlx::query(&format!(
        "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1"
    ))
    .bind(id.get())
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("ticket_type", e))?;

    match row {
        Some(row) => ticket_type_from_row(&row),
        None => Err(DomainError::ticket_type_not_found(id).into()),
    }
}

/// Attach line items to order header rows, keeping header order.
async fn assemble_orders(conn: &mut PgConnection, headers: Vec<PgRow>) -> StoreResult<Vec<Order>> {
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let ids = headers
        .iter()
        .map(|row| decode::<i64>(row, "id"))
        .collect::<StoreResult<Vec<_>>>()?;

    let line_rows = sqlx::query(
        "SELECT order_id, ticket_type_id, count, unit_price FROM order_line_items \
         WHERE order_id = ANY($1) ORDER BY order_id ASC, ticket_type_id ASC",
    )
    .bind(ids)
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("order_line_items", e))?;

    let mut lines: BTreeMap<i64, Vec<LineItem>> = BTreeMap::new();
    for row in &line_rows {
        lines
            .entry(decode(row, "order_id")?)
            .or_default()
            .push(LineItem {
                ticket_type_id: TicketTypeId::new(decode(row, "ticket_type_id")?),
                count: decode(row, "count")?,
                unit_price: Money::from_minor(decode(row, "unit_price")?),
            });
    }

    headers
        .iter()
        .map(|row| {
            let id: i64 = decode(row, "id")?;
            Ok(Order {
                id: OrderId::new(id),
                customer_id: CustomerId::new(decode(row, "customer_id")?),
                line_items: lines.remove(&id).unwrap_or_default(),
                total_cost: Money::from_minor(decode(row, "total_cost")?),
                created_at: decode(row, "created_at")?,
            })
        })
        .collect()
}

fn customer_from_row(row: &PgRow) -> StoreResult<Customer> {
    Ok(Customer {
        id: CustomerId::new(decode(row, "id")?),
        username: decode(row, "username")?,
        credential_hash: decode(row, "credential_hash")?,
        balance: Money::from_minor(decode(row, "balance")?),
    })
}

fn ticket_type_from_row(row: &PgRow) -> StoreResult<TicketType> {
    Ok(TicketType {
        id: TicketTypeId::new(decode(row, "id")?),
        event_id: EventId::new(decode(row, "event_id")?),
        price: Money::from_minor(decode(row, "price")?),
        quantity_available: decode(row, "quantity_available")?,
    })
}

fn decode<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::internal(format!("failed to decode column {column}: {e}")))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") | Some("57014") => {
                    StoreError::Transient(msg)
                }
                Some("23505") if db_err.constraint() == Some("customers_username_key") => {
                    DomainError::conflict("customer already exists").into()
                }
                Some("22003") => DomainError::validation(overflow_message(operation)).into(),
                _ => StoreError::Internal(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient(format!("connection pool timed out in {}", operation))
        }
        _ => StoreError::Internal(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Same wording as the in-memory store's checked arithmetic.
fn overflow_message(operation: &str) -> &'static str {
    match operation {
        "release_quantity" => "quantity overflow",
        "credit" => "balance overflow",
        _ => "value out of range",
    }
}
