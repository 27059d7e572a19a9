use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::domain::checkout::{Checkout, NewCheckout};
use crate::domain::inventory::BookInventory;
use crate::domain::value_objects::{AuditAction, BookId, CheckoutId, StaffId, UserId};
use crate::ports::circulation_store::{
    CheckoutView, CirculationStore as CirculationStoreTrait, CirculationTx as CirculationTxTrait,
    Result, StoreError,
};

/// Upper bound on how long a transaction waits for a row lock.
/// Past this, the statement fails and the caller sees `StoreError::Busy`.
const LOCK_TIMEOUT: &str = "5s";

/// PostgreSQL implementation of the circulation row store
///
/// Books and checkouts are plain relational rows; all consistency comes from
/// `SELECT ... FOR UPDATE` row locks held for the duration of a transaction.
pub struct CirculationStore {
    pool: PgPool,
}

impl CirculationStore {
    /// Create a new store backed by a PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map sqlx failures to the store error taxonomy.
///
/// `55P03` (lock_not_available, raised on lock_timeout) and `40P01`
/// (deadlock_detected) surface as `Busy` so callers can retry; everything
/// else is an opaque backend error.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let Some(code) = err.as_database_error().and_then(|d| d.code()) {
        if code == "55P03" || code == "40P01" {
            return StoreError::Busy;
        }
    }
    StoreError::backend(err)
}

fn map_book_row(row: &PgRow) -> Result<BookInventory> {
    let total_copies: i32 = row.get("total_copies");
    let available_copies: i32 = row.get("available_copies");

    let total_copies: u32 = total_copies.try_into().map_err(|_| {
        StoreError::backend(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("total_copies out of range: {}", total_copies),
        ))
    })?;
    let available_copies: u32 = available_copies.try_into().map_err(|_| {
        StoreError::backend(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("available_copies out of range: {}", available_copies),
        ))
    })?;

    Ok(BookInventory {
        book_id: BookId::new(row.get("book_id")),
        total_copies,
        available_copies,
        retired: row.get("retired"),
    })
}

fn map_checkout_row(row: &PgRow) -> Checkout {
    Checkout {
        checkout_id: CheckoutId::new(row.get("checkout_id")),
        user_id: UserId::new(row.get("user_id")),
        book_id: BookId::new(row.get("book_id")),
        checkout_at: row.get("checkout_at"),
        due_at: row.get("due_at"),
        returned_at: row.get("returned_at"),
        is_late: row.get("is_late"),
    }
}

fn map_view_row(row: &PgRow) -> CheckoutView {
    CheckoutView {
        checkout_id: CheckoutId::new(row.get("checkout_id")),
        user_id: UserId::new(row.get("user_id")),
        book_id: BookId::new(row.get("book_id")),
        title: row.get("title"),
        checkout_at: row.get("checkout_at"),
        due_at: row.get("due_at"),
        returned_at: row.get("returned_at"),
        is_late: row.get("is_late"),
    }
}

#[async_trait]
impl CirculationStoreTrait for CirculationStore {
    async fn begin(&self) -> Result<Box<dyn CirculationTxTrait>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Bound lock waits so contended transactions fail fast as Busy
        // instead of queueing indefinitely.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}'", LOCK_TIMEOUT))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(Box::new(CirculationTx {
            tx,
            pool: self.pool.clone(),
        }))
    }

    async fn get_availability(&self, book_id: BookId) -> Result<Option<BookInventory>> {
        let row = sqlx::query(
            r#"
            SELECT book_id, total_copies, available_copies, retired
            FROM books
            WHERE book_id = $1
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(map_book_row).transpose()
    }

    async fn list_active_for_user(&self, user_id: UserId) -> Result<Vec<CheckoutView>> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.checkout_id,
                c.user_id,
                c.book_id,
                b.title,
                c.checkout_at,
                c.due_at,
                c.returned_at,
                c.is_late
            FROM checkouts c
            JOIN books b ON b.book_id = c.book_id
            WHERE c.user_id = $1 AND c.returned_at IS NULL
            ORDER BY c.checkout_at DESC
            "#,
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.iter().map(map_view_row).collect())
    }

    async fn list_all_for_user(&self, user_id: UserId) -> Result<Vec<CheckoutView>> {
        let rows = sqlx::query(
            r#"
            SELECT
                c.checkout_id,
                c.user_id,
                c.book_id,
                b.title,
                c.checkout_at,
                c.due_at,
                c.returned_at,
                c.is_late
            FROM checkouts c
            JOIN books b ON b.book_id = c.book_id
            WHERE c.user_id = $1
            ORDER BY c.checkout_at DESC
            "#,
        )
        .bind(user_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.iter().map(map_view_row).collect())
    }
}

/// An open PostgreSQL transaction over the circulation tables
///
/// Dropping this without `commit` rolls the transaction back (sqlx semantics),
/// which is exactly the failure behavior the services rely on.
pub struct CirculationTx {
    tx: Transaction<'static, Postgres>,
    // Kept for the audit fallback path, which writes outside the transaction.
    pool: PgPool,
}

#[async_trait]
impl CirculationTxTrait for CirculationTx {
    async fn lock_book(&mut self, book_id: BookId) -> Result<Option<BookInventory>> {
        let row = sqlx::query(
            r#"
            SELECT book_id, total_copies, available_copies, retired
            FROM books
            WHERE book_id = $1
            FOR UPDATE
            "#,
        )
        .bind(book_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(map_book_row).transpose()
    }

    async fn save_inventory(&mut self, inventory: &BookInventory) -> Result<()> {
        let total_copies: i32 = inventory.total_copies.try_into().map_err(|_| {
            StoreError::backend(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("total_copies out of range: {}", inventory.total_copies),
            ))
        })?;
        let available_copies: i32 = inventory.available_copies.try_into().map_err(|_| {
            StoreError::backend(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("available_copies out of range: {}", inventory.available_copies),
            ))
        })?;

        sqlx::query(
            r#"
            UPDATE books
            SET total_copies = $2, available_copies = $3
            WHERE book_id = $1
            "#,
        )
        .bind(inventory.book_id.value())
        .bind(total_copies)
        .bind(available_copies)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_checkout(&mut self, plan: &NewCheckout) -> Result<CheckoutId> {
        let checkout_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO checkouts (user_id, book_id, checkout_at, due_at)
            VALUES ($1, $2, $3, $4)
            RETURNING checkout_id
            "#,
        )
        .bind(plan.user_id.value())
        .bind(plan.book_id.value())
        .bind(plan.checkout_at)
        .bind(plan.due_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(CheckoutId::new(checkout_id))
    }

    async fn lock_checkout(&mut self, checkout_id: CheckoutId) -> Result<Option<Checkout>> {
        let row = sqlx::query(
            r#"
            SELECT checkout_id, user_id, book_id, checkout_at, due_at, returned_at, is_late
            FROM checkouts
            WHERE checkout_id = $1
            FOR UPDATE
            "#,
        )
        .bind(checkout_id.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.as_ref().map(map_checkout_row))
    }

    async fn save_return(&mut self, checkout: &Checkout) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE checkouts
            SET returned_at = $2, is_late = $3
            WHERE checkout_id = $1
            "#,
        )
        .bind(checkout.checkout_id.value())
        .bind(checkout.returned_at)
        .bind(checkout.is_late)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Append a staff audit entry.
    ///
    /// Primary path writes inside the transaction so the entry commits
    /// atomically with the inventory change. The insert runs under a
    /// savepoint: a failed statement puts a Postgres transaction into the
    /// aborted state, where a later COMMIT silently becomes ROLLBACK, so the
    /// failure must be rolled back to the savepoint before the transaction
    /// can go on to commit the inventory work. After that, fall back to a
    /// direct insert through the pool. The fallback itself can still fail,
    /// in which case the action goes unaudited; the caller only logs.
    async fn append_audit(
        &mut self,
        staff_id: Option<StaffId>,
        action: &AuditAction,
    ) -> Result<()> {
        sqlx::query("SAVEPOINT audit_append")
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        let in_tx = sqlx::query(
            r#"
            INSERT INTO staff_audit_log (staff_id, action)
            VALUES ($1, $2)
            "#,
        )
        .bind(staff_id.map(|s| s.value()))
        .bind(action.as_str())
        .execute(&mut *self.tx)
        .await;

        match in_tx {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT audit_append")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(map_sqlx_error)?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "in-transaction audit insert failed; falling back to direct insert"
                );

                sqlx::query("ROLLBACK TO SAVEPOINT audit_append")
                    .execute(&mut *self.tx)
                    .await
                    .map_err(map_sqlx_error)?;

                sqlx::query(
                    r#"
                    INSERT INTO staff_audit_log (staff_id, action)
                    VALUES ($1, $2)
                    "#,
                )
                .bind(staff_id.map(|s| s.value()))
                .bind(action.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

                Ok(())
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }
}
