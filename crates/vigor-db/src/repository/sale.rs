//! # Sale Repository
//!
//! Database operations for sales, line items, payment details and refunds.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  Direct sale:  insert_sale(completed/paid) + items + payments          │
//! │                                                                         │
//! │  Layaway:      insert_sale(pending) ── mark_stock_reserved             │
//! │                     │                                                   │
//! │                     ├── update_payment_progress (deposits arriving)    │
//! │                     │                                                   │
//! │                     ├── complete_layaway  (balance cleared)            │
//! │                     └── cancel            (customer walked away)       │
//! │                                                                         │
//! │  Refund:       insert_refund + insert_refund_item + apply_refund       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! All status transitions are version-guarded; the business numbers
//! (sale_number, refund_number) are date-prefixed daily sequences.

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::audit::AuditStamp;
use crate::error::{DbError, DbResult};
use vigor_core::{PaymentDetail, PaymentStatus, Refund, RefundItem, Sale, SaleItem, SaleStatus};

/// All columns of the sales table, in struct order.
const SALE_COLUMNS: &str = "\
    id, sale_number, customer_id, sale_type, status, payment_status, \
    subtotal_cents, tax_cents, discount_cents, total_cents, \
    required_deposit_cents, deposit_percentage, \
    paid_cents, pending_cents, refunded_cents, \
    requires_stock_reservation, stock_reserved_at, stock_released_at, \
    layaway_expires_at, cancellation_reason, completed_at, \
    created_at, created_by, updated_at, updated_by, row_version";

/// All columns of the sale_items table, in struct order.
const SALE_ITEM_COLUMNS: &str = "\
    id, sale_id, product_id, sku_snapshot, name_snapshot, unit_price_cents, \
    quantity, line_total_cents, tax_rate_bps, tax_cents, discount_cents, created_at";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let query = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);

        let sale = sqlx::query_as::<_, Sale>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets a sale by its business number.
    pub async fn get_by_number(&self, sale_number: &str) -> DbResult<Option<Sale>> {
        let query = format!("SELECT {} FROM sales WHERE sale_number = ?1", SALE_COLUMNS);

        let sale = sqlx::query_as::<_, Sale>(&query)
            .bind(sale_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets all items for a sale, in insertion order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let query = format!(
            "SELECT {} FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, id",
            SALE_ITEM_COLUMNS
        );

        let items = sqlx::query_as::<_, SaleItem>(&query)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Gets a single sale item by its ID.
    pub async fn get_item(&self, item_id: &str) -> DbResult<Option<SaleItem>> {
        let query = format!("SELECT {} FROM sale_items WHERE id = ?1", SALE_ITEM_COLUMNS);

        let item = sqlx::query_as::<_, SaleItem>(&query)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    /// Gets all payment detail rows for a sale, ordered by tender sequence.
    pub async fn get_payment_details(&self, sale_id: &str) -> DbResult<Vec<PaymentDetail>> {
        let details = sqlx::query_as::<_, PaymentDetail>(
            "SELECT id, sale_id, payment_method, amount_cents, payment_reference, \
             sequence_order, created_at \
             FROM sale_payment_details WHERE sale_id = ?1 ORDER BY sequence_order",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(details)
    }

    // =========================================================================
    // Business numbers
    // =========================================================================

    /// Next sale number for the day: `{YYYYMMDD}{NNNN}`.
    ///
    /// Scans the highest existing number with today's prefix and adds one.
    /// Uniqueness is ultimately enforced by the UNIQUE column; a race on
    /// the sequence surfaces as `UniqueViolation` and the caller retries.
    pub async fn next_sale_number(&self, date_prefix: &str) -> DbResult<String> {
        let last: Option<String> = sqlx::query_scalar(
            "SELECT sale_number FROM sales WHERE sale_number LIKE ?1 \
             ORDER BY sale_number DESC LIMIT 1",
        )
        .bind(format!("{}%", date_prefix))
        .fetch_optional(&self.pool)
        .await?;

        Ok(format!(
            "{}{:04}",
            date_prefix,
            next_sequence(last.as_deref())
        ))
    }

    /// Next refund number for the day: `DEV{YYYYMMDD}{NNNN}`.
    pub async fn next_refund_number(&self, date_prefix: &str) -> DbResult<String> {
        let prefix = format!("DEV{}", date_prefix);
        let last: Option<String> = sqlx::query_scalar(
            "SELECT refund_number FROM refunds WHERE refund_number LIKE ?1 \
             ORDER BY refund_number DESC LIMIT 1",
        )
        .bind(format!("{}%", prefix))
        .fetch_optional(&self.pool)
        .await?;

        Ok(format!("{}{:04}", prefix, next_sequence(last.as_deref())))
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    /// Inserts a sale row.
    pub async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, sale_number = %sale.sale_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_number, customer_id, sale_type, status, payment_status,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                required_deposit_cents, deposit_percentage,
                paid_cents, pending_cents, refunded_cents,
                requires_stock_reservation, stock_reserved_at, stock_released_at,
                layaway_expires_at, cancellation_reason, completed_at,
                created_at, created_by, updated_at, updated_by, row_version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12,
                ?13, ?14, ?15,
                ?16, ?17, ?18,
                ?19, ?20, ?21,
                ?22, ?23, ?24, ?25, ?26
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.sale_number)
        .bind(&sale.customer_id)
        .bind(sale.sale_type)
        .bind(sale.status)
        .bind(sale.payment_status)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.required_deposit_cents)
        .bind(sale.deposit_percentage)
        .bind(sale.paid_cents)
        .bind(sale.pending_cents)
        .bind(sale.refunded_cents)
        .bind(sale.requires_stock_reservation)
        .bind(sale.stock_reserved_at)
        .bind(sale.stock_released_at)
        .bind(sale.layaway_expires_at)
        .bind(&sale.cancellation_reason)
        .bind(sale.completed_at)
        .bind(sale.created_at)
        .bind(&sale.created_by)
        .bind(sale.updated_at)
        .bind(&sale.updated_by)
        .bind(sale.row_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds a line item to a sale.
    ///
    /// ## Snapshot Pattern
    /// Product details (sku, name, price) are copied onto the item so the
    /// sale history stays intact when the catalog changes later.
    pub async fn insert_item(&self, item: &SaleItem) -> DbResult<()> {
        debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Adding sale item");

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id,
                sku_snapshot, name_snapshot, unit_price_cents,
                quantity, line_total_cents, tax_rate_bps, tax_cents, discount_cents,
                created_at
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12
            )
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.sku_snapshot)
        .bind(&item.name_snapshot)
        .bind(item.unit_price_cents)
        .bind(item.quantity)
        .bind(item.line_total_cents)
        .bind(item.tax_rate_bps)
        .bind(item.tax_cents)
        .bind(item.discount_cents)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records one payment-detail row of a (possibly split) tender.
    pub async fn insert_payment_detail(&self, detail: &PaymentDetail) -> DbResult<()> {
        debug!(sale_id = %detail.sale_id, amount = %detail.amount_cents, "Recording payment detail");

        sqlx::query(
            r#"
            INSERT INTO sale_payment_details (
                id, sale_id, payment_method, amount_cents,
                payment_reference, sequence_order, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&detail.id)
        .bind(&detail.sale_id)
        .bind(&detail.payment_method)
        .bind(detail.amount_cents)
        .bind(&detail.payment_reference)
        .bind(detail.sequence_order)
        .bind(detail.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a refund aggregate row.
    pub async fn insert_refund(&self, refund: &Refund) -> DbResult<()> {
        debug!(sale_id = %refund.sale_id, refund_number = %refund.refund_number, "Inserting refund");

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, sale_id, refund_number, refund_type,
                total_refunded_cents, reason, created_at, created_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.sale_id)
        .bind(&refund.refund_number)
        .bind(refund.refund_type)
        .bind(refund.total_refunded_cents)
        .bind(&refund.reason)
        .bind(refund.created_at)
        .bind(&refund.created_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts one refunded line.
    pub async fn insert_refund_item(&self, item: &RefundItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refund_items (
                id, refund_id, sale_item_id,
                quantity_refunded, refund_amount_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&item.id)
        .bind(&item.refund_id)
        .bind(&item.sale_item_id)
        .bind(item.quantity_refunded)
        .bind(item.refund_amount_cents)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Version-guarded status transitions
    // =========================================================================

    /// Marks a layaway's stock as reserved.
    pub async fn mark_stock_reserved(
        &self,
        sale_id: &str,
        expected_version: i64,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                requires_stock_reservation = 1,
                stock_reserved_at = ?3,
                updated_at = ?3,
                updated_by = ?4,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(sale_id)
        .bind(expected_version)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        self.check_one_row(sale_id, result.rows_affected()).await
    }

    /// Writes a new paid/pending balance and payment status.
    pub async fn update_payment_progress(
        &self,
        sale_id: &str,
        expected_version: i64,
        paid_cents: i64,
        pending_cents: i64,
        payment_status: PaymentStatus,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        debug!(
            sale_id = %sale_id,
            paid = paid_cents,
            pending = pending_cents,
            "Updating payment progress"
        );

        let result = sqlx::query(
            r#"
            UPDATE sales SET
                paid_cents = ?3,
                pending_cents = ?4,
                payment_status = ?5,
                updated_at = ?6,
                updated_by = ?7,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(sale_id)
        .bind(expected_version)
        .bind(paid_cents)
        .bind(pending_cents)
        .bind(payment_status)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        self.check_one_row(sale_id, result.rows_affected()).await
    }

    /// Marks a layaway completed: goods released, balance settled.
    pub async fn complete_layaway(
        &self,
        sale_id: &str,
        expected_version: i64,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'completed',
                payment_status = 'paid',
                stock_released_at = ?3,
                completed_at = ?3,
                updated_at = ?3,
                updated_by = ?4,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(sale_id)
        .bind(expected_version)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        self.check_one_row(sale_id, result.rows_affected()).await
    }

    /// Cancels a sale, recording the reason and releasing any hold.
    pub async fn cancel(
        &self,
        sale_id: &str,
        expected_version: i64,
        reason: &str,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'cancelled',
                cancellation_reason = ?3,
                stock_released_at = ?4,
                updated_at = ?4,
                updated_by = ?5,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(sale_id)
        .bind(expected_version)
        .bind(reason)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        self.check_one_row(sale_id, result.rows_affected()).await
    }

    /// Records refund progress on the original sale.
    ///
    /// `status` stays `completed` for partial refunds and flips to
    /// `refunded` for full ones; `refunded_cents` accumulates.
    pub async fn apply_refund(
        &self,
        sale_id: &str,
        expected_version: i64,
        status: SaleStatus,
        refunded_cents: i64,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = ?3,
                refunded_cents = ?4,
                updated_at = ?5,
                updated_by = ?6,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(sale_id)
        .bind(expected_version)
        .bind(status)
        .bind(refunded_cents)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        self.check_one_row(sale_id, result.rows_affected()).await
    }

    /// Maps zero affected rows to VersionConflict/NotFound.
    async fn check_one_row(&self, sale_id: &str, rows_affected: u64) -> DbResult<()> {
        if rows_affected == 0 {
            return match self.get_by_id(sale_id).await? {
                Some(_) => Err(DbError::version_conflict("Sale", sale_id)),
                None => Err(DbError::not_found("Sale", sale_id)),
            };
        }
        Ok(())
    }
}

/// Parses the 4-digit suffix of the highest existing number and adds one.
fn next_sequence(last_number: Option<&str>) -> u32 {
    last_number
        .and_then(|n| {
            let digits = n.len().checked_sub(4).map(|start| &n[start..])?;
            digits.parse::<u32>().ok()
        })
        .map(|seq| seq + 1)
        .unwrap_or(1)
}

/// Generates a new sale ID.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new sale item ID.
pub fn generate_sale_item_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new payment detail ID.
pub fn generate_payment_detail_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new refund ID.
pub fn generate_refund_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new refund item ID.
pub fn generate_refund_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sequence() {
        assert_eq!(next_sequence(None), 1);
        assert_eq!(next_sequence(Some("202502010001")), 2);
        assert_eq!(next_sequence(Some("202502010099")), 100);
        assert_eq!(next_sequence(Some("DEV202502010007")), 8);
        // Garbage suffix falls back to 1 rather than panicking
        assert_eq!(next_sequence(Some("bad")), 1);
    }

    mod db {
        use super::super::*;
        use crate::audit::Auditor;
        use crate::pool::{Database, DbConfig};
        use chrono::Utc;
        use vigor_core::{PaymentStatus, SaleType};

        fn sample_sale(id: &str, number: &str) -> Sale {
            let now = Utc::now();
            Sale {
                id: id.to_string(),
                sale_number: number.to_string(),
                customer_id: Some("c-1".to_string()),
                sale_type: SaleType::Layaway,
                status: SaleStatus::Pending,
                payment_status: PaymentStatus::Partial,
                subtotal_cents: 10000,
                tax_cents: 1600,
                discount_cents: 0,
                total_cents: 11600,
                required_deposit_cents: 5800,
                deposit_percentage: 50,
                paid_cents: 5800,
                pending_cents: 5800,
                refunded_cents: 0,
                requires_stock_reservation: false,
                stock_reserved_at: None,
                stock_released_at: None,
                layaway_expires_at: None,
                cancellation_reason: None,
                completed_at: None,
                created_at: now,
                created_by: Some("tester".to_string()),
                updated_at: now,
                updated_by: Some("tester".to_string()),
                row_version: 0,
            }
        }

        async fn test_db() -> Database {
            Database::new(DbConfig::in_memory()).await.unwrap()
        }

        #[tokio::test]
        async fn test_sale_roundtrip_and_numbering() {
            let db = test_db().await;
            let repo = db.sales();

            assert_eq!(
                repo.next_sale_number("20250201").await.unwrap(),
                "202502010001"
            );

            repo.insert_sale(&sample_sale("s-1", "202502010001"))
                .await
                .unwrap();

            assert_eq!(
                repo.next_sale_number("20250201").await.unwrap(),
                "202502010002"
            );
            // Different day starts over
            assert_eq!(
                repo.next_sale_number("20250202").await.unwrap(),
                "202502020001"
            );

            let loaded = repo.get_by_id("s-1").await.unwrap().unwrap();
            assert_eq!(loaded.sale_type, SaleType::Layaway);
            assert_eq!(loaded.total_cents, 11600);

            let by_number = repo.get_by_number("202502010001").await.unwrap().unwrap();
            assert_eq!(by_number.id, "s-1");
        }

        #[tokio::test]
        async fn test_payment_progress_and_completion() {
            let db = test_db().await;
            let repo = db.sales();
            repo.insert_sale(&sample_sale("s-1", "202502010001"))
                .await
                .unwrap();

            let stamp = Auditor::new("tester").stamp();
            repo.update_payment_progress("s-1", 0, 11600, 0, PaymentStatus::Paid, &stamp)
                .await
                .unwrap();

            let sale = repo.get_by_id("s-1").await.unwrap().unwrap();
            assert_eq!(sale.pending_cents, 0);
            assert_eq!(sale.payment_status, PaymentStatus::Paid);
            assert_eq!(sale.row_version, 1);

            repo.complete_layaway("s-1", 1, &stamp).await.unwrap();
            let sale = repo.get_by_id("s-1").await.unwrap().unwrap();
            assert_eq!(sale.status, SaleStatus::Completed);
            assert!(sale.completed_at.is_some());
            assert!(sale.stock_released_at.is_some());
        }

        #[tokio::test]
        async fn test_guarded_update_conflicts_on_stale_version() {
            let db = test_db().await;
            let repo = db.sales();
            repo.insert_sale(&sample_sale("s-1", "202502010001"))
                .await
                .unwrap();

            let stamp = Auditor::system().stamp();
            let err = repo
                .cancel("s-1", 9, "customer walked away", &stamp)
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::VersionConflict { .. }));

            let err = repo
                .cancel("ghost", 0, "nope", &stamp)
                .await
                .unwrap_err();
            assert!(matches!(err, DbError::NotFound { .. }));
        }
    }
}
