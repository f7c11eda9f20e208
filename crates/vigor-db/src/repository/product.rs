//! # Product Repository
//!
//! Database operations for products.
//!
//! ## Stock Updates Go Through The Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ❌ WRONG: callers writing stock levels directly                        │
//! │     UPDATE products SET current_stock = 7 WHERE id = ?                 │
//! │                                                                         │
//! │  ✅ CORRECT: every stock change flows through the inventory ledger,    │
//! │     which calls apply_stock_levels INSIDE its transaction, guarded     │
//! │     on the row_version it read:                                        │
//! │     UPDATE products SET current_stock = ?, reserved_stock = ?,         │
//! │            row_version = row_version + 1                               │
//! │     WHERE id = ? AND row_version = ?                                   │
//! │                                                                         │
//! │  The guard is what makes previous_stock/new_stock snapshots in the     │
//! │  ledger trustworthy: a lost update cannot slip between the read and    │
//! │  the write.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::audit::AuditStamp;
use crate::error::{DbError, DbResult};
use vigor_core::Product;

/// All columns of the products table, in struct order.
const PRODUCT_COLUMNS: &str = "\
    id, sku, name, current_stock, reserved_stock, min_stock, max_stock, \
    unit, location, is_active, \
    created_at, created_by, updated_at, updated_by, row_version";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let query = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);

        let product = sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let query = format!("SELECT {} FROM products WHERE sku = ?1", PRODUCT_COLUMNS);

        let product = sqlx::query_as::<_, Product>(&query)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists active products ordered by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let query = format!(
            "SELECT {} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1",
            PRODUCT_COLUMNS
        );

        let products = sqlx::query_as::<_, Product>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Lists active products at or below their reorder threshold.
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let query = format!(
            "SELECT {} FROM products \
             WHERE is_active = 1 AND current_stock <= min_stock ORDER BY name",
            PRODUCT_COLUMNS
        );

        let products = sqlx::query_as::<_, Product>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, current_stock, reserved_stock,
                min_stock, max_stock, unit, location, is_active,
                created_at, created_by, updated_at, updated_by, row_version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.current_stock)
        .bind(product.reserved_stock)
        .bind(product.min_stock)
        .bind(product.max_stock)
        .bind(&product.unit)
        .bind(&product.location)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(&product.created_by)
        .bind(product.updated_at)
        .bind(&product.updated_by)
        .bind(product.row_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// ## Why Soft Delete?
    /// - Historical movements and sales still reference this product
    /// - Can be restored if deleted by mistake
    pub async fn soft_delete(&self, id: &str, stamp: &AuditStamp) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                is_active = 0,
                updated_at = ?2,
                updated_by = ?3,
                row_version = row_version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Transaction-scoped helpers (used by the inventory ledger)
    // =========================================================================

    /// Fetches a product on an open transaction connection.
    ///
    /// The returned `row_version` is what [`Self::apply_stock_levels`] must
    /// be guarded on.
    pub async fn fetch_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
        let query = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);

        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Writes new stock levels on an open transaction connection, guarded
    /// on the version read by [`Self::fetch_in`].
    ///
    /// ## Returns
    /// * `Err(DbError::VersionConflict)` - a concurrent writer got there
    ///   first; the caller must roll back its transaction
    pub async fn apply_stock_levels(
        conn: &mut SqliteConnection,
        id: &str,
        expected_version: i64,
        new_stock: i64,
        new_reserved: i64,
        stamp: &AuditStamp,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                current_stock = ?3,
                reserved_stock = ?4,
                updated_at = ?5,
                updated_by = ?6,
                row_version = row_version + 1
            WHERE id = ?1 AND row_version = ?2
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(new_stock)
        .bind(new_reserved)
        .bind(stamp.at)
        .bind(&stamp.by)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::version_conflict("Product", id));
        }

        Ok(())
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Auditor;
    use crate::pool::{Database, DbConfig};
    use chrono::Utc;

    fn sample_product(id: &str, sku: &str, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            current_stock: stock,
            reserved_stock: 0,
            min_stock: 2,
            max_stock: None,
            unit: "pieza".to_string(),
            location: None,
            is_active: true,
            created_at: now,
            created_by: None,
            updated_at: now,
            updated_by: None,
            row_version: 0,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = test_db().await;
        let repo = db.products();

        repo.insert(&sample_product("p-1", "PROT-001", 5))
            .await
            .unwrap();

        let by_id = repo.get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(by_id.current_stock, 5);

        let by_sku = repo.get_by_sku("PROT-001").await.unwrap().unwrap();
        assert_eq!(by_sku.id, "p-1");

        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = test_db().await;
        let repo = db.products();

        repo.insert(&sample_product("p-1", "PROT-001", 5))
            .await
            .unwrap();
        let err = repo
            .insert(&sample_product("p-2", "PROT-001", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_guarded_stock_update() {
        let db = test_db().await;
        let repo = db.products();
        repo.insert(&sample_product("p-1", "PROT-001", 10))
            .await
            .unwrap();

        let stamp = Auditor::new("tester").stamp();

        let mut tx = db.pool().begin().await.unwrap();
        let product = ProductRepository::fetch_in(&mut *tx, "p-1").await.unwrap();
        ProductRepository::apply_stock_levels(&mut *tx, "p-1", product.row_version, 7, 0, &stamp)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let loaded = repo.get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(loaded.current_stock, 7);
        assert_eq!(loaded.row_version, 1);

        // A second update against the stale version must conflict
        let mut tx = db.pool().begin().await.unwrap();
        let err = ProductRepository::apply_stock_levels(&mut *tx, "p-1", 0, 3, 0, &stamp)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { .. }));
        tx.rollback().await.unwrap();

        let loaded = repo.get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(loaded.current_stock, 7);
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let db = test_db().await;
        let repo = db.products();

        repo.insert(&sample_product("p-1", "LOW-001", 1))
            .await
            .unwrap();
        repo.insert(&sample_product("p-2", "OK-001", 50))
            .await
            .unwrap();

        let low = repo.list_low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].sku, "LOW-001");
    }
}
