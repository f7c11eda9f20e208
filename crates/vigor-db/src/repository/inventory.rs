//! # Inventory Movement Repository
//!
//! The append-only stock ledger.
//!
//! ## Append-Only Discipline
//! Movements are the audit trail from which current stock is derivable;
//! this repository exposes insert and read operations only. There is no
//! update, no delete. Corrections are new movements
//! (`ajuste_manual_mas` / `ajuste_manual_menos`), never edits.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::DbResult;
use vigor_core::InventoryMovement;

/// All columns of the inventory_movements table, in struct order.
const MOVEMENT_COLUMNS: &str = "\
    id, product_id, movement_type, quantity, previous_stock, new_stock, \
    reason, reference_id, notes, created_at, created_by";

/// Repository for the inventory movement ledger.
#[derive(Debug, Clone)]
pub struct InventoryMovementRepository {
    pool: SqlitePool,
}

impl InventoryMovementRepository {
    /// Creates a new InventoryMovementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryMovementRepository { pool }
    }

    /// Inserts a movement row on an open transaction connection.
    ///
    /// The ledger engine calls this inside the same transaction as the
    /// product stock update so the pair commits or rolls back together.
    pub async fn insert_in(
        conn: &mut SqliteConnection,
        movement: &InventoryMovement,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id, product_id, movement_type, quantity,
                previous_stock, new_stock,
                reason, reference_id, notes,
                created_at, created_by
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11
            )
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(movement.movement_type)
        .bind(movement.quantity)
        .bind(movement.previous_stock)
        .bind(movement.new_stock)
        .bind(&movement.reason)
        .bind(&movement.reference_id)
        .bind(&movement.notes)
        .bind(movement.created_at)
        .bind(&movement.created_by)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Lists the most recent movements across all products.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<InventoryMovement>> {
        let query = format!(
            "SELECT {} FROM inventory_movements ORDER BY created_at DESC, id DESC LIMIT ?1",
            MOVEMENT_COLUMNS
        );

        let movements = sqlx::query_as::<_, InventoryMovement>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Lists movements for one product, newest first.
    pub async fn list_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<InventoryMovement>> {
        let query = format!(
            "SELECT {} FROM inventory_movements \
             WHERE product_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            MOVEMENT_COLUMNS
        );

        let movements = sqlx::query_as::<_, InventoryMovement>(&query)
            .bind(product_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Lists movements caused by one business transaction (a sale id,
    /// refund id, purchase order id), oldest first.
    pub async fn list_for_reference(&self, reference_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let query = format!(
            "SELECT {} FROM inventory_movements \
             WHERE reference_id = ?1 ORDER BY created_at, id",
            MOVEMENT_COLUMNS
        );

        let movements = sqlx::query_as::<_, InventoryMovement>(&query)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }
}

/// Helper to generate a new movement ID.
pub fn generate_movement_id() -> String {
    Uuid::new_v4().to_string()
}
