//! # Inventory Ledger Engine
//!
//! Maintains product stock levels through an append-only movement log.
//!
//! ## Recording A Movement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    record_movement (one transaction)                    │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    │                                                                    │
//! │    ├── read product        → previous_stock, row_version               │
//! │    │                                                                    │
//! │    ├── classify type       → signed quantity                           │
//! │    │     increase   (+)      devolucion, recepcion_compra, ...         │
//! │    │     decrease   (−)      venta_directa, merma, ...                 │
//! │    │     reservation (=)     reserva_apartado, cancelar_reserva        │
//! │    │                                                                    │
//! │    ├── new_stock = max(0, previous ± |qty|)   ← floor at zero          │
//! │    │                                                                    │
//! │    ├── INSERT movement row (audit stamped)                             │
//! │    │                                                                    │
//! │    └── UPDATE product stock WHERE row_version = <read version>         │
//! │          │                                                              │
//! │          ├── 1 row  → COMMIT (both rows or neither)                    │
//! │          └── 0 rows → ROLLBACK, VersionConflict                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reservation Model
//! Reservation types move `reserved_stock` and leave `current_stock`
//! untouched: the goods are still on the shelf, just promised. Available
//! stock for new sales/reservations is `current_stock - reserved_stock`.
//! The previous/new snapshots on reservation rows therefore stay equal;
//! the signed-delta invariant `new == previous + quantity` is asserted for
//! increase/decrease rows.
//!
//! ## Stock Checks Are The Caller's Job
//! `check_available_stock` must be called immediately before any
//! decrease-type movement. The engine floors the stored snapshot at zero
//! but does not re-check availability inside `record_movement`.

use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use vigor_core::validation::validate_quantity;
use vigor_core::{CoreError, InventoryMovement, MovementType, Product, StockDirection};
use vigor_db::repository::inventory::generate_movement_id;
use vigor_db::{Auditor, Database, DbError, InventoryMovementRepository, ProductRepository};

// =============================================================================
// Stock Operation
// =============================================================================

/// One stock-changing request, as the ledger receives it.
///
/// `quantity` is a magnitude; the sign stored on the ledger row comes from
/// the movement type's classification.
#[derive(Debug, Clone)]
pub struct StockOperation {
    pub product_id: String,
    pub quantity: i64,
    pub movement_type: MovementType,
    pub reference_id: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl StockOperation {
    /// Shorthand for the common id/quantity/type/reference shape.
    pub fn new(
        product_id: impl Into<String>,
        quantity: i64,
        movement_type: MovementType,
        reference_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        StockOperation {
            product_id: product_id.into(),
            quantity,
            movement_type,
            reference_id,
            reason: Some(reason.into()),
            notes: None,
        }
    }
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// The inventory ledger engine.
///
/// All stock mutation in the system flows through [`record_movement`]
/// (directly or via the composite operations below); nothing else writes
/// `current_stock`.
///
/// [`record_movement`]: InventoryLedger::record_movement
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    db: Database,
    auditor: Auditor,
}

impl InventoryLedger {
    /// Creates a ledger engine writing as the given auditor.
    pub fn new(db: Database, auditor: Auditor) -> Self {
        InventoryLedger { db, auditor }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Units of a product available for sale or reservation.
    pub async fn available_stock(&self, product_id: &str) -> EngineResult<i64> {
        let product = self.fetch_product(product_id).await?;
        Ok(product.available_stock())
    }

    /// Whether `required_quantity` units can be taken or reserved right now.
    ///
    /// Advisory: call this immediately before a decrease-type movement.
    /// Two callers racing between check and act are serialized by the
    /// version guard inside `record_movement`: the loser gets a
    /// `VersionConflict` and retries.
    pub async fn check_available_stock(
        &self,
        product_id: &str,
        required_quantity: i64,
    ) -> EngineResult<bool> {
        let product = self.fetch_product(product_id).await?;
        Ok(product.can_fulfill(required_quantity))
    }

    /// Most recent movements across all products.
    pub async fn recent_movements(&self, limit: u32) -> EngineResult<Vec<InventoryMovement>> {
        Ok(self.db.movements().list_recent(limit).await?)
    }

    /// Movement history for one product, newest first.
    pub async fn movements_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> EngineResult<Vec<InventoryMovement>> {
        Ok(self.db.movements().list_for_product(product_id, limit).await?)
    }

    /// Movements recorded for one business transaction, oldest first.
    pub async fn movements_for_reference(
        &self,
        reference_id: &str,
    ) -> EngineResult<Vec<InventoryMovement>> {
        Ok(self.db.movements().list_for_reference(reference_id).await?)
    }

    // =========================================================================
    // The core primitive
    // =========================================================================

    /// Records one movement and updates the product's stock, atomically.
    ///
    /// ## Atomicity
    /// Movement row and stock update commit together or not at all. A
    /// concurrent writer between our read and write surfaces as
    /// `VersionConflict` with everything rolled back; the caller may
    /// retry the whole business operation.
    ///
    /// ## Returns
    /// The written movement row, including the stock snapshots.
    pub async fn record_movement(&self, op: StockOperation) -> EngineResult<InventoryMovement> {
        validate_quantity(op.quantity.abs()).map_err(CoreError::from)?;

        debug!(
            product_id = %op.product_id,
            movement_type = ?op.movement_type,
            quantity = op.quantity,
            "Recording inventory movement"
        );

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let product = ProductRepository::fetch_in(&mut *tx, &op.product_id).await?;
        let previous_stock = product.current_stock;
        let signed_quantity = op.movement_type.signed_quantity(op.quantity);

        // Floor at zero: upstream checks should prevent this case, but the
        // stored snapshot must never go negative
        let (new_stock, new_reserved) = match op.movement_type.direction() {
            StockDirection::Increase | StockDirection::Decrease => (
                (previous_stock + signed_quantity).max(0),
                product.reserved_stock,
            ),
            StockDirection::Reservation => {
                let reserved = match op.movement_type {
                    MovementType::ReservaApartado => product.reserved_stock + op.quantity.abs(),
                    _ => (product.reserved_stock - op.quantity.abs()).max(0),
                };
                (previous_stock, reserved)
            }
        };

        let stamp = self.auditor.stamp();
        let movement = InventoryMovement {
            id: generate_movement_id(),
            product_id: op.product_id.clone(),
            movement_type: op.movement_type,
            quantity: signed_quantity,
            previous_stock,
            new_stock,
            reason: op.reason,
            reference_id: op.reference_id,
            notes: op.notes,
            created_at: stamp.at,
            created_by: stamp.by.clone(),
        };

        InventoryMovementRepository::insert_in(&mut *tx, &movement).await?;
        ProductRepository::apply_stock_levels(
            &mut *tx,
            &op.product_id,
            product.row_version,
            new_stock,
            new_reserved,
            &stamp,
        )
        .await?;

        tx.commit().await.map_err(DbError::from)?;

        info!(
            product_id = %movement.product_id,
            movement_type = ?movement.movement_type,
            quantity = movement.quantity,
            previous_stock = movement.previous_stock,
            new_stock = movement.new_stock,
            "Movement recorded"
        );

        Ok(movement)
    }

    // =========================================================================
    // Composite business operations
    // =========================================================================

    /// Direct sale: stock check, then one `venta_directa` decrease.
    pub async fn process_sale(
        &self,
        product_id: &str,
        quantity: i64,
        sale_id: &str,
    ) -> EngineResult<InventoryMovement> {
        self.ensure_available(product_id, quantity).await?;

        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::VentaDirecta,
            Some(sale_id.to_string()),
            "Direct sale at point of sale",
        ))
        .await
    }

    /// Layaway reservation: stock check, then one `reserva_apartado` hold.
    pub async fn create_layaway(
        &self,
        product_id: &str,
        quantity: i64,
        sale_id: &str,
    ) -> EngineResult<InventoryMovement> {
        self.ensure_available(product_id, quantity).await?;

        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::ReservaApartado,
            Some(sale_id.to_string()),
            "Stock reserved for layaway",
        ))
        .await
    }

    /// Layaway completion: release the hold, then record the final sale.
    ///
    /// Two ledger rows for one conceptual change (reserved → sold):
    /// reporting keeps the release event and the sale event distinct.
    /// Net stock effect is a single decrease.
    pub async fn complete_layaway(
        &self,
        product_id: &str,
        quantity: i64,
        sale_id: &str,
    ) -> EngineResult<()> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::CancelarReserva,
            Some(sale_id.to_string()),
            "Reservation released to complete layaway",
        ))
        .await?;

        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::VentaApartado,
            Some(sale_id.to_string()),
            "Final sale of completed layaway",
        ))
        .await?;

        Ok(())
    }

    /// Layaway cancellation: one `cancelar_reserva` release.
    pub async fn cancel_layaway(
        &self,
        product_id: &str,
        quantity: i64,
        sale_id: &str,
    ) -> EngineResult<InventoryMovement> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::CancelarReserva,
            Some(sale_id.to_string()),
            "Layaway cancelled, reservation released",
        ))
        .await
    }

    /// Customer refund: one `devolucion` increase.
    pub async fn process_refund(
        &self,
        product_id: &str,
        quantity: i64,
        refund_id: &str,
    ) -> EngineResult<InventoryMovement> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::Devolucion,
            Some(refund_id.to_string()),
            "Customer refund returned to stock",
        ))
        .await
    }

    /// Purchase receipt: one `recepcion_compra` increase.
    pub async fn receive_purchase(
        &self,
        product_id: &str,
        quantity: i64,
        purchase_order_id: &str,
    ) -> EngineResult<InventoryMovement> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::RecepcionCompra,
            Some(purchase_order_id.to_string()),
            "Merchandise received from supplier",
        ))
        .await
    }

    /// Manual adjustment; the sign of `delta` picks the movement type.
    pub async fn adjust_inventory(
        &self,
        product_id: &str,
        delta: i64,
        reason: &str,
        notes: Option<String>,
    ) -> EngineResult<InventoryMovement> {
        let movement_type = if delta > 0 {
            MovementType::AjusteManualMas
        } else {
            MovementType::AjusteManualMenos
        };

        self.record_movement(StockOperation {
            product_id: product_id.to_string(),
            quantity: delta.abs(),
            movement_type,
            reference_id: None,
            reason: Some(reason.to_string()),
            notes,
        })
        .await
    }

    /// Shrinkage write-off: one `merma` decrease.
    pub async fn record_shrinkage(
        &self,
        product_id: &str,
        quantity: i64,
        reason: &str,
    ) -> EngineResult<InventoryMovement> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::Merma,
            None,
            reason,
        ))
        .await
    }

    /// Inbound transfer from another location.
    pub async fn transfer_in(
        &self,
        product_id: &str,
        quantity: i64,
        transfer_ref: &str,
    ) -> EngineResult<InventoryMovement> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::TransferenciaEntrada,
            Some(transfer_ref.to_string()),
            "Transfer in from another location",
        ))
        .await
    }

    /// Outbound transfer to another location.
    pub async fn transfer_out(
        &self,
        product_id: &str,
        quantity: i64,
        transfer_ref: &str,
    ) -> EngineResult<InventoryMovement> {
        self.ensure_available(product_id, quantity).await?;

        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::TransferenciaSalida,
            Some(transfer_ref.to_string()),
            "Transfer out to another location",
        ))
        .await
    }

    /// Opening balance when a product enters the catalog.
    pub async fn set_initial_stock(
        &self,
        product_id: &str,
        quantity: i64,
    ) -> EngineResult<InventoryMovement> {
        self.record_movement(StockOperation::new(
            product_id,
            quantity,
            MovementType::InventarioInicial,
            None,
            "Opening stock balance",
        ))
        .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn fetch_product(&self, product_id: &str) -> EngineResult<Product> {
        self.db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| EngineError::Db(DbError::not_found("Product", product_id)))
    }

    /// Errors with the product's name and counts when stock is short.
    async fn ensure_available(&self, product_id: &str, quantity: i64) -> EngineResult<()> {
        let product = self.fetch_product(product_id).await?;
        if !product.can_fulfill(quantity) {
            warn!(
                product_id = %product_id,
                available = product.available_stock(),
                requested = quantity,
                "Stock check failed"
            );
            let available = product.available_stock();
            return Err(EngineError::Core(CoreError::InsufficientStock {
                name: product.name,
                available,
                requested: quantity,
            }));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigor_db::DbConfig;

    async fn test_ledger() -> (Database, InventoryLedger) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = InventoryLedger::new(db.clone(), Auditor::new("tester"));
        (db, ledger)
    }

    async fn seed_product(db: &Database, id: &str, stock: i64) {
        let now = Utc::now();
        db.products()
            .insert(&Product {
                id: id.to_string(),
                sku: format!("SKU-{}", id),
                name: format!("Product {}", id),
                current_stock: stock,
                reserved_stock: 0,
                min_stock: 0,
                max_stock: None,
                unit: "pieza".to_string(),
                location: None,
                is_active: true,
                created_at: now,
                created_by: None,
                updated_at: now,
                updated_by: None,
                row_version: 0,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_process_sale_records_consistent_snapshots() {
        // Product with stock 5, sale of 3: one venta_directa row with
        // previous 5, quantity -3, new 2; product stock becomes 2.
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 5).await;

        assert!(ledger.check_available_stock("p-1", 3).await.unwrap());

        let movement = ledger.process_sale("p-1", 3, "sale-1").await.unwrap();
        assert_eq!(movement.movement_type, MovementType::VentaDirecta);
        assert_eq!(movement.previous_stock, 5);
        assert_eq!(movement.quantity, -3);
        assert_eq!(movement.new_stock, 2);
        assert_eq!(movement.created_by.as_deref(), Some("tester"));

        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 2);
    }

    #[tokio::test]
    async fn test_sale_rejected_when_stock_short() {
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 2).await;

        let err = ledger.process_sale("p-1", 3, "sale-1").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            })
        ));

        // Nothing was written
        assert!(ledger.recent_movements(10).await.unwrap().is_empty());
        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 2);
    }

    #[tokio::test]
    async fn test_new_stock_floors_at_zero() {
        // Manual adjustment down past zero: snapshot floors at 0
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 5).await;

        let movement = ledger
            .adjust_inventory("p-1", -9, "cycle count correction", None)
            .await
            .unwrap();

        assert_eq!(movement.movement_type, MovementType::AjusteManualMenos);
        assert_eq!(movement.quantity, -9);
        assert_eq!(movement.new_stock, 0);

        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 0);
    }

    #[tokio::test]
    async fn test_increase_types_add_stock() {
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 2).await;

        ledger.process_refund("p-1", 1, "ref-1").await.unwrap();
        ledger.receive_purchase("p-1", 10, "po-1").await.unwrap();
        ledger
            .adjust_inventory("p-1", 2, "found extra units", None)
            .await
            .unwrap();

        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 15);

        // Every increase/decrease row satisfies new == previous + quantity
        for m in ledger.recent_movements(10).await.unwrap() {
            assert_eq!(m.new_stock, m.previous_stock + m.quantity);
        }
    }

    #[tokio::test]
    async fn test_reservation_cycle_conserves_stock() {
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 10).await;

        // Reserve 4: current stays, available shrinks
        ledger.create_layaway("p-1", 4, "sale-1").await.unwrap();
        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 10);
        assert_eq!(product.reserved_stock, 4);
        assert_eq!(product.available_stock(), 6);

        // A sale bigger than the available remainder is refused
        assert!(!ledger.check_available_stock("p-1", 7).await.unwrap());

        // Release the hold: back where we started
        ledger.cancel_layaway("p-1", 4, "sale-1").await.unwrap();
        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 10);
        assert_eq!(product.reserved_stock, 0);
    }

    #[tokio::test]
    async fn test_complete_layaway_writes_two_rows_and_nets_one_decrease() {
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 10).await;

        ledger.create_layaway("p-1", 4, "sale-1").await.unwrap();
        ledger.complete_layaway("p-1", 4, "sale-1").await.unwrap();

        let product = db.products().get_by_id("p-1").await.unwrap().unwrap();
        assert_eq!(product.current_stock, 6);
        assert_eq!(product.reserved_stock, 0);

        // Full audit trail: reserve, release, final sale
        let trail = ledger.movements_for_reference("sale-1").await.unwrap();
        let types: Vec<MovementType> = trail.iter().map(|m| m.movement_type).collect();
        assert_eq!(
            types,
            vec![
                MovementType::ReservaApartado,
                MovementType::CancelarReserva,
                MovementType::VentaApartado,
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let (db, ledger) = test_ledger().await;
        seed_product(&db, "p-1", 5).await;

        let err = ledger
            .record_movement(StockOperation::new(
                "p-1",
                0,
                MovementType::VentaDirecta,
                None,
                "nothing",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_product_not_found() {
        let (_db, ledger) = test_ledger().await;

        let err = ledger.check_available_stock("ghost", 1).await.unwrap_err();
        assert!(matches!(err, EngineError::Db(DbError::NotFound { .. })));
    }
}
