//! # Sales / Layaway Service
//!
//! Composes the inventory ledger with the sale aggregate.
//!
//! ## Sale + Ledger Atomicity (compensation saga)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       create_direct_sale                                │
//! │                                                                         │
//! │  1. validate request + collect ALL stock errors up front               │
//! │  2. compute totals (total = subtotal + tax - discount)                 │
//! │  3. persist Sale + items + payment details                             │
//! │  4. ledger: one venta_directa per item                                 │
//! │        │                                                                │
//! │        ├── all succeed → done                                          │
//! │        └── item N fails →                                              │
//! │              • devolucion reversal for items 1..N-1                    │
//! │              • Sale → cancelled (reason records the failure)           │
//! │              • original error returned                                 │
//! │                                                                         │
//! │  The Sale row and the ledger never diverge silently: either both      │
//! │  reflect the sale, or the sale is cancelled and the reversals are     │
//! │  on the ledger for audit.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Layaway creation compensates the same way with reservation releases.
//!
//! ## Layaway Completion Gating
//! A layaway completes only at zero balance. `register_layaway_payment`
//! is the path to zero; `complete_layaway_by_ref` rejects while
//! `pending_cents > 0` before touching the ledger.

use chrono::Duration;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::ledger::{InventoryLedger, StockOperation};
use serde::{Deserialize, Serialize};
use vigor_core::validation::{
    validate_amount_cents, validate_deposit_percentage, validate_payment_amount,
    validate_quantity, validate_required,
};
use vigor_core::{
    BusinessCalendar, CoreError, MovementType, PaymentDetail, PaymentStatus, Refund, RefundItem,
    RefundType, Sale, SaleItem, SaleStatus, SaleType, TaxRate, ValidationError,
    DEFAULT_DEPOSIT_PERCENTAGE, LAYAWAY_HOLD_DAYS,
};
use vigor_db::repository::sale::{
    generate_payment_detail_id, generate_refund_id, generate_refund_item_id, generate_sale_id,
    generate_sale_item_id,
};
use vigor_db::{Auditor, Database, DbError};

// =============================================================================
// Request Types
// =============================================================================

/// One line of a sale request. Name/SKU are snapshotted onto the item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItemRequest {
    pub product_id: String,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub discount_cents: i64,
    /// Defaults to the standard IVA rate when absent.
    pub tax_rate_bps: Option<u32>,
}

/// One payment-method entry of a (possibly split) tender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub method: String,
    pub amount_cents: i64,
    pub reference: Option<String>,
}

/// A direct-sale or layaway creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSaleRequest {
    pub customer_id: Option<String>,
    pub items: Vec<SaleItemRequest>,
    #[serde(default)]
    pub payment_details: Vec<PaymentRequest>,
    /// Layaway only; defaults to 50%.
    pub deposit_percentage: Option<u32>,
}

/// One refunded line of a refund request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundItemRequest {
    pub sale_item_id: String,
    pub quantity_refunded: i64,
    pub refund_amount_cents: i64,
}

/// A refund request against a completed sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub sale_id: String,
    pub items: Vec<RefundItemRequest>,
    pub reason: String,
    pub refund_type: RefundType,
}

/// Totals derived from a request's line items.
#[derive(Debug, Clone, Copy)]
struct SaleTotals {
    subtotal_cents: i64,
    tax_cents: i64,
    discount_cents: i64,
    total_cents: i64,
}

// =============================================================================
// Sales Service
// =============================================================================

/// The sales/layaway service.
#[derive(Debug, Clone)]
pub struct SalesService {
    db: Database,
    ledger: InventoryLedger,
    calendar: BusinessCalendar,
    auditor: Auditor,
}

impl SalesService {
    /// Creates a sales service writing as the given auditor.
    pub fn new(
        db: Database,
        ledger: InventoryLedger,
        calendar: BusinessCalendar,
        auditor: Auditor,
    ) -> Self {
        SalesService {
            db,
            ledger,
            calendar,
            auditor,
        }
    }

    // =========================================================================
    // Direct sales
    // =========================================================================

    /// Creates a direct sale: goods leave inventory immediately, payment
    /// in full.
    pub async fn create_direct_sale(&self, request: CreateSaleRequest) -> EngineResult<Sale> {
        self.validate_request(&request, SaleType::Sale)?;
        self.validate_stock_for_items(&request.items).await?;

        let totals = compute_totals(&request.items);
        if !request.payment_details.is_empty() {
            let paid: i64 = request.payment_details.iter().map(|p| p.amount_cents).sum();
            if paid != totals.total_cents {
                return Err(ValidationError::InvalidFormat {
                    field: "payment_details".to_string(),
                    reason: "amounts must sum to the sale total".to_string(),
                }
                .into());
            }
        }

        let sale_number = self.next_sale_number().await?;
        let stamp = self.auditor.stamp();

        let sale = Sale {
            id: generate_sale_id(),
            sale_number: sale_number.clone(),
            customer_id: request.customer_id.clone(),
            sale_type: SaleType::Sale,
            status: SaleStatus::Completed,
            payment_status: PaymentStatus::Paid,
            subtotal_cents: totals.subtotal_cents,
            tax_cents: totals.tax_cents,
            discount_cents: totals.discount_cents,
            total_cents: totals.total_cents,
            required_deposit_cents: 0,
            deposit_percentage: 0,
            paid_cents: totals.total_cents,
            pending_cents: 0,
            refunded_cents: 0,
            requires_stock_reservation: false,
            stock_reserved_at: None,
            stock_released_at: None,
            layaway_expires_at: None,
            cancellation_reason: None,
            completed_at: Some(stamp.at),
            created_at: stamp.at,
            created_by: stamp.by.clone(),
            updated_at: stamp.at,
            updated_by: stamp.by.clone(),
            row_version: 0,
        };

        self.persist_sale(&sale, &request).await?;

        // Ledger effects, with reversal compensation on failure
        let mut processed: Vec<(String, i64)> = Vec::new();
        for item in &request.items {
            match self
                .ledger
                .process_sale(&item.product_id, item.quantity, &sale.id)
                .await
            {
                Ok(_) => processed.push((item.product_id.clone(), item.quantity)),
                Err(err) => {
                    self.compensate_sale(&sale, &processed, MovementType::Devolucion, &err)
                        .await;
                    return Err(err);
                }
            }
        }

        info!(
            sale_id = %sale.id,
            sale_number = %sale_number,
            total_cents = totals.total_cents,
            items = request.items.len(),
            "Direct sale created"
        );

        self.reload_sale(&sale.id).await
    }

    // =========================================================================
    // Layaways
    // =========================================================================

    /// Creates a layaway: goods reserved, deposit collected, balance
    /// pending.
    pub async fn create_layaway_sale(&self, request: CreateSaleRequest) -> EngineResult<Sale> {
        self.validate_request(&request, SaleType::Layaway)?;
        self.validate_stock_for_items(&request.items).await?;

        let deposit_percentage = request
            .deposit_percentage
            .unwrap_or(DEFAULT_DEPOSIT_PERCENTAGE);

        let totals = compute_totals(&request.items);
        let total = vigor_core::Money::from_cents(totals.total_cents);
        let required_deposit = total.percentage_of(deposit_percentage);
        let paid_cents: i64 = request.payment_details.iter().map(|p| p.amount_cents).sum();
        let pending_cents = (totals.total_cents - paid_cents).max(0);

        let sale_number = self.next_sale_number().await?;
        let stamp = self.auditor.stamp();

        let sale = Sale {
            id: generate_sale_id(),
            sale_number: sale_number.clone(),
            customer_id: request.customer_id.clone(),
            sale_type: SaleType::Layaway,
            status: SaleStatus::Pending,
            payment_status: Sale::derive_payment_status(totals.total_cents, paid_cents),
            subtotal_cents: totals.subtotal_cents,
            tax_cents: totals.tax_cents,
            discount_cents: totals.discount_cents,
            total_cents: totals.total_cents,
            required_deposit_cents: required_deposit.cents(),
            deposit_percentage: deposit_percentage as i64,
            paid_cents,
            pending_cents,
            refunded_cents: 0,
            requires_stock_reservation: false,
            stock_reserved_at: None,
            stock_released_at: None,
            layaway_expires_at: Some(stamp.at + Duration::days(LAYAWAY_HOLD_DAYS)),
            cancellation_reason: None,
            completed_at: None,
            created_at: stamp.at,
            created_by: stamp.by.clone(),
            updated_at: stamp.at,
            updated_by: stamp.by.clone(),
            row_version: 0,
        };

        self.persist_sale(&sale, &request).await?;

        // Reserve stock per item, releasing on mid-loop failure
        let mut processed: Vec<(String, i64)> = Vec::new();
        for item in &request.items {
            match self
                .ledger
                .create_layaway(&item.product_id, item.quantity, &sale.id)
                .await
            {
                Ok(_) => processed.push((item.product_id.clone(), item.quantity)),
                Err(err) => {
                    self.compensate_sale(&sale, &processed, MovementType::CancelarReserva, &err)
                        .await;
                    return Err(err);
                }
            }
        }

        // All reservations hold: mark the sale as carrying them
        self.db
            .sales()
            .mark_stock_reserved(&sale.id, sale.row_version, &self.auditor.stamp())
            .await?;

        info!(
            sale_id = %sale.id,
            sale_number = %sale_number,
            total_cents = totals.total_cents,
            required_deposit_cents = required_deposit.cents(),
            "Layaway created"
        );

        self.reload_sale(&sale.id).await
    }

    /// Records one further payment toward a pending layaway.
    ///
    /// Appends a payment-detail row, recomputes the balance, and derives
    /// the payment status. The sale stays `pending` until completion.
    pub async fn register_layaway_payment(
        &self,
        sale_id: &str,
        payment: PaymentRequest,
    ) -> EngineResult<Sale> {
        validate_payment_amount(payment.amount_cents).map_err(CoreError::from)?;

        let sale = self.fetch_layaway(sale_id).await?;
        if sale.status != SaleStatus::Pending {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                status: sale.status,
            }
            .into());
        }

        let repo = self.db.sales();
        let existing = repo.get_payment_details(sale_id).await?;
        let stamp = self.auditor.stamp();

        repo.insert_payment_detail(&PaymentDetail {
            id: generate_payment_detail_id(),
            sale_id: sale_id.to_string(),
            payment_method: payment.method,
            amount_cents: payment.amount_cents,
            payment_reference: payment.reference,
            sequence_order: existing.len() as i64 + 1,
            created_at: stamp.at,
        })
        .await?;

        let paid_cents = sale.paid_cents + payment.amount_cents;
        let pending_cents = (sale.total_cents - paid_cents).max(0);
        let payment_status = Sale::derive_payment_status(sale.total_cents, paid_cents);

        repo.update_payment_progress(
            sale_id,
            sale.row_version,
            paid_cents,
            pending_cents,
            payment_status,
            &stamp,
        )
        .await?;

        info!(
            sale_id = %sale_id,
            paid_cents,
            pending_cents,
            "Layaway payment registered"
        );

        self.reload_sale(sale_id).await
    }

    /// Completes a pending layaway whose balance is fully paid.
    ///
    /// Rejects, touching nothing, while `pending_cents > 0`. Per item,
    /// releases the reservation and records the final sale (two ledger
    /// rows), then marks the sale completed.
    pub async fn complete_layaway_by_ref(&self, sale_id: &str) -> EngineResult<Sale> {
        let sale = self.fetch_layaway(sale_id).await?;
        if sale.status != SaleStatus::Pending {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                status: sale.status,
            }
            .into());
        }
        if sale.pending_cents > 0 {
            return Err(CoreError::LayawayBalanceOutstanding {
                sale_id: sale_id.to_string(),
                pending_cents: sale.pending_cents,
            }
            .into());
        }

        let items = self.db.sales().get_items(sale_id).await?;
        for item in &items {
            self.ledger
                .complete_layaway(&item.product_id, item.quantity, sale_id)
                .await?;
        }

        self.db
            .sales()
            .complete_layaway(sale_id, sale.row_version, &self.auditor.stamp())
            .await?;

        info!(sale_id = %sale_id, items = items.len(), "Layaway completed");

        self.reload_sale(sale_id).await
    }

    /// Cancels a pending layaway, releasing every reservation.
    pub async fn cancel_layaway_by_ref(&self, sale_id: &str, reason: &str) -> EngineResult<Sale> {
        validate_required("reason", reason).map_err(CoreError::from)?;

        let sale = self.fetch_layaway(sale_id).await?;
        if sale.status != SaleStatus::Pending {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                status: sale.status,
            }
            .into());
        }

        let items = self.db.sales().get_items(sale_id).await?;
        for item in &items {
            self.ledger
                .cancel_layaway(&item.product_id, item.quantity, sale_id)
                .await?;
        }

        self.db
            .sales()
            .cancel(sale_id, sale.row_version, reason, &self.auditor.stamp())
            .await?;

        info!(sale_id = %sale_id, reason = %reason, "Layaway cancelled");

        self.reload_sale(sale_id).await
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Processes a refund against a completed sale: refund aggregate,
    /// per-line refund items, `devolucion` ledger entries, and the
    /// original sale's status/amount updated.
    pub async fn process_refund_request(&self, request: RefundRequest) -> EngineResult<Refund> {
        validate_required("reason", &request.reason).map_err(CoreError::from)?;
        if request.items.is_empty() {
            return Err(ValidationError::Empty {
                field: "items".to_string(),
            }
            .into());
        }
        for item in &request.items {
            validate_quantity(item.quantity_refunded).map_err(CoreError::from)?;
            validate_amount_cents(item.refund_amount_cents).map_err(CoreError::from)?;
        }

        let repo = self.db.sales();
        let sale = repo
            .get_by_id(&request.sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", &request.sale_id))?;

        if sale.status != SaleStatus::Completed {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id.clone(),
                status: sale.status,
            }
            .into());
        }

        let refund_number = self
            .db
            .sales()
            .next_refund_number(&self.date_prefix())
            .await?;
        let total_refunded_cents: i64 =
            request.items.iter().map(|i| i.refund_amount_cents).sum();
        let stamp = self.auditor.stamp();

        let refund = Refund {
            id: generate_refund_id(),
            sale_id: sale.id.clone(),
            refund_number: refund_number.clone(),
            refund_type: request.refund_type,
            total_refunded_cents,
            reason: request.reason.clone(),
            created_at: stamp.at,
            created_by: stamp.by.clone(),
        };
        repo.insert_refund(&refund).await?;

        for item in &request.items {
            let sale_item = repo
                .get_item(&item.sale_item_id)
                .await?
                .ok_or_else(|| DbError::not_found("Sale item", &item.sale_item_id))?;

            repo.insert_refund_item(&RefundItem {
                id: generate_refund_item_id(),
                refund_id: refund.id.clone(),
                sale_item_id: item.sale_item_id.clone(),
                quantity_refunded: item.quantity_refunded,
                refund_amount_cents: item.refund_amount_cents,
                created_at: stamp.at,
            })
            .await?;

            self.ledger
                .process_refund(&sale_item.product_id, item.quantity_refunded, &refund.id)
                .await?;
        }

        // Full refunds close the sale; partial ones leave it completed
        let new_status = match request.refund_type {
            RefundType::Full => SaleStatus::Refunded,
            RefundType::Partial => SaleStatus::Completed,
        };
        repo.apply_refund(
            &sale.id,
            sale.row_version,
            new_status,
            sale.refunded_cents + total_refunded_cents,
            &self.auditor.stamp(),
        )
        .await?;

        info!(
            sale_id = %sale.id,
            refund_number = %refund_number,
            total_refunded_cents,
            refund_type = ?request.refund_type,
            "Refund processed"
        );

        Ok(refund)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks stock for every item, collecting ALL insufficiencies before
    /// failing so the caller sees everything wrong in one pass.
    pub async fn validate_stock_for_items(
        &self,
        items: &[SaleItemRequest],
    ) -> EngineResult<()> {
        let mut errors: Vec<String> = Vec::new();

        for item in items {
            match self.db.products().get_by_id(&item.product_id).await? {
                None => errors.push(format!("Product {} not found", item.product_name)),
                Some(product) if !product.can_fulfill(item.quantity) => {
                    errors.push(format!(
                        "Insufficient stock for {}: available {}, requested {}",
                        item.product_name,
                        product.available_stock(),
                        item.quantity
                    ));
                }
                Some(_) => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::StockValidation { errors })
        }
    }

    fn validate_request(
        &self,
        request: &CreateSaleRequest,
        sale_type: SaleType,
    ) -> EngineResult<()> {
        if request.items.is_empty() {
            return Err(ValidationError::Empty {
                field: "items".to_string(),
            }
            .into());
        }

        for item in &request.items {
            validate_quantity(item.quantity).map_err(CoreError::from)?;
            validate_amount_cents(item.unit_price_cents).map_err(CoreError::from)?;
            validate_amount_cents(item.discount_cents).map_err(CoreError::from)?;
        }
        for payment in &request.payment_details {
            validate_payment_amount(payment.amount_cents).map_err(CoreError::from)?;
        }

        if sale_type == SaleType::Layaway {
            if request.customer_id.is_none() {
                return Err(ValidationError::Required {
                    field: "customer_id".to_string(),
                }
                .into());
            }
            if let Some(pct) = request.deposit_percentage {
                validate_deposit_percentage(pct).map_err(CoreError::from)?;
            }
        }

        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn date_prefix(&self) -> String {
        self.calendar.today().format("%Y%m%d").to_string()
    }

    async fn next_sale_number(&self) -> EngineResult<String> {
        Ok(self.db.sales().next_sale_number(&self.date_prefix()).await?)
    }

    /// Persists the sale row, its line items, and any payment details.
    async fn persist_sale(&self, sale: &Sale, request: &CreateSaleRequest) -> EngineResult<()> {
        let repo = self.db.sales();
        repo.insert_sale(sale).await?;

        for item in &request.items {
            let rate = TaxRate::from_bps(item.tax_rate_bps.unwrap_or(vigor_core::DEFAULT_TAX_RATE_BPS));
            let line_total = vigor_core::Money::from_cents(item.unit_price_cents * item.quantity);

            repo.insert_item(&SaleItem {
                id: generate_sale_item_id(),
                sale_id: sale.id.clone(),
                product_id: item.product_id.clone(),
                sku_snapshot: item.product_sku.clone(),
                name_snapshot: item.product_name.clone(),
                unit_price_cents: item.unit_price_cents,
                quantity: item.quantity,
                line_total_cents: line_total.cents(),
                tax_rate_bps: rate.bps() as i64,
                tax_cents: line_total.calculate_tax(rate).cents(),
                discount_cents: item.discount_cents,
                created_at: sale.created_at,
            })
            .await?;
        }

        for (index, payment) in request.payment_details.iter().enumerate() {
            repo.insert_payment_detail(&PaymentDetail {
                id: generate_payment_detail_id(),
                sale_id: sale.id.clone(),
                payment_method: payment.method.clone(),
                amount_cents: payment.amount_cents,
                payment_reference: payment.reference.clone(),
                sequence_order: index as i64 + 1,
                created_at: sale.created_at,
            })
            .await?;
        }

        Ok(())
    }

    /// Reverses already-applied ledger effects and cancels the sale.
    ///
    /// Best-effort: a failure here is logged and swallowed so the
    /// original error reaches the caller; the reversal rows that did land
    /// keep the ledger auditable either way.
    async fn compensate_sale(
        &self,
        sale: &Sale,
        processed: &[(String, i64)],
        reversal_type: MovementType,
        cause: &EngineError,
    ) {
        warn!(
            sale_id = %sale.id,
            processed = processed.len(),
            error = %cause,
            "Ledger recording failed mid-sale, compensating"
        );

        for (product_id, quantity) in processed {
            let result = self
                .ledger
                .record_movement(StockOperation::new(
                    product_id.clone(),
                    *quantity,
                    reversal_type,
                    Some(sale.id.clone()),
                    format!("Reversal of sale {} after ledger failure", sale.sale_number),
                ))
                .await;
            if let Err(err) = result {
                warn!(
                    sale_id = %sale.id,
                    product_id = %product_id,
                    error = %err,
                    "Compensation movement failed"
                );
            }
        }

        let reason = format!("Ledger recording failed: {}", cause);
        if let Err(err) = self
            .db
            .sales()
            .cancel(&sale.id, sale.row_version, &reason, &self.auditor.stamp())
            .await
        {
            warn!(sale_id = %sale.id, error = %err, "Failed to cancel sale during compensation");
        }
    }

    async fn fetch_layaway(&self, sale_id: &str) -> EngineResult<Sale> {
        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;

        if sale.sale_type != SaleType::Layaway {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                status: sale.status,
            }
            .into());
        }

        Ok(sale)
    }

    async fn reload_sale(&self, sale_id: &str) -> EngineResult<Sale> {
        self.db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id).into())
    }
}

/// Sums line totals, taxes and discounts into sale totals.
fn compute_totals(items: &[SaleItemRequest]) -> SaleTotals {
    let mut subtotal_cents = 0i64;
    let mut tax_cents = 0i64;
    let mut discount_cents = 0i64;

    for item in items {
        let rate = TaxRate::from_bps(item.tax_rate_bps.unwrap_or(vigor_core::DEFAULT_TAX_RATE_BPS));
        let line_total = vigor_core::Money::from_cents(item.unit_price_cents * item.quantity);
        subtotal_cents += line_total.cents();
        tax_cents += line_total.calculate_tax(rate).cents();
        discount_cents += item.discount_cents;
    }

    SaleTotals {
        subtotal_cents,
        tax_cents,
        discount_cents,
        total_cents: subtotal_cents + tax_cents - discount_cents,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
