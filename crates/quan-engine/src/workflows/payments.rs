//! # Payment Workflow
//!
//! Cash settlement, provider payment requests and webhook confirmation.
//!
//! ## Payment States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  unpaid ──payment_request(momo|zalopay|vietqr)──► pending               │
//! │    │                                                 │                  │
//! │    │ record_cash_payment                             │ webhook verified │
//! │    ▼                                                 ▼ amount ≥ total   │
//! │  paid ◄──────────────────────────────────────────────┘                  │
//! │    │                                                                    │
//! │    └─ repeat notification → AlreadyPaid (paid_at unchanged)             │
//! │                                                                         │
//! │  Underpaid webhook → error, order stays pending                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use quan_core::payment::{
    parse_momo_ipn, parse_vietqr_webhook, parse_zalopay_callback, PaymentOutcome,
};
use quan_core::vietqr::{build_vietqr_payload, VietQrAccount};
use quan_core::{
    CoreError, Money, Order, OrderStatus, PaymentMethod, ValidationError,
};
use quan_db::{Database, DbError, OrderRepository};

use crate::config::PaymentSettings;
use crate::error::{EngineError, EngineResult};
use crate::hub::{EventPayload, NotificationHub};

/// What the guest needs to pay through a provider.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount: i64,
    /// Code the transfer description must carry.
    pub reference: String,
    /// EMVCo string to render as a QR code (VietQR only).
    pub qr_payload: Option<String>,
    pub account_name: Option<String>,
}

/// How a provider notification was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentResolution {
    Paid,
    /// The order was paid before; nothing changed.
    AlreadyPaid,
    /// The provider reported a failed payment, or the transfer is not ours.
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashReceipt {
    pub order: Order,
    pub tendered: i64,
    pub change: i64,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Database,
    hub: NotificationHub,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(db: Database, hub: NotificationHub, settings: PaymentSettings) -> Self {
        PaymentService { db, hub, settings }
    }

    /// Starts a provider payment: the order goes to `pending` and the
    /// reference (plus a QR payload for VietQR) is returned.
    pub async fn payment_request(
        &self,
        order_id: &str,
        method: PaymentMethod,
    ) -> EngineResult<PaymentRequest> {
        if !method.is_provider_confirmed() {
            return Err(ValidationError::InvalidFormat {
                field: "method".to_string(),
                reason: "cash and card are settled at the counter".to_string(),
            }
            .into());
        }
        if method == PaymentMethod::Vietqr && self.settings.vietqr.bank_bin.is_empty() {
            return Err(EngineError::InvalidConfig(
                "VietQR receiving account is not configured".into(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        ensure_payable(&order)?;
        let total = OrderRepository::recompute_total_in(&mut tx, order_id, now).await?;
        if !total.is_positive() {
            return Err(EngineError::conflict(format!("Order {} has nothing to pay", order_id)));
        }

        let qr_payload = match method {
            PaymentMethod::Vietqr => {
                let account = VietQrAccount {
                    bank_bin: self.settings.vietqr.bank_bin.clone(),
                    account_number: self.settings.vietqr.account_number.clone(),
                };
                Some(build_vietqr_payload(&account, total, &order.payment_reference)?)
            }
            _ => None,
        };

        OrderRepository::mark_payment_pending_in(&mut tx, order_id, method, now).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(order_id, ?method, %total, reference = %order.payment_reference, "Payment requested");

        Ok(PaymentRequest {
            order_id: order_id.to_string(),
            method,
            amount: total.dong(),
            reference: order.payment_reference,
            qr_payload,
            account_name: (method == PaymentMethod::Vietqr)
                .then(|| self.settings.vietqr.account_name.clone())
                .filter(|name| !name.is_empty()),
        })
    }

    /// Applies a verified provider notification.
    pub async fn apply_outcome(&self, outcome: &PaymentOutcome) -> EngineResult<PaymentResolution> {
        if !outcome.success {
            info!(
                provider = ?outcome.provider,
                reference = %outcome.order_reference,
                "Provider reported an unsuccessful payment"
            );
            return Ok(PaymentResolution::Ignored);
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::find_by_reference_in(&mut tx, &outcome.order_reference)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", &outcome.order_reference))?;
        if order.is_paid() {
            info!(order_id = %order.id, "Repeat payment notification");
            return Ok(PaymentResolution::AlreadyPaid);
        }

        let total = OrderRepository::recompute_total_in(&mut tx, &order.id, now).await?;
        if outcome.amount < total.dong() {
            return Err(CoreError::Underpaid {
                paid: outcome.amount,
                total: total.dong(),
            }
            .into());
        }

        if !OrderRepository::mark_paid_in(
            &mut tx,
            &order.id,
            outcome.provider,
            Some(&outcome.provider_transaction_id),
            now,
        )
        .await?
        {
            return Ok(PaymentResolution::AlreadyPaid);
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            order_id = %order.id,
            provider = ?outcome.provider,
            amount = outcome.amount,
            transaction = %outcome.provider_transaction_id,
            "Order paid"
        );
        self.hub.publish(EventPayload::OrderPaid {
            order_id: order.id,
            table_id: order.table_id,
            amount: total.dong(),
            method: outcome.provider,
        });
        Ok(PaymentResolution::Paid)
    }

    /// Settles an order in cash and returns the change.
    pub async fn record_cash_payment(
        &self,
        order_id: &str,
        tendered: i64,
    ) -> EngineResult<CashReceipt> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::require_in(&mut tx, order_id).await?;
        ensure_payable(&order)?;
        let total = OrderRepository::recompute_total_in(&mut tx, order_id, now).await?;
        if !total.is_positive() {
            return Err(EngineError::conflict(format!("Order {} has nothing to pay", order_id)));
        }

        let change = total
            .change_for(Money::from_dong(tendered))
            .ok_or(CoreError::Underpaid {
                paid: tendered,
                total: total.dong(),
            })?;

        if !OrderRepository::mark_paid_in(&mut tx, order_id, PaymentMethod::Cash, None, now).await? {
            return Err(EngineError::conflict(format!("Order {} is already paid", order_id)));
        }
        let paid = OrderRepository::require_in(&mut tx, order_id).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(order_id, %total, %change, "Cash payment recorded");
        self.hub.publish(EventPayload::OrderPaid {
            order_id: paid.id.clone(),
            table_id: paid.table_id.clone(),
            amount: total.dong(),
            method: PaymentMethod::Cash,
        });

        Ok(CashReceipt {
            order: paid,
            tendered,
            change: change.dong(),
        })
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    pub async fn handle_momo(&self, body: &[u8]) -> EngineResult<PaymentResolution> {
        let momo = &self.settings.momo;
        if momo.secret_key.is_empty() {
            return Err(EngineError::InvalidConfig("MoMo keys are not configured".into()));
        }
        let outcome = parse_momo_ipn(body, &momo.access_key, &momo.secret_key)?;
        self.apply_outcome(&outcome).await
    }

    pub async fn handle_zalopay(&self, body: &[u8]) -> EngineResult<PaymentResolution> {
        let key2 = &self.settings.zalopay.key2;
        if key2.is_empty() {
            return Err(EngineError::InvalidConfig("ZaloPay key2 is not configured".into()));
        }
        let outcome = parse_zalopay_callback(body, key2)?;
        self.apply_outcome(&outcome).await
    }

    /// Applies every transfer in a VietQR webhook.
    ///
    /// Transfers for unknown or underpaid orders are logged and reported as
    /// ignored so one bad transfer does not hold up the rest.
    pub async fn handle_vietqr(
        &self,
        body: &[u8],
        signature: &str,
    ) -> EngineResult<Vec<PaymentResolution>> {
        let secret = &self.settings.vietqr.webhook_secret;
        if secret.is_empty() {
            return Err(EngineError::InvalidConfig(
                "VietQR webhook secret is not configured".into(),
            ));
        }

        let outcomes = parse_vietqr_webhook(body, signature, secret)?;
        let mut resolutions = Vec::with_capacity(outcomes.len());
        for outcome in &outcomes {
            match self.apply_outcome(outcome).await {
                Ok(resolution) => resolutions.push(resolution),
                Err(e @ (EngineError::NotFound { .. } | EngineError::Core(CoreError::Underpaid { .. }))) => {
                    warn!(
                        reference = %outcome.order_reference,
                        transaction = %outcome.provider_transaction_id,
                        error = %e,
                        "VietQR transfer not applied"
                    );
                    resolutions.push(PaymentResolution::Ignored);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolutions)
    }
}

fn ensure_payable(order: &Order) -> EngineResult<()> {
    if order.status != OrderStatus::Open {
        return Err(EngineError::conflict(format!("Order {} is closed", order.id)));
    }
    if order.is_paid() {
        return Err(EngineError::conflict(format!("Order {} is already paid", order.id)));
    }
    Ok(())
}
