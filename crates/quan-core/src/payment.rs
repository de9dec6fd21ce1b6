//! # Payment Notifications
//!
//! Parsing and signature verification for the three wallet / bank providers.
//!
//! ## Verification Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  MoMo IPN (JSON)        ZaloPay callback        VietQR webhook          │
//! │  signature field        { data, mac, type }     X-VietQR-Signature      │
//! │       │                        │                       │                │
//! │       ▼                        ▼                       ▼                │
//! │  HMAC-SHA256(secret,    HMAC-SHA256(key2,       HMAC-SHA256(secret,    │
//! │    raw k=v string)        data)                   raw body)            │
//! │       │                        │                       │                │
//! │       └────────────────────────┼───────────────────────┘                │
//! │                                ▼                                        │
//! │              Mac::verify_slice (constant time)                          │
//! │                                │                                        │
//! │                                ▼                                        │
//! │              PaymentOutcome { order_reference, amount, ... }            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Orders are matched by their payment reference (see [`payment_reference`]),
//! never by the raw order id, because bank transfer descriptions only carry a
//! short free-text field.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::PaymentMethod;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every payment reference code.
pub const REFERENCE_PREFIX: &str = "QP";
const REFERENCE_HEX_LEN: usize = 10;

/// Header VietQR puts the body signature in.
pub const VIETQR_SIGNATURE_HEADER: &str = "x-vietqr-signature";

// =============================================================================
// Outcome
// =============================================================================

/// A verified provider notification, reduced to what the order cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentOutcome {
    pub provider: PaymentMethod,
    pub order_reference: String,
    pub amount: i64,
    pub provider_transaction_id: String,
    pub success: bool,
}

// =============================================================================
// Signatures
// =============================================================================

/// Lowercase hex HMAC-SHA256 of `message`.
pub fn sign_hex(secret: &str, message: &[u8]) -> CoreResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| CoreError::malformed("hmac", "invalid key length"))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a hex HMAC-SHA256 signature in constant time.
pub fn verify_hex(provider: &str, secret: &str, message: &[u8], signature: &str) -> CoreResult<()> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| CoreError::invalid_signature(provider))?;
    mac.update(message);

    let sig_bytes =
        hex::decode(signature.trim()).map_err(|_| CoreError::invalid_signature(provider))?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| CoreError::invalid_signature(provider))
}

// =============================================================================
// Payment Reference
// =============================================================================

/// Short code placed in transfer descriptions: `QP` + the first ten hex
/// digits of the order id, uppercase.
///
/// ```rust
/// use quan_core::payment::payment_reference;
///
/// assert_eq!(
///     payment_reference("9f1c2b3a-4d5e-4f60-8a7b-1c2d3e4f5a6b"),
///     "QP9F1C2B3A4D"
/// );
/// ```
pub fn payment_reference(order_id: &str) -> String {
    let hex: String = order_id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(REFERENCE_HEX_LEN)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("{}{}", REFERENCE_PREFIX, hex)
}

/// Finds a payment reference inside a free-text transfer description.
///
/// Banks upper-case, truncate and pad descriptions, so the search is
/// case-insensitive and ignores anything around the code.
pub fn extract_reference(description: &str) -> Option<String> {
    let upper = description.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let code_len = REFERENCE_PREFIX.len() + REFERENCE_HEX_LEN;

    upper.match_indices(REFERENCE_PREFIX).find_map(|(start, _)| {
        let end = start + code_len;
        let hex = bytes.get(start + REFERENCE_PREFIX.len()..end)?;
        if hex.iter().all(u8::is_ascii_hexdigit) {
            upper.get(start..end).map(str::to_string)
        } else {
            None
        }
    })
}

// =============================================================================
// MoMo IPN
// =============================================================================

/// Instant payment notification body posted by MoMo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomoIpn {
    pub partner_code: String,
    /// Our order reference, as sent in the payment request.
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    pub order_info: String,
    pub order_type: String,
    pub trans_id: i64,
    pub result_code: i64,
    pub message: String,
    pub pay_type: String,
    pub response_time: i64,
    #[serde(default)]
    pub extra_data: String,
    pub signature: String,
}

impl MomoIpn {
    /// The `key=value&...` string MoMo signs, keys in alphabetical order.
    pub fn raw_signature(&self, access_key: &str) -> String {
        format!(
            "accessKey={}&amount={}&extraData={}&message={}&orderId={}&orderInfo={}\
             &orderType={}&partnerCode={}&payType={}&requestId={}&responseTime={}\
             &resultCode={}&transId={}",
            access_key,
            self.amount,
            self.extra_data,
            self.message,
            self.order_id,
            self.order_info,
            self.order_type,
            self.partner_code,
            self.pay_type,
            self.request_id,
            self.response_time,
            self.result_code,
            self.trans_id,
        )
    }

    /// Checks the signature and reduces the notification to an outcome.
    pub fn verify(&self, access_key: &str, secret_key: &str) -> CoreResult<PaymentOutcome> {
        let raw = self.raw_signature(access_key);
        verify_hex("momo", secret_key, raw.as_bytes(), &self.signature)?;

        Ok(PaymentOutcome {
            provider: PaymentMethod::Momo,
            order_reference: self.order_id.clone(),
            amount: self.amount,
            provider_transaction_id: self.trans_id.to_string(),
            success: self.result_code == 0,
        })
    }
}

/// Parses and verifies a MoMo IPN body.
pub fn parse_momo_ipn(body: &[u8], access_key: &str, secret_key: &str) -> CoreResult<PaymentOutcome> {
    let ipn: MomoIpn =
        serde_json::from_slice(body).map_err(|e| CoreError::malformed("momo", e.to_string()))?;
    ipn.verify(access_key, secret_key)
}

// =============================================================================
// ZaloPay Callback
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZaloPayCallback {
    /// JSON-encoded [`ZaloPayData`], signed as-is.
    pub data: String,
    pub mac: String,
    #[serde(rename = "type")]
    pub kind: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZaloPayData {
    pub app_trans_id: String,
    pub amount: i64,
    pub zp_trans_id: i64,
    /// JSON object; `reference` carries our payment reference.
    #[serde(default)]
    pub embed_data: String,
}

#[derive(Debug, Deserialize)]
struct ZaloPayEmbed {
    reference: Option<String>,
}

impl ZaloPayData {
    /// Payment reference from `embed_data`, falling back to the part of
    /// `app_trans_id` after the `yymmdd_` date prefix.
    pub fn order_reference(&self) -> Option<String> {
        serde_json::from_str::<ZaloPayEmbed>(&self.embed_data)
            .ok()
            .and_then(|embed| embed.reference)
            .or_else(|| {
                self.app_trans_id
                    .split_once('_')
                    .map(|(_, reference)| reference.to_string())
            })
            .filter(|reference| !reference.is_empty())
    }
}

/// Parses and verifies a ZaloPay callback body with `key2`.
///
/// ZaloPay only calls back for successful payments.
pub fn parse_zalopay_callback(body: &[u8], key2: &str) -> CoreResult<PaymentOutcome> {
    let callback: ZaloPayCallback =
        serde_json::from_slice(body).map_err(|e| CoreError::malformed("zalopay", e.to_string()))?;

    verify_hex("zalopay", key2, callback.data.as_bytes(), &callback.mac)?;

    let data: ZaloPayData = serde_json::from_str(&callback.data)
        .map_err(|e| CoreError::malformed("zalopay", e.to_string()))?;
    let order_reference = data
        .order_reference()
        .ok_or_else(|| CoreError::malformed("zalopay", "missing order reference"))?;

    Ok(PaymentOutcome {
        provider: PaymentMethod::Zalopay,
        order_reference,
        amount: data.amount,
        provider_transaction_id: data.zp_trans_id.to_string(),
        success: true,
    })
}

// =============================================================================
// VietQR Webhook
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VietQrWebhook {
    pub transactions: Vec<VietQrTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VietQrTransaction {
    pub id: String,
    pub amount: i64,
    pub description: String,
    pub when: String,
}

/// Verifies the raw body against the `X-VietQR-Signature` header and
/// returns one outcome per incoming transfer that names an order.
///
/// Transfers whose description has no payment reference are not ours and
/// are dropped.
pub fn parse_vietqr_webhook(
    body: &[u8],
    signature: &str,
    secret: &str,
) -> CoreResult<Vec<PaymentOutcome>> {
    verify_hex("vietqr", secret, body, signature)?;

    let webhook: VietQrWebhook =
        serde_json::from_slice(body).map_err(|e| CoreError::malformed("vietqr", e.to_string()))?;

    Ok(webhook
        .transactions
        .into_iter()
        .filter(|tx| tx.amount > 0)
        .filter_map(|tx| {
            extract_reference(&tx.description).map(|order_reference| PaymentOutcome {
                provider: PaymentMethod::Vietqr,
                order_reference,
                amount: tx.amount,
                provider_transaction_id: tx.id,
                success: true,
            })
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
