//! # VietQR Payload
//!
//! Builds the EMVCo merchant-presented QR string that Vietnamese banking
//! apps scan to pre-fill a NAPAS 247 transfer.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  00 Payload format      "01"                                           │
//! │  01 Initiation method   "12" (dynamic, one amount per order)           │
//! │  38 Merchant account                                                    │
//! │     ├── 00 GUID          "A000000727" (NAPAS)                           │
//! │     ├── 01 Beneficiary                                                  │
//! │     │   ├── 00 Bank BIN  e.g. "970436"                                  │
//! │     │   └── 01 Account   e.g. "0011001932418"                           │
//! │     └── 02 Service       "QRIBFTTA" (transfer to account)               │
//! │  53 Currency            "704" (VND)                                     │
//! │  54 Amount              "145000"                                        │
//! │  58 Country             "VN"                                            │
//! │  62 Additional data                                                     │
//! │     └── 08 Purpose       payment reference + table                      │
//! │  63 CRC                 CRC16-CCITT-FALSE over everything before it    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every field is `ID (2 digits) + LEN (2 digits) + VALUE`.

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;

const NAPAS_GUID: &str = "A000000727";
const SERVICE_TRANSFER_TO_ACCOUNT: &str = "QRIBFTTA";
const CURRENCY_VND: &str = "704";
const COUNTRY_VN: &str = "VN";

/// Longest purpose text banks reliably carry through to the statement.
pub const MAX_DESCRIPTION_CHARS: usize = 50;

/// Receiving account printed on the QR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VietQrAccount {
    pub bank_bin: String,
    pub account_number: String,
}

fn field(id: &str, value: &str) -> CoreResult<String> {
    if value.len() > 99 {
        return Err(ValidationError::TooLong {
            field: format!("vietqr field {}", id),
            max: 99,
        }
        .into());
    }
    Ok(format!("{}{:02}{}", id, value.len(), value))
}

/// Strips what banking apps reject in the purpose field. Accented letters
/// are dropped, punctuation becomes a space, whitespace runs collapse.
fn sanitize_description(description: &str) -> String {
    let cleaned: String = description
        .chars()
        .filter(|c| c.is_ascii() || !c.is_alphabetic())
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_DESCRIPTION_CHARS)
        .collect()
}

/// Builds the QR payload for a transfer of `amount` to `account`.
///
/// ```rust
/// use quan_core::money::Money;
/// use quan_core::vietqr::{build_vietqr_payload, VietQrAccount};
///
/// let account = VietQrAccount {
///     bank_bin: "970436".into(),
///     account_number: "0011001932418".into(),
/// };
/// let payload = build_vietqr_payload(&account, Money::from_dong(145_000), "QP9F1C2B3A4D").unwrap();
/// assert!(payload.starts_with("000201010212"));
/// assert!(payload.contains("5406145000"));
/// ```
pub fn build_vietqr_payload(
    account: &VietQrAccount,
    amount: Money,
    description: &str,
) -> CoreResult<String> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        }
        .into());
    }
    if account.bank_bin.len() != 6 || !account.bank_bin.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "bank_bin".to_string(),
            reason: "must be 6 digits".to_string(),
        }
        .into());
    }
    if account.account_number.is_empty() {
        return Err(ValidationError::Required {
            field: "account_number".to_string(),
        }
        .into());
    }

    let beneficiary = field("00", &account.bank_bin)? + &field("01", &account.account_number)?;
    let merchant = field("00", NAPAS_GUID)?
        + &field("01", &beneficiary)?
        + &field("02", SERVICE_TRANSFER_TO_ACCOUNT)?;
    let additional = field("08", &sanitize_description(description))?;

    let mut payload = String::with_capacity(160);
    payload.push_str(&field("00", "01")?);
    payload.push_str(&field("01", "12")?);
    payload.push_str(&field("38", &merchant)?);
    payload.push_str(&field("53", CURRENCY_VND)?);
    payload.push_str(&field("54", &amount.dong().to_string())?);
    payload.push_str(&field("58", COUNTRY_VN)?);
    payload.push_str(&field("62", &additional)?);
    payload.push_str("6304");

    let crc = crc16_ccitt_false(payload.as_bytes());
    payload.push_str(&format!("{:04X}", crc));
    Ok(payload)
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no xor-out.
pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
