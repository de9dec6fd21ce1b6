//! # Validation Module
//!
//! Input validation for Quan POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Mobile client                                                │
//! │  └── Form checks, immediate feedback                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine workflows (Rust)                                      │
//! │  └── THIS MODULE: business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on status columns                               │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lengths are counted in characters, not bytes: most names are Vietnamese
//! and carry multi-byte diacritics.
//!
//! ## Usage
//! ```rust
//! use quan_core::validation::{validate_quantity, validate_reason};
//!
//! validate_quantity(2).unwrap();
//! validate_reason("Khách đổi ý").unwrap();
//! ```

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

pub const MAX_NAME_CHARS: usize = 120;
pub const MAX_NOTE_CHARS: usize = 500;
pub const MAX_REASON_CHARS: usize = 300;
pub const MIN_PASSWORD_CHARS: usize = 6;

// =============================================================================
// String Validators
// =============================================================================

fn required_within(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a display name (menu item, table, ingredient, staff).
///
/// ## Example
/// ```rust
/// use quan_core::validation::validate_name;
///
/// assert!(validate_name("Bún chả Hà Nội").is_ok());
/// assert!(validate_name("  ").is_err());
/// ```
pub fn validate_name(name: &str) -> ValidationResult<()> {
    required_within("name", name, MAX_NAME_CHARS)
}

/// Validates an optional free-text note on an order or order line.
///
/// Returns the trimmed note, `None` for blank input.
pub fn validate_note(note: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if note.chars().count() > MAX_NOTE_CHARS {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_CHARS,
        });
    }

    Ok(Some(note.to_string()))
}

/// Validates a cancellation / return reason. A reason is always required.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    required_within("reason", reason, MAX_REASON_CHARS)
}

/// Validates a login name.
///
/// ## Rules
/// - 3 to 32 characters
/// - lowercase ASCII letters, digits, `_` and `.`
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }
    if username.len() < 3 {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: 3,
        });
    }
    if username.len() > 32 {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: 32,
        });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only lowercase letters, digits, '_' and '.'".to_string(),
        });
    }

    Ok(())
}

pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: MIN_PASSWORD_CHARS,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the quantity of an order line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (99)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a menu price in đồng. Free items are not sold.
pub fn validate_price(dong: i64) -> ValidationResult<()> {
    if dong <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }
    Ok(())
}

/// Validates a purchase-order quantity or a stock adjustment amount.
pub fn validate_stock_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a table's seat count.
pub fn validate_capacity(seats: i64) -> ValidationResult<()> {
    if !(1..=50).contains(&seats) {
        return Err(ValidationError::OutOfRange {
            field: "capacity".to_string(),
            min: 1,
            max: 50,
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ```rust
/// use quan_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_counts_characters() {
        assert!(validate_name("Cà phê sữa đá").is_ok());
        assert!(validate_name("").is_err());
        // 120 two-byte characters fit even though they are 240 bytes
        assert!(validate_name(&"đ".repeat(120)).is_ok());
        assert!(validate_name(&"đ".repeat(121)).is_err());
    }

    #[test]
    fn test_validate_note() {
        assert_eq!(validate_note(None).unwrap(), None);
        assert_eq!(validate_note(Some("   ")).unwrap(), None);
        assert_eq!(
            validate_note(Some(" ít cay ")).unwrap(),
            Some("ít cay".to_string())
        );
        assert!(validate_note(Some(&"a".repeat(501))).is_err());
    }

    #[test]
    fn test_validate_reason_required() {
        assert!(validate_reason("Món ra quá lâu").is_ok());
        assert!(matches!(
            validate_reason(" "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_reason(&"x".repeat(301)).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("thu.ngan_01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Admin").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("123456").is_ok());
        assert!(validate_password("12345").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(99).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(100).is_err());
    }

    #[test]
    fn test_validate_price_and_stock() {
        assert!(validate_price(35_000).is_ok());
        assert!(validate_price(0).is_err());
        assert!(validate_stock_quantity(500).is_ok());
        assert!(validate_stock_quantity(-5).is_err());
        assert!(validate_capacity(4).is_ok());
        assert!(validate_capacity(0).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
