//! # Money Module
//!
//! Integer amounts in Vietnamese đồng.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  VND has no minor unit in circulation. Every price, total and payment  │
//! │  amount the providers send (MoMo, ZaloPay, VietQR) is a whole number   │
//! │  of đồng, so the natural representation is a plain i64.                │
//! │                                                                         │
//! │  Floats never enter the system: 0.1 + 0.2 style drift would make a     │
//! │  webhook amount fail to match the order total it pays for.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use quan_core::money::Money;
//!
//! let pho = Money::from_dong(65_000);
//! let total = pho.multiply_quantity(2) + Money::from_dong(15_000);
//! assert_eq!(total.dong(), 145_000);
//! assert_eq!(total.to_string(), "145.000 ₫");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in đồng.
///
/// ## Design Decisions
/// - **i64 (signed)**: negative values represent refunds and change owed
/// - **Tuple struct**: zero-cost wrapper, serialises as a bare number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from đồng.
    #[inline]
    pub const fn from_dong(dong: i64) -> Self {
        Money(dong)
    }

    /// Returns the value in đồng.
    #[inline]
    pub const fn dong(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ```rust
    /// use quan_core::money::Money;
    ///
    /// let line = Money::from_dong(35_000).multiply_quantity(3);
    /// assert_eq!(line.dong(), 105_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Checked addition, `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Change to hand back when `tendered` is paid against `self`.
    ///
    /// Returns `None` if the tendered amount does not cover the total.
    ///
    /// ```rust
    /// use quan_core::money::Money;
    ///
    /// let total = Money::from_dong(145_000);
    /// assert_eq!(total.change_for(Money::from_dong(200_000)), Some(Money::from_dong(55_000)));
    /// assert_eq!(total.change_for(Money::from_dong(100_000)), None);
    /// ```
    pub fn change_for(&self, tendered: Money) -> Option<Money> {
        if tendered < *self {
            None
        } else {
            Some(tendered - *self)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Vietnamese formatting: dot as thousands separator, ₫ suffix.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{} ₫", sign, grouped)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
