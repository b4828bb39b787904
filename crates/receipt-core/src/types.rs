//! Receipt value objects shared across the workspace.
//!
//! `ReceiptParams` is what a lookup is keyed by; `ParsedReceipt` is what every
//! source produces once a receipt has been found and normalized.

use crate::error::{CoreError, Result};
use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fractional digits kept for prices and totals.
pub const MONEY_SCALE: u32 = 2;

/// Fractional digits kept for quantities.
pub const QUANTITY_SCALE: u32 = 3;

/// Identifier fields used by every receipt source.
///
/// Built once per lookup attempt, either by [`crate::qr::decode`] or from
/// manual entry through [`ReceiptParams::new`]. The numeric identifiers are
/// kept as digit strings so leading zeros and 16-digit drive numbers survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawReceiptParams")]
pub struct ReceiptParams {
    fiscal_drive_number: String,
    fiscal_document_number: String,
    fiscal_sign: String,
    created: NaiveDateTime,
    amount: Decimal,
}

impl ReceiptParams {
    /// Create receipt parameters from manually entered values.
    ///
    /// # Errors
    /// Returns error if any identifier is empty or contains non-digit characters.
    pub fn new(
        fiscal_drive_number: impl Into<String>,
        fiscal_document_number: impl Into<String>,
        fiscal_sign: impl Into<String>,
        created: NaiveDateTime,
        amount: Decimal,
    ) -> Result<Self> {
        let fiscal_drive_number = fiscal_drive_number.into();
        let fiscal_document_number = fiscal_document_number.into();
        let fiscal_sign = fiscal_sign.into();

        for (field, value) in [
            ("fiscal_drive_number", &fiscal_drive_number),
            ("fiscal_document_number", &fiscal_document_number),
            ("fiscal_sign", &fiscal_sign),
        ] {
            if !is_digits(value) {
                return Err(CoreError::Validation(format!(
                    "{field} must be a non-empty digit string, got '{value}'"
                )));
            }
        }

        Ok(Self::from_validated(
            fiscal_drive_number,
            fiscal_document_number,
            fiscal_sign,
            created,
            amount,
        ))
    }

    /// Identifiers must already be digit strings.
    pub(crate) fn from_validated(
        fiscal_drive_number: String,
        fiscal_document_number: String,
        fiscal_sign: String,
        created: NaiveDateTime,
        amount: Decimal,
    ) -> Self {
        Self {
            fiscal_drive_number,
            fiscal_document_number,
            fiscal_sign,
            created,
            amount,
        }
    }

    /// Fiscal drive (FN) number.
    #[must_use]
    pub fn fiscal_drive_number(&self) -> &str {
        &self.fiscal_drive_number
    }

    /// Fiscal document (FD) number.
    #[must_use]
    pub fn fiscal_document_number(&self) -> &str {
        &self.fiscal_document_number
    }

    /// Fiscal sign (FP).
    #[must_use]
    pub fn fiscal_sign(&self) -> &str {
        &self.fiscal_sign
    }

    /// Purchase timestamp as printed on the receipt.
    #[must_use]
    pub fn created(&self) -> NaiveDateTime {
        self.created
    }

    /// Receipt total in major currency units.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl fmt::Display for ReceiptParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fn={} i={} fp={} t={} s={}",
            self.fiscal_drive_number,
            self.fiscal_document_number,
            self.fiscal_sign,
            self.created.format("%Y-%m-%dT%H:%M:%S"),
            self.amount
        )
    }
}

#[derive(Deserialize)]
struct RawReceiptParams {
    fiscal_drive_number: String,
    fiscal_document_number: String,
    fiscal_sign: String,
    created: NaiveDateTime,
    amount: Decimal,
}

impl TryFrom<RawReceiptParams> for ReceiptParams {
    type Error = CoreError;

    fn try_from(raw: RawReceiptParams) -> Result<Self> {
        Self::new(
            raw.fiscal_drive_number,
            raw.fiscal_document_number,
            raw.fiscal_sign,
            raw.created,
            raw.amount,
        )
    }
}

/// A fully populated receipt as produced by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    /// Fiscal drive (FN) number
    pub fiscal_drive_number: String,
    /// Fiscal document (FD) number
    pub fiscal_document_number: String,
    /// Fiscal sign (FP)
    pub fiscal_sign: String,
    /// Seller legal name
    pub seller_name: String,
    /// Seller tax id (INN)
    pub seller_individual_number: String,
    /// Purchase time, shifted towards the canonical timezone
    pub created: NaiveDateTime,
    /// Purchased items in receipt order
    pub items: Vec<ParsedReceiptItem>,
}

/// A single receipt line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReceiptItem {
    /// Item name as printed
    pub name: String,
    /// Quantity, 3 fractional digits
    pub quantity: Decimal,
    /// Unit price, 2 fractional digits
    pub price: Decimal,
    /// Line total, 2 fractional digits
    pub total: Decimal,
}

impl ParsedReceiptItem {
    /// Create a normalized receipt line.
    ///
    /// Prices and totals are rounded to 2 fractional digits and quantities to
    /// 3, so values coming from different sources compare equal.
    #[must_use]
    pub fn new(name: impl Into<String>, quantity: Decimal, price: Decimal, total: Decimal) -> Self {
        Self {
            name: name.into(),
            quantity: normalize_quantity(quantity),
            price: normalize_money(price),
            total: normalize_money(total),
        }
    }
}

/// Round a monetary amount to exactly 2 fractional digits.
#[must_use]
pub fn normalize_money(value: Decimal) -> Decimal {
    quantize(value, MONEY_SCALE)
}

/// Round a quantity to exactly 3 fractional digits.
#[must_use]
pub fn normalize_quantity(value: Decimal) -> Decimal {
    quantize(value, QUANTITY_SCALE)
}

/// Convert an amount in minor currency units (kopecks) to major units.
#[must_use]
pub fn minor_to_major(minor: Decimal) -> Decimal {
    normalize_money(minor / Decimal::ONE_HUNDRED)
}

/// Convert an amount in major currency units to whole minor units.
///
/// Returns `None` when the amount is too large to be expressed in minor units.
#[must_use]
pub fn major_to_minor(major: Decimal) -> Option<Decimal> {
    major
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
}

fn quantize(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(scale);
    rounded
}

/// Whether `value` is a non-empty string of ASCII digits.
#[must_use]
pub fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
