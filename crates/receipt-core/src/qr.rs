//! Decoding of fiscal receipt QR payloads.
//!
//! A payload is a list of `key=value` pairs joined by `&`, e.g.
//! `t=20170615T141100&s=67.20&fn=8710000100036875&i=78337&fp=255743793&n=1`.
//! Key order is irrelevant and unknown keys are ignored.

use crate::error::DecodeError;
use crate::types::{is_digits, ReceiptParams};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Timestamp layout used by the `t` key.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Decode a scanned payload, logging the reason when it is rejected.
///
/// Never panics on malformed input; any missing or malformed required key
/// yields `None`.
#[must_use]
pub fn decode(text: &str) -> Option<ReceiptParams> {
    match try_decode(text) {
        Ok(params) => Some(params),
        Err(e) => {
            tracing::warn!("Cannot parse QR code: {}", e);
            None
        }
    }
}

/// Decode a scanned payload, reporting which key was missing or malformed.
pub fn try_decode(text: &str) -> Result<ReceiptParams, DecodeError> {
    let pairs: Vec<(&str, &str)> = text
        .trim()
        .split('&')
        .filter_map(|part| part.split_once('='))
        .collect();

    let drive = field(&pairs, "fn", digits)?;
    let document = field(&pairs, "i", digits)?;
    let sign = field(&pairs, "fp", digits)?;
    let created = field(&pairs, "t", |v| NaiveDateTime::parse_from_str(v, TIMESTAMP_FORMAT).ok())?;
    let amount = field(&pairs, "s", |v| Decimal::from_str(v).ok())?;

    Ok(ReceiptParams::from_validated(drive, document, sign, created, amount))
}

fn digits(value: &str) -> Option<String> {
    is_digits(value).then(|| value.to_string())
}

/// First occurrence of `name` wins.
fn field<T>(
    pairs: &[(&str, &str)],
    name: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, DecodeError> {
    let (_, value) = pairs
        .iter()
        .find(|(key, _)| *key == name)
        .ok_or(DecodeError::MissingField { field: name })?;

    parse(value).ok_or_else(|| {
        tracing::debug!("Cannot parse field {}: {:?}", name, value);
        DecodeError::InvalidField {
            field: name,
            value: (*value).to_string(),
        }
    })
}
