//! KHQR payload decoding and checksum verification.

use super::crc::checksum_hex;
use super::payload::Currency;
use super::tlv::{additional_data, merchant_account, tags};
use crate::error::{Error, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

/// One decoded TLV field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvField {
    /// Two-digit tag.
    pub tag: String,
    /// Field value.
    pub value: String,
}

/// Fields recovered from a KHQR wire string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedKhqr {
    /// Point of initiation is dynamic (`12`).
    pub dynamic: bool,
    /// Merchant account id.
    pub merchant_id: Option<String>,
    /// Merchant phone number.
    pub phone_number: Option<String>,
    /// Merchant name.
    pub merchant_name: Option<String>,
    /// Merchant city.
    pub merchant_city: Option<String>,
    /// Currency.
    pub currency: Option<Currency>,
    /// Amount, absent in "any amount" mode.
    pub amount: Option<Decimal>,
    /// Bill number.
    pub bill_number: Option<String>,
    /// Store label.
    pub store_label: Option<String>,
    /// Terminal label.
    pub terminal_label: Option<String>,
    /// Trailing checksum.
    pub checksum: String,
}

/// Split a TLV sequence into its fields.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if a header or value runs past the input.
pub fn parse_fields(input: &str) -> Result<Vec<TlvField>> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        let header = input
            .get(pos..pos + 4)
            .ok_or_else(|| Error::Encoding(format!("Truncated TLV header at offset {pos}")))?;
        let (Some(tag), Some(len)) = (header.get(..2), header.get(2..)) else {
            return Err(Error::Encoding(format!("Malformed TLV header at offset {pos}")));
        };
        let len: usize = len
            .parse()
            .map_err(|_| Error::Encoding(format!("Bad length for tag {tag} at offset {pos}")))?;
        let start = pos + 4;
        let value = input
            .get(start..start + len)
            .ok_or_else(|| Error::Encoding(format!("Value for tag {tag} overruns payload")))?;
        fields.push(TlvField {
            tag: tag.to_string(),
            value: value.to_string(),
        });
        pos = start + len;
    }
    Ok(fields)
}

/// Check that `raw` ends in a `6304` trailer whose checksum matches.
#[must_use]
pub fn verify_checksum(raw: &str) -> bool {
    if raw.len() < 8 {
        return false;
    }
    let split = raw.len() - 4;
    match (raw.get(..split), raw.get(split..)) {
        (Some(body), Some(sum)) => body.ends_with("6304") && checksum_hex(body) == sum,
        _ => false,
    }
}

/// Decode and verify a KHQR wire string.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the checksum does not match or the TLV
/// structure is malformed.
pub fn decode(raw: &str) -> Result<DecodedKhqr> {
    if !verify_checksum(raw) {
        return Err(Error::Encoding("KHQR checksum mismatch".to_string()));
    }

    let mut decoded = DecodedKhqr::default();
    for field in parse_fields(raw)? {
        match field.tag.as_str() {
            tags::INITIATION_METHOD => decoded.dynamic = field.value == "12",
            tags::MERCHANT_ACCOUNT => {
                for sub in parse_fields(&field.value)? {
                    match sub.tag.as_str() {
                        merchant_account::MERCHANT_ID => decoded.merchant_id = Some(sub.value),
                        merchant_account::PHONE => decoded.phone_number = Some(sub.value),
                        _ => {}
                    }
                }
            }
            tags::CURRENCY => {
                decoded.currency = Some(Currency::from_numeric(&field.value).ok_or_else(
                    || Error::Encoding(format!("Unsupported currency code: {}", field.value)),
                )?);
            }
            tags::AMOUNT => {
                decoded.amount = Some(Decimal::from_str(&field.value).map_err(|e| {
                    Error::Encoding(format!("Bad amount {}: {e}", field.value))
                })?);
            }
            tags::MERCHANT_NAME => decoded.merchant_name = Some(field.value),
            tags::MERCHANT_CITY => decoded.merchant_city = Some(field.value),
            tags::ADDITIONAL_DATA => {
                for sub in parse_fields(&field.value)? {
                    match sub.tag.as_str() {
                        additional_data::BILL_NUMBER => decoded.bill_number = Some(sub.value),
                        additional_data::STORE_LABEL => decoded.store_label = Some(sub.value),
                        additional_data::TERMINAL_LABEL => {
                            decoded.terminal_label = Some(sub.value);
                        }
                        _ => {}
                    }
                }
            }
            tags::CRC => decoded.checksum = field.value,
            _ => {}
        }
    }
    Ok(decoded)
}
