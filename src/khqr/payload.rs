//! KHQR payload builder.
//!
//! Turns a [`PaymentRequest`] into the checksummed wire string handed to QR
//! renderers, plus the MD5 tracking hash used against the settlement API.

use super::crc::checksum_hex;
use super::hash::tracking_hash;
use super::tlv::{additional_data, format_tlv, merchant_account, tags, truncate_bytes};
use crate::error::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Scheme identifier carried in the merchant account block.
pub const MERCHANT_GUID: &str = "kh.gov.nbc.bakong";

/// Country code emitted in tag 58.
pub const COUNTRY_CODE: &str = "KH";

/// Byte limits applied before encoding.
pub const MAX_MERCHANT_NAME: usize = 25;
/// Byte limit for the merchant city.
pub const MAX_MERCHANT_CITY: usize = 15;
/// Byte limit for the merchant id.
pub const MAX_MERCHANT_ID: usize = 32;
/// Byte limit for phone, bill number, store label and terminal label.
pub const MAX_SUBFIELD: usize = 25;

const PAYLOAD_FORMAT_VERSION: &str = "01";
const INITIATION_STATIC: &str = "11";
const INITIATION_DYNAMIC: &str = "12";

/// Currencies accepted by KHQR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US dollar.
    Usd,
    /// Cambodian riel.
    Khr,
}

impl Currency {
    /// ISO 4217 numeric code.
    #[must_use]
    pub fn numeric_code(self) -> &'static str {
        match self {
            Self::Usd => "840",
            Self::Khr => "116",
        }
    }

    /// ISO 4217 alphabetic code.
    #[must_use]
    pub fn alpha_code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Khr => "KHR",
        }
    }

    /// Look up a currency by its numeric code.
    #[must_use]
    pub fn from_numeric(code: &str) -> Option<Self> {
        match code {
            "840" => Some(Self::Usd),
            "116" => Some(Self::Khr),
            _ => None,
        }
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" | "840" => Ok(Self::Usd),
            "KHR" | "116" => Ok(Self::Khr),
            other => Err(Error::Encoding(format!("Unsupported currency: {other}"))),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alpha_code())
    }
}

/// One payment to be encoded. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    merchant_id: String,
    merchant_name: String,
    merchant_city: String,
    amount: Option<Decimal>,
    currency: Currency,
    bill_number: Option<String>,
    store_label: Option<String>,
    terminal_label: Option<String>,
    phone_number: Option<String>,
}

impl PaymentRequest {
    /// Start a request for the given merchant. Without an amount the payload
    /// is an "any amount" code.
    #[must_use]
    pub fn new(
        merchant_id: impl Into<String>,
        merchant_name: impl Into<String>,
        merchant_city: impl Into<String>,
        currency: Currency,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            merchant_name: merchant_name.into(),
            merchant_city: merchant_city.into(),
            amount: None,
            currency,
            bill_number: None,
            store_label: None,
            terminal_label: None,
            phone_number: None,
        }
    }

    /// Set the amount to collect.
    #[must_use]
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the bill number (unique per booking).
    #[must_use]
    pub fn with_bill_number(mut self, bill_number: impl Into<String>) -> Self {
        self.bill_number = Some(bill_number.into());
        self
    }

    /// Set the store label.
    #[must_use]
    pub fn with_store_label(mut self, store_label: impl Into<String>) -> Self {
        self.store_label = Some(store_label.into());
        self
    }

    /// Set the terminal label.
    #[must_use]
    pub fn with_terminal_label(mut self, terminal_label: impl Into<String>) -> Self {
        self.terminal_label = Some(terminal_label.into());
        self
    }

    /// Set the merchant phone number.
    #[must_use]
    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    /// Merchant id.
    #[must_use]
    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    /// Amount, if any.
    #[must_use]
    pub fn amount(&self) -> Option<Decimal> {
        self.amount
    }

    /// Currency.
    #[must_use]
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Bill number, if any.
    #[must_use]
    pub fn bill_number(&self) -> Option<&str> {
        self.bill_number.as_deref()
    }

    /// Amount formatted for tag 54, or `None` in "any amount" mode.
    fn encoded_amount(&self) -> Option<String> {
        let amount = self.amount?;
        if amount.is_sign_negative() && !amount.is_zero() {
            warn!("Negative amount {amount} ignored, encoding as any-amount");
            return None;
        }
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if rounded.is_zero() {
            return None;
        }
        Some(format!("{rounded:.2}"))
    }
}

/// An encoded KHQR payload and its tracking hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KhqrPayload {
    raw: String,
    md5_hash: String,
}

impl KhqrPayload {
    /// Encode a payment request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the merchant id is empty. Every other
    /// field is truncated or omitted rather than rejected.
    pub fn encode(request: &PaymentRequest) -> Result<Self> {
        let raw = encode_raw(request)?;
        let md5_hash = tracking_hash(&raw);
        debug!(
            "Encoded KHQR for merchant {} ({} bytes, hash {})",
            request.merchant_id,
            raw.len(),
            md5_hash
        );
        Ok(Self { raw, md5_hash })
    }

    /// The wire string to render as a QR code.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// MD5 tracking hash shared with the settlement API.
    #[must_use]
    pub fn md5_hash(&self) -> &str {
        &self.md5_hash
    }

    /// Split into `(raw, md5_hash)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.raw, self.md5_hash)
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

fn encode_raw(request: &PaymentRequest) -> Result<String> {
    if request.merchant_id.trim().is_empty() {
        return Err(Error::Encoding("Merchant id must not be empty".to_string()));
    }

    let amount = request.encoded_amount();
    let mut out = String::with_capacity(160);

    out.push_str(&format_tlv(tags::PAYLOAD_FORMAT, PAYLOAD_FORMAT_VERSION));
    let initiation = if amount.is_some() {
        INITIATION_DYNAMIC
    } else {
        INITIATION_STATIC
    };
    out.push_str(&format_tlv(tags::INITIATION_METHOD, initiation));

    let mut account = format_tlv(merchant_account::GUID, MERCHANT_GUID);
    account.push_str(&format_tlv(
        merchant_account::MERCHANT_ID,
        truncate_bytes(&request.merchant_id, MAX_MERCHANT_ID),
    ));
    if let Some(phone) = non_empty(request.phone_number.as_ref()) {
        account.push_str(&format_tlv(
            merchant_account::PHONE,
            truncate_bytes(phone, MAX_SUBFIELD),
        ));
    }
    out.push_str(&format_tlv(tags::MERCHANT_ACCOUNT, &account));

    out.push_str(&format_tlv(tags::CURRENCY, request.currency.numeric_code()));
    if let Some(amount) = amount {
        out.push_str(&format_tlv(tags::AMOUNT, &amount));
    }
    out.push_str(&format_tlv(tags::COUNTRY, COUNTRY_CODE));
    out.push_str(&format_tlv(
        tags::MERCHANT_NAME,
        truncate_bytes(&request.merchant_name, MAX_MERCHANT_NAME),
    ));
    out.push_str(&format_tlv(
        tags::MERCHANT_CITY,
        truncate_bytes(&request.merchant_city, MAX_MERCHANT_CITY),
    ));

    let mut extra = String::new();
    for (tag, value) in [
        (additional_data::BILL_NUMBER, request.bill_number.as_ref()),
        (additional_data::STORE_LABEL, request.store_label.as_ref()),
        (additional_data::TERMINAL_LABEL, request.terminal_label.as_ref()),
    ] {
        if let Some(value) = non_empty(value) {
            extra.push_str(&format_tlv(tag, truncate_bytes(value, MAX_SUBFIELD)));
        }
    }
    if !extra.is_empty() {
        out.push_str(&format_tlv(tags::ADDITIONAL_DATA, &extra));
    }

    // Checksum covers everything up to and including "6304".
    out.push_str(tags::CRC);
    out.push_str("04");
    let crc = checksum_hex(&out);
    out.push_str(&crc);
    Ok(out)
}
