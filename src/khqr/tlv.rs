//! Tag-Length-Value field encoding and the KHQR field dictionary.

/// Largest value length a two-digit length field can describe.
pub const MAX_VALUE_LEN: usize = 99;

/// Top-level KHQR tags, in emission order.
pub mod tags {
    /// Payload format indicator.
    pub const PAYLOAD_FORMAT: &str = "00";
    /// Point of initiation method.
    pub const INITIATION_METHOD: &str = "01";
    /// Merchant account information block.
    pub const MERCHANT_ACCOUNT: &str = "29";
    /// Transaction currency (ISO 4217 numeric).
    pub const CURRENCY: &str = "53";
    /// Transaction amount.
    pub const AMOUNT: &str = "54";
    /// Country code.
    pub const COUNTRY: &str = "58";
    /// Merchant name.
    pub const MERCHANT_NAME: &str = "59";
    /// Merchant city.
    pub const MERCHANT_CITY: &str = "60";
    /// Additional data block.
    pub const ADDITIONAL_DATA: &str = "62";
    /// CRC16 checksum.
    pub const CRC: &str = "63";
}

/// Sub-tags nested in the merchant account block (tag 29).
pub mod merchant_account {
    /// Globally unique identifier of the scheme.
    pub const GUID: &str = "00";
    /// Merchant / Bakong account id.
    pub const MERCHANT_ID: &str = "01";
    /// Merchant phone number.
    pub const PHONE: &str = "02";
}

/// Sub-tags nested in the additional data block (tag 62).
pub mod additional_data {
    /// Bill number.
    pub const BILL_NUMBER: &str = "01";
    /// Store label.
    pub const STORE_LABEL: &str = "03";
    /// Terminal label.
    pub const TERMINAL_LABEL: &str = "07";
}

/// Encode one field as `tag + 2-digit length + value`.
///
/// The tag is not checked against the dictionary. Values longer than
/// [`MAX_VALUE_LEN`] bytes are cut so the length field stays two digits.
#[must_use]
pub fn format_tlv(tag: &str, value: &str) -> String {
    let value = truncate_bytes(value, MAX_VALUE_LEN);
    format!("{tag}{:02}{value}", value.len())
}

/// Longest prefix of `value` that fits in `max` bytes without splitting a
/// UTF-8 character.
#[must_use]
pub fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
