//! Payload encoding scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bakong_khqr::config::MerchantConfig;
use bakong_khqr::khqr::{decode, tracking_hash, verify_checksum, Currency, KhqrPayload, PaymentRequest};
use bakong_khqr::Error;
use rust_decimal::Decimal;

fn riverside_guesthouse() -> MerchantConfig {
    MerchantConfig {
        id: "khqr@aclb".to_string(),
        name: "Mekong Guesthouse".to_string(),
        city: "Phnom Penh".to_string(),
        phone: Some("85512345678".to_string()),
        store_label: Some("Riverside".to_string()),
        terminal_label: Some("T01".to_string()),
    }
}

#[test]
fn test_booking_payload_matches_reference() {
    let request = PaymentRequest::new("m1", "Angkor Stay", "Siem Reap", Currency::Usd)
        .with_amount(Decimal::new(1250, 2))
        .with_bill_number("B100");
    let payload = KhqrPayload::encode(&request).expect("encode");

    assert_eq!(
        payload.raw(),
        "00020101021229270017kh.gov.nbc.bakong0102m15303840540512.505802KH\
         5911Angkor Stay6009Siem Reap62080104B100630483EC"
    );
    assert_eq!(payload.md5_hash(), "9723af2113422e67394b1e378a9b4759");
    assert_eq!(tracking_hash(payload.raw()), payload.md5_hash());
}

#[test]
fn test_configured_merchant_payload_round_trips() {
    let request = riverside_guesthouse().payment_request(
        Currency::Khr,
        Some(Decimal::new(40_000, 0)),
        Some("BK-2024-0042".to_string()),
    );
    let payload = KhqrPayload::encode(&request).expect("encode");
    assert_eq!(
        payload.raw(),
        "00020101021229490017kh.gov.nbc.bakong0109khqr@aclb021185512345678\
         5303116540840000.005802KH5917Mekong Guesthouse6010Phnom Penh\
         62360112BK-2024-00420309Riverside0703T0163046C5A"
    );
    assert_eq!(payload.md5_hash(), "2aaa784003169952b42268763e0f6614");

    let decoded = decode(payload.raw()).expect("decode");
    assert!(decoded.dynamic);
    assert_eq!(decoded.merchant_id.as_deref(), Some("khqr@aclb"));
    assert_eq!(decoded.phone_number.as_deref(), Some("85512345678"));
    assert_eq!(decoded.currency, Some(Currency::Khr));
    assert_eq!(decoded.amount, Some(Decimal::new(4_000_000, 2)));
    assert_eq!(decoded.bill_number.as_deref(), Some("BK-2024-0042"));
    assert_eq!(decoded.store_label.as_deref(), Some("Riverside"));
    assert_eq!(decoded.terminal_label.as_deref(), Some("T01"));
    assert_eq!(decoded.checksum, "6C5A");
}

#[test]
fn test_any_amount_code_is_static() {
    let request = PaymentRequest::new("m1", "Angkor Stay", "Siem Reap", Currency::Usd)
        .with_amount(Decimal::ZERO);
    let payload = KhqrPayload::encode(&request).expect("encode");

    assert_eq!(payload.md5_hash(), "1799bd1abe91a4ee064251a221919915");
    assert!(verify_checksum(payload.raw()));
    let decoded = decode(payload.raw()).expect("decode");
    assert!(!decoded.dynamic);
    assert_eq!(decoded.amount, None);
}

#[test]
fn test_tampered_payload_is_rejected() {
    let request = PaymentRequest::new("m1", "Angkor Stay", "Siem Reap", Currency::Usd)
        .with_amount(Decimal::new(1250, 2));
    let payload = KhqrPayload::encode(&request).expect("encode");
    let tampered = payload.raw().replace("12.50", "02.50");

    assert!(!verify_checksum(&tampered));
    assert!(matches!(decode(&tampered), Err(Error::Encoding(_))));
}

#[test]
fn test_misconfigured_merchant_is_an_encoding_error() {
    let request = MerchantConfig::default().payment_request(Currency::Usd, None, None);
    assert!(matches!(
        KhqrPayload::encode(&request),
        Err(Error::Encoding(_))
    ));
}
