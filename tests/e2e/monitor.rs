//! Payment monitor scenarios against the fake settlement API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{test_config, FakeSettlement, TestHarness};
use bakong_khqr::khqr::{tracking_hash, Currency, KhqrPayload, PaymentRequest};
use bakong_khqr::monitor::{ExpiryReason, SessionOutcome};
use bakong_khqr::PaymentStatus;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::Instant;

fn booking_hash() -> String {
    let request = PaymentRequest::new("m1", "Angkor Stay", "Siem Reap", Currency::Usd)
        .with_amount(Decimal::new(1250, 2))
        .with_bill_number("B100");
    KhqrPayload::encode(&request)
        .expect("encode")
        .md5_hash()
        .to_string()
}

fn assert_elapsed(start: Instant, secs: u64) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs + 1),
        "elapsed {elapsed:?}, expected about {secs}s"
    );
}

fn hashes(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| tracking_hash(&format!("booking-{i}")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_payment_confirmed_after_payer_scans() {
    let harness = TestHarness::setup();
    let hash = booking_hash();
    let start = Instant::now();

    let mut ticket = harness.monitor.monitor(&hash).expect("monitor");
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(ticket.payer_status(), PaymentStatus::Pending);
    harness.settlement.set_status(&hash, PaymentStatus::Paid);

    let outcome = ticket.wait().await;
    assert!(matches!(outcome, SessionOutcome::Confirmed(ref r) if r.hash == hash));
    assert_elapsed(start, 15);
    assert_eq!(harness.settlement.calls(), 4);

    let confirmed = harness.hooks.confirmed();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].hash, hash);
    assert!(harness.hooks.expired().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unpaid_booking_released_at_deadline() {
    let harness = TestHarness::setup();
    let hash = booking_hash();

    let outcome = harness.monitor.monitor(&hash).expect("monitor").wait().await;

    assert!(matches!(
        outcome,
        SessionOutcome::Expired {
            reason: ExpiryReason::DeadlineElapsed,
            ..
        }
    ));
    assert_eq!(
        harness.hooks.expired(),
        vec![(hash.clone(), ExpiryReason::DeadlineElapsed)]
    );
    // One check every 5 seconds for 15 minutes.
    assert_eq!(harness.settlement.calls(), 180);

    // A late payment neither confirms nor reopens the booking.
    harness.settlement.set_status(&hash, PaymentStatus::Paid);
    let record = harness.monitor.verify(&hash).await.expect("verify");
    assert_eq!(record.status, PaymentStatus::Expired);
    assert!(harness.hooks.confirmed().is_empty());
    assert_eq!(harness.hooks.alerts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_outage_is_retried_and_hidden_from_payer() {
    let harness = TestHarness::setup();
    let hash = booking_hash();
    harness.settlement.set_outage(Some(503));
    let start = Instant::now();

    let mut ticket = harness.monitor.monitor(&hash).expect("monitor");
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(ticket.payer_status(), PaymentStatus::Pending);

    harness.settlement.set_outage(None);
    harness.settlement.set_status(&hash, PaymentStatus::Paid);

    // Errors at 0s and 5s, then a 10 second backoff.
    assert!(matches!(ticket.wait().await, SessionOutcome::Confirmed(_)));
    assert_elapsed(start, 15);
    assert_eq!(harness.settlement.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_revoked_credentials_abort_and_leave_booking_alone() {
    let harness = TestHarness::setup();
    let hash = booking_hash();
    harness.settlement.set_outage(Some(403));

    let outcome = harness.monitor.monitor(&hash).expect("monitor").wait().await;
    assert!(matches!(outcome, SessionOutcome::Aborted { .. }));
    assert_eq!(harness.settlement.calls(), 2);
    assert_eq!(harness.hooks.alerts().len(), 1);
    assert!(harness.hooks.confirmed().is_empty());
    assert!(harness.hooks.expired().is_empty());

    // Once credentials are fixed the hash can be monitored again.
    harness.settlement.set_outage(None);
    harness.settlement.set_status(&hash, PaymentStatus::Paid);
    let mut ticket = harness.monitor.monitor(&hash).expect("monitor again");
    assert!(ticket.created());
    assert!(matches!(ticket.wait().await, SessionOutcome::Confirmed(_)));
    assert_eq!(harness.hooks.confirmed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_many_bookings_share_the_in_flight_limit() {
    let harness =
        TestHarness::setup_with(test_config(), FakeSettlement::with_latency(Duration::from_secs(1)));
    let hashes = hashes(20);

    let mut tickets: Vec<_> = hashes
        .iter()
        .map(|h| harness.monitor.monitor(h).expect("monitor"))
        .collect();
    assert_eq!(harness.monitor.active_sessions(), 20);

    tokio::time::sleep(Duration::from_secs(3)).await;
    for hash in &hashes {
        harness.settlement.set_status(hash, PaymentStatus::Paid);
    }

    let outcomes =
        futures::future::join_all(tickets.iter_mut().map(|ticket| ticket.wait())).await;
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, SessionOutcome::Confirmed(_))));
    assert_eq!(harness.hooks.confirmed().len(), 20);
    assert_eq!(harness.settlement.max_in_flight(), 4);
    assert_eq!(harness.monitor.active_sessions(), 0);
}

#[tokio::test]
async fn test_bulk_reconciliation_settles_once() {
    let harness = TestHarness::setup();
    let hashes = hashes(75);
    for hash in hashes.iter().step_by(10) {
        harness.settlement.set_status(hash, PaymentStatus::Paid);
    }
    harness
        .settlement
        .set_status(&hashes[3], PaymentStatus::Expired);

    let results = harness.monitor.verify_bulk(&hashes).await.expect("bulk");
    assert_eq!(results.len(), 75);
    assert_eq!(harness.settlement.calls(), 2);
    assert_eq!(results[&hashes[10]].status, PaymentStatus::Paid);
    assert_eq!(results[&hashes[3]].status, PaymentStatus::Expired);
    assert_eq!(results[&hashes[4]].status, PaymentStatus::Pending);
    assert_eq!(harness.hooks.confirmed().len(), 8);
    assert_eq!(
        harness.hooks.expired(),
        vec![(hashes[3].clone(), ExpiryReason::UpstreamExpired)]
    );

    // Running it again, or monitoring a settled hash, fires nothing new.
    harness.monitor.verify_bulk(&hashes).await.expect("bulk again");
    let mut ticket = harness.monitor.monitor(&hashes[0]).expect("monitor");
    assert!(!ticket.created());
    assert!(matches!(ticket.wait().await, SessionOutcome::Confirmed(_)));
    assert_eq!(harness.hooks.confirmed().len(), 8);
    assert_eq!(harness.settlement.calls(), 4);
}
