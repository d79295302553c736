//! Test harness around an in-process fake of the settlement API.
//!
//! The `TestHarness` wires a [`PaymentMonitor`] to a [`FakeSettlement`]
//! transport and records every booking hook, so tests can drive payments
//! by flipping statuses and then assert on the side effects.

use async_trait::async_trait;
use bakong_khqr::config::AppConfig;
use bakong_khqr::monitor::{ExpiryReason, MonitorBuilder, PaymentHooks, PaymentMonitor};
use bakong_khqr::settlement::{HttpRequest, HttpResponse, Method, Transport};
use bakong_khqr::{PaymentStatus, PaymentStatusRecord, Result, StatusClient};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process settlement API.
///
/// Unknown hashes answer 404. An outage makes every call answer with the
/// given HTTP status.
#[derive(Default)]
pub struct FakeSettlement {
    statuses: Mutex<HashMap<String, PaymentStatus>>,
    outage: Mutex<Option<u16>>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSettlement {
    /// A fake answering after `latency`.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Set the status reported for `hash`.
    pub fn set_status(&self, hash: &str, status: PaymentStatus) {
        self.statuses.lock().insert(hash.to_string(), status);
    }

    /// Answer every call with `status`, or stop doing so with `None`.
    pub fn set_outage(&self, status: Option<u16>) {
        *self.outage.lock() = status;
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, hash: &str) -> Option<serde_json::Value> {
        self.statuses
            .lock()
            .get(hash)
            .map(|status| serde_json::json!({ "hash": hash, "status": status }))
    }

    fn answer(&self, request: &HttpRequest) -> HttpResponse {
        if let Some(status) = *self.outage.lock() {
            return HttpResponse::new(status, "outage");
        }
        match request.method {
            Method::Get => {
                let hash = request
                    .url
                    .split_once("hash=")
                    .map_or("", |(_, hash)| hash);
                match self.record(hash) {
                    Some(record) => HttpResponse::new(200, record.to_string()),
                    None => HttpResponse::new(404, ""),
                }
            }
            Method::Post => {
                let transactions: Vec<serde_json::Value> = request
                    .body
                    .as_ref()
                    .and_then(|body| body["hashes"].as_array())
                    .into_iter()
                    .flatten()
                    .filter_map(|hash| hash.as_str().and_then(|h| self.record(h)))
                    .collect();
                HttpResponse::new(
                    200,
                    serde_json::json!({ "transactions": transactions }).to_string(),
                )
            }
        }
    }
}

#[async_trait]
impl Transport for FakeSettlement {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let response = self.answer(&request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response)
    }
}

/// Booking hooks that remember every call.
#[derive(Default)]
pub struct RecordingHooks {
    confirmed: Mutex<Vec<PaymentStatusRecord>>,
    expired: Mutex<Vec<(String, ExpiryReason)>>,
    alerts: Mutex<Vec<(String, String)>>,
}

impl RecordingHooks {
    /// Records passed to `on_confirmed`.
    #[must_use]
    pub fn confirmed(&self) -> Vec<PaymentStatusRecord> {
        self.confirmed.lock().clone()
    }

    /// Arguments passed to `on_expired`.
    #[must_use]
    pub fn expired(&self) -> Vec<(String, ExpiryReason)> {
        self.expired.lock().clone()
    }

    /// Arguments passed to `on_operator_alert`.
    #[must_use]
    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().clone()
    }
}

#[async_trait]
impl PaymentHooks for RecordingHooks {
    async fn on_confirmed(&self, record: &PaymentStatusRecord) {
        self.confirmed.lock().push(record.clone());
    }

    async fn on_expired(&self, hash: &str, reason: ExpiryReason) {
        self.expired.lock().push((hash.to_string(), reason));
    }

    async fn on_operator_alert(&self, hash: &str, message: &str) {
        self.alerts
            .lock()
            .push((hash.to_string(), message.to_string()));
    }
}

/// Monitor, fake settlement API and hook recorder.
pub struct TestHarness {
    /// Fake settlement API.
    pub settlement: Arc<FakeSettlement>,
    /// Recorded hooks.
    pub hooks: Arc<RecordingHooks>,
    /// Monitor under test.
    pub monitor: PaymentMonitor,
}

impl TestHarness {
    /// Harness with default polling settings and an instant settlement API.
    #[must_use]
    pub fn setup() -> Self {
        Self::setup_with(test_config(), FakeSettlement::default())
    }

    /// Harness with explicit configuration and fake.
    #[must_use]
    pub fn setup_with(config: AppConfig, settlement: FakeSettlement) -> Self {
        let settlement = Arc::new(settlement);
        let hooks = Arc::new(RecordingHooks::default());
        let client = StatusClient::new(&config.settlement, settlement.clone());
        let monitor = MonitorBuilder::new(client, hooks.clone())
            .app_config(&config)
            .build();
        Self {
            settlement,
            hooks,
            monitor,
        }
    }
}

/// Default configuration pointed at the fake.
#[must_use]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.settlement.base_url = "https://bakong.test/v1".to_string();
    config.settlement.token = "e2e-token".to_string();
    config
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_answers_known_hashes_only() {
        let fake = FakeSettlement::default();
        fake.set_status("abc", PaymentStatus::Paid);

        let known = fake
            .send(HttpRequest {
                method: Method::Get,
                url: "https://bakong.test/v1/check_transaction_by_hash?hash=abc".to_string(),
                bearer_token: None,
                body: None,
            })
            .await
            .expect("fake never fails");
        assert_eq!(known.status, 200);
        assert!(known.body.contains("PAID"));

        let unknown = fake
            .send(HttpRequest {
                method: Method::Get,
                url: "https://bakong.test/v1/check_transaction_by_hash?hash=def".to_string(),
                bearer_token: None,
                body: None,
            })
            .await
            .expect("fake never fails");
        assert_eq!(unknown.status, 404);
        assert_eq!(fake.calls(), 2);
    }
}
