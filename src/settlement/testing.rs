//! Scripted transport for unit tests.

use super::client::StatusClient;
use super::transport::{HttpRequest, HttpResponse, Transport};
use crate::config::SettlementConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub const HASH_A: &str = "9723af2113422e67394b1e378a9b4759";
pub const HASH_B: &str = "1799bd1abe91a4ee064251a221919915";
pub const HASH_C: &str = "2aaa784003169952b42268763e0f6614";

/// One scripted reaction of the fake settlement API.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    /// Respond after a delay.
    Slow(Duration, HttpResponse),
    Disconnect,
    Hang,
}

impl Step {
    pub fn json(status: u16, body: &str) -> Self {
        Self::Respond(HttpResponse::new(status, body))
    }

    pub fn status(hash: &str, status: &str) -> Self {
        Self::json(200, &format!(r#"{{"hash":"{hash}","status":"{status}"}}"#))
    }

    pub fn slow_status(hash: &str, status: &str, delay: Duration) -> Self {
        match Self::status(hash, status) {
            Self::Respond(response) => Self::Slow(delay, response),
            other => other,
        }
    }
}

/// Plays back steps in order, repeating the last one once exhausted.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    fn next_step(&self) -> Option<Step> {
        let mut steps = self.steps.lock();
        let mut last = self.last.lock();
        if let Some(step) = steps.pop_front() {
            *last = Some(step);
        }
        last.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().push(request);
        match self.next_step() {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Slow(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Step::Disconnect) => Err(Error::Network("connection reset".to_string())),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}

pub fn test_settlement_config() -> SettlementConfig {
    SettlementConfig {
        base_url: "https://settlement.test/v1/".to_string(),
        token: "test-token".to_string(),
        ..SettlementConfig::default()
    }
}

pub fn client_with(steps: Vec<Step>) -> (StatusClient, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(steps));
    let client = StatusClient::new(&test_settlement_config(), transport.clone());
    (client, transport)
}
