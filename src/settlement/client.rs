//! Single and bulk payment status clients.
//!
//! Both map HTTP outcomes the same way:
//!
//! | Answer | Result |
//! |--------|--------|
//! | 2xx | parsed record(s) |
//! | 404 | PENDING |
//! | 401 / 403 | [`Error::Fatal`], never retried |
//! | 429 | [`Error::RateLimited`] |
//! | no answer within the timeout | [`Error::Timeout`] |
//! | anything else | [`Error::Upstream`] |
//!
//! Neither client retries; retry policy belongs to the monitor.

use super::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
use super::types::{BulkStatusRequest, BulkStatusResponse, PaymentStatusRecord};
use crate::config::SettlementConfig;
use crate::error::{Error, Result};
use crate::khqr::is_tracking_hash;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Largest number of hashes accepted by one bulk call.
pub const MAX_BULK_HASHES: usize = 50;

const SINGLE_PATH: &str = "/check_transaction_by_hash";
const BULK_PATH: &str = "/check_transactions_bulk";

/// Client for the settlement status endpoints.
#[derive(Clone)]
pub struct StatusClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl StatusClient {
    /// Create a client over an explicit transport.
    #[must_use]
    pub fn new(config: &SettlementConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.request_timeout(),
        }
    }

    /// Create a client backed by `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SettlementConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check the status of one tracking hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHash`] for malformed input, and the transient
    /// or fatal errors listed in the module docs.
    pub async fn check_status(&self, hash: &str) -> Result<PaymentStatusRecord> {
        ensure_hash(hash)?;

        let request = HttpRequest {
            method: Method::Get,
            url: format!("{}{SINGLE_PATH}?hash={hash}", self.base_url),
            bearer_token: self.bearer(),
            body: None,
        };
        let Some(body) = self.execute(request).await? else {
            debug!("Hash {hash} not yet seen by settlement network");
            return Ok(PaymentStatusRecord::pending(hash));
        };

        let mut record: PaymentStatusRecord = serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("Unreadable status for {hash}: {e}")))?;
        if record.hash.is_empty() {
            record.hash = hash.to_string();
        } else if record.hash != hash {
            return Err(Error::Protocol(format!(
                "Asked for {hash}, settlement API answered for {}",
                record.hash
            )));
        }
        debug!("Hash {hash} status {}", record.status);
        Ok(record)
    }

    /// Check up to [`MAX_BULK_HASHES`] hashes in one call.
    ///
    /// Every requested hash is present in the result; hashes the API does not
    /// mention are PENDING. Records for hashes that were not requested are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] for more than [`MAX_BULK_HASHES`] hashes,
    /// [`Error::InvalidHash`] for malformed ones, and otherwise the same
    /// errors as [`Self::check_status`].
    pub async fn check_status_bulk(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, PaymentStatusRecord>> {
        if hashes.len() > MAX_BULK_HASHES {
            return Err(Error::Encoding(format!(
                "Bulk status check accepts at most {MAX_BULK_HASHES} hashes, got {}",
                hashes.len()
            )));
        }
        for hash in hashes {
            ensure_hash(hash)?;
        }

        let mut results: HashMap<String, PaymentStatusRecord> = hashes
            .iter()
            .map(|h| (h.clone(), PaymentStatusRecord::pending(h.as_str())))
            .collect();
        if hashes.is_empty() {
            return Ok(results);
        }

        let request = HttpRequest {
            method: Method::Post,
            url: format!("{}{BULK_PATH}", self.base_url),
            bearer_token: self.bearer(),
            body: Some(serde_json::to_value(BulkStatusRequest { hashes })?),
        };
        let Some(body) = self.execute(request).await? else {
            return Ok(results);
        };

        let response: BulkStatusResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("Unreadable bulk status: {e}")))?;
        for record in response.transactions {
            match results.get_mut(&record.hash) {
                Some(slot) => *slot = record,
                None => debug!("Ignoring unrequested hash {} in bulk answer", record.hash),
            }
        }
        Ok(results)
    }

    fn bearer(&self) -> Option<String> {
        (!self.token.is_empty()).then(|| self.token.clone())
    }

    /// Send with the per-call bound and classify the answer. `Ok(None)`
    /// means 404.
    async fn execute(&self, request: HttpRequest) -> Result<Option<String>> {
        let url = request.url.clone();
        let response = match tokio::time::timeout(self.timeout, self.transport.send(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!("Settlement call {url} timed out after {:?}", self.timeout);
                return Err(Error::Timeout(self.timeout));
            }
        };
        classify(response)
    }
}

fn ensure_hash(hash: &str) -> Result<()> {
    if is_tracking_hash(hash) {
        Ok(())
    } else {
        Err(Error::InvalidHash(hash.to_string()))
    }
}

fn classify(response: HttpResponse) -> Result<Option<String>> {
    match response.status {
        200..=299 => Ok(Some(response.body)),
        404 => Ok(None),
        401 | 403 => Err(Error::Fatal {
            status: response.status,
            message: response.body,
        }),
        429 => Err(Error::RateLimited),
        status => Err(Error::Upstream {
            status,
            body: response.body,
        }),
    }
}
