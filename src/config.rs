//! Configuration for bakong-khqr.

use crate::khqr::{Currency, PaymentRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Settlement API access.
    #[serde(default)]
    pub settlement: SettlementConfig,

    /// Polling behaviour.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Merchant identity used when encoding payloads.
    #[serde(default)]
    pub merchant: MerchantConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Settlement API configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Base URL, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token issued by the settlement network.
    #[serde(default)]
    pub token: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent in-flight calls.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between checks while a payment is pending.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Wall-clock lifetime of a polling session.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Upper bound for the transient-error backoff.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Consecutive unexpected upstream answers before giving up.
    #[serde(default = "default_max_upstream_errors")]
    pub max_upstream_errors: u32,

    /// Consecutive 401/403 answers before aborting a session.
    #[serde(default = "default_fatal_abort_threshold")]
    pub fatal_abort_threshold: u32,

    /// Number of settled hashes remembered for deduplication.
    #[serde(default = "default_settled_capacity")]
    pub settled_capacity: usize,
}

/// Merchant identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MerchantConfig {
    /// Merchant (Bakong account) id.
    #[serde(default)]
    pub id: String,

    /// Merchant name, truncated to 25 bytes when encoded.
    #[serde(default)]
    pub name: String,

    /// Merchant city, truncated to 15 bytes when encoded.
    #[serde(default)]
    pub city: String,

    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Store label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_label: Option<String>,

    /// Terminal label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_label: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settlement: SettlementConfig::default(),
            monitor: MonitorConfig::default(),
            merchant: MerchantConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            request_timeout_secs: default_request_timeout(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl fmt::Debug for SettlementConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementConfig")
            .field("base_url", &self.base_url)
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            deadline_secs: default_deadline(),
            max_backoff_secs: default_max_backoff(),
            max_upstream_errors: default_max_upstream_errors(),
            fatal_abort_threshold: default_fatal_abort_threshold(),
            settled_capacity: default_settled_capacity(),
        }
    }
}

/// Smallest accepted value, in seconds, for intervals and timeouts.
pub const MIN_INTERVAL_SECS: u64 = 1;

fn ensure_positive(field: &str, value: u64) -> crate::Result<()> {
    if value < MIN_INTERVAL_SECS {
        return Err(crate::Error::Config(format!(
            "{field} must be at least {MIN_INTERVAL_SECS}s, got {value}"
        )));
    }
    Ok(())
}

impl SettlementConfig {
    /// Per-call timeout, never below [`MIN_INTERVAL_SECS`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(MIN_INTERVAL_SECS))
    }

    /// Reject settings that would fail every call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for a zero timeout or in-flight cap.
    pub fn validate(&self) -> crate::Result<()> {
        ensure_positive("settlement.request_timeout_secs", self.request_timeout_secs)?;
        if self.max_in_flight == 0 {
            return Err(crate::Error::Config(
                "settlement.max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl MonitorConfig {
    /// Interval between pending checks, never below [`MIN_INTERVAL_SECS`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_INTERVAL_SECS))
    }

    /// Session lifetime.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Backoff ceiling, never below [`MIN_INTERVAL_SECS`].
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.max(MIN_INTERVAL_SECS))
    }

    /// Reject settings that would turn polling into a busy loop.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for a zero interval, deadline or
    /// backoff ceiling.
    pub fn validate(&self) -> crate::Result<()> {
        ensure_positive("monitor.poll_interval_secs", self.poll_interval_secs)?;
        ensure_positive("monitor.deadline_secs", self.deadline_secs)?;
        ensure_positive("monitor.max_backoff_secs", self.max_backoff_secs)
    }
}

impl MerchantConfig {
    /// Build a payment request for this merchant.
    #[must_use]
    pub fn payment_request(
        &self,
        currency: Currency,
        amount: Option<Decimal>,
        bill_number: Option<String>,
    ) -> PaymentRequest {
        let mut request = PaymentRequest::new(&*self.id, &*self.name, &*self.city, currency);
        if let Some(amount) = amount {
            request = request.with_amount(amount);
        }
        if let Some(bill_number) = bill_number {
            request = request.with_bill_number(bill_number);
        }
        if let Some(phone) = &self.phone {
            request = request.with_phone_number(phone.as_str());
        }
        if let Some(store_label) = &self.store_label {
            request = request.with_store_label(store_label.as_str());
        }
        if let Some(terminal_label) = &self.terminal_label {
            request = request.with_terminal_label(terminal_label.as_str());
        }
        request
    }
}

fn default_base_url() -> String {
    "https://api-bakong.nbc.gov.kh/v1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_request_timeout() -> u64 {
    10
}

const fn default_max_in_flight() -> usize {
    4
}

const fn default_poll_interval() -> u64 {
    5
}

const fn default_deadline() -> u64 {
    15 * 60
}

const fn default_max_backoff() -> u64 {
    60
}

const fn default_max_upstream_errors() -> u32 {
    5
}

const fn default_fatal_abort_threshold() -> u32 {
    2
}

const fn default_settled_capacity() -> usize {
    10_000
}

/// Default location of the configuration file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "khqr")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("khqr.toml"))
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settlement and monitor sections.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the first bad setting.
    pub fn validate(&self) -> crate::Result<()> {
        self.settlement.validate()?;
        self.monitor.validate()
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
