//! Command-line interface definition.

use bakong_khqr::config::{default_config_path, AppConfig};
use bakong_khqr::khqr::Currency;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// KHQR payment codes and Bakong settlement tracking.
#[derive(Parser, Debug)]
#[command(name = "khqr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, global = true, env = "KHQR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Settlement API base URL.
    #[arg(long, global = true, env = "KHQR_BASE_URL")]
    pub base_url: Option<String>,

    /// Settlement API bearer token.
    #[arg(long, global = true, env = "KHQR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log level.
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a payment request as a KHQR payload.
    Encode(EncodeArgs),

    /// Decode and verify a KHQR payload.
    Decode {
        /// Raw KHQR string.
        raw: String,
    },

    /// Check the settlement status of one tracking hash.
    Check {
        /// Tracking hash (MD5 of the payload).
        hash: String,
    },

    /// Check the settlement status of many tracking hashes.
    CheckBulk {
        /// Tracking hashes.
        #[arg(required = true)]
        hashes: Vec<String>,
    },

    /// Poll a tracking hash until it settles.
    Watch {
        /// Tracking hash to watch.
        hash: String,

        /// Seconds between checks.
        #[arg(long, env = "KHQR_POLL_INTERVAL", value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        /// Seconds before giving up.
        #[arg(long, env = "KHQR_DEADLINE", value_parser = clap::value_parser!(u64).range(1..))]
        deadline: Option<u64>,
    },
}

/// Merchant and payment fields for `encode`.
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Amount to collect; omit for an "any amount" code.
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Currency (USD or KHR).
    #[arg(long, default_value = "USD")]
    pub currency: Currency,

    /// Booking bill number.
    #[arg(long)]
    pub bill_number: Option<String>,

    /// Merchant account id.
    #[arg(long, env = "KHQR_MERCHANT_ID")]
    pub merchant_id: Option<String>,

    /// Merchant name.
    #[arg(long, env = "KHQR_MERCHANT_NAME")]
    pub merchant_name: Option<String>,

    /// Merchant city.
    #[arg(long, env = "KHQR_MERCHANT_CITY")]
    pub merchant_city: Option<String>,

    /// Merchant phone number.
    #[arg(long, env = "KHQR_MERCHANT_PHONE")]
    pub phone: Option<String>,

    /// Store label.
    #[arg(long, env = "KHQR_STORE_LABEL")]
    pub store_label: Option<String>,

    /// Terminal label.
    #[arg(long, env = "KHQR_TERMINAL_LABEL")]
    pub terminal_label: Option<String>,
}

impl Cli {
    /// Build the effective configuration: file, then environment and flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded,
    /// or if the merged settings are invalid.
    pub fn load_config(&self) -> color_eyre::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    AppConfig::from_file(&path)?
                } else {
                    AppConfig::default()
                }
            }
        };

        if let Some(base_url) = &self.base_url {
            config.settlement.base_url.clone_from(base_url);
        }
        if let Some(token) = &self.token {
            config.settlement.token.clone_from(token);
        }
        if let Some(log_level) = &self.log_level {
            config.log_level.clone_from(log_level);
        }

        match &self.command {
            Command::Encode(args) => args.apply(&mut config),
            Command::Watch {
                interval, deadline, ..
            } => {
                if let Some(interval) = interval {
                    config.monitor.poll_interval_secs = *interval;
                }
                if let Some(deadline) = deadline {
                    config.monitor.deadline_secs = *deadline;
                }
            }
            Command::Decode { .. } | Command::Check { .. } | Command::CheckBulk { .. } => {}
        }

        config.validate()?;
        Ok(config)
    }
}

impl EncodeArgs {
    fn apply(&self, config: &mut AppConfig) {
        let merchant = &mut config.merchant;
        if let Some(id) = &self.merchant_id {
            merchant.id.clone_from(id);
        }
        if let Some(name) = &self.merchant_name {
            merchant.name.clone_from(name);
        }
        if let Some(city) = &self.merchant_city {
            merchant.city.clone_from(city);
        }
        if self.phone.is_some() {
            merchant.phone.clone_from(&self.phone);
        }
        if self.store_label.is_some() {
            merchant.store_label.clone_from(&self.store_label);
        }
        if self.terminal_label.is_some() {
            merchant.terminal_label.clone_from(&self.terminal_label);
        }
    }
}
