//! # bakong-khqr
//!
//! KHQR payment codes for bookings, and settlement tracking on the Bakong
//! network.
//!
//! ## Overview
//!
//! A booking that needs paying gets a KHQR payload: an EMV QR string with a
//! CRC16 trailer. Its MD5 digest is the tracking hash, the only identifier
//! the settlement network ever sees. The payment monitor then polls the
//! settlement API by tracking hash until the payment is confirmed, expires,
//! or polling is aborted, and fires the booking hooks exactly once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   raw + hash   ┌──────────────────┐
//! │ khqr         │───────────────►│ monitor          │
//! │ encode/decode│                │ sessions, ledger │
//! └──────────────┘                └────────┬─────────┘
//!                                          │ check_status / bulk
//!                                          ▼
//!                                 ┌──────────────────┐
//!                                 │ settlement       │──► Bakong API
//!                                 │ client+transport │
//!                                 └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use bakong_khqr::khqr::{Currency, KhqrPayload, PaymentRequest};
//! use rust_decimal::Decimal;
//!
//! let request = PaymentRequest::new("m1", "Angkor Stay", "Siem Reap", Currency::Usd)
//!     .with_amount(Decimal::new(1250, 2))
//!     .with_bill_number("B100");
//! let payload = KhqrPayload::encode(&request)?;
//! assert!(payload.raw().contains("540512.50"));
//! assert_eq!(payload.md5_hash().len(), 32);
//! # Ok::<(), bakong_khqr::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod event;
pub mod khqr;
pub mod monitor;
pub mod settlement;

pub use config::AppConfig;
pub use error::{Error, ErrorCategory, Result};
pub use event::{MonitorEvent, MonitorEventsChannel};
pub use khqr::{Currency, KhqrPayload, PaymentRequest};
pub use monitor::{MonitorBuilder, MonitorTicket, PaymentHooks, PaymentMonitor, SessionOutcome};
pub use settlement::{PaymentStatus, PaymentStatusRecord, StatusClient};
