//! End-to-end tests for bakong-khqr.
//!
//! These tests run the public API the way a booking backend would: encode a
//! payload, hand its tracking hash to the monitor, let the (fake) settlement
//! network report progress, and check the booking hooks.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test e2e
//! ```
//!
//! Time-driven scenarios run on a paused tokio clock, so a 15 minute
//! deadline completes instantly.

mod harness;
mod monitor;
mod payloads;

pub use harness::{test_config, FakeSettlement, RecordingHooks, TestHarness};
