//! Payment monitor.
//!
//! Turns "has hash X been paid?" into a booking state change. Each monitored
//! hash gets one polling session:
//!
//! ```text
//!            monitor(hash)
//!                 │
//!                 ▼
//!           ┌──────────┐
//!           │ CREATED  │  immediate first check
//!           └────┬─────┘
//!                ▼
//!           ┌──────────┐  PENDING: wait poll_interval
//!           │ POLLING  │◄─┐ transient error: back off
//!           └────┬─────┘──┘
//!     ┌──────────┼──────────────┬───────────────┐
//!     ▼          ▼              ▼               ▼
//! CONFIRMED   EXPIRED        ABORTED        CANCELLED
//! on_confirmed on_expired    operator alert  nothing
//! ```
//!
//! The [`SessionRegistry`] makes sure a hash has at most one session and is
//! confirmed or expired at most once, whether the answer came from polling,
//! [`PaymentMonitor::verify`] or [`PaymentMonitor::verify_bulk`].

mod backoff;
mod hooks;
mod registry;
mod scheduler;
mod session;

pub use backoff::Backoff;
pub use hooks::{LoggingHooks, PaymentHooks};
pub use registry::{RegistryStats, SessionRegistry};
pub use scheduler::{MonitorBuilder, PaymentMonitor};
pub use session::{
    ExpiryReason, MonitorTicket, PollingSession, SessionOutcome, SessionState,
};
