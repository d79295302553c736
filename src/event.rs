//! Monitor event system.

use crate::error::ErrorCategory;
use crate::monitor::ExpiryReason;
use crate::settlement::PaymentStatus;
use tokio::sync::broadcast;

/// Events emitted by the payment monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A polling session was created.
    SessionStarted {
        /// Tracking hash.
        hash: String,
    },

    /// A status check completed.
    StatusChecked {
        /// Tracking hash.
        hash: String,
        /// Reported status.
        status: PaymentStatus,
        /// Number of checks made so far.
        attempt: u32,
    },

    /// A status check failed.
    CheckFailed {
        /// Tracking hash.
        hash: String,
        /// Error category.
        category: ErrorCategory,
        /// Error message.
        message: String,
    },

    /// Payment confirmed; the confirmation hook ran.
    Confirmed {
        /// Tracking hash.
        hash: String,
        /// Settlement transaction id, if reported.
        transaction_id: Option<String>,
    },

    /// Payment expired; the cancellation hook ran.
    Expired {
        /// Tracking hash.
        hash: String,
        /// Why the session expired.
        reason: ExpiryReason,
    },

    /// Polling stopped after repeated credential failures.
    Aborted {
        /// Tracking hash.
        hash: String,
        /// Last error.
        reason: String,
    },

    /// Polling was cancelled by the caller.
    Cancelled {
        /// Tracking hash.
        hash: String,
    },

    /// Something an operator has to look at.
    OperatorAlert {
        /// Tracking hash.
        hash: String,
        /// Alert text.
        message: String,
    },
}

/// Channel for receiving monitor events.
pub type MonitorEventsChannel = broadcast::Receiver<MonitorEvent>;

/// Sender for monitor events.
pub type MonitorEventsSender = broadcast::Sender<MonitorEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (MonitorEventsSender, MonitorEventsChannel) {
    broadcast::channel(256)
}
