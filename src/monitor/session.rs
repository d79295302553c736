//! Polling session state.

use crate::settlement::{PaymentStatus, PaymentStatusRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why a session ended in EXPIRED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// The settlement network reported the code as expired.
    UpstreamExpired,
    /// The settlement network reported the payment as failed.
    UpstreamFailed,
    /// The polling deadline passed while the payment was still pending.
    DeadlineElapsed,
    /// The settlement API kept answering with unexpected errors.
    UpstreamUnavailable,
}

impl ExpiryReason {
    /// Status reported to the booking side for this reason.
    #[must_use]
    pub fn status(self) -> PaymentStatus {
        match self {
            Self::UpstreamFailed | Self::UpstreamUnavailable => PaymentStatus::Failed,
            Self::UpstreamExpired | Self::DeadlineElapsed => PaymentStatus::Expired,
        }
    }
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UpstreamExpired => "expired upstream",
            Self::UpstreamFailed => "failed upstream",
            Self::DeadlineElapsed => "deadline elapsed",
            Self::UpstreamUnavailable => "settlement API unavailable",
        };
        f.write_str(s)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Paid; the confirmation hook fired.
    Confirmed(PaymentStatusRecord),
    /// Expired or failed; the cancellation hook fired.
    Expired {
        /// Why.
        reason: ExpiryReason,
        /// Last record from the settlement API, if any.
        record: Option<PaymentStatusRecord>,
    },
    /// Stopped after repeated credential failures. No booking hook fired.
    Aborted {
        /// Last error.
        reason: String,
    },
    /// Cancelled by the caller. No booking hook fired.
    Cancelled,
}

impl SessionOutcome {
    /// Terminal payment status, for outcomes that settle the payment.
    #[must_use]
    pub fn status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Confirmed(_) => Some(PaymentStatus::Paid),
            Self::Expired { reason, .. } => Some(reason.status()),
            Self::Aborted { .. } | Self::Cancelled => None,
        }
    }

    /// Returns true if this outcome settles the payment (confirm or expire).
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status().is_some()
    }
}

/// State published to everyone watching a hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, first check not yet done.
    Created,
    /// Checking on an interval.
    Polling {
        /// Checks made so far.
        attempts_made: u32,
        /// Last status observed.
        last_status: PaymentStatus,
    },
    /// No further checks will run.
    Finished(SessionOutcome),
}

impl SessionState {
    /// What the payer is shown: PENDING until the payment settles.
    #[must_use]
    pub fn payer_status(&self) -> PaymentStatus {
        match self {
            Self::Finished(outcome) => outcome.status().unwrap_or(PaymentStatus::Pending),
            Self::Created | Self::Polling { .. } => PaymentStatus::Pending,
        }
    }

    /// Returns true once the session has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Bookkeeping owned by one polling task.
#[derive(Debug, Clone)]
pub struct PollingSession {
    /// Tracking hash.
    pub hash: String,
    /// When the session was created.
    pub started_at: Instant,
    /// Interval between pending checks.
    pub interval: Duration,
    /// When the session gives up.
    pub deadline: Instant,
    /// Checks made so far.
    pub attempts_made: u32,
    /// Last status observed.
    pub last_status: PaymentStatus,
}

impl PollingSession {
    /// Start a session now.
    #[must_use]
    pub fn new(hash: impl Into<String>, interval: Duration, lifetime: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            hash: hash.into(),
            started_at,
            interval,
            deadline: started_at + lifetime,
            attempts_made: 0,
            last_status: PaymentStatus::Pending,
        }
    }

    /// Returns true once the deadline has passed.
    #[must_use]
    pub fn deadline_reached(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Published view of this session.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::Polling {
            attempts_made: self.attempts_made,
            last_status: self.last_status,
        }
    }
}

/// Handle returned by [`crate::monitor::PaymentMonitor::monitor`].
///
/// Every caller monitoring the same hash gets a ticket on the same session
/// and observes the same outcome.
#[derive(Debug, Clone)]
pub struct MonitorTicket {
    hash: String,
    created: bool,
    state: watch::Receiver<SessionState>,
}

impl MonitorTicket {
    pub(crate) fn new(hash: &str, created: bool, state: watch::Receiver<SessionState>) -> Self {
        Self {
            hash: hash.to_string(),
            created,
            state,
        }
    }

    /// Ticket for a hash that settled before this call.
    pub(crate) fn finished(hash: &str, outcome: SessionOutcome) -> Self {
        let (_, state) = watch::channel(SessionState::Finished(outcome));
        Self::new(hash, false, state)
    }

    /// Tracking hash.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns true if this call created the session, false if it joined an
    /// existing or already finished one.
    #[must_use]
    pub fn created(&self) -> bool {
        self.created
    }

    /// Current session state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Status to show the payer.
    #[must_use]
    pub fn payer_status(&self) -> PaymentStatus {
        self.state.borrow().payer_status()
    }

    /// Wait until the session finishes.
    pub async fn wait(&mut self) -> SessionOutcome {
        loop {
            if let SessionState::Finished(outcome) = &*self.state.borrow_and_update() {
                return outcome.clone();
            }
            if self.state.changed().await.is_err() {
                return match &*self.state.borrow() {
                    SessionState::Finished(outcome) => outcome.clone(),
                    _ => SessionOutcome::Cancelled,
                };
            }
        }
    }
}
