//! Downstream side effects fired when a payment settles.

use super::session::ExpiryReason;
use crate::settlement::PaymentStatusRecord;
use async_trait::async_trait;
use tracing::{error, info};

/// Booking-side reactions to settlement.
///
/// The monitor guarantees that for a given hash at most one of
/// `on_confirmed` / `on_expired` is called, and at most once.
#[async_trait]
pub trait PaymentHooks: Send + Sync {
    /// The payment was observed as PAID.
    async fn on_confirmed(&self, record: &PaymentStatusRecord);

    /// The payment will not happen; release the booking.
    async fn on_expired(&self, hash: &str, reason: ExpiryReason);

    /// Something needs an operator (bad credentials, paid after expiry, ...).
    async fn on_operator_alert(&self, hash: &str, message: &str);
}

/// Hooks that only log. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHooks;

#[async_trait]
impl PaymentHooks for LoggingHooks {
    async fn on_confirmed(&self, record: &PaymentStatusRecord) {
        info!(
            "Payment {} confirmed (transaction {})",
            record.hash,
            record.transaction_id.as_deref().unwrap_or("unknown")
        );
    }

    async fn on_expired(&self, hash: &str, reason: ExpiryReason) {
        info!("Payment {hash} expired: {reason}");
    }

    async fn on_operator_alert(&self, hash: &str, message: &str) {
        error!("Operator alert for {hash}: {message}");
    }
}
