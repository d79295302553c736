//! Settlement API data types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement status of one tracking hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    /// Not yet observed by the settlement network.
    #[default]
    #[serde(alias = "NOT_FOUND")]
    Pending,
    /// Funds transferred.
    #[serde(alias = "SUCCESS")]
    Paid,
    /// Transfer failed.
    Failed,
    /// Code expired before payment.
    Expired,
}

impl PaymentStatus {
    /// Returns true for PAID, FAILED and EXPIRED.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Combine with a newer observation. A terminal status is final.
    #[must_use]
    pub fn advance(self, next: Self) -> Self {
        if self.is_terminal() {
            self
        } else {
            next
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Status of one payment as reported by the settlement API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRecord {
    /// Tracking hash the record belongs to.
    #[serde(default)]
    pub hash: String,
    /// Current status.
    #[serde(default)]
    pub status: PaymentStatus,
    /// Settlement transaction id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Amount paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    /// Currency of the amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// When the payment settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Payer account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account_id: Option<String>,
    /// Payee account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account_id: Option<String>,
}

impl PaymentStatusRecord {
    /// A record for a hash the settlement network has not seen yet.
    #[must_use]
    pub fn pending(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: PaymentStatus::Pending,
            transaction_id: None,
            amount: None,
            currency: None,
            paid_at: None,
            from_account_id: None,
            to_account_id: None,
        }
    }
}

/// Body of a bulk status request.
#[derive(Debug, Serialize)]
pub(crate) struct BulkStatusRequest<'a> {
    pub hashes: &'a [String],
}

/// Body of a bulk status response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct BulkStatusResponse {
    #[serde(default)]
    pub transactions: Vec<PaymentStatusRecord>,
}
