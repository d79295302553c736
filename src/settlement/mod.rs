//! Settlement network status API.
//!
//! The settlement network has no push channel: the only way to learn that a
//! KHQR code was paid is to ask, by tracking hash.
//!
//! # Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | `/check_transaction_by_hash?hash=..` | Status of one hash |
//! | POST | `/check_transactions_bulk` | Status of up to 50 hashes |
//!
//! All calls carry a bearer token. The API is rate limited and only
//! accepts whitelisted caller IPs, so a 401/403 usually means an operator
//! has to fix credentials or network setup.

mod client;
mod transport;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{StatusClient, MAX_BULK_HASHES};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
pub use types::{PaymentStatus, PaymentStatusRecord};
