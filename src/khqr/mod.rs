//! KHQR payload encoding.
//!
//! A KHQR code is an EMV merchant-presented QR string: a fixed sequence of
//! TLV fields terminated by a CRC16 checksum.
//!
//! ```text
//! PaymentRequest
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ TLV fields 00..62   │  fixed order, truncated values
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐
//! │ append "6304"       │
//! │ append CRC16 (hex)  │
//! └─────────┬───────────┘
//!           ▼
//!    raw ──► MD5 ──► tracking hash (sent to the settlement API)
//! ```
//!
//! The bill number never leaves this process; the settlement network only
//! ever sees the tracking hash.

pub mod crc;
pub mod decode;
mod hash;
mod payload;
pub mod tlv;

pub use decode::{decode, verify_checksum, DecodedKhqr};
pub use hash::{is_tracking_hash, tracking_hash, TRACKING_HASH_LEN};
pub use payload::{Currency, KhqrPayload, PaymentRequest, MERCHANT_GUID};
