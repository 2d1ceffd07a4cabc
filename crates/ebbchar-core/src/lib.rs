//! ebbchar core.
//!
//! Session admission and buffer ownership for a character device that lets
//! a bounded number of clients hold it open at once.
//!
//! ## Architecture
//!
//! ```text
//! DeviceBroker            (open / write / read / release facade)
//!   ├─ AdmissionController (bounded, non-blocking slot pool)
//!   └─ Session             (one permit + at most one MessageBuffer)
//!        └─ MessageBuffer  (single-consumption owned bytes)
//! ```
//!
//! Per handle the lifecycle is `Unopened -> Open -> Closed`. While open, a
//! session toggles between `NoBuffer` and `Buffered` on write and read.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admission;
pub mod broker;
pub mod buffer;
pub mod config;
pub mod error;
pub mod session;

pub use admission::{AdmissionController, DEFAULT_CAPACITY, Permit};
pub use broker::{BrokerStats, DeviceBroker};
pub use buffer::{BufferLedger, MessageBuffer};
pub use config::BrokerConfig;
pub use error::BrokerError;
pub use session::{Session, SessionId, SessionState};
