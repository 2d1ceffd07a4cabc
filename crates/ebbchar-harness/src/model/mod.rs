//! Reference model for model-based testing.
//!
//! The model is a simplified implementation that captures the intended
//! behavior of the broker without atomics, locks or permits. It serves as
//! the oracle against which the real broker is verified.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Behavior not mechanism: Captures WHAT, not HOW
//! - Deterministic: Same inputs produce same outputs

mod broker;
pub mod operation;

pub use broker::{ModelBroker, ObservableState};
pub use operation::{HandleIndex, Operation, OperationError, OperationResult, SmallMessage};
