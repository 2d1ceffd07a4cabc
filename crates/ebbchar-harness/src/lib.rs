//! Test harness for the ebbchar broker.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation. Operations are
//! applied to both the model and the real broker (through [`RealBroker`]),
//! and their results and observable states are compared. The same pair
//! drives the fuzz target.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
mod real;

pub use model::{
    HandleIndex, ModelBroker, ObservableState, Operation, OperationError, OperationResult,
    SmallMessage,
};
pub use real::RealBroker;
