//! Fuzz target for the [`DeviceBroker`] admission and buffer state
//!
//! Prevent slot leaks, double releases and stale reads under arbitrary
//! open/write/read/release sequences.
//!
//! # Strategy
//!
//! - Operation sequences: Arbitrary interleavings of opens, writes, reads
//!   and releases against handles opened so far
//! - Closed handles: Operations on released handles exercise `NotFound`
//! - Capacity: Pool size between 1 and 8
//!
//! # Invariants
//!
//! - Real broker results match the reference model exactly
//! - `available + open_sessions == capacity` after every operation
//! - At most one live buffer per open session
//! - Releasing every handle returns every slot and frees every buffer
//! - Shutdown after releasing everything reports no leak
//!
//! [`DeviceBroker`]: ebbchar_core::DeviceBroker

#![no_main]

use arbitrary::Arbitrary;
use ebbchar_harness::{ModelBroker, Operation, RealBroker};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    /// Pool size seed (mapped to 1..=8).
    capacity: u8,
    /// Operation sequence to apply.
    ops: Vec<Operation>,
}

fuzz_target!(|input: FuzzInput| {
    let capacity = (input.capacity % 8) as usize + 1;

    let mut model = ModelBroker::new(capacity);
    let Ok(mut real) = RealBroker::new(capacity) else {
        panic!("capacity {capacity} must be accepted");
    };

    for (i, op) in input.ops.iter().enumerate() {
        let expected = model.apply(op);
        let actual = real.apply(op);
        assert_eq!(expected, actual, "Divergence at operation {i}: {op:?}");

        let state = real.observable_state();
        assert_eq!(state, model.observable_state(), "State divergence after {i}: {op:?}");
        assert_eq!(state.available + state.open_sessions, capacity);
        assert!(state.live_buffers <= state.open_sessions);
    }

    if let Err(e) = real.release_all() {
        panic!("release_all failed: {e}");
    }
    let state = real.observable_state();
    assert_eq!(state.available, capacity, "slots leaked after releasing every handle");
    assert_eq!(state.live_buffers, 0, "buffers leaked after releasing every handle");
    assert_eq!(state.live_buffer_bytes, 0);

    if let Err(e) = real.shutdown() {
        panic!("shutdown after release_all failed: {e}");
    }
});
