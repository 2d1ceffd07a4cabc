//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! broker behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelBroker    RealBroker      Compare
//!      (reference)   (DeviceBroker)   Results
//! ```

use ebbchar_harness::{
    ModelBroker, Operation, OperationError, OperationResult, RealBroker, SmallMessage,
};
use proptest::prelude::*;

/// Strategy for generating SmallMessage.
fn small_message_strategy() -> impl Strategy<Value = SmallMessage> {
    (any::<u8>(), any::<u8>()).prop_map(|(seed, size_class)| SmallMessage { seed, size_class })
}

/// Strategy for generating operations.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let handle = any::<u8>();

    prop_oneof![
        // Weight towards the buffer operations
        3 => Just(Operation::Open),
        4 => (handle.clone(), small_message_strategy())
            .prop_map(|(handle, content)| Operation::Write { handle, content }),
        4 => (handle.clone(), 0..300u16)
            .prop_map(|(handle, max_len)| Operation::Read { handle, max_len }),
        2 => handle.prop_map(|handle| Operation::Release { handle }),
    ]
}

proptest! {
    /// Verify that operation results match between model and real broker.
    ///
    /// This is the core model-based test. It generates random operation
    /// sequences and asserts that both return the same results and expose
    /// the same slot and buffer accounting after every step.
    #[test]
    fn prop_model_matches_real(
        capacity in 1..6usize,
        ops in prop::collection::vec(operation_strategy(), 0..80)
    ) {
        let mut model = ModelBroker::new(capacity);
        let mut real = RealBroker::new(capacity).unwrap();

        for (i, op) in ops.iter().enumerate() {
            let model_result = model.apply(op);
            let real_result = real.apply(op);

            prop_assert_eq!(
                &model_result,
                &real_result,
                "Divergence at operation {}: {:?}",
                i, op
            );
            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "State divergence after operation {}: {:?}",
                i, op
            );
        }

        // Invariant: releasing everything leaves no slot or buffer behind
        prop_assert_eq!(real.release_all(), Ok(()));
        let state = real.observable_state();
        prop_assert_eq!(state.available, capacity);
        prop_assert_eq!(state.live_buffers, 0);
        prop_assert!(real.shutdown().is_ok());
    }

    /// Verify the admission bound holds after any operation sequence.
    #[test]
    fn prop_open_sessions_never_exceed_capacity(
        capacity in 1..6usize,
        ops in prop::collection::vec(operation_strategy(), 0..120)
    ) {
        let mut real = RealBroker::new(capacity).unwrap();

        for op in &ops {
            let result = real.apply(op);
            prop_assert!(
                !matches!(result, OperationResult::Error(OperationError::Unexpected)),
                "Unexpected broker failure on {:?}",
                op
            );

            let state = real.observable_state();
            prop_assert!(state.open_sessions <= capacity);
            prop_assert_eq!(state.available + state.open_sessions, capacity);
            prop_assert!(state.live_buffers <= state.open_sessions);
        }
    }

    /// Verify that a message is delivered at most once.
    #[test]
    fn prop_message_read_at_most_once(
        content in small_message_strategy(),
        max_len in 0..300u16
    ) {
        let mut real = RealBroker::new(1).unwrap();
        prop_assert_eq!(real.apply(&Operation::Open), OperationResult::Opened);

        real.apply(&Operation::Write { handle: 0, content: content.clone() });

        let mut expected = content.to_bytes();
        expected.truncate(max_len as usize);
        prop_assert_eq!(
            real.apply(&Operation::Read { handle: 0, max_len }),
            OperationResult::Data(expected)
        );
        prop_assert_eq!(
            real.apply(&Operation::Read { handle: 0, max_len }),
            OperationResult::Error(OperationError::Empty)
        );
    }
}

#[cfg(test)]
mod smoke_tests {
    use super::*;

    /// The capacity-two scenario, step by step.
    #[test]
    fn capacity_two_scenario() {
        let mut model = ModelBroker::new(2);
        let mut real = RealBroker::new(2).unwrap();

        let script = [
            (Operation::Open, OperationResult::Opened),
            (Operation::Open, OperationResult::Opened),
            (Operation::Open, OperationResult::Error(OperationError::Busy)),
            (Operation::Release { handle: 0 }, OperationResult::Released),
            (Operation::Open, OperationResult::Opened),
        ];

        for (op, expected) in script {
            assert_eq!(model.apply(&op), expected, "model on {op:?}");
            assert_eq!(real.apply(&op), expected, "real on {op:?}");
        }
    }

    /// Repeated writes never accumulate buffers.
    #[test]
    fn repeated_writes_hold_one_buffer() {
        let mut real = RealBroker::new(1).unwrap();
        real.apply(&Operation::Open);

        for seed in 0..10 {
            let content = SmallMessage { seed, size_class: 3 };
            assert_eq!(
                real.apply(&Operation::Write { handle: 0, content }),
                OperationResult::Written(255)
            );
        }

        let state = real.observable_state();
        assert_eq!(state.live_buffers, 1);
        assert_eq!(state.live_buffer_bytes, 255);
    }
}
