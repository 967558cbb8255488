//! Property tests for the terminal emulator: arbitrary byte soup and
//! arbitrary resize interleavings must never panic or push the cursor out
//! of the grid.

use proptest::prelude::*;

use stevedore::term::TerminalEmulator;

#[derive(Debug, Clone)]
enum Op {
    Feed(Vec<u8>),
    Resize(u16, u16),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..256).prop_map(Op::Feed),
        (1u16..=200, 1u16..=100).prop_map(|(w, h)| Op::Resize(w, h)),
    ]
}

proptest! {
    #[test]
    fn arbitrary_bytes_keep_the_cursor_in_bounds(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..512), 0..8)
    ) {
        let emulator = TerminalEmulator::new(80, 24);
        for chunk in &chunks {
            emulator.process(chunk);
            let snapshot = emulator.snapshot();
            prop_assert!(snapshot.cursor.x < snapshot.width);
            prop_assert!(snapshot.cursor.y < snapshot.height);
        }
    }

    #[test]
    fn resizes_interleaved_with_output_stay_consistent(
        ops in proptest::collection::vec(op_strategy(), 1..24)
    ) {
        let emulator = TerminalEmulator::new(80, 24);
        for op in &ops {
            match op {
                Op::Feed(bytes) => emulator.process(bytes),
                Op::Resize(w, h) => emulator.resize(*w, *h),
            }
            let snapshot = emulator.snapshot();
            prop_assert_eq!(snapshot.cells.len(), snapshot.height);
            for row in &snapshot.cells {
                prop_assert_eq!(row.len(), snapshot.width);
            }
            prop_assert!(snapshot.cursor.x < snapshot.width);
            prop_assert!(snapshot.cursor.y < snapshot.height);
        }
    }
}
