#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};

use slotflow::component::{Component, ComponentType, SlotBuilder};
use slotflow::graph::{Input, Output, Slot};

/// Process-wide evaluation order; only relative values matter.
static SEQUENCE: AtomicI64 = AtomicI64::new(1);

/// Publishes `input + 1` and records how often and when it ran.
pub struct Relay {
    input: Input<i64>,
    output: Output<i64>,
    runs: Output<i64>,
    stamp: Output<i64>,
    count: i64,
}

impl Component for Relay {
    fn recompute(&mut self) {
        self.count += 1;
        self.output.set(self.input.get().wrapping_add(1));
        self.runs.set(self.count);
        self.stamp.set(SEQUENCE.fetch_add(1, Ordering::SeqCst));
    }
}

impl ComponentType for Relay {
    fn create(builder: &mut SlotBuilder) -> Self {
        Relay {
            input: builder.input("input", "Value to relay"),
            output: builder.output("output", "input + 1"),
            runs: builder.output("runs", "Number of recomputes"),
            stamp: builder.output("stamp", "Sequence number of the last recompute"),
            count: 0,
        }
    }
}

/// Publishes `left + right`.
pub struct Join {
    left: Input<i64>,
    right: Input<i64>,
    sum: Output<i64>,
    runs: Output<i64>,
    stamp: Output<i64>,
    count: i64,
}

impl Component for Join {
    fn recompute(&mut self) {
        self.count += 1;
        self.sum.set(self.left.get().wrapping_add(self.right.get()));
        self.runs.set(self.count);
        self.stamp.set(SEQUENCE.fetch_add(1, Ordering::SeqCst));
    }
}

impl ComponentType for Join {
    fn create(builder: &mut SlotBuilder) -> Self {
        Join {
            left: builder.input("left", "First operand"),
            right: builder.input("right", "Second operand"),
            sum: builder.output("sum", "left + right"),
            runs: builder.output("runs", "Number of recomputes"),
            stamp: builder.output("stamp", "Sequence number of the last recompute"),
            count: 0,
        }
    }
}

/// Reads an `i64` slot without pulling it.
pub fn peek(slot: &Slot) -> i64 {
    slot.with_value::<i64, _>(|v| *v).unwrap()
}
