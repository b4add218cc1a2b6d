use crate::component::{Component, ComponentType, SlotBuilder};
use crate::graph::{Input, Output};
use crate::types::SlotValue;

/// Publishes a user-set value.
pub struct Constant<T> {
    value: Input<T>,
    output: Output<T>,
}

impl<T: SlotValue> Component for Constant<T> {
    fn recompute(&mut self) {
        let value = self.value.get();
        self.output.set(value);
    }
}

impl<T: SlotValue> ComponentType for Constant<T> {
    fn create(builder: &mut SlotBuilder) -> Self {
        Constant {
            value: builder.input("value", "Value to publish"),
            output: builder.output("output", "The published value"),
        }
    }
}
