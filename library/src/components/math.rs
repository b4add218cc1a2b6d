use crate::component::{Component, ComponentType, SlotBuilder};
use crate::graph::{Input, Output};

pub struct AddIntegers {
    a: Input<i32>,
    b: Input<i32>,
    sum: Output<i32>,
}

impl Component for AddIntegers {
    fn recompute(&mut self) {
        self.sum.set(self.a.get().wrapping_add(self.b.get()));
    }
}

impl ComponentType for AddIntegers {
    fn create(builder: &mut SlotBuilder) -> Self {
        AddIntegers {
            a: builder.input("a", "First operand"),
            b: builder.input("b", "Second operand"),
            sum: builder.output("sum", "a + b"),
        }
    }
}

pub struct ScaleReals {
    input: Input<Vec<f64>>,
    factor: Input<f64>,
    result: Output<Vec<f64>>,
}

impl Component for ScaleReals {
    fn recompute(&mut self) {
        let factor = self.factor.get();
        let scaled: Vec<f64> = self.input.with(|values| values.iter().map(|v| v * factor).collect());
        self.result.set(scaled);
    }
}

impl ComponentType for ScaleReals {
    fn create(builder: &mut SlotBuilder) -> Self {
        ScaleReals {
            input: builder.input("input", "Values to scale"),
            factor: builder.input_with("factor", "Multiplier", 1.0),
            result: builder.output("result", "Scaled values"),
        }
    }
}
