use crate::component::{Component, ComponentType, SlotBuilder};
use crate::graph::{Input, Output};

/// Root of a document: publishes the current step and time.
pub struct TimeSource {
    timestep: Input<f64>,
    time: Output<f64>,
    step: Output<i64>,
    steps: i64,
}

impl Component for TimeSource {
    fn begin_step(&mut self) {
        self.steps += 1;
    }

    fn recompute(&mut self) {
        let timestep = self.timestep.get();
        self.step.set(self.steps);
        self.time.set(self.steps as f64 * timestep);
    }
}

impl ComponentType for TimeSource {
    fn create(builder: &mut SlotBuilder) -> Self {
        TimeSource {
            timestep: builder.input_with("timestep", "Seconds per step", 0.04),
            time: builder.output("time", "Time of the current step in seconds"),
            step: builder.output("step", "Number of steps run so far"),
            steps: 0,
        }
    }
}
