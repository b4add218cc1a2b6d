use std::any::Any;
use std::ops::Add;

use crate::component::{Bundle, BundleOp, BundleSlot, BundleSlotType, GenericOperation, SlotBuilder};
use crate::types::ValueType;

/// Element-wise sum; a single-element side is broadcast over the other.
pub struct VectorAdd;

fn broadcast<T: Copy>(a: &[T], b: &[T], op: impl Fn(T, T) -> T) -> Vec<T> {
    match (a.len(), b.len()) {
        (0, _) | (_, 0) => Vec::new(),
        (1, _) => b.iter().map(|&y| op(a[0], y)).collect(),
        (_, 1) => a.iter().map(|&x| op(x, b[0])).collect(),
        _ => a.iter().zip(b).map(|(&x, &y)| op(x, y)).collect(),
    }
}

impl GenericOperation for VectorAdd {
    type Types = (Vec<i32>, Vec<f32>, Vec<f64>);

    const PLACEHOLDER: &'static str = "input";
    const PLACEHOLDER_HELP: &'static str = "Connect a list to create a new sum";

    fn create(_builder: &mut SlotBuilder) -> Self {
        VectorAdd
    }

    fn bundle_slots() -> Vec<BundleSlot> {
        vec![
            BundleSlot::input(BundleSlotType::Connected, "A", "First operand"),
            BundleSlot::input(BundleSlotType::Connected, "B", "Second operand"),
            BundleSlot::output(BundleSlotType::Connected, "result", "A + B"),
        ]
    }
}

impl<T> BundleOp<Vec<T>> for VectorAdd
where
    T: ValueType + Copy + Add<Output = T>,
{
    fn run(&mut self, bundle: &Bundle) {
        let (Some(a), Some(b), Some(result)) =
            (bundle.get::<Vec<T>>(0), bundle.get::<Vec<T>>(1), bundle.get::<Vec<T>>(2))
        else {
            return;
        };
        let (a, b) = (a.get(), b.get());
        result.set(broadcast(&a, &b, |x, y| x + y));
    }
}

/// Number of elements of each connected list.
pub struct ListSize;

impl GenericOperation for ListSize {
    type Types = (Vec<i32>, Vec<i64>, Vec<f32>, Vec<f64>, Vec<bool>, Vec<String>);

    const PLACEHOLDER: &'static str = "list";
    const PLACEHOLDER_HELP: &'static str = "Connect a list to measure it";

    fn create(_builder: &mut SlotBuilder) -> Self {
        ListSize
    }

    fn bundle_slots() -> Vec<BundleSlot> {
        vec![
            BundleSlot::input(BundleSlotType::Connected, "list", "List to measure"),
            BundleSlot::output(BundleSlotType::fixed::<i32>(), "size", "Number of elements"),
        ]
    }
}

impl<T: ValueType> BundleOp<Vec<T>> for ListSize {
    fn run(&mut self, bundle: &Bundle) {
        let (Some(list), Some(size)) = (bundle.get::<Vec<T>>(0), bundle.get::<i32>(1)) else {
            return;
        };
        size.set(list.with(|l| l.len() as i32));
    }
}

/// Each bundle outputs the concatenation of its list and every list connected before it.
pub struct ConcatLists {
    running: Option<Box<dyn Any + Send>>,
}

impl GenericOperation for ConcatLists {
    type Types = (Vec<i32>, Vec<f64>, Vec<String>);

    const PLACEHOLDER: &'static str = "list";
    const PLACEHOLDER_HELP: &'static str = "Connect a list to append it";
    const SINGLE_TYPE: bool = true;

    fn create(_builder: &mut SlotBuilder) -> Self {
        ConcatLists { running: None }
    }

    fn bundle_slots() -> Vec<BundleSlot> {
        vec![
            BundleSlot::input(BundleSlotType::Connected, "list", "List to append"),
            BundleSlot::output(BundleSlotType::Connected, "concatenated", "Lists up to and including this one"),
        ]
    }

    fn begin_dispatch(&mut self) {
        self.running = None;
    }
}

impl<T: ValueType> BundleOp<Vec<T>> for ConcatLists {
    fn run(&mut self, bundle: &Bundle) {
        let (Some(list), Some(output)) = (bundle.get::<Vec<T>>(0), bundle.get::<Vec<T>>(1)) else {
            return;
        };
        let mut running = self
            .running
            .take()
            .and_then(|r| r.downcast::<Vec<T>>().ok())
            .map(|r| *r)
            .unwrap_or_default();
        list.with(|l| running.extend_from_slice(l));
        output.set(running.clone());
        self.running = Some(Box::new(running));
    }
}
