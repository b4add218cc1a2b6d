mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use common::{Relay, peek};
use slotflow::component::ComponentNode;
use slotflow::components::Constant;
use slotflow::graph::{Node, NodeCore, Output, Slot, SlotFlags};
use slotflow::types::{Animation, value_trait};

fn constant<T: slotflow::types::SlotValue>() -> Arc<ComponentNode> {
    ComponentNode::create::<Constant<T>>("Constant")
}

/// Counts the dirty notifications it receives.
struct Watcher {
    core: NodeCore,
    hits: AtomicUsize,
}

impl Watcher {
    fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Watcher>| {
            let vertex: Weak<dyn Node> = weak.clone();
            Watcher {
                core: NodeCore::new(vertex),
                hits: AtomicUsize::new(0),
            }
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Node for Watcher {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn as_node(&self) -> &dyn Node {
        self
    }

    fn update(&self) {}

    fn label(&self) -> String {
        "watcher".to_string()
    }

    fn set_dirty_value(&self, _caller: Option<&dyn Node>) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_linking_is_symmetric_and_idempotent() {
    let a = constant::<i32>();
    let b = constant::<i32>();
    let producer = a.slot("output").unwrap();
    let consumer = b.slot("value").unwrap();

    consumer.set_parent(Some(&producer)).unwrap();
    consumer.set_parent(Some(&producer)).unwrap();

    assert_eq!(producer.outputs().len(), 1);
    assert_eq!(consumer.inputs().len(), 1);
    assert!(Arc::ptr_eq(&consumer.parent().unwrap(), &producer));
    assert_eq!(producer.children().len(), 1);

    consumer.set_parent(None).unwrap();
    assert!(producer.outputs().is_empty());
    assert!(consumer.inputs().is_empty());
    assert!(producer.children().is_empty());
}

#[test]
fn test_changes_dirty_everything_downstream() {
    let a = constant::<i32>();
    let b = constant::<i32>();
    let value = a.slot("value").unwrap();
    value.set_value(3);
    b.connect(&b.slot("value").unwrap(), &a.slot("output").unwrap()).unwrap();

    let output = Output::<i32>::from_slot(&b.slot("output").unwrap()).unwrap();
    assert_eq!(output.get(), 3);
    assert!(!b.is_dirty());
    assert!(!output.slot().is_dirty());

    value.set_value(4);
    assert!(a.is_dirty());
    assert!(b.is_dirty());
    assert!(output.slot().is_dirty());
    assert_eq!(output.get(), 4);
}

#[test]
fn test_linked_slot_reports_parent_counter() {
    let a = constant::<i32>();
    let b = constant::<i32>();
    let producer = a.slot("output").unwrap();
    let consumer = b.slot("value").unwrap();
    consumer.set_parent(Some(&producer)).unwrap();

    let output = Output::<i32>::from_slot(&b.slot("output").unwrap()).unwrap();
    let mut last = consumer.counter();
    for value in 1..=4 {
        a.slot("value").unwrap().set_value(value);
        assert_eq!(output.get(), value);
        assert!(producer.counter() > last);
        assert_eq!(consumer.counter(), producer.counter());
        last = producer.counter();
    }

    consumer.set_parent(None).unwrap();
    assert!(consumer.counter() < producer.counter());
}

#[test]
fn test_edits_are_coalesced_into_one_change() {
    let list = constant::<Vec<i32>>();
    let value = list.slot("value").unwrap();
    let output = Output::<Vec<i32>>::from_slot(&list.slot("output").unwrap()).unwrap();
    output.get();
    assert!(!list.is_dirty());

    let watcher = Watcher::new();
    value.add_output(&*watcher);
    let before = value.counter();
    {
        let mut edit = value.edit::<Vec<i32>>().unwrap();
        edit.push(1);
        edit.push(2);
        edit.push(3);
        assert_eq!(watcher.hits(), 0);
    }
    assert_eq!(value.counter(), before + 1);
    assert_eq!(watcher.hits(), 1);
    assert!(list.is_dirty());
    assert_eq!(output.get(), vec![1, 2, 3]);

    {
        let mut edit = value.edit_any();
        if let Some(items) = edit.downcast_mut::<Vec<i32>>() {
            items.clear();
            items.extend([7, 8]);
        }
    }
    assert_eq!(value.counter(), before + 2);
    assert_eq!(watcher.hits(), 2);
    assert_eq!(output.get(), vec![7, 8]);

    // A mistyped edit is refused without counting as a change.
    assert!(value.edit::<f64>().is_none());
    assert_eq!(value.counter(), before + 2);
    assert_eq!(watcher.hits(), 2);
}

#[test]
fn test_set_flag_follows_writes_and_overrides() {
    let number = constant::<i32>();
    let value = number.slot("value").unwrap();
    assert!(!value.is_set());
    assert!(!value.should_persist());

    value.set_value(3);
    assert!(value.is_set());
    assert!(value.should_persist());

    value.unset();
    assert!(!value.should_persist());
    assert_eq!(number.slot("value").unwrap().with_value::<i32, _>(|v| *v), Some(3));

    value.force_set();
    assert!(value.should_persist());

    let output = number.slot("output").unwrap();
    Output::<i32>::from_slot(&output).unwrap().get();
    assert!(output.is_set());
    assert!(!output.should_persist());
}

#[test]
fn test_vector_parent_feeds_single_consumers() {
    let list = constant::<Vec<i32>>();
    list.slot("value").unwrap().set_value(vec![7, 8, 9]);

    let same = constant::<i32>();
    same.connect(&same.slot("value").unwrap(), &list.slot("output").unwrap()).unwrap();
    let converted = constant::<f64>();
    converted.connect(&converted.slot("value").unwrap(), &list.slot("output").unwrap()).unwrap();

    assert_eq!(Output::<i32>::from_slot(&same.slot("output").unwrap()).unwrap().get(), 7);
    assert_eq!(Output::<f64>::from_slot(&converted.slot("output").unwrap()).unwrap().get(), 7.0);
}

#[test]
fn test_incompatible_parent_is_rejected() {
    let text = constant::<String>();
    let number = constant::<i32>();
    let consumer = number.slot("value").unwrap();
    assert!(consumer.set_parent(Some(&text.slot("output").unwrap())).is_err());
    assert!(consumer.parent().is_none());
}

#[test]
fn test_outputs_cannot_take_parents() {
    let a = constant::<i32>();
    let b = constant::<i32>();
    assert!(!b.slot("output").unwrap().valid_parent(&a.slot("output").unwrap()));
}

#[test]
fn test_animation_copies_only_from_animation() {
    let keys = Animation::new().with_key(0.0, 1.5f32).with_key(2.0, 3.0);
    let animated = constant::<Animation<f32>>();
    animated.slot("value").unwrap().set_value(keys.clone());
    let plain = constant::<f32>();
    plain.slot("value").unwrap().set_value(4.0f32);

    let target = constant::<Animation<f32>>();
    let input = target.slot("value").unwrap();
    let output = Output::<Animation<f32>>::from_slot(&target.slot("output").unwrap()).unwrap();

    input.set_parent(Some(&animated.slot("output").unwrap())).unwrap();
    assert_eq!(output.get(), keys);

    input.set_parent(Some(&plain.slot("output").unwrap())).unwrap();
    assert_eq!(output.get().key_count(), 0);
}

#[test]
fn test_pulling_a_chain_recomputes_each_stage_once() {
    let source = Slot::new(std::sync::Weak::new(), "A", "", SlotFlags::output(), value_trait::<i64>());
    let b = ComponentNode::create::<Relay>("Relay");
    let c = ComponentNode::create::<Relay>("Relay");
    b.slot("input").unwrap().set_parent(Some(&source)).unwrap();
    c.slot("input").unwrap().set_parent(Some(&b.slot("output").unwrap())).unwrap();

    let result = Output::<i64>::from_slot(&c.slot("output").unwrap()).unwrap();
    assert_eq!(result.get(), 2);
    let (b_runs, c_runs) = (peek(&b.slot("runs").unwrap()), peek(&c.slot("runs").unwrap()));

    source.set_value(10i64);
    assert_eq!(result.get(), 12);
    assert_eq!(peek(&b.slot("runs").unwrap()), b_runs + 1);
    assert_eq!(peek(&c.slot("runs").unwrap()), c_runs + 1);
    assert!(peek(&b.slot("stamp").unwrap()) < peek(&c.slot("stamp").unwrap()));

    // Nothing changed: pulling again is free.
    assert_eq!(result.get(), 12);
    assert_eq!(peek(&c.slot("runs").unwrap()), c_runs + 1);
}
