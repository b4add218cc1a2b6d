mod common;

use std::sync::Arc;

use common::{Join, Relay, peek};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;
use slotflow::component::ComponentNode;
use slotflow::config::{EngineConfig, EvaluationMode};
use slotflow::document::Document;
use slotflow::graph::{Node, Output};
use slotflow::scheduler::Scheduler;

fn document(mode: EvaluationMode, workers: usize) -> Document {
    Document::new(EngineConfig {
        mode,
        worker_count: workers,
        ..Default::default()
    })
    .unwrap()
}

fn add<C: slotflow::component::ComponentType>(doc: &mut Document, type_name: &str) -> Arc<ComponentNode> {
    let node = ComponentNode::create::<C>(type_name);
    doc.add_component(node.clone());
    node
}

fn link(doc: &mut Document, consumer: &Arc<ComponentNode>, input: &str, producer: &Arc<ComponentNode>, output: &str) {
    doc.link(&consumer.slot(input).unwrap(), &producer.slot(output).unwrap()).unwrap();
}

fn read(node: &ComponentNode, slot: &str) -> i64 {
    peek(&node.slot(slot).unwrap())
}

#[test]
fn test_scheduler_starts_and_stops_workers() {
    let mut scheduler = Scheduler::new();
    assert!(!scheduler.is_active());
    scheduler.init(3).unwrap();
    assert!(scheduler.is_active());
    assert_eq!(scheduler.worker_count(), 3);
    scheduler.init(1).unwrap();
    assert_eq!(scheduler.worker_count(), 1);
    scheduler.stop();
    assert!(!scheduler.is_active());
}

#[rstest]
fn test_chain_runs_in_dependency_order(#[values(1, 2, 4, 8)] workers: usize) {
    let mut doc = document(EvaluationMode::Push, workers);
    let a = add::<Relay>(&mut doc, "Relay");
    let b = add::<Relay>(&mut doc, "Relay");
    let c = add::<Relay>(&mut doc, "Relay");
    link(&mut doc, &b, "input", &a, "output");
    link(&mut doc, &c, "input", &b, "output");

    doc.step();
    assert_eq!(read(&c, "output"), 3);

    a.slot("input").unwrap().set_value(10i64);
    doc.step();
    assert_eq!(read(&c, "output"), 13);
    for node in [&a, &b, &c] {
        assert_eq!(read(node, "runs"), 2);
    }
    assert!(read(&a, "stamp") < read(&b, "stamp"));
    assert!(read(&b, "stamp") < read(&c, "stamp"));

    // Clean components are skipped.
    doc.step();
    assert_eq!(read(&c, "runs"), 2);
}

#[rstest]
#[case(1)]
#[case(4)]
fn test_diamond_joins_once_after_both_branches(#[case] workers: usize) {
    let mut doc = document(EvaluationMode::Push, workers);
    let a = add::<Relay>(&mut doc, "Relay");
    let b = add::<Relay>(&mut doc, "Relay");
    let c = add::<Relay>(&mut doc, "Relay");
    let d = add::<Join>(&mut doc, "Join");
    link(&mut doc, &b, "input", &a, "output");
    link(&mut doc, &c, "input", &a, "output");
    link(&mut doc, &d, "left", &b, "output");
    link(&mut doc, &d, "right", &c, "output");

    for step in 1..=5i64 {
        a.slot("input").unwrap().set_value(step);
        doc.step();
        assert_eq!(read(&d, "runs"), step);
        assert_eq!(read(&d, "sum"), 2 * (step + 2));
        assert!(read(&d, "stamp") > read(&b, "stamp"));
        assert!(read(&d, "stamp") > read(&c, "stamp"));
    }
}

/// Builds the same random DAG of `Join`s into `doc` for a given seed.
fn random_dag(doc: &mut Document, seed: u64, size: usize) -> Vec<Arc<ComponentNode>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut nodes: Vec<Arc<ComponentNode>> = Vec::with_capacity(size);
    for i in 0..size {
        let node = add::<Join>(doc, "Join");
        for input in ["left", "right"] {
            if i > 0 && rng.gen_bool(0.6) {
                let producer = nodes[rng.gen_range(0..i)].clone();
                link(doc, &node, input, &producer, "sum");
            } else {
                node.slot(input).unwrap().set_value(rng.gen_range(-100..100i64));
            }
        }
        nodes.push(node);
    }
    nodes
}

#[test]
fn test_push_and_pull_agree_on_random_graphs() {
    for seed in [3u64, 17, 2024] {
        let mut pull = document(EvaluationMode::Pull, 0);
        let mut push = document(EvaluationMode::Push, 4);
        let pulled = random_dag(&mut pull, seed, 40);
        let pushed = random_dag(&mut push, seed, 40);

        pull.step();
        push.step();
        let sums = |nodes: &[Arc<ComponentNode>]| nodes.iter().map(|n| read(n, "sum")).collect::<Vec<_>>();
        assert_eq!(sums(&pulled), sums(&pushed));

        for nodes in [&pulled, &pushed] {
            for node in nodes.iter().step_by(5) {
                let left = node.slot("left").unwrap();
                if left.parent().is_none() {
                    left.set_value(peek(&left) + 1);
                }
            }
        }
        pull.step();
        push.step();
        assert_eq!(sums(&pulled), sums(&pushed));
        assert!(pushed.iter().all(|n| read(n, "runs") <= 2));
    }
}

#[test]
fn test_switching_modes_keeps_results() {
    let mut doc = document(EvaluationMode::Pull, 2);
    let a = add::<Relay>(&mut doc, "Relay");
    let b = add::<Relay>(&mut doc, "Relay");
    link(&mut doc, &b, "input", &a, "output");
    doc.step();
    assert_eq!(read(&b, "output"), 2);

    doc.set_mode(EvaluationMode::Push).unwrap();
    assert!(doc.scheduler().is_some_and(|s| s.worker_count() == 2));
    a.slot("input").unwrap().set_value(5i64);
    doc.step();
    assert_eq!(read(&b, "output"), 7);

    doc.set_mode(EvaluationMode::Pull).unwrap();
    assert!(doc.scheduler().is_none());
}

/// A chain `a -> b -> c` of relays with a finished pass behind it.
fn settled_chain(workers: usize) -> (Scheduler, [Arc<ComponentNode>; 3]) {
    let a = ComponentNode::create::<Relay>("Relay");
    let b = ComponentNode::create::<Relay>("Relay");
    let c = ComponentNode::create::<Relay>("Relay");
    b.slot("input").unwrap().set_parent(Some(&a.slot("output").unwrap())).unwrap();
    c.slot("input").unwrap().set_parent(Some(&b.slot("output").unwrap())).unwrap();

    let mut scheduler = Scheduler::new();
    scheduler.init(workers).unwrap();
    scheduler.set_components(&[a.clone(), b.clone(), c.clone()]);
    scheduler.set_dirty();
    scheduler.wait_for_other_tasks(true);
    assert_eq!(read(&c, "output"), 3);
    (scheduler, [a, b, c])
}

#[rstest]
fn test_data_dirty_reopens_everything_downstream(#[values(0, 3)] workers: usize) {
    let (scheduler, [a, b, c]) = settled_chain(workers);

    a.slot("input").unwrap().set_value(4i64);
    scheduler.set_data_dirty(&a.slot("input").unwrap());
    scheduler.wait_for_other_tasks(true);

    assert_eq!(read(&b, "output"), 6);
    assert_eq!(read(&c, "output"), 7);
    for node in [&a, &b, &c] {
        assert_eq!(read(node, "runs"), 2);
        assert!(!node.is_dirty());
    }
    assert!(read(&a, "stamp") < read(&b, "stamp"));
    assert!(read(&b, "stamp") < read(&c, "stamp"));
}

#[test]
fn test_data_dirty_order_does_not_matter() {
    let (scheduler, [a, b, c]) = settled_chain(0);

    a.slot("input").unwrap().set_value(10i64);
    scheduler.set_data_dirty(&c.slot("input").unwrap());
    scheduler.set_data_dirty(&b.slot("input").unwrap());
    scheduler.set_data_dirty(&a.slot("input").unwrap());
    scheduler.wait_for_other_tasks(true);

    assert_eq!(read(&c, "output"), 13);
    for node in [&a, &b, &c] {
        assert_eq!(read(node, "runs"), 2);
    }
    assert!(read(&a, "stamp") < read(&b, "stamp"));
    assert!(read(&b, "stamp") < read(&c, "stamp"));
}

#[test]
fn test_data_ready_releases_consumers_once() {
    let a = ComponentNode::create::<Relay>("Relay");
    let b = ComponentNode::create::<Relay>("Relay");
    let e = ComponentNode::create::<Relay>("Relay");
    let d = ComponentNode::create::<Join>("Join");
    e.slot("input").unwrap().set_parent(Some(&b.slot("output").unwrap())).unwrap();
    d.slot("left").unwrap().set_parent(Some(&a.slot("output").unwrap())).unwrap();
    d.slot("right").unwrap().set_parent(Some(&e.slot("output").unwrap())).unwrap();
    a.slot("input").unwrap().set_value(5i64);

    let mut scheduler = Scheduler::new();
    scheduler.init(0).unwrap();
    scheduler.set_components(&[a.clone(), b.clone(), e.clone(), d.clone()]);
    scheduler.set_dirty();

    // `a` is produced outside the scheduler; publishing it twice counts once.
    Output::<i64>::from_slot(&a.slot("output").unwrap()).unwrap().get();
    let produced = a.slot("output").unwrap();
    scheduler.set_data_ready(&produced);
    scheduler.set_data_ready(&produced);
    scheduler.wait_for_other_tasks(true);

    assert_eq!(read(&d, "sum"), 6 + 2);
    assert_eq!(read(&a, "runs"), 1);
    assert_eq!(read(&d, "runs"), 1);
    assert!(read(&e, "stamp") < read(&d, "stamp"));
    assert!(!d.is_dirty());
}
