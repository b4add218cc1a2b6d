//! Graph vertices, edges and the dirty-flag cascade.

mod slot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::component::ComponentNode;

pub use slot::{AnyEditGuard, EditGuard, Input, Output, Slot, SlotFlags, SlotHandle};

#[derive(Default)]
struct NodeLinks {
    inputs: Vec<Weak<dyn Node>>,
    outputs: Vec<Weak<dyn Node>>,
}

/// Edge sets and flags shared by every graph vertex.
pub struct NodeCore {
    self_weak: Weak<dyn Node>,
    links: Mutex<NodeLinks>,
    dirty: AtomicBool,
    updating: AtomicBool,
}

impl NodeCore {
    /// Fresh vertices start dirty: their first evaluation is owed.
    pub fn new(self_weak: Weak<dyn Node>) -> Self {
        Self {
            self_weak,
            links: Mutex::new(NodeLinks::default()),
            dirty: AtomicBool::new(true),
            updating: AtomicBool::new(false),
        }
    }

    fn connect(from: &NodeCore, to: &NodeCore) {
        {
            let mut links = from.links.lock().unwrap();
            if !links.outputs.iter().any(|w| Weak::ptr_eq(w, &to.self_weak)) {
                links.outputs.push(to.self_weak.clone());
            }
        }
        let mut links = to.links.lock().unwrap();
        if !links.inputs.iter().any(|w| Weak::ptr_eq(w, &from.self_weak)) {
            links.inputs.push(from.self_weak.clone());
        }
    }

    fn disconnect(from: &NodeCore, to: &NodeCore) {
        from.links
            .lock()
            .unwrap()
            .outputs
            .retain(|w| !Weak::ptr_eq(w, &to.self_weak));
        to.links
            .lock()
            .unwrap()
            .inputs
            .retain(|w| !Weak::ptr_eq(w, &from.self_weak));
    }

    pub fn inputs(&self) -> Vec<Arc<dyn Node>> {
        self.links.lock().unwrap().inputs.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn outputs(&self) -> Vec<Arc<dyn Node>> {
        self.links.lock().unwrap().outputs.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub(crate) fn clean_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

/// A graph vertex: slots and components.
pub trait Node: Send + Sync {
    fn core(&self) -> &NodeCore;
    fn as_node(&self) -> &dyn Node;
    /// Brings the vertex up to date. Only called through `update_if_dirty`.
    fn update(&self);
    fn label(&self) -> String;

    fn into_slot(self: Arc<Self>) -> Option<Arc<Slot>> {
        None
    }

    fn into_component(self: Arc<Self>) -> Option<Arc<ComponentNode>> {
        None
    }

    fn add_input(&self, input: &dyn Node) {
        NodeCore::connect(input.core(), self.core());
    }

    fn add_output(&self, output: &dyn Node) {
        NodeCore::connect(self.core(), output.core());
    }

    fn remove_input(&self, input: &dyn Node) {
        NodeCore::disconnect(input.core(), self.core());
    }

    fn remove_output(&self, output: &dyn Node) {
        NodeCore::disconnect(self.core(), output.core());
    }

    fn inputs(&self) -> Vec<Arc<dyn Node>> {
        self.core().inputs()
    }

    fn outputs(&self) -> Vec<Arc<dyn Node>> {
        self.core().outputs()
    }

    fn is_dirty(&self) -> bool {
        self.core().is_dirty()
    }

    /// Marks this vertex and everything downstream dirty. A no-op when already dirty.
    fn set_dirty_value(&self, caller: Option<&dyn Node>) {
        if self.core().dirty.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(caller) = caller {
            log::trace!("{} dirtied by {}", self.label(), caller.label());
        }
        self.notify_outputs();
    }

    /// Propagates dirtiness to every output without touching this vertex's own flag.
    fn notify_outputs(&self) {
        for output in self.core().outputs() {
            output.set_dirty_value(Some(self.as_node()));
        }
    }

    /// Marks this vertex dirty and propagates even when it already was.
    fn force_dirty(&self) {
        self.core().dirty.store(true, Ordering::Release);
        self.notify_outputs();
    }

    /// Runs `update` when dirty, unless this vertex is already inside its own update.
    fn update_if_dirty(&self) {
        let core = self.core();
        if !core.is_dirty() {
            return;
        }
        if core.updating.swap(true, Ordering::AcqRel) {
            log::trace!("{} is already updating", self.label());
            return;
        }
        self.update();
        core.dirty.store(false, Ordering::Release);
        core.updating.store(false, Ordering::Release);
    }
}
