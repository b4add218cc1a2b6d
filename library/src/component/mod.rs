//! Components: units of computation owning slots.

pub mod generic;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock, Weak};

use log::{debug, error, warn};
use once_cell::sync::OnceCell;

use crate::class_registry::ClassId;
use crate::error::EngineError;
use crate::graph::{Node, NodeCore, Slot, SlotFlags, SlotHandle};
use crate::shared::shared_tables;
use crate::types::{SlotValue, ValueTrait, value_trait};

pub use generic::{
    Bundle, BundleOp, BundleSlot, BundleSlotType, DispatchTable, GenericComponent, GenericOperation, Placeholder,
    TypeList,
};

/// Behaviour of a component. The engine owns it behind a [`ComponentNode`].
pub trait Component: Send + 'static {
    fn recompute(&mut self);

    fn begin_step(&mut self) {}

    fn end_step(&mut self) {}

    /// Runs once after creation, before the component is handed out.
    fn post_create(&mut self, _node: &ComponentNode) {}

    /// Component-specific veto on a parent link for one of its slots.
    fn accepts_parent(&self, _slot: &Slot, _parent: &Slot) -> bool {
        true
    }

    /// Slot that creates a bundle when something is connected to it.
    fn placeholder(&self) -> Option<&Arc<Slot>> {
        None
    }

    /// Builds the bundle for a connection to the placeholder and returns the slot to parent to `source`.
    ///
    /// `number` asks for a specific bundle number, as when a saved document is restored.
    fn create_bundle(
        &mut self,
        source: &Slot,
        _builder: &mut SlotBuilder,
        _number: Option<usize>,
    ) -> Result<Arc<Slot>, EngineError> {
        Err(EngineError::InvalidConnection(format!(
            "component does not create bundles for {}",
            source.name()
        )))
    }

    /// Number of the bundle whose connected input is `slot`.
    fn bundle_number(&self, _slot: &Slot) -> Option<usize> {
        None
    }

    /// Slot the bundle holding `input` goes in front of. `None` means in front of the placeholder.
    fn bundle_anchor(&self, _input: &Slot) -> Option<Arc<Slot>> {
        None
    }

    /// Called after `slot` lost its parent. Returns slots the component no longer owns.
    fn slot_disconnected(&mut self, _slot: &Slot) -> Vec<Arc<Slot>> {
        Vec::new()
    }
}

/// A component type the factory can instantiate.
pub trait ComponentType: Component + Sized {
    fn create(builder: &mut SlotBuilder) -> Self;
}

/// Declares slots while a component is being built.
pub struct SlotBuilder {
    owner: Weak<ComponentNode>,
    component: String,
    names: HashSet<String>,
    slots: Vec<Arc<Slot>>,
}

impl SlotBuilder {
    fn new(owner: Weak<ComponentNode>, component: String, taken: impl IntoIterator<Item = String>) -> Self {
        Self {
            owner,
            component,
            names: taken.into_iter().collect(),
            slots: Vec::new(),
        }
    }

    pub fn input<T: SlotValue>(&mut self, name: &str, help: &str) -> SlotHandle<T> {
        self.typed(name, help, SlotFlags::input())
    }

    pub fn input_with<T: SlotValue>(&mut self, name: &str, help: &str, initial: T) -> SlotHandle<T> {
        let handle = self.input(name, help);
        if let Some(mut value) = handle.slot().edit::<T>() {
            *value = initial;
        }
        handle.slot().unset();
        handle
    }

    pub fn output<T: SlotValue>(&mut self, name: &str, help: &str) -> SlotHandle<T> {
        self.typed(name, help, SlotFlags::output())
    }

    fn typed<T: SlotValue>(&mut self, name: &str, help: &str, flags: SlotFlags) -> SlotHandle<T> {
        let slot = self.slot(value_trait::<T>(), flags, name, help);
        match SlotHandle::from_slot(&slot) {
            Some(handle) => handle,
            None => unreachable!("slot created from the handle's own value trait"),
        }
    }

    /// Creates a type-erased slot. A duplicate name is reported and the slot is left unregistered.
    pub fn slot(
        &mut self,
        value_trait: Arc<dyn ValueTrait>,
        flags: SlotFlags,
        name: &str,
        help: &str,
    ) -> Arc<Slot> {
        let slot = Slot::new(self.owner.clone(), name, help, flags, value_trait);
        if self.names.insert(name.to_string()) {
            self.slots.push(slot.clone());
        } else {
            let err = EngineError::DuplicateSlotName {
                component: self.component.clone(),
                slot: name.to_string(),
            };
            error!("{}", err);
        }
        slot
    }
}

/// Engine-side wrapper of a component: identity, slot list and graph vertex.
pub struct ComponentNode {
    core: NodeCore,
    index: u64,
    type_name: String,
    name: RwLock<String>,
    class: OnceCell<ClassId>,
    slots: RwLock<Vec<Arc<Slot>>>,
    component: Mutex<Box<dyn Component>>,
    self_weak: Weak<ComponentNode>,
}

impl ComponentNode {
    /// Builds `C`, stamps a process-unique index and runs its post-create hook.
    pub fn create<C: ComponentType>(type_name: &str) -> Arc<ComponentNode> {
        let index = shared_tables().next_index.fetch_add(1, Ordering::Relaxed);
        let mut slots = Vec::new();
        let node = Arc::new_cyclic(|weak: &Weak<ComponentNode>| {
            let mut builder = SlotBuilder::new(weak.clone(), format!("{}#{}", type_name, index), Vec::new());
            let component = C::create(&mut builder);
            slots = builder.slots;
            let vertex: Weak<dyn Node> = weak.clone();
            ComponentNode {
                core: NodeCore::new(vertex),
                index,
                type_name: type_name.to_string(),
                name: RwLock::new(format!("{} {}", type_name, index)),
                class: OnceCell::new(),
                slots: RwLock::new(Vec::new()),
                component: Mutex::new(Box::new(component)),
                self_weak: weak.clone(),
            }
        });
        node.attach_slots(None, slots);
        {
            let mut component = node.component.lock().unwrap();
            component.post_create(&node);
        }
        debug!("Created component {}", node.label());
        node
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().unwrap() = name.into();
    }

    pub fn class_id(&self) -> Option<ClassId> {
        self.class.get().copied()
    }

    pub(crate) fn set_class_id(&self, class: ClassId) {
        let _ = self.class.set(class);
    }

    pub fn slots(&self) -> Vec<Arc<Slot>> {
        self.slots.read().unwrap().clone()
    }

    pub fn slot(&self, name: &str) -> Option<Arc<Slot>> {
        self.slots.read().unwrap().iter().find(|s| s.name() == name).cloned()
    }

    pub fn input_slots(&self) -> Vec<Arc<Slot>> {
        self.slots.read().unwrap().iter().filter(|s| s.is_input()).cloned().collect()
    }

    pub fn output_slots(&self) -> Vec<Arc<Slot>> {
        self.slots
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.is_output() && !s.is_input())
            .cloned()
            .collect()
    }

    pub fn placeholder(&self) -> Option<Arc<Slot>> {
        self.component.lock().unwrap().placeholder().cloned()
    }

    pub fn begin_step(&self) {
        self.component.lock().unwrap().begin_step();
    }

    pub fn end_step(&self) {
        self.component.lock().unwrap().end_step();
    }

    pub fn accepts_parent(&self, slot: &Slot, parent: &Slot) -> bool {
        self.component.lock().unwrap().accepts_parent(slot, parent)
    }

    /// Runs `f` with exclusive access to the component.
    pub fn with_component<R>(&self, f: impl FnOnce(&mut dyn Component) -> R) -> R {
        let mut component = self.component.lock().unwrap();
        f(&mut **component)
    }

    /// Connects `consumer` (a slot of this component) to `producer`.
    ///
    /// Connections to the placeholder create a bundle first; the returned slot is the one actually linked.
    pub fn connect(&self, consumer: &Arc<Slot>, producer: &Arc<Slot>) -> Result<Arc<Slot>, EngineError> {
        if !self.is_placeholder(consumer) {
            consumer.set_parent(Some(producer))?;
            return Ok(consumer.clone());
        }
        self.grow_bundle(consumer, producer, None)
    }

    /// Like [`ComponentNode::connect`] on the placeholder, but the new bundle gets `number`.
    pub fn connect_bundle(
        &self,
        placeholder: &Arc<Slot>,
        producer: &Arc<Slot>,
        number: usize,
    ) -> Result<Arc<Slot>, EngineError> {
        if !self.is_placeholder(placeholder) {
            return Err(EngineError::InvalidConnection(format!(
                "{} is not the placeholder of {}",
                placeholder.name(),
                self.label()
            )));
        }
        self.grow_bundle(placeholder, producer, Some(number))
    }

    /// Bundle number of `slot` when it is the connected input of a bundle.
    pub fn bundle_number(&self, slot: &Slot) -> Option<usize> {
        self.component.lock().unwrap().bundle_number(slot)
    }

    fn is_placeholder(&self, slot: &Arc<Slot>) -> bool {
        self.placeholder().is_some_and(|p| Arc::ptr_eq(&p, slot))
    }

    fn grow_bundle(
        &self,
        consumer: &Arc<Slot>,
        producer: &Arc<Slot>,
        number: Option<usize>,
    ) -> Result<Arc<Slot>, EngineError> {
        let taken = self.slots.read().unwrap().iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        let mut builder = SlotBuilder::new(self.self_weak.clone(), self.label(), taken);
        let (bundle_input, anchor) = {
            let mut component = self.component.lock().unwrap();
            if !component.accepts_parent(consumer, producer) {
                return Err(EngineError::InvalidConnection(format!(
                    "{} does not accept {}",
                    self.label(),
                    producer.value_trait().type_name()
                )));
            }
            let input = component.create_bundle(producer, &mut builder, number)?;
            let anchor = component.bundle_anchor(&input).unwrap_or_else(|| consumer.clone());
            (input, anchor)
        };
        self.attach_slots(Some(&anchor), builder.slots);

        if let Err(err) = bundle_input.set_parent(Some(producer)) {
            let orphaned = self.component.lock().unwrap().slot_disconnected(&bundle_input);
            self.detach_slots(&orphaned);
            return Err(err);
        }
        Ok(bundle_input)
    }

    /// Removes the parent of `consumer` and drops any bundle it was the sole occupant of.
    pub fn disconnect(&self, consumer: &Arc<Slot>) -> Result<(), EngineError> {
        consumer.set_parent(None)?;
        let removed = self.component.lock().unwrap().slot_disconnected(consumer);
        if !removed.is_empty() {
            self.detach_slots(&removed);
            self.force_dirty();
        }
        Ok(())
    }

    /// Inserts slots before `anchor` (or at the end) and wires their edges.
    fn attach_slots(&self, anchor: Option<&Arc<Slot>>, new_slots: Vec<Arc<Slot>>) {
        for slot in &new_slots {
            if slot.is_input() {
                self.add_input(&**slot);
            } else if slot.is_output() {
                self.add_output(&**slot);
            }
        }
        let mut slots = self.slots.write().unwrap();
        let position = anchor
            .and_then(|a| slots.iter().position(|s| Arc::ptr_eq(s, a)))
            .unwrap_or(slots.len());
        slots.splice(position..position, new_slots);
    }

    /// Unlinks slots from parents, children and this component, then forgets them.
    fn detach_slots(&self, removed: &[Arc<Slot>]) {
        for slot in removed {
            self.unlink_slot(slot);
            self.remove_input(&**slot);
            self.remove_output(&**slot);
        }
        self.slots
            .write()
            .unwrap()
            .retain(|s| !removed.iter().any(|r| Arc::ptr_eq(r, s)));
        debug!("Removed {} slot(s) from {}", removed.len(), self.label());
    }

    /// Unlinks every slot of this component from the rest of the graph.
    pub fn detach_all(&self) {
        for slot in self.slots() {
            self.unlink_slot(&slot);
        }
    }

    /// Drops the parent of `slot` and disconnects every child reading from it.
    fn unlink_slot(&self, slot: &Arc<Slot>) {
        if let Err(err) = slot.set_parent(None) {
            warn!("{}: could not unlink {}: {}", self.label(), slot.name(), err);
        }
        for child in slot.children() {
            let result = match child.owner() {
                Some(owner) => owner.disconnect(&child),
                None => child.set_parent(None),
            };
            if let Err(err) = result {
                warn!("{}: could not disconnect {} from {}: {}", self.label(), child.name(), slot.name(), err);
            }
        }
    }
}

impl Node for ComponentNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn as_node(&self) -> &dyn Node {
        self
    }

    /// Pulls every input, recomputes, then marks the outputs clean.
    fn update(&self) {
        for input in self.input_slots() {
            input.update_if_dirty();
        }
        self.component.lock().unwrap().recompute();
        for output in self.output_slots() {
            output.core().clean_dirty();
        }
    }

    fn label(&self) -> String {
        format!("{}#{}", self.type_name, self.index)
    }

    fn into_component(self: Arc<Self>) -> Option<Arc<ComponentNode>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Input, Output};

    struct Twice {
        input: Input<i32>,
        output: Output<i32>,
    }

    impl Component for Twice {
        fn recompute(&mut self) {
            self.output.set(self.input.get() * 2);
        }
    }

    impl ComponentType for Twice {
        fn create(builder: &mut SlotBuilder) -> Self {
            let input = builder.input("input", "value to double");
            let _ignored: Input<f64> = builder.input("input", "same name again");
            Twice {
                input,
                output: builder.output("output", "doubled value"),
            }
        }
    }

    #[test]
    fn duplicate_slot_names_are_rejected() {
        let node = ComponentNode::create::<Twice>("Twice");
        let names: Vec<_> = node.slots().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["input", "output"]);
    }

    #[test]
    fn indices_increase_monotonically() {
        let a = ComponentNode::create::<Twice>("Twice");
        let b = ComponentNode::create::<Twice>("Twice");
        assert!(b.index() > a.index());
    }

    #[test]
    fn pulling_an_output_recomputes_the_owner() {
        let node = ComponentNode::create::<Twice>("Twice");
        node.slot("input").unwrap().set_value(21);
        let output = SlotHandle::<i32>::from_slot(&node.slot("output").unwrap()).unwrap();
        assert_eq!(output.get(), 42);
        assert!(!node.is_dirty());
    }

    #[test]
    fn linking_wires_edges_and_mirrors_values() {
        let producer = ComponentNode::create::<Twice>("Twice");
        let consumer = ComponentNode::create::<Twice>("Twice");
        producer.slot("input").unwrap().set_value(3);
        let linked = consumer
            .connect(&consumer.slot("input").unwrap(), &producer.slot("output").unwrap())
            .unwrap();
        assert_eq!(linked.name(), "input");

        let output = SlotHandle::<i32>::from_slot(&consumer.slot("output").unwrap()).unwrap();
        assert_eq!(output.get(), 12);

        consumer.disconnect(&linked).unwrap();
        assert!(linked.parent().is_none());
        assert!(producer.slot("output").unwrap().children().is_empty());
    }
}
