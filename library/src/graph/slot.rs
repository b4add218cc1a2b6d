use std::any::Any;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use log::warn;

use crate::component::ComponentNode;
use crate::error::EngineError;
use crate::graph::{Node, NodeCore};
use crate::types::{ConversionRegistry, SlotValue, TypeCategory, ValueNode, ValueTrait, value_trait};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotFlags {
    pub input: bool,
    pub output: bool,
    pub persistent: bool,
    pub read_only: bool,
}

impl SlotFlags {
    pub fn input() -> Self {
        Self {
            input: true,
            persistent: true,
            ..Default::default()
        }
    }

    pub fn output() -> Self {
        Self {
            output: true,
            read_only: true,
            ..Default::default()
        }
    }
}

/// A named, typed value holder owned by one component and wired into the graph.
pub struct Slot {
    core: NodeCore,
    name: String,
    help: String,
    owner: Weak<ComponentNode>,
    input: bool,
    output: bool,
    persistent: AtomicBool,
    read_only: AtomicBool,
    value_trait: Arc<dyn ValueTrait>,
    value: RwLock<Box<dyn Any + Send + Sync>>,
    counter: AtomicU64,
    is_set: AtomicBool,
    parent: RwLock<Option<Weak<Slot>>>,
    setting_parent: AtomicBool,
    self_weak: Weak<Slot>,
}

impl Slot {
    pub fn new(
        owner: Weak<ComponentNode>,
        name: impl Into<String>,
        help: impl Into<String>,
        flags: SlotFlags,
        value_trait: Arc<dyn ValueTrait>,
    ) -> Arc<Self> {
        let name = name.into();
        let help = help.into();
        Arc::new_cyclic(|weak: &Weak<Slot>| {
            let node: Weak<dyn Node> = weak.clone();
            Slot {
                core: NodeCore::new(node),
                name,
                help,
                owner,
                input: flags.input,
                output: flags.output,
                persistent: AtomicBool::new(flags.persistent),
                read_only: AtomicBool::new(flags.read_only),
                value: RwLock::new(value_trait.new_value()),
                value_trait,
                counter: AtomicU64::new(0),
                is_set: AtomicBool::new(false),
                parent: RwLock::new(None),
                setting_parent: AtomicBool::new(false),
                self_weak: weak.clone(),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn owner(&self) -> Option<Arc<ComponentNode>> {
        self.owner.upgrade()
    }

    pub fn is_input(&self) -> bool {
        self.input
    }

    pub fn is_output(&self) -> bool {
        self.output
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Relaxed)
    }

    pub fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::Relaxed);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    pub fn value_trait(&self) -> &Arc<dyn ValueTrait> {
        &self.value_trait
    }

    /// Version counter. A parented slot reports its parent's counter.
    pub fn counter(&self) -> u64 {
        match self.parent() {
            Some(parent) => parent.counter(),
            None => self.counter.load(Ordering::Acquire),
        }
    }

    pub fn is_set(&self) -> bool {
        self.is_set.load(Ordering::Acquire)
    }

    pub fn unset(&self) {
        self.is_set.store(false, Ordering::Release);
    }

    pub fn force_set(&self) {
        self.is_set.store(true, Ordering::Release);
    }

    /// Only explicit values that are not mirrored from a parent are saved.
    pub fn should_persist(&self) -> bool {
        self.is_set() && self.is_persistent() && !self.is_read_only() && self.parent().is_none()
    }

    pub fn parent(&self) -> Option<Arc<Slot>> {
        self.parent.read().unwrap().as_ref().and_then(Weak::upgrade)
    }

    /// Slots that mirror this one.
    pub fn children(&self) -> Vec<Arc<Slot>> {
        self.core
            .outputs()
            .into_iter()
            .filter_map(|node| node.into_slot())
            .filter(|child| child.parent().is_some_and(|p| std::ptr::eq(&*p, self)))
            .collect()
    }

    /// Type-erased read access to the current value, without pulling.
    pub fn value(&self) -> RwLockReadGuard<'_, Box<dyn Any + Send + Sync>> {
        self.value.read().unwrap()
    }

    pub fn with_value<T: SlotValue, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.value.read().unwrap();
        let value: &dyn Any = &**guard;
        value.downcast_ref::<T>().map(f)
    }

    /// Replaces the value. Returns `false` on a type mismatch.
    pub fn set_value<T: SlotValue>(&self, value: T) -> bool {
        let Some(mut guard) = self.edit::<T>() else {
            warn!("Slot '{}' does not hold a {}", self.name, T::display_name());
            return false;
        };
        *guard = value;
        true
    }

    /// Opens a write-coalescing edit: dropping the guard bumps the counter and notifies outputs once.
    pub fn edit_any(&self) -> AnyEditGuard<'_> {
        AnyEditGuard {
            slot: self,
            guard: Some(self.value.write().unwrap()),
        }
    }

    pub fn edit<T: SlotValue>(&self) -> Option<EditGuard<'_, T>> {
        if self.with_value::<T, _>(|_| ()).is_none() {
            return None;
        }
        Some(EditGuard {
            inner: self.edit_any(),
            _marker: PhantomData,
        })
    }

    fn value_changed(&self) {
        self.counter.fetch_add(1, Ordering::AcqRel);
        self.is_set.store(true, Ordering::Release);
        self.notify_outputs();
    }

    /// Whether `parent` may feed this slot: types must be copyable and the owner must agree.
    pub fn valid_parent(&self, parent: &Slot) -> bool {
        if std::ptr::eq(parent, self) || !self.input {
            return false;
        }
        let compatible = self.value_trait.category() == TypeCategory::Animation
            || ConversionRegistry::global()
                .read()
                .unwrap()
                .can_copy(&*self.value_trait, &*parent.value_trait);
        if !compatible {
            return false;
        }
        match self.owner() {
            Some(owner) => owner.accepts_parent(self, parent),
            None => true,
        }
    }

    /// Rebinds the parent link. Guarded against reentrant cascades.
    pub fn set_parent(&self, parent: Option<&Arc<Slot>>) -> Result<(), EngineError> {
        if self.setting_parent.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.rebind_parent(parent);
        self.setting_parent.store(false, Ordering::Release);
        result
    }

    fn rebind_parent(&self, parent: Option<&Arc<Slot>>) -> Result<(), EngineError> {
        if let Some(parent) = parent {
            if !self.valid_parent(parent) {
                warn!("Rejected link {} -> {}", parent.label(), self.label());
                return Err(EngineError::InvalidConnection(format!(
                    "{} cannot take {} ({}) as parent",
                    self.label(),
                    parent.label(),
                    parent.value_trait.type_name()
                )));
            }
        }

        let previous = self.parent.write().unwrap().take().and_then(|w| w.upgrade());
        if let Some(previous) = previous {
            self.remove_input(&*previous);
        }
        if let Some(parent) = parent {
            *self.parent.write().unwrap() = Some(Arc::downgrade(parent));
            self.add_input(&**parent);
            log::debug!("Linked {} -> {}", parent.label(), self.label());
        }
        self.force_dirty();
        Ok(())
    }

    fn copy_from_parent(&self, parent: &Slot) -> bool {
        let source = parent.value.read().unwrap();
        let mut target = self.value.write().unwrap();
        let copied = ConversionRegistry::global().read().unwrap().copy(
            &*self.value_trait,
            &mut **target,
            &*parent.value_trait,
            &**source,
        );
        if !copied {
            warn!(
                "Cannot copy {} ({}) into {} ({})",
                parent.label(),
                parent.value_trait.type_name(),
                self.label(),
                self.value_trait.type_name()
            );
        }
        copied
    }

    pub fn write_value(&self, node: &mut ValueNode) {
        let value = self.value.read().unwrap();
        self.value_trait.write_value(&**value, node);
    }

    pub fn read_value(&self, node: &ValueNode) -> Result<(), EngineError> {
        {
            let mut value = self.value.write().unwrap();
            self.value_trait.read_value(&mut **value, node)?;
        }
        self.value_changed();
        Ok(())
    }

    pub fn arc(&self) -> Option<Arc<Slot>> {
        self.self_weak.upgrade()
    }
}

impl Node for Slot {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn as_node(&self) -> &dyn Node {
        self
    }

    fn update(&self) {
        if let Some(parent) = self.parent() {
            parent.update_if_dirty();
            self.copy_from_parent(&parent);
        } else if self.output && !self.input {
            if let Some(owner) = self.owner() {
                owner.update_if_dirty();
            }
        }
    }

    fn label(&self) -> String {
        match self.owner() {
            Some(owner) => format!("{}.{}", owner.label(), self.name),
            None => self.name.clone(),
        }
    }

    fn into_slot(self: Arc<Self>) -> Option<Arc<Slot>> {
        Some(self)
    }
}

pub struct AnyEditGuard<'a> {
    slot: &'a Slot,
    guard: Option<RwLockWriteGuard<'a, Box<dyn Any + Send + Sync>>>,
}

impl Deref for AnyEditGuard<'_> {
    type Target = dyn Any + Send + Sync;

    fn deref(&self) -> &Self::Target {
        match &self.guard {
            Some(guard) => &***guard,
            None => unreachable!("edit guard used after release"),
        }
    }
}

impl DerefMut for AnyEditGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.guard {
            Some(guard) => &mut ***guard,
            None => unreachable!("edit guard used after release"),
        }
    }
}

impl Drop for AnyEditGuard<'_> {
    fn drop(&mut self) {
        // Release the value before notifying so downstream pulls can read it.
        drop(self.guard.take());
        self.slot.value_changed();
    }
}

pub struct EditGuard<'a, T> {
    inner: AnyEditGuard<'a>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: SlotValue> Deref for EditGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        let value: &dyn Any = &*self.inner;
        value.downcast_ref::<T>().expect("edit guard type is checked on creation")
    }
}

impl<T: SlotValue> DerefMut for EditGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        let value: &mut dyn Any = &mut *self.inner;
        value.downcast_mut::<T>().expect("edit guard type is checked on creation")
    }
}

/// Typed view over a slot, held by components for their static slots.
pub struct SlotHandle<T> {
    slot: Arc<Slot>,
    _marker: PhantomData<fn() -> T>,
}

pub type Input<T> = SlotHandle<T>;
pub type Output<T> = SlotHandle<T>;

impl<T> Clone for SlotHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: SlotValue> SlotHandle<T> {
    /// `None` when the slot holds another type.
    pub fn from_slot(slot: &Arc<Slot>) -> Option<Self> {
        (slot.value_trait().full_type_id() == value_trait::<T>().full_type_id()).then(|| Self {
            slot: slot.clone(),
            _marker: PhantomData,
        })
    }

    pub fn slot(&self) -> &Arc<Slot> {
        &self.slot
    }

    /// Pulls the slot and reads its value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.slot.update_if_dirty();
        let guard = self.slot.value.read().unwrap();
        let value: &dyn Any = &**guard;
        f(value.downcast_ref::<T>().expect("slot handle type is checked on creation"))
    }

    /// Pulls the slot and clones its value.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn set(&self, value: T) {
        self.slot.set_value(value);
    }

    pub fn edit(&self) -> EditGuard<'_, T> {
        EditGuard {
            inner: self.slot.edit_any(),
            _marker: PhantomData,
        }
    }
}
