//! Components that grow typed slot bundles when something is connected to their placeholder.
//!
//! The accepted types are a closed list fixed at compile time (`GenericOperation::Types`). The list is folded
//! once per operation type into a [`DispatchTable`] mapping each full type id to the monomorphized
//! [`BundleOp::run`] for that type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentType, SlotBuilder};
use crate::error::EngineError;
use crate::graph::{Slot, SlotFlags, SlotHandle};
use crate::types::{FullTypeId, SlotValue, ValueTrait, value_trait};

/// Value type of placeholder slots. Never holds data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placeholder;

crate::declare_value_type!(Placeholder, "any");

#[derive(Clone)]
pub enum BundleSlotType {
    /// The type of the connected source.
    Connected,
    /// The single element type of the connected source.
    ConnectedElement,
    Fixed(Arc<dyn ValueTrait>),
}

impl BundleSlotType {
    pub fn fixed<T: SlotValue>() -> Self {
        BundleSlotType::Fixed(value_trait::<T>())
    }
}

/// One entry of a bundle declaration.
#[derive(Clone)]
pub struct BundleSlot {
    pub ty: BundleSlotType,
    pub input: bool,
    pub output: bool,
    pub name: &'static str,
    pub help: &'static str,
}

impl BundleSlot {
    pub fn input(ty: BundleSlotType, name: &'static str, help: &'static str) -> Self {
        Self {
            ty,
            input: true,
            output: false,
            name,
            help,
        }
    }

    pub fn output(ty: BundleSlotType, name: &'static str, help: &'static str) -> Self {
        Self {
            ty,
            input: false,
            output: true,
            name,
            help,
        }
    }
}

/// Slots created for one connection, tagged with the connected type.
pub struct Bundle {
    full_type_id: FullTypeId,
    number: usize,
    input: usize,
    slots: Vec<Arc<Slot>>,
}

impl Bundle {
    pub fn full_type_id(&self) -> FullTypeId {
        self.full_type_id
    }

    /// Creation number, used in slot names.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn slots(&self) -> &[Arc<Slot>] {
        &self.slots
    }

    /// The slot linked to the connecting source.
    pub fn input(&self) -> &Arc<Slot> {
        &self.slots[self.input]
    }

    /// Typed handle on the `index`-th declared slot.
    pub fn get<T: SlotValue>(&self, index: usize) -> Option<SlotHandle<T>> {
        SlotHandle::from_slot(self.slots.get(index)?)
    }
}

/// Per-type body of a generic operation.
pub trait BundleOp<V: SlotValue> {
    fn run(&mut self, bundle: &Bundle);
}

struct DispatchEntry<O> {
    value_trait: Arc<dyn ValueTrait>,
    run: fn(&mut O, &Bundle),
}

pub struct DispatchTable<O> {
    entries: HashMap<FullTypeId, DispatchEntry<O>>,
}

fn run_bundle<O: BundleOp<V>, V: SlotValue>(op: &mut O, bundle: &Bundle) {
    op.run(bundle);
}

impl<O> DispatchTable<O> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn add<V: SlotValue>(&mut self)
    where
        O: BundleOp<V>,
    {
        let value_trait = value_trait::<V>();
        self.entries.insert(
            value_trait.full_type_id(),
            DispatchEntry {
                value_trait,
                run: run_bundle::<O, V>,
            },
        );
    }

    pub fn contains(&self, id: FullTypeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.values().map(|e| e.value_trait.type_name().to_string()).collect();
        names.sort();
        names
    }

    fn dispatch(&self, op: &mut O, bundle: &Bundle) {
        if let Some(entry) = self.entries.get(&bundle.full_type_id) {
            (entry.run)(op, bundle);
        }
    }
}

/// A compile-time list of slot value types, written as a tuple.
pub trait TypeList<O> {
    fn register(table: &mut DispatchTable<O>);
}

macro_rules! impl_type_list {
    ($($ty:ident),+) => {
        impl<O, $($ty: SlotValue),+> TypeList<O> for ($($ty,)+)
        where
            $(O: BundleOp<$ty>),+
        {
            fn register(table: &mut DispatchTable<O>) {
                $(table.add::<$ty>();)+
            }
        }
    };
}

impl_type_list!(A);
impl_type_list!(A, B);
impl_type_list!(A, B, C);
impl_type_list!(A, B, C, D);
impl_type_list!(A, B, C, D, E);
impl_type_list!(A, B, C, D, E, F);
impl_type_list!(A, B, C, D, E, F, G);
impl_type_list!(A, B, C, D, E, F, G, H);

static DISPATCH_TABLES: Lazy<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn build_table<O: GenericOperation>() -> DispatchTable<O> {
    let mut table = DispatchTable::new();
    O::Types::register(&mut table);
    table
}

fn dispatch_table<O: GenericOperation>() -> Arc<DispatchTable<O>> {
    let mut tables = DISPATCH_TABLES.lock().unwrap();
    let shared = tables
        .entry(TypeId::of::<O>())
        .or_insert_with(|| Arc::new(build_table::<O>()) as Arc<dyn Any + Send + Sync>)
        .clone();
    shared.downcast::<DispatchTable<O>>().unwrap_or_else(|_| Arc::new(build_table::<O>()))
}

/// The typed part of a generic component.
pub trait GenericOperation: Send + Sized + 'static {
    type Types: TypeList<Self>;

    const PLACEHOLDER: &'static str;
    const PLACEHOLDER_HELP: &'static str;
    /// Once a type is connected, other types are refused until every bundle is gone.
    const SINGLE_TYPE: bool = false;

    /// Creates the operation and its static slots.
    fn create(builder: &mut SlotBuilder) -> Self;

    /// Slots created per connection. Must contain a `Connected` input.
    fn bundle_slots() -> Vec<BundleSlot>;

    fn begin_dispatch(&mut self) {}

    fn end_dispatch(&mut self) {}
}

pub struct GenericComponent<O: GenericOperation> {
    op: O,
    table: Arc<DispatchTable<O>>,
    declarations: Vec<BundleSlot>,
    placeholder: Arc<Slot>,
    bundles: Vec<Bundle>,
    created: usize,
    locked: Option<FullTypeId>,
}

impl<O: GenericOperation> GenericComponent<O> {
    pub fn operation(&self) -> &O {
        &self.op
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    fn bundle_of(&self, input: &Slot) -> Option<usize> {
        self.bundles.iter().position(|b| std::ptr::eq(&**b.input(), input))
    }

    fn accepts_type(&self, id: FullTypeId) -> bool {
        self.table.contains(id) && (!O::SINGLE_TYPE || self.locked.is_none_or(|locked| locked == id))
    }
}

impl<O: GenericOperation> ComponentType for GenericComponent<O> {
    fn create(builder: &mut SlotBuilder) -> Self {
        let op = O::create(builder);
        let placeholder = builder.slot(
            value_trait::<Placeholder>(),
            SlotFlags {
                input: true,
                ..Default::default()
            },
            O::PLACEHOLDER,
            O::PLACEHOLDER_HELP,
        );
        GenericComponent {
            op,
            table: dispatch_table::<O>(),
            declarations: O::bundle_slots(),
            placeholder,
            bundles: Vec::new(),
            created: 0,
            locked: None,
        }
    }
}

impl<O: GenericOperation> Component for GenericComponent<O> {
    fn recompute(&mut self) {
        self.op.begin_dispatch();
        for bundle in &self.bundles {
            self.table.dispatch(&mut self.op, bundle);
        }
        self.op.end_dispatch();
    }

    fn accepts_parent(&self, slot: &Slot, parent: &Slot) -> bool {
        let id = parent.value_trait().full_type_id();
        if std::ptr::eq(slot, &*self.placeholder) && !self.accepts_type(id) {
            warn!(
                "{} refuses {}; accepted types: {}",
                O::PLACEHOLDER,
                parent.value_trait().type_name(),
                self.table.type_names().join(", ")
            );
            return false;
        }
        true
    }

    fn placeholder(&self) -> Option<&Arc<Slot>> {
        Some(&self.placeholder)
    }

    fn create_bundle(
        &mut self,
        source: &Slot,
        builder: &mut SlotBuilder,
        number: Option<usize>,
    ) -> Result<Arc<Slot>, EngineError> {
        let source_trait = source.value_trait().clone();
        let id = source_trait.full_type_id();
        if !self.accepts_type(id) {
            return Err(EngineError::InvalidConnection(format!(
                "{} is not accepted by {}",
                source_trait.type_name(),
                O::PLACEHOLDER
            )));
        }
        let input = self
            .declarations
            .iter()
            .position(|d| d.input && matches!(d.ty, BundleSlotType::Connected))
            .ok_or_else(|| EngineError::InvalidConnection("bundle declares no connected input".to_string()))?;

        let number = match number {
            Some(number) if number == 0 || self.bundles.iter().any(|b| b.number == number) => {
                return Err(EngineError::InvalidConnection(format!(
                    "{} cannot create bundle #{}",
                    O::PLACEHOLDER,
                    number
                )));
            }
            Some(number) => number,
            None => self.created + 1,
        };
        self.created = self.created.max(number);
        let slots = self
            .declarations
            .iter()
            .map(|decl| {
                let value_trait = match &decl.ty {
                    BundleSlotType::Connected => source_trait.clone(),
                    BundleSlotType::ConnectedElement => source_trait.element_trait(),
                    BundleSlotType::Fixed(fixed) => fixed.clone(),
                };
                let flags = SlotFlags {
                    input: decl.input,
                    output: decl.output,
                    persistent: decl.input,
                    read_only: !decl.input,
                };
                builder.slot(value_trait, flags, &format!("{} #{}", decl.name, number), decl.help)
            })
            .collect::<Vec<_>>();

        let bundle_input = slots[input].clone();
        debug!("Created bundle #{} of {}", number, source_trait.type_name());
        let position = self
            .bundles
            .iter()
            .position(|b| b.number > number)
            .unwrap_or(self.bundles.len());
        self.bundles.insert(
            position,
            Bundle {
                full_type_id: id,
                number,
                input,
                slots,
            },
        );
        self.locked = Some(id);
        Ok(bundle_input)
    }

    fn bundle_number(&self, slot: &Slot) -> Option<usize> {
        self.bundle_of(slot).map(|position| self.bundles[position].number)
    }

    fn bundle_anchor(&self, input: &Slot) -> Option<Arc<Slot>> {
        let position = self.bundle_of(input)?;
        self.bundles.get(position + 1).and_then(|next| next.slots.first().cloned())
    }

    fn slot_disconnected(&mut self, slot: &Slot) -> Vec<Arc<Slot>> {
        let Some(position) = self.bundle_of(slot) else {
            return Vec::new();
        };
        let bundle = self.bundles.remove(position);
        if self.bundles.is_empty() {
            self.locked = None;
        }
        debug!("Removed bundle #{}", bundle.number);
        bundle.slots
    }
}
