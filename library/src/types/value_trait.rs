use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use crate::error::EngineError;
use crate::shared::shared_tables;
use crate::types::{FullTypeId, SlotValue, TypeCategory, ValueNode, ValueTypeId};

/// Type-erased operations over one concrete slot value type.
pub trait ValueTrait: Send + Sync {
    fn category(&self) -> TypeCategory;
    fn value_type_id(&self) -> ValueTypeId;
    fn full_type_id(&self) -> FullTypeId;
    /// Canonical display name, e.g. `vector<integer>`.
    fn type_name(&self) -> &str;
    fn rust_type_name(&self) -> &'static str;
    /// The trait of the single element type.
    fn element_trait(&self) -> Arc<dyn ValueTrait>;

    fn new_value(&self) -> Box<dyn Any + Send + Sync>;
    /// Copies between two values of exactly this type.
    fn copy_value(&self, dst: &mut dyn Any, src: &dyn Any) -> bool;
    fn values_equal(&self, a: &dyn Any, b: &dyn Any) -> bool;
    fn format_value(&self, value: &dyn Any) -> String;

    fn size(&self, value: &dyn Any) -> usize;
    /// `None` past the end.
    fn element<'a>(&self, value: &'a dyn Any, index: usize) -> Option<&'a dyn Any>;
    fn element_mut<'a>(&self, value: &'a mut dyn Any, index: usize) -> Option<&'a mut dyn Any>;
    fn clear(&self, value: &mut dyn Any, size: usize, init: bool);

    fn write_value(&self, value: &dyn Any, node: &mut ValueNode);
    fn read_value(&self, value: &mut dyn Any, node: &ValueNode) -> Result<(), EngineError>;
}

pub struct TypedValueTrait<V> {
    value_type_id: ValueTypeId,
    full_type_id: FullTypeId,
    name: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V: SlotValue> TypedValueTrait<V> {
    fn downcast<'a>(&self, value: &'a dyn Any) -> Option<&'a V> {
        let typed = value.downcast_ref::<V>();
        if typed.is_none() {
            log::warn!("Value passed to the '{}' trait has a different type", self.name);
        }
        typed
    }

    fn downcast_mut<'a>(&self, value: &'a mut dyn Any) -> Option<&'a mut V> {
        value.downcast_mut::<V>()
    }
}

impl<V: SlotValue> ValueTrait for TypedValueTrait<V> {
    fn category(&self) -> TypeCategory {
        V::CATEGORY
    }

    fn value_type_id(&self) -> ValueTypeId {
        self.value_type_id
    }

    fn full_type_id(&self) -> FullTypeId {
        self.full_type_id
    }

    fn type_name(&self) -> &str {
        &self.name
    }

    fn rust_type_name(&self) -> &'static str {
        std::any::type_name::<V>()
    }

    fn element_trait(&self) -> Arc<dyn ValueTrait> {
        value_trait::<V::Element>()
    }

    fn new_value(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(V::default())
    }

    fn copy_value(&self, dst: &mut dyn Any, src: &dyn Any) -> bool {
        match (self.downcast_mut(dst), src.downcast_ref::<V>()) {
            (Some(dst), Some(src)) => {
                dst.clone_from(src);
                true
            }
            _ => false,
        }
    }

    fn values_equal(&self, a: &dyn Any, b: &dyn Any) -> bool {
        match (a.downcast_ref::<V>(), b.downcast_ref::<V>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn format_value(&self, value: &dyn Any) -> String {
        self.downcast(value).map(|v| format!("{:?}", v)).unwrap_or_default()
    }

    fn size(&self, value: &dyn Any) -> usize {
        self.downcast(value).map(SlotValue::len).unwrap_or(0)
    }

    fn element<'a>(&self, value: &'a dyn Any, index: usize) -> Option<&'a dyn Any> {
        self.downcast(value)?.element(index).map(|e| e as &dyn Any)
    }

    fn element_mut<'a>(&self, value: &'a mut dyn Any, index: usize) -> Option<&'a mut dyn Any> {
        self.downcast_mut(value)?.element_mut(index).map(|e| e as &mut dyn Any)
    }

    fn clear(&self, value: &mut dyn Any, size: usize, init: bool) {
        if let Some(value) = self.downcast_mut(value) {
            value.clear(size, init);
        }
    }

    fn write_value(&self, value: &dyn Any, node: &mut ValueNode) {
        if let Some(value) = self.downcast(value) {
            value.write_value(node);
        }
    }

    fn read_value(&self, value: &mut dyn Any, node: &ValueNode) -> Result<(), EngineError> {
        let value = self
            .downcast_mut(value)
            .ok_or_else(|| EngineError::Deserialize(format!("value is not a {}", self.name)))?;
        value.read_value(node)
    }
}

/// Every value trait created so far, keyed three ways.
#[derive(Default)]
pub(crate) struct TypeTable {
    by_type: HashMap<TypeId, Arc<dyn ValueTrait>>,
    by_full_id: HashMap<FullTypeId, Arc<dyn ValueTrait>>,
    by_rust_name: HashMap<&'static str, Arc<dyn ValueTrait>>,
    element_ids: HashMap<TypeId, ValueTypeId>,
}

impl TypeTable {
    fn element_id(&mut self, element: TypeId) -> ValueTypeId {
        let next = ValueTypeId(self.element_ids.len() as u32 + 1);
        *self.element_ids.entry(element).or_insert(next)
    }

    pub(crate) fn contains(&self, id: FullTypeId) -> bool {
        self.by_full_id.contains_key(&id)
    }
}

fn types() -> &'static RwLock<TypeTable> {
    &shared_tables().types
}

/// Returns the process-wide trait for `V`, creating it on first use.
pub fn value_trait<V: SlotValue>() -> Arc<dyn ValueTrait> {
    let key = TypeId::of::<V>();
    if let Some(existing) = types().read().unwrap().by_type.get(&key) {
        return existing.clone();
    }

    let mut table = types().write().unwrap();
    if let Some(existing) = table.by_type.get(&key) {
        return existing.clone();
    }
    let value_type_id = table.element_id(TypeId::of::<V::Element>());
    let full_type_id = FullTypeId::new(V::CATEGORY, value_type_id);
    let value_trait: Arc<dyn ValueTrait> = Arc::new(TypedValueTrait::<V> {
        value_type_id,
        full_type_id,
        name: V::display_name(),
        _marker: PhantomData,
    });
    log::debug!("Registered value type '{}' as {:?}", value_trait.type_name(), full_type_id);
    table.by_type.insert(key, value_trait.clone());
    table.by_full_id.insert(full_type_id, value_trait.clone());
    table.by_rust_name.insert(std::any::type_name::<V>(), value_trait.clone());
    value_trait
}

pub fn trait_by_full_type_id(id: FullTypeId) -> Option<Arc<dyn ValueTrait>> {
    types().read().unwrap().by_full_id.get(&id).cloned()
}

pub fn trait_by_rust_name(name: &str) -> Option<Arc<dyn ValueTrait>> {
    types().read().unwrap().by_rust_name.get(name).cloned()
}

pub fn registered_traits() -> Vec<Arc<dyn ValueTrait>> {
    let mut traits: Vec<_> = types().read().unwrap().by_full_id.values().cloned().collect();
    traits.sort_by_key(|t| t.full_type_id());
    traits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Animation;

    #[test]
    fn lookup_is_idempotent() {
        let a = value_trait::<Vec<i32>>();
        let b = value_trait::<Vec<i32>>();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.type_name(), "vector<integer>");
    }

    #[test]
    fn categories_share_the_element_id() {
        let single = value_trait::<f32>();
        let vector = value_trait::<Vec<f32>>();
        let anim = value_trait::<Animation<f32>>();
        assert_eq!(single.value_type_id(), vector.value_type_id());
        assert_eq!(single.value_type_id(), anim.value_type_id());
        assert_ne!(single.full_type_id(), vector.full_type_id());
        assert_eq!(vector.full_type_id().category(), TypeCategory::Vector);
        assert!(Arc::ptr_eq(&vector.element_trait(), &single));
    }

    #[test]
    fn element_access_through_the_erased_trait() {
        let t = value_trait::<Vec<i64>>();
        let mut value = t.new_value();
        t.clear(&mut *value, 3, true);
        assert_eq!(t.size(&*value), 3);
        *t.element_mut(&mut *value, 1).unwrap().downcast_mut::<i64>().unwrap() = 42;
        assert_eq!(t.element(&*value, 1).unwrap().downcast_ref::<i64>(), Some(&42));
        assert!(t.element(&*value, 3).is_none());
    }

    #[test]
    fn lookup_by_full_id_and_rust_name() {
        let t = value_trait::<String>();
        assert!(Arc::ptr_eq(&trait_by_full_type_id(t.full_type_id()).unwrap(), &t));
        assert!(Arc::ptr_eq(&trait_by_rust_name(std::any::type_name::<String>()).unwrap(), &t));
    }
}
