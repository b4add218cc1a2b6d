//! Value types a slot can hold and the type-erased layer over them.
//!
//! Every element type implements [`ValueType`]; everything a slot stores (an element, a `Vec` of elements or an
//! [`Animation`] of elements) implements [`SlotValue`]. The engine itself only talks to values through the
//! object-safe [`ValueTrait`] obtained from [`value_trait`].

mod animation;
mod conversion;
mod value_node;
mod value_trait;

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EngineError;

pub use animation::Animation;
pub use conversion::{ConversionRegistry, Converter};
pub use value_node::ValueNode;
pub(crate) use value_trait::TypeTable;
pub use value_trait::{
    TypedValueTrait, ValueTrait, registered_traits, trait_by_full_type_id, trait_by_rust_name, value_trait,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Single,
    Vector,
    Animation,
}

impl TypeCategory {
    fn bits(self) -> u32 {
        match self {
            TypeCategory::Single => 0,
            TypeCategory::Vector => 1,
            TypeCategory::Animation => 2,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits {
            1 => TypeCategory::Vector,
            2 => TypeCategory::Animation,
            _ => TypeCategory::Single,
        }
    }
}

/// Identity of an element type, assigned on first use and stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueTypeId(pub u32);

/// Element type and container category packed into one integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullTypeId(pub u32);

impl FullTypeId {
    const CATEGORY_SHIFT: u32 = 24;
    const ELEMENT_MASK: u32 = (1 << Self::CATEGORY_SHIFT) - 1;

    pub fn new(category: TypeCategory, element: ValueTypeId) -> Self {
        FullTypeId((element.0 & Self::ELEMENT_MASK) | (category.bits() << Self::CATEGORY_SHIFT))
    }

    pub fn category(self) -> TypeCategory {
        TypeCategory::from_bits(self.0 >> Self::CATEGORY_SHIFT)
    }

    pub fn element(self) -> ValueTypeId {
        ValueTypeId(self.0 & Self::ELEMENT_MASK)
    }

    /// The single-category id of the same element type.
    pub fn element_full(self) -> FullTypeId {
        FullTypeId::new(TypeCategory::Single, self.element())
    }
}

/// An element type: something that can be stored alone, in a vector or in an animation.
pub trait ValueType: SlotValue + Serialize + DeserializeOwned {
    /// Canonical display name, e.g. `"integer"`.
    fn type_name() -> &'static str;
}

/// Anything a slot can hold.
pub trait SlotValue: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    type Element: ValueType;
    const CATEGORY: TypeCategory;

    fn display_name() -> String;
    fn len(&self) -> usize;
    fn element(&self, index: usize) -> Option<&Self::Element>;
    fn element_mut(&mut self, index: usize) -> Option<&mut Self::Element>;
    /// Resizes to `size`; with `init` the previous content is reset first.
    fn clear(&mut self, size: usize, init: bool);
    fn write_value(&self, node: &mut ValueNode);
    fn read_value(&mut self, node: &ValueNode) -> Result<(), EngineError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[doc(hidden)]
pub fn write_element<T: Serialize>(value: &T, node: &mut ValueNode) {
    match serde_json::to_string(value) {
        Ok(text) => node.text = Some(text),
        Err(err) => log::warn!("Failed to serialize value for '{}': {}", node.name, err),
    }
}

#[doc(hidden)]
pub fn read_element<T: DeserializeOwned>(node: &ValueNode) -> Result<T, EngineError> {
    let text = node
        .text
        .as_deref()
        .ok_or_else(|| EngineError::Deserialize(format!("node '{}' has no value text", node.name)))?;
    Ok(serde_json::from_str(text)?)
}

/// Declares an element type, making it usable as a single slot value and inside `Vec`/`Animation`.
#[macro_export]
macro_rules! declare_value_type {
    ($ty:ty, $name:expr) => {
        impl $crate::types::ValueType for $ty {
            fn type_name() -> &'static str {
                $name
            }
        }

        impl $crate::types::SlotValue for $ty {
            type Element = $ty;
            const CATEGORY: $crate::types::TypeCategory = $crate::types::TypeCategory::Single;

            fn display_name() -> String {
                $name.to_string()
            }

            fn len(&self) -> usize {
                1
            }

            fn element(&self, index: usize) -> Option<&Self::Element> {
                (index == 0).then_some(self)
            }

            fn element_mut(&mut self, index: usize) -> Option<&mut Self::Element> {
                (index == 0).then_some(self)
            }

            fn clear(&mut self, _size: usize, init: bool) {
                if init {
                    *self = <$ty>::default();
                }
            }

            fn write_value(&self, node: &mut $crate::types::ValueNode) {
                $crate::types::write_element(self, node);
            }

            fn read_value(&mut self, node: &$crate::types::ValueNode) -> Result<(), $crate::error::EngineError> {
                *self = $crate::types::read_element(node)?;
                Ok(())
            }
        }
    };
}

declare_value_type!(i32, "integer");
declare_value_type!(i64, "long");
declare_value_type!(f32, "float");
declare_value_type!(f64, "real");
declare_value_type!(bool, "boolean");
declare_value_type!(String, "text");

impl<T: ValueType> SlotValue for Vec<T> {
    type Element = T;
    const CATEGORY: TypeCategory = TypeCategory::Vector;

    fn display_name() -> String {
        format!("vector<{}>", T::type_name())
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn element(&self, index: usize) -> Option<&T> {
        self.get(index)
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut T> {
        self.get_mut(index)
    }

    fn clear(&mut self, size: usize, init: bool) {
        if init {
            Vec::clear(self);
        }
        self.resize(size, T::default());
    }

    fn write_value(&self, node: &mut ValueNode) {
        for item in self {
            let mut child = ValueNode::new("item");
            write_element(item, &mut child);
            node.add_child(child);
        }
    }

    fn read_value(&mut self, node: &ValueNode) -> Result<(), EngineError> {
        let items = node
            .children_named("item")
            .map(read_element::<T>)
            .collect::<Result<Vec<_>, _>>()?;
        *self = items;
        Ok(())
    }
}

/// Makes sure the built-in value types are known to the name and id lookups.
pub fn register_builtin_types() {
    fn all_categories<T: ValueType>() {
        value_trait::<T>();
        value_trait::<Vec<T>>();
        value_trait::<Animation<T>>();
    }
    all_categories::<i32>();
    all_categories::<i64>();
    all_categories::<f32>();
    all_categories::<f64>();
    all_categories::<bool>();
    all_categories::<String>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_type_id_is_a_function_of_category_and_element() {
        let id = FullTypeId::new(TypeCategory::Vector, ValueTypeId(7));
        assert_eq!(id.category(), TypeCategory::Vector);
        assert_eq!(id.element(), ValueTypeId(7));
        assert_eq!(id, FullTypeId::new(TypeCategory::Vector, ValueTypeId(7)));
        assert_ne!(id, FullTypeId::new(TypeCategory::Single, ValueTypeId(7)));
        assert_eq!(id.element_full(), FullTypeId::new(TypeCategory::Single, ValueTypeId(7)));
    }

    #[test]
    fn element_types_share_one_id_across_categories() {
        fn ids<T: ValueType>() -> [FullTypeId; 3] {
            [
                value_trait::<T>().full_type_id(),
                value_trait::<Vec<T>>().full_type_id(),
                value_trait::<Animation<T>>().full_type_id(),
            ]
        }
        let [single, vector, animation] = ids::<f32>();
        assert_eq!(single.element(), vector.element());
        assert_eq!(single.element(), animation.element());
        assert_eq!(vector.element_full(), single);
        assert_eq!(vector.category(), TypeCategory::Vector);
        assert_eq!(animation.category(), TypeCategory::Animation);
    }

    #[test]
    fn vector_clear_with_and_without_init() {
        let mut v = vec![1, 2, 3];
        SlotValue::clear(&mut v, 5, false);
        assert_eq!(v, vec![1, 2, 3, 0, 0]);
        SlotValue::clear(&mut v, 2, true);
        assert_eq!(v, vec![0, 0]);
    }

    #[test]
    fn single_element_access_is_bounds_checked() {
        let mut x = 4_i32;
        assert_eq!(x.element(0), Some(&4));
        assert_eq!(x.element(1), None);
        *x.element_mut(0).unwrap() = 9;
        assert_eq!(x, 9);
    }

    #[test]
    fn vector_value_node_roundtrip() {
        let v = vec![1.5_f64, -2.0];
        let mut node = ValueNode::new("slot");
        v.write_value(&mut node);
        assert_eq!(node.children.len(), 2);

        let mut read: Vec<f64> = Vec::new();
        read.read_value(&node).unwrap();
        assert_eq!(read, v);
    }
}
