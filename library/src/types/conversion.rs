use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::shared::shared_tables;
use crate::types::{FullTypeId, SlotValue, TypeCategory, ValueTrait, ValueType, value_trait};

pub type Converter = Arc<dyn Fn(&dyn Any, &mut dyn Any) + Send + Sync>;

/// Directed table of value converters plus the cross-type copy policy used by parent links.
#[derive(Clone, Default)]
pub struct ConversionRegistry {
    converters: HashMap<(FullTypeId, FullTypeId), Converter>,
}

trait Numeric: ValueType + Copy {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_numeric {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_numeric!(i32, i64, f32, f64);

macro_rules! numeric_pairs {
    ($reg:ident; $($from:ty),*; $to:tt) => {
        $( numeric_pairs!(@row $reg; $from; $to); )*
    };
    (@row $reg:ident; $from:ty; [$($to:ty),*]) => {
        $( $reg.register_numeric::<$from, $to>(); )*
    };
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric conversions between all built-in numbers, bool to and from integer, numbers to text.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        numeric_pairs!(registry; i32, i64, f32, f64; [i32, i64, f32, f64]);
        registry.register::<bool, i32>(|src, dst| *dst = i32::from(*src));
        registry.register::<i32, bool>(|src, dst| *dst = *src != 0);
        registry.register::<i32, String>(|src, dst| *dst = src.to_string());
        registry.register::<i64, String>(|src, dst| *dst = src.to_string());
        registry.register::<f32, String>(|src, dst| *dst = src.to_string());
        registry.register::<f64, String>(|src, dst| *dst = src.to_string());
        registry.register::<bool, String>(|src, dst| *dst = src.to_string());
        registry
    }

    /// The process-wide registry consulted when a slot mirrors its parent.
    pub fn global() -> &'static RwLock<ConversionRegistry> {
        shared_tables()
            .conversions
            .get_or_init(|| RwLock::new(ConversionRegistry::with_defaults()))
    }

    pub fn register<F: SlotValue, T: SlotValue>(&mut self, convert: impl Fn(&F, &mut T) + Send + Sync + 'static) {
        let from = value_trait::<F>().full_type_id();
        let to = value_trait::<T>().full_type_id();
        let converter: Converter = Arc::new(move |src: &dyn Any, dst: &mut dyn Any| {
            if let (Some(src), Some(dst)) = (src.downcast_ref::<F>(), dst.downcast_mut::<T>()) {
                convert(src, dst);
            }
        });
        if self.converters.insert((from, to), converter).is_some() {
            log::debug!("Replaced converter {:?} -> {:?}", from, to);
        }
    }

    fn register_numeric<F: Numeric, T: Numeric>(&mut self) {
        if TypeId::of::<F>() != TypeId::of::<T>() {
            self.register::<F, T>(|src, dst| *dst = T::from_f64(src.to_f64()));
        }
    }

    pub fn can_convert(&self, from: FullTypeId, to: FullTypeId) -> bool {
        self.converters.contains_key(&(from, to))
    }

    /// Runs the converter for `(from, to)`. Callers check `can_convert` first.
    pub fn convert(&self, from: FullTypeId, to: FullTypeId, src: &dyn Any, dst: &mut dyn Any) {
        if let Some(converter) = self.converters.get(&(from, to)) {
            converter(src, dst);
        }
    }

    /// Whether `copy` would find a rule for this pair of types.
    pub fn can_copy(&self, dst: &dyn ValueTrait, src: &dyn ValueTrait) -> bool {
        let (dst_full, src_full) = (dst.full_type_id(), src.full_type_id());
        if dst_full == src_full {
            return true;
        }
        let same_element = dst.value_type_id() == src.value_type_id();
        let element_convertible = self.can_convert(src_full.element_full(), dst_full.element_full());
        match dst.category() {
            TypeCategory::Animation => false,
            TypeCategory::Single => {
                (src.category() == TypeCategory::Vector && same_element)
                    || self.can_convert(src_full, dst_full)
                    || self.can_convert(src_full.element_full(), dst_full)
            }
            TypeCategory::Vector => {
                (src.category() == TypeCategory::Single && same_element)
                    || self.can_convert(src_full, dst_full)
                    || same_element
                    || element_convertible
                    || self.can_convert(src_full.element_full(), dst_full)
            }
        }
    }

    /// Copies `src` into `dst` following the cross-type copy policy, first matching rule wins.
    ///
    /// Returns `false` when no rule applies; the destination is then left unchanged, except for animation
    /// destinations which are cleared.
    pub fn copy(&self, dst_trait: &dyn ValueTrait, dst: &mut dyn Any, src_trait: &dyn ValueTrait, src: &dyn Any) -> bool {
        let dst_full = dst_trait.full_type_id();
        let src_full = src_trait.full_type_id();

        if dst_trait.category() == TypeCategory::Animation {
            if dst_full == src_full {
                return dst_trait.copy_value(dst, src);
            }
            dst_trait.clear(dst, 0, true);
            return false;
        }

        if dst_full == src_full {
            return dst_trait.copy_value(dst, src);
        }

        let same_element = dst_trait.value_type_id() == src_trait.value_type_id();
        match dst_trait.category() {
            TypeCategory::Single => {
                if src_trait.category() == TypeCategory::Vector && same_element {
                    match src_trait.element(src, 0) {
                        Some(first) => {
                            dst_trait.copy_value(dst, first);
                        }
                        None => dst_trait.clear(dst, 0, true),
                    }
                    return true;
                }
                if self.can_convert(src_full, dst_full) {
                    self.convert(src_full, dst_full, src, dst);
                    return true;
                }
                let src_element = src_full.element_full();
                if src_trait.category() != TypeCategory::Single && self.can_convert(src_element, dst_full) {
                    match src_trait.element(src, 0) {
                        Some(first) => self.convert(src_element, dst_full, first, dst),
                        None => dst_trait.clear(dst, 0, true),
                    }
                    return true;
                }
                false
            }
            TypeCategory::Vector => {
                if src_trait.category() == TypeCategory::Single && same_element {
                    dst_trait.clear(dst, 1, true);
                    if let Some(slot) = dst_trait.element_mut(dst, 0) {
                        dst_trait.element_trait().copy_value(slot, src);
                    }
                    return true;
                }
                if self.can_convert(src_full, dst_full) {
                    self.convert(src_full, dst_full, src, dst);
                    return true;
                }
                let src_element = src_full.element_full();
                let dst_element = dst_full.element_full();
                if same_element || self.can_convert(src_element, dst_element) {
                    let element_trait = dst_trait.element_trait();
                    let size = src_trait.size(src);
                    dst_trait.clear(dst, size, true);
                    for index in 0..size {
                        let (Some(from), Some(to)) = (src_trait.element(src, index), dst_trait.element_mut(dst, index))
                        else {
                            continue;
                        };
                        if same_element {
                            element_trait.copy_value(to, from);
                        } else {
                            self.convert(src_element, dst_element, from, to);
                        }
                    }
                    return true;
                }
                if self.can_convert(src_element, dst_full) {
                    match src_trait.element(src, 0) {
                        Some(first) => self.convert(src_element, dst_full, first, dst),
                        None => dst_trait.clear(dst, 0, true),
                    }
                    return true;
                }
                false
            }
            TypeCategory::Animation => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Animation;

    fn copy<D: SlotValue, S: SlotValue>(registry: &ConversionRegistry, dst: &mut D, src: &S) -> bool {
        registry.copy(&*value_trait::<D>(), dst, &*value_trait::<S>(), src)
    }

    #[test]
    fn vector_into_single_takes_the_first_element() {
        let registry = ConversionRegistry::with_defaults();
        let mut dst = 0_i32;
        assert!(copy(&registry, &mut dst, &vec![7, 8, 9]));
        assert_eq!(dst, 7);
    }

    #[test]
    fn empty_vector_into_single_yields_default() {
        let registry = ConversionRegistry::with_defaults();
        let mut dst = 5_i32;
        assert!(copy(&registry, &mut dst, &Vec::<i32>::new()));
        assert_eq!(dst, 0);
    }

    #[test]
    fn full_converter_between_singles() {
        let registry = ConversionRegistry::with_defaults();
        let mut dst = 0.0_f64;
        assert!(copy(&registry, &mut dst, &3_i32));
        assert_eq!(dst, 3.0);
    }

    #[test]
    fn element_converter_applied_to_first_element() {
        let registry = ConversionRegistry::with_defaults();
        let mut dst = 0_i64;
        assert!(copy(&registry, &mut dst, &vec![2.5_f32, 4.0]));
        assert_eq!(dst, 2);
    }

    #[test]
    fn single_wrapped_into_vector() {
        let registry = ConversionRegistry::new();
        let mut dst = vec![1, 2, 3];
        assert!(copy(&registry, &mut dst, &4_i32));
        assert_eq!(dst, vec![4]);
    }

    #[test]
    fn per_element_conversion_resizes_destination() {
        let registry = ConversionRegistry::with_defaults();
        let mut dst = vec![0.0_f64; 5];
        assert!(copy(&registry, &mut dst, &vec![1_i32, 2]));
        assert_eq!(dst, vec![1.0, 2.0]);
    }

    #[test]
    fn first_element_into_vector_converter() {
        let mut registry = ConversionRegistry::new();
        registry.register::<i64, Vec<bool>>(|src, dst| *dst = (0..*src).map(|bit| bit % 2 == 0).collect());
        assert!(registry.can_copy(&*value_trait::<Vec<bool>>(), &*value_trait::<Vec<i64>>()));

        let mut dst: Vec<bool> = Vec::new();
        assert!(copy(&registry, &mut dst, &vec![3_i64, 10]));
        assert_eq!(dst, vec![true, false, true]);

        assert!(copy(&registry, &mut dst, &Vec::<i64>::new()));
        assert!(dst.is_empty());
    }

    #[test]
    fn no_rule_leaves_destination_unchanged() {
        let registry = ConversionRegistry::new();
        let mut dst = 11_i32;
        assert!(!copy(&registry, &mut dst, &String::from("text")));
        assert_eq!(dst, 11);
        assert!(!registry.can_copy(&*value_trait::<i32>(), &*value_trait::<String>()));
    }

    #[test]
    fn animation_accepts_only_identical_types() {
        let registry = ConversionRegistry::with_defaults();
        let source = Animation::new().with_key(0.0, 1.0_f32);

        let mut dst = Animation::<f32>::new();
        assert!(copy(&registry, &mut dst, &source));
        assert_eq!(dst, source);

        assert!(!copy(&registry, &mut dst, &vec![1.0_f32]));
        assert_eq!(dst.key_count(), 0);
    }

    #[test]
    fn custom_converter_takes_precedence_over_element_rules() {
        let mut registry = ConversionRegistry::with_defaults();
        registry.register::<Vec<i32>, i32>(|src, dst| *dst = src.iter().sum());
        let mut dst = 0_i32;
        // Same element type: rule (b) still wins over the full converter.
        assert!(copy(&registry, &mut dst, &vec![1, 2, 3]));
        assert_eq!(dst, 1);

        registry.register::<Vec<f64>, i32>(|src, dst| *dst = src.len() as i32);
        assert!(copy(&registry, &mut dst, &vec![9.0_f64, 9.0]));
        assert_eq!(dst, 2);
    }
}
