//! Built-in components, registered as the `core` module.

mod list;
mod math;
mod time;
mod value;

pub use list::{ConcatLists, ListSize, VectorAdd};
pub use math::{AddIntegers, ScaleReals};
pub use time::TimeSource;
pub use value::Constant;

use crate::factory::{FactoryEntry, FactoryModule};

pub const CORE_MODULE: &str = "core";

pub fn core_module() -> FactoryModule {
    FactoryModule::new(CORE_MODULE, "Built-in components")
        .with_entry(FactoryEntry::new::<TimeSource>("Document time, advanced once per step"))
        .with_entry(FactoryEntry::new::<Constant<i32>>("Constant integer"))
        .with_entry(FactoryEntry::new::<Constant<i64>>("Constant long"))
        .with_entry(FactoryEntry::new::<Constant<f32>>("Constant float"))
        .with_entry(FactoryEntry::new::<Constant<f64>>("Constant real"))
        .with_entry(FactoryEntry::new::<Constant<bool>>("Constant boolean"))
        .with_entry(FactoryEntry::new::<Constant<String>>("Constant text"))
        .with_entry(FactoryEntry::new::<Constant<Vec<i32>>>("Constant list of integers"))
        .with_entry(FactoryEntry::new::<Constant<Vec<f64>>>("Constant list of reals"))
        .with_entry(FactoryEntry::new::<AddIntegers>("Sum of two integers"))
        .with_entry(FactoryEntry::new::<ScaleReals>("Multiplies a list of reals by a factor"))
        .with_entry(FactoryEntry::generic::<VectorAdd>("Element-wise sum of two lists, broadcasting single values"))
        .with_entry(FactoryEntry::generic::<ListSize>("Number of elements of each connected list"))
        .with_entry(FactoryEntry::generic::<ConcatLists>("Running concatenation of lists of one type"))
}
