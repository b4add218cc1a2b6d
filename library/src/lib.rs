pub mod class_registry;
pub mod cli;
pub mod component;
pub mod components;
pub mod config;
pub mod document;
pub mod error;
pub mod factory;
pub mod graph;
pub mod scheduler;
pub mod shared;
pub mod types;
pub mod util;

pub use cli::run;
pub use component::{Component, ComponentNode, ComponentType, GenericComponent, GenericOperation, SlotBuilder};
pub use config::{EngineConfig, EvaluationMode};
pub use document::Document;
pub use error::EngineError;
pub use factory::{ComponentFactory, FactoryEntry, FactoryModule};
pub use graph::{Input, Node, Output, Slot};
pub use scheduler::Scheduler;
pub use shared::{SharedTables, adopt_shared_tables, shared_tables};
pub use types::{ConversionRegistry, ValueNode, ValueTrait};
