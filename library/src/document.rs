//! The document owns every component and drives evaluation steps.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::component::ComponentNode;
use crate::components::TimeSource;
use crate::config::{EngineConfig, EvaluationMode};
use crate::error::EngineError;
use crate::factory::ComponentFactory;
use crate::graph::{Node, Slot};
use crate::scheduler::Scheduler;
use crate::types::ValueNode;
use crate::util::timing::ScopedTimer;

pub const ROOT_TYPE: &str = "TimeSource";

pub struct Document {
    id: Uuid,
    config: EngineConfig,
    root: Arc<ComponentNode>,
    components: Vec<Arc<ComponentNode>>,
    scheduler: Option<Scheduler>,
    topology_changed: bool,
    steps: u64,
}

impl Document {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let root = ComponentNode::create::<TimeSource>(ROOT_TYPE);
        if let Some(timestep) = root.slot("timestep") {
            timestep.set_value(config.timestep);
            timestep.unset();
        }
        let mut document = Self {
            id: Uuid::new_v4(),
            config,
            components: vec![root.clone()],
            root,
            scheduler: None,
            topology_changed: true,
            steps: 0,
        };
        document.set_mode(document.config.mode)?;
        Ok(document)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn root(&self) -> &Arc<ComponentNode> {
        &self.root
    }

    pub fn components(&self) -> &[Arc<ComponentNode>] {
        &self.components
    }

    pub fn component(&self, index: u64) -> Option<&Arc<ComponentNode>> {
        self.components.iter().find(|c| c.index() == index)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    /// Switches between pull and push evaluation, starting or stopping the worker pool.
    pub fn set_mode(&mut self, mode: EvaluationMode) -> Result<(), EngineError> {
        self.config.mode = mode;
        match mode {
            EvaluationMode::Pull => {
                self.scheduler = None;
            }
            EvaluationMode::Push => {
                let mut scheduler = self.scheduler.take().unwrap_or_default();
                scheduler.init(self.config.resolved_worker_count())?;
                self.scheduler = Some(scheduler);
                self.topology_changed = true;
            }
        }
        Ok(())
    }

    pub fn create_component(&mut self, factory: &ComponentFactory, name: &str) -> Result<Arc<ComponentNode>, EngineError> {
        let component = factory.create(name)?;
        self.add_component(component.clone());
        Ok(component)
    }

    pub fn add_component(&mut self, component: Arc<ComponentNode>) {
        debug!("Document {} adds {}", self.id, component.label());
        self.components.push(component);
        self.topology_changed = true;
    }

    /// Detaches every link of the component and drops it from the document.
    pub fn remove_component(&mut self, index: u64) -> Result<Arc<ComponentNode>, EngineError> {
        if self.root.index() == index {
            return Err(EngineError::InvalidConnection("the root component cannot be removed".to_string()));
        }
        let position = self
            .components
            .iter()
            .position(|c| c.index() == index)
            .ok_or(EngineError::UnknownComponent(index))?;
        let component = self.components.remove(position);
        component.detach_all();
        self.topology_changed = true;
        Ok(component)
    }

    pub fn find_slot(&self, index: u64, name: &str) -> Result<Arc<Slot>, EngineError> {
        self.component(index)
            .ok_or(EngineError::UnknownComponent(index))?
            .slot(name)
            .ok_or_else(|| EngineError::UnknownSlot {
                component: index,
                slot: name.to_string(),
            })
    }

    /// Makes `producer` the parent of `consumer`. Returns the slot actually linked, which differs from
    /// `consumer` when it is a placeholder.
    pub fn link(&mut self, consumer: &Arc<Slot>, producer: &Arc<Slot>) -> Result<Arc<Slot>, EngineError> {
        let owner = consumer
            .owner()
            .ok_or_else(|| EngineError::InvalidConnection(format!("{} has no owner", consumer.name())))?;
        let linked = owner.connect(consumer, producer)?;
        self.topology_changed = true;
        Ok(linked)
    }

    pub fn unlink(&mut self, consumer: &Arc<Slot>) -> Result<(), EngineError> {
        match consumer.owner() {
            Some(owner) => owner.disconnect(consumer)?,
            None => consumer.set_parent(None)?,
        }
        self.topology_changed = true;
        Ok(())
    }

    /// One evaluation step: `begin_step` on every component, mark the root dirty, evaluate, `end_step`.
    pub fn step(&mut self) {
        let _timer = ScopedTimer::lazy(self.config.timing_level(), || format!("Step {}", self.steps + 1));
        for component in &self.components {
            component.begin_step();
        }
        self.root.set_dirty_value(None);

        if let Some(scheduler) = &self.scheduler {
            if self.topology_changed {
                scheduler.set_components(&self.components);
                self.topology_changed = false;
            }
            scheduler.set_dirty();
            scheduler.wait_for_other_tasks(true);
        }
        // In push mode this only picks up what the scheduler could not order, such as cycles.
        for component in &self.components {
            component.update_if_dirty();
        }

        for component in &self.components {
            component.end_step();
        }
        self.steps += 1;
    }

    pub fn run(&mut self, steps: u64) {
        info!("Running {} step(s) in {:?} mode", steps, self.config.mode);
        for _ in 0..steps {
            self.step();
        }
    }

    /// Components, links and persistable slot values.
    pub fn save(&self) -> ValueNode {
        let mut document = ValueNode::new("document")
            .with_attribute("id", self.id.to_string())
            .with_attribute("root", self.root.index().to_string());

        for component in &self.components {
            let mut node = ValueNode::new("component")
                .with_attribute("type", component.type_name())
                .with_attribute("index", component.index().to_string())
                .with_attribute("name", component.name());
            for slot in component.slots().iter().filter(|s| s.should_persist()) {
                let mut data = ValueNode::new("slot").with_attribute("name", slot.name());
                slot.write_value(&mut data);
                node.add_child(data);
            }
            document.add_child(node);
        }

        for component in &self.components {
            for slot in component.slots() {
                let Some(parent) = slot.parent() else {
                    continue;
                };
                let Some(source) = parent.owner() else {
                    continue;
                };
                let mut link = ValueNode::new("link")
                    .with_attribute("component", component.index().to_string())
                    .with_attribute("slot", slot.name())
                    .with_attribute("source_component", source.index().to_string())
                    .with_attribute("source_slot", parent.name());
                if let Some(number) = component.bundle_number(&slot) {
                    link = link.with_attribute("bundle", number.to_string());
                }
                document.add_child(link);
            }
        }
        document
    }

    /// Current values of every output slot, keyed by component index and slot name.
    pub fn outputs(&self) -> ValueNode {
        let mut outputs = ValueNode::new("outputs");
        for component in &self.components {
            for slot in component.output_slots() {
                let mut data = ValueNode::new("slot")
                    .with_attribute("component", component.index().to_string())
                    .with_attribute("name", slot.name())
                    .with_attribute("type", slot.value_trait().type_name());
                slot.write_value(&mut data);
                outputs.add_child(data);
            }
        }
        outputs
    }

    /// Rebuilds a document saved with [`Document::save`]. Components get fresh indices.
    pub fn load(factory: &ComponentFactory, config: EngineConfig, node: &ValueNode) -> Result<Self, EngineError> {
        let mut document = Document::new(config)?;
        if let Some(id) = node.attribute("id").and_then(|id| Uuid::parse_str(id).ok()) {
            document.id = id;
        }
        let saved_root = node.attribute("root").and_then(|r| r.parse::<u64>().ok());

        let mut by_saved_index: HashMap<u64, Arc<ComponentNode>> = HashMap::new();
        for saved in node.children_named("component") {
            let index = parse_index(saved, "index")?;
            let component = if Some(index) == saved_root {
                document.root.clone()
            } else {
                let type_name = saved
                    .attribute("type")
                    .ok_or_else(|| EngineError::Deserialize(format!("component {} has no type", index)))?;
                document.create_component(factory, type_name)?
            };
            if let Some(name) = saved.attribute("name") {
                component.set_name(name);
            }
            by_saved_index.insert(index, component);
        }

        let lookup = |index: u64| by_saved_index.get(&index).cloned().ok_or(EngineError::UnknownComponent(index));
        // Bundles first, so links to their other inputs find the slots by name.
        let (bundled, plain): (Vec<_>, Vec<_>) =
            node.children_named("link").partition(|link| link.attribute("bundle").is_some());
        for link in bundled.into_iter().chain(plain) {
            let consumer = lookup(parse_index(link, "component")?)?;
            let source = lookup(parse_index(link, "source_component")?)?;
            let source_name = link.attribute("source_slot").unwrap_or_default();
            let producer = source.slot(source_name).ok_or_else(|| EngineError::UnknownSlot {
                component: source.index(),
                slot: source_name.to_string(),
            })?;
            let slot_name = link.attribute("slot").unwrap_or_default();
            let bundle = link.attribute("bundle").and_then(|n| n.parse::<usize>().ok());
            match (consumer.slot(slot_name), consumer.placeholder(), bundle) {
                (Some(target), _, _) => {
                    document.link(&target, &producer)?;
                }
                (None, Some(placeholder), Some(number)) => {
                    consumer.connect_bundle(&placeholder, &producer, number)?;
                    document.topology_changed = true;
                }
                (None, Some(placeholder), None) => {
                    document.link(&placeholder, &producer)?;
                }
                (None, None, _) => {
                    return Err(EngineError::UnknownSlot {
                        component: consumer.index(),
                        slot: slot_name.to_string(),
                    });
                }
            }
        }

        for saved in node.children_named("component") {
            let component = lookup(parse_index(saved, "index")?)?;
            for data in saved.children_named("slot") {
                let name = data.attribute("name").unwrap_or_default();
                match component.slot(name) {
                    Some(slot) => slot.read_value(data)?,
                    None => warn!("{} has no slot '{}', value skipped", component.label(), name),
                }
            }
        }
        info!("Loaded document {} with {} component(s)", document.id, document.components.len());
        Ok(document)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(&self.save())?)
    }

    pub fn from_json(factory: &ComponentFactory, config: EngineConfig, json: &str) -> Result<Self, EngineError> {
        let node: ValueNode = serde_json::from_str(json)?;
        Self::load(factory, config, &node)
    }
}

fn parse_index(node: &ValueNode, key: &str) -> Result<u64, EngineError> {
    node.attribute(key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| EngineError::Deserialize(format!("'{}' node without a valid '{}'", node.name, key)))
}
