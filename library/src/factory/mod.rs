//! String-keyed component creation with atomic module registration.

mod loader;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use libloading::Library;
use log::{debug, error, info};

use crate::class_registry::{ClassDecl, ClassId, ClassInfo, ClassRegistry, HandlerRegistry};
use crate::component::{ComponentNode, ComponentType, GenericComponent, GenericOperation};
use crate::error::EngineError;
use crate::types::{register_builtin_types, trait_by_rust_name};

pub use loader::MODULE_ENTRY_SYMBOL;

pub type ComponentCreator = fn(&str) -> Arc<ComponentNode>;

/// Runs after creation for components of a class (or any class derived from it).
pub type CreationHook = dyn Fn(&ComponentNode) + Send + Sync;

/// A creatable component type.
#[derive(Clone)]
pub struct FactoryEntry {
    pub name: String,
    pub description: String,
    pub class: ClassDecl,
    /// Unqualified class name, e.g. `Constant`.
    pub base_name: String,
    /// Fully qualified template arguments, used to derive aliases.
    pub template_args: Vec<String>,
    pub creator: ComponentCreator,
}

impl FactoryEntry {
    /// Entry named after the decoded type name of `C`, e.g. `Constant<i32>`.
    pub fn new<C: ComponentType>(description: &str) -> Self {
        let info = ClassInfo::from_type_name(std::any::type_name::<C>());
        Self {
            name: info.short_name(),
            description: description.to_string(),
            class: ClassDecl::of::<C>().with_parent(ClassDecl::component()),
            base_name: info.class_name,
            template_args: info.template_args,
            creator: ComponentNode::create::<C>,
        }
    }

    /// Entry for a generic component, named after its operation.
    pub fn generic<O: GenericOperation>(description: &str) -> Self {
        let info = ClassInfo::from_type_name(std::any::type_name::<O>());
        Self {
            name: info.short_name(),
            description: description.to_string(),
            class: ClassDecl::of::<GenericComponent<O>>().with_parent(ClassDecl::generic_component()),
            base_name: info.class_name,
            template_args: Vec::new(),
            creator: ComponentNode::create::<GenericComponent<O>>,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Unit of atomic (de)registration.
#[derive(Clone)]
pub struct FactoryModule {
    pub name: String,
    pub description: String,
    pub entries: Vec<FactoryEntry>,
}

impl FactoryModule {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: FactoryEntry) -> Self {
        self.entries.push(entry);
        self
    }
}

/// Read-only view of a registered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub description: String,
    pub module: String,
    pub class_name: String,
}

struct RegisteredEntry {
    entry: FactoryEntry,
    module: String,
    class: ClassId,
}

struct ModuleRecord {
    description: String,
    entries: Vec<String>,
}

struct FactoryRegistry {
    entries: BTreeMap<String, RegisteredEntry>,
    modules: BTreeMap<String, ModuleRecord>,
    aliases: BTreeMap<String, String>,
    classes: ClassRegistry,
    hooks: HandlerRegistry<CreationHook>,
    dynamic_libraries: Vec<Library>,
}

pub struct ComponentFactory {
    inner: RwLock<FactoryRegistry>,
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentFactory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FactoryRegistry {
                entries: BTreeMap::new(),
                modules: BTreeMap::new(),
                aliases: BTreeMap::new(),
                classes: ClassRegistry::new(),
                hooks: HandlerRegistry::new(),
                dynamic_libraries: Vec::new(),
            }),
        }
    }

    /// A factory holding the `core` module with aliases derived.
    pub fn with_builtins() -> Result<Self, EngineError> {
        let factory = Self::new();
        factory.register_module(crate::components::core_module())?;
        factory.derive_aliases();
        Ok(factory)
    }

    /// Registers every entry of `module`, or none of them.
    pub fn register_module(&self, module: FactoryModule) -> Result<(), EngineError> {
        let mut inner = self.inner.write().unwrap();
        if inner.modules.contains_key(&module.name) {
            let err = EngineError::DuplicateModule(module.name.clone());
            error!("{}", err);
            return Err(err);
        }
        let mut batch = std::collections::HashSet::new();
        for entry in &module.entries {
            let taken = inner.entries.contains_key(&entry.name) || inner.aliases.contains_key(&entry.name);
            if taken || !batch.insert(entry.name.as_str()) {
                let err = EngineError::DuplicateComponentType(entry.name.clone());
                error!("{} (module '{}' rejected)", err, module.name);
                return Err(err);
            }
        }

        let names: Vec<String> = module.entries.iter().map(|e| e.name.clone()).collect();
        for entry in module.entries {
            let class = inner.classes.register(&entry.class);
            inner.entries.insert(
                entry.name.clone(),
                RegisteredEntry {
                    entry,
                    module: module.name.clone(),
                    class,
                },
            );
        }
        info!("Registered module '{}' with {} component(s)", module.name, names.len());
        inner.modules.insert(
            module.name,
            ModuleRecord {
                description: module.description,
                entries: names,
            },
        );
        Ok(())
    }

    /// Removes every entry registered by module `name`. Returns the removed entry names.
    pub fn unregister_module(&self, name: &str) -> Result<Vec<String>, EngineError> {
        let mut inner = self.inner.write().unwrap();
        let record = inner
            .modules
            .remove(name)
            .ok_or_else(|| EngineError::UnknownModule(name.to_string()))?;
        for entry in &record.entries {
            inner.entries.remove(entry);
        }
        inner.aliases.retain(|_, target| !record.entries.contains(target));
        debug!("Unregistered module '{}'", name);
        Ok(record.entries)
    }

    /// Derives `Constant<integer>`-style aliases for templated entries from value type display names.
    pub fn derive_aliases(&self) {
        register_builtin_types();
        let mut inner = self.inner.write().unwrap();
        let mut aliases = BTreeMap::new();
        for (name, registered) in &inner.entries {
            let entry = &registered.entry;
            if entry.template_args.is_empty() {
                continue;
            }
            let display: Option<Vec<String>> = entry
                .template_args
                .iter()
                .map(|arg| trait_by_rust_name(arg).map(|t| t.type_name().to_string()))
                .collect();
            let Some(display) = display else {
                continue;
            };
            let alias = format!("{}<{}>", entry.base_name, display.join(", "));
            if alias != *name && !inner.entries.contains_key(&alias) {
                aliases.insert(alias, name.clone());
            }
        }
        debug!("Derived {} alias(es)", aliases.len());
        inner.aliases = aliases;
    }

    /// Resolves an entry name or alias.
    pub fn resolve(&self, name: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        if inner.entries.contains_key(name) {
            return Some(name.to_string());
        }
        inner.aliases.get(name).cloned()
    }

    pub fn create(&self, name: &str) -> Result<Arc<ComponentNode>, EngineError> {
        let resolved = self.resolve(name);
        let found = resolved.as_ref().and_then(|resolved| {
            let inner = self.inner.read().unwrap();
            inner
                .entries
                .get(resolved)
                .map(|r| (r.entry.creator, r.class, inner.hooks.find(&inner.classes, r.class).cloned()))
        });
        let Some((creator, class, hook)) = found else {
            let err = EngineError::CouldNotCreate(name.to_string());
            error!("{}", err);
            return Err(err);
        };

        let node = creator(resolved.as_deref().unwrap_or(name));
        node.set_class_id(class);
        if let Some(hook) = hook {
            hook(&*node);
        }
        Ok(node)
    }

    /// Registers a creation hook; components dispatch to the most derived class with a hook.
    pub fn register_creation_hook(&self, class: &ClassDecl, hook: Arc<CreationHook>) -> ClassId {
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;
        let id = inner.classes.register(class);
        inner.hooks.register(&inner.classes, id, hook);
        id
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.read().unwrap().entries.keys().cloned().collect()
    }

    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.inner.read().unwrap().aliases.clone()
    }

    pub fn modules(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .unwrap()
            .modules
            .iter()
            .map(|(name, record)| (name.clone(), record.description.clone()))
            .collect()
    }

    pub fn entry(&self, name: &str) -> Option<EntryInfo> {
        let resolved = self.resolve(name)?;
        let inner = self.inner.read().unwrap();
        let registered = inner.entries.get(&resolved)?;
        let class_name = inner
            .classes
            .info(registered.class)
            .map(|info| info.class_name.clone())
            .unwrap_or_default();
        Some(EntryInfo {
            name: resolved,
            description: registered.entry.description.clone(),
            module: registered.module.clone(),
            class_name,
        })
    }

    /// Whether the component's class is `class` or derives from it.
    pub fn is_instance(&self, node: &ComponentNode, class: &ClassDecl) -> bool {
        let inner = self.inner.read().unwrap();
        match (node.class_id(), inner.classes.find(&class.type_name)) {
            (Some(actual), Some(expected)) => inner.classes.is_instance(actual, expected),
            _ => false,
        }
    }

    pub fn has_parent(&self, class: &ClassDecl, ancestor: &ClassDecl) -> bool {
        let inner = self.inner.read().unwrap();
        match (inner.classes.find(&class.type_name), inner.classes.find(&ancestor.type_name)) {
            (Some(class), Some(ancestor)) => inner.classes.has_parent(class, ancestor),
            _ => false,
        }
    }

    pub fn with_classes<R>(&self, f: impl FnOnce(&ClassRegistry) -> R) -> R {
        f(&self.inner.read().unwrap().classes)
    }
}
