//! Class metadata: decoded type names plus an explicit parent DAG.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::debug;

use crate::component::Component;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

/// Declaration of a class and its parents, resolved into a [`ClassRegistry`] on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub type_name: String,
    pub parents: Vec<ClassDecl>,
}

impl ClassDecl {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            parents: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: ClassDecl) -> Self {
        self.parents.push(parent);
        self
    }

    /// Root of every component class.
    pub fn component() -> Self {
        Self::of::<dyn Component>()
    }

    /// Abstract base of all generic components.
    pub fn generic_component() -> Self {
        Self::named("slotflow::component::generic::GenericComponent").with_parent(Self::component())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub type_name: String,
    pub namespace: String,
    pub class_name: String,
    pub template_args: Vec<String>,
    pub parents: Vec<ClassId>,
}

impl ClassInfo {
    /// Decodes a `std::any::type_name` string into namespace, class and template arguments.
    pub fn from_type_name(type_name: &str) -> Self {
        let name = type_name.trim().trim_start_matches("dyn ");
        let (path, template) = match name.find('<') {
            Some(open) if name.ends_with('>') => (&name[..open], Some(&name[open + 1..name.len() - 1])),
            _ => (name, None),
        };
        let (namespace, class_name) = match path.rfind("::") {
            Some(sep) => (&path[..sep], &path[sep + 2..]),
            None => ("", path),
        };
        Self {
            type_name: type_name.to_string(),
            namespace: namespace.to_string(),
            class_name: class_name.to_string(),
            template_args: template.map(split_template_args).unwrap_or_default(),
            parents: Vec::new(),
        }
    }

    /// Class name with module paths stripped from its template arguments, e.g. `Constant<Vec<i32>>`.
    pub fn short_name(&self) -> String {
        if self.template_args.is_empty() {
            return self.class_name.clone();
        }
        let args: Vec<_> = self.template_args.iter().map(|a| short_type_name(a)).collect();
        format!("{}<{}>", self.class_name, args.join(", "))
    }
}

fn split_template_args(template: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in template.chars() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        args.push(current.trim().to_string());
    }
    args
}

/// Strips module paths from every path segment: `alloc::vec::Vec<i32>` becomes `Vec<i32>`.
pub fn short_type_name(full: &str) -> String {
    fn last_segment(token: &str) -> &str {
        token.rsplit("::").next().unwrap_or(token)
    }

    let mut out = String::with_capacity(full.len());
    let mut token = String::new();
    for ch in full.chars() {
        if matches!(ch, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';') {
            out.push_str(last_segment(&token));
            token.clear();
            out.push(ch);
        } else {
            token.push(ch);
        }
    }
    out.push_str(last_segment(&token));
    out
}

#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
    by_name: HashMap<String, ClassId>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class and, recursively, its parents. Re-registering merges parent lists.
    pub fn register(&mut self, decl: &ClassDecl) -> ClassId {
        let parents: Vec<ClassId> = decl.parents.iter().map(|p| self.register(p)).collect();
        let id = match self.by_name.get(&decl.type_name) {
            Some(&id) => id,
            None => {
                let id = ClassId(self.classes.len());
                self.classes.push(ClassInfo::from_type_name(&decl.type_name));
                self.by_name.insert(decl.type_name.clone(), id);
                debug!("Registered class {}", decl.type_name);
                id
            }
        };
        let info = &mut self.classes[id.0];
        for parent in parents {
            if parent != id && !info.parents.contains(&parent) {
                info.parents.push(parent);
            }
        }
        id
    }

    pub fn find(&self, type_name: &str) -> Option<ClassId> {
        self.by_name.get(type_name).copied()
    }

    pub fn info(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.0)
    }

    /// Whether `ancestor` is reachable from `class` through parent links.
    pub fn has_parent(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ClassId> = self.parents_of(class).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if next == ancestor {
                return true;
            }
            if seen.insert(next) {
                queue.extend(self.parents_of(next).iter().copied());
            }
        }
        false
    }

    pub fn is_instance(&self, class: ClassId, of: ClassId) -> bool {
        class == of || self.has_parent(class, of)
    }

    fn parents_of(&self, class: ClassId) -> &[ClassId] {
        self.classes.get(class.0).map(|c| c.parents.as_slice()).unwrap_or(&[])
    }
}

/// Handlers keyed by class; lookup picks the most derived registered class.
pub struct HandlerRegistry<H: ?Sized> {
    entries: Vec<(ClassId, Arc<H>)>,
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<H: ?Sized> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps derived classes ahead of their ancestors.
    pub fn register(&mut self, classes: &ClassRegistry, class: ClassId, handler: Arc<H>) {
        if let Some(existing) = self.entries.iter_mut().find(|(c, _)| *c == class) {
            existing.1 = handler;
            return;
        }
        let position = self
            .entries
            .iter()
            .position(|(other, _)| classes.has_parent(class, *other))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, (class, handler));
    }

    pub fn find(&self, classes: &ClassRegistry, class: ClassId) -> Option<&Arc<H>> {
        self.entries
            .iter()
            .find(|(registered, _)| classes.is_instance(class, *registered))
            .map(|(_, handler)| handler)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
