use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{SlotValue, TypeCategory, ValueNode, ValueType, read_element, write_element};

/// Keyframed value: keys sorted by time, evaluated with step interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation<T> {
    keys: Vec<(f64, T)>,
}

impl<T> Default for Animation<T> {
    fn default() -> Self {
        Self { keys: Vec::new() }
    }
}

impl<T: Clone + Default> Animation<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key, replacing any key at the same time.
    pub fn insert(&mut self, time: f64, value: T) {
        match self.keys.binary_search_by(|(t, _)| t.total_cmp(&time)) {
            Ok(pos) => self.keys[pos].1 = value,
            Err(pos) => self.keys.insert(pos, (time, value)),
        }
    }

    pub fn with_key(mut self, time: f64, value: T) -> Self {
        self.insert(time, value);
        self
    }

    /// Value of the last key at or before `time`, or the first key before the animation starts.
    pub fn value_at(&self, time: f64) -> Option<&T> {
        let idx = self.keys.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            self.keys.first().map(|(_, v)| v)
        } else {
            Some(&self.keys[idx - 1].1)
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = (f64, &T)> {
        self.keys.iter().map(|(t, v)| (*t, v))
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

impl<T: ValueType> SlotValue for Animation<T> {
    type Element = T;
    const CATEGORY: TypeCategory = TypeCategory::Animation;

    fn display_name() -> String {
        format!("animation<{}>", T::type_name())
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn element(&self, index: usize) -> Option<&T> {
        self.keys.get(index).map(|(_, v)| v)
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut T> {
        self.keys.get_mut(index).map(|(_, v)| v)
    }

    fn clear(&mut self, size: usize, init: bool) {
        if init {
            self.keys.clear();
        }
        if size <= self.keys.len() {
            self.keys.truncate(size);
            return;
        }
        let mut next = self.keys.last().map(|(t, _)| t + 1.0).unwrap_or(0.0);
        while self.keys.len() < size {
            self.keys.push((next, T::default()));
            next += 1.0;
        }
    }

    fn write_value(&self, node: &mut ValueNode) {
        for (time, value) in &self.keys {
            let mut child = ValueNode::new("key").with_attribute("time", time.to_string());
            write_element(value, &mut child);
            node.add_child(child);
        }
    }

    fn read_value(&mut self, node: &ValueNode) -> Result<(), EngineError> {
        let mut animation = Animation::default();
        for child in node.children_named("key") {
            let time = child
                .attribute("time")
                .and_then(|t| t.parse::<f64>().ok())
                .ok_or_else(|| EngineError::Deserialize("animation key without a valid time".to_string()))?;
            animation.insert(time, read_element::<T>(child)?);
        }
        *self = animation;
        Ok(())
    }
}
