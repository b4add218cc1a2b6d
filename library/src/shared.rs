//! Process-wide tables shared between the host and the module libraries it loads.
//!
//! A module library links its own copy of this crate, statics included. The loader hands the host's tables
//! to the library's entry point, which adopts them before it builds anything. Both copies then agree on
//! value type ids, converters and component indices.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};

use log::warn;
use once_cell::sync::OnceCell;

use crate::types::{ConversionRegistry, TypeTable};

#[derive(Clone)]
pub struct SharedTables {
    pub(crate) types: Arc<RwLock<TypeTable>>,
    /// Filled on first use: the default converters need the type table.
    pub(crate) conversions: Arc<OnceCell<RwLock<ConversionRegistry>>>,
    pub(crate) next_index: Arc<AtomicU64>,
}

impl SharedTables {
    fn new() -> Self {
        Self {
            types: Arc::new(RwLock::new(TypeTable::default())),
            conversions: Arc::new(OnceCell::new()),
            next_index: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Whether both handles point at the same tables.
    pub fn same_as(&self, other: &SharedTables) -> bool {
        Arc::ptr_eq(&self.types, &other.types)
            && Arc::ptr_eq(&self.conversions, &other.conversions)
            && Arc::ptr_eq(&self.next_index, &other.next_index)
    }
}

static SHARED: OnceCell<SharedTables> = OnceCell::new();

/// The tables used by this copy of the crate. Created on first use unless adopted from a host.
pub fn shared_tables() -> &'static SharedTables {
    SHARED.get_or_init(SharedTables::new)
}

/// Switches this copy of the crate to `host`'s tables.
///
/// Must run before any value type, converter or component is touched. Returns `false` when tables already
/// exist; that is expected when host and module share one copy of the crate.
pub fn adopt_shared_tables(host: &SharedTables) -> bool {
    if SHARED.set(host.clone()).is_ok() {
        return true;
    }
    if !shared_tables().same_as(host) {
        warn!("Module library created its own tables before adopting the host's; ids may not match");
    }
    false
}
