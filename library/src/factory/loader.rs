use std::path::Path;

use libloading::{Library, Symbol};
use log::{debug, info, warn};

use crate::error::EngineError;
use crate::factory::{ComponentFactory, FactoryModule};
use crate::shared::{SharedTables, shared_tables};
use crate::types::register_builtin_types;

/// Symbol a module library exports: `extern "C" fn(&SharedTables) -> *mut FactoryModule`.
///
/// The entry point must call [`crate::adopt_shared_tables`] with its argument before building the module.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"create_component_module";

const LIBRARY_EXTENSIONS: [&str; 3] = ["so", "dll", "dylib"];

impl ComponentFactory {
    /// Loads a module library and registers its module. The library stays loaded for the factory's lifetime.
    pub fn load_module_library<P: AsRef<Path>>(&self, path: P) -> Result<String, EngineError> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path)? };
        let constructor: Symbol<unsafe extern "C" fn(&SharedTables) -> *mut FactoryModule> =
            unsafe { library.get(MODULE_ENTRY_SYMBOL)? };
        // Built-in traits are created by the host, never by the library.
        register_builtin_types();
        let raw = unsafe { constructor(shared_tables()) };
        if raw.is_null() {
            return Err(EngineError::Module(format!(
                "{} returned null in {}",
                String::from_utf8_lossy(MODULE_ENTRY_SYMBOL),
                path.display()
            )));
        }
        let module = unsafe { Box::from_raw(raw) };
        let name = module.name.clone();

        self.register_module(*module)?;
        self.inner.write().unwrap().dynamic_libraries.push(library);
        info!("Loaded module '{}' from {}", name, path.display());
        Ok(name)
    }

    /// Loads every module library in `dir`. Libraries that fail to load are skipped.
    pub fn load_modules_from_directory<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<String>, EngineError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!("Module directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut loaded = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let extension = path.extension().and_then(|s| s.to_str());
            if !path.is_file() || !extension.is_some_and(|e| LIBRARY_EXTENSIONS.contains(&e)) {
                continue;
            }
            debug!("Attempting to load module from: {}", path.display());
            match self.load_module_library(&path) {
                Ok(name) => loaded.push(name),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        self.derive_aliases();
        Ok(loaded)
    }
}
