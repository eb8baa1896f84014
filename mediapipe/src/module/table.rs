// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Module table and the process-wide registry.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use tracing::{debug, error};

use crate::{error::ConfigError, module::ModuleDescriptor};

/// Prefix of every built-in module name. [`ModuleTable::lookup_short`]
/// prepends it.
pub const MODULE_PREFIX: &str = "mp_";

/// Name-indexed set of module descriptors, in compiled order.
#[derive(Debug)]
pub struct ModuleTable {
    modules: Vec<Arc<ModuleDescriptor>>,
    by_name: HashMap<String, usize>,
}

impl ModuleTable {
    /// Builds a table, assigning each descriptor its position as index.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DuplicateModule`] if two descriptors share a name.
    pub fn new(catalog: Vec<ModuleDescriptor>) -> Result<Self, ConfigError> {
        let mut modules = Vec::with_capacity(catalog.len());
        let mut by_name = HashMap::with_capacity(catalog.len());
        for (index, mut descriptor) in catalog.into_iter().enumerate() {
            if by_name.insert(descriptor.name.clone(), index).is_some() {
                return Err(ConfigError::DuplicateModule(descriptor.name));
            }
            descriptor.index = index;
            modules.push(Arc::new(descriptor));
        }
        Ok(Self { modules, by_name })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ModuleDescriptor>> {
        self.modules.iter()
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.by_name.get(name).map(|&index| &self.modules[index])
    }

    /// Looks up `short` with [`MODULE_PREFIX`] prepended.
    pub fn lookup_short(&self, short: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.lookup(&format!("{MODULE_PREFIX}{short}"))
    }

    /// Resolves a name from a module list: the exact name first, then the
    /// short form.
    pub fn resolve(&self, name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.lookup(name).or_else(|| self.lookup_short(name))
    }
}

/// Process-wide module registry.
///
/// Wraps the compiled catalog function and builds the [`ModuleTable`] from
/// it on first use. Concurrent first callers block until the one
/// initialization completes; every caller sees the same table.
///
/// ```
/// use mediapipe::module::{ModuleDescriptor, Registry};
///
/// fn catalog() -> Vec<ModuleDescriptor> {
///     vec![ModuleDescriptor::builder("mp_alpha").build()]
/// }
///
/// static MODULES: Registry = Registry::new(catalog);
///
/// let table = MODULES.register_all().unwrap();
/// assert!(table.lookup_short("alpha").is_some());
/// ```
pub struct Registry {
    catalog: fn() -> Vec<ModuleDescriptor>,
    table: OnceLock<Result<Arc<ModuleTable>, Arc<ConfigError>>>,
}

impl Registry {
    pub const fn new(catalog: fn() -> Vec<ModuleDescriptor>) -> Self {
        Self {
            catalog,
            table: OnceLock::new(),
        }
    }

    /// Builds the table if it has not been built yet and returns it.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Registration`] wrapping the catalog's failure, such as
    /// [`ConfigError::DuplicateModule`]. The failure is sticky: every later
    /// call reports the same error.
    pub fn register_all(&self) -> Result<Arc<ModuleTable>, ConfigError> {
        self.table
            .get_or_init(|| {
                let catalog = (self.catalog)();
                debug!(count = catalog.len(), "Registering modules");
                ModuleTable::new(catalog).map(Arc::new).map_err(|e| {
                    error!(error = %e, "Module registration failed");
                    Arc::new(e)
                })
            })
            .clone()
            .map_err(ConfigError::Registration)
    }

    pub fn is_registered(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.register_all().ok()?.lookup(name).cloned()
    }

    pub fn lookup_short(&self, short: &str) -> Option<Arc<ModuleDescriptor>> {
        self.register_all().ok()?.lookup_short(short).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Vec<ModuleDescriptor> {
        names
            .iter()
            .map(|name| ModuleDescriptor::builder(*name).build())
            .collect()
    }

    #[test]
    fn indices_follow_catalog_order() {
        let table = ModuleTable::new(named(&["mp_a", "mp_b", "console"])).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("mp_b").unwrap().index(), 1);
        assert_eq!(table.lookup("console").unwrap().index(), 2);
        assert!(table.lookup("mp_c").is_none());
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = ModuleTable::new(named(&["mp_a", "mp_a"])).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateModule(name) if name == "mp_a"));
    }

    #[test]
    fn short_names_expand_with_prefix() {
        let table = ModuleTable::new(named(&["mp_writer", "console"])).unwrap();
        assert_eq!(table.lookup_short("writer").unwrap().name(), "mp_writer");
        assert!(table.lookup_short("console").is_none());
        assert_eq!(table.resolve("writer").unwrap().name(), "mp_writer");
        assert_eq!(table.resolve("console").unwrap().name(), "console");
    }

    #[test]
    fn registry_failure_is_sticky() {
        fn broken() -> Vec<ModuleDescriptor> {
            vec![
                ModuleDescriptor::builder("mp_x").build(),
                ModuleDescriptor::builder("mp_x").build(),
            ]
        }
        static BROKEN: Registry = Registry::new(broken);
        let Err(ConfigError::Registration(first)) = BROKEN.register_all() else {
            panic!("registration should fail");
        };
        assert!(matches!(&*first, ConfigError::DuplicateModule(name) if name == "mp_x"));
        let Err(ConfigError::Registration(second)) = BROKEN.register_all() else {
            panic!("registration should stay failed");
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert!(BROKEN.lookup("mp_x").is_none());
    }
}
