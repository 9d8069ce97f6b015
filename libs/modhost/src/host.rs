//! In-process host application surface.
//!
//! The host owns the live side of the system: module slots and instances, the
//! path-alias table, the URL-rule table and the generic event bus. The
//! lifecycle manager only mutates it through this API.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use semver::Version;

use crate::contracts::{AppModule, ModuleFactory};
use crate::descriptor::{ChildModule, UrlRule};
use crate::events::EventBus;

/// A registered module slot: what the host needs to instantiate the module.
#[derive(Clone, Debug)]
pub struct ModuleSlot {
    pub class: String,
    pub version: Version,
    pub modules: BTreeMap<String, ChildModule>,
}

/// In-memory host application.
#[derive(Default)]
pub struct AppHost {
    factories: DashMap<String, Arc<dyn ModuleFactory>>,
    slots: DashMap<String, ModuleSlot>,
    instances: DashMap<String, Arc<dyn AppModule>>,
    aliases: DashMap<String, PathBuf>,
    url_rules: RwLock<Vec<UrlRule>>,
    bus: EventBus,
}

impl std::fmt::Debug for AppHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHost")
            .field("slots", &self.slots.len())
            .field("instances", &self.instances.len())
            .field("aliases", &self.aliases.len())
            .field("url_rules", &self.url_rules.read().len())
            .finish_non_exhaustive()
    }
}

impl AppHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the compiled-in factory for an entry class.
    pub fn register_factory(&self, class: impl Into<String>, factory: Arc<dyn ModuleFactory>) {
        self.factories.insert(class.into(), factory);
    }

    /// Registers or replaces a module slot. A replaced slot drops any stale
    /// live instance so the next lookup re-instantiates.
    pub fn set_module(&self, id: impl Into<String>, slot: ModuleSlot) {
        let id = id.into();
        self.instances.remove(&id);
        self.slots.insert(id, slot);
    }

    /// Resolves the live instance for `id`, instantiating it through the
    /// slot's class factory on first access. Absent when the id has no slot
    /// or the class has no registered factory.
    #[must_use]
    pub fn get_module(&self, id: &str) -> Option<Arc<dyn AppModule>> {
        if let Some(instance) = self.instances.get(id) {
            return Some(Arc::clone(&instance));
        }
        let class = self.slots.get(id)?.class.clone();
        let instance = self.create_instance(&class, id)?;
        self.instances.insert(id.to_owned(), Arc::clone(&instance));
        Some(instance)
    }

    /// Constructs a fresh instance of `class` without touching the slot
    /// table. Used for upgrade candidates that are not installed yet.
    #[must_use]
    pub fn create_instance(&self, class: &str, id: &str) -> Option<Arc<dyn AppModule>> {
        let factory = self.factories.get(class)?;
        Some(factory.create(id))
    }

    #[must_use]
    pub fn module_slot(&self, id: &str) -> Option<ModuleSlot> {
        self.slots.get(id).map(|s| s.clone())
    }

    /// Sets or retracts a path alias.
    pub fn set_alias(&self, alias: &str, path: Option<PathBuf>) {
        match path {
            Some(p) => {
                self.aliases.insert(alias.to_owned(), p);
            }
            None => {
                self.aliases.remove(alias);
            }
        }
    }

    #[must_use]
    pub fn resolve_alias(&self, alias: &str) -> Option<PathBuf> {
        self.aliases.get(alias).map(|p| p.clone())
    }

    /// Adds URL rules, appended after or prepended before the existing table.
    pub fn add_rules(&self, rules: &[UrlRule], append: bool) {
        let mut table = self.url_rules.write();
        if append {
            table.extend_from_slice(rules);
        } else {
            let mut merged = rules.to_vec();
            merged.append(&mut table);
            *table = merged;
        }
    }

    #[must_use]
    pub fn url_rules(&self) -> Vec<UrlRule> {
        self.url_rules.read().clone()
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}
