//! Materialized module metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::ModuleError;
use crate::manifest::ModuleManifest;

/// Declarative URL routing hint consumed when wiring a module into the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRule {
    pub pattern: String,
    pub route: String,
}

/// How subscribed host events are routed to the module's handler object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventRouting {
    /// Try the per-subscription handler selector first, then fall back to the
    /// generic `handle_module_event` call.
    #[default]
    Selector,
    /// Always use the generic `handle_module_event` call.
    Direct,
}

/// Nested child-module entry, carrying only class and version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildModule {
    pub class: String,
    pub version: Version,
}

/// One discovered module: the registry's record of its identity, location,
/// activation state and host-wiring hints. Immutable after discovery except
/// for the explicit state-change operations below.
#[derive(Clone, Debug, Serialize)]
pub struct ModuleDescriptor {
    /// Stable identifier, unique within a registry snapshot.
    pub id: String,
    /// Fully-qualified entry symbol name.
    pub class: String,
    /// Logical namespace, registered as a host path alias.
    pub namespace: String,
    /// On-disk module directory.
    pub path: PathBuf,
    /// The entry file the descriptor was materialized from.
    pub entry_file: PathBuf,
    pub version: Version,
    pub enabled: bool,
    /// Grouping label, not unique.
    pub category: String,
    /// Owning module id; when set and the parent is discovered, this
    /// descriptor is folded into the parent's `modules` map instead of
    /// appearing as a top-level registry entry.
    pub parent_module: Option<String>,
    /// Child modules nested under this one, by id.
    pub modules: BTreeMap<String, ChildModule>,
    pub url_rules: Vec<UrlRule>,
    pub append_routes: bool,
    pub bootstrap: bool,
    /// source class -> event name -> handler selector.
    pub events: BTreeMap<String, BTreeMap<String, String>>,
    pub routing: EventRouting,
}

/// The materialized, cached result of one full discovery pass.
pub type Registry = BTreeMap<String, Arc<ModuleDescriptor>>;

impl ModuleDescriptor {
    /// Builds a descriptor from a loaded manifest plus runtime location info.
    ///
    /// `class` and `entry_file` describe where the symbol was actually read
    /// from; the configuration values come from `manifest` (which, for a
    /// repeated normal-mode read, is the originally loaded unit's manifest).
    pub(crate) fn from_manifest(
        manifest: &ModuleManifest,
        class: &str,
        namespace: &str,
        entry_file: &Path,
    ) -> Self {
        let cfg = &manifest.config;
        let path = entry_file
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        Self {
            id: cfg.id.clone(),
            class: class.to_owned(),
            namespace: namespace.to_owned(),
            path,
            entry_file: entry_file.to_path_buf(),
            version: cfg.version.clone(),
            enabled: cfg.enabled,
            category: cfg.category.clone(),
            parent_module: cfg.parent_module.clone(),
            modules: BTreeMap::new(),
            url_rules: cfg.url_rules.clone(),
            append_routes: cfg.append_routes,
            bootstrap: cfg.bootstrap,
            events: cfg.events.clone(),
            routing: cfg.routing,
        }
    }

    /// Enables the module, persisting the flag through the entry manifest.
    ///
    /// # Errors
    /// Returns an error when the entry file cannot be rewritten.
    pub fn turn_on(&mut self) -> Result<bool, ModuleError> {
        self.persist_enabled(true)
    }

    /// Disables the module, persisting the flag through the entry manifest.
    ///
    /// # Errors
    /// Returns an error when the entry file cannot be rewritten.
    pub fn turn_off(&mut self) -> Result<bool, ModuleError> {
        self.persist_enabled(false)
    }

    /// Flips the activation flag, persisting it through the entry manifest.
    ///
    /// # Errors
    /// Returns an error when the entry file cannot be rewritten.
    pub fn toggle(&mut self) -> Result<bool, ModuleError> {
        let next = !self.enabled;
        self.persist_enabled(next)
    }

    // Activation state is owned by the module's own configuration (the entry
    // manifest), so the flag is written back to disk, not just flipped in
    // memory.
    fn persist_enabled(&mut self, enabled: bool) -> Result<bool, ModuleError> {
        let mut manifest = ModuleManifest::load(&self.entry_file)?;
        manifest.config.enabled = enabled;
        manifest.store(&self.entry_file)?;
        self.enabled = enabled;
        Ok(true)
    }
}
