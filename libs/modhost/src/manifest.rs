//! On-disk entry-file format.
//!
//! A module directory is recognized by a single entry file matching the
//! configured glob (default `*Module.json`). The entry file names the module's
//! entry class and namespace, declares the app-module capability marker, and
//! carries the static configuration that materializes a
//! [`ModuleDescriptor`](crate::descriptor::ModuleDescriptor).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::descriptor::{EventRouting, UrlRule};
use crate::error::ModuleError;

/// Capability marker an entry file must declare to be recognized as a module.
pub const APP_MODULE_CAPABILITY: &str = "app-module";

/// Parsed entry file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Fully-qualified entry symbol name, e.g. `shop.Module`.
    pub class: String,
    /// Logical namespace, registered as a host path alias on load.
    pub namespace: String,
    /// Capability marker; anything other than `app-module` is rejected.
    #[serde(default)]
    pub capability: Option<String>,
    #[serde(default)]
    pub config: ManifestConfig,
    /// Fields not interpreted here, carried through rewrites untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `config` section of an entry file: the module's static configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    pub id: String,
    pub version: Version,
    pub enabled: bool,
    pub category: String,
    pub parent_module: Option<String>,
    pub url_rules: Vec<UrlRule>,
    pub append_routes: bool,
    pub bootstrap: bool,
    /// source class -> event name -> handler selector.
    ///
    /// An empty selector means "derive by convention at registration time".
    pub events: BTreeMap<String, BTreeMap<String, String>>,
    pub routing: EventRouting,
    /// Module-author fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            version: Version::new(0, 0, 1),
            enabled: true,
            category: String::new(),
            parent_module: None,
            url_rules: Vec::new(),
            append_routes: true,
            bootstrap: false,
            events: BTreeMap::new(),
            routing: EventRouting::Selector,
            extra: serde_json::Map::new(),
        }
    }
}

impl ModuleManifest {
    /// Parses an entry file.
    ///
    /// # Errors
    /// Returns `ModuleError::Io` when the file cannot be read and
    /// `ModuleError::Manifest` when it is not a valid manifest.
    pub fn load(path: &Path) -> Result<Self, ModuleError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persists the manifest back to `path`, pretty-printed.
    ///
    /// # Errors
    /// Returns `ModuleError::Io` when the file cannot be written.
    pub fn store(&self, path: &Path) -> Result<(), ModuleError> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Whether the entry declares the app-module capability.
    #[must_use]
    pub fn is_app_module(&self) -> bool {
        self.capability.as_deref() == Some(APP_MODULE_CAPABILITY)
    }
}
