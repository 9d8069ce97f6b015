//! Manager configuration surface.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::Place;

/// Recognized configuration options for the lifecycle manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Root locations scanned for module entry files, in priority order.
    /// Fresh installs land under the first place.
    pub places: Vec<Place>,
    /// Base namespace installed modules conventionally live under; a module
    /// whose namespace deviates gets an explicit path alias at wiring time.
    pub base_namespace: String,
    /// Run the enable sequence right after a successful install or reset.
    pub auto_activate: bool,
    /// Glob the entry file name must match.
    pub entry_pattern: String,
    /// Suffixes stripped from a source class short name when deriving
    /// conventional handler selectors.
    pub strip_suffixes: Vec<String>,
    /// Working directory for archive extraction.
    pub work_dir: PathBuf,
    /// Registry cache time-to-live, in seconds. Unset means no expiry.
    pub cache_ttl_secs: Option<u64>,
    /// Literal cache-key variation values. A computed variation function can
    /// be supplied through the manager builder instead.
    pub cache_variation: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            places: Vec::new(),
            base_namespace: "app.modules".to_owned(),
            auto_activate: false,
            entry_pattern: "*Module.json".to_owned(),
            strip_suffixes: vec!["Clone".to_owned()],
            work_dir: std::env::temp_dir().join("modhost"),
            cache_ttl_secs: None,
            cache_variation: Vec::new(),
        }
    }
}

impl ManagerConfig {
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}
