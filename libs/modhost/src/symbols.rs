//! Process-wide, append-only entry-symbol table.
//!
//! Once an entry class is bound in normal mode it stays bound for the rest of
//! the process: bindings are never replaced or removed. A second normal-mode
//! load of an already-bound class yields the *original* unit, which is why
//! speculative reads of not-yet-installed code must go through the isolated
//! shadow-copy path instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::manifest::ModuleManifest;

/// A loaded entry unit: the manifest as it was at first load, plus the file
/// it was loaded from.
#[derive(Clone, Debug)]
pub struct LoadedUnit {
    pub class: String,
    pub file: PathBuf,
    pub manifest: ModuleManifest,
}

/// Append-only map of fully-qualified entry class name to loaded unit.
#[derive(Debug, Default)]
pub struct SymbolTable {
    inner: RwLock<HashMap<String, Arc<LoadedUnit>>>,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `class -> file` and returns the loaded unit.
    ///
    /// If the class is already bound the existing unit is returned unchanged;
    /// the new file is ignored.
    pub fn bind(&self, manifest: &ModuleManifest, file: &Path) -> Arc<LoadedUnit> {
        let mut map = self.inner.write();
        Arc::clone(map.entry(manifest.class.clone()).or_insert_with(|| {
            Arc::new(LoadedUnit {
                class: manifest.class.clone(),
                file: file.to_path_buf(),
                manifest: manifest.clone(),
            })
        }))
    }

    #[must_use]
    pub fn get(&self, class: &str) -> Option<Arc<LoadedUnit>> {
        self.inner.read().get(class).cloned()
    }

    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.inner.read().contains_key(class)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
