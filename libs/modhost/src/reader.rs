//! Descriptor reader: materializes module metadata from entry files.
//!
//! Normal mode permanently registers the entry symbol and namespace alias in
//! the process; isolated mode introspects a candidate through an ephemeral,
//! uniquely-named shadow copy so that not-yet-installed code can be examined
//! without colliding with an already-registered module of the same class.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use uuid::Uuid;

use crate::descriptor::ModuleDescriptor;
use crate::error::ModuleError;
use crate::host::AppHost;
use crate::manifest::ModuleManifest;
use crate::symbols::SymbolTable;

#[derive(Clone)]
pub struct DescriptorReader {
    symbols: Arc<SymbolTable>,
    host: Arc<AppHost>,
}

impl DescriptorReader {
    #[must_use]
    pub fn new(symbols: Arc<SymbolTable>, host: Arc<AppHost>) -> Self {
        Self { symbols, host }
    }

    #[must_use]
    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Reads a descriptor from `entry_file`.
    ///
    /// Returns `Ok(None)` when the file does not exist, cannot be parsed,
    /// declares no module id, or does not declare the app-module capability.
    ///
    /// In normal mode (`isolated = false`) the namespace alias and the
    /// class-to-file binding are registered for the rest of the process
    /// lifetime, *before* the capability check; a failed check does not roll
    /// them back. Re-reading the bound file itself always reflects its
    /// current content, but reading a *different* file for an already-bound
    /// class yields the originally loaded configuration.
    ///
    /// Isolated mode always probes through an ephemeral shadow copy: the real
    /// class is never bound and the alias table is left as it was found, so
    /// speculative reads of not-yet-installed code cannot pollute the
    /// process.
    ///
    /// # Errors
    /// Returns `ModuleError::Io` for filesystem failures other than a missing
    /// entry file.
    pub fn read(
        &self,
        entry_file: &Path,
        isolated: bool,
    ) -> Result<Option<ModuleDescriptor>, ModuleError> {
        if !entry_file.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(entry_file)?;
        let manifest: ModuleManifest = match serde_json::from_str(&raw) {
            Ok(manifest) => manifest,
            Err(error) => {
                tracing::debug!(file = %entry_file.display(), %error, "unparseable entry file");
                return Ok(None);
            }
        };

        // An id-less module has no registry key and no installed path; it is
        // rejected before anything is registered for it.
        if manifest.config.id.is_empty() {
            tracing::debug!(
                file = %entry_file.display(),
                class = %manifest.class,
                "entry file declares no module id"
            );
            return Ok(None);
        }

        if isolated {
            return self.read_shadow(entry_file, &manifest);
        }

        let path = entry_file.parent().unwrap_or_else(|| Path::new(""));

        // Registration happens before the capability check and is permanent
        // for the process; a failed check leaves it in place.
        self.host
            .set_alias(&manifest.namespace, Some(path.to_path_buf()));
        let unit = self.symbols.bind(&manifest, entry_file);

        // Re-reading the bound file itself is authoritative; a different file
        // for an already-bound class yields the originally loaded
        // configuration (only the runtime location reflects the new file).
        let effective = if unit.file == entry_file {
            &manifest
        } else {
            &unit.manifest
        };

        if !effective.is_app_module() {
            tracing::debug!(
                file = %entry_file.display(),
                class = %manifest.class,
                "entry does not declare the app-module capability"
            );
            return Ok(None);
        }

        let descriptor = ModuleDescriptor::from_manifest(
            effective,
            &manifest.class,
            &manifest.namespace,
            entry_file,
        );

        Ok(Some(descriptor))
    }

    /// Copies the entry file to a sibling with the class renamed to a fresh
    /// random suffix, reads *that* in normal mode, then deletes the copy.
    /// The original file's own symbol is never loaded.
    fn read_shadow(
        &self,
        entry_file: &Path,
        manifest: &ModuleManifest,
    ) -> Result<Option<ModuleDescriptor>, ModuleError> {
        let suffix = class_suffix();
        let mut shadow = manifest.clone();
        shadow.class = format!("{}{suffix}", manifest.class);
        let previous_alias = self.host.resolve_alias(&manifest.namespace);

        let dir = entry_file.parent().unwrap_or_else(|| Path::new(""));
        let shadow_file = dir.join(format!("Module{suffix}.json"));
        shadow.store(&shadow_file)?;

        tracing::debug!(
            original = %manifest.class,
            shadow = %shadow.class,
            "isolated read through shadow copy"
        );
        let result = self.read(&shadow_file, false);
        if let Err(error) = fs::remove_file(&shadow_file) {
            tracing::warn!(file = %shadow_file.display(), %error, "failed to remove shadow entry");
        }
        // The shadow read registered the namespace alias; put it back so the
        // probe leaves the alias table as it found it.
        self.host.set_alias(&manifest.namespace, previous_alias);

        // The suffix only existed to dodge the symbol binding: the caller
        // gets the descriptor under its real class and entry file.
        Ok(result?.map(|mut descriptor| {
            descriptor.class = manifest.class.clone();
            descriptor.entry_file = entry_file.to_path_buf();
            descriptor
        }))
    }
}

fn class_suffix() -> String {
    let id = Uuid::now_v7().simple().to_string();
    id[..10].to_owned()
}
