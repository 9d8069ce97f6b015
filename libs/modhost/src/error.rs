//! Error types for discovery, caching and lifecycle operations.

use std::path::PathBuf;

/// Errors produced by the catalog, reader, router and lifecycle operations.
///
/// Hook vetoes are deliberately *not* represented here: a before-hook marking
/// an operation invalid is a short-circuit, reported as a `false` outcome.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// Module id could not be resolved in the registry.
    #[error("unknown module '{id}'")]
    NotFound { id: String },

    /// Entry file missing, unreadable, or not declaring the module capability.
    #[error("invalid module descriptor at {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    /// No factory is registered for the entry class.
    #[error("unknown module class '{class}'")]
    UnknownClass { class: String },

    /// The target method ran and declined (returned false).
    #[error("module '{module}' {op} declined")]
    OperationFailed { module: String, op: &'static str },

    /// A dispatched event reached a module without an event handler object.
    #[error("'{id}' is not a valid app module: no event handler")]
    InvalidModule { id: String },

    /// A module-supplied hook body failed.
    #[error("module '{module}' hook failed")]
    Hook {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("manager misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl ModuleError {
    pub(crate) fn hook(module: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Hook {
            module: module.into(),
            source,
        }
    }
}

/// Top-level failure of a guarded lifecycle entry point.
///
/// `install`, `uninstall` and `reset` catch every underlying failure and
/// surface it as the human-readable message carried here; callers never see
/// the raw error chain from these three operations.
#[derive(Debug, thiserror::Error)]
#[error("{op} failed: {message}")]
pub struct ManagerError {
    pub op: &'static str,
    pub message: String,
}

impl ManagerError {
    pub(crate) fn new(op: &'static str, source: &ModuleError) -> Self {
        Self {
            op,
            message: source.to_string(),
        }
    }
}
