//! Capability traits implemented by module code.

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;

use crate::events::HostEvent;
use crate::host::AppHost;

/// The app-module capability: the interface a live module instance exposes to
/// the lifecycle manager.
///
/// The lifecycle hooks return `Ok(true)` by default, so a module only
/// overrides the steps it actually participates in. A hook returning
/// `Ok(false)` declines the operation; returning `Err` aborts it.
#[async_trait]
pub trait AppModule: Send + Sync + 'static {
    /// The module id this instance was constructed for.
    fn id(&self) -> &str;

    /// Live version of the instance, when it tracks one.
    fn version(&self) -> Option<Version> {
        None
    }

    /// Updates the live instance's version field after an upgrade.
    fn set_version(&self, _version: Version) {}

    async fn install(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn uninstall(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Module-side upgrade routine. Absence (the default) is success.
    async fn upgrade(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Invoked at wiring time for descriptors with the `bootstrap` flag.
    fn bootstrap(&self, _host: &AppHost) -> anyhow::Result<()> {
        Ok(())
    }

    /// The module-level event handler object, if the module subscribes to
    /// host events.
    fn event_handler(&self) -> Option<Arc<dyn ModuleEventHandler>> {
        None
    }
}

/// Handler object a module supplies for routed host events.
pub trait ModuleEventHandler: Send + Sync {
    /// Invokes the handler bound to `selector`, if any.
    ///
    /// Returns `Ok(true)` when a named handler consumed the event and
    /// `Ok(false)` when no handler is bound to that selector (the router then
    /// falls back to [`handle_module_event`](Self::handle_module_event)).
    ///
    /// # Errors
    /// Any error from the handler body.
    fn handle_named(&self, selector: &str, event: &HostEvent) -> anyhow::Result<bool> {
        let _ = (selector, event);
        Ok(false)
    }

    /// Generic fallback invoked when no named handler matched.
    ///
    /// # Errors
    /// Any error from the handler body.
    fn handle_module_event(&self, event: &HostEvent, module: &dyn AppModule)
    -> anyhow::Result<()>;
}

/// Constructs live module instances for an entry class.
///
/// Factories are the compiled-in counterpart of the entry-symbol table: the
/// host instantiates a module slot through the factory registered for the
/// slot's class.
pub trait ModuleFactory: Send + Sync {
    fn create(&self, id: &str) -> Arc<dyn AppModule>;
}

impl<F> ModuleFactory for F
where
    F: Fn(&str) -> Arc<dyn AppModule> + Send + Sync,
{
    fn create(&self, id: &str) -> Arc<dyn AppModule> {
        self(id)
    }
}
