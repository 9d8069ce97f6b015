//! Lifecycle controller: install, uninstall, upgrade, state changes, reset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::{CacheDependency, CacheVariation, MemoryCache, RegistryCache};
use crate::catalog::{Filter, ModuleCatalog};
use crate::config::ManagerConfig;
use crate::contracts::AppModule;
use crate::descriptor::{ModuleDescriptor, Registry};
use crate::error::{ManagerError, ModuleError};
use crate::events::EventRouter;
use crate::fsutil;
use crate::host::{AppHost, ModuleSlot};
use crate::reader::DescriptorReader;
use crate::symbols::SymbolTable;

/// Lifecycle hook identifiers, fired around every state-changing operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    BeforeInstall,
    AfterInstall,
    BeforeUninstall,
    AfterUninstall,
    BeforeChangeState,
    AfterChangeState,
    BeforeUpgrade,
    AfterUpgrade,
}

/// Transient value passed through the before/after hook protocol.
pub struct ModuleEvent {
    /// The live instance the operation targets.
    pub module: Arc<dyn AppModule>,
    /// A before-hook may set this to `false` to veto the operation.
    pub is_valid: bool,
    pub handled: bool,
}

impl ModuleEvent {
    #[must_use]
    pub fn new(module: Arc<dyn AppModule>) -> Self {
        Self {
            module,
            is_valid: true,
            handled: false,
        }
    }
}

impl std::fmt::Debug for ModuleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEvent")
            .field("module", &self.module.id())
            .field("is_valid", &self.is_valid)
            .field("handled", &self.handled)
            .finish()
    }
}

type HookFn = Box<dyn Fn(&mut ModuleEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug)]
enum StateChange {
    TurnOn,
    TurnOff,
    Toggle,
}

impl StateChange {
    fn op(self) -> &'static str {
        match self {
            Self::TurnOn => "turnOn",
            Self::TurnOff => "turnOff",
            Self::Toggle => "toggle",
        }
    }
}

/// The single code path shared by install, uninstall and state changes,
/// parameterized only by the target method.
enum ExecOp<'a> {
    Install,
    Uninstall,
    State(StateChange, &'a mut ModuleDescriptor),
}

impl ExecOp<'_> {
    fn hooks(&self) -> (LifecycleEvent, LifecycleEvent) {
        match self {
            Self::Install => (LifecycleEvent::BeforeInstall, LifecycleEvent::AfterInstall),
            Self::Uninstall => (
                LifecycleEvent::BeforeUninstall,
                LifecycleEvent::AfterUninstall,
            ),
            Self::State(..) => (
                LifecycleEvent::BeforeChangeState,
                LifecycleEvent::AfterChangeState,
            ),
        }
    }

    fn op(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::State(state, _) => state.op(),
        }
    }
}

/// Builder wiring the manager's collaborators together.
pub struct ManagerBuilder {
    config: ManagerConfig,
    host: Arc<AppHost>,
    cache: Option<Arc<dyn RegistryCache>>,
    dependency: Option<Arc<dyn CacheDependency>>,
    variation: Option<CacheVariation>,
}

impl ManagerBuilder {
    #[must_use]
    pub fn new(config: ManagerConfig, host: Arc<AppHost>) -> Self {
        Self {
            config,
            host,
            cache: None,
            dependency: None,
            variation: None,
        }
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn RegistryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn cache_dependency(mut self, dependency: Arc<dyn CacheDependency>) -> Self {
        self.dependency = Some(dependency);
        self
    }

    #[must_use]
    pub fn cache_variation(mut self, variation: CacheVariation) -> Self {
        self.variation = Some(variation);
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    /// `ModuleError::Misconfigured` when the entry pattern is not a valid glob.
    pub fn build(self) -> Result<Manager, ModuleError> {
        let pattern = glob::Pattern::new(&self.config.entry_pattern).map_err(|error| {
            ModuleError::Misconfigured(format!(
                "invalid entry pattern '{}': {error}",
                self.config.entry_pattern
            ))
        })?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()) as Arc<dyn RegistryCache>);
        let variation = self
            .variation
            .unwrap_or_else(|| CacheVariation::Literal(self.config.cache_variation.clone()));
        let reader = DescriptorReader::new(Arc::new(SymbolTable::new()), Arc::clone(&self.host));
        let catalog = Arc::new(ModuleCatalog::new(
            reader,
            cache,
            self.config.places.clone(),
            pattern,
            variation,
            self.config.cache_ttl(),
            self.dependency,
        ));
        let router = EventRouter::new(Arc::clone(&self.host), self.config.strip_suffixes.clone());
        Ok(Manager {
            host: self.host,
            catalog,
            router,
            config: self.config,
            listeners: RwLock::new(HashMap::new()),
        })
    }
}

/// Drives modules through the install / enable / upgrade / uninstall
/// lifecycle, one module at a time.
///
/// The manager exclusively owns registry mutation: every operation that
/// changes on-disk module state invalidates the catalog cache before
/// reporting success. A single administrative actor is assumed; there is no
/// locking discipline for concurrent installers.
pub struct Manager {
    host: Arc<AppHost>,
    catalog: Arc<ModuleCatalog>,
    router: EventRouter,
    config: ManagerConfig,
    listeners: RwLock<HashMap<LifecycleEvent, Vec<HookFn>>>,
}

impl Manager {
    /// Shorthand for [`ManagerBuilder::new`].
    #[must_use]
    pub fn builder(config: ManagerConfig, host: Arc<AppHost>) -> ManagerBuilder {
        ManagerBuilder::new(config, host)
    }

    #[must_use]
    pub fn host(&self) -> &Arc<AppHost> {
        &self.host
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<ModuleCatalog> {
        &self.catalog
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Attaches a lifecycle hook listener.
    pub fn on(&self, event: LifecycleEvent, listener: impl Fn(&mut ModuleEvent) + Send + Sync + 'static) {
        self.listeners
            .write()
            .entry(event)
            .or_default()
            .push(Box::new(listener));
    }

    fn fire(&self, kind: LifecycleEvent, event: &mut ModuleEvent) {
        let listeners = self.listeners.read();
        if let Some(hooks) = listeners.get(&kind) {
            for hook in hooks {
                hook(event);
            }
        }
    }

    /// Boot-time wiring: adds every enabled module to the host and populates
    /// the event router from the catalog.
    ///
    /// # Errors
    /// Propagates discovery and wiring failures.
    pub fn bootstrap(&self) -> Result<(), ModuleError> {
        let enabled = self.catalog.list_filtered(&Filter::enabled(true))?;
        for descriptor in enabled.values() {
            self.wire_module(descriptor)?;
            self.router.register(descriptor);
        }
        tracing::info!(modules = enabled.len(), "bootstrapped enabled modules");
        Ok(())
    }

    /// Installs a module from a local zip archive.
    ///
    /// An archive whose module id already exists in the registry is routed
    /// through [`upgrade`](Self::upgrade) instead; a declined upgrade fails
    /// the install and leaves the existing install untouched.
    ///
    /// # Errors
    /// Every underlying failure is caught and surfaced as a [`ManagerError`]
    /// message. Partially-extracted temp directories are left for operator
    /// cleanup.
    pub async fn install(&self, archive: &Path) -> Result<(), ManagerError> {
        self.install_inner(archive)
            .await
            .map_err(|error| ManagerError::new("install", &error))
    }

    async fn install_inner(&self, archive: &Path) -> Result<(), ModuleError> {
        let tmp = self.fresh_tmp_dir(archive)?;
        fsutil::extract_archive(archive, &tmp)?;

        let entry = self.find_entry(&tmp)?;
        let incoming = self
            .catalog
            .reader()
            .read(&entry, true)?
            .ok_or_else(|| ModuleError::InvalidDescriptor {
                path: entry.clone(),
                reason: "archive entry is not a valid app module".to_owned(),
            })?;

        if let Some(existing) = self.catalog.get_by_id(&incoming.id)? {
            tracing::info!(id = %incoming.id, "module already installed, routing through upgrade");
            return if self.upgrade(&existing, &incoming).await? {
                Ok(())
            } else {
                Err(ModuleError::OperationFailed {
                    module: incoming.id.clone(),
                    op: "upgrade",
                })
            };
        }

        let dest = self.installed_path(&incoming.id)?;
        fsutil::move_dir(&tmp, &dest)?;
        self.catalog.invalidate();

        let descriptor = self
            .catalog
            .get_by_id(&incoming.id)?
            .ok_or_else(|| ModuleError::NotFound {
                id: incoming.id.clone(),
            })?;
        self.wire_module(&descriptor)?;
        let module = self.resolve_instance(&descriptor)?;

        if self.execute(&module, ExecOp::Install).await? && self.config.auto_activate {
            self.turn_on(&descriptor.id).await?;
        }
        tracing::info!(id = %descriptor.id, version = %descriptor.version, "module installed");
        Ok(())
    }

    /// Uninstalls a module: runs the uninstall hook sequence and, when the
    /// module consents, removes its on-disk directory.
    ///
    /// # Errors
    /// Every underlying failure is caught and surfaced as a [`ManagerError`]
    /// message.
    pub async fn uninstall(&self, id: &str) -> Result<(), ManagerError> {
        self.uninstall_inner(id)
            .await
            .map_err(|error| ManagerError::new("uninstall", &error))
    }

    async fn uninstall_inner(&self, id: &str) -> Result<(), ModuleError> {
        let (module, descriptor) = self.load_module(id)?;
        if self.execute(&module, ExecOp::Uninstall).await? {
            fsutil::remove_dir(&descriptor.path)?;
            tracing::info!(id, "module uninstalled");
        } else {
            tracing::warn!(id, "module declined uninstall, files kept");
        }
        self.catalog.invalidate();
        Ok(())
    }

    /// Replaces an existing install with a newer one.
    ///
    /// An incoming version not strictly greater than the existing one is an
    /// idempotent no-op success. Returns `Ok(false)` when the incoming
    /// instance's own upgrade routine declines; the operation aborts before
    /// any directory swap then.
    ///
    /// # Errors
    /// Propagated as-is; upgrade is normally reached through the guarded
    /// install path.
    pub async fn upgrade(
        &self,
        existing: &ModuleDescriptor,
        incoming: &ModuleDescriptor,
    ) -> Result<bool, ModuleError> {
        if incoming.version <= existing.version {
            tracing::debug!(
                id = %existing.id,
                existing = %existing.version,
                incoming = %incoming.version,
                "upgrade no-op"
            );
            return Ok(true);
        }

        let instance = self
            .host
            .create_instance(&incoming.class, &incoming.id)
            .ok_or_else(|| ModuleError::UnknownClass {
                class: incoming.class.clone(),
            })?;

        let mut event = ModuleEvent::new(Arc::clone(&instance));
        self.fire(LifecycleEvent::BeforeUpgrade, &mut event);

        if !instance
            .upgrade()
            .await
            .map_err(|source| ModuleError::hook(incoming.id.clone(), source))?
        {
            tracing::warn!(id = %incoming.id, "module declined upgrade");
            return Ok(false);
        }

        fsutil::remove_dir(&existing.path)?;
        fsutil::move_dir(&incoming.path, &existing.path)?;
        instance.set_version(incoming.version.clone());
        self.catalog.invalidate();

        let mut after = ModuleEvent::new(instance);
        self.fire(LifecycleEvent::AfterUpgrade, &mut after);
        tracing::info!(
            id = %incoming.id,
            from = %existing.version,
            to = %incoming.version,
            "module upgraded"
        );
        Ok(true)
    }

    /// Enables a module. A before-hook veto skips the change silently.
    ///
    /// # Errors
    /// Propagates lookup and persistence failures.
    pub async fn turn_on(&self, id: &str) -> Result<ModuleDescriptor, ModuleError> {
        self.change_state(id, StateChange::TurnOn).await
    }

    /// Disables a module. A before-hook veto skips the change silently.
    ///
    /// # Errors
    /// Propagates lookup and persistence failures.
    pub async fn turn_off(&self, id: &str) -> Result<ModuleDescriptor, ModuleError> {
        self.change_state(id, StateChange::TurnOff).await
    }

    /// Flips a module's activation flag.
    ///
    /// # Errors
    /// Propagates lookup and persistence failures.
    pub async fn toggle(&self, id: &str) -> Result<ModuleDescriptor, ModuleError> {
        self.change_state(id, StateChange::Toggle).await
    }

    async fn change_state(
        &self,
        id: &str,
        state: StateChange,
    ) -> Result<ModuleDescriptor, ModuleError> {
        let (module, mut descriptor) = self.load_module(id)?;
        self.execute(&module, ExecOp::State(state, &mut descriptor))
            .await?;
        self.catalog.invalidate();
        Ok(descriptor)
    }

    /// Re-initializes a module in place: uninstall hook sequence followed, on
    /// consent, by the install hook sequence, without touching files.
    ///
    /// # Errors
    /// Every underlying failure is caught and surfaced as a [`ManagerError`]
    /// message. A successful uninstall followed by a failing install is not
    /// rolled back.
    pub async fn reset(&self, id: &str) -> Result<(), ManagerError> {
        self.reset_inner(id)
            .await
            .map_err(|error| ManagerError::new("reset", &error))
    }

    async fn reset_inner(&self, id: &str) -> Result<(), ModuleError> {
        let (module, _descriptor) = self.load_module(id)?;
        if self.execute(&module, ExecOp::Uninstall).await? {
            self.execute(&module, ExecOp::Install).await?;
        }
        if self.config.auto_activate {
            self.change_state(id, StateChange::TurnOn).await?;
        }
        self.catalog.invalidate();
        tracing::info!(id, "module reset");
        Ok(())
    }

    /// Generic method execution: before hook, veto check, target method,
    /// after hook on a truthy result.
    async fn execute(
        &self,
        module: &Arc<dyn AppModule>,
        mut op: ExecOp<'_>,
    ) -> Result<bool, ModuleError> {
        let (before, after) = op.hooks();
        let mut event = ModuleEvent::new(Arc::clone(module));
        self.fire(before, &mut event);
        if !event.is_valid {
            tracing::debug!(module = %module.id(), op = op.op(), "operation vetoed by before hook");
            return Ok(false);
        }

        let ok = match &mut op {
            ExecOp::Install => module
                .install()
                .await
                .map_err(|source| ModuleError::hook(module.id().to_owned(), source))?,
            ExecOp::Uninstall => module
                .uninstall()
                .await
                .map_err(|source| ModuleError::hook(module.id().to_owned(), source))?,
            ExecOp::State(state, descriptor) => match state {
                StateChange::TurnOn => descriptor.turn_on()?,
                StateChange::TurnOff => descriptor.turn_off()?,
                StateChange::Toggle => descriptor.toggle()?,
            },
        };

        if ok {
            event.handled = false;
            self.fire(after, &mut event);
        }
        Ok(ok)
    }

    /// Resolves a module id to its descriptor and live instance, wiring the
    /// module into the host if it is not there yet.
    fn load_module(&self, id: &str) -> Result<(Arc<dyn AppModule>, ModuleDescriptor), ModuleError> {
        let descriptor = self
            .catalog
            .get_by_id(id)?
            .ok_or_else(|| ModuleError::NotFound { id: id.to_owned() })?;
        self.wire_module(&descriptor)?;
        let module = self.resolve_instance(&descriptor)?;
        Ok((module, (*descriptor).clone()))
    }

    fn resolve_instance(
        &self,
        descriptor: &ModuleDescriptor,
    ) -> Result<Arc<dyn AppModule>, ModuleError> {
        self.host
            .get_module(&descriptor.id)
            .ok_or_else(|| ModuleError::UnknownClass {
                class: descriptor.class.clone(),
            })
    }

    /// Wires one descriptor into the host: module slot, namespace alias when
    /// it deviates from the base-namespace convention, URL rules, bootstrap.
    fn wire_module(&self, descriptor: &ModuleDescriptor) -> Result<(), ModuleError> {
        self.host.set_module(
            &descriptor.id,
            ModuleSlot {
                class: descriptor.class.clone(),
                version: descriptor.version.clone(),
                modules: descriptor.modules.clone(),
            },
        );

        let conventional = format!("{}.{}", self.config.base_namespace, descriptor.id);
        if descriptor.namespace != conventional {
            self.host
                .set_alias(&descriptor.namespace, Some(descriptor.path.clone()));
        }

        if !descriptor.url_rules.is_empty() {
            self.host
                .add_rules(&descriptor.url_rules, descriptor.append_routes);
        }

        if descriptor.bootstrap {
            if let Some(module) = self.host.get_module(&descriptor.id) {
                module
                    .bootstrap(&self.host)
                    .map_err(|source| ModuleError::hook(descriptor.id.clone(), source))?;
            }
        }
        Ok(())
    }

    /// A fresh extraction directory under the work dir, named after the
    /// archive.
    fn fresh_tmp_dir(&self, archive: &Path) -> Result<PathBuf, ModuleError> {
        let stem = archive
            .file_stem()
            .map_or_else(|| "archive".to_owned(), |s| s.to_string_lossy().into_owned());
        let tmp = self.config.work_dir.join(stem);
        fsutil::recreate_dir(&tmp)?;
        Ok(tmp)
    }

    /// The single entry file at the extracted archive's root.
    fn find_entry(&self, dir: &Path) -> Result<PathBuf, ModuleError> {
        let pattern = self.catalog.entry_pattern();
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .is_some_and(|n| pattern.matches(&n.to_string_lossy()))
            })
            .collect();
        entries.sort();
        match entries.len() {
            1 => Ok(entries.remove(0)),
            0 => Err(ModuleError::InvalidDescriptor {
                path: dir.to_path_buf(),
                reason: "archive contains no entry file".to_owned(),
            }),
            _ => Err(ModuleError::InvalidDescriptor {
                path: dir.to_path_buf(),
                reason: "archive contains more than one entry file".to_owned(),
            }),
        }
    }

    /// Canonical installed path for a module id: first place root / id.
    fn installed_path(&self, id: &str) -> Result<PathBuf, ModuleError> {
        let place = self.config.places.first().ok_or_else(|| {
            ModuleError::Misconfigured("no module places configured".to_owned())
        })?;
        Ok(place.path.join(id))
    }

    /// Convenience passthrough: the registry as the catalog sees it.
    ///
    /// # Errors
    /// Propagates discovery failures.
    pub fn list(&self) -> Result<Registry, ModuleError> {
        self.catalog.list()
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}
