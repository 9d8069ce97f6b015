//! Host event bus and the per-module event routing layer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::descriptor::{EventRouting, ModuleDescriptor};
use crate::error::ModuleError;
use crate::host::AppHost;

/// An event raised by the host application.
#[derive(Clone, Debug)]
pub struct HostEvent {
    /// Event name, e.g. `afterLogin`.
    pub name: String,
    /// Fully-qualified name of the raising source class.
    pub source_class: String,
    pub payload: serde_json::Value,
}

impl HostEvent {
    #[must_use]
    pub fn new(source_class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_class: source_class.into(),
            payload: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

type Listener = Arc<dyn Fn(&HostEvent) -> Result<(), ModuleError> + Send + Sync>;

/// Generic (source class, event name) bus with synchronous dispatch.
///
/// Subscriptions are process-wide and additive; there is no unsubscribe.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<(String, String), Vec<Listener>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, source_class: &str, event_name: &str, listener: Listener) {
        self.listeners
            .write()
            .entry((source_class.to_owned(), event_name.to_owned()))
            .or_default()
            .push(listener);
    }

    /// Synchronously invokes every listener attached to the event's
    /// (source class, name) pair, stopping at the first failure.
    ///
    /// # Errors
    /// The first listener error, unchanged.
    pub fn trigger(&self, event: &HostEvent) -> Result<(), ModuleError> {
        let matched = {
            let listeners = self.listeners.read();
            listeners
                .get(&(event.source_class.clone(), event.name.clone()))
                .cloned()
                .unwrap_or_default()
        };
        for listener in matched {
            listener(event)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Routes subscribed host events to module-supplied handler objects.
///
/// Handler selectors are resolved once, at registration time; dispatch never
/// synthesizes names from runtime type information.
pub struct EventRouter {
    host: Arc<AppHost>,
    strip_suffixes: Vec<String>,
}

impl EventRouter {
    #[must_use]
    pub fn new(host: Arc<AppHost>, strip_suffixes: Vec<String>) -> Self {
        Self {
            host,
            strip_suffixes,
        }
    }

    /// Attaches one bus listener per (source class, event name) pair in the
    /// descriptor's subscription map, carrying the descriptor as context.
    pub fn register(&self, descriptor: &Arc<ModuleDescriptor>) {
        for (source_class, events) in &descriptor.events {
            for (event_name, selector) in events {
                let selector = if selector.is_empty() {
                    derive_selector(source_class, event_name, &self.strip_suffixes)
                } else {
                    selector.clone()
                };
                tracing::debug!(
                    module = %descriptor.id,
                    source = %source_class,
                    event = %event_name,
                    selector = %selector,
                    "registering event subscription"
                );
                let ctx = DispatchContext {
                    host: Arc::clone(&self.host),
                    descriptor: Arc::clone(descriptor),
                    selector,
                };
                self.host.bus().on(
                    source_class,
                    event_name,
                    Arc::new(move |event| ctx.dispatch(event)),
                );
            }
        }
    }
}

struct DispatchContext {
    host: Arc<AppHost>,
    descriptor: Arc<ModuleDescriptor>,
    selector: String,
}

impl DispatchContext {
    fn dispatch(&self, event: &HostEvent) -> Result<(), ModuleError> {
        let id = &self.descriptor.id;
        let module = self
            .host
            .get_module(id)
            .ok_or_else(|| ModuleError::NotFound { id: id.clone() })?;
        let Some(handler) = module.event_handler() else {
            return Err(ModuleError::InvalidModule { id: id.clone() });
        };

        let handled = match self.descriptor.routing {
            EventRouting::Selector => handler
                .handle_named(&self.selector, event)
                .map_err(|source| ModuleError::hook(id.clone(), source))?,
            EventRouting::Direct => false,
        };
        if !handled {
            handler
                .handle_module_event(event, module.as_ref())
                .map_err(|source| ModuleError::hook(id.clone(), source))?;
        }
        Ok(())
    }
}

/// Derives the conventional handler selector for a subscription: lower-cased
/// source short name (with a configurable suffix stripped) concatenated with
/// the capitalized event name, e.g. `(app.user.Model, afterLogin)` ->
/// `modelAfterLogin`.
#[must_use]
pub fn derive_selector(source_class: &str, event_name: &str, strip_suffixes: &[String]) -> String {
    let mut short = source_class
        .rsplit(['.', ':'])
        .next()
        .unwrap_or(source_class)
        .to_owned();
    for suffix in strip_suffixes {
        if let Some(stem) = short.strip_suffix(suffix.as_str()) {
            if !stem.is_empty() {
                short = stem.to_owned();
            }
            break;
        }
    }
    format!("{}{}", lower_first(&short), upper_first(event_name))
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_lowercase().collect::<String>() + chars.as_str()
    })
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_uppercase().collect::<String>() + chars.as_str()
    })
}
