#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Plugin lifecycle management for host applications.
//!
//! `modhost` discovers installable modules on disk, materializes their
//! descriptors behind a dependency-aware cache, drives them through the
//! install / enable / upgrade / uninstall lifecycle, and routes host events
//! to module-supplied handlers.
//!
//! The moving parts:
//! - [`AppHost`] owns the live side: module slots and instances, path
//!   aliases, URL rules and the event bus.
//! - [`ModuleCatalog`] scans configured places for entry files and caches the
//!   resulting descriptor registry.
//! - [`Manager`] is the single mutation path for module state, firing
//!   before/after lifecycle hooks around every operation.
//! - [`EventRouter`] binds descriptor-declared event subscriptions to module
//!   handler objects at registration time.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod contracts;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod fsutil;
pub mod host;
pub mod manager;
pub mod manifest;
pub mod reader;
pub mod symbols;

#[cfg(test)]
pub(crate) mod testkit;

pub use cache::{CacheDependency, CacheKey, CacheVariation, MemoryCache, PlacesDependency, RegistryCache};
pub use catalog::{CategoryGroup, Filter, ModuleCatalog, Place};
pub use config::ManagerConfig;
pub use contracts::{AppModule, ModuleEventHandler, ModuleFactory};
pub use descriptor::{ChildModule, EventRouting, ModuleDescriptor, Registry, UrlRule};
pub use error::{ManagerError, ModuleError};
pub use events::{EventBus, EventRouter, HostEvent};
pub use host::{AppHost, ModuleSlot};
pub use manager::{LifecycleEvent, Manager, ManagerBuilder, ModuleEvent};
pub use manifest::{APP_MODULE_CAPABILITY, ManifestConfig, ModuleManifest};
pub use reader::DescriptorReader;
pub use symbols::{LoadedUnit, SymbolTable};
