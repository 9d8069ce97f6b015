//! Module catalog: filesystem discovery behind a cached registry.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::cache::{CacheDependency, CacheKey, CacheVariation, RegistryCache, VariationSource};
use crate::descriptor::{ChildModule, ModuleDescriptor, Registry};
use crate::error::ModuleError;
use crate::reader::DescriptorReader;

/// Fixed tag component of the registry cache key.
pub const CACHE_TAG: &str = "modhost.catalog";

/// A named root location scanned for module entry files.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Place {
    pub alias: String,
    pub path: PathBuf,
}

/// Attribute-match predicate over descriptors.
///
/// Scalar values compare by equality against the serialized descriptor
/// attribute; array values require every item to be present in the attribute
/// treated as a set (array elements, or map keys). An empty filter matches
/// everything.
#[derive(Clone, Debug, Default)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(attribute.into(), value.into());
        self
    }

    #[must_use]
    pub fn id(id: &str) -> Self {
        Self::new().with("id", id)
    }

    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self::new().with("enabled", enabled)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn matches(&self, descriptor: &ModuleDescriptor) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let Ok(snapshot) = serde_json::to_value(descriptor) else {
            return false;
        };
        self.0.iter().all(|(attribute, wanted)| {
            let actual = snapshot.get(attribute);
            match wanted {
                Value::Array(items) => actual.is_some_and(|a| contains_all(a, items)),
                scalar => actual == Some(scalar),
            }
        })
    }
}

fn contains_all(attribute: &Value, items: &[Value]) -> bool {
    match attribute {
        Value::Array(elements) => items.iter().all(|item| elements.contains(item)),
        Value::Object(map) => items.iter().all(|item| {
            item.as_str()
                .is_some_and(|key| map.contains_key(key))
        }),
        _ => false,
    }
}

/// One category bucket produced by [`ModuleCatalog::categories`].
#[derive(Clone, Debug)]
pub struct CategoryGroup {
    pub caption: String,
    pub count: usize,
    pub modules: Vec<Arc<ModuleDescriptor>>,
}

/// Scans configured places for entry files and materializes the cached
/// registry of module descriptors.
pub struct ModuleCatalog {
    reader: DescriptorReader,
    cache: Arc<dyn RegistryCache>,
    places: Vec<Place>,
    pattern: glob::Pattern,
    variation: VariationSource,
    ttl: Option<Duration>,
    dependency: Option<Arc<dyn CacheDependency>>,
}

impl ModuleCatalog {
    #[must_use]
    pub fn new(
        reader: DescriptorReader,
        cache: Arc<dyn RegistryCache>,
        places: Vec<Place>,
        pattern: glob::Pattern,
        variation: CacheVariation,
        ttl: Option<Duration>,
        dependency: Option<Arc<dyn CacheDependency>>,
    ) -> Self {
        Self {
            reader,
            cache,
            places,
            pattern,
            variation: VariationSource::new(variation),
            ttl,
            dependency,
        }
    }

    #[must_use]
    pub fn reader(&self) -> &DescriptorReader {
        &self.reader
    }

    #[must_use]
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    #[must_use]
    pub fn entry_pattern(&self) -> &glob::Pattern {
        &self.pattern
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            tag: CACHE_TAG,
            variation: self.variation.resolve().to_vec(),
        }
    }

    /// Returns the registry, from cache or from a fresh discovery pass.
    ///
    /// # Errors
    /// Propagates discovery failures.
    pub fn list(&self) -> Result<Registry, ModuleError> {
        let key = self.cache_key();
        self.cache.get_or_set(
            &key,
            &mut || self.discover(),
            self.ttl,
            self.dependency.as_deref(),
        )
    }

    /// Applies `filter` over the cached registry.
    ///
    /// # Errors
    /// Propagates discovery failures.
    pub fn list_filtered(&self, filter: &Filter) -> Result<Registry, ModuleError> {
        let registry = self.list()?;
        if filter.is_empty() {
            return Ok(registry);
        }
        Ok(registry
            .into_iter()
            .filter(|(_, descriptor)| filter.matches(descriptor))
            .collect())
    }

    /// Looks a single module up by id.
    ///
    /// # Errors
    /// Propagates discovery failures.
    pub fn get_by_id(&self, id: &str) -> Result<Option<Arc<ModuleDescriptor>>, ModuleError> {
        let matched = self.list_filtered(&Filter::id(id))?;
        Ok(matched.into_values().next())
    }

    /// Groups the filtered registry by category.
    ///
    /// # Errors
    /// Propagates discovery failures.
    pub fn categories(&self, filter: &Filter) -> Result<Vec<CategoryGroup>, ModuleError> {
        let mut buckets: BTreeMap<String, Vec<Arc<ModuleDescriptor>>> = BTreeMap::new();
        for descriptor in self.list_filtered(filter)?.into_values() {
            buckets
                .entry(descriptor.category.clone())
                .or_default()
                .push(descriptor);
        }
        Ok(buckets
            .into_iter()
            .map(|(caption, modules)| CategoryGroup {
                caption,
                count: modules.len(),
                modules,
            })
            .collect())
    }

    /// Deletes the cached registry snapshot. Symbol and alias registrations
    /// made while building it remain for the process lifetime.
    pub fn invalidate(&self) {
        self.cache.delete(&self.cache_key());
    }

    /// One full discovery pass over every configured place.
    ///
    /// Parent/child folding is a second pass over the collected descriptors,
    /// so a child discovered before its parent still ends up nested.
    fn discover(&self) -> Result<Registry, ModuleError> {
        let mut by_id: BTreeMap<String, ModuleDescriptor> = BTreeMap::new();
        for place in &self.places {
            for entry in walkdir::WalkDir::new(&place.path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if !self.pattern.matches(&name) {
                    continue;
                }
                if let Some(descriptor) = self.reader.read(entry.path(), false)? {
                    tracing::debug!(
                        place = %place.alias,
                        id = %descriptor.id,
                        version = %descriptor.version,
                        "discovered module"
                    );
                    by_id.insert(descriptor.id.clone(), descriptor);
                }
            }
        }

        let child_ids: Vec<String> = by_id
            .values()
            .filter(|descriptor| {
                descriptor
                    .parent_module
                    .as_ref()
                    .is_some_and(|parent| parent != &descriptor.id && by_id.contains_key(parent))
            })
            .map(|descriptor| descriptor.id.clone())
            .collect();
        for id in child_ids {
            let Some(child) = by_id.remove(&id) else {
                continue;
            };
            let Some(parent_id) = child.parent_module.clone() else {
                continue;
            };
            if let Some(parent) = by_id.get_mut(&parent_id) {
                parent.modules.insert(
                    child.id.clone(),
                    ChildModule {
                        class: child.class.clone(),
                        version: child.version.clone(),
                    },
                );
            }
        }

        tracing::info!(count = by_id.len(), "module discovery complete");
        Ok(by_id
            .into_iter()
            .map(|(id, descriptor)| (id, Arc::new(descriptor)))
            .collect())
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("places", &self.places)
            .field("pattern", &self.pattern.as_str())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
