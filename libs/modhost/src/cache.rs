//! Registry cache backend.
//!
//! Discovery walks the filesystem and loads entry symbols, both expensive and
//! side-effectful, so the materialized registry is cached behind a key built
//! from a fixed tag plus caller-supplied variation data. An optional
//! dependency fingerprint lets an external signal (such as the entry-file set
//! of the scanned places) force re-discovery without an explicit invalidate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use xxhash_rust::xxh3::Xxh3;

use crate::descriptor::Registry;
use crate::error::ModuleError;

/// Cache key: fixed tag plus variation values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tag: &'static str,
    pub variation: Vec<String>,
}

/// Source of the cache key's variation values: a literal list, or a function
/// evaluated lazily, at most once per process.
pub enum CacheVariation {
    Literal(Vec<String>),
    Computed(Box<dyn Fn() -> Vec<String> + Send + Sync>),
}

impl std::fmt::Debug for CacheVariation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(values) => f.debug_tuple("Literal").field(values).finish(),
            Self::Computed(_) => f.debug_tuple("Computed").finish(),
        }
    }
}

/// Memoizing wrapper around [`CacheVariation`]: the computed form is invoked
/// once and its result reused for every subsequent key build.
#[derive(Debug)]
pub struct VariationSource {
    variation: CacheVariation,
    resolved: OnceLock<Vec<String>>,
}

impl VariationSource {
    #[must_use]
    pub fn new(variation: CacheVariation) -> Self {
        Self {
            variation,
            resolved: OnceLock::new(),
        }
    }

    pub fn resolve(&self) -> &[String] {
        self.resolved.get_or_init(|| match &self.variation {
            CacheVariation::Literal(values) => values.clone(),
            CacheVariation::Computed(compute) => compute(),
        })
    }
}

/// External invalidation signal for a cached registry.
///
/// The fingerprint is captured when the entry is stored; a later read with a
/// differing fingerprint is treated as a miss.
pub trait CacheDependency: Send + Sync {
    fn fingerprint(&self) -> u64;
}

/// Dependency over the entry-file set of the scanned places: any added,
/// removed or touched entry file changes the fingerprint.
#[derive(Debug)]
pub struct PlacesDependency {
    places: Vec<PathBuf>,
    pattern: glob::Pattern,
}

impl PlacesDependency {
    #[must_use]
    pub fn new(places: Vec<PathBuf>, pattern: glob::Pattern) -> Self {
        Self { places, pattern }
    }
}

impl CacheDependency for PlacesDependency {
    fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        for root in &self.places {
            let walk = walkdir::WalkDir::new(root).sort_by_file_name();
            for entry in walk.into_iter().filter_map(Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if !self.pattern.matches(&name) {
                    continue;
                }
                hasher.update(entry.path().to_string_lossy().as_bytes());
                let mtime = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_nanos());
                hasher.update(&mtime.to_le_bytes());
            }
        }
        hasher.digest()
    }
}

/// Key/value store for registry snapshots with get-or-set semantics.
pub trait RegistryCache: Send + Sync {
    /// Returns the cached registry for `key`, or computes, stores and returns
    /// a fresh one.
    ///
    /// # Errors
    /// Propagates the compute function's error; nothing is stored then.
    fn get_or_set(
        &self,
        key: &CacheKey,
        compute: &mut dyn FnMut() -> Result<Registry, ModuleError>,
        ttl: Option<Duration>,
        dependency: Option<&dyn CacheDependency>,
    ) -> Result<Registry, ModuleError>;

    /// Unconditionally deletes the entry for `key`.
    fn delete(&self, key: &CacheKey);
}

struct CacheEntry {
    value: Registry,
    stored_at: Instant,
    ttl: Option<Duration>,
    fingerprint: Option<u64>,
}

impl CacheEntry {
    fn is_fresh(&self, current_fingerprint: Option<u64>) -> bool {
        if let Some(ttl) = self.ttl {
            if self.stored_at.elapsed() > ttl {
                return false;
            }
        }
        match (self.fingerprint, current_fingerprint) {
            (Some(stored), Some(current)) => stored == current,
            // No dependency supplied on either side: nothing to compare.
            _ => true,
        }
    }
}

/// Process-scoped in-memory cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl RegistryCache for MemoryCache {
    fn get_or_set(
        &self,
        key: &CacheKey,
        compute: &mut dyn FnMut() -> Result<Registry, ModuleError>,
        ttl: Option<Duration>,
        dependency: Option<&dyn CacheDependency>,
    ) -> Result<Registry, ModuleError> {
        let current_fingerprint = dependency.map(CacheDependency::fingerprint);
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if entry.is_fresh(current_fingerprint) {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = compute()?;
        self.entries.write().insert(
            key.clone(),
            CacheEntry {
                value: value.clone(),
                stored_at: Instant::now(),
                ttl,
                fingerprint: current_fingerprint,
            },
        );
        Ok(value)
    }

    fn delete(&self, key: &CacheKey) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> CacheKey {
        CacheKey {
            tag: "test",
            variation: vec!["web".to_owned()],
        }
    }

    #[test]
    fn second_read_hits_the_cache() {
        let cache = MemoryCache::new();
        let computes = AtomicUsize::new(0);
        let mut compute = || {
            computes.fetch_add(1, Ordering::SeqCst);
            Ok(Registry::new())
        };
        cache.get_or_set(&key(), &mut compute, None, None).unwrap();
        cache.get_or_set(&key(), &mut compute, None, None).unwrap();
        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_forces_recompute() {
        let cache = MemoryCache::new();
        let computes = AtomicUsize::new(0);
        let mut compute = || {
            computes.fetch_add(1, Ordering::SeqCst);
            Ok(Registry::new())
        };
        cache.get_or_set(&key(), &mut compute, None, None).unwrap();
        cache.delete(&key());
        cache.get_or_set(&key(), &mut compute, None, None).unwrap();
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compute_failure_is_not_cached() {
        let cache = MemoryCache::new();
        let computes = AtomicUsize::new(0);
        let mut failing = || -> Result<Registry, ModuleError> {
            computes.fetch_add(1, Ordering::SeqCst);
            Err(ModuleError::Misconfigured("boom".to_owned()))
        };
        assert!(cache.get_or_set(&key(), &mut failing, None, None).is_err());
        let mut compute = || {
            computes.fetch_add(1, Ordering::SeqCst);
            Ok(Registry::new())
        };
        cache.get_or_set(&key(), &mut compute, None, None).unwrap();
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn changed_dependency_fingerprint_invalidates() {
        struct Flip(AtomicUsize);
        impl CacheDependency for Flip {
            fn fingerprint(&self) -> u64 {
                self.0.fetch_add(1, Ordering::SeqCst) as u64
            }
        }

        let cache = MemoryCache::new();
        let computes = AtomicUsize::new(0);
        let mut compute = || {
            computes.fetch_add(1, Ordering::SeqCst);
            Ok(Registry::new())
        };
        let dep = Flip(AtomicUsize::new(0));
        cache
            .get_or_set(&key(), &mut compute, None, Some(&dep))
            .unwrap();
        cache
            .get_or_set(&key(), &mut compute, None, Some(&dep))
            .unwrap();
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn places_dependency_tracks_the_entry_file_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ShopModule.json"), "{}").unwrap();
        let dep = PlacesDependency::new(
            vec![dir.path().to_path_buf()],
            glob::Pattern::new("*Module.json").unwrap(),
        );

        let before = dep.fingerprint();
        assert_eq!(before, dep.fingerprint());

        // Files outside the entry convention are invisible to the dependency.
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(before, dep.fingerprint());

        std::fs::write(dir.path().join("BlogModule.json"), "{}").unwrap();
        assert_ne!(before, dep.fingerprint());
    }

    #[test]
    fn variation_function_runs_once() {
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let calls_inner = std::sync::Arc::clone(&calls);
        let source = VariationSource::new(CacheVariation::Computed(Box::new(move || {
            calls_inner.fetch_add(1, Ordering::SeqCst);
            vec!["computed".to_owned()]
        })));
        assert_eq!(source.resolve(), ["computed".to_owned()]);
        assert_eq!(source.resolve(), ["computed".to_owned()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
