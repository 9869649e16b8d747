// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout registry: a read-through cache of validated layout specs keyed by
// version, safe to share between scanning threads.
//
// Each version key owns a `OnceLock`, so the first request for a version
// loads it exactly once while other versions stay readable. Only layouts that
// load and validate stay cached; a miss gives its slot back.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use marksense_core::layout::{LayoutFile, normalize_version};
use marksense_core::{LayoutSpec, OmrError, Result};
use tracing::{debug, instrument, warn};

/// Where layout specs come from.
pub trait LayoutSource: Send + Sync {
    /// Load `version`. `Ok(None)` when the source has no such layout.
    fn load(&self, version: &str) -> Result<Option<LayoutSpec>>;
}

/// Reads `layout_<version>.json` files from a directory.
#[derive(Debug, Clone)]
pub struct DirLayoutSource {
    dir: PathBuf,
}

impl DirLayoutSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, version: &str) -> PathBuf {
        self.dir.join(format!("layout_{version}.json"))
    }
}

impl LayoutSource for DirLayoutSource {
    fn load(&self, version: &str) -> Result<Option<LayoutSpec>> {
        if version.is_empty() || version.contains(['/', '\\']) || version.contains("..") {
            return Err(OmrError::Layout {
                version: version.to_owned(),
                reason: "version is not a plain file-name component".into(),
            });
        }
        let path = self.path_for(version);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let mut file: LayoutFile = serde_json::from_str(&text)?;
        file.version.get_or_insert_with(|| version.to_owned());
        let spec = file.merge_over(LayoutSpec::baseline());
        spec.validate()?;
        Ok(Some(spec))
    }
}

/// Fixed in-memory set of layouts.
#[derive(Debug, Clone, Default)]
pub struct MemoryLayoutSource {
    layouts: HashMap<String, LayoutSpec>,
}

impl MemoryLayoutSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(mut self, spec: LayoutSpec) -> Self {
        self.layouts.insert(spec.version.clone(), spec);
        self
    }
}

impl LayoutSource for MemoryLayoutSource {
    fn load(&self, version: &str) -> Result<Option<LayoutSpec>> {
        Ok(self.layouts.get(version).cloned())
    }
}

type Slot = Arc<OnceLock<Option<Arc<LayoutSpec>>>>;

/// Memoising lookup of layout versions with fallback to the default version
/// and finally the built-in baseline. Lookups never fail.
pub struct LayoutRegistry {
    source: Box<dyn LayoutSource>,
    default_version: String,
    cache: RwLock<HashMap<String, Slot>>,
    baseline: Arc<LayoutSpec>,
}

impl LayoutRegistry {
    pub fn new(source: impl LayoutSource + 'static, default_version: impl Into<String>) -> Self {
        Self {
            source: Box::new(source),
            default_version: normalize_version(&default_version.into()),
            cache: RwLock::new(HashMap::new()),
            baseline: Arc::new(LayoutSpec::baseline()),
        }
    }

    /// Registry that only knows the baseline.
    pub fn baseline_only(default_version: impl Into<String>) -> Self {
        Self::new(MemoryLayoutSource::new(), default_version)
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Resolve a requested version. `None` or an unknown version yields the
    /// default version's layout, or the baseline when that is missing too.
    #[instrument(skip(self))]
    pub fn get(&self, version: Option<&str>) -> Arc<LayoutSpec> {
        let requested = version
            .map(normalize_version)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.default_version.clone());

        if let Some(spec) = self.lookup(&requested) {
            return spec;
        }
        if requested != self.default_version {
            debug!(requested = %requested, fallback = %self.default_version, "Unknown layout, using default");
            if let Some(spec) = self.lookup(&self.default_version) {
                return spec;
            }
        }
        debug!(requested = %requested, "Using baseline layout");
        Arc::clone(&self.baseline)
    }

    /// Number of versions held in the cache.
    pub fn cached_versions(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn lookup(&self, version: &str) -> Option<Arc<LayoutSpec>> {
        let slot = self.slot(version);
        let found = slot
            .get_or_init(|| match self.source.load(version) {
                Ok(Some(spec)) => match spec.validate() {
                    Ok(()) => {
                        debug!(version, "Layout loaded");
                        Some(Arc::new(spec))
                    }
                    Err(e) => {
                        warn!(version, error = %e, "Layout failed validation");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!(version, error = %e, "Layout could not be loaded");
                    None
                }
            })
            .clone();
        if found.is_none() {
            self.evict(version, &slot);
        }
        found
    }

    fn slot(&self, version: &str) -> Slot {
        if let Some(slot) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(version)
        {
            return Arc::clone(slot);
        }
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cache.entry(version.to_owned()).or_default())
    }

    /// Drop `slot` unless another thread has already replaced it.
    fn evict(&self, version: &str, slot: &Slot) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if cache.get(version).is_some_and(|cached| Arc::ptr_eq(cached, slot)) {
            cache.remove(version);
        }
    }
}

impl std::fmt::Debug for LayoutRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutRegistry")
            .field("default_version", &self.default_version)
            .field("cached_versions", &self.cached_versions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec(version: &str, width: u32) -> LayoutSpec {
        LayoutSpec {
            version: version.into(),
            warped_width: width,
            ..LayoutSpec::baseline()
        }
    }

    struct CountingSource {
        inner: MemoryLayoutSource,
        loads: Arc<AtomicUsize>,
    }

    impl LayoutSource for CountingSource {
        fn load(&self, version: &str) -> Result<Option<LayoutSpec>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(version)
        }
    }

    #[test]
    fn resolves_known_versions_and_normalises_numbers() {
        let source = MemoryLayoutSource::new()
            .with_layout(spec("v1", 1000))
            .with_layout(spec("v2", 800));
        let registry = LayoutRegistry::new(source, "v1");
        assert_eq!(registry.get(Some("v2")).warped_width, 800);
        assert_eq!(registry.get(Some("2")).warped_width, 800);
        assert_eq!(registry.get(None).version, "v1");
    }

    #[test]
    fn unknown_version_falls_back_to_default_then_baseline() {
        let registry = LayoutRegistry::new(MemoryLayoutSource::new().with_layout(spec("v1", 1000)), "v1");
        assert_eq!(registry.get(Some("v9")).version, "v1");

        let bare = LayoutRegistry::baseline_only("v1");
        assert_eq!(bare.get(Some("v9")).version, LayoutSpec::BASELINE_VERSION);
        assert_eq!(bare.get(None).version, LayoutSpec::BASELINE_VERSION);
    }

    #[test]
    fn each_version_is_loaded_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: MemoryLayoutSource::new().with_layout(spec("v1", 1000)),
            loads: Arc::clone(&loads),
        };
        let registry = Arc::new(LayoutRegistry::new(source, "v1"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get(Some("v1")).warped_width)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().expect("thread"), 1000);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        // Misses are asked for again and leave no entry behind.
        assert_eq!(registry.get(Some("v7")).version, "v1");
        assert_eq!(registry.get(Some("v7")).version, "v1");
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(registry.cached_versions(), 1);
    }

    #[test]
    fn unknown_versions_do_not_grow_the_cache() {
        let registry = LayoutRegistry::new(MemoryLayoutSource::new().with_layout(spec("v1", 1000)), "v1");
        for i in 0..10_000 {
            assert_eq!(registry.get(Some(&format!("x{i}"))).version, "v1");
        }
        assert_eq!(registry.cached_versions(), 1);

        let bare = LayoutRegistry::baseline_only("v1");
        for i in 0..100 {
            bare.get(Some(&format!("x{i}")));
        }
        assert_eq!(bare.cached_versions(), 0);
    }

    #[test]
    fn invalid_layouts_from_any_source_are_skipped() {
        let mut broken = spec("v2", 1000);
        broken.x_centers.truncate(2);
        let source = MemoryLayoutSource::new()
            .with_layout(spec("v1", 900))
            .with_layout(broken);
        let registry = LayoutRegistry::new(source, "v1");
        let resolved = registry.get(Some("v2"));
        assert_eq!(resolved.version, "v1");
        assert_eq!(resolved.warped_width, 900);
        assert_eq!(registry.cached_versions(), 1);

        let mut broken_default = spec("v1", 1000);
        broken_default.options.clear();
        let fallback = LayoutRegistry::new(MemoryLayoutSource::new().with_layout(broken_default), "v1");
        assert_eq!(fallback.get(None).version, LayoutSpec::BASELINE_VERSION);
    }

    #[test]
    fn directory_source_merges_partial_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let dir = tmp.path();
        std::fs::write(
            dir.join("layout_v3.json"),
            r#"{"warped_size": {"w": 600, "h": 900}, "num_questions": 30}"#,
        )
        .expect("write layout");
        std::fs::write(dir.join("layout_bad.json"), r#"{"y_start_pct": 0.9, "y_end_pct": 0.1}"#)
            .expect("write layout");

        let source = DirLayoutSource::new(dir);
        let spec = source.load("v3").expect("load").expect("present");
        assert_eq!(spec.version, "v3");
        assert_eq!((spec.warped_width, spec.warped_height, spec.question_count), (600, 900, 30));
        assert_eq!(spec.options.len(), 5);

        assert!(source.load("v4").expect("load").is_none());
        assert!(source.load("bad").is_err());
        assert!(source.load("../etc").is_err());

        let registry = LayoutRegistry::new(source, "v3");
        assert_eq!(registry.get(Some("bad")).version, "v3");
    }
}
