//! Plugin Registry
//!
//! Enumerates installed image effects: native bundles found on the search
//! paths plus builtins registered in-process. Scan results are cached as
//! JSON so later runs can list plugins without loading every binary.
//!
//! The registry is shared (`Arc<PluginRegistry>`) and internally locked.
//! Scanning happens once, on first use, and again only on `refresh`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::HostConfig;
use super::effect::EffectPlugin;
use super::ofx::binary::BinaryEffectPlugin;
use super::ofx::bundle::{self, BundleCache};
use super::types::*;

struct RegistryEntry {
    info: PluginInfo,
    /// Loaded implementation; `None` for bundle plugins known only from the cache
    plugin: Option<Arc<dyn EffectPlugin>>,
}

/// On-disk cache format
#[derive(Debug, Serialize, Deserialize)]
struct RegistryCache {
    version: u32,
    plugins: Vec<PluginInfo>,
}

impl RegistryCache {
    const CURRENT_VERSION: u32 = 1;
}

/// Plugin registry - scans, caches, and provides lookup for installed effects
pub struct PluginRegistry {
    entries: RwLock<BTreeMap<String, RegistryEntry>>,
    search_paths: Vec<PathBuf>,
    cache_path: Option<PathBuf>,
    bundles: BundleCache,
    scanned: AtomicBool,
    scan_lock: Mutex<()>,
    load_lock: Mutex<()>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Create an empty registry with no search paths
    pub fn new() -> Self {
        Self::with_search_paths(Vec::new())
    }

    /// Create a registry scanning the given directories
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            search_paths,
            cache_path: None,
            bundles: BundleCache::new(),
            scanned: AtomicBool::new(false),
            scan_lock: Mutex::new(()),
            load_lock: Mutex::new(()),
        }
    }

    /// Create a registry from host configuration
    pub fn from_config(config: &HostConfig) -> Self {
        let mut registry = Self::with_search_paths(config.search_paths());
        registry.cache_path = config.resolved_cache_path();
        registry
    }

    /// Use a cache file
    pub fn with_cache(mut self, cache_path: PathBuf) -> Self {
        self.cache_path = Some(cache_path);
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, RegistryEntry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, RegistryEntry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an in-process effect, replacing any entry with the same id
    pub fn register(&self, plugin: Arc<dyn EffectPlugin>) {
        let info = plugin.info().clone();
        debug!("Registered builtin effect {}", info.id);
        self.write().insert(
            info.id.clone(),
            RegistryEntry {
                info,
                plugin: Some(plugin),
            },
        );
    }

    fn ensure_scanned(&self) {
        if self.scanned.load(Ordering::Acquire) {
            return;
        }
        let _guard = self.scan_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.scanned.load(Ordering::Acquire) {
            return;
        }
        if let Some(cache_path) = &self.cache_path {
            match self.load_cache(cache_path) {
                Ok(n) if n > 0 => debug!("Loaded {} cached plugins from {}", n, cache_path.display()),
                Ok(_) => {}
                Err(e) => warn!("Ignoring plugin cache {}: {}", cache_path.display(), e),
            }
        }
        self.scan_locked(true);
    }

    /// Scan the search paths for bundles
    ///
    /// Bundles already described by the cache are not loaded. Returns the
    /// number of bundle plugins known afterwards.
    pub fn scan(&self) -> usize {
        let _guard = self.scan_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.scan_locked(true)
    }

    /// Scan again, ignoring the cache
    ///
    /// Loaded plugins are kept as they are, since live bindings still use
    /// them; only entries known from the cache and bundles that failed to
    /// load are read again. A changed binary is picked up on restart.
    pub fn refresh(&self) -> usize {
        let _guard = self.scan_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write().retain(|_, entry| entry.plugin.is_some());
        self.scan_locked(false)
    }

    fn scan_locked(&self, trust_cache: bool) -> usize {
        let mut found = Vec::new();
        for path in &self.search_paths {
            if path.is_dir() {
                collect_bundles(path, &mut found);
            }
        }

        let known: Vec<PathBuf> = if trust_cache {
            self.read()
                .values()
                .filter_map(|e| e.info.bundle_path().cloned())
                .collect()
        } else {
            Vec::new()
        };

        // Entries whose bundle is gone are dropped.
        self.write().retain(|_, entry| match entry.info.bundle_path() {
            Some(path) => found.contains(path),
            None => true,
        });

        let _loading = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.bundles
            .retain(|path, loaded| found.iter().any(|f| f == path) && (loaded || trust_cache));

        for bundle_path in &found {
            if known.contains(bundle_path) {
                continue;
            }
            let bundle = match self.bundles.load(bundle_path) {
                Ok(bundle) => bundle,
                Err(e) => {
                    warn!("Skipping bundle {}: {}", bundle_path.display(), e);
                    continue;
                }
            };
            for index in 0..bundle.len() {
                let Some(id) = bundle.plugin_identifier(index) else {
                    warn!("Skipping plugin #{} of {}: no identifier", index, bundle_path.display());
                    continue;
                };
                // One live plugin per id: builtins shadow bundles, and a
                // plugin loaded earlier is never loaded twice.
                if self.read().get(&id).is_some_and(|e| e.plugin.is_some()) {
                    debug!("{} #{} ({}) already loaded", bundle_path.display(), index, id);
                    continue;
                }
                let plugin = match BinaryEffectPlugin::load(bundle.clone(), index) {
                    Ok(plugin) => plugin,
                    Err(e) => {
                        warn!("Skipping plugin #{} of {}: {}", index, bundle_path.display(), e);
                        continue;
                    }
                };
                let info = plugin.info().clone();
                self.write().insert(
                    info.id.clone(),
                    RegistryEntry {
                        info,
                        plugin: Some(Arc::new(plugin)),
                    },
                );
            }
        }

        self.scanned.store(true, Ordering::Release);
        let count = self
            .read()
            .values()
            .filter(|e| e.info.source != PluginSource::Builtin)
            .count();
        info!("Plugin scan found {} bundle plugins", count);

        if let Some(cache_path) = &self.cache_path {
            if let Err(e) = self.save_cache(cache_path) {
                warn!("Could not write plugin cache {}: {}", cache_path.display(), e);
            }
        }
        count
    }

    /// Every known effect, sorted by id
    pub fn list_available(&self) -> Vec<PluginInfo> {
        self.ensure_scanned();
        self.read().values().map(|e| e.info.clone()).collect()
    }

    /// Identity of an effect
    pub fn describe(&self, id: &str) -> PluginResult<PluginInfo> {
        self.ensure_scanned();
        self.read()
            .get(id)
            .map(|e| e.info.clone())
            .ok_or_else(|| PluginError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ensure_scanned();
        self.read().contains_key(id)
    }

    /// The implementation of an effect, loading its bundle if needed
    pub fn plugin(&self, id: &str) -> PluginResult<Arc<dyn EffectPlugin>> {
        self.ensure_scanned();
        if let Some(plugin) = self.loaded(id)? {
            return Ok(plugin);
        }

        let _guard = self.load_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(plugin) = self.loaded(id)? {
            return Ok(plugin);
        }

        let source = self.describe(id)?.source;
        let PluginSource::Bundle { path, index } = source else {
            return Err(PluginError::NotFound(id.to_string()));
        };
        let bundle = self.bundles.load(&path)?;
        let plugin = BinaryEffectPlugin::load(bundle, index)?;
        if plugin.info().id != id {
            return Err(PluginError::LoadFailed(format!(
                "{} #{} is now {}, expected {}",
                path.display(),
                index,
                plugin.info().id,
                id
            )));
        }

        let plugin: Arc<dyn EffectPlugin> = Arc::new(plugin);
        if let Some(entry) = self.write().get_mut(id) {
            entry.info = plugin.info().clone();
            entry.plugin = Some(plugin.clone());
        }
        Ok(plugin)
    }

    fn loaded(&self, id: &str) -> PluginResult<Option<Arc<dyn EffectPlugin>>> {
        let entries = self.read();
        let entry = entries
            .get(id)
            .ok_or_else(|| PluginError::NotFound(id.to_string()))?;
        Ok(entry.plugin.clone())
    }

    /// Find an effect by id or label (case-insensitive, supports partial match)
    pub fn find(&self, name: &str) -> Option<PluginInfo> {
        self.ensure_scanned();
        let name_lower = name.to_lowercase();
        let entries = self.read();
        let keys = |e: &RegistryEntry| [e.info.id.to_lowercase(), e.info.label.to_lowercase()];

        // Exact match
        if let Some(e) = entries.values().find(|e| keys(e).iter().any(|k| *k == name_lower)) {
            return Some(e.info.clone());
        }

        // Partial match (starts with)
        if let Some(e) = entries
            .values()
            .find(|e| keys(e).iter().any(|k| k.starts_with(&name_lower)))
        {
            return Some(e.info.clone());
        }

        // Fuzzy match (contains)
        entries
            .values()
            .find(|e| keys(e).iter().any(|k| k.contains(&name_lower)))
            .map(|e| e.info.clone())
    }

    /// Effects whose id, label or grouping contains a pattern
    pub fn search(&self, pattern: &str) -> Vec<PluginInfo> {
        self.ensure_scanned();
        let pattern_lower = pattern.to_lowercase();
        self.read()
            .values()
            .filter(|e| {
                e.info.id.to_lowercase().contains(&pattern_lower)
                    || e.info.label.to_lowercase().contains(&pattern_lower)
                    || e.info.grouping.to_lowercase().contains(&pattern_lower)
            })
            .map(|e| e.info.clone())
            .collect()
    }

    /// Effects in a menu grouping (or one of its sub-groupings)
    pub fn list_by_grouping(&self, grouping: &str) -> Vec<PluginInfo> {
        self.ensure_scanned();
        let prefix = format!("{}/", grouping);
        self.read()
            .values()
            .filter(|e| e.info.grouping == grouping || e.info.grouping.starts_with(&prefix))
            .map(|e| e.info.clone())
            .collect()
    }

    /// Load bundle identities from a cache file
    pub fn load_cache(&self, path: &Path) -> PluginResult<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let data = std::fs::read_to_string(path)?;
        let cache: RegistryCache =
            serde_json::from_str(&data).map_err(|e| PluginError::SerdeError(e.to_string()))?;
        if cache.version != RegistryCache::CURRENT_VERSION {
            return Err(PluginError::SerdeError(format!(
                "cache version {} (expected {})",
                cache.version,
                RegistryCache::CURRENT_VERSION
            )));
        }

        let mut entries = self.write();
        let mut count = 0;
        for info in cache.plugins {
            if info.bundle_path().is_none() || entries.contains_key(&info.id) {
                continue;
            }
            entries.insert(info.id.clone(), RegistryEntry { info, plugin: None });
            count += 1;
        }
        Ok(count)
    }

    /// Save bundle identities to a cache file
    pub fn save_cache(&self, path: &Path) -> PluginResult<()> {
        let cache = RegistryCache {
            version: RegistryCache::CURRENT_VERSION,
            plugins: self
                .read()
                .values()
                .filter(|e| e.info.bundle_path().is_some())
                .map(|e| e.info.clone())
                .collect(),
        };
        let data =
            serde_json::to_string_pretty(&cache).map_err(|e| PluginError::SerdeError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Number of known effects (without triggering a scan)
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn is_scanned(&self) -> bool {
        self.scanned.load(Ordering::Acquire)
    }
}

/// Collect bundle directories below `dir`; bundles are not descended into
fn collect_bundles(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", dir.display(), e);
            return;
        }
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if bundle::is_bundle_dir(&path) {
            found.push(path);
        } else if path.is_dir() {
            collect_bundles(&path, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_host::effect::{EffectInstance, ParameterValues};
    use crate::plugin_host::mock_plugin::{self, CONSTANT_PLUGIN_ID, INVERT_PLUGIN_ID};
    use std::sync::atomic::AtomicUsize;

    fn bundle_info(id: &str, path: &Path) -> PluginInfo {
        let mut info = PluginInfo::new(
            id,
            PluginVersion::new(2, 1),
            PluginSource::Bundle {
                path: path.to_path_buf(),
                index: 0,
            },
        );
        info.label = "Blur".to_string();
        info.grouping = "OFX/Filter".to_string();
        info.contexts = vec![EffectContext::Filter];
        info
    }

    fn write_cache(path: &Path, plugins: Vec<PluginInfo>) {
        let cache = RegistryCache {
            version: RegistryCache::CURRENT_VERSION,
            plugins,
        };
        std::fs::write(path, serde_json::to_string(&cache).unwrap()).unwrap();
    }

    #[test]
    fn test_builtins_listed_sorted() {
        let registry = PluginRegistry::new();
        mock_plugin::register_builtins(&registry);

        let ids: Vec<String> = registry.list_available().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![CONSTANT_PLUGIN_ID, INVERT_PLUGIN_ID]);
        assert!(registry.is_scanned());
    }

    #[test]
    fn test_describe_unknown_is_not_found() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.describe("com.example.nothing"),
            Err(PluginError::NotFound(_))
        ));
        assert!(registry.plugin("com.example.nothing").is_err());
    }

    #[test]
    fn test_find_and_search() {
        let registry = PluginRegistry::new();
        mock_plugin::register_builtins(&registry);

        assert_eq!(registry.find("invert").unwrap().id, INVERT_PLUGIN_ID);
        assert_eq!(registry.find("Const").unwrap().id, CONSTANT_PLUGIN_ID);
        assert!(registry.find("blur").is_none());
        assert_eq!(registry.search("ofx/color").len(), 1);
        assert_eq!(registry.list_by_grouping("OFX").len(), 2);
        assert_eq!(registry.list_by_grouping("OFX/Image").len(), 1);
    }

    #[test]
    fn test_broken_bundle_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("vendor").join("Broken.ofx.bundle")).unwrap();

        let registry = PluginRegistry::with_search_paths(vec![dir.path().to_path_buf()]);
        mock_plugin::register_builtins(&registry);
        assert_eq!(registry.scan(), 0);
        assert_eq!(registry.list_available().len(), 2);
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_dir = dir.path().join("Blur.ofx.bundle");
        std::fs::create_dir(&bundle_dir).unwrap();
        let cache_path = dir.path().join("cache.json");
        write_cache(&cache_path, vec![bundle_info("com.example.blur", &bundle_dir)]);

        let registry = PluginRegistry::with_search_paths(vec![dir.path().to_path_buf()])
            .with_cache(cache_path.clone());
        let info = registry.describe("com.example.blur").unwrap();
        assert_eq!(info.version, PluginVersion::new(2, 1));
        assert_eq!(info.grouping, "OFX/Filter");

        // The cached bundle has no binary, so loading it fails on demand.
        assert!(matches!(
            registry.plugin("com.example.blur"),
            Err(PluginError::LoadFailed(_))
        ));

        let copy = dir.path().join("copy.json");
        registry.save_cache(&copy).unwrap();
        let reloaded = PluginRegistry::new();
        assert_eq!(reloaded.load_cache(&copy).unwrap(), 1);
    }

    #[test]
    fn test_stale_cache_entries_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("cache.json");
        write_cache(
            &cache_path,
            vec![bundle_info("com.example.gone", &dir.path().join("Gone.ofx.bundle"))],
        );

        let registry = PluginRegistry::with_search_paths(vec![dir.path().to_path_buf()])
            .with_cache(cache_path);
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn test_refresh_keeps_builtins() {
        let registry = PluginRegistry::new();
        mock_plugin::register_builtins(&registry);
        registry.list_available();
        assert_eq!(registry.refresh(), 0);
        assert_eq!(registry.len(), 2);
    }

    /// Stands in for a plugin already loaded out of a bundle
    struct LoadedBundlePlugin {
        info: PluginInfo,
        dropped: Arc<AtomicUsize>,
    }

    impl EffectPlugin for LoadedBundlePlugin {
        fn info(&self) -> &PluginInfo {
            &self.info
        }

        fn describe(&self, _context: EffectContext) -> PluginResult<EffectSchema> {
            Ok(EffectSchema::default())
        }

        fn create_instance(
            &self,
            _descriptor: &PluginDescriptor,
            _values: &ParameterValues,
        ) -> PluginResult<Box<dyn EffectInstance>> {
            Err(PluginError::InstantiationRefused("not renderable".to_string()))
        }
    }

    impl Drop for LoadedBundlePlugin {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_refresh_keeps_loaded_bundle_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_dir = dir.path().join("Blur.ofx.bundle");
        std::fs::create_dir(&bundle_dir).unwrap();
        let cache_path = dir.path().join("cache.json");
        write_cache(&cache_path, vec![bundle_info("com.example.sharpen", &bundle_dir)]);

        let registry = PluginRegistry::with_search_paths(vec![dir.path().to_path_buf()])
            .with_cache(cache_path);
        let dropped = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(LoadedBundlePlugin {
            info: bundle_info("com.example.blur", &bundle_dir),
            dropped: dropped.clone(),
        }));
        let before = registry.plugin("com.example.blur").unwrap();
        assert!(registry.contains("com.example.sharpen"));

        registry.refresh();
        let after = registry.plugin("com.example.blur").unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        // Known only from the cache: read again, and the bundle has no binary
        assert!(!registry.contains("com.example.sharpen"));

        drop((before, after));
        drop(registry);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_refresh_drops_plugins_of_removed_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_dir = dir.path().join("Blur.ofx.bundle");
        std::fs::create_dir(&bundle_dir).unwrap();

        let registry = PluginRegistry::with_search_paths(vec![dir.path().to_path_buf()]);
        let dropped = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(LoadedBundlePlugin {
            info: bundle_info("com.example.blur", &bundle_dir),
            dropped: dropped.clone(),
        }));
        let bound = registry.plugin("com.example.blur").unwrap();

        std::fs::remove_dir(&bundle_dir).unwrap();
        registry.refresh();
        assert!(!registry.contains("com.example.blur"));
        // Bindings made earlier keep the plugin alive
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        drop(bound);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_cache_is_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PluginRegistry::new().load_cache(&path),
            Err(PluginError::SerdeError(_))
        ));
    }
}
