//! Native plugin bundles
//!
//! An OFX bundle is a directory `Name.ofx.bundle` whose binary lives at
//! `Contents/<arch>/Name.ofx`. The binary exports `OfxGetNumberOfPlugins`
//! and `OfxGetPlugin`.
//!
//! `BundleCache` keeps each binary loaded at most once per cache. The first
//! load of a path is exclusive; later lookups only take a read lock. Dropping
//! the cache (and every plugin holding a bundle) unloads the binaries.

use std::collections::HashMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::{Arc, OnceLock, RwLock};

use libloading::{Library, Symbol};
use tracing::{debug, info};

use super::abi::{self, GetNumberOfPluginsFn, GetPluginFn, OfxPlugin};
use crate::plugin_host::types::*;

/// Suffix of bundle directories
pub const BUNDLE_SUFFIX: &str = ".ofx.bundle";

/// Architecture directory inside `Contents` for this build
pub fn architecture_dir() -> &'static str {
    if cfg!(target_os = "macos") {
        "MacOS"
    } else if cfg!(all(target_os = "windows", target_pointer_width = "64")) {
        "Win64"
    } else if cfg!(target_os = "windows") {
        "Win32"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "Linux-arm-64"
    } else if cfg!(target_pointer_width = "64") {
        "Linux-x86-64"
    } else {
        "Linux-x86"
    }
}

/// Whether a path names a bundle directory
pub fn is_bundle_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .map(|n| n.to_string_lossy().ends_with(BUNDLE_SUFFIX))
            .unwrap_or(false)
}

/// Location of the binary inside a bundle
pub fn binary_path(bundle: &Path) -> PathBuf {
    let file_name = bundle
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.trim_end_matches(".bundle");
    bundle.join("Contents").join(architecture_dir()).join(stem)
}

/// A loaded bundle binary and the plugin records it exports
pub struct Bundle {
    path: PathBuf,
    plugins: Vec<NonNull<OfxPlugin>>,
    // Dropped last: the plugin records point into the library's data.
    _library: Library,
}

// SAFETY: the plugin records are static data inside the loaded library,
// which lives as long as the bundle. The host never writes through them.
unsafe impl Send for Bundle {}
unsafe impl Sync for Bundle {}

impl Bundle {
    /// Load the binary of the bundle at `path`
    pub fn load(path: &Path) -> PluginResult<Bundle> {
        let binary = binary_path(path);
        if !binary.exists() {
            return Err(PluginError::LoadFailed(format!(
                "{}: no binary at {}",
                path.display(),
                binary.display()
            )));
        }

        // SAFETY: loading a library runs its initializers; bundles found on
        // the configured search paths are trusted.
        let library = unsafe { Library::new(&binary) }
            .map_err(|e| PluginError::LoadFailed(format!("{}: {}", binary.display(), e)))?;

        let plugins = {
            // SAFETY: symbol types match the OFX entry point declarations.
            let count: Symbol<GetNumberOfPluginsFn> = unsafe {
                library.get(abi::GET_NUMBER_OF_PLUGINS_SYMBOL)
            }
            .map_err(|e| PluginError::LoadFailed(format!("{}: {}", binary.display(), e)))?;
            let get: Symbol<GetPluginFn> = unsafe { library.get(abi::GET_PLUGIN_SYMBOL) }
                .map_err(|e| PluginError::LoadFailed(format!("{}: {}", binary.display(), e)))?;

            let n = unsafe { count() };
            let mut plugins = Vec::with_capacity(n.max(0) as usize);
            for i in 0..n {
                match NonNull::new(unsafe { get(i) }) {
                    Some(plugin) => plugins.push(plugin),
                    None => debug!("{}: OfxGetPlugin({}) returned null", binary.display(), i),
                }
            }
            plugins
        };

        info!("Loaded OFX bundle {} ({} plugins)", path.display(), plugins.len());

        Ok(Bundle {
            path: path.to_path_buf(),
            plugins,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The `index`th plugin record
    pub fn plugin(&self, index: usize) -> Option<&OfxPlugin> {
        // SAFETY: non-null record owned by the library, see the Send impl.
        self.plugins.get(index).map(|p| unsafe { p.as_ref() })
    }

    /// Identifier of the `index`th plugin record
    pub fn plugin_identifier(&self, index: usize) -> Option<String> {
        let plugin = self.plugin(index)?;
        if plugin.plugin_identifier.is_null() {
            return None;
        }
        // SAFETY: plugins export NUL-terminated static identifiers.
        let id = unsafe { CStr::from_ptr(plugin.plugin_identifier) };
        Some(id.to_string_lossy().into_owned())
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("path", &self.path)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

type BundleSlot = Arc<OnceLock<Result<Arc<Bundle>, String>>>;

/// Per-path cache of loaded bundles
///
/// A failed load is remembered too, so a broken bundle is only tried once.
#[derive(Default)]
pub struct BundleCache {
    bundles: RwLock<HashMap<PathBuf, BundleSlot>>,
}

impl BundleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a bundle, or return the already-loaded one
    pub fn load(&self, path: &Path) -> PluginResult<Arc<Bundle>> {
        let slot = self.slot(path);
        slot.get_or_init(|| Bundle::load(path).map(Arc::new).map_err(|e| e.to_string()))
            .clone()
            .map_err(PluginError::LoadFailed)
    }

    fn slot(&self, path: &Path) -> BundleSlot {
        {
            let bundles = self.bundles.read().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = bundles.get(path) {
                return slot.clone();
            }
        }
        let mut bundles = self.bundles.write().unwrap_or_else(|e| e.into_inner());
        bundles.entry(path.to_path_buf()).or_default().clone()
    }

    /// Forget bundles for which `keep(path, loaded)` is false
    ///
    /// Live plugins keep their own references, and a forgotten failure is
    /// tried again on the next load.
    pub fn retain(&self, keep: impl Fn(&Path, bool) -> bool) {
        self.bundles
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|path, slot| keep(path.as_path(), matches!(slot.get(), Some(Ok(_)))));
    }

    pub fn len(&self) -> usize {
        self.bundles.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
