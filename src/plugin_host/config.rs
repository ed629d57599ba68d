//! Host configuration
//!
//! Loaded from a TOML file. A missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::types::*;

/// Environment variable listing extra plugin directories
pub const PLUGIN_PATH_VARIABLE: &str = "OFX_PLUGIN_PATH";

/// Host settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directories scanned for `*.ofx.bundle` before any others
    pub plugin_paths: Vec<PathBuf>,
    /// Also scan the directories listed in `OFX_PLUGIN_PATH`
    pub use_environment: bool,
    /// Also scan the platform's standard OFX install directory
    pub use_default_paths: bool,
    /// Registry cache file; `None` uses the per-user cache directory
    pub cache_path: Option<PathBuf>,
    /// Format used when an effect has no connected input with a format
    pub default_format: Option<Format>,
    /// Contexts tried, in order, when binding a plugin
    pub preferred_contexts: Vec<EffectContext>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_paths: Vec::new(),
            use_environment: true,
            use_default_paths: true,
            cache_path: None,
            default_format: Some(Format::new(1920, 1080)),
            preferred_contexts: vec![
                EffectContext::Filter,
                EffectContext::General,
                EffectContext::Generator,
                EffectContext::Transition,
            ],
        }
    }
}

impl HostConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> PluginResult<Self> {
        toml::from_str(data).map_err(|e| PluginError::SerdeError(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> PluginResult<()> {
        let data = toml::to_string_pretty(self).map_err(|e| PluginError::SerdeError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Default location of the host's own config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ofx-host").join("host.toml"))
    }

    /// Registry cache path, resolving the per-user default
    pub fn resolved_cache_path(&self) -> Option<PathBuf> {
        self.cache_path
            .clone()
            .or_else(|| dirs::cache_dir().map(|d| d.join("ofx-host").join("plugin-cache.json")))
    }

    /// Directories to scan, in priority order, without duplicates
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = self.plugin_paths.clone();
        if self.use_environment {
            if let Some(value) = std::env::var_os(PLUGIN_PATH_VARIABLE) {
                paths.extend(std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()));
            }
        }
        if self.use_default_paths {
            paths.extend(Self::default_plugin_paths());
        }

        let mut unique = Vec::with_capacity(paths.len());
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        unique
    }

    /// Standard OFX install directories for this platform
    pub fn default_plugin_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        paths.push(PathBuf::from("/usr/OFX/Plugins"));

        #[cfg(target_os = "macos")]
        paths.push(PathBuf::from("/Library/OFX/Plugins"));

        #[cfg(target_os = "windows")]
        paths.push(PathBuf::from("C:\\Program Files\\Common Files\\OFX\\Plugins"));

        paths
    }
}
