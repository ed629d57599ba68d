//! Plugin Binder
//!
//! Turns a plugin id into a shared `PluginDescriptor`: picks a context the
//! host can drive, asks the plugin for its schema in that context and checks
//! the schema is one the host can mirror. Bound descriptors are cached, so
//! binding the same id twice never reloads or re-describes the plugin.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use super::config::HostConfig;
use super::effect::EffectPlugin;
use super::ofx::abi;
use super::registry::PluginRegistry;
use super::types::*;

/// A plugin together with its bound descriptor
#[derive(Clone)]
pub struct BoundPlugin {
    pub descriptor: Arc<PluginDescriptor>,
    pub plugin: Arc<dyn EffectPlugin>,
}

impl std::fmt::Debug for BoundPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundPlugin")
            .field("id", &self.descriptor.id())
            .field("context", &self.descriptor.context)
            .finish()
    }
}

pub struct PluginBinder {
    registry: Arc<PluginRegistry>,
    preferred_contexts: Vec<EffectContext>,
    bound: RwLock<HashMap<String, BoundPlugin>>,
    bind_lock: Mutex<()>,
}

impl PluginBinder {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self::with_preferred_contexts(
            registry,
            vec![
                EffectContext::Filter,
                EffectContext::General,
                EffectContext::Generator,
                EffectContext::Transition,
            ],
        )
    }

    /// Bind with the configured context preference
    pub fn from_config(registry: Arc<PluginRegistry>, config: &HostConfig) -> Self {
        Self::with_preferred_contexts(registry, config.preferred_contexts.clone())
    }

    /// Bind in the first of `preferred_contexts` a plugin supports
    pub fn with_preferred_contexts(
        registry: Arc<PluginRegistry>,
        preferred_contexts: Vec<EffectContext>,
    ) -> Self {
        Self {
            registry,
            preferred_contexts,
            bound: RwLock::new(HashMap::new()),
            bind_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    fn cached(&self, id: &str) -> Option<BoundPlugin> {
        self.bound
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Bind a plugin id, reusing a previous binding
    pub fn bind(&self, id: &str) -> PluginResult<BoundPlugin> {
        if let Some(bound) = self.cached(id) {
            return Ok(bound);
        }

        let _guard = self.bind_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bound) = self.cached(id) {
            return Ok(bound);
        }

        let plugin = self.registry.plugin(id)?;
        let info = plugin.info().clone();
        if info.api_version != abi::IMAGE_EFFECT_PLUGIN_API_VERSION {
            return Err(PluginError::Incompatible(format!(
                "{} uses image effect API version {}",
                id, info.api_version
            )));
        }
        let context = self
            .preferred_contexts
            .iter()
            .copied()
            .find(|c| info.supports(*c))
            .ok_or_else(|| {
                let supported: Vec<String> = info.contexts.iter().map(|c| c.to_string()).collect();
                PluginError::Incompatible(format!(
                    "{} supports no usable context (declares [{}])",
                    id,
                    supported.join(", ")
                ))
            })?;

        let schema = plugin.describe(context)?;
        validate_schema(id, &schema)?;

        let descriptor = Arc::new(PluginDescriptor {
            info,
            context,
            schema,
            thread_safety: plugin.thread_safety(),
        });
        info!(
            "Bound {} in the {} context ({} clips, {} parameters)",
            id,
            context,
            descriptor.schema.clips.len(),
            descriptor.parameters().len()
        );

        let bound = BoundPlugin { descriptor, plugin };
        self.bound
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), bound.clone());
        Ok(bound)
    }

    /// Drop the cached binding of an id; the next `bind` describes again
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self
            .bound
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some();
        if removed {
            debug!("Invalidated binding of {}", id);
        }
        removed
    }

    pub fn is_bound(&self, id: &str) -> bool {
        self.cached(id).is_some()
    }
}

/// Check that the host can mirror a described schema
fn validate_schema(id: &str, schema: &EffectSchema) -> PluginResult<()> {
    let malformed = |msg: String| PluginError::MalformedSchema(format!("{}: {}", id, msg));

    let mut clip_names = HashSet::new();
    for clip in &schema.clips {
        if !clip_names.insert(clip.name.as_str()) {
            return Err(malformed(format!("clip {} declared twice", clip.name)));
        }
    }
    let outputs: Vec<&ClipDescriptor> = schema.clips.iter().filter(|c| !c.is_input()).collect();
    match outputs.as_slice() {
        [output] if output.name == abi::OUTPUT_CLIP_NAME => {}
        [] => return Err(malformed("no Output clip".to_string())),
        _ => return Err(malformed("output clip must be the single Output clip".to_string())),
    }

    let mut names = HashSet::new();
    let mut stack: Vec<&ParameterDescriptor> = schema.parameters.iter().collect();
    while let Some(param) = stack.pop() {
        if param.name.is_empty() {
            return Err(malformed("unnamed parameter".to_string()));
        }
        if !names.insert(param.name.as_str()) {
            return Err(malformed(format!("parameter {} declared twice", param.name)));
        }
        if let ParameterKind::Choice { options } = &param.kind {
            if options.is_empty() {
                return Err(malformed(format!("choice {} has no options", param.name)));
            }
        }
        if let Some(range) = param.range {
            if !(range.min <= range.max) {
                return Err(malformed(format!("{} has an empty range", param.name)));
            }
        }
        if let Some(default) = &param.default {
            param
                .validate(default)
                .map_err(|e| malformed(format!("bad default: {}", e)))?;
        }
        stack.extend(param.children());
    }
    Ok(())
}
