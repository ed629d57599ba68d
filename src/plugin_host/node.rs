//! Image node hosting one effect
//!
//! `OfxImageNode` is the surface the rest of an application talks to: pick a
//! plugin id, call `create_plugin_instance`, connect inputs, edit parameters
//! and compute images. A node is itself an [`ImageInput`], so nodes chain.

use std::sync::{Arc, RwLock};

use tracing::debug;

use super::binder::PluginBinder;
use super::context::EvaluationContext;
use super::geometry::{DefaultFormatProvider, GeometryResolver};
use super::image::{ClipBinding, Image, ImageInput, SharedImageInput};
use super::manager::{EffectInstanceManager, InstanceState};
use super::params::ParameterSlot;
use super::render::RenderInvoker;
use super::types::*;

#[derive(Clone)]
struct NodeInput {
    label: String,
    source: Option<SharedImageInput>,
}

pub struct OfxImageNode {
    name: String,
    manager: EffectInstanceManager,
    invoker: RenderInvoker,
    inputs: RwLock<Vec<NodeInput>>,
}

impl OfxImageNode {
    pub fn new(
        name: &str,
        binder: Arc<PluginBinder>,
        default_format: Arc<dyn DefaultFormatProvider>,
    ) -> Self {
        Self {
            name: name.to_string(),
            manager: EffectInstanceManager::new(binder),
            invoker: RenderInvoker::new(GeometryResolver::new(default_format)),
            inputs: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manager(&self) -> &EffectInstanceManager {
        &self.manager
    }

    pub fn plugin_id(&self) -> String {
        self.manager.plugin_id()
    }

    pub fn set_plugin_id(&self, id: &str) -> PluginResult<()> {
        self.manager.set_plugin_id(id)
    }

    pub fn state(&self) -> InstanceState {
        self.manager.state()
    }

    /// Bind the plugin and lay out one input per declared input clip
    ///
    /// Returns false if no plugin is selected or the id is unknown.
    pub fn create_plugin_instance(&self) -> bool {
        let created = self.manager.create_plugin_instance();
        if created {
            self.sync_inputs();
        }
        created
    }

    pub fn try_create_plugin_instance(&self) -> PluginResult<bool> {
        let created = self.manager.try_create_plugin_instance()?;
        if created {
            self.sync_inputs();
        }
        Ok(created)
    }

    /// Describe the plugin again and rebuild slots and inputs
    pub fn reload(&self) -> PluginResult<bool> {
        let reloaded = self.manager.reload()?;
        if reloaded {
            self.sync_inputs();
        }
        Ok(reloaded)
    }

    /// Release the effect; waits for in-flight renders
    pub fn destroy(&self) {
        self.manager.destroy();
    }

    fn sync_inputs(&self) {
        let Some(descriptor) = self.manager.descriptor() else {
            return;
        };
        let labels: Vec<String> = descriptor.input_clips().map(|c| c.name.clone()).collect();
        let mut inputs = self.inputs.write().unwrap_or_else(|e| e.into_inner());
        // Existing connections stay on their index.
        inputs.truncate(labels.len());
        for (i, label) in labels.into_iter().enumerate() {
            match inputs.get_mut(i) {
                Some(input) => input.label = label,
                None => inputs.push(NodeInput {
                    label,
                    source: None,
                }),
            }
        }
        debug!("{}: inputs {:?}", self.name, self.input_labels());
    }

    fn read_inputs(&self) -> Vec<NodeInput> {
        self.inputs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Input labels, one per declared input clip
    pub fn input_labels(&self) -> Vec<String> {
        self.read_inputs().into_iter().map(|i| i.label).collect()
    }

    /// Connect (or with `None`, disconnect) an input by index
    pub fn set_input(&self, index: usize, source: Option<SharedImageInput>) -> PluginResult<()> {
        let mut inputs = self.inputs.write().unwrap_or_else(|e| e.into_inner());
        let count = inputs.len();
        let input = inputs.get_mut(index).ok_or_else(|| {
            PluginError::ParameterError(format!("{} has {} inputs, not {}", self.name, count, index + 1))
        })?;
        input.source = source;
        Ok(())
    }

    /// Connect an input by clip name
    pub fn set_input_by_name(&self, clip: &str, source: Option<SharedImageInput>) -> PluginResult<()> {
        let index = self
            .input_labels()
            .iter()
            .position(|label| label == clip)
            .ok_or_else(|| PluginError::ParameterError(format!("{} has no input {}", self.name, clip)))?;
        self.set_input(index, source)
    }

    /// Declared input clips paired with the node's connections
    pub fn clip_bindings(&self) -> Vec<ClipBinding> {
        match self.manager.descriptor() {
            Some(descriptor) => self.bindings_for(&descriptor),
            None => Vec::new(),
        }
    }

    fn bindings_for(&self, descriptor: &PluginDescriptor) -> Vec<ClipBinding> {
        let inputs = self.read_inputs();
        descriptor
            .input_clips()
            .enumerate()
            .map(|(i, clip)| {
                let source = inputs.get(i).and_then(|input| input.source.clone());
                ClipBinding::new(clip.clone(), source)
            })
            .collect()
    }

    pub fn parameter(&self, path: &str) -> Option<ParameterValue> {
        self.manager.parameter(path)
    }

    pub fn parameter_slot(&self, path: &str) -> Option<ParameterSlot> {
        self.manager.parameter_slot(path)
    }

    pub fn parameter_paths(&self) -> Vec<String> {
        self.manager.parameter_paths()
    }

    /// Edit a slot; an active instance is notified at `time`
    pub fn set_parameter(&self, path: &str, value: ParameterValue, time: f64) -> PluginResult<()> {
        self.manager.set_parameter(path, value, time)
    }

    /// Project size the effect sees under `context`
    pub fn effect_instance_project_size(&self, context: &EvaluationContext) -> PluginResult<(f64, f64)> {
        self.invoker
            .project_size(&self.manager, |descriptor| self.bindings_for(descriptor), context)
    }

    /// Render the node
    ///
    /// Clips are paired with inputs against the descriptor the render runs
    /// with, so a concurrent plugin change waits for the whole evaluation.
    pub fn compute(&self, context: &EvaluationContext) -> PluginResult<Image> {
        self.invoker
            .compute(&self.manager, |descriptor| self.bindings_for(descriptor), context)
    }
}

impl ImageInput for OfxImageNode {
    fn format(&self, context: &EvaluationContext) -> Option<Format> {
        self.invoker
            .resolver()
            .resolve(&self.clip_bindings(), context)
            .ok()
            .map(|geometry| geometry.format())
    }

    fn image(&self, context: &EvaluationContext, region: Rect) -> PluginResult<Image> {
        self.compute(&context.clone().with_region(region))
    }
}
