//! Capability traits at the plugin seam
//!
//! An `EffectPlugin` is one installable effect (a native bundle entry or a
//! builtin). An `EffectInstance` is one instantiated effect, owned by exactly
//! one node. Instances are destroyed by dropping them.

use std::collections::{BTreeMap, HashMap};

use super::image::Image;
use super::types::{
    EffectContext, EffectSchema, ParameterValue, PluginDescriptor, PluginInfo, PluginResult,
    ProjectGeometry, Rect, RenderThreadSafety,
};

/// Parameter values keyed by plugin parameter name
pub type ParameterValues = BTreeMap<String, ParameterValue>;

/// Arguments for a region-of-definition query
#[derive(Clone, Debug, PartialEq)]
pub struct RegionArgs {
    pub time: f64,
    pub project: ProjectGeometry,
    /// Regions of definition of connected inputs, by clip name
    pub input_regions: HashMap<String, Rect>,
}

/// Arguments for a render
#[derive(Debug)]
pub struct RenderArgs<'a> {
    pub time: f64,
    /// Pixels of the output the plugin must fill
    pub render_window: Rect,
    pub render_scale: (f64, f64),
    pub project: ProjectGeometry,
    /// Connected input images, by clip name
    pub inputs: &'a HashMap<String, Image>,
}

impl RenderArgs<'_> {
    pub fn input(&self, clip: &str) -> Option<&Image> {
        self.inputs.get(clip)
    }
}

/// An installable image effect
pub trait EffectPlugin: Send + Sync {
    /// Identity as enumerated by the registry
    fn info(&self) -> &PluginInfo;

    /// Clip and parameter schema in a context
    fn describe(&self, context: EffectContext) -> PluginResult<EffectSchema>;

    /// Declared render thread-safety
    fn thread_safety(&self) -> RenderThreadSafety {
        RenderThreadSafety::InstanceSafe
    }

    /// Create an instance with the given initial parameter values
    ///
    /// Returns `InstantiationRefused` if the plugin declines.
    fn create_instance(
        &self,
        descriptor: &PluginDescriptor,
        values: &ParameterValues,
    ) -> PluginResult<Box<dyn EffectInstance>>;
}

/// A live effect instance
pub trait EffectInstance: Send {
    /// Push a parameter value
    fn set_parameter(&mut self, name: &str, value: &ParameterValue, time: f64) -> PluginResult<()>;

    /// Notify the instance that a user edit changed a parameter
    fn instance_changed(&mut self, _name: &str, _time: f64) -> PluginResult<()> {
        Ok(())
    }

    /// Region the effect produces pixels for; `None` means the project
    fn region_of_definition(&mut self, _args: &RegionArgs) -> PluginResult<Option<Rect>> {
        Ok(None)
    }

    /// Render `args.render_window` into `output`
    fn render(&mut self, args: &RenderArgs<'_>, output: &mut Image) -> PluginResult<()>;
}
