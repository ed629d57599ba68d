//! Builtin effects
//!
//! Deterministic in-process effects that behave like their common bundle
//! counterparts. They make the host usable and testable without any native
//! plugin installed.

use std::sync::Arc;

use super::ofx::abi;
use super::effect::{EffectInstance, EffectPlugin, ParameterValues, RenderArgs};
use super::image::Image;
use super::registry::PluginRegistry;
use super::types::*;

pub const INVERT_PLUGIN_ID: &str = "net.sf.openfx.invertPlugin";
pub const CONSTANT_PLUGIN_ID: &str = "net.sf.openfx.ConstantPlugin";

/// Register every builtin effect with a registry
pub fn register_builtins(registry: &PluginRegistry) {
    registry.register(Arc::new(InvertPlugin::new()));
    registry.register(Arc::new(ConstantPlugin::new()));
}

fn value_f64(values: &ParameterValues, name: &str, fallback: f64) -> f64 {
    match values.get(name) {
        Some(ParameterValue::Double(v)) => *v,
        Some(ParameterValue::Int(v)) => f64::from(*v),
        _ => fallback,
    }
}

fn value_bool(values: &ParameterValues, name: &str, fallback: bool) -> bool {
    match values.get(name) {
        Some(ParameterValue::Bool(v)) => *v,
        _ => fallback,
    }
}

fn store(values: &mut ParameterValues, schema: &EffectSchema, name: &str, value: &ParameterValue) -> PluginResult<()> {
    let param = schema
        .find_parameter(name)
        .ok_or_else(|| PluginError::ParameterError(format!("unknown parameter {}", name)))?;
    values.insert(name.to_string(), param.convert(value)?);
    Ok(())
}

/// Inverts the colour channels of its source
///
/// Parameters: `mix` (clamped 0..1), a `channels` group of per-channel
/// toggles and a `premult` choice selecting whether the source is
/// premultiplied.
pub struct InvertPlugin {
    info: PluginInfo,
}

impl Default for InvertPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl InvertPlugin {
    pub fn new() -> Self {
        let mut info = PluginInfo::new(INVERT_PLUGIN_ID, PluginVersion::new(1, 0), PluginSource::Builtin);
        info.label = "Invert".to_string();
        info.grouping = "OFX/Color".to_string();
        info.contexts = vec![EffectContext::Filter, EffectContext::General];
        Self { info }
    }

    fn schema() -> EffectSchema {
        let channel = |name: &str, on: bool| {
            ParameterDescriptor::new(name, ParameterKind::Boolean).with_default(ParameterValue::Bool(on))
        };
        EffectSchema {
            clips: vec![ClipDescriptor::input(abi::SOURCE_CLIP_NAME), ClipDescriptor::output()],
            parameters: vec![
                ParameterDescriptor::new("mix", ParameterKind::Double)
                    .with_label("Mix")
                    .with_default(ParameterValue::Double(1.0))
                    .with_range(0.0, 1.0)
                    .clamped(),
                ParameterDescriptor::new(
                    "channels",
                    ParameterKind::Group {
                        children: vec![
                            channel("red", true),
                            channel("green", true),
                            channel("blue", true),
                            channel("alpha", false),
                        ],
                    },
                )
                .with_label("Channels"),
                ParameterDescriptor::new(
                    "premult",
                    ParameterKind::Choice {
                        options: vec!["Premultiplied".to_string(), "Straight".to_string()],
                    },
                )
                .with_label("Source Alpha"),
            ],
        }
    }
}

impl EffectPlugin for InvertPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn describe(&self, context: EffectContext) -> PluginResult<EffectSchema> {
        if !self.info.supports(context) {
            return Err(PluginError::Incompatible(format!(
                "{} does not support the {} context",
                self.info.id, context
            )));
        }
        Ok(Self::schema())
    }

    fn create_instance(
        &self,
        descriptor: &PluginDescriptor,
        values: &ParameterValues,
    ) -> PluginResult<Box<dyn EffectInstance>> {
        let mut instance = InvertInstance {
            schema: descriptor.schema.clone(),
            values: ParameterValues::new(),
        };
        for (name, value) in values {
            store(&mut instance.values, &instance.schema, name, value)?;
        }
        Ok(Box::new(instance))
    }
}

struct InvertInstance {
    schema: EffectSchema,
    values: ParameterValues,
}

impl EffectInstance for InvertInstance {
    fn set_parameter(&mut self, name: &str, value: &ParameterValue, _time: f64) -> PluginResult<()> {
        store(&mut self.values, &self.schema, name, value)
    }

    fn render(&mut self, args: &RenderArgs<'_>, output: &mut Image) -> PluginResult<()> {
        let source = args
            .input(abi::SOURCE_CLIP_NAME)
            .ok_or_else(|| PluginError::RenderFailed("Source clip is not connected".to_string()))?;

        let mix = value_f64(&self.values, "mix", 1.0) as f32;
        let mask = [
            value_bool(&self.values, "red", true),
            value_bool(&self.values, "green", true),
            value_bool(&self.values, "blue", true),
            value_bool(&self.values, "alpha", false),
        ];
        let premultiplied = !matches!(self.values.get("premult"), Some(ParameterValue::Choice(1)));

        let window = args.render_window.intersect(&output.bounds());
        for y in window.y1..window.y2 {
            for x in window.x1..window.x2 {
                let src = source.pixel(x, y);
                let alpha = src[3];
                let mut px = src;
                if premultiplied && alpha > 0.0 {
                    for c in px.iter_mut().take(3) {
                        *c /= alpha;
                    }
                }
                for (c, invert) in px.iter_mut().zip(mask) {
                    if invert {
                        *c = 1.0 - *c;
                    }
                }
                if premultiplied {
                    let a = px[3];
                    for c in px.iter_mut().take(3) {
                        *c *= a;
                    }
                }
                let mixed = [0, 1, 2, 3].map(|i| src[i] + (px[i] - src[i]) * mix);
                output.set_pixel(x, y, mixed);
            }
        }
        Ok(())
    }
}

/// Fills the render window with a constant colour
pub struct ConstantPlugin {
    info: PluginInfo,
}

impl Default for ConstantPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPlugin {
    pub fn new() -> Self {
        let mut info = PluginInfo::new(CONSTANT_PLUGIN_ID, PluginVersion::new(1, 0), PluginSource::Builtin);
        info.label = "Constant".to_string();
        info.grouping = "OFX/Image".to_string();
        info.contexts = vec![EffectContext::Generator];
        Self { info }
    }
}

impl EffectPlugin for ConstantPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn describe(&self, context: EffectContext) -> PluginResult<EffectSchema> {
        if context != EffectContext::Generator {
            return Err(PluginError::Incompatible(format!(
                "{} only supports the generator context",
                self.info.id
            )));
        }
        Ok(EffectSchema {
            clips: vec![ClipDescriptor::output()],
            parameters: vec![ParameterDescriptor::new("color", ParameterKind::Rgba)
                .with_label("Color")
                .with_default(ParameterValue::Rgba([0.0, 0.0, 0.0, 1.0]))],
        })
    }

    fn thread_safety(&self) -> RenderThreadSafety {
        RenderThreadSafety::FullySafe
    }

    fn create_instance(
        &self,
        descriptor: &PluginDescriptor,
        values: &ParameterValues,
    ) -> PluginResult<Box<dyn EffectInstance>> {
        let mut instance = ConstantInstance {
            schema: descriptor.schema.clone(),
            values: ParameterValues::new(),
        };
        for (name, value) in values {
            store(&mut instance.values, &instance.schema, name, value)?;
        }
        Ok(Box::new(instance))
    }
}

struct ConstantInstance {
    schema: EffectSchema,
    values: ParameterValues,
}

impl EffectInstance for ConstantInstance {
    fn set_parameter(&mut self, name: &str, value: &ParameterValue, _time: f64) -> PluginResult<()> {
        store(&mut self.values, &self.schema, name, value)
    }

    fn render(&mut self, args: &RenderArgs<'_>, output: &mut Image) -> PluginResult<()> {
        let color = match self.values.get("color") {
            Some(ParameterValue::Rgba(c)) => c.map(|v| v as f32),
            _ => [0.0, 0.0, 0.0, 1.0],
        };
        let window = args.render_window.intersect(&output.bounds());
        for y in window.y1..window.y2 {
            for x in window.x1..window.x2 {
                output.set_pixel(x, y, color);
            }
        }
        Ok(())
    }
}
