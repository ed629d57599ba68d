//! Render Invoker
//!
//! One `compute` runs entirely under the node's instance lock: pair the
//! bound clips with their sources, resolve the project, push parameters,
//! ask for the region of definition, fetch inputs for the render window and
//! render into a fresh output image.

use std::collections::HashMap;

use tracing::debug;

use super::context::EvaluationContext;
use super::effect::{RegionArgs, RenderArgs};
use super::geometry::GeometryResolver;
use super::image::{ClipBinding, Image};
use super::manager::EffectInstanceManager;
use super::types::*;

#[derive(Clone, Debug)]
pub struct RenderInvoker {
    resolver: GeometryResolver,
}

impl RenderInvoker {
    pub fn new(resolver: GeometryResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &GeometryResolver {
        &self.resolver
    }

    /// Resolved project size
    ///
    /// Instantiates the effect if needed but neither pushes parameters nor
    /// renders, and does not wait for in-flight renders. `bindings` pairs
    /// the bound descriptor's input clips with their sources.
    pub fn project_size(
        &self,
        manager: &EffectInstanceManager,
        bindings: impl FnOnce(&PluginDescriptor) -> Vec<ClipBinding>,
        context: &EvaluationContext,
    ) -> PluginResult<(f64, f64)> {
        manager.with_bound(|descriptor| Ok(self.resolver.resolve(&bindings(descriptor), context)?.size()))
    }

    /// Render the node for `context`
    ///
    /// The output covers the requested region (the whole project when the
    /// context has none) clipped to the effect's region of definition.
    pub fn compute(
        &self,
        manager: &EffectInstanceManager,
        bindings: impl FnOnce(&PluginDescriptor) -> Vec<ClipBinding>,
        context: &EvaluationContext,
    ) -> PluginResult<Image> {
        manager.with_active(|active| {
            let inputs = bindings(active.descriptor());
            let project = self.resolver.resolve(&inputs, context)?;
            let input_regions: HashMap<String, Rect> = inputs
                .iter()
                .filter_map(|b| b.format(context).map(|f| (b.name().to_string(), f.bounds())))
                .collect();

            active.push_parameters(context.time)?;

            let region_args = RegionArgs {
                time: context.time,
                project,
                input_regions,
            };
            let rod = active
                .instance()
                .region_of_definition(&region_args)?
                .unwrap_or_else(|| project.bounds());
            let window = context
                .region
                .unwrap_or_else(|| project.bounds())
                .intersect(&rod);

            let mut output = Image::new(window)?.with_pixel_aspect(project.pixel_aspect);
            if window.is_empty() {
                return Ok(output);
            }

            let mut images = HashMap::new();
            for binding in &inputs {
                if let Some(source) = &binding.source {
                    images.insert(binding.name().to_string(), source.image(context, window)?);
                }
            }

            let args = RenderArgs {
                time: context.time,
                render_window: window,
                render_scale: (1.0, 1.0),
                project,
                inputs: &images,
            };
            active.instance().render(&args, &mut output)?;
            debug!(
                "Computed {} at t={} window {:?}",
                active.descriptor().id(),
                context.time,
                window
            );
            Ok(output)
        })
    }
}
