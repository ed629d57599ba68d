//! Project Geometry Resolver
//!
//! The project follows the source: the first connected input with a known
//! format decides the canvas. Without one, the default format is used. It is
//! re-read on every call, so overriding it between evaluations takes effect
//! immediately.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::config::HostConfig;
use super::context::EvaluationContext;
use super::image::ClipBinding;
use super::types::*;

/// Source of the host's default image format
pub trait DefaultFormatProvider: Send + Sync {
    fn default_format(&self, context: &EvaluationContext) -> Option<Format>;
}

/// Default format setting
///
/// A format in the evaluation context (`image:defaultFormat`) takes
/// precedence over the stored one.
pub struct DefaultFormat {
    format: ArcSwap<Option<Format>>,
}

impl DefaultFormat {
    pub fn new(format: Option<Format>) -> Self {
        Self {
            format: ArcSwap::from_pointee(format),
        }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(config.default_format)
    }

    pub fn set(&self, format: Format) {
        self.format.store(Arc::new(Some(format)));
    }

    pub fn clear(&self) {
        self.format.store(Arc::new(None));
    }

    pub fn get(&self) -> Option<Format> {
        **self.format.load()
    }
}

impl Default for DefaultFormat {
    fn default() -> Self {
        Self::new(Some(Format::new(1920, 1080)))
    }
}

impl DefaultFormatProvider for DefaultFormat {
    fn default_format(&self, context: &EvaluationContext) -> Option<Format> {
        context.default_format().or_else(|| self.get())
    }
}

#[derive(Clone)]
pub struct GeometryResolver {
    default_format: Arc<dyn DefaultFormatProvider>,
}

impl GeometryResolver {
    pub fn new(default_format: Arc<dyn DefaultFormatProvider>) -> Self {
        Self { default_format }
    }

    /// Resolve the project for one evaluation
    pub fn resolve(
        &self,
        inputs: &[ClipBinding],
        context: &EvaluationContext,
    ) -> PluginResult<ProjectGeometry> {
        let upstream = inputs.iter().find_map(|binding| binding.format(context));
        match upstream.or_else(|| self.default_format.default_format(context)) {
            Some(format) => ProjectGeometry::from_format(&format),
            None => Err(PluginError::NoGeometryAvailable),
        }
    }
}

impl std::fmt::Debug for GeometryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_host::image::{ConstantImage, SharedImageInput};

    fn resolver(default: &Arc<DefaultFormat>) -> GeometryResolver {
        GeometryResolver::new(default.clone())
    }

    fn source(format: Option<Format>) -> ClipBinding {
        ClipBinding::new(
            ClipDescriptor::input("Source"),
            format.map(|f| Arc::new(ConstantImage::new(f, [1.0; 4])) as SharedImageInput),
        )
    }

    #[test]
    fn test_default_format_is_reread() {
        let default = Arc::new(DefaultFormat::default());
        let resolver = resolver(&default);
        let context = EvaluationContext::new();

        assert_eq!(resolver.resolve(&[], &context).unwrap().size(), (1920.0, 1080.0));

        default.set(Format::new(100, 200).with_pixel_aspect(2.0));
        let geometry = resolver.resolve(&[], &context).unwrap();
        assert_eq!(geometry.size(), (100.0, 200.0));
        assert_eq!(geometry.pixel_aspect, 2.0);
    }

    #[test]
    fn test_context_override_wins() {
        let default = Arc::new(DefaultFormat::default());
        let context = EvaluationContext::new().with_default_format(Format::new(640, 480));
        assert_eq!(resolver(&default).resolve(&[], &context).unwrap().size(), (640.0, 480.0));
    }

    #[test]
    fn test_connected_source_wins() {
        let default = Arc::new(DefaultFormat::default());
        let inputs = [source(None), source(Some(Format::new(320, 240).with_pixel_aspect(1.5)))];
        let geometry = resolver(&default)
            .resolve(&inputs, &EvaluationContext::new())
            .unwrap();
        assert_eq!(geometry.size(), (320.0, 240.0));
        assert_eq!(geometry.pixel_aspect, 1.5);
    }

    #[test]
    fn test_no_geometry() {
        let default = Arc::new(DefaultFormat::new(None));
        assert!(matches!(
            resolver(&default).resolve(&[source(None)], &EvaluationContext::new()),
            Err(PluginError::NoGeometryAvailable)
        ));
    }

    #[test]
    fn test_rejects_empty_format() {
        let default = Arc::new(DefaultFormat::new(Some(Format::new(0, 1080))));
        assert!(matches!(
            resolver(&default).resolve(&[], &EvaluationContext::new()),
            Err(PluginError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let default = Arc::new(DefaultFormat::default());
        let resolver = resolver(&default);
        let context = EvaluationContext::at_time(12.0);
        let a = resolver.resolve(&[], &context).unwrap();
        let b = resolver.resolve(&[], &context).unwrap();
        assert_eq!(a, b);
    }
}
