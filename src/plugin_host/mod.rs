//! Plugin Host Module
//!
//! Hosts OpenFX image effects inside a node graph. Native bundles and
//! builtin effects are both driven through the `EffectPlugin` /
//! `EffectInstance` traits; the rest of the host never sees the C ABI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  OfxImageNode: plugin id, inputs, parameter slots, compute  │
//! └─────────────────────────────────────────────────────────────┘
//!            │                     │                    │
//!            ▼                     ▼                    ▼
//! ┌────────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ EffectInstance-    │ │ RenderInvoker    │ │ GeometryResolver │
//! │ Manager (lifecycle)│ │ (push + render)  │ │ (project size)   │
//! └────────────────────┘ └──────────────────┘ └──────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PluginBinder: bind id -> PluginDescriptor (cached)         │
//! └─────────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PluginRegistry: scan bundles, JSON cache, builtins         │
//! └─────────────────────────────────────────────────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ofx: bundles, host suites, BinaryEffectPlugin adapter      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ofx_host::plugin_host::*;
//!
//! let registry = Arc::new(PluginRegistry::from_config(&HostConfig::default()));
//! mock_plugin::register_builtins(&registry);
//! let binder = Arc::new(PluginBinder::new(registry));
//!
//! let node = OfxImageNode::new("invert", binder, Arc::new(DefaultFormat::default()));
//! node.set_plugin_id("net.sf.openfx.invertPlugin").unwrap();
//! assert!(node.create_plugin_instance());
//! let size = node.effect_instance_project_size(&EvaluationContext::new()).unwrap();
//! assert_eq!(size, (1920.0, 1080.0));
//! ```

pub mod binder;
pub mod config;
pub mod context;
pub mod effect;
pub mod geometry;
pub mod image;
pub mod manager;
pub mod mock_plugin;
pub mod node;
pub mod ofx;
pub mod params;
pub mod registry;
pub mod render;
pub mod types;

// Re-exports for convenience
pub use binder::{BoundPlugin, PluginBinder};
pub use config::HostConfig;
pub use context::{ContextValue, EvaluationContext};
pub use effect::{EffectInstance, EffectPlugin, ParameterValues, RegionArgs, RenderArgs};
pub use geometry::{DefaultFormat, DefaultFormatProvider, GeometryResolver};
pub use image::{ClipBinding, ConstantImage, Image, ImageInput, SharedImageInput};
pub use manager::{EffectInstanceManager, InstanceState};
pub use node::OfxImageNode;
pub use params::{ParameterBinding, ParameterHost, ParameterPlugs, ParameterSlot};
pub use registry::PluginRegistry;
pub use render::RenderInvoker;
pub use types::*;
