//! Core types for plugin hosting
//!
//! Defines the fundamental types used throughout the plugin host system:
//! - Plugin identification, versions and effect contexts
//! - Effect schema (clips and parameters) as described by a plugin
//! - Formats and resolved project geometry
//! - Error types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::ofx::abi;

/// Effect contexts an image effect can be instantiated in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectContext {
    /// No input clips, produces images from parameters alone
    Generator,
    /// One mandatory `Source` input
    Filter,
    /// Arbitrary clip layout
    General,
    /// `SourceFrom` and `SourceTo` inputs plus a transition parameter
    Transition,
    /// Source plus a brush mask
    Paint,
    /// Time-remapping filter
    Retimer,
}

impl EffectContext {
    /// The context's property string on the ABI
    pub fn as_ofx_str(&self) -> &'static str {
        match self {
            EffectContext::Generator => abi::CONTEXT_GENERATOR,
            EffectContext::Filter => abi::CONTEXT_FILTER,
            EffectContext::General => abi::CONTEXT_GENERAL,
            EffectContext::Transition => abi::CONTEXT_TRANSITION,
            EffectContext::Paint => abi::CONTEXT_PAINT,
            EffectContext::Retimer => abi::CONTEXT_RETIMER,
        }
    }

    /// Parse a context property string
    pub fn from_ofx_str(s: &str) -> Option<Self> {
        match s {
            abi::CONTEXT_GENERATOR => Some(EffectContext::Generator),
            abi::CONTEXT_FILTER => Some(EffectContext::Filter),
            abi::CONTEXT_GENERAL => Some(EffectContext::General),
            abi::CONTEXT_TRANSITION => Some(EffectContext::Transition),
            abi::CONTEXT_PAINT => Some(EffectContext::Paint),
            abi::CONTEXT_RETIMER => Some(EffectContext::Retimer),
            _ => None,
        }
    }
}

impl fmt::Display for EffectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectContext::Generator => "generator",
            EffectContext::Filter => "filter",
            EffectContext::General => "general",
            EffectContext::Transition => "transition",
            EffectContext::Paint => "paint",
            EffectContext::Retimer => "retimer",
        };
        write!(f, "{}", name)
    }
}

/// Plugin version (major.minor)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Where a plugin's implementation lives
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginSource {
    /// The `index`th effect exported by the bundle at `path`
    Bundle { path: PathBuf, index: usize },
    /// Implemented in-process and registered directly with the registry
    Builtin,
}

/// Identity of an installable effect, as enumerated by the registry
///
/// This is the part of an effect descriptor that can be read without
/// binding the plugin's clip and parameter schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Unique reverse-domain identifier (e.g. `net.sf.openfx.invertPlugin`)
    pub id: String,
    /// Plugin version
    pub version: PluginVersion,
    /// Version of the image effect API the plugin was written against
    pub api_version: i32,
    /// Human-readable label
    pub label: String,
    /// Menu grouping (e.g. `OFX/Color`)
    pub grouping: String,
    /// Contexts the plugin can be instantiated in
    pub contexts: Vec<EffectContext>,
    /// Implementation location
    pub source: PluginSource,
}

impl PluginInfo {
    /// Create an identity with no label, grouping or contexts
    pub fn new(id: &str, version: PluginVersion, source: PluginSource) -> Self {
        Self {
            id: id.to_string(),
            version,
            api_version: abi::IMAGE_EFFECT_PLUGIN_API_VERSION,
            label: id.to_string(),
            grouping: String::new(),
            contexts: Vec::new(),
            source,
        }
    }

    /// Check whether the plugin supports a context
    pub fn supports(&self, context: EffectContext) -> bool {
        self.contexts.contains(&context)
    }

    /// Bundle path, if the plugin is loaded from a binary bundle
    pub fn bundle_path(&self) -> Option<&PathBuf> {
        match &self.source {
            PluginSource::Bundle { path, .. } => Some(path),
            PluginSource::Builtin => None,
        }
    }
}

/// Role of a declared clip
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipRole {
    Input,
    Output,
}

/// A named image input or output declared by a plugin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipDescriptor {
    pub name: String,
    pub role: ClipRole,
    /// Input may be left unconnected
    pub optional: bool,
    /// Input is used as a mask
    pub is_mask: bool,
    /// Pixel components the clip accepts (`OfxImageComponentRGBA`, ...)
    pub components: Vec<String>,
}

impl ClipDescriptor {
    /// A mandatory RGBA input clip
    pub fn input(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: ClipRole::Input,
            optional: false,
            is_mask: false,
            components: vec![abi::COMPONENT_RGBA.to_string()],
        }
    }

    /// The RGBA output clip
    pub fn output() -> Self {
        Self {
            name: abi::OUTPUT_CLIP_NAME.to_string(),
            role: ClipRole::Output,
            optional: false,
            is_mask: false,
            components: vec![abi::COMPONENT_RGBA.to_string()],
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_input(&self) -> bool {
        self.role == ClipRole::Input
    }
}

/// Semantic type of a parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    Boolean,
    Integer,
    Double,
    Integer2D,
    Integer3D,
    Double2D,
    Double3D,
    Rgb,
    Rgba,
    String,
    /// Enumeration with labelled options; values are option indices
    Choice { options: Vec<String> },
    /// Container for nested parameters; holds no value itself
    Group { children: Vec<ParameterDescriptor> },
    /// Momentary button; holds no value
    PushButton,
}

impl ParameterKind {
    /// The parameter type tag used on the ABI
    pub fn ofx_type(&self) -> &'static str {
        match self {
            ParameterKind::Boolean => abi::PARAM_TYPE_BOOLEAN,
            ParameterKind::Integer => abi::PARAM_TYPE_INTEGER,
            ParameterKind::Double => abi::PARAM_TYPE_DOUBLE,
            ParameterKind::Integer2D => abi::PARAM_TYPE_INTEGER_2D,
            ParameterKind::Integer3D => abi::PARAM_TYPE_INTEGER_3D,
            ParameterKind::Double2D => abi::PARAM_TYPE_DOUBLE_2D,
            ParameterKind::Double3D => abi::PARAM_TYPE_DOUBLE_3D,
            ParameterKind::Rgb => abi::PARAM_TYPE_RGB,
            ParameterKind::Rgba => abi::PARAM_TYPE_RGBA,
            ParameterKind::String => abi::PARAM_TYPE_STRING,
            ParameterKind::Choice { .. } => abi::PARAM_TYPE_CHOICE,
            ParameterKind::Group { .. } => abi::PARAM_TYPE_GROUP,
            ParameterKind::PushButton => abi::PARAM_TYPE_PUSH_BUTTON,
        }
    }

    /// Whether parameters of this kind carry a value
    pub fn has_value(&self) -> bool {
        !matches!(self, ParameterKind::Group { .. } | ParameterKind::PushButton)
    }

    /// Value used when a plugin declares no default
    pub fn zero_value(&self) -> Option<ParameterValue> {
        let value = match self {
            ParameterKind::Boolean => ParameterValue::Bool(false),
            ParameterKind::Integer => ParameterValue::Int(0),
            ParameterKind::Double => ParameterValue::Double(0.0),
            ParameterKind::Integer2D => ParameterValue::Int2([0; 2]),
            ParameterKind::Integer3D => ParameterValue::Int3([0; 3]),
            ParameterKind::Double2D => ParameterValue::Double2([0.0; 2]),
            ParameterKind::Double3D => ParameterValue::Double3([0.0; 3]),
            ParameterKind::Rgb => ParameterValue::Rgb([0.0; 3]),
            ParameterKind::Rgba => ParameterValue::Rgba([0.0; 4]),
            ParameterKind::String => ParameterValue::String(String::new()),
            ParameterKind::Choice { .. } => ParameterValue::Choice(0),
            ParameterKind::Group { .. } | ParameterKind::PushButton => return None,
        };
        Some(value)
    }
}

/// A parameter value as held by a host slot or pushed to an instance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Double(f64),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Double2([f64; 2]),
    Double3([f64; 3]),
    Rgb([f64; 3]),
    Rgba([f64; 4]),
    String(String),
    /// Index into a choice parameter's option list
    Choice(i32),
}

impl ParameterValue {
    /// Short name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ParameterValue::Bool(_) => "bool",
            ParameterValue::Int(_) => "int",
            ParameterValue::Double(_) => "double",
            ParameterValue::Int2(_) => "int2",
            ParameterValue::Int3(_) => "int3",
            ParameterValue::Double2(_) => "double2",
            ParameterValue::Double3(_) => "double3",
            ParameterValue::Rgb(_) => "rgb",
            ParameterValue::Rgba(_) => "rgba",
            ParameterValue::String(_) => "string",
            ParameterValue::Choice(_) => "choice",
        }
    }
}

/// Inclusive numeric range declared for a parameter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Parameter metadata from a plugin's schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Unique name within the plugin (flat across groups)
    pub name: String,
    /// Display label
    pub label: String,
    /// Semantic type
    pub kind: ParameterKind,
    /// Default value (`None` for valueless kinds)
    pub default: Option<ParameterValue>,
    /// Declared numeric range
    pub range: Option<NumericRange>,
    /// The plugin expects values already clamped to `range`
    pub clamp_to_range: bool,
    /// Host edits are rejected
    pub read_only: bool,
    /// Hidden from the user interface
    pub secret: bool,
    /// Tooltip
    pub hint: String,
}

impl ParameterDescriptor {
    /// Create a parameter with the kind's zero value as default
    pub fn new(name: &str, kind: ParameterKind) -> Self {
        let default = kind.zero_value();
        Self {
            name: name.to_string(),
            label: name.to_string(),
            kind,
            default,
            range: None,
            clamp_to_range: false,
            read_only: false,
            secret: false,
            hint: String::new(),
        }
    }

    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(NumericRange::new(min, max));
        self
    }

    pub fn clamped(mut self) -> Self {
        self.clamp_to_range = true;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Default value, falling back to the kind's zero value
    pub fn default_value(&self) -> Option<ParameterValue> {
        self.default.clone().or_else(|| self.kind.zero_value())
    }

    /// Nested parameters of a group
    pub fn children(&self) -> &[ParameterDescriptor] {
        match &self.kind {
            ParameterKind::Group { children } => children,
            _ => &[],
        }
    }

    /// Find a parameter by name in this subtree
    pub fn find(&self, name: &str) -> Option<&ParameterDescriptor> {
        if self.name == name {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(name))
    }

    /// Check that a value is acceptable for this parameter
    ///
    /// Choice indices must address an existing option; every other kind
    /// only requires a matching (or losslessly widening) value type.
    pub fn validate(&self, value: &ParameterValue) -> PluginResult<()> {
        self.convert(value).map(|_| ())
    }

    /// Convert a host value to exactly the type the plugin declared
    ///
    /// Integers widen to doubles and choice indices may arrive as plain
    /// integers. Numeric values are clamped only when the plugin asked for
    /// clamped input.
    pub fn convert(&self, value: &ParameterValue) -> PluginResult<ParameterValue> {
        let converted = match (&self.kind, value) {
            (ParameterKind::Boolean, ParameterValue::Bool(b)) => ParameterValue::Bool(*b),
            (ParameterKind::Integer, ParameterValue::Int(i)) => {
                ParameterValue::Int(self.clamp_int(*i))
            }
            (ParameterKind::Double, ParameterValue::Double(d)) => {
                ParameterValue::Double(self.clamp_double(*d))
            }
            (ParameterKind::Double, ParameterValue::Int(i)) => {
                ParameterValue::Double(self.clamp_double(*i as f64))
            }
            (ParameterKind::Integer2D, ParameterValue::Int2(v)) => {
                ParameterValue::Int2(v.map(|c| self.clamp_int(c)))
            }
            (ParameterKind::Integer3D, ParameterValue::Int3(v)) => {
                ParameterValue::Int3(v.map(|c| self.clamp_int(c)))
            }
            (ParameterKind::Double2D, ParameterValue::Double2(v)) => {
                ParameterValue::Double2(v.map(|c| self.clamp_double(c)))
            }
            (ParameterKind::Double3D, ParameterValue::Double3(v)) => {
                ParameterValue::Double3(v.map(|c| self.clamp_double(c)))
            }
            (ParameterKind::Rgb, ParameterValue::Rgb(v)) => {
                ParameterValue::Rgb(v.map(|c| self.clamp_double(c)))
            }
            (ParameterKind::Rgba, ParameterValue::Rgba(v)) => {
                ParameterValue::Rgba(v.map(|c| self.clamp_double(c)))
            }
            (ParameterKind::String, ParameterValue::String(s)) => ParameterValue::String(s.clone()),
            (ParameterKind::Choice { options }, ParameterValue::Choice(index))
            | (ParameterKind::Choice { options }, ParameterValue::Int(index)) => {
                if *index < 0 || *index as usize >= options.len() {
                    return Err(PluginError::InvalidParameterValue(format!(
                        "{}: option {} out of range (0..{})",
                        self.name,
                        index,
                        options.len()
                    )));
                }
                ParameterValue::Choice(*index)
            }
            (kind, value) if !kind.has_value() => {
                return Err(PluginError::InvalidParameterValue(format!(
                    "{} holds no value (got {})",
                    self.name,
                    value.type_name()
                )))
            }
            (_, value) => {
                return Err(PluginError::InvalidParameterValue(format!(
                    "{} expects {}, got {}",
                    self.name,
                    self.kind.ofx_type(),
                    value.type_name()
                )))
            }
        };
        Ok(converted)
    }

    fn clamp_double(&self, value: f64) -> f64 {
        match self.range {
            Some(range) if self.clamp_to_range => range.clamp(value),
            _ => value,
        }
    }

    fn clamp_int(&self, value: i32) -> i32 {
        match self.range {
            Some(range) if self.clamp_to_range => range.clamp(value as f64).round() as i32,
            _ => value,
        }
    }
}

/// Clip and parameter schema of a plugin, described in one context
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectSchema {
    pub clips: Vec<ClipDescriptor>,
    pub parameters: Vec<ParameterDescriptor>,
}

impl EffectSchema {
    /// Declared input clips, in declaration order
    pub fn input_clips(&self) -> impl Iterator<Item = &ClipDescriptor> {
        self.clips.iter().filter(|c| c.is_input())
    }

    /// Find a parameter by name anywhere in the tree
    pub fn find_parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find_map(|p| p.find(name))
    }
}

/// Render thread-safety level a plugin declares
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderThreadSafety {
    /// Only one render may run at a time across all instances
    Unsafe,
    /// One render at a time per instance
    #[default]
    InstanceSafe,
    /// Any number of concurrent renders
    FullySafe,
}

/// A bound plugin: identity, the context it was described in, and its schema
///
/// Immutable once built by the binder and shared read-only by every node
/// that references the plugin id.
#[derive(Clone, Debug, PartialEq)]
pub struct PluginDescriptor {
    pub info: PluginInfo,
    pub context: EffectContext,
    pub schema: EffectSchema,
    pub thread_safety: RenderThreadSafety,
}

impl PluginDescriptor {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn input_clips(&self) -> impl Iterator<Item = &ClipDescriptor> {
        self.schema.input_clips()
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.schema.parameters
    }
}

/// An image format: integral pixel dimensions plus pixel aspect ratio
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub width: i32,
    pub height: i32,
    #[serde(default = "default_pixel_aspect")]
    pub pixel_aspect: f64,
}

fn default_pixel_aspect() -> f64 {
    1.0
}

impl Format {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            pixel_aspect: 1.0,
        }
    }

    pub fn with_pixel_aspect(mut self, pixel_aspect: f64) -> Self {
        self.pixel_aspect = pixel_aspect;
        self
    }

    /// Full-frame pixel rectangle
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

/// Integer pixel rectangle, half-open: `[x1, x2) x [y1, y2)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width, saturating at `i32::MAX` for rectangles spanning the whole plane
    pub fn width(&self) -> i32 {
        span(self.x1, self.x2)
    }

    pub fn height(&self) -> i32 {
        span(self.y1, self.y2)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        if r.x2 <= r.x1 || r.y2 <= r.y1 {
            Rect::default()
        } else {
            r
        }
    }
}

fn span(from: i32, to: i32) -> i32 {
    (i64::from(to) - i64::from(from)).clamp(0, i64::from(i32::MAX)) as i32
}

/// Resolved canvas for one evaluation
///
/// Sizes are floating point to match the ABI; integral formats convert
/// exactly.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectGeometry {
    pub width: f64,
    pub height: f64,
    pub pixel_aspect: f64,
}

impl ProjectGeometry {
    /// Build geometry from a format, rejecting non-positive values
    pub fn from_format(format: &Format) -> PluginResult<Self> {
        if format.width <= 0 || format.height <= 0 {
            return Err(PluginError::InvalidFormat(format!(
                "{}x{} is not a positive size",
                format.width, format.height
            )));
        }
        if !(format.pixel_aspect.is_finite() && format.pixel_aspect > 0.0) {
            return Err(PluginError::InvalidFormat(format!(
                "pixel aspect {} is not positive",
                format.pixel_aspect
            )));
        }
        Ok(Self {
            width: f64::from(format.width),
            height: f64::from(format.height),
            pixel_aspect: format.pixel_aspect,
        })
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Project offset (the host places every project at the origin)
    pub fn offset(&self) -> (f64, f64) {
        (0.0, 0.0)
    }

    /// Project extent (size plus offset)
    pub fn extent(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    /// Pixel rectangle covering the project
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Back to an integral format
    pub fn format(&self) -> Format {
        Format::new(self.width as i32, self.height as i32).with_pixel_aspect(self.pixel_aspect)
    }
}

/// Plugin host error types
#[derive(Debug)]
pub enum PluginError {
    /// No registered plugin has this id
    NotFound(String),
    /// API version or supported contexts unusable by this host
    Incompatible(String),
    /// Plugin described a schema the host cannot mirror
    MalformedSchema(String),
    /// Parameter value rejected (wrong type, choice index out of range, read-only)
    InvalidParameterValue(String),
    /// Parameter slot bookkeeping error (unknown or duplicate slot)
    ParameterError(String),
    /// Neither an upstream format nor a default format is available
    NoGeometryAvailable,
    /// A format with zero or negative size or aspect
    InvalidFormat(String),
    /// Plugin refused to create an instance with the current values
    InstantiationRefused(String),
    /// Plugin failed to render
    RenderFailed(String),
    /// Bundle binary could not be loaded
    LoadFailed(String),
    /// A plugin action returned a failing status
    Abi { action: String, status: i32 },
    /// No plugin has been bound on the node yet
    NotInstantiated(String),
    /// Operation on a node that has been destroyed
    NodeDestroyed,
    /// IO error
    IoError(std::io::Error),
    /// Serialization error
    SerdeError(String),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginError::NotFound(id) => write!(f, "Plugin not found: {}", id),
            PluginError::Incompatible(msg) => write!(f, "Plugin incompatible: {}", msg),
            PluginError::MalformedSchema(msg) => write!(f, "Malformed plugin schema: {}", msg),
            PluginError::InvalidParameterValue(msg) => {
                write!(f, "Invalid parameter value: {}", msg)
            }
            PluginError::ParameterError(msg) => write!(f, "Parameter error: {}", msg),
            PluginError::NoGeometryAvailable => {
                write!(f, "No geometry available: no connected input and no default format")
            }
            PluginError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            PluginError::InstantiationRefused(msg) => {
                write!(f, "Plugin refused instantiation: {}", msg)
            }
            PluginError::RenderFailed(msg) => write!(f, "Render failed: {}", msg),
            PluginError::LoadFailed(msg) => write!(f, "Failed to load plugin bundle: {}", msg),
            PluginError::Abi { action, status } => {
                write!(f, "Action {} failed with status {}", action, status)
            }
            PluginError::NotInstantiated(id) => {
                write!(f, "No plugin instance created for '{}'", id)
            }
            PluginError::NodeDestroyed => write!(f, "Node has been destroyed"),
            PluginError::IoError(e) => write!(f, "IO error: {}", e),
            PluginError::SerdeError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for PluginError {}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::IoError(e)
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn choice() -> ParameterDescriptor {
        ParameterDescriptor::new(
            "mode",
            ParameterKind::Choice {
                options: vec!["Add".to_string(), "Multiply".to_string(), "Screen".to_string()],
            },
        )
    }

    #[test]
    fn test_context_round_trip_strings() {
        assert_eq!(EffectContext::Filter.as_ofx_str(), "OfxImageEffectContextFilter");
        assert_eq!(
            EffectContext::from_ofx_str("OfxImageEffectContextGeneral"),
            Some(EffectContext::General)
        );
        assert_eq!(EffectContext::from_ofx_str("OfxImageEffectContextBogus"), None);
        assert_eq!(format!("{}", EffectContext::Generator), "generator");
    }

    #[test]
    fn test_choice_validation() {
        let param = choice();
        assert!(param.validate(&ParameterValue::Choice(2)).is_ok());
        assert!(param.validate(&ParameterValue::Int(0)).is_ok());
        assert!(matches!(
            param.validate(&ParameterValue::Choice(3)),
            Err(PluginError::InvalidParameterValue(_))
        ));
        assert!(matches!(
            param.validate(&ParameterValue::Choice(-1)),
            Err(PluginError::InvalidParameterValue(_))
        ));
    }

    #[test]
    fn test_convert_clamps_only_when_requested() {
        let loose = ParameterDescriptor::new("gain", ParameterKind::Double).with_range(0.0, 1.0);
        assert_eq!(
            loose.convert(&ParameterValue::Double(4.0)).unwrap(),
            ParameterValue::Double(4.0)
        );

        let strict = loose.clone().clamped();
        assert_eq!(
            strict.convert(&ParameterValue::Double(4.0)).unwrap(),
            ParameterValue::Double(1.0)
        );
        assert_eq!(
            strict.convert(&ParameterValue::Int(-3)).unwrap(),
            ParameterValue::Double(0.0)
        );
    }

    #[test]
    fn test_convert_rejects_type_mismatch() {
        let param = ParameterDescriptor::new("flag", ParameterKind::Boolean);
        assert!(param.convert(&ParameterValue::Double(1.0)).is_err());

        let group = ParameterDescriptor::new("grp", ParameterKind::Group { children: vec![] });
        assert!(group.default_value().is_none());
        assert!(group.convert(&ParameterValue::Bool(true)).is_err());
    }

    #[test]
    fn test_find_nested_parameter() {
        let group = ParameterDescriptor::new(
            "channels",
            ParameterKind::Group {
                children: vec![ParameterDescriptor::new("red", ParameterKind::Boolean)],
            },
        );
        let schema = EffectSchema {
            clips: vec![ClipDescriptor::input("Source"), ClipDescriptor::output()],
            parameters: vec![group],
        };
        assert!(schema.find_parameter("red").is_some());
        assert!(schema.find_parameter("green").is_none());
        assert_eq!(schema.input_clips().count(), 1);
    }

    #[test]
    fn test_geometry_is_exact_and_positive() {
        let geometry = ProjectGeometry::from_format(&Format::new(100, 200).with_pixel_aspect(2.0))
            .unwrap();
        assert_eq!(geometry.size(), (100.0, 200.0));
        assert_eq!(geometry.pixel_aspect, 2.0);

        assert!(matches!(
            ProjectGeometry::from_format(&Format::new(0, 10)),
            Err(PluginError::InvalidFormat(_))
        ));
        assert!(matches!(
            ProjectGeometry::from_format(&Format::new(10, 10).with_pixel_aspect(0.0)),
            Err(PluginError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 20, 20);
        assert_eq!(a.intersect(&b), Rect::new(5, 5, 10, 10));
        assert!(a.intersect(&Rect::new(10, 10, 12, 12)).is_empty());
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 0));
    }

    #[test]
    fn test_rect_size_saturates() {
        let plane = Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(plane.width(), i32::MAX);
        assert_eq!(plane.height(), i32::MAX);
        assert!(!plane.is_empty());
        assert_eq!(Rect::new(i32::MAX, 0, i32::MIN, 1).width(), 0);
        assert_eq!(Rect::new(-3, -4, 5, 4).height(), 8);
    }

    #[test]
    fn test_plugin_version_display() {
        assert_eq!(format!("{}", PluginVersion::new(1, 4)), "1.4");
    }
}
