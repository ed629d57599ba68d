//! Native OFX plugins behind the `EffectPlugin` / `EffectInstance` traits
//!
//! `BinaryEffectPlugin` sends `Load` and `Describe` when constructed and
//! `Unload` when dropped. `BinaryInstance` sends `CreateInstance` when
//! constructed and `DestroyInstance` when dropped.

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::abi::{self, *};
use super::bundle::Bundle;
use super::handles::{ClipImage, EffectHandle, ParamHandle};
use super::property::PropertySet;
use super::suites;
use crate::plugin_host::effect::{
    EffectInstance, EffectPlugin, ParameterValues, RegionArgs, RenderArgs,
};
use crate::plugin_host::image::Image;
use crate::plugin_host::types::*;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Call a plugin action and map a failing status to an error
///
/// # Safety
/// `handle` must be null or a handle the plugin may receive for `action`.
unsafe fn call_action(
    entry: MainEntryFn,
    action: &str,
    handle: *mut c_void,
    in_args: Option<&PropertySet>,
    out_args: Option<&PropertySet>,
) -> PluginResult<OfxStatus> {
    let name = CString::new(action).map_err(|e| PluginError::LoadFailed(e.to_string()))?;
    let status = entry(
        name.as_ptr(),
        handle,
        in_args.map(|p| p.handle()).unwrap_or(ptr::null_mut()),
        out_args.map(|p| p.handle()).unwrap_or(ptr::null_mut()),
    );
    if abi::status_ok(status) {
        Ok(status)
    } else {
        Err(PluginError::Abi {
            action: action.to_string(),
            status,
        })
    }
}

/// One plugin exported by a loaded bundle
pub struct BinaryEffectPlugin {
    bundle: Arc<Bundle>,
    entry: MainEntryFn,
    info: PluginInfo,
    descriptor: Box<EffectHandle>,
    thread_safety: RenderThreadSafety,
    // Serialises descriptor actions.
    actions: Mutex<()>,
    // Held across renders of every instance when the plugin is render-unsafe.
    render_lock: Arc<Mutex<()>>,
}

impl BinaryEffectPlugin {
    /// Load and describe the `index`th plugin of a bundle
    pub fn load(bundle: Arc<Bundle>, index: usize) -> PluginResult<Self> {
        let record = bundle.plugin(index).ok_or_else(|| {
            PluginError::LoadFailed(format!("{}: no plugin #{}", bundle.path().display(), index))
        })?;
        let id = bundle
            .plugin_identifier(index)
            .ok_or_else(|| PluginError::LoadFailed("plugin has no identifier".to_string()))?;

        // SAFETY: the record belongs to the loaded bundle.
        let api = unsafe { c_string(record.plugin_api) };
        if api != abi::IMAGE_EFFECT_PLUGIN_API {
            return Err(PluginError::Incompatible(format!("{} implements {}", id, api)));
        }
        let entry = record
            .main_entry
            .ok_or_else(|| PluginError::LoadFailed(format!("{} has no main entry", id)))?;

        let version = PluginVersion::new(record.plugin_version_major, record.plugin_version_minor);
        let mut info = PluginInfo::new(
            &id,
            version,
            PluginSource::Bundle {
                path: bundle.path().to_path_buf(),
                index,
            },
        );
        info.api_version = record.api_version;

        if let Some(set_host) = record.set_host {
            // SAFETY: the host record is a process-wide static.
            unsafe { set_host(suites::host()) };
        }

        // SAFETY: Load takes no handle.
        unsafe { call_action(entry, abi::ACTION_LOAD, ptr::null_mut(), None, None) }?;

        let descriptor = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        // SAFETY: descriptor handle created for this plugin.
        if let Err(e) =
            unsafe { call_action(entry, abi::ACTION_DESCRIBE, descriptor.handle(), None, None) }
        {
            // SAFETY: balance the successful Load.
            let _ = unsafe { call_action(entry, abi::ACTION_UNLOAD, ptr::null_mut(), None, None) };
            return Err(e);
        }

        let props = &descriptor.props;
        info.label = props
            .get_string(abi::PROP_LABEL, 0)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| id.clone());
        info.grouping = props
            .get_string(abi::IMAGE_EFFECT_PLUGIN_PROP_GROUPING, 0)
            .unwrap_or_default();
        info.contexts = props
            .get_strings(abi::IMAGE_EFFECT_PROP_SUPPORTED_CONTEXTS)
            .iter()
            .filter_map(|c| EffectContext::from_ofx_str(c))
            .collect();
        let thread_safety = match props
            .get_string(abi::IMAGE_EFFECT_PROP_RENDER_THREAD_SAFETY, 0)
            .as_deref()
        {
            Some(abi::RENDER_THREAD_UNSAFE) => RenderThreadSafety::Unsafe,
            Some(abi::RENDER_THREAD_FULLY_SAFE) => RenderThreadSafety::FullySafe,
            _ => RenderThreadSafety::InstanceSafe,
        };

        debug!("Described {} ({} contexts)", info.id, info.contexts.len());

        Ok(Self {
            bundle,
            entry,
            info,
            descriptor,
            thread_safety,
            actions: Mutex::new(()),
            render_lock: Arc::new(Mutex::new(())),
        })
    }
}

unsafe fn c_string(s: *const c_char) -> String {
    if s.is_null() {
        return String::new();
    }
    CStr::from_ptr(s).to_string_lossy().into_owned()
}

/// Read the clip layout of a described effect
fn clips_from(effect: &EffectHandle) -> Vec<ClipDescriptor> {
    effect
        .clip_names()
        .into_iter()
        .filter_map(|name| {
            let clip = effect.clip(&name)?;
            let props = &clip.props;
            let mut descriptor = if name == abi::OUTPUT_CLIP_NAME {
                ClipDescriptor::output()
            } else {
                ClipDescriptor::input(&name)
            };
            descriptor.optional = props.get_bool(abi::IMAGE_CLIP_PROP_OPTIONAL).unwrap_or(false);
            descriptor.is_mask = props.get_bool(abi::IMAGE_CLIP_PROP_IS_MASK).unwrap_or(false);
            let components = props.get_strings(abi::IMAGE_EFFECT_PROP_SUPPORTED_COMPONENTS);
            if !components.is_empty() {
                descriptor.components = components;
            }
            Some(descriptor)
        })
        .collect()
}

fn doubles(param: &ParamHandle, prop: &str, n: usize) -> Option<Vec<f64>> {
    let values = param.props.get_doubles(prop);
    (values.len() >= n).then(|| values[..n].to_vec())
}

fn ints(param: &ParamHandle, prop: &str, n: usize) -> Option<Vec<i32>> {
    let values: Vec<i32> = (0..param.props.dimension(prop))
        .filter_map(|i| param.props.get_int(prop, i))
        .collect();
    (values.len() >= n).then(|| values[..n].to_vec())
}

/// Translate one declared parameter; `None` for kinds the host does not
/// surface (pages)
fn parameter_from(param: &ParamHandle) -> PluginResult<Option<ParameterDescriptor>> {
    let malformed = |what: &str| {
        PluginError::MalformedSchema(format!("parameter {}: {}", param.name, what))
    };
    let kind = match param.param_type.as_str() {
        abi::PARAM_TYPE_BOOLEAN => ParameterKind::Boolean,
        abi::PARAM_TYPE_INTEGER => ParameterKind::Integer,
        abi::PARAM_TYPE_DOUBLE => ParameterKind::Double,
        abi::PARAM_TYPE_INTEGER_2D => ParameterKind::Integer2D,
        abi::PARAM_TYPE_INTEGER_3D => ParameterKind::Integer3D,
        abi::PARAM_TYPE_DOUBLE_2D => ParameterKind::Double2D,
        abi::PARAM_TYPE_DOUBLE_3D => ParameterKind::Double3D,
        abi::PARAM_TYPE_RGB => ParameterKind::Rgb,
        abi::PARAM_TYPE_RGBA => ParameterKind::Rgba,
        abi::PARAM_TYPE_STRING | abi::PARAM_TYPE_CUSTOM => ParameterKind::String,
        abi::PARAM_TYPE_CHOICE => ParameterKind::Choice {
            options: param.props.get_strings(abi::PARAM_PROP_CHOICE_OPTION),
        },
        abi::PARAM_TYPE_GROUP => ParameterKind::Group { children: Vec::new() },
        abi::PARAM_TYPE_PUSH_BUTTON => ParameterKind::PushButton,
        abi::PARAM_TYPE_PAGE => return Ok(None),
        other => return Err(malformed(&format!("unknown type {}", other))),
    };

    let mut descriptor = ParameterDescriptor::new(&param.name, kind);
    let props = &param.props;
    if let Some(label) = props.get_string(abi::PROP_LABEL, 0).filter(|l| !l.is_empty()) {
        descriptor.label = label;
    }
    descriptor.hint = props.get_string(abi::PARAM_PROP_HINT, 0).unwrap_or_default();
    descriptor.secret = props.get_bool(abi::PARAM_PROP_SECRET).unwrap_or(false);
    descriptor.read_only = !props.get_bool(abi::PARAM_PROP_ENABLED).unwrap_or(true);

    let default = if props.contains(abi::PARAM_PROP_DEFAULT) {
        let d = abi::PARAM_PROP_DEFAULT;
        let value = match &descriptor.kind {
            ParameterKind::Boolean => ints(param, d, 1).map(|v| ParameterValue::Bool(v[0] != 0)),
            ParameterKind::Integer => ints(param, d, 1).map(|v| ParameterValue::Int(v[0])),
            ParameterKind::Choice { .. } => ints(param, d, 1).map(|v| ParameterValue::Choice(v[0])),
            ParameterKind::Integer2D => ints(param, d, 2).map(|v| ParameterValue::Int2([v[0], v[1]])),
            ParameterKind::Integer3D => {
                ints(param, d, 3).map(|v| ParameterValue::Int3([v[0], v[1], v[2]]))
            }
            ParameterKind::Double => doubles(param, d, 1).map(|v| ParameterValue::Double(v[0])),
            ParameterKind::Double2D => {
                doubles(param, d, 2).map(|v| ParameterValue::Double2([v[0], v[1]]))
            }
            ParameterKind::Double3D => {
                doubles(param, d, 3).map(|v| ParameterValue::Double3([v[0], v[1], v[2]]))
            }
            ParameterKind::Rgb => doubles(param, d, 3).map(|v| ParameterValue::Rgb([v[0], v[1], v[2]])),
            ParameterKind::Rgba => {
                doubles(param, d, 4).map(|v| ParameterValue::Rgba([v[0], v[1], v[2], v[3]]))
            }
            ParameterKind::String => props.get_string(d, 0).map(ParameterValue::String),
            ParameterKind::Group { .. } | ParameterKind::PushButton => None,
        };
        Some(value.ok_or_else(|| malformed("default has the wrong type or dimension"))?)
    } else {
        descriptor.kind.zero_value()
    };
    descriptor.default = default;

    if let (Some(min), Some(max)) = (
        props.get_double(abi::PARAM_PROP_MIN, 0),
        props.get_double(abi::PARAM_PROP_MAX, 0),
    ) {
        if min > max {
            return Err(malformed("minimum exceeds maximum"));
        }
        descriptor.range = Some(NumericRange::new(min, max));
    }

    Ok(Some(descriptor))
}

/// Read the parameter tree of a described effect
fn parameters_from(effect: &EffectHandle) -> PluginResult<Vec<ParameterDescriptor>> {
    let mut flat = Vec::new();
    for param in effect.params.all() {
        if let Some(descriptor) = parameter_from(param)? {
            let parent = param
                .props
                .get_string(abi::PARAM_PROP_PARENT, 0)
                .filter(|p| !p.is_empty());
            flat.push((descriptor, parent));
        }
    }

    // Attach children to their groups, innermost first.
    fn build(
        parent: Option<&str>,
        flat: &[(ParameterDescriptor, Option<String>)],
        depth: usize,
    ) -> PluginResult<Vec<ParameterDescriptor>> {
        if depth > flat.len() {
            return Err(PluginError::MalformedSchema(
                "parameter groups form a cycle".to_string(),
            ));
        }
        let mut out = Vec::new();
        for (descriptor, p) in flat {
            if p.as_deref() != parent {
                continue;
            }
            let mut descriptor = descriptor.clone();
            if let ParameterKind::Group { children } = &mut descriptor.kind {
                *children = build(Some(&descriptor.name), flat, depth + 1)?;
            }
            out.push(descriptor);
        }
        Ok(out)
    }

    let known: Vec<&str> = flat.iter().map(|(d, _)| d.name.as_str()).collect();
    let mut roots = build(None, &flat, 0)?;
    // Parameters whose parent is not a declared group stay at the top level.
    for (descriptor, parent) in &flat {
        if let Some(parent) = parent {
            if !known.contains(&parent.as_str()) {
                roots.push(descriptor.clone());
            }
        }
    }
    Ok(roots)
}

impl EffectPlugin for BinaryEffectPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn describe(&self, context: EffectContext) -> PluginResult<EffectSchema> {
        let _guard = lock(&self.actions);

        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        copy_properties(&self.descriptor.props, &effect.props);
        let in_args = PropertySet::new();
        in_args.set_string(abi::IMAGE_EFFECT_PROP_CONTEXT, 0, context.as_ofx_str());

        // SAFETY: fresh descriptor handle for this plugin.
        unsafe {
            call_action(
                self.entry,
                abi::IMAGE_EFFECT_ACTION_DESCRIBE_IN_CONTEXT,
                effect.handle(),
                Some(&in_args),
                None,
            )
        }
        .map_err(|e| match e {
            PluginError::Abi { status, .. } if status == abi::STAT_ERR_MISSING_HOST_FEATURE => {
                PluginError::Incompatible(format!("{} needs a host feature for {}", self.info.id, context))
            }
            other => other,
        })?;

        Ok(EffectSchema {
            clips: clips_from(&effect),
            parameters: parameters_from(&effect)?,
        })
    }

    fn thread_safety(&self) -> RenderThreadSafety {
        self.thread_safety
    }

    fn create_instance(
        &self,
        descriptor: &PluginDescriptor,
        values: &ParameterValues,
    ) -> PluginResult<Box<dyn EffectInstance>> {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT_INSTANCE);
        copy_properties(&self.descriptor.props, &effect.props);
        effect.props.set_string(abi::PROP_TYPE, 0, abi::TYPE_IMAGE_EFFECT_INSTANCE);
        effect
            .props
            .set_string(abi::IMAGE_EFFECT_PROP_CONTEXT, 0, descriptor.context.as_ofx_str());
        effect.props.set_pointer(abi::PROP_INSTANCE_DATA, 0, ptr::null_mut());
        effect.props.set_doubles(abi::IMAGE_EFFECT_PROP_FRAME_RANGE, &[0.0, 0.0]);
        effect.props.set_double(abi::IMAGE_EFFECT_PROP_FRAME_RATE, 0, 24.0);
        effect.props.set_double(abi::IMAGE_EFFECT_INSTANCE_PROP_EFFECT_DURATION, 0, 1.0);

        for clip in &descriptor.schema.clips {
            let handle = effect.define_clip(&clip.name);
            let props = &handle.props;
            props.set_int(abi::IMAGE_CLIP_PROP_OPTIONAL, 0, clip.optional as i32);
            props.set_int(abi::IMAGE_CLIP_PROP_IS_MASK, 0, clip.is_mask as i32);
            props.set_int(abi::IMAGE_CLIP_PROP_CONNECTED, 0, 0);
            props.set_string(abi::IMAGE_EFFECT_PROP_COMPONENTS, 0, abi::COMPONENT_RGBA);
            props.set_string(abi::IMAGE_CLIP_PROP_UNMAPPED_COMPONENTS, 0, abi::COMPONENT_RGBA);
            props.set_string(abi::IMAGE_EFFECT_PROP_PIXEL_DEPTH, 0, abi::BIT_DEPTH_FLOAT);
            props.set_string(abi::IMAGE_CLIP_PROP_UNMAPPED_PIXEL_DEPTH, 0, abi::BIT_DEPTH_FLOAT);
            props.set_string(abi::IMAGE_EFFECT_PROP_PRE_MULTIPLICATION, 0, abi::IMAGE_PREMULTIPLIED);
            props.set_string(abi::IMAGE_CLIP_PROP_FIELD_ORDER, 0, abi::IMAGE_FIELD_NONE);
            props.set_int(abi::IMAGE_CLIP_PROP_CONTINUOUS_SAMPLES, 0, 0);
            props.set_double(abi::IMAGE_EFFECT_PROP_PIXEL_ASPECT_RATIO, 0, 1.0);
            props.set_double(abi::IMAGE_EFFECT_PROP_FRAME_RATE, 0, 24.0);
            props.set_doubles(abi::IMAGE_EFFECT_PROP_FRAME_RANGE, &[0.0, 0.0]);
            props.set_double(abi::IMAGE_EFFECT_PROP_UNMAPPED_FRAME_RATE, 0, 24.0);
            props.set_doubles(abi::IMAGE_EFFECT_PROP_UNMAPPED_FRAME_RANGE, &[0.0, 0.0]);
        }

        define_parameters(&effect, &descriptor.schema.parameters, None);
        for (name, value) in values {
            if let Some(param) = effect.params.get(name) {
                param.set_value(value.clone());
            }
        }

        // SAFETY: fresh instance handle for this plugin.
        unsafe {
            call_action(self.entry, abi::ACTION_CREATE_INSTANCE, effect.handle(), None, None)
        }
        .map_err(|e| PluginError::InstantiationRefused(format!("{}: {}", self.info.id, e)))?;

        info!("Created instance of {}", self.info.id);

        Ok(Box::new(BinaryInstance {
            plugin_id: self.info.id.clone(),
            entry: self.entry,
            effect,
            _bundle: self.bundle.clone(),
            render_lock: (self.thread_safety == RenderThreadSafety::Unsafe)
                .then(|| self.render_lock.clone()),
        }))
    }
}

impl Drop for BinaryEffectPlugin {
    fn drop(&mut self) {
        // SAFETY: balances the Load sent in `load`; the bundle is still alive.
        if let Err(e) =
            unsafe { call_action(self.entry, abi::ACTION_UNLOAD, ptr::null_mut(), None, None) }
        {
            warn!("Unloading {} failed: {}", self.info.id, e);
        }
    }
}

fn copy_properties(from: &PropertySet, to: &PropertySet) {
    for name in [
        abi::PROP_LABEL,
        abi::PROP_SHORT_LABEL,
        abi::PROP_LONG_LABEL,
        abi::IMAGE_EFFECT_PLUGIN_PROP_GROUPING,
        abi::IMAGE_EFFECT_PROP_SUPPORTS_TILES,
        abi::IMAGE_EFFECT_PROP_TEMPORAL_CLIP_ACCESS,
        abi::IMAGE_EFFECT_PROP_RENDER_THREAD_SAFETY,
        abi::PROP_PLUGIN_DESCRIPTION,
    ] {
        if let Some(s) = from.get_string(name, 0) {
            to.set_string(name, 0, &s);
        } else if let Some(i) = from.get_int(name, 0) {
            to.set_int(name, 0, i);
        }
    }
    let contexts = from.get_strings(abi::IMAGE_EFFECT_PROP_SUPPORTED_CONTEXTS);
    let contexts: Vec<&str> = contexts.iter().map(String::as_str).collect();
    to.set_strings(abi::IMAGE_EFFECT_PROP_SUPPORTED_CONTEXTS, &contexts);
}

fn define_parameters(effect: &EffectHandle, params: &[ParameterDescriptor], parent: Option<&str>) {
    for descriptor in params {
        let Some(param) = effect.params.define(descriptor.kind.ofx_type(), &descriptor.name) else {
            continue;
        };
        let props = &param.props;
        props.set_string(abi::PROP_LABEL, 0, &descriptor.label);
        props.set_string(abi::PARAM_PROP_HINT, 0, &descriptor.hint);
        props.set_int(abi::PARAM_PROP_SECRET, 0, descriptor.secret as i32);
        props.set_int(abi::PARAM_PROP_ENABLED, 0, (!descriptor.read_only) as i32);
        props.set_int(abi::PARAM_PROP_ANIMATES, 0, 0);
        props.set_string(abi::PARAM_PROP_PARENT, 0, parent.unwrap_or(""));
        if let Some(range) = descriptor.range {
            props.set_double(abi::PARAM_PROP_MIN, 0, range.min);
            props.set_double(abi::PARAM_PROP_MAX, 0, range.max);
            props.set_double(abi::PARAM_PROP_DISPLAY_MIN, 0, range.min);
            props.set_double(abi::PARAM_PROP_DISPLAY_MAX, 0, range.max);
        }
        match &descriptor.kind {
            ParameterKind::Choice { options } => {
                let options: Vec<&str> = options.iter().map(String::as_str).collect();
                props.set_strings(abi::PARAM_PROP_CHOICE_OPTION, &options);
            }
            ParameterKind::Group { children } => {
                define_parameters(effect, children, Some(&descriptor.name));
            }
            _ => {}
        }
        if let Some(value) = descriptor.default_value() {
            param.set_value(value);
        }
    }
}

fn rect_ints(r: Rect) -> [i32; 4] {
    [r.x1, r.y1, r.x2, r.y2]
}

/// A live native instance
pub struct BinaryInstance {
    plugin_id: String,
    entry: MainEntryFn,
    effect: Box<EffectHandle>,
    // Keeps the binary mapped until after DestroyInstance.
    _bundle: Arc<Bundle>,
    render_lock: Option<Arc<Mutex<()>>>,
}

impl BinaryInstance {
    fn set_project(&self, project: &ProjectGeometry) {
        let props = &self.effect.props;
        props.set_doubles(abi::IMAGE_EFFECT_PROP_PROJECT_SIZE, &[project.width, project.height]);
        let (ox, oy) = project.offset();
        props.set_doubles(abi::IMAGE_EFFECT_PROP_PROJECT_OFFSET, &[ox, oy]);
        let (ex, ey) = project.extent();
        props.set_doubles(abi::IMAGE_EFFECT_PROP_PROJECT_EXTENT, &[ex, ey]);
        props.set_double(abi::IMAGE_EFFECT_PROP_PROJECT_PIXEL_ASPECT_RATIO, 0, project.pixel_aspect);
    }

    fn action(
        &self,
        action: &str,
        in_args: Option<&PropertySet>,
        out_args: Option<&PropertySet>,
    ) -> PluginResult<OfxStatus> {
        // SAFETY: the instance handle stays alive until DestroyInstance.
        unsafe { call_action(self.entry, action, self.effect.handle(), in_args, out_args) }
    }
}

impl EffectInstance for BinaryInstance {
    fn set_parameter(&mut self, name: &str, value: &ParameterValue, _time: f64) -> PluginResult<()> {
        let param = self
            .effect
            .params
            .get(name)
            .ok_or_else(|| PluginError::ParameterError(format!("{} has no parameter {}", self.plugin_id, name)))?;
        param.set_value(value.clone());
        Ok(())
    }

    fn instance_changed(&mut self, name: &str, time: f64) -> PluginResult<()> {
        let begin = PropertySet::new();
        begin.set_string(abi::PROP_CHANGE_REASON, 0, abi::CHANGE_USER_EDITED);
        self.action(abi::ACTION_BEGIN_INSTANCE_CHANGED, Some(&begin), None)?;

        let changed = PropertySet::new();
        changed.set_string(abi::PROP_TYPE, 0, abi::TYPE_PARAMETER);
        changed.set_string(abi::PROP_NAME, 0, name);
        changed.set_string(abi::PROP_CHANGE_REASON, 0, abi::CHANGE_USER_EDITED);
        changed.set_double(abi::PROP_TIME, 0, time);
        changed.set_doubles(abi::IMAGE_EFFECT_PROP_RENDER_SCALE, &[1.0, 1.0]);
        let result = self.action(abi::ACTION_INSTANCE_CHANGED, Some(&changed), None);

        self.action(abi::ACTION_END_INSTANCE_CHANGED, Some(&begin), None)?;
        result.map(|_| ())
    }

    fn region_of_definition(&mut self, args: &RegionArgs) -> PluginResult<Option<Rect>> {
        self.set_project(&args.project);
        let in_args = PropertySet::new();
        in_args.set_double(abi::PROP_TIME, 0, args.time);
        in_args.set_doubles(abi::IMAGE_EFFECT_PROP_RENDER_SCALE, &[1.0, 1.0]);
        let out_args = PropertySet::new();
        out_args.set_doubles(abi::IMAGE_EFFECT_PROP_REGION_OF_DEFINITION, &[0.0; 4]);

        let status = self.action(
            abi::IMAGE_EFFECT_ACTION_GET_REGION_OF_DEFINITION,
            Some(&in_args),
            Some(&out_args),
        )?;
        if status == abi::STAT_REPLY_DEFAULT {
            return Ok(None);
        }
        let r = out_args.get_doubles(abi::IMAGE_EFFECT_PROP_REGION_OF_DEFINITION);
        if r.len() < 4 {
            return Ok(None);
        }
        Ok(Some(Rect::new(
            r[0].floor() as i32,
            r[1].floor() as i32,
            r[2].ceil() as i32,
            r[3].ceil() as i32,
        )))
    }

    fn render(&mut self, args: &RenderArgs<'_>, output: &mut Image) -> PluginResult<()> {
        let _serialised = self.render_lock.as_ref().map(|l| lock(l));
        self.set_project(&args.project);

        let mut connected = 0;
        for name in self.effect.clip_names() {
            let Some(clip) = self.effect.clip(&name) else { continue };
            if name == abi::OUTPUT_CLIP_NAME {
                clip.attach(ClipImage {
                    data: output.data_mut().as_mut_ptr(),
                    bounds: output.bounds(),
                    region_of_definition: output.bounds(),
                    row_bytes: output.row_bytes(),
                    pixel_aspect: output.pixel_aspect(),
                });
                clip.props.set_int(abi::IMAGE_CLIP_PROP_CONNECTED, 0, 1);
            } else if let Some(image) = args.input(&name) {
                clip.attach(ClipImage {
                    // Plugins only read input images.
                    data: image.data().as_ptr() as *mut f32,
                    bounds: image.bounds(),
                    region_of_definition: image.bounds(),
                    row_bytes: image.row_bytes(),
                    pixel_aspect: image.pixel_aspect(),
                });
                clip.props.set_int(abi::IMAGE_CLIP_PROP_CONNECTED, 0, 1);
                connected += 1;
            } else {
                clip.props.set_int(abi::IMAGE_CLIP_PROP_CONNECTED, 0, 0);
            }
        }

        let in_args = PropertySet::new();
        in_args.set_double(abi::PROP_TIME, 0, args.time);
        in_args.set_string(abi::IMAGE_EFFECT_PROP_FIELD_TO_RENDER, 0, abi::IMAGE_FIELD_NONE);
        in_args.set_ints(abi::IMAGE_EFFECT_PROP_RENDER_WINDOW, &rect_ints(args.render_window));
        in_args.set_doubles(
            abi::IMAGE_EFFECT_PROP_RENDER_SCALE,
            &[args.render_scale.0, args.render_scale.1],
        );
        in_args.set_int(abi::IMAGE_EFFECT_PROP_SEQUENTIAL_RENDER_STATUS, 0, 0);
        in_args.set_int(abi::IMAGE_EFFECT_PROP_INTERACTIVE_RENDER_STATUS, 0, 0);

        let result = self.action(abi::IMAGE_EFFECT_ACTION_RENDER, Some(&in_args), None);
        self.effect.detach_images();

        debug!(
            "Rendered {} window {:?} ({} inputs)",
            self.plugin_id,
            args.render_window,
            connected
        );
        result
            .map(|_| ())
            .map_err(|e| PluginError::RenderFailed(format!("{}: {}", self.plugin_id, e)))
    }
}

impl Drop for BinaryInstance {
    fn drop(&mut self) {
        if let Err(e) = self.action(abi::ACTION_DESTROY_INSTANCE, None, None) {
            warn!("Destroying instance of {} failed: {}", self.plugin_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare<'a>(effect: &'a EffectHandle, param_type: &str, name: &str) -> &'a PropertySet {
        &effect.params.define(param_type, name).unwrap().props
    }

    #[test]
    fn test_parameters_nest_under_groups() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        declare(&effect, abi::PARAM_TYPE_GROUP, "channels");
        declare(&effect, abi::PARAM_TYPE_BOOLEAN, "red").set_string(abi::PARAM_PROP_PARENT, 0, "channels");
        declare(&effect, abi::PARAM_TYPE_PAGE, "main");
        let mix = declare(&effect, abi::PARAM_TYPE_DOUBLE, "mix");
        mix.set_double(abi::PARAM_PROP_DEFAULT, 0, 0.5);
        mix.set_double(abi::PARAM_PROP_MIN, 0, 0.0);
        mix.set_double(abi::PARAM_PROP_MAX, 0, 1.0);

        let params = parameters_from(&effect).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].children().len(), 1);
        assert_eq!(params[0].children()[0].name, "red");
        assert_eq!(params[1].default, Some(ParameterValue::Double(0.5)));
        assert_eq!(params[1].range, Some(NumericRange::new(0.0, 1.0)));
        // Native plugins clamp for themselves.
        assert!(!params[1].clamp_to_range);
    }

    #[test]
    fn test_choice_options_and_default() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        let choice = declare(&effect, abi::PARAM_TYPE_CHOICE, "filter");
        choice.set_strings(abi::PARAM_PROP_CHOICE_OPTION, &["Box", "Gaussian"]);
        choice.set_int(abi::PARAM_PROP_DEFAULT, 0, 1);
        declare(&effect, abi::PARAM_TYPE_INTEGER, "size").set_int(abi::PARAM_PROP_ENABLED, 0, 0);

        let params = parameters_from(&effect).unwrap();
        assert_eq!(
            params[0].kind,
            ParameterKind::Choice {
                options: vec!["Box".to_string(), "Gaussian".to_string()]
            }
        );
        assert_eq!(params[0].default, Some(ParameterValue::Choice(1)));
        assert!(params[1].read_only);
    }

    #[test]
    fn test_bad_default_is_malformed() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        declare(&effect, abi::PARAM_TYPE_RGBA, "color").set_doubles(abi::PARAM_PROP_DEFAULT, &[1.0, 0.0]);
        assert!(matches!(
            parameters_from(&effect),
            Err(PluginError::MalformedSchema(_))
        ));
    }

    #[test]
    fn test_clips_read_from_descriptor() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        effect.define_clip("Source");
        effect.define_clip("Mask").props.set_int(abi::IMAGE_CLIP_PROP_OPTIONAL, 0, 1);
        effect.define_clip("Output");

        let clips = clips_from(&effect);
        assert_eq!(clips.len(), 3);
        assert!(clips[0].is_input() && !clips[0].optional);
        assert!(clips[1].optional);
        assert_eq!(clips[2].role, ClipRole::Output);
    }

    #[test]
    fn test_defined_parameters_carry_values() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT_INSTANCE);
        let params = vec![
            ParameterDescriptor::new(
                "channels",
                ParameterKind::Group {
                    children: vec![ParameterDescriptor::new("red", ParameterKind::Boolean)
                        .with_default(ParameterValue::Bool(true))],
                },
            ),
            ParameterDescriptor::new("mix", ParameterKind::Double).with_range(0.0, 1.0),
        ];
        define_parameters(&effect, &params, None);

        let red = effect.params.get("red").unwrap();
        assert_eq!(red.value(), Some(ParameterValue::Bool(true)));
        assert_eq!(red.props.get_string(abi::PARAM_PROP_PARENT, 0).as_deref(), Some("channels"));
        let mix = effect.params.get("mix").unwrap();
        assert_eq!(mix.props.get_double(abi::PARAM_PROP_MAX, 0), Some(1.0));
        assert!(effect.params.get("channels").unwrap().value().is_none());
    }
}
