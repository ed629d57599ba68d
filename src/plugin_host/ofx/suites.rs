//! The host side of the ABI: host descriptor, `fetchSuite` and every suite
//! the host serves except the property suite.
//!
//! Served suites: ImageEffect v1, Parameter v1, Memory v1, MultiThread v1,
//! Message v1/v2, Property v1.
//!
//! Variadic parameter-suite entries are declared with four trailing pointer
//! slots. On targets whose C calling convention passes pointer varargs in
//! the same registers and stack slots as fixed arguments this reads them
//! correctly. Apple's arm64 ABI passes every vararg on the stack, so there
//! value getters report a missing host feature.

use std::cell::Cell;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use lazy_static::lazy_static;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use super::abi::{self, *};
use super::handles::{self, ClipHandle, EffectHandle, ImageMemory, ParamHandle, ParamSet};
use super::property::{PropertySet, PROPERTY_SUITE_V1};
use crate::plugin_host::types::ParameterValue;

/// Name the host reports to plugins
pub const HOST_NAME: &str = "ofx-host";

struct HostRecord(OfxHost);

// SAFETY: the record is immutable after construction and its property set is
// internally synchronised.
unsafe impl Send for HostRecord {}
unsafe impl Sync for HostRecord {}

lazy_static! {
    static ref HOST_PROPERTIES: PropertySet = host_properties();
    static ref HOST: HostRecord = HostRecord(OfxHost {
        host: HOST_PROPERTIES.handle(),
        fetch_suite,
    });
}

fn host_properties() -> PropertySet {
    let props = PropertySet::new();
    props.set_string(PROP_TYPE, 0, TYPE_IMAGE_EFFECT_HOST);
    props.set_ints(PROP_API_VERSION, &[1, 4]);
    props.set_string(PROP_NAME, 0, HOST_NAME);
    props.set_string(PROP_LABEL, 0, "OFX Host");
    props.set_ints(PROP_VERSION, &[
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
    ]);
    props.set_string(PROP_VERSION_LABEL, 0, env!("CARGO_PKG_VERSION"));
    props.set_int(IMAGE_EFFECT_HOST_PROP_IS_BACKGROUND, 0, 0);
    props.set_int(IMAGE_EFFECT_PROP_SUPPORTS_OVERLAYS, 0, 0);
    props.set_int(IMAGE_EFFECT_PROP_SUPPORTS_MULTI_RESOLUTION, 0, 0);
    props.set_int(IMAGE_EFFECT_PROP_SUPPORTS_TILES, 0, 1);
    props.set_int(IMAGE_EFFECT_PROP_TEMPORAL_CLIP_ACCESS, 0, 1);
    props.set_strings(IMAGE_EFFECT_PROP_SUPPORTED_COMPONENTS, &[COMPONENT_RGBA, COMPONENT_ALPHA]);
    props.set_strings(IMAGE_EFFECT_PROP_SUPPORTED_CONTEXTS, &[
        CONTEXT_GENERATOR,
        CONTEXT_FILTER,
        CONTEXT_GENERAL,
        CONTEXT_TRANSITION,
    ]);
    props.set_strings(IMAGE_EFFECT_PROP_SUPPORTED_PIXEL_DEPTHS, &[BIT_DEPTH_FLOAT]);
    props.set_int(IMAGE_EFFECT_PROP_SUPPORTS_MULTIPLE_CLIP_DEPTHS, 0, 0);
    props.set_int(IMAGE_EFFECT_PROP_SUPPORTS_MULTIPLE_CLIP_PARS, 0, 0);
    props.set_int(IMAGE_EFFECT_PROP_SETABLE_FRAME_RATE, 0, 0);
    props.set_int(IMAGE_EFFECT_PROP_SETABLE_FIELDING, 0, 0);
    props.set_int(PARAM_HOST_PROP_SUPPORTS_CUSTOM_INTERACT, 0, 0);
    props.set_int(PARAM_HOST_PROP_SUPPORTS_STRING_ANIMATION, 0, 0);
    props.set_int(PARAM_HOST_PROP_SUPPORTS_CHOICE_ANIMATION, 0, 0);
    props.set_int(PARAM_HOST_PROP_SUPPORTS_BOOLEAN_ANIMATION, 0, 0);
    props.set_int(PARAM_HOST_PROP_SUPPORTS_CUSTOM_ANIMATION, 0, 0);
    props.set_int(PARAM_HOST_PROP_MAX_PARAMETERS, 0, -1);
    props.set_int(PARAM_HOST_PROP_MAX_PAGES, 0, 0);
    props.set_ints(PARAM_HOST_PROP_PAGE_ROW_COLUMN_COUNT, &[0, 0]);
    props
}

/// The host descriptor passed to `setHost`
pub fn host() -> *mut OfxHost {
    &HOST.0 as *const OfxHost as *mut OfxHost
}

/// Host properties as seen by plugins
pub fn host_property_set() -> &'static PropertySet {
    &HOST_PROPERTIES
}

unsafe extern "C" fn fetch_suite(
    _host: OfxPropertySetHandle,
    name: *const c_char,
    version: c_int,
) -> *const c_void {
    if name.is_null() {
        return std::ptr::null();
    }
    let name = CStr::from_ptr(name).to_string_lossy();
    let suite: *const c_void = match (name.as_ref(), version) {
        (abi::PROPERTY_SUITE, 1) => &PROPERTY_SUITE_V1 as *const _ as *const c_void,
        (abi::IMAGE_EFFECT_SUITE, 1) => &IMAGE_EFFECT_SUITE_V1 as *const _ as *const c_void,
        (abi::PARAMETER_SUITE, 1) => &PARAMETER_SUITE_V1 as *const _ as *const c_void,
        (abi::MEMORY_SUITE, 1) => &MEMORY_SUITE_V1 as *const _ as *const c_void,
        (abi::MULTI_THREAD_SUITE, 1) => &MULTI_THREAD_SUITE_V1 as *const _ as *const c_void,
        (abi::MESSAGE_SUITE, 1) => &MESSAGE_SUITE_V1 as *const _ as *const c_void,
        (abi::MESSAGE_SUITE, 2) => &MESSAGE_SUITE_V2 as *const _ as *const c_void,
        _ => {
            debug!("Plugin requested unsupported suite {} v{}", name, version);
            std::ptr::null()
        }
    };
    suite
}

fn status(result: Result<(), OfxStatus>) -> OfxStatus {
    match result {
        Ok(()) => STAT_OK,
        Err(status) => status,
    }
}

unsafe fn c_str<'a>(s: *const c_char) -> Result<&'a str, OfxStatus> {
    if s.is_null() {
        return Err(STAT_ERR_VALUE);
    }
    CStr::from_ptr(s).to_str().map_err(|_| STAT_ERR_VALUE)
}

unsafe fn write<T>(out: *mut T, value: T) -> Result<(), OfxStatus> {
    if out.is_null() {
        return Err(STAT_ERR_VALUE);
    }
    *out = value;
    Ok(())
}

// ---------------------------------------------------------------------------
// Image effect suite

unsafe extern "C" fn get_property_set(
    effect: OfxImageEffectHandle,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let effect = EffectHandle::from_handle(effect).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, effect.props.handle())
    })())
}

unsafe extern "C" fn get_param_set(
    effect: OfxImageEffectHandle,
    out: *mut OfxParamSetHandle,
) -> OfxStatus {
    status((|| {
        let effect = EffectHandle::from_handle(effect).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, effect.params.handle())
    })())
}

unsafe extern "C" fn clip_define(
    effect: OfxImageEffectHandle,
    name: *const c_char,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let effect = EffectHandle::from_handle(effect).ok_or(STAT_ERR_BAD_HANDLE)?;
        let clip = effect.define_clip(c_str(name)?);
        if !out.is_null() {
            *out = clip.props.handle();
        }
        Ok(())
    })())
}

unsafe extern "C" fn clip_get_handle(
    effect: OfxImageEffectHandle,
    name: *const c_char,
    clip_out: *mut OfxImageClipHandle,
    props_out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let effect = EffectHandle::from_handle(effect).ok_or(STAT_ERR_BAD_HANDLE)?;
        let clip = effect.clip(c_str(name)?).ok_or(STAT_ERR_BAD_INDEX)?;
        write(clip_out, clip.handle())?;
        if !props_out.is_null() {
            *props_out = clip.props.handle();
        }
        Ok(())
    })())
}

unsafe extern "C" fn clip_get_property_set(
    clip: OfxImageClipHandle,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let clip = ClipHandle::from_handle(clip).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, clip.props.handle())
    })())
}

unsafe extern "C" fn clip_get_image(
    clip: OfxImageClipHandle,
    time: OfxTime,
    _region: *const OfxRectD,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let clip = ClipHandle::from_handle(clip).ok_or(STAT_ERR_BAD_HANDLE)?;
        if out.is_null() {
            return Err(STAT_ERR_VALUE);
        }
        // Unconnected clips and clips outside an action have no image.
        let image = clip.image().ok_or(STAT_FAILED)?;

        let props = PropertySet::new();
        props.set_string(PROP_TYPE, 0, TYPE_IMAGE);
        props.set_pointer(IMAGE_PROP_DATA, 0, image.data as *mut c_void);
        let b = image.bounds;
        props.set_ints(IMAGE_PROP_BOUNDS, &[b.x1, b.y1, b.x2, b.y2]);
        let r = image.region_of_definition;
        props.set_ints(IMAGE_PROP_REGION_OF_DEFINITION, &[r.x1, r.y1, r.x2, r.y2]);
        props.set_int(IMAGE_PROP_ROW_BYTES, 0, image.row_bytes);
        props.set_double(IMAGE_EFFECT_PROP_PIXEL_ASPECT_RATIO, 0, image.pixel_aspect);
        props.set_string(IMAGE_EFFECT_PROP_COMPONENTS, 0, COMPONENT_RGBA);
        props.set_string(IMAGE_EFFECT_PROP_PIXEL_DEPTH, 0, BIT_DEPTH_FLOAT);
        props.set_string(IMAGE_EFFECT_PROP_PRE_MULTIPLICATION, 0, IMAGE_PREMULTIPLIED);
        props.set_string(IMAGE_PROP_FIELD, 0, IMAGE_FIELD_NONE);
        props.set_doubles(IMAGE_EFFECT_PROP_RENDER_SCALE, &[1.0, 1.0]);
        props.set_string(IMAGE_PROP_UNIQUE_IDENTIFIER, 0, &format!("{}@{}", clip.name, time));

        *out = handles::publish_image(props);
        Ok(())
    })())
}

unsafe extern "C" fn clip_release_image(image: OfxPropertySetHandle) -> OfxStatus {
    if handles::release_image(image) {
        STAT_OK
    } else {
        STAT_ERR_BAD_HANDLE
    }
}

unsafe extern "C" fn clip_get_region_of_definition(
    clip: OfxImageClipHandle,
    _time: OfxTime,
    out: *mut OfxRectD,
) -> OfxStatus {
    status((|| {
        let clip = ClipHandle::from_handle(clip).ok_or(STAT_ERR_BAD_HANDLE)?;
        let r = clip.image().map(|i| i.region_of_definition).unwrap_or_default();
        write(
            out,
            OfxRectD {
                x1: f64::from(r.x1),
                y1: f64::from(r.y1),
                x2: f64::from(r.x2),
                y2: f64::from(r.y2),
            },
        )
    })())
}

unsafe extern "C" fn abort(_effect: OfxImageEffectHandle) -> c_int {
    0
}

unsafe extern "C" fn image_memory_alloc(
    _effect: OfxImageEffectHandle,
    size: usize,
    out: *mut OfxImageMemoryHandle,
) -> OfxStatus {
    status((|| {
        let memory = ImageMemory::allocate(size).ok_or(STAT_ERR_MEMORY)?;
        write(out, Box::into_raw(memory) as OfxImageMemoryHandle)
    })())
}

unsafe extern "C" fn image_memory_free(memory: OfxImageMemoryHandle) -> OfxStatus {
    if ImageMemory::from_handle(memory).is_none() {
        return STAT_ERR_BAD_HANDLE;
    }
    drop(Box::from_raw(memory as *mut ImageMemory));
    STAT_OK
}

unsafe extern "C" fn image_memory_lock(
    memory: OfxImageMemoryHandle,
    out: *mut *mut c_void,
) -> OfxStatus {
    status((|| {
        let memory = ImageMemory::from_handle(memory).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, memory.data)
    })())
}

unsafe extern "C" fn image_memory_unlock(memory: OfxImageMemoryHandle) -> OfxStatus {
    match ImageMemory::from_handle(memory) {
        Some(_) => STAT_OK,
        None => STAT_ERR_BAD_HANDLE,
    }
}

pub static IMAGE_EFFECT_SUITE_V1: OfxImageEffectSuiteV1 = OfxImageEffectSuiteV1 {
    get_property_set,
    get_param_set,
    clip_define,
    clip_get_handle,
    clip_get_property_set,
    clip_get_image,
    clip_release_image,
    clip_get_region_of_definition,
    abort,
    image_memory_alloc,
    image_memory_free,
    image_memory_lock,
    image_memory_unlock,
};

// ---------------------------------------------------------------------------
// Parameter suite

unsafe extern "C" fn param_define(
    set: OfxParamSetHandle,
    param_type: *const c_char,
    name: *const c_char,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let set = ParamSet::from_handle(set).ok_or(STAT_ERR_BAD_HANDLE)?;
        let param = set
            .define(c_str(param_type)?, c_str(name)?)
            .ok_or(STAT_ERR_EXISTS)?;
        if !out.is_null() {
            *out = param.props.handle();
        }
        Ok(())
    })())
}

unsafe extern "C" fn param_get_handle(
    set: OfxParamSetHandle,
    name: *const c_char,
    param_out: *mut OfxParamHandle,
    props_out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let set = ParamSet::from_handle(set).ok_or(STAT_ERR_BAD_HANDLE)?;
        let param = set.get(c_str(name)?).ok_or(STAT_ERR_UNKNOWN)?;
        write(param_out, param.handle())?;
        if !props_out.is_null() {
            *props_out = param.props.handle();
        }
        Ok(())
    })())
}

unsafe extern "C" fn param_set_get_property_set(
    set: OfxParamSetHandle,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let set = ParamSet::from_handle(set).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, set.props.handle())
    })())
}

unsafe extern "C" fn param_get_property_set(
    param: OfxParamHandle,
    out: *mut OfxPropertySetHandle,
) -> OfxStatus {
    status((|| {
        let param = ParamHandle::from_handle(param).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, param.props.handle())
    })())
}

/// Write a parameter's value through the caller's out-pointers
unsafe fn write_value(param: &ParamHandle, out: [VarArg; 4]) -> Result<(), OfxStatus> {
    if cfg!(all(target_vendor = "apple", target_arch = "aarch64")) {
        return Err(STAT_ERR_MISSING_HOST_FEATURE);
    }
    let state = param.state();
    let value = state.value.as_ref().ok_or(STAT_ERR_UNKNOWN)?;
    let need = match value {
        ParameterValue::Bool(_) | ParameterValue::Int(_) | ParameterValue::Choice(_) => 1,
        ParameterValue::Double(_) | ParameterValue::String(_) => 1,
        ParameterValue::Int2(_) | ParameterValue::Double2(_) => 2,
        ParameterValue::Int3(_) | ParameterValue::Double3(_) | ParameterValue::Rgb(_) => 3,
        ParameterValue::Rgba(_) => 4,
    };
    if out[..need].iter().any(|p| p.is_null()) {
        return Err(STAT_ERR_VALUE);
    }

    let ints = |values: &[i32]| {
        for (p, v) in out.iter().zip(values) {
            *(*p as *mut c_int) = *v;
        }
    };
    let doubles = |values: &[f64]| {
        for (p, v) in out.iter().zip(values) {
            *(*p as *mut f64) = *v;
        }
    };
    match value {
        ParameterValue::Bool(b) => ints(&[i32::from(*b)]),
        ParameterValue::Int(i) | ParameterValue::Choice(i) => ints(&[*i]),
        ParameterValue::Int2(v) => ints(v),
        ParameterValue::Int3(v) => ints(v),
        ParameterValue::Double(d) => doubles(&[*d]),
        ParameterValue::Double2(v) => doubles(v),
        ParameterValue::Double3(v) | ParameterValue::Rgb(v) => doubles(v),
        ParameterValue::Rgba(v) => doubles(v),
        ParameterValue::String(_) => *(out[0] as *mut *const c_char) = state.text.as_ptr(),
    }
    Ok(())
}

unsafe extern "C" fn param_get_value(
    param: OfxParamHandle,
    a: VarArg,
    b: VarArg,
    c: VarArg,
    d: VarArg,
) -> OfxStatus {
    status((|| {
        let param = ParamHandle::from_handle(param).ok_or(STAT_ERR_BAD_HANDLE)?;
        write_value(param, [a, b, c, d])
    })())
}

unsafe extern "C" fn param_get_value_at_time(
    param: OfxParamHandle,
    _time: OfxTime,
    a: VarArg,
    b: VarArg,
    c: VarArg,
    d: VarArg,
) -> OfxStatus {
    // Parameters do not animate; every time has the current value.
    param_get_value(param, a, b, c, d)
}

unsafe extern "C" fn param_get_derivative(
    param: OfxParamHandle,
    _time: OfxTime,
    a: VarArg,
    b: VarArg,
    c: VarArg,
    d: VarArg,
) -> OfxStatus {
    status((|| {
        let param = ParamHandle::from_handle(param).ok_or(STAT_ERR_BAD_HANDLE)?;
        if cfg!(all(target_vendor = "apple", target_arch = "aarch64")) {
            return Err(STAT_ERR_MISSING_HOST_FEATURE);
        }
        let n = match param.value() {
            Some(ParameterValue::Double(_)) => 1,
            Some(ParameterValue::Double2(_)) => 2,
            Some(ParameterValue::Double3(_)) | Some(ParameterValue::Rgb(_)) => 3,
            Some(ParameterValue::Rgba(_)) => 4,
            _ => return Err(STAT_ERR_UNSUPPORTED),
        };
        for p in [a, b, c, d].iter().take(n) {
            write(*p as *mut f64, 0.0)?;
        }
        Ok(())
    })())
}

unsafe extern "C" fn param_get_integral(
    param: OfxParamHandle,
    time1: OfxTime,
    time2: OfxTime,
    a: VarArg,
    b: VarArg,
    c: VarArg,
    d: VarArg,
) -> OfxStatus {
    status((|| {
        let param = ParamHandle::from_handle(param).ok_or(STAT_ERR_BAD_HANDLE)?;
        if cfg!(all(target_vendor = "apple", target_arch = "aarch64")) {
            return Err(STAT_ERR_MISSING_HOST_FEATURE);
        }
        let values: Vec<f64> = match param.value() {
            Some(ParameterValue::Double(v)) => vec![v],
            Some(ParameterValue::Double2(v)) => v.to_vec(),
            Some(ParameterValue::Double3(v)) | Some(ParameterValue::Rgb(v)) => v.to_vec(),
            Some(ParameterValue::Rgba(v)) => v.to_vec(),
            _ => return Err(STAT_ERR_UNSUPPORTED),
        };
        let span = time2 - time1;
        for (p, v) in [a, b, c, d].iter().zip(values) {
            write(*p as *mut f64, v * span)?;
        }
        Ok(())
    })())
}

unsafe extern "C" fn param_set_value(param: OfxParamHandle, _value: VarArg) -> OfxStatus {
    match ParamHandle::from_handle(param) {
        Some(param) => {
            debug!("Plugin tried to set parameter {}; plugin-side edits are not supported", param.name);
            STAT_ERR_MISSING_HOST_FEATURE
        }
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn param_set_value_at_time(
    param: OfxParamHandle,
    _time: OfxTime,
    value: VarArg,
) -> OfxStatus {
    param_set_value(param, value)
}

unsafe extern "C" fn param_get_num_keys(param: OfxParamHandle, out: *mut c_uint) -> OfxStatus {
    status((|| {
        ParamHandle::from_handle(param).ok_or(STAT_ERR_BAD_HANDLE)?;
        write(out, 0)
    })())
}

unsafe extern "C" fn param_get_key_time(
    param: OfxParamHandle,
    _nth: c_uint,
    _out: *mut OfxTime,
) -> OfxStatus {
    match ParamHandle::from_handle(param) {
        Some(_) => STAT_ERR_BAD_INDEX,
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn param_get_key_index(
    param: OfxParamHandle,
    _time: OfxTime,
    _direction: c_int,
    _out: *mut c_int,
) -> OfxStatus {
    match ParamHandle::from_handle(param) {
        Some(_) => STAT_FAILED,
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn param_delete_key(param: OfxParamHandle, _time: OfxTime) -> OfxStatus {
    match ParamHandle::from_handle(param) {
        Some(_) => STAT_ERR_BAD_INDEX,
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn param_delete_all_keys(param: OfxParamHandle) -> OfxStatus {
    match ParamHandle::from_handle(param) {
        Some(_) => STAT_OK,
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn param_copy(
    to: OfxParamHandle,
    from: OfxParamHandle,
    _offset: OfxTime,
    _range: *const OfxRangeD,
) -> OfxStatus {
    status((|| {
        let to = ParamHandle::from_handle(to).ok_or(STAT_ERR_BAD_HANDLE)?;
        let from = ParamHandle::from_handle(from).ok_or(STAT_ERR_BAD_HANDLE)?;
        if to.param_type != from.param_type {
            return Err(STAT_ERR_VALUE);
        }
        if let Some(value) = from.value() {
            to.set_value(value);
        }
        Ok(())
    })())
}

unsafe extern "C" fn param_edit_begin(set: OfxParamSetHandle, _name: *const c_char) -> OfxStatus {
    match ParamSet::from_handle(set) {
        Some(_) => STAT_OK,
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn param_edit_end(set: OfxParamSetHandle) -> OfxStatus {
    match ParamSet::from_handle(set) {
        Some(_) => STAT_OK,
        None => STAT_ERR_BAD_HANDLE,
    }
}

pub static PARAMETER_SUITE_V1: OfxParameterSuiteV1 = OfxParameterSuiteV1 {
    param_define,
    param_get_handle,
    param_set_get_property_set,
    param_get_property_set,
    param_get_value,
    param_get_value_at_time,
    param_get_derivative,
    param_get_integral,
    param_set_value,
    param_set_value_at_time,
    param_get_num_keys,
    param_get_key_time,
    param_get_key_index,
    param_delete_key,
    param_delete_all_keys,
    param_copy,
    param_edit_begin,
    param_edit_end,
};

// ---------------------------------------------------------------------------
// Memory suite

unsafe extern "C" fn memory_alloc(
    _handle: *mut c_void,
    size: usize,
    out: *mut *mut c_void,
) -> OfxStatus {
    if out.is_null() {
        return STAT_ERR_VALUE;
    }
    let data = libc::malloc(size.max(1));
    if data.is_null() {
        return STAT_ERR_MEMORY;
    }
    *out = data;
    STAT_OK
}

unsafe extern "C" fn memory_free(data: *mut c_void) -> OfxStatus {
    libc::free(data);
    STAT_OK
}

pub static MEMORY_SUITE_V1: OfxMemorySuiteV1 = OfxMemorySuiteV1 {
    memory_alloc,
    memory_free,
};

// ---------------------------------------------------------------------------
// Multi-thread suite

thread_local! {
    static THREAD_INDEX: Cell<Option<c_uint>> = const { Cell::new(None) };
}

struct SendPtr(*mut c_void);

// SAFETY: the plugin hands the same argument to every worker and is
// responsible for synchronising access to it.
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

unsafe extern "C" fn multi_thread(
    func: Option<OfxThreadFunctionV1>,
    count: c_uint,
    arg: *mut c_void,
) -> OfxStatus {
    let Some(func) = func else {
        return STAT_ERR_VALUE;
    };
    let count = if count == 0 { num_cpus() } else { count };
    let arg = SendPtr(arg);
    (0..count).into_par_iter().for_each(|index| {
        let previous = THREAD_INDEX.with(|i| i.replace(Some(index)));
        let arg = &arg;
        func(index, count, arg.0);
        THREAD_INDEX.with(|i| i.set(previous));
    });
    STAT_OK
}

fn num_cpus() -> c_uint {
    rayon::current_num_threads().max(1) as c_uint
}

unsafe extern "C" fn multi_thread_num_cpus(out: *mut c_uint) -> OfxStatus {
    status(write(out, num_cpus()))
}

unsafe extern "C" fn multi_thread_index(out: *mut c_uint) -> OfxStatus {
    let index = THREAD_INDEX.with(|i| i.get()).unwrap_or(0);
    status(write(out, index))
}

unsafe extern "C" fn multi_thread_is_spawned_thread() -> c_int {
    THREAD_INDEX.with(|i| i.get()).is_some() as c_int
}

/// Recursive mutex served to plugins
#[derive(Default)]
struct PluginMutex {
    state: Mutex<(Option<ThreadId>, usize)>,
    released: Condvar,
}

impl PluginMutex {
    fn lock(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while matches!(state.0, Some(owner) if owner != me) {
            state = self.released.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.0 = Some(me);
        state.1 += 1;
    }

    fn try_lock(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.0 {
            Some(owner) if owner != me => false,
            _ => {
                state.0 = Some(me);
                state.1 += 1;
                true
            }
        }
    }

    fn unlock(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.0 != Some(me) {
            return false;
        }
        state.1 -= 1;
        if state.1 == 0 {
            state.0 = None;
            self.released.notify_one();
        }
        true
    }
}

unsafe fn plugin_mutex<'a>(handle: OfxMutexHandle) -> Option<&'a PluginMutex> {
    (handle as *const PluginMutex).as_ref()
}

unsafe extern "C" fn mutex_create(out: *mut OfxMutexHandle, lock_count: c_int) -> OfxStatus {
    if out.is_null() {
        return STAT_ERR_VALUE;
    }
    let mutex = Box::new(PluginMutex::default());
    for _ in 0..lock_count.max(0) {
        mutex.lock();
    }
    *out = Box::into_raw(mutex) as OfxMutexHandle;
    STAT_OK
}

unsafe extern "C" fn mutex_destroy(handle: OfxMutexHandle) -> OfxStatus {
    if handle.is_null() {
        return STAT_ERR_BAD_HANDLE;
    }
    drop(Box::from_raw(handle as *mut PluginMutex));
    STAT_OK
}

unsafe extern "C" fn mutex_lock(handle: OfxMutexHandle) -> OfxStatus {
    match plugin_mutex(handle) {
        Some(mutex) => {
            mutex.lock();
            STAT_OK
        }
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn mutex_unlock(handle: OfxMutexHandle) -> OfxStatus {
    match plugin_mutex(handle) {
        Some(mutex) if mutex.unlock() => STAT_OK,
        Some(_) => STAT_ERR_UNKNOWN,
        None => STAT_ERR_BAD_HANDLE,
    }
}

unsafe extern "C" fn mutex_try_lock(handle: OfxMutexHandle) -> OfxStatus {
    match plugin_mutex(handle) {
        Some(mutex) if mutex.try_lock() => STAT_OK,
        Some(_) => STAT_FAILED,
        None => STAT_ERR_BAD_HANDLE,
    }
}

pub static MULTI_THREAD_SUITE_V1: OfxMultiThreadSuiteV1 = OfxMultiThreadSuiteV1 {
    multi_thread,
    multi_thread_num_cpus,
    multi_thread_index,
    multi_thread_is_spawned_thread,
    mutex_create,
    mutex_destroy,
    mutex_lock,
    mutex_unlock,
    mutex_try_lock,
};

// ---------------------------------------------------------------------------
// Message suite

// Format arguments are not expanded; the raw format string is logged.
unsafe extern "C" fn message(
    _handle: *mut c_void,
    message_type: *const c_char,
    message_id: *const c_char,
    format: *const c_char,
) -> OfxStatus {
    let message_type = c_str(message_type).unwrap_or(MESSAGE_MESSAGE);
    let id = c_str(message_id).unwrap_or("");
    let text = c_str(format).unwrap_or("");
    match message_type {
        MESSAGE_FATAL | MESSAGE_ERROR => error!(id, "Plugin: {}", text),
        MESSAGE_WARNING => warn!(id, "Plugin: {}", text),
        MESSAGE_LOG => debug!(id, "Plugin: {}", text),
        MESSAGE_QUESTION => {
            info!(id, "Plugin asked: {}", text);
            return STAT_REPLY_YES;
        }
        _ => info!(id, "Plugin: {}", text),
    }
    STAT_OK
}

unsafe extern "C" fn clear_persistent_message(_handle: *mut c_void) -> OfxStatus {
    STAT_OK
}

pub static MESSAGE_SUITE_V1: OfxMessageSuiteV1 = OfxMessageSuiteV1 { message };

pub static MESSAGE_SUITE_V2: OfxMessageSuiteV2 = OfxMessageSuiteV2 {
    message,
    set_persistent_message: message,
    clear_persistent_message,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_host::types::Rect;
    use handles::ClipImage;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fetch<T>(name: &str, version: c_int) -> *const T {
        let name = CString::new(name).unwrap();
        unsafe { (HOST.0.fetch_suite)(HOST.0.host, name.as_ptr(), version) as *const T }
    }

    #[test]
    fn test_fetch_known_and_unknown_suites() {
        assert!(!fetch::<OfxPropertySuiteV1>(abi::PROPERTY_SUITE, 1).is_null());
        assert!(!fetch::<OfxImageEffectSuiteV1>(abi::IMAGE_EFFECT_SUITE, 1).is_null());
        assert!(!fetch::<OfxMessageSuiteV2>(abi::MESSAGE_SUITE, 2).is_null());
        assert!(fetch::<c_void>(abi::PARAMETER_SUITE, 9).is_null());
        assert!(fetch::<c_void>("OfxInteractSuite", 1).is_null());
    }

    #[test]
    fn test_host_properties() {
        let props = host_property_set();
        assert_eq!(props.get_string(PROP_NAME, 0).as_deref(), Some(HOST_NAME));
        assert_eq!(props.get_int(PARAM_HOST_PROP_MAX_PARAMETERS, 0), Some(-1));
        assert_eq!(props.dimension(IMAGE_EFFECT_PROP_SUPPORTED_CONTEXTS), 4);
    }

    #[test]
    fn test_clip_image_round_trip() {
        let effect = EffectHandle::new(TYPE_IMAGE_EFFECT_INSTANCE);
        let clip = effect.define_clip("Source");
        let suite = &IMAGE_EFFECT_SUITE_V1;

        let mut out: OfxPropertySetHandle = std::ptr::null_mut();
        unsafe {
            assert_eq!(
                (suite.clip_get_image)(clip.handle(), 0.0, std::ptr::null(), &mut out),
                STAT_FAILED
            );

            let mut pixels = vec![0.5f32; 4 * 4];
            clip.attach(ClipImage {
                data: pixels.as_mut_ptr(),
                bounds: Rect::new(0, 0, 2, 2),
                region_of_definition: Rect::new(0, 0, 2, 2),
                row_bytes: 32,
                pixel_aspect: 1.0,
            });
            assert_eq!(
                (suite.clip_get_image)(clip.handle(), 0.0, std::ptr::null(), &mut out),
                STAT_OK
            );
            let props = PropertySet::from_handle(out).unwrap();
            assert_eq!(props.get_int(IMAGE_PROP_ROW_BYTES, 0), Some(32));
            assert_eq!(props.get_pointer(IMAGE_PROP_DATA, 0), Some(pixels.as_mut_ptr() as *mut c_void));

            assert_eq!((suite.clip_release_image)(out), STAT_OK);
            assert_eq!((suite.clip_release_image)(out), STAT_ERR_BAD_HANDLE);
            clip.detach();
        }
    }

    #[cfg(not(all(target_vendor = "apple", target_arch = "aarch64")))]
    #[test]
    fn test_param_get_value_writes_components() {
        let effect = EffectHandle::new(TYPE_IMAGE_EFFECT_INSTANCE);
        let param = effect.params.define(PARAM_TYPE_RGBA, "color").unwrap();
        param.set_value(ParameterValue::Rgba([0.1, 0.2, 0.3, 0.4]));

        let mut rgba = [0.0f64; 4];
        let p = rgba.as_mut_ptr();
        let status = unsafe {
            (PARAMETER_SUITE_V1.param_get_value)(
                param.handle(),
                p as VarArg,
                p.add(1) as VarArg,
                p.add(2) as VarArg,
                p.add(3) as VarArg,
            )
        };
        assert_eq!(status, STAT_OK);
        assert_eq!(rgba, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_param_set_value_is_refused() {
        let effect = EffectHandle::new(TYPE_IMAGE_EFFECT_INSTANCE);
        let param = effect.params.define(PARAM_TYPE_DOUBLE, "mix").unwrap();
        let status = unsafe { (PARAMETER_SUITE_V1.param_set_value)(param.handle(), std::ptr::null_mut()) };
        assert_eq!(status, STAT_ERR_MISSING_HOST_FEATURE);
    }

    static CALLS: AtomicU32 = AtomicU32::new(0);

    unsafe extern "C" fn count_call(index: c_uint, max: c_uint, _arg: *mut c_void) {
        assert!(index < max);
        let mut reported = 99;
        multi_thread_index(&mut reported);
        assert_eq!(reported, index);
        assert_eq!(multi_thread_is_spawned_thread(), 1);
        CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_multi_thread_runs_every_index() {
        let status = unsafe { multi_thread(Some(count_call), 8, std::ptr::null_mut()) };
        assert_eq!(status, STAT_OK);
        assert_eq!(CALLS.load(Ordering::SeqCst), 8);
        assert_eq!(unsafe { multi_thread_is_spawned_thread() }, 0);
    }

    #[test]
    fn test_recursive_mutex() {
        let suite = &MULTI_THREAD_SUITE_V1;
        let mut handle: OfxMutexHandle = std::ptr::null_mut();
        unsafe {
            assert_eq!((suite.mutex_create)(&mut handle, 1), STAT_OK);
            // Already held once by this thread; locking again nests.
            assert_eq!((suite.mutex_try_lock)(handle), STAT_OK);
            assert_eq!((suite.mutex_unlock)(handle), STAT_OK);
            assert_eq!((suite.mutex_unlock)(handle), STAT_OK);
            assert_eq!((suite.mutex_unlock)(handle), STAT_ERR_UNKNOWN);
            assert_eq!((suite.mutex_destroy)(handle), STAT_OK);
        }
    }
}
