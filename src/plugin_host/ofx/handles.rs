//! Host-side objects behind the opaque handles given to native plugins
//!
//! Each handle type starts with a tag word so a handle of the wrong kind is
//! reported as `kOfxStatErrBadHandle` rather than misread. Child objects are
//! boxed and only ever appended, so their addresses stay valid for the
//! lifetime of the owning effect.

use std::collections::HashSet;
use std::ffi::{c_void, CString};
use std::sync::{Mutex, MutexGuard};

use lazy_static::lazy_static;

use super::abi;
use super::property::PropertySet;
use crate::plugin_host::types::{ParameterValue, Rect};

const EFFECT_TAG: u32 = 0x4546_4654; // "EFFT"
const CLIP_TAG: u32 = 0x434c_4950; // "CLIP"
const PARAM_SET_TAG: u32 = 0x5053_4554; // "PSET"
const PARAM_TAG: u32 = 0x5041_524d; // "PARM"
const MEMORY_TAG: u32 = 0x4d45_4d4f; // "MEMO"

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// An effect descriptor or instance
#[repr(C)]
pub struct EffectHandle {
    tag: u32,
    pub props: PropertySet,
    pub params: ParamSet,
    clips: Mutex<Vec<Box<ClipHandle>>>,
}

impl EffectHandle {
    /// A new effect of the given `OfxPropType`
    pub fn new(effect_type: &str) -> Box<Self> {
        let effect = Box::new(Self {
            tag: EFFECT_TAG,
            props: PropertySet::new(),
            params: ParamSet::new(),
            clips: Mutex::new(Vec::new()),
        });
        effect.props.set_string(abi::PROP_TYPE, 0, effect_type);
        effect
    }

    pub fn handle(&self) -> *mut c_void {
        self as *const EffectHandle as *mut c_void
    }

    /// # Safety
    /// `handle` must be null or point to a live object created by this host.
    pub unsafe fn from_handle<'a>(handle: *mut c_void) -> Option<&'a EffectHandle> {
        let effect = (handle as *const EffectHandle).as_ref()?;
        (effect.tag == EFFECT_TAG).then_some(effect)
    }

    /// Get or create a clip
    pub fn define_clip(&self, name: &str) -> &ClipHandle {
        let mut clips = lock(&self.clips);
        let index = match clips.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                clips.push(ClipHandle::new(name));
                clips.len() - 1
            }
        };
        let clip: *const ClipHandle = &*clips[index];
        // SAFETY: clips are boxed and never removed while the effect lives.
        unsafe { &*clip }
    }

    pub fn clip(&self, name: &str) -> Option<&ClipHandle> {
        let clips = lock(&self.clips);
        let clip: *const ClipHandle = &**clips.iter().find(|c| c.name == name)?;
        // SAFETY: as in `define_clip`.
        Some(unsafe { &*clip })
    }

    /// Clip names in definition order
    pub fn clip_names(&self) -> Vec<String> {
        lock(&self.clips).iter().map(|c| c.name.clone()).collect()
    }

    /// Detach every clip's image
    pub fn detach_images(&self) {
        for clip in lock(&self.clips).iter() {
            clip.detach();
        }
    }
}

/// Pixels of a host image made visible to a plugin for one action
#[derive(Clone, Copy, Debug)]
pub struct ClipImage {
    pub data: *mut f32,
    pub bounds: Rect,
    pub region_of_definition: Rect,
    pub row_bytes: i32,
    pub pixel_aspect: f64,
}

// SAFETY: a ClipImage is only attached while the image it points into is
// borrowed by the action in progress.
unsafe impl Send for ClipImage {}

/// A clip of an effect
#[repr(C)]
pub struct ClipHandle {
    tag: u32,
    pub name: String,
    pub props: PropertySet,
    image: Mutex<Option<ClipImage>>,
}

impl ClipHandle {
    fn new(name: &str) -> Box<Self> {
        let clip = Box::new(Self {
            tag: CLIP_TAG,
            name: name.to_string(),
            props: PropertySet::new(),
            image: Mutex::new(None),
        });
        clip.props.set_string(abi::PROP_TYPE, 0, abi::TYPE_CLIP);
        clip.props.set_string(abi::PROP_NAME, 0, name);
        clip
    }

    pub fn handle(&self) -> *mut c_void {
        self as *const ClipHandle as *mut c_void
    }

    /// # Safety
    /// See [`EffectHandle::from_handle`].
    pub unsafe fn from_handle<'a>(handle: *mut c_void) -> Option<&'a ClipHandle> {
        let clip = (handle as *const ClipHandle).as_ref()?;
        (clip.tag == CLIP_TAG).then_some(clip)
    }

    pub fn attach(&self, image: ClipImage) {
        *lock(&self.image) = Some(image);
    }

    pub fn detach(&self) {
        *lock(&self.image) = None;
    }

    pub fn image(&self) -> Option<ClipImage> {
        *lock(&self.image)
    }
}

/// Value storage of a parameter
#[derive(Debug, Default)]
pub struct ParamState {
    pub value: Option<ParameterValue>,
    /// NUL-terminated copy of a string value, handed out by `paramGetValue`
    pub text: CString,
}

/// A parameter of an effect
#[repr(C)]
pub struct ParamHandle {
    tag: u32,
    pub name: String,
    pub param_type: String,
    pub props: PropertySet,
    state: Mutex<ParamState>,
}

impl ParamHandle {
    fn new(param_type: &str, name: &str) -> Box<Self> {
        let param = Box::new(Self {
            tag: PARAM_TAG,
            name: name.to_string(),
            param_type: param_type.to_string(),
            props: PropertySet::new(),
            state: Mutex::new(ParamState::default()),
        });
        param.props.set_string(abi::PROP_TYPE, 0, abi::TYPE_PARAMETER);
        param.props.set_string(abi::PROP_NAME, 0, name);
        param.props.set_string(abi::PARAM_PROP_TYPE, 0, param_type);
        param.props.set_string(abi::PARAM_PROP_SCRIPT_NAME, 0, name);
        param
    }

    pub fn handle(&self) -> *mut c_void {
        self as *const ParamHandle as *mut c_void
    }

    /// # Safety
    /// See [`EffectHandle::from_handle`].
    pub unsafe fn from_handle<'a>(handle: *mut c_void) -> Option<&'a ParamHandle> {
        let param = (handle as *const ParamHandle).as_ref()?;
        (param.tag == PARAM_TAG).then_some(param)
    }

    pub fn set_value(&self, value: ParameterValue) {
        let mut state = lock(&self.state);
        if let ParameterValue::String(s) = &value {
            let bytes = s.split('\0').next().unwrap_or_default();
            state.text = CString::new(bytes).unwrap_or_default();
        }
        state.value = Some(value);
    }

    pub fn value(&self) -> Option<ParameterValue> {
        lock(&self.state).value.clone()
    }

    pub fn state(&self) -> MutexGuard<'_, ParamState> {
        lock(&self.state)
    }
}

/// The parameter set of an effect
#[repr(C)]
pub struct ParamSet {
    tag: u32,
    pub props: PropertySet,
    params: Mutex<Vec<Box<ParamHandle>>>,
}

impl ParamSet {
    fn new() -> Self {
        Self {
            tag: PARAM_SET_TAG,
            props: PropertySet::new(),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> *mut c_void {
        self as *const ParamSet as *mut c_void
    }

    /// # Safety
    /// See [`EffectHandle::from_handle`].
    pub unsafe fn from_handle<'a>(handle: *mut c_void) -> Option<&'a ParamSet> {
        let set = (handle as *const ParamSet).as_ref()?;
        (set.tag == PARAM_SET_TAG).then_some(set)
    }

    /// Define a parameter; `None` if the name is already taken
    pub fn define(&self, param_type: &str, name: &str) -> Option<&ParamHandle> {
        let mut params = lock(&self.params);
        if params.iter().any(|p| p.name == name) {
            return None;
        }
        params.push(ParamHandle::new(param_type, name));
        let param: *const ParamHandle = &**params.last()?;
        // SAFETY: params are boxed and never removed while the set lives.
        Some(unsafe { &*param })
    }

    pub fn get(&self, name: &str) -> Option<&ParamHandle> {
        let params = lock(&self.params);
        let param: *const ParamHandle = &**params.iter().find(|p| p.name == name)?;
        // SAFETY: as in `define`.
        Some(unsafe { &*param })
    }

    /// Parameters in definition order
    pub fn all(&self) -> Vec<&ParamHandle> {
        let params = lock(&self.params);
        params
            .iter()
            .map(|p| {
                let param: *const ParamHandle = &**p;
                // SAFETY: as in `define`.
                unsafe { &*param }
            })
            .collect()
    }
}

/// A block of image memory allocated through the image effect suite
#[repr(C)]
pub struct ImageMemory {
    tag: u32,
    pub data: *mut c_void,
    pub size: usize,
}

impl ImageMemory {
    pub fn allocate(size: usize) -> Option<Box<ImageMemory>> {
        // SAFETY: plain allocation; freed in Drop.
        let data = unsafe { libc::malloc(size.max(1)) };
        if data.is_null() {
            return None;
        }
        Some(Box::new(Self {
            tag: MEMORY_TAG,
            data,
            size,
        }))
    }

    /// # Safety
    /// See [`EffectHandle::from_handle`].
    pub unsafe fn from_handle<'a>(handle: *mut c_void) -> Option<&'a ImageMemory> {
        let memory = (handle as *const ImageMemory).as_ref()?;
        (memory.tag == MEMORY_TAG).then_some(memory)
    }
}

impl Drop for ImageMemory {
    fn drop(&mut self) {
        // SAFETY: allocated with libc::malloc in `allocate`.
        unsafe { libc::free(self.data) };
        self.tag = 0;
    }
}

lazy_static! {
    /// Image property sets currently handed out by `clipGetImage`
    static ref LIVE_IMAGES: Mutex<HashSet<usize>> = Mutex::new(HashSet::new());
}

/// Hand out an image property set; the caller releases it with
/// [`release_image`]
pub fn publish_image(props: PropertySet) -> *mut c_void {
    let ptr = Box::into_raw(Box::new(props));
    lock(&LIVE_IMAGES).insert(ptr as usize);
    ptr as *mut c_void
}

/// Release an image handed out by [`publish_image`]
///
/// Returns false if the handle is not a live image.
pub fn release_image(handle: *mut c_void) -> bool {
    if !lock(&LIVE_IMAGES).remove(&(handle as usize)) {
        return false;
    }
    // SAFETY: the address was produced by Box::into_raw in `publish_image`
    // and has just been removed from the live set, so it is freed once.
    drop(unsafe { Box::from_raw(handle as *mut PropertySet) });
    true
}

/// Number of images not yet released
pub fn live_image_count() -> usize {
    lock(&LIVE_IMAGES).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_check_their_tag() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        let clip = effect.define_clip("Source");
        unsafe {
            assert!(EffectHandle::from_handle(effect.handle()).is_some());
            assert!(EffectHandle::from_handle(clip.handle()).is_none());
            assert!(ClipHandle::from_handle(clip.handle()).is_some());
            assert!(ParamSet::from_handle(effect.params.handle()).is_some());
            assert!(ParamHandle::from_handle(std::ptr::null_mut()).is_none());
        }
    }

    #[test]
    fn test_define_clip_is_idempotent() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        let a = effect.define_clip("Source").handle();
        let b = effect.define_clip("Source").handle();
        effect.define_clip("Output");
        assert_eq!(a, b);
        assert_eq!(effect.clip_names(), vec!["Source", "Output"]);
    }

    #[test]
    fn test_duplicate_param_rejected() {
        let effect = EffectHandle::new(abi::TYPE_IMAGE_EFFECT);
        assert!(effect.params.define(abi::PARAM_TYPE_DOUBLE, "mix").is_some());
        assert!(effect.params.define(abi::PARAM_TYPE_INTEGER, "mix").is_none());
        assert_eq!(effect.params.all().len(), 1);
    }

    #[test]
    fn test_image_release_is_checked() {
        let handle = publish_image(PropertySet::new());
        assert!(release_image(handle));
        assert!(!release_image(handle));
    }
}
