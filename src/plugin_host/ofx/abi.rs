//! OpenFX C ABI: status codes, string constants, handle types and suite tables
//!
//! Everything here mirrors the layout plugins are compiled against. Suite
//! entries that are variadic in C are declared with a fixed number of
//! trailing pointer arguments; see `ofx::suites` for how they are served.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_int, c_uint, c_void};

pub type OfxStatus = c_int;
pub type OfxTime = f64;

pub type OfxPropertySetHandle = *mut c_void;
pub type OfxImageEffectHandle = *mut c_void;
pub type OfxImageClipHandle = *mut c_void;
pub type OfxParamSetHandle = *mut c_void;
pub type OfxParamHandle = *mut c_void;
pub type OfxImageMemoryHandle = *mut c_void;
pub type OfxMutexHandle = *mut c_void;

// Status codes
pub const STAT_OK: OfxStatus = 0;
pub const STAT_FAILED: OfxStatus = 1;
pub const STAT_ERR_FATAL: OfxStatus = 2;
pub const STAT_ERR_UNKNOWN: OfxStatus = 3;
pub const STAT_ERR_MISSING_HOST_FEATURE: OfxStatus = 4;
pub const STAT_ERR_UNSUPPORTED: OfxStatus = 5;
pub const STAT_ERR_EXISTS: OfxStatus = 6;
pub const STAT_ERR_FORMAT: OfxStatus = 7;
pub const STAT_ERR_MEMORY: OfxStatus = 8;
pub const STAT_ERR_BAD_HANDLE: OfxStatus = 9;
pub const STAT_ERR_BAD_INDEX: OfxStatus = 10;
pub const STAT_ERR_VALUE: OfxStatus = 11;
pub const STAT_REPLY_YES: OfxStatus = 12;
pub const STAT_REPLY_NO: OfxStatus = 13;
pub const STAT_REPLY_DEFAULT: OfxStatus = 14;
pub const STAT_ERR_IMAGE_FORMAT: OfxStatus = 1000;

/// Whether a status returned from an action means the action succeeded
///
/// `kOfxStatReplyDefault` means "the plugin did not trap the action", which
/// the host treats as success for every action it sends.
pub fn status_ok(status: OfxStatus) -> bool {
    matches!(status, STAT_OK | STAT_REPLY_DEFAULT)
}

// API identity
pub const IMAGE_EFFECT_PLUGIN_API: &str = "OfxImageEffectPluginAPI";
pub const IMAGE_EFFECT_PLUGIN_API_VERSION: i32 = 1;

// Bundle entry points
pub const GET_NUMBER_OF_PLUGINS_SYMBOL: &[u8] = b"OfxGetNumberOfPlugins\0";
pub const GET_PLUGIN_SYMBOL: &[u8] = b"OfxGetPlugin\0";

// Actions
pub const ACTION_LOAD: &str = "OfxActionLoad";
pub const ACTION_DESCRIBE: &str = "OfxActionDescribe";
pub const ACTION_UNLOAD: &str = "OfxActionUnload";
pub const ACTION_CREATE_INSTANCE: &str = "OfxActionCreateInstance";
pub const ACTION_DESTROY_INSTANCE: &str = "OfxActionDestroyInstance";
pub const ACTION_INSTANCE_CHANGED: &str = "OfxActionInstanceChanged";
pub const ACTION_BEGIN_INSTANCE_CHANGED: &str = "OfxActionBeginInstanceChanged";
pub const ACTION_END_INSTANCE_CHANGED: &str = "OfxActionEndInstanceChanged";
pub const IMAGE_EFFECT_ACTION_DESCRIBE_IN_CONTEXT: &str = "OfxImageEffectActionDescribeInContext";
pub const IMAGE_EFFECT_ACTION_RENDER: &str = "OfxImageEffectActionRender";
pub const IMAGE_EFFECT_ACTION_BEGIN_SEQUENCE_RENDER: &str =
    "OfxImageEffectActionBeginSequenceRender";
pub const IMAGE_EFFECT_ACTION_END_SEQUENCE_RENDER: &str = "OfxImageEffectActionEndSequenceRender";
pub const IMAGE_EFFECT_ACTION_GET_REGION_OF_DEFINITION: &str =
    "OfxImageEffectActionGetRegionOfDefinition";
pub const IMAGE_EFFECT_ACTION_GET_CLIP_PREFERENCES: &str = "OfxImageEffectActionGetClipPreferences";
pub const IMAGE_EFFECT_ACTION_IS_IDENTITY: &str = "OfxImageEffectActionIsIdentity";

// Contexts
pub const CONTEXT_GENERATOR: &str = "OfxImageEffectContextGenerator";
pub const CONTEXT_FILTER: &str = "OfxImageEffectContextFilter";
pub const CONTEXT_GENERAL: &str = "OfxImageEffectContextGeneral";
pub const CONTEXT_TRANSITION: &str = "OfxImageEffectContextTransition";
pub const CONTEXT_PAINT: &str = "OfxImageEffectContextPaint";
pub const CONTEXT_RETIMER: &str = "OfxImageEffectContextRetimer";

// Clips
pub const OUTPUT_CLIP_NAME: &str = "Output";
pub const SOURCE_CLIP_NAME: &str = "Source";

// Suites
pub const PROPERTY_SUITE: &str = "OfxPropertySuite";
pub const IMAGE_EFFECT_SUITE: &str = "OfxImageEffectSuite";
pub const PARAMETER_SUITE: &str = "OfxParameterSuite";
pub const MEMORY_SUITE: &str = "OfxMemorySuite";
pub const MULTI_THREAD_SUITE: &str = "OfxMultiThreadSuite";
pub const MESSAGE_SUITE: &str = "OfxMessageSuite";

// Generic properties
pub const PROP_TYPE: &str = "OfxPropType";
pub const PROP_NAME: &str = "OfxPropName";
pub const PROP_LABEL: &str = "OfxPropLabel";
pub const PROP_SHORT_LABEL: &str = "OfxPropShortLabel";
pub const PROP_LONG_LABEL: &str = "OfxPropLongLabel";
pub const PROP_VERSION: &str = "OfxPropVersion";
pub const PROP_VERSION_LABEL: &str = "OfxPropVersionLabel";
pub const PROP_API_VERSION: &str = "OfxPropAPIVersion";
pub const PROP_TIME: &str = "OfxPropTime";
pub const PROP_CHANGE_REASON: &str = "OfxPropChangeReason";
pub const PROP_INSTANCE_DATA: &str = "OfxPropInstanceData";
pub const PROP_PLUGIN_DESCRIPTION: &str = "OfxPropPluginDescription";

pub const TYPE_IMAGE_EFFECT_HOST: &str = "OfxTypeImageEffectHost";
pub const TYPE_IMAGE_EFFECT: &str = "OfxTypeImageEffect";
pub const TYPE_IMAGE_EFFECT_INSTANCE: &str = "OfxTypeImageEffectInstance";
pub const TYPE_PARAMETER: &str = "OfxTypeParameter";
pub const TYPE_CLIP: &str = "OfxTypeClip";
pub const TYPE_IMAGE: &str = "OfxTypeImage";

pub const CHANGE_USER_EDITED: &str = "OfxChangeUserEdited";
pub const CHANGE_PLUGIN_EDITED: &str = "OfxChangePluginEdited";

// Host properties
pub const IMAGE_EFFECT_HOST_PROP_IS_BACKGROUND: &str = "OfxImageEffectHostPropIsBackground";
pub const IMAGE_EFFECT_PROP_SUPPORTS_OVERLAYS: &str = "OfxImageEffectPropSupportsOverlays";
pub const IMAGE_EFFECT_PROP_SUPPORTS_MULTI_RESOLUTION: &str =
    "OfxImageEffectPropSupportsMultiResolution";
pub const IMAGE_EFFECT_PROP_TEMPORAL_CLIP_ACCESS: &str = "OfxImageEffectPropTemporalClipAccess";
pub const IMAGE_EFFECT_PROP_SUPPORTS_MULTIPLE_CLIP_DEPTHS: &str =
    "OfxImageEffectPropSupportsMultipleClipDepths";
pub const IMAGE_EFFECT_PROP_SUPPORTS_MULTIPLE_CLIP_PARS: &str =
    "OfxImageEffectPropSupportsMultipleClipPARs";
pub const IMAGE_EFFECT_PROP_SETABLE_FRAME_RATE: &str = "OfxImageEffectPropSetableFrameRate";
pub const IMAGE_EFFECT_PROP_SETABLE_FIELDING: &str = "OfxImageEffectPropSetableFielding";
pub const PARAM_HOST_PROP_SUPPORTS_CUSTOM_INTERACT: &str = "OfxParamHostPropSupportsCustomInteract";
pub const PARAM_HOST_PROP_SUPPORTS_STRING_ANIMATION: &str =
    "OfxParamHostPropSupportsStringAnimation";
pub const PARAM_HOST_PROP_SUPPORTS_CHOICE_ANIMATION: &str =
    "OfxParamHostPropSupportsChoiceAnimation";
pub const PARAM_HOST_PROP_SUPPORTS_BOOLEAN_ANIMATION: &str =
    "OfxParamHostPropSupportsBooleanAnimation";
pub const PARAM_HOST_PROP_SUPPORTS_CUSTOM_ANIMATION: &str =
    "OfxParamHostPropSupportsCustomAnimation";
pub const PARAM_HOST_PROP_MAX_PARAMETERS: &str = "OfxParamHostPropMaxParameters";
pub const PARAM_HOST_PROP_MAX_PAGES: &str = "OfxParamHostPropMaxPages";
pub const PARAM_HOST_PROP_PAGE_ROW_COLUMN_COUNT: &str = "OfxParamHostPropPageRowColumnCount";

// Image effect properties
pub const IMAGE_EFFECT_PROP_CONTEXT: &str = "OfxImageEffectPropContext";
pub const IMAGE_EFFECT_PROP_SUPPORTED_CONTEXTS: &str = "OfxImageEffectPropSupportedContexts";
pub const IMAGE_EFFECT_PROP_SUPPORTED_COMPONENTS: &str = "OfxImageEffectPropSupportedComponents";
pub const IMAGE_EFFECT_PROP_SUPPORTED_PIXEL_DEPTHS: &str = "OfxImageEffectPropSupportedPixelDepths";
pub const IMAGE_EFFECT_PROP_SUPPORTS_TILES: &str = "OfxImageEffectPropSupportsTiles";
pub const IMAGE_EFFECT_PROP_RENDER_THREAD_SAFETY: &str = "OfxImageEffectPluginRenderThreadSafety";
pub const IMAGE_EFFECT_PLUGIN_PROP_GROUPING: &str = "OfxImageEffectPluginPropGrouping";
pub const IMAGE_EFFECT_PROP_PROJECT_SIZE: &str = "OfxImageEffectPropProjectSize";
pub const IMAGE_EFFECT_PROP_PROJECT_OFFSET: &str = "OfxImageEffectPropProjectOffset";
pub const IMAGE_EFFECT_PROP_PROJECT_EXTENT: &str = "OfxImageEffectPropProjectExtent";
pub const IMAGE_EFFECT_PROP_PROJECT_PIXEL_ASPECT_RATIO: &str =
    "OfxImageEffectPropProjectPixelAspectRatio";
pub const IMAGE_EFFECT_PROP_PIXEL_ASPECT_RATIO: &str = "OfxImagePropPixelAspectRatio";
pub const IMAGE_EFFECT_PROP_FRAME_RATE: &str = "OfxImageEffectPropFrameRate";
pub const IMAGE_EFFECT_PROP_FRAME_RANGE: &str = "OfxImageEffectPropFrameRange";
pub const IMAGE_EFFECT_PROP_UNMAPPED_FRAME_RATE: &str = "OfxImageEffectPropUnmappedFrameRate";
pub const IMAGE_EFFECT_PROP_UNMAPPED_FRAME_RANGE: &str = "OfxImageEffectPropUnmappedFrameRange";
pub const IMAGE_EFFECT_PROP_RENDER_WINDOW: &str = "OfxImageEffectPropRenderWindow";
pub const IMAGE_EFFECT_PROP_RENDER_SCALE: &str = "OfxImageEffectPropRenderScale";
pub const IMAGE_EFFECT_PROP_FIELD_TO_RENDER: &str = "OfxImageEffectPropFieldToRender";
pub const IMAGE_EFFECT_PROP_REGION_OF_DEFINITION: &str = "OfxImageEffectPropRegionOfDefinition";
pub const IMAGE_EFFECT_PROP_COMPONENTS: &str = "OfxImageEffectPropComponents";
pub const IMAGE_EFFECT_PROP_PIXEL_DEPTH: &str = "OfxImageEffectPropPixelDepth";
pub const IMAGE_EFFECT_PROP_PRE_MULTIPLICATION: &str = "OfxImageEffectPropPreMultiplication";
pub const IMAGE_EFFECT_INSTANCE_PROP_EFFECT_DURATION: &str =
    "OfxImageEffectInstancePropEffectDuration";
pub const IMAGE_EFFECT_PROP_SEQUENTIAL_RENDER_STATUS: &str =
    "OfxImageEffectPropSequentialRenderStatus";
pub const IMAGE_EFFECT_PROP_INTERACTIVE_RENDER_STATUS: &str =
    "OfxImageEffectPropInteractiveRenderStatus";

pub const RENDER_THREAD_UNSAFE: &str = "OfxImageEffectRenderUnsafe";
pub const RENDER_THREAD_INSTANCE_SAFE: &str = "OfxImageEffectRenderInstanceSafe";
pub const RENDER_THREAD_FULLY_SAFE: &str = "OfxImageEffectRenderFullySafe";

// Clip properties
pub const IMAGE_CLIP_PROP_OPTIONAL: &str = "OfxImageClipPropOptional";
pub const IMAGE_CLIP_PROP_IS_MASK: &str = "OfxImageClipPropIsMask";
pub const IMAGE_CLIP_PROP_CONNECTED: &str = "OfxImageClipPropConnected";
pub const IMAGE_CLIP_PROP_UNMAPPED_COMPONENTS: &str = "OfxImageClipPropUnmappedComponents";
pub const IMAGE_CLIP_PROP_UNMAPPED_PIXEL_DEPTH: &str = "OfxImageClipPropUnmappedPixelDepth";
pub const IMAGE_CLIP_PROP_FIELD_ORDER: &str = "OfxImageClipPropFieldOrder";
pub const IMAGE_CLIP_PROP_CONTINUOUS_SAMPLES: &str = "OfxImageClipPropContinuousSamples";

// Image properties
pub const IMAGE_PROP_DATA: &str = "OfxImagePropData";
pub const IMAGE_PROP_BOUNDS: &str = "OfxImagePropBounds";
pub const IMAGE_PROP_REGION_OF_DEFINITION: &str = "OfxImagePropRegionOfDefinition";
pub const IMAGE_PROP_ROW_BYTES: &str = "OfxImagePropRowBytes";
pub const IMAGE_PROP_FIELD: &str = "OfxImagePropField";
pub const IMAGE_PROP_UNIQUE_IDENTIFIER: &str = "OfxImagePropUniqueIdentifier";

pub const BIT_DEPTH_FLOAT: &str = "OfxBitDepthFloat";
pub const COMPONENT_RGBA: &str = "OfxImageComponentRGBA";
pub const COMPONENT_ALPHA: &str = "OfxImageComponentAlpha";
pub const COMPONENT_NONE: &str = "OfxImageComponentNone";
pub const IMAGE_PREMULTIPLIED: &str = "OfxImageAlphaPremultiplied";
pub const IMAGE_FIELD_NONE: &str = "OfxFieldNone";

// Parameter types
pub const PARAM_TYPE_INTEGER: &str = "OfxParamTypeInteger";
pub const PARAM_TYPE_DOUBLE: &str = "OfxParamTypeDouble";
pub const PARAM_TYPE_BOOLEAN: &str = "OfxParamTypeBoolean";
pub const PARAM_TYPE_CHOICE: &str = "OfxParamTypeChoice";
pub const PARAM_TYPE_RGBA: &str = "OfxParamTypeRGBA";
pub const PARAM_TYPE_RGB: &str = "OfxParamTypeRGB";
pub const PARAM_TYPE_DOUBLE_2D: &str = "OfxParamTypeDouble2D";
pub const PARAM_TYPE_INTEGER_2D: &str = "OfxParamTypeInteger2D";
pub const PARAM_TYPE_DOUBLE_3D: &str = "OfxParamTypeDouble3D";
pub const PARAM_TYPE_INTEGER_3D: &str = "OfxParamTypeInteger3D";
pub const PARAM_TYPE_STRING: &str = "OfxParamTypeString";
pub const PARAM_TYPE_CUSTOM: &str = "OfxParamTypeCustom";
pub const PARAM_TYPE_GROUP: &str = "OfxParamTypeGroup";
pub const PARAM_TYPE_PAGE: &str = "OfxParamTypePage";
pub const PARAM_TYPE_PUSH_BUTTON: &str = "OfxParamTypePushButton";

// Parameter properties
pub const PARAM_PROP_TYPE: &str = "OfxParamPropType";
pub const PARAM_PROP_DEFAULT: &str = "OfxParamPropDefault";
pub const PARAM_PROP_MIN: &str = "OfxParamPropMin";
pub const PARAM_PROP_MAX: &str = "OfxParamPropMax";
pub const PARAM_PROP_DISPLAY_MIN: &str = "OfxParamPropDisplayMin";
pub const PARAM_PROP_DISPLAY_MAX: &str = "OfxParamPropDisplayMax";
pub const PARAM_PROP_CHOICE_OPTION: &str = "OfxParamPropChoiceOption";
pub const PARAM_PROP_PARENT: &str = "OfxParamPropParent";
pub const PARAM_PROP_ENABLED: &str = "OfxParamPropEnabled";
pub const PARAM_PROP_SECRET: &str = "OfxParamPropSecret";
pub const PARAM_PROP_HINT: &str = "OfxParamPropHint";
pub const PARAM_PROP_SCRIPT_NAME: &str = "OfxParamPropScriptName";
pub const PARAM_PROP_ANIMATES: &str = "OfxParamPropAnimates";

// Message types
pub const MESSAGE_FATAL: &str = "OfxMessageFatal";
pub const MESSAGE_ERROR: &str = "OfxMessageError";
pub const MESSAGE_WARNING: &str = "OfxMessageWarning";
pub const MESSAGE_MESSAGE: &str = "OfxMessageMessage";
pub const MESSAGE_LOG: &str = "OfxMessageLog";
pub const MESSAGE_QUESTION: &str = "OfxMessageQuestion";

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OfxPointD {
    pub x: f64,
    pub y: f64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OfxRangeD {
    pub min: f64,
    pub max: f64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct OfxRectD {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OfxRectI {
    pub x1: c_int,
    pub y1: c_int,
    pub x2: c_int,
    pub y2: c_int,
}

pub type FetchSuiteFn =
    unsafe extern "C" fn(host: OfxPropertySetHandle, name: *const c_char, version: c_int) -> *const c_void;

/// Host descriptor handed to every plugin through `setHost`
#[repr(C)]
pub struct OfxHost {
    pub host: OfxPropertySetHandle,
    pub fetch_suite: FetchSuiteFn,
}

pub type MainEntryFn = unsafe extern "C" fn(
    action: *const c_char,
    handle: *const c_void,
    in_args: OfxPropertySetHandle,
    out_args: OfxPropertySetHandle,
) -> OfxStatus;

/// Plugin record returned by `OfxGetPlugin`
#[repr(C)]
pub struct OfxPlugin {
    pub plugin_api: *const c_char,
    pub api_version: c_int,
    pub plugin_identifier: *const c_char,
    pub plugin_version_major: c_uint,
    pub plugin_version_minor: c_uint,
    pub set_host: Option<unsafe extern "C" fn(host: *mut OfxHost)>,
    pub main_entry: Option<MainEntryFn>,
}

pub type GetNumberOfPluginsFn = unsafe extern "C" fn() -> c_int;
pub type GetPluginFn = unsafe extern "C" fn(nth: c_int) -> *mut OfxPlugin;

#[repr(C)]
pub struct OfxPropertySuiteV1 {
    pub prop_set_pointer:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *mut c_void) -> OfxStatus,
    pub prop_set_string:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *const c_char) -> OfxStatus,
    pub prop_set_double:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, f64) -> OfxStatus,
    pub prop_set_int:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, c_int) -> OfxStatus,
    pub prop_set_pointer_n: unsafe extern "C" fn(
        OfxPropertySetHandle,
        *const c_char,
        c_int,
        *const *mut c_void,
    ) -> OfxStatus,
    pub prop_set_string_n: unsafe extern "C" fn(
        OfxPropertySetHandle,
        *const c_char,
        c_int,
        *const *const c_char,
    ) -> OfxStatus,
    pub prop_set_double_n:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *const f64) -> OfxStatus,
    pub prop_set_int_n:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *const c_int) -> OfxStatus,
    pub prop_get_pointer: unsafe extern "C" fn(
        OfxPropertySetHandle,
        *const c_char,
        c_int,
        *mut *mut c_void,
    ) -> OfxStatus,
    pub prop_get_string: unsafe extern "C" fn(
        OfxPropertySetHandle,
        *const c_char,
        c_int,
        *mut *mut c_char,
    ) -> OfxStatus,
    pub prop_get_double:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *mut f64) -> OfxStatus,
    pub prop_get_int:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *mut c_int) -> OfxStatus,
    pub prop_get_pointer_n: unsafe extern "C" fn(
        OfxPropertySetHandle,
        *const c_char,
        c_int,
        *mut *mut c_void,
    ) -> OfxStatus,
    pub prop_get_string_n: unsafe extern "C" fn(
        OfxPropertySetHandle,
        *const c_char,
        c_int,
        *mut *mut c_char,
    ) -> OfxStatus,
    pub prop_get_double_n:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *mut f64) -> OfxStatus,
    pub prop_get_int_n:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, c_int, *mut c_int) -> OfxStatus,
    pub prop_reset: unsafe extern "C" fn(OfxPropertySetHandle, *const c_char) -> OfxStatus,
    pub prop_get_dimension:
        unsafe extern "C" fn(OfxPropertySetHandle, *const c_char, *mut c_int) -> OfxStatus,
}

#[repr(C)]
pub struct OfxImageEffectSuiteV1 {
    pub get_property_set:
        unsafe extern "C" fn(OfxImageEffectHandle, *mut OfxPropertySetHandle) -> OfxStatus,
    pub get_param_set:
        unsafe extern "C" fn(OfxImageEffectHandle, *mut OfxParamSetHandle) -> OfxStatus,
    pub clip_define: unsafe extern "C" fn(
        OfxImageEffectHandle,
        *const c_char,
        *mut OfxPropertySetHandle,
    ) -> OfxStatus,
    pub clip_get_handle: unsafe extern "C" fn(
        OfxImageEffectHandle,
        *const c_char,
        *mut OfxImageClipHandle,
        *mut OfxPropertySetHandle,
    ) -> OfxStatus,
    pub clip_get_property_set:
        unsafe extern "C" fn(OfxImageClipHandle, *mut OfxPropertySetHandle) -> OfxStatus,
    pub clip_get_image: unsafe extern "C" fn(
        OfxImageClipHandle,
        OfxTime,
        *const OfxRectD,
        *mut OfxPropertySetHandle,
    ) -> OfxStatus,
    pub clip_release_image: unsafe extern "C" fn(OfxPropertySetHandle) -> OfxStatus,
    pub clip_get_region_of_definition:
        unsafe extern "C" fn(OfxImageClipHandle, OfxTime, *mut OfxRectD) -> OfxStatus,
    pub abort: unsafe extern "C" fn(OfxImageEffectHandle) -> c_int,
    pub image_memory_alloc: unsafe extern "C" fn(
        OfxImageEffectHandle,
        usize,
        *mut OfxImageMemoryHandle,
    ) -> OfxStatus,
    pub image_memory_free: unsafe extern "C" fn(OfxImageMemoryHandle) -> OfxStatus,
    pub image_memory_lock:
        unsafe extern "C" fn(OfxImageMemoryHandle, *mut *mut c_void) -> OfxStatus,
    pub image_memory_unlock: unsafe extern "C" fn(OfxImageMemoryHandle) -> OfxStatus,
}

/// Trailing-argument slot of a C-variadic suite entry
pub type VarArg = *mut c_void;

#[repr(C)]
pub struct OfxParameterSuiteV1 {
    pub param_define: unsafe extern "C" fn(
        OfxParamSetHandle,
        *const c_char,
        *const c_char,
        *mut OfxPropertySetHandle,
    ) -> OfxStatus,
    pub param_get_handle: unsafe extern "C" fn(
        OfxParamSetHandle,
        *const c_char,
        *mut OfxParamHandle,
        *mut OfxPropertySetHandle,
    ) -> OfxStatus,
    pub param_set_get_property_set:
        unsafe extern "C" fn(OfxParamSetHandle, *mut OfxPropertySetHandle) -> OfxStatus,
    pub param_get_property_set:
        unsafe extern "C" fn(OfxParamHandle, *mut OfxPropertySetHandle) -> OfxStatus,
    pub param_get_value:
        unsafe extern "C" fn(OfxParamHandle, VarArg, VarArg, VarArg, VarArg) -> OfxStatus,
    pub param_get_value_at_time: unsafe extern "C" fn(
        OfxParamHandle,
        OfxTime,
        VarArg,
        VarArg,
        VarArg,
        VarArg,
    ) -> OfxStatus,
    pub param_get_derivative: unsafe extern "C" fn(
        OfxParamHandle,
        OfxTime,
        VarArg,
        VarArg,
        VarArg,
        VarArg,
    ) -> OfxStatus,
    pub param_get_integral: unsafe extern "C" fn(
        OfxParamHandle,
        OfxTime,
        OfxTime,
        VarArg,
        VarArg,
        VarArg,
        VarArg,
    ) -> OfxStatus,
    pub param_set_value: unsafe extern "C" fn(OfxParamHandle, VarArg) -> OfxStatus,
    pub param_set_value_at_time: unsafe extern "C" fn(OfxParamHandle, OfxTime, VarArg) -> OfxStatus,
    pub param_get_num_keys: unsafe extern "C" fn(OfxParamHandle, *mut c_uint) -> OfxStatus,
    pub param_get_key_time: unsafe extern "C" fn(OfxParamHandle, c_uint, *mut OfxTime) -> OfxStatus,
    pub param_get_key_index:
        unsafe extern "C" fn(OfxParamHandle, OfxTime, c_int, *mut c_int) -> OfxStatus,
    pub param_delete_key: unsafe extern "C" fn(OfxParamHandle, OfxTime) -> OfxStatus,
    pub param_delete_all_keys: unsafe extern "C" fn(OfxParamHandle) -> OfxStatus,
    pub param_copy: unsafe extern "C" fn(
        OfxParamHandle,
        OfxParamHandle,
        OfxTime,
        *const OfxRangeD,
    ) -> OfxStatus,
    pub param_edit_begin: unsafe extern "C" fn(OfxParamSetHandle, *const c_char) -> OfxStatus,
    pub param_edit_end: unsafe extern "C" fn(OfxParamSetHandle) -> OfxStatus,
}

#[repr(C)]
pub struct OfxMemorySuiteV1 {
    pub memory_alloc: unsafe extern "C" fn(*mut c_void, usize, *mut *mut c_void) -> OfxStatus,
    pub memory_free: unsafe extern "C" fn(*mut c_void) -> OfxStatus,
}

pub type OfxThreadFunctionV1 = unsafe extern "C" fn(c_uint, c_uint, *mut c_void);

#[repr(C)]
pub struct OfxMultiThreadSuiteV1 {
    pub multi_thread:
        unsafe extern "C" fn(Option<OfxThreadFunctionV1>, c_uint, *mut c_void) -> OfxStatus,
    pub multi_thread_num_cpus: unsafe extern "C" fn(*mut c_uint) -> OfxStatus,
    pub multi_thread_index: unsafe extern "C" fn(*mut c_uint) -> OfxStatus,
    pub multi_thread_is_spawned_thread: unsafe extern "C" fn() -> c_int,
    pub mutex_create: unsafe extern "C" fn(*mut OfxMutexHandle, c_int) -> OfxStatus,
    pub mutex_destroy: unsafe extern "C" fn(OfxMutexHandle) -> OfxStatus,
    pub mutex_lock: unsafe extern "C" fn(OfxMutexHandle) -> OfxStatus,
    pub mutex_unlock: unsafe extern "C" fn(OfxMutexHandle) -> OfxStatus,
    pub mutex_try_lock: unsafe extern "C" fn(OfxMutexHandle) -> OfxStatus,
}

pub type MessageFn = unsafe extern "C" fn(
    *mut c_void,
    *const c_char,
    *const c_char,
    *const c_char,
) -> OfxStatus;

#[repr(C)]
pub struct OfxMessageSuiteV1 {
    pub message: MessageFn,
}

#[repr(C)]
pub struct OfxMessageSuiteV2 {
    pub message: MessageFn,
    pub set_persistent_message: MessageFn,
    pub clear_persistent_message: unsafe extern "C" fn(*mut c_void) -> OfxStatus,
}
