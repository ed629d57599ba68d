//! Property sets and the property suite
//!
//! Every handle a plugin receives (host, effect, clip, parameter, image,
//! action arguments) exposes a `PropertySet`. The set is a string-keyed map of
//! typed, multi-dimensional values. Strings are stored as `CString` so the
//! pointers handed back through `propGetString` stay valid until the property
//! is next written.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::{Mutex, MutexGuard};

use super::abi::{self, OfxPropertySetHandle, OfxPropertySuiteV1, OfxStatus};

/// A single property component
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Int(c_int),
    Double(f64),
    String(CString),
    Pointer(*mut c_void),
}

impl PropertyValue {
    fn string(s: &str) -> Self {
        // Interior NULs cannot cross the ABI; truncate at the first one.
        let bytes = s.split('\0').next().unwrap_or_default();
        PropertyValue::String(CString::new(bytes).unwrap_or_default())
    }

    fn zero_like(&self) -> Self {
        match self {
            PropertyValue::Int(_) => PropertyValue::Int(0),
            PropertyValue::Double(_) => PropertyValue::Double(0.0),
            PropertyValue::String(_) => PropertyValue::String(CString::default()),
            PropertyValue::Pointer(_) => PropertyValue::Pointer(std::ptr::null_mut()),
        }
    }
}

/// A thread-safe property set
#[derive(Debug, Default)]
pub struct PropertySet {
    values: Mutex<HashMap<String, Vec<PropertyValue>>>,
}

// SAFETY: raw pointers stored in the set are opaque to the host; they are
// only handed back to the plugin that stored them. All access to the map goes
// through the mutex.
unsafe impl Send for PropertySet {}
unsafe impl Sync for PropertySet {}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque handle for passing this set across the ABI
    ///
    /// The handle is only valid while `self` is alive and not moved.
    pub fn handle(&self) -> OfxPropertySetHandle {
        self as *const PropertySet as OfxPropertySetHandle
    }

    /// Recover a set from a handle
    ///
    /// # Safety
    /// `handle` must be null or come from [`PropertySet::handle`] on a set
    /// that is still alive.
    pub unsafe fn from_handle<'a>(handle: OfxPropertySetHandle) -> Option<&'a PropertySet> {
        (handle as *const PropertySet).as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<PropertyValue>>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set(&self, name: &str, index: usize, value: PropertyValue) {
        let mut values = self.lock();
        let entry = values.entry(name.to_string()).or_default();
        if index >= entry.len() {
            let filler = value.zero_like();
            entry.resize(index + 1, filler);
        }
        entry[index] = value;
    }

    fn set_all(&self, name: &str, all: Vec<PropertyValue>) {
        self.lock().insert(name.to_string(), all);
    }

    fn get(&self, name: &str, index: usize) -> Result<PropertyValue, OfxStatus> {
        let values = self.lock();
        let entry = values.get(name).ok_or(abi::STAT_ERR_UNKNOWN)?;
        entry.get(index).cloned().ok_or(abi::STAT_ERR_BAD_INDEX)
    }

    pub fn set_int(&self, name: &str, index: usize, value: i32) {
        self.set(name, index, PropertyValue::Int(value));
    }

    pub fn set_ints(&self, name: &str, values: &[i32]) {
        self.set_all(name, values.iter().map(|v| PropertyValue::Int(*v)).collect());
    }

    pub fn set_double(&self, name: &str, index: usize, value: f64) {
        self.set(name, index, PropertyValue::Double(value));
    }

    pub fn set_doubles(&self, name: &str, values: &[f64]) {
        self.set_all(name, values.iter().map(|v| PropertyValue::Double(*v)).collect());
    }

    pub fn set_string(&self, name: &str, index: usize, value: &str) {
        self.set(name, index, PropertyValue::string(value));
    }

    pub fn set_strings(&self, name: &str, values: &[&str]) {
        self.set_all(name, values.iter().map(|v| PropertyValue::string(v)).collect());
    }

    pub fn set_pointer(&self, name: &str, index: usize, value: *mut c_void) {
        self.set(name, index, PropertyValue::Pointer(value));
    }

    pub fn get_int(&self, name: &str, index: usize) -> Option<i32> {
        match self.get(name, index).ok()? {
            PropertyValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_double(&self, name: &str, index: usize) -> Option<f64> {
        match self.get(name, index).ok()? {
            PropertyValue::Double(v) => Some(v),
            PropertyValue::Int(v) => Some(f64::from(v)),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str, index: usize) -> Option<String> {
        match self.get(name, index).ok()? {
            PropertyValue::String(v) => Some(v.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    pub fn get_pointer(&self, name: &str, index: usize) -> Option<*mut c_void> {
        match self.get(name, index).ok()? {
            PropertyValue::Pointer(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_doubles(&self, name: &str) -> Vec<f64> {
        (0..self.dimension(name))
            .filter_map(|i| self.get_double(name, i))
            .collect()
    }

    pub fn get_strings(&self, name: &str) -> Vec<String> {
        (0..self.dimension(name))
            .filter_map(|i| self.get_string(name, i))
            .collect()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_int(name, 0).map(|v| v != 0)
    }

    /// Number of components of a property (0 if unset)
    pub fn dimension(&self, name: &str) -> usize {
        self.lock().get(name).map(|v| v.len()).unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Reset every component of a property to zero
    pub fn reset(&self, name: &str) -> bool {
        let mut values = self.lock();
        match values.get_mut(name) {
            Some(entry) => {
                for v in entry.iter_mut() {
                    *v = v.zero_like();
                }
                true
            }
            None => false,
        }
    }

    // Raw access used by the suite, which must hand out pointers into the
    // stored strings.
    fn with_value<R>(
        &self,
        name: &str,
        index: usize,
        f: impl FnOnce(&PropertyValue) -> Result<R, OfxStatus>,
    ) -> Result<R, OfxStatus> {
        let values = self.lock();
        let entry = values.get(name).ok_or(abi::STAT_ERR_UNKNOWN)?;
        let value = entry.get(index).ok_or(abi::STAT_ERR_BAD_INDEX)?;
        f(value)
    }
}

unsafe fn property_name<'a>(property: *const c_char) -> Option<&'a str> {
    if property.is_null() {
        return None;
    }
    CStr::from_ptr(property).to_str().ok()
}

unsafe fn resolve<'a>(
    handle: OfxPropertySetHandle,
    property: *const c_char,
) -> Result<(&'a PropertySet, &'a str), OfxStatus> {
    let set = PropertySet::from_handle(handle).ok_or(abi::STAT_ERR_BAD_HANDLE)?;
    let name = property_name(property).ok_or(abi::STAT_ERR_UNKNOWN)?;
    Ok((set, name))
}

fn index_of(index: c_int) -> Result<usize, OfxStatus> {
    usize::try_from(index).map_err(|_| abi::STAT_ERR_BAD_INDEX)
}

fn status(result: Result<(), OfxStatus>) -> OfxStatus {
    match result {
        Ok(()) => abi::STAT_OK,
        Err(status) => status,
    }
}

unsafe extern "C" fn prop_set_pointer(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    value: *mut c_void,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        set.set_pointer(name, index_of(index)?, value);
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_string(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    value: *const c_char,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if value.is_null() {
            return Err(abi::STAT_ERR_VALUE);
        }
        let value = CStr::from_ptr(value).to_owned();
        set.set(name, index_of(index)?, PropertyValue::String(value));
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_double(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    value: f64,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        set.set_double(name, index_of(index)?, value);
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_int(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    value: c_int,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        set.set_int(name, index_of(index)?, value);
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_pointer_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    values: *const *mut c_void,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        let count = index_of(count)?;
        if values.is_null() && count > 0 {
            return Err(abi::STAT_ERR_VALUE);
        }
        let all = (0..count)
            .map(|i| PropertyValue::Pointer(*values.add(i)))
            .collect();
        set.set_all(name, all);
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_string_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    values: *const *const c_char,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        let count = index_of(count)?;
        if values.is_null() && count > 0 {
            return Err(abi::STAT_ERR_VALUE);
        }
        let mut all = Vec::with_capacity(count);
        for i in 0..count {
            let ptr = *values.add(i);
            if ptr.is_null() {
                return Err(abi::STAT_ERR_VALUE);
            }
            all.push(PropertyValue::String(CStr::from_ptr(ptr).to_owned()));
        }
        set.set_all(name, all);
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_double_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    values: *const f64,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        let count = index_of(count)?;
        if values.is_null() && count > 0 {
            return Err(abi::STAT_ERR_VALUE);
        }
        let all = (0..count)
            .map(|i| PropertyValue::Double(*values.add(i)))
            .collect();
        set.set_all(name, all);
        Ok(())
    })())
}

unsafe extern "C" fn prop_set_int_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    values: *const c_int,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        let count = index_of(count)?;
        if values.is_null() && count > 0 {
            return Err(abi::STAT_ERR_VALUE);
        }
        let all = (0..count).map(|i| PropertyValue::Int(*values.add(i))).collect();
        set.set_all(name, all);
        Ok(())
    })())
}

unsafe extern "C" fn prop_get_pointer(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    out: *mut *mut c_void,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if out.is_null() {
            return Err(abi::STAT_ERR_VALUE);
        }
        set.with_value(name, index_of(index)?, |value| match value {
            PropertyValue::Pointer(p) => {
                *out = *p;
                Ok(())
            }
            _ => Err(abi::STAT_ERR_VALUE),
        })
    })())
}

unsafe extern "C" fn prop_get_string(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    out: *mut *mut c_char,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if out.is_null() {
            return Err(abi::STAT_ERR_VALUE);
        }
        set.with_value(name, index_of(index)?, |value| match value {
            PropertyValue::String(s) => {
                // The CString's heap buffer outlives the lock guard; it is only
                // freed when the property is overwritten.
                *out = s.as_ptr() as *mut c_char;
                Ok(())
            }
            _ => Err(abi::STAT_ERR_VALUE),
        })
    })())
}

unsafe extern "C" fn prop_get_double(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    out: *mut f64,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if out.is_null() {
            return Err(abi::STAT_ERR_VALUE);
        }
        set.with_value(name, index_of(index)?, |value| match value {
            PropertyValue::Double(d) => {
                *out = *d;
                Ok(())
            }
            _ => Err(abi::STAT_ERR_VALUE),
        })
    })())
}

unsafe extern "C" fn prop_get_int(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    index: c_int,
    out: *mut c_int,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if out.is_null() {
            return Err(abi::STAT_ERR_VALUE);
        }
        set.with_value(name, index_of(index)?, |value| match value {
            PropertyValue::Int(i) => {
                *out = *i;
                Ok(())
            }
            _ => Err(abi::STAT_ERR_VALUE),
        })
    })())
}

unsafe extern "C" fn prop_get_pointer_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    out: *mut *mut c_void,
) -> OfxStatus {
    for i in 0..count.max(0) {
        let status = prop_get_pointer(handle, property, i, out.add(i as usize));
        if status != abi::STAT_OK {
            return status;
        }
    }
    abi::STAT_OK
}

unsafe extern "C" fn prop_get_string_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    out: *mut *mut c_char,
) -> OfxStatus {
    for i in 0..count.max(0) {
        let status = prop_get_string(handle, property, i, out.add(i as usize));
        if status != abi::STAT_OK {
            return status;
        }
    }
    abi::STAT_OK
}

unsafe extern "C" fn prop_get_double_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    out: *mut f64,
) -> OfxStatus {
    for i in 0..count.max(0) {
        let status = prop_get_double(handle, property, i, out.add(i as usize));
        if status != abi::STAT_OK {
            return status;
        }
    }
    abi::STAT_OK
}

unsafe extern "C" fn prop_get_int_n(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: c_int,
    out: *mut c_int,
) -> OfxStatus {
    for i in 0..count.max(0) {
        let status = prop_get_int(handle, property, i, out.add(i as usize));
        if status != abi::STAT_OK {
            return status;
        }
    }
    abi::STAT_OK
}

unsafe extern "C" fn prop_reset(handle: OfxPropertySetHandle, property: *const c_char) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if set.reset(name) {
            Ok(())
        } else {
            Err(abi::STAT_ERR_UNKNOWN)
        }
    })())
}

unsafe extern "C" fn prop_get_dimension(
    handle: OfxPropertySetHandle,
    property: *const c_char,
    count: *mut c_int,
) -> OfxStatus {
    status((|| {
        let (set, name) = resolve(handle, property)?;
        if count.is_null() {
            return Err(abi::STAT_ERR_VALUE);
        }
        if !set.contains(name) {
            return Err(abi::STAT_ERR_UNKNOWN);
        }
        *count = set.dimension(name) as c_int;
        Ok(())
    })())
}

/// Property suite, version 1
pub static PROPERTY_SUITE_V1: OfxPropertySuiteV1 = OfxPropertySuiteV1 {
    prop_set_pointer,
    prop_set_string,
    prop_set_double,
    prop_set_int,
    prop_set_pointer_n,
    prop_set_string_n,
    prop_set_double_n,
    prop_set_int_n,
    prop_get_pointer,
    prop_get_string,
    prop_get_double,
    prop_get_int,
    prop_get_pointer_n,
    prop_get_string_n,
    prop_get_double_n,
    prop_get_int_n,
    prop_reset,
    prop_get_dimension,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn cstr(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn test_rust_accessors() {
        let set = PropertySet::new();
        set.set_ints("size", &[3, 4]);
        set.set_string("label", 0, "Invert");
        set.set_double("scale", 1, 0.5);

        assert_eq!(set.dimension("size"), 2);
        assert_eq!(set.get_int("size", 1), Some(4));
        assert_eq!(set.get_string("label", 0).as_deref(), Some("Invert"));
        // Index 0 was filled with a zero of the same type
        assert_eq!(set.get_doubles("scale"), vec![0.0, 0.5]);
        assert_eq!(set.get_int("missing", 0), None);
    }

    #[test]
    fn test_suite_string_pointer_stays_valid() {
        let set = PropertySet::new();
        let name = cstr(abi::PROP_LABEL);
        let value = cstr("Constant");
        let suite = &PROPERTY_SUITE_V1;

        unsafe {
            assert_eq!(
                (suite.prop_set_string)(set.handle(), name.as_ptr(), 0, value.as_ptr()),
                abi::STAT_OK
            );
            let mut out: *mut c_char = std::ptr::null_mut();
            assert_eq!(
                (suite.prop_get_string)(set.handle(), name.as_ptr(), 0, &mut out),
                abi::STAT_OK
            );
            assert_eq!(CStr::from_ptr(out).to_str().unwrap(), "Constant");
        }
    }

    #[test]
    fn test_suite_error_statuses() {
        let set = PropertySet::new();
        let name = cstr("OfxTestProp");
        let suite = &PROPERTY_SUITE_V1;

        unsafe {
            let mut out = 0;
            assert_eq!(
                (suite.prop_get_int)(set.handle(), name.as_ptr(), 0, &mut out),
                abi::STAT_ERR_UNKNOWN
            );
            (suite.prop_set_int)(set.handle(), name.as_ptr(), 0, 7);
            assert_eq!(
                (suite.prop_get_int)(set.handle(), name.as_ptr(), 3, &mut out),
                abi::STAT_ERR_BAD_INDEX
            );
            let mut d = 0.0;
            assert_eq!(
                (suite.prop_get_double)(set.handle(), name.as_ptr(), 0, &mut d),
                abi::STAT_ERR_VALUE
            );
            assert_eq!(
                (suite.prop_get_int)(std::ptr::null_mut(), name.as_ptr(), 0, &mut out),
                abi::STAT_ERR_BAD_HANDLE
            );
        }
    }

    #[test]
    fn test_suite_n_variants_and_dimension() {
        let set = PropertySet::new();
        let name = cstr(abi::IMAGE_EFFECT_PROP_PROJECT_SIZE);
        let suite = &PROPERTY_SUITE_V1;

        unsafe {
            let values = [1920.0, 1080.0];
            (suite.prop_set_double_n)(set.handle(), name.as_ptr(), 2, values.as_ptr());
            let mut dim = 0;
            (suite.prop_get_dimension)(set.handle(), name.as_ptr(), &mut dim);
            assert_eq!(dim, 2);

            let mut out = [0.0; 2];
            assert_eq!(
                (suite.prop_get_double_n)(set.handle(), name.as_ptr(), 2, out.as_mut_ptr()),
                abi::STAT_OK
            );
            assert_eq!(out, values);

            assert_eq!((suite.prop_reset)(set.handle(), name.as_ptr()), abi::STAT_OK);
            assert_eq!(set.get_doubles(abi::IMAGE_EFFECT_PROP_PROJECT_SIZE), vec![0.0, 0.0]);
        }
    }
}
