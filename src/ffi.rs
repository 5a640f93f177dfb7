//! FFI bindings for the VCam bridge
//!
//! C-compatible entry points for the native host. Strings cross as
//! NUL-terminated UTF-8; strings returned from here are heap-allocated and
//! must be released with `vcam_free_string`. Failing calls return NULL or
//! `-1` and leave a message for `vcam_last_error`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use std::slice;
use std::sync::Arc;

use crate::bridge::{Bridge, RendererCallbacks};
use crate::catalog::{TrackingCatalog, TrackingMode};
use crate::channel::{ArrayChannel, Channel};
use crate::config::BridgeConfig;
use crate::engine::{TrackingEngine, TrackingFrame};
use crate::error::BridgeResult;
use crate::mapping::TrackingKey;
use crate::marshal::{read_string, write_array};
use crate::store::MappingStore;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Convert to an owned C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn mode_from_id(mode: i32) -> Option<TrackingMode> {
    let parsed = TrackingMode::from_id(mode);
    if parsed.is_none() {
        set_last_error(&format!("Unknown tracking mode id: {mode}"));
    }
    parsed
}

fn array_channel_from_id(channel: i32) -> Option<ArrayChannel> {
    let parsed = ArrayChannel::from_id(channel);
    if parsed.is_none() {
        set_last_error(&format!("Unknown array channel id: {channel}"));
    }
    parsed
}

// ============================================================================
// Bridge lifecycle
// ============================================================================

/// Opaque handle owning one bridge, its mapping store and tracking engine
pub struct VcamBridgeHandle {
    bridge: Arc<Bridge>,
    store: Arc<MappingStore>,
    engine: TrackingEngine,
}

impl VcamBridgeHandle {
    fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let bridge = Arc::new(Bridge::default());
        let store = Arc::new(
            config
                .mapping_store()?
                .with_sync(Arc::clone(bridge.methods())),
        );
        let engine = TrackingEngine::new(Arc::clone(&store), Arc::clone(&bridge));
        Ok(Self {
            bridge,
            store,
            engine,
        })
    }
}

/// Create a disconnected bridge.
///
/// # Safety
/// - `config_path` must be NULL or a valid null-terminated C string. NULL
///   searches `VCAM_CONFIG_PATH` and `./vcam.toml`, falling back to defaults.
/// - Must be freed with `vcam_bridge_free`.
/// - Returns NULL on error; call `vcam_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_new(config_path: *const c_char) -> *mut VcamBridgeHandle {
    clear_last_error();

    let path = cstr_to_string(config_path).map(PathBuf::from);
    let handle = BridgeConfig::load(path.as_deref()).and_then(|c| VcamBridgeHandle::from_config(&c));

    match handle {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a bridge, disconnecting it first.
///
/// # Safety
/// - `handle` must be NULL or a pointer returned by `vcam_bridge_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_free(handle: *mut VcamBridgeHandle) {
    if !handle.is_null() {
        let handle = Box::from_raw(handle);
        handle.bridge.disconnect();
    }
}

/// Wire the renderer's callback table and push the current mapping table.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `vcam_bridge_new`.
/// - `callbacks` must point to a `RendererCallbacks` table. It is copied;
///   the functions it names must stay callable until disconnect.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_connect(
    handle: *mut VcamBridgeHandle,
    callbacks: *const RendererCallbacks,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null bridge pointer");
        return -1;
    }
    if callbacks.is_null() {
        set_last_error("Null callback table pointer");
        return -1;
    }

    let handle = &*handle;
    handle.bridge.connect(ptr::read_unaligned(callbacks));
    for mode in TrackingMode::ALL {
        handle.store.resync(mode);
    }
    0
}

/// Drop the renderer's callbacks. Safe to call repeatedly.
///
/// # Safety
/// - `handle` must be NULL or a valid pointer returned by `vcam_bridge_new`.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_disconnect(handle: *mut VcamBridgeHandle) {
    if let Some(handle) = handle.as_ref() {
        handle.bridge.disconnect();
    }
}

// ============================================================================
// Tracking
// ============================================================================

/// Copy the last value seen on an array channel into `out`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `vcam_bridge_new`.
/// - `out` must point to `capacity` writable floats.
/// - Returns the number of floats written (0 when nothing is cached), or -1
///   on error.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_read_cached_array(
    handle: *mut VcamBridgeHandle,
    channel: i32,
    out: *mut f32,
    capacity: i32,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null bridge pointer");
        return -1;
    }
    let Some(channel) = array_channel_from_id(channel) else {
        return -1;
    };

    let handle = &*handle;
    handle
        .bridge
        .cache()
        .with_array(channel, |values| write_array(values, out, capacity.max(0) as usize) as i32)
}

/// Run one tracking frame through the mapping table and send it to the
/// renderer. The packed output is also copied into `out`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `vcam_bridge_new`.
/// - `keys` must point to `count` null-terminated C strings and `values` to
///   `count` floats; both may be NULL when `count` is 0.
/// - `out` must be NULL or point to `capacity` writable floats.
/// - Returns the number of floats written to `out`, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_process_frame(
    handle: *mut VcamBridgeHandle,
    mode: i32,
    keys: *const *const c_char,
    values: *const f32,
    count: i32,
    out: *mut f32,
    capacity: i32,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null bridge pointer");
        return -1;
    }
    let Some(mode) = mode_from_id(mode) else {
        return -1;
    };
    let count = count.max(0) as usize;
    if count > 0 && (keys.is_null() || values.is_null()) {
        set_last_error("Null frame pointer");
        return -1;
    }

    let mut frame = TrackingFrame::new();
    if count > 0 {
        let keys = slice::from_raw_parts(keys, count);
        let values = slice::from_raw_parts(values, count);
        for (key, value) in keys.iter().zip(values) {
            frame.insert(read_string(*key), *value);
        }
    }

    let handle = &*handle;
    let packed = handle.engine.process(mode, &frame);
    write_array(&packed, out, capacity.max(0) as usize) as i32
}

// ============================================================================
// Mappings
// ============================================================================

/// Serialize the bridge's mapping table as a JSON document.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `vcam_bridge_new`.
/// - Returns a newly allocated string that must be freed with `vcam_free_string`.
/// - Returns NULL on error; call `vcam_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_mappings_json(handle: *mut VcamBridgeHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null bridge pointer");
        return ptr::null_mut();
    }

    match (*handle).store.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Replace the mapping table from a JSON document.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `vcam_bridge_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_load_mappings_json(
    handle: *mut VcamBridgeHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null bridge pointer");
        return -1;
    }
    let Some(json) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return -1;
    };

    match (*handle).store.load_json(&json) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Restore the default mappings for one tracking mode.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `vcam_bridge_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn vcam_bridge_reset_mappings(handle: *mut VcamBridgeHandle, mode: i32) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null bridge pointer");
        return -1;
    }
    let Some(mode) = mode_from_id(mode) else {
        return -1;
    };
    (*handle).store.reset_to_defaults(mode);
    0
}

// ============================================================================
// Stateless helpers
// ============================================================================

/// Element count of an array channel, or -1 for an unknown channel id.
#[no_mangle]
pub extern "C" fn vcam_array_size(channel: i32) -> i32 {
    ArrayChannel::from_id(channel).map_or(-1, |c| c.array_size() as i32)
}

/// Normalize `raw` against `[range_min, range_max]` onto `[-1, 1]`.
#[no_mangle]
pub extern "C" fn vcam_scale_value(range_min: f32, range_max: f32, raw: f32) -> f32 {
    TrackingKey::new("", range_min..=range_max).scale_value(raw)
}

/// Default mapping entries for a tracking mode as a JSON array.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `vcam_free_string`.
/// - Returns NULL on error; call `vcam_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn vcam_default_mappings_json(mode: i32) -> *mut c_char {
    clear_last_error();

    let Some(mode) = mode_from_id(mode) else {
        return ptr::null_mut();
    };
    match serde_json::to_string(&TrackingCatalog::default().default_mappings(mode)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `vcam_*` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `vcam_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn vcam_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `vcam_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn vcam_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn vcam_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
