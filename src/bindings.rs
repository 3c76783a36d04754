//! C Bindings for Mirrorbuf
//!
//! Lets a C-based script host extension drive a bridge from its own event
//! loop: create it, set host paths, refresh on a timer, and hand published
//! bytes to its runtime.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::PathBuf;
use std::ptr;
use std::slice;

// Opaque handle
pub struct MirrorBridgeHandle(Bridge);

unsafe fn opt_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok().filter(|s| !s.is_empty())
}

unsafe fn opt_path(s: *const c_char) -> Option<PathBuf> {
    opt_str(s).map(PathBuf::from)
}

/// Copy `src` into `buf` (up to `max_len`). Returns the full length of `src`.
unsafe fn copy_out(src: &[u8], buf: *mut u8, max_len: usize) -> usize {
    if !buf.is_null() {
        let n = src.len().min(max_len);
        ptr::copy_nonoverlapping(src.as_ptr(), buf, n);
    }
    src.len()
}

/// Create a bridge
///
/// Null paths fall back to the `MIRRORBUF_*` environment variables.
///
/// # Safety
/// Non-null paths must be valid null-terminated strings
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_create(
    registry_path: *const c_char,
    direct_path: *const c_char,
) -> *mut MirrorBridgeHandle {
    let mut config = BridgeConfig::from_env();
    if let Some(path) = opt_path(registry_path) {
        config.registry_path = Some(path);
    }
    if let Some(path) = opt_path(direct_path) {
        config.direct_path = Some(path);
    }
    Box::into_raw(Box::new(MirrorBridgeHandle(Bridge::new(config))))
}

/// Destroy a bridge handle
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_destroy(handle: *mut MirrorBridgeHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Set (or clear, with null) the host-provided registry path
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_set_registry_path(
    handle: *mut MirrorBridgeHandle,
    path: *const c_char,
) {
    if let Some(h) = handle.as_mut() {
        h.0.state_mut().set_registry_path(opt_path(path));
    }
}

/// Set (or clear, with null) the host-provided direct buffer path
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_set_direct_path(
    handle: *mut MirrorBridgeHandle,
    path: *const c_char,
) {
    if let Some(h) = handle.as_mut() {
        h.0.state_mut().set_direct_path(opt_path(path));
    }
}

/// Run one reconciliation pass
///
/// Returns false if the registry could not be read.
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_refresh(handle: *mut MirrorBridgeHandle) -> bool {
    match handle.as_mut() {
        Some(h) => h.0.refresh().is_ok(),
        None => false,
    }
}

/// Get the published bytes (header included) for `name`, or "state" if null
///
/// Returns null if nothing is published. The pointer stays valid until the
/// next refresh that republishes this name with a new allocation.
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_shared_buffer(
    handle: *mut MirrorBridgeHandle,
    name: *const c_char,
    out_len: *mut usize,
) -> *const u8 {
    let Some(h) = handle.as_ref() else {
        return ptr::null();
    };
    match h.0.shared_buffer(opt_str(name)) {
        Some(buf) => {
            if !out_len.is_null() {
                *out_len = buf.len();
            }
            buf.as_ptr()
        }
        None => ptr::null(),
    }
}

/// List published names, newline separated, into `buf`
///
/// Returns the full length needed.
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_list_buffers(
    handle: *mut MirrorBridgeHandle,
    buf: *mut u8,
    max_len: usize,
) -> usize {
    match handle.as_ref() {
        Some(h) => copy_out(h.0.list_buffers().join("\n").as_bytes(), buf, max_len),
        None => 0,
    }
}

/// Write debug info as JSON (`{"has":..,"keys":[..]}`) into `buf`
///
/// Returns the full length needed.
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_debug_json(
    handle: *mut MirrorBridgeHandle,
    buf: *mut u8,
    max_len: usize,
) -> usize {
    let Some(h) = handle.as_ref() else {
        return 0;
    };
    match serde_json::to_vec(&h.0.debug_info()) {
        Ok(json) => copy_out(&json, buf, max_len),
        Err(_) => 0,
    }
}

/// Write the manifest as JSON (`{"version":..,"buffers":{..},"revision":..}`)
/// into `buf`
///
/// Returns the full length needed, or 0 before the first refresh.
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_manifest_json(
    handle: *mut MirrorBridgeHandle,
    buf: *mut u8,
    max_len: usize,
) -> usize {
    let Some(info) = handle.as_ref().and_then(|h| h.0.manifest()) else {
        return 0;
    };
    match serde_json::to_vec(&info) {
        Ok(json) => copy_out(&json, buf, max_len),
        Err(_) => 0,
    }
}

/// Write `len` bytes to the buffer registered as `name`
#[no_mangle]
pub unsafe extern "C" fn mirrorbuf_bridge_write(
    handle: *mut MirrorBridgeHandle,
    name: *const c_char,
    data: *const u8,
    len: usize,
) -> bool {
    let Some(h) = handle.as_ref() else {
        return false;
    };
    let Some(name) = opt_str(name) else {
        return false;
    };
    if data.is_null() || len == 0 {
        return false;
    }
    let slice = slice::from_raw_parts(data, len);
    h.0.write(name, slice).is_ok()
}
