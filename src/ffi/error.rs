//! Reported errors - C API for native failure reporting
//!
//! Natives that can fail receive a trailing `ReportedError **` argument and
//! store an error created with `dyninvoke_error_new` into it.

use core::ffi::{c_char, CStr};
use std::ffi::CString;

use crate::error::NativeFailure;
use crate::logging::trace;

/// Error record written by native code into the failure slot
#[repr(C)]
#[derive(Debug)]
pub struct ReportedError {
    pub domain: u32,
    pub code: i32,
    /// NUL-terminated, owned by the record
    pub message: *mut c_char,
}

/// Create an error record
///
/// # Safety
/// - `message` may be null; otherwise it must be a NUL-terminated string
/// - The record must be released with `dyninvoke_error_free` or handed to
///   the engine through a failure slot
#[no_mangle]
pub unsafe extern "C" fn dyninvoke_error_new(domain: u32, code: i32, message: *const c_char) -> *mut ReportedError {
    let message = if message.is_null() {
        CString::default()
    } else {
        CStr::from_ptr(message).to_owned()
    };

    trace!(event = "error_new", domain = domain, code = code);
    Box::into_raw(Box::new(ReportedError {
        domain,
        code,
        message: message.into_raw(),
    }))
}

/// Release an error record
///
/// # Safety
/// - Null-safe (no-op for null pointers)
/// - `error` must come from `dyninvoke_error_new` and not be freed twice
#[no_mangle]
pub unsafe extern "C" fn dyninvoke_error_free(error: *mut ReportedError) {
    if error.is_null() {
        return;
    }

    let record = Box::from_raw(error);
    if !record.message.is_null() {
        drop(CString::from_raw(record.message));
    }
}

/// Convert an error record into a caller-facing failure and release it
///
/// # Safety
/// `error` must be non-null and come from `dyninvoke_error_new`
pub(crate) unsafe fn take_reported(error: *mut ReportedError) -> NativeFailure {
    let record = &*error;
    let failure = NativeFailure {
        domain: record.domain,
        code: record.code,
        message: if record.message.is_null() {
            String::new()
        } else {
            CStr::from_ptr(record.message).to_string_lossy().into_owned()
        },
    };
    dyninvoke_error_free(error);
    failure
}
