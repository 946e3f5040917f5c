//! C FFI - Stable ABI for native code called through the engine
//!
//! Design:
//! 1. Engine lifecycle (init, cleanup)
//! 2. Failure reporting records (new, free)
//! 3. Destroy notification for durable callbacks

mod error;

pub use error::{dyninvoke_error_free, dyninvoke_error_new, ReportedError};
pub(crate) use error::take_reported;

use core::ffi::c_void;

use crate::logging::debug;

/// Initialize the engine (logging from the environment)
#[no_mangle]
pub extern "C" fn dyninvoke_init() {
    crate::init();
}

/// Drop cached plans and durable callbacks
#[no_mangle]
pub extern "C" fn dyninvoke_cleanup() {
    debug!("Cleaning up through C API");
    crate::cleanup();
}

/// Destroy notifier passed to natives alongside durable callback tokens
///
/// Signature matches `void (*)(void *)`. Unknown or null tokens are ignored.
#[no_mangle]
pub extern "C" fn dyninvoke_callback_destroy_notify(token: *mut c_void) {
    crate::invoke::callback_destroy_notify(token);
}
