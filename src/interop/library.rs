//! Dynamic library loading and symbol resolution
//!
//! Platform-agnostic wrapper around dlopen/LoadLibrary, used to resolve the
//! entry points of functions described by symbol name.

use core::ffi::c_void;
use core::ptr::NonNull;
use std::ffi::CString;

use thiserror::Error;

use super::stats;
use crate::introspect::NativeAddress;
use crate::logging::{debug, info};

/// Handle to dynamically loaded library
pub struct Library {
    handle: NonNull<c_void>,
    name: String,
}

impl Library {
    /// Load library by name
    ///
    /// Searches standard library paths. Use `load_path` for absolute paths.
    pub fn load(name: &str) -> Result<Self, LoadError> {
        Self::load_impl(name)
    }

    /// Load library from absolute path
    pub fn load_path(path: &std::path::Path) -> Result<Self, LoadError> {
        let name = path.to_str().ok_or(LoadError::InvalidName)?;
        Self::load_impl(name)
    }

    #[cfg(unix)]
    fn load_impl(name: &str) -> Result<Self, LoadError> {
        let cname = CString::new(name).map_err(|_| LoadError::InvalidName)?;

        unsafe {
            let handle = libc::dlopen(cname.as_ptr(), libc::RTLD_NOW);
            match NonNull::new(handle) {
                Some(handle) => {
                    stats::record_library_loaded();
                    info!(library = name, "Library loaded");
                    Ok(Self { handle, name: name.to_string() })
                }
                None => {
                    let err = libc::dlerror();
                    let msg = if !err.is_null() {
                        std::ffi::CStr::from_ptr(err)
                            .to_string_lossy()
                            .into_owned()
                    } else {
                        "Unknown error".into()
                    };
                    Err(LoadError::LoadFailed(msg))
                }
            }
        }
    }

    #[cfg(windows)]
    fn load_impl(name: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        extern "system" {
            fn LoadLibraryW(filename: *const u16) -> *mut c_void;
            fn GetLastError() -> u32;
        }

        let wide: Vec<u16> = OsStr::new(name)
            .encode_wide()
            .chain(Some(0))
            .collect();

        unsafe {
            let handle = LoadLibraryW(wide.as_ptr());
            match NonNull::new(handle) {
                Some(handle) => {
                    stats::record_library_loaded();
                    info!(library = name, "Library loaded");
                    Ok(Self { handle, name: name.to_string() })
                }
                None => Err(LoadError::LoadFailed(format!("Error code: {}", GetLastError()))),
            }
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get function address by symbol name
    pub fn symbol(&self, name: &str) -> Result<NativeAddress, SymbolError> {
        let address = self.symbol_impl(name)?;
        debug!(library = %self.name, symbol = name, address = ?address, "Symbol resolved");
        Ok(address)
    }

    #[cfg(unix)]
    fn symbol_impl(&self, name: &str) -> Result<NativeAddress, SymbolError> {
        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;

        unsafe {
            let ptr = libc::dlsym(self.handle.as_ptr(), cname.as_ptr());
            if ptr.is_null() {
                Err(SymbolError::NotFound(name.to_string()))
            } else {
                Ok(NativeAddress::from_ptr(ptr as *const ()))
            }
        }
    }

    #[cfg(windows)]
    fn symbol_impl(&self, name: &str) -> Result<NativeAddress, SymbolError> {
        extern "system" {
            fn GetProcAddress(module: *mut c_void, name: *const u8) -> *mut c_void;
        }

        let cname = CString::new(name).map_err(|_| SymbolError::InvalidName)?;

        unsafe {
            let ptr = GetProcAddress(self.handle.as_ptr(), cname.as_ptr() as *const u8);
            if ptr.is_null() {
                Err(SymbolError::NotFound(name.to_string()))
            } else {
                Ok(NativeAddress::from_ptr(ptr as *const ()))
            }
        }
    }
}

impl Drop for Library {
    #[cfg(unix)]
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle.as_ptr());
        }
    }

    #[cfg(windows)]
    fn drop(&mut self) {
        extern "system" {
            fn FreeLibrary(module: *mut c_void) -> i32;
        }
        unsafe {
            FreeLibrary(self.handle.as_ptr());
        }
    }
}

impl core::fmt::Debug for Library {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Library").field("name", &self.name).finish_non_exhaustive()
    }
}

unsafe impl Send for Library {}
unsafe impl Sync for Library {}

/// Library loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid library name")]
    InvalidName,
    #[error("Failed to load library: {0}")]
    LoadFailed(String),
}

/// Symbol lookup errors
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error("Invalid symbol name")]
    InvalidName,
    #[error("Symbol not found: {0}")]
    NotFound(String),
}
