//! ABI (Application Binary Interface) handling
//!
//! Calling convention selection for prepared call signatures.

use libffi::low::{ffi_abi, ffi_abi_FFI_DEFAULT_ABI};

/// Calling convention of a native entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CallingConvention {
    /// C calling convention (platform default)
    #[default]
    C,
}

impl CallingConvention {
    /// libffi ABI identifier
    #[inline]
    pub fn abi(self) -> ffi_abi {
        match self {
            Self::C => ffi_abi_FFI_DEFAULT_ABI,
        }
    }

    /// Convention used by introspected entry points
    #[inline]
    pub const fn platform() -> Self {
        Self::C
    }
}
