//! Dynamic function calling
//!
//! A prepared libffi call interface bound to a native address.

use libffi::middle::{arg, Arg, Cif, CodePtr};
use smallvec::SmallVec;
use thiserror::Error;

use super::abi::CallingConvention;
use super::stats;
use super::types::{FfiType, FfiValue};
use crate::introspect::NativeAddress;
use crate::logging::trace;

/// Compiled native call signature
pub struct NativeSignature {
    cif: Cif,
    address: NativeAddress,
    convention: CallingConvention,
    return_type: FfiType,
    arg_types: Vec<FfiType>,
}

// The prepared cif is never mutated after construction and only read during calls.
unsafe impl Send for NativeSignature {}
unsafe impl Sync for NativeSignature {}

impl NativeSignature {
    /// Prepare a call interface for `arg_types` returning `return_type`
    pub fn new(
        address: NativeAddress,
        convention: CallingConvention,
        return_type: FfiType,
        arg_types: Vec<FfiType>,
    ) -> Self {
        let mut cif = Cif::new(
            arg_types.iter().map(|ty| ty.to_libffi()).collect::<Vec<_>>(),
            return_type.to_libffi(),
        );
        cif.set_abi(convention.abi());

        Self {
            cif,
            address,
            convention,
            return_type,
            arg_types,
        }
    }

    #[inline]
    pub fn address(&self) -> NativeAddress {
        self.address
    }

    #[inline]
    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    #[inline]
    pub fn return_type(&self) -> FfiType {
        self.return_type
    }

    #[inline]
    pub fn arg_types(&self) -> &[FfiType] {
        &self.arg_types
    }

    /// Call the bound function with one slot per declared argument
    ///
    /// # Safety
    /// Caller must ensure:
    /// - The bound address is a function with this exact signature
    /// - Every slot holds a valid value of its declared type, and every
    ///   pointer slot stays valid for the duration of the call
    pub unsafe fn call(&self, slots: &[FfiValue]) -> Result<FfiValue, CallError> {
        if slots.len() != self.arg_types.len() {
            return Err(CallError::ArgCountMismatch {
                expected: self.arg_types.len(),
                got: slots.len(),
            });
        }
        if self.address.is_null() {
            return Err(CallError::NullAddress);
        }

        let args: SmallVec<[Arg; 8]> = slots.iter().map(arg).collect();
        let code = CodePtr::from_ptr(self.address.as_ptr().cast());

        trace!(event = "ffi_call", address = ?self.address, args = slots.len());
        stats::record_call();

        if self.return_type == FfiType::Void {
            self.cif.call::<()>(code, &args);
            return Ok(FfiValue::zeroed());
        }
        let ret = self.cif.call::<FfiValue>(code, &args);
        Ok(ret.narrowed(self.return_type))
    }
}

impl core::fmt::Debug for NativeSignature {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeSignature")
            .field("address", &self.address)
            .field("convention", &self.convention)
            .field("return_type", &self.return_type)
            .field("arg_types", &self.arg_types)
            .finish()
    }
}

/// Function call errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("Expected {expected} arguments, got {got}")]
    ArgCountMismatch { expected: usize, got: usize },
    #[error("Native entry point is null")]
    NullAddress,
}
