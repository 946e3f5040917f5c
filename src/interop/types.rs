//! Native slot representation
//!
//! Defines the scalar type tags and the untagged slot every argument,
//! scratch cell and return value is stored in.

use core::ffi::c_void;
use libffi::middle::Type;

/// FFI-compatible type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FfiType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Pointer,
    String,
}

impl FfiType {
    /// Get size of type in bytes
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Pointer | Self::String => core::mem::size_of::<*const c_void>(),
        }
    }

    /// Get alignment requirement
    #[inline]
    pub const fn align(self) -> usize {
        if self.size() == 0 {
            1
        } else {
            self.size()
        }
    }

    /// Check if type is integral
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64 |
                      Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Check if type is floating point
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// libffi type descriptor
    pub fn to_libffi(self) -> Type {
        match self {
            Self::Void => Type::void(),
            Self::Bool | Self::U8 => Type::u8(),
            Self::I8 => Type::i8(),
            Self::I16 => Type::i16(),
            Self::U16 => Type::u16(),
            Self::I32 => Type::i32(),
            Self::U32 => Type::u32(),
            Self::I64 => Type::i64(),
            Self::U64 => Type::u64(),
            Self::F32 => Type::f32(),
            Self::F64 => Type::f64(),
            Self::Pointer | Self::String => Type::pointer(),
        }
    }
}

/// Native value container (untagged union, one machine word)
#[repr(C)]
pub union FfiValue {
    pub boolean: u8,
    pub i8: i8,
    pub i16: i16,
    pub i32: i32,
    pub i64: i64,
    pub u8: u8,
    pub u16: u16,
    pub u32: u32,
    pub u64: u64,
    pub f32: f32,
    pub f64: f64,
    pub ptr: *mut c_void,
}

impl FfiValue {
    /// All bits zero
    #[inline]
    pub const fn zeroed() -> Self {
        Self { u64: 0 }
    }

    /// Create null pointer
    #[inline]
    pub const fn null() -> Self {
        Self { ptr: core::ptr::null_mut() }
    }

    /// Create from pointer
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        Self { ptr }
    }

    /// Read as pointer
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        // Every bit pattern is a valid pointer value
        unsafe { self.ptr }
    }

    /// Widen to the register-sized value libffi expects for small returns
    pub fn widened(self, ty: FfiType) -> Self {
        unsafe {
            match ty {
                FfiType::Bool | FfiType::U8 => Self { u64: self.u8 as u64 },
                FfiType::I8 => Self { i64: self.i8 as i64 },
                FfiType::I16 => Self { i64: self.i16 as i64 },
                FfiType::U16 => Self { u64: self.u16 as u64 },
                FfiType::I32 => Self { i64: self.i32 as i64 },
                FfiType::U32 => Self { u64: self.u32 as u64 },
                _ => self,
            }
        }
    }

    /// Recover a `ty` value from a register-sized return
    pub fn narrowed(self, ty: FfiType) -> Self {
        unsafe {
            match ty {
                FfiType::Bool | FfiType::U8 => Self { u8: self.u64 as u8 },
                FfiType::I8 => Self { i8: self.u64 as i8 },
                FfiType::I16 => Self { i16: self.u64 as i16 },
                FfiType::U16 => Self { u16: self.u64 as u16 },
                FfiType::I32 => Self { i32: self.u64 as i32 },
                FfiType::U32 => Self { u32: self.u64 as u32 },
                _ => self,
            }
        }
    }

    /// Load a value of `ty` from native memory
    ///
    /// # Safety
    /// `src` must point to a readable, initialized value of `ty`
    pub unsafe fn read(ty: FfiType, src: *const c_void) -> Self {
        let mut value = Self::zeroed();
        match ty {
            FfiType::Void => {}
            FfiType::Bool | FfiType::U8 => value.u8 = src.cast::<u8>().read_unaligned(),
            FfiType::I8 => value.i8 = src.cast::<i8>().read_unaligned(),
            FfiType::I16 => value.i16 = src.cast::<i16>().read_unaligned(),
            FfiType::U16 => value.u16 = src.cast::<u16>().read_unaligned(),
            FfiType::I32 => value.i32 = src.cast::<i32>().read_unaligned(),
            FfiType::U32 => value.u32 = src.cast::<u32>().read_unaligned(),
            FfiType::I64 => value.i64 = src.cast::<i64>().read_unaligned(),
            FfiType::U64 => value.u64 = src.cast::<u64>().read_unaligned(),
            FfiType::F32 => value.f32 = src.cast::<f32>().read_unaligned(),
            FfiType::F64 => value.f64 = src.cast::<f64>().read_unaligned(),
            FfiType::Pointer | FfiType::String => {
                value.ptr = src.cast::<*mut c_void>().read_unaligned()
            }
        }
        value
    }

    /// Store the `ty`-sized prefix of this value into native memory
    ///
    /// # Safety
    /// `dst` must point to writable memory of at least `ty.size()` bytes
    pub unsafe fn write(self, ty: FfiType, dst: *mut c_void) {
        match ty {
            FfiType::Void => {}
            FfiType::Bool | FfiType::U8 => dst.cast::<u8>().write_unaligned(self.u8),
            FfiType::I8 => dst.cast::<i8>().write_unaligned(self.i8),
            FfiType::I16 => dst.cast::<i16>().write_unaligned(self.i16),
            FfiType::U16 => dst.cast::<u16>().write_unaligned(self.u16),
            FfiType::I32 => dst.cast::<i32>().write_unaligned(self.i32),
            FfiType::U32 => dst.cast::<u32>().write_unaligned(self.u32),
            FfiType::I64 => dst.cast::<i64>().write_unaligned(self.i64),
            FfiType::U64 => dst.cast::<u64>().write_unaligned(self.u64),
            FfiType::F32 => dst.cast::<f32>().write_unaligned(self.f32),
            FfiType::F64 => dst.cast::<f64>().write_unaligned(self.f64),
            FfiType::Pointer | FfiType::String => {
                dst.cast::<*mut c_void>().write_unaligned(self.ptr)
            }
        }
    }
}

impl Default for FfiValue {
    #[inline]
    fn default() -> Self {
        Self::zeroed()
    }
}

// Manual implementations for Copy, Clone, and Debug since union doesn't auto-derive
impl Copy for FfiValue {}
impl Clone for FfiValue {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl core::fmt::Debug for FfiValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FfiValue({:#018x})", unsafe { self.u64 })
    }
}
