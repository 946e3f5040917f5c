//! Type marshaling - caller value ↔ native slot conversions
//!
//! Strings and arrays handed to native code are copied onto the C heap so the
//! callee may take ownership of them; everything the engine allocates here is
//! counted in [`stats`](super::stats) and released through [`free_argument`].

use core::ffi::{c_char, c_void, CStr};

use thiserror::Error;

use super::boxed::{Boxed, BoxedAllocation};
use super::stats;
use super::types::{FfiType, FfiValue};
use crate::introspect::{ArrayInfo, ArrayLength, Direction, Transfer, TypeInfo};
use crate::logging::{log_allocation, log_deallocation, trace};
use crate::value::Value;

/// Value conversion errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MarshalError {
    #[error("Expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: &'static str },
    #[error("Value {value} is out of range for {ty}")]
    OutOfRange { value: String, ty: String },
    #[error("Null is not allowed for {0}")]
    UnexpectedNull(String),
    #[error("String contains an interior NUL byte")]
    InteriorNul,
    #[error("Cannot convert {0} values")]
    Unsupported(String),
    #[error("Array length is unknown")]
    UnknownLength,
    #[error("Failed to allocate {0} bytes")]
    AllocationFailed(usize),
}

impl MarshalError {
    /// The caller supplied a value of the wrong shape
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch { .. } | Self::OutOfRange { .. } | Self::UnexpectedNull(_) | Self::InteriorNul
        )
    }
}

/// Who allocated a native value being released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Built by this engine from a caller value
    Engine,
    /// Produced by native code
    Native,
}

/// How much of a value to release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseDepth {
    None,
    /// Only the container, elements belong elsewhere
    Container,
    /// Only the elements, the container belongs elsewhere
    Elements,
    Full,
}

impl ReleaseDepth {
    /// Depth for a value crossing in `direction` with `transfer`
    ///
    /// IN values were made by the engine: whatever the callee did not take is
    /// ours to free. OUT values and returns were made by the callee: whatever
    /// it handed over is ours to free.
    pub const fn for_transfer(direction: Direction, transfer: Transfer) -> Self {
        match (direction, transfer) {
            (Direction::In, Transfer::Nothing) => Self::Full,
            (Direction::In, Transfer::Container) => Self::Elements,
            (Direction::In, Transfer::Everything) => Self::None,
            (_, Transfer::Nothing) => Self::None,
            (_, Transfer::Container) => Self::Container,
            (_, Transfer::Everything) => Self::Full,
        }
    }

    /// Depth applied to a value that is not a container
    const fn scalar(self) -> bool {
        matches!(self, Self::Container | Self::Full)
    }
}

/// Human-readable type name for error messages
pub fn type_name(ty: &TypeInfo) -> String {
    match ty {
        TypeInfo::Void => "void".into(),
        TypeInfo::Boolean => "boolean".into(),
        TypeInfo::Int8 => "int8".into(),
        TypeInfo::UInt8 => "uint8".into(),
        TypeInfo::Int16 => "int16".into(),
        TypeInfo::UInt16 => "uint16".into(),
        TypeInfo::Int32 => "int32".into(),
        TypeInfo::UInt32 => "uint32".into(),
        TypeInfo::Int64 => "int64".into(),
        TypeInfo::UInt64 => "uint64".into(),
        TypeInfo::Float => "float".into(),
        TypeInfo::Double => "double".into(),
        TypeInfo::Utf8 => "string".into(),
        TypeInfo::Pointer => "pointer".into(),
        TypeInfo::Array(info) => format!("array of {}", type_name(&info.element)),
        TypeInfo::Struct(info) => info.qualified_name(),
        TypeInfo::Callback(info) => format!("callback {}", info.qualified_name()),
        TypeInfo::DestroyNotify => "destroy notify".into(),
    }
}

/// Check whether `value` converts to `ty` without doing any native work
pub fn can_convert(value: &Value, ty: &TypeInfo, may_be_null: bool) -> bool {
    if value.is_nullish() {
        return match ty {
            TypeInfo::Void => true,
            ty if ty.is_pointer_like() => may_be_null,
            _ => false,
        };
    }

    match ty {
        TypeInfo::Void => true,
        TypeInfo::Boolean => matches!(value, Value::Bool(_)),
        TypeInfo::Float | TypeInfo::Double => {
            matches!(value, Value::Float(_) | Value::Int(_) | Value::UInt(_))
        }
        TypeInfo::Utf8 => matches!(value, Value::String(s) if !s.contains('\0')),
        TypeInfo::Pointer => matches!(value, Value::Pointer(_) | Value::Boxed(_)),
        TypeInfo::Struct(info) => matches!(value, Value::Boxed(b) if **b.info() == **info),
        TypeInfo::Callback(_) => matches!(value, Value::Function(_)),
        TypeInfo::Array(info) => match value {
            Value::Array(items) => items.iter().all(|item| can_convert(item, &info.element, false)),
            _ => false,
        },
        TypeInfo::DestroyNotify => false,
        ty => integer(value).is_some_and(|v| in_range(v, ty.ffi_type())),
    }
}

/// Convert a caller value into a native slot of type `ty`
///
/// Pointer-like results that the engine allocated must eventually be passed
/// to [`free_argument`] with [`Origin::Engine`].
pub fn to_native(value: &Value, ty: &TypeInfo, may_be_null: bool) -> Result<FfiValue, MarshalError> {
    let result = match ty {
        TypeInfo::Array(info) => array_to_native(value, info, may_be_null).map(|(slot, _)| slot),
        _ => convert_in(value, ty, may_be_null),
    };
    if result.is_err() {
        stats::record_marshaling_error();
    }
    result
}

fn convert_in(value: &Value, ty: &TypeInfo, may_be_null: bool) -> Result<FfiValue, MarshalError> {
    if value.is_nullish() && !ty.is_void() {
        if ty.is_pointer_like() && may_be_null {
            return Ok(FfiValue::null());
        }
        return Err(if ty.is_pointer_like() {
            MarshalError::UnexpectedNull(type_name(ty))
        } else {
            mismatch(ty, value)
        });
    }

    match ty {
        TypeInfo::Void => Ok(FfiValue::zeroed()),
        TypeInfo::Boolean => match value {
            Value::Bool(b) => Ok(FfiValue { boolean: *b as u8 }),
            _ => Err(mismatch(ty, value)),
        },
        TypeInfo::Float | TypeInfo::Double => {
            let v = match value {
                Value::Float(v) => *v,
                Value::Int(v) => *v as f64,
                Value::UInt(v) => *v as f64,
                _ => return Err(mismatch(ty, value)),
            };
            Ok(if matches!(ty, TypeInfo::Float) {
                FfiValue { f32: v as f32 }
            } else {
                FfiValue { f64: v }
            })
        }
        TypeInfo::Utf8 => match value {
            Value::String(s) => string_to_native(s),
            _ => Err(mismatch(ty, value)),
        },
        TypeInfo::Pointer => match value {
            Value::Pointer(addr) => Ok(FfiValue::from_ptr(*addr as *mut c_void)),
            Value::Boxed(b) => Ok(FfiValue::from_ptr(b.as_ptr())),
            _ => Err(mismatch(ty, value)),
        },
        TypeInfo::Struct(info) => match value {
            Value::Boxed(b) if **b.info() == **info => Ok(FfiValue::from_ptr(b.as_ptr())),
            _ => Err(mismatch(ty, value)),
        },
        TypeInfo::Array(info) => array_to_native(value, info, may_be_null).map(|(slot, _)| slot),
        TypeInfo::Callback(_) | TypeInfo::DestroyNotify => Err(MarshalError::Unsupported(type_name(ty))),
        ty => {
            let v = integer(value).ok_or_else(|| mismatch(ty, value))?;
            integer_to_native(v, ty)
        }
    }
}

/// Convert a caller array into a C array, returning the slot and its length
pub fn array_to_native(
    value: &Value,
    info: &ArrayInfo,
    may_be_null: bool,
) -> Result<(FfiValue, usize), MarshalError> {
    let items = match value {
        Value::Array(items) => items,
        v if v.is_nullish() && may_be_null => return Ok((FfiValue::null(), 0)),
        v if v.is_nullish() => {
            return Err(MarshalError::UnexpectedNull(type_name(&TypeInfo::Array(info.clone()))))
        }
        v => return Err(mismatch(&TypeInfo::Array(info.clone()), v)),
    };

    let element_ty = info.element.ffi_type();
    let element_size = element_ty.size();
    let capacity = match info.length {
        ArrayLength::ZeroTerminated => items.len() + 1,
        ArrayLength::Fixed(n) => n.max(items.len()),
        ArrayLength::Parameter(_) => items.len(),
    };

    let block = alloc_block(capacity * element_size)?;
    for (i, item) in items.iter().enumerate() {
        match convert_in(item, &info.element, false) {
            Ok(slot) => unsafe { slot.write(element_ty, block.cast::<u8>().add(i * element_size).cast()) },
            Err(err) => {
                let partial = FfiValue::from_ptr(block);
                free_array(partial, info, Some(i), ReleaseDepth::Full, Origin::Engine);
                return Err(err);
            }
        }
    }

    trace!(event = "array_to_native", length = items.len(), element = ?element_ty);
    Ok((FfiValue::from_ptr(block), items.len()))
}

/// Convert a native slot of type `ty` into a caller value
///
/// Structures transferred to the caller are copied into owned boxed memory;
/// the native original is released by the reclaimer.
pub fn from_native(slot: FfiValue, ty: &TypeInfo, transfer: Transfer) -> Result<Value, MarshalError> {
    unsafe {
        Ok(match ty {
            TypeInfo::Void => Value::Undefined,
            TypeInfo::Boolean => Value::Bool(slot.boolean != 0),
            TypeInfo::Int8 => Value::Int(slot.i8 as i64),
            TypeInfo::UInt8 => Value::Int(slot.u8 as i64),
            TypeInfo::Int16 => Value::Int(slot.i16 as i64),
            TypeInfo::UInt16 => Value::Int(slot.u16 as i64),
            TypeInfo::Int32 => Value::Int(slot.i32 as i64),
            TypeInfo::UInt32 => Value::Int(slot.u32 as i64),
            TypeInfo::Int64 => Value::Int(slot.i64),
            TypeInfo::UInt64 => Value::from(slot.u64),
            TypeInfo::Float => Value::Float(slot.f32 as f64),
            TypeInfo::Double => Value::Float(slot.f64),
            _ if slot.as_ptr().is_null() => Value::Null,
            TypeInfo::Utf8 => {
                let s = CStr::from_ptr(slot.as_ptr() as *const c_char);
                Value::String(s.to_string_lossy().into_owned())
            }
            TypeInfo::Pointer | TypeInfo::Callback(_) | TypeInfo::DestroyNotify => {
                Value::Pointer(slot.as_ptr() as usize)
            }
            TypeInfo::Struct(info) => {
                let ptr = core::ptr::NonNull::new_unchecked(slot.as_ptr());
                if transfer == Transfer::Everything {
                    let copy = BoxedAllocation::copy_from(ptr.as_ptr(), info.size)
                        .ok_or(MarshalError::AllocationFailed(info.size))?;
                    Value::Boxed(Boxed::from_allocation(info.clone(), copy))
                } else {
                    Value::Boxed(Boxed::borrowed(info.clone(), ptr))
                }
            }
            TypeInfo::Array(info) => return array_from_native(slot, info, None, transfer),
        })
    }
}

/// Convert a C array into a caller array
///
/// `length` is required for arrays linked to a length parameter and
/// overrides the static length otherwise.
pub fn array_from_native(
    slot: FfiValue,
    info: &ArrayInfo,
    length: Option<usize>,
    transfer: Transfer,
) -> Result<Value, MarshalError> {
    let ptr = slot.as_ptr();
    if ptr.is_null() {
        return Ok(if length == Some(0) { Value::Array(Vec::new()) } else { Value::Null });
    }

    let length = resolve_length(ptr, info, length).ok_or(MarshalError::UnknownLength)?;
    let element_ty = info.element.ffi_type();
    let element_size = element_ty.size();
    let element_transfer = if transfer == Transfer::Everything { Transfer::Everything } else { Transfer::Nothing };

    let mut items = Vec::with_capacity(length);
    for i in 0..length {
        let element = unsafe { FfiValue::read(element_ty, ptr.cast::<u8>().add(i * element_size).cast()) };
        items.push(from_native(element, &info.element, element_transfer)?);
    }
    Ok(Value::Array(items))
}

/// Encode an array length into a slot of the length parameter's type
pub fn length_to_native(length: usize, ty: &TypeInfo) -> Result<FfiValue, MarshalError> {
    integer_to_native(length as i128, ty)
}

/// Decode an array length from a slot of the length parameter's type
pub fn native_to_length(slot: FfiValue, ty: &TypeInfo) -> Result<usize, MarshalError> {
    let value = from_native(slot, ty, Transfer::Nothing)?;
    integer(&value)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| MarshalError::OutOfRange { value: value.to_string(), ty: "array length".into() })
}

/// Release a native value according to `depth`
///
/// Opaque pointers, callbacks and engine-borrowed structures are never
/// released here. A null slot is a no-op.
pub fn free_argument(slot: FfiValue, ty: &TypeInfo, depth: ReleaseDepth, origin: Origin) {
    if slot.as_ptr().is_null() || !ty.is_pointer_like() || depth == ReleaseDepth::None {
        return;
    }

    match ty {
        TypeInfo::Utf8 if depth.scalar() => release_block(slot.as_ptr(), origin),
        TypeInfo::Struct(_) if depth.scalar() && origin == Origin::Native => release_block(slot.as_ptr(), origin),
        TypeInfo::Array(info) => free_array(slot, info, None, depth, origin),
        _ => {}
    }
}

/// Release a C array and, depending on `depth`, its elements
///
/// Without a usable length only the container can be released.
pub fn free_array(slot: FfiValue, info: &ArrayInfo, length: Option<usize>, depth: ReleaseDepth, origin: Origin) {
    let ptr = slot.as_ptr();
    if ptr.is_null() || depth == ReleaseDepth::None {
        return;
    }

    if matches!(depth, ReleaseDepth::Elements | ReleaseDepth::Full) && info.element.is_pointer_like() {
        if let Some(length) = resolve_length(ptr, info, length) {
            let element_ty = info.element.ffi_type();
            let element_size = element_ty.size();
            for i in 0..length {
                let element = unsafe { FfiValue::read(element_ty, ptr.cast::<u8>().add(i * element_size).cast()) };
                free_argument(element, &info.element, ReleaseDepth::Full, origin);
            }
        }
    }

    if matches!(depth, ReleaseDepth::Container | ReleaseDepth::Full) {
        release_block(ptr, origin);
    }
}

fn resolve_length(ptr: *mut c_void, info: &ArrayInfo, length: Option<usize>) -> Option<usize> {
    if let Some(length) = length {
        return Some(length);
    }
    match info.length {
        ArrayLength::Fixed(n) => Some(n),
        ArrayLength::ZeroTerminated => Some(unsafe { zero_terminated_length(ptr, info.element.ffi_type().size()) }),
        ArrayLength::Parameter(_) => None,
    }
}

/// Count elements before the first all-zero element
unsafe fn zero_terminated_length(ptr: *mut c_void, element_size: usize) -> usize {
    let base = ptr.cast::<u8>();
    let mut count = 0;
    loop {
        let element = core::slice::from_raw_parts(base.add(count * element_size), element_size.max(1));
        if element.iter().all(|b| *b == 0) {
            return count;
        }
        count += 1;
    }
}

fn string_to_native(s: &str) -> Result<FfiValue, MarshalError> {
    if s.contains('\0') {
        return Err(MarshalError::InteriorNul);
    }
    let block = alloc_block(s.len() + 1)?;
    unsafe { core::ptr::copy_nonoverlapping(s.as_ptr(), block.cast::<u8>(), s.len()) };
    Ok(FfiValue::from_ptr(block))
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Int(v) => Some(*v as i128),
        Value::UInt(v) => Some(*v as i128),
        _ => None,
    }
}

fn in_range(v: i128, ty: FfiType) -> bool {
    let (min, max): (i128, i128) = match ty {
        FfiType::I8 => (i8::MIN as i128, i8::MAX as i128),
        FfiType::U8 => (0, u8::MAX as i128),
        FfiType::I16 => (i16::MIN as i128, i16::MAX as i128),
        FfiType::U16 => (0, u16::MAX as i128),
        FfiType::I32 => (i32::MIN as i128, i32::MAX as i128),
        FfiType::U32 => (0, u32::MAX as i128),
        FfiType::I64 => (i64::MIN as i128, i64::MAX as i128),
        FfiType::U64 => (0, u64::MAX as i128),
        _ => return false,
    };
    (min..=max).contains(&v)
}

fn integer_to_native(v: i128, ty: &TypeInfo) -> Result<FfiValue, MarshalError> {
    let ffi_ty = ty.ffi_type();
    if !in_range(v, ffi_ty) {
        return Err(if ffi_ty.is_integral() {
            MarshalError::OutOfRange { value: v.to_string(), ty: type_name(ty) }
        } else {
            MarshalError::TypeMismatch { expected: type_name(ty), got: "integer" }
        });
    }
    Ok(match ffi_ty {
        FfiType::I8 => FfiValue { i8: v as i8 },
        FfiType::U8 => FfiValue { u8: v as u8 },
        FfiType::I16 => FfiValue { i16: v as i16 },
        FfiType::U16 => FfiValue { u16: v as u16 },
        FfiType::I32 => FfiValue { i32: v as i32 },
        FfiType::U32 => FfiValue { u32: v as u32 },
        FfiType::I64 => FfiValue { i64: v as i64 },
        _ => FfiValue { u64: v as u64 },
    })
}

fn mismatch(ty: &TypeInfo, value: &Value) -> MarshalError {
    MarshalError::TypeMismatch { expected: type_name(ty), got: value.kind() }
}

fn alloc_block(size: usize) -> Result<*mut c_void, MarshalError> {
    let ptr = unsafe { libc::calloc(1, size.max(1)) };
    if ptr.is_null() {
        return Err(MarshalError::AllocationFailed(size));
    }
    stats::record_allocation();
    log_allocation(size, ptr as *const u8);
    Ok(ptr)
}

fn release_block(ptr: *mut c_void, origin: Origin) {
    if origin == Origin::Engine {
        stats::record_release();
    }
    log_deallocation(ptr as *const u8);
    unsafe { libc::free(ptr) }
}
