//! Type descriptors
//!
//! The in-memory shape of introspection type metadata: what a parameter or
//! return value is, and how arrays find their length.

use std::sync::Arc;

use super::callable::CallableInfo;
use crate::interop::FfiType;

/// Parameter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Supplied by the caller
    #[default]
    In,
    /// Written by the callee
    Out,
    /// Supplied by the caller, overwritten by the callee
    InOut,
}

impl Direction {
    /// Caller supplies a value
    #[inline]
    pub const fn is_in(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Callee produces a value
    #[inline]
    pub const fn is_out(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// Ownership transfer across the native boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transfer {
    /// Ownership stays where it was
    #[default]
    Nothing,
    /// Only the container changes hands, not its elements
    Container,
    /// The container and every element change hands
    Everything,
}

/// How long a callback trampoline must stay callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeType {
    /// Valid for the duration of one native call
    #[default]
    Call,
    /// Valid until native code invokes the destroy notifier
    Durable,
}

/// Layout of a structured (boxed) type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructInfo {
    pub namespace: String,
    pub name: String,
    pub size: usize,
    pub align: usize,
}

impl StructInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, size: usize, align: usize) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            size,
            align,
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// Where an array's element count comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    /// Carried by another parameter of the same callable
    Parameter(usize),
    /// Terminated by a zeroed element
    ZeroTerminated,
    /// Known statically
    Fixed(usize),
}

/// C array of elements
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInfo {
    pub element: Box<TypeInfo>,
    pub length: ArrayLength,
}

impl ArrayInfo {
    /// Index of the parameter holding the length, if linked
    #[inline]
    pub fn length_index(&self) -> Option<usize> {
        match self.length {
            ArrayLength::Parameter(index) => Some(index),
            _ => None,
        }
    }

    #[inline]
    pub fn is_zero_terminated(&self) -> bool {
        matches!(self.length, ArrayLength::ZeroTerminated)
    }
}

/// Runtime type descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInfo {
    Void,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    /// NUL-terminated UTF-8 string
    Utf8,
    /// Opaque pointer
    Pointer,
    Array(ArrayInfo),
    /// Pointer to a boxed structure
    Struct(Arc<StructInfo>),
    /// Function pointer to a trampoline with the given signature
    Callback(Arc<CallableInfo>),
    /// Marker type of destroy-notification parameters; never caller-visible
    DestroyNotify,
}

impl TypeInfo {
    /// Array linked to a length parameter
    pub fn array_with_length(element: TypeInfo, length_index: usize) -> Self {
        Self::Array(ArrayInfo {
            element: Box::new(element),
            length: ArrayLength::Parameter(length_index),
        })
    }

    /// Array terminated by a zeroed element
    pub fn zero_terminated_array(element: TypeInfo) -> Self {
        Self::Array(ArrayInfo {
            element: Box::new(element),
            length: ArrayLength::ZeroTerminated,
        })
    }

    /// Array with a static element count
    pub fn fixed_array(element: TypeInfo, size: usize) -> Self {
        Self::Array(ArrayInfo {
            element: Box::new(element),
            length: ArrayLength::Fixed(size),
        })
    }

    pub fn structure(info: StructInfo) -> Self {
        Self::Struct(Arc::new(info))
    }

    pub fn callback(info: CallableInfo) -> Self {
        Self::Callback(Arc::new(info))
    }

    /// Native representation when passed by value
    pub const fn ffi_type(&self) -> FfiType {
        match self {
            Self::Void => FfiType::Void,
            Self::Boolean => FfiType::Bool,
            Self::Int8 => FfiType::I8,
            Self::UInt8 => FfiType::U8,
            Self::Int16 => FfiType::I16,
            Self::UInt16 => FfiType::U16,
            Self::Int32 => FfiType::I32,
            Self::UInt32 => FfiType::U32,
            Self::Int64 => FfiType::I64,
            Self::UInt64 => FfiType::U64,
            Self::Float => FfiType::F32,
            Self::Double => FfiType::F64,
            Self::Utf8 => FfiType::String,
            Self::Pointer
            | Self::Array(_)
            | Self::Struct(_)
            | Self::Callback(_)
            | Self::DestroyNotify => FfiType::Pointer,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Integer types usable as an array length
    #[inline]
    pub fn is_integral(&self) -> bool {
        self.ffi_type().is_integral()
    }

    /// The value may be represented by a null pointer
    #[inline]
    pub fn is_pointer_like(&self) -> bool {
        matches!(self.ffi_type(), FfiType::Pointer | FfiType::String)
    }

    pub fn as_array(&self) -> Option<&ArrayInfo> {
        match self {
            Self::Array(info) => Some(info),
            _ => None,
        }
    }
}
