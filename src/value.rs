//! Caller-side values
//!
//! The dynamically-typed values a host runtime exchanges with the engine,
//! and the callable type used both for host functions and for functions
//! built by the engine itself.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::InvokeError;
use crate::interop::Boxed;

/// Host function signature
pub type HostFn = dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync;

/// Reference-counted callable
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    inner: Arc<HostFn>,
}

impl Callable {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self::named("<anonymous>", f)
    }

    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            inner: Arc::new(f),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke synchronously
    #[inline]
    pub fn call(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.inner)(args)
    }

    /// Handle that does not keep the callable alive
    pub fn downgrade(&self) -> WeakCallable {
        WeakCallable(Arc::downgrade(&self.inner))
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// Non-owning callable handle
#[derive(Clone)]
pub struct WeakCallable(Weak<HostFn>);

impl WeakCallable {
    /// The callable is still reachable
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Dynamically-typed caller value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// No value
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integers above `i64::MAX`
    UInt(u64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Boxed(Boxed),
    /// Opaque native address
    Pointer(usize),
    Function(Callable),
}

impl Value {
    /// Null or undefined
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Boxed(_) => "boxed",
            Self::Pointer(_) => "pointer",
            Self::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Boxed(a), Self::Boxed(b)) => a == b,
            (Self::Pointer(a), Self::Pointer(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Detail string used in type errors
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::UInt(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(s) => write!(f, "{}", s),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Boxed(b) => write!(f, "[boxed {}]", b.info().qualified_name()),
            Self::Pointer(p) => write!(f, "{:#x}", p),
            Self::Function(c) => write!(f, "function {}()", c.name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Self::Int).unwrap_or(Self::UInt(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<Callable> for Value {
    fn from(v: Callable) -> Self {
        Self::Function(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_conversion_prefers_int() {
        assert_eq!(Value::from(7u64), Value::Int(7));
        assert_eq!(Value::from(u64::MAX), Value::UInt(u64::MAX));
    }

    #[test]
    fn test_weak_callable_dies_with_last_owner() {
        let callable = Callable::new(|_| Ok(Value::Undefined));
        let weak = callable.downgrade();
        assert!(weak.is_alive());
        drop(callable);
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_display_detail() {
        let v = Value::Array(vec![Value::Int(1), Value::from("a"), Value::Null]);
        assert_eq!(v.to_string(), "[1,a,null]");
    }
}
