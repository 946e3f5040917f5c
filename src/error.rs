//! Invocation errors

use std::fmt;

use thiserror::Error;

use crate::interop::{CallError, MarshalError, SymbolError};

/// Failure reported by native code through its error out-slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeFailure {
    pub domain: u32,
    pub code: i32,
    pub message: String,
}

impl fmt::Display for NativeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (domain {}, code {})", self.message, self.domain, self.code)
    }
}

/// Errors surfaced to the caller of a native function
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvokeError {
    #[error("Not enough arguments; expected {expected}, have {actual}")]
    NotEnoughArguments { expected: usize, actual: usize },

    #[error("Expected argument of type {expected} for parameter {param}, got '{value}'")]
    InvalidArgumentType {
        param: String,
        expected: String,
        value: String,
    },

    #[error("Callback {namespace}.{name} has a destroy notifier but no closure argument, not supported")]
    UnsupportedCallback { namespace: String, name: String },

    #[error("Callback parameter {param} refers to argument {index}, which it can't use")]
    MisplacedCallbackArgument { param: String, index: usize },

    #[error("{0}")]
    NativeReported(NativeFailure),

    #[error("Couldn't create virtual function '{name}': {reason}")]
    VirtualFunctionResolution { name: String, reason: String },

    #[error("Method {0} called without a receiver")]
    MissingReceiver(String),

    #[error("Conversion failed for {context}: {source}")]
    Marshal {
        context: String,
        #[source]
        source: MarshalError,
    },

    #[error("Couldn't resolve entry point: {0}")]
    Symbol(String),

    #[error(transparent)]
    Call(#[from] CallError),

    /// Raised by a host callable invoked from a callback
    #[error("{0}")]
    Host(String),
}

impl InvokeError {
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host(message.into())
    }

    pub(crate) fn marshal(context: impl Into<String>, source: MarshalError) -> Self {
        Self::Marshal { context: context.into(), source }
    }
}

impl From<SymbolError> for InvokeError {
    fn from(err: SymbolError) -> Self {
        Self::Symbol(err.to_string())
    }
}

/// Result type for invocation
pub type Result<T> = std::result::Result<T, InvokeError>;
