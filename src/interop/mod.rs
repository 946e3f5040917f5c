//! Interoperability - reach native functions and convert values for them
//!
//! Architecture:
//! - `types.rs` - Native slot representation (FfiType, FfiValue)
//! - `marshal.rs` - Caller value ↔ native conversions and release rules
//! - `call.rs` - Prepared libffi call interfaces
//! - `abi.rs` - Calling convention support
//! - `library.rs` - Dynamic library loading (dlopen/LoadLibrary)
//! - `boxed.rs` - Structured memory on the C heap
//! - `stats.rs` - Per-thread counters

mod abi;
pub mod boxed;
mod call;
mod library;
pub mod marshal;
mod stats;
mod types;

pub use abi::CallingConvention;
pub use boxed::{Boxed, BoxedAllocation};
pub use call::{CallError, NativeSignature};
pub use library::{Library, LoadError, SymbolError};
pub use marshal::{
    can_convert, free_argument, free_array, from_native, to_native, type_name, MarshalError, Origin,
    ReleaseDepth,
};
pub use stats::{stats, InteropStats};
pub use types::{FfiType, FfiValue};

pub(crate) use stats::{record_callback_created, record_callback_destroyed};

#[cfg(test)]
mod tests;
