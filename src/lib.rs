//! dyninvoke - Dynamic calls into natives described by introspection metadata
//!
//! Given a [`FunctionInfo`] describing a native function, the engine compiles
//! a call plan once, converts caller [`Value`]s into native arguments, performs
//! the call through libffi, converts the results back and releases every
//! native resource according to the ownership-transfer annotations.

pub mod config;
pub mod error;
pub mod ffi;
pub mod interop;
pub mod introspect;
pub mod invoke;
pub mod logging;
pub mod value;

// Re-export commonly used items
pub use config::Config;
pub use error::{InvokeError, NativeFailure, Result};
pub use interop::{stats, Boxed, InteropStats, Library, MarshalError};
pub use introspect::{
    ArgInfo, CallableInfo, DispatchTable, Direction, FunctionDescriptor, FunctionInfo, NativeAddress,
    ScopeType, StructInfo, Transfer, TypeInfo,
};
pub use invoke::{make_virtual_function, NativeFunction};
pub use value::{Callable, Value};

/// Initialize logging from the environment and load the discovered configuration
pub fn init() {
    logging::init();
    config::install(Config::discover());
}

/// Install `config` and initialize logging from it
pub fn init_with_config(config: Config) {
    logging::init_with_config(config.log_config());
    config::install(config);
}

/// Drop cached plans and every durable callback still registered
pub fn cleanup() {
    invoke::clear_plans();
    invoke::clear_durable();
    logging::debug!("Engine state cleared");
}
