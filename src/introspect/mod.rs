//! Introspection metadata - runtime descriptions of native callables
//!
//! Architecture:
//! - `types.rs` - Type descriptors, directions, transfer and scope annotations
//! - `callable.rs` - Argument, callable and function descriptors with builders
//! - `dispatch.rs` - Dispatch tables used to resolve virtual functions

mod callable;
mod dispatch;
mod types;

pub use callable::{
    ArgInfo, CallableBuilder, CallableInfo, EntryPoint, FunctionBuilder, FunctionDescriptor,
    FunctionInfo, NativeAddress,
};
pub use dispatch::DispatchTable;
pub use types::{ArrayInfo, ArrayLength, Direction, ScopeType, StructInfo, Transfer, TypeInfo};
