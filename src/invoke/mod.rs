//! Invocation engine - calling natives with caller values
//!
//! Architecture:
//! - `plan.rs` - Parameter classification and the per-descriptor plan cache
//! - `frame.rs` - Per-call argument storage and input marshaling
//! - `results.rs` - Return value and OUT parameter collection
//! - `reclaim.rs` - Release of everything a frame made or received
//! - `callback.rs` - Trampolines for caller callables handed to natives
//! - `function.rs` - `NativeFunction` and the call driver
//! - `vfunc.rs` - Virtual functions resolved through dispatch tables

mod callback;
mod frame;
mod function;
mod plan;
mod reclaim;
mod results;
mod vfunc;

pub use callback::{callback_destroy_notify, durable_callbacks, Callback};
pub use function::NativeFunction;
pub use plan::{cached_plans, clear_plans, plan_for, CallPlan, ParamKind, Parameter};
pub use vfunc::make_virtual_function;

pub(crate) use callback::clear_durable;

#[cfg(test)]
mod tests;
