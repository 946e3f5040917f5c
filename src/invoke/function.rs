//! Native-backed callables
//!
//! `NativeFunction` binds a descriptor to its plan and drives one call:
//! type check, frame build, foreign call, result collection, reclamation.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug_span;

use crate::config::{self, InvokeConfig};
use crate::error::{InvokeError, Result};
use crate::introspect::FunctionDescriptor;
use crate::logging::{debug, log_ffi_call, log_ffi_error, log_ffi_return};
use crate::value::{Callable, Value};

use super::frame::CallFrame;
use super::plan::{self, CallPlan};
use super::results;

/// A native function callable with caller values
pub struct NativeFunction {
    descriptor: FunctionDescriptor,
    plan: OnceCell<Arc<CallPlan>>,
    /// Dispatch table owner for virtual functions
    implementor: Option<String>,
}

impl NativeFunction {
    /// Bind a descriptor; its plan is compiled on first call
    pub fn new(descriptor: FunctionDescriptor) -> Self {
        Self {
            descriptor,
            plan: OnceCell::new(),
            implementor: None,
        }
    }

    /// Bind a precompiled plan that is not shared through the cache
    pub(crate) fn with_plan(plan: CallPlan, implementor: &str) -> Self {
        Self {
            descriptor: plan.descriptor().clone(),
            plan: OnceCell::with_value(Arc::new(plan)),
            implementor: Some(implementor.to_string()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.descriptor.symbol()
    }

    /// Declared parameter count
    #[inline]
    pub fn arity(&self) -> usize {
        self.descriptor.n_args()
    }

    #[inline]
    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.implementor.is_some()
    }

    /// The call plan, compiling it if needed
    pub fn plan(&self) -> Result<&Arc<CallPlan>> {
        self.plan.get_or_try_init(|| plan::plan_for(&self.descriptor))
    }

    /// Call a function
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        self.invoke(None, args)
    }

    /// Call a method on `receiver`
    pub fn call_method(&self, receiver: &Value, args: &[Value]) -> Result<Value> {
        self.invoke(Some(receiver), args)
    }

    fn invoke(&self, receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
        let plan = self.plan()?;
        let span = debug_span!("invoke", function = %self.name(), args = args.len());
        let _enter = span.enter();

        let result = execute(plan, receiver, args);
        if let Err(err) = &result {
            log_ffi_error(self.name(), &err.to_string());
        }
        result
    }

    /// Expose as a caller callable; methods take their receiver first
    pub fn into_callable(self) -> Callable {
        let name = self.name().to_string();
        let is_method = self.descriptor.is_method() || self.is_virtual();
        Callable::named(&name, move |args| {
            if is_method {
                match args.split_first() {
                    Some((receiver, rest)) => self.call_method(receiver, rest),
                    None => Err(InvokeError::MissingReceiver(self.name().to_string())),
                }
            } else {
                self.call(args)
            }
        })
    }
}

impl Drop for NativeFunction {
    fn drop(&mut self) {
        debug!(
            function = %self.descriptor.symbol(),
            implementor = ?self.implementor,
            "Native function released"
        );
    }
}

impl core::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("implementor", &self.implementor)
            .finish()
    }
}

/// Run one invocation against a compiled plan
pub(crate) fn execute(plan: &CallPlan, receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
    execute_with(plan, receiver, args, &config::invoke_settings())
}

/// Run one invocation with explicit settings
///
/// Without the up-front type check, a bad argument is still reported by the
/// frame builder before the native call, and the partial frame is reclaimed.
pub(crate) fn execute_with(
    plan: &CallPlan,
    receiver: Option<&Value>,
    args: &[Value],
    settings: &InvokeConfig,
) -> Result<Value> {
    if settings.type_check {
        plan.type_check(args)?;
    }

    let mut frame = CallFrame::build(plan, receiver, args)?;

    if settings.log_calls {
        log_ffi_call(plan.name(), plan.total_frame_slots());
    }
    frame.execute()?;
    if settings.log_calls {
        log_ffi_return(plan.name());
    }

    results::collect(&mut frame)
}
