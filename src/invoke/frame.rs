//! Call frames - per-invocation native argument storage
//!
//! A frame is the arena of one call: argument slots, scratch cells for
//! by-reference parameters, the engine-made input values, cached array
//! lengths, call-scoped callbacks and caller-allocated buffers. Dropping the
//! frame reclaims all of it (see `reclaim.rs`), including when building it
//! fails halfway.

use core::ffi::c_void;

use crate::error::{InvokeError, Result};
use crate::ffi::{dyninvoke_callback_destroy_notify, ReportedError};
use crate::interop::{boxed, marshal, BoxedAllocation, FfiValue, MarshalError};
use crate::introspect::{ArrayLength, Direction, ScopeType, TypeInfo};
use crate::logging::trace;
use crate::value::Value;

use super::callback::{self, Callback};
use super::plan::{CallPlan, ParamKind, Parameter};

pub(crate) struct CallFrame<'p> {
    pub(crate) plan: &'p CallPlan,
    /// Native argument slots, receiver and failure slot included
    pub(crate) slots: Vec<FfiValue>,
    /// Index of the first parameter slot
    pub(crate) offset: usize,
    /// Per-parameter cells that by-reference slots point into
    pub(crate) scratch: Box<[FfiValue]>,
    /// Engine-made input values of INOUT parameters
    pub(crate) originals: Box<[FfiValue]>,
    pub(crate) lengths: Box<[Option<usize>]>,
    pub(crate) callbacks: Vec<Option<Callback>>,
    pub(crate) caller_allocated: Vec<Option<BoxedAllocation>>,
    /// Parameters whose slot holds something the reclaimer must look at
    pub(crate) built: Box<[bool]>,
    pub(crate) failure: Box<*mut ReportedError>,
    pub(crate) return_value: Option<FfiValue>,
    pub(crate) return_length: Option<usize>,
}

impl<'p> CallFrame<'p> {
    fn new(plan: &'p CallPlan) -> Self {
        let n = plan.parameter_count();
        Self {
            plan,
            slots: vec![FfiValue::zeroed(); plan.total_frame_slots()],
            offset: plan.is_method() as usize,
            scratch: vec![FfiValue::zeroed(); n].into_boxed_slice(),
            originals: vec![FfiValue::zeroed(); n].into_boxed_slice(),
            lengths: vec![None; n].into_boxed_slice(),
            callbacks: (0..n).map(|_| None).collect(),
            caller_allocated: (0..n).map(|_| None).collect(),
            built: vec![false; n].into_boxed_slice(),
            failure: Box::new(core::ptr::null_mut()),
            return_value: None,
            return_length: None,
        }
    }

    /// Build a frame from caller values
    ///
    /// `args` must hold at least `plan.in_count()` values.
    pub(crate) fn build(plan: &'p CallPlan, receiver: Option<&Value>, args: &[Value]) -> Result<Self> {
        if args.len() < plan.in_count() {
            return Err(InvokeError::NotEnoughArguments {
                expected: plan.in_count(),
                actual: args.len(),
            });
        }

        let mut frame = Self::new(plan);

        if plan.is_method() {
            let receiver = receiver.ok_or_else(|| InvokeError::MissingReceiver(plan.name().to_string()))?;
            let container = plan.descriptor().container();
            frame.slots[0] = marshal::to_native(receiver, container, false)
                .map_err(|e| conversion_error("self", container, receiver, e))?;
        }

        if plan.can_throw() {
            let handle: *mut *mut ReportedError = &mut *frame.failure;
            let index = frame.offset + plan.parameter_count();
            frame.slots[index] = FfiValue::from_ptr(handle.cast());
        }

        // Hidden outputs (lengths, counts) still need somewhere to be written
        for param in plan.parameters().iter().filter(|p| p.is_skip() && p.direction.is_out()) {
            let cell = frame.scratch_ptr(param.index);
            frame.set_slot(param.index, cell);
        }

        for param in plan.parameters() {
            match param.kind {
                ParamKind::Skip => continue,
                _ if param.direction == Direction::Out => frame.reserve_output(param, args)?,
                ParamKind::Callback { closure, destroy, scope } => {
                    frame.build_callback(param, closure, destroy, scope, input(param, args))?
                }
                ParamKind::Array { length } => frame.build_array(param, length, input(param, args))?,
                ParamKind::Normal => {
                    let value = input(param, args);
                    let slot = marshal::to_native(value, &param.ty, param.may_be_null)
                        .map_err(|e| conversion_error(&param.name, &param.ty, value, e))?;
                    frame.set_slot(param.index, slot);
                    frame.built[param.index] = true;
                }
            }

            if param.direction == Direction::InOut {
                frame.rehome(param.index);
            }
        }

        trace!(function = %plan.name(), slots = frame.slots.len(), "Call frame built");
        Ok(frame)
    }

    /// Slot of parameter `index`
    #[inline]
    pub(crate) fn slot(&self, index: usize) -> FfiValue {
        self.slots[self.offset + index]
    }

    #[inline]
    fn set_slot(&mut self, index: usize, value: FfiValue) {
        self.slots[self.offset + index] = value;
    }

    #[inline]
    fn scratch_ptr(&mut self, index: usize) -> FfiValue {
        FfiValue::from_ptr((&mut self.scratch[index] as *mut FfiValue).cast())
    }

    /// Current native value of parameter `index`, looking through by-reference slots
    pub(crate) fn current_value(&self, index: usize) -> FfiValue {
        let param = self.plan.parameter(index);
        if param.direction.is_out() && !param.caller_allocates {
            self.scratch[index]
        } else {
            self.slot(index)
        }
    }

    /// Current array length held by length parameter `index`
    pub(crate) fn current_length(&self, index: usize) -> std::result::Result<usize, MarshalError> {
        let param = self.plan.parameter(index);
        marshal::native_to_length(self.current_value(index), &param.ty)
    }

    /// INOUT parameters are always passed by reference to a copy of the input
    fn rehome(&mut self, index: usize) {
        let value = self.slot(index);
        self.originals[index] = value;
        self.scratch[index] = value;
        let cell = self.scratch_ptr(index);
        self.set_slot(index, cell);
    }

    fn reserve_output(&mut self, param: &Parameter, args: &[Value]) -> Result<()> {
        if !param.caller_allocates {
            let cell = self.scratch_ptr(param.index);
            self.set_slot(param.index, cell);
            self.built[param.index] = true;
            return Ok(());
        }

        let size = match (&param.kind, &param.ty) {
            (ParamKind::Array { length }, TypeInfo::Array(info)) => {
                let count = self.caller_length(*length, args)?;
                self.lengths[param.index] = Some(count);
                count * info.element.ffi_type().size()
            }
            (_, TypeInfo::Array(info)) => match info.length {
                ArrayLength::Fixed(count) => {
                    self.lengths[param.index] = Some(count);
                    count * info.element.ffi_type().size()
                }
                _ => return Err(InvokeError::marshal(&param.name, MarshalError::UnknownLength)),
            },
            (_, ty) => boxed::size_of(ty),
        };

        let block = BoxedAllocation::zeroed(size)
            .ok_or_else(|| InvokeError::marshal(&param.name, MarshalError::AllocationFailed(size)))?;
        self.set_slot(param.index, FfiValue::from_ptr(block.as_ptr()));
        self.caller_allocated[param.index] = Some(block);
        self.built[param.index] = true;
        Ok(())
    }

    /// Buffer size requested by the caller through a visible length parameter
    fn caller_length(&self, length: usize, args: &[Value]) -> Result<usize> {
        let param = self.plan.parameter(length);
        if param.in_position.is_none() {
            return Err(InvokeError::marshal(&param.name, MarshalError::UnknownLength));
        }
        let value = input(param, args);
        value
            .as_int()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| InvokeError::InvalidArgumentType {
                param: param.name.clone(),
                expected: marshal::type_name(&param.ty),
                value: value.to_string(),
            })
    }

    fn build_array(&mut self, param: &Parameter, length: usize, value: &Value) -> Result<()> {
        let TypeInfo::Array(info) = &param.ty else {
            return Err(InvokeError::marshal(&param.name, MarshalError::Unsupported(marshal::type_name(&param.ty))));
        };

        let (slot, count) = marshal::array_to_native(value, info, param.may_be_null)
            .map_err(|e| conversion_error(&param.name, &param.ty, value, e))?;
        self.set_slot(param.index, slot);
        self.lengths[param.index] = Some(count);
        self.built[param.index] = true;

        let plan = self.plan;
        let length_param = plan.parameter(length);
        let encoded = marshal::length_to_native(count, &length_param.ty)
            .map_err(|e| InvokeError::marshal(&length_param.name, e))?;
        match length_param.direction {
            Direction::In => self.set_slot(length, encoded),
            Direction::InOut => {
                self.scratch[length] = encoded;
                let cell = self.scratch_ptr(length);
                self.set_slot(length, cell);
            }
            // Already pointed at its scratch cell
            Direction::Out => {}
        }
        Ok(())
    }

    fn build_callback(
        &mut self,
        param: &Parameter,
        closure: Option<usize>,
        destroy: Option<usize>,
        scope: ScopeType,
        value: &Value,
    ) -> Result<()> {
        let TypeInfo::Callback(info) = &param.ty else {
            return Err(InvokeError::marshal(&param.name, MarshalError::Unsupported(marshal::type_name(&param.ty))));
        };
        if destroy.is_some() && closure.is_none() {
            return Err(InvokeError::UnsupportedCallback {
                namespace: info.namespace.clone(),
                name: info.name.clone(),
            });
        }
        let n = self.plan.parameter_count();
        if let Some(index) = [closure, destroy].into_iter().flatten().find(|&j| j >= n || j == param.index) {
            return Err(InvokeError::MisplacedCallbackArgument { param: param.name.clone(), index });
        }

        let callable = match value {
            Value::Function(callable) => callable.clone(),
            v if v.is_nullish() && param.may_be_null => {
                // Closure and destroy slots stay null
                self.built[param.index] = true;
                return Ok(());
            }
            v => {
                return Err(InvokeError::InvalidArgumentType {
                    param: param.name.clone(),
                    expected: marshal::type_name(&param.ty),
                    value: v.to_string(),
                })
            }
        };

        let callback = Callback::new(callable, info.clone(), scope)?;
        self.set_slot(param.index, FfiValue::from_ptr(callback.code_ptr()));
        if let Some(closure) = closure {
            self.set_slot(closure, FfiValue::from_ptr(callback.token()));
        }
        if let Some(destroy) = destroy {
            let notify = dyninvoke_callback_destroy_notify as extern "C" fn(*mut c_void);
            self.set_slot(destroy, FfiValue::from_ptr(notify as *mut c_void));
        }

        // Durable ones move to the registry right before the call
        self.callbacks[param.index] = Some(callback);
        self.built[param.index] = true;
        Ok(())
    }

    /// Move durable callbacks into the registry, returning their tokens
    fn hand_over_durable(&mut self) -> Vec<*mut c_void> {
        let mut tokens = Vec::new();
        for slot in self.callbacks.iter_mut() {
            if slot.as_ref().is_some_and(|cb| cb.scope() == ScopeType::Durable) {
                if let Some(callback) = slot.take() {
                    tokens.push(callback.token());
                    callback::register_durable(callback);
                }
            }
        }
        tokens
    }

    /// Perform the foreign call, keeping the return value for marshaling and release
    ///
    /// Durable callbacks are registered before the call, since the native
    /// function may already send their destroy notification while it runs.
    pub(crate) fn execute(&mut self) -> Result<()> {
        let durable = self.hand_over_durable();
        match unsafe { self.plan.signature().call(&self.slots) } {
            Ok(ret) => {
                self.return_value = Some(ret);
                Ok(())
            }
            Err(err) => {
                // Rejected before reaching native code; nobody else holds the tokens
                for token in durable {
                    callback::callback_destroy_notify(token);
                }
                Err(err.into())
            }
        }
    }
}

#[inline]
fn input<'a>(param: &Parameter, args: &'a [Value]) -> &'a Value {
    static UNDEFINED: Value = Value::Undefined;
    param.in_position.and_then(|p| args.get(p)).unwrap_or(&UNDEFINED)
}

fn conversion_error(param: &str, ty: &TypeInfo, value: &Value, err: MarshalError) -> InvokeError {
    if err.is_type_error() {
        InvokeError::InvalidArgumentType {
            param: param.to_string(),
            expected: marshal::type_name(ty),
            value: value.to_string(),
        }
    } else {
        InvokeError::marshal(param, err)
    }
}
