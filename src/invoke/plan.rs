//! Parameter classification and the call plan cache
//!
//! A plan is compiled once per descriptor and never mutated afterwards, so it
//! can be shared by concurrent and nested calls. Everything that changes per
//! call lives in the [`CallFrame`](super::frame::CallFrame).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::config;
use crate::error::{InvokeError, Result};
use crate::interop::{self, CallingConvention, FfiType, NativeSignature};
use crate::introspect::{
    ArgInfo, Direction, FunctionDescriptor, NativeAddress, ScopeType, Transfer, TypeInfo,
};
use crate::logging::{log_plan_compiled, perf};
use crate::value::Value;

/// Plans keyed by descriptor identity; each plan retains its descriptor
static PLANS: Lazy<DashMap<usize, Arc<CallPlan>>> = Lazy::new(DashMap::new);

/// How a formal parameter is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Converted directly from or to a caller value
    Normal,
    /// Filled by the engine, never visible to the caller
    Skip,
    /// C array whose element count lives in another parameter
    Array { length: usize },
    /// Function pointer backed by a trampoline
    Callback {
        closure: Option<usize>,
        destroy: Option<usize>,
        scope: ScopeType,
    },
}

/// A classified formal parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    pub index: usize,
    pub name: String,
    pub kind: ParamKind,
    pub direction: Direction,
    pub transfer: Transfer,
    pub ty: TypeInfo,
    pub may_be_null: bool,
    pub caller_allocates: bool,
    /// Position of the caller value this parameter consumes
    pub in_position: Option<usize>,
}

impl Parameter {
    fn new(index: usize, arg: &ArgInfo) -> Self {
        Self {
            index,
            name: arg.name.clone(),
            kind: ParamKind::Normal,
            direction: arg.direction,
            transfer: arg.transfer,
            ty: arg.ty.clone(),
            may_be_null: arg.may_be_null,
            caller_allocates: arg.caller_allocates,
            in_position: None,
        }
    }

    #[inline]
    pub fn is_skip(&self) -> bool {
        self.kind == ParamKind::Skip
    }

    /// Slot type seen by the native function
    fn native_type(&self) -> FfiType {
        if self.direction.is_out() {
            FfiType::Pointer
        } else {
            self.ty.ffi_type()
        }
    }
}

/// Immutable per-descriptor call plan
#[derive(Debug)]
pub struct CallPlan {
    descriptor: FunctionDescriptor,
    parameters: Vec<Parameter>,
    total_frame_slots: usize,
    in_count: usize,
    out_count: usize,
    is_method: bool,
    can_throw: bool,
    return_length: Option<usize>,
    signature: NativeSignature,
}

impl CallPlan {
    /// Compile a plan bound to the descriptor's own entry point
    pub fn compile(descriptor: &FunctionDescriptor) -> Result<Self> {
        let address = descriptor.entry_address()?;
        Self::compile_with(descriptor, address, descriptor.is_method())
    }

    /// Compile a plan for a virtual function; the receiver slot is always reserved
    pub fn compile_virtual(descriptor: &FunctionDescriptor, address: NativeAddress) -> Result<Self> {
        Self::compile_with(descriptor, address, true)
    }

    fn compile_with(descriptor: &FunctionDescriptor, address: NativeAddress, is_method: bool) -> Result<Self> {
        let _perf = perf::track("plan_compile");

        let classified = classify(descriptor)?;
        let can_throw = descriptor.can_throw();
        let parameter_count = classified.parameters.len();

        let mut arg_types = Vec::with_capacity(parameter_count + 2);
        if is_method {
            arg_types.push(FfiType::Pointer);
        }
        arg_types.extend(classified.parameters.iter().map(Parameter::native_type));
        if can_throw {
            arg_types.push(FfiType::Pointer);
        }

        let signature = NativeSignature::new(
            address,
            CallingConvention::platform(),
            descriptor.return_type().ffi_type(),
            arg_types,
        );

        let plan = Self {
            descriptor: descriptor.clone(),
            total_frame_slots: parameter_count + is_method as usize + can_throw as usize,
            parameters: classified.parameters,
            in_count: classified.in_count,
            out_count: classified.out_count,
            is_method,
            can_throw,
            return_length: classified.return_length,
            signature,
        };

        log_plan_compiled(descriptor.symbol(), plan.in_count, plan.out_count, plan.total_frame_slots);
        Ok(plan)
    }

    #[inline]
    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    #[inline]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    #[inline]
    pub fn parameter(&self, index: usize) -> &Parameter {
        &self.parameters[index]
    }

    #[inline]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Parameters plus receiver and failure slots
    #[inline]
    pub fn total_frame_slots(&self) -> usize {
        self.total_frame_slots
    }

    /// Caller values required
    #[inline]
    pub fn in_count(&self) -> usize {
        self.in_count
    }

    /// Values produced by a successful call
    #[inline]
    pub fn out_count(&self) -> usize {
        self.out_count
    }

    #[inline]
    pub fn is_method(&self) -> bool {
        self.is_method
    }

    #[inline]
    pub fn can_throw(&self) -> bool {
        self.can_throw
    }

    /// Parameter carrying the length of an array return value
    #[inline]
    pub fn return_length(&self) -> Option<usize> {
        self.return_length
    }

    #[inline]
    pub fn signature(&self) -> &NativeSignature {
        &self.signature
    }

    /// Check caller values before any native work is done
    pub fn type_check(&self, args: &[Value]) -> Result<()> {
        if args.len() < self.in_count {
            return Err(InvokeError::NotEnoughArguments {
                expected: self.in_count,
                actual: args.len(),
            });
        }

        for param in &self.parameters {
            let Some(position) = param.in_position else { continue };
            let value = &args[position];
            if !interop::can_convert(value, &param.ty, param.may_be_null) {
                return Err(InvokeError::InvalidArgumentType {
                    param: param.name.clone(),
                    expected: interop::type_name(&param.ty),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Get the plan for a descriptor, compiling it on first use
pub fn plan_for(descriptor: &FunctionDescriptor) -> Result<Arc<CallPlan>> {
    if !config::invoke_settings().cache_plans {
        return CallPlan::compile(descriptor).map(Arc::new);
    }

    let key = Arc::as_ptr(descriptor) as usize;
    if let Some(plan) = PLANS.get(&key) {
        return Ok(plan.clone());
    }

    match PLANS.entry(key) {
        Entry::Occupied(entry) => Ok(entry.get().clone()),
        Entry::Vacant(entry) => {
            let plan = Arc::new(CallPlan::compile(descriptor)?);
            entry.insert(plan.clone());
            Ok(plan)
        }
    }
}

/// Number of cached plans
pub fn cached_plans() -> usize {
    PLANS.len()
}

/// Drop every cached plan
pub fn clear_plans() {
    PLANS.clear();
}

struct Classified {
    parameters: Vec<Parameter>,
    in_count: usize,
    out_count: usize,
    return_length: Option<usize>,
}

/// Running counts, remembering what each parameter contributed
struct Counts {
    contributed: Vec<(bool, bool)>,
    input: usize,
    output: usize,
}

impl Counts {
    fn count(&mut self, index: usize, direction: Direction) {
        let (input, output) = (direction.is_in(), direction.is_out());
        self.input += input as usize;
        self.output += output as usize;
        self.contributed[index] = (input, output);
    }

    /// Mark a parameter Skip, giving back whatever it was counted for
    fn skip(&mut self, parameters: &mut [Parameter], index: usize) {
        let Some(param) = parameters.get_mut(index) else { return };
        param.kind = ParamKind::Skip;
        let (input, output) = std::mem::take(&mut self.contributed[index]);
        self.input -= input as usize;
        self.output -= output as usize;
    }
}

fn classify(descriptor: &FunctionDescriptor) -> Result<Classified> {
    let mut parameters: Vec<Parameter> = descriptor
        .args()
        .iter()
        .enumerate()
        .map(|(i, arg)| Parameter::new(i, arg))
        .collect();
    let n = parameters.len();
    let mut counts = Counts {
        contributed: vec![(false, false); n],
        input: 0,
        output: 0,
    };

    for i in 0..n {
        if parameters[i].is_skip() {
            continue;
        }

        let direction = parameters[i].direction;
        match parameters[i].ty.clone() {
            TypeInfo::Array(info) => {
                if let Some(length) = info.length_index().filter(|&l| l < n && l != i) {
                    parameters[i].kind = ParamKind::Array { length };

                    // Only the caller knows how big a buffer it wants
                    let caller_sized = direction == Direction::Out
                        && parameters[i].caller_allocates
                        && parameters[length].direction == Direction::In;
                    if !caller_sized {
                        counts.skip(&mut parameters, length);
                    }
                }
            }
            TypeInfo::Callback(callback) if direction == Direction::In => {
                let arg = &descriptor.args()[i];
                if arg.destroy.is_some() && arg.closure.is_none() {
                    return Err(InvokeError::UnsupportedCallback {
                        namespace: callback.namespace.clone(),
                        name: callback.name.clone(),
                    });
                }
                if let Some(index) = [arg.closure, arg.destroy].into_iter().flatten().find(|&j| j >= n || j == i) {
                    return Err(InvokeError::MisplacedCallbackArgument { param: arg.name.clone(), index });
                }
                parameters[i].kind = ParamKind::Callback {
                    closure: arg.closure,
                    destroy: arg.destroy,
                    scope: arg.scope,
                };
                for j in [arg.destroy, arg.closure].into_iter().flatten() {
                    counts.skip(&mut parameters, j);
                }
            }
            TypeInfo::DestroyNotify => parameters[i].kind = ParamKind::Skip,
            _ => {}
        }

        if !parameters[i].is_skip() {
            counts.count(i, direction);
        }
    }

    let mut return_length = None;
    if !descriptor.skips_return() {
        counts.output += 1;
        if let Some(length) = descriptor.return_type().as_array().and_then(|a| a.length_index()) {
            if length < n {
                counts.skip(&mut parameters, length);
                return_length = Some(length);
            }
        }
    }

    let mut position = 0;
    for param in parameters.iter_mut().filter(|p| !p.is_skip() && p.direction.is_in()) {
        param.in_position = Some(position);
        position += 1;
    }

    Ok(Classified {
        parameters,
        in_count: counts.input,
        out_count: counts.output,
        return_length,
    })
}
