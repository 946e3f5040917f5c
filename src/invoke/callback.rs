//! Callback bridge - caller callables as native function pointers
//!
//! Each callback owns a libffi closure whose trampoline converts the native
//! arguments, runs the callable on the calling thread and writes its result
//! back. The closure token handed to native code is the address of the
//! trampoline data, which is also the key of the durable registry.

use core::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use libffi::low::{closure_alloc, closure_free, ffi_cif, ffi_closure, prep_closure, CodePtr};
use libffi::middle::Cif;
use once_cell::sync::Lazy;

use crate::error::{InvokeError, Result};
use crate::interop::{self, marshal, FfiType, FfiValue};
use crate::introspect::{ArrayLength, CallableInfo, ScopeType, Transfer, TypeInfo};
use crate::logging::{error, log_callback};
use crate::value::{Callable, Value};

/// Durable callbacks awaiting their destroy notification, keyed by token
static DURABLE: Lazy<DashMap<usize, Callback>> = Lazy::new(DashMap::new);

struct TrampolineData {
    callable: Callable,
    info: Arc<CallableInfo>,
    arg_types: Vec<FfiType>,
    return_type: FfiType,
}

/// A caller callable exposed to native code
pub struct Callback {
    data: Box<TrampolineData>,
    // Referenced by the closure; must outlive it
    _cif: Box<Cif>,
    closure: *mut ffi_closure,
    code: CodePtr,
    scope: ScopeType,
}

// The closure and cif are only touched on creation and drop; the callable is Send + Sync.
unsafe impl Send for Callback {}
unsafe impl Sync for Callback {}

impl Callback {
    /// Allocate a trampoline for `callable` with the signature `info`
    pub fn new(callable: Callable, info: Arc<CallableInfo>, scope: ScopeType) -> Result<Self> {
        let arg_types: Vec<FfiType> = info.args.iter().map(|arg| arg.ty.ffi_type()).collect();
        let return_type = info.return_type.ffi_type();
        let cif = Box::new(Cif::new(
            arg_types.iter().map(|ty| ty.to_libffi()).collect::<Vec<_>>(),
            return_type.to_libffi(),
        ));
        let data = Box::new(TrampolineData {
            callable,
            info,
            arg_types,
            return_type,
        });

        let (closure, code) = unsafe { closure_alloc() };
        if closure.is_null() {
            return Err(InvokeError::host("Failed to allocate callback closure"));
        }

        let prepared = unsafe {
            prep_closure(
                closure,
                cif.as_raw_ptr(),
                trampoline,
                &*data as *const TrampolineData,
                code,
            )
        };
        if prepared.is_err() {
            unsafe { closure_free(closure) };
            return Err(InvokeError::host(format!(
                "Failed to prepare callback {}",
                data.info.qualified_name()
            )));
        }

        interop::record_callback_created();
        let callback = Self {
            data,
            _cif: cif,
            closure,
            code,
            scope,
        };
        log_callback("callback_created", &callback.data.info.name, callback.token() as *const u8);
        Ok(callback)
    }

    /// Function pointer to hand to native code
    #[inline]
    pub fn code_ptr(&self) -> *mut c_void {
        self.code.as_mut_ptr()
    }

    /// User-data token identifying this callback
    #[inline]
    pub fn token(&self) -> *mut c_void {
        &*self.data as *const TrampolineData as *mut c_void
    }

    #[inline]
    pub fn scope(&self) -> ScopeType {
        self.scope
    }

    #[inline]
    pub fn info(&self) -> &Arc<CallableInfo> {
        &self.data.info
    }
}

impl Drop for Callback {
    fn drop(&mut self) {
        log_callback("callback_destroyed", &self.data.info.name, self.token() as *const u8);
        unsafe { closure_free(self.closure) };
        interop::record_callback_destroyed();
    }
}

impl core::fmt::Debug for Callback {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Callback")
            .field("info", &self.data.info.qualified_name())
            .field("token", &self.token())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Keep a durable callback alive until its destroy notification
pub(crate) fn register_durable(callback: Callback) {
    DURABLE.insert(callback.token() as usize, callback);
}

/// Destroy the durable callback identified by `token`
///
/// Unknown tokens are ignored.
pub fn callback_destroy_notify(token: *mut c_void) {
    if let Some((_, callback)) = DURABLE.remove(&(token as usize)) {
        drop(callback);
    }
}

/// Durable callbacks still registered
pub fn durable_callbacks() -> usize {
    DURABLE.len()
}

pub(crate) fn clear_durable() {
    DURABLE.clear();
}

unsafe extern "C" fn trampoline(
    _cif: &ffi_cif,
    result: &mut FfiValue,
    args: *const *const c_void,
    data: &TrampolineData,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| run_callback(data, args)));

    let value = match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            error!(callback = %data.info.qualified_name(), error = %err, "Callback failed");
            FfiValue::zeroed()
        }
        Err(_) => {
            error!(callback = %data.info.qualified_name(), "Callback panicked");
            FfiValue::zeroed()
        }
    };

    if data.return_type != FfiType::Void {
        *result = value.widened(data.return_type);
    }
}

unsafe fn run_callback(data: &TrampolineData, args: *const *const c_void) -> Result<FfiValue> {
    let info = &data.info;
    let read = |i: usize| FfiValue::read(data.arg_types[i], *args.add(i));

    let mut values = Vec::with_capacity(info.args.len());
    for (i, arg) in info.args.iter().enumerate() {
        let slot = read(i);
        let value = match &arg.ty {
            TypeInfo::Array(array) => {
                let length = match array.length {
                    ArrayLength::Parameter(l) if l < info.args.len() => {
                        let length = marshal::native_to_length(read(l), &info.args[l].ty)
                            .map_err(|e| InvokeError::marshal(&arg.name, e))?;
                        Some(length)
                    }
                    _ => None,
                };
                marshal::array_from_native(slot, array, length, Transfer::Nothing)
            }
            ty => interop::from_native(slot, ty, Transfer::Nothing),
        };
        values.push(value.map_err(|e| InvokeError::marshal(&arg.name, e))?);
    }

    let ret = data.callable.call(&values)?;
    if data.return_type == FfiType::Void {
        return Ok(FfiValue::zeroed());
    }
    let ret = if ret == Value::Undefined && info.may_return_null { Value::Null } else { ret };
    interop::to_native(&ret, &info.return_type, info.may_return_null)
        .map_err(|e| InvokeError::marshal(format!("return value of {}", info.qualified_name()), e))
}
