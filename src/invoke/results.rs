//! Result marshaling - native outputs back to caller values

use crate::error::{InvokeError, Result};
use crate::ffi::take_reported;
use crate::interop::{boxed::Boxed, marshal, FfiValue, MarshalError};
use crate::introspect::{Direction, TypeInfo};
use crate::value::Value;

use super::frame::CallFrame;
use super::plan::{ParamKind, Parameter};

/// Collect the return value and OUT/INOUT parameters of a completed call
///
/// A failure reported by the native function wins over any output.
pub(crate) fn collect(frame: &mut CallFrame<'_>) -> Result<Value> {
    if !frame.failure.is_null() {
        let failure = unsafe { take_reported(*frame.failure) };
        *frame.failure = core::ptr::null_mut();
        return Err(InvokeError::NativeReported(failure));
    }

    let plan = frame.plan;
    let descriptor = plan.descriptor();
    let mut outputs = Vec::with_capacity(plan.out_count());

    if !descriptor.skips_return() {
        let ret = frame.return_value.unwrap_or_default();
        let transfer = descriptor.return_transfer();
        let value = match (descriptor.return_type(), plan.return_length()) {
            (TypeInfo::Array(info), Some(length)) => {
                let count = frame
                    .current_length(length)
                    .map_err(|e| InvokeError::marshal("return value", e))?;
                frame.return_length = Some(count);
                marshal::array_from_native(ret, info, Some(count), transfer)
            }
            (ty, _) => marshal::from_native(ret, ty, transfer),
        };
        outputs.push(value.map_err(|e| InvokeError::marshal("return value", e))?);
    }

    for param in plan.parameters().iter().filter(|p| p.direction.is_out()) {
        let value = match param.kind {
            ParamKind::Skip | ParamKind::Callback { .. } => continue,
            ParamKind::Array { length } => output_array(frame, param, length),
            ParamKind::Normal => output_value(frame, param),
        };
        outputs.push(value.map_err(|e| InvokeError::marshal(&param.name, e))?);
    }

    Ok(match outputs.len() {
        0 => Value::Undefined,
        1 => outputs.pop().unwrap_or_default(),
        _ => Value::Array(outputs),
    })
}

fn output_array(frame: &mut CallFrame<'_>, param: &Parameter, length: usize) -> std::result::Result<Value, MarshalError> {
    let TypeInfo::Array(info) = &param.ty else {
        return Err(MarshalError::Unsupported(marshal::type_name(&param.ty)));
    };

    // Arrays sized at build time keep that length through release
    let count = match (param.direction, frame.lengths[param.index]) {
        (Direction::InOut, Some(count)) => count,
        _ => {
            let count = frame.current_length(length)?;
            frame.lengths[param.index] = Some(count);
            count
        }
    };

    let array = if param.caller_allocates {
        frame.slot(param.index)
    } else {
        frame.scratch[param.index]
    };
    marshal::array_from_native(array, info, Some(count), param.transfer)
}

fn output_value(frame: &mut CallFrame<'_>, param: &Parameter) -> std::result::Result<Value, MarshalError> {
    if !param.caller_allocates {
        return marshal::from_native(frame.scratch[param.index], &param.ty, param.transfer);
    }

    let buffer = frame.slot(param.index);
    match &param.ty {
        TypeInfo::Struct(info) => match frame.caller_allocated[param.index].take() {
            Some(block) => Ok(Value::Boxed(Boxed::from_allocation(info.clone(), block))),
            None => Ok(Value::Null),
        },
        TypeInfo::Array(info) => {
            marshal::array_from_native(buffer, info, frame.lengths[param.index], param.transfer)
        }
        ty => {
            let value = unsafe { FfiValue::read(ty.ffi_type(), buffer.as_ptr()) };
            marshal::from_native(value, ty, param.transfer)
        }
    }
}
