//! Virtual functions
//!
//! Same plan, frame and executor as plain functions, but the entry point
//! comes from an implementing type's dispatch table and the receiver slot is
//! always reserved.

use crate::error::{InvokeError, Result};
use crate::introspect::{DispatchTable, FunctionDescriptor};
use crate::logging::debug;

use super::function::NativeFunction;
use super::plan::CallPlan;

/// Build a callable for the implementation of `info` in `implementor`
pub fn make_virtual_function(info: &FunctionDescriptor, implementor: &DispatchTable) -> Result<NativeFunction> {
    let address = info
        .virtual_address(implementor)
        .map_err(|reason| InvokeError::VirtualFunctionResolution {
            name: info.name().to_string(),
            reason,
        })?;

    let plan = CallPlan::compile_virtual(info, address)?;
    debug!(
        function = %info.name(),
        implementor = %implementor.type_name(),
        address = ?address,
        "Virtual function resolved"
    );
    Ok(NativeFunction::with_plan(plan, implementor.type_name()))
}
