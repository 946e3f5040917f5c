//! Resource reclamation
//!
//! Runs when a frame is dropped: after a successful call, after a reported
//! failure, after a failed build and while unwinding. Only parameters that
//! were built are released, each at most once.

use crate::ffi::dyninvoke_error_free;
use crate::interop::{marshal, FfiValue, Origin, ReleaseDepth};
use crate::introspect::{ArrayInfo, Direction, Transfer, TypeInfo};
use crate::logging::trace;

use super::frame::CallFrame;
use super::plan::{ParamKind, Parameter};

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        // Reported but never collected
        if !self.failure.is_null() {
            unsafe { dyninvoke_error_free(*self.failure) };
            *self.failure = core::ptr::null_mut();
        }

        let plan = self.plan;
        for param in plan.parameters() {
            if !self.built[param.index] {
                continue;
            }
            self.built[param.index] = false;

            match param.kind {
                ParamKind::Skip => {}
                // Durable callbacks left the frame if the call went ahead
                ParamKind::Callback { .. } => drop(self.callbacks[param.index].take()),
                ParamKind::Array { length } => self.release_array(param, length),
                ParamKind::Normal => self.release_value(param),
            }
        }

        // Released through the structured layer; never freed as scratch
        self.caller_allocated.clear();

        if let Some(ret) = self.return_value.take() {
            let descriptor = plan.descriptor();
            let depth = ReleaseDepth::for_transfer(Direction::Out, descriptor.return_transfer());
            match descriptor.return_type() {
                TypeInfo::Array(info) => {
                    let length = self
                        .return_length
                        .or_else(|| plan.return_length().and_then(|l| self.current_length(l).ok()));
                    marshal::free_array(ret, info, length, depth, Origin::Native);
                }
                ty => marshal::free_argument(ret, ty, depth, Origin::Native),
            }
        }

        trace!(function = %plan.name(), "Call frame reclaimed");
    }
}

impl CallFrame<'_> {
    /// Value to release for a parameter, with its depth and origin
    ///
    /// INOUT values: a callee taking everything handed back a value of its
    /// own, otherwise the engine-made input is what remains to be released.
    fn released_value(&self, param: &Parameter) -> (FfiValue, ReleaseDepth, Origin) {
        let executed = self.return_value.is_some();
        match param.direction {
            // The callee never saw the inputs
            Direction::In if !executed => (self.slot(param.index), ReleaseDepth::Full, Origin::Engine),
            Direction::InOut if !executed => (self.originals[param.index], ReleaseDepth::Full, Origin::Engine),
            Direction::In => (
                self.slot(param.index),
                ReleaseDepth::for_transfer(Direction::In, param.transfer),
                Origin::Engine,
            ),
            Direction::Out => (
                self.scratch[param.index],
                ReleaseDepth::for_transfer(Direction::Out, param.transfer),
                Origin::Native,
            ),
            Direction::InOut if param.transfer == Transfer::Everything => {
                (self.scratch[param.index], ReleaseDepth::Full, Origin::Native)
            }
            Direction::InOut => (
                self.originals[param.index],
                ReleaseDepth::for_transfer(Direction::In, param.transfer),
                Origin::Engine,
            ),
        }
    }

    fn release_value(&mut self, param: &Parameter) {
        if param.direction == Direction::Out && param.caller_allocates {
            if let TypeInfo::Array(info) = &param.ty {
                self.release_buffer_contents(param, info, self.lengths[param.index]);
            }
            return;
        }

        let (value, depth, origin) = self.released_value(param);
        marshal::free_argument(value, &param.ty, depth, origin);
    }

    fn release_array(&mut self, param: &Parameter, length: usize) {
        let TypeInfo::Array(info) = &param.ty else { return };

        let count = self.lengths[param.index].or_else(|| self.current_length(length).ok());
        if param.direction == Direction::Out && param.caller_allocates {
            self.release_buffer_contents(param, info, count);
            return;
        }

        let (value, depth, origin) = self.released_value(param);
        marshal::free_array(value, info, count, depth, origin);
    }

    /// The buffer goes with its allocation; only transferred elements are ours
    fn release_buffer_contents(&self, param: &Parameter, info: &ArrayInfo, count: Option<usize>) {
        if ReleaseDepth::for_transfer(Direction::Out, param.transfer) == ReleaseDepth::Full {
            marshal::free_array(self.slot(param.index), info, count, ReleaseDepth::Elements, Origin::Native);
        }
    }
}
