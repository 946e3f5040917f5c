//! Test suite for interop module

use std::sync::Arc;

use super::*;
use crate::introspect::{ArrayInfo, ArrayLength, Direction, NativeAddress, StructInfo, Transfer, TypeInfo};
use crate::value::Value;

// Test helpers
extern "C" fn add_i32(a: i32, b: i32) -> i32 {
    a + b
}

extern "C" fn mul_f64(a: f64, b: f64) -> f64 {
    a * b
}

extern "C" fn negate_i8(a: i8) -> i8 {
    -a
}

extern "C" fn no_args() -> i32 {
    42
}

fn address(f: *const ()) -> NativeAddress {
    NativeAddress::from_ptr(f)
}

#[test]
fn test_ffi_type_sizes() {
    assert_eq!(FfiType::I8.size(), 1);
    assert_eq!(FfiType::I16.size(), 2);
    assert_eq!(FfiType::I32.size(), 4);
    assert_eq!(FfiType::I64.size(), 8);
    assert_eq!(FfiType::F32.size(), 4);
    assert_eq!(FfiType::F64.size(), 8);
    assert_eq!(FfiType::Pointer.size(), core::mem::size_of::<usize>());
}

#[test]
fn test_ffi_type_checks() {
    assert!(FfiType::I32.is_integral());
    assert!(FfiType::F64.is_float());
    assert!(!FfiType::Void.is_integral());
    assert!(!FfiType::Pointer.is_float());
}

#[test]
fn test_widen_and_narrow() {
    let v = FfiValue { i8: -3 }.widened(FfiType::I8);
    assert_eq!(unsafe { v.i64 }, -3);
    let v = FfiValue { u64: 0xffff_ff05 }.narrowed(FfiType::U8);
    assert_eq!(unsafe { v.u8 }, 5);
}

#[test]
fn test_ffi_call_no_args() {
    let sig = NativeSignature::new(address(no_args as *const ()), CallingConvention::default(), FfiType::I32, vec![]);

    let result = unsafe { sig.call(&[]) }.unwrap();
    assert_eq!(unsafe { result.i32 }, 42);
}

#[test]
fn test_ffi_call_scalars() {
    let sig = NativeSignature::new(
        address(add_i32 as *const ()),
        CallingConvention::C,
        FfiType::I32,
        vec![FfiType::I32, FfiType::I32],
    );
    let result = unsafe { sig.call(&[FfiValue { i32: 2 }, FfiValue { i32: 3 }]) }.unwrap();
    assert_eq!(unsafe { result.i32 }, 5);

    let sig = NativeSignature::new(
        address(mul_f64 as *const ()),
        CallingConvention::C,
        FfiType::F64,
        vec![FfiType::F64, FfiType::F64],
    );
    let result = unsafe { sig.call(&[FfiValue { f64: 1.5 }, FfiValue { f64: 4.0 }]) }.unwrap();
    assert_eq!(unsafe { result.f64 }, 6.0);

    let sig = NativeSignature::new(address(negate_i8 as *const ()), CallingConvention::C, FfiType::I8, vec![FfiType::I8]);
    let result = unsafe { sig.call(&[FfiValue { i8: 7 }]) }.unwrap();
    assert_eq!(unsafe { result.i8 }, -7);
}

#[test]
fn test_ffi_call_arg_count_mismatch() {
    let sig = NativeSignature::new(
        address(add_i32 as *const ()),
        CallingConvention::C,
        FfiType::I32,
        vec![FfiType::I32, FfiType::I32],
    );
    let err = unsafe { sig.call(&[FfiValue { i32: 1 }]) }.unwrap_err();
    assert_eq!(err, CallError::ArgCountMismatch { expected: 2, got: 1 });
}

#[test]
fn test_ffi_call_counts() {
    let before = stats().calls_made;
    let sig = NativeSignature::new(address(no_args as *const ()), CallingConvention::C, FfiType::I32, vec![]);
    unsafe { sig.call(&[]) }.unwrap();
    assert_eq!(stats().calls_made, before + 1);
}

#[test]
fn test_type_names() {
    assert_eq!(type_name(&TypeInfo::Int32), "int32");
    assert_eq!(type_name(&TypeInfo::zero_terminated_array(TypeInfo::Utf8)), "array of string");
    assert_eq!(type_name(&TypeInfo::structure(StructInfo::new("Geo", "Point", 8, 4))), "Geo.Point");
}

#[test]
fn test_integer_range_checks() {
    assert!(to_native(&Value::Int(127), &TypeInfo::Int8, false).is_ok());
    assert!(matches!(
        to_native(&Value::Int(128), &TypeInfo::Int8, false),
        Err(MarshalError::OutOfRange { .. })
    ));
    assert!(matches!(
        to_native(&Value::Int(-1), &TypeInfo::UInt32, false),
        Err(MarshalError::OutOfRange { .. })
    ));
    assert!(!can_convert(&Value::Int(1 << 40), &TypeInfo::Int32, false));
    assert!(can_convert(&Value::UInt(u64::MAX), &TypeInfo::UInt64, false));
}

#[test]
fn test_type_mismatch_counts_error() {
    let before = stats().marshaling_errors;
    let err = to_native(&Value::from("x"), &TypeInfo::Int32, false).unwrap_err();
    assert!(err.is_type_error());
    assert_eq!(stats().marshaling_errors, before + 1);
}

#[test]
fn test_null_handling() {
    assert!(to_native(&Value::Null, &TypeInfo::Utf8, true).unwrap().as_ptr().is_null());
    assert!(matches!(
        to_native(&Value::Null, &TypeInfo::Utf8, false),
        Err(MarshalError::UnexpectedNull(_))
    ));
    assert!(!can_convert(&Value::Null, &TypeInfo::Int32, true));
    assert_eq!(from_native(FfiValue::null(), &TypeInfo::Utf8, Transfer::Nothing).unwrap(), Value::Null);
}

#[test]
fn test_string_roundtrip_releases() {
    let before = stats();
    let slot = to_native(&Value::from("héllo"), &TypeInfo::Utf8, false).unwrap();
    assert_eq!(from_native(slot, &TypeInfo::Utf8, Transfer::Nothing).unwrap(), Value::from("héllo"));

    free_argument(slot, &TypeInfo::Utf8, ReleaseDepth::for_transfer(Direction::In, Transfer::Nothing), Origin::Engine);
    let after = stats();
    assert_eq!(after.allocations - before.allocations, 1);
    assert_eq!(after.outstanding(), before.outstanding());
}

#[test]
fn test_interior_nul_rejected() {
    assert_eq!(
        to_native(&Value::from("a\0b"), &TypeInfo::Utf8, false).unwrap_err(),
        MarshalError::InteriorNul
    );
}

#[test]
fn test_zero_terminated_array() {
    let ty = TypeInfo::zero_terminated_array(TypeInfo::Int32);
    let info = ty.as_array().unwrap().clone();
    let value = Value::Array(vec![Value::Int(4), Value::Int(5), Value::Int(6)]);

    let (slot, len) = marshal::array_to_native(&value, &info, false).unwrap();
    assert_eq!(len, 3);
    assert_eq!(from_native(slot, &ty, Transfer::Nothing).unwrap(), value);
    free_array(slot, &info, None, ReleaseDepth::Full, Origin::Engine);
}

#[test]
fn test_string_array_release_depths() {
    let info = ArrayInfo {
        element: Box::new(TypeInfo::Utf8),
        length: ArrayLength::Parameter(1),
    };
    let value = Value::Array(vec![Value::from("a"), Value::from("b")]);

    let before = stats();
    let (slot, len) = marshal::array_to_native(&value, &info, false).unwrap();
    assert_eq!(stats().allocations - before.allocations, 3);

    // Elements only: the container was taken by the callee
    free_array(slot, &info, Some(len), ReleaseDepth::Elements, Origin::Engine);
    assert_eq!(stats().releases - before.releases, 2);
    free_array(slot, &info, Some(len), ReleaseDepth::Container, Origin::Engine);
    assert_eq!(stats().outstanding(), before.outstanding());
}

#[test]
fn test_array_with_unknown_length() {
    let info = ArrayInfo {
        element: Box::new(TypeInfo::Int32),
        length: ArrayLength::Parameter(0),
    };
    let value = [1i32, 2];
    let slot = FfiValue::from_ptr(value.as_ptr() as *mut _);
    assert_eq!(
        marshal::array_from_native(slot, &info, None, Transfer::Nothing).unwrap_err(),
        MarshalError::UnknownLength
    );
    assert_eq!(
        marshal::array_from_native(slot, &info, Some(2), Transfer::Nothing).unwrap(),
        Value::Array(vec![Value::Int(1), Value::Int(2)])
    );
}

#[test]
fn test_length_helpers() {
    let slot = marshal::length_to_native(9, &TypeInfo::UInt16).unwrap();
    assert_eq!(marshal::native_to_length(slot, &TypeInfo::UInt16).unwrap(), 9);
    assert!(marshal::native_to_length(FfiValue { i32: -1 }, &TypeInfo::Int32).is_err());
}

#[test]
fn test_release_depth_table() {
    use Direction::*;
    use Transfer::*;
    assert_eq!(ReleaseDepth::for_transfer(In, Nothing), ReleaseDepth::Full);
    assert_eq!(ReleaseDepth::for_transfer(In, Container), ReleaseDepth::Elements);
    assert_eq!(ReleaseDepth::for_transfer(In, Everything), ReleaseDepth::None);
    assert_eq!(ReleaseDepth::for_transfer(Out, Nothing), ReleaseDepth::None);
    assert_eq!(ReleaseDepth::for_transfer(Out, Container), ReleaseDepth::Container);
    assert_eq!(ReleaseDepth::for_transfer(InOut, Everything), ReleaseDepth::Full);
}

#[test]
fn test_boxed_struct_borrow_and_copy() {
    let info = Arc::new(StructInfo::new("Geo", "Point", 8, 4));
    let point = Boxed::new(info.clone()).unwrap();
    unsafe {
        point.write::<i32>(0, 3);
        point.write::<i32>(4, -4);
    }
    let ty = TypeInfo::Struct(info.clone());
    let value = Value::Boxed(point.clone());

    // Borrowed on the way in, never released
    let slot = to_native(&value, &ty, false).unwrap();
    assert_eq!(slot.as_ptr(), point.as_ptr());
    free_argument(slot, &ty, ReleaseDepth::Full, Origin::Engine);

    match from_native(slot, &ty, Transfer::Everything).unwrap() {
        Value::Boxed(copy) => {
            assert!(copy.is_owned());
            assert_ne!(copy.as_ptr(), point.as_ptr());
            assert_eq!(unsafe { copy.read::<i32>(4) }, -4);
        }
        other => panic!("expected boxed value, got {:?}", other),
    }

    let other = Arc::new(StructInfo::new("Geo", "Rect", 16, 4));
    assert!(!can_convert(&value, &TypeInfo::Struct(other), false));
}

#[test]
fn test_boxed_allocation_counts() {
    let before = stats();
    {
        let block = BoxedAllocation::zeroed(32).unwrap();
        assert_eq!(block.size(), 32);
        assert_eq!(stats().outstanding(), before.outstanding() + 1);
    }
    assert_eq!(stats().outstanding(), before.outstanding());
}
