use proptest::prelude::*;

use dyninvoke::invoke::CallPlan;
use dyninvoke::{stats, ArgInfo, FunctionInfo, NativeAddress, NativeFunction, TypeInfo, Value};

extern "C" fn echo_i32(v: i32) -> i32 {
    v
}

extern "C" fn echo_i16(v: i16) -> i16 {
    v
}

unsafe extern "C" fn sum(values: *const i64, n: u32) -> i64 {
    (0..n as usize).map(|i| *values.add(i)).sum()
}

fn echo(name: &str, f: *const (), ty: TypeInfo) -> NativeFunction {
    NativeFunction::new(
        FunctionInfo::builder("Test", name)
            .arg(ArgInfo::new("value", ty.clone()))
            .returns(ty)
            .address(NativeAddress::from_ptr(f))
            .build(),
    )
}

fn sum_function() -> NativeFunction {
    NativeFunction::new(
        FunctionInfo::builder("Test", "sum")
            .arg(ArgInfo::new("values", TypeInfo::array_with_length(TypeInfo::Int64, 1)))
            .arg(ArgInfo::new("n", TypeInfo::UInt32))
            .returns(TypeInfo::Int64)
            .address(NativeAddress::from_ptr(sum as *const ()))
            .build(),
    )
}

proptest! {
    #[test]
    fn prop_echo_i32(v in any::<i32>()) {
        let func = echo("echo_i32", echo_i32 as *const (), TypeInfo::Int32);
        prop_assert_eq!(func.call(&[Value::from(v)]).unwrap(), Value::Int(v as i64));
    }

    #[test]
    fn prop_i16_range_checked(v in any::<i32>()) {
        let func = echo("echo_i16", echo_i16 as *const (), TypeInfo::Int16);
        let result = func.call(&[Value::from(v)]);
        if i16::try_from(v).is_ok() {
            prop_assert_eq!(result.unwrap(), Value::Int(v as i64));
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn prop_array_sum_balanced(values in prop::collection::vec(-1_000_000i64..1_000_000, 0..32)) {
        let func = sum_function();
        let expected: i64 = values.iter().sum();
        let before = stats();

        let args = [Value::Array(values.into_iter().map(Value::from).collect())];
        prop_assert_eq!(func.call(&args).unwrap(), Value::Int(expected));
        prop_assert_eq!(stats().outstanding(), before.outstanding());
    }

    #[test]
    fn prop_classification_idempotent(length_first in any::<bool>(), extra in 0usize..4) {
        let mut builder = FunctionInfo::builder("Test", "shape");
        let (array_index, length_index) = if length_first { (1, 0) } else { (0, 1) };
        let array = ArgInfo::new("values", TypeInfo::array_with_length(TypeInfo::Int32, length_index));
        let length = ArgInfo::new("n", TypeInfo::Int32);
        builder = if array_index == 0 { builder.arg(array).arg(length) } else { builder.arg(length).arg(array) };
        for i in 0..extra {
            builder = builder.arg(ArgInfo::new(format!("x{i}"), TypeInfo::Double));
        }
        let desc = builder.address(NativeAddress::from_ptr(sum as *const ())).build();

        let first = CallPlan::compile(&desc).unwrap();
        let second = CallPlan::compile(&desc).unwrap();
        prop_assert_eq!(first.in_count(), 1 + extra);
        prop_assert_eq!(first.in_count(), second.in_count());
        prop_assert_eq!(first.out_count(), second.out_count());
        prop_assert!(first.parameter(length_index).is_skip());
        prop_assert_eq!(first.total_frame_slots(), 2 + extra);
    }
}
