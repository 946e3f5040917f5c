use std::sync::Arc;

use super::*;
use crate::config::InvokeConfig;
use crate::error::InvokeError;
use crate::interop::stats;
use crate::introspect::{
    ArgInfo, CallableInfo, DispatchTable, FunctionDescriptor, FunctionInfo, NativeAddress, ScopeType, Transfer,
    TypeInfo,
};
use crate::value::Value;

extern "C" fn placeholder() {}

fn address() -> NativeAddress {
    NativeAddress::from_ptr(placeholder as *const ())
}

fn function(name: &str, args: Vec<ArgInfo>, returns: TypeInfo) -> FunctionDescriptor {
    args.into_iter()
        .fold(FunctionInfo::builder("Test", name), |b, arg| b.arg(arg))
        .returns(returns)
        .address(address())
        .build()
}

fn notify_callback() -> TypeInfo {
    TypeInfo::callback(
        CallableInfo::builder("Test", "Notify")
            .arg(ArgInfo::new("data", TypeInfo::Pointer))
            .build(),
    )
}

fn kinds(plan: &CallPlan) -> Vec<ParamKind> {
    plan.parameters().iter().map(|p| p.kind).collect()
}

#[test]
fn test_plain_parameters() {
    let desc = function(
        "add",
        vec![ArgInfo::new("a", TypeInfo::Int32), ArgInfo::new("b", TypeInfo::Int32)],
        TypeInfo::Int32,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 2);
    assert_eq!(plan.out_count(), 1);
    assert_eq!(plan.total_frame_slots(), 2);
    assert_eq!(kinds(&plan), vec![ParamKind::Normal, ParamKind::Normal]);
    assert_eq!(plan.parameter(1).in_position, Some(1));
}

#[test]
fn test_array_length_hidden() {
    let desc = function(
        "sum",
        vec![
            ArgInfo::new("values", TypeInfo::array_with_length(TypeInfo::Int32, 1)),
            ArgInfo::new("n", TypeInfo::UInt32),
        ],
        TypeInfo::Int64,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 1);
    assert_eq!(kinds(&plan), vec![ParamKind::Array { length: 1 }, ParamKind::Skip]);
    assert_eq!(plan.parameter(1).in_position, None);
    // Hidden parameters still occupy a native slot
    assert_eq!(plan.total_frame_slots(), 2);
}

#[test]
fn test_length_before_array_reverts_count() {
    let desc = function(
        "sum_rev",
        vec![
            ArgInfo::new("n", TypeInfo::Int32),
            ArgInfo::new("values", TypeInfo::array_with_length(TypeInfo::Double, 0)),
        ],
        TypeInfo::Void,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 1);
    assert_eq!(plan.out_count(), 0);
    assert!(plan.parameter(0).is_skip());
    assert_eq!(plan.parameter(1).in_position, Some(0));
}

#[test]
fn test_out_array_length_reverts_output() {
    let desc = function(
        "list",
        vec![
            ArgInfo::new("items", TypeInfo::array_with_length(TypeInfo::Utf8, 1))
                .out()
                .transfer(Transfer::Everything),
            ArgInfo::new("count", TypeInfo::Int32).out(),
        ],
        TypeInfo::Void,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 0);
    assert_eq!(plan.out_count(), 1);
}

#[test]
fn test_caller_sized_buffer_keeps_length_visible() {
    let desc = function(
        "fill",
        vec![
            ArgInfo::new("buffer", TypeInfo::array_with_length(TypeInfo::UInt8, 1))
                .out()
                .caller_allocates(),
            ArgInfo::new("size", TypeInfo::UInt64),
        ],
        TypeInfo::Void,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 1);
    assert_eq!(plan.out_count(), 1);
    assert_eq!(plan.parameter(1).kind, ParamKind::Normal);
    assert_eq!(plan.parameter(1).in_position, Some(0));
}

#[test]
fn test_callback_hides_closure_and_destroy() {
    let desc = function(
        "connect",
        vec![
            ArgInfo::new("handler", notify_callback())
                .closure(1)
                .destroy(2)
                .scope(ScopeType::Durable),
            ArgInfo::new("user_data", TypeInfo::Pointer),
            ArgInfo::new("destroy", TypeInfo::DestroyNotify),
        ],
        TypeInfo::UInt64,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 1);
    assert_eq!(
        kinds(&plan),
        vec![
            ParamKind::Callback {
                closure: Some(1),
                destroy: Some(2),
                scope: ScopeType::Durable
            },
            ParamKind::Skip,
            ParamKind::Skip,
        ]
    );
}

#[test]
fn test_closure_before_callback() {
    let desc = function(
        "foreach",
        vec![
            ArgInfo::new("user_data", TypeInfo::Pointer),
            ArgInfo::new("func", notify_callback()).closure(0),
        ],
        TypeInfo::Void,
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.in_count(), 1);
    assert!(plan.parameter(0).is_skip());
    assert_eq!(plan.parameter(1).in_position, Some(0));
}

#[test]
fn test_destroy_without_closure_unsupported() {
    let desc = function(
        "broken",
        vec![
            ArgInfo::new("func", notify_callback()).destroy(1),
            ArgInfo::new("destroy", TypeInfo::DestroyNotify),
        ],
        TypeInfo::Void,
    );
    let err = CallPlan::compile(&desc).unwrap_err();

    assert_eq!(
        err,
        InvokeError::UnsupportedCallback {
            namespace: "Test".into(),
            name: "Notify".into()
        }
    );
    assert_eq!(
        err.to_string(),
        "Callback Test.Notify has a destroy notifier but no closure argument, not supported"
    );
}

#[test]
fn test_closure_index_out_of_range() {
    let desc = function(
        "foreach",
        vec![
            ArgInfo::new("func", notify_callback()).closure(7),
            ArgInfo::new("user_data", TypeInfo::Pointer),
        ],
        TypeInfo::Void,
    );
    let err = CallPlan::compile(&desc).unwrap_err();

    assert_eq!(
        err,
        InvokeError::MisplacedCallbackArgument {
            param: "func".into(),
            index: 7
        }
    );
    assert_eq!(err.to_string(), "Callback parameter func refers to argument 7, which it can't use");
}

#[test]
fn test_destroy_index_on_callback_itself() {
    let desc = function(
        "connect",
        vec![
            ArgInfo::new("handler", notify_callback())
                .closure(1)
                .destroy(0)
                .scope(ScopeType::Durable),
            ArgInfo::new("user_data", TypeInfo::Pointer),
        ],
        TypeInfo::Void,
    );

    assert_eq!(
        CallPlan::compile(&desc).unwrap_err(),
        InvokeError::MisplacedCallbackArgument {
            param: "handler".into(),
            index: 0
        }
    );
}

#[test]
fn test_return_array_length_hidden() {
    let desc = function(
        "names",
        vec![ArgInfo::new("n", TypeInfo::Int32).out()],
        TypeInfo::array_with_length(TypeInfo::Utf8, 0),
    );
    let plan = CallPlan::compile(&desc).unwrap();

    assert_eq!(plan.return_length(), Some(0));
    assert_eq!(plan.out_count(), 1);
    assert!(plan.parameter(0).is_skip());
}

#[test]
fn test_method_and_throws_slots() {
    let desc = FunctionInfo::builder("Test", "get_name")
        .method(TypeInfo::Pointer)
        .arg(ArgInfo::new("flags", TypeInfo::UInt32))
        .returns(TypeInfo::Utf8)
        .throws()
        .address(address())
        .build();
    let plan = CallPlan::compile(&desc).unwrap();

    assert!(plan.is_method());
    assert!(plan.can_throw());
    assert_eq!(plan.total_frame_slots(), 3);
    assert_eq!(plan.signature().arg_types().len(), 3);
}

#[test]
fn test_classification_is_stable() {
    let desc = function(
        "sum",
        vec![
            ArgInfo::new("values", TypeInfo::array_with_length(TypeInfo::Int32, 1)),
            ArgInfo::new("n", TypeInfo::Int32),
        ],
        TypeInfo::Int32,
    );
    let first = CallPlan::compile(&desc).unwrap();
    let second = CallPlan::compile(&desc).unwrap();

    assert_eq!(kinds(&first), kinds(&second));
    assert_eq!(first.in_count(), second.in_count());
    assert_eq!(first.out_count(), second.out_count());
}

#[test]
fn test_type_check_reports_parameter() {
    let desc = function("neg", vec![ArgInfo::new("value", TypeInfo::Int8)], TypeInfo::Int8);
    let plan = CallPlan::compile(&desc).unwrap();

    assert!(plan.type_check(&[Value::Int(-5)]).is_ok());
    assert_eq!(
        plan.type_check(&[]),
        Err(InvokeError::NotEnoughArguments { expected: 1, actual: 0 })
    );

    let err = plan.type_check(&[Value::from("x")]).unwrap_err();
    assert_eq!(err.to_string(), "Expected argument of type int8 for parameter value, got 'x'");
}

#[test]
fn test_plan_cache_shares_plans() {
    let desc = function("cached", vec![], TypeInfo::Void);
    let a = plan_for(&desc).unwrap();
    let b = plan_for(&desc).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_unresolved_entry_point() {
    let desc = FunctionInfo::builder("Test", "nowhere").build();
    assert!(matches!(CallPlan::compile(&desc), Err(InvokeError::Symbol(_))));
}

#[test]
fn test_virtual_resolution_failure() {
    let desc = FunctionInfo::builder("Test", "draw")
        .method(TypeInfo::Pointer)
        .build();
    let table = DispatchTable::new("Widget");

    let err = make_virtual_function(&desc, &table).unwrap_err();
    assert!(matches!(err, InvokeError::VirtualFunctionResolution { .. }));
    assert!(err.to_string().starts_with("Couldn't create virtual function 'draw': "));
}

#[test]
fn test_virtual_function_reserves_receiver() {
    let desc = FunctionInfo::builder("Test", "size").returns(TypeInfo::Int32).build();
    let table = DispatchTable::new("Widget").with_slot("size", address());

    let func = make_virtual_function(&desc, &table).unwrap();
    assert!(func.is_virtual());
    assert!(func.plan().unwrap().is_method());
    assert_eq!(func.plan().unwrap().total_frame_slots(), 1);
}

#[test]
fn test_unchecked_call_rejects_before_native() {
    let desc = function(
        "greet",
        vec![ArgInfo::new("name", TypeInfo::Utf8), ArgInfo::new("times", TypeInfo::Int8)],
        TypeInfo::Void,
    );
    let plan = CallPlan::compile(&desc).unwrap();
    let settings = InvokeConfig {
        type_check: false,
        ..InvokeConfig::default()
    };
    let before = stats();

    let err = function::execute_with(&plan, None, &[Value::from("world"), Value::from("x")], &settings).unwrap_err();

    assert_eq!(err.to_string(), "Expected argument of type int8 for parameter times, got 'x'");
    let after = stats();
    assert_eq!(after.calls_made, before.calls_made);
    assert_eq!(after.outstanding(), before.outstanding());
}
