//! Invocation benchmarks
//!
//! Measures plan compilation and the per-call marshaling overhead.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dyninvoke::invoke::{clear_plans, plan_for, CallPlan};
use dyninvoke::{ArgInfo, FunctionDescriptor, FunctionInfo, NativeAddress, NativeFunction, TypeInfo, Value};
use std::ffi::{c_char, CStr};

extern "C" fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

unsafe extern "C" fn sum(values: *const i64, n: u32) -> i64 {
    (0..n as usize).map(|i| *values.add(i)).sum()
}

unsafe extern "C" fn length(s: *const c_char) -> u64 {
    CStr::from_ptr(s).to_bytes().len() as u64
}

fn add_descriptor() -> FunctionDescriptor {
    FunctionInfo::builder("Bench", "add")
        .arg(ArgInfo::new("a", TypeInfo::Int32))
        .arg(ArgInfo::new("b", TypeInfo::Int32))
        .returns(TypeInfo::Int32)
        .address(NativeAddress::from_ptr(add as *const ()))
        .build()
}

fn bench_plan(c: &mut Criterion) {
    let desc = add_descriptor();

    c.bench_function("plan_compile", |b| {
        b.iter(|| black_box(CallPlan::compile(&desc).unwrap()))
    });

    c.bench_function("plan_cached", |b| {
        clear_plans();
        b.iter(|| black_box(plan_for(&desc).unwrap()))
    });
}

fn bench_scalar_call(c: &mut Criterion) {
    let func = NativeFunction::new(add_descriptor());
    let args = [Value::Int(2), Value::Int(3)];

    c.bench_function("call_add_i32", |b| {
        b.iter(|| black_box(func.call(black_box(&args)).unwrap()))
    });
}

fn bench_array_call(c: &mut Criterion) {
    let func = NativeFunction::new(
        FunctionInfo::builder("Bench", "sum")
            .arg(ArgInfo::new("values", TypeInfo::array_with_length(TypeInfo::Int64, 1)))
            .arg(ArgInfo::new("n", TypeInfo::UInt32))
            .returns(TypeInfo::Int64)
            .address(NativeAddress::from_ptr(sum as *const ()))
            .build(),
    );

    let mut group = c.benchmark_group("call_sum_array");
    for size in [8, 64, 512] {
        let args = [Value::Array((0..size).map(Value::from).collect())];
        group.bench_with_input(BenchmarkId::from_parameter(size), &args, |b, args| {
            b.iter(|| black_box(func.call(args).unwrap()))
        });
    }
    group.finish();
}

fn bench_string_call(c: &mut Criterion) {
    let func = NativeFunction::new(
        FunctionInfo::builder("Bench", "length")
            .arg(ArgInfo::new("s", TypeInfo::Utf8))
            .returns(TypeInfo::UInt64)
            .address(NativeAddress::from_ptr(length as *const ()))
            .build(),
    );
    let args = [Value::from("the quick brown fox jumps over the lazy dog")];

    c.bench_function("call_string", |b| {
        b.iter(|| black_box(func.call(&args).unwrap()))
    });
}

criterion_group!(benches, bench_plan, bench_scalar_call, bench_array_call, bench_string_call);
criterion_main!(benches);
