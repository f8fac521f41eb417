//! Benchmarks for frame marshaling across the engine boundary.
//!
//! Runs against the in-process engine, so the numbers are dominated by this
//! crate's own work: building the raw frame, copying strings, dispatching
//! callbacks and copying results back.
//! Run with: `cargo bench --features testing` in the core/ directory.
//!
//! Benchmark groups:
//! 1. marshal_only: Frame -> raw layout -> Frame, no engine involved
//! 2. stateless_call: a full `call_stateless` round trip with N parameters
//! 3. callback_dispatch: script -> trampoline -> closure -> result

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pprof::criterion::{Output, PProfProfiler};
use scriptlink_core::api::{CompileOptions, ContextOptions, ExecuteOptions};
use scriptlink_core::testing::MockEngine;
use scriptlink_core::values::MarshaledFrame;
use scriptlink_core::{DataType, Frame, Invocation, Signature, Value};
use std::ffi::CString;

/// A script function taking `n` integers and returning their sum, e.g.
/// `function Sum3(p0: Integer; p1: Integer; p2: Integer): Integer; ...`.
fn sum_function(n: usize) -> String {
    let params: Vec<String> = (0..n).map(|i| format!("p{}: Integer", i)).collect();
    let body: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
    format!(
        "function Sum{n}({}): Integer; begin Result := {}; end;",
        params.join("; "),
        if body.is_empty() { "0".to_string() } else { body.join(" + ") },
    )
}

fn bench_marshal_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("marshal_only");
    let name = CString::new("Target").unwrap();

    for size in [1, 4, 16, 32] {
        group.throughput(Throughput::Elements(size as u64));

        let ints = Frame::with_args(0..size as i32).unwrap();
        group.bench_with_input(BenchmarkId::new("integers", size), &ints, |b, frame| {
            b.iter(|| {
                let mut marshaled = MarshaledFrame::new(&name, black_box(frame)).unwrap();
                black_box(marshaled.as_mut_ptr());
            });
        });

        let strings = Frame::with_args((0..size).map(|i| format!("parameter number {}", i))).unwrap();
        group.bench_with_input(BenchmarkId::new("strings", size), &strings, |b, frame| {
            b.iter(|| {
                let mut marshaled = MarshaledFrame::new(&name, black_box(frame)).unwrap();
                let raw = marshaled.as_mut_ptr();
                // SAFETY: `marshaled` owns every string `raw` points to.
                black_box(unsafe { Frame::from_raw(&*raw) })
            });
        });
    }

    group.finish();
}

fn bench_stateless_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("stateless_call");
    let binding = MockEngine::atomic();

    for size in [0, 4, 16, 32] {
        group.throughput(Throughput::Elements(size as u64));

        let mut context = binding.create_context(ContextOptions::default()).unwrap();
        let source = format!("{} begin end.", sum_function(size));
        context.compile(&source, CompileOptions::default()).unwrap();
        let function = format!("Sum{}", size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut frame = Frame::with_args(0..size as i32).unwrap();
                context.call_stateless(&function, &mut frame).unwrap();
                black_box(frame.result)
            });
        });
    }

    group.finish();
}

fn bench_callback_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("callback_dispatch");
    let binding = MockEngine::atomic();

    for calls in [1, 10, 100] {
        group.throughput(Throughput::Elements(calls as u64));

        let mut context = binding.create_context(ContextOptions::default()).unwrap();
        context
            .define(
                "Echo",
                Signature::new()
                    .param("text", DataType::String)
                    .returns(DataType::String),
                |call: &mut Invocation<'_>| {
                    let echoed = call.parameter(0).cloned().unwrap_or(Value::Unset);
                    call.set_result(echoed);
                },
            )
            .unwrap();
        let body = "Echo('payload');".repeat(calls);
        context
            .compile(&format!("begin {} end.", body), CompileOptions::default())
            .unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(calls), &calls, |b, _| {
            b.iter(|| context.execute(ExecuteOptions::default()).unwrap());
        });
    }

    group.finish();
}

// Configure Criterion with profiling support
criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = bench_marshal_only, bench_stateless_call, bench_callback_dispatch
}
criterion_main!(benches);
