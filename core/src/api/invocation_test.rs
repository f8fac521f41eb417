use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use super::*;
use crate::testing::MockEngine;
use crate::values::raw::RawState;
use crate::values::{DataType, Frame, Value};

#[test]
fn test_execution_state_round_trip() {
    let raw = 0x40_usize as RawState;
    let state = ExecutionState::from_raw(raw);
    assert_eq!(state.as_raw(), raw);
    assert_eq!(state.addr(), 0x40);
    assert_eq!(state, ExecutionState::from_raw(raw));
    assert_ne!(state, ExecutionState::from_raw(0x80_usize as RawState));
}

#[test]
fn test_invocation_view() {
    let binding = MockEngine::atomic();
    let mut context = binding.create_context(ContextOptions::default()).unwrap();
    let context_id = context.id();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    context
        .define(
            "Describe",
            Signature::new()
                .param("label", DataType::String)
                .param("count", DataType::Integer)
                .returns(DataType::String),
            move |call: &mut Invocation<'_>| {
                assert_eq!(call.context_id(), context_id);
                assert!(call.result().is_unset());

                let label = call.parameter(0).cloned().unwrap_or_default();
                let count = call.parameter(1).and_then(|v| v.as_integer().ok()).unwrap_or(0);
                sink.lock().unwrap().push((
                    call.function_name().to_string(),
                    call.parameters().len(),
                    call.parameter(2).is_none(),
                ));

                // Callbacks may rewrite their copy of the frame freely.
                call.frame_mut().clear();
                call.set_result(format!("{} x{}", label, count));
            },
        )
        .unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let results_sink = results.clone();
    context
        .define(
            "Keep",
            Signature::new().param("text", DataType::String),
            move |call: &mut Invocation<'_>| {
                results_sink
                    .lock()
                    .unwrap()
                    .extend(call.parameter(0).cloned());
            },
        )
        .unwrap();

    context
        .compile("begin Keep(Describe('apples', 3)); end.", CompileOptions::default())
        .unwrap();
    context.execute(ExecuteOptions::default()).unwrap();

    assert_eq!(
        *observed.lock().unwrap(),
        vec![("Describe".to_string(), 2, true)]
    );
    assert_eq!(*results.lock().unwrap(), vec![Value::from("apples x3")]);
}

#[test]
fn test_states_differ_between_executions() {
    let binding = MockEngine::atomic();
    let mut context = binding.create_context(ContextOptions::default()).unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    context
        .add_function("Mark", move |call: &mut Invocation<'_>| {
            sink.lock().unwrap().push(call.state());
        })
        .unwrap();
    context
        .compile("begin Mark; Mark; end.", CompileOptions::default())
        .unwrap();
    context.execute(ExecuteOptions::default()).unwrap();
    context.execute(ExecuteOptions::default()).unwrap();

    let states = states.lock().unwrap();
    assert_eq!(states.len(), 4);
    assert_eq!(states[0], states[1]);
    assert_ne!(states[1], states[2]);
}

#[test]
fn test_nested_callbacks_see_the_same_state() {
    let binding = MockEngine::atomic();
    let mut context = binding.create_context(ContextOptions::default()).unwrap();

    let states = Arc::new(Mutex::new(Vec::new()));
    let outer = states.clone();
    context
        .add_function("Outer", move |call: &mut Invocation<'_>| {
            outer.lock().unwrap().push(call.state());
            call.call("Middle", &mut Frame::new()).unwrap();
        })
        .unwrap();
    let inner = states.clone();
    context
        .add_function("Inner", move |call: &mut Invocation<'_>| {
            inner.lock().unwrap().push(call.state());
        })
        .unwrap();

    context
        .compile(
            "function Middle; begin Inner; end; begin Outer; end.",
            CompileOptions::default(),
        )
        .unwrap();
    context.execute(ExecuteOptions::default()).unwrap();

    let states = states.lock().unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], states[1]);
}
