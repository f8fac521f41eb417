//! Drives the C surface the way a C host would: raw pointers, raw callbacks,
//! NUL-terminated strings. The engine behind the binding is the in-process mock.

use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;

use pretty_assertions::assert_eq;
use scriptlink_capi::*;
use scriptlink_core::testing::MockEngine;
use scriptlink_core::values::MarshaledFrame;
use scriptlink_core::values::raw::{NativeCallback, RawData};
use scriptlink_core::{Binding, DataType, Frame, Value};

const SCRIPT: &str = "function Apply(x: Integer): Integer; begin Result := Scale(x); end; \
                      begin end.";

/// Multiplies its integer argument by the factor smuggled through user data.
unsafe extern "system" fn scale(data: *mut RawData, user_data: *mut c_void) {
    let data = unsafe { &mut *data };
    let input = unsafe { Value::from_raw(&data.parameters.value[0]) };
    let factor = user_data as usize as i32;
    let mut strings = Vec::new();
    Value::from(input.as_integer().unwrap() * factor)
        .write_raw(&mut data.result, &mut strings)
        .unwrap();
}

fn mock_binding() -> *mut Binding {
    Box::into_raw(Box::new(MockEngine::atomic()))
}

fn message(binding: *const Binding, context: *mut c_void) -> String {
    unsafe {
        let len = scriptlink_get_message(binding, context, ptr::null_mut(), 0);
        let mut buffer = vec![0 as c_char; len as usize + 1];
        let written = scriptlink_get_message(binding, context, buffer.as_mut_ptr(), buffer.len() as _);
        assert_eq!(written, len);
        CStr::from_ptr(buffer.as_ptr()).to_string_lossy().into_owned()
    }
}

#[test]
fn test_register_compile_and_call() {
    let binding = mock_binding();
    unsafe {
        let context = scriptlink_create_context(binding, 0);
        assert!(!context.is_null());

        let name = CString::new("Scale").unwrap();
        let function = scriptlink_add_function(
            binding,
            context,
            name.as_ptr(),
            scale as NativeCallback as *mut c_void,
            3usize as *mut c_void,
        );
        assert!(!function.is_null());

        let param = CString::new("x").unwrap();
        let integer = DataType::Integer.to_raw();
        assert_ne!(scriptlink_add_parameter(binding, context, function, param.as_ptr(), integer), 0);
        assert_ne!(scriptlink_set_return_type(binding, context, function, integer), 0);

        let script = CString::new(SCRIPT).unwrap();
        assert_ne!(scriptlink_compile(binding, context, script.as_ptr(), 0), 0);
        assert_ne!(scriptlink_execute(binding, context, 0), 0);

        let apply = CString::new("Apply").unwrap();
        let mut frame = MarshaledFrame::new(&apply, &Frame::with_args([7]).unwrap()).unwrap();
        assert_ne!(
            scriptlink_call_stateless(binding, context, apply.as_ptr(), frame.as_mut_ptr()),
            0
        );
        assert_eq!(frame.result(), Value::Integer(21));

        scriptlink_destroy_context(binding, context);
        scriptlink_unload(binding);
    }
}

#[test]
fn test_failures_are_reported_through_the_message() {
    let binding = mock_binding();
    unsafe {
        let context = scriptlink_create_context(binding, 0);

        let script = CString::new("begin").unwrap();
        assert_eq!(scriptlink_compile(binding, context, script.as_ptr(), 0), 0);
        assert!(message(binding, context).starts_with("Syntax Error"));

        let missing = CString::new("Missing").unwrap();
        let mut frame = MarshaledFrame::new(&missing, &Frame::new()).unwrap();
        assert_eq!(
            scriptlink_call(binding, context, ptr::null_mut(), missing.as_ptr(), frame.as_mut_ptr()),
            0
        );
        assert!(!message(binding, context).is_empty());

        scriptlink_destroy_context(binding, context);
        scriptlink_unload(binding);
    }
}

#[test]
fn test_null_binding_yields_failure_values() {
    let name = CString::new("F").unwrap();
    unsafe {
        assert!(scriptlink_create_context(ptr::null(), 0).is_null());
        scriptlink_destroy_context(ptr::null(), ptr::null_mut());
        assert!(
            scriptlink_add_function(
                ptr::null(),
                ptr::null_mut(),
                name.as_ptr(),
                scale as NativeCallback as *mut c_void,
                ptr::null_mut()
            )
            .is_null()
        );
        assert_eq!(scriptlink_add_parameter(ptr::null(), ptr::null_mut(), ptr::null_mut(), name.as_ptr(), 1), 0);
        assert_eq!(scriptlink_set_return_type(ptr::null(), ptr::null_mut(), ptr::null_mut(), 1), 0);
        assert_eq!(scriptlink_compile(ptr::null(), ptr::null_mut(), name.as_ptr(), 0), 0);
        assert_eq!(scriptlink_execute(ptr::null(), ptr::null_mut(), 0), 0);
        assert_eq!(scriptlink_call(ptr::null(), ptr::null_mut(), ptr::null_mut(), name.as_ptr(), ptr::null_mut()), 0);
        assert_eq!(scriptlink_call_stateless(ptr::null(), ptr::null_mut(), name.as_ptr(), ptr::null_mut()), 0);
        assert_eq!(scriptlink_get_message(ptr::null(), ptr::null_mut(), ptr::null_mut(), 0), 0);
        scriptlink_unload(ptr::null_mut());
    }
}

#[test]
fn test_null_context_never_reaches_the_engine() {
    let binding = mock_binding();
    let name = CString::new("F").unwrap();
    unsafe {
        assert!(
            scriptlink_add_function(binding, ptr::null_mut(), name.as_ptr(), scale as NativeCallback as *mut c_void, ptr::null_mut())
                .is_null()
        );
        assert_eq!(scriptlink_compile(binding, ptr::null_mut(), name.as_ptr(), 0), 0);
        assert_eq!(scriptlink_execute(binding, ptr::null_mut(), 0), 0);
        assert_eq!(scriptlink_get_message(binding, ptr::null_mut(), ptr::null_mut(), 0), 0);
        scriptlink_destroy_context(binding, ptr::null_mut());
        scriptlink_unload(binding);
    }
}

#[test]
fn test_load_failures_return_null() {
    let missing = CString::new("/nonexistent/libscriptlink-engine.so").unwrap();
    unsafe {
        assert!(scriptlink_load(ptr::null()).is_null());
        assert!(scriptlink_load(missing.as_ptr()).is_null());
    }
}
