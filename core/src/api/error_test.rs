use pretty_assertions::assert_eq;

use super::*;
use crate::values::CapacityError;

#[test]
fn test_compile_error_position() {
    let err = CompileError::from_message("Syntax Error: \";\" expected [line: 12, column: 5]");
    assert_eq!(err.line, Some(12));
    assert_eq!(err.column, Some(5));
    assert_eq!(err.to_string(), "Syntax Error: \";\" expected [line: 12, column: 5]");
}

#[test]
fn test_compile_error_without_position() {
    let err = CompileError::from_message("Out of memory");
    assert_eq!((err.line, err.column), (None, None));
    assert_eq!(err.offset_in("begin end."), None);

    let err = CompileError::from_message("Broken [line: x, column: 1]");
    assert_eq!((err.line, err.column), (None, Some(1)));

    let err = CompileError::from_message("Only a line [line: 3]");
    assert_eq!((err.line, err.column), (Some(3), None));
}

#[test]
fn test_compile_error_offset() {
    let source = "begin\n  Foo(1);\nend.";
    let err = CompileError::from_message("Unknown name \"Foo\" [line: 2, column: 3]");
    assert_eq!(err.offset_in(source), Some(8));
    assert_eq!(&source[8..11], "Foo");

    // Columns past the end of the line stop at the line end.
    let err = CompileError::from_message("x [line: 1, column: 99]");
    assert_eq!(err.offset_in(source), Some(5));

    // Lines past the end of the source stop at its end.
    let err = CompileError::from_message("x [line: 9, column: 1]");
    assert_eq!(err.offset_in(source), Some(source.len()));
}

#[test]
fn test_classify_call_failure() {
    let kind = |message: &str| classify_call_failure("F", message.to_string()).kind();

    assert_eq!(kind("Script is not compiled"), ErrorKind::NotCompiled);
    assert_eq!(kind("Invalid execution state"), ErrorKind::ReentrancyViolation);
    assert_eq!(kind("Function \"F\" not found"), ErrorKind::NoSuchFunction);
    assert_eq!(kind("Unknown name \"F\""), ErrorKind::NoSuchFunction);
    assert_eq!(kind("Parameter count mismatch"), ErrorKind::ArityOrTypeMismatch);
    assert_eq!(kind("Incompatible types: Integer and String"), ErrorKind::ArityOrTypeMismatch);
    assert_eq!(kind("Access violation"), ErrorKind::CallFailure);
}

#[test]
fn test_quoted_names_do_not_steer_classification() {
    let kind = |message: &str| classify_call_failure("F", message.to_string()).kind();

    assert_eq!(
        kind("Incompatible parameter type: \"unknown\" expects Integer, got String"),
        ErrorKind::ArityOrTypeMismatch
    );
    assert_eq!(kind("Function \"unknown\" not found"), ErrorKind::NoSuchFunction);
    assert_eq!(
        kind("Native function \"not found\" failed"),
        ErrorKind::CallFailure
    );
}

#[test]
fn test_classified_errors_keep_the_message() {
    let err = classify_call_failure("Double", "Function \"Double\" not found".to_string());
    assert_eq!(
        err.to_string(),
        "no script function `Double`: Function \"Double\" not found"
    );
}

#[test]
fn test_classify_execute_failure() {
    assert_eq!(
        classify_execute_failure("Script is not compiled".to_string()).kind(),
        ErrorKind::NotCompiled
    );
    assert_eq!(
        classify_execute_failure("Runtime Error: Division by zero".to_string()).kind(),
        ErrorKind::ExecutionFailure
    );
}

#[test]
fn test_conversions() {
    let err: Error = std::ffi::CString::new("ab\0").unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::InvalidString);
    assert_eq!(err.to_string(), "string contains an interior NUL byte at offset 2");

    let err: Error = CapacityError { limit: 32 }.into();
    assert_eq!(err.kind(), ErrorKind::TooManyParameters);
    assert_eq!(err.to_string(), "call frame holds at most 32 parameters");

    let err: Error = CompileError::from_message("bad").into();
    assert_eq!(err.kind(), ErrorKind::CompileFailure);
    assert_eq!(err.to_string(), "bad");
}
