use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use super::*;
use crate::testing::{MockEngine, Recompile};

#[test]
fn test_load_missing_library() {
    let path = Path::new("/nonexistent/libscriptlink-engine.so");
    let err = Binding::load(path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert!(err.to_string().contains("libscriptlink-engine.so"));

    let Error::LoadFailure { path: reported, .. } = err else {
        panic!("expected a load failure");
    };
    assert_eq!(reported, path);
}

#[cfg(unix)]
#[test]
fn test_missing_symbol_unloads() {
    // The test binary itself is a loadable image without any engine exports.
    let this = libloading::os::unix::Library::this();
    let err = Binding::from_library(
        this.into(),
        PathBuf::from("<self>"),
        &SymbolNames::default(),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingSymbol);
    let Error::MissingSymbol { symbol, .. } = &err else {
        panic!("expected a missing symbol, got {:?}", err);
    };
    assert_eq!(symbol, "CreateContext");
    assert_eq!(
        err.to_string(),
        "engine library `<self>` does not export `CreateContext`"
    );
}

#[cfg(unix)]
#[test]
fn test_symbol_overrides_are_used() {
    let this = libloading::os::unix::Library::this();
    let symbols = SymbolNames {
        create_context: "_CreateContext@4".to_string(),
        ..SymbolNames::default()
    };
    let err = Binding::from_library(this.into(), PathBuf::from("<self>"), &symbols).unwrap_err();
    let Error::MissingSymbol { symbol, .. } = err else {
        panic!("expected a missing symbol");
    };
    assert_eq!(symbol, "_CreateContext@4");
}

#[test]
fn test_default_symbol_names() {
    let names = SymbolNames::default();
    let resolved: Vec<&str> = [
        &names.create_context,
        &names.destroy_context,
        &names.add_function,
        &names.add_parameter,
        &names.set_return_type,
        &names.compile,
        &names.execute,
        &names.call,
        &names.call_stateless,
        &names.get_message,
    ]
    .into_iter()
    .map(|name| name.as_str())
    .collect();
    assert_eq!(
        resolved,
        vec![
            "CreateContext",
            "DestroyContext",
            "AddFunction",
            "AddParameter",
            "SetReturnType",
            "Compile",
            "Execute",
            "Call",
            "CallStateless",
            "GetMessage",
        ]
    );
}

#[test]
fn test_in_process_binding() {
    let binding = MockEngine::binding(Recompile::Atomic);
    assert_eq!(binding.path(), None);
    assert!(format!("{:?}", binding).contains("loaded: false"));

    // Entry points are plain pointers and can seed a second binding.
    let copy = unsafe { Binding::from_entry_points(*binding.entry_points()) };
    let mut context = copy.create_context(ContextOptions::default()).unwrap();
    context.compile("begin end.", CompileOptions::default()).unwrap();
    drop(context);

    copy.unload();
    binding.unload();
}

#[test]
fn test_several_bindings_side_by_side() {
    let atomic = MockEngine::atomic();
    let discarding = MockEngine::discarding();
    let source = "function One: Integer; begin Result := 1; end; begin end.";

    let mut a = atomic.create_context(ContextOptions::default()).unwrap();
    let mut b = discarding.create_context(ContextOptions::default()).unwrap();
    a.compile(source, CompileOptions::default()).unwrap();
    b.compile(source, CompileOptions::default()).unwrap();

    assert!(a.compile("begin", CompileOptions::default()).is_err());
    assert!(b.compile("begin", CompileOptions::default()).is_err());

    let mut frame = crate::Frame::new();
    assert!(a.call_stateless("One", &mut frame).is_ok());
    assert!(b.call_stateless("One", &mut frame).is_err());
}
