//! scriptlink - Native bindings to a dynamically loaded scripting engine
//!
//! # Overview
//!
//! The engine is an external dynamic library exporting ten entry points.
//! scriptlink loads it, keeps its script contexts behind a safe [`Context`],
//! and moves [`Value`]s across the boundary in both directions:
//!
//! - Host code registers native callbacks that scripts can call
//! - Host code calls script functions, with or without a live execution
//! - Callbacks call back into the script that is running them
//!
//! # Quick Start
//!
//! ```no_run
//! use scriptlink::{Binding, CompileOptions, ContextOptions, ExecuteOptions};
//! use scriptlink::{DataType, Frame, Invocation, Signature};
//!
//! let binding = Binding::load("dwscript.dll").unwrap();
//! let mut context = binding.create_context(ContextOptions::default()).unwrap();
//!
//! context
//!     .define(
//!         "PrintString",
//!         Signature::new().param("message", DataType::String),
//!         |call: &mut Invocation<'_>| {
//!             if let Some(message) = call.parameter(0) {
//!                 println!("{}", message);
//!             }
//!         },
//!     )
//!     .unwrap();
//!
//! let source = "function Double(x: Integer): Integer; begin Result := x * 2; end; \
//!               begin PrintString('ready'); end.";
//! context.compile(source, CompileOptions::default()).unwrap();
//! context.execute(ExecuteOptions::default()).unwrap();
//!
//! let mut frame = Frame::with_args([21]).unwrap();
//! context.call_stateless("Double", &mut frame).unwrap();
//! assert_eq!(frame.result.as_integer().unwrap(), 42);
//! ```
//!
//! # Diagnostics
//!
//! Compile failures carry the engine's message and, when the engine reports
//! one, a line and column. [`render_error`] turns them into a report pointing
//! into the script.

mod error_renderer;

// Re-export public API from scriptlink_core
pub use scriptlink_core::api::{
    Binding, BindingOptions, CompileError, CompileOptions, Context, ContextOptions, EntryPoints,
    Error, ErrorKind, ExecuteOptions, ExecutionState, Flags, FunctionHandle, FunctionInfo,
    Invocation, Program, Signature, SymbolNames,
};

// Re-export the value model
pub use scriptlink_core::values::{
    self, CapacityError, DataType, Frame, MAX_PARAMETERS, NativeFunction, TypeError, Value,
    Variable,
};

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};
