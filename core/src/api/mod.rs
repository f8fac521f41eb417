//! Public API for driving a scripting engine library.
//!
//! The surface has three layers:
//!
//! 1. **Binding**: one loaded library and its resolved entry points.
//! 2. **Context**: an isolated environment with its own registry, program and
//!    message. Owned by the caller, borrows the binding.
//! 3. **Invocation**: what a native callback sees while the engine runs it,
//!    including the execution state needed for re-entrant calls.
//!
//! # Example
//!
//! ```no_run
//! use scriptlink_core::api::{Binding, CompileOptions, ContextOptions, ExecuteOptions};
//! use scriptlink_core::{DataType, Frame, Signature};
//!
//! let binding = Binding::load("dwscript.dll")?;
//! let mut context = binding.create_context(ContextOptions::default())?;
//!
//! context.define(
//!     "PrintString",
//!     Signature::new().param("text", DataType::String),
//!     |call: &mut scriptlink_core::Invocation<'_>| {
//!         if let Some(text) = call.parameter(0) {
//!             println!("{}", text);
//!         }
//!     },
//! )?;
//!
//! context.compile(
//!     "function Twice(x: Integer): Integer; begin Result := x * 2; end; begin PrintString('hi'); end.",
//!     CompileOptions::default(),
//! )?;
//! context.execute(ExecuteOptions::default())?;
//!
//! let mut frame = Frame::with_args([21])?;
//! context.call_stateless("Twice", &mut frame)?;
//! assert_eq!(frame.result.as_integer(), Ok(42));
//! # Ok::<(), scriptlink_core::Error>(())
//! ```

pub mod binding;
pub mod context;
pub mod error;
pub mod invocation;
pub mod options;
mod registry;

pub use binding::{Binding, EntryPoints};
pub use context::{Context, FunctionHandle, FunctionInfo, Program, Signature};
pub use error::{
    CompileError, Error, ErrorKind, classify_call_failure, classify_execute_failure,
};
pub use invocation::{ExecutionState, Invocation};
pub use options::{
    BindingOptions, CompileOptions, ContextOptions, ExecuteOptions, Flags, SymbolNames,
};

#[cfg(test)]
mod binding_test;
#[cfg(test)]
mod error_test;
#[cfg(test)]
mod invocation_test;
