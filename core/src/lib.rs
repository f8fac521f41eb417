//! Runtime binding to an externally built scripting engine.
//!
//! The engine ships as a dynamic library exporting ten entry points. This crate
//! resolves them once per [`api::Binding`], wraps the engine's script contexts in
//! [`api::Context`], and marshals [`values::Value`]s across the boundary in both
//! directions: native code calling script functions, and the engine calling
//! registered native callbacks.
//!
//! There is no script semantics here. Compilation, execution, and type coercion
//! all happen inside the engine.

pub mod api;
pub mod values;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{
    Binding, BindingOptions, CompileError, CompileOptions, Context, ContextOptions, EntryPoints,
    Error, ErrorKind, ExecuteOptions, ExecutionState, Flags, FunctionHandle, FunctionInfo,
    Invocation, Program, Signature, SymbolNames,
};
pub use values::{
    CapacityError, DataType, Frame, MAX_PARAMETERS, NativeFunction, TypeError, Value, Variable,
};

/// Test utilities for enabling logging in tests
#[cfg(test)]
pub mod test_utils {
    /// Initialize tracing subscriber for tests with DEBUG level
    /// Call this at the start of tests where you want to see logging output
    ///
    /// # Example
    /// ```ignore
    /// #[test]
    /// fn test_callback_dispatch() {
    ///     test_utils::init_test_logging();
    ///     // ... your test code
    /// }
    /// ```
    pub fn init_test_logging() {
        use tracing_subscriber::{EnvFilter, fmt};

        // Try to initialize, ignore error if already initialized
        let _ = fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }
}
