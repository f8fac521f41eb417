//! Configuration options for bindings and contexts.

use bitflags::bitflags;

bitflags! {
    /// Capability requests forwarded to the engine.
    ///
    /// Each operation only honors the flags that apply to it; the engine
    /// rejects combinations it does not support.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct Flags: u32 {
        /// Accelerated (JIT) compilation. Compile time.
        const JITTER = 1 << 0;
        /// OLE automation support in the script environment. Context creation time.
        const OLE = 1 << 1;
        /// Inline assembler support, needs an external assembler on the host. Execute time.
        const ASM = 1 << 2;
    }
}

impl Flags {
    pub(crate) fn to_raw(self) -> core::ffi::c_int {
        self.bits() as core::ffi::c_int
    }
}

/// Names under which the engine library exports its entry points.
///
/// The defaults match an undecorated export table. Libraries built with
/// decorated `stdcall` names (e.g. `_Compile@12`) need overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNames {
    pub create_context: String,
    pub destroy_context: String,
    pub add_function: String,
    pub add_parameter: String,
    pub set_return_type: String,
    pub compile: String,
    pub execute: String,
    pub call: String,
    pub call_stateless: String,
    pub get_message: String,
}

impl Default for SymbolNames {
    fn default() -> Self {
        Self {
            create_context: "CreateContext".into(),
            destroy_context: "DestroyContext".into(),
            add_function: "AddFunction".into(),
            add_parameter: "AddParameter".into(),
            set_return_type: "SetReturnType".into(),
            compile: "Compile".into(),
            execute: "Execute".into(),
            call: "Call".into(),
            call_stateless: "CallStateless".into(),
            get_message: "GetMessage".into(),
        }
    }
}

/// Configuration options for loading an engine library.
///
/// # Example
///
/// ```
/// use scriptlink_core::api::{BindingOptions, SymbolNames};
///
/// let options = BindingOptions {
///     symbols: SymbolNames {
///         compile: "_Compile@12".into(),
///         ..SymbolNames::default()
///     },
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct BindingOptions {
    /// Exported names to resolve.
    ///
    /// Default: [`SymbolNames::default()`]
    pub symbols: SymbolNames,
}

/// Configuration options for context creation.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Typically [`Flags::OLE`].
    pub flags: Flags,
}

/// Configuration options for compilation.
///
/// Flags may only request acceleration; they never change semantics.
///
/// # Example
///
/// ```
/// use scriptlink_core::api::{CompileOptions, Flags};
///
/// let options = CompileOptions { flags: Flags::JITTER };
/// ```
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub flags: Flags,
}

/// Configuration options for execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Typically empty, or [`Flags::ASM`].
    pub flags: Flags,
}
