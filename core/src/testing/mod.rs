//! An in-process engine for tests and benchmarks.
//!
//! Implements all ten entry points over a small Pascal-like language, so the
//! binding layer can be exercised without an engine library on disk:
//!
//! ```text
//! function Double(v: Integer): Integer;
//! begin
//!   Result := v * 2;
//! end;
//!
//! begin
//!   PrintString('ready');
//! end.
//! ```
//!
//! Declarations come first, then the main block. Expressions are literals,
//! parameters and locals, calls, and left-associative `+ - *`. Parameter types
//! are matched strictly: an Integer argument does not bind to a Float
//! parameter.
//!
//! Failure messages follow the wording of real engines (`Script is not
//! compiled`, `Function "X" not found`, `Invalid execution state`, compile
//! errors ending in `[line: N, column: M]`).

mod engine;
mod script;

use crate::api::{Binding, EntryPoints};

/// What happens to a compiled program when a recompile fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recompile {
    /// The previous program stays installed.
    #[default]
    Atomic,
    /// The context is left without a program.
    Discarding,
}

/// Factory for bindings backed by the in-process engine.
///
/// # Example
///
/// ```
/// use scriptlink_core::api::{CompileOptions, ContextOptions};
/// use scriptlink_core::testing::MockEngine;
/// use scriptlink_core::Frame;
///
/// let binding = MockEngine::atomic();
/// let mut context = binding.create_context(ContextOptions::default())?;
/// context.compile(
///     "function Double(v: Integer): Integer; begin Result := v * 2; end; begin end.",
///     CompileOptions::default(),
/// )?;
///
/// let mut frame = Frame::with_args([21])?;
/// context.call_stateless("Double", &mut frame)?;
/// assert_eq!(frame.result.as_integer(), Ok(42));
/// # Ok::<(), scriptlink_core::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MockEngine;

impl MockEngine {
    pub fn entry_points(recompile: Recompile) -> EntryPoints {
        engine::entry_points(recompile)
    }

    pub fn binding(recompile: Recompile) -> Binding {
        // SAFETY: every entry point is implemented in this crate with the
        // declared signature and lives for the whole program.
        unsafe { Binding::from_entry_points(Self::entry_points(recompile)) }
    }

    /// An engine whose failed recompiles keep the previous program.
    pub fn atomic() -> Binding {
        Self::binding(Recompile::Atomic)
    }

    /// An engine whose failed recompiles discard the previous program.
    pub fn discarding() -> Binding {
        Self::binding(Recompile::Discarding)
    }
}
