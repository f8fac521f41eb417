//! Public error types for the binding API.
//!
//! Binding-level failures (`LoadFailure`, `MissingSymbol`) leave nothing
//! behind. Every context-level failure is also recorded as the context's
//! current message, so callers that prefer the pull-style protocol can keep
//! using [`Context::message`](super::Context::message).

use std::path::PathBuf;

use thiserror::Error;

use crate::values::CapacityError;

/// Public error type for all binding operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine library could not be located or loaded.
    #[error("cannot load engine library `{}`: {source}", .path.display())]
    LoadFailure {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The engine library does not export a required entry point.
    #[error("engine library `{}` does not export `{symbol}`", .path.display())]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    /// The engine refused to create a context (e.g. unsupported flags).
    #[error("context creation failed: {0}")]
    CreationFailure(String),

    /// A function, parameter or return type could not be registered.
    #[error("registration failed: {0}")]
    RegistrationFailure(String),

    #[error(transparent)]
    CompileFailure(#[from] CompileError),

    /// Execution or a call was attempted before a successful compile.
    #[error("no compiled program: {0}")]
    NotCompiled(String),

    #[error("no script function `{name}`: {message}")]
    NoSuchFunction { name: String, message: String },

    /// Parameters did not bind to the script function's declaration.
    #[error("cannot bind arguments to `{name}`: {message}")]
    ArityOrTypeMismatch { name: String, message: String },

    /// A re-entrant call was attempted outside a live callback.
    #[error("re-entrant call outside of a callback: {0}")]
    ReentrancyViolation(String),

    /// The engine reported a failure while running the script body.
    #[error("execution failed: {0}")]
    ExecutionFailure(String),

    /// A call failed for a reason outside the other categories.
    #[error("call to `{name}` failed: {message}")]
    CallFailure { name: String, message: String },

    /// A string with an interior NUL cannot cross the boundary.
    #[error("string contains an interior NUL byte at offset {position}")]
    InvalidString { position: usize },

    #[error(transparent)]
    TooManyParameters(#[from] CapacityError),
}

/// The failure taxonomy, without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LoadFailure,
    MissingSymbol,
    CreationFailure,
    RegistrationFailure,
    CompileFailure,
    NotCompiled,
    NoSuchFunction,
    ArityOrTypeMismatch,
    ReentrancyViolation,
    ExecutionFailure,
    CallFailure,
    InvalidString,
    TooManyParameters,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LoadFailure { .. } => ErrorKind::LoadFailure,
            Error::MissingSymbol { .. } => ErrorKind::MissingSymbol,
            Error::CreationFailure(_) => ErrorKind::CreationFailure,
            Error::RegistrationFailure(_) => ErrorKind::RegistrationFailure,
            Error::CompileFailure(_) => ErrorKind::CompileFailure,
            Error::NotCompiled(_) => ErrorKind::NotCompiled,
            Error::NoSuchFunction { .. } => ErrorKind::NoSuchFunction,
            Error::ArityOrTypeMismatch { .. } => ErrorKind::ArityOrTypeMismatch,
            Error::ReentrancyViolation(_) => ErrorKind::ReentrancyViolation,
            Error::ExecutionFailure(_) => ErrorKind::ExecutionFailure,
            Error::CallFailure { .. } => ErrorKind::CallFailure,
            Error::InvalidString { .. } => ErrorKind::InvalidString,
            Error::TooManyParameters(_) => ErrorKind::TooManyParameters,
        }
    }

    pub(crate) fn registration(message: impl Into<String>) -> Self {
        Error::RegistrationFailure(message.into())
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(err: std::ffi::NulError) -> Self {
        Error::InvalidString {
            position: err.nul_position(),
        }
    }
}

/// A compile failure, with the position the engine reported if any.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    /// The engine's message, verbatim.
    pub message: String,
    /// 1-based line, if the message carried one.
    pub line: Option<u32>,
    /// 1-based column, if the message carried one.
    pub column: Option<u32>,
}

impl CompileError {
    /// Parse an engine message, picking up a `[line: N, column: M]` suffix.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let (line, column) = parse_position(&message);
        Self {
            message,
            line,
            column,
        }
    }

    /// Byte offset of the reported position within `source`.
    pub fn offset_in(&self, source: &str) -> Option<usize> {
        let line = self.line? as usize;
        let column = self.column.unwrap_or(1) as usize;
        let line_start: usize = source
            .split_inclusive('\n')
            .take(line.checked_sub(1)?)
            .map(str::len)
            .sum();
        let line_text = source[line_start..].split('\n').next().unwrap_or("");
        let mut offset = line_start + column.saturating_sub(1).min(line_text.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        Some(offset)
    }
}

fn parse_position(message: &str) -> (Option<u32>, Option<u32>) {
    let Some(start) = message.rfind("[line:") else {
        return (None, None);
    };
    let tail = &message[start + "[line:".len()..];
    let Some(end) = tail.find(']') else {
        return (None, None);
    };
    let mut parts = tail[..end].split(',');
    let line = parts.next().and_then(|p| p.trim().parse().ok());
    let column = parts
        .next()
        .and_then(|p| p.trim().strip_prefix("column:"))
        .and_then(|p| p.trim().parse().ok());
    (line, column)
}

/// Map an engine failure message from `call`/`call_stateless` onto the taxonomy.
///
/// The engine reports failures only as text, so this matches on the wording
/// engines use for each condition. Anything unrecognized is a `CallFailure`.
pub fn classify_call_failure(name: &str, message: String) -> Error {
    // Quoted names are user text and must not steer the classification.
    let lower = without_quoted(&message).to_ascii_lowercase();
    let name = name.to_string();
    if lower.contains("not compiled") {
        Error::NotCompiled(message)
    } else if lower.contains("execution state") {
        Error::ReentrancyViolation(message)
    } else if ["not found", "unknown", "undeclared", "no such"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        Error::NoSuchFunction { name, message }
    } else if ["parameter", "argument", "incompatible", "type"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        Error::ArityOrTypeMismatch { name, message }
    } else {
        Error::CallFailure { name, message }
    }
}

/// Drop every `"..."` segment, e.g. `Function "X" not found` -> `Function  not found`.
fn without_quoted(message: &str) -> String {
    message
        .split('"')
        .step_by(2)
        .collect()
}

/// Map an engine failure message from `execute` onto the taxonomy.
pub fn classify_execute_failure(message: String) -> Error {
    if message.to_ascii_lowercase().contains("not compiled") {
        Error::NotCompiled(message)
    } else {
        Error::ExecutionFailure(message)
    }
}
