//! What a native callback sees while the engine is calling it.

use super::Error;
use super::context::Shared;
use crate::values::raw::RawState;
use crate::values::{Frame, Value, Variable};

/// Identity of one in-flight execution.
///
/// Handed to every callback. It is only meaningful while that callback runs;
/// keeping it around and using it later fails with
/// [`Error::ReentrancyViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionState(usize);

impl ExecutionState {
    pub(crate) fn from_raw(raw: RawState) -> Self {
        Self(raw as usize)
    }

    pub(crate) fn as_raw(self) -> RawState {
        self.0 as RawState
    }

    pub(crate) fn addr(self) -> usize {
        self.0
    }
}

/// A call from the engine into a native function.
///
/// Holds an owned copy of the incoming parameters, the result slot the
/// callback fills, and the execution state needed to call back into the
/// script.
pub struct Invocation<'a> {
    frame: Frame,
    state: ExecutionState,
    shared: &'a Shared,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(frame: Frame, state: ExecutionState, shared: &'a Shared) -> Self {
        Self {
            frame,
            state,
            shared,
        }
    }

    /// The script-visible name this call came in through.
    pub fn function_name(&self) -> &str {
        &self.frame.function_name
    }

    pub fn parameters(&self) -> &[Variable] {
        self.frame.parameters()
    }

    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.frame.parameter(index)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn result(&self) -> &Value {
        &self.frame.result
    }

    pub fn set_result(&mut self, value: impl Into<Value>) {
        self.frame.result = value.into();
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Id of the context that is calling, see [`Context::id`](super::Context::id).
    pub fn context_id(&self) -> u64 {
        self.shared.id
    }

    /// Call a script function from inside this callback.
    ///
    /// Binds `frame`'s parameters positionally, blocks until the script
    /// function returns, and stores its return value in `frame.result`.
    pub fn call(&self, name: &str, frame: &mut Frame) -> Result<(), Error> {
        self.shared.call_reentrant(self.state, name, frame)
    }

    pub(crate) fn into_frame(self) -> Frame {
        self.frame
    }
}
