//! Call frames: the parameter/result exchange unit of every call.

use core::ffi::{CStr, c_int};
use core::fmt;
use std::ffi::{CString, NulError};

use smallvec::SmallVec;

use super::raw::{RAW_PARAMETER_SLOTS, RawData, RawVariable};
use super::value::{Value, Variable, read_c_str};

/// Maximum number of parameters a frame can carry across the boundary.
pub const MAX_PARAMETERS: usize = RAW_PARAMETER_SLOTS;

/// Returned when pushing a parameter onto a full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError {
    pub limit: usize,
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call frame holds at most {} parameters", self.limit)
    }
}

impl core::error::Error for CapacityError {}

/// Ordered parameters plus one result.
///
/// Outgoing calls fill `parameters` and read `result` afterwards. Callbacks
/// read `parameters` and fill `result`. A frame is built per call and is not
/// meant to outlive it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Name of the function that triggered a callback. Empty on outgoing frames.
    pub function_name: String,
    parameters: SmallVec<[Variable; 4]>,
    pub result: Value,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame of positional arguments.
    pub fn with_args<I, V>(args: I) -> Result<Self, CapacityError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut frame = Frame::new();
        for arg in args {
            frame.push(Variable::positional(arg))?;
        }
        Ok(frame)
    }

    pub fn push(&mut self, parameter: Variable) -> Result<(), CapacityError> {
        if self.parameters.len() >= MAX_PARAMETERS {
            return Err(CapacityError {
                limit: MAX_PARAMETERS,
            });
        }
        self.parameters.push(parameter);
        Ok(())
    }

    /// Push a positional argument.
    pub fn arg(&mut self, value: impl Into<Value>) -> Result<&mut Self, CapacityError> {
        self.push(Variable::positional(value))?;
        Ok(self)
    }

    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }

    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index).map(|p| &p.value)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
        self.result = Value::Unset;
    }

    /// Copy the incoming half of an engine frame (function name and
    /// parameters) into owned memory. The result starts out unset.
    ///
    /// At most [`MAX_PARAMETERS`] parameters are read; a count outside
    /// `0..=MAX_PARAMETERS` is clamped.
    ///
    /// # Safety
    ///
    /// The function name, and the names and string payloads of the first
    /// `count` parameters, must be null or valid C strings for the duration
    /// of this call.
    pub unsafe fn from_raw(raw: &RawData) -> Frame {
        let count = clamp_count(raw.parameters.count);
        // SAFETY: upheld by the caller.
        unsafe {
            Frame {
                function_name: read_c_str(raw.function_name),
                parameters: raw.parameters.value[..count]
                    .iter()
                    .map(|p| Variable::from_raw(p))
                    .collect(),
                result: Value::Unset,
            }
        }
    }
}

fn clamp_count(count: c_int) -> usize {
    match usize::try_from(count) {
        Ok(n) if n <= MAX_PARAMETERS => n,
        _ => {
            tracing::warn!(count, "parameter count out of range, clamping");
            usize::try_from(count).map_or(0, |_| MAX_PARAMETERS)
        }
    }
}

/// A frame translated into engine layout, together with every C string the
/// layout points to.
///
/// The strings are owned here, so the raw frame is valid exactly as long as
/// this value lives. Build it right before the call and drop it after copying
/// the result out.
pub struct MarshaledFrame {
    raw: Box<RawData>,
    _strings: Vec<CString>,
}

impl MarshaledFrame {
    pub fn new(name: &CStr, frame: &Frame) -> Result<Self, NulError> {
        let mut raw = Box::new(RawData::empty());
        let mut strings = Vec::with_capacity(frame.len() + 1);

        let name = name.to_owned();
        raw.function_name = name.as_ptr();
        strings.push(name);

        // `Frame::push` enforces the capacity, so the slots always suffice.
        for (slot, parameter) in raw.parameters.value.iter_mut().zip(frame.parameters()) {
            parameter.write_raw(slot, &mut strings)?;
        }
        raw.parameters.count = frame.len() as c_int;
        raw.result = RawVariable::unset();

        Ok(Self {
            raw,
            _strings: strings,
        })
    }

    pub fn as_mut_ptr(&mut self) -> *mut RawData {
        &mut *self.raw
    }

    /// Copy the result produced by the callee.
    ///
    /// # Safety
    ///
    /// A string result must still point to memory the callee keeps alive.
    pub unsafe fn result(&self) -> Value {
        // SAFETY: upheld by the caller.
        unsafe { Value::from_raw(&self.raw.result) }
    }
}

// Counts are never above 32, so this cannot truncate.
static_assertions::const_assert!(MAX_PARAMETERS <= c_int::MAX as usize);
