//! Variant values crossing the native/script boundary.

use core::ffi::{CStr, c_char, c_int};
use core::fmt;
use std::ffi::{CString, NulError};

use super::raw::{RawPayload, RawVariable};

/// Type tag of a [`Value`], numbered as the engine numbers it.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    NotSet = 0,
    Float = 1,
    Integer = 2,
    String = 3,
    Boolean = 4,
}

impl DataType {
    /// Decode an engine datatype. Unknown values (including the invalid
    /// sentinel) yield `None`.
    pub fn from_raw(raw: c_int) -> Option<DataType> {
        match raw {
            0 => Some(DataType::NotSet),
            1 => Some(DataType::Float),
            2 => Some(DataType::Integer),
            3 => Some(DataType::String),
            4 => Some(DataType::Boolean),
            _ => None,
        }
    }

    pub fn to_raw(self) -> c_int {
        self as c_int
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::NotSet => "Not set",
            DataType::Float => "Float",
            DataType::Integer => "Integer",
            DataType::String => "String",
            DataType::Boolean => "Boolean",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned by the typed accessors when the value holds another variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeError {
    Mismatch { expected: DataType, found: DataType },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch { expected, found } => {
                write!(f, "expected {} value, found {}", expected, found)
            }
        }
    }
}

impl core::error::Error for TypeError {}

/// A tagged variant: one of float, integer, string or boolean, or no value yet.
///
/// `Unset` is a legitimate final state for a result a callback chose not to
/// populate.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Unset,
    Float(f32),
    Integer(i32),
    String(String),
    Boolean(bool),
}

impl Value {
    pub fn datatype(&self) -> DataType {
        match self {
            Value::Unset => DataType::NotSet,
            Value::Float(_) => DataType::Float,
            Value::Integer(_) => DataType::Integer,
            Value::String(_) => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    /// Extract a float value.
    ///
    /// Returns error if value is not a Float.
    pub fn as_float(&self) -> Result<f32, TypeError> {
        match self {
            Value::Float(f) => Ok(*f),
            other => Err(other.mismatch(DataType::Float)),
        }
    }

    /// Extract an integer value.
    ///
    /// Returns error if value is not an Integer.
    pub fn as_integer(&self) -> Result<i32, TypeError> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.mismatch(DataType::Integer)),
        }
    }

    /// Extract a string value.
    ///
    /// Returns error if value is not a String.
    pub fn as_str(&self) -> Result<&str, TypeError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(DataType::String)),
        }
    }

    /// Extract a boolean value.
    ///
    /// Returns error if value is not a Boolean.
    pub fn as_bool(&self) -> Result<bool, TypeError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch(DataType::Boolean)),
        }
    }

    fn mismatch(&self, expected: DataType) -> TypeError {
        TypeError::Mismatch {
            expected,
            found: self.datatype(),
        }
    }

    /// Copy a value out of engine memory.
    ///
    /// Strings are copied immediately, so the result does not borrow from the
    /// producer. A null string pointer reads as an empty string.
    ///
    /// # Safety
    ///
    /// If `raw.datatype` is `String`, `raw.payload.s` must be null or point to
    /// a NUL-terminated buffer that stays valid for the duration of this call.
    pub unsafe fn from_raw(raw: &RawVariable) -> Value {
        // SAFETY: the datatype tag selects which union field the producer wrote.
        unsafe {
            match DataType::from_raw(raw.datatype) {
                Some(DataType::NotSet) => Value::Unset,
                Some(DataType::Float) => Value::Float(raw.payload.f),
                Some(DataType::Integer) => Value::Integer(raw.payload.i),
                Some(DataType::Boolean) => Value::Boolean(raw.payload.b != 0),
                Some(DataType::String) => Value::String(read_c_str(raw.payload.s)),
                None => {
                    tracing::warn!(datatype = raw.datatype, "engine produced unknown datatype");
                    Value::Unset
                }
            }
        }
    }

    /// Write this value into engine memory.
    ///
    /// String payloads are copied into a `CString` pushed onto `strings`; the
    /// caller keeps `strings` alive until the consumer is done reading.
    /// The name field of `raw` is left untouched.
    pub fn write_raw(&self, raw: &mut RawVariable, strings: &mut Vec<CString>) -> Result<(), NulError> {
        raw.datatype = self.datatype().to_raw();
        raw.payload = match self {
            Value::Unset => RawPayload { s: core::ptr::null_mut() },
            Value::Float(f) => RawPayload { f: *f },
            Value::Integer(i) => RawPayload { i: *i },
            Value::Boolean(b) => RawPayload { b: *b as c_int },
            Value::String(s) => {
                let owned = CString::new(s.as_str())?;
                // The heap buffer of a CString does not move when the CString does.
                let ptr = owned.as_ptr() as *mut c_char;
                strings.push(owned);
                RawPayload { s: ptr }
            }
        };
        Ok(())
    }
}

/// Copy a possibly-null C string into an owned `String`.
///
/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated buffer.
pub(crate) unsafe fn read_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: upheld by the caller.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unset => write!(f, "<unset>"),
            Value::Float(v) => write!(f, "{:.2}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// A named value, as used for parameters. A bare result has an empty name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// A nameless variable, for positional arguments.
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            name: String::new(),
            value: value.into(),
        }
    }

    /// # Safety
    ///
    /// `raw.name` must be null or a valid C string, and the payload must
    /// satisfy [`Value::from_raw`].
    pub unsafe fn from_raw(raw: &RawVariable) -> Variable {
        // SAFETY: upheld by the caller.
        unsafe {
            Variable {
                name: read_c_str(raw.name),
                value: Value::from_raw(raw),
            }
        }
    }

    /// Write name and value into engine memory; see [`Value::write_raw`].
    pub fn write_raw(&self, raw: &mut RawVariable, strings: &mut Vec<CString>) -> Result<(), NulError> {
        raw.name = if self.name.is_empty() {
            core::ptr::null()
        } else {
            let owned = CString::new(self.name.as_str())?;
            let ptr = owned.as_ptr();
            strings.push(owned);
            ptr
        };
        self.value.write_raw(raw, strings)
    }
}
