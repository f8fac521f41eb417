//! Registration records and the callback trampoline.
//!
//! The engine sees one native callback for every registered function: the
//! [`trampoline`]. Its `userData` is the [`Registration`] the function was
//! added with, which carries the Rust closure to run.

use core::ffi::c_void;
use std::any::Any;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use hashbrown::HashMap;
use tracing::{debug, error, trace, warn};

use super::Invocation;
use super::context::Shared;
use super::invocation::ExecutionState;
use crate::values::raw::{RawData, RawVariable};
use crate::values::{DataType, Frame, NativeFunction, Value};

pub(crate) struct Registration {
    pub(crate) name: CString,
    callback: Arc<dyn NativeFunction>,
    shared: Arc<Shared>,
    return_type: Mutex<DataType>,
    /// Backing memory of the last string result handed to the engine, one
    /// slot per calling thread. The engine copies a result before the same
    /// thread can invoke the callback again, so a slot lives until then.
    result_buffers: Mutex<HashMap<ThreadId, CString>>,
}

impl Registration {
    pub(crate) fn new(name: CString, callback: Arc<dyn NativeFunction>, shared: Arc<Shared>) -> Self {
        Self {
            name,
            callback,
            shared,
            return_type: Mutex::new(DataType::NotSet),
            result_buffers: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set_return_type(&self, datatype: DataType) {
        *lock(&self.return_type) = datatype;
    }

    /// # Safety
    ///
    /// `data` must be a frame the engine handed to a callback.
    unsafe fn dispatch(&self, data: &mut RawData) {
        let state = ExecutionState::from_raw(data.state);
        let _active = self.shared.enter(state);

        // SAFETY: the engine keeps the frame's strings alive during the callback.
        let frame = unsafe { Frame::from_raw(data) };
        trace!(
            function = %frame.function_name,
            parameters = frame.len(),
            "dispatching native callback"
        );

        let mut invocation = Invocation::new(frame, state, &self.shared);
        self.callback.invoke(&mut invocation);
        let result = invocation.into_frame().result;

        self.write_result(result, &mut data.result);
    }

    fn write_result(&self, result: Value, raw: &mut RawVariable) {
        let declared = *lock(&self.return_type);
        let result = match result {
            // Engines read the payload by declared type, so never hand back an
            // empty slot for a function that promised a value.
            Value::Unset if declared != DataType::NotSet => {
                debug!(function = ?self.name, %declared, "callback left its result unset");
                zero_value(declared)
            }
            other => {
                if declared != other.datatype() && !other.is_unset() {
                    warn!(
                        function = ?self.name,
                        %declared,
                        produced = %other.datatype(),
                        "callback result does not match the declared return type"
                    );
                }
                other
            }
        };

        let mut strings = Vec::with_capacity(1);
        if let Err(e) = result.write_raw(raw, &mut strings) {
            warn!(function = ?self.name, error = %e, "dropping string result with interior NUL");
            strings.clear();
            let _ = zero_value(declared).write_raw(raw, &mut strings);
        }

        let thread = thread::current().id();
        let mut buffers = lock(&self.result_buffers);
        match strings.pop() {
            Some(buffer) => {
                buffers.insert(thread, buffer);
            }
            None => {
                buffers.remove(&thread);
            }
        }
    }
}

fn zero_value(datatype: DataType) -> Value {
    match datatype {
        DataType::NotSet => Value::Unset,
        DataType::Float => Value::Float(0.0),
        DataType::Integer => Value::Integer(0),
        DataType::String => Value::String(String::new()),
        DataType::Boolean => Value::Boolean(false),
    }
}

/// The native callback registered for every function.
///
/// Unwinding across the engine's frames is undefined behavior, so panics are
/// caught here and recorded as the context's message. The result slot is then
/// filled as if the callback had left it unset.
pub(crate) unsafe extern "system" fn trampoline(data: *mut RawData, user_data: *mut c_void) {
    if data.is_null() || user_data.is_null() {
        return;
    }
    // SAFETY: `user_data` is the `Arc<Registration>` pointer passed to
    // `AddFunction`; the context keeps it alive until after the engine
    // context is destroyed. `data` is valid for the duration of the callback.
    let (registration, data) = unsafe { (&*(user_data as *const Registration), &mut *data) };

    // SAFETY: `data` came from the engine.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { registration.dispatch(data) }));

    if let Err(payload) = outcome {
        let reason = panic_reason(payload.as_ref());
        error!(function = ?registration.name, %reason, "native callback panicked");
        data.result = RawVariable::unset();
        registration.write_result(Value::Unset, &mut data.result);
        registration.shared.record(format!(
            "native function {:?} panicked: {}",
            registration.name, reason
        ));
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic payload")
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
