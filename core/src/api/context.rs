//! Script contexts: isolated environments owning a registry, a compiled
//! program and a most-recent-failure message.

use core::ffi::{c_int, c_void};
use core::marker::PhantomData;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use tracing::debug;

use super::error::{classify_call_failure, classify_execute_failure};
use super::invocation::ExecutionState;
use super::registry::{Registration, lock, trampoline};
use super::{
    Binding, CompileError, CompileOptions, ContextOptions, EntryPoints, Error, ExecuteOptions,
};
use crate::values::raw::{NativeCallback, RawContext, RawFunction};
use crate::values::{DataType, Frame, MarshaledFrame, NativeFunction};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Whether a context holds a usable program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// Nothing compiled yet. Registration is allowed.
    Absent,
    /// The last compile succeeded.
    Compiled,
    /// A recompile failed after an earlier success. Whether the engine kept
    /// the earlier program is up to the engine; execution is forwarded and the
    /// engine decides.
    Indeterminate,
}

/// State reachable from both the context and its callbacks.
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) entry: EntryPoints,
    pub(crate) handle: RawContext,
    active_states: Mutex<Vec<usize>>,
    last_message: Mutex<String>,
}

// SAFETY: `handle` is an opaque token only ever passed back to the engine.
// Which engine calls may overlap is governed by `Context`'s `&`/`&mut`
// receivers, and the remaining state is behind mutexes.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    pub(crate) fn record(&self, message: impl Into<String>) {
        *lock(&self.last_message) = message.into();
    }

    fn fail(&self, error: Error) -> Error {
        self.record(error.to_string());
        error
    }

    /// Pull the engine's message and make it the current one.
    fn engine_failure(&self) -> String {
        let mut message = self.engine_message();
        if message.is_empty() {
            message = String::from("engine reported a failure without a message");
        }
        self.record(message.clone());
        message
    }

    /// Query the engine's message: length first, then the bytes.
    pub(crate) fn engine_message(&self) -> String {
        // SAFETY: a null buffer asks for the length only.
        let len = unsafe { (self.entry.get_message)(self.handle, core::ptr::null_mut(), 0) };
        let len = match usize::try_from(len) {
            Ok(0) | Err(_) => return String::new(),
            Ok(len) => len,
        };

        let mut buffer = vec![0u8; len + 1];
        let capacity = c_int::try_from(buffer.len()).unwrap_or(c_int::MAX);
        // SAFETY: `buffer` has room for `capacity` bytes.
        let written =
            unsafe { (self.entry.get_message)(self.handle, buffer.as_mut_ptr().cast(), capacity) };
        buffer.truncate(usize::try_from(written).unwrap_or(0).min(len));
        if let Some(nul) = buffer.iter().position(|&b| b == 0) {
            buffer.truncate(nul);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub(crate) fn enter(&self, state: ExecutionState) -> ActiveState<'_> {
        lock(&self.active_states).push(state.addr());
        ActiveState {
            shared: self,
            state,
        }
    }

    fn is_active(&self, state: ExecutionState) -> bool {
        state.addr() != 0 && lock(&self.active_states).contains(&state.addr())
    }

    pub(crate) fn call_reentrant(
        &self,
        state: ExecutionState,
        name: &str,
        frame: &mut Frame,
    ) -> Result<(), Error> {
        if !self.is_active(state) {
            return Err(self.fail(Error::ReentrancyViolation(format!(
                "execution state {:#x} is not live; `{}` can only be called from inside a callback",
                state.addr(),
                name
            ))));
        }
        self.call(Some(state), name, frame)
    }

    fn call(&self, state: Option<ExecutionState>, name: &str, frame: &mut Frame) -> Result<(), Error> {
        let c_name = CString::new(name).map_err(|e| self.fail(e.into()))?;
        let mut marshaled = MarshaledFrame::new(&c_name, frame).map_err(|e| self.fail(e.into()))?;

        // SAFETY: `marshaled` owns every string its raw frame points to and
        // outlives the call.
        let ok = unsafe {
            match state {
                Some(state) => (self.entry.call)(
                    self.handle,
                    state.as_raw(),
                    c_name.as_ptr(),
                    marshaled.as_mut_ptr(),
                ),
                None => {
                    (self.entry.call_stateless)(self.handle, c_name.as_ptr(), marshaled.as_mut_ptr())
                }
            }
        };
        if ok == 0 {
            return Err(classify_call_failure(name, self.engine_failure()));
        }

        // SAFETY: the callee keeps a string result alive until its next call.
        frame.result = unsafe { marshaled.result() };
        Ok(())
    }
}

/// Marks an execution state live for the duration of a callback.
pub(crate) struct ActiveState<'a> {
    shared: &'a Shared,
    state: ExecutionState,
}

impl Drop for ActiveState<'_> {
    fn drop(&mut self) {
        let mut active = lock(&self.shared.active_states);
        if let Some(pos) = active.iter().rposition(|&s| s == self.state.addr()) {
            active.remove(pos);
        }
    }
}

/// Token for a registered function, used to declare its parameters and
/// return type. Only valid with the context that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle {
    context: u64,
    index: usize,
}

/// Declared shape of a registered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    /// In call-binding order.
    pub parameters: Vec<(String, DataType)>,
    /// `NotSet` when the function returns nothing.
    pub return_type: DataType,
}

/// Parameter list and return type for [`Context::define`].
///
/// # Example
///
/// ```
/// use scriptlink_core::{DataType, Signature};
///
/// let signature = Signature::new()
///     .param("message", DataType::String)
///     .returns(DataType::String);
/// assert_eq!(signature.parameters().len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    parameters: Vec<(String, DataType)>,
    return_type: DataType,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, datatype: DataType) -> Self {
        self.parameters.push((name.into(), datatype));
        self
    }

    pub fn returns(mut self, datatype: DataType) -> Self {
        self.return_type = datatype;
        self
    }

    pub fn parameters(&self) -> &[(String, DataType)] {
        &self.parameters
    }

    pub fn return_type(&self) -> DataType {
        self.return_type
    }
}

struct Entry {
    registration: Arc<Registration>,
    raw: RawFunction,
    info: FunctionInfo,
    /// Parameter names handed to the engine.
    names: Vec<CString>,
}

/// One isolated script environment.
///
/// Created with [`Binding::create_context`]. Nothing is shared between
/// contexts: each has its own registry, compiled program and message.
///
/// Lifecycle: register functions, compile, then execute and call as often as
/// needed. Registration is refused once a compile has succeeded. Dropping the
/// context destroys the engine-side context.
///
/// # Threads
///
/// Registering, compiling and executing take `&mut self`, so a context cannot
/// be mutated from two threads at once. [`Context::call_stateless`] takes
/// `&self`: concurrent stateless calls on a compiled context are allowed here,
/// but only safe if the engine supports them.
///
/// # Destroying
///
/// The engine context is destroyed exactly once, when the `Context` is
/// dropped. Destroying it twice does not compile:
///
/// ```compile_fail
/// use scriptlink_core::api::{Binding, ContextOptions};
///
/// let binding = Binding::load("dwscript.dll")?;
/// let context = binding.create_context(ContextOptions::default())?;
/// drop(context);
/// drop(context);
/// # Ok::<(), scriptlink_core::Error>(())
/// ```
///
/// Neither does using a context after it was destroyed:
///
/// ```compile_fail
/// use scriptlink_core::api::{Binding, ContextOptions};
///
/// let binding = Binding::load("dwscript.dll")?;
/// let context = binding.create_context(ContextOptions::default())?;
/// drop(context);
/// let _ = context.message();
/// # Ok::<(), scriptlink_core::Error>(())
/// ```
pub struct Context<'lib> {
    shared: Arc<Shared>,
    program: Program,
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    _binding: PhantomData<&'lib Binding>,
}

// SAFETY: the raw function handles in `entries` are opaque tokens passed back
// to the engine only through `&mut self` methods.
unsafe impl Send for Context<'_> {}
unsafe impl Sync for Context<'_> {}

impl<'lib> Context<'lib> {
    pub(crate) fn new(binding: &'lib Binding, options: ContextOptions) -> Result<Self, Error> {
        let entry = *binding.entry_points();
        // SAFETY: plain call into the engine.
        let handle = unsafe { (entry.create_context)(options.flags.to_raw()) };
        if handle.is_null() {
            return Err(Error::CreationFailure(format!(
                "engine rejected context flags {:?}",
                options.flags
            )));
        }

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(context = id, flags = ?options.flags, "created script context");
        Ok(Self {
            shared: Arc::new(Shared {
                id,
                entry,
                handle,
                active_states: Mutex::new(Vec::new()),
                last_message: Mutex::new(String::new()),
            }),
            program: Program::Absent,
            entries: Vec::new(),
            by_name: HashMap::new(),
            _binding: PhantomData,
        })
    }

    /// Process-unique id of this context.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn program(&self) -> Program {
        self.program
    }

    pub fn is_compiled(&self) -> bool {
        self.program == Program::Compiled
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Make a native function callable from scripts under `name`.
    ///
    /// Must happen before [`Context::compile`] succeeds.
    pub fn add_function<F>(&mut self, name: &str, function: F) -> Result<FunctionHandle, Error>
    where
        F: NativeFunction + 'static,
    {
        self.add_shared_function(name, Arc::new(function))
    }

    /// Like [`Context::add_function`], for a callback that may be registered
    /// under several names. Every name invokes the same callback.
    pub fn add_shared_function(
        &mut self,
        name: &str,
        function: Arc<dyn NativeFunction>,
    ) -> Result<FunctionHandle, Error> {
        self.ensure_registrable()?;
        if name.is_empty() {
            return Err(self.fail(Error::registration("function name must not be empty")));
        }
        let c_name = CString::new(name).map_err(|e| self.fail(e.into()))?;

        let registration = Arc::new(Registration::new(c_name, function, self.shared.clone()));
        let callback: NativeCallback = trampoline;
        // SAFETY: the registration is kept alive in `self.entries` until after
        // the engine context is destroyed.
        let raw = unsafe {
            (self.shared.entry.add_function)(
                self.shared.handle,
                registration.name.as_ptr(),
                callback as *mut c_void,
                Arc::as_ptr(&registration) as *mut c_void,
            )
        };
        if raw.is_null() {
            return Err(Error::RegistrationFailure(self.shared.engine_failure()));
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            registration,
            raw,
            info: FunctionInfo {
                name: name.to_string(),
                parameters: Vec::new(),
                return_type: DataType::NotSet,
            },
            names: Vec::new(),
        });
        self.by_name.insert(name.to_string(), index);
        debug!(context = self.shared.id, function = name, "registered native function");

        Ok(FunctionHandle {
            context: self.shared.id,
            index,
        })
    }

    /// Append a parameter to a registered function. Order defines positional
    /// binding.
    pub fn add_parameter(
        &mut self,
        function: FunctionHandle,
        name: &str,
        datatype: DataType,
    ) -> Result<(), Error> {
        let index = self.resolve(function)?;
        self.ensure_registrable()?;
        if datatype == DataType::NotSet {
            return Err(self.fail(Error::registration(format!(
                "parameter `{}` needs a concrete datatype",
                name
            ))));
        }
        let c_name = CString::new(name).map_err(|e| self.fail(e.into()))?;

        let entry = &self.entries[index];
        // SAFETY: `c_name` is kept alive alongside the registration.
        let ok = unsafe {
            (self.shared.entry.add_parameter)(
                self.shared.handle,
                entry.raw,
                c_name.as_ptr(),
                datatype.to_raw(),
            )
        };
        if ok == 0 {
            return Err(Error::RegistrationFailure(self.shared.engine_failure()));
        }

        let entry = &mut self.entries[index];
        entry.names.push(c_name);
        entry.info.parameters.push((name.to_string(), datatype));
        Ok(())
    }

    /// Declare the type the function stores into its result. Without this the
    /// function is treated as returning nothing.
    pub fn set_return_type(
        &mut self,
        function: FunctionHandle,
        datatype: DataType,
    ) -> Result<(), Error> {
        let index = self.resolve(function)?;
        self.ensure_registrable()?;

        let entry = &self.entries[index];
        // SAFETY: plain call into the engine.
        let ok = unsafe {
            (self.shared.entry.set_return_type)(self.shared.handle, entry.raw, datatype.to_raw())
        };
        if ok == 0 {
            return Err(Error::RegistrationFailure(self.shared.engine_failure()));
        }

        let entry = &mut self.entries[index];
        entry.registration.set_return_type(datatype);
        entry.info.return_type = datatype;
        Ok(())
    }

    /// Register a function together with its parameters and return type.
    pub fn define<F>(
        &mut self,
        name: &str,
        signature: Signature,
        function: F,
    ) -> Result<FunctionHandle, Error>
    where
        F: NativeFunction + 'static,
    {
        let handle = self.add_function(name, function)?;
        for (param, datatype) in &signature.parameters {
            self.add_parameter(handle, param, *datatype)?;
        }
        if signature.return_type != DataType::NotSet {
            self.set_return_type(handle, signature.return_type)?;
        }
        Ok(handle)
    }

    /// Declared shape of the function last registered under `name`.
    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.by_name.get(name).map(|&i| &self.entries[i].info)
    }

    /// Every registration, in registration order.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.entries.iter().map(|e| &e.info)
    }

    fn resolve(&self, function: FunctionHandle) -> Result<usize, Error> {
        if function.context != self.shared.id || function.index >= self.entries.len() {
            return Err(self.fail(Error::registration(
                "function handle belongs to another context",
            )));
        }
        Ok(function.index)
    }

    fn ensure_registrable(&self) -> Result<(), Error> {
        match self.program {
            Program::Absent => Ok(()),
            Program::Compiled | Program::Indeterminate => Err(self.fail(Error::registration(
                "functions can only be registered before the script is compiled",
            ))),
        }
    }

    // ========================================================================
    // Compilation and execution
    // ========================================================================

    /// Compile `source`, replacing any previously compiled program.
    ///
    /// On failure the error carries the engine's message and, when reported,
    /// the line and column.
    pub fn compile(&mut self, source: &str, options: CompileOptions) -> Result<(), Error> {
        let c_source = CString::new(source).map_err(|e| self.fail(e.into()))?;
        debug!(
            context = self.shared.id,
            bytes = source.len(),
            flags = ?options.flags,
            "compiling script"
        );

        // SAFETY: `c_source` outlives the call.
        let ok = unsafe {
            (self.shared.entry.compile)(self.shared.handle, c_source.as_ptr(), options.flags.to_raw())
        };
        if ok == 0 {
            if self.program != Program::Absent {
                self.program = Program::Indeterminate;
            }
            return Err(CompileError::from_message(self.shared.engine_failure()).into());
        }

        self.program = Program::Compiled;
        Ok(())
    }

    /// Run the compiled script's main body. Blocks until it finishes;
    /// registered callbacks run on this thread.
    pub fn execute(&mut self, options: ExecuteOptions) -> Result<(), Error> {
        self.ensure_program("execute")?;
        debug!(context = self.shared.id, flags = ?options.flags, "executing script");

        // SAFETY: plain call into the engine; callbacks reach their
        // registrations through `userData`.
        let ok = unsafe { (self.shared.entry.execute)(self.shared.handle, options.flags.to_raw()) };
        if ok == 0 {
            return Err(classify_execute_failure(self.shared.engine_failure()));
        }
        Ok(())
    }

    /// Call a script function without a running execution.
    ///
    /// Only meant for functions that do not touch global script state; the
    /// engine alone decides what happens otherwise.
    pub fn call_stateless(&self, name: &str, frame: &mut Frame) -> Result<(), Error> {
        self.ensure_program("call_stateless")?;
        self.shared.call(None, name, frame)
    }

    /// Call a script function from within a callback's execution.
    ///
    /// `state` must belong to a callback that is still running; anything else
    /// fails with [`Error::ReentrancyViolation`] without reaching the engine.
    ///
    /// Registered callbacks are `'static` and [`Context::execute`] borrows the
    /// context mutably, so no caller can reach this method while one of its
    /// states is live on the same thread. In practice it only reports
    /// [`Error::ReentrancyViolation`]; re-entrant calls go through
    /// [`Invocation::call`](super::Invocation::call).
    pub fn call(&self, state: ExecutionState, name: &str, frame: &mut Frame) -> Result<(), Error> {
        self.shared.call_reentrant(state, name, frame)
    }

    fn ensure_program(&self, operation: &str) -> Result<(), Error> {
        if self.program == Program::Absent {
            return Err(self.fail(Error::NotCompiled(format!(
                "{} requires a successfully compiled script",
                operation
            ))));
        }
        Ok(())
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// The most recent failure description. Each failure overwrites it.
    pub fn message(&self) -> String {
        lock(&self.shared.last_message).clone()
    }

    /// Copy the current message into `buffer`.
    ///
    /// With `None`, returns the message length in bytes. Otherwise copies
    /// `min(len, buffer.len())` bytes and returns how many were written. No
    /// terminator is added.
    pub fn message_into(&self, buffer: Option<&mut [u8]>) -> usize {
        let message = lock(&self.shared.last_message);
        match buffer {
            None => message.len(),
            Some(buffer) => {
                let n = message.len().min(buffer.len());
                buffer[..n].copy_from_slice(&message.as_bytes()[..n]);
                n
            }
        }
    }

    /// The message the engine itself currently holds.
    pub fn engine_message(&self) -> String {
        self.shared.engine_message()
    }

    fn fail(&self, error: Error) -> Error {
        self.shared.fail(error)
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        debug!(context = self.shared.id, "destroying script context");
        // SAFETY: the handle came from `CreateContext` and is destroyed once.
        // Registrations are released afterwards, when `entries` drops.
        unsafe { (self.shared.entry.destroy_context)(self.shared.handle) };
    }
}

impl core::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.shared.id)
            .field("program", &self.program)
            .field("functions", &self.entries.len())
            .finish()
    }
}
