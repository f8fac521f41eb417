//! The test engine's contexts and its ten exported operations.

use core::ffi::{CStr, c_char, c_int, c_void};
use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;

use super::Recompile;
use super::script::{self, BinaryOp, Callee, Expr, Script, Statement};
use crate::api::EntryPoints;
use crate::values::raw::{
    NativeCallback, RawContext, RawData, RawFunction, RawState,
};
use crate::values::{DataType, MAX_PARAMETERS, Value, Variable};

const JITTER: c_int = 1;
const OLE: c_int = 2;
const ASM: c_int = 4;
const KNOWN_FLAGS: c_int = JITTER | OLE | ASM;

static NEXT_STATE: AtomicUsize = AtomicUsize::new(0x1000);

pub(crate) fn entry_points(recompile: Recompile) -> EntryPoints {
    EntryPoints {
        create_context,
        destroy_context,
        add_function,
        add_parameter,
        set_return_type,
        compile: match recompile {
            Recompile::Atomic => compile_atomic,
            Recompile::Discarding => compile_discarding,
        },
        execute,
        call,
        call_stateless,
        get_message,
    }
}

#[derive(Clone)]
struct Native {
    name: CString,
    callback: NativeCallback,
    user_data: usize,
    params: Vec<(CString, DataType)>,
    return_type: DataType,
}

struct Program {
    script: Script,
    /// Registry snapshot taken at compile time; registration is closed after.
    natives: Vec<Native>,
}

#[derive(Default)]
struct Registry {
    natives: Vec<Native>,
    sealed: bool,
}

/// One engine-side context. Handed out as a raw pointer.
///
/// Locks are never held while a native callback runs, so callbacks can call
/// back into the same context.
#[derive(Default)]
struct MockContext {
    registry: Mutex<Registry>,
    program: Mutex<Option<Arc<Program>>>,
    message: Mutex<String>,
    live_states: Mutex<Vec<usize>>,
    /// String results returned to callers, kept until the context is destroyed.
    retained: Mutex<Vec<CString>>,
}

impl MockContext {
    fn report(&self, outcome: Result<(), String>) -> c_int {
        match outcome {
            Ok(()) => 1,
            Err(message) => {
                *lock(&self.message) = message;
                0
            }
        }
    }

    fn add_function(
        &self,
        name: Option<&CStr>,
        function: *mut c_void,
        user_data: *mut c_void,
    ) -> Result<usize, String> {
        let mut registry = lock(&self.registry);
        if registry.sealed {
            return Err(String::from("Cannot add functions after compilation"));
        }
        let name = name
            .filter(|n| !n.is_empty())
            .ok_or("Function name must not be empty")?;
        if function.is_null() {
            return Err(String::from("Native callback must not be null"));
        }

        // SAFETY: AddFunction is documented to take a `NativeCallback`.
        let callback = unsafe { core::mem::transmute::<*mut c_void, NativeCallback>(function) };
        registry.natives.push(Native {
            name: name.to_owned(),
            callback,
            user_data: user_data as usize,
            params: Vec::new(),
            return_type: DataType::NotSet,
        });
        Ok(registry.natives.len())
    }

    fn add_parameter(
        &self,
        function: RawFunction,
        name: Option<&CStr>,
        datatype: c_int,
    ) -> Result<(), String> {
        let mut registry = lock(&self.registry);
        if registry.sealed {
            return Err(String::from("Cannot add parameters after compilation"));
        }
        let native = native_mut(&mut registry, function)?;
        let datatype = DataType::from_raw(datatype)
            .filter(|d| *d != DataType::NotSet)
            .ok_or_else(|| format!("Invalid parameter datatype {}", datatype))?;
        let name = name
            .filter(|n| !n.is_empty())
            .ok_or("Parameter name must not be empty")?;
        if native.params.len() >= MAX_PARAMETERS {
            return Err(format!("More than {} parameters", MAX_PARAMETERS));
        }
        native.params.push((name.to_owned(), datatype));
        Ok(())
    }

    fn set_return_type(&self, function: RawFunction, datatype: c_int) -> Result<(), String> {
        let mut registry = lock(&self.registry);
        if registry.sealed {
            return Err(String::from("Cannot change return types after compilation"));
        }
        let native = native_mut(&mut registry, function)?;
        native.return_type = DataType::from_raw(datatype)
            .ok_or_else(|| format!("Invalid return datatype {}", datatype))?;
        Ok(())
    }

    fn compile(&self, source: Option<&CStr>, flags: c_int, recompile: Recompile) -> Result<(), String> {
        let built = self.build(source, flags);
        let mut program = lock(&self.program);
        match built {
            Ok(built) => {
                *program = Some(Arc::new(built));
                lock(&self.registry).sealed = true;
                Ok(())
            }
            Err(message) => {
                if recompile == Recompile::Discarding {
                    *program = None;
                }
                Err(message)
            }
        }
    }

    fn build(&self, source: Option<&CStr>, flags: c_int) -> Result<Program, String> {
        if flags & !KNOWN_FLAGS != 0 {
            return Err(format!("Unsupported compile flags {}", flags));
        }
        let source = source
            .ok_or("No script source")?
            .to_str()
            .map_err(|_| String::from("Script source is not valid UTF-8"))?;

        let natives = lock(&self.registry).natives.clone();
        let declared: Vec<(String, usize)> = natives
            .iter()
            .map(|n| (n.name.to_string_lossy().into_owned(), n.params.len()))
            .collect();
        let script = script::parse(source, &declared)?;
        Ok(Program { script, natives })
    }

    fn current(&self) -> Result<Arc<Program>, String> {
        lock(&self.program)
            .clone()
            .ok_or_else(|| String::from("Script is not compiled"))
    }

    fn execute(&self, flags: c_int) -> Result<(), String> {
        if flags & ASM != 0 {
            return Err(String::from("Assembler support is not available"));
        }
        if flags & !KNOWN_FLAGS != 0 {
            return Err(format!("Unsupported execute flags {}", flags));
        }
        let program = self.current()?;
        let state = self.open_state();
        Machine {
            context: self,
            program: &program,
            state: state.raw(),
        }
        .run(&program.script.main, &mut HashMap::new())
    }

    /// `state` is `None` for a stateless call.
    fn call(&self, state: Option<RawState>, name: Option<&CStr>, data: *mut RawData) -> Result<(), String> {
        let program = self.current()?;
        // SAFETY: the caller passes a frame it owns for the duration of the call.
        let data = unsafe { data.as_mut() }.ok_or("No call frame")?;
        let name = name
            .map(CStr::to_string_lossy)
            .filter(|n| !n.is_empty())
            .ok_or("Function name must not be empty")?;

        let mut fresh = None;
        let state = match state {
            Some(state) if self.is_live(state) => state,
            Some(_) => return Err(String::from("Invalid execution state")),
            None => fresh.insert(self.open_state()).raw(),
        };

        let index = program
            .script
            .find(&name)
            .ok_or_else(|| format!("Function \"{}\" not found", name))?;
        let args = read_arguments(data)?;

        let result = Machine {
            context: self,
            program: &program,
            state,
        }
        .call_script(index, args)?;

        let mut strings = Vec::with_capacity(1);
        result
            .write_raw(&mut data.result, &mut strings)
            .map_err(|_| String::from("Result string contains a NUL byte"))?;
        lock(&self.retained).extend(strings);
        Ok(())
    }

    fn open_state(&self) -> LiveState<'_> {
        let state = NEXT_STATE.fetch_add(16, Ordering::Relaxed);
        lock(&self.live_states).push(state);
        LiveState {
            context: self,
            state,
        }
    }

    fn is_live(&self, state: RawState) -> bool {
        lock(&self.live_states).contains(&(state as usize))
    }

    fn message_into(&self, buffer: *mut c_char, size: c_int) -> c_int {
        let message = lock(&self.message);
        let bytes = message.as_bytes();
        if buffer.is_null() {
            return c_int::try_from(bytes.len()).unwrap_or(c_int::MAX);
        }
        let size = usize::try_from(size).unwrap_or(0);
        let n = bytes.len().min(size);
        // SAFETY: the caller provides `size` writable bytes.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), n);
            if n < size {
                *buffer.add(n) = 0;
            }
        }
        c_int::try_from(n).unwrap_or(c_int::MAX)
    }
}

struct LiveState<'a> {
    context: &'a MockContext,
    state: usize,
}

impl LiveState<'_> {
    fn raw(&self) -> RawState {
        self.state as RawState
    }
}

impl Drop for LiveState<'_> {
    fn drop(&mut self) {
        lock(&self.context.live_states).retain(|&s| s != self.state);
    }
}

fn native_mut(registry: &mut Registry, function: RawFunction) -> Result<&mut Native, String> {
    (function as usize)
        .checked_sub(1)
        .and_then(|index| registry.natives.get_mut(index))
        .ok_or_else(|| String::from("Invalid function handle"))
}

fn read_arguments(data: &RawData) -> Result<Vec<Value>, String> {
    let count = usize::try_from(data.parameters.count)
        .ok()
        .filter(|&n| n <= MAX_PARAMETERS)
        .ok_or_else(|| format!("Parameter count {} out of range", data.parameters.count))?;
    Ok(data.parameters.value[..count]
        .iter()
        // SAFETY: the caller keeps its parameter strings alive during the call.
        .map(|raw| unsafe { Variable::from_raw(raw) }.value)
        .collect())
}

/// Tree-walking evaluator for one execution.
struct Machine<'a> {
    context: &'a MockContext,
    program: &'a Program,
    state: RawState,
}

impl Machine<'_> {
    fn run(&self, body: &[Statement], locals: &mut HashMap<String, Value>) -> Result<(), String> {
        for statement in body {
            match statement {
                Statement::Assign { target, value } => {
                    let value = self.eval(value, locals)?;
                    locals.insert(target.clone(), value);
                }
                Statement::Eval(expr) => {
                    self.eval(expr, locals)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, locals: &HashMap<String, Value>) -> Result<Value, String> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Local(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| format!("Variable \"{}\" read before assignment", name)),
            Expr::Neg(inner) => match self.eval(inner, locals)? {
                Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(format!("Cannot negate {}", other.datatype())),
            },
            Expr::Binary { op, left, right } => {
                arithmetic(*op, self.eval(left, locals)?, self.eval(right, locals)?)
            }
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                match *callee {
                    Callee::Script(index) => self.call_script(index, args),
                    Callee::Native(index) => self.call_native(index, args),
                }
            }
        }
    }

    fn call_script(&self, index: usize, args: Vec<Value>) -> Result<Value, String> {
        let function = self
            .program
            .script
            .functions
            .get(index)
            .ok_or("Invalid script function")?;
        if args.len() != function.params.len() {
            return Err(format!(
                "Parameter count mismatch: \"{}\" expects {}, got {}",
                function.name,
                function.params.len(),
                args.len()
            ));
        }

        let mut locals = HashMap::with_capacity(function.params.len() + 1);
        for ((name, datatype), value) in function.params.iter().zip(args) {
            if value.datatype() != *datatype {
                return Err(format!(
                    "Incompatible parameter type: \"{}\" expects {}, got {}",
                    name,
                    datatype,
                    value.datatype()
                ));
            }
            locals.insert(name.clone(), value);
        }
        locals.insert(String::from("result"), zero_value(function.return_type));

        self.run(&function.body, &mut locals)?;

        if function.return_type == DataType::NotSet {
            return Ok(Value::Unset);
        }
        let result = locals.remove("result").unwrap_or_default();
        if result.datatype() != function.return_type {
            return Err(format!(
                "Function \"{}\" produced {} where {} was declared",
                function.name,
                result.datatype(),
                function.return_type
            ));
        }
        Ok(result)
    }

    fn call_native(&self, index: usize, args: Vec<Value>) -> Result<Value, String> {
        let native = self.program.natives.get(index).ok_or("Invalid native function")?;
        for ((name, datatype), value) in native.params.iter().zip(&args) {
            if value.datatype() != *datatype {
                return Err(format!(
                    "Incompatible parameter type: {:?} expects {}, got {}",
                    name,
                    datatype,
                    value.datatype()
                ));
            }
        }

        let mut data = Box::new(RawData::empty());
        let mut strings = Vec::new();
        data.context = self.context as *const MockContext as RawContext;
        data.state = self.state;
        data.function_name = native.name.as_ptr();
        for (slot, ((name, _), value)) in data
            .parameters
            .value
            .iter_mut()
            .zip(native.params.iter().zip(&args))
        {
            value
                .write_raw(slot, &mut strings)
                .map_err(|_| String::from("Argument string contains a NUL byte"))?;
            slot.name = name.as_ptr();
        }
        data.parameters.count = native.params.len() as c_int;

        // SAFETY: the callback and user data were registered together through
        // AddFunction; `data` and `strings` outlive the call.
        unsafe { (native.callback)(&mut *data, native.user_data as *mut c_void) };

        if native.return_type == DataType::NotSet {
            return Ok(Value::Unset);
        }
        // SAFETY: the callee keeps a string result alive until its next invocation.
        let result = unsafe { Value::from_raw(&data.result) };
        if result.datatype() != native.return_type {
            return Err(format!(
                "Native function {:?} produced {} where {} was declared",
                native.name,
                result.datatype(),
                native.return_type
            ));
        }
        Ok(result)
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, String> {
    use Value::{Float, Integer, String as Str};
    let symbol = match op {
        BinaryOp::Add => '+',
        BinaryOp::Sub => '-',
        BinaryOp::Mul => '*',
    };
    match (op, left, right) {
        (BinaryOp::Add, Integer(a), Integer(b)) => Ok(Integer(a.wrapping_add(b))),
        (BinaryOp::Sub, Integer(a), Integer(b)) => Ok(Integer(a.wrapping_sub(b))),
        (BinaryOp::Mul, Integer(a), Integer(b)) => Ok(Integer(a.wrapping_mul(b))),
        (op, Float(a), Float(b)) => Ok(Float(float_op(op, a, b))),
        (op, Float(a), Integer(b)) => Ok(Float(float_op(op, a, b as f32))),
        (op, Integer(a), Float(b)) => Ok(Float(float_op(op, a as f32, b))),
        (BinaryOp::Add, Str(a), Str(b)) => Ok(Str(a + &b)),
        (_, left, right) => Err(format!(
            "Cannot apply '{}' to {} and {}",
            symbol,
            left.datatype(),
            right.datatype()
        )),
    }
}

fn float_op(op: BinaryOp, a: f32, b: f32) -> f32 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
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

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
///
/// `context` must be null or a live pointer from `create_context`.
unsafe fn context<'a>(context: RawContext) -> Option<&'a MockContext> {
    // SAFETY: upheld by the caller.
    unsafe { context.cast::<MockContext>().as_ref() }
}

/// # Safety
///
/// `ptr` must be null or a valid C string.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    // SAFETY: upheld by the caller.
    (!ptr.is_null()).then(|| unsafe { CStr::from_ptr(ptr) })
}

// ============================================================================
// Exported operations
// ============================================================================

unsafe extern "system" fn create_context(flags: c_int) -> RawContext {
    if flags & !KNOWN_FLAGS != 0 {
        return core::ptr::null_mut();
    }
    Box::into_raw(Box::<MockContext>::default()).cast()
}

unsafe extern "system" fn destroy_context(context: RawContext) {
    if !context.is_null() {
        // SAFETY: the pointer came from `create_context` and is destroyed once.
        drop(unsafe { Box::from_raw(context.cast::<MockContext>()) });
    }
}

unsafe extern "system" fn add_function(
    context: RawContext,
    name: *const c_char,
    function: *mut c_void,
    user_data: *mut c_void,
) -> RawFunction {
    // SAFETY: pointers come from the binding, per the engine contract.
    let Some(ctx) = (unsafe { self::context(context) }) else {
        return core::ptr::null_mut();
    };
    match ctx.add_function(unsafe { c_str(name) }, function, user_data) {
        Ok(handle) => handle as RawFunction,
        Err(message) => {
            ctx.report(Err(message));
            core::ptr::null_mut()
        }
    }
}

unsafe extern "system" fn add_parameter(
    context: RawContext,
    function: RawFunction,
    name: *const c_char,
    datatype: c_int,
) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.report(ctx.add_parameter(function, unsafe { c_str(name) }, datatype)),
        None => 0,
    }
}

unsafe extern "system" fn set_return_type(
    context: RawContext,
    function: RawFunction,
    datatype: c_int,
) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.report(ctx.set_return_type(function, datatype)),
        None => 0,
    }
}

unsafe fn compile_with(
    context: RawContext,
    script: *const c_char,
    flags: c_int,
    recompile: Recompile,
) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.report(ctx.compile(unsafe { c_str(script) }, flags, recompile)),
        None => 0,
    }
}

unsafe extern "system" fn compile_atomic(
    context: RawContext,
    script: *const c_char,
    flags: c_int,
) -> c_int {
    // SAFETY: forwarded as received.
    unsafe { compile_with(context, script, flags, Recompile::Atomic) }
}

unsafe extern "system" fn compile_discarding(
    context: RawContext,
    script: *const c_char,
    flags: c_int,
) -> c_int {
    // SAFETY: forwarded as received.
    unsafe { compile_with(context, script, flags, Recompile::Discarding) }
}

unsafe extern "system" fn execute(context: RawContext, flags: c_int) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.report(ctx.execute(flags)),
        None => 0,
    }
}

unsafe extern "system" fn call(
    context: RawContext,
    state: RawState,
    name: *const c_char,
    data: *mut RawData,
) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.report(ctx.call(Some(state), unsafe { c_str(name) }, data)),
        None => 0,
    }
}

unsafe extern "system" fn call_stateless(
    context: RawContext,
    name: *const c_char,
    data: *mut RawData,
) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.report(ctx.call(None, unsafe { c_str(name) }, data)),
        None => 0,
    }
}

unsafe extern "system" fn get_message(
    context: RawContext,
    message: *mut c_char,
    size: c_int,
) -> c_int {
    // SAFETY: pointers come from the binding, per the engine contract.
    match unsafe { self::context(context) } {
        Some(ctx) => ctx.message_into(message, size),
        None => 0,
    }
}
