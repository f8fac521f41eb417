//! The engine's C ABI: data layout and entry point signatures.
//!
//! Everything in this module mirrors the memory layout the engine library was
//! built against. Field order, integer widths and the 32-slot parameter array
//! must not change.

use core::ffi::{c_char, c_int, c_void};
use core::mem::{align_of, size_of};

use static_assertions::const_assert_eq;

/// Opaque engine-side script context.
pub type RawContext = *mut c_void;
/// Opaque engine-side execution state, only meaningful inside a callback.
pub type RawState = *mut c_void;
/// Opaque engine-side registered function.
pub type RawFunction = *mut c_void;

/// Number of parameter slots in a [`RawData`].
pub const RAW_PARAMETER_SLOTS: usize = 32;

/// Out-of-range datatype marker. Widens the C enum to `int`; never valid.
pub const DATATYPE_INVALID: c_int = 65536;

/// Out-of-range flags marker. Widens the C enum to `int`; never valid.
pub const FLAGS_INVALID: c_int = 65536;

#[repr(C)]
#[derive(Clone, Copy)]
pub union RawPayload {
    pub f: f32,
    pub i: c_int,
    pub s: *mut c_char,
    pub b: c_int,
}

/// One variant value as laid out by the engine.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawVariable {
    pub name: *const c_char,
    pub datatype: c_int,
    pub payload: RawPayload,
}

impl RawVariable {
    /// A nameless variable with no value (`datatype == 0`).
    pub const fn unset() -> Self {
        Self {
            name: core::ptr::null(),
            datatype: 0,
            payload: RawPayload { s: core::ptr::null_mut() },
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawParameters {
    pub count: c_int,
    pub value: [RawVariable; RAW_PARAMETER_SLOTS],
}

/// The call frame exchanged on every native <-> script call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawData {
    /// Inside a callback: the context that invoked it.
    pub context: RawContext,
    /// Inside a callback: the live execution state, for re-entrant calls.
    pub state: RawState,
    /// Inside a callback: the script-visible name the callback was registered as.
    pub function_name: *const c_char,
    pub result: RawVariable,
    pub parameters: RawParameters,
}

impl RawData {
    /// An all-empty frame: null handles, zero parameters, unset result.
    pub const fn empty() -> Self {
        Self {
            context: core::ptr::null_mut(),
            state: core::ptr::null_mut(),
            function_name: core::ptr::null(),
            result: RawVariable::unset(),
            parameters: RawParameters {
                count: 0,
                value: [RawVariable::unset(); RAW_PARAMETER_SLOTS],
            },
        }
    }
}

const_assert_eq!(align_of::<RawVariable>(), align_of::<*const c_char>());
const_assert_eq!(size_of::<RawPayload>(), size_of::<*mut c_char>());
const_assert_eq!(
    size_of::<RawParameters>() - size_of::<[RawVariable; RAW_PARAMETER_SLOTS]>(),
    align_of::<RawVariable>()
);

/// Signature every native callback is registered with.
pub type NativeCallback = unsafe extern "system" fn(data: *mut RawData, user_data: *mut c_void);

pub type CreateContextFn = unsafe extern "system" fn(flags: c_int) -> RawContext;
pub type DestroyContextFn = unsafe extern "system" fn(context: RawContext);
pub type AddFunctionFn = unsafe extern "system" fn(
    context: RawContext,
    name: *const c_char,
    function: *mut c_void,
    user_data: *mut c_void,
) -> RawFunction;
pub type AddParameterFn = unsafe extern "system" fn(
    context: RawContext,
    function: RawFunction,
    name: *const c_char,
    datatype: c_int,
) -> c_int;
pub type SetReturnTypeFn =
    unsafe extern "system" fn(context: RawContext, function: RawFunction, datatype: c_int) -> c_int;
pub type CompileFn =
    unsafe extern "system" fn(context: RawContext, script: *const c_char, flags: c_int) -> c_int;
pub type ExecuteFn = unsafe extern "system" fn(context: RawContext, flags: c_int) -> c_int;
pub type CallFn = unsafe extern "system" fn(
    context: RawContext,
    state: RawState,
    name: *const c_char,
    data: *mut RawData,
) -> c_int;
pub type CallStatelessFn =
    unsafe extern "system" fn(context: RawContext, name: *const c_char, data: *mut RawData) -> c_int;
pub type GetMessageFn =
    unsafe extern "system" fn(context: RawContext, message: *mut c_char, size: c_int) -> c_int;
