//! C-callable surface over a loaded engine.
//!
//! Hosts that cannot link Rust load a [`Binding`] with [`scriptlink_load`] and
//! then reach each engine entry point through the binding instead of resolving
//! the symbols themselves. Every function takes the binding first; the
//! remaining parameters and the return value are the engine's own.
//!
//! A null binding or context yields the entry point's failure value (null or
//! zero) without reaching the engine.

use std::ffi::{CStr, c_char, c_int, c_void};

use scriptlink_core::Binding;
use scriptlink_core::values::raw::{RawContext, RawData, RawFunction, RawState};
use tracing::{debug, warn};

/// Load an engine library. Returns null if the library or any entry point is
/// missing. Release with [`scriptlink_unload`].
///
/// # Safety
///
/// `path` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_load(path: *const c_char) -> *mut Binding {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: non-null and NUL-terminated per the contract.
    let path = unsafe { CStr::from_ptr(path) };
    let Ok(path) = path.to_str() else {
        warn!("engine library path is not valid UTF-8");
        return std::ptr::null_mut();
    };

    match Binding::load(path) {
        Ok(binding) => Box::into_raw(Box::new(binding)),
        Err(e) => {
            warn!(error = %e, "scriptlink_load failed");
            std::ptr::null_mut()
        }
    }
}

/// Unload a binding returned by [`scriptlink_load`]. Null is ignored.
///
/// # Safety
///
/// `binding` must come from [`scriptlink_load`] and must not be used again.
/// Every context created through it must already be destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_unload(binding: *mut Binding) {
    if binding.is_null() {
        return;
    }
    // SAFETY: ownership returns from the pointer handed out by `scriptlink_load`.
    let binding = unsafe { Box::from_raw(binding) };
    debug!(path = ?binding.path(), "scriptlink_unload");
    binding.unload();
}

/// Borrow the binding behind a pointer handed to the C surface.
///
/// # Safety
///
/// `binding` must be null or point to a live [`Binding`].
unsafe fn binding<'a>(binding: *const Binding) -> Option<&'a Binding> {
    // SAFETY: per the contract above.
    unsafe { binding.as_ref() }
}

/// # Safety
///
/// `binding` must be null or a live binding.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_create_context(
    binding: *const Binding,
    flags: c_int,
) -> RawContext {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return std::ptr::null_mut();
    };
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().create_context)(flags) }
}

/// # Safety
///
/// `binding` must be null or a live binding; `context` must be null or a
/// context created through it and not yet destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_destroy_context(
    binding: *const Binding,
    context: RawContext,
) {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return;
    };
    if context.is_null() {
        return;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().destroy_context)(context) }
}

/// # Safety
///
/// As for the engine's `AddFunction`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_add_function(
    binding: *const Binding,
    context: RawContext,
    name: *const c_char,
    function: *mut c_void,
    user_data: *mut c_void,
) -> RawFunction {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return std::ptr::null_mut();
    };
    if context.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().add_function)(context, name, function, user_data) }
}

/// # Safety
///
/// As for the engine's `AddParameter`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_add_parameter(
    binding: *const Binding,
    context: RawContext,
    function: RawFunction,
    name: *const c_char,
    datatype: c_int,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().add_parameter)(context, function, name, datatype) }
}

/// # Safety
///
/// As for the engine's `SetReturnType`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_set_return_type(
    binding: *const Binding,
    context: RawContext,
    function: RawFunction,
    datatype: c_int,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().set_return_type)(context, function, datatype) }
}

/// # Safety
///
/// As for the engine's `Compile`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_compile(
    binding: *const Binding,
    context: RawContext,
    script: *const c_char,
    flags: c_int,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().compile)(context, script, flags) }
}

/// # Safety
///
/// As for the engine's `Execute`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_execute(
    binding: *const Binding,
    context: RawContext,
    flags: c_int,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().execute)(context, flags) }
}

/// # Safety
///
/// As for the engine's `Call`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_call(
    binding: *const Binding,
    context: RawContext,
    state: RawState,
    name: *const c_char,
    data: *mut RawData,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().call)(context, state, name, data) }
}

/// # Safety
///
/// As for the engine's `CallStateless`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_call_stateless(
    binding: *const Binding,
    context: RawContext,
    name: *const c_char,
    data: *mut RawData,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().call_stateless)(context, name, data) }
}

/// # Safety
///
/// As for the engine's `GetMessage`, plus a live or null `binding`.
#[unsafe(no_mangle)]
pub unsafe extern "system" fn scriptlink_get_message(
    binding: *const Binding,
    context: RawContext,
    message: *mut c_char,
    size: c_int,
) -> c_int {
    let Some(binding) = (unsafe { self::binding(binding) }) else {
        return 0;
    };
    if context.is_null() {
        return 0;
    }
    // SAFETY: forwarded unchanged to the engine.
    unsafe { (binding.entry_points().get_message)(context, message, size) }
}
