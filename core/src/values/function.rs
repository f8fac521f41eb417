//! Native functions callable from scripts.
//!
//! A native function is registered with a [`Context`](crate::api::Context)
//! under a script-visible name. When the script calls that name, the engine
//! hands the call to the function through an [`Invocation`].

use crate::api::Invocation;

/// Trait for native code the engine can call.
///
/// Implemented for every `Fn(&mut Invocation<'_>) + Send + Sync` closure, so a
/// closure is the usual way to provide one. Whatever the closure captures plays
/// the role of per-registration user data.
///
/// Callbacks run synchronously on the thread that started the execution.
/// There is no way to report failure to the engine; a callback that cannot
/// produce a value leaves the result unset.
///
/// # Example
///
/// ```ignore
/// context.define(
///     "Greet",
///     Signature::new().param("who", DataType::String).returns(DataType::String),
///     |call: &mut Invocation<'_>| {
///         let who = call.parameter(0).and_then(|v| v.as_str().ok()).unwrap_or("world");
///         call.set_result(format!("Hello, {}!", who));
///     },
/// )?;
/// ```
pub trait NativeFunction: Send + Sync {
    fn invoke(&self, invocation: &mut Invocation<'_>);
}

impl<F> NativeFunction for F
where
    F: Fn(&mut Invocation<'_>) + Send + Sync,
{
    fn invoke(&self, invocation: &mut Invocation<'_>) {
        self(invocation)
    }
}
