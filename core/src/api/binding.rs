//! Loading the engine library and resolving its entry points.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::{debug, warn};

use super::{BindingOptions, Context, ContextOptions, Error, SymbolNames};
use crate::values::raw::{
    AddFunctionFn, AddParameterFn, CallFn, CallStatelessFn, CompileFn, CreateContextFn,
    DestroyContextFn, ExecuteFn, GetMessageFn, SetReturnTypeFn,
};

/// The engine's operations, resolved once.
///
/// Plain function pointers: copying this struct is cheap, and every copy stays
/// valid for as long as the library that provided them stays loaded.
#[derive(Clone, Copy, Debug)]
pub struct EntryPoints {
    pub create_context: CreateContextFn,
    pub destroy_context: DestroyContextFn,
    pub add_function: AddFunctionFn,
    pub add_parameter: AddParameterFn,
    pub set_return_type: SetReturnTypeFn,
    pub compile: CompileFn,
    pub execute: ExecuteFn,
    pub call: CallFn,
    pub call_stateless: CallStatelessFn,
    pub get_message: GetMessageFn,
}

/// A loaded engine.
///
/// Each binding owns its own library handle, so several engines (or several
/// copies of one) can be loaded side by side. Contexts borrow the binding,
/// which keeps the library loaded for as long as any context exists.
///
/// # Example
///
/// ```no_run
/// use scriptlink_core::api::{Binding, CompileOptions, ContextOptions, ExecuteOptions};
///
/// let binding = Binding::load("dwscript.dll")?;
/// let mut context = binding.create_context(ContextOptions::default())?;
/// context.compile("begin end.", CompileOptions::default())?;
/// context.execute(ExecuteOptions::default())?;
/// drop(context);
/// binding.unload();
/// # Ok::<(), scriptlink_core::Error>(())
/// ```
pub struct Binding {
    entry: EntryPoints,
    origin: Option<PathBuf>,
    // Declared last: dropped after everything that may point into it.
    library: Option<Library>,
}

impl Binding {
    /// Load an engine library using the default export names.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::load_with(path, BindingOptions::default())
    }

    /// Load an engine library.
    ///
    /// Fails with [`Error::LoadFailure`] if the library cannot be loaded and
    /// with [`Error::MissingSymbol`] if any entry point is absent. In the
    /// latter case the library is unloaded again before returning.
    pub fn load_with(path: impl AsRef<Path>, options: BindingOptions) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading engine library");

        // SAFETY: running the library's initializers is inherent to loading an
        // engine; the caller vouches for the library by naming it.
        let library = unsafe { Library::new(path) }.map_err(|source| Error::LoadFailure {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_library(library, path.to_path_buf(), &options.symbols)
    }

    /// Resolve every entry point from an already opened library.
    ///
    /// On failure `library` is dropped, which unloads it.
    pub(crate) fn from_library(
        library: Library,
        origin: PathBuf,
        symbols: &SymbolNames,
    ) -> Result<Self, Error> {
        let entry = {
            let resolver = Resolver {
                library: &library,
                origin: &origin,
            };
            // SAFETY: the exported symbols are declared with exactly these
            // signatures by the engine's ABI.
            unsafe {
                EntryPoints {
                    create_context: resolver.get(&symbols.create_context)?,
                    destroy_context: resolver.get(&symbols.destroy_context)?,
                    add_function: resolver.get(&symbols.add_function)?,
                    add_parameter: resolver.get(&symbols.add_parameter)?,
                    set_return_type: resolver.get(&symbols.set_return_type)?,
                    compile: resolver.get(&symbols.compile)?,
                    execute: resolver.get(&symbols.execute)?,
                    call: resolver.get(&symbols.call)?,
                    call_stateless: resolver.get(&symbols.call_stateless)?,
                    get_message: resolver.get(&symbols.get_message)?,
                }
            }
        };

        debug!(path = %origin.display(), "resolved all engine entry points");
        Ok(Self {
            entry,
            origin: Some(origin),
            library: Some(library),
        })
    }

    /// Wrap entry points that are already in the address space, e.g. an engine
    /// linked into the executable.
    ///
    /// # Safety
    ///
    /// Every pointer must implement the engine contract with the declared
    /// signature, and stay callable for the lifetime of the binding.
    pub unsafe fn from_entry_points(entry: EntryPoints) -> Self {
        Self {
            entry,
            origin: None,
            library: None,
        }
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry
    }

    /// The path the library was loaded from, if it was loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Create a new, fully isolated script context.
    pub fn create_context(&self, options: ContextOptions) -> Result<Context<'_>, Error> {
        Context::new(self, options)
    }

    /// Unload the library.
    ///
    /// All contexts borrow the binding, so none can be alive at this point.
    /// A failure to close the library is logged; nothing else can be done
    /// about it.
    ///
    /// Unloading while a context is still alive does not compile:
    ///
    /// ```compile_fail
    /// use scriptlink_core::api::{Binding, ContextOptions};
    ///
    /// let binding = Binding::load("dwscript.dll")?;
    /// let context = binding.create_context(ContextOptions::default())?;
    /// binding.unload();
    /// let _ = context.message();
    /// # Ok::<(), scriptlink_core::Error>(())
    /// ```
    pub fn unload(self) {
        let Binding {
            origin, library, ..
        } = self;
        if let Some(library) = library {
            if let Err(e) = library.close() {
                warn!(path = ?origin, error = %e, "failed to unload engine library");
            } else {
                debug!(path = ?origin, "engine library unloaded");
            }
        }
    }
}

impl core::fmt::Debug for Binding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Binding")
            .field("origin", &self.origin)
            .field("loaded", &self.library.is_some())
            .finish()
    }
}

struct Resolver<'a> {
    library: &'a Library,
    origin: &'a Path,
}

impl Resolver<'_> {
    /// # Safety
    ///
    /// `T` must be the true type of the exported symbol.
    unsafe fn get<T: Copy>(&self, name: &str) -> Result<T, Error> {
        // SAFETY: upheld by the caller.
        let symbol: Symbol<'_, T> =
            unsafe { self.library.get(name.as_bytes()) }.map_err(|source| {
                debug!(path = %self.origin.display(), symbol = name, "missing engine entry point");
                Error::MissingSymbol {
                    path: self.origin.to_path_buf(),
                    symbol: name.to_string(),
                    source,
                }
            })?;
        Ok(*symbol)
    }
}
