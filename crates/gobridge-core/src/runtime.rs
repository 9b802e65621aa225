//! The runtime context: loaded libraries plus the signal registry.

use std::rc::Rc;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ObjectError};
use crate::logging::{PerfSpan, span_names};
use crate::marshal::{from_native_string, to_native_string};
use crate::resolver::{LibraryResolver, NativeLibrary};
use crate::sys::{GLibLib, GObjectLib, GType, NativeHandle, gtype};
use crate::trampoline::SignalRegistry;

/// Everything the core needs to talk to GLib and GObject.
///
/// A runtime is created once and shared as `Rc<Runtime>`; object handles and
/// signal trampolines keep it alive. It is not `Send`: all native calls
/// happen on the thread that created it.
pub struct Runtime {
    glib: GLibLib,
    gobject: GObjectLib,
    signals: SignalRegistry,
    resolver: LibraryResolver,
}

impl Runtime {
    /// Resolves and loads GLib and GObject.
    pub fn load(config: &BridgeConfig) -> Result<Rc<Self>, BridgeError> {
        let _span = PerfSpan::new(span_names::LOADER);
        let resolver = LibraryResolver::new(config.search_paths.clone(), config.os);
        let glib = GLibLib::load(resolver.resolve(NativeLibrary::GLib))?;
        let gobject = GObjectLib::load(resolver.resolve(NativeLibrary::GObject))?;
        Ok(Rc::new(Self {
            glib,
            gobject,
            signals: SignalRegistry::new(),
            resolver,
        }))
    }

    /// Assembles a runtime from prebuilt tables.
    pub fn from_libraries(glib: GLibLib, gobject: GObjectLib) -> Rc<Self> {
        Rc::new(Self {
            glib,
            gobject,
            signals: SignalRegistry::new(),
            resolver: LibraryResolver::default(),
        })
    }

    pub fn glib(&self) -> &GLibLib {
        &self.glib
    }

    pub fn gobject(&self) -> &GObjectLib {
        &self.gobject
    }

    pub fn signals(&self) -> &SignalRegistry {
        &self.signals
    }

    /// The resolver used to locate the core libraries, for loading further
    /// libraries from the same places.
    pub fn resolver(&self) -> &LibraryResolver {
        &self.resolver
    }

    /// Looks up a registered type by name.
    pub fn type_from_name(&self, name: &str) -> Result<GType, BridgeError> {
        let native = to_native_string(name)?;
        // SAFETY: `native` is a valid C string for the duration of the call.
        let g_type = unsafe { (self.gobject.g_type_from_name)(native.as_ptr()) };
        if g_type == gtype::INVALID {
            return Err(ObjectError::UnknownType(name.to_owned()).into());
        }
        Ok(g_type)
    }

    /// The name of a type.
    pub fn type_name(&self, g_type: GType) -> Option<String> {
        // SAFETY: g_type_name returns null for unknown ids.
        let name = unsafe { (self.gobject.g_type_name)(g_type) };
        (!name.is_null()).then(|| unsafe { from_native_string(name) })
    }

    /// The concrete type of a live instance.
    pub fn instance_type(&self, instance: NativeHandle) -> Option<GType> {
        self.gobject.instance_type(instance)
    }

    /// The process-default main context.
    pub fn main_context(&self) -> NativeHandle {
        // SAFETY: no preconditions.
        NativeHandle::from_ptr(unsafe { (self.glib.g_main_context_default)() })
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("glib", &self.glib)
            .field("gobject", &self.gobject)
            .field("signals", &self.signals)
            .finish()
    }
}
