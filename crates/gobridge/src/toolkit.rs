//! The toolkit: the core runtime plus the GIO, GTK and libadwaita tables.

use std::cell::Cell;
use std::rc::Rc;

use gobridge_core::{BridgeConfig, BridgeError, EventLoop, EventLoopConfig, NativeLibrary, PerfSpan, Runtime};

use crate::sys::{AdwLib, GioLib, GtkLib};

/// Everything the facades need to call into the GNOME stack.
///
/// Created once and shared as `Rc<Toolkit>`. libadwaita is optional: when it
/// cannot be loaded, applications fall back to plain GTK.
pub struct Toolkit {
    runtime: Rc<Runtime>,
    gio: GioLib,
    gtk: GtkLib,
    adw: Option<AdwLib>,
    initialized: Cell<bool>,
}

impl Toolkit {
    /// Loads the core libraries, then GIO, GTK 4 and (if present)
    /// libadwaita from the same search paths.
    pub fn load(config: &BridgeConfig) -> Result<Rc<Self>, BridgeError> {
        let runtime = Runtime::load(config)?;
        let _span = PerfSpan::new("gobridge::toolkit");
        let resolver = runtime.resolver();
        let gio = GioLib::load(resolver.resolve(NativeLibrary::Gio))?;
        let gtk = GtkLib::load(resolver.resolve(NativeLibrary::Gtk4))?;
        let adw = match AdwLib::load(resolver.resolve(NativeLibrary::Adwaita)) {
            Ok(adw) => Some(adw),
            Err(err) => {
                tracing::warn!(target: "gobridge::toolkit", error = %err, "libadwaita unavailable; using plain GTK");
                None
            }
        };
        Ok(Self::from_parts(runtime, gio, gtk, adw))
    }

    /// Assembles a toolkit from prebuilt tables.
    pub fn from_parts(runtime: Rc<Runtime>, gio: GioLib, gtk: GtkLib, adw: Option<AdwLib>) -> Rc<Self> {
        Rc::new(Self {
            runtime,
            gio,
            gtk,
            adw,
            initialized: Cell::new(false),
        })
    }

    /// Initializes GTK, and libadwaita when loaded. Later calls do nothing.
    pub fn init(&self) {
        if self.initialized.replace(true) {
            return;
        }
        // SAFETY: no preconditions beyond running on the main thread.
        unsafe { (self.gtk.gtk_init)() };
        if let Some(adw) = &self.adw {
            // SAFETY: as above; GTK is initialized.
            unsafe { (adw.adw_init)() };
        }
        tracing::info!(target: "gobridge::toolkit", adwaita = self.adw.is_some(), "toolkit initialized");
    }

    /// Whether GTK reports itself initialized. Falls back to whether
    /// [`init`](Self::init) ran when GTK does not export the query.
    pub fn is_initialized(&self) -> bool {
        match self.gtk.gtk_is_initialized {
            // SAFETY: no preconditions.
            Some(query) => unsafe { query() }.is_true(),
            None => self.initialized.get(),
        }
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    pub fn gio(&self) -> &GioLib {
        &self.gio
    }

    pub fn gtk(&self) -> &GtkLib {
        &self.gtk
    }

    /// The libadwaita table, if it was loaded.
    pub fn adw(&self) -> Option<&AdwLib> {
        self.adw.as_ref()
    }

    /// An event loop over the default main context.
    pub fn event_loop(&self, config: EventLoopConfig) -> EventLoop {
        EventLoop::native(&self.runtime, config)
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit")
            .field("runtime", &self.runtime)
            .field("gio", &self.gio)
            .field("gtk", &self.gtk)
            .field("adw", &self.adw)
            .field("initialized", &self.initialized.get())
            .finish()
    }
}
