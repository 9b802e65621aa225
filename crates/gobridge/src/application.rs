//! The application object: lifecycle, actions and session inhibition.
//!
//! [`Application`] is backed by an `AdwApplication` when libadwaita is
//! loaded and a `GtkApplication` otherwise. It implements
//! [`LoopApplication`], so the cooperative event loop can register and
//! activate it and quit it on stop.
//!
//! # Example
//!
//! ```ignore
//! let app = Rc::new(Application::new(&toolkit, "org.example.App", ApplicationFlags::DEFAULT)?);
//! app.on_activate(|| println!("activated"))?;
//! let cookie = app.inhibit(None, InhibitFlags::SUSPEND | InhibitFlags::IDLE, "Playing media")?;
//! // ...
//! app.uninhibit(cookie)?;
//! ```

use std::cell::RefCell;
use std::ffi::{c_char, c_int};
use std::ptr;
use std::rc::Rc;

use gobridge_core::sys::GError;
use gobridge_core::{
    BridgeError, LoopApplication, NativeHandle, ObjectError, ObjectHandle, SignalHandlerId, StringArray,
    to_native_string, with_string_array,
};

use crate::sys::take_error_message;
use crate::toolkit::Toolkit;
use crate::widget::{AsWidget, Window, wrap_constructed};

macro_rules! flag_ops {
    ($name:ident) => {
        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self::Output {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self::Output {
                Self(self.0 & rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl std::ops::BitAndAssign for $name {
            fn bitand_assign(&mut self, rhs: Self) {
                self.0 &= rhs.0;
            }
        }
    };
}

/// `GApplicationFlags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ApplicationFlags(u32);

impl ApplicationFlags {
    pub const DEFAULT: Self = Self(0);
    /// Run as a service.
    pub const IS_SERVICE: Self = Self(1 << 0);
    /// Don't try to become the primary instance.
    pub const IS_LAUNCHER: Self = Self(1 << 1);
    /// Handles opening files.
    pub const HANDLES_OPEN: Self = Self(1 << 2);
    /// Handles command lines in the primary instance.
    pub const HANDLES_COMMAND_LINE: Self = Self(1 << 3);
    /// Never check for or become a unique instance.
    pub const NON_UNIQUE: Self = Self(1 << 5);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

flag_ops!(ApplicationFlags);

/// Session actions an application can block (`GtkApplicationInhibitFlags`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InhibitFlags(u32);

impl InhibitFlags {
    pub const NONE: Self = Self(0);
    /// Logging out.
    pub const LOGOUT: Self = Self(1 << 0);
    /// Switching the user.
    pub const SWITCH: Self = Self(1 << 1);
    /// Suspending the session or computer.
    pub const SUSPEND: Self = Self(1 << 2);
    /// The session being marked idle (screen blanking, screensaver).
    pub const IDLE: Self = Self(1 << 3);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

flag_ops!(InhibitFlags);

/// A GTK (or libadwaita) application.
pub struct Application {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
    actions: RefCell<Vec<ObjectHandle>>,
}

impl Application {
    /// Creates the application, preferring `adw_application_new` when
    /// libadwaita is loaded.
    pub fn new(toolkit: &Rc<Toolkit>, id: &str, flags: ApplicationFlags) -> Result<Self, BridgeError> {
        let native_id = to_native_string(id)?;
        let (raw, constructor) = match toolkit.adw() {
            // SAFETY: `native_id` outlives the call; the library copies it.
            Some(adw) => (
                unsafe { (adw.adw_application_new)(native_id.as_ptr(), flags.bits()) },
                "adw_application_new",
            ),
            None => (
                unsafe { (toolkit.gtk().gtk_application_new)(native_id.as_ptr(), flags.bits()) },
                "gtk_application_new",
            ),
        };
        let handle = ObjectHandle::adopt(toolkit.runtime(), NativeHandle::from_ptr(raw), constructor)?;
        tracing::info!(target: "gobridge::application", id, constructor, "application created");
        Ok(Self {
            toolkit: Rc::clone(toolkit),
            handle,
            actions: RefCell::new(Vec::new()),
        })
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }

    pub fn toolkit(&self) -> &Rc<Toolkit> {
        &self.toolkit
    }

    fn live(&self) -> Result<NativeHandle, ObjectError> {
        if self.handle.is_null() {
            Err(ObjectError::Released)
        } else {
            Ok(self.handle.as_ptr())
        }
    }

    /// Registers with the session bus, emitting `startup` in the primary
    /// instance.
    pub fn register(&self) -> Result<(), BridgeError> {
        let ptr = self.live()?;
        let mut error: *mut GError = ptr::null_mut();
        // SAFETY: `ptr` is live and `error` is a valid out-param.
        let registered =
            unsafe { (self.toolkit.gio().g_application_register)(ptr.as_ptr(), ptr::null_mut(), &mut error) };
        let glib = self.toolkit.runtime().glib();
        if registered.is_true() {
            if !error.is_null() {
                // SAFETY: ownership of a stray error passes to us.
                unsafe { (glib.g_error_free)(error) };
            }
            tracing::debug!(target: "gobridge::application", "registered");
            return Ok(());
        }
        // SAFETY: `error` is null or set by the failed call.
        let message = unsafe { take_error_message(glib, error, "registration refused") };
        tracing::warn!(target: "gobridge::application", %message, "registration failed");
        Err(BridgeError::Registration(message))
    }

    /// Emits `activate`.
    pub fn activate(&self) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is live.
        unsafe { (self.toolkit.gio().g_application_activate)(ptr.as_ptr()) };
        Ok(())
    }

    /// Asks a running application to quit.
    pub fn quit(&self) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is live.
        unsafe { (self.toolkit.gio().g_application_quit)(ptr.as_ptr()) };
        Ok(())
    }

    /// Runs the application's own main loop with `args` as the command line
    /// and returns its exit status.
    ///
    /// This blocks in native code; use the cooperative event loop instead
    /// when tokio tasks must keep running.
    pub fn run(&self, args: &[&str]) -> Result<i32, BridgeError> {
        let ptr = self.live()?;
        let argv = StringArray::new(args)?;
        let argc = c_int::try_from(argv.len()).unwrap_or(c_int::MAX);
        // SAFETY: `argv` is NULL-terminated and outlives the call; GIO does
        // not write through it.
        let status =
            unsafe { (self.toolkit.gio().g_application_run)(ptr.as_ptr(), argc, argv.as_ptr() as *mut *mut c_char) };
        tracing::info!(target: "gobridge::application", status, "application run finished");
        Ok(status)
    }

    /// Whether another process is the primary instance.
    pub fn is_remote(&self) -> Result<bool, ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is live and registered.
        Ok(unsafe { (self.toolkit.gio().g_application_get_is_remote)(ptr.as_ptr()) }.is_true())
    }

    /// Blocks the given session actions until [`uninhibit`](Self::uninhibit)
    /// is called with the returned cookie. A cookie of 0 means the session
    /// refused the request.
    pub fn inhibit(&self, window: Option<&Window>, flags: InhibitFlags, reason: &str) -> Result<u32, BridgeError> {
        let ptr = self.live()?;
        let window = window.map_or(NativeHandle::null(), |window| window.handle().as_ptr());
        let reason = to_native_string(reason)?;
        // SAFETY: `ptr` is live, `window` live or null, `reason` outlives
        // the call.
        let cookie = unsafe {
            (self.toolkit.gtk().gtk_application_inhibit)(
                ptr.as_ptr(),
                window.as_ptr(),
                flags.bits(),
                reason.as_ptr(),
            )
        };
        if cookie == 0 {
            tracing::warn!(target: "gobridge::application", flags = flags.bits(), "inhibit request refused");
        } else {
            tracing::debug!(target: "gobridge::application", flags = flags.bits(), cookie, "inhibited");
        }
        Ok(cookie)
    }

    /// Lifts an inhibition. Cookie 0 is ignored.
    pub fn uninhibit(&self, cookie: u32) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        if cookie == 0 {
            return Ok(());
        }
        // SAFETY: `ptr` is live.
        unsafe { (self.toolkit.gtk().gtk_application_uninhibit)(ptr.as_ptr(), cookie) };
        tracing::debug!(target: "gobridge::application", cookie, "uninhibited");
        Ok(())
    }

    /// Binds keyboard accelerators (e.g. `"<Ctrl>q"`) to a detailed action
    /// name such as `"app.quit"`. An empty list removes the bindings.
    pub fn set_accels_for_action(&self, action: &str, accels: &[&str]) -> Result<(), BridgeError> {
        let ptr = self.live()?;
        let action = to_native_string(action)?;
        let gtk = self.toolkit.gtk();
        with_string_array(accels, |array| {
            // SAFETY: `ptr` is live; `action` and `array` outlive the call.
            unsafe { (gtk.gtk_application_set_accels_for_action)(ptr.as_ptr(), action.as_ptr(), array) }
        })?;
        Ok(())
    }

    /// Adds an application action (`app.<name>`) that calls `callback`
    /// when activated.
    pub fn add_action<F>(&self, name: &str, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn() + 'static,
    {
        let ptr = self.live()?;
        let native_name = to_native_string(name)?;
        let gio = self.toolkit.gio();
        // SAFETY: `native_name` outlives the call; no parameter type.
        let raw = unsafe { (gio.g_simple_action_new)(native_name.as_ptr(), ptr::null()) };
        let action = ObjectHandle::adopt(self.toolkit.runtime(), NativeHandle::from_ptr(raw), "g_simple_action_new")?;
        let id = action.connect("activate", move |_| callback())?;
        // SAFETY: both objects are live; the map takes its own reference.
        unsafe { (gio.g_action_map_add_action)(ptr.as_ptr(), action.as_ptr().as_ptr()) };
        tracing::debug!(target: "gobridge::application", action = name, "action added");
        self.actions.borrow_mut().push(action);
        Ok(id)
    }

    /// Creates a window belonging to this application.
    pub fn new_window(&self) -> Result<Window, BridgeError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is a live application.
        let raw = NativeHandle::from_ptr(unsafe { (self.toolkit.gtk().gtk_application_window_new)(ptr.as_ptr()) });
        let handle = wrap_constructed(&self.toolkit, raw, "gtk_application_window_new")?;
        Ok(Window::from_handle(&self.toolkit, handle))
    }

    pub fn on_activate<F>(&self, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn() + 'static,
    {
        self.handle.connect("activate", move |_| callback())
    }

    pub fn on_startup<F>(&self, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn() + 'static,
    {
        self.handle.connect("startup", move |_| callback())
    }

    pub fn on_shutdown<F>(&self, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn() + 'static,
    {
        self.handle.connect("shutdown", move |_| callback())
    }
}

impl LoopApplication for Application {
    fn register(&self) -> gobridge_core::Result<()> {
        Application::register(self)
    }

    fn activate(&self) {
        if let Err(err) = Application::activate(self) {
            tracing::warn!(target: "gobridge::application", error = %err, "activate skipped");
        }
    }

    fn quit(&self) {
        if let Err(err) = Application::quit(self) {
            tracing::warn!(target: "gobridge::application", error = %err, "quit skipped");
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("handle", &self.handle.as_ptr())
            .field("actions", &self.actions.borrow().len())
            .finish()
    }
}
