//! GLib timeout and idle sources backed by Rust closures.

use std::ffi::{c_uint, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use crate::runtime::Runtime;
use crate::symbols::GBoolean;
use crate::sys::{PRIORITY_DEFAULT, PRIORITY_DEFAULT_IDLE};

/// Whether a source callback wants to run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceControl {
    /// Keep the source installed.
    Continue,
    /// Remove the source.
    Break,
}

impl From<SourceControl> for GBoolean {
    fn from(control: SourceControl) -> Self {
        GBoolean::from(control == SourceControl::Continue)
    }
}

/// Id of an installed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(c_uint);

impl SourceId {
    pub fn as_raw(self) -> c_uint {
        self.0
    }

    /// Removes the source. Returns `false` if it was already gone.
    pub fn remove(self, runtime: &Runtime) -> bool {
        // SAFETY: plain id lookup on the default context.
        let removed = unsafe { (runtime.glib().g_source_remove)(self.0) }.is_true();
        tracing::debug!(target: "gobridge_core::source", id = self.0, removed, "remove source");
        removed
    }
}

type SourceCallback = Box<dyn FnMut() -> SourceControl>;

/// Calls `f` every `interval` on the default main context until it returns
/// [`SourceControl::Break`] or the source is removed.
pub fn timeout_add<F>(runtime: &Runtime, interval: Duration, f: F) -> SourceId
where
    F: FnMut() -> SourceControl + 'static,
{
    let millis = c_uint::try_from(interval.as_millis()).unwrap_or(c_uint::MAX);
    let data = into_user_data(Box::new(f));
    // SAFETY: `data` is released by `destroy_source_data` when the source is
    // destroyed.
    let id = unsafe {
        (runtime.glib().g_timeout_add_full)(
            PRIORITY_DEFAULT,
            millis,
            Some(source_trampoline),
            data,
            Some(destroy_source_data),
        )
    };
    tracing::debug!(target: "gobridge_core::source", id, interval_ms = millis, "timeout added");
    SourceId(id)
}

/// Calls `f` whenever the default main context is idle, until it returns
/// [`SourceControl::Break`] or the source is removed.
pub fn idle_add<F>(runtime: &Runtime, f: F) -> SourceId
where
    F: FnMut() -> SourceControl + 'static,
{
    let data = into_user_data(Box::new(f));
    // SAFETY: as in `timeout_add`.
    let id = unsafe {
        (runtime.glib().g_idle_add_full)(
            PRIORITY_DEFAULT_IDLE,
            Some(source_trampoline),
            data,
            Some(destroy_source_data),
        )
    };
    tracing::debug!(target: "gobridge_core::source", id, "idle added");
    SourceId(id)
}

fn into_user_data(callback: SourceCallback) -> *mut c_void {
    Box::into_raw(Box::new(callback)).cast()
}

unsafe extern "C" fn source_trampoline(data: *mut c_void) -> GBoolean {
    if data.is_null() {
        return GBoolean::FALSE;
    }
    // SAFETY: `data` is the boxed callback installed with the source; GLib
    // does not dispatch a source recursively.
    let callback = unsafe { &mut *(data as *mut SourceCallback) };
    match catch_unwind(AssertUnwindSafe(|| callback())) {
        Ok(control) => control.into(),
        Err(_) => {
            tracing::error!(target: "gobridge_core::source", "source callback panicked; removing source");
            GBoolean::FALSE
        }
    }
}

unsafe extern "C" fn destroy_source_data(data: *mut c_void) {
    if !data.is_null() {
        // SAFETY: allocated by `into_user_data`; GLib calls this once.
        drop(unsafe { Box::from_raw(data as *mut SourceCallback) });
    }
}
