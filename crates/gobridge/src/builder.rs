//! Objects built from GtkBuilder UI descriptions.

use std::ffi::c_char;
use std::ptr;
use std::rc::Rc;

use gobridge_core::sys::GError;
use gobridge_core::{BridgeError, NativeHandle, ObjectHandle, to_native_string};

use crate::sys::take_error_message;
use crate::toolkit::Toolkit;

/// A `GtkBuilder` holding the objects of one UI description.
///
/// The builder owns the objects it created; [`object`](Self::object) hands
/// out handles with their own reference.
#[derive(Debug)]
pub struct Builder {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
}

impl Builder {
    /// Parses a UI description and instantiates its objects.
    pub fn from_string(toolkit: &Rc<Toolkit>, description: &str) -> Result<Self, BridgeError> {
        let gtk = toolkit.gtk();
        // SAFETY: GTK is initialized by the caller.
        let raw = NativeHandle::from_ptr(unsafe { (gtk.gtk_builder_new)() });
        let handle = ObjectHandle::adopt(toolkit.runtime(), raw, "gtk_builder_new")?;

        let length = isize::try_from(description.len()).unwrap_or(isize::MAX);
        let mut error: *mut GError = ptr::null_mut();
        // SAFETY: the buffer is read for `length` bytes and need not be
        // NUL-terminated; `error` is a valid out-param.
        let parsed = unsafe {
            (gtk.gtk_builder_add_from_string)(
                handle.as_ptr().as_ptr(),
                description.as_ptr() as *const c_char,
                length,
                &mut error,
            )
        };
        if !parsed.is_true() {
            // SAFETY: `error` is null or set by the failed call.
            let message =
                unsafe { take_error_message(toolkit.runtime().glib(), error, "invalid UI description") };
            return Err(BridgeError::Builder(message));
        }
        tracing::debug!(target: "gobridge::builder", bytes = description.len(), "UI description loaded");
        Ok(Self {
            toolkit: Rc::clone(toolkit),
            handle,
        })
    }

    /// The object with the given `id`, if the description declared one.
    pub fn object(&self, id: &str) -> Result<Option<ObjectHandle>, BridgeError> {
        if self.handle.is_null() {
            return Err(gobridge_core::ObjectError::Released.into());
        }
        let native_id = to_native_string(id)?;
        // SAFETY: the builder is live; the result is borrowed from it.
        let raw = unsafe {
            (self.toolkit.gtk().gtk_builder_get_object)(self.handle.as_ptr().as_ptr(), native_id.as_ptr())
        };
        let raw = NativeHandle::from_ptr(raw);
        if raw.is_null() {
            tracing::debug!(target: "gobridge::builder", id, "no such object");
            return Ok(None);
        }
        Ok(Some(ObjectHandle::wrap(self.toolkit.runtime(), raw)))
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.handle
    }
}
