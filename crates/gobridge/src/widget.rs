//! Typed facades over a few GTK widgets.
//!
//! Each facade owns an [`ObjectHandle`] and the [`Toolkit`] it was made
//! with. Properties are read with an explicit [`ValueKind`], never through
//! name-based inference.
//!
//! Ownership follows GTK: windows are owned by GTK's toplevel list, so the
//! facade takes an extra reference on them; other widgets are created
//! floating and the facade sinks that reference.

use std::ffi::c_int;
use std::rc::Rc;

use gobridge_core::{
    BridgeError, NativeHandle, ObjectError, ObjectHandle, SignalHandlerId, Value, ValueKind,
    to_native_string,
};

use crate::toolkit::Toolkit;

/// Access to the object handle behind a widget facade.
pub trait AsWidget {
    fn handle(&self) -> &ObjectHandle;
}

/// Takes a new reference on a constructor result that GTK keeps owning.
pub(crate) fn wrap_constructed(
    toolkit: &Toolkit,
    raw: NativeHandle,
    constructor: &'static str,
) -> Result<ObjectHandle, ObjectError> {
    if raw.is_null() {
        return Err(ObjectError::NullHandle { constructor });
    }
    Ok(ObjectHandle::wrap(toolkit.runtime(), raw))
}

fn read_string(handle: &ObjectHandle, property: &str) -> Result<String, BridgeError> {
    let value = handle.get_property(property, Some(ValueKind::String))?;
    Ok(value.as_str().unwrap_or_default().to_owned())
}

fn read_bool(handle: &ObjectHandle, property: &str) -> Result<bool, BridgeError> {
    let value = handle.get_property(property, Some(ValueKind::Bool))?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Any widget, addressed reflectively.
#[derive(Clone)]
pub struct Widget {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
}

impl Widget {
    pub fn from_handle(toolkit: &Rc<Toolkit>, handle: ObjectHandle) -> Self {
        Self {
            toolkit: Rc::clone(toolkit),
            handle,
        }
    }

    pub fn toolkit(&self) -> &Rc<Toolkit> {
        &self.toolkit
    }

    pub fn is_visible(&self) -> Result<bool, BridgeError> {
        read_bool(&self.handle, "visible")
    }

    pub fn set_visible(&self, visible: bool) -> Result<(), BridgeError> {
        self.handle.set_property("visible", visible)
    }

    pub fn is_sensitive(&self) -> Result<bool, BridgeError> {
        read_bool(&self.handle, "sensitive")
    }

    pub fn set_sensitive(&self, sensitive: bool) -> Result<(), BridgeError> {
        self.handle.set_property("sensitive", sensitive)
    }
}

impl AsWidget for Widget {
    fn handle(&self) -> &ObjectHandle {
        &self.handle
    }
}

/// A toplevel window.
#[derive(Clone)]
pub struct Window {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
}

impl Window {
    /// Creates a window not tied to an application.
    pub fn new(toolkit: &Rc<Toolkit>) -> Result<Self, BridgeError> {
        // SAFETY: GTK is initialized by the caller.
        let raw = NativeHandle::from_ptr(unsafe { (toolkit.gtk().gtk_window_new)() });
        let handle = wrap_constructed(toolkit, raw, "gtk_window_new")?;
        Ok(Self::from_handle(toolkit, handle))
    }

    pub fn from_handle(toolkit: &Rc<Toolkit>, handle: ObjectHandle) -> Self {
        Self {
            toolkit: Rc::clone(toolkit),
            handle,
        }
    }

    pub fn title(&self) -> Result<String, BridgeError> {
        read_string(&self.handle, "title")
    }

    pub fn set_title(&self, title: &str) -> Result<(), BridgeError> {
        self.handle.set_property("title", title)
    }

    pub fn set_default_size(&self, width: i32, height: i32) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is a live window.
        unsafe { (self.toolkit.gtk().gtk_window_set_default_size)(ptr.as_ptr(), width, height) };
        Ok(())
    }

    pub fn present(&self) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is a live window.
        unsafe { (self.toolkit.gtk().gtk_window_present)(ptr.as_ptr()) };
        Ok(())
    }

    /// Requests the window to close. Handlers of `close-request` may veto it.
    pub fn close(&self) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is a live window.
        unsafe { (self.toolkit.gtk().gtk_window_close)(ptr.as_ptr()) };
        Ok(())
    }

    /// Sets the window's content, or clears it with `None`.
    pub fn set_child(&self, child: Option<&dyn AsWidget>) -> Result<(), ObjectError> {
        let ptr = self.live()?;
        let child = match child {
            Some(child) => live_handle(child.handle())?,
            None => NativeHandle::null(),
        };
        // SAFETY: `ptr` is live; `child` is live or null.
        unsafe { (self.toolkit.gtk().gtk_window_set_child)(ptr.as_ptr(), child.as_ptr()) };
        Ok(())
    }

    /// Connects to `close-request`. Returning `true` keeps the window open.
    pub fn on_close_request<F>(&self, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn() -> bool + 'static,
    {
        self.handle
            .connect_returning("close-request", move |_| Some(Value::Bool(callback())))
    }

    fn live(&self) -> Result<NativeHandle, ObjectError> {
        live_handle(&self.handle)
    }
}

impl AsWidget for Window {
    fn handle(&self) -> &ObjectHandle {
        &self.handle
    }
}

fn live_handle(handle: &ObjectHandle) -> Result<NativeHandle, ObjectError> {
    if handle.is_null() {
        Err(ObjectError::Released)
    } else {
        Ok(handle.as_ptr())
    }
}

/// An on/off switch.
#[derive(Clone)]
pub struct Switch {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
}

impl Switch {
    pub fn new(toolkit: &Rc<Toolkit>) -> Result<Self, BridgeError> {
        // SAFETY: GTK is initialized by the caller.
        let raw = NativeHandle::from_ptr(unsafe { (toolkit.gtk().gtk_switch_new)() });
        let handle = ObjectHandle::adopt(toolkit.runtime(), raw, "gtk_switch_new")?;
        Ok(Self::from_handle(toolkit, handle))
    }

    pub fn from_handle(toolkit: &Rc<Toolkit>, handle: ObjectHandle) -> Self {
        Self {
            toolkit: Rc::clone(toolkit),
            handle,
        }
    }

    pub fn is_active(&self) -> Result<bool, BridgeError> {
        read_bool(&self.handle, "active")
    }

    pub fn set_active(&self, active: bool) -> Result<(), BridgeError> {
        self.handle.set_property("active", active)
    }

    /// Calls `callback` with the new state whenever `active` changes.
    ///
    /// The state is read back from the emitting instance, so the callback
    /// holds no reference to the switch.
    pub fn on_active_notify<F>(&self, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn(bool) + 'static,
    {
        let runtime = Rc::clone(self.toolkit.runtime());
        self.handle.connect("notify::active", move |args| {
            let switch = ObjectHandle::wrap(&runtime, args.instance());
            match read_bool(&switch, "active") {
                Ok(active) => callback(active),
                Err(err) => {
                    tracing::warn!(target: "gobridge::widget", error = %err, "cannot read switch state")
                }
            }
        })
    }
}

impl AsWidget for Switch {
    fn handle(&self) -> &ObjectHandle {
        &self.handle
    }
}

/// A text label.
#[derive(Clone)]
pub struct Label {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
}

impl Label {
    pub fn new(toolkit: &Rc<Toolkit>, text: &str) -> Result<Self, BridgeError> {
        let text = to_native_string(text)?;
        // SAFETY: `text` outlives the call; GTK copies it.
        let raw = NativeHandle::from_ptr(unsafe { (toolkit.gtk().gtk_label_new)(text.as_ptr()) });
        let handle = ObjectHandle::adopt(toolkit.runtime(), raw, "gtk_label_new")?;
        Ok(Self::from_handle(toolkit, handle))
    }

    pub fn from_handle(toolkit: &Rc<Toolkit>, handle: ObjectHandle) -> Self {
        Self {
            toolkit: Rc::clone(toolkit),
            handle,
        }
    }

    pub fn text(&self) -> Result<String, BridgeError> {
        read_string(&self.handle, "label")
    }

    pub fn set_text(&self, text: &str) -> Result<(), BridgeError> {
        let ptr = live_handle(&self.handle)?;
        let text = to_native_string(text)?;
        // SAFETY: `ptr` is a live label; GTK copies `text`.
        unsafe { (self.toolkit.gtk().gtk_label_set_text)(ptr.as_ptr(), text.as_ptr()) };
        Ok(())
    }
}

impl AsWidget for Label {
    fn handle(&self) -> &ObjectHandle {
        &self.handle
    }
}

/// Direction children of a [`BoxLayout`] are stacked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    Horizontal,
    #[default]
    Vertical,
}

impl Orientation {
    fn as_native(self) -> c_int {
        match self {
            Self::Horizontal => 0,
            Self::Vertical => 1,
        }
    }
}

/// A container stacking children in a row or column (`GtkBox`).
#[derive(Clone)]
pub struct BoxLayout {
    toolkit: Rc<Toolkit>,
    handle: ObjectHandle,
}

impl BoxLayout {
    pub fn new(toolkit: &Rc<Toolkit>, orientation: Orientation, spacing: i32) -> Result<Self, BridgeError> {
        // SAFETY: GTK is initialized by the caller.
        let raw = NativeHandle::from_ptr(unsafe { (toolkit.gtk().gtk_box_new)(orientation.as_native(), spacing) });
        let handle = ObjectHandle::adopt(toolkit.runtime(), raw, "gtk_box_new")?;
        Ok(Self::from_handle(toolkit, handle))
    }

    pub fn from_handle(toolkit: &Rc<Toolkit>, handle: ObjectHandle) -> Self {
        Self {
            toolkit: Rc::clone(toolkit),
            handle,
        }
    }

    pub fn append(&self, child: &dyn AsWidget) -> Result<(), ObjectError> {
        let ptr = live_handle(&self.handle)?;
        let child = live_handle(child.handle())?;
        // SAFETY: both pointers are live.
        unsafe { (self.toolkit.gtk().gtk_box_append)(ptr.as_ptr(), child.as_ptr()) };
        Ok(())
    }

    pub fn remove(&self, child: &dyn AsWidget) -> Result<(), ObjectError> {
        let ptr = live_handle(&self.handle)?;
        let child = live_handle(child.handle())?;
        // SAFETY: both pointers are live.
        unsafe { (self.toolkit.gtk().gtk_box_remove)(ptr.as_ptr(), child.as_ptr()) };
        Ok(())
    }
}

impl AsWidget for BoxLayout {
    fn handle(&self) -> &ObjectHandle {
        &self.handle
    }
}

macro_rules! impl_into_widget {
    ($($facade:ident),*) => {
        $(
            impl From<$facade> for Widget {
                fn from(facade: $facade) -> Self {
                    Widget {
                        toolkit: facade.toolkit,
                        handle: facade.handle,
                    }
                }
            }
        )*
    };
}

impl_into_widget!(Window, Switch, Label, BoxLayout);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_native_values() {
        assert_eq!(Orientation::Horizontal.as_native(), 0);
        assert_eq!(Orientation::Vertical.as_native(), 1);
        assert_eq!(Orientation::default(), Orientation::Vertical);
    }
}
