//! Owned references to native objects.
//!
//! [`ObjectHandle`] holds one strong native reference. It gives string-keyed,
//! reflective access to the object's properties and signals; typed facades in
//! higher layers are built on top of it.
//!
//! # Ownership
//!
//! - [`ObjectHandle::wrap`] takes a *new* reference on a pointer the caller
//!   keeps owning.
//! - [`ObjectHandle::adopt`] takes over the reference returned by a
//!   constructor, sinking it first if it is floating.
//! - [`ObjectHandle::unref`] releases the reference and every signal
//!   subscription made through the handle. It runs on drop, and running it
//!   twice is harmless.
//!
//! # Example
//!
//! ```ignore
//! let switch = ObjectHandle::adopt(&runtime, raw_switch, "gtk_switch_new")?;
//! switch.set_property("active", true)?;
//! let id = switch.connect("notify::active", |args| {
//!     println!("toggled on {:?}", args.instance());
//! })?;
//! assert_eq!(switch.get_property("active", Some(ValueKind::Bool))?, Value::Bool(true));
//! switch.disconnect(id);
//! ```

use std::cell::{Cell, RefCell};
use std::ffi::c_uint;
use std::fmt;
use std::rc::Rc;

use crate::error::{BridgeError, ObjectError, SignalError};
use crate::marshal::{StringArray, from_native_string, to_native_string};
use crate::runtime::Runtime;
use crate::sys::{GSignalQuery, GValue, NativeHandle, gtype};
use crate::symbols::GBoolean;
use crate::trampoline::{SignalArgs, SignalCallback, SignalHandlerId, SignalRegistry};
use crate::value::{BoxedArray, BoxedValue, Value, ValueKind, decode_raw};

/// A strong reference to a native object.
pub struct ObjectHandle {
    runtime: Rc<Runtime>,
    ptr: Cell<NativeHandle>,
    subscriptions: RefCell<Vec<SignalHandlerId>>,
}

impl ObjectHandle {
    /// Takes a new reference on `handle`. A null handle stays null.
    pub fn wrap(runtime: &Rc<Runtime>, handle: NativeHandle) -> Self {
        if !handle.is_null() {
            // SAFETY: `handle` is a live object owned by the caller.
            unsafe { (runtime.gobject().g_object_ref)(handle.as_ptr()) };
        }
        Self::from_owned(runtime, handle)
    }

    /// Takes over the reference returned by `constructor`.
    ///
    /// Floating references are sunk so the handle owns a full reference.
    pub fn adopt(
        runtime: &Rc<Runtime>,
        handle: NativeHandle,
        constructor: &'static str,
    ) -> Result<Self, ObjectError> {
        if handle.is_null() {
            return Err(ObjectError::NullHandle { constructor });
        }
        let lib = runtime.gobject();
        // SAFETY: `handle` is the live result of a constructor.
        unsafe {
            if (lib.g_object_is_floating)(handle.as_ptr()).is_true() {
                (lib.g_object_ref_sink)(handle.as_ptr());
            }
        }
        tracing::trace!(target: "gobridge_core::object", constructor, ?handle, "adopted");
        Ok(Self::from_owned(runtime, handle))
    }

    /// Constructs an object of the named type with initial properties.
    pub fn new(
        runtime: &Rc<Runtime>,
        type_name: &str,
        properties: &[(&str, Value)],
    ) -> Result<Self, BridgeError> {
        let g_type = runtime.type_from_name(type_name)?;
        let lib = runtime.gobject();
        let construct = lib
            .g_object_new_with_properties
            .ok_or(ObjectError::SymbolUnavailable("g_object_new_with_properties"))?;

        let names = StringArray::new(properties.iter().map(|(name, _)| *name))?;
        let values = BoxedArray::from_values(lib, properties.iter().map(|(_, value)| value))?;
        // SAFETY: `names` and `values` both hold `properties.len()` entries
        // and outlive the call.
        let raw = unsafe {
            construct(g_type, properties.len() as c_uint, names.as_ptr(), values.as_ptr())
        };
        let handle = Self::adopt(
            runtime,
            NativeHandle::from_ptr(raw),
            "g_object_new_with_properties",
        )?;
        tracing::debug!(target: "gobridge_core::object", type_name, properties = properties.len(), "constructed");
        Ok(handle)
    }

    fn from_owned(runtime: &Rc<Runtime>, handle: NativeHandle) -> Self {
        Self {
            runtime: Rc::clone(runtime),
            ptr: Cell::new(handle),
            subscriptions: RefCell::new(Vec::new()),
        }
    }

    /// The raw pointer, null once released.
    pub fn as_ptr(&self) -> NativeHandle {
        self.ptr.get()
    }

    /// Whether the handle holds no object (released, or wrapped null).
    pub fn is_null(&self) -> bool {
        self.ptr.get().is_null()
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    fn live(&self) -> Result<NativeHandle, ObjectError> {
        let ptr = self.ptr.get();
        if ptr.is_null() {
            Err(ObjectError::Released)
        } else {
            Ok(ptr)
        }
    }

    /// Releases the native reference and every subscription made through
    /// this handle. Does nothing if already released.
    pub fn unref(&self) {
        let ptr = self.ptr.replace(NativeHandle::null());
        if ptr.is_null() {
            return;
        }
        let subscriptions = self.subscriptions.take();
        for id in subscriptions {
            SignalRegistry::unregister(&self.runtime, ptr, id);
        }
        // SAFETY: this handle owned one reference on `ptr`.
        unsafe { (self.runtime.gobject().g_object_unref)(ptr.as_ptr()) };
        tracing::trace!(target: "gobridge_core::object", handle = ?ptr, "released");
    }

    /// The native type name of the instance.
    pub fn type_name(&self) -> Result<String, ObjectError> {
        let ptr = self.live()?;
        // SAFETY: `ptr` is live; the name is interned.
        Ok(unsafe { from_native_string((self.runtime.gobject().g_type_name_from_instance)(ptr.as_ptr())) })
    }

    /// Writes a property. The value's kind selects the native type.
    #[tracing::instrument(skip(self, value), target = "gobridge_core::property", level = "trace")]
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<(), BridgeError> {
        let ptr = self.live()?;
        let value = value.into();
        let native_name = to_native_string(name)?;
        let lib = self.runtime.gobject();
        let boxed = BoxedValue::from_value(lib, &value)?;
        // SAFETY: `ptr` is live and `boxed` is initialized; the buffer is
        // unset when `boxed` drops.
        unsafe { (lib.g_object_set_property)(ptr.as_ptr(), native_name.as_ptr(), boxed.as_ptr()) };
        Ok(())
    }

    /// Reads a property as `kind`, or as the kind inferred from its name.
    #[tracing::instrument(skip(self), target = "gobridge_core::property", level = "trace")]
    pub fn get_property(&self, name: &str, kind: Option<ValueKind>) -> Result<Value, BridgeError> {
        let ptr = self.live()?;
        let kind = kind.unwrap_or_else(|| ValueKind::for_property(name));
        let native_name = to_native_string(name)?;
        let lib = self.runtime.gobject();
        let mut boxed = BoxedValue::new(lib, kind)?;
        // SAFETY: `ptr` is live and `boxed` is initialized for `kind`.
        unsafe { (lib.g_object_get_property)(ptr.as_ptr(), native_name.as_ptr(), boxed.as_mut_ptr()) };
        Ok(boxed.get())
    }

    /// Connects a callback to a (possibly detailed) signal.
    pub fn connect<F>(&self, signal: &str, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn(&SignalArgs<'_>) + 'static,
    {
        self.connect_callback(
            signal,
            Rc::new(move |args: &SignalArgs<'_>| {
                callback(args);
                None
            }),
        )
    }

    /// Connects a callback whose result is written to the signal's return
    /// slot.
    pub fn connect_returning<F>(&self, signal: &str, callback: F) -> Result<SignalHandlerId, BridgeError>
    where
        F: Fn(&SignalArgs<'_>) -> Option<Value> + 'static,
    {
        self.connect_callback(signal, Rc::new(callback))
    }

    fn connect_callback(&self, signal: &str, callback: SignalCallback) -> Result<SignalHandlerId, BridgeError> {
        let ptr = self.live()?;
        let id = SignalRegistry::register(&self.runtime, ptr, signal, callback)?;
        self.subscriptions.borrow_mut().push(id);
        Ok(id)
    }

    /// Disconnects a subscription made through this handle.
    pub fn disconnect(&self, id: SignalHandlerId) -> bool {
        let ptr = self.ptr.get();
        if ptr.is_null() {
            return false;
        }
        let owned = {
            let mut subscriptions = self.subscriptions.borrow_mut();
            match subscriptions.iter().position(|s| *s == id) {
                Some(index) => {
                    subscriptions.swap_remove(index);
                    true
                }
                None => false,
            }
        };
        owned && SignalRegistry::unregister(&self.runtime, ptr, id)
    }

    /// Number of live subscriptions made through this handle.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Emits a signal that takes no parameters, synchronously.
    ///
    /// `notify::<property>` is routed to `g_object_notify`. Returns the
    /// signal's return value, or [`Value::None`] for signals without one.
    #[tracing::instrument(skip(self), target = "gobridge_core::signal", level = "debug")]
    pub fn emit(&self, signal: &str) -> Result<Value, BridgeError> {
        let ptr = self.live()?;
        let lib = self.runtime.gobject();

        if let Some(property) = signal.strip_prefix("notify::") {
            let native_property = to_native_string(property)?;
            // SAFETY: `ptr` is live.
            unsafe { (lib.g_object_notify)(ptr.as_ptr(), native_property.as_ptr()) };
            return Ok(Value::None);
        }

        let itype = self
            .runtime
            .instance_type(ptr)
            .ok_or_else(|| SignalError::UnknownSignal(signal.to_owned()))?;
        let native_signal = to_native_string(signal)?;
        let mut signal_id: c_uint = 0;
        let mut detail = 0;
        // SAFETY: out-params point to locals.
        let found = unsafe {
            (lib.g_signal_parse_name)(
                native_signal.as_ptr(),
                itype,
                &mut signal_id,
                &mut detail,
                GBoolean::FALSE,
            )
        };
        if !found.is_true() || signal_id == 0 {
            return Err(SignalError::UnknownSignal(signal.to_owned()).into());
        }

        let mut query = GSignalQuery::default();
        // SAFETY: `query` is a valid out-param.
        unsafe { (lib.g_signal_query)(signal_id, &mut query) };
        if query.n_params > 0 {
            return Err(SignalError::UnsupportedEmission {
                signal: signal.to_owned(),
                params: query.n_params,
            }
            .into());
        }

        let instance = BoxedValue::from_value(lib, &Value::Object(ptr))?;
        let return_type = query.return_type & !gtype::STATIC_SCOPE_FLAG;
        let mut return_value = if return_type != gtype::NONE && return_type != gtype::INVALID {
            let mut raw = GValue::zeroed();
            // SAFETY: `raw` is zeroed.
            unsafe { (lib.g_value_init)(&mut raw, return_type) };
            Some(raw)
        } else {
            None
        };
        let return_ptr = return_value
            .as_mut()
            .map_or(std::ptr::null_mut(), |raw| raw as *mut GValue);

        // SAFETY: `instance` holds the emitter and the signal takes no
        // further parameters; `return_ptr` is null or initialized.
        unsafe { (lib.g_signal_emitv)(instance.as_ptr(), signal_id, detail, return_ptr) };

        let result = match return_value.as_mut() {
            Some(raw) => {
                // SAFETY: `raw` was initialized above and is unset exactly once.
                unsafe {
                    let decoded = decode_raw(lib, raw).unwrap_or_default();
                    (lib.g_value_unset)(raw);
                    decoded
                }
            }
            None => Value::None,
        };
        Ok(result)
    }
}

impl Clone for ObjectHandle {
    /// Takes another native reference. Subscriptions are not shared.
    fn clone(&self) -> Self {
        Self::wrap(&self.runtime, self.ptr.get())
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.unref();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("ptr", &self.ptr.get())
            .field("subscriptions", &self.subscriptions.borrow().len())
            .finish()
    }
}

impl From<&ObjectHandle> for Value {
    fn from(handle: &ObjectHandle) -> Self {
        Value::Object(handle.as_ptr())
    }
}
