//! Signal trampoline and subscription registry.
//!
//! Native signal emissions reach Rust closures through a single marshal
//! function, [`signal_trampoline`], installed as the meta-marshal of a
//! `GClosure` created per connection. The closure's marshal data names an
//! entry in the runtime's [`SignalRegistry`], which holds the Rust callback.
//!
//! Lifetimes:
//!
//! - the registry entry lives from `register` until `unregister` (or until the
//!   owning object handle is released, which unregisters for it);
//! - the marshal data lives until GLib finalizes the closure, which happens
//!   after the handler is disconnected and no emission still references it.
//!
//! An emission that arrives after its entry was removed finds nothing to call
//! and returns without invoking anything.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_uint, c_ulong, c_void};
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};
use std::slice;

use slotmap::{SlotMap, new_key_type};

use crate::error::{BridgeError, SignalError};
use crate::marshal::to_native_string;
use crate::runtime::Runtime;
use crate::symbols::GBoolean;
use crate::sys::{GClosure, GObjectLib, GType, GValue, NativeHandle, gtype};
use crate::value::{Value, decode_raw, store_raw};

new_key_type! {
    /// Internal key of a subscription in the registry.
    struct SubscriptionKey;
}

/// A native signal handler id, as returned by `g_signal_connect_closure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalHandlerId(c_ulong);

impl SignalHandlerId {
    pub fn from_raw(id: c_ulong) -> Self {
        Self(id)
    }

    pub fn as_raw(self) -> c_ulong {
        self.0
    }
}

/// A registered signal callback. The return value, if any, is written to the
/// signal's return slot.
pub type SignalCallback = Rc<dyn Fn(&SignalArgs<'_>) -> Option<Value>>;

struct Subscription {
    instance: NativeHandle,
    signal: String,
    handler_id: Option<SignalHandlerId>,
    callback: SignalCallback,
}

/// Marshal data attached to each closure.
struct TrampolineData {
    runtime: Weak<Runtime>,
    key: SubscriptionKey,
}

/// The arguments of one signal emission.
///
/// Index 0 of the native argument array is the emitting instance; the
/// parameters are numbered from 0 after it.
pub struct SignalArgs<'a> {
    lib: &'a GObjectLib,
    values: &'a [GValue],
}

impl<'a> SignalArgs<'a> {
    /// Builds arguments over a native argument array.
    ///
    /// # Safety
    ///
    /// Every element of `values` must be an initialized buffer.
    pub unsafe fn from_raw(lib: &'a GObjectLib, values: &'a [GValue]) -> Self {
        Self { lib, values }
    }

    /// The emitting instance.
    pub fn instance(&self) -> NativeHandle {
        match self.values.first() {
            // SAFETY: initialized per the constructor contract.
            Some(raw) => NativeHandle::from_ptr(unsafe { (self.lib.g_value_peek_pointer)(raw) }),
            None => NativeHandle::null(),
        }
    }

    /// Number of parameters, excluding the instance.
    pub fn len(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn param(&self, index: usize) -> Option<&GValue> {
        self.values.get(index + 1)
    }

    /// The type of parameter `index`.
    pub fn value_type(&self, index: usize) -> Option<GType> {
        self.param(index).map(|raw| raw.g_type)
    }

    /// The raw pointer payload of parameter `index`, for pointer-like
    /// parameters (objects, boxed types, param specs, strings, pointers).
    pub fn pointer(&self, index: usize) -> Option<NativeHandle> {
        let raw = self.param(index)?;
        match self.lib.fundamental(raw.g_type) {
            gtype::OBJECT
            | gtype::INTERFACE
            | gtype::POINTER
            | gtype::BOXED
            | gtype::PARAM
            | gtype::STRING
            | gtype::VARIANT => {
                // SAFETY: pointer-like fundamental types implement peek_pointer.
                Some(NativeHandle::from_ptr(unsafe { (self.lib.g_value_peek_pointer)(raw) }))
            }
            _ => None,
        }
    }

    /// Parameter `index`, decoded by its fundamental type.
    pub fn value(&self, index: usize) -> Option<Value> {
        let raw = self.param(index)?;
        // SAFETY: initialized per the constructor contract.
        unsafe { decode_raw(self.lib, raw) }
    }
}

impl std::fmt::Debug for SignalArgs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalArgs")
            .field("instance", &self.instance())
            .field("len", &self.len())
            .finish()
    }
}

/// Holds the callbacks of every live signal subscription.
#[derive(Default)]
pub struct SignalRegistry {
    entries: RefCell<SlotMap<SubscriptionKey, Subscription>>,
    by_handler: RefCell<HashMap<SignalHandlerId, SubscriptionKey>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Whether `id` names a live subscription.
    pub fn contains(&self, id: SignalHandlerId) -> bool {
        self.by_handler.borrow().contains_key(&id)
    }

    /// Connects `callback` to `signal` on `instance`.
    #[tracing::instrument(skip(runtime, callback), target = "gobridge_core::signal", level = "debug")]
    pub fn register(
        runtime: &Rc<Runtime>,
        instance: NativeHandle,
        signal: &str,
        callback: SignalCallback,
    ) -> Result<SignalHandlerId, BridgeError> {
        let native_signal = to_native_string(signal)?;
        let registry = runtime.signals();
        let lib = runtime.gobject();

        let key = registry.entries.borrow_mut().insert(Subscription {
            instance,
            signal: signal.to_owned(),
            handler_id: None,
            callback,
        });
        let data = Box::into_raw(Box::new(TrampolineData {
            runtime: Rc::downgrade(runtime),
            key,
        }));

        // SAFETY: the closure takes ownership of `data`, released by the
        // finalize notifier. The size passed covers the GClosure header.
        let handler = unsafe {
            let closure = (lib.g_closure_new_simple)(mem::size_of::<GClosure>() as c_uint, std::ptr::null_mut());
            (lib.g_closure_set_meta_marshal)(closure, data.cast(), Some(signal_trampoline));
            (lib.g_closure_add_finalize_notifier)(closure, data.cast(), Some(free_trampoline_data));
            let id = (lib.g_signal_connect_closure)(
                instance.as_ptr(),
                native_signal.as_ptr(),
                closure,
                GBoolean::FALSE,
            );
            if id == 0 {
                // Drops the floating reference, which finalizes the closure.
                (lib.g_closure_sink)(closure);
            }
            id
        };

        if handler == 0 {
            let removed = registry.entries.borrow_mut().remove(key);
            drop(removed);
            tracing::debug!(target: "gobridge_core::signal", signal, "native connect refused");
            return Err(SignalError::ConnectFailed {
                signal: signal.to_owned(),
            }
            .into());
        }

        let id = SignalHandlerId(handler);
        if let Some(entry) = registry.entries.borrow_mut().get_mut(key) {
            entry.handler_id = Some(id);
        }
        registry.by_handler.borrow_mut().insert(id, key);
        tracing::debug!(target: "gobridge_core::signal", signal, handler = handler, "connected");
        Ok(id)
    }

    /// Removes the subscription `id` and disconnects it natively.
    ///
    /// Returns `false` if `id` is not a live subscription.
    pub fn unregister(runtime: &Runtime, instance: NativeHandle, id: SignalHandlerId) -> bool {
        let registry = runtime.signals();
        let Some(key) = registry.by_handler.borrow_mut().remove(&id) else {
            return false;
        };
        let removed = registry.entries.borrow_mut().remove(key);
        // The callback is dropped here, before the native disconnect.
        let signal = removed.map(|entry| entry.signal).unwrap_or_default();

        if !instance.is_null() {
            // SAFETY: `instance` is live and `id` was connected on it.
            unsafe { (runtime.gobject().g_signal_handler_disconnect)(instance.as_ptr(), id.0) };
        }
        tracing::debug!(target: "gobridge_core::signal", signal = %signal, handler = id.0, "disconnected");
        true
    }

    fn callback(&self, key: SubscriptionKey) -> Option<SignalCallback> {
        self.entries.borrow().get(key).map(|entry| Rc::clone(&entry.callback))
    }
}

impl std::fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRegistry").field("len", &self.len()).finish()
    }
}

/// The meta-marshal installed on every bridge closure.
unsafe extern "C" fn signal_trampoline(
    _closure: *mut GClosure,
    return_value: *mut GValue,
    n_param_values: c_uint,
    param_values: *const GValue,
    _invocation_hint: *mut c_void,
    marshal_data: *mut c_void,
) {
    if marshal_data.is_null() {
        return;
    }
    // SAFETY: marshal data is the TrampolineData installed by `register`,
    // freed only by the finalize notifier.
    let data = unsafe { &*(marshal_data as *const TrampolineData) };
    let Some(runtime) = data.runtime.upgrade() else {
        return;
    };
    let Some(callback) = runtime.signals().callback(data.key) else {
        tracing::trace!(target: "gobridge_core::signal", "emission for a removed subscription");
        return;
    };

    let lib = runtime.gobject();
    let values = if param_values.is_null() || n_param_values == 0 {
        &[][..]
    } else {
        // SAFETY: GLib passes `n_param_values` initialized values.
        unsafe { slice::from_raw_parts(param_values, n_param_values as usize) }
    };
    let args = SignalArgs { lib, values };

    match catch_unwind(AssertUnwindSafe(|| callback(&args))) {
        Ok(Some(value)) if !return_value.is_null() => {
            // SAFETY: GLib initializes the return slot with the signal's
            // return type.
            if let Err(err) = unsafe { store_raw(lib, return_value, &value) } {
                tracing::warn!(target: "gobridge_core::signal", error = %err, "could not store signal return value");
            }
        }
        Ok(_) => {}
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            tracing::error!(target: "gobridge_core::signal", panic = %message, "signal callback panicked");
        }
    }
}

/// Finalize notifier releasing a closure's marshal data.
unsafe extern "C" fn free_trampoline_data(data: *mut c_void, _closure: *mut GClosure) {
    if !data.is_null() {
        // SAFETY: `data` came from Box::into_raw in `register` and the
        // notifier runs once.
        drop(unsafe { Box::from_raw(data as *mut TrampolineData) });
    }
}
