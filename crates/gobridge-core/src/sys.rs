//! Raw GLib and GObject ABI: plain-data types, fundamental type ids, and the
//! two symbol tables the core needs.

use std::ffi::{c_char, c_int, c_uint, c_ulong, c_void};
use std::ptr;

use crate::native_library;
use crate::symbols::GBoolean;

/// A GObject type id (`GType`, a `gsize`).
pub type GType = usize;

/// A `GQuark` (signal details).
pub type GQuark = u32;

/// Fundamental type ids. Fundamental types are numbered `n << 2`.
pub mod gtype {
    use super::GType;

    pub const INVALID: GType = 0;
    pub const NONE: GType = 1 << 2;
    pub const INTERFACE: GType = 2 << 2;
    pub const CHAR: GType = 3 << 2;
    pub const UCHAR: GType = 4 << 2;
    pub const BOOLEAN: GType = 5 << 2;
    pub const INT: GType = 6 << 2;
    pub const UINT: GType = 7 << 2;
    pub const LONG: GType = 8 << 2;
    pub const ULONG: GType = 9 << 2;
    pub const INT64: GType = 10 << 2;
    pub const UINT64: GType = 11 << 2;
    pub const ENUM: GType = 12 << 2;
    pub const FLAGS: GType = 13 << 2;
    pub const FLOAT: GType = 14 << 2;
    pub const DOUBLE: GType = 15 << 2;
    pub const STRING: GType = 16 << 2;
    pub const POINTER: GType = 17 << 2;
    pub const BOXED: GType = 18 << 2;
    pub const PARAM: GType = 19 << 2;
    pub const OBJECT: GType = 20 << 2;
    pub const VARIANT: GType = 21 << 2;

    /// Upper bound (exclusive) of the reserved fundamental range.
    pub const FUNDAMENTAL_MAX: GType = 255 << 2;

    /// Flag bit GLib sets on signal return/param types to mark static scope.
    pub const STATIC_SCOPE_FLAG: GType = 1;
}

/// `G_PRIORITY_DEFAULT`.
pub const PRIORITY_DEFAULT: c_int = 0;
/// `G_PRIORITY_DEFAULT_IDLE`.
pub const PRIORITY_DEFAULT_IDLE: c_int = 200;

/// A raw native pointer that may be null.
///
/// Null means "no object". Every API taking a `NativeHandle` accepts null.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(*mut c_void);

impl NativeHandle {
    /// The null handle.
    #[inline]
    pub const fn null() -> Self {
        Self(ptr::null_mut())
    }

    /// Wraps a raw pointer.
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// Returns the raw pointer.
    #[inline]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    /// Whether this handle is null.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for NativeHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeHandle({:p})", self.0)
    }
}

impl<T> From<*mut T> for NativeHandle {
    fn from(ptr: *mut T) -> Self {
        Self(ptr.cast())
    }
}

/// The 24-byte tagged value buffer (`GValue`).
///
/// Only its layout matters on this side; all access goes through the
/// `g_value_*` entry points.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GValue {
    pub g_type: GType,
    pub data: [u64; 2],
}

impl GValue {
    /// An uninitialized (all-zero) buffer, as `G_VALUE_INIT` produces.
    pub const fn zeroed() -> Self {
        Self {
            g_type: gtype::INVALID,
            data: [0; 2],
        }
    }
}

impl Default for GValue {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(target_pointer_width = "64")]
static_assertions::assert_eq_size!(GValue, [u8; 24]);

/// Layout of `GClosure`: a 32-bit field of flags and counters followed by the
/// marshal pointer, data, and notifier array.
#[repr(C)]
#[derive(Debug)]
pub struct GClosure {
    pub flags: u32,
    pub marshal: GClosureMarshal,
    pub data: *mut c_void,
    pub notifiers: *mut c_void,
}

#[cfg(target_pointer_width = "64")]
static_assertions::assert_eq_size!(GClosure, [u8; 32]);

/// Output of `g_signal_query`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GSignalQuery {
    pub signal_id: c_uint,
    pub signal_name: *const c_char,
    pub itype: GType,
    pub signal_flags: c_uint,
    pub return_type: GType,
    pub n_params: c_uint,
    pub param_types: *const GType,
}

impl Default for GSignalQuery {
    fn default() -> Self {
        Self {
            signal_id: 0,
            signal_name: ptr::null(),
            itype: gtype::INVALID,
            signal_flags: 0,
            return_type: gtype::INVALID,
            n_params: 0,
            param_types: ptr::null(),
        }
    }
}

/// A `GError` as returned through `GError**` out-parameters.
#[repr(C)]
#[derive(Debug)]
pub struct GError {
    pub domain: GQuark,
    pub code: c_int,
    pub message: *mut c_char,
}

/// `GClosureMarshal`.
pub type GClosureMarshal = Option<
    unsafe extern "C" fn(
        closure: *mut GClosure,
        return_value: *mut GValue,
        n_param_values: c_uint,
        param_values: *const GValue,
        invocation_hint: *mut c_void,
        marshal_data: *mut c_void,
    ),
>;

/// `GClosureNotify`.
pub type GClosureNotify = Option<unsafe extern "C" fn(data: *mut c_void, closure: *mut GClosure)>;

/// `GSourceFunc`.
pub type GSourceFunc = Option<unsafe extern "C" fn(data: *mut c_void) -> GBoolean>;

/// `GDestroyNotify`.
pub type GDestroyNotify = Option<unsafe extern "C" fn(data: *mut c_void)>;

native_library! {
    /// GLib: the main context, event sources, and the allocator.
    pub struct GLibLib("glib-2.0") {
        fn g_main_context_default() -> *mut c_void;
        fn g_main_context_pending(context: *mut c_void) -> GBoolean;
        fn g_main_context_iteration(context: *mut c_void, may_block: GBoolean) -> GBoolean;
        fn g_timeout_add_full(
            priority: c_int,
            interval: c_uint,
            function: GSourceFunc,
            data: *mut c_void,
            notify: GDestroyNotify,
        ) -> c_uint;
        fn g_idle_add_full(
            priority: c_int,
            function: GSourceFunc,
            data: *mut c_void,
            notify: GDestroyNotify,
        ) -> c_uint;
        fn g_source_remove(tag: c_uint) -> GBoolean;
        fn g_free(mem: *mut c_void);
        fn g_error_free(error: *mut GError);
        optional {
            fn g_main_context_wakeup(context: *mut c_void);
        }
    }
}

native_library! {
    /// GObject: reference counting, properties, the `GValue` protocol,
    /// signals, closures, and type lookup.
    pub struct GObjectLib("gobject-2.0") {
        fn g_object_ref(object: *mut c_void) -> *mut c_void;
        fn g_object_unref(object: *mut c_void);
        fn g_object_ref_sink(object: *mut c_void) -> *mut c_void;
        fn g_object_is_floating(object: *mut c_void) -> GBoolean;
        fn g_object_set_property(object: *mut c_void, name: *const c_char, value: *const GValue);
        fn g_object_get_property(object: *mut c_void, name: *const c_char, value: *mut GValue);
        fn g_object_notify(object: *mut c_void, name: *const c_char);

        fn g_value_init(value: *mut GValue, g_type: GType) -> *mut GValue;
        fn g_value_unset(value: *mut GValue);
        fn g_value_set_string(value: *mut GValue, v_string: *const c_char);
        fn g_value_get_string(value: *const GValue) -> *const c_char;
        fn g_value_set_boolean(value: *mut GValue, v_boolean: GBoolean);
        fn g_value_get_boolean(value: *const GValue) -> GBoolean;
        fn g_value_set_int(value: *mut GValue, v_int: c_int);
        fn g_value_get_int(value: *const GValue) -> c_int;
        fn g_value_set_uint(value: *mut GValue, v_uint: c_uint);
        fn g_value_get_uint(value: *const GValue) -> c_uint;
        fn g_value_set_double(value: *mut GValue, v_double: f64);
        fn g_value_get_double(value: *const GValue) -> f64;
        fn g_value_set_object(value: *mut GValue, v_object: *mut c_void);
        fn g_value_get_object(value: *const GValue) -> *mut c_void;
        fn g_value_peek_pointer(value: *const GValue) -> *mut c_void;

        fn g_type_from_name(name: *const c_char) -> GType;
        fn g_type_name(g_type: GType) -> *const c_char;
        fn g_type_name_from_instance(instance: *mut c_void) -> *const c_char;
        fn g_type_fundamental(type_id: GType) -> GType;

        fn g_signal_connect_closure(
            instance: *mut c_void,
            detailed_signal: *const c_char,
            closure: *mut GClosure,
            after: GBoolean,
        ) -> c_ulong;
        fn g_signal_handler_disconnect(instance: *mut c_void, handler_id: c_ulong);
        fn g_signal_parse_name(
            detailed_signal: *const c_char,
            itype: GType,
            signal_id: *mut c_uint,
            detail: *mut GQuark,
            force_detail_quark: GBoolean,
        ) -> GBoolean;
        fn g_signal_query(signal_id: c_uint, query: *mut GSignalQuery);
        fn g_signal_emitv(
            instance_and_params: *const GValue,
            signal_id: c_uint,
            detail: GQuark,
            return_value: *mut GValue,
        );

        fn g_closure_new_simple(sizeof_closure: c_uint, data: *mut c_void) -> *mut GClosure;
        fn g_closure_set_meta_marshal(
            closure: *mut GClosure,
            marshal_data: *mut c_void,
            meta_marshal: GClosureMarshal,
        );
        fn g_closure_add_finalize_notifier(
            closure: *mut GClosure,
            notify_data: *mut c_void,
            notify_func: GClosureNotify,
        );
        fn g_closure_sink(closure: *mut GClosure);
        optional {
            /// Available since GLib 2.54.
            fn g_object_new_with_properties(
                object_type: GType,
                n_properties: c_uint,
                names: *const *const c_char,
                values: *const GValue,
            ) -> *mut c_void;
            fn g_signal_handler_is_connected(instance: *mut c_void, handler_id: c_ulong) -> GBoolean;
        }
    }
}

impl GObjectLib {
    /// The concrete type of a live instance, or `None` for null.
    pub fn instance_type(&self, instance: NativeHandle) -> Option<GType> {
        if instance.is_null() {
            return None;
        }
        // SAFETY: instance is a live GTypeInstance; the returned name is
        // interned by the type system.
        let g_type = unsafe {
            let name = (self.g_type_name_from_instance)(instance.as_ptr());
            if name.is_null() {
                return None;
            }
            (self.g_type_from_name)(name)
        };
        (g_type != gtype::INVALID).then_some(g_type)
    }

    /// The fundamental type of `g_type`, with the static-scope flag removed.
    pub fn fundamental(&self, g_type: GType) -> GType {
        // SAFETY: plain query on the type registry.
        unsafe { (self.g_type_fundamental)(g_type & !gtype::STATIC_SCOPE_FLAG) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fundamental_ids() {
        assert_eq!(gtype::BOOLEAN, 20);
        assert_eq!(gtype::INT, 24);
        assert_eq!(gtype::UINT, 28);
        assert_eq!(gtype::DOUBLE, 60);
        assert_eq!(gtype::STRING, 64);
        assert_eq!(gtype::POINTER, 68);
        assert_eq!(gtype::OBJECT, 80);
    }

    #[test]
    fn test_native_handle_null() {
        let handle = NativeHandle::null();
        assert!(handle.is_null());
        assert_eq!(handle, NativeHandle::default());

        let mut slot = 7u8;
        let handle = NativeHandle::from(&mut slot as *mut u8);
        assert!(!handle.is_null());
    }

    #[test]
    fn test_tables_declare_expected_symbols() {
        assert!(GObjectLib::signature("g_object_ref_sink").is_some());
        assert!(GObjectLib::signature("g_object_new_with_properties").unwrap().optional);
        assert!(!GLibLib::signature("g_main_context_iteration").unwrap().optional);
        assert_eq!(GLibLib::NAME, "glib-2.0");
    }
}
