//! Raw GIO, GTK 4 and libadwaita entry points used by the facades.

use std::ffi::{c_char, c_int, c_uint, c_void};

use gobridge_core::native_library;
use gobridge_core::sys::{GError, GLibLib};
use gobridge_core::{GBoolean, from_native_string};

native_library! {
    /// GIO: application lifecycle and actions.
    pub struct GioLib("gio-2.0") {
        fn g_application_register(
            application: *mut c_void,
            cancellable: *mut c_void,
            error: *mut *mut GError,
        ) -> GBoolean;
        fn g_application_activate(application: *mut c_void);
        fn g_application_quit(application: *mut c_void);
        fn g_application_run(application: *mut c_void, argc: c_int, argv: *mut *mut c_char) -> c_int;
        fn g_application_get_is_remote(application: *mut c_void) -> GBoolean;
        fn g_simple_action_new(name: *const c_char, parameter_type: *const c_void) -> *mut c_void;
        fn g_action_map_add_action(action_map: *mut c_void, action: *mut c_void);
        optional {}
    }
}

native_library! {
    /// GTK 4: initialization, the application class and the widgets the
    /// facades cover.
    pub struct GtkLib("gtk-4") {
        fn gtk_init();
        fn gtk_application_new(application_id: *const c_char, flags: c_uint) -> *mut c_void;
        fn gtk_application_window_new(application: *mut c_void) -> *mut c_void;
        fn gtk_application_inhibit(
            application: *mut c_void,
            window: *mut c_void,
            flags: c_uint,
            reason: *const c_char,
        ) -> c_uint;
        fn gtk_application_uninhibit(application: *mut c_void, cookie: c_uint);
        fn gtk_application_set_accels_for_action(
            application: *mut c_void,
            detailed_action_name: *const c_char,
            accels: *const *const c_char,
        );
        fn gtk_window_new() -> *mut c_void;
        fn gtk_window_present(window: *mut c_void);
        fn gtk_window_close(window: *mut c_void);
        fn gtk_window_set_child(window: *mut c_void, child: *mut c_void);
        fn gtk_window_set_default_size(window: *mut c_void, width: c_int, height: c_int);
        fn gtk_box_new(orientation: c_int, spacing: c_int) -> *mut c_void;
        fn gtk_box_append(container: *mut c_void, child: *mut c_void);
        fn gtk_box_remove(container: *mut c_void, child: *mut c_void);
        fn gtk_label_new(text: *const c_char) -> *mut c_void;
        fn gtk_label_set_text(label: *mut c_void, text: *const c_char);
        fn gtk_switch_new() -> *mut c_void;
        fn gtk_builder_new() -> *mut c_void;
        fn gtk_builder_add_from_string(
            builder: *mut c_void,
            buffer: *const c_char,
            length: isize,
            error: *mut *mut GError,
        ) -> GBoolean;
        fn gtk_builder_get_object(builder: *mut c_void, name: *const c_char) -> *mut c_void;
        optional {
            fn gtk_is_initialized() -> GBoolean;
        }
    }
}

native_library! {
    /// libadwaita: initialization and its application subclass.
    pub struct AdwLib("adwaita-1") {
        fn adw_init();
        fn adw_application_new(application_id: *const c_char, flags: c_uint) -> *mut c_void;
        optional {
            fn adw_switch_row_new() -> *mut c_void;
        }
    }
}

/// Reads the message of a `GError` set through an out-parameter and frees
/// it. A null error reads as `fallback`.
///
/// # Safety
///
/// `error` must be null or an error the caller owns.
pub(crate) unsafe fn take_error_message(glib: &GLibLib, error: *mut GError, fallback: &str) -> String {
    if error.is_null() {
        return fallback.to_owned();
    }
    // SAFETY: `error` is a live error owned by the caller.
    let message = unsafe { from_native_string((*error).message) };
    unsafe { (glib.g_error_free)(error) };
    if message.is_empty() {
        fallback.to_owned()
    } else {
        message
    }
}
