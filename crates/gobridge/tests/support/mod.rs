//! In-process fakes of the GIO, GTK and libadwaita entry points the facades
//! use, layered on the core's GLib/GObject mock.
//!
//! Native objects are mock objects of fake GTK types; everything else the
//! fake "does" is recorded in a thread-local [`FakeGtk`] for assertions.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_int, c_uint, c_void};
use std::ptr::NonNull;
use std::rc::Rc;

use gobridge::sys::{AdwLib, GioLib, GtkLib};
use gobridge::Toolkit;
use gobridge_core::mock::{self, TypeSpec};
use gobridge_core::sys::{GError, GObjectLib};
use gobridge_core::{BoxedValue, GBoolean, NativeHandle, StringArray, Value};

/// A recorded `gtk_application_inhibit` call that is still in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Inhibition {
    pub cookie: u32,
    pub window: usize,
    pub flags: u32,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct FakeGtk {
    pub gtk_init_calls: u32,
    pub adw_init_calls: u32,
    /// Constructor used for each application, with its id and flags.
    pub applications: Vec<(&'static str, String, u32)>,
    pub registered: Vec<usize>,
    /// When set, the next registration fails with this message.
    pub fail_register: Option<String>,
    pub activate_calls: u32,
    pub quit_calls: u32,
    pub run_args: Vec<Vec<String>>,
    pub refuse_inhibit: bool,
    pub next_cookie: u32,
    pub inhibitions: Vec<Inhibition>,
    pub accels: HashMap<String, Vec<String>>,
    pub action_names: HashMap<usize, String>,
    /// `(map, action)` pairs added with `g_action_map_add_action`.
    pub actions: Vec<(usize, usize)>,
    pub toplevels: Vec<usize>,
    pub presented: Vec<usize>,
    pub closed: Vec<usize>,
    pub default_sizes: HashMap<usize, (i32, i32)>,
    pub window_children: HashMap<usize, usize>,
    pub box_children: HashMap<usize, Vec<usize>>,
    pub box_orientations: HashMap<usize, (c_int, c_int)>,
    pub builder_objects: HashMap<usize, HashMap<String, usize>>,
}

thread_local! {
    static FAKE: RefCell<FakeGtk> = RefCell::new(FakeGtk::default());
}

/// Runs `f` with this thread's fake. Never call back into the bridge from
/// inside `f`.
pub fn with_fake<R>(f: impl FnOnce(&mut FakeGtk) -> R) -> R {
    FAKE.with(|fake| f(&mut fake.borrow_mut()))
}

/// Resets the core mock and the fake, registers the fake GTK types, and
/// returns a toolkit over them.
pub fn toolkit(with_adwaita: bool) -> Rc<Toolkit> {
    let runtime = mock::runtime();
    with_fake(|fake| *fake = FakeGtk::default());
    install_types();

    let symbols = symbols();
    let gio = GioLib::from_lookup(|name| symbols.get(name).copied()).expect("fake exports every GIO symbol");
    let gtk = GtkLib::from_lookup(|name| symbols.get(name).copied()).expect("fake exports every GTK symbol");
    let adw = with_adwaita
        .then(|| AdwLib::from_lookup(|name| symbols.get(name).copied()).expect("fake exports every adw symbol"));
    Toolkit::from_parts(runtime, gio, gtk, adw)
}

fn install_types() {
    mock::register_type(
        TypeSpec::new("GApplication")
            .property("application-id", "gchararray", Value::None)
            .signal("startup", &[], "void")
            .signal("activate", &[], "void")
            .signal("shutdown", &[], "void"),
    );
    mock::register_type(TypeSpec::new("GtkApplication").parent("GApplication"));
    mock::register_type(TypeSpec::new("AdwApplication").parent("GtkApplication"));
    mock::register_type(TypeSpec::new("GSimpleAction").signal("activate", &[], "void"));
    mock::register_type(
        TypeSpec::new("GtkWidget")
            .parent("GInitiallyUnowned")
            .property("visible", "gboolean", true)
            .property("sensitive", "gboolean", true),
    );
    mock::register_type(
        TypeSpec::new("GtkWindow")
            .parent("GtkWidget")
            .property("title", "gchararray", Value::None)
            .signal("close-request", &[], "gboolean"),
    );
    mock::register_type(TypeSpec::new("GtkApplicationWindow").parent("GtkWindow"));
    mock::register_type(
        TypeSpec::new("GtkSwitch")
            .parent("GtkWidget")
            .property("active", "gboolean", false),
    );
    mock::register_type(
        TypeSpec::new("GtkLabel")
            .parent("GtkWidget")
            .property("label", "gchararray", ""),
    );
    mock::register_type(TypeSpec::new("GtkBox").parent("GtkWidget"));
    mock::register_type(TypeSpec::new("GtkBuilder"));
}

fn gobject() -> GObjectLib {
    mock::gobject_table()
}

fn address(object: *mut c_void) -> usize {
    object as usize
}

fn handle(object: *mut c_void) -> NativeHandle {
    NativeHandle::from_ptr(object)
}

unsafe fn read_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn set_property(object: *mut c_void, name: &str, value: Value) {
    let lib = gobject();
    let boxed = BoxedValue::from_value(&lib, &value).expect("boxable value");
    let name = std::ffi::CString::new(name).expect("property name");
    unsafe { (lib.g_object_set_property)(object, name.as_ptr(), boxed.as_ptr()) };
}

/// Creates a toplevel the way GTK does: sunk, with the reference held by the
/// toplevel list.
fn new_toplevel(type_name: &str) -> *mut c_void {
    let object = mock::new_object(type_name).as_ptr();
    unsafe { (gobject().g_object_ref_sink)(object) };
    with_fake(|fake| fake.toplevels.push(address(object)));
    object
}

fn sink_child(child: *mut c_void) {
    unsafe { (gobject().g_object_ref_sink)(child) };
}

fn drop_child(child: *mut c_void) {
    unsafe { (gobject().g_object_unref)(child) };
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let needle = format!(" {name}=\"");
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')?;
    Some(tag[start..start + end].to_owned())
}

/// Reads `<object class=".." id="..">` declarations out of a UI description.
fn parse_objects(text: &str) -> Result<Vec<(String, String)>, String> {
    if !text.contains("<interface") {
        return Err("document has no <interface> element".to_owned());
    }
    let mut objects = Vec::new();
    for chunk in text.split("<object").skip(1) {
        let tag = chunk.split('>').next().unwrap_or("");
        let class = attribute(tag, "class").ok_or_else(|| "object without a class".to_owned())?;
        let id = attribute(tag, "id").unwrap_or_default();
        objects.push((class, id));
    }
    Ok(objects)
}

mod fake {
    use super::*;

    // GIO

    pub unsafe extern "C" fn g_application_register(
        application: *mut c_void,
        _cancellable: *mut c_void,
        error: *mut *mut GError,
    ) -> GBoolean {
        let outcome = with_fake(|fake| {
            if let Some(message) = fake.fail_register.take() {
                return Err(message);
            }
            if fake.registered.contains(&address(application)) {
                return Ok(false);
            }
            fake.registered.push(address(application));
            Ok(true)
        });
        match outcome {
            Err(message) => {
                if !error.is_null() {
                    unsafe { *error = mock::new_error(1, &message) };
                }
                GBoolean::FALSE
            }
            Ok(first) => {
                if first {
                    mock::emit_signal(handle(application), "startup", &[]);
                }
                GBoolean::TRUE
            }
        }
    }

    pub unsafe extern "C" fn g_application_activate(application: *mut c_void) {
        with_fake(|fake| fake.activate_calls += 1);
        mock::emit_signal(handle(application), "activate", &[]);
    }

    pub unsafe extern "C" fn g_application_quit(_application: *mut c_void) {
        with_fake(|fake| fake.quit_calls += 1);
    }

    pub unsafe extern "C" fn g_application_run(
        application: *mut c_void,
        _argc: c_int,
        argv: *mut *mut c_char,
    ) -> c_int {
        let args = unsafe { StringArray::decode(argv as *const *const c_char) };
        with_fake(|fake| fake.run_args.push(args));
        let mut error = std::ptr::null_mut();
        if !unsafe { g_application_register(application, std::ptr::null_mut(), &mut error) }.is_true() {
            unsafe { (mock::glib_table().g_error_free)(error) };
            return 1;
        }
        unsafe { g_application_activate(application) };
        mock::emit_signal(handle(application), "shutdown", &[]);
        0
    }

    pub unsafe extern "C" fn g_application_get_is_remote(_application: *mut c_void) -> GBoolean {
        GBoolean::FALSE
    }

    pub unsafe extern "C" fn g_simple_action_new(name: *const c_char, _parameter_type: *const c_void) -> *mut c_void {
        let action = mock::new_object("GSimpleAction").as_ptr();
        let name = unsafe { read_string(name) };
        with_fake(|fake| fake.action_names.insert(address(action), name));
        action
    }

    pub unsafe extern "C" fn g_action_map_add_action(action_map: *mut c_void, action: *mut c_void) {
        unsafe { (gobject().g_object_ref)(action) };
        with_fake(|fake| fake.actions.push((address(action_map), address(action))));
    }

    // GTK

    pub unsafe extern "C" fn gtk_init() {
        with_fake(|fake| fake.gtk_init_calls += 1);
    }

    pub unsafe extern "C" fn gtk_is_initialized() -> GBoolean {
        GBoolean::from(with_fake(|fake| fake.gtk_init_calls > 0))
    }

    pub unsafe extern "C" fn gtk_application_new(application_id: *const c_char, flags: c_uint) -> *mut c_void {
        new_application("GtkApplication", "gtk_application_new", application_id, flags)
    }

    pub unsafe extern "C" fn gtk_application_window_new(_application: *mut c_void) -> *mut c_void {
        new_toplevel("GtkApplicationWindow")
    }

    pub unsafe extern "C" fn gtk_application_inhibit(
        _application: *mut c_void,
        window: *mut c_void,
        flags: c_uint,
        reason: *const c_char,
    ) -> c_uint {
        let reason = unsafe { read_string(reason) };
        with_fake(|fake| {
            if fake.refuse_inhibit {
                return 0;
            }
            fake.next_cookie += 1;
            let cookie = fake.next_cookie;
            fake.inhibitions.push(Inhibition {
                cookie,
                window: address(window),
                flags,
                reason,
            });
            cookie
        })
    }

    pub unsafe extern "C" fn gtk_application_uninhibit(_application: *mut c_void, cookie: c_uint) {
        with_fake(|fake| fake.inhibitions.retain(|inhibition| inhibition.cookie != cookie));
    }

    pub unsafe extern "C" fn gtk_application_set_accels_for_action(
        _application: *mut c_void,
        detailed_action_name: *const c_char,
        accels: *const *const c_char,
    ) {
        let name = unsafe { read_string(detailed_action_name) };
        let accels = unsafe { StringArray::decode(accels) };
        with_fake(|fake| fake.accels.insert(name, accels));
    }

    pub unsafe extern "C" fn gtk_window_new() -> *mut c_void {
        new_toplevel("GtkWindow")
    }

    pub unsafe extern "C" fn gtk_window_present(window: *mut c_void) {
        with_fake(|fake| fake.presented.push(address(window)));
    }

    pub unsafe extern "C" fn gtk_window_close(window: *mut c_void) {
        let vetoed = mock::emit_signal(handle(window), "close-request", &[]) == Some(Value::Bool(true));
        if vetoed {
            return;
        }
        let owned = with_fake(|fake| {
            fake.closed.push(address(window));
            let before = fake.toplevels.len();
            fake.toplevels.retain(|toplevel| *toplevel != address(window));
            before != fake.toplevels.len()
        });
        if owned {
            unsafe { (gobject().g_object_unref)(window) };
        }
    }

    pub unsafe extern "C" fn gtk_window_set_child(window: *mut c_void, child: *mut c_void) {
        if !child.is_null() {
            sink_child(child);
        }
        let previous = with_fake(|fake| {
            if child.is_null() {
                fake.window_children.remove(&address(window))
            } else {
                fake.window_children.insert(address(window), address(child))
            }
        });
        if let Some(previous) = previous {
            drop_child(previous as *mut c_void);
        }
    }

    pub unsafe extern "C" fn gtk_window_set_default_size(window: *mut c_void, width: c_int, height: c_int) {
        with_fake(|fake| fake.default_sizes.insert(address(window), (width, height)));
    }

    pub unsafe extern "C" fn gtk_box_new(orientation: c_int, spacing: c_int) -> *mut c_void {
        let container = mock::new_object("GtkBox").as_ptr();
        with_fake(|fake| fake.box_orientations.insert(address(container), (orientation, spacing)));
        container
    }

    pub unsafe extern "C" fn gtk_box_append(container: *mut c_void, child: *mut c_void) {
        sink_child(child);
        with_fake(|fake| {
            fake.box_children
                .entry(address(container))
                .or_default()
                .push(address(child))
        });
    }

    pub unsafe extern "C" fn gtk_box_remove(container: *mut c_void, child: *mut c_void) {
        let removed = with_fake(|fake| {
            let children = fake.box_children.entry(address(container)).or_default();
            let before = children.len();
            children.retain(|c| *c != address(child));
            before != children.len()
        });
        if removed {
            drop_child(child);
        }
    }

    pub unsafe extern "C" fn gtk_label_new(text: *const c_char) -> *mut c_void {
        let label = mock::new_object("GtkLabel").as_ptr();
        let text = unsafe { read_string(text) };
        set_property(label, "label", Value::String(text));
        label
    }

    pub unsafe extern "C" fn gtk_label_set_text(label: *mut c_void, text: *const c_char) {
        let text = unsafe { read_string(text) };
        set_property(label, "label", Value::String(text));
    }

    pub unsafe extern "C" fn gtk_switch_new() -> *mut c_void {
        mock::new_object("GtkSwitch").as_ptr()
    }

    pub unsafe extern "C" fn gtk_builder_new() -> *mut c_void {
        mock::new_object("GtkBuilder").as_ptr()
    }

    pub unsafe extern "C" fn gtk_builder_add_from_string(
        builder: *mut c_void,
        buffer: *const c_char,
        length: isize,
        error: *mut *mut GError,
    ) -> GBoolean {
        let text = if length < 0 {
            unsafe { read_string(buffer) }
        } else {
            let bytes = unsafe { std::slice::from_raw_parts(buffer as *const u8, length as usize) };
            String::from_utf8_lossy(bytes).into_owned()
        };
        let fail = |message: String| {
            if !error.is_null() {
                unsafe { *error = mock::new_error(2, &message) };
            }
            GBoolean::FALSE
        };
        let declared = match parse_objects(&text) {
            Ok(declared) => declared,
            Err(message) => return fail(message),
        };
        let mut created = HashMap::new();
        for (class, id) in declared {
            let object = mock::new_object(&class).as_ptr();
            if object.is_null() {
                mock::take_criticals();
                return fail(format!("invalid object type '{class}'"));
            }
            sink_child(object);
            if !id.is_empty() {
                created.insert(id, address(object));
            }
        }
        with_fake(|fake| fake.builder_objects.entry(address(builder)).or_default().extend(created));
        GBoolean::TRUE
    }

    pub unsafe extern "C" fn gtk_builder_get_object(builder: *mut c_void, name: *const c_char) -> *mut c_void {
        let name = unsafe { read_string(name) };
        with_fake(|fake| {
            fake.builder_objects
                .get(&address(builder))
                .and_then(|objects| objects.get(&name))
                .map_or(std::ptr::null_mut(), |object| *object as *mut c_void)
        })
    }

    // libadwaita

    pub unsafe extern "C" fn adw_init() {
        with_fake(|fake| fake.adw_init_calls += 1);
    }

    pub unsafe extern "C" fn adw_application_new(application_id: *const c_char, flags: c_uint) -> *mut c_void {
        new_application("AdwApplication", "adw_application_new", application_id, flags)
    }

    fn new_application(
        type_name: &str,
        constructor: &'static str,
        application_id: *const c_char,
        flags: c_uint,
    ) -> *mut c_void {
        let application = mock::new_object(type_name).as_ptr();
        let id = unsafe { read_string(application_id) };
        set_property(application, "application-id", Value::String(id.clone()));
        with_fake(|fake| fake.applications.push((constructor, id, flags)));
        application
    }
}

macro_rules! symbol_map {
    ($($name:ident),* $(,)?) => {{
        let mut map: HashMap<&'static str, NonNull<c_void>> = HashMap::new();
        $(
            if let Some(address) = NonNull::new(fake::$name as *mut c_void) {
                map.insert(stringify!($name), address);
            }
        )*
        map
    }};
}

fn symbols() -> HashMap<&'static str, NonNull<c_void>> {
    symbol_map! {
        g_application_register,
        g_application_activate,
        g_application_quit,
        g_application_run,
        g_application_get_is_remote,
        g_simple_action_new,
        g_action_map_add_action,
        gtk_init,
        gtk_is_initialized,
        gtk_application_new,
        gtk_application_window_new,
        gtk_application_inhibit,
        gtk_application_uninhibit,
        gtk_application_set_accels_for_action,
        gtk_window_new,
        gtk_window_present,
        gtk_window_close,
        gtk_window_set_child,
        gtk_window_set_default_size,
        gtk_box_new,
        gtk_box_append,
        gtk_box_remove,
        gtk_label_new,
        gtk_label_set_text,
        gtk_switch_new,
        gtk_builder_new,
        gtk_builder_add_from_string,
        gtk_builder_get_object,
        adw_init,
        adw_application_new,
    }
}
