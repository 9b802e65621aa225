//! An in-process fake of the GLib and GObject entry points.
//!
//! The fake exports the same symbol names and signatures as the real
//! libraries, so [`GLibLib`] and [`GObjectLib`] tables are assembled from it
//! with `from_lookup` and every code path above the tables runs unchanged.
//! State is thread-local: each test thread sees its own type registry,
//! objects, handlers and main-context queue.
//!
//! What is modeled:
//!
//! - a type registry with single inheritance, typed properties with defaults,
//!   and signals (including the detailed `notify` signal on `GObject`);
//! - objects with observable reference counts and floating references;
//! - `GValue` buffers with owned strings and object references, and a count
//!   of strings currently owned by buffers;
//! - closures with reference counts and finalize notifiers;
//! - a main-context queue of posted events, timeout and idle sources over a
//!   virtual clock.
//!
//! Misuse (type mismatches, unknown properties or signals, operations on
//! finalized objects) is recorded as a "critical", like GLib's
//! `g_critical`, and otherwise ignored.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::{CStr, CString, c_char, c_int, c_uint, c_ulong, c_void};
use std::mem;
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::time::Duration;

use crate::runtime::Runtime;
use crate::symbols::GBoolean;
use crate::sys::{
    GClosure, GClosureMarshal, GClosureNotify, GDestroyNotify, GError, GLibLib, GObjectLib, GQuark, GSignalQuery,
    GSourceFunc, GType, GValue, NativeHandle, gtype,
};
use crate::value::Value;

const FIRST_CLASSED_TYPE: GType = 0x1000;

/// Description of a fake object type.
#[derive(Debug, Clone)]
pub struct TypeSpec {
    name: String,
    parent: String,
    properties: Vec<(String, String, Value)>,
    signals: Vec<(String, Vec<String>, String)>,
}

impl TypeSpec {
    /// A type deriving from `GObject`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            parent: "GObject".to_owned(),
            properties: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Sets the parent type. `GInitiallyUnowned` descendants are created
    /// with a floating reference.
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = parent.to_owned();
        self
    }

    /// Adds a property of the named value type (`gboolean`, `gint`, `guint`,
    /// `gdouble`, `gchararray`, or any registered object type).
    pub fn property(mut self, name: &str, type_name: &str, default: impl Into<Value>) -> Self {
        self.properties
            .push((name.to_owned(), type_name.to_owned(), default.into()));
        self
    }

    /// Adds a signal. Use `"void"` as the return type for signals without one.
    pub fn signal(mut self, name: &str, params: &[&str], return_type: &str) -> Self {
        self.signals.push((
            name.to_owned(),
            params.iter().map(|p| (*p).to_owned()).collect(),
            return_type.to_owned(),
        ));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stored {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Double(f64),
    Str(Option<String>),
    Object(usize),
}

struct PropertyRecord {
    name: String,
    value_type: GType,
    default: Stored,
    pspec: usize,
}

struct TypeRecord {
    name: CString,
    g_type: GType,
    parent: GType,
    initially_unowned: bool,
    properties: Vec<PropertyRecord>,
}

struct SignalRecord {
    id: c_uint,
    name: CString,
    itype: GType,
    detailed: bool,
    params: Vec<GType>,
    return_type: GType,
}

struct ObjectRecord {
    g_type: GType,
    ref_count: u32,
    floating: bool,
    properties: HashMap<String, Stored>,
}

struct ClosureRecord {
    ref_count: u32,
    floating: bool,
    marshal: GClosureMarshal,
    marshal_data: *mut c_void,
    notifiers: Vec<(*mut c_void, GClosureNotify)>,
}

struct HandlerRecord {
    id: c_ulong,
    instance: usize,
    signal_id: c_uint,
    detail: GQuark,
    closure: usize,
}

struct SourceRecord {
    id: c_uint,
    interval_ms: Option<u64>,
    due_ms: u64,
    func: GSourceFunc,
    data: *mut c_void,
    notify: GDestroyNotify,
    dispatching: bool,
    removed: bool,
}

struct MockState {
    types: Vec<TypeRecord>,
    signals: Vec<SignalRecord>,
    quarks: Vec<String>,
    objects: HashMap<usize, ObjectRecord>,
    closures: HashMap<usize, ClosureRecord>,
    handlers: Vec<HandlerRecord>,
    next_handler: c_ulong,
    events: VecDeque<Box<dyn FnOnce()>>,
    sources: Vec<SourceRecord>,
    next_source: c_uint,
    clock_ms: u64,
    criticals: Vec<String>,
    live_strings: i64,
    pending_calls: u64,
}

impl MockState {
    fn new() -> Self {
        let mut state = Self {
            types: Vec::new(),
            signals: Vec::new(),
            quarks: Vec::new(),
            objects: HashMap::new(),
            closures: HashMap::new(),
            handlers: Vec::new(),
            next_handler: 1,
            events: VecDeque::new(),
            sources: Vec::new(),
            next_source: 1,
            clock_ms: 0,
            criticals: Vec::new(),
            live_strings: 0,
            pending_calls: 0,
        };
        for (name, g_type) in [
            ("void", gtype::NONE),
            ("gboolean", gtype::BOOLEAN),
            ("gint", gtype::INT),
            ("guint", gtype::UINT),
            ("gdouble", gtype::DOUBLE),
            ("gchararray", gtype::STRING),
            ("gpointer", gtype::POINTER),
            ("GParam", gtype::PARAM),
            ("GObject", gtype::OBJECT),
        ] {
            state.add_type(name, g_type, gtype::INVALID, false);
        }
        let initially_unowned = state.next_classed_type();
        state.add_type("GInitiallyUnowned", initially_unowned, gtype::OBJECT, true);
        state.signals.push(SignalRecord {
            id: 1,
            name: cstring("notify"),
            itype: gtype::OBJECT,
            detailed: true,
            params: vec![gtype::PARAM],
            return_type: gtype::NONE,
        });
        state
    }

    fn add_type(&mut self, name: &str, g_type: GType, parent: GType, initially_unowned: bool) {
        self.types.push(TypeRecord {
            name: cstring(name),
            g_type,
            parent,
            initially_unowned,
            properties: Vec::new(),
        });
    }

    fn next_classed_type(&self) -> GType {
        let classed = self.types.iter().filter(|t| t.g_type >= FIRST_CLASSED_TYPE).count();
        FIRST_CLASSED_TYPE + classed * 8
    }

    fn critical(&mut self, message: String) {
        tracing::debug!(target: "gobridge_core::mock", %message, "critical");
        self.criticals.push(message);
    }

    fn type_record(&self, g_type: GType) -> Option<&TypeRecord> {
        self.types.iter().find(|t| t.g_type == g_type)
    }

    fn type_by_name(&self, name: &str) -> Option<GType> {
        self.types
            .iter()
            .find(|t| t.name.as_bytes() == name.as_bytes())
            .map(|t| t.g_type)
    }

    fn type_name(&self, g_type: GType) -> String {
        self.type_record(g_type)
            .map(|t| t.name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("<type {g_type:#x}>"))
    }

    fn fundamental(g_type: GType) -> GType {
        if g_type >= FIRST_CLASSED_TYPE {
            gtype::OBJECT
        } else {
            g_type
        }
    }

    fn is_a(&self, mut g_type: GType, ancestor: GType) -> bool {
        loop {
            if g_type == ancestor {
                return true;
            }
            match self.type_record(g_type) {
                Some(record) if record.parent != gtype::INVALID => g_type = record.parent,
                _ => return false,
            }
        }
    }

    fn is_initially_unowned(&self, mut g_type: GType) -> bool {
        while let Some(record) = self.type_record(g_type) {
            if record.initially_unowned {
                return true;
            }
            g_type = record.parent;
        }
        false
    }

    fn find_property(&self, mut g_type: GType, name: &str) -> Option<&PropertyRecord> {
        while let Some(record) = self.type_record(g_type) {
            if let Some(property) = record.properties.iter().find(|p| p.name == name) {
                return Some(property);
            }
            g_type = record.parent;
        }
        None
    }

    fn find_signal(&self, g_type: GType, name: &str) -> Option<&SignalRecord> {
        self.signals
            .iter()
            .find(|signal| signal.name.as_bytes() == name.as_bytes() && self.is_a(g_type, signal.itype))
    }

    fn quark(&mut self, name: &str) -> GQuark {
        if let Some(index) = self.quarks.iter().position(|q| q == name) {
            return index as GQuark + 1;
        }
        self.quarks.push(name.to_owned());
        self.quarks.len() as GQuark
    }

    /// Parses `name` or `name::detail` against `g_type`.
    fn parse_signal(&mut self, g_type: GType, detailed: &str) -> Option<(c_uint, GQuark)> {
        let (name, detail) = match detailed.split_once("::") {
            Some((name, detail)) => (name, Some(detail)),
            None => (detailed, None),
        };
        let signal = self.find_signal(g_type, name)?;
        let id = signal.id;
        match detail {
            Some(_) if !signal.detailed => None,
            Some(detail) => Some((id, self.quark(detail))),
            None => Some((id, 0)),
        }
    }

    fn live_object(&self, object: usize) -> Option<&ObjectRecord> {
        self.objects.get(&object).filter(|record| record.ref_count > 0)
    }

    fn create_object(&mut self, g_type: GType) -> Option<usize> {
        if g_type < FIRST_CLASSED_TYPE || self.type_record(g_type).is_none() {
            let name = self.type_name(g_type);
            self.critical(format!("cannot instantiate non-object type '{name}'"));
            return None;
        }
        let mut properties = HashMap::new();
        let mut cursor = g_type;
        while let Some(record) = self.type_record(cursor) {
            for property in &record.properties {
                properties
                    .entry(property.name.clone())
                    .or_insert_with(|| property.default.clone());
            }
            cursor = record.parent;
        }
        let address = Box::into_raw(Box::new([0u64; 4])) as usize;
        let floating = self.is_initially_unowned(g_type);
        self.objects.insert(
            address,
            ObjectRecord {
                g_type,
                ref_count: 1,
                floating,
                properties,
            },
        );
        Some(address)
    }

    fn ref_object(&mut self, object: usize) -> bool {
        match self.objects.get_mut(&object) {
            Some(record) if record.ref_count > 0 => {
                record.ref_count += 1;
                true
            }
            _ => {
                self.critical(format!("g_object_ref: invalid object {object:#x}"));
                false
            }
        }
    }

    /// Drops one reference; on the last one, detaches everything the object
    /// holds and returns it for release outside the state borrow.
    fn unref_object(&mut self, object: usize) -> Option<Finalization> {
        let record = match self.objects.get_mut(&object) {
            Some(record) if record.ref_count > 0 => record,
            _ => {
                self.critical(format!("g_object_unref: invalid object {object:#x}"));
                return None;
            }
        };
        record.ref_count -= 1;
        if record.ref_count > 0 {
            return None;
        }
        let objects = record
            .properties
            .values()
            .filter_map(|stored| match stored {
                Stored::Object(child) if *child != 0 => Some(*child),
                _ => None,
            })
            .collect();
        record.properties.clear();
        let mut closures = Vec::new();
        self.handlers.retain(|handler| {
            if handler.instance == object {
                closures.push(handler.closure);
                false
            } else {
                true
            }
        });
        Some(Finalization { closures, objects })
    }

    /// Converts an initialized buffer into stored form, taking references.
    fn read_buffer(&mut self, raw: &GValue, value_type: GType) -> Stored {
        let bits = raw.data[0];
        match Self::fundamental(value_type) {
            gtype::BOOLEAN => Stored::Bool(bits != 0),
            gtype::INT => Stored::Int(bits as u32 as i32),
            gtype::UINT => Stored::UInt(bits as u32),
            gtype::DOUBLE => Stored::Double(f64::from_bits(bits)),
            gtype::STRING => {
                let ptr = bits as usize as *const c_char;
                if ptr.is_null() {
                    Stored::Str(None)
                } else {
                    // SAFETY: string buffers hold NUL-terminated strings.
                    Stored::Str(Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()))
                }
            }
            _ => {
                let object = bits as usize;
                if object != 0 {
                    self.ref_object(object);
                }
                Stored::Object(object)
            }
        }
    }

    /// Writes stored form into an initialized buffer, duplicating strings and
    /// taking references. Returns the buffer's previous object, to release.
    fn write_buffer(&mut self, raw: &mut GValue, stored: &Stored) -> Option<usize> {
        let previous = self.clear_buffer(raw);
        raw.data[0] = match stored {
            Stored::Bool(v) => *v as u64,
            Stored::Int(v) => *v as u32 as u64,
            Stored::UInt(v) => *v as u64,
            Stored::Double(v) => v.to_bits(),
            Stored::Str(None) => 0,
            Stored::Str(Some(s)) => self.dup_string(s.as_bytes()) as usize as u64,
            Stored::Object(object) => {
                if *object != 0 {
                    self.ref_object(*object);
                }
                *object as u64
            }
        };
        previous
    }

    fn dup_string(&mut self, bytes: &[u8]) -> *mut c_char {
        let owned = CString::new(bytes.iter().copied().take_while(|b| *b != 0).collect::<Vec<_>>())
            .unwrap_or_default();
        self.live_strings += 1;
        owned.into_raw()
    }

    /// Releases the contents of a buffer, returning an object to unref.
    fn clear_buffer(&mut self, raw: &mut GValue) -> Option<usize> {
        let bits = mem::take(&mut raw.data[0]);
        match Self::fundamental(raw.g_type) {
            gtype::STRING if bits != 0 => {
                // SAFETY: string buffers own a string from `dup_string`.
                drop(unsafe { CString::from_raw(bits as usize as *mut c_char) });
                self.live_strings -= 1;
                None
            }
            gtype::OBJECT if bits != 0 => Some(bits as usize),
            _ => None,
        }
    }

    fn check_buffer(&mut self, raw: &GValue, fundamental: GType, caller: &str) -> bool {
        if Self::fundamental(raw.g_type) == fundamental {
            return true;
        }
        let found = self.type_name(raw.g_type);
        self.critical(format!("{caller}: value of type '{found}' has the wrong fundamental type"));
        false
    }
}

struct Finalization {
    closures: Vec<usize>,
    objects: Vec<usize>,
}

impl Finalization {
    fn run(self) {
        for closure in self.closures {
            closure_unref(closure);
        }
        for object in self.objects {
            unref_object(object);
        }
    }
}

thread_local! {
    static STATE: RefCell<MockState> = RefCell::new(MockState::new());
}

fn with_state<R>(f: impl FnOnce(&mut MockState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

fn cstring(name: &str) -> CString {
    CString::new(name).unwrap_or_default()
}

/// SAFETY: `ptr` is null or NUL-terminated.
unsafe fn read_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

fn unref_object(object: usize) {
    if let Some(finalization) = with_state(|s| s.unref_object(object)) {
        finalization.run();
    }
}

fn release(object: Option<usize>) {
    if let Some(object) = object {
        unref_object(object);
    }
}

fn closure_unref(closure: usize) {
    let notifiers = with_state(|s| {
        let Some(record) = s.closures.get_mut(&closure) else {
            s.critical(format!("g_closure_unref: invalid closure {closure:#x}"));
            return Vec::new();
        };
        record.ref_count = record.ref_count.saturating_sub(1);
        if record.ref_count > 0 {
            return Vec::new();
        }
        let notifiers = mem::take(&mut record.notifiers);
        s.closures.remove(&closure);
        notifiers
    });
    for (data, notify) in notifiers {
        if let Some(notify) = notify {
            // SAFETY: notifiers were registered for this closure.
            unsafe { notify(data, closure as *mut GClosure) };
        }
    }
}

/// Invokes every handler of `signal_id` on `instance` matching `detail`.
fn invoke_handlers(
    instance: usize,
    signal_id: c_uint,
    detail: GQuark,
    params: *const GValue,
    n_values: c_uint,
    return_value: *mut GValue,
) {
    let handler_ids: Vec<c_ulong> = with_state(|s| {
        s.handlers
            .iter()
            .filter(|h| h.instance == instance && h.signal_id == signal_id && (h.detail == 0 || h.detail == detail))
            .map(|h| h.id)
            .collect()
    });
    for id in handler_ids {
        // Handlers disconnected by an earlier handler are skipped.
        let target = with_state(|s| {
            let closure = s.handlers.iter().find(|h| h.id == id)?.closure;
            let record = s.closures.get_mut(&closure)?;
            record.ref_count += 1;
            Some((closure, record.marshal, record.marshal_data))
        });
        let Some((closure, marshal, marshal_data)) = target else {
            continue;
        };
        if let Some(marshal) = marshal {
            // SAFETY: the closure is referenced for the duration of the call.
            unsafe {
                marshal(
                    closure as *mut GClosure,
                    return_value,
                    n_values,
                    params,
                    ptr::null_mut(),
                    marshal_data,
                )
            };
        }
        closure_unref(closure);
    }
}

fn emit_notify(object: usize, property: &str) {
    let prepared = with_state(|s| {
        let g_type = s.live_object(object)?.g_type;
        let pspec = s.find_property(g_type, property)?.pspec;
        let detail = s.quark(property);
        Some((g_type, pspec, detail))
    });
    let Some((g_type, pspec, detail)) = prepared else {
        return;
    };
    let params = [
        GValue {
            g_type,
            data: [object as u64, 0],
        },
        GValue {
            g_type: gtype::PARAM,
            data: [pspec as u64, 0],
        },
    ];
    invoke_handlers(object, 1, detail, params.as_ptr(), 2, ptr::null_mut());
}

mod fake {
    use super::*;

    // GLib

    static DEFAULT_CONTEXT: u8 = 0;

    pub unsafe extern "C" fn g_main_context_default() -> *mut c_void {
        ptr::addr_of!(DEFAULT_CONTEXT) as *mut c_void
    }

    pub unsafe extern "C" fn g_main_context_pending(_context: *mut c_void) -> GBoolean {
        with_state(|s| {
            s.pending_calls += 1;
            let ready = !s.events.is_empty()
                || s.sources
                    .iter()
                    .any(|source| !source.removed && !source.dispatching && source.due_ms <= s.clock_ms);
            GBoolean::from(ready)
        })
    }

    pub unsafe extern "C" fn g_main_context_iteration(_context: *mut c_void, _may_block: GBoolean) -> GBoolean {
        if let Some(event) = with_state(|s| s.events.pop_front()) {
            event();
            return GBoolean::TRUE;
        }
        let ready = with_state(|s| {
            let clock = s.clock_ms;
            let source = s
                .sources
                .iter_mut()
                .filter(|source| !source.removed && !source.dispatching && source.due_ms <= clock)
                .min_by_key(|source| source.due_ms)?;
            source.dispatching = true;
            Some((source.id, source.func, source.data))
        });
        let Some((id, func, data)) = ready else {
            return GBoolean::FALSE;
        };
        // SAFETY: `func` and `data` were registered together.
        let keep = func.map(|func| unsafe { func(data) }.is_true()).unwrap_or(false);
        let destroy = with_state(|s| {
            let index = s.sources.iter().position(|source| source.id == id)?;
            let clock = s.clock_ms;
            let source = &mut s.sources[index];
            source.dispatching = false;
            if keep && !source.removed {
                source.due_ms = clock + source.interval_ms.unwrap_or(0);
                return None;
            }
            let source = s.sources.remove(index);
            Some((source.notify, source.data))
        });
        if let Some((Some(notify), data)) = destroy {
            // SAFETY: the destroy notify owns `data`.
            unsafe { notify(data) };
        }
        GBoolean::TRUE
    }

    fn add_source(interval_ms: Option<u64>, func: GSourceFunc, data: *mut c_void, notify: GDestroyNotify) -> c_uint {
        with_state(|s| {
            let id = s.next_source;
            s.next_source += 1;
            let due_ms = s.clock_ms + interval_ms.unwrap_or(0);
            s.sources.push(SourceRecord {
                id,
                interval_ms,
                due_ms,
                func,
                data,
                notify,
                dispatching: false,
                removed: false,
            });
            id
        })
    }

    pub unsafe extern "C" fn g_timeout_add_full(
        _priority: c_int,
        interval: c_uint,
        function: GSourceFunc,
        data: *mut c_void,
        notify: GDestroyNotify,
    ) -> c_uint {
        add_source(Some(u64::from(interval)), function, data, notify)
    }

    pub unsafe extern "C" fn g_idle_add_full(
        _priority: c_int,
        function: GSourceFunc,
        data: *mut c_void,
        notify: GDestroyNotify,
    ) -> c_uint {
        add_source(None, function, data, notify)
    }

    pub unsafe extern "C" fn g_source_remove(tag: c_uint) -> GBoolean {
        let destroy = with_state(|s| {
            let Some(index) = s.sources.iter().position(|source| source.id == tag && !source.removed) else {
                s.critical(format!("g_source_remove: no source with id {tag}"));
                return Err(());
            };
            if s.sources[index].dispatching {
                s.sources[index].removed = true;
                return Ok(None);
            }
            let source = s.sources.remove(index);
            Ok(Some((source.notify, source.data)))
        });
        match destroy {
            Err(()) => GBoolean::FALSE,
            Ok(destroy) => {
                if let Some((Some(notify), data)) = destroy {
                    // SAFETY: the destroy notify owns `data`.
                    unsafe { notify(data) };
                }
                GBoolean::TRUE
            }
        }
    }

    pub unsafe extern "C" fn g_free(_mem: *mut c_void) {}

    pub unsafe extern "C" fn g_error_free(error: *mut GError) {
        if error.is_null() {
            return;
        }
        // SAFETY: errors handed out by the fake come from `new_error`.
        let error = unsafe { Box::from_raw(error) };
        if !error.message.is_null() {
            drop(unsafe { CString::from_raw(error.message) });
        }
    }

    pub unsafe extern "C" fn g_main_context_wakeup(_context: *mut c_void) {}

    // GObject: reference counting

    pub unsafe extern "C" fn g_object_ref(object: *mut c_void) -> *mut c_void {
        with_state(|s| s.ref_object(object as usize));
        object
    }

    pub unsafe extern "C" fn g_object_unref(object: *mut c_void) {
        unref_object(object as usize);
    }

    pub unsafe extern "C" fn g_object_ref_sink(object: *mut c_void) -> *mut c_void {
        with_state(|s| {
            let sunk = match s.objects.get_mut(&(object as usize)) {
                Some(record) if record.ref_count > 0 && record.floating => {
                    record.floating = false;
                    true
                }
                _ => false,
            };
            if !sunk {
                s.ref_object(object as usize);
            }
        });
        object
    }

    pub unsafe extern "C" fn g_object_is_floating(object: *mut c_void) -> GBoolean {
        with_state(|s| GBoolean::from(s.live_object(object as usize).is_some_and(|record| record.floating)))
    }

    // GObject: properties

    pub unsafe extern "C" fn g_object_set_property(object: *mut c_void, name: *const c_char, value: *const GValue) {
        let name = unsafe { read_str(name) };
        // SAFETY: the caller passes an initialized buffer.
        let raw = unsafe { &*value };
        let released = with_state(|s| {
            let object = object as usize;
            let Some(g_type) = s.live_object(object).map(|record| record.g_type) else {
                s.critical(format!("g_object_set_property: invalid object {object:#x}"));
                return None;
            };
            let Some(value_type) = s.find_property(g_type, &name).map(|p| p.value_type) else {
                let type_name = s.type_name(g_type);
                s.critical(format!("object class '{type_name}' has no property named '{name}'"));
                return None;
            };
            if !s.is_a(raw.g_type, value_type) {
                let (from, to) = (s.type_name(raw.g_type), s.type_name(value_type));
                s.critical(format!("unable to set property '{name}' of type '{to}' from value of type '{from}'"));
                return None;
            }
            let stored = s.read_buffer(raw, value_type);
            let previous = s
                .objects
                .get_mut(&object)
                .and_then(|record| record.properties.insert(name.clone(), stored));
            Some(match previous {
                Some(Stored::Object(previous)) if previous != 0 => Some(previous),
                _ => None,
            })
        });
        if let Some(previous) = released {
            release(previous);
            emit_notify(object as usize, &name);
        }
    }

    pub unsafe extern "C" fn g_object_get_property(object: *mut c_void, name: *const c_char, value: *mut GValue) {
        let name = unsafe { read_str(name) };
        // SAFETY: the caller passes an initialized buffer.
        let raw = unsafe { &mut *value };
        let released = with_state(|s| {
            let object = object as usize;
            let Some(record) = s.live_object(object) else {
                s.critical(format!("g_object_get_property: invalid object {object:#x}"));
                return None;
            };
            let g_type = record.g_type;
            let stored = record.properties.get(&name).cloned();
            let value_type = s.find_property(g_type, &name).map(|p| p.value_type);
            let (Some(stored), Some(value_type)) = (stored, value_type) else {
                let type_name = s.type_name(g_type);
                s.critical(format!("object class '{type_name}' has no property named '{name}'"));
                return None;
            };
            if raw.g_type == gtype::INVALID || !s.is_a(value_type, raw.g_type) {
                let (from, to) = (s.type_name(value_type), s.type_name(raw.g_type));
                s.critical(format!("unable to retrieve property '{name}' of type '{from}' as value of type '{to}'"));
                return None;
            }
            s.write_buffer(raw, &stored)
        });
        release(released);
    }

    pub unsafe extern "C" fn g_object_notify(object: *mut c_void, name: *const c_char) {
        let name = unsafe { read_str(name) };
        let known = with_state(|s| {
            let Some(g_type) = s.live_object(object as usize).map(|record| record.g_type) else {
                s.critical(format!("g_object_notify: invalid object {:#x}", object as usize));
                return false;
            };
            if s.find_property(g_type, &name).is_none() {
                let type_name = s.type_name(g_type);
                s.critical(format!("object class '{type_name}' has no property named '{name}'"));
                return false;
            }
            true
        });
        if known {
            emit_notify(object as usize, &name);
        }
    }

    pub unsafe extern "C" fn g_object_new_with_properties(
        object_type: GType,
        n_properties: c_uint,
        names: *const *const c_char,
        values: *const GValue,
    ) -> *mut c_void {
        let Some(object) = with_state(|s| s.create_object(object_type)) else {
            return ptr::null_mut();
        };
        for index in 0..n_properties as usize {
            // SAFETY: the caller passes `n_properties` names and values.
            unsafe { g_object_set_property(object as *mut c_void, *names.add(index), values.add(index)) };
        }
        object as *mut c_void
    }

    // GObject: GValue

    pub unsafe extern "C" fn g_value_init(value: *mut GValue, g_type: GType) -> *mut GValue {
        // SAFETY: the caller passes a writable buffer.
        let raw = unsafe { &mut *value };
        with_state(|s| {
            if raw.g_type != gtype::INVALID {
                let name = s.type_name(raw.g_type);
                s.critical(format!("g_value_init: value already initialized as '{name}'"));
            } else if s.type_record(g_type).is_none() || g_type == gtype::NONE {
                s.critical(format!("g_value_init: cannot initialize value of type {g_type:#x}"));
            } else {
                raw.g_type = g_type;
                raw.data = [0; 2];
            }
        });
        value
    }

    pub unsafe extern "C" fn g_value_unset(value: *mut GValue) {
        // SAFETY: the caller passes an initialized buffer.
        let raw = unsafe { &mut *value };
        let released = with_state(|s| s.clear_buffer(raw));
        raw.g_type = gtype::INVALID;
        raw.data = [0; 2];
        release(released);
    }

    pub unsafe extern "C" fn g_value_set_string(value: *mut GValue, v_string: *const c_char) {
        let raw = unsafe { &mut *value };
        with_state(|s| {
            if !s.check_buffer(raw, gtype::STRING, "g_value_set_string") {
                return;
            }
            s.clear_buffer(raw);
            if !v_string.is_null() {
                // SAFETY: NUL-terminated input.
                let bytes = unsafe { CStr::from_ptr(v_string) }.to_bytes();
                raw.data[0] = s.dup_string(bytes) as usize as u64;
            }
        });
    }

    pub unsafe extern "C" fn g_value_get_string(value: *const GValue) -> *const c_char {
        let raw = unsafe { &*value };
        if !with_state(|s| s.check_buffer(raw, gtype::STRING, "g_value_get_string")) {
            return ptr::null();
        }
        raw.data[0] as usize as *const c_char
    }

    pub unsafe extern "C" fn g_value_set_boolean(value: *mut GValue, v_boolean: GBoolean) {
        let raw = unsafe { &mut *value };
        if with_state(|s| s.check_buffer(raw, gtype::BOOLEAN, "g_value_set_boolean")) {
            raw.data[0] = u64::from(v_boolean.is_true());
        }
    }

    pub unsafe extern "C" fn g_value_get_boolean(value: *const GValue) -> GBoolean {
        let raw = unsafe { &*value };
        if !with_state(|s| s.check_buffer(raw, gtype::BOOLEAN, "g_value_get_boolean")) {
            return GBoolean::FALSE;
        }
        GBoolean::from(raw.data[0] != 0)
    }

    pub unsafe extern "C" fn g_value_set_int(value: *mut GValue, v_int: c_int) {
        let raw = unsafe { &mut *value };
        if with_state(|s| s.check_buffer(raw, gtype::INT, "g_value_set_int")) {
            raw.data[0] = v_int as u32 as u64;
        }
    }

    pub unsafe extern "C" fn g_value_get_int(value: *const GValue) -> c_int {
        let raw = unsafe { &*value };
        if !with_state(|s| s.check_buffer(raw, gtype::INT, "g_value_get_int")) {
            return 0;
        }
        raw.data[0] as u32 as c_int
    }

    pub unsafe extern "C" fn g_value_set_uint(value: *mut GValue, v_uint: c_uint) {
        let raw = unsafe { &mut *value };
        if with_state(|s| s.check_buffer(raw, gtype::UINT, "g_value_set_uint")) {
            raw.data[0] = u64::from(v_uint);
        }
    }

    pub unsafe extern "C" fn g_value_get_uint(value: *const GValue) -> c_uint {
        let raw = unsafe { &*value };
        if !with_state(|s| s.check_buffer(raw, gtype::UINT, "g_value_get_uint")) {
            return 0;
        }
        raw.data[0] as c_uint
    }

    pub unsafe extern "C" fn g_value_set_double(value: *mut GValue, v_double: f64) {
        let raw = unsafe { &mut *value };
        if with_state(|s| s.check_buffer(raw, gtype::DOUBLE, "g_value_set_double")) {
            raw.data[0] = v_double.to_bits();
        }
    }

    pub unsafe extern "C" fn g_value_get_double(value: *const GValue) -> f64 {
        let raw = unsafe { &*value };
        if !with_state(|s| s.check_buffer(raw, gtype::DOUBLE, "g_value_get_double")) {
            return 0.0;
        }
        f64::from_bits(raw.data[0])
    }

    pub unsafe extern "C" fn g_value_set_object(value: *mut GValue, v_object: *mut c_void) {
        let raw = unsafe { &mut *value };
        let released = with_state(|s| {
            if !s.check_buffer(raw, gtype::OBJECT, "g_value_set_object") {
                return None;
            }
            let object = v_object as usize;
            if object != 0 {
                let Some(g_type) = s.live_object(object).map(|record| record.g_type) else {
                    s.critical(format!("g_value_set_object: invalid object {object:#x}"));
                    return None;
                };
                if !s.is_a(g_type, raw.g_type) {
                    let (from, to) = (s.type_name(g_type), s.type_name(raw.g_type));
                    s.critical(format!("g_value_set_object: object of type '{from}' is not a '{to}'"));
                    return None;
                }
            }
            s.write_buffer(raw, &Stored::Object(object))
        });
        release(released);
    }

    pub unsafe extern "C" fn g_value_get_object(value: *const GValue) -> *mut c_void {
        let raw = unsafe { &*value };
        if !with_state(|s| s.check_buffer(raw, gtype::OBJECT, "g_value_get_object")) {
            return ptr::null_mut();
        }
        raw.data[0] as usize as *mut c_void
    }

    pub unsafe extern "C" fn g_value_peek_pointer(value: *const GValue) -> *mut c_void {
        let raw = unsafe { &*value };
        raw.data[0] as usize as *mut c_void
    }

    // GObject: types

    pub unsafe extern "C" fn g_type_from_name(name: *const c_char) -> GType {
        let name = unsafe { read_str(name) };
        with_state(|s| s.type_by_name(&name).unwrap_or(gtype::INVALID))
    }

    pub unsafe extern "C" fn g_type_name(g_type: GType) -> *const c_char {
        with_state(|s| s.type_record(g_type).map_or(ptr::null(), |record| record.name.as_ptr()))
    }

    pub unsafe extern "C" fn g_type_name_from_instance(instance: *mut c_void) -> *const c_char {
        with_state(|s| {
            s.live_object(instance as usize)
                .and_then(|record| s.type_record(record.g_type))
                .map_or(ptr::null(), |record| record.name.as_ptr())
        })
    }

    pub unsafe extern "C" fn g_type_fundamental(type_id: GType) -> GType {
        MockState::fundamental(type_id)
    }

    // GObject: signals

    pub unsafe extern "C" fn g_signal_connect_closure(
        instance: *mut c_void,
        detailed_signal: *const c_char,
        closure: *mut GClosure,
        _after: GBoolean,
    ) -> c_ulong {
        let detailed = unsafe { read_str(detailed_signal) };
        with_state(|s| {
            let instance = instance as usize;
            let Some(g_type) = s.live_object(instance).map(|record| record.g_type) else {
                s.critical(format!("g_signal_connect_closure: invalid instance {instance:#x}"));
                return 0;
            };
            let Some((signal_id, detail)) = s.parse_signal(g_type, &detailed) else {
                let type_name = s.type_name(g_type);
                s.critical(format!("signal '{detailed}' is invalid for instance of type '{type_name}'"));
                return 0;
            };
            let Some(record) = s.closures.get_mut(&(closure as usize)) else {
                s.critical(format!("g_signal_connect_closure: invalid closure {:#x}", closure as usize));
                return 0;
            };
            if record.floating {
                record.floating = false;
            } else {
                record.ref_count += 1;
            }
            let id = s.next_handler;
            s.next_handler += 1;
            s.handlers.push(HandlerRecord {
                id,
                instance,
                signal_id,
                detail,
                closure: closure as usize,
            });
            id
        })
    }

    pub unsafe extern "C" fn g_signal_handler_disconnect(instance: *mut c_void, handler_id: c_ulong) {
        let closure = with_state(|s| {
            let Some(index) = s
                .handlers
                .iter()
                .position(|h| h.id == handler_id && h.instance == instance as usize)
            else {
                s.critical(format!(
                    "g_signal_handler_disconnect: instance {:#x} has no handler with id {handler_id}",
                    instance as usize
                ));
                return None;
            };
            Some(s.handlers.remove(index).closure)
        });
        if let Some(closure) = closure {
            closure_unref(closure);
        }
    }

    pub unsafe extern "C" fn g_signal_handler_is_connected(instance: *mut c_void, handler_id: c_ulong) -> GBoolean {
        with_state(|s| {
            GBoolean::from(
                s.handlers
                    .iter()
                    .any(|h| h.id == handler_id && h.instance == instance as usize),
            )
        })
    }

    pub unsafe extern "C" fn g_signal_parse_name(
        detailed_signal: *const c_char,
        itype: GType,
        signal_id: *mut c_uint,
        detail: *mut GQuark,
        _force_detail_quark: GBoolean,
    ) -> GBoolean {
        let detailed = unsafe { read_str(detailed_signal) };
        match with_state(|s| s.parse_signal(itype, &detailed)) {
            Some((id, quark)) => {
                // SAFETY: valid out-params per the caller.
                unsafe {
                    *signal_id = id;
                    *detail = quark;
                }
                GBoolean::TRUE
            }
            None => GBoolean::FALSE,
        }
    }

    pub unsafe extern "C" fn g_signal_query(signal_id: c_uint, query: *mut GSignalQuery) {
        let out = unsafe { &mut *query };
        *out = with_state(|s| {
            s.signals
                .iter()
                .find(|signal| signal.id == signal_id)
                .map(|signal| GSignalQuery {
                    signal_id: signal.id,
                    signal_name: signal.name.as_ptr(),
                    itype: signal.itype,
                    signal_flags: 0,
                    return_type: signal.return_type,
                    n_params: signal.params.len() as c_uint,
                    param_types: signal.params.as_ptr(),
                })
                .unwrap_or_default()
        });
    }

    pub unsafe extern "C" fn g_signal_emitv(
        instance_and_params: *const GValue,
        signal_id: c_uint,
        detail: GQuark,
        return_value: *mut GValue,
    ) {
        // SAFETY: element 0 is the instance.
        let instance = unsafe { (*instance_and_params).data[0] } as usize;
        let n_values = with_state(|s| {
            if s.live_object(instance).is_none() {
                s.critical(format!("g_signal_emitv: invalid instance {instance:#x}"));
                return None;
            }
            s.signals
                .iter()
                .find(|signal| signal.id == signal_id)
                .map(|signal| signal.params.len() as c_uint + 1)
        });
        if let Some(n_values) = n_values {
            invoke_handlers(instance, signal_id, detail, instance_and_params, n_values, return_value);
        }
    }

    // GObject: closures

    pub unsafe extern "C" fn g_closure_new_simple(sizeof_closure: c_uint, data: *mut c_void) -> *mut GClosure {
        let size = (sizeof_closure as usize).max(mem::size_of::<GClosure>());
        let words = size.div_ceil(mem::size_of::<u64>());
        let address = Box::into_raw(vec![0u64; words].into_boxed_slice()) as *mut u64 as usize;
        with_state(|s| {
            s.closures.insert(
                address,
                ClosureRecord {
                    ref_count: 1,
                    floating: true,
                    marshal: None,
                    marshal_data: data,
                    notifiers: Vec::new(),
                },
            );
        });
        address as *mut GClosure
    }

    pub unsafe extern "C" fn g_closure_set_meta_marshal(
        closure: *mut GClosure,
        marshal_data: *mut c_void,
        meta_marshal: GClosureMarshal,
    ) {
        with_state(|s| match s.closures.get_mut(&(closure as usize)) {
            Some(record) => {
                record.marshal = meta_marshal;
                record.marshal_data = marshal_data;
            }
            None => s.critical(format!("g_closure_set_meta_marshal: invalid closure {:#x}", closure as usize)),
        });
    }

    pub unsafe extern "C" fn g_closure_add_finalize_notifier(
        closure: *mut GClosure,
        notify_data: *mut c_void,
        notify_func: GClosureNotify,
    ) {
        with_state(|s| match s.closures.get_mut(&(closure as usize)) {
            Some(record) => record.notifiers.push((notify_data, notify_func)),
            None => s.critical(format!(
                "g_closure_add_finalize_notifier: invalid closure {:#x}",
                closure as usize
            )),
        });
    }

    pub unsafe extern "C" fn g_closure_sink(closure: *mut GClosure) {
        let was_floating = with_state(|s| {
            s.closures
                .get_mut(&(closure as usize))
                .map(|record| mem::replace(&mut record.floating, false))
                .unwrap_or(false)
        });
        if was_floating {
            closure_unref(closure as usize);
        }
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
        g_main_context_default,
        g_main_context_pending,
        g_main_context_iteration,
        g_main_context_wakeup,
        g_timeout_add_full,
        g_idle_add_full,
        g_source_remove,
        g_free,
        g_error_free,
        g_object_ref,
        g_object_unref,
        g_object_ref_sink,
        g_object_is_floating,
        g_object_set_property,
        g_object_get_property,
        g_object_notify,
        g_object_new_with_properties,
        g_value_init,
        g_value_unset,
        g_value_set_string,
        g_value_get_string,
        g_value_set_boolean,
        g_value_get_boolean,
        g_value_set_int,
        g_value_get_int,
        g_value_set_uint,
        g_value_get_uint,
        g_value_set_double,
        g_value_get_double,
        g_value_set_object,
        g_value_get_object,
        g_value_peek_pointer,
        g_type_from_name,
        g_type_name,
        g_type_name_from_instance,
        g_type_fundamental,
        g_signal_connect_closure,
        g_signal_handler_disconnect,
        g_signal_handler_is_connected,
        g_signal_parse_name,
        g_signal_query,
        g_signal_emitv,
        g_closure_new_simple,
        g_closure_set_meta_marshal,
        g_closure_add_finalize_notifier,
        g_closure_sink,
    }
}

/// Address of a fake GLib or GObject entry point.
pub fn lookup(name: &str) -> Option<NonNull<c_void>> {
    symbols().get(name).copied()
}

/// A GLib table backed by the fake.
pub fn glib_table() -> GLibLib {
    let symbols = symbols();
    GLibLib::from_lookup(|name| symbols.get(name).copied()).expect("the fake exports every GLib symbol")
}

/// A GObject table backed by the fake.
pub fn gobject_table() -> GObjectLib {
    let symbols = symbols();
    GObjectLib::from_lookup(|name| symbols.get(name).copied()).expect("the fake exports every GObject symbol")
}

/// Resets this thread's fake and returns a runtime backed by it.
pub fn runtime() -> Rc<Runtime> {
    reset();
    Runtime::from_libraries(glib_table(), gobject_table())
}

/// Discards every type, object, handler and source of this thread's fake.
///
/// Objects and closures are leaked, not finalized.
pub fn reset() {
    STATE.with(|state| *state.borrow_mut() = MockState::new());
}

/// Registers a type. Returns the invalid type if the parent or a property
/// type is unknown (a critical is recorded).
pub fn register_type(spec: TypeSpec) -> GType {
    with_state(|s| {
        if let Some(existing) = s.type_by_name(&spec.name) {
            return existing;
        }
        let Some(parent) = s.type_by_name(&spec.parent) else {
            s.critical(format!("cannot register '{}': unknown parent '{}'", spec.name, spec.parent));
            return gtype::INVALID;
        };
        let g_type = s.next_classed_type();
        let mut properties = Vec::new();
        for (name, type_name, default) in &spec.properties {
            let Some(value_type) = s.type_by_name(type_name) else {
                s.critical(format!("cannot register '{}': unknown property type '{type_name}'", spec.name));
                return gtype::INVALID;
            };
            let default = match MockState::fundamental(value_type) {
                gtype::BOOLEAN => Stored::Bool(default.as_bool().unwrap_or(false)),
                gtype::INT => Stored::Int(default.as_int().unwrap_or(0)),
                gtype::UINT => Stored::UInt(default.as_uint().unwrap_or(0)),
                gtype::DOUBLE => Stored::Double(default.as_double().unwrap_or(0.0)),
                gtype::STRING => Stored::Str(default.as_str().map(str::to_owned)),
                _ => Stored::Object(0),
            };
            let pspec = Box::into_raw(Box::new([0u64; 2])) as usize;
            properties.push(PropertyRecord {
                name: name.clone(),
                value_type,
                default,
                pspec,
            });
        }
        let mut signals = Vec::new();
        for (name, params, return_type) in &spec.signals {
            let resolved: Option<Vec<GType>> = params.iter().map(|p| s.type_by_name(p)).collect();
            let (Some(params), Some(return_type)) = (resolved, s.type_by_name(return_type)) else {
                s.critical(format!("cannot register '{}': signal '{name}' uses an unknown type", spec.name));
                return gtype::INVALID;
            };
            signals.push((name.clone(), params, return_type));
        }
        s.types.push(TypeRecord {
            name: cstring(&spec.name),
            g_type,
            parent,
            initially_unowned: false,
            properties,
        });
        for (name, params, return_type) in signals {
            let id = s.signals.len() as c_uint + 1;
            s.signals.push(SignalRecord {
                id,
                name: cstring(&name),
                itype: g_type,
                detailed: false,
                params,
                return_type,
            });
        }
        g_type
    })
}

/// Creates an object of a registered type with one reference (floating for
/// `GInitiallyUnowned` descendants). Null if the type is unknown.
pub fn new_object(type_name: &str) -> NativeHandle {
    with_state(|s| {
        let g_type = s.type_by_name(type_name).unwrap_or(gtype::INVALID);
        s.create_object(g_type)
            .map_or(NativeHandle::null(), |object| NativeHandle::from_ptr(object as *mut c_void))
    })
}

/// Current reference count; `Some(0)` once finalized, `None` if unknown.
pub fn ref_count(object: NativeHandle) -> Option<u32> {
    with_state(|s| s.objects.get(&(object.as_ptr() as usize)).map(|record| record.ref_count))
}

/// Whether a live object holds a floating reference.
pub fn is_floating(object: NativeHandle) -> Option<bool> {
    with_state(|s| s.live_object(object.as_ptr() as usize).map(|record| record.floating))
}

/// The stored value of a property, bypassing the property API.
pub fn property(object: NativeHandle, name: &str) -> Option<Value> {
    with_state(|s| {
        let stored = s.live_object(object.as_ptr() as usize)?.properties.get(name)?.clone();
        Some(match stored {
            Stored::Bool(v) => Value::Bool(v),
            Stored::Int(v) => Value::Int(v),
            Stored::UInt(v) => Value::UInt(v),
            Stored::Double(v) => Value::Double(v),
            Stored::Str(v) => v.map_or(Value::None, Value::String),
            Stored::Object(v) => Value::Object(NativeHandle::from_ptr(v as *mut c_void)),
        })
    })
}

/// Allocates an error that the fake's `g_error_free` releases, for fakes
/// of entry points with `GError**` out-parameters.
pub fn new_error(code: c_int, message: &str) -> *mut GError {
    Box::into_raw(Box::new(GError {
        domain: 0,
        code,
        message: cstring(message).into_raw(),
    }))
}

/// Criticals recorded so far.
pub fn criticals() -> Vec<String> {
    with_state(|s| s.criticals.clone())
}

/// Returns and clears the recorded criticals.
pub fn take_criticals() -> Vec<String> {
    with_state(|s| mem::take(&mut s.criticals))
}

/// Strings currently owned by value buffers.
pub fn live_strings() -> i64 {
    with_state(|s| s.live_strings)
}

/// Closures not yet finalized.
pub fn live_closures() -> usize {
    with_state(|s| s.closures.len())
}

/// Connected handlers on `instance`.
pub fn handler_count(instance: NativeHandle) -> usize {
    with_state(|s| {
        s.handlers
            .iter()
            .filter(|h| h.instance == instance.as_ptr() as usize)
            .count()
    })
}

/// Queues an event for the main context; it runs inside an iteration.
pub fn post_event(event: impl FnOnce() + 'static) {
    with_state(|s| s.events.push_back(Box::new(event)));
}

/// Events queued and not yet dispatched.
pub fn pending_events() -> usize {
    with_state(|s| s.events.len())
}

/// Number of `g_main_context_pending` calls so far.
pub fn pending_calls() -> u64 {
    with_state(|s| s.pending_calls)
}

/// Advances the virtual clock timeouts are scheduled on.
pub fn advance_clock(by: Duration) {
    with_state(|s| s.clock_ms += by.as_millis() as u64);
}

/// Installed timeout and idle sources.
pub fn source_count() -> usize {
    with_state(|s| s.sources.iter().filter(|source| !source.removed).count())
}

/// Emits a signal from the native side with the given parameters and
/// returns the value left in the return slot, if the signal has one.
pub fn emit_signal(instance: NativeHandle, detailed_signal: &str, args: &[Value]) -> Option<Value> {
    let object = instance.as_ptr() as usize;
    let prepared = with_state(|s| {
        let Some(g_type) = s.live_object(object).map(|record| record.g_type) else {
            s.critical(format!("emit_signal: invalid instance {object:#x}"));
            return None;
        };
        let Some((signal_id, detail)) = s.parse_signal(g_type, detailed_signal) else {
            s.critical(format!("emit_signal: unknown signal '{detailed_signal}'"));
            return None;
        };
        let return_type = s
            .signals
            .iter()
            .find(|signal| signal.id == signal_id)
            .map_or(gtype::NONE, |signal| signal.return_type);
        Some((g_type, signal_id, detail, return_type))
    })?;
    let (g_type, signal_id, detail, return_type) = prepared;

    let strings: Vec<CString> = args
        .iter()
        .filter_map(|arg| arg.as_str().map(cstring))
        .collect();
    let mut next_string = strings.iter();
    let mut params = vec![GValue {
        g_type,
        data: [object as u64, 0],
    }];
    for arg in args {
        let (g_type, bits) = match arg {
            Value::None => (gtype::POINTER, 0),
            Value::Bool(v) => (gtype::BOOLEAN, u64::from(*v)),
            Value::Int(v) => (gtype::INT, *v as u32 as u64),
            Value::UInt(v) => (gtype::UINT, u64::from(*v)),
            Value::Double(v) => (gtype::DOUBLE, v.to_bits()),
            Value::String(_) => (
                gtype::STRING,
                next_string.next().map_or(0, |s| s.as_ptr() as usize as u64),
            ),
            Value::Object(handle) => {
                let g_type = with_state(|s| s.live_object(handle.as_ptr() as usize).map(|r| r.g_type));
                (g_type.unwrap_or(gtype::OBJECT), handle.as_ptr() as usize as u64)
            }
        };
        params.push(GValue { g_type, data: [bits, 0] });
    }

    let mut return_value = (return_type != gtype::NONE).then(|| GValue {
        g_type: return_type,
        data: [0; 2],
    });
    let return_ptr = return_value.as_mut().map_or(ptr::null_mut(), |raw| raw as *mut GValue);
    invoke_handlers(object, signal_id, detail, params.as_ptr(), params.len() as c_uint, return_ptr);

    let mut raw = return_value?;
    let value = with_state(|s| {
        let stored = s.read_buffer(&raw, raw.g_type);
        let released = s.clear_buffer(&mut raw);
        (stored, released)
    });
    let (stored, released) = value;
    release(released);
    Some(match stored {
        Stored::Bool(v) => Value::Bool(v),
        Stored::Int(v) => Value::Int(v),
        Stored::UInt(v) => Value::UInt(v),
        Stored::Double(v) => Value::Double(v),
        Stored::Str(v) => v.map_or(Value::None, Value::String),
        Stored::Object(v) => {
            // `read_buffer` took a reference for the stored copy.
            release((v != 0).then_some(v));
            Value::Object(NativeHandle::from_ptr(v as *mut c_void))
        }
    })
}
