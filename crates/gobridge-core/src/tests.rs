//! End-to-end tests of the core against the in-process native fake.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::config::EventLoopConfig;
use crate::error::{BridgeError, ObjectError, SignalError};
use crate::event_loop::{EventLoop, MainContext, NativeMainContext};
use crate::mock::{self, TypeSpec};
use crate::object::ObjectHandle;
use crate::runtime::Runtime;
use crate::source::{SourceControl, idle_add, timeout_add};
use crate::sys::{NativeHandle, gtype};
use crate::value::{BoxedValue, Value, ValueKind};

fn setup() -> Rc<Runtime> {
    let runtime = mock::runtime();
    mock::register_type(TypeSpec::new("TestChild"));
    mock::register_type(
        TypeSpec::new("TestWidget")
            .parent("GInitiallyUnowned")
            .property("title", "gchararray", Value::None)
            .property("active", "gboolean", false)
            .property("count", "gint", 0)
            .property("selected", "guint", 0u32)
            .property("ratio", "gdouble", 0.0)
            .property("child", "GObject", Value::None)
            .signal("clicked", &[], "void")
            .signal("close-request", &[], "gboolean")
            .signal("value-changed", &["gdouble", "gchararray"], "void"),
    );
    runtime
}

fn widget(runtime: &Rc<Runtime>) -> ObjectHandle {
    ObjectHandle::adopt(runtime, mock::new_object("TestWidget"), "test_widget_new").unwrap()
}

#[test]
fn test_property_round_trip_each_kind() {
    let runtime = setup();
    let widget = widget(&runtime);
    let child = ObjectHandle::adopt(&runtime, mock::new_object("TestChild"), "test_child_new").unwrap();

    widget.set_property("title", "héllo wörld ✓").unwrap();
    widget.set_property("active", true).unwrap();
    widget.set_property("count", -42).unwrap();
    widget.set_property("selected", 7u32).unwrap();
    widget.set_property("ratio", 0.25).unwrap();
    widget.set_property("child", &child).unwrap();

    assert_eq!(
        widget.get_property("title", None).unwrap(),
        Value::String("héllo wörld ✓".into())
    );
    assert_eq!(widget.get_property("active", None).unwrap(), Value::Bool(true));
    assert_eq!(widget.get_property("count", Some(ValueKind::Int)).unwrap(), Value::Int(-42));
    assert_eq!(widget.get_property("selected", None).unwrap(), Value::UInt(7));
    assert_eq!(widget.get_property("ratio", Some(ValueKind::Double)).unwrap(), Value::Double(0.25));
    assert_eq!(widget.get_property("child", None).unwrap(), Value::Object(child.as_ptr()));

    // The handle plus the property's own reference.
    assert_eq!(mock::ref_count(child.as_ptr()), Some(2));
    assert_eq!(mock::live_strings(), 0);
    assert!(mock::criticals().is_empty());
}

#[test]
fn test_unset_string_property_reads_empty() {
    let runtime = setup();
    let widget = widget(&runtime);
    assert_eq!(widget.get_property("title", None).unwrap(), Value::String(String::new()));
}

#[test]
fn test_boxed_value_kind_mismatch() {
    let runtime = setup();
    let mut boxed = BoxedValue::new(runtime.gobject(), ValueKind::Int).unwrap();
    assert!(boxed.set(&Value::Bool(true)).is_err());
    boxed.set(&Value::Int(5)).unwrap();
    assert_eq!(boxed.get(), Value::Int(5));
    assert!(BoxedValue::new(runtime.gobject(), ValueKind::Absent).is_err());
}

#[test]
fn test_boxed_strings_are_released() {
    let runtime = setup();
    {
        let boxed = BoxedValue::from_value(runtime.gobject(), &Value::from("temporary")).unwrap();
        assert_eq!(boxed.get(), Value::String("temporary".into()));
        assert_eq!(mock::live_strings(), 1);
    }
    assert_eq!(mock::live_strings(), 0);
}

#[test]
fn test_wrap_and_unref_are_refcount_neutral() {
    let runtime = setup();
    let raw = mock::new_object("TestChild");
    assert_eq!(mock::ref_count(raw), Some(1));

    let handle = ObjectHandle::wrap(&runtime, raw);
    assert_eq!(mock::ref_count(raw), Some(2));
    handle.unref();
    assert_eq!(mock::ref_count(raw), Some(1));
    handle.unref();
    assert_eq!(mock::ref_count(raw), Some(1));
    assert!(handle.is_null());
    assert!(mock::criticals().is_empty());

    let handle = ObjectHandle::wrap(&runtime, raw);
    let copy = handle.clone();
    assert_eq!(mock::ref_count(raw), Some(3));
    drop(copy);
    drop(handle);
    assert_eq!(mock::ref_count(raw), Some(1));
}

#[test]
fn test_released_handle_rejects_operations() {
    let runtime = setup();
    let widget = widget(&runtime);
    widget.unref();

    assert!(matches!(
        widget.get_property("active", None),
        Err(BridgeError::Object(ObjectError::Released))
    ));
    assert!(matches!(
        widget.set_property("active", true),
        Err(BridgeError::Object(ObjectError::Released))
    ));
    assert!(matches!(
        widget.connect("clicked", |_| {}),
        Err(BridgeError::Object(ObjectError::Released))
    ));
    assert!(matches!(widget.type_name(), Err(ObjectError::Released)));
}

#[test]
fn test_wrap_null_stays_null() {
    let runtime = setup();
    let handle = ObjectHandle::wrap(&runtime, NativeHandle::null());
    assert!(handle.is_null());
    handle.unref();
    assert!(mock::criticals().is_empty());
}

#[test]
fn test_adopt_sinks_floating_reference() {
    let runtime = setup();
    let raw = mock::new_object("TestWidget");
    assert_eq!(mock::is_floating(raw), Some(true));

    let handle = ObjectHandle::adopt(&runtime, raw, "test_widget_new").unwrap();
    assert_eq!(mock::is_floating(raw), Some(false));
    assert_eq!(mock::ref_count(raw), Some(1));

    drop(handle);
    assert_eq!(mock::ref_count(raw), Some(0));
}

#[test]
fn test_adopt_null_is_an_error() {
    let runtime = setup();
    let err = ObjectHandle::adopt(&runtime, NativeHandle::null(), "gtk_label_new").unwrap_err();
    assert_eq!(
        err,
        ObjectError::NullHandle {
            constructor: "gtk_label_new"
        }
    );
}

#[test]
fn test_signal_round_trip() {
    let runtime = setup();
    let widget = widget(&runtime);
    let clicks = Rc::new(Cell::new(0));

    let counter = Rc::clone(&clicks);
    let id = widget.connect("clicked", move |_| counter.set(counter.get() + 1)).unwrap();
    assert_eq!(widget.subscription_count(), 1);
    assert!(runtime.signals().contains(id));

    assert_eq!(widget.emit("clicked").unwrap(), Value::None);
    assert_eq!(clicks.get(), 1);

    assert!(widget.disconnect(id));
    widget.emit("clicked").unwrap();
    assert_eq!(clicks.get(), 1);
    assert!(!widget.disconnect(id));

    assert!(runtime.signals().is_empty());
    assert_eq!(mock::handler_count(widget.as_ptr()), 0);
    assert_eq!(mock::live_closures(), 0);
    // The callback's captures were released with the closure.
    assert_eq!(Rc::strong_count(&clicks), 1);
}

#[test]
fn test_callback_receives_instance() {
    let runtime = setup();
    let widget = widget(&runtime);
    let seen = Rc::new(Cell::new(NativeHandle::null()));

    let sink = Rc::clone(&seen);
    widget
        .connect("clicked", move |args| {
            assert!(args.is_empty());
            sink.set(args.instance());
        })
        .unwrap();
    widget.emit("clicked").unwrap();
    assert_eq!(seen.get(), widget.as_ptr());
}

#[test]
fn test_no_callbacks_after_release() {
    let runtime = setup();
    let widget = widget(&runtime);
    let keeper = widget.clone();
    let clicks = Rc::new(Cell::new(0));

    let counter = Rc::clone(&clicks);
    widget.connect("clicked", move |_| counter.set(counter.get() + 1)).unwrap();
    keeper.emit("clicked").unwrap();
    assert_eq!(clicks.get(), 1);

    widget.unref();
    assert!(runtime.signals().is_empty());
    mock::emit_signal(keeper.as_ptr(), "clicked", &[]);
    keeper.emit("clicked").unwrap();
    assert_eq!(clicks.get(), 1);
    assert_eq!(mock::live_closures(), 0);
}

#[test]
fn test_dropping_handle_disconnects_handlers() {
    let runtime = setup();
    let raw = mock::new_object("TestChild");
    let widget = ObjectHandle::adopt(&runtime, raw, "test_child_new").unwrap();
    widget.connect("notify", |_| {}).unwrap();
    assert_eq!(mock::live_closures(), 1);

    drop(widget);
    assert_eq!(mock::ref_count(raw), Some(0));
    assert_eq!(mock::live_closures(), 0);
    assert!(runtime.signals().is_empty());
}

#[test]
fn test_toggle_notifies_and_reads_back() {
    let runtime = setup();
    let switch = widget(&runtime);
    let observed = Rc::new(RefCell::new(Vec::new()));

    let weak: Weak<Runtime> = Rc::downgrade(&runtime);
    let log = Rc::clone(&observed);
    switch
        .connect("notify::active", move |args| {
            assert_eq!(args.len(), 1);
            assert_eq!(args.value_type(0), Some(gtype::PARAM));
            assert!(args.pointer(0).is_some());
            assert_eq!(args.value(0), None);

            let Some(runtime) = weak.upgrade() else { return };
            let switch = ObjectHandle::wrap(&runtime, args.instance());
            let active = switch.get_property("active", None).unwrap();
            log.borrow_mut().push(active);
        })
        .unwrap();

    switch.set_property("active", true).unwrap();
    switch.set_property("title", "unrelated").unwrap();
    switch.set_property("active", false).unwrap();
    switch.emit("notify::active").unwrap();

    assert_eq!(
        *observed.borrow(),
        vec![Value::Bool(true), Value::Bool(false), Value::Bool(false)]
    );
    assert_eq!(mock::ref_count(switch.as_ptr()), Some(1));
}

#[test]
fn test_undetailed_notify_sees_every_property() {
    let runtime = setup();
    let widget = widget(&runtime);
    let count = Rc::new(Cell::new(0));

    let counter = Rc::clone(&count);
    widget.connect("notify", move |_| counter.set(counter.get() + 1)).unwrap();
    widget.set_property("active", true).unwrap();
    widget.set_property("count", 3).unwrap();
    assert_eq!(count.get(), 2);
}

#[test]
fn test_connect_unknown_signal_fails_cleanly() {
    let runtime = setup();
    let widget = widget(&runtime);

    let err = widget.connect("no-such-signal", |_| {}).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Signal(SignalError::ConnectFailed { ref signal }) if signal == "no-such-signal"
    ));
    assert_eq!(mock::take_criticals().len(), 1);
    assert_eq!(widget.subscription_count(), 0);
    assert!(runtime.signals().is_empty());
    assert_eq!(mock::live_closures(), 0);
}

#[test]
fn test_emit_returns_handler_value() {
    let runtime = setup();
    let window = widget(&runtime);
    assert_eq!(window.emit("close-request").unwrap(), Value::Bool(false));

    window
        .connect_returning("close-request", |_| Some(Value::Bool(true)))
        .unwrap();
    assert_eq!(window.emit("close-request").unwrap(), Value::Bool(true));
    assert_eq!(mock::emit_signal(window.as_ptr(), "close-request", &[]), Some(Value::Bool(true)));
}

#[test]
fn test_emit_errors() {
    let runtime = setup();
    let widget = widget(&runtime);

    assert!(matches!(
        widget.emit("value-changed"),
        Err(BridgeError::Signal(SignalError::UnsupportedEmission { params: 2, .. }))
    ));
    assert!(matches!(
        widget.emit("bogus"),
        Err(BridgeError::Signal(SignalError::UnknownSignal(_)))
    ));
}

#[test]
fn test_signal_args_decode_parameters() {
    let runtime = setup();
    let widget = widget(&runtime);
    let received = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&received);
    widget
        .connect("value-changed", move |args| {
            assert_eq!(args.len(), 2);
            assert!(args.pointer(0).is_none());
            assert!(args.pointer(1).is_some());
            *sink.borrow_mut() = Some((args.value(0), args.value(1)));
        })
        .unwrap();

    mock::emit_signal(widget.as_ptr(), "value-changed", &[Value::Double(0.5), Value::from("ü")]);
    assert_eq!(
        received.borrow_mut().take(),
        Some((Some(Value::Double(0.5)), Some(Value::String("ü".into()))))
    );
}

#[test]
fn test_callback_panic_is_contained() {
    let runtime = setup();
    let widget = widget(&runtime);
    widget.connect("clicked", |_| panic!("handler failure")).unwrap();

    assert!(widget.emit("clicked").is_ok());
    let clicks = Rc::new(Cell::new(0));
    let counter = Rc::clone(&clicks);
    widget.connect("clicked", move |_| counter.set(counter.get() + 1)).unwrap();
    widget.emit("clicked").unwrap();
    assert_eq!(clicks.get(), 1);
}

#[test]
fn test_handler_disconnecting_itself() {
    let runtime = setup();
    let widget = Rc::new(widget(&runtime));
    let slot = Rc::new(Cell::new(None));
    let clicks = Rc::new(Cell::new(0));

    let weak = Rc::downgrade(&widget);
    let id_slot = Rc::clone(&slot);
    let counter = Rc::clone(&clicks);
    let id = widget
        .connect("clicked", move |_| {
            counter.set(counter.get() + 1);
            if let (Some(widget), Some(id)) = (weak.upgrade(), id_slot.get()) {
                widget.disconnect(id);
            }
        })
        .unwrap();
    slot.set(Some(id));

    widget.emit("clicked").unwrap();
    widget.emit("clicked").unwrap();
    assert_eq!(clicks.get(), 1);
    assert_eq!(mock::live_closures(), 0);
}

#[test]
fn test_object_new_with_properties() {
    let runtime = setup();
    let widget = ObjectHandle::new(
        &runtime,
        "TestWidget",
        &[("title", Value::from("made")), ("count", Value::Int(3))],
    )
    .unwrap();

    assert_eq!(widget.type_name().unwrap(), "TestWidget");
    assert_eq!(widget.get_property("title", None).unwrap(), Value::String("made".into()));
    assert_eq!(widget.get_property("count", Some(ValueKind::Int)).unwrap(), Value::Int(3));
    assert_eq!(mock::is_floating(widget.as_ptr()), Some(false));
    assert_eq!(mock::live_strings(), 0);

    assert!(matches!(
        ObjectHandle::new(&runtime, "NoSuchType", &[]),
        Err(BridgeError::Object(ObjectError::UnknownType(_)))
    ));
}

#[test]
fn test_type_mismatch_is_reported_natively() {
    let runtime = setup();
    let widget = widget(&runtime);

    widget.set_property("active", "yes").unwrap();
    assert_eq!(mock::take_criticals().len(), 1);
    assert_eq!(mock::property(widget.as_ptr(), "active"), Some(Value::Bool(false)));
}

#[test]
fn test_runtime_type_queries() {
    let runtime = setup();
    let g_type = runtime.type_from_name("TestWidget").unwrap();
    assert_eq!(runtime.type_name(g_type).as_deref(), Some("TestWidget"));
    assert_eq!(runtime.gobject().fundamental(g_type), gtype::OBJECT);
    assert!(matches!(
        runtime.type_from_name("Missing"),
        Err(BridgeError::Object(ObjectError::UnknownType(_)))
    ));
    assert_eq!(runtime.instance_type(NativeHandle::null()), None);
}

#[test]
fn test_timeout_source_runs_until_break() {
    let runtime = setup();
    let context = NativeMainContext::new(&runtime);
    let ticks = Rc::new(Cell::new(0));

    let counter = Rc::clone(&ticks);
    timeout_add(&runtime, Duration::from_millis(10), move || {
        counter.set(counter.get() + 1);
        if counter.get() < 3 {
            SourceControl::Continue
        } else {
            SourceControl::Break
        }
    });
    assert!(!context.pending());

    for _ in 0..3 {
        mock::advance_clock(Duration::from_millis(10));
        assert!(context.pending());
        assert!(context.iteration(false));
    }
    assert_eq!(ticks.get(), 3);
    assert_eq!(mock::source_count(), 0);
    assert_eq!(Rc::strong_count(&ticks), 1);
}

#[test]
fn test_idle_source_removal() {
    let runtime = setup();
    let context = NativeMainContext::new(&runtime);
    let runs = Rc::new(Cell::new(0));

    let counter = Rc::clone(&runs);
    let id = idle_add(&runtime, move || {
        counter.set(counter.get() + 1);
        SourceControl::Continue
    });
    assert!(context.pending());
    context.iteration(false);
    assert_eq!(runs.get(), 1);

    assert!(id.remove(&runtime));
    assert_eq!(Rc::strong_count(&runs), 1);
    assert!(!context.pending());

    assert!(!id.remove(&runtime));
    assert_eq!(mock::take_criticals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_event_loop_dispatches_posted_events() {
    let runtime = setup();
    let widget = widget(&runtime);
    let clicks = Rc::new(Cell::new(0));

    let counter = Rc::clone(&clicks);
    widget.connect("clicked", move |_| counter.set(counter.get() + 1)).unwrap();
    let target = widget.as_ptr();
    for _ in 0..2 {
        mock::post_event(move || {
            mock::emit_signal(target, "clicked", &[]);
        });
    }

    let event_loop = EventLoop::native(&runtime, EventLoopConfig::default());
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        event_loop.stop();
    };
    let (result, ()) = tokio::join!(event_loop.start(None), stopper);
    result.unwrap();

    assert_eq!(clicks.get(), 2);
    assert_eq!(mock::pending_events(), 0);
    assert_eq!(event_loop.stats().events_dispatched, 2);
    assert!(mock::pending_calls() > 1);
}
