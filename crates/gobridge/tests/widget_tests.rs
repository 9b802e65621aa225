//! Integration tests for the widget facades and the builder.

mod support;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gobridge::ObjectError;
use gobridge::prelude::*;
use gobridge_core::mock;
use support::with_fake;

fn address(widget: &dyn AsWidget) -> usize {
    widget.handle().as_ptr().as_ptr() as usize
}

#[test]
fn test_window_title_round_trip() {
    let toolkit = support::toolkit(true);
    let window = Window::new(&toolkit).unwrap();

    assert_eq!(window.title().unwrap(), "");
    window.set_title("Stimulator").unwrap();
    assert_eq!(window.title().unwrap(), "Stimulator");
    assert_eq!(mock::live_strings(), 0);
}

#[test]
fn test_window_reference_shared_with_toplevel_list() {
    let toolkit = support::toolkit(true);
    let window = Window::new(&toolkit).unwrap();
    let raw = window.handle().as_ptr();

    assert_eq!(mock::ref_count(raw), Some(2));
    assert_eq!(mock::is_floating(raw), Some(false));

    window.close().unwrap();
    assert_eq!(mock::ref_count(raw), Some(1));
    drop(window);
    assert_eq!(mock::ref_count(raw), Some(0));
}

#[test]
fn test_close_request_can_veto() {
    let toolkit = support::toolkit(true);
    let window = Window::new(&toolkit).unwrap();
    let allow = Rc::new(Cell::new(false));
    let requests = Rc::new(Cell::new(0));
    {
        let allow = Rc::clone(&allow);
        let requests = Rc::clone(&requests);
        window
            .on_close_request(move || {
                requests.set(requests.get() + 1);
                !allow.get()
            })
            .unwrap();
    }

    window.close().unwrap();
    assert_eq!(requests.get(), 1);
    assert!(with_fake(|fake| fake.closed.is_empty()));

    allow.set(true);
    window.close().unwrap();
    assert_eq!(requests.get(), 2);
    assert_eq!(with_fake(|fake| fake.closed.clone()), vec![address(&window)]);
}

#[test]
fn test_window_present_and_default_size() {
    let toolkit = support::toolkit(true);
    let window = Window::new(&toolkit).unwrap();

    window.set_default_size(360, 240).unwrap();
    window.present().unwrap();

    let key = address(&window);
    assert_eq!(with_fake(|fake| fake.default_sizes[&key]), (360, 240));
    assert_eq!(with_fake(|fake| fake.presented.clone()), vec![key]);
}

#[test]
fn test_switch_active_round_trip() {
    let toolkit = support::toolkit(true);
    let switch = Switch::new(&toolkit).unwrap();
    let raw = switch.handle().as_ptr();

    assert_eq!(mock::ref_count(raw), Some(1));
    assert_eq!(mock::is_floating(raw), Some(false));
    assert!(!switch.is_active().unwrap());

    switch.set_active(true).unwrap();
    assert!(switch.is_active().unwrap());
    assert_eq!(mock::property(raw, "active"), Some(Value::Bool(true)));
}

#[test]
fn test_switch_notify_reports_new_state() {
    let toolkit = support::toolkit(true);
    let switch = Switch::new(&toolkit).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    switch.on_active_notify(move |active| log.borrow_mut().push(active)).unwrap();

    switch.set_active(true).unwrap();
    switch.set_active(false).unwrap();

    assert_eq!(*seen.borrow(), vec![true, false]);
    // Reading the state inside the callback leaves the refcount unchanged.
    assert_eq!(mock::ref_count(switch.handle().as_ptr()), Some(1));
}

#[test]
fn test_switch_notify_stops_after_drop() {
    let toolkit = support::toolkit(true);
    let switch = Switch::new(&toolkit).unwrap();
    let container = BoxLayout::new(&toolkit, Orientation::Vertical, 6).unwrap();
    container.append(&switch).unwrap();
    let raw = switch.handle().as_ptr();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    switch.on_active_notify(move |_| counter.set(counter.get() + 1)).unwrap();

    drop(switch);
    assert_eq!(mock::ref_count(raw), Some(1));
    assert_eq!(mock::handler_count(raw), 0);

    mock::emit_signal(raw, "notify::active", &[]);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_label_text() {
    let toolkit = support::toolkit(true);
    let label = Label::new(&toolkit, "Suspend: allowed").unwrap();

    assert_eq!(label.text().unwrap(), "Suspend: allowed");
    label.set_text("Suspend: inhibited ✓").unwrap();
    assert_eq!(label.text().unwrap(), "Suspend: inhibited ✓");
}

#[test]
fn test_box_append_and_remove() {
    let toolkit = support::toolkit(true);
    let container = BoxLayout::new(&toolkit, Orientation::Horizontal, 12).unwrap();
    let label = Label::new(&toolkit, "a").unwrap();
    let switch = Switch::new(&toolkit).unwrap();

    container.append(&label).unwrap();
    container.append(&switch).unwrap();

    let key = address(&container);
    assert_eq!(with_fake(|fake| fake.box_orientations[&key]), (0, 12));
    assert_eq!(
        with_fake(|fake| fake.box_children[&key].clone()),
        vec![address(&label), address(&switch)]
    );
    assert_eq!(mock::ref_count(label.handle().as_ptr()), Some(2));

    container.remove(&label).unwrap();
    assert_eq!(with_fake(|fake| fake.box_children[&key].clone()), vec![address(&switch)]);
    assert_eq!(mock::ref_count(label.handle().as_ptr()), Some(1));
}

#[test]
fn test_window_set_child_replaces_previous() {
    let toolkit = support::toolkit(true);
    let window = Window::new(&toolkit).unwrap();
    let first = BoxLayout::new(&toolkit, Orientation::Vertical, 0).unwrap();
    let second = Label::new(&toolkit, "second").unwrap();

    window.set_child(Some(&first)).unwrap();
    assert_eq!(mock::ref_count(first.handle().as_ptr()), Some(2));

    window.set_child(Some(&second)).unwrap();
    assert_eq!(mock::ref_count(first.handle().as_ptr()), Some(1));
    assert_eq!(with_fake(|fake| fake.window_children[&address(&window)]), address(&second));

    window.set_child(None).unwrap();
    assert_eq!(mock::ref_count(second.handle().as_ptr()), Some(1));
}

#[test]
fn test_released_widget_rejects_calls() {
    let toolkit = support::toolkit(true);
    let window = Window::new(&toolkit).unwrap();
    let child = Label::new(&toolkit, "child").unwrap();
    child.handle().unref();

    assert!(matches!(window.set_child(Some(&child)), Err(ObjectError::Released)));
    assert!(matches!(
        child.text(),
        Err(BridgeError::Object(ObjectError::Released))
    ));

    window.handle().unref();
    assert!(matches!(window.present(), Err(ObjectError::Released)));
}

#[test]
fn test_widget_visibility_through_generic_facade() {
    let toolkit = support::toolkit(true);
    let widget: Widget = Label::new(&toolkit, "hidden").unwrap().into();

    assert!(widget.is_visible().unwrap());
    widget.set_visible(false).unwrap();
    assert!(!widget.is_visible().unwrap());
    widget.set_sensitive(false).unwrap();
    assert!(!widget.is_sensitive().unwrap());
}

const UI: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<interface>
  <object class="GtkBox" id="rows">
    <child>
      <object class="GtkSwitch" id="suspend_switch"/>
    </child>
    <child>
      <object class="GtkLabel" id="status"/>
    </child>
  </object>
</interface>
"#;

#[test]
fn test_builder_objects_by_id() {
    let toolkit = support::toolkit(true);
    let builder = Builder::from_string(&toolkit, UI).unwrap();

    let switch = builder.object("suspend_switch").unwrap().unwrap();
    assert_eq!(switch.type_name().unwrap(), "GtkSwitch");
    // The builder's reference plus ours.
    assert_eq!(mock::ref_count(switch.as_ptr()), Some(2));

    let switch = Switch::from_handle(&toolkit, switch);
    switch.set_active(true).unwrap();
    assert!(switch.is_active().unwrap());

    assert!(builder.object("missing").unwrap().is_none());
}

#[test]
fn test_builder_rejects_bad_description() {
    let toolkit = support::toolkit(true);

    let err = Builder::from_string(&toolkit, "<object class=\"GtkSwitch\"/>").unwrap_err();
    match err {
        BridgeError::Builder(message) => assert!(message.contains("<interface>")),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = Builder::from_string(&toolkit, "<interface><object class=\"NoSuchWidget\"/></interface>")
        .unwrap_err();
    assert!(matches!(err, BridgeError::Builder(ref message) if message.contains("NoSuchWidget")));
}
