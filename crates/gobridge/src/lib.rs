//! gobridge: typed GTK 4 facades over a dynamically loaded GNOME stack.
//!
//! This crate re-exports [`gobridge_core`] and adds the GIO, GTK 4 and
//! libadwaita symbol tables, the [`Toolkit`] composition root, an
//! [`Application`] type, a handful of widget facades and [`Builder`].
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use gobridge::prelude::*;
//!
//! fn main() -> gobridge::Result<()> {
//!     let config = BridgeConfig::from_env();
//!     let toolkit = Toolkit::load(&config)?;
//!     toolkit.init();
//!
//!     let app = Rc::new(Application::new(&toolkit, "org.example.Hello", ApplicationFlags::DEFAULT)?);
//!     let weak = Rc::downgrade(&app);
//!     app.on_activate(move || {
//!         if let Some(app) = weak.upgrade() {
//!             if let Ok(window) = app.new_window() {
//!                 let _ = window.set_title("Hello");
//!                 let _ = window.present();
//!             }
//!         }
//!     })?;
//!
//!     toolkit.event_loop(config.event_loop.clone()).run_blocking(Some(app))
//! }
//! ```

pub use gobridge_core::*;

pub mod application;
pub mod builder;
pub mod prelude;
pub mod sys;
pub mod toolkit;
pub mod widget;

pub use application::{Application, ApplicationFlags, InhibitFlags};
pub use builder::Builder;
pub use toolkit::Toolkit;
pub use widget::{AsWidget, BoxLayout, Label, Orientation, Switch, Widget, Window};
