//! Core systems for gobridge.
//!
//! This crate drives GLib, GObject and the GTK stack through their C ABI,
//! resolved at run time from shared libraries:
//!
//! - **Library resolution**: platform file names and search paths for the
//!   GNOME libraries
//! - **Symbol tables**: typed function-pointer tables bound by name, declared
//!   with [`native_library!`]
//! - **Marshaling**: strings, string arrays and boxed `GValue`s
//! - **Object handles**: reference-counted native objects with reflective
//!   property and signal access
//! - **Signal trampolines**: native signal emissions routed to Rust closures
//! - **Event loop**: a cooperative pump of the GLib main context on a tokio
//!   current-thread runtime
//!
//! Everything here is single-threaded. A [`Runtime`] and every handle made
//! from it must stay on the thread that created them.
//!
//! # Example
//!
//! ```no_run
//! use gobridge_core::{BridgeConfig, EventLoop, ObjectHandle, Runtime, Value};
//!
//! fn main() -> gobridge_core::Result<()> {
//!     let config = BridgeConfig::from_env();
//!     let runtime = Runtime::load(&config)?;
//!
//!     let object = ObjectHandle::new(&runtime, "GObject", &[])?;
//!     println!("created a {}", object.type_name()?);
//!
//!     let event_loop = EventLoop::native(&runtime, config.event_loop.clone());
//!     event_loop.run_blocking(None)
//! }
//! ```

pub mod config;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod marshal;
#[cfg(any(test, feature = "mock-native"))]
pub mod mock;
pub mod object;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod symbols;
pub mod sys;
pub mod trampoline;
pub mod value;

#[cfg(test)]
mod tests;

pub use config::{BridgeConfig, EventLoopConfig};
pub use error::{BridgeError, LoadError, MarshalError, ObjectError, Result, SignalError};
pub use event_loop::{EventLoop, IdleBackoff, LoopApplication, LoopStats, MainContext, NativeMainContext};
pub use logging::PerfSpan;
pub use marshal::{StringArray, from_native_string, to_native_string, with_string_array};
pub use object::ObjectHandle;
pub use resolver::{LibraryResolver, NativeLibrary, OsFamily, SearchPaths};
pub use runtime::Runtime;
pub use source::{SourceControl, SourceId, idle_add, timeout_add};
pub use symbols::{FfiKind, GBoolean, NativeType, SymbolSignature};
pub use sys::{GType, NativeHandle};
pub use trampoline::{SignalArgs, SignalHandlerId, SignalRegistry};
pub use value::{BoxedArray, BoxedValue, Value, ValueKind};

#[doc(hidden)]
pub use libloading;
#[doc(hidden)]
pub use tracing as __tracing;
