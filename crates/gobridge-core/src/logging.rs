//! Logging facilities for gobridge.
//!
//! gobridge uses the `tracing` crate for instrumentation. The library never
//! installs a subscriber; applications choose their own:
//!
//! ```ignore
//! use tracing_subscriber::EnvFilter;
//!
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter(EnvFilter::from_default_env())
//!         .init();
//!
//!     // Your application code...
//! }
//! ```
//!
//! Filter by subsystem with the constants in [`targets`], for example
//! `RUST_LOG=gobridge_core::signal=debug,gobridge_core::event_loop=trace`.

/// Span names used throughout gobridge for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Event loop processing span.
    pub const EVENT_LOOP: &str = "gobridge::event_loop";
    /// Signal dispatch span.
    pub const SIGNAL: &str = "gobridge::signal";
    /// Property access span.
    pub const PROPERTY: &str = "gobridge::property";
    /// Library loading span.
    pub const LOADER: &str = "gobridge::loader";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "gobridge_core";
    /// Library resolution and symbol loading.
    pub const LOADER: &str = "gobridge_core::loader";
    /// Object handle lifecycle.
    pub const OBJECT: &str = "gobridge_core::object";
    /// Signal connection and dispatch.
    pub const SIGNAL: &str = "gobridge_core::signal";
    /// Property get/set and kind inference.
    pub const PROPERTY: &str = "gobridge_core::property";
    /// Cooperative event loop.
    pub const EVENT_LOOP: &str = "gobridge_core::event_loop";
    /// GLib timeout and idle sources.
    pub const SOURCE: &str = "gobridge_core::source";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "gobridge::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perf_span() {
        // Just ensure it compiles and doesn't panic
        let _span = PerfSpan::new(span_names::LOADER);
    }

    #[test]
    fn test_targets_share_crate_prefix() {
        for target in [
            targets::LOADER,
            targets::OBJECT,
            targets::SIGNAL,
            targets::PROPERTY,
            targets::EVENT_LOOP,
            targets::SOURCE,
        ] {
            assert!(target.starts_with(targets::CORE));
        }
    }
}
