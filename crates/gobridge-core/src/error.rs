//! Error types for gobridge.
//!
//! Native failures never unwind across the FFI boundary: the C libraries
//! signal them through sentinel returns (null handles, zero ids), which the
//! functions in this crate translate into the enums below. Missing *optional*
//! symbols are not errors at all; they surface as `None` table entries.

use std::path::PathBuf;

use crate::value::ValueKind;

/// Errors raised while opening a native library or resolving its symbols.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The dynamic loader could not open the library.
    #[error("failed to open native library '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required symbol is not exported by the library.
    #[error("required symbol '{symbol}' is missing from {library}")]
    MissingSymbol {
        library: &'static str,
        symbol: &'static str,
        #[source]
        source: Option<libloading::Error>,
    },
}

/// Errors raised while converting values to or from their native form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    /// A string destined for C contains a NUL byte.
    #[error("string contains an interior NUL byte at position {position}")]
    InteriorNul { position: usize },

    /// A value was written into a boxed buffer initialized for another kind.
    #[error("cannot store a {found:?} value in a buffer initialized for {expected:?}")]
    KindMismatch { expected: ValueKind, found: ValueKind },

    /// The absent kind has no native representation to initialize.
    #[error("the absent value kind cannot be boxed")]
    UnsetKind,
}

/// Errors raised by object handle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// The handle has already been released with `unref`.
    #[error("object handle has already been released")]
    Released,

    /// A constructor-like native call returned null.
    #[error("native constructor '{constructor}' returned null")]
    NullHandle { constructor: &'static str },

    /// No type with this name is registered with the type system.
    #[error("no native type named '{0}' is registered")]
    UnknownType(String),

    /// An optional native entry point needed by the operation was not loaded.
    #[error("native symbol '{0}' is not available in the loaded library")]
    SymbolUnavailable(&'static str),
}

/// Signal-specific errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// The native side refused the connection (usually an unknown signal name).
    #[error("failed to connect to signal '{signal}'")]
    ConnectFailed { signal: String },

    /// The signal name does not exist on the instance's type.
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// Emission without arguments is only supported for parameterless signals.
    #[error("signal '{signal}' takes {params} parameter(s) and cannot be emitted without arguments")]
    UnsupportedEmission { signal: String, params: u32 },
}

/// The main error type for gobridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Library loading error.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Marshaling error.
    #[error("marshal error: {0}")]
    Marshal(#[from] MarshalError),

    /// Object-related error.
    #[error("object error: {0}")]
    Object(#[from] ObjectError),

    /// Signal-related error.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// An application failed to register with the session.
    #[error("application registration failed: {0}")]
    Registration(String),

    /// A UI description was rejected by the native builder.
    #[error("interface description rejected: {0}")]
    Builder(String),

    /// The async runtime hosting the event loop could not be created.
    #[error("failed to create async runtime: {0}")]
    Runtime(String),
}

/// A specialized Result type for gobridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::from(ObjectError::NullHandle {
            constructor: "gtk_switch_new",
        });
        assert_eq!(
            err.to_string(),
            "object error: native constructor 'gtk_switch_new' returned null"
        );

        let err = MarshalError::InteriorNul { position: 3 };
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_missing_symbol_display() {
        let err = LoadError::MissingSymbol {
            library: "gobject-2.0",
            symbol: "g_object_ref",
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "required symbol 'g_object_ref' is missing from gobject-2.0"
        );
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let err = BridgeError::from(SignalError::UnknownSignal("frobnicate".into()));
        assert!(err.source().is_some());
    }
}
