//! Prelude module for gobridge.
//!
//! ```ignore
//! use gobridge::prelude::*;
//! ```

// ============================================================================
// Composition root and event loop
// ============================================================================

pub use crate::Toolkit;
pub use gobridge_core::{BridgeConfig, EventLoop, EventLoopConfig, LoopApplication};

// ============================================================================
// Application
// ============================================================================

pub use crate::{Application, ApplicationFlags, InhibitFlags};

// ============================================================================
// Widgets
// ============================================================================

pub use crate::widget::{AsWidget, BoxLayout, Label, Orientation, Switch, Widget, Window};
pub use crate::Builder;

// ============================================================================
// Reflective core
// ============================================================================

pub use gobridge_core::{ObjectHandle, SignalHandlerId, Value, ValueKind};
pub use gobridge_core::{SourceControl, SourceId, idle_add, timeout_add};

// ============================================================================
// Errors
// ============================================================================

pub use gobridge_core::{BridgeError, Result};
