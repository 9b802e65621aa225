//! Dynamically typed property values and the boxed `GValue` protocol.
//!
//! Every property read or write goes through a [`BoxedValue`]: the buffer is
//! initialized for one [`ValueKind`] when constructed and unset when dropped,
//! so the init → use → unset sequence cannot be cut short on any exit path.

use std::fmt;

use crate::error::MarshalError;
use crate::marshal::{from_native_string, to_native_string};
use crate::symbols::GBoolean;
use crate::sys::{GObjectLib, GType, GValue, NativeHandle, gtype};

/// The kinds of value the bridge can box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No value.
    Absent,
    String,
    Bool,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UInt,
    Double,
    /// An object pointer.
    Object,
}

impl ValueKind {
    /// The fundamental type a buffer of this kind is initialized with.
    pub fn fundamental_type(self) -> Option<GType> {
        match self {
            Self::Absent => None,
            Self::String => Some(gtype::STRING),
            Self::Bool => Some(gtype::BOOLEAN),
            Self::Int => Some(gtype::INT),
            Self::UInt => Some(gtype::UINT),
            Self::Double => Some(gtype::DOUBLE),
            Self::Object => Some(gtype::OBJECT),
        }
    }

    /// The kind decoded for a fundamental type, if representable.
    pub fn from_fundamental(fundamental: GType) -> Option<Self> {
        match fundamental {
            gtype::NONE => Some(Self::Absent),
            gtype::STRING => Some(Self::String),
            gtype::BOOLEAN => Some(Self::Bool),
            gtype::INT => Some(Self::Int),
            gtype::UINT => Some(Self::UInt),
            gtype::DOUBLE => Some(Self::Double),
            gtype::OBJECT => Some(Self::Object),
            _ => None,
        }
    }

    /// Guesses the kind of a property from its name.
    ///
    /// Only a small table of well-known property names is recognized.
    pub fn infer_for_property(name: &str) -> Option<Self> {
        match name {
            "active" | "visible" | "sensitive" | "modal" | "hide-on-close" => Some(Self::Bool),
            "selected" | "width" | "height" => Some(Self::UInt),
            "title" | "subtitle" | "icon-name" => Some(Self::String),
            _ => None,
        }
    }

    /// Like [`infer_for_property`](Self::infer_for_property), but falls back
    /// to [`ValueKind::Object`] with a warning for unknown names.
    pub fn for_property(name: &str) -> Self {
        Self::infer_for_property(name).unwrap_or_else(|| {
            tracing::warn!(
                target: "gobridge_core::property",
                property = name,
                "no kind known for property; reading it as an object"
            );
            Self::Object
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Double => "double",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// A dynamically typed value crossing the bridge.
///
/// `Object` carries a borrowed pointer: reading an object property does not
/// add a reference. Wrap it in an `ObjectHandle` to keep it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    String(String),
    Bool(bool),
    Int(i32),
    UInt(u32),
    Double(f64),
    Object(NativeHandle),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::None => ValueKind::Absent,
            Self::String(_) => ValueKind::String,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::UInt(_) => ValueKind::UInt,
            Self::Double(_) => ValueKind::Double,
            Self::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<NativeHandle> {
        match self {
            Self::Object(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NativeHandle> for Value {
    fn from(v: NativeHandle) -> Self {
        Self::Object(v)
    }
}

/// The concrete type to initialize a buffer with when storing `value`.
///
/// Object values use the instance's own type so that the buffer is
/// compatible with the property it is written to.
fn storage_type(lib: &GObjectLib, value: &Value) -> Result<GType, MarshalError> {
    match value {
        Value::Object(handle) => Ok(lib.instance_type(*handle).unwrap_or(gtype::OBJECT)),
        other => other.kind().fundamental_type().ok_or(MarshalError::UnsetKind),
    }
}

/// Writes `value` into an initialized buffer.
///
/// # Safety
///
/// `raw` must point to a buffer initialized with a type compatible with
/// `value`'s kind.
pub(crate) unsafe fn store_raw(
    lib: &GObjectLib,
    raw: *mut GValue,
    value: &Value,
) -> Result<(), MarshalError> {
    // SAFETY: the caller guarantees `raw` is initialized for this kind.
    unsafe {
        match value {
            Value::None => return Err(MarshalError::UnsetKind),
            Value::String(s) => {
                let native = to_native_string(s)?;
                // Copies the string.
                (lib.g_value_set_string)(raw, native.as_ptr());
            }
            Value::Bool(v) => (lib.g_value_set_boolean)(raw, GBoolean::from(*v)),
            Value::Int(v) => (lib.g_value_set_int)(raw, *v),
            Value::UInt(v) => (lib.g_value_set_uint)(raw, *v),
            Value::Double(v) => (lib.g_value_set_double)(raw, *v),
            Value::Object(handle) => (lib.g_value_set_object)(raw, handle.as_ptr()),
        }
    }
    Ok(())
}

/// Reads an initialized buffer as `kind`.
///
/// # Safety
///
/// `raw` must point to a buffer initialized with a type holding `kind`.
unsafe fn load_raw(lib: &GObjectLib, raw: *const GValue, kind: ValueKind) -> Value {
    // SAFETY: the caller guarantees the buffer holds `kind`.
    unsafe {
        match kind {
            ValueKind::Absent => Value::None,
            ValueKind::String => Value::String(from_native_string((lib.g_value_get_string)(raw))),
            ValueKind::Bool => Value::Bool((lib.g_value_get_boolean)(raw).is_true()),
            ValueKind::Int => Value::Int((lib.g_value_get_int)(raw)),
            ValueKind::UInt => Value::UInt((lib.g_value_get_uint)(raw)),
            ValueKind::Double => Value::Double((lib.g_value_get_double)(raw)),
            ValueKind::Object => Value::Object(NativeHandle::from_ptr((lib.g_value_get_object)(raw))),
        }
    }
}

/// Decodes an arbitrary initialized buffer by its fundamental type.
///
/// Returns `None` for types that have no [`Value`] representation.
///
/// # Safety
///
/// `raw` must point to an initialized buffer.
pub(crate) unsafe fn decode_raw(lib: &GObjectLib, raw: *const GValue) -> Option<Value> {
    // SAFETY: the buffer is initialized per the caller contract.
    let g_type = unsafe { (*raw).g_type };
    let kind = ValueKind::from_fundamental(lib.fundamental(g_type))?;
    Some(unsafe { load_raw(lib, raw, kind) })
}

/// An initialized `GValue` that is unset on drop.
pub struct BoxedValue<'a> {
    lib: &'a GObjectLib,
    kind: ValueKind,
    raw: GValue,
}

impl<'a> BoxedValue<'a> {
    /// Initializes a buffer for `kind`.
    pub fn new(lib: &'a GObjectLib, kind: ValueKind) -> Result<Self, MarshalError> {
        let g_type = kind.fundamental_type().ok_or(MarshalError::UnsetKind)?;
        Ok(Self::init(lib, kind, g_type))
    }

    /// Initializes a buffer holding `value`.
    pub fn from_value(lib: &'a GObjectLib, value: &Value) -> Result<Self, MarshalError> {
        let mut boxed = Self::init(lib, value.kind(), storage_type(lib, value)?);
        boxed.set(value)?;
        Ok(boxed)
    }

    fn init(lib: &'a GObjectLib, kind: ValueKind, g_type: GType) -> Self {
        let mut raw = GValue::zeroed();
        // SAFETY: `raw` is zeroed, as g_value_init requires.
        unsafe { (lib.g_value_init)(&mut raw, g_type) };
        Self { lib, kind, raw }
    }

    /// The kind this buffer was initialized for.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// The type this buffer was initialized with.
    pub fn g_type(&self) -> GType {
        self.raw.g_type
    }

    /// Stores `value`, which must be of this buffer's kind.
    pub fn set(&mut self, value: &Value) -> Result<(), MarshalError> {
        if value.kind() != self.kind {
            return Err(MarshalError::KindMismatch {
                expected: self.kind,
                found: value.kind(),
            });
        }
        // SAFETY: the buffer was initialized for `self.kind`.
        unsafe { store_raw(self.lib, &mut self.raw, value) }
    }

    /// Reads the stored value.
    pub fn get(&self) -> Value {
        // SAFETY: the buffer was initialized for `self.kind`.
        unsafe { load_raw(self.lib, &self.raw, self.kind) }
    }

    pub fn as_ptr(&self) -> *const GValue {
        &self.raw
    }

    pub fn as_mut_ptr(&mut self) -> *mut GValue {
        &mut self.raw
    }
}

impl Drop for BoxedValue<'_> {
    fn drop(&mut self) {
        // SAFETY: the buffer was initialized in `init`.
        unsafe { (self.lib.g_value_unset)(&mut self.raw) };
    }
}

impl fmt::Debug for BoxedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedValue")
            .field("kind", &self.kind)
            .field("g_type", &self.raw.g_type)
            .finish()
    }
}

/// A contiguous array of initialized `GValue`s, each unset on drop.
pub struct BoxedArray<'a> {
    lib: &'a GObjectLib,
    values: Vec<GValue>,
}

impl<'a> BoxedArray<'a> {
    pub fn new(lib: &'a GObjectLib) -> Self {
        Self {
            lib,
            values: Vec::new(),
        }
    }

    /// Boxes every value in order.
    pub fn from_values<'v, I>(lib: &'a GObjectLib, values: I) -> Result<Self, MarshalError>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let mut array = Self::new(lib);
        for value in values {
            array.push(value)?;
        }
        Ok(array)
    }

    /// Appends a buffer holding `value`.
    pub fn push(&mut self, value: &Value) -> Result<(), MarshalError> {
        let g_type = storage_type(self.lib, value)?;
        let mut raw = GValue::zeroed();
        // SAFETY: `raw` is zeroed, then initialized for the value's type.
        unsafe {
            (self.lib.g_value_init)(&mut raw, g_type);
            if let Err(err) = store_raw(self.lib, &mut raw, value) {
                (self.lib.g_value_unset)(&mut raw);
                return Err(err);
            }
        }
        self.values.push(raw);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_ptr(&self) -> *const GValue {
        self.values.as_ptr()
    }
}

impl Drop for BoxedArray<'_> {
    fn drop(&mut self) {
        for raw in &mut self.values {
            // SAFETY: every element was initialized in `push`.
            unsafe { (self.lib.g_value_unset)(raw) };
        }
    }
}
