//! Dynamic symbol tables.
//!
//! A symbol table is a struct of typed `unsafe extern "C" fn` pointers,
//! resolved by name from one shared library when the table is constructed.
//! Tables are declared with [`native_library!`](crate::native_library), which
//! also records the signature of every entry as a list of [`FfiKind`]s so the
//! declared ABI can be inspected at runtime.
//!
//! # Example
//!
//! ```ignore
//! use std::ffi::{c_char, c_void};
//! use gobridge_core::native_library;
//! use gobridge_core::symbols::GBoolean;
//!
//! native_library! {
//!     /// A tiny slice of GTK.
//!     pub struct MiniGtk("gtk-4") {
//!         fn gtk_init();
//!         fn gtk_label_new(text: *const c_char) -> *mut c_void;
//!         optional {
//!             fn gtk_is_initialized() -> GBoolean;
//!         }
//!     }
//! }
//!
//! let gtk = MiniGtk::load("libgtk-4.so.1")?;
//! unsafe { (gtk.gtk_init)() };
//! if let Some(is_initialized) = gtk.gtk_is_initialized {
//!     assert!(unsafe { is_initialized() }.is_true());
//! }
//! ```
//!
//! Required symbols that cannot be resolved make construction fail with
//! [`LoadError::MissingSymbol`]; optional ones become `None`.

use std::ffi::{c_int, c_void};
use std::mem;
use std::ptr::NonNull;

use libloading::Library;

use crate::error::LoadError;

/// The closed set of argument and return kinds a native entry point may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfiKind {
    /// No value (return position only).
    Void,
    /// A C `gboolean` (an `int` that is zero or non-zero).
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// An opaque pointer owned or managed by the native side.
    Pointer,
    /// A pointer to a caller-owned buffer borrowed for the duration of the call.
    Buffer,
    /// A pointer to a native-callable function.
    Function,
}

/// Maps a Rust FFI type to its [`FfiKind`].
pub trait NativeType {
    /// The kind this type is passed as.
    const KIND: FfiKind;
}

macro_rules! impl_native_type {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl NativeType for $ty {
                const KIND: FfiKind = FfiKind::$kind;
            }
        )*
    };
}

impl_native_type! {
    () => Void,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl NativeType for usize {
    const KIND: FfiKind = if mem::size_of::<usize>() == 8 {
        FfiKind::U64
    } else {
        FfiKind::U32
    };
}

impl NativeType for isize {
    const KIND: FfiKind = if mem::size_of::<isize>() == 8 {
        FfiKind::I64
    } else {
        FfiKind::I32
    };
}

impl<T> NativeType for *mut T {
    const KIND: FfiKind = FfiKind::Pointer;
}

impl<T> NativeType for *const T {
    const KIND: FfiKind = FfiKind::Buffer;
}

macro_rules! impl_native_callback {
    ($($arg:ident),*) => {
        impl<R, $($arg),*> NativeType for Option<unsafe extern "C" fn($($arg),*) -> R> {
            const KIND: FfiKind = FfiKind::Function;
        }
    };
}

impl_native_callback!();
impl_native_callback!(A);
impl_native_callback!(A, B);
impl_native_callback!(A, B, C);
impl_native_callback!(A, B, C, D);
impl_native_callback!(A, B, C, D, E);
impl_native_callback!(A, B, C, D, E, F);

/// A C `gboolean`: an `int` where any non-zero value is true.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GBoolean(pub c_int);

impl GBoolean {
    /// `TRUE`.
    pub const TRUE: Self = Self(1);
    /// `FALSE`.
    pub const FALSE: Self = Self(0);

    /// Whether the value is non-zero.
    #[inline]
    pub fn is_true(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for GBoolean {
    fn from(value: bool) -> Self {
        if value { Self::TRUE } else { Self::FALSE }
    }
}

impl From<GBoolean> for bool {
    fn from(value: GBoolean) -> Self {
        value.is_true()
    }
}

impl NativeType for GBoolean {
    const KIND: FfiKind = FfiKind::Bool;
}

/// The declared ABI of one native entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolSignature {
    /// The exported symbol name.
    pub name: &'static str,
    /// Parameter kinds, in order.
    pub params: &'static [FfiKind],
    /// Return kind.
    pub result: FfiKind,
    /// Whether the table tolerates the symbol being absent.
    pub optional: bool,
}

/// Resolves a symbol address from an open library.
pub fn library_lookup(library: &Library, symbol: &str) -> Result<NonNull<c_void>, libloading::Error> {
    // SAFETY: the symbol is read as an untyped address; it is only cast to a
    // function pointer of the declared signature by the table constructor.
    let address = unsafe { library.get::<*mut c_void>(symbol.as_bytes())? };
    NonNull::new(*address).ok_or(libloading::Error::DlSymUnknown)
}

/// Reinterprets a resolved symbol address as a typed function pointer.
///
/// # Safety
///
/// `F` must be a function pointer type whose signature matches the native
/// definition of the symbol at `address`.
#[doc(hidden)]
pub unsafe fn cast_symbol<F: Copy>(address: NonNull<c_void>) -> F {
    static_assertions::assert_eq_size!(*mut c_void, unsafe extern "C" fn());
    assert_eq!(mem::size_of::<F>(), mem::size_of::<*mut c_void>());
    // SAFETY: sizes match (checked above) and the caller guarantees the
    // signature.
    unsafe { mem::transmute_copy::<*mut c_void, F>(&address.as_ptr()) }
}

/// Keeps a loaded shared library mapped for as long as a table refers to it.
pub type LibraryHandle = std::sync::Arc<Library>;

/// Opens a library for a symbol table.
#[doc(hidden)]
pub fn open_library(path: &std::ffi::OsStr) -> Result<LibraryHandle, LoadError> {
    // SAFETY: loading runs the library's initializers; the GNOME libraries
    // have no initialization routines with preconditions.
    let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Open {
        path: path.into(),
        source,
    })?;
    Ok(std::sync::Arc::new(library))
}

/// Declares a native symbol table.
///
/// See the [module documentation](crate::symbols) for an example.
#[macro_export]
macro_rules! native_library {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident($lib:literal) {
            $(
                $(#[$req_meta:meta])*
                fn $req:ident($($req_arg:ident: $req_ty:ty),* $(,)?) $(-> $req_ret:ty)?;
            )*
            optional {
                $(
                    $(#[$opt_meta:meta])*
                    fn $opt:ident($($opt_arg:ident: $opt_ty:ty),* $(,)?) $(-> $opt_ret:ty)?;
                )*
            }
        }
    ) => {
        $(#[$meta])*
        #[allow(non_snake_case)]
        $vis struct $name {
            $(
                $(#[$req_meta])*
                pub $req: unsafe extern "C" fn($($req_ty),*) $(-> $req_ret)?,
            )*
            $(
                $(#[$opt_meta])*
                pub $opt: ::std::option::Option<unsafe extern "C" fn($($opt_ty),*) $(-> $opt_ret)?>,
            )*
            /// Keeps the shared library mapped. `None` for tables assembled
            /// from in-process functions.
            pub library: ::std::option::Option<$crate::symbols::LibraryHandle>,
        }

        impl $name {
            /// Logical name of the library this table is loaded from.
            pub const NAME: &'static str = $lib;

            /// Declared signatures of every entry, required ones first.
            pub const SIGNATURES: &'static [$crate::symbols::SymbolSignature] = &[
                $(
                    $crate::symbols::SymbolSignature {
                        name: ::std::stringify!($req),
                        params: &[$(<$req_ty as $crate::symbols::NativeType>::KIND),*],
                        result: $crate::__native_result_kind!($($req_ret)?),
                        optional: false,
                    },
                )*
                $(
                    $crate::symbols::SymbolSignature {
                        name: ::std::stringify!($opt),
                        params: &[$(<$opt_ty as $crate::symbols::NativeType>::KIND),*],
                        result: $crate::__native_result_kind!($($opt_ret)?),
                        optional: true,
                    },
                )*
            ];

            /// Looks up the declared signature of an entry.
            pub fn signature(name: &str) -> ::std::option::Option<&'static $crate::symbols::SymbolSignature> {
                Self::SIGNATURES.iter().find(|signature| signature.name == name)
            }

            /// Opens the library at `path` and resolves every entry.
            pub fn load(
                path: impl ::std::convert::AsRef<::std::ffi::OsStr>,
            ) -> ::std::result::Result<Self, $crate::error::LoadError> {
                let path = path.as_ref();
                let library = $crate::symbols::open_library(path)?;
                let mut last_error = None;
                let mut table = Self::from_lookup(|symbol| {
                    match $crate::symbols::library_lookup(&library, symbol) {
                        Ok(address) => Some(address),
                        Err(err) => {
                            last_error = Some(err);
                            None
                        }
                    }
                })
                .map_err(|err| match err {
                    $crate::error::LoadError::MissingSymbol { library, symbol, .. } => {
                        $crate::error::LoadError::MissingSymbol {
                            library,
                            symbol,
                            source: last_error.take(),
                        }
                    }
                    other => other,
                })?;
                $crate::__tracing::info!(
                    target: "gobridge_core::loader",
                    library = $lib,
                    path = %path.to_string_lossy(),
                    "loaded native library"
                );
                table.library = Some(library);
                Ok(table)
            }

            /// Builds the table from an arbitrary symbol lookup.
            ///
            /// Every address returned by `lookup` must point to a function with
            /// the declared signature.
            pub fn from_lookup<L>(mut lookup: L) -> ::std::result::Result<Self, $crate::error::LoadError>
            where
                L: FnMut(&str) -> ::std::option::Option<::std::ptr::NonNull<::std::ffi::c_void>>,
            {
                Ok(Self {
                    $(
                        $req: match lookup(::std::stringify!($req)) {
                            // SAFETY: the lookup contract guarantees the signature.
                            Some(address) => unsafe { $crate::symbols::cast_symbol(address) },
                            None => {
                                return Err($crate::error::LoadError::MissingSymbol {
                                    library: $lib,
                                    symbol: ::std::stringify!($req),
                                    source: None,
                                });
                            }
                        },
                    )*
                    $(
                        $opt: match lookup(::std::stringify!($opt)) {
                            // SAFETY: the lookup contract guarantees the signature.
                            Some(address) => Some(unsafe { $crate::symbols::cast_symbol(address) }),
                            None => {
                                $crate::__tracing::debug!(
                                    target: "gobridge_core::loader",
                                    library = $lib,
                                    symbol = ::std::stringify!($opt),
                                    "optional symbol not available"
                                );
                                None
                            }
                        },
                    )*
                    library: None,
                })
            }

            /// Whether the named entry was resolved.
            pub fn is_available(&self, name: &str) -> bool {
                $(
                    if name == ::std::stringify!($req) {
                        return true;
                    }
                )*
                $(
                    if name == ::std::stringify!($opt) {
                        return self.$opt.is_some();
                    }
                )*
                false
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(::std::stringify!($name))
                    .field("library", &$lib)
                    .field("symbols", &Self::SIGNATURES.len())
                    .field("loaded", &self.library.is_some())
                    .finish()
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __native_result_kind {
    () => {
        $crate::symbols::FfiKind::Void
    };
    ($ty:ty) => {
        <$ty as $crate::symbols::NativeType>::KIND
    };
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::ffi::c_char;

    use super::*;

    unsafe extern "C" fn fake_add(a: i32, b: i32) -> i32 {
        a + b
    }

    unsafe extern "C" fn fake_is_ready() -> GBoolean {
        GBoolean::TRUE
    }

    unsafe extern "C" fn fake_log(_message: *const c_char) {}

    crate::native_library! {
        /// Table used by the tests below.
        struct FakeLib("fake") {
            fn fake_add(a: i32, b: i32) -> i32;
            fn fake_log(message: *const c_char);
            optional {
                fn fake_is_ready() -> GBoolean;
                fn fake_missing(object: *mut c_void) -> *mut c_void;
            }
        }
    }

    fn lookup_table() -> HashMap<&'static str, NonNull<c_void>> {
        let mut table = HashMap::new();
        table.insert("fake_add", NonNull::new(fake_add as *mut c_void).unwrap());
        table.insert("fake_log", NonNull::new(fake_log as *mut c_void).unwrap());
        table.insert("fake_is_ready", NonNull::new(fake_is_ready as *mut c_void).unwrap());
        table
    }

    #[test]
    fn test_signatures_record_kinds() {
        let add = FakeLib::signature("fake_add").unwrap();
        assert_eq!(add.params, &[FfiKind::I32, FfiKind::I32]);
        assert_eq!(add.result, FfiKind::I32);
        assert!(!add.optional);

        let log = FakeLib::signature("fake_log").unwrap();
        assert_eq!(log.params, &[FfiKind::Buffer]);
        assert_eq!(log.result, FfiKind::Void);

        let missing = FakeLib::signature("fake_missing").unwrap();
        assert_eq!(missing.params, &[FfiKind::Pointer]);
        assert_eq!(missing.result, FfiKind::Pointer);
        assert!(missing.optional);

        assert_eq!(FakeLib::signature("fake_is_ready").unwrap().result, FfiKind::Bool);
        assert!(FakeLib::signature("nope").is_none());
        assert_eq!(FakeLib::SIGNATURES.len(), 4);
    }

    #[test]
    fn test_from_lookup_resolves_and_calls() {
        let table = lookup_table();
        let lib = FakeLib::from_lookup(|name| table.get(name).copied()).unwrap();

        assert_eq!(unsafe { (lib.fake_add)(2, 3) }, 5);
        let is_ready = lib.fake_is_ready.expect("optional symbol present");
        assert!(unsafe { is_ready() }.is_true());
        assert!(lib.fake_missing.is_none());
        assert!(lib.is_available("fake_add"));
        assert!(lib.is_available("fake_is_ready"));
        assert!(!lib.is_available("fake_missing"));
        assert!(lib.library.is_none());
    }

    #[test]
    fn test_missing_required_symbol_fails() {
        let mut table = lookup_table();
        table.remove("fake_log");

        let err = FakeLib::from_lookup(|name| table.get(name).copied()).unwrap_err();
        match err {
            LoadError::MissingSymbol { library, symbol, .. } => {
                assert_eq!(library, "fake");
                assert_eq!(symbol, "fake_log");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_nonexistent_library() {
        let err = FakeLib::load("/nonexistent/libgobridge-does-not-exist.so").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn test_native_type_kinds() {
        assert_eq!(<*mut c_void as NativeType>::KIND, FfiKind::Pointer);
        assert_eq!(<*const c_char as NativeType>::KIND, FfiKind::Buffer);
        assert_eq!(
            <Option<unsafe extern "C" fn(*mut c_void) -> GBoolean> as NativeType>::KIND,
            FfiKind::Function
        );
        assert_eq!(<f64 as NativeType>::KIND, FfiKind::F64);
        assert_eq!(<GBoolean as NativeType>::KIND, FfiKind::Bool);
    }

    #[test]
    fn test_gboolean_conversions() {
        assert!(GBoolean::from(true).is_true());
        assert!(!GBoolean::from(false).is_true());
        assert!(GBoolean(42).is_true());
        assert!(bool::from(GBoolean(-1)));
    }
}
