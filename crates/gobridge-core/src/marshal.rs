//! String and string-array marshaling.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char};
use std::ptr;

use crate::error::MarshalError;

/// Converts a Rust string into a NUL-terminated native string.
pub fn to_native_string(value: &str) -> Result<CString, MarshalError> {
    CString::new(value).map_err(|err| MarshalError::InteriorNul {
        position: err.nul_position(),
    })
}

/// Reads a native string. Null yields an empty string; invalid UTF-8 is
/// replaced lossily.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
pub unsafe fn from_native_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: non-null and NUL-terminated per the caller contract.
    let raw = unsafe { CStr::from_ptr(ptr) };
    match raw.to_string_lossy() {
        Cow::Borrowed(s) => s.to_owned(),
        Cow::Owned(s) => s,
    }
}

/// A NULL-terminated `char**` array that owns its strings.
///
/// The pointer returned by [`as_ptr`](Self::as_ptr) is valid while the array
/// is alive.
#[derive(Debug)]
pub struct StringArray {
    // Kept alive for `pointers`.
    _strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl StringArray {
    /// Marshals `items` into a new array.
    pub fn new<I, S>(items: I) -> Result<Self, MarshalError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let strings = items
            .into_iter()
            .map(|item| to_native_string(item.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let pointers = strings
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();
        Ok(Self {
            _strings: strings,
            pointers,
        })
    }

    /// The `char**` pointer.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    /// Number of strings, excluding the terminator.
    pub fn len(&self) -> usize {
        self.pointers.len() - 1
    }

    /// Whether the array holds no strings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a NULL-terminated native string array.
    ///
    /// # Safety
    ///
    /// `array` must be null or point to a NULL-terminated array of valid
    /// NUL-terminated strings.
    pub unsafe fn decode(array: *const *const c_char) -> Vec<String> {
        let mut out = Vec::new();
        if array.is_null() {
            return out;
        }
        let mut cursor = array;
        // SAFETY: the array is NULL-terminated per the caller contract.
        unsafe {
            while !(*cursor).is_null() {
                out.push(from_native_string(*cursor));
                cursor = cursor.add(1);
            }
        }
        out
    }
}

/// Marshals `items` into a `char**` array, calls `f` with it, and frees the
/// array after `f` returns.
pub fn with_string_array<I, S, F, R>(items: I, f: F) -> Result<R, MarshalError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: FnOnce(*const *const c_char) -> R,
{
    let array = StringArray::new(items)?;
    Ok(f(array.as_ptr()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interior_nul_rejected() {
        assert_eq!(
            to_native_string("ab\0c").unwrap_err(),
            MarshalError::InteriorNul { position: 2 }
        );
    }

    #[test]
    fn test_null_string_is_empty() {
        assert_eq!(unsafe { from_native_string(ptr::null()) }, "");
    }

    #[test]
    fn test_non_ascii_round_trip() {
        let native = to_native_string("Grüße, 世界").unwrap();
        assert_eq!(unsafe { from_native_string(native.as_ptr()) }, "Grüße, 世界");
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let bytes = b"ok\xff\0";
        let text = unsafe { from_native_string(bytes.as_ptr().cast()) };
        assert_eq!(text, "ok\u{fffd}");
    }

    #[test]
    fn test_string_array_is_null_terminated() {
        let array = StringArray::new(["a", "b", "c"]).unwrap();
        assert_eq!(array.len(), 3);

        let raw = array.as_ptr();
        unsafe {
            assert!((*raw.add(3)).is_null());
            assert_eq!(CStr::from_ptr(*raw.add(1)).to_str().unwrap(), "b");
        }
        assert_eq!(unsafe { StringArray::decode(raw) }, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_string_array() {
        let array = StringArray::new(Vec::<String>::new()).unwrap();
        assert!(array.is_empty());
        assert!(unsafe { *array.as_ptr() }.is_null());
        assert!(unsafe { StringArray::decode(ptr::null()) }.is_empty());
    }

    #[test]
    fn test_with_string_array_scopes_strings() {
        let count = with_string_array(["<Control>q", "<Control>w"], |raw| unsafe {
            StringArray::decode(raw).len()
        })
        .unwrap();
        assert_eq!(count, 2);

        assert!(with_string_array(["bad\0"], |_| ()).is_err());
    }
}
