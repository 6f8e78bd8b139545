//! Small utilities shared across the crate.

use std::ffi::{c_char, CStr};

/// Wrap a possibly-null C string pointer into an owned `String`.
/// # Safety
/// `s` must be null or point to a valid null-terminated string.
pub unsafe fn wrap_c_str(s: *const c_char) -> String {
    if s.is_null() {
        String::default()
    } else {
        CStr::from_ptr(s).to_string_lossy().into_owned()
    }
}

/// Reinterpret a sized value as its raw bytes. Used for push constant uploads.
/// # Safety
/// `T` must be a `#[repr(C)]` type without padding-dependent semantics.
pub unsafe fn as_byte_slice<T: Sized>(value: &T) -> &[u8] {
    std::slice::from_raw_parts((value as *const T) as *const u8, std::mem::size_of::<T>())
}
