//! Cross-boundary marshalling
//!
//! Values cross into the renderer as transient raw memory:
//!
//! - scalars go by value
//! - strings go as a NUL-terminated UTF-8 pointer valid for the call only
//! - structs go as a packed fixed-layout blob (an RGBA color is 4 `f32`s)
//! - arrays go as a pointer to densely packed `f32`s with no count and no
//!   terminator; the count is implied by the channel (see
//!   [`ArrayChannel::array_size`])
//!
//! A null pointer on read means "no value" and maps to the type's default.
//!
//! **Element counts are not checked by the wire.** If the writer and the
//! reader disagree on a channel's size, the reader walks off the end of the
//! writer's buffer. Every array write in this crate is therefore padded or
//! truncated to the registry size, and a mismatch trips a debug assertion.
//!
//! All pointer reads in the crate go through this module.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::channel::ArrayChannel;

/// RGBA color passed as 4 packed `f32`s
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct RgbaColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl RgbaColor {
    /// Size of the wire blob in bytes
    pub const WIRE_SIZE: usize = 16;

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Pack into the positional wire layout (native endianness)
    pub fn to_wire(self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        for (i, component) in [self.r, self.g, self.b, self.a].iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&component.to_ne_bytes());
        }
        out
    }

    /// Unpack from the positional wire layout
    pub fn from_wire(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        let component = |i: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            f32::from_ne_bytes(raw)
        };
        Self::new(component(0), component(1), component(2), component(3))
    }
}

// The wire layout has no padding.
const _: () = assert!(std::mem::size_of::<RgbaColor>() == RgbaColor::WIRE_SIZE);

/// Reconcile the element count a caller produced with the registry size.
///
/// A mismatch is a caller bug: debug builds panic, release builds log and
/// fall back to the smaller of the two.
pub fn checked_count(channel: ArrayChannel, actual: usize) -> usize {
    let expected = channel.array_size();
    debug_assert_eq!(
        actual, expected,
        "array channel {:?} expects {} elements, got {}",
        channel, expected, actual
    );
    if actual != expected {
        warn!(
            ?channel,
            expected, actual, "array element count mismatch, clamping"
        );
    }
    actual.min(expected)
}

/// Owns a NUL-terminated copy of a string for the duration of one call
pub struct TransientString {
    inner: CString,
}

impl TransientString {
    /// Interior NULs cannot cross the boundary; the string is cut at the first one.
    pub fn new(value: &str) -> Self {
        let inner = match CString::new(value) {
            Ok(s) => s,
            Err(e) => {
                let cut = e.nul_position();
                warn!(position = cut, "string contains interior NUL, truncating");
                let mut bytes = e.into_vec();
                bytes.truncate(cut);
                // No NUL remains after truncation.
                CString::new(bytes).unwrap_or_default()
            }
        };
        Self { inner }
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.inner.as_ptr()
    }
}

/// Owns a fixed-layout struct for the duration of one call
pub struct TransientStruct<T> {
    inner: Box<T>,
}

impl<T> TransientStruct<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    pub fn as_ptr(&self) -> *const c_void {
        &*self.inner as *const T as *const c_void
    }
}

/// Owns a registry-sized `f32` buffer for the duration of one call
pub struct TransientArray {
    channel: ArrayChannel,
    values: Vec<f32>,
}

impl TransientArray {
    /// Copy `values` into a buffer of exactly `channel.array_size()` elements.
    ///
    /// Short input is zero-padded and long input truncated so the reader
    /// never reads past the buffer, whatever the caller passed.
    pub fn new(channel: ArrayChannel, values: &[f32]) -> Self {
        let count = checked_count(channel, values.len());
        let mut buffer = vec![0.0; channel.array_size()];
        buffer[..count].copy_from_slice(&values[..count]);
        Self {
            channel,
            values: buffer,
        }
    }

    pub fn channel(&self) -> ArrayChannel {
        self.channel
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_ptr(&self) -> *const f32 {
        self.values.as_ptr()
    }
}

/// Copy a transient C string out. Null reads as `""`; invalid UTF-8 is replaced.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated buffer valid for this call.
pub unsafe fn read_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Copy a transient C string out, `None` when the pointer is null.
///
/// # Safety
/// Same as [`read_string`].
pub unsafe fn read_optional_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(read_string(ptr))
    }
}

/// Copy a fixed-layout struct out. Null reads as `T::default()`.
///
/// # Safety
/// `ptr` must be null or point to a readable `T` (alignment not required).
pub unsafe fn read_struct<T: Copy + Default>(ptr: *const c_void) -> T {
    if ptr.is_null() {
        return T::default();
    }
    ptr::read_unaligned(ptr as *const T)
}

/// Copy `count` densely packed `f32`s out. Null reads as an empty vector.
///
/// # Safety
/// `ptr` must be null or point to at least `count` readable `f32`s.
pub unsafe fn read_array(ptr: *const f32, count: usize) -> Vec<f32> {
    if ptr.is_null() || count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(ptr::read_unaligned(ptr.add(i)));
    }
    out
}

/// Copy an array channel out using the registry size.
///
/// # Safety
/// `ptr` must be null or point to at least `channel.array_size()` readable `f32`s.
pub unsafe fn read_array_channel(channel: ArrayChannel, ptr: *const f32) -> Vec<f32> {
    read_array(ptr, channel.array_size())
}

/// Copy as many of `values` as fit into a caller-provided buffer of
/// `capacity` elements. Returns the number of elements written.
///
/// # Safety
/// `out` must be null or point to `capacity` writable `f32`s.
pub unsafe fn write_array(values: &[f32], out: *mut f32, capacity: usize) -> usize {
    if out.is_null() {
        return 0;
    }
    let count = values.len().min(capacity);
    ptr::copy_nonoverlapping(values.as_ptr(), out, count);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 * 0.25 - 3.0).collect()
    }

    #[test]
    fn test_array_round_trip_for_registry_sizes() {
        for channel in [
            ArrayChannel::EyeGaze,
            ArrayChannel::BodyRotation,
            ArrayChannel::HeadTransform,
            ArrayChannel::PerfectSync,
        ] {
            let values = sample(channel.array_size());
            let payload = TransientArray::new(channel, &values);
            assert_eq!(payload.len(), channel.array_size());

            let read = unsafe { read_array_channel(channel, payload.as_ptr()) };
            assert_eq!(read, values);
        }
    }

    #[test]
    fn test_registry_sizes_used_for_round_trip() {
        let sizes: Vec<usize> = [
            ArrayChannel::EyeGaze,
            ArrayChannel::BodyRotation,
            ArrayChannel::HeadTransform,
            ArrayChannel::PerfectSync,
        ]
        .iter()
        .map(|c| c.array_size())
        .collect();
        assert_eq!(sizes, vec![2, 6, 13, 61]);
    }

    #[test]
    fn test_null_pointers_read_as_defaults() {
        unsafe {
            assert_eq!(read_string(ptr::null()), "");
            assert_eq!(read_optional_string(ptr::null()), None);
            assert_eq!(read_struct::<RgbaColor>(ptr::null()), RgbaColor::default());
            assert!(read_array(ptr::null(), 13).is_empty());
            assert!(read_array_channel(ArrayChannel::PerfectSync, ptr::null()).is_empty());
            assert_eq!(write_array(&[1.0], ptr::null_mut(), 1), 0);
        }
    }

    #[test]
    fn test_string_round_trip() {
        let owner = TransientString::new("browDownLeft");
        let read = unsafe { read_string(owner.as_ptr()) };
        assert_eq!(read, "browDownLeft");

        let owner = TransientString::new("日本語");
        assert_eq!(unsafe { read_string(owner.as_ptr()) }, "日本語");
    }

    #[test]
    fn test_string_with_interior_nul_is_truncated() {
        let owner = TransientString::new("motion\0tail");
        assert_eq!(unsafe { read_string(owner.as_ptr()) }, "motion");
    }

    #[test]
    fn test_color_struct_round_trip() {
        let color = RgbaColor::new(0.1, 0.2, 0.3, 1.0);
        let owner = TransientStruct::new(color);
        let read: RgbaColor = unsafe { read_struct(owner.as_ptr()) };
        assert_eq!(read, color);

        let bytes = color.to_wire();
        assert_eq!(RgbaColor::from_wire(&bytes), color);
        assert_eq!(&bytes[..4], &0.1f32.to_ne_bytes());
        assert_eq!(&bytes[12..], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn test_write_array_clamps_to_capacity() {
        let values = sample(13);
        let mut out = [0.0f32; 4];
        let written = unsafe { write_array(&values, out.as_mut_ptr(), out.len()) };
        assert_eq!(written, 4);
        assert_eq!(&out[..], &values[..4]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "expects 13 elements")]
    fn test_count_mismatch_is_a_contract_violation() {
        TransientArray::new(ArrayChannel::HeadTransform, &[1.0, 2.0]);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_count_mismatch_pads_in_release() {
        let payload = TransientArray::new(ArrayChannel::HeadTransform, &[1.0, 2.0]);
        let read = unsafe { read_array_channel(ArrayChannel::HeadTransform, payload.as_ptr()) };
        assert_eq!(read.len(), 13);
        assert_eq!(&read[..2], &[1.0, 2.0]);
        assert!(read[2..].iter().all(|v| *v == 0.0));
    }
}
