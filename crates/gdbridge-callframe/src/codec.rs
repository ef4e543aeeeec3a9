//! Encoding of host values into frame slots and back.
//!
//! Layout follows the engine's pointer-call convention:
//!
//! - Integers of every width travel as `i64`
//! - `f32` travels as `f64`
//! - `bool` is a single byte
//! - Builtin value types are copied with their `#[repr(C)]` layout
//! - Handles write their raw wire words, never the handle itself

use std::ffi::c_void;

use gdbridge_core::payload::MAX_WORDS;
use gdbridge_core::values::{
    Aabb, Basis, Color, Plane, Projection, Quaternion, Rect2, Rect2i, Rid, Transform2D, Transform3D,
    Vector2, Vector2i, Vector3, Vector3i, Vector4, Vector4i,
};
use gdbridge_core::{
    Array, Callable, Dictionary, GString, Handle, NodePath, ObjectHandle, PackedByteArray,
    PackedColorArray, PackedFloat32Array, PackedFloat64Array, PackedInt32Array, PackedInt64Array,
    PackedStringArray, PackedVector2Array, PackedVector3Array, PackedVector4Array, Payload, Signal,
    StringName, Variant,
};

/// A value that can be written into a slot.
pub trait Encode {
    /// Upper bound on the bytes `encode` writes.
    const WIDTH: usize;

    /// # Safety
    /// `dst` must be valid for `WIDTH` bytes of writes.
    unsafe fn encode(&self, dst: *mut c_void);
}

/// A value that can be read back out of a slot.
pub trait Decode: Sized {
    const WIDTH: usize;

    /// # Safety
    /// `src` must be valid for `WIDTH` bytes of reads holding an encoded value.
    unsafe fn decode(src: *const c_void) -> Self;
}

impl<T: Encode> Encode for &T {
    const WIDTH: usize = T::WIDTH;

    unsafe fn encode(&self, dst: *mut c_void) {
        unsafe { (**self).encode(dst) }
    }
}

/// `None` encodes as zeroed storage, which the engine reads as a null object.
impl<T: Encode> Encode for Option<T> {
    const WIDTH: usize = T::WIDTH;

    unsafe fn encode(&self, dst: *mut c_void) {
        match self {
            Some(value) => unsafe { value.encode(dst) },
            None => unsafe { std::ptr::write_bytes(dst as *mut u8, 0, T::WIDTH) },
        }
    }
}

impl Encode for () {
    const WIDTH: usize = 0;

    unsafe fn encode(&self, _dst: *mut c_void) {}
}

impl Decode for () {
    const WIDTH: usize = 0;

    unsafe fn decode(_src: *const c_void) -> Self {}
}

// ============================================================================
// Scalars
// ============================================================================

macro_rules! impl_int {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            const WIDTH: usize = 8;

            unsafe fn encode(&self, dst: *mut c_void) {
                unsafe { (dst as *mut i64).write_unaligned(*self as i64) }
            }
        }

        impl Decode for $ty {
            const WIDTH: usize = 8;

            unsafe fn decode(src: *const c_void) -> Self {
                unsafe { (src as *const i64).read_unaligned() as $ty }
            }
        }
    )*};
}

impl_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl Encode for f64 {
    const WIDTH: usize = 8;

    unsafe fn encode(&self, dst: *mut c_void) {
        unsafe { (dst as *mut f64).write_unaligned(*self) }
    }
}

impl Decode for f64 {
    const WIDTH: usize = 8;

    unsafe fn decode(src: *const c_void) -> Self {
        unsafe { (src as *const f64).read_unaligned() }
    }
}

impl Encode for f32 {
    const WIDTH: usize = 8;

    unsafe fn encode(&self, dst: *mut c_void) {
        unsafe { (dst as *mut f64).write_unaligned(f64::from(*self)) }
    }
}

impl Decode for f32 {
    const WIDTH: usize = 8;

    unsafe fn decode(src: *const c_void) -> Self {
        unsafe { (src as *const f64).read_unaligned() as f32 }
    }
}

impl Encode for bool {
    const WIDTH: usize = 1;

    unsafe fn encode(&self, dst: *mut c_void) {
        unsafe { (dst as *mut u8).write(u8::from(*self)) }
    }
}

impl Decode for bool {
    const WIDTH: usize = 1;

    unsafe fn decode(src: *const c_void) -> Self {
        unsafe { (src as *const u8).read() != 0 }
    }
}

// ============================================================================
// Builtin value types
// ============================================================================

macro_rules! impl_value {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            unsafe fn encode(&self, dst: *mut c_void) {
                unsafe { (dst as *mut $ty).write_unaligned(*self) }
            }
        }

        impl Decode for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            unsafe fn decode(src: *const c_void) -> Self {
                unsafe { (src as *const $ty).read_unaligned() }
            }
        }
    )*};
}

impl_value!(
    Vector2,
    Vector2i,
    Vector3,
    Vector3i,
    Vector4,
    Vector4i,
    Rect2,
    Rect2i,
    Transform2D,
    Plane,
    Quaternion,
    Aabb,
    Basis,
    Transform3D,
    Projection,
    Color,
    Rid
);

// ============================================================================
// Handles
// ============================================================================

impl Encode for Handle {
    const WIDTH: usize = MAX_WORDS * 8;

    unsafe fn encode(&self, dst: *mut c_void) {
        unsafe { self.get().write_wire(dst as *mut u8) }
    }
}

/// Implement [`Encode`] for a type wrapping one handle through [`Payload`].
#[macro_export]
macro_rules! impl_encode_payload {
    ($($ty:ty),*) => {$(
        impl $crate::codec::Encode for $ty {
            const WIDTH: usize =
                <$ty as $crate::__private::Payload>::KIND.wire_bytes();

            unsafe fn encode(&self, dst: *mut ::std::ffi::c_void) {
                let raw = $crate::__private::Payload::handle(self)
                    .get_as(<$ty as $crate::__private::Payload>::KIND);
                unsafe { raw.write_wire(dst as *mut u8) }
            }
        }
    )*};
}

impl_encode_payload!(
    ObjectHandle,
    GString,
    StringName,
    NodePath,
    Array,
    Dictionary,
    Callable,
    Signal,
    Variant,
    PackedByteArray,
    PackedInt32Array,
    PackedInt64Array,
    PackedFloat32Array,
    PackedFloat64Array,
    PackedStringArray,
    PackedVector2Array,
    PackedVector3Array,
    PackedColorArray,
    PackedVector4Array
);
