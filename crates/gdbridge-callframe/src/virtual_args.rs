//! Unpacking arguments the engine passes to a virtual override, and packing
//! the override's result back.
//!
//! The engine passes arguments the same way the host passes them on a pointer
//! call: an array of pointers, one per argument. Handle arguments are borrowed
//! for the duration of the override; handle results are relinquished to the
//! engine.

use std::ffi::c_void;
use std::sync::Arc;

use gdbridge_core::values::{
    Aabb, Basis, Color, Plane, Projection, Quaternion, Rect2, Rect2i, Rid, Transform2D, Transform3D,
    Vector2, Vector2i, Vector3, Vector3i, Vector4, Vector4i,
};
use gdbridge_core::{
    ArgPtrs, Array, Callable, Dictionary, GString, HandleTable, NodePath, ObjectHandle,
    PackedByteArray, PackedColorArray, PackedFloat32Array, PackedFloat64Array, PackedInt32Array,
    PackedInt64Array, PackedStringArray, PackedVector2Array, PackedVector3Array, PackedVector4Array,
    Payload, RawHandle, Signal, StringName, Variant, borrow_from_native,
};

use crate::codec::{Decode, Encode};

/// One argument of a virtual override.
pub trait FromArg: Sized {
    /// # Safety
    /// `src` must point to an encoded value of this type.
    unsafe fn from_arg(src: *const c_void, table: &Arc<HandleTable>) -> Self;
}

/// Result of a virtual override.
pub trait IntoRet {
    /// Bytes written into the native return slot.
    const RET_BYTES: usize;

    /// # Safety
    /// `dst` must be valid for `RET_BYTES` bytes of writes.
    unsafe fn into_ret(self, dst: *mut c_void);
}

/// The full argument list of a virtual override, as a tuple.
pub trait ArgList: Sized {
    const ARITY: usize;

    /// # Safety
    /// `args` must hold `ARITY` pointers to encoded values of the tuple's types.
    unsafe fn unpack(args: ArgPtrs, table: &Arc<HandleTable>) -> Self;
}

/// Read argument `index` of a native argument array.
///
/// # Safety
/// `args` must hold more than `index` pointers and the pointer at `index` must
/// point to an encoded `T`.
pub unsafe fn arg_at<T: Decode>(args: ArgPtrs, index: usize) -> T {
    unsafe { T::decode(*args.add(index)) }
}

/// Write a result into a native return slot.
///
/// # Safety
/// `ret` must be valid for `T::WIDTH` bytes of writes.
pub unsafe fn set_ret<T: Encode>(ret: *mut c_void, value: T) {
    unsafe { value.encode(ret) }
}

impl IntoRet for () {
    const RET_BYTES: usize = 0;

    unsafe fn into_ret(self, _dst: *mut c_void) {}
}

macro_rules! impl_plain_arg {
    ($($ty:ty),*) => {$(
        impl FromArg for $ty {
            unsafe fn from_arg(src: *const c_void, _table: &Arc<HandleTable>) -> Self {
                unsafe { <$ty as Decode>::decode(src) }
            }
        }

        impl IntoRet for $ty {
            const RET_BYTES: usize = <$ty as Encode>::WIDTH;

            unsafe fn into_ret(self, dst: *mut c_void) {
                unsafe { self.encode(dst) }
            }
        }
    )*};
}

impl_plain_arg!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, Vector2, Vector2i,
    Vector3, Vector3i, Vector4, Vector4i, Rect2, Rect2i, Transform2D, Plane, Quaternion, Aabb,
    Basis, Transform3D, Projection, Color, Rid
);

/// Borrow a handle argument of payload type `P`.
///
/// # Safety
/// `src` must point to the wire words of a `P::KIND` value.
pub unsafe fn borrow_arg<P: Payload>(src: *const c_void, table: &Arc<HandleTable>) -> P {
    let raw = unsafe { RawHandle::read_wire(P::KIND, src as *const u8) };
    P::from_handle(borrow_from_native(table, raw))
}

/// Relinquish a handle result of payload type `P` to the engine.
///
/// # Safety
/// `dst` must be valid for `P::KIND.wire_bytes()` bytes of writes.
pub unsafe fn relinquish_ret<P: Payload>(value: P, dst: *mut c_void) {
    match value.into_handle().end() {
        Some(raw) => unsafe { raw.write_wire(dst as *mut u8) },
        None => unsafe { std::ptr::write_bytes(dst as *mut u8, 0, P::KIND.wire_bytes()) },
    }
}

/// Implement [`FromArg`] and [`IntoRet`] for a type wrapping one handle
/// through [`Payload`].
#[macro_export]
macro_rules! impl_virtual_payload {
    ($($ty:ty),*) => {$(
        impl $crate::virtual_args::FromArg for $ty {
            unsafe fn from_arg(
                src: *const ::std::ffi::c_void,
                table: &::std::sync::Arc<$crate::__private::HandleTable>,
            ) -> Self {
                unsafe { $crate::virtual_args::borrow_arg::<$ty>(src, table) }
            }
        }

        impl $crate::virtual_args::IntoRet for $ty {
            const RET_BYTES: usize =
                <$ty as $crate::__private::Payload>::KIND.wire_bytes();

            unsafe fn into_ret(self, dst: *mut ::std::ffi::c_void) {
                unsafe { $crate::virtual_args::relinquish_ret(self, dst) }
            }
        }
    )*};
}

impl_virtual_payload!(
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

/// A null pointer arrives as `None`.
impl<P: Payload> FromArg for Option<P> {
    unsafe fn from_arg(src: *const c_void, table: &Arc<HandleTable>) -> Self {
        let raw = unsafe { RawHandle::read_wire(P::KIND, src as *const u8) };
        if raw.is_null() {
            None
        } else {
            Some(P::from_handle(borrow_from_native(table, raw)))
        }
    }
}

impl<P: Payload> IntoRet for Option<P> {
    const RET_BYTES: usize = P::KIND.wire_bytes();

    unsafe fn into_ret(self, dst: *mut c_void) {
        match self {
            Some(value) => unsafe { relinquish_ret(value, dst) },
            None => unsafe { std::ptr::write_bytes(dst as *mut u8, 0, P::KIND.wire_bytes()) },
        }
    }
}

macro_rules! impl_arg_list {
    ($count:expr; $($ty:ident $idx:tt),*) => {
        impl<$($ty: FromArg),*> ArgList for ($($ty,)*) {
            const ARITY: usize = $count;

            #[allow(unused_variables)]
            unsafe fn unpack(args: ArgPtrs, table: &Arc<HandleTable>) -> Self {
                unsafe { ($($ty::from_arg(*args.add($idx), table),)*) }
            }
        }
    };
}

impl_arg_list!(0;);
impl_arg_list!(1; A 0);
impl_arg_list!(2; A 0, B 1);
impl_arg_list!(3; A 0, B 1, C 2);
impl_arg_list!(4; A 0, B 1, C 2, D 3);
impl_arg_list!(5; A 0, B 1, C 2, D 3, E 4);
impl_arg_list!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_arg_list!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_arg_list!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
impl_arg_list!(9; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
impl_arg_list!(10; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
