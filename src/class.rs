//! Typed wrappers for engine classes.
//!
//! Each engine class is a transparent newtype over [`ObjectHandle`], so every
//! class in a hierarchy has the same layout. Upcasting is a pointer cast
//! guarded by [`Inherits`], which only [`native_class!`](crate::native_class)
//! implements.

use gdbridge_core::{Handle, ObjectHandle, Payload, PayloadKind};

/// An engine class known at compile time.
pub trait NativeClass: Payload {
    const CLASS_NAME: &'static str;

    /// Ancestors, nearest first. Always ends with `Object`.
    const BASES: &'static [&'static str];

    /// Whether this class is `name` or derives from it.
    fn is_a(name: &str) -> bool {
        Self::CLASS_NAME == name || Self::BASES.contains(&name)
    }

    fn as_object(&self) -> &Object {
        Object::from_ref(self.handle())
    }
}

/// `Self` derives from `B`.
///
/// # Safety
/// `Self` and `B` must both be transparent wrappers around a single
/// [`ObjectHandle`], and the engine class of `Self` must derive from that of `B`.
pub unsafe trait Inherits<B: NativeClass>: NativeClass {
    fn upcast_ref(&self) -> &B {
        unsafe { &*(self as *const Self as *const B) }
    }

    fn upcast(self) -> B {
        B::from_handle(self.into_handle())
    }
}

/// Root of every engine class.
#[derive(Debug)]
#[repr(transparent)]
pub struct Object(ObjectHandle);

impl Object {
    /// View an object handle as an `Object` without moving it.
    pub fn from_ref(handle: &Handle) -> &Object {
        assert_eq!(
            handle.kind(),
            PayloadKind::Object,
            "handle of kind {:?} cannot be viewed as Object",
            handle.kind()
        );
        // Object -> ObjectHandle -> Handle are all transparent.
        unsafe { &*(handle as *const Handle as *const Object) }
    }
}

impl Payload for Object {
    const KIND: PayloadKind = PayloadKind::Object;

    fn from_handle(handle: Handle) -> Self {
        Object(ObjectHandle::from_handle(handle))
    }

    fn handle(&self) -> &Handle {
        self.0.handle()
    }

    fn into_handle(self) -> Handle {
        self.0.into_handle()
    }
}

impl NativeClass for Object {
    const CLASS_NAME: &'static str = "Object";
    const BASES: &'static [&'static str] = &[];
}

unsafe impl Inherits<Object> for Object {}

gdbridge_callframe::impl_encode_payload!(Object);
gdbridge_callframe::impl_virtual_payload!(Object);

/// Declare an engine class wrapper.
///
/// ```ignore
/// native_class!(pub struct Node2D: CanvasItem, Node);
/// ```
///
/// Bases are listed nearest first and must already be declared. `Object` is
/// implied.
#[macro_export]
macro_rules! native_class {
    ($(#[$meta:meta])* $vis:vis struct $name:ident $(: $($base:ident),+)?) => {
        $(#[$meta])*
        #[derive(Debug)]
        #[repr(transparent)]
        $vis struct $name($crate::__private::ObjectHandle);

        impl $crate::__private::Payload for $name {
            const KIND: $crate::__private::PayloadKind = $crate::__private::PayloadKind::Object;

            fn from_handle(handle: $crate::__private::Handle) -> Self {
                $name(
                    <$crate::__private::ObjectHandle as $crate::__private::Payload>::from_handle(
                        handle,
                    ),
                )
            }

            fn handle(&self) -> &$crate::__private::Handle {
                $crate::__private::Payload::handle(&self.0)
            }

            fn into_handle(self) -> $crate::__private::Handle {
                $crate::__private::Payload::into_handle(self.0)
            }
        }

        impl $crate::class::NativeClass for $name {
            const CLASS_NAME: &'static str = stringify!($name);
            const BASES: &'static [&'static str] = &[$($(stringify!($base),)+)? "Object"];
        }

        unsafe impl $crate::class::Inherits<$name> for $name {}
        unsafe impl $crate::class::Inherits<$crate::class::Object> for $name {}
        $($(unsafe impl $crate::class::Inherits<$base> for $name {})+)?

        $crate::__private::impl_encode_payload!($name);
        $crate::__private::impl_virtual_payload!($name);
    };
}
