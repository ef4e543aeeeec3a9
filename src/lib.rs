//! Host-side core of a game engine extension binding.
//!
//! Host code reaches native engine values through ownership-tracked
//! [`Handle`]s, calls native methods by encoding arguments into a
//! [`Frame`] and invoking a [`MethodBind`] through the [`Bridge`], and lets
//! the engine call host overrides of virtual methods through the
//! [`ClassDb`] trampolines.
//!
//! ## Key Types
//!
//! - [`Runtime`]: validated native entry points, installed once per process
//! - [`Bridge`]: method invocation with receiver liveness checks
//! - [`NativeClass`] and [`native_class!`]: typed class wrappers with zero-cost upcasts
//! - [`ClassDbBuilder`]: extension classes and their virtual overrides

pub mod bridge;
pub mod class;
pub mod runtime;

pub use gdbridge_callframe as callframe;
pub use gdbridge_core as types;
pub use gdbridge_registry as registry;

pub use bridge::{BoundMethod, Bridge};
pub use class::{Inherits, NativeClass, Object};
pub use gdbridge_callframe::{Decode, Encode, Frame, HandleRet, Nil, RetSlot, ReturnTarget};
pub use gdbridge_core::{
    BridgeConfig, BridgeError, BridgeResult, ErrorCode, Handle, HandleTable, InitLevel, MethodBind,
    MethodFlags, NativeInterface, NativeTable, Ownership, PanicPolicy, Payload, ReleasePolicy,
};
pub use gdbridge_registry::{ClassDb, ClassDbBuilder, Trampoline};
pub use runtime::{Runtime, deinitialize_level, initialize_level};

pub mod prelude {
    pub use crate::bridge::{BoundMethod, Bridge};
    pub use crate::class::{Inherits, NativeClass, Object};
    pub use crate::runtime::Runtime;
    pub use gdbridge_callframe::{Frame, HandleRet, Nil, RetSlot};
    pub use gdbridge_core::{
        Array, BridgeConfig, BridgeError, BridgeResult, Callable, Convention, Dictionary, GString,
        Handle, MethodFlags, NodePath, ObjectHandle, Ownership, PackedByteArray, PackedStringArray,
        PanicPolicy, Payload, Signal, StringName, Variant,
    };
    pub use gdbridge_registry::{ClassDbBuilder, Trampoline};
}

#[doc(hidden)]
pub mod __private {
    pub use gdbridge_callframe::{impl_encode_payload, impl_virtual_payload};
    pub use gdbridge_core::{Handle, ObjectHandle, Payload, PayloadKind};
}
