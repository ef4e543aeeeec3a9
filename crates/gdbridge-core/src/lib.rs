//! Core types of the engine binding: handles and their ownership, the native
//! interface, error codes, and builtin value layouts.
//!
//! ## Key Types
//!
//! - [`Handle`]: host reference to a native value, released according to its [`Ownership`]
//! - [`HandleTable`]: generational side table that owns every raw native word
//! - [`NativeInterface`]: entry points supplied by the engine
//! - [`ErrorCode`]: flat engine error codes, carried through untranslated

pub mod config;
pub mod error;
pub mod error_code;
pub mod handle;
pub mod name_hash;
pub mod native;
pub mod native_table;
pub mod ownership;
pub mod payload;
pub mod values;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{BridgeConfig, InitLevel, PanicPolicy, ReleasePolicy};
pub use error::{BridgeError, BridgeResult, CallError, NativeError, RegistrationError};
pub use error_code::{CallErrorType, ErrorCode};
pub use handle::{Handle, HandleId, HandleTable};
pub use name_hash::NameHash;
pub use native::{ArgPtrs, MethodBind, MethodFlags, NativeInterface};
pub use native_table::NativeTable;
pub use ownership::{
    Convention, Ownership, adopt_from_native, borrow_from_native, relinquish, share,
};
pub use payload::{
    Array, Callable, Dictionary, GString, NodePath, ObjectHandle, PackedByteArray, PackedColorArray,
    PackedFloat32Array, PackedFloat64Array, PackedInt32Array, PackedInt64Array, PackedStringArray,
    PackedVector2Array, PackedVector3Array, PackedVector4Array, Payload, PayloadKind, RawHandle,
    Signal, StringName, Variant,
};
