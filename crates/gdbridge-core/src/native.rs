//! The native side of the binding.
//!
//! [`NativeInterface`] is the table of entry points the engine supplies at
//! startup. Everything above this layer talks to the engine only through it,
//! which is also what lets tests swap in [`MockNative`](crate::mock::MockNative).

use std::ffi::c_void;
use std::num::NonZeroU64;

use bitflags::bitflags;

use crate::error::CallError;
use crate::payload::RawHandle;

/// Opaque token the engine resolves to the function implementing a method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodBind(NonZeroU64);

impl MethodBind {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(MethodBind)
    }

    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

bitflags! {
    /// Method attributes as the engine declares them.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const NORMAL = 1;
        const EDITOR = 1 << 1;
        const CONST = 1 << 2;
        const VIRTUAL = 1 << 3;
        const VARARG = 1 << 4;
        const STATIC = 1 << 5;
    }
}

/// Pointer to an array of pointers, one per encoded argument.
pub type ArgPtrs = *const *const c_void;

/// Entry points supplied by the native engine.
///
/// Object pointers and instance ids travel as plain `u64` words; string and
/// other builtin values travel as [`RawHandle`]s of the matching kind.
pub trait NativeInterface: Send + Sync {
    /// Names of required entries the engine did not provide.
    fn missing_entries(&self) -> Vec<&'static str> {
        Vec::new()
    }

    fn construct_object(&self, class: &str) -> u64;

    fn method_bind(&self, class: &str, method: &str, hash: i64) -> Option<MethodBind>;

    /// Call a bound method with pre-encoded arguments.
    ///
    /// # Safety
    /// `args` must hold as many valid slot pointers as the method declares and
    /// `ret` must point to a slot large enough for its return type.
    unsafe fn ptrcall(&self, bind: MethodBind, instance: u64, args: ArgPtrs, ret: *mut c_void);

    /// Call a bound method through the variant calling convention.
    ///
    /// # Safety
    /// `args` must hold `count` pointers to native variants and `ret` must point
    /// to storage for one variant.
    unsafe fn varcall(
        &self,
        bind: MethodBind,
        instance: u64,
        args: ArgPtrs,
        count: i64,
        ret: *mut c_void,
    ) -> CallError;

    fn instance_id(&self, object: u64) -> u64;

    /// Pointer of a live object, or 0 when the id no longer names one.
    fn instance_from_id(&self, id: u64) -> u64;

    /// Attach a host instance to a native object created for an extension class.
    fn set_instance(&self, object: u64, class: &str, instance: *mut c_void);

    /// Free the value. Objects are destroyed, builtins run their destructor.
    fn destroy(&self, raw: &RawHandle);

    /// Add one reference to a refcounted object. Builtin values are not
    /// refcounted and ignore this.
    fn reference(&self, raw: &RawHandle);

    /// Drop one reference. Returns `true` when that was the last one and the
    /// value must be destroyed. Always `true` for builtin values.
    fn unreference(&self, raw: &RawHandle) -> bool;

    /// Independent copy of a builtin value, made by its copy constructor.
    /// Objects are returned as is.
    fn copy(&self, raw: &RawHandle) -> RawHandle;

    fn new_string(&self, text: &str) -> RawHandle;

    fn string_to_utf8(&self, raw: &RawHandle) -> String;
}
