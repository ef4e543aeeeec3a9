//! Return slots.
//!
//! A return slot is reserved before the call and decoded after it. Slots are
//! owned by the caller, not by the frame, so a frame can be freed or reused
//! before its result is read.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use gdbridge_core::{Convention, Handle, HandleTable, Payload, PayloadKind, RawHandle};

use crate::codec::Decode;
use crate::slot::Slot;

/// Anything the engine can write a call result into.
pub trait ReturnTarget {
    fn ret_ptr(&mut self) -> *mut c_void;
}

/// Return slot for a plain value.
pub struct RetSlot<T> {
    slot: Slot,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Decode> RetSlot<T> {
    pub fn new() -> Self {
        Self {
            slot: Slot::ZERO,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> T {
        unsafe { T::decode(self.slot.as_ptr()) }
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }
}

impl<T: Decode> Default for RetSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReturnTarget for RetSlot<T> {
    fn ret_ptr(&mut self) -> *mut c_void {
        self.slot.as_mut_ptr()
    }
}

impl<T> fmt::Debug for RetSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RetSlot").field(&self.slot).finish()
    }
}

/// Return slot for a value received as a handle.
///
/// Decoding copies the raw words out and builds a new handle with the
/// method's convention, so the handle never points into the slot.
#[derive(Debug)]
pub struct HandleRet {
    slot: Slot,
    kind: PayloadKind,
    convention: Convention,
}

impl HandleRet {
    pub fn new(kind: PayloadKind, convention: Convention) -> Self {
        Self {
            slot: Slot::ZERO,
            kind,
            convention,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Raw words the engine wrote.
    pub fn raw(&self) -> RawHandle {
        unsafe { RawHandle::read_wire(self.kind, self.slot.as_ptr() as *const u8) }
    }

    /// Decode into a handle. `None` for a null result.
    pub fn get(self, table: &Arc<HandleTable>) -> Option<Handle> {
        let raw = self.raw();
        if raw.is_null() {
            return None;
        }
        let raw = match self.kind {
            PayloadKind::Object => {
                let id = table.native().instance_id(raw.address());
                RawHandle::object(raw.address(), id)
            }
            _ => raw,
        };
        Some(self.convention.receive(table, raw))
    }

    pub fn get_as<P: Payload>(self, table: &Arc<HandleTable>) -> Option<P> {
        self.get(table).map(P::from_handle)
    }
}

impl ReturnTarget for HandleRet {
    fn ret_ptr(&mut self) -> *mut c_void {
        self.slot.as_mut_ptr()
    }
}

/// Return slot for methods without a result.
#[derive(Debug, Default)]
pub struct Nil {
    slot: Slot,
}

impl ReturnTarget for Nil {
    fn ret_ptr(&mut self) -> *mut c_void {
        self.slot.as_mut_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encode;
    use gdbridge_core::mock::MockNative;
    use gdbridge_core::values::Vector3;
    use gdbridge_core::{Ownership, ReleasePolicy};

    fn setup() -> (Arc<MockNative>, Arc<HandleTable>) {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);
        (mock, table)
    }

    #[test]
    fn plain_values_decode() {
        let mut ret = RetSlot::<Vector3>::new();
        let v = Vector3 {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };
        unsafe { v.encode(ret.ret_ptr()) };
        assert_eq!(ret.get(), v);
    }

    #[test]
    fn object_results_pick_up_instance_id() {
        let (mock, table) = setup();
        let spawned = mock.spawn_object("Tween");

        let mut ret = HandleRet::new(PayloadKind::Object, Convention::Adopt);
        unsafe { spawned.address().encode(ret.ret_ptr()) };
        let handle = ret.get(&table).unwrap();
        assert_eq!(handle.get(), spawned);
        assert_eq!(handle.ownership(), Ownership::HostOwned);
    }

    #[test]
    fn null_results_are_none() {
        let (_mock, table) = setup();
        let ret = HandleRet::new(PayloadKind::Object, Convention::Borrow);
        assert!(ret.get(&table).is_none());
    }

    #[test]
    fn conventions_set_ownership() {
        let (mock, table) = setup();
        for (convention, expected) in [
            (Convention::Adopt, Ownership::HostOwned),
            (Convention::Borrow, Ownership::NativeOwned),
            (Convention::Share, Ownership::Shared),
            (Convention::AdoptShared, Ownership::Shared),
        ] {
            let mut ret = HandleRet::new(PayloadKind::Object, convention);
            unsafe { 0xA0u64.encode(ret.ret_ptr()) };
            let handle = ret.get(&table).unwrap();
            assert_eq!(handle.ownership(), expected);
            handle.end();
        }
        // Only `Share` takes a reference of its own.
        assert_eq!(mock.refcount(0xA0), 1);
    }

    #[test]
    fn decoded_handle_outlives_slot() {
        let (_mock, table) = setup();
        let mut ret = HandleRet::new(PayloadKind::Callable, Convention::Borrow);
        let words = [0x11u64, 0x22u64];
        unsafe {
            std::ptr::copy_nonoverlapping(words.as_ptr(), ret.ret_ptr() as *mut u64, 2);
        }
        let handle = ret.get(&table).unwrap();
        assert_eq!(handle.get().wire(), &words);
    }
}
