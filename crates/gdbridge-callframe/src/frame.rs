//! Argument frames.
//!
//! A [`Frame`] is a fixed number of slots plus the pointer array the engine
//! expects as `p_args`. Slots live in a boxed slice, so the pointer array is
//! built once per allocation and stays valid while the frame is reused.
//!
//! Frames are pooled per thread. [`Frame::free`] releases the frame-scoped
//! temporaries (native strings, nul-terminated names) and returns the storage
//! to the pool. It never touches the argument handles themselves.

use std::cell::RefCell;
use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::sync::Arc;

use bumpalo::Bump;
use gdbridge_core::config::DEFAULT_FRAME_CAPACITY;
use gdbridge_core::{
    ArgPtrs, BridgeError, BridgeResult, Convention, Handle, HandleTable, PayloadKind,
    adopt_from_native,
};
use log::debug;

use crate::codec::{Decode, Encode};
use crate::ret::{HandleRet, Nil, RetSlot};
use crate::slot::{SLOT_BYTES, Slot};

const POOL_LIMIT: usize = 8;

thread_local! {
    static POOL: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Address of an encoded argument slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Addr(*const c_void);

impl Addr {
    pub fn as_ptr(self) -> *const c_void {
        self.0
    }

    pub fn as_u64(self) -> u64 {
        self.0 as u64
    }
}

pub struct Frame {
    slots: Box<[Slot]>,
    ptrs: Box<[*const c_void]>,
    len: usize,
    scratch: Bump,
    temporaries: Vec<Handle>,
}

impl Frame {
    /// Frame with the default capacity, taken from the pool when possible.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FRAME_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let pooled = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            let index = pool.iter().position(|f| f.capacity() == capacity)?;
            Some(pool.swap_remove(index))
        });
        match pooled {
            Ok(Some(frame)) => frame,
            _ => Self::allocate(capacity),
        }
    }

    fn allocate(capacity: usize) -> Self {
        debug!("allocating call frame with {capacity} slots");
        let slots = vec![Slot::ZERO; capacity].into_boxed_slice();
        let ptrs = slots.iter().map(Slot::as_ptr).collect();
        Self {
            slots,
            ptrs,
            len: 0,
            scratch: Bump::new(),
            temporaries: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an encoded argument. Panics when the frame is full.
    pub fn arg<T: Encode>(&mut self, value: T) -> Addr {
        const { assert!(T::WIDTH <= SLOT_BYTES, "value does not fit a frame slot") };
        let slot = self.next_slot();
        unsafe { value.encode(slot.as_mut_ptr()) };
        Addr(slot.as_ptr())
    }

    /// Append a native string built from `text`. The string lives until `free`.
    pub fn arg_str(&mut self, table: &Arc<HandleTable>, text: &str) -> Addr {
        let raw = table.native().new_string(text);
        let string = adopt_from_native(table, raw);
        let addr = self.arg(&string);
        self.temporaries.push(string);
        addr
    }

    /// Append a pointer to a nul-terminated copy of `name`. The copy lives until `free`.
    pub fn arg_cstr(&mut self, name: &str) -> BridgeResult<Addr> {
        if let Some(position) = name.bytes().position(|b| b == 0) {
            return Err(BridgeError::InteriorNul {
                name: name.to_string(),
                position,
            });
        }
        let copy = self.scratch.alloc_slice_fill_copy(name.len() + 1, 0u8);
        copy[..name.len()].copy_from_slice(name.as_bytes());
        let ptr = copy.as_ptr() as u64;
        Ok(self.arg(ptr))
    }

    /// The `p_args` pointer: null for a frame without arguments.
    pub fn args(&self) -> ArgPtrs {
        if self.len == 0 {
            ptr::null()
        } else {
            self.ptrs.as_ptr()
        }
    }

    pub fn slot(&self, index: usize) -> &Slot {
        &self.slots[..self.len][index]
    }

    /// Reserve a return slot for a plain value.
    pub fn ret<T: Decode>(&self) -> RetSlot<T> {
        RetSlot::new()
    }

    /// Reserve a return slot for a value received as a handle.
    pub fn ret_handle(&self, kind: PayloadKind, convention: Convention) -> HandleRet {
        HandleRet::new(kind, convention)
    }

    /// Return slot for methods without a result.
    pub fn nil(&self) -> Nil {
        Nil::default()
    }

    /// Release temporaries and hand the storage back to the pool.
    pub fn free(mut self) {
        self.reset();
        let _ = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < POOL_LIMIT {
                pool.push(self);
            }
        });
    }

    fn reset(&mut self) {
        self.temporaries.clear();
        self.scratch.reset();
        for slot in &mut self.slots[..self.len] {
            slot.clear();
        }
        self.len = 0;
    }

    fn next_slot(&mut self) -> &mut Slot {
        assert!(
            self.len < self.slots.len(),
            "call frame overflow: {} slots already used",
            self.slots.len()
        );
        let slot = &mut self.slots[self.len];
        self.len += 1;
        slot
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .field("temporaries", &self.temporaries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ret::ReturnTarget;
    use gdbridge_core::mock::MockNative;
    use gdbridge_core::{
        Array, BridgeError, GString, NativeInterface, Ownership, Payload, RawHandle, ReleasePolicy,
    };
    use std::ffi::CStr;

    #[test]
    fn arguments_fill_slots_in_order() {
        let mut frame = Frame::with_capacity(3);
        frame.arg(1i32);
        frame.arg(2.5f64);
        frame.arg(true);
        assert_eq!(frame.len(), 3);

        let args = frame.args();
        unsafe {
            assert_eq!(i64::decode(*args), 1);
            assert_eq!(f64::decode(*args.add(1)), 2.5);
            assert!(bool::decode(*args.add(2)));
        }
    }

    #[test]
    fn full_frame_accepts_exactly_its_capacity() {
        let mut frame = Frame::with_capacity(4);
        for i in 0..4i64 {
            frame.arg(i);
        }
        assert_eq!(frame.len(), 4);
    }

    #[test]
    #[should_panic(expected = "call frame overflow")]
    fn one_past_capacity_panics() {
        let mut frame = Frame::with_capacity(4);
        for i in 0..5i64 {
            frame.arg(i);
        }
    }

    #[test]
    fn empty_frame_has_null_args() {
        let frame = Frame::new();
        assert!(frame.args().is_null());
    }

    #[test]
    fn arg_addresses_match_pointer_array() {
        let mut frame = Frame::with_capacity(2);
        let a = frame.arg(10u8);
        let b = frame.arg(20u8);
        unsafe {
            assert_eq!(*frame.args(), a.as_ptr());
            assert_eq!(*frame.args().add(1), b.as_ptr());
        }
    }

    #[test]
    fn cstr_names_are_nul_terminated() {
        let mut frame = Frame::new();
        frame.arg_cstr("get_position").unwrap();
        let ptr = unsafe { u64::decode(*frame.args()) } as *const std::ffi::c_char;
        let name = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(name.to_str().unwrap(), "get_position");
    }

    #[test]
    fn cstr_rejects_interior_nul() {
        let mut frame = Frame::new();
        match frame.arg_cstr("bad\0name") {
            Err(BridgeError::InteriorNul { name, position }) => {
                assert_eq!(name, "bad\0name");
                assert_eq!(position, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(frame.is_empty());
    }

    #[test]
    fn strings_round_trip_through_a_frame() {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);

        for text in ["", "text"] {
            let mut frame = Frame::with_capacity(1);
            frame.arg_str(&table, text);

            // The engine returns a fresh copy of its argument.
            let mut ret = frame.ret_handle(PayloadKind::String, Convention::Adopt);
            unsafe {
                let arg = RawHandle::read_wire(PayloadKind::String, *frame.args() as *const u8);
                mock.copy(&arg).write_wire(ret.ret_ptr() as *mut u8);
            }
            frame.free();
            assert_eq!(mock.live_strings(), 1);

            let string = ret.get_as::<GString>(&table).unwrap();
            assert_eq!(mock.string_to_utf8(&string.handle().get()), text);
            assert_eq!(string.handle().ownership(), Ownership::HostOwned);
            drop(string);
        }
        assert_eq!(mock.live_strings(), 0);
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn empty_array_round_trips_through_a_frame() {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);
        let raw = RawHandle::word(PayloadKind::Array, 0xA000);
        let empty = Array::from_handle(adopt_from_native(&table, raw));

        let mut frame = Frame::with_capacity(1);
        let addr = frame.arg(&empty);
        let mut ret = frame.ret_handle(PayloadKind::Array, Convention::Borrow);
        let arg = unsafe { RawHandle::read_wire(PayloadKind::Array, addr.as_ptr() as *const u8) };
        assert_eq!(arg, raw);
        unsafe { arg.write_wire(ret.ret_ptr() as *mut u8) };
        frame.free();

        let back = ret.get_as::<Array>(&table).unwrap();
        assert_eq!(back.handle().get(), empty.handle().get());
        assert_eq!(back.handle().ownership(), Ownership::NativeOwned);
        drop(back);
        assert_eq!(mock.total_destroys(), 0);
        drop(empty);
        assert_eq!(mock.destroy_count(0xA000), 1);
    }

    #[test]
    fn free_releases_temporary_strings() {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);

        let mut frame = Frame::new();
        frame.arg_str(&table, "hello");
        assert_eq!(mock.live_strings(), 1);
        frame.free();
        assert_eq!(mock.live_strings(), 0);
        assert_eq!(mock.total_destroys(), 1);
    }

    #[test]
    fn free_leaves_argument_handles_alone() {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);
        let object = adopt_from_native(&table, mock.spawn_object("Node"));

        let mut frame = Frame::new();
        frame.arg(&object);
        frame.free();
        assert_eq!(mock.total_destroys(), 0);
        assert!(!object.is_released());
    }

    #[test]
    fn freed_frames_are_reused_clean() {
        let mut frame = Frame::with_capacity(5);
        frame.arg(99i64);
        let slots = frame.slots.as_ptr();
        frame.free();

        let reused = Frame::with_capacity(5);
        assert_eq!(reused.slots.as_ptr(), slots);
        assert!(reused.is_empty());
        assert_eq!(reused.slots[0].bytes(), &[0; SLOT_BYTES]);
    }
}
