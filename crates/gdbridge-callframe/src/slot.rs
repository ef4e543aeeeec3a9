use std::ffi::c_void;
use std::fmt;

use gdbridge_core::values::Projection;

/// Width of one frame slot: the largest value the pointer-call ABI passes.
pub const SLOT_BYTES: usize = 64;

const _: () = assert!(SLOT_BYTES >= std::mem::size_of::<Projection>());

#[derive(Clone, Copy)]
#[repr(C, align(16))]
pub struct Slot {
    bytes: [u8; SLOT_BYTES],
}

impl Slot {
    pub const ZERO: Slot = Slot {
        bytes: [0; SLOT_BYTES],
    };

    pub fn as_ptr(&self) -> *const c_void {
        self.bytes.as_ptr() as *const c_void
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.bytes.as_mut_ptr() as *mut c_void
    }

    pub fn bytes(&self) -> &[u8; SLOT_BYTES] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes = [0; SLOT_BYTES];
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<u64> = self
            .bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        f.debug_tuple("Slot").field(&words).finish()
    }
}
