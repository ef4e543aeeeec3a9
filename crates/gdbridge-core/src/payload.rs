//! Payload kinds and the raw words a handle carries.
//!
//! Every native value the binding can hold by reference is one of a small set
//! of kinds. The kind fixes how many machine words travel through a call frame
//! and which native destructor frees it.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::handle::Handle;

/// Largest raw payload, in 64-bit words.
pub const MAX_WORDS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PayloadKind {
    Object,
    String,
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
    PackedVector4Array,
}

impl PayloadKind {
    /// Words written into a frame slot for this kind.
    pub const fn wire_words(self) -> usize {
        match self {
            PayloadKind::Object
            | PayloadKind::String
            | PayloadKind::StringName
            | PayloadKind::NodePath
            | PayloadKind::Array
            | PayloadKind::Dictionary => 1,
            PayloadKind::Callable | PayloadKind::Signal => 2,
            PayloadKind::Variant => 3,
            // Packed arrays carry their data pointer and a proxy word.
            _ => 2,
        }
    }

    pub const fn is_packed_array(self) -> bool {
        matches!(
            self,
            PayloadKind::PackedByteArray
                | PayloadKind::PackedInt32Array
                | PayloadKind::PackedInt64Array
                | PayloadKind::PackedFloat32Array
                | PayloadKind::PackedFloat64Array
                | PayloadKind::PackedStringArray
                | PayloadKind::PackedVector2Array
                | PayloadKind::PackedVector3Array
                | PayloadKind::PackedColorArray
                | PayloadKind::PackedVector4Array
        )
    }

    pub const fn wire_bytes(self) -> usize {
        self.wire_words() * 8
    }
}

/// Raw native value of a handle.
///
/// For objects, word 0 is the native pointer and word 1 the instance id used
/// for liveness checks. The id never goes over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawHandle {
    kind: PayloadKind,
    words: [u64; MAX_WORDS],
}

impl RawHandle {
    pub const fn new(kind: PayloadKind, words: [u64; MAX_WORDS]) -> Self {
        Self { kind, words }
    }

    /// Single-word value of the given kind.
    pub const fn word(kind: PayloadKind, word: u64) -> Self {
        Self::new(kind, [word, 0, 0])
    }

    pub const fn object(ptr: u64, instance_id: u64) -> Self {
        Self::new(PayloadKind::Object, [ptr, instance_id, 0])
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn words(&self) -> [u64; MAX_WORDS] {
        self.words
    }

    /// The words that are written into a frame slot.
    pub fn wire(&self) -> &[u64] {
        &self.words[..self.kind.wire_words()]
    }

    /// Native address for single-word kinds, the object pointer for objects.
    pub fn address(&self) -> u64 {
        self.words[0]
    }

    pub fn instance_id(&self) -> Option<u64> {
        match self.kind {
            PayloadKind::Object if self.words[1] != 0 => Some(self.words[1]),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.wire().iter().all(|w| *w == 0)
    }

    /// Read the wire words of `kind` from native memory.
    ///
    /// # Safety
    /// `src` must point to at least `kind.wire_bytes()` readable bytes.
    pub unsafe fn read_wire(kind: PayloadKind, src: *const u8) -> Self {
        let mut words = [0u64; MAX_WORDS];
        for (i, word) in words.iter_mut().take(kind.wire_words()).enumerate() {
            *word = unsafe { (src as *const u64).add(i).read_unaligned() };
        }
        Self { kind, words }
    }

    /// Write the wire words into native memory.
    ///
    /// # Safety
    /// `dst` must point to at least `self.kind().wire_bytes()` writable bytes.
    pub unsafe fn write_wire(&self, dst: *mut u8) {
        for (i, word) in self.wire().iter().enumerate() {
            unsafe { (dst as *mut u64).add(i).write_unaligned(*word) };
        }
    }
}

/// A handle statically known to hold one payload kind.
pub trait Payload: Sized {
    const KIND: PayloadKind;

    /// Wrap a handle. Panics if the handle holds another kind.
    fn from_handle(handle: Handle) -> Self;

    fn handle(&self) -> &Handle;

    fn into_handle(self) -> Handle;
}

macro_rules! payload_types {
    ($($(#[$meta:meta])* $name:ident => $kind:ident;)*) => {$(
        $(#[$meta])*
        #[derive(Debug)]
        #[repr(transparent)]
        pub struct $name(Handle);

        impl Payload for $name {
            const KIND: PayloadKind = PayloadKind::$kind;

            fn from_handle(handle: Handle) -> Self {
                assert_eq!(
                    handle.kind(),
                    PayloadKind::$kind,
                    "handle of kind {:?} cannot be used as {}",
                    handle.kind(),
                    stringify!($name),
                );
                $name(handle)
            }

            fn handle(&self) -> &Handle {
                &self.0
            }

            fn into_handle(self) -> Handle {
                self.0
            }
        }
    )*};
}

payload_types! {
    /// Reference to any native object.
    ObjectHandle => Object;
    /// Native string.
    GString => String;
    StringName => StringName;
    NodePath => NodePath;
    Array => Array;
    Dictionary => Dictionary;
    Callable => Callable;
    Signal => Signal;
    /// Boxed dynamically typed value.
    Variant => Variant;
    PackedByteArray => PackedByteArray;
    PackedInt32Array => PackedInt32Array;
    PackedInt64Array => PackedInt64Array;
    PackedFloat32Array => PackedFloat32Array;
    PackedFloat64Array => PackedFloat64Array;
    /// Packed array of native strings.
    PackedStringArray => PackedStringArray;
    PackedVector2Array => PackedVector2Array;
    PackedVector3Array => PackedVector3Array;
    PackedColorArray => PackedColorArray;
    PackedVector4Array => PackedVector4Array;
}

/// Every payload kind, in tag order.
pub const ALL_KINDS: [PayloadKind; 19] = [
    PayloadKind::Object,
    PayloadKind::String,
    PayloadKind::StringName,
    PayloadKind::NodePath,
    PayloadKind::Array,
    PayloadKind::Dictionary,
    PayloadKind::Callable,
    PayloadKind::Signal,
    PayloadKind::Variant,
    PayloadKind::PackedByteArray,
    PayloadKind::PackedInt32Array,
    PayloadKind::PackedInt64Array,
    PayloadKind::PackedFloat32Array,
    PayloadKind::PackedFloat64Array,
    PayloadKind::PackedStringArray,
    PayloadKind::PackedVector2Array,
    PayloadKind::PackedVector3Array,
    PayloadKind::PackedColorArray,
    PayloadKind::PackedVector4Array,
];
