//! Deterministic name keys for the class and virtual tables.
//!
//! Names arrive from the native side as borrowed C strings on every virtual
//! query. Hashing them lets lookups avoid allocating an owned key.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain markers so a class and a method with the same name never share a key.
pub mod hash_constants {
    pub const CLASS: u64 = 0x2fac10b63a6cc57c;
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameHash(pub u64);

impl NameHash {
    pub fn class(name: &str) -> Self {
        NameHash(xxh64(name.as_bytes(), hash_constants::CLASS))
    }

    pub fn method(name: &str) -> Self {
        NameHash(xxh64(name.as_bytes(), hash_constants::METHOD))
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:#018x})", self.0)
    }
}
