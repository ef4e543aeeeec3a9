//! Ownership states and the transfers between them.
//!
//! A raw value entering the host becomes a [`Handle`] through one of the
//! conventions below. Which convention applies to a given native method is
//! decided when its wrapper is generated; nothing here infers it.

use std::sync::Arc;

use crate::handle::{Handle, HandleTable};
use crate::payload::RawHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ownership {
    /// The native side frees it. Releasing only forgets the handle.
    NativeOwned,
    /// The host frees it exactly once.
    HostOwned,
    /// Refcounted. The handle holds one reference.
    Shared,
}

impl Ownership {
    /// Whether releasing a handle in this state calls into the native side.
    pub fn releases_native(self) -> bool {
        !matches!(self, Ownership::NativeOwned)
    }
}

/// How a value received from the native side is turned into a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Convention {
    /// Ownership transferred to the host.
    Adopt,
    /// Native keeps ownership.
    Borrow,
    /// Take a new reference.
    Share,
    /// The reference was already transferred with the value.
    AdoptShared,
}

impl Convention {
    pub fn receive(self, table: &Arc<HandleTable>, raw: RawHandle) -> Handle {
        match self {
            Convention::Adopt => adopt_from_native(table, raw),
            Convention::Borrow => borrow_from_native(table, raw),
            Convention::Share => share(table, raw),
            Convention::AdoptShared => table.wrap(raw, Ownership::Shared),
        }
    }
}

pub fn adopt_from_native(table: &Arc<HandleTable>, raw: RawHandle) -> Handle {
    table.wrap(raw, Ownership::HostOwned)
}

pub fn borrow_from_native(table: &Arc<HandleTable>, raw: RawHandle) -> Handle {
    table.wrap(raw, Ownership::NativeOwned)
}

pub fn share(table: &Arc<HandleTable>, raw: RawHandle) -> Handle {
    table.native().reference(&raw);
    table.wrap(raw, Ownership::Shared)
}

/// Give the raw value to the native side. The handle is invalidated without a
/// release call; `None` if it was already released.
pub fn relinquish(handle: Handle) -> Option<RawHandle> {
    handle.end()
}
