//! Handle side table.
//!
//! Host values never hold raw native words directly. A [`Handle`] is a
//! generational index into a [`HandleTable`], which stores the raw value and
//! its ownership state. Releasing a handle vacates its slot and bumps the
//! generation, so every later access through a stale id is detected.
//!
//! Release runs at most once per handle, whichever of an explicit `release`,
//! `end`, or `Drop` gets there first, and regardless of which thread it runs on.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::config::ReleasePolicy;
use crate::native::NativeInterface;
use crate::ownership::Ownership;
use crate::payload::{PayloadKind, RawHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId {
    pub index: u32,
    pub generation: u32,
}

#[derive(Clone, Copy, Debug)]
struct Live {
    raw: RawHandle,
    ownership: Ownership,
}

struct Entry {
    generation: u32,
    value: Option<Live>,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Entry>,
    free_list: Vec<u32>,
    live: usize,
}

pub struct HandleTable {
    native: Arc<dyn NativeInterface>,
    policy: ReleasePolicy,
    slots: Mutex<Slots>,
    pending: Mutex<Vec<Live>>,
}

impl HandleTable {
    pub fn new(native: Arc<dyn NativeInterface>, policy: ReleasePolicy) -> Arc<Self> {
        Arc::new(Self {
            native,
            policy,
            slots: Mutex::new(Slots::default()),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn native(&self) -> &Arc<dyn NativeInterface> {
        &self.native
    }

    pub fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Store a raw value. Never touches the native reference count.
    pub fn wrap(self: &Arc<Self>, raw: RawHandle, ownership: Ownership) -> Handle {
        let live = Live { raw, ownership };
        let mut guard = self.lock_slots();
        let slots = &mut *guard;
        slots.live += 1;

        let id = if let Some(index) = slots.free_list.pop() {
            let entry = &mut slots.entries[index as usize];
            entry.value = Some(live);
            HandleId {
                index,
                generation: entry.generation,
            }
        } else {
            let index = slots.entries.len() as u32;
            slots.entries.push(Entry {
                generation: 0,
                value: Some(live),
            });
            HandleId {
                index,
                generation: 0,
            }
        };

        Handle {
            id,
            kind: raw.kind(),
            table: Arc::clone(self),
        }
    }

    /// Raw value behind `id`. Panics if the handle was released.
    pub fn get(&self, id: HandleId) -> RawHandle {
        self.live(id).raw
    }

    pub fn ownership(&self, id: HandleId) -> Ownership {
        self.live(id).ownership
    }

    pub fn is_live(&self, id: HandleId) -> bool {
        self.lookup(id).is_some()
    }

    /// Release now. Returns `false` if the handle was already released.
    pub fn release(&self, id: HandleId) -> bool {
        match self.take(id) {
            Some(live) => {
                self.free_native(live);
                true
            }
            None => false,
        }
    }

    /// Invalidate without a native call and hand back the raw value.
    pub fn end(&self, id: HandleId) -> Option<RawHandle> {
        self.take(id).map(|live| live.raw)
    }

    /// New handle aliasing the same value.
    ///
    /// Shared objects gain a native reference. Shared builtins have no native
    /// count, so the new handle owns a copy made by the engine instead.
    /// Borrowed values get another borrow. Uniquely owned values cannot be
    /// aliased.
    pub fn duplicate(self: &Arc<Self>, id: HandleId) -> Handle {
        let live = self.live(id);
        match live.ownership {
            Ownership::Shared if live.raw.kind() == PayloadKind::Object => {
                self.native.reference(&live.raw);
                self.wrap(live.raw, Ownership::Shared)
            }
            Ownership::Shared => {
                let copy = self.native.copy(&live.raw);
                debug!("copied shared {:?} for a second owner", copy.kind());
                self.wrap(copy, Ownership::HostOwned)
            }
            Ownership::NativeOwned => self.wrap(live.raw, Ownership::NativeOwned),
            Ownership::HostOwned => panic!(
                "cannot duplicate a host-owned {:?} handle for sharing",
                live.raw.kind()
            ),
        }
    }

    /// Perform the releases queued by finalized handles.
    pub fn cycle(&self) -> usize {
        let queued = std::mem::take(&mut *self.lock_pending());
        let count = queued.len();
        for live in queued {
            self.free_native(live);
        }
        if count > 0 {
            debug!("released {count} deferred handles");
        }
        count
    }

    pub fn live_count(&self) -> usize {
        self.lock_slots().live
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn finalize(&self, id: HandleId) {
        match self.policy {
            ReleasePolicy::Immediate => {
                self.release(id);
            }
            ReleasePolicy::Deferred => {
                if let Some(live) = self.take(id) {
                    if live.ownership.releases_native() {
                        self.lock_pending().push(live);
                    }
                }
            }
        }
    }

    fn free_native(&self, live: Live) {
        match live.ownership {
            Ownership::NativeOwned => {}
            Ownership::HostOwned => self.native.destroy(&live.raw),
            Ownership::Shared => {
                if self.native.unreference(&live.raw) {
                    self.native.destroy(&live.raw);
                }
            }
        }
    }

    fn lookup(&self, id: HandleId) -> Option<Live> {
        let slots = self.lock_slots();
        let entry = slots.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.value
    }

    fn live(&self, id: HandleId) -> Live {
        match self.lookup(id) {
            Some(live) => live,
            None => panic!("use of released handle {id:?}"),
        }
    }

    fn take(&self, id: HandleId) -> Option<Live> {
        let mut guard = self.lock_slots();
        let slots = &mut *guard;
        let entry = slots.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let live = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        slots.free_list.push(id.index);
        slots.live -= 1;
        Some(live)
    }

    // Release runs from `Drop`, possibly while unwinding, so a poisoned lock
    // must not turn into a second panic.
    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<Live>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("policy", &self.policy)
            .field("live", &self.live_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Host-side reference to a native value.
///
/// Dropping a handle releases it according to its ownership state.
pub struct Handle {
    id: HandleId,
    kind: PayloadKind,
    table: Arc<HandleTable>,
}

impl Handle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    /// Raw value for a call frame. Panics if released.
    pub fn get(&self) -> RawHandle {
        self.table.get(self.id)
    }

    /// Raw value, asserting the payload kind.
    pub fn get_as(&self, kind: PayloadKind) -> RawHandle {
        assert_eq!(
            self.kind, kind,
            "handle of kind {:?} reinterpreted as {:?}",
            self.kind, kind
        );
        self.get()
    }

    pub fn ownership(&self) -> Ownership {
        self.table.ownership(self.id)
    }

    pub fn is_released(&self) -> bool {
        !self.table.is_live(self.id)
    }

    /// Idempotent.
    pub fn release(&self) {
        self.table.release(self.id);
    }

    pub fn duplicate_for_sharing(&self) -> Handle {
        self.table.duplicate(self.id)
    }

    /// Relinquish the value to the native side without releasing it.
    pub fn end(self) -> Option<RawHandle> {
        self.table.end(self.id)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.table.finalize(self.id);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}
