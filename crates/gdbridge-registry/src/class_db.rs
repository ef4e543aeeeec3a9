//! Class registrations and their virtual dispatch tables.
//!
//! Registration happens once, at load time, through [`ClassDbBuilder`].
//! [`ClassDbBuilder::build`] freezes the result into a [`ClassDb`] that is only
//! read afterwards, so lookups on the call path take no lock. Unloading a class
//! flips a flag on its entry rather than mutating the maps.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gdbridge_core::{
    Handle, HandleTable, MethodFlags, NameHash, RawHandle, RegistrationError, borrow_from_native,
};
use log::{debug, warn};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;

use crate::trampoline::Trampoline;

type WrapFn = Arc<dyn Fn(Handle) -> Box<dyn Any + Send> + Send + Sync>;
type InstantiateFn = Arc<dyn Fn(Handle) -> *mut c_void + Send + Sync>;

/// A host-side instance bound to a freshly constructed native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    /// Native object pointer.
    pub object: u64,
    /// Host instance, passed back as `self` to every trampoline.
    pub ptr: *mut c_void,
}

#[derive(Clone, Debug)]
pub struct VirtualEntry {
    pub name: String,
    pub flags: MethodFlags,
    pub trampoline: Trampoline,
}

pub struct ClassEntry {
    name: String,
    parent: String,
    wrap: WrapFn,
    instantiate: InstantiateFn,
    drop_instance: unsafe fn(*mut c_void),
    virtuals: FxHashMap<NameHash, VirtualEntry>,
    loaded: AtomicBool,
}

impl ClassEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Override of `method`, own or inherited from a registered ancestor.
    pub fn virtual_method(&self, method: &str) -> Option<&Trampoline> {
        if !self.is_loaded() {
            warn!(
                "virtual lookup of `{method}` on unloaded class `{}`",
                self.name
            );
            return None;
        }
        self.virtuals
            .get(&NameHash::method(method))
            .filter(|entry| entry.name == method)
            .map(|entry| &entry.trampoline)
    }

    pub fn virtuals(&self) -> impl Iterator<Item = &VirtualEntry> {
        self.virtuals.values()
    }

    /// Pointer handed to the engine as this class's userdata.
    pub fn userdata(&self) -> *mut c_void {
        self as *const ClassEntry as *mut c_void
    }
}

impl fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntry")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("virtuals", &self.virtuals.len())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

unsafe fn drop_instance<T>(ptr: *mut c_void) {
    drop(unsafe { Box::from_raw(ptr as *mut T) });
}

#[derive(Default)]
pub struct ClassDbBuilder {
    classes: FxHashMap<NameHash, ClassEntry>,
}

impl ClassDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension class whose instances are host values of type `T`.
    ///
    /// `factory` wraps the handle of the native object backing an instance.
    ///
    /// Overrides inherited from a registered parent are called with the
    /// instance reinterpreted as the parent's host type, so a subclass's `T`
    /// must be `#[repr(C)]` with the parent's host type as its first field.
    pub fn register_class<T, F>(
        &mut self,
        name: &str,
        parent: &str,
        factory: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        T: Send + 'static,
        F: Fn(Handle) -> T + Send + Sync + 'static,
    {
        let hash = NameHash::class(name);
        if self.classes.contains_key(&hash) {
            return Err(RegistrationError::DuplicateClass(name.to_string()));
        }

        let factory = Arc::new(factory);
        let wrap = {
            let factory = Arc::clone(&factory);
            Arc::new(move |handle: Handle| Box::new(factory(handle)) as Box<dyn Any + Send>)
        };
        let instantiate =
            Arc::new(move |handle: Handle| Box::into_raw(Box::new(factory(handle))) as *mut c_void);

        debug!("registered class `{name}` extending `{parent}`");
        self.classes.insert(
            hash,
            ClassEntry {
                name: name.to_string(),
                parent: parent.to_string(),
                wrap,
                instantiate,
                drop_instance: drop_instance::<T>,
                virtuals: FxHashMap::default(),
                loaded: AtomicBool::new(true),
            },
        );
        Ok(self)
    }

    /// Register an override. Returns `false` if `class` already overrides
    /// `method`; the first registration wins.
    pub fn register_virtual(
        &mut self,
        class: &str,
        method: &str,
        flags: MethodFlags,
        trampoline: Trampoline,
    ) -> Result<bool, RegistrationError> {
        let entry = self
            .classes
            .get_mut(&NameHash::class(class))
            .ok_or_else(|| RegistrationError::UnknownClass(class.to_string()))?;

        let key = NameHash::method(method);
        if entry.virtuals.contains_key(&key) {
            warn!("`{class}::{method}` is already overridden; keeping the first registration");
            return Ok(false);
        }

        debug!("registered virtual `{class}::{method}`");
        entry.virtuals.insert(
            key,
            VirtualEntry {
                name: method.to_string(),
                flags: flags | MethodFlags::VIRTUAL,
                trampoline,
            },
        );
        Ok(true)
    }

    /// Freeze the registrations. Each class also receives the overrides of its
    /// registered ancestors that it does not override itself.
    pub fn build(mut self) -> ClassDb {
        let mut hierarchy = DiGraph::new();
        let mut nodes: FxHashMap<NameHash, NodeIndex> = FxHashMap::default();
        let mut node = |graph: &mut DiGraph<NameHash, ()>, hash: NameHash| {
            *nodes.entry(hash).or_insert_with(|| graph.add_node(hash))
        };

        for entry in self.classes.values() {
            let child = node(&mut hierarchy, NameHash::class(&entry.name));
            let parent = node(&mut hierarchy, NameHash::class(&entry.parent));
            hierarchy.add_edge(child, parent, ());
        }

        let mut inherited: Vec<(NameHash, VirtualEntry)> = Vec::new();
        for (hash, entry) in &self.classes {
            let mut current = NameHash::class(&entry.parent);
            let mut depth = 0;
            while let Some(ancestor) = self.classes.get(&current)
                && depth < self.classes.len()
            {
                for (key, virt) in &ancestor.virtuals {
                    let shadowed = entry.virtuals.contains_key(key)
                        || inherited
                            .iter()
                            .any(|(h, v)| h == hash && NameHash::method(&v.name) == *key);
                    if !shadowed {
                        inherited.push((*hash, virt.clone()));
                    }
                }
                current = NameHash::class(&ancestor.parent);
                depth += 1;
            }
        }
        for (hash, virt) in inherited {
            if let Some(entry) = self.classes.get_mut(&hash) {
                entry.virtuals.insert(NameHash::method(&virt.name), virt);
            }
        }

        ClassDb {
            classes: self.classes,
            hierarchy,
            nodes,
        }
    }
}

impl fmt::Debug for ClassDbBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDbBuilder")
            .field("classes", &self.classes.values().collect::<Vec<_>>())
            .finish()
    }
}

pub struct ClassDb {
    classes: FxHashMap<NameHash, ClassEntry>,
    hierarchy: DiGraph<NameHash, ()>,
    nodes: FxHashMap<NameHash, NodeIndex>,
}

impl ClassDb {
    /// A loaded class.
    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.classes
            .get(&NameHash::class(name))
            .filter(|entry| entry.name == name && entry.is_loaded())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.class(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values().filter(|entry| entry.is_loaded())
    }

    /// Override of `method` for `class`, or `None` to fall back to the
    /// engine's default behavior.
    pub fn lookup(&self, class: &str, method: &str) -> Option<&Trampoline> {
        self.class(class)?.virtual_method(method)
    }

    /// Whether `class` is `ancestor` or derives from it. Native ancestors named
    /// as parents count.
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        if class == ancestor {
            return true;
        }
        match (
            self.nodes.get(&NameHash::class(class)),
            self.nodes.get(&NameHash::class(ancestor)),
        ) {
            (Some(from), Some(to)) => has_path_connecting(&self.hierarchy, *from, *to, None),
            _ => false,
        }
    }

    /// First ancestor of `class` that is not a registered extension class.
    pub fn native_ancestor(&self, class: &str) -> Option<&str> {
        let mut current = self.class(class)?;
        for _ in 0..self.classes.len() {
            match self.classes.get(&NameHash::class(&current.parent)) {
                Some(parent) => current = parent,
                None => return Some(&current.parent),
            }
        }
        // Only a cycle among registered classes gets here.
        None
    }

    /// Wrap the handle of an object of `class` into its host type.
    pub fn wrap(&self, class: &str, handle: Handle) -> Option<Box<dyn Any + Send>> {
        Some((self.class(class)?.wrap)(handle))
    }

    pub fn wrap_as<T: 'static>(&self, class: &str, handle: Handle) -> Option<T> {
        self.wrap(class, handle)?.downcast::<T>().ok().map(|b| *b)
    }

    /// Construct the native object backing a new instance of `class` and bind
    /// a host instance to it.
    pub fn instantiate(&self, class: &str, table: &Arc<HandleTable>) -> Option<Instance> {
        let entry = self.class(class)?;
        let native_class = self.native_ancestor(class)?;
        let api = table.native();

        let object = api.construct_object(native_class);
        if object == 0 {
            return None;
        }
        let raw = RawHandle::object(object, api.instance_id(object));
        // The engine owns the object; the instance only borrows it.
        let ptr = (entry.instantiate)(borrow_from_native(table, raw));
        api.set_instance(object, class, ptr);
        debug!("instantiated `{class}` on native `{native_class}`");
        Some(Instance { object, ptr })
    }

    /// Drop a host instance created by [`instantiate`](Self::instantiate).
    ///
    /// # Safety
    /// `instance` must come from `instantiate` for the same class and must not
    /// be used afterwards.
    pub unsafe fn free_instance(&self, class: &str, instance: *mut c_void) -> bool {
        match self.classes.get(&NameHash::class(class)) {
            Some(entry) if !instance.is_null() => {
                unsafe { (entry.drop_instance)(instance) };
                true
            }
            _ => false,
        }
    }

    /// Stop serving lookups for `class`.
    pub fn unload(&self, class: &str) -> bool {
        match self.classes.get(&NameHash::class(class)) {
            Some(entry) => {
                debug!("unloaded class `{class}`");
                entry.loaded.swap(false, Ordering::AcqRel)
            }
            None => false,
        }
    }
}

impl fmt::Debug for ClassDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDb")
            .field("classes", &self.classes.values().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdbridge_callframe::{Decode, Slot};
    use gdbridge_core::mock::{MockCall, MockNative};
    use gdbridge_core::{ObjectHandle, PanicPolicy, Payload, ReleasePolicy};
    use std::sync::atomic::AtomicUsize;

    #[repr(C)]
    struct Sprite {
        base: ObjectHandle,
        frames: i64,
    }

    #[repr(C)]
    struct AnimatedSprite {
        base: Sprite,
    }

    fn setup() -> (Arc<MockNative>, Arc<HandleTable>) {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);
        (mock, table)
    }

    fn frames_trampoline(table: &Arc<HandleTable>) -> Trampoline {
        Trampoline::new(
            Arc::clone(table),
            PanicPolicy::ZeroReturn,
            |sprite: &mut Sprite, (): ()| sprite.frames,
        )
    }

    fn builder(table: &Arc<HandleTable>) -> ClassDbBuilder {
        let mut builder = ClassDbBuilder::new();
        builder
            .register_class("Sprite", "Node2D", |h| Sprite {
                base: ObjectHandle::from_handle(h),
                frames: 12,
            })
            .unwrap()
            .register_class("AnimatedSprite", "Sprite", |h| AnimatedSprite {
                base: Sprite {
                    base: ObjectHandle::from_handle(h),
                    frames: 24,
                },
            })
            .unwrap();
        builder
            .register_virtual(
                "Sprite",
                "_get_frames",
                MethodFlags::CONST,
                frames_trampoline(table),
            )
            .unwrap();
        builder
    }

    #[test]
    fn duplicate_class_is_rejected() {
        let (_mock, table) = setup();
        let mut builder = builder(&table);
        let err = builder
            .register_class("Sprite", "Node", |h| ObjectHandle::from_handle(h))
            .unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateClass("Sprite".into()));
    }

    #[test]
    fn builder_debug_lists_pending_classes() {
        let (_mock, table) = setup();
        let builder = builder(&table);
        let shown = format!("{builder:?}");
        assert!(shown.starts_with("ClassDbBuilder"));
        assert!(shown.contains("\"Sprite\""));
    }

    #[test]
    fn virtual_registration_is_idempotent() {
        let (_mock, table) = setup();
        let mut builder = builder(&table);
        let again = builder
            .register_virtual(
                "Sprite",
                "_get_frames",
                MethodFlags::NORMAL,
                frames_trampoline(&table),
            )
            .unwrap();
        assert!(!again);

        let db = builder.build();
        let entry = db.class("Sprite").unwrap();
        assert_eq!(entry.virtuals().count(), 1);
        let flags = entry.virtuals().next().unwrap().flags;
        assert!(flags.contains(MethodFlags::CONST | MethodFlags::VIRTUAL));
    }

    #[test]
    fn virtual_on_unknown_class_fails() {
        let (_mock, table) = setup();
        let mut builder = ClassDbBuilder::new();
        let err = builder
            .register_virtual(
                "Ghost",
                "_ready",
                MethodFlags::NORMAL,
                frames_trampoline(&table),
            )
            .unwrap_err();
        assert_eq!(err, RegistrationError::UnknownClass("Ghost".into()));
    }

    #[test]
    fn lookup_falls_back_to_none() {
        let (_mock, table) = setup();
        let db = builder(&table).build();
        assert!(db.lookup("Sprite", "_get_frames").is_some());
        assert!(db.lookup("Sprite", "_process").is_none());
        assert!(db.lookup("Missing", "_get_frames").is_none());
    }

    #[test]
    fn overrides_are_inherited() {
        let (_mock, table) = setup();
        let db = builder(&table).build();
        assert!(db.lookup("AnimatedSprite", "_get_frames").is_some());
    }

    #[test]
    fn hierarchy_queries() {
        let (_mock, table) = setup();
        let db = builder(&table).build();
        assert!(db.is_subclass("AnimatedSprite", "Sprite"));
        assert!(db.is_subclass("AnimatedSprite", "Node2D"));
        assert!(!db.is_subclass("Sprite", "AnimatedSprite"));
        assert_eq!(db.native_ancestor("AnimatedSprite"), Some("Node2D"));
    }

    #[test]
    fn unload_stops_lookups() {
        let (_mock, table) = setup();
        let db = builder(&table).build();
        assert!(db.unload("Sprite"));
        assert!(db.lookup("Sprite", "_get_frames").is_none());
        assert!(!db.contains("Sprite"));
        assert!(db.contains("AnimatedSprite"));
        assert!(!db.unload("Sprite"));
    }

    #[test]
    fn wrap_produces_host_type() {
        let (mock, table) = setup();
        let db = builder(&table).build();
        let raw = mock.spawn_object("Node2D");
        let sprite: Sprite = db.wrap_as("Sprite", borrow_from_native(&table, raw)).unwrap();
        assert_eq!(sprite.base.handle().get(), raw);
        assert_eq!(sprite.frames, 12);

        let wrong: Option<AnimatedSprite> =
            db.wrap_as("Sprite", borrow_from_native(&table, raw));
        assert!(wrong.is_none());
    }

    #[test]
    fn instantiate_binds_and_dispatches() {
        let (mock, table) = setup();
        let db = builder(&table).build();

        let animated = db.instantiate("AnimatedSprite", &table).unwrap();
        assert_eq!(mock.class_of(animated.object).as_deref(), Some("Node2D"));
        assert!(mock.calls().contains(&MockCall::SetInstance {
            object: animated.object,
            class: "AnimatedSprite".into(),
        }));
        let mut ret = Slot::ZERO;
        let inherited = db.lookup("AnimatedSprite", "_get_frames").unwrap();
        unsafe {
            inherited.call(animated.ptr, std::ptr::null(), ret.as_mut_ptr());
            assert_eq!(i64::decode(ret.as_ptr()), 24);
        }
        let animated_ref = unsafe { &*(animated.ptr as *const AnimatedSprite) };
        assert_eq!(animated_ref.base.frames, 24);
        assert!(unsafe { db.free_instance("AnimatedSprite", animated.ptr) });

        let instance = db.instantiate("Sprite", &table).unwrap();
        let mut ret = Slot::ZERO;
        let trampoline = db.lookup("Sprite", "_get_frames").unwrap();
        unsafe {
            trampoline.call(instance.ptr, std::ptr::null(), ret.as_mut_ptr());
            assert_eq!(i64::decode(ret.as_ptr()), 12);
            assert!(db.free_instance("Sprite", instance.ptr));
        }
        assert_eq!(mock.total_destroys(), 0);
    }

    #[test]
    fn free_instance_runs_drop() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (_mock, table) = setup();
        let mut builder = ClassDbBuilder::new();
        builder.register_class("Tracked", "Object", |_| Tracked).unwrap();
        let db = builder.build();

        let instance = db.instantiate("Tracked", &table).unwrap();
        unsafe { db.free_instance("Tracked", instance.ptr) };
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }
}
