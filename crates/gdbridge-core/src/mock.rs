//! In-memory stand-in for the engine.
//!
//! Records every call that matters for ownership accounting and lets tests
//! install closures as native methods.

use std::ffi::c_void;
use std::slice;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use crate::error::CallError;
use crate::error_code::CallErrorType;
use crate::native::{ArgPtrs, MethodBind, NativeInterface};
use crate::payload::{PayloadKind, RawHandle};

/// Body of a mocked method: receiver pointer, argument slot pointers, return slot.
pub type MockMethod = Arc<dyn Fn(u64, &[*const c_void], *mut c_void) + Send + Sync>;

/// Body of a mocked variadic method.
pub type MockVarMethod =
    Arc<dyn Fn(u64, &[*const c_void], *mut c_void) -> CallError + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    Construct(String),
    Destroy(RawHandle),
    Reference(u64),
    Unreference(u64),
    Copy(RawHandle),
    SetInstance { object: u64, class: String },
    Ptrcall { bind: u64, instance: u64 },
    Varcall {
        bind: u64,
        instance: u64,
        count: i64,
    },
    NewString(String),
}

enum Body {
    Ptr(MockMethod),
    Var(MockVarMethod),
}

struct MockMethodEntry {
    class: String,
    name: String,
    arity: usize,
    body: Body,
}

struct MockObject {
    class: String,
    instance_id: u64,
    alive: bool,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    objects: FxHashMap<u64, MockObject>,
    ids: FxHashMap<u64, u64>,
    refcounts: FxHashMap<u64, i64>,
    strings: FxHashMap<u64, String>,
    methods: Vec<MockMethodEntry>,
    next_ptr: u64,
    next_id: u64,
    missing: Vec<&'static str>,
}

const BIND_BASE: u64 = 0xB000;

#[derive(Default)]
pub struct MockNative {
    state: Mutex<MockState>,
}

impl MockNative {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the given entries as missing at bootstrap.
    pub fn with_missing(missing: &[&'static str]) -> Self {
        let mock = Self::new();
        mock.lock().missing = missing.to_vec();
        mock
    }

    pub fn bind_method<F>(&self, class: &str, method: &str, arity: usize, body: F) -> MethodBind
    where
        F: Fn(u64, &[*const c_void], *mut c_void) + Send + Sync + 'static,
    {
        self.add_method(class, method, arity, Body::Ptr(Arc::new(body)))
    }

    pub fn bind_varcall<F>(&self, class: &str, method: &str, body: F) -> MethodBind
    where
        F: Fn(u64, &[*const c_void], *mut c_void) -> CallError + Send + Sync + 'static,
    {
        self.add_method(class, method, 0, Body::Var(Arc::new(body)))
    }

    /// Create a live object as if the engine had constructed it.
    pub fn spawn_object(&self, class: &str) -> RawHandle {
        let mut state = self.lock();
        let (ptr, id) = Self::alloc_object(&mut state, class);
        RawHandle::object(ptr, id)
    }

    /// Free an object behind the host's back.
    pub fn kill_object(&self, ptr: u64) {
        if let Some(object) = self.lock().objects.get_mut(&ptr) {
            object.alive = false;
        }
    }

    pub fn is_alive(&self, ptr: u64) -> bool {
        self.lock().objects.get(&ptr).is_some_and(|o| o.alive)
    }

    pub fn class_of(&self, ptr: u64) -> Option<String> {
        self.lock().objects.get(&ptr).map(|o| o.class.clone())
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn destroy_count(&self, address: u64) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Destroy(raw) if raw.address() == address))
            .count()
    }

    pub fn total_destroys(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Destroy(_)))
            .count()
    }

    pub fn ptrcall_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Ptrcall { .. }))
            .count()
    }

    pub fn refcount(&self, ptr: u64) -> i64 {
        self.lock().refcounts.get(&ptr).copied().unwrap_or(0)
    }

    pub fn live_strings(&self) -> usize {
        self.lock().strings.len()
    }

    fn add_method(&self, class: &str, method: &str, arity: usize, body: Body) -> MethodBind {
        let mut state = self.lock();
        state.methods.push(MockMethodEntry {
            class: class.to_string(),
            name: method.to_string(),
            arity,
            body,
        });
        let raw = BIND_BASE + state.methods.len() as u64;
        MethodBind::from_raw(raw).unwrap_or_else(|| unreachable!())
    }

    fn alloc_object(state: &mut MockState, class: &str) -> (u64, u64) {
        state.next_ptr += 1;
        state.next_id += 1;
        let ptr = 0x10_0000 + state.next_ptr * 0x10;
        let id = 1000 + state.next_id;
        state.objects.insert(
            ptr,
            MockObject {
                class: class.to_string(),
                instance_id: id,
                alive: true,
            },
        );
        state.ids.insert(id, ptr);
        (ptr, id)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NativeInterface for MockNative {
    fn missing_entries(&self) -> Vec<&'static str> {
        self.lock().missing.clone()
    }

    fn construct_object(&self, class: &str) -> u64 {
        let mut state = self.lock();
        state.calls.push(MockCall::Construct(class.to_string()));
        Self::alloc_object(&mut state, class).0
    }

    fn method_bind(&self, class: &str, method: &str, _hash: i64) -> Option<MethodBind> {
        let state = self.lock();
        let index = state.methods.iter().position(|m| m.class == class && m.name == method)?;
        MethodBind::from_raw(BIND_BASE + index as u64 + 1)
    }

    unsafe fn ptrcall(&self, bind: MethodBind, instance: u64, args: ArgPtrs, ret: *mut c_void) {
        let (body, arity) = {
            let mut state = self.lock();
            state.calls.push(MockCall::Ptrcall {
                bind: bind.as_raw(),
                instance,
            });
            let index = (bind.as_raw() - BIND_BASE - 1) as usize;
            match state.methods.get(index) {
                Some(MockMethodEntry {
                    body: Body::Ptr(body),
                    arity,
                    ..
                }) => (body.clone(), *arity),
                _ => panic!("mock: {bind:?} is not a pointer-call method"),
            }
        };
        let args = if arity == 0 || args.is_null() {
            &[][..]
        } else {
            unsafe { slice::from_raw_parts(args, arity) }
        };
        body(instance, args, ret);
    }

    unsafe fn varcall(
        &self,
        bind: MethodBind,
        instance: u64,
        args: ArgPtrs,
        count: i64,
        ret: *mut c_void,
    ) -> CallError {
        let body = {
            let mut state = self.lock();
            state.calls.push(MockCall::Varcall {
                bind: bind.as_raw(),
                instance,
                count,
            });
            let index = (bind.as_raw() - BIND_BASE - 1) as usize;
            match state.methods.get(index) {
                Some(MockMethodEntry {
                    body: Body::Var(body),
                    ..
                }) => body.clone(),
                _ => {
                    return CallError {
                        error: CallErrorType::InvalidMethod,
                        argument: 0,
                        expected: 0,
                    };
                }
            }
        };
        let args = if count <= 0 || args.is_null() {
            &[][..]
        } else {
            unsafe { slice::from_raw_parts(args, count as usize) }
        };
        body(instance, args, ret)
    }

    fn instance_id(&self, object: u64) -> u64 {
        self.lock().objects.get(&object).map_or(0, |o| o.instance_id)
    }

    fn instance_from_id(&self, id: u64) -> u64 {
        let state = self.lock();
        match state.ids.get(&id) {
            Some(ptr) if state.objects.get(ptr).is_some_and(|o| o.alive) => *ptr,
            _ => 0,
        }
    }

    fn set_instance(&self, object: u64, class: &str, _instance: *mut c_void) {
        self.lock().calls.push(MockCall::SetInstance {
            object,
            class: class.to_string(),
        });
    }

    fn destroy(&self, raw: &RawHandle) {
        let mut state = self.lock();
        state.calls.push(MockCall::Destroy(*raw));
        match raw.kind() {
            PayloadKind::Object => {
                if let Some(object) = state.objects.get_mut(&raw.address()) {
                    object.alive = false;
                }
            }
            PayloadKind::String => {
                state.strings.remove(&raw.address());
            }
            _ => {}
        }
    }

    // Like the engine, only objects carry a reference count.
    fn reference(&self, raw: &RawHandle) {
        let mut state = self.lock();
        state.calls.push(MockCall::Reference(raw.address()));
        if raw.kind() == PayloadKind::Object {
            *state.refcounts.entry(raw.address()).or_insert(0) += 1;
        }
    }

    fn unreference(&self, raw: &RawHandle) -> bool {
        let mut state = self.lock();
        state.calls.push(MockCall::Unreference(raw.address()));
        if raw.kind() != PayloadKind::Object {
            return true;
        }
        let count = state.refcounts.entry(raw.address()).or_insert(0);
        *count -= 1;
        *count <= 0
    }

    fn copy(&self, raw: &RawHandle) -> RawHandle {
        let mut state = self.lock();
        state.calls.push(MockCall::Copy(*raw));
        if raw.kind() == PayloadKind::Object {
            return *raw;
        }
        state.next_ptr += 1;
        let ptr = 0x50_0000 + state.next_ptr * 0x10;
        if raw.kind() == PayloadKind::String {
            let text = state.strings.get(&raw.address()).cloned().unwrap_or_default();
            state.strings.insert(ptr, text);
        }
        let mut words = raw.words();
        words[0] = ptr;
        RawHandle::new(raw.kind(), words)
    }

    fn new_string(&self, text: &str) -> RawHandle {
        let mut state = self.lock();
        state.calls.push(MockCall::NewString(text.to_string()));
        state.next_ptr += 1;
        let ptr = 0x50_0000 + state.next_ptr * 0x10;
        state.strings.insert(ptr, text.to_string());
        RawHandle::word(PayloadKind::String, ptr)
    }

    fn string_to_utf8(&self, raw: &RawHandle) -> String {
        self.lock().strings.get(&raw.address()).cloned().unwrap_or_default()
    }
}
