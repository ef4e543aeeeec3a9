//! C function table handed over by the engine at load time.

use std::ffi::{CString, c_char, c_void};
use std::ptr;

use log::error;

use crate::error::CallError;
use crate::error_code::CallErrorType;
use crate::native::{ArgPtrs, MethodBind, NativeInterface};
use crate::payload::{MAX_WORDS, PayloadKind, RawHandle};

pub type Destructor = unsafe extern "C" fn(value: *mut c_void);

pub type Constructor = unsafe extern "C" fn(base: *mut c_void, args: *const *const c_void);

/// Index of the copy constructor among a builtin type's constructors.
const COPY_CONSTRUCTOR: i32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawCallError {
    pub error: i32,
    pub argument: i32,
    pub expected: i32,
}

/// Engine entry points. Any entry may be null until the engine fills it in;
/// [`NativeInterface::missing_entries`] reports which ones are.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct NativeTable {
    pub classdb_construct_object: Option<unsafe extern "C" fn(class: *const c_char) -> *mut c_void>,
    pub classdb_get_method_bind: Option<
        unsafe extern "C" fn(class: *const c_char, method: *const c_char, hash: i64) -> *mut c_void,
    >,
    pub object_method_bind_ptrcall: Option<
        unsafe extern "C" fn(
            bind: *mut c_void,
            instance: *mut c_void,
            args: *const *const c_void,
            ret: *mut c_void,
        ),
    >,
    pub object_method_bind_call: Option<
        unsafe extern "C" fn(
            bind: *mut c_void,
            instance: *mut c_void,
            args: *const *const c_void,
            count: i64,
            ret: *mut c_void,
            error: *mut RawCallError,
        ),
    >,
    pub object_get_instance_id: Option<unsafe extern "C" fn(object: *mut c_void) -> u64>,
    pub object_get_instance_from_id: Option<unsafe extern "C" fn(id: u64) -> *mut c_void>,
    pub object_set_instance: Option<
        unsafe extern "C" fn(object: *mut c_void, class: *const c_char, instance: *mut c_void),
    >,
    pub object_destroy: Option<unsafe extern "C" fn(object: *mut c_void)>,
    pub refcounted_reference: Option<unsafe extern "C" fn(object: *mut c_void) -> u8>,
    pub refcounted_unreference: Option<unsafe extern "C" fn(object: *mut c_void) -> u8>,
    pub variant_new_copy: Option<unsafe extern "C" fn(dest: *mut c_void, src: *const c_void)>,
    pub variant_destroy: Option<Destructor>,
    pub variant_get_ptr_constructor:
        Option<unsafe extern "C" fn(variant_type: u32, index: i32) -> Option<Constructor>>,
    pub variant_get_ptr_destructor:
        Option<unsafe extern "C" fn(variant_type: u32) -> Option<Destructor>>,
    pub string_new_with_utf8_chars_and_len:
        Option<unsafe extern "C" fn(dest: *mut c_void, text: *const c_char, len: i64)>,
    pub string_to_utf8_chars:
        Option<unsafe extern "C" fn(string: *const c_void, buf: *mut c_char, max: i64) -> i64>,
}

// The table only holds function pointers into the engine, which is itself
// responsible for their thread safety.
unsafe impl Send for NativeTable {}
unsafe impl Sync for NativeTable {}

macro_rules! entry {
    ($table:expr, $name:ident) => {
        match $table.$name {
            Some(f) => f,
            None => panic!(concat!("native entry `", stringify!($name), "` is not loaded")),
        }
    };
}

/// Engine variant type number of a builtin payload kind.
fn variant_type(kind: PayloadKind) -> Option<u32> {
    match kind {
        PayloadKind::String => Some(4),
        PayloadKind::StringName => Some(21),
        PayloadKind::NodePath => Some(22),
        PayloadKind::Callable => Some(25),
        PayloadKind::Signal => Some(26),
        PayloadKind::Dictionary => Some(27),
        PayloadKind::Array => Some(28),
        PayloadKind::PackedByteArray => Some(29),
        PayloadKind::PackedInt32Array => Some(30),
        PayloadKind::PackedInt64Array => Some(31),
        PayloadKind::PackedFloat32Array => Some(32),
        PayloadKind::PackedFloat64Array => Some(33),
        PayloadKind::PackedStringArray => Some(34),
        PayloadKind::PackedVector2Array => Some(35),
        PayloadKind::PackedVector3Array => Some(36),
        PayloadKind::PackedColorArray => Some(37),
        PayloadKind::PackedVector4Array => Some(38),
        PayloadKind::Object | PayloadKind::Variant => None,
    }
}

fn c_name(name: &str) -> Option<CString> {
    match CString::new(name) {
        Ok(name) => Some(name),
        Err(err) => {
            error!("name {name:?} cannot cross the native boundary: {err}");
            None
        }
    }
}

impl NativeInterface for NativeTable {
    fn missing_entries(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        macro_rules! require {
            ($($name:ident),* $(,)?) => {$(
                if self.$name.is_none() {
                    missing.push(stringify!($name));
                }
            )*};
        }
        require!(
            classdb_construct_object,
            classdb_get_method_bind,
            object_method_bind_ptrcall,
            object_method_bind_call,
            object_get_instance_id,
            object_get_instance_from_id,
            object_set_instance,
            object_destroy,
            refcounted_reference,
            refcounted_unreference,
            variant_new_copy,
            variant_destroy,
            variant_get_ptr_constructor,
            variant_get_ptr_destructor,
            string_new_with_utf8_chars_and_len,
            string_to_utf8_chars,
        );
        missing
    }

    fn construct_object(&self, class: &str) -> u64 {
        let construct = entry!(self, classdb_construct_object);
        match c_name(class) {
            Some(class) => unsafe { construct(class.as_ptr()) as u64 },
            None => 0,
        }
    }

    fn method_bind(&self, class: &str, method: &str, hash: i64) -> Option<MethodBind> {
        let get = entry!(self, classdb_get_method_bind);
        let (class, method) = (c_name(class)?, c_name(method)?);
        let bind = unsafe { get(class.as_ptr(), method.as_ptr(), hash) };
        MethodBind::from_raw(bind as u64)
    }

    unsafe fn ptrcall(&self, bind: MethodBind, instance: u64, args: ArgPtrs, ret: *mut c_void) {
        let call = entry!(self, object_method_bind_ptrcall);
        unsafe {
            call(
                bind.as_raw() as *mut c_void,
                instance as *mut c_void,
                args,
                ret,
            )
        }
    }

    unsafe fn varcall(
        &self,
        bind: MethodBind,
        instance: u64,
        args: ArgPtrs,
        count: i64,
        ret: *mut c_void,
    ) -> CallError {
        let call = entry!(self, object_method_bind_call);
        let mut raw = RawCallError {
            error: 0,
            argument: 0,
            expected: 0,
        };
        unsafe {
            call(
                bind.as_raw() as *mut c_void,
                instance as *mut c_void,
                args,
                count,
                ret,
                &mut raw,
            )
        };
        CallError {
            error: CallErrorType::try_from(raw.error).unwrap_or(CallErrorType::InvalidMethod),
            argument: raw.argument,
            expected: raw.expected,
        }
    }

    fn instance_id(&self, object: u64) -> u64 {
        let get = entry!(self, object_get_instance_id);
        unsafe { get(object as *mut c_void) }
    }

    fn instance_from_id(&self, id: u64) -> u64 {
        let get = entry!(self, object_get_instance_from_id);
        unsafe { get(id) as u64 }
    }

    fn set_instance(&self, object: u64, class: &str, instance: *mut c_void) {
        let set = entry!(self, object_set_instance);
        if let Some(class) = c_name(class) {
            unsafe { set(object as *mut c_void, class.as_ptr(), instance) }
        }
    }

    fn destroy(&self, raw: &RawHandle) {
        let mut words = raw.words();
        let value = words.as_mut_ptr() as *mut c_void;
        match raw.kind() {
            PayloadKind::Object => {
                let destroy = entry!(self, object_destroy);
                unsafe { destroy(raw.address() as *mut c_void) }
            }
            PayloadKind::Variant => {
                let destroy = entry!(self, variant_destroy);
                unsafe { destroy(value) }
            }
            kind => {
                let lookup = entry!(self, variant_get_ptr_destructor);
                let destructor = variant_type(kind).and_then(|ty| unsafe { lookup(ty) });
                match destructor {
                    Some(destroy) => unsafe { destroy(value) },
                    None => error!("no destructor for {kind:?}"),
                }
            }
        }
    }

    // Builtin values are copied rather than referenced, so only objects take
    // part in reference counting. A builtin held as shared is its sole owner.
    fn reference(&self, raw: &RawHandle) {
        if raw.kind() == PayloadKind::Object {
            let reference = entry!(self, refcounted_reference);
            unsafe { reference(raw.address() as *mut c_void) };
        }
    }

    fn unreference(&self, raw: &RawHandle) -> bool {
        if raw.kind() != PayloadKind::Object {
            return true;
        }
        let unreference = entry!(self, refcounted_unreference);
        unsafe { unreference(raw.address() as *mut c_void) != 0 }
    }

    fn copy(&self, raw: &RawHandle) -> RawHandle {
        let words = raw.words();
        let src = words.as_ptr() as *const c_void;
        let mut out = [0u64; MAX_WORDS];
        let dest = out.as_mut_ptr() as *mut c_void;
        match raw.kind() {
            PayloadKind::Object => return *raw,
            PayloadKind::Variant => {
                let copy = entry!(self, variant_new_copy);
                unsafe { copy(dest, src) }
            }
            kind => {
                let lookup = entry!(self, variant_get_ptr_constructor);
                let constructor = match variant_type(kind) {
                    Some(ty) => unsafe { lookup(ty, COPY_CONSTRUCTOR) },
                    None => None,
                };
                match constructor {
                    Some(construct) => unsafe { construct(dest, &src) },
                    None => panic!("no copy constructor for {kind:?}"),
                }
            }
        }
        RawHandle::new(raw.kind(), out)
    }

    fn new_string(&self, text: &str) -> RawHandle {
        let construct = entry!(self, string_new_with_utf8_chars_and_len);
        let mut word = 0u64;
        unsafe {
            construct(
                &mut word as *mut u64 as *mut c_void,
                text.as_ptr() as *const c_char,
                text.len() as i64,
            )
        };
        RawHandle::word(PayloadKind::String, word)
    }

    fn string_to_utf8(&self, raw: &RawHandle) -> String {
        let read = entry!(self, string_to_utf8_chars);
        let word = raw.address();
        let string = &word as *const u64 as *const c_void;
        let len = unsafe { read(string, ptr::null_mut(), 0) };
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u8; len as usize];
        unsafe { read(string, buf.as_mut_ptr() as *mut c_char, len) };
        String::from_utf8_lossy(&buf).into_owned()
    }
}
