//! C-ABI entry points through which the engine queries and calls overrides.
//!
//! The engine stores [`ClassEntry::userdata`] per registered class. When it
//! needs a virtual it asks [`get_virtual_call_data`] for that class and name,
//! keeps the returned pointer, and later passes it back to
//! [`call_virtual_with_data`] together with the instance and argument buffers.

use std::ffi::{CStr, c_char, c_void};
use std::ptr;

use crate::class_db::ClassEntry;
use crate::trampoline::Trampoline;

/// Pointer to the trampoline overriding `name`, or null when the class does
/// not override it.
///
/// # Safety
/// `class_userdata` must be null or come from [`ClassEntry::userdata`] of a
/// class database that is still alive. `name` must be null or a valid
/// nul-terminated string.
pub unsafe extern "C" fn get_virtual_call_data(
    class_userdata: *mut c_void,
    name: *const c_char,
) -> *mut c_void {
    if class_userdata.is_null() || name.is_null() {
        return ptr::null_mut();
    }
    let entry = unsafe { &*(class_userdata as *const ClassEntry) };
    let Ok(name) = unsafe { CStr::from_ptr(name) }.to_str() else {
        return ptr::null_mut();
    };
    match entry.virtual_method(name) {
        Some(trampoline) => trampoline as *const Trampoline as *mut c_void,
        None => ptr::null_mut(),
    }
}

/// Run the trampoline returned by [`get_virtual_call_data`].
///
/// # Safety
/// `data` must be null or a pointer returned by `get_virtual_call_data` whose
/// class database is still alive. `instance`, `args` and `ret` must satisfy
/// [`Trampoline::call`].
pub unsafe extern "C" fn call_virtual_with_data(
    instance: *mut c_void,
    _name: *const c_char,
    data: *mut c_void,
    args: *const *const c_void,
    ret: *mut c_void,
) {
    if data.is_null() {
        return;
    }
    let trampoline = unsafe { &*(data as *const Trampoline) };
    unsafe { trampoline.call(instance, args, ret) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_db::ClassDbBuilder;
    use gdbridge_callframe::{Decode, Frame, Slot};
    use gdbridge_core::mock::MockNative;
    use gdbridge_core::{
        HandleTable, MethodFlags, ObjectHandle, PanicPolicy, Payload, ReleasePolicy,
    };
    use std::sync::Arc;

    struct Counter {
        _base: ObjectHandle,
        total: i64,
    }

    #[test]
    fn engine_round_trip_through_c_abi() {
        let mock = Arc::new(MockNative::new());
        let table = HandleTable::new(mock, ReleasePolicy::Immediate);

        let mut builder = ClassDbBuilder::new();
        builder
            .register_class("Counter", "RefCounted", |h| Counter {
                _base: ObjectHandle::from_handle(h),
                total: 0,
            })
            .unwrap();
        builder
            .register_virtual(
                "Counter",
                "_add",
                MethodFlags::NORMAL,
                Trampoline::new(
                    Arc::clone(&table),
                    PanicPolicy::ZeroReturn,
                    |counter: &mut Counter, (n,): (i64,)| {
                        counter.total += n;
                        counter.total
                    },
                ),
            )
            .unwrap();
        let db = builder.build();
        let userdata = db.class("Counter").unwrap().userdata();
        let instance = db.instantiate("Counter", &table).unwrap();

        unsafe {
            let missing = get_virtual_call_data(userdata, c"_process".as_ptr());
            assert!(missing.is_null());

            let data = get_virtual_call_data(userdata, c"_add".as_ptr());
            assert!(!data.is_null());

            let mut frame = Frame::with_capacity(1);
            frame.arg(40i64);
            let mut ret = Slot::ZERO;
            call_virtual_with_data(
                instance.ptr,
                c"_add".as_ptr(),
                data,
                frame.args(),
                ret.as_mut_ptr(),
            );
            call_virtual_with_data(
                instance.ptr,
                c"_add".as_ptr(),
                data,
                frame.args(),
                ret.as_mut_ptr(),
            );
            assert_eq!(i64::decode(ret.as_ptr()), 80);
            db.free_instance("Counter", instance.ptr);
        }
    }

    #[test]
    fn null_inputs_are_not_overrides() {
        unsafe {
            assert!(get_virtual_call_data(ptr::null_mut(), c"_ready".as_ptr()).is_null());
            call_virtual_with_data(
                ptr::null_mut(),
                ptr::null(),
                ptr::null_mut(),
                ptr::null(),
                ptr::null_mut(),
            );
        }
    }
}
