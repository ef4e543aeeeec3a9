//! Trampolines for virtual overrides.
//!
//! A [`Trampoline`] is the single entry point the engine calls for every
//! overridden virtual, whatever its signature. The typed constructor captures
//! how to unpack the argument buffer and pack the result, so the call site only
//! deals in raw pointers.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use gdbridge_callframe::{ArgList, IntoRet};
use gdbridge_core::{ArgPtrs, HandleTable, PanicPolicy};
use log::error;

type Thunk = dyn Fn(*mut c_void, ArgPtrs, *mut c_void) + Send + Sync;

#[derive(Clone)]
pub struct Trampoline {
    thunk: Arc<Thunk>,
    arity: usize,
    ret_bytes: usize,
    policy: PanicPolicy,
}

impl Trampoline {
    /// Trampoline for an override of the form `fn(&mut T, (args...)) -> R`.
    ///
    /// The engine's instance pointer is reinterpreted as `*mut T`, so `T` must
    /// be the type the class was registered with.
    pub fn new<T, A, R, F>(table: Arc<HandleTable>, policy: PanicPolicy, body: F) -> Self
    where
        T: 'static,
        A: ArgList + 'static,
        R: IntoRet + 'static,
        F: Fn(&mut T, A) -> R + Send + Sync + 'static,
    {
        let thunk = move |this: *mut c_void, args: ArgPtrs, ret: *mut c_void| {
            assert!(!this.is_null(), "virtual call on a null instance");
            let this = unsafe { &mut *(this as *mut T) };
            let args = unsafe { A::unpack(args, &table) };
            let result = body(this, args);
            unsafe { result.into_ret(ret) };
        };
        Self {
            thunk: Arc::new(thunk),
            arity: A::ARITY,
            ret_bytes: R::RET_BYTES,
            policy,
        }
    }

    /// Trampoline working directly on the native buffers.
    pub fn from_raw<F>(arity: usize, ret_bytes: usize, policy: PanicPolicy, body: F) -> Self
    where
        F: Fn(*mut c_void, ArgPtrs, *mut c_void) + Send + Sync + 'static,
    {
        Self {
            thunk: Arc::new(body),
            arity,
            ret_bytes,
            policy,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn ret_bytes(&self) -> usize {
        self.ret_bytes
    }

    pub fn policy(&self) -> PanicPolicy {
        self.policy
    }

    /// Run the override. A panic never crosses back into the engine.
    ///
    /// # Safety
    /// `this` must point to the instance type the trampoline was built for,
    /// `args` must hold `arity()` valid argument pointers and `ret` must be
    /// valid for `ret_bytes()` bytes of writes.
    pub unsafe fn call(&self, this: *mut c_void, args: ArgPtrs, ret: *mut c_void) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.thunk)(this, args, ret)));
        if let Err(payload) = outcome {
            error!("virtual override panicked: {}", panic_message(&*payload));
            match self.policy {
                PanicPolicy::Abort => std::process::abort(),
                PanicPolicy::ZeroReturn => {
                    if self.ret_bytes > 0 && !ret.is_null() {
                        unsafe { std::ptr::write_bytes(ret as *mut u8, 0, self.ret_bytes) };
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("arity", &self.arity)
            .field("ret_bytes", &self.ret_bytes)
            .field("policy", &self.policy)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdbridge_callframe::{Decode, Frame, Slot};
    use gdbridge_core::ReleasePolicy;
    use gdbridge_core::mock::MockNative;
    use gdbridge_core::values::Vector2;

    struct Player {
        speed: f64,
        steps: u32,
    }

    fn table() -> Arc<HandleTable> {
        HandleTable::new(Arc::new(MockNative::new()), ReleasePolicy::Immediate)
    }

    #[test]
    fn typed_trampoline_round_trip() {
        let trampoline = Trampoline::new(
            table(),
            PanicPolicy::ZeroReturn,
            |player: &mut Player, (delta, dir): (f64, Vector2)| {
                player.steps += 1;
                Vector2 {
                    x: dir.x * (player.speed * delta) as f32,
                    y: dir.y * (player.speed * delta) as f32,
                }
            },
        );
        assert_eq!(trampoline.arity(), 2);
        assert_eq!(trampoline.ret_bytes(), 8);

        let mut player = Player {
            speed: 10.0,
            steps: 0,
        };
        let mut frame = Frame::with_capacity(2);
        frame.arg(0.5f64);
        frame.arg(Vector2 { x: 1.0, y: -1.0 });
        let mut ret = Slot::ZERO;

        unsafe {
            trampoline.call(
                &mut player as *mut Player as *mut c_void,
                frame.args(),
                ret.as_mut_ptr(),
            );
            assert_eq!(Vector2::decode(ret.as_ptr()), Vector2 { x: 5.0, y: -5.0 });
        }
        assert_eq!(player.steps, 1);
    }

    #[test]
    fn panics_become_zero_returns() {
        let trampoline = Trampoline::new(
            table(),
            PanicPolicy::ZeroReturn,
            |_: &mut Player, (): ()| -> i64 { panic!("override failed") },
        );
        let mut player = Player {
            speed: 0.0,
            steps: 0,
        };
        let mut ret = Slot::ZERO;
        unsafe {
            gdbridge_callframe::set_ret(ret.as_mut_ptr(), 7i64);
            trampoline.call(
                &mut player as *mut Player as *mut c_void,
                std::ptr::null(),
                ret.as_mut_ptr(),
            );
            assert_eq!(i64::decode(ret.as_ptr()), 0);
        }
    }

    #[test]
    fn null_instance_is_caught() {
        let trampoline = Trampoline::new(
            table(),
            PanicPolicy::ZeroReturn,
            |player: &mut Player, (): ()| player.speed,
        );
        let mut ret = Slot::ZERO;
        unsafe {
            trampoline.call(std::ptr::null_mut(), std::ptr::null(), ret.as_mut_ptr());
            assert_eq!(f64::decode(ret.as_ptr()), 0.0);
        }
    }
}
