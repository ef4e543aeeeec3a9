//! Method invocation bridge.
//!
//! Every generated method wrapper has the same shape: encode the arguments
//! into a [`Frame`], call [`Bridge::invoke`] (or [`Bridge::call`] with a
//! resolved [`BoundMethod`]), then decode the return slot. Native status codes
//! come back unchanged; the bridge never retries.

use std::sync::Arc;

use gdbridge_callframe::{Frame, ReturnTarget};
use gdbridge_core::{
    BridgeConfig, BridgeError, BridgeResult, Convention, ErrorCode, Handle, HandleTable, MethodBind,
    MethodFlags, NativeError, NativeInterface, ObjectHandle, Payload, PayloadKind, RawHandle,
    Variant,
};

/// A method bind resolved once, with the signature facts needed to check calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundMethod {
    bind: MethodBind,
    flags: MethodFlags,
    arity: usize,
}

impl BoundMethod {
    pub fn new(bind: MethodBind, flags: MethodFlags, arity: usize) -> Self {
        Self { bind, flags, arity }
    }

    pub fn resolve(
        native: &dyn NativeInterface,
        class: &str,
        method: &str,
        hash: i64,
        flags: MethodFlags,
        arity: usize,
    ) -> BridgeResult<Self> {
        let bind =
            native
                .method_bind(class, method, hash)
                .ok_or_else(|| BridgeError::MethodNotFound {
                    class: class.to_string(),
                    method: method.to_string(),
                    hash,
                })?;
        Ok(Self::new(bind, flags, arity))
    }

    pub fn bind(&self) -> MethodBind {
        self.bind
    }

    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }
}

#[derive(Debug, Clone)]
pub struct Bridge {
    handles: Arc<HandleTable>,
    check_instance_ids: bool,
    frame_capacity: usize,
}

impl Bridge {
    pub fn new(handles: Arc<HandleTable>, config: &BridgeConfig) -> Self {
        Self {
            handles,
            check_instance_ids: config.check_instance_ids,
            frame_capacity: config.frame_capacity,
        }
    }

    pub fn native(&self) -> &Arc<dyn NativeInterface> {
        self.handles.native()
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    /// A pooled frame of the configured capacity.
    pub fn frame(&self) -> Frame {
        Frame::with_capacity(self.frame_capacity)
    }

    /// Call `bind` on `this` with the arguments in `frame`, writing the result
    /// into `ret`.
    ///
    /// Panics on a null receiver, and on a receiver whose native instance no
    /// longer exists when instance checks are enabled.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke<R: ReturnTarget>(
        &self,
        bind: MethodBind,
        this: &Handle,
        frame: &Frame,
        ret: &mut R,
    ) {
        let instance = self.receiver(this);
        unsafe { self.native().ptrcall(bind, instance, frame.args(), ret.ret_ptr()) }
    }

    /// Call a method that takes no receiver.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn invoke_static<R: ReturnTarget>(&self, bind: MethodBind, frame: &Frame, ret: &mut R) {
        unsafe { self.native().ptrcall(bind, 0, frame.args(), ret.ret_ptr()) }
    }

    /// Checked call through a resolved method.
    ///
    /// The frame must hold exactly the declared number of arguments, and only
    /// static methods may omit the receiver.
    pub fn call<R: ReturnTarget>(
        &self,
        method: &BoundMethod,
        this: Option<&Handle>,
        frame: &Frame,
        ret: &mut R,
    ) {
        assert_eq!(
            frame.len(),
            method.arity(),
            "frame holds {} arguments but the method declares {}",
            frame.len(),
            method.arity()
        );
        match (this, method.is_static()) {
            (Some(this), false) => self.invoke(method.bind(), this, frame, ret),
            (None, true) => self.invoke_static(method.bind(), frame, ret),
            (Some(_), true) => panic!("static method called with a receiver"),
            (None, false) => panic!("nil object dereference"),
        }
    }

    /// Call a method whose native return value is an engine status code.
    pub fn invoke_status(
        &self,
        bind: MethodBind,
        this: &Handle,
        frame: &Frame,
    ) -> Result<(), NativeError> {
        let mut ret = frame.ret::<i64>();
        self.invoke(bind, this, frame, &mut ret);
        ErrorCode::check(ret.get())
    }

    /// Call through the variant calling convention. `Ok(None)` is a nil result.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_variadic(
        &self,
        bind: MethodBind,
        this: &Handle,
        args: &[&Variant],
    ) -> BridgeResult<Option<Variant>> {
        let instance = self.receiver(this);
        let mut frame = Frame::with_capacity(args.len());
        for arg in args {
            frame.arg(*arg);
        }

        let mut ret = frame.ret_handle(PayloadKind::Variant, Convention::Adopt);
        let error = unsafe {
            self.native().varcall(
                bind,
                instance,
                frame.args(),
                args.len() as i64,
                ret.ret_ptr(),
            )
        };
        frame.free();
        error.into_result()?;
        Ok(ret.get_as::<Variant>(&self.handles))
    }

    /// Construct an engine object by class name.
    ///
    /// Refcounted classes come back shared, others owned by the host.
    pub fn construct(&self, class: &str, refcounted: bool) -> Option<ObjectHandle> {
        let native = self.native();
        let object = native.construct_object(class);
        if object == 0 {
            return None;
        }
        let raw = RawHandle::object(object, native.instance_id(object));
        let convention = if refcounted {
            Convention::Share
        } else {
            Convention::Adopt
        };
        Some(ObjectHandle::from_handle(
            convention.receive(&self.handles, raw),
        ))
    }

    fn receiver(&self, this: &Handle) -> u64 {
        let raw = this.get_as(PayloadKind::Object);
        if raw.address() == 0 {
            panic!("nil object dereference");
        }
        if self.check_instance_ids
            && let Some(id) = raw.instance_id()
            && self.native().instance_from_id(id) == 0
        {
            panic!(
                "use after free: object {:#x} (instance {id})",
                raw.address()
            );
        }
        raw.address()
    }
}
