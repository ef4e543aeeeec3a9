//! Benchmarks for the hot paths of a native call: frame encoding, pointer
//! calls through the bridge, handle churn and virtual dispatch.
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin
//! ```

use std::ffi::c_void;
use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use gdbridge::types::mock::MockNative;
use gdbridge::types::values::{Transform3D, Vector2, Vector3};
use gdbridge::types::{RawHandle, adopt_from_native};
use gdbridge::{
    Bridge, BridgeConfig, ClassDbBuilder, Frame, HandleTable, MethodFlags, PanicPolicy,
    ReleasePolicy, Trampoline,
};

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

fn setup() -> (Arc<MockNative>, Bridge) {
    let mock = Arc::new(MockNative::new());
    let table = HandleTable::new(mock.clone(), ReleasePolicy::Immediate);
    (mock, Bridge::new(table, &BridgeConfig::default()))
}

fn frame_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("frame");

    group.bench_function("encode_mixed_args", |b| {
        b.iter(|| {
            let mut frame = Frame::new();
            frame.arg(black_box(42i32));
            frame.arg(black_box(0.5f32));
            frame.arg(black_box(true));
            frame.arg(black_box(Transform3D::default()));
            black_box(frame.args());
            frame.free();
            end_profiling_frame();
        })
    });

    group.finish();
}

fn call_benchmarks(c: &mut Criterion) {
    let (mock, bridge) = setup();
    let bind = mock.bind_method("Node3D", "translate", 1, |_, args, _| {
        black_box(unsafe { (args[0] as *const Vector3).read() });
    });
    let length = mock.bind_method("Vector2", "length", 1, |_, args, ret| {
        let v = unsafe { (args[0] as *const Vector2).read() };
        unsafe { (ret as *mut f64).write(f64::from(v.x.hypot(v.y))) };
    });
    let node = adopt_from_native(bridge.handles(), mock.spawn_object("Node3D"));

    let mut group = c.benchmark_group("ptrcall");
    group.bench_function("void_return", |b| {
        b.iter(|| {
            let mut frame = bridge.frame();
            frame.arg(Vector3 {
                x: 1.0,
                y: 0.0,
                z: 0.0,
            });
            bridge.invoke(bind, &node, &frame, &mut frame.nil());
            frame.free();
        })
    });
    group.bench_function("scalar_return", |b| {
        b.iter(|| {
            let mut frame = bridge.frame();
            frame.arg(Vector2 { x: 3.0, y: 4.0 });
            let mut ret = frame.ret::<f64>();
            bridge.invoke(length, &node, &frame, &mut ret);
            frame.free();
            black_box(ret.get())
        })
    });
    group.finish();
}

fn handle_benchmarks(c: &mut Criterion) {
    let (_mock, bridge) = setup();
    let table = bridge.handles();

    c.bench_function("handle_wrap_release", |b| {
        b.iter(|| {
            let handle = adopt_from_native(table, RawHandle::object(black_box(0x1000), 1));
            handle.release();
        })
    });
}

struct Mover {
    moved: f64,
}

fn dispatch_benchmarks(c: &mut Criterion) {
    let (mock, bridge) = setup();
    let mut builder = ClassDbBuilder::new();
    builder
        .register_class("Mover", "Node", |_| Mover { moved: 0.0 })
        .unwrap();
    builder
        .register_virtual(
            "Mover",
            "_process",
            MethodFlags::NORMAL,
            Trampoline::new(
                Arc::clone(bridge.handles()),
                PanicPolicy::ZeroReturn,
                |mover: &mut Mover, (delta,): (f64,)| mover.moved += delta,
            ),
        )
        .unwrap();
    let db = builder.build();
    let instance = db.instantiate("Mover", bridge.handles()).unwrap();

    c.bench_function("virtual_lookup_and_call", |b| {
        b.iter(|| {
            let trampoline = db.lookup("Mover", black_box("_process")).unwrap();
            let mut frame = Frame::with_capacity(1);
            frame.arg(0.016f64);
            unsafe { trampoline.call(instance.ptr, frame.args(), std::ptr::null_mut::<c_void>()) };
            frame.free();
        })
    });

    unsafe { db.free_instance("Mover", instance.ptr) };
    drop(mock);
}

criterion_group!(
    benches,
    frame_benchmarks,
    call_benchmarks,
    handle_benchmarks,
    dispatch_benchmarks
);
criterion_main!(benches);
