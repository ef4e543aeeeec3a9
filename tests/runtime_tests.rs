use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gdbridge::prelude::*;
use gdbridge::types::mock::MockNative;
use gdbridge::{InitLevel, deinitialize_level, initialize_level};

// The runtime is process-wide, so the whole lifecycle lives in one test.
#[test]
fn test_runtime_lifecycle() {
    assert!(matches!(
        Runtime::try_global(),
        Err(BridgeError::NotInitialized)
    ));

    let mock = Arc::new(MockNative::new());
    let runtime = Runtime::new(mock.clone(), BridgeConfig::default())
        .unwrap()
        .install()
        .unwrap();
    assert!(ptr::eq(runtime, Runtime::global()));

    let second = Runtime::new(mock.clone(), BridgeConfig::default()).unwrap();
    assert!(matches!(
        second.install(),
        Err(BridgeError::AlreadyInitialized)
    ));

    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    {
        let started = Arc::clone(&started);
        runtime.on_startup(move || {
            started.fetch_add(1, Ordering::SeqCst);
        });
        let stopped = Arc::clone(&stopped);
        runtime.on_cleanup(move || {
            stopped.fetch_add(1, Ordering::SeqCst);
        });
    }

    for level in [InitLevel::Core, InitLevel::Servers, InitLevel::Scene] {
        initialize_level(ptr::null_mut(), level.into());
    }
    // Unknown levels are ignored.
    initialize_level(ptr::null_mut(), 99);
    assert_eq!(started.load(Ordering::SeqCst), 1);

    let node = runtime.bridge().construct("Node", false).unwrap();
    assert_eq!(runtime.handles().live_count(), 1);
    drop(node);

    for level in [InitLevel::Scene, InitLevel::Servers, InitLevel::Core] {
        deinitialize_level(ptr::null_mut(), level.into());
    }
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.handles().live_count(), 0);
    assert_eq!(mock.total_destroys(), 1);
}
