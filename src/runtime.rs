//! Process-wide runtime: bootstrap, class installation and the engine's
//! initialization callbacks.

use std::ffi::c_void;
use std::mem;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use gdbridge_core::{
    BridgeConfig, BridgeError, BridgeResult, HandleTable, InitLevel, NativeInterface,
    RegistrationError,
};
use gdbridge_registry::{ClassDb, ClassDbBuilder};
use log::{debug, error, info, warn};

use crate::bridge::Bridge;

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Hooks {
    startup: Vec<Hook>,
    post_startup: Vec<Hook>,
    cleanup: Vec<Hook>,
}

pub struct Runtime {
    config: BridgeConfig,
    bridge: Bridge,
    classes: OnceLock<ClassDb>,
    hooks: Mutex<Hooks>,
}

impl Runtime {
    /// Validate the native entry points and build a runtime around them.
    pub fn new(native: Arc<dyn NativeInterface>, config: BridgeConfig) -> BridgeResult<Self> {
        if let Some(&missing) = native.missing_entries().first() {
            error!("native entry `{missing}` was not provided");
            return Err(BridgeError::MissingEntry(missing));
        }
        let handles = HandleTable::new(native, config.release_policy);
        let bridge = Bridge::new(handles, &config);
        Ok(Self {
            config,
            bridge,
            classes: OnceLock::new(),
            hooks: Mutex::new(Hooks::default()),
        })
    }

    /// Make this runtime the process-wide one. Only the first install wins.
    pub fn install(self) -> BridgeResult<&'static Runtime> {
        let mut installed = false;
        let runtime = RUNTIME.get_or_init(|| {
            installed = true;
            self
        });
        if installed {
            info!("native runtime installed");
            Ok(runtime)
        } else {
            Err(BridgeError::AlreadyInitialized)
        }
    }

    /// The installed runtime. Panics when none was installed.
    pub fn global() -> &'static Runtime {
        match RUNTIME.get() {
            Some(runtime) => runtime,
            None => panic!("native runtime used before initialization"),
        }
    }

    pub fn try_global() -> BridgeResult<&'static Runtime> {
        RUNTIME.get().ok_or(BridgeError::NotInitialized)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        self.bridge.handles()
    }

    /// Freeze and install the extension classes. Only one set may be installed.
    pub fn install_classes(&self, builder: ClassDbBuilder) -> BridgeResult<&ClassDb> {
        let mut installed = false;
        let classes = self.classes.get_or_init(|| {
            installed = true;
            builder.build()
        });
        if !installed {
            return Err(RegistrationError::AlreadyInstalled.into());
        }
        info!("installed {} extension classes", classes.len());
        Ok(classes)
    }

    pub fn classes(&self) -> Option<&ClassDb> {
        self.classes.get()
    }

    /// Run `hook` when the engine reaches the startup level.
    pub fn on_startup(&self, hook: impl FnOnce() + Send + 'static) {
        self.lock_hooks().startup.push(Box::new(hook));
    }

    /// Run `hook` after every startup hook has run.
    pub fn on_post_startup(&self, hook: impl FnOnce() + Send + 'static) {
        self.lock_hooks().post_startup.push(Box::new(hook));
    }

    /// Run `hook` when the engine leaves the startup level. Cleanups run in
    /// reverse registration order.
    pub fn on_cleanup(&self, hook: impl FnOnce() + Send + 'static) {
        self.lock_hooks().cleanup.push(Box::new(hook));
    }

    pub fn initialize(&self, level: InitLevel) {
        debug!("initialize {level:?}");
        if level != self.config.startup_level {
            return;
        }
        info!("starting up at {level:?}");
        let startup = mem::take(&mut self.lock_hooks().startup);
        startup.into_iter().for_each(|hook| hook());
        let post = mem::take(&mut self.lock_hooks().post_startup);
        post.into_iter().for_each(|hook| hook());
    }

    pub fn deinitialize(&self, level: InitLevel) {
        debug!("deinitialize {level:?}");
        if level != self.config.startup_level {
            return;
        }
        info!("cleaning up at {level:?}");
        let cleanup = mem::take(&mut self.lock_hooks().cleanup);
        cleanup.into_iter().rev().for_each(|hook| hook());

        // Releases can queue further releases.
        self.handles().cycle();
        self.handles().cycle();
        let live = self.handles().live_count();
        if live > 0 {
            warn!("{live} handles still live at shutdown");
        }
    }

    fn lock_hooks(&self) -> std::sync::MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Engine callback for entering an initialization level.
pub extern "C" fn initialize_level(_userdata: *mut c_void, level: u32) {
    with_level(level, Runtime::initialize);
}

/// Engine callback for leaving an initialization level.
pub extern "C" fn deinitialize_level(_userdata: *mut c_void, level: u32) {
    with_level(level, Runtime::deinitialize);
}

fn with_level(level: u32, f: fn(&Runtime, InitLevel)) {
    let Ok(level) = InitLevel::try_from(level) else {
        warn!("unknown initialization level {level}");
        return;
    };
    match Runtime::try_global() {
        Ok(runtime) => f(runtime, level),
        Err(err) => error!("{err}"),
    }
}
