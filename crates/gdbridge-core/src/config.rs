//! Runtime configuration.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Default number of argument slots in a pooled frame.
pub const DEFAULT_FRAME_CAPACITY: usize = 16;

/// When finalized handles release their native resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ReleasePolicy {
    /// `Drop` releases on the dropping thread.
    #[default]
    Immediate,
    /// `Drop` only queues the release; `HandleTable::cycle` performs it.
    Deferred,
}

/// What a trampoline does with a panic raised by a host override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PanicPolicy {
    /// Log and abort the process.
    #[default]
    Abort,
    /// Log and hand the native caller a zeroed return value.
    ZeroReturn,
}

/// Engine initialization levels, in the order the engine walks them.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive,
)]
#[repr(u32)]
pub enum InitLevel {
    Core = 0,
    Servers = 1,
    Scene = 2,
    Editor = 3,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub frame_capacity: usize,
    pub release_policy: ReleasePolicy,
    pub panic_policy: PanicPolicy,
    pub check_instance_ids: bool,
    pub startup_level: InitLevel,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            release_policy: ReleasePolicy::Immediate,
            panic_policy: PanicPolicy::Abort,
            check_instance_ids: true,
            startup_level: InitLevel::Scene,
        }
    }
}

impl BridgeConfig {
    pub fn with_frame_capacity(mut self, capacity: usize) -> Self {
        self.frame_capacity = capacity;
        self
    }

    pub fn with_release_policy(mut self, policy: ReleasePolicy) -> Self {
        self.release_policy = policy;
        self
    }

    pub fn with_panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }

    pub fn with_instance_checks(mut self, enabled: bool) -> Self {
        self.check_instance_ids = enabled;
        self
    }

    pub fn with_startup_level(mut self, level: InitLevel) -> Self {
        self.startup_level = level;
        self
    }
}
