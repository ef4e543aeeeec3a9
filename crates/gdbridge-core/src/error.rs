use std::fmt;

use thiserror::Error;

use crate::error_code::{CallErrorType, ErrorCode};

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Native(#[from] NativeError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("native interface is missing `{0}`")]
    MissingEntry(&'static str),

    #[error("runtime already initialized")]
    AlreadyInitialized,

    #[error("runtime not initialized")]
    NotInitialized,

    #[error("method bind not found: {class}::{method} (hash {hash})")]
    MethodNotFound {
        class: String,
        method: String,
        hash: i64,
    },

    #[error("name {name:?} contains a nul byte at {position}")]
    InteriorNul { name: String, position: usize },
}

/// A non-zero status returned by a native method, carried unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeError {
    pub code: i64,
}

impl NativeError {
    /// The named engine error, when the code is one the engine defines.
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "native error {} ({kind:?})", self.code),
            None => write!(f, "native error {}", self.code),
        }
    }
}

impl std::error::Error for NativeError {}

/// Failure record of a variadic call.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
#[error("call failed: {error:?} (argument {argument}, expected {expected})")]
pub struct CallError {
    pub error: CallErrorType,
    pub argument: i32,
    pub expected: i32,
}

impl CallError {
    pub const OK: CallError = CallError {
        error: CallErrorType::Ok,
        argument: 0,
        expected: 0,
    };

    pub fn into_result(self) -> Result<(), CallError> {
        match self.error {
            CallErrorType::Ok => Ok(()),
            _ => Err(self),
        }
    }
}

impl Default for CallError {
    fn default() -> Self {
        Self::OK
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("class `{0}` is already registered")]
    DuplicateClass(String),

    #[error("class `{0}` is not registered")]
    UnknownClass(String),

    #[error("class database already installed")]
    AlreadyInstalled,
}
