//! Flat engine error codes.
//!
//! Native methods report failure through an integer return value. `0` means
//! success; every other value is one of the codes below, or a code this crate
//! does not know about, which is still carried through unchanged.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::NativeError;

/// Engine error enumeration, numbered exactly as the native side numbers it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i64)]
pub enum ErrorCode {
    Ok = 0,
    Failed = 1,
    Unavailable = 2,
    Unconfigured = 3,
    Unauthorized = 4,
    ParameterRangeError = 5,
    OutOfMemory = 6,
    FileNotFound = 7,
    FileBadDrive = 8,
    FileBadPath = 9,
    FileNoPermission = 10,
    FileAlreadyInUse = 11,
    FileCantOpen = 12,
    FileCantWrite = 13,
    FileCantRead = 14,
    FileUnrecognized = 15,
    FileCorrupt = 16,
    FileMissingDependencies = 17,
    FileEof = 18,
    CantOpen = 19,
    CantCreate = 20,
    QueryFailed = 21,
    AlreadyInUse = 22,
    Locked = 23,
    Timeout = 24,
    CantConnect = 25,
    CantResolve = 26,
    ConnectionError = 27,
    CantAcquireResource = 28,
    CantFork = 29,
    InvalidData = 30,
    InvalidParameter = 31,
    AlreadyExists = 32,
    DoesNotExist = 33,
    DatabaseCantRead = 34,
    DatabaseCantWrite = 35,
    CompilationFailed = 36,
    MethodNotFound = 37,
    LinkFailed = 38,
    ScriptFailed = 39,
    CyclicLink = 40,
    InvalidDeclaration = 41,
    DuplicateSymbol = 42,
    ParseError = 43,
    Busy = 44,
    Skip = 45,
    Help = 46,
    Bug = 47,
    PrinterOnFire = 48,
}

impl ErrorCode {
    /// Map a raw status code to `Ok(())` or the untranslated error.
    pub fn check(code: i64) -> Result<(), NativeError> {
        if code == 0 {
            Ok(())
        } else {
            Err(NativeError { code })
        }
    }

    /// Look up the named variant for a raw code.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::try_from(code).ok()
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

/// Kind of failure reported by a variadic (variant) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum CallErrorType {
    Ok = 0,
    InvalidMethod = 1,
    InvalidArgument = 2,
    TooManyArguments = 3,
    TooFewArguments = 4,
    InstanceIsNull = 5,
    MethodNotConst = 6,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_success() {
        assert!(ErrorCode::check(0).is_ok());
    }

    #[test]
    fn codes_are_carried_verbatim() {
        let err = ErrorCode::check(7).unwrap_err();
        assert_eq!(err.code, 7);
        assert_eq!(err.kind(), Some(ErrorCode::FileNotFound));

        let unknown = ErrorCode::check(4242).unwrap_err();
        assert_eq!(unknown.code, 4242);
        assert_eq!(unknown.kind(), None);
    }

    #[test]
    fn numbering_matches_engine() {
        assert_eq!(i64::from(ErrorCode::MethodNotFound), 37);
        assert_eq!(ErrorCode::from_code(48), Some(ErrorCode::PrinterOnFire));
        assert_eq!(ErrorCode::from_code(49), None);
        assert_eq!(
            CallErrorType::try_from(3).ok(),
            Some(CallErrorType::TooManyArguments)
        );
    }
}
