//! Transaction status codes
//!
//! Status values travel as int32 in replies and frame headers. Zero is
//! success, everything else is a negated errno-style failure code.

use std::fmt;

/// Status carried by a transaction or a status-bearing reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    UnknownError,
    NoMemory,
    InvalidOperation,
    BadValue,
    PermissionDenied,
    NameNotFound,
    DeadObject,
    NotEnoughData,
    BadIndex,
    UnknownTransaction,
    FailedTransaction,
    /// A code outside the known taxonomy, carried through unchanged
    Other(i32),
}

impl StatusCode {
    pub const OK: i32 = 0;
    pub const UNKNOWN_ERROR: i32 = i32::MIN;
    pub const NO_MEMORY: i32 = -12;
    pub const INVALID_OPERATION: i32 = -38;
    pub const BAD_VALUE: i32 = -22;
    pub const PERMISSION_DENIED: i32 = -1;
    pub const NAME_NOT_FOUND: i32 = -2;
    pub const DEAD_OBJECT: i32 = -32;
    pub const NOT_ENOUGH_DATA: i32 = -61;
    pub const BAD_INDEX: i32 = -75;
    pub const UNKNOWN_TRANSACTION: i32 = -74;
    pub const FAILED_TRANSACTION: i32 = i32::MIN + 2;

    /// Map a raw wire value to a status
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            Self::OK => StatusCode::Ok,
            Self::UNKNOWN_ERROR => StatusCode::UnknownError,
            Self::NO_MEMORY => StatusCode::NoMemory,
            Self::INVALID_OPERATION => StatusCode::InvalidOperation,
            Self::BAD_VALUE => StatusCode::BadValue,
            Self::PERMISSION_DENIED => StatusCode::PermissionDenied,
            Self::NAME_NOT_FOUND => StatusCode::NameNotFound,
            Self::DEAD_OBJECT => StatusCode::DeadObject,
            Self::NOT_ENOUGH_DATA => StatusCode::NotEnoughData,
            Self::BAD_INDEX => StatusCode::BadIndex,
            Self::UNKNOWN_TRANSACTION => StatusCode::UnknownTransaction,
            Self::FAILED_TRANSACTION => StatusCode::FailedTransaction,
            other => StatusCode::Other(other),
        }
    }

    /// Raw wire value
    pub fn to_raw(self) -> i32 {
        match self {
            StatusCode::Ok => Self::OK,
            StatusCode::UnknownError => Self::UNKNOWN_ERROR,
            StatusCode::NoMemory => Self::NO_MEMORY,
            StatusCode::InvalidOperation => Self::INVALID_OPERATION,
            StatusCode::BadValue => Self::BAD_VALUE,
            StatusCode::PermissionDenied => Self::PERMISSION_DENIED,
            StatusCode::NameNotFound => Self::NAME_NOT_FOUND,
            StatusCode::DeadObject => Self::DEAD_OBJECT,
            StatusCode::NotEnoughData => Self::NOT_ENOUGH_DATA,
            StatusCode::BadIndex => Self::BAD_INDEX,
            StatusCode::UnknownTransaction => Self::UNKNOWN_TRANSACTION,
            StatusCode::FailedTransaction => Self::FAILED_TRANSACTION,
            StatusCode::Other(raw) => raw,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "OK"),
            StatusCode::UnknownError => write!(f, "UNKNOWN_ERROR"),
            StatusCode::NoMemory => write!(f, "NO_MEMORY"),
            StatusCode::InvalidOperation => write!(f, "INVALID_OPERATION"),
            StatusCode::BadValue => write!(f, "BAD_VALUE"),
            StatusCode::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            StatusCode::NameNotFound => write!(f, "NAME_NOT_FOUND"),
            StatusCode::DeadObject => write!(f, "DEAD_OBJECT"),
            StatusCode::NotEnoughData => write!(f, "NOT_ENOUGH_DATA"),
            StatusCode::BadIndex => write!(f, "BAD_INDEX"),
            StatusCode::UnknownTransaction => write!(f, "UNKNOWN_TRANSACTION"),
            StatusCode::FailedTransaction => write!(f, "FAILED_TRANSACTION"),
            StatusCode::Other(raw) => write!(f, "status {}", raw),
        }
    }
}
