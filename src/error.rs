use std::fmt;
use std::io;
use std::os::raw::c_int;
use std::result;

use thiserror::Error;

use crate::constants::{
    BAD_DBI, BAD_RSLOT, BAD_TXN, BAD_VALSIZE, CORRUPTED, CURSOR_FULL, DBS_FULL, ERRCODE_MAX,
    ERRCODE_MIN, INCOMPATIBLE, INVALID, KEYEXIST, MAP_FULL, NOTFOUND, PAGE_FULL, PAGE_NOTFOUND,
    PANIC, READERS_FULL, SUCCESS, TXN_FULL, VERSION_MISMATCH,
};
use crate::engine;

/// Custom result type for environment and transaction operations
pub type Result<T> = result::Result<T, Error>;

/// Conditions reported by the engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Key/data pair already exists
    KeyExist,
    /// No matching key/data pair found
    NotFound,
    /// Requested page not found
    PageNotFound,
    /// Data file is corrupted
    Corrupted,
    /// Environment had a fatal error
    Panic,
    /// Data file version mismatch
    VersionMismatch,
    /// File is not a valid data file
    Invalid,
    /// Environment map size limit reached
    MapFull,
    /// Environment max tables limit reached
    DbsFull,
    /// Environment max readers limit reached
    ReadersFull,
    /// Transaction has too many dirty pages
    TxnFull,
    /// Too many open cursors
    CursorFull,
    /// Page has not enough space
    PageFull,
    /// Operation and table incompatible
    Incompatible,
    /// Invalid reuse of reader slot
    BadRslot,
    /// Transaction must abort, has a child, or is invalid
    BadTxn,
    /// Unsupported size of key/table name/data, or wrong DUPFIXED size
    BadValSize,
    /// The table handle was changed unexpectedly
    BadDbi,
}

impl Errno {
    /// Maps a status code to a named condition. Codes outside the reserved
    /// range, and the unassigned codes inside it, have no name.
    pub fn from_code(code: c_int) -> Option<Errno> {
        if !(ERRCODE_MIN..=ERRCODE_MAX).contains(&code) {
            return None;
        }
        let errno = match code {
            KEYEXIST => Errno::KeyExist,
            NOTFOUND => Errno::NotFound,
            PAGE_NOTFOUND => Errno::PageNotFound,
            CORRUPTED => Errno::Corrupted,
            PANIC => Errno::Panic,
            VERSION_MISMATCH => Errno::VersionMismatch,
            INVALID => Errno::Invalid,
            MAP_FULL => Errno::MapFull,
            DBS_FULL => Errno::DbsFull,
            READERS_FULL => Errno::ReadersFull,
            TXN_FULL => Errno::TxnFull,
            CURSOR_FULL => Errno::CursorFull,
            PAGE_FULL => Errno::PageFull,
            INCOMPATIBLE => Errno::Incompatible,
            BAD_RSLOT => Errno::BadRslot,
            BAD_TXN => Errno::BadTxn,
            BAD_VALSIZE => Errno::BadValSize,
            BAD_DBI => Errno::BadDbi,
            _ => return None,
        };
        Some(errno)
    }

    /// The engine status code for this condition.
    pub fn code(self) -> c_int {
        match self {
            Errno::KeyExist => KEYEXIST,
            Errno::NotFound => NOTFOUND,
            Errno::PageNotFound => PAGE_NOTFOUND,
            Errno::Corrupted => CORRUPTED,
            Errno::Panic => PANIC,
            Errno::VersionMismatch => VERSION_MISMATCH,
            Errno::Invalid => INVALID,
            Errno::MapFull => MAP_FULL,
            Errno::DbsFull => DBS_FULL,
            Errno::ReadersFull => READERS_FULL,
            Errno::TxnFull => TXN_FULL,
            Errno::CursorFull => CURSOR_FULL,
            Errno::PageFull => PAGE_FULL,
            Errno::Incompatible => INCOMPATIBLE,
            Errno::BadRslot => BAD_RSLOT,
            Errno::BadTxn => BAD_TXN,
            Errno::BadValSize => BAD_VALSIZE,
            Errno::BadDbi => BAD_DBI,
        }
    }

    /// True for conditions after which the environment is unusable.
    pub fn is_fatal(self) -> bool {
        matches!(self, Errno::Corrupted | Errno::Panic | Errno::VersionMismatch)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(engine::strerror(self.code()))
    }
}

/// A translated status code: either a named engine condition or an OS error
/// number passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    Engine(Errno),
    Os(c_int),
}

impl Code {
    pub fn from_raw(code: c_int) -> Code {
        match Errno::from_code(code) {
            Some(errno) => Code::Engine(errno),
            None => Code::Os(code),
        }
    }

    pub fn raw(self) -> c_int {
        match self {
            Code::Engine(errno) => errno.code(),
            Code::Os(code) => code,
        }
    }

    /// Platform-portable classification of an OS error number.
    pub fn io_kind(self) -> Option<io::ErrorKind> {
        match self {
            Code::Engine(_) => None,
            Code::Os(code) => Some(io::Error::from_raw_os_error(code).kind()),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Engine(errno) => errno.fmt(f),
            Code::Os(code) => io::Error::from_raw_os_error(*code).fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An engine call failed.
    #[error("{op}: {code}")]
    Op { op: &'static str, code: Code },
    /// The environment was never opened.
    #[error("environment is not open")]
    NotOpen,
    /// A size argument was negative.
    #[error("negative size")]
    NegativeSize,
    /// Close was called on a closed environment.
    #[error("environment is already closed")]
    AlreadyClosed,
}

impl Error {
    /// Name of the failing engine call, if this error came from one.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Error::Op { op, .. } => Some(op),
            _ => None,
        }
    }

    /// The code wrapped by an operation error.
    pub fn code(&self) -> Option<Code> {
        match self {
            Error::Op { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn errno(&self) -> Option<Errno> {
        match self.code() {
            Some(Code::Engine(errno)) => Some(errno),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        is_not_found(self)
    }

    pub fn is_key_exist(&self) -> bool {
        is_errno(self, Errno::KeyExist)
    }

    pub fn is_map_full(&self) -> bool {
        is_map_full(self)
    }

    pub fn is_not_exist(&self) -> bool {
        is_not_exist(self)
    }
}

/// Wraps a status code with the name of the call that produced it.
pub(crate) fn operrno(op: &'static str, ret: c_int) -> Result<()> {
    if ret == SUCCESS {
        return Ok(());
    }
    Err(Error::Op { op, code: Code::from_raw(ret) })
}

/// True if the requested key does not exist.
pub fn is_not_found(err: &Error) -> bool {
    is_errno(err, Errno::NotFound)
}

/// True if the path passed to open does not exist.
pub fn is_not_exist(err: &Error) -> bool {
    is_errno_fn(err, |code| code.io_kind() == Some(io::ErrorKind::NotFound))
}

/// True if the environment map size has been reached.
pub fn is_map_full(err: &Error) -> bool {
    is_errno(err, Errno::MapFull)
}

/// True if the error wraps the given engine condition.
pub fn is_errno(err: &Error, errno: Errno) -> bool {
    is_errno_fn(err, |code| code == Code::Engine(errno))
}

/// True if the error wraps the given OS error number.
pub fn is_errno_sys(err: &Error, errno: c_int) -> bool {
    is_errno_fn(err, |code| code == Code::Os(errno))
}

/// Applies `f` to the code under one layer of operation wrapping.
///
/// Errors raised before any engine call ([`Error::NotOpen`],
/// [`Error::NegativeSize`], [`Error::AlreadyClosed`]) carry no code: `f` is
/// not called for them and the result is `false`.
pub fn is_errno_fn<F>(err: &Error, f: F) -> bool
where
    F: FnOnce(Code) -> bool,
{
    match err.code() {
        Some(code) => f(code),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EACCES, EINVAL, ENOENT};

    #[test]
    fn success_is_not_an_error() {
        assert!(operrno("mdbx_get", SUCCESS).is_ok());
    }

    #[test]
    fn reserved_range_maps_to_named_conditions() {
        let err = operrno("mdbx_get", NOTFOUND).unwrap_err();
        assert_eq!(err.op(), Some("mdbx_get"));
        assert_eq!(err.errno(), Some(Errno::NotFound));
        assert!(is_not_found(&err));
        assert!(!is_map_full(&err));

        for code in ERRCODE_MIN..=ERRCODE_MAX {
            if let Some(errno) = Errno::from_code(code) {
                assert_eq!(errno.code(), code);
            }
        }
    }

    #[test]
    fn codes_outside_range_pass_through_as_os_errors() {
        let err = operrno("mdbx_env_open", ENOENT).unwrap_err();
        assert_eq!(err.code(), Some(Code::Os(ENOENT)));
        assert!(is_not_exist(&err));
        assert!(is_errno_sys(&err, ENOENT));
        assert!(!is_errno_sys(&err, EACCES));

        let below = operrno("mdbx_put", ERRCODE_MIN - 1).unwrap_err();
        assert_eq!(below.code(), Some(Code::Os(ERRCODE_MIN - 1)));
    }

    #[test]
    fn unassigned_codes_in_range_are_unnamed() {
        assert_eq!(Errno::from_code(-30789), None);
        assert_eq!(Code::from_raw(-30785), Code::Os(-30785));
    }

    #[test]
    fn local_errors_carry_no_code() {
        for err in [Error::NotOpen, Error::NegativeSize, Error::AlreadyClosed] {
            assert_eq!(err.code(), None);
            assert!(!is_errno_fn(&err, |code| panic!("called with {:?}", code)));
            assert!(!is_errno_sys(&err, EINVAL));
        }
        assert!(!Error::NotOpen.is_not_found());
    }

    #[test]
    fn display_names_the_operation() {
        let err = operrno("mdbx_put", EINVAL).unwrap_err();
        assert!(err.to_string().starts_with("mdbx_put: "));
        let err = operrno("mdbx_put", KEYEXIST).unwrap_err();
        assert_eq!(err.to_string(), format!("mdbx_put: {}", engine::strerror(KEYEXIST)));
    }

    #[test]
    fn fatal_conditions() {
        assert!(Errno::Corrupted.is_fatal());
        assert!(Errno::VersionMismatch.is_fatal());
        assert!(!Errno::MapFull.is_fatal());
    }
}
