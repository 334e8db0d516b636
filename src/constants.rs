use bitflags::bitflags;
use std::os::raw::c_int;

// Environment flags
bitflags! {
    /// Flags for [`Env::open_with_flags`](crate::Env::open_with_flags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnvFlags: u32 {
        /// Argument to open is a file, not a directory.
        const NOSUBDIR = 0x4000;
        /// Flush asynchronously; commits skip the data file sync.
        const MAPASYNC = 0x10000;
        /// Open the environment readonly.
        const RDONLY = 0x20000;
        /// Don't fsync the data file after commit.
        const NOMETASYNC = 0x40000;
        /// Use a writable memory map.
        const WRITEMAP = 0x80000;
        /// Tie reader slots to transactions instead of threads. Accepted and
        /// reported by [`Env::flags`](crate::Env::flags); slots are always
        /// per transaction here, and a readonly [`Txn`](crate::Txn) still
        /// cannot move to another thread.
        const NOTLS = 0x200000;
        /// Disable readahead.
        const NORDAHEAD = 0x800000;
        /// Skip zeroing of freshly allocated memory.
        const NOMEMINIT = 0x1000000;
        /// Coalesce freed space on reclaim.
        const COALESCE = 0x2000000;
        /// Reclaim pages last-in first-out.
        const LIFORECLAIM = 0x4000000;
    }
}

/// Flags every [`Env::open`](crate::Env::open) passes to the engine.
pub const OPEN_FLAGS: EnvFlags = EnvFlags::NOSUBDIR
    .union(EnvFlags::COALESCE)
    .union(EnvFlags::LIFORECLAIM)
    .union(EnvFlags::NORDAHEAD);

// Table flags
bitflags! {
    /// Flags for [`Txn::open_dbi`](crate::Txn::open_dbi) and
    /// [`Txn::open_root`](crate::Txn::open_root).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DbFlags: u32 {
        /// Compare keys from their last byte.
        const REVERSEKEY = 0x02;
        /// Keep sorted duplicate values per key.
        const DUPSORT = 0x04;
        /// Duplicate values all have the same size (with `DUPSORT`).
        const DUPFIXED = 0x10;
        /// Compare duplicate values from their last byte (with `DUPSORT`).
        const REVERSEDUP = 0x40;
        /// Create the table if it does not exist.
        const CREATE = 0x40000;
    }
}

impl DbFlags {
    /// Flags that describe the layout of a table, as opposed to how it is opened.
    pub const PERSISTENT: DbFlags = DbFlags::REVERSEKEY
        .union(DbFlags::DUPSORT)
        .union(DbFlags::DUPFIXED)
        .union(DbFlags::REVERSEDUP);
}

// Write operation flags
bitflags! {
    /// Flags for [`Txn::put`](crate::Txn::put).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteFlags: u32 {
        /// Fail with `KeyExist` if the key is already present.
        const NOOVERWRITE = 0x10;
        /// Fail with `KeyExist` if the exact key/value pair is present (`DUPSORT`).
        const NODUPDATA = 0x20;
        /// Key must sort after every existing key.
        const APPEND = 0x20000;
        /// Value must sort after every existing duplicate of the key.
        const APPENDDUP = 0x40000;
    }
}

// Transaction flags
bitflags! {
    /// Flags for [`Env::begin_txn`](crate::Env::begin_txn) and
    /// [`Env::run_txn`](crate::Env::run_txn).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TxnFlags: u32 {
        /// Readonly transaction.
        const RDONLY = EnvFlags::RDONLY.bits();
    }
}

// Engine status codes
pub(crate) const SUCCESS: c_int = 0;
pub(crate) const KEYEXIST: c_int = -30799;
pub(crate) const NOTFOUND: c_int = -30798;
pub(crate) const PAGE_NOTFOUND: c_int = -30797;
pub(crate) const CORRUPTED: c_int = -30796;
pub(crate) const PANIC: c_int = -30795;
pub(crate) const VERSION_MISMATCH: c_int = -30794;
pub(crate) const INVALID: c_int = -30793;
pub(crate) const MAP_FULL: c_int = -30792;
pub(crate) const DBS_FULL: c_int = -30791;
pub(crate) const READERS_FULL: c_int = -30790;
pub(crate) const TXN_FULL: c_int = -30788;
pub(crate) const CURSOR_FULL: c_int = -30787;
pub(crate) const PAGE_FULL: c_int = -30786;
pub(crate) const INCOMPATIBLE: c_int = -30784;
pub(crate) const BAD_RSLOT: c_int = -30783;
pub(crate) const BAD_TXN: c_int = -30782;
pub(crate) const BAD_VALSIZE: c_int = -30781;
pub(crate) const BAD_DBI: c_int = -30780;

/// Lowest status code reserved for engine conditions.
pub(crate) const ERRCODE_MIN: c_int = KEYEXIST;
/// Highest status code reserved for engine conditions.
pub(crate) const ERRCODE_MAX: c_int = BAD_DBI;

// OS error numbers the engine reports. These values are shared by Linux,
// the BSDs, macOS and the Windows CRT.
pub const EPERM: c_int = 1;
pub const ENOENT: c_int = 2;
pub const EIO: c_int = 5;
pub const ENOMEM: c_int = 12;
pub const EACCES: c_int = 13;
pub const EBUSY: c_int = 16;
pub const EINVAL: c_int = 22;

// Table handles reserved by the engine
pub(crate) const FREE_DBI: u32 = 0;
pub(crate) const MAIN_DBI: u32 = 1;
pub(crate) const CORE_DBS: u32 = 2;

// Defaults
pub const DEFAULT_MAX_READERS: u32 = 126;
pub const DEFAULT_MAX_DBS: u32 = 0;
pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const MIN_PAGE_SIZE: usize = 256;
pub const MAX_PAGE_SIZE: usize = 65536;
pub const DEFAULT_SIZE_UPPER: usize = 1 << 30;
/// Bytes charged per stored entry when estimating map usage.
pub(crate) const ENTRY_OVERHEAD: usize = 16;

/// Mode bits for a newly created data file.
pub(crate) const FILE_MODE: u32 = 0o664;
/// Name of the data file when the environment path is a directory.
pub(crate) const DATA_FILE_NAME: &str = "mdbx.dat";

// Data file header
/// Magic number at the start of every data file
pub(crate) const MAGIC: u32 = 0xBEEF_DEAD;
/// Data file format version
pub(crate) const FORMAT_VERSION: u32 = 1;
