//! Transaction lifecycle and resource-safety layer over an embedded MVCC
//! key/value engine.
//!
//! An [`Env`] owns one data file. Readonly transactions see the snapshot
//! committed when they began; at most one write transaction runs at a time
//! and must stay on the OS thread pinned by a [`ThreadLock`]. The closure
//! helpers [`Env::view`], [`Env::update`] and [`Txn::sub`] terminate the
//! transaction they hand out; unmanaged transactions from [`Env::begin_txn`]
//! are terminated by the caller and tracked by [`leak`] in debug builds.

mod constants;
mod database;
mod engine;
mod env;
mod error;
pub mod leak;
mod meta;
mod store;
mod table;
mod thread;
mod transaction;
mod types;
mod value;

pub use constants::{
    DbFlags, EnvFlags, TxnFlags, WriteFlags, DEFAULT_MAX_DBS, DEFAULT_MAX_READERS,
    DEFAULT_PAGE_SIZE, DEFAULT_SIZE_UPPER, EACCES, EBUSY, EINVAL, EIO, ENOENT, ENOMEM, EPERM,
    MAX_PAGE_SIZE, MIN_PAGE_SIZE, OPEN_FLAGS,
};
pub use database::Dbi;
pub use env::Env;
pub use error::{
    is_errno, is_errno_fn, is_errno_sys, is_map_full, is_not_exist, is_not_found, Code, Errno,
    Error, Result,
};
pub use thread::ThreadLock;
pub use transaction::Txn;
pub use types::Geometry;
pub use value::Value;
