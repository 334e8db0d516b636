use std::path::{Path, PathBuf};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::constants::{EnvFlags, TxnFlags, EINVAL, FILE_MODE, OPEN_FLAGS};
use crate::database::Dbi;
use crate::engine::{self, RawEnv, RawTxn};
use crate::error::{operrno, Code, Error, Result};
use crate::leak;
use crate::thread::ThreadLock;
use crate::transaction::Txn;
use crate::types::Geometry;
use crate::value::ValPair;

/// An open storage environment.
///
/// Transactions borrow the environment, so it outlives all of them. It may
/// still be closed while transactions are live; they then fail with
/// `BadTxn` and abort silently.
#[derive(Debug)]
pub struct Env {
    /// Engine handle; `None` once closed
    handle: RwLock<Option<RawEnv>>,
    /// Key/value descriptors shared by root write transactions
    pub(crate) scratch: Mutex<Option<ValPair>>,
    /// Identity of this environment in the leak registry
    pub(crate) serial: u64,
}

impl Env {
    /// Create a new environment handle
    ///
    /// The handle must be opened with [`Env::open`] before transactions can
    /// begin. Configuration setters are called in between.
    pub fn new() -> Result<Env> {
        let mut raw = None;
        operrno("mdbx_env_create", engine::env_create(&mut raw))?;
        Ok(Env {
            handle: RwLock::new(raw),
            scratch: Mutex::new(Some(ValPair::default())),
            serial: leak::next_serial(),
        })
    }

    /// Open the environment at `path`
    ///
    /// `path` names the data file itself. The file is created with mode
    /// `0o664` if missing.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.open_with_flags(path, EnvFlags::empty())
    }

    /// Open the environment with `flags` added to the fixed open flags
    pub fn open_with_flags<P: AsRef<Path>>(&self, path: P, flags: EnvFlags) -> Result<()> {
        let path = path.as_ref();
        let flags = OPEN_FLAGS | flags;
        self.with_raw("mdbx_env_open", |raw| {
            operrno("mdbx_env_open", engine::env_open(raw, path, flags, FILE_MODE))
        })?;
        debug!("opened environment {} at {:?} with {:?}", self.serial, path, flags);
        Ok(())
    }

    /// Close the environment and release the data file
    ///
    /// Waits for transactions that are aborting concurrently. A second call
    /// returns [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        let mut handle = self.handle.write();
        let raw = handle.take().ok_or(Error::AlreadyClosed)?;

        let live = leak::live_for_env(self.serial);
        if live > 0 {
            warn!("closing environment {} with {} live transaction(s)", self.serial, live);
        }
        engine::env_close(raw);
        drop(handle);

        // A live write transaction still holds the pair; it goes with the Env.
        if let Some(mut scratch) = self.scratch.try_lock() {
            *scratch = None;
        }
        debug!("closed environment {}", self.serial);
        Ok(())
    }

    /// Set the map geometry
    ///
    /// Negative `size_upper` or `page_size` is rejected before the engine is
    /// called. The page size cannot change once the environment is open.
    pub fn set_geometry(&self, geometry: Geometry) -> Result<()> {
        if geometry.size_upper < 0 || geometry.page_size < 0 {
            return Err(Error::NegativeSize);
        }
        self.with_raw("mdbx_env_set_geometry", |raw| {
            let rc = engine::env_set_geometry(
                raw,
                geometry.size_lower,
                geometry.size_now,
                geometry.size_upper,
                geometry.growth_step,
                geometry.shrink_threshold,
                geometry.page_size,
            );
            operrno("mdbx_env_set_geometry", rc)
        })
    }

    /// Set the maximum number of reader slots. Must precede [`Env::open`].
    pub fn set_max_readers(&self, readers: isize) -> Result<()> {
        let readers = count("mdbx_env_set_maxreaders", readers)?;
        self.with_raw("mdbx_env_set_maxreaders", |raw| {
            operrno("mdbx_env_set_maxreaders", engine::env_set_maxreaders(raw, readers))
        })
    }

    /// Get the maximum number of reader slots
    pub fn max_readers(&self) -> Result<u32> {
        self.with_raw("mdbx_env_get_maxreaders", |raw| {
            let mut readers = 0;
            operrno("mdbx_env_get_maxreaders", engine::env_get_maxreaders(raw, &mut readers))?;
            Ok(readers)
        })
    }

    /// Set the maximum number of named tables. Must precede [`Env::open`].
    pub fn set_max_dbs(&self, dbs: isize) -> Result<()> {
        let dbs = count("mdbx_env_set_maxdbs", dbs)?;
        self.with_raw("mdbx_env_set_maxdbs", |raw| {
            operrno("mdbx_env_set_maxdbs", engine::env_set_maxdbs(raw, dbs))
        })
    }

    pub fn max_dbs(&self) -> Result<u32> {
        self.with_raw("mdbx_env_get_maxdbs", |raw| {
            let mut dbs = 0;
            operrno("mdbx_env_get_maxdbs", engine::env_get_maxdbs(raw, &mut dbs))?;
            Ok(dbs)
        })
    }

    /// Get the flags the environment was opened with
    pub fn flags(&self) -> Result<EnvFlags> {
        self.with_raw("mdbx_env_get_flags", |raw| {
            let mut flags = EnvFlags::empty();
            operrno("mdbx_env_get_flags", engine::env_get_flags(raw, &mut flags))?;
            Ok(flags)
        })
    }

    /// Get the path passed to open
    ///
    /// Returns [`Error::NotOpen`] if the environment was never opened.
    pub fn path(&self) -> Result<PathBuf> {
        self.with_raw("mdbx_env_get_path", |raw| {
            let mut path = None;
            operrno("mdbx_env_get_path", engine::env_get_path(raw, &mut path))?;
            path.ok_or(Error::NotOpen)
        })
    }

    /// Begin an unmanaged transaction
    ///
    /// The caller must commit or abort it; dropping it live aborts it and
    /// logs a warning unless it is marked pooled. Write transactions need a
    /// [`ThreadLock`] held by the current thread.
    ///
    /// # Panics
    ///
    /// Panics if `flags` asks for a write transaction and `lock` is `None`.
    pub fn begin_txn(&self, flags: TxnFlags, lock: Option<&ThreadLock>) -> Result<Txn<'_>> {
        require_lock(flags, lock);
        let mut txn = Txn::begin(self, flags)?;
        txn.track();
        Ok(txn)
    }

    /// Begin an unmanaged readonly transaction
    pub fn begin_ro_txn(&self) -> Result<Txn<'_>> {
        self.begin_txn(TxnFlags::RDONLY, None)
    }

    /// Begin an unmanaged write transaction
    pub fn begin_rw_txn(&self, lock: &ThreadLock) -> Result<Txn<'_>> {
        self.begin_txn(TxnFlags::empty(), Some(lock))
    }

    /// Run `f` in a readonly transaction that is always terminated afterwards
    ///
    /// `f` only gets a borrow, so it cannot commit or abort the transaction;
    /// calling [`Txn::reset`] or [`Txn::renew`] on it panics.
    pub fn view<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
    {
        self.run(TxnFlags::RDONLY, f)
    }

    /// Run `f` in a write transaction, committing if it returns `Ok` and
    /// aborting otherwise
    ///
    /// The current thread is pinned with a [`ThreadLock`] until the
    /// transaction has terminated. Use [`Env::update_locked`] when the caller
    /// already holds one.
    pub fn update<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
    {
        let lock = ThreadLock::acquire();
        let result = self.run(TxnFlags::empty(), f);
        drop(lock);
        result
    }

    /// Like [`Env::update`], with the thread already pinned by the caller
    pub fn update_locked<T, E, F>(&self, _lock: &ThreadLock, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
    {
        self.run(TxnFlags::empty(), f)
    }

    /// Run `f` in a managed transaction begun with `flags`
    ///
    /// # Panics
    ///
    /// Panics if `flags` asks for a write transaction and `lock` is `None`.
    pub fn run_txn<T, E, F>(
        &self,
        flags: TxnFlags,
        lock: Option<&ThreadLock>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
    {
        require_lock(flags, lock);
        self.run(flags, f)
    }

    fn run<T, E, F>(&self, flags: TxnFlags, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
    {
        let txn = Txn::begin(self, flags)?;
        txn.run_op_term(f)
    }

    /// Close a table handle
    ///
    /// Not synchronized: no other transaction may be using `dbi`, and calls
    /// must be serialized by the caller.
    pub fn close_dbi(&self, dbi: Dbi) -> Result<()> {
        self.with_raw("mdbx_dbi_close", |raw| {
            operrno("mdbx_dbi_close", engine::dbi_close(raw, dbi.0))
        })
    }

    /// Begin an engine transaction, as a child of `parent` if given.
    pub(crate) fn begin_raw(&self, parent: Option<&RawTxn>, flags: TxnFlags) -> Result<RawTxn> {
        // A write begin may wait for the current writer; close must not wait on it.
        let raw = self.handle.read().clone().ok_or(closed("mdbx_txn_begin"))?;
        let mut txn = None;
        operrno("mdbx_txn_begin", engine::txn_begin(&raw, parent, flags, &mut txn))?;
        txn.ok_or(closed("mdbx_txn_begin"))
    }

    /// Read access to the handle; held while a transaction aborts so that
    /// [`Env::close`] waits for it.
    pub(crate) fn handle(&self) -> RwLockReadGuard<'_, Option<RawEnv>> {
        self.handle.read()
    }

    fn with_raw<T>(&self, op: &'static str, f: impl FnOnce(&RawEnv) -> Result<T>) -> Result<T> {
        match self.handle.read().as_ref() {
            Some(raw) => f(raw),
            None => Err(closed(op)),
        }
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            let _ = self.close();
        }
    }
}

/// Error for a call on a closed environment.
fn closed(op: &'static str) -> Error {
    Error::Op { op, code: Code::Os(EINVAL) }
}

fn count(op: &'static str, size: isize) -> Result<u32> {
    if size < 0 {
        return Err(Error::NegativeSize);
    }
    u32::try_from(size).map_err(|_| Error::Op { op, code: Code::Os(EINVAL) })
}

fn require_lock(flags: TxnFlags, lock: Option<&ThreadLock>) {
    if !flags.contains(TxnFlags::RDONLY) && lock.is_none() {
        panic!("write transaction requires a ThreadLock");
    }
}
