use std::marker::PhantomData;
use std::ops::Deref;

use log::{trace, warn};
use once_cell::unsync::OnceCell;
use parking_lot::{MappedMutexGuard, MutexGuard};

use crate::constants::{DbFlags, TxnFlags, WriteFlags, BAD_TXN};
use crate::database::Dbi;
use crate::engine::{self, RawTxn};
use crate::env::Env;
use crate::error::{operrno, Code, Error, Result};
use crate::leak;
use crate::value::{Val, ValPair, Value};

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Holding a snapshot or the write lock
    Active,
    /// Readonly transaction between reset and renew
    Reset,
}

/// Key/value descriptors a transaction stages engine calls through.
#[derive(Debug)]
enum Scratch<'a> {
    /// Root readonly transactions
    Owned(Box<ValPair>),
    /// Root write transactions use the environment's pair
    Shared(MappedMutexGuard<'a, ValPair>),
    /// Children use their parent's pair; the parent is borrowed meanwhile
    Borrowed(&'a ValPair),
}

impl Deref for Scratch<'_> {
    type Target = ValPair;

    fn deref(&self) -> &ValPair {
        match self {
            Scratch::Owned(pair) => pair.as_ref(),
            Scratch::Shared(pair) => &**pair,
            Scratch::Borrowed(pair) => *pair,
        }
    }
}

/// A database transaction in an environment.
///
/// Transactions are bound to the thread that began them, readonly ones
/// included: `Txn` is never `Send`, whatever flags the environment was
/// opened with. A write transaction is only begun with a
/// [`ThreadLock`](crate::ThreadLock) held.
///
/// A transaction handed to a closure by [`Env::view`], [`Env::update`],
/// [`Txn::sub`] and friends is *managed*: the helper terminates it, and
/// calling [`Txn::reset`] or [`Txn::renew`] on it panics. Dropping a live
/// transaction aborts it.
#[derive(Debug)]
pub struct Txn<'env> {
    /// Return views into engine memory from [`Txn::get`] instead of copies
    raw_read: bool,
    /// Don't warn when dropped live
    pooled: bool,
    /// Terminated only by the helper that created it
    managed: bool,
    /// Readonly transaction
    readonly: bool,
    /// Active or reset
    state: State,
    /// Cached snapshot ID
    id: OnceCell<u64>,
    /// Reference to environment
    env: &'env Env,
    /// Engine handle; `None` once terminated
    raw: Option<RawTxn>,
    scratch: Scratch<'env>,
    /// Identity in logs and the leak registry
    serial: u64,
    /// Registered in the leak registry
    tracked: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'env> Txn<'env> {
    /// Begin a root transaction. The caller pins the thread for writes.
    pub(crate) fn begin(env: &'env Env, flags: TxnFlags) -> Result<Txn<'env>> {
        let readonly = flags.contains(TxnFlags::RDONLY);
        let raw = env.begin_raw(None, flags)?;

        // Only one root writer exists at a time, so the shared pair is free.
        let scratch = if readonly {
            Scratch::Owned(Box::default())
        } else {
            Scratch::Shared(MutexGuard::map(env.scratch.lock(), |pair| {
                pair.get_or_insert_with(ValPair::default)
            }))
        };

        let txn = Txn::new(env, raw, scratch, readonly);
        trace!(
            "began {} transaction {:#x} (id {})",
            if readonly { "readonly" } else { "write" },
            txn.serial,
            txn.id()
        );
        Ok(txn)
    }

    fn new(env: &'env Env, raw: RawTxn, scratch: Scratch<'env>, readonly: bool) -> Txn<'env> {
        Txn {
            raw_read: false,
            pooled: false,
            managed: false,
            readonly,
            state: State::Active,
            id: OnceCell::new(),
            env,
            raw: Some(raw),
            scratch,
            serial: leak::next_serial(),
            tracked: false,
            _not_send: PhantomData,
        }
    }

    /// Register in the leak registry.
    pub(crate) fn track(&mut self) {
        self.tracked = leak::track(self.serial, self.env.serial, self.readonly);
    }

    fn raw(&self, op: &'static str) -> Result<&RawTxn> {
        self.raw.as_ref().ok_or(Error::Op { op, code: Code::from_raw(BAD_TXN) })
    }

    /// Clear the handle and everything derived from it.
    fn take_raw(&mut self) -> Option<RawTxn> {
        self.id.take();
        if self.tracked {
            leak::untrack(self.serial);
            self.tracked = false;
        }
        self.raw.take()
    }

    /// Get the snapshot ID
    ///
    /// For a readonly transaction this is the ID of the snapshot it reads,
    /// shared with other readers of that snapshot. For a write transaction it
    /// is the ID the commit will publish. The value is cached until the next
    /// reset, renew or termination.
    pub fn id(&self) -> u64 {
        *self
            .id
            .get_or_init(|| self.raw.as_ref().map_or(0, engine::txn_id))
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether the transaction is reset and waiting for [`Txn::renew`]
    pub fn is_reset(&self) -> bool {
        self.state == State::Reset
    }

    /// Select views into engine memory (`true`) or copies (`false`) for
    /// [`Txn::get`]
    pub fn set_raw_read(&mut self, raw_read: bool) {
        self.raw_read = raw_read;
    }

    /// Mark the transaction as kept in a pool, silencing the warning when it
    /// is dropped live
    pub fn set_pooled(&mut self, pooled: bool) {
        self.pooled = pooled;
    }

    pub fn env(&self) -> &'env Env {
        self.env
    }

    /// Commit the transaction
    ///
    /// # Panics
    ///
    /// Panics if the transaction is managed or reset.
    pub fn commit(mut self) -> Result<()> {
        if self.managed {
            panic!("managed transaction cannot be committed directly");
        }
        self.commit_inner()
    }

    fn commit_inner(&mut self) -> Result<()> {
        if self.state == State::Reset {
            panic!("reset transaction cannot be committed");
        }
        let rc = match self.take_raw() {
            Some(raw) => engine::txn_commit(raw),
            None => BAD_TXN,
        };
        if let Err(err) = operrno("mdbx_txn_commit", rc) {
            trace!("commit of transaction {:#x} failed: {}", self.serial, err);
            return Err(err);
        }
        trace!("committed transaction {:#x}", self.serial);
        Ok(())
    }

    /// Abort the transaction, discarding its writes
    ///
    /// # Panics
    ///
    /// Panics if the transaction is managed.
    pub fn abort(mut self) {
        if self.managed {
            panic!("managed transaction cannot be aborted directly");
        }
        self.abort_raw();
    }

    fn abort_raw(&mut self) {
        let raw = match self.take_raw() {
            Some(raw) => raw,
            None => return,
        };
        // Hold the handle so a concurrent close waits for the abort.
        let handle = self.env.handle();
        if handle.is_some() {
            engine::txn_abort(raw);
        }
        drop(handle);
        trace!("aborted transaction {:#x}", self.serial);
    }

    /// Release the snapshot of a readonly transaction, keeping its reader
    /// slot for [`Txn::renew`]
    ///
    /// # Panics
    ///
    /// Panics if the transaction is managed or already reset.
    pub fn reset(&mut self) -> Result<()> {
        if self.managed {
            panic!("managed transaction cannot be reset directly");
        }
        if self.state != State::Active {
            panic!("transaction is already reset");
        }
        let rc = engine::txn_reset(self.raw_mut("mdbx_txn_reset")?);
        self.id.take();
        operrno("mdbx_txn_reset", rc)?;
        self.state = State::Reset;
        Ok(())
    }

    /// Reacquire a snapshot after [`Txn::reset`]
    ///
    /// The renewed transaction sees everything committed before the renew.
    ///
    /// # Panics
    ///
    /// Panics if the transaction is managed or not reset.
    pub fn renew(&mut self) -> Result<()> {
        if self.managed {
            panic!("managed transaction cannot be renewed directly");
        }
        if self.state != State::Reset {
            panic!("only a reset transaction can be renewed");
        }
        let rc = engine::txn_renew(self.raw_mut("mdbx_txn_renew")?);
        self.id.take();
        operrno("mdbx_txn_renew", rc)?;
        self.state = State::Active;
        Ok(())
    }

    fn raw_mut(&mut self, op: &'static str) -> Result<&mut RawTxn> {
        self.raw.as_mut().ok_or(Error::Op { op, code: Code::from_raw(BAD_TXN) })
    }

    /// Run `f` without terminating the transaction
    ///
    /// The transaction is managed while `f` runs, so `f` cannot reset or
    /// renew it; the previous state is restored afterwards, also when `f`
    /// panics.
    pub fn run_op<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Txn<'env>) -> std::result::Result<T, E>,
    {
        if self.managed {
            return f(self);
        }
        self.managed = true;
        let guard = Unmanage(self);
        f(&mut *guard.0)
    }

    /// Run `f`, then commit if it returned `Ok` and abort otherwise
    ///
    /// # Panics
    ///
    /// Panics if the transaction is managed.
    pub fn run_op_term<T, E, F>(mut self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'env>) -> std::result::Result<T, E>,
    {
        if self.managed {
            panic!("managed transaction cannot be terminated directly");
        }
        // Stays managed: every exit below terminates it, a panic through Drop.
        self.managed = true;
        let value = f(&mut self)?;
        self.commit_inner()?;
        Ok(value)
    }

    /// Run `f` in a nested write transaction, committed into this one if
    /// `f` returns `Ok` and aborted otherwise
    ///
    /// The child is managed. This transaction cannot be used until `f`
    /// returns.
    pub fn sub<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut Txn<'_>) -> std::result::Result<T, E>,
    {
        let mut child = self.child()?;
        child.managed = true;
        let value = f(&mut child)?;
        child.commit_inner()?;
        Ok(value)
    }

    /// Begin an unmanaged nested write transaction
    ///
    /// The child must be committed or aborted; this transaction is borrowed
    /// until then.
    ///
    /// # Panics
    ///
    /// Panics if this transaction is managed.
    pub fn begin_child(&mut self) -> Result<Txn<'_>> {
        if self.managed {
            panic!("managed transaction cannot begin an unmanaged child");
        }
        let mut child = self.child()?;
        child.track();
        Ok(child)
    }

    fn child(&mut self) -> Result<Txn<'_>> {
        let raw = self.env.begin_raw(Some(self.raw("mdbx_txn_begin")?), TxnFlags::empty())?;
        let child = Txn::new(self.env, raw, Scratch::Borrowed(&*self.scratch), false);
        trace!("began child transaction {:#x} of {:#x}", child.serial, self.serial);
        Ok(child)
    }

    /// Open a named table
    ///
    /// Requires [`Env::set_max_dbs`] to allow named tables. A table that
    /// does not exist yet is only created with [`DbFlags::CREATE`], in a
    /// write transaction. The handle is usable by other transactions once
    /// this one has committed.
    pub fn open_dbi(&self, name: &str, flags: DbFlags) -> Result<Dbi> {
        self.open_table(Some(name), flags)
    }

    /// Open a named table, creating it if needed
    pub fn create_dbi(&self, name: &str) -> Result<Dbi> {
        self.open_dbi(name, DbFlags::CREATE)
    }

    /// Open the main table. Works in readonly transactions without any
    /// [`Env::set_max_dbs`] setting.
    pub fn open_root(&self, flags: DbFlags) -> Result<Dbi> {
        self.open_table(None, flags)
    }

    fn open_table(&self, name: Option<&str>, flags: DbFlags) -> Result<Dbi> {
        let mut dbi = 0;
        let rc = engine::dbi_open(self.raw("mdbx_dbi_open")?, name, flags, &mut dbi);
        operrno("mdbx_dbi_open", rc)?;
        Ok(Dbi(dbi))
    }

    /// Empty the table, or with `del` delete it and close its handle
    pub fn drop_dbi(&mut self, dbi: Dbi, del: bool) -> Result<()> {
        let rc = engine::dbi_drop(self.raw("mdbx_drop")?, dbi.0, del);
        operrno("mdbx_drop", rc)
    }

    /// Get the value stored under `key`
    ///
    /// Returns a view into engine memory when raw reads are enabled, a copy
    /// otherwise. A missing key is an error matching
    /// [`is_not_found`](crate::is_not_found).
    pub fn get(&self, dbi: Dbi, key: &[u8]) -> Result<Value<'_>> {
        let raw = self.raw("mdbx_get")?;
        let pair = &*self.scratch;
        pair.key.set(Val::new(key));
        let rc = unsafe { engine::get(raw, dbi.0, &pair.key.get(), &pair.val) };
        let found = pair.val.get();
        pair.clear();
        operrno("mdbx_get", rc)?;

        // The engine keeps the bytes alive until this transaction next writes,
        // resets or terminates, all of which need `&mut self`.
        let data: &[u8] = unsafe { found.as_slice() }.unwrap_or_default();
        if self.raw_read {
            Ok(Value::View(data))
        } else {
            Ok(Value::Copy(data.to_vec()))
        }
    }

    /// Store `val` under `key`
    ///
    /// An empty key is passed to the engine as a null key, which it rejects.
    /// An empty value is stored as an empty value.
    pub fn put(&mut self, dbi: Dbi, key: &[u8], val: &[u8], flags: WriteFlags) -> Result<()> {
        if key.is_empty() {
            return self.put_nil_key(dbi, flags);
        }
        let raw = self.raw("mdbx_put")?;
        let pair = &*self.scratch;
        // Slices never have a null base, so an empty `val` still reaches the
        // engine as a present, zero-length value.
        pair.key.set(Val::new(key));
        pair.val.set(Val::new(val));
        let rc = unsafe { engine::put(raw, dbi.0, &pair.key.get(), &pair.val.get(), flags) };
        pair.clear();
        operrno("mdbx_put", rc)
    }

    fn put_nil_key(&mut self, dbi: Dbi, flags: WriteFlags) -> Result<()> {
        let raw = self.raw("mdbx_put")?;
        let rc = unsafe { engine::put(raw, dbi.0, &Val::NULL, &Val::NULL, flags) };
        operrno("mdbx_put", rc)
    }

    /// Delete `key`
    ///
    /// `val` selects a single duplicate in a `DUPSORT` table and is ignored
    /// for other tables.
    pub fn del(&mut self, dbi: Dbi, key: &[u8], val: Option<&[u8]>) -> Result<()> {
        let raw = self.raw("mdbx_del")?;
        let pair = &*self.scratch;
        pair.key.set(Val::new(key));
        pair.val.set(val.map_or(Val::NULL, Val::new));
        let data = val.map(|_| pair.val.get());
        let rc = unsafe { engine::del(raw, dbi.0, &pair.key.get(), data.as_ref()) };
        pair.clear();
        operrno("mdbx_del", rc)
    }
}

impl Drop for Txn<'_> {
    fn drop(&mut self) {
        if self.raw.is_none() {
            return;
        }
        if !self.managed && !self.pooled {
            warn!("aborting transaction {:#x} dropped while live", self.serial);
        }
        self.abort_raw();
    }
}

/// Clears the managed flag set by [`Txn::run_op`].
struct Unmanage<'a, 'env>(&'a mut Txn<'env>);

impl Drop for Unmanage<'_, '_> {
    fn drop(&mut self) {
        self.0.managed = false;
    }
}
