//! In-process MVCC storage engine behind a C-style call surface.
//!
//! Every call returns a status code: [`SUCCESS`], a negative engine code or a
//! positive OS error number. Results come back through out-parameters. The
//! rest of the crate only sees [`RawEnv`], [`RawTxn`] and these functions.

use std::cell::Cell;
use std::collections::HashSet;
use std::fs;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use lazy_static::lazy_static;
use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::constants::{
    DbFlags, EnvFlags, TxnFlags, WriteFlags, BAD_DBI, BAD_RSLOT, BAD_TXN, BAD_VALSIZE, CORE_DBS,
    CORRUPTED, CURSOR_FULL, DATA_FILE_NAME, DBS_FULL, DEFAULT_MAX_DBS, DEFAULT_MAX_READERS,
    DEFAULT_PAGE_SIZE, DEFAULT_SIZE_UPPER, EACCES, EBUSY, EINVAL, ENTRY_OVERHEAD, EPERM, FREE_DBI,
    INCOMPATIBLE, INVALID, KEYEXIST, MAIN_DBI, MAP_FULL, MAX_PAGE_SIZE, MIN_PAGE_SIZE, NOTFOUND,
    PAGE_FULL, PAGE_NOTFOUND, PANIC, READERS_FULL, SUCCESS, TXN_FULL, VERSION_MISMATCH,
};
use crate::meta::ReaderTable;
use crate::store::{io_code, Store};
use crate::table::{Snapshot, Table, MAIN_TABLE};
use crate::value::Val;

lazy_static! {
    /// Data files held open by environments of this process.
    static ref OPEN_FILES: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
}

/// Bytes of page header and node overhead a key must leave room for.
const KEY_RESERVE: usize = 26;

#[derive(Debug)]
struct Config {
    /// Path given to open
    path: Option<PathBuf>,
    /// Canonical data file path registered in `OPEN_FILES`
    file: Option<PathBuf>,
    /// Flags given to open
    flags: EnvFlags,
    /// Reader slots
    max_readers: u32,
    /// Named tables
    max_dbs: u32,
    /// Page size
    page_size: usize,
    /// Upper bound on stored bytes
    size_upper: usize,
    /// Backing data file, once open
    store: Option<Store>,
}

impl Config {
    fn max_key_size(&self) -> usize {
        self.page_size / 2 - KEY_RESERVE
    }
}

#[derive(Debug)]
struct Shared {
    config: Mutex<Config>,
    /// Last committed snapshot
    current: Mutex<Arc<Snapshot>>,
    readers: Mutex<ReaderTable>,
    /// Table name per handle; `None` for free handles
    dbis: Mutex<Vec<Option<String>>>,
    /// Thread running the root write transaction
    writer: Mutex<Option<ThreadId>>,
    writer_done: Condvar,
    /// State of the write transaction, one level per nesting depth
    work: Mutex<Vec<Snapshot>>,
    opened: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    fn is_live(&self) -> bool {
        self.opened.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }
}

/// Engine environment handle.
#[derive(Debug, Clone)]
pub(crate) struct RawEnv {
    shared: Arc<Shared>,
}

#[derive(Debug)]
enum Kind {
    Read {
        slot: usize,
        /// `None` while reset
        snapshot: Option<Arc<Snapshot>>,
    },
    Write {
        depth: usize,
        txn_id: u64,
    },
}

/// Engine transaction handle. Dropping a live handle aborts it.
#[derive(Debug)]
pub(crate) struct RawTxn {
    shared: Arc<Shared>,
    kind: Option<Kind>,
}

impl RawTxn {
    fn check(&self) -> Result<&Kind, c_int> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BAD_TXN);
        }
        self.kind.as_ref().ok_or(BAD_TXN)
    }
}

impl Drop for RawTxn {
    fn drop(&mut self) {
        if let Some(kind) = self.kind.take() {
            finish_abort(&self.shared, kind);
        }
    }
}

fn status(result: Result<(), c_int>) -> c_int {
    match result {
        Ok(()) => SUCCESS,
        Err(code) => code,
    }
}

fn valid_page_size(size: usize) -> bool {
    size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&size)
}

pub(crate) fn env_create(out: &mut Option<RawEnv>) -> c_int {
    let mut dbis = vec![None; CORE_DBS as usize];
    dbis[MAIN_DBI as usize] = Some(MAIN_TABLE.to_string());

    let shared = Shared {
        config: Mutex::new(Config {
            path: None,
            file: None,
            flags: EnvFlags::empty(),
            max_readers: DEFAULT_MAX_READERS,
            max_dbs: DEFAULT_MAX_DBS,
            page_size: DEFAULT_PAGE_SIZE,
            size_upper: DEFAULT_SIZE_UPPER,
            store: None,
        }),
        current: Mutex::new(Arc::new(Snapshot::empty())),
        readers: Mutex::new(ReaderTable::default()),
        dbis: Mutex::new(dbis),
        writer: Mutex::new(None),
        writer_done: Condvar::new(),
        work: Mutex::new(Vec::new()),
        opened: AtomicBool::new(false),
        closed: AtomicBool::new(false),
    };
    *out = Some(RawEnv { shared: Arc::new(shared) });
    SUCCESS
}

pub(crate) fn env_open(env: &RawEnv, path: &Path, flags: EnvFlags, mode: u32) -> c_int {
    status(open_env(&env.shared, path, flags, mode))
}

fn open_env(shared: &Shared, path: &Path, flags: EnvFlags, mode: u32) -> Result<(), c_int> {
    if shared.opened.load(Ordering::Acquire) || shared.closed.load(Ordering::Acquire) {
        return Err(EINVAL);
    }

    let file = if flags.contains(EnvFlags::NOSUBDIR) {
        path.to_path_buf()
    } else {
        if !flags.contains(EnvFlags::RDONLY) {
            fs::create_dir_all(path).map_err(|e| io_code(&e))?;
        }
        path.join(DATA_FILE_NAME)
    };

    let key = file_key(&file)?;
    if !OPEN_FILES.lock().insert(key.clone()) {
        return Err(EBUSY);
    }

    let (store, snapshot, stored_page_size) = match Store::open(&file, flags, mode) {
        Ok(loaded) => loaded,
        Err(code) => {
            OPEN_FILES.lock().remove(&key);
            return Err(code);
        }
    };

    let mut config = shared.config.lock();
    if let Some(page_size) = stored_page_size {
        if !valid_page_size(page_size as usize) {
            OPEN_FILES.lock().remove(&key);
            return Err(INVALID);
        }
        config.page_size = page_size as usize;
    }
    config.path = Some(path.to_path_buf());
    config.file = Some(key);
    config.flags = flags;
    config.store = Some(store);

    *shared.readers.lock() = ReaderTable::new(config.max_readers);
    *shared.current.lock() = Arc::new(snapshot);
    shared.opened.store(true, Ordering::Release);
    Ok(())
}

/// Identity of a data file: its canonical directory plus file name.
fn file_key(file: &Path) -> Result<PathBuf, c_int> {
    let name = file.file_name().ok_or(EINVAL)?;
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let dir = dir.canonicalize().map_err(|e| io_code(&e))?;
    Ok(dir.join(name))
}

pub(crate) fn env_close(env: RawEnv) -> c_int {
    let shared = &env.shared;
    if shared.closed.swap(true, Ordering::AcqRel) {
        return EINVAL;
    }

    let mut config = shared.config.lock();
    if let Some(key) = config.file.take() {
        OPEN_FILES.lock().remove(&key);
    }
    config.store = None;
    drop(config);

    // Write levels stay alive: a live transaction may still hold views into them.
    shared.readers.lock().clear();
    release_writer(shared);
    SUCCESS
}

pub(crate) fn env_set_geometry(
    env: &RawEnv,
    size_lower: isize,
    size_now: isize,
    size_upper: isize,
    growth_step: isize,
    shrink_threshold: isize,
    page_size: isize,
) -> c_int {
    let shared = &env.shared;
    if shared.closed.load(Ordering::Acquire) {
        return EINVAL;
    }
    let opened = shared.opened.load(Ordering::Acquire);
    let mut config = shared.config.lock();

    let page_size = match page_size {
        p if p < 0 => config.page_size,
        0 => DEFAULT_PAGE_SIZE,
        p => p as usize,
    };
    if !valid_page_size(page_size) || (opened && page_size != config.page_size) {
        return EINVAL;
    }

    let upper = match size_upper {
        u if u < 0 => config.size_upper,
        0 => DEFAULT_SIZE_UPPER,
        u => u as usize,
    };
    let bounded = [size_lower, size_now, growth_step, shrink_threshold];
    if bounded.iter().any(|&size| size > 0 && size as usize > upper) {
        return EINVAL;
    }
    if opened && shared.current.lock().bytes() > upper {
        return MAP_FULL;
    }

    config.page_size = page_size;
    config.size_upper = upper;
    SUCCESS
}

pub(crate) fn env_set_maxreaders(env: &RawEnv, readers: u32) -> c_int {
    if env.shared.opened.load(Ordering::Acquire) {
        return EPERM;
    }
    if readers == 0 {
        return EINVAL;
    }
    env.shared.config.lock().max_readers = readers;
    SUCCESS
}

pub(crate) fn env_get_maxreaders(env: &RawEnv, out: &mut u32) -> c_int {
    *out = env.shared.config.lock().max_readers;
    SUCCESS
}

pub(crate) fn env_set_maxdbs(env: &RawEnv, dbs: u32) -> c_int {
    if env.shared.opened.load(Ordering::Acquire) {
        return EPERM;
    }
    env.shared.config.lock().max_dbs = dbs;
    SUCCESS
}

pub(crate) fn env_get_maxdbs(env: &RawEnv, out: &mut u32) -> c_int {
    *out = env.shared.config.lock().max_dbs;
    SUCCESS
}

/// Leaves `out` empty if the environment was never opened.
pub(crate) fn env_get_path(env: &RawEnv, out: &mut Option<PathBuf>) -> c_int {
    *out = env.shared.config.lock().path.clone();
    SUCCESS
}

pub(crate) fn env_get_flags(env: &RawEnv, out: &mut EnvFlags) -> c_int {
    *out = env.shared.config.lock().flags;
    SUCCESS
}

pub(crate) fn txn_begin(
    env: &RawEnv,
    parent: Option<&RawTxn>,
    flags: TxnFlags,
    out: &mut Option<RawTxn>,
) -> c_int {
    match begin(&env.shared, parent, flags) {
        Ok(txn) => {
            *out = Some(txn);
            SUCCESS
        }
        Err(code) => code,
    }
}

fn begin(shared: &Arc<Shared>, parent: Option<&RawTxn>, flags: TxnFlags) -> Result<RawTxn, c_int> {
    if !shared.is_live() {
        return Err(EINVAL);
    }
    let readonly = flags.contains(TxnFlags::RDONLY);

    if let Some(parent) = parent {
        if readonly {
            return Err(EINVAL);
        }
        let (depth, txn_id) = match parent.check()? {
            Kind::Write { depth, txn_id } => (*depth, *txn_id),
            Kind::Read { .. } => return Err(BAD_TXN),
        };
        let mut work = shared.work.lock();
        if work.len() != depth + 1 {
            return Err(BAD_TXN);
        }
        let level = work[depth].clone();
        work.push(level);
        return Ok(RawTxn {
            shared: Arc::clone(shared),
            kind: Some(Kind::Write { depth: depth + 1, txn_id }),
        });
    }

    if readonly {
        let snapshot = Arc::clone(&*shared.current.lock());
        let slot = shared.readers.lock().acquire(snapshot.txn_id)?;
        return Ok(RawTxn {
            shared: Arc::clone(shared),
            kind: Some(Kind::Read { slot, snapshot: Some(snapshot) }),
        });
    }

    if shared.config.lock().flags.contains(EnvFlags::RDONLY) {
        return Err(EACCES);
    }

    let me = thread::current().id();
    let mut writer = shared.writer.lock();
    loop {
        let owner = *writer;
        match owner {
            None => break,
            Some(owner) if owner == me => return Err(EBUSY),
            Some(_) => shared.writer_done.wait(&mut writer),
        }
        if shared.closed.load(Ordering::Acquire) {
            return Err(EINVAL);
        }
    }
    *writer = Some(me);
    drop(writer);

    let snapshot = (**shared.current.lock()).clone();
    let txn_id = snapshot.txn_id + 1;
    let mut work = shared.work.lock();
    work.clear();
    work.push(snapshot);
    Ok(RawTxn {
        shared: Arc::clone(shared),
        kind: Some(Kind::Write { depth: 0, txn_id }),
    })
}

/// Snapshot id a transaction reads, or the id a write transaction will
/// commit as. Zero for a reset or terminated transaction.
pub(crate) fn txn_id(txn: &RawTxn) -> u64 {
    match &txn.kind {
        Some(Kind::Read { snapshot: Some(snapshot), .. }) => snapshot.txn_id,
        Some(Kind::Write { txn_id, .. }) => *txn_id,
        _ => 0,
    }
}

pub(crate) fn txn_commit(mut txn: RawTxn) -> c_int {
    let kind = match txn.kind.take() {
        Some(kind) => kind,
        None => return BAD_TXN,
    };
    if txn.shared.closed.load(Ordering::Acquire) {
        return BAD_TXN;
    }
    match kind {
        Kind::Read { slot, .. } => {
            txn.shared.readers.lock().release(slot);
            SUCCESS
        }
        Kind::Write { depth, txn_id } => status(commit_write(&txn.shared, depth, txn_id)),
    }
}

fn commit_write(shared: &Shared, depth: usize, txn_id: u64) -> Result<(), c_int> {
    let mut work = shared.work.lock();
    if work.len() <= depth {
        return Err(BAD_TXN);
    }
    // The innermost level already holds every change made by open children.
    let mut level = work.pop().ok_or(BAD_TXN)?;
    work.truncate(depth);
    if depth > 0 {
        work[depth - 1] = level;
        return Ok(());
    }
    drop(work);

    level.txn_id = txn_id;
    let saved = persist(shared, &level);
    if saved.is_ok() {
        *shared.current.lock() = Arc::new(level);
        let readers = shared.readers.lock();
        trace!(
            "published snapshot {} ({} readers, oldest {:?})",
            txn_id,
            readers.num_readers(),
            readers.oldest()
        );
    }
    release_writer(shared);
    saved
}

fn persist(shared: &Shared, snapshot: &Snapshot) -> Result<(), c_int> {
    let config = shared.config.lock();
    match &config.store {
        Some(store) => store.save(snapshot, config.page_size as u32),
        None => Err(EINVAL),
    }
}

pub(crate) fn txn_abort(mut txn: RawTxn) -> c_int {
    match txn.kind.take() {
        Some(kind) => {
            finish_abort(&txn.shared, kind);
            SUCCESS
        }
        None => BAD_TXN,
    }
}

fn finish_abort(shared: &Shared, kind: Kind) {
    if shared.closed.load(Ordering::Acquire) {
        return;
    }
    match kind {
        Kind::Read { slot, .. } => shared.readers.lock().release(slot),
        Kind::Write { depth, .. } => {
            shared.work.lock().truncate(depth);
            if depth == 0 {
                release_writer(shared);
            }
        }
    }
}

fn release_writer(shared: &Shared) {
    *shared.writer.lock() = None;
    shared.writer_done.notify_all();
}

/// Releases the snapshot of a readonly transaction, keeping its reader slot.
pub(crate) fn txn_reset(txn: &mut RawTxn) -> c_int {
    if txn.shared.closed.load(Ordering::Acquire) {
        return BAD_TXN;
    }
    match txn.kind.as_mut() {
        Some(Kind::Read { slot, snapshot }) => {
            *snapshot = None;
            txn.shared.readers.lock().reset(*slot);
            SUCCESS
        }
        Some(Kind::Write { .. }) => EINVAL,
        None => BAD_TXN,
    }
}

/// Gives a reset transaction the latest committed snapshot.
pub(crate) fn txn_renew(txn: &mut RawTxn) -> c_int {
    if txn.shared.closed.load(Ordering::Acquire) {
        return BAD_TXN;
    }
    match txn.kind.as_mut() {
        Some(Kind::Read { slot, snapshot }) if snapshot.is_none() => {
            let current = Arc::clone(&*txn.shared.current.lock());
            if let Err(code) = txn.shared.readers.lock().renew(*slot, current.txn_id) {
                return code;
            }
            *snapshot = Some(current);
            SUCCESS
        }
        Some(_) => EINVAL,
        None => BAD_TXN,
    }
}

/// Runs `f` on the state the transaction reads.
fn with_view<R>(txn: &RawTxn, f: impl FnOnce(&Snapshot) -> Result<R, c_int>) -> Result<R, c_int> {
    match txn.check()? {
        Kind::Read { snapshot: Some(snapshot), .. } => f(snapshot),
        Kind::Read { snapshot: None, .. } => Err(BAD_TXN),
        Kind::Write { depth, .. } => {
            let work = txn.shared.work.lock();
            if work.len() != depth + 1 {
                return Err(BAD_TXN);
            }
            f(&work[*depth])
        }
    }
}

/// Runs `f` on the writable state of a write transaction with no open child.
fn with_level<R>(
    txn: &RawTxn,
    f: impl FnOnce(&mut Snapshot) -> Result<R, c_int>,
) -> Result<R, c_int> {
    match txn.check()? {
        Kind::Read { .. } => Err(EACCES),
        Kind::Write { depth, .. } => {
            let mut work = txn.shared.work.lock();
            if work.len() != depth + 1 {
                return Err(BAD_TXN);
            }
            f(&mut work[*depth])
        }
    }
}

fn resolve(shared: &Shared, dbi: u32) -> Result<String, c_int> {
    if dbi == FREE_DBI {
        return Err(BAD_DBI);
    }
    shared
        .dbis
        .lock()
        .get(dbi as usize)
        .cloned()
        .flatten()
        .ok_or(BAD_DBI)
}

/// Returns `(max key size, size upper bound)`.
fn limits(shared: &Shared) -> (usize, usize) {
    let config = shared.config.lock();
    (config.max_key_size(), config.size_upper)
}

/// Opens the main table (`name == None`) or a named table.
pub(crate) fn dbi_open(txn: &RawTxn, name: Option<&str>, flags: DbFlags, out: &mut u32) -> c_int {
    match open_table(txn, name, flags) {
        Ok(dbi) => {
            *out = dbi;
            SUCCESS
        }
        Err(code) => code,
    }
}

fn open_table(txn: &RawTxn, name: Option<&str>, flags: DbFlags) -> Result<u32, c_int> {
    let writable = matches!(txn.check()?, Kind::Write { .. });
    let max_dbs = txn.shared.config.lock().max_dbs;
    let name = match name {
        None => MAIN_TABLE,
        Some("") => return Err(EINVAL),
        Some(_) if max_dbs == 0 => return Err(DBS_FULL),
        Some(name) => name,
    };
    let wanted = flags & DbFlags::PERSISTENT;
    let create = flags.contains(DbFlags::CREATE);

    let (existing, named) = with_view(txn, |snap| {
        let existing = snap.tables.get(name).map(|t| (t.flags(), t.is_empty()));
        Ok((existing, snap.named()))
    })?;

    match existing {
        None if !create => return Err(NOTFOUND),
        None if !writable => return Err(EACCES),
        None => {
            if named >= max_dbs as usize {
                return Err(DBS_FULL);
            }
            with_level(txn, |snap| {
                snap.tables.insert(name.to_string(), Arc::new(Table::new(wanted)));
                Ok(())
            })?;
        }
        Some((current, _)) if current == wanted => {}
        // An empty table takes the layout it is created with.
        Some((_, true)) if create && writable => {
            with_level(txn, |snap| {
                let table = snap.tables.get_mut(name).ok_or(BAD_DBI)?;
                Arc::make_mut(table).set_flags(wanted);
                Ok(())
            })?;
        }
        Some(_) => return Err(INCOMPATIBLE),
    }

    if name == MAIN_TABLE {
        return Ok(MAIN_DBI);
    }
    register(&txn.shared, name, max_dbs)
}

fn register(shared: &Shared, name: &str, max_dbs: u32) -> Result<u32, c_int> {
    let mut dbis = shared.dbis.lock();
    if let Some(pos) = dbis.iter().position(|n| n.as_deref() == Some(name)) {
        return Ok(pos as u32);
    }

    let core = CORE_DBS as usize;
    let slot = match dbis.iter().skip(core).position(Option::is_none) {
        Some(free) => free + core,
        None if dbis.len() < core + max_dbs as usize => {
            dbis.push(None);
            dbis.len() - 1
        }
        None => return Err(DBS_FULL),
    };
    dbis[slot] = Some(name.to_string());
    Ok(slot as u32)
}

pub(crate) fn dbi_close(env: &RawEnv, dbi: u32) -> c_int {
    if dbi < CORE_DBS {
        return BAD_DBI;
    }
    match env.shared.dbis.lock().get_mut(dbi as usize) {
        Some(slot) if slot.is_some() => {
            *slot = None;
            SUCCESS
        }
        _ => BAD_DBI,
    }
}

/// Empties a table, or with `del` removes a named table and frees its handle.
pub(crate) fn dbi_drop(txn: &RawTxn, dbi: u32, del: bool) -> c_int {
    status(drop_table(txn, dbi, del))
}

fn drop_table(txn: &RawTxn, dbi: u32, del: bool) -> Result<(), c_int> {
    let name = resolve(&txn.shared, dbi)?;
    let remove = del && name != MAIN_TABLE;
    with_level(txn, |snap| {
        if remove {
            snap.tables.remove(&name).ok_or(BAD_DBI)?;
        } else {
            let table = snap.tables.get_mut(&name).ok_or(BAD_DBI)?;
            Arc::make_mut(table).clear();
        }
        Ok(())
    })?;

    if remove {
        if let Some(slot) = txn.shared.dbis.lock().get_mut(dbi as usize) {
            *slot = None;
        }
    }
    Ok(())
}

/// Looks up `key` and points `data` at the first value stored for it.
///
/// # Safety
///
/// A non-null `key` must point at live memory. On success `data` points into
/// memory held by the transaction, valid until it is reset or terminated or
/// until it writes to the same table.
pub(crate) unsafe fn get(txn: &RawTxn, dbi: u32, key: &Val, data: &Cell<Val>) -> c_int {
    status(get_value(txn, dbi, key.as_slice(), data))
}

fn get_value(txn: &RawTxn, dbi: u32, key: Option<&[u8]>, data: &Cell<Val>) -> Result<(), c_int> {
    let key = key.ok_or(EINVAL)?;
    let (max_key, _) = limits(&txn.shared);
    if key.len() > max_key {
        return Err(BAD_VALSIZE);
    }
    let name = resolve(&txn.shared, dbi)?;
    with_view(txn, |snap| {
        let table = snap.tables.get(&name).ok_or(BAD_DBI)?;
        let val = table.get(key).ok_or(NOTFOUND)?;
        data.set(Val::new(&val[..]));
        Ok(())
    })
}

/// Stores `data` under `key`.
///
/// # Safety
///
/// Non-null descriptors must point at live memory.
pub(crate) unsafe fn put(txn: &RawTxn, dbi: u32, key: &Val, data: &Val, flags: WriteFlags) -> c_int {
    status(put_value(txn, dbi, key.as_slice(), data.as_slice(), flags))
}

fn put_value(
    txn: &RawTxn,
    dbi: u32,
    key: Option<&[u8]>,
    data: Option<&[u8]>,
    flags: WriteFlags,
) -> Result<(), c_int> {
    let (key, data) = match (key, data) {
        (Some(key), Some(data)) => (key, data),
        _ => return Err(EINVAL),
    };
    if let Kind::Read { .. } = txn.check()? {
        return Err(EACCES);
    }
    let (max_key, upper) = limits(&txn.shared);
    if key.is_empty() || key.len() > max_key {
        return Err(BAD_VALSIZE);
    }

    let name = resolve(&txn.shared, dbi)?;
    with_level(txn, |snap| {
        if snap.bytes() + key.len() + data.len() + ENTRY_OVERHEAD > upper {
            return Err(MAP_FULL);
        }
        let table = snap.tables.get_mut(&name).ok_or(BAD_DBI)?;
        Arc::make_mut(table).put(key, data, flags)
    })
}

/// Deletes `key`, or the single pair `key`/`data` in a `DUPSORT` table.
///
/// # Safety
///
/// Non-null descriptors must point at live memory.
pub(crate) unsafe fn del(txn: &RawTxn, dbi: u32, key: &Val, data: Option<&Val>) -> c_int {
    let data = match data {
        Some(data) => data.as_slice(),
        None => None,
    };
    status(del_value(txn, dbi, key.as_slice(), data))
}

fn del_value(txn: &RawTxn, dbi: u32, key: Option<&[u8]>, data: Option<&[u8]>) -> Result<(), c_int> {
    if let Kind::Read { .. } = txn.check()? {
        return Err(EACCES);
    }
    let key = key.ok_or(EINVAL)?;
    let name = resolve(&txn.shared, dbi)?;
    with_level(txn, |snap| {
        let table = snap.tables.get_mut(&name).ok_or(BAD_DBI)?;
        if table.get(key).is_none() {
            return Err(NOTFOUND);
        }
        Arc::make_mut(table).del(key, data)
    })
}

/// Message for an engine status code.
pub(crate) fn strerror(code: c_int) -> &'static str {
    match code {
        SUCCESS => "successful",
        KEYEXIST => "key/data pair already exists",
        NOTFOUND => "no matching key/data pair found",
        PAGE_NOTFOUND => "requested page not found",
        CORRUPTED => "database is corrupted",
        PANIC => "environment had fatal error",
        VERSION_MISMATCH => "database version mismatch",
        INVALID => "file is not a valid data file",
        MAP_FULL => "environment mapsize limit reached",
        DBS_FULL => "too many table handles (maxdbs reached)",
        READERS_FULL => "too many readers (maxreaders reached)",
        TXN_FULL => "transaction has too many dirty pages",
        CURSOR_FULL => "cursor stack limit reached",
        PAGE_FULL => "page has no more space",
        INCOMPATIBLE => "operation and table incompatible, or table flags changed",
        BAD_RSLOT => "invalid reuse of reader locktable slot",
        BAD_TXN => "transaction must abort, has a child, or is invalid",
        BAD_VALSIZE => "unsupported size of key/table name/data, or wrong DUPFIXED size",
        BAD_DBI => "the specified table handle was changed unexpectedly",
        _ => "unknown error",
    }
}
