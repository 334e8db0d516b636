//! Debug-build registry of live unmanaged transactions.
//!
//! Transactions begun through [`Env::begin_txn`](crate::Env::begin_txn) and
//! its variants are registered here until they commit, abort or drop.
//! Release builds keep the registry empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

static LIVE: Lazy<Mutex<HashMap<u64, LiveTxn>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// A transaction still registered as live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTxn {
    /// Serial of the environment that began it
    pub env: u64,
    /// Readonly transaction
    pub readonly: bool,
    /// Thread that began it
    pub thread: ThreadId,
}

pub(crate) fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Registers a transaction; returns false when tracking is disabled.
pub(crate) fn track(serial: u64, env: u64, readonly: bool) -> bool {
    if !cfg!(debug_assertions) {
        return false;
    }
    let txn = LiveTxn { env, readonly, thread: thread::current().id() };
    LIVE.lock().insert(serial, txn);
    true
}

pub(crate) fn untrack(serial: u64) {
    LIVE.lock().remove(&serial);
}

/// Number of live transactions begun on the environment `env`.
pub(crate) fn live_for_env(env: u64) -> usize {
    LIVE.lock().values().filter(|txn| txn.env == env).count()
}

/// Snapshot of every registered transaction, ordered by serial.
pub fn live_transactions() -> Vec<(u64, LiveTxn)> {
    let mut live: Vec<_> = LIVE.lock().iter().map(|(s, t)| (*s, t.clone())).collect();
    live.sort_by_key(|(serial, _)| *serial);
    live
}

/// Panics if any unmanaged transaction is still live. Meant for the end of a
/// test or of `main`.
pub fn assert_no_live_transactions() {
    let live = live_transactions();
    if !live.is_empty() {
        panic!("{} transaction(s) still live: {:?}", live.len(), live);
    }
}
