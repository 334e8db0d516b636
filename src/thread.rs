//! OS-thread pinning for write transactions.
//!
//! The engine requires a write transaction to be created, used and
//! terminated on one OS thread. A [`ThreadLock`] is the capability that
//! proves the caller is on such a thread: it is neither `Send` nor `Sync`,
//! so neither it nor a reference to it can reach another thread, and every
//! call that produces a write transaction asks for one.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

thread_local! {
    static PINS: Cell<usize> = const { Cell::new(0) };
}

/// Pins the current OS thread for as long as the lock is alive.
///
/// Locks nest: the thread stays pinned until the last one is dropped.
pub struct ThreadLock {
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl ThreadLock {
    pub fn acquire() -> ThreadLock {
        PINS.with(|pins| pins.set(pins.get() + 1));
        ThreadLock {
            thread: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// True if the current thread holds at least one lock.
    pub fn is_held() -> bool {
        PINS.with(|pins| pins.get() > 0)
    }

    /// The thread this lock pins.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }
}

impl Drop for ThreadLock {
    fn drop(&mut self) {
        PINS.with(|pins| pins.set(pins.get().saturating_sub(1)));
    }
}

impl fmt::Debug for ThreadLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLock").field("thread", &self.thread).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_nest_per_thread() {
        assert!(!ThreadLock::is_held());
        let outer = ThreadLock::acquire();
        {
            let inner = ThreadLock::acquire();
            assert_eq!(inner.thread(), outer.thread());
            assert!(ThreadLock::is_held());
        }
        assert!(ThreadLock::is_held());
        assert!(!thread::spawn(ThreadLock::is_held).join().unwrap());
        drop(outer);
        assert!(!ThreadLock::is_held());
    }
}
