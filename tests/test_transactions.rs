// Transaction lifecycle: reset/renew, managed helpers, nesting, threads
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use kvtxn::{
    is_errno_sys, DbFlags, Env, Errno, Error, Result, ThreadLock, TxnFlags, WriteFlags, EBUSY,
    EINVAL,
};
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, Env) {
    let temp_dir = TempDir::new().unwrap();
    let env = Env::new().unwrap();
    env.open(temp_dir.path().join("data.db")).unwrap();
    (temp_dir, env)
}

fn put_root(env: &Env, key: &[u8], val: &[u8]) {
    env.update(|txn| -> Result<()> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, key, val, WriteFlags::empty())
    })
    .unwrap();
}

fn get_root(env: &Env, key: &[u8]) -> Result<Vec<u8>> {
    env.view(|txn| -> Result<Vec<u8>> {
        let dbi = txn.open_root(DbFlags::empty())?;
        Ok(txn.get(dbi, key)?.into_vec())
    })
}

#[derive(Debug)]
enum AppError {
    Db(Error),
    Rejected,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Db(err)
    }
}

#[test]
fn test_reset_and_renew() {
    let (_dir, env) = setup_test_env();
    put_root(&env, b"key", b"v1");

    let mut reader = env.begin_ro_txn().unwrap();
    let dbi = reader.open_root(DbFlags::empty()).unwrap();
    let first_id = reader.id();
    assert_eq!(reader.get(dbi, b"key").unwrap(), *b"v1");

    put_root(&env, b"key", b"v2");

    // Still on the old snapshot
    assert_eq!(reader.get(dbi, b"key").unwrap(), *b"v1");
    assert_eq!(reader.id(), first_id);

    reader.reset().unwrap();
    assert!(reader.is_reset());
    assert_eq!(reader.id(), 0);

    reader.renew().unwrap();
    assert!(!reader.is_reset());
    assert_eq!(reader.id(), first_id + 1);
    assert_eq!(reader.get(dbi, b"key").unwrap(), *b"v2");
    reader.commit().unwrap();
}

#[test]
fn test_reset_write_transaction_fails() {
    let (_dir, env) = setup_test_env();
    let lock = ThreadLock::acquire();

    let mut txn = env.begin_rw_txn(&lock).unwrap();
    let err = txn.reset().unwrap_err();
    assert!(is_errno_sys(&err, EINVAL));
    assert_eq!(err.op(), Some("mdbx_txn_reset"));
    assert!(!txn.is_reset());
    txn.commit().unwrap();
}

#[test]
#[should_panic(expected = "transaction is already reset")]
fn test_double_reset_panics() {
    let (_dir, env) = setup_test_env();
    let mut reader = env.begin_ro_txn().unwrap();
    reader.reset().unwrap();
    let _ = reader.reset();
}

#[test]
#[should_panic(expected = "only a reset transaction can be renewed")]
fn test_renew_active_panics() {
    let (_dir, env) = setup_test_env();
    let mut reader = env.begin_ro_txn().unwrap();
    let _ = reader.renew();
}

#[test]
#[should_panic(expected = "managed transaction cannot be reset directly")]
fn test_managed_reset_panics() {
    let (_dir, env) = setup_test_env();
    let _ = env.view(|txn| -> Result<()> { txn.reset() });
}

#[test]
#[should_panic(expected = "managed transaction cannot be renewed directly")]
fn test_managed_renew_panics() {
    let (_dir, env) = setup_test_env();
    let _ = env.view(|txn| -> Result<()> { txn.renew() });
}

#[test]
#[should_panic(expected = "managed transaction cannot begin an unmanaged child")]
fn test_managed_begin_child_panics() {
    let (_dir, env) = setup_test_env();
    let _ = env.update(|txn| -> Result<()> { txn.begin_child()?.commit() });
}

#[test]
#[should_panic(expected = "write transaction requires a ThreadLock")]
fn test_write_without_lock_panics() {
    let (_dir, env) = setup_test_env();
    let _ = env.begin_txn(TxnFlags::empty(), None);
}

#[test]
fn test_failed_update_writes_nothing() {
    let (_dir, env) = setup_test_env();

    let result = env.update(|txn| -> std::result::Result<(), AppError> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, b"key", b"value", WriteFlags::empty())?;
        Err(AppError::Rejected)
    });
    assert!(matches!(result, Err(AppError::Rejected)));
    assert!(get_root(&env, b"key").unwrap_err().is_not_found());

    // Engine errors come back wrapped in the closure's error type
    let result = env.view(|txn| -> std::result::Result<Vec<u8>, AppError> {
        let dbi = txn.open_root(DbFlags::empty())?;
        Ok(txn.get(dbi, b"key")?.into_vec())
    });
    match result {
        Err(AppError::Db(err)) => assert_eq!(err.errno(), Some(Errno::NotFound)),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn test_sub_transactions() {
    let (_dir, env) = setup_test_env();

    env.update(|txn| -> std::result::Result<(), AppError> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, b"a", b"1", WriteFlags::empty())?;

        txn.sub(|child| -> Result<()> { child.put(dbi, b"b", b"2", WriteFlags::empty()) })?;

        let rejected = txn.sub(|child| -> std::result::Result<(), AppError> {
            child.put(dbi, b"c", b"3", WriteFlags::empty())?;
            Err(AppError::Rejected)
        });
        assert!(matches!(rejected, Err(AppError::Rejected)));

        assert_eq!(txn.get(dbi, b"b")?, *b"2");
        assert!(txn.get(dbi, b"c").unwrap_err().is_not_found());
        Ok(())
    })
    .unwrap();

    assert_eq!(get_root(&env, b"a").unwrap(), b"1");
    assert_eq!(get_root(&env, b"b").unwrap(), b"2");
    assert!(get_root(&env, b"c").unwrap_err().is_not_found());
}

#[test]
fn test_unmanaged_children() {
    let (_dir, env) = setup_test_env();
    let lock = ThreadLock::acquire();

    let mut txn = env.begin_rw_txn(&lock).unwrap();
    let dbi = txn.open_root(DbFlags::empty()).unwrap();

    let mut child = txn.begin_child().unwrap();
    child.put(dbi, b"kept", b"1", WriteFlags::empty()).unwrap();
    child.commit().unwrap();

    let mut child = txn.begin_child().unwrap();
    child.put(dbi, b"dropped", b"2", WriteFlags::empty()).unwrap();
    child.abort();

    assert_eq!(txn.get(dbi, b"kept").unwrap(), *b"1");
    assert!(txn.get(dbi, b"dropped").unwrap_err().is_not_found());
    txn.commit().unwrap();

    assert_eq!(get_root(&env, b"kept").unwrap(), b"1");
}

#[test]
fn test_run_op_restores_state() {
    let (_dir, env) = setup_test_env();

    let mut reader = env.begin_ro_txn().unwrap();
    let id = reader.run_op(|txn| -> Result<u64> { Ok(txn.id()) }).unwrap();
    assert_eq!(id, reader.id());

    // Unmanaged again once run_op returns
    reader.reset().unwrap();
    reader.renew().unwrap();
    reader.abort();
}

#[test]
fn test_run_op_term_and_run_txn() {
    let (_dir, env) = setup_test_env();
    let lock = ThreadLock::acquire();

    let txn = env.begin_rw_txn(&lock).unwrap();
    txn.run_op_term(|txn| -> Result<()> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, b"term", b"1", WriteFlags::empty())
    })
    .unwrap();

    env.run_txn(TxnFlags::empty(), Some(&lock), |txn| -> Result<()> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, b"run", b"2", WriteFlags::empty())
    })
    .unwrap();

    env.update_locked(&lock, |txn| -> Result<()> {
        let dbi = txn.open_root(DbFlags::empty())?;
        assert_eq!(txn.get(dbi, b"term")?, *b"1");
        assert_eq!(txn.get(dbi, b"run")?, *b"2");
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_second_writer_on_same_thread_fails() {
    let (_dir, env) = setup_test_env();
    let lock = ThreadLock::acquire();

    let txn = env.begin_rw_txn(&lock).unwrap();
    let err = env.update(|_| -> Result<()> { Ok(()) }).unwrap_err();
    assert!(is_errno_sys(&err, EBUSY));
    txn.abort();

    env.update(|_| -> Result<()> { Ok(()) }).unwrap();
}

#[test]
fn test_writers_on_other_threads_wait() {
    let (_dir, env) = setup_test_env();
    put_root(&env, b"counter", b"0");
    let lock = ThreadLock::acquire();

    let mut txn = env.begin_rw_txn(&lock).unwrap();
    let dbi = txn.open_root(DbFlags::empty()).unwrap();
    txn.put(dbi, b"counter", b"1", WriteFlags::empty()).unwrap();

    thread::scope(|s| {
        let writer = s.spawn(|| {
            env.update(|txn| -> Result<()> {
                let dbi = txn.open_root(DbFlags::empty())?;
                let mut value = txn.get(dbi, b"counter")?.into_vec();
                value.push(b'2');
                txn.put(dbi, b"counter", &value, WriteFlags::empty())
            })
        });
        let reader = s.spawn(|| get_root(&env, b"counter"));

        // Readers are never blocked by the writer
        assert_eq!(reader.join().unwrap().unwrap(), b"0");

        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());

        txn.commit().unwrap();
        writer.join().unwrap().unwrap();
    });

    assert_eq!(get_root(&env, b"counter").unwrap(), b"12");
}

#[test]
fn test_readers_full() {
    let temp_dir = TempDir::new().unwrap();
    let env = Env::new().unwrap();
    env.set_max_readers(2).unwrap();
    env.open(temp_dir.path().join("data.db")).unwrap();
    assert_eq!(env.max_readers().unwrap(), 2);

    let first = env.begin_ro_txn().unwrap();
    let second = env.begin_ro_txn().unwrap();
    let err = env.begin_ro_txn().unwrap_err();
    assert_eq!(err.errno(), Some(Errno::ReadersFull));

    // A terminated reader frees its slot
    first.abort();
    let third = env.begin_ro_txn().unwrap();
    second.commit().unwrap();
    third.commit().unwrap();
}

#[test]
fn test_pooled_transaction_drop() {
    let (_dir, env) = setup_test_env();
    put_root(&env, b"key", b"value");

    let mut reader = env.begin_ro_txn().unwrap();
    reader.set_pooled(true);
    reader.reset().unwrap();
    drop(reader);

    assert_eq!(get_root(&env, b"key").unwrap(), b"value");
}

#[test]
fn test_panic_in_update_aborts() {
    let (_dir, env) = setup_test_env();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        env.update(|txn| -> Result<()> {
            let dbi = txn.open_root(DbFlags::empty())?;
            txn.put(dbi, b"key", b"value", WriteFlags::empty())?;
            panic!("closure failed");
        })
    }));
    assert!(result.is_err());

    // The write is gone and the writer and thread are released
    assert!(!ThreadLock::is_held());
    assert!(get_root(&env, b"key").unwrap_err().is_not_found());
    put_root(&env, b"key", b"after");
    assert_eq!(get_root(&env, b"key").unwrap(), b"after");
}

#[test]
fn test_panic_in_view_releases_reader() {
    let temp_dir = TempDir::new().unwrap();
    let env = Env::new().unwrap();
    env.set_max_readers(1).unwrap();
    env.open(temp_dir.path().join("data.db")).unwrap();
    put_root(&env, b"key", b"value");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        env.view(|_| -> Result<()> { panic!("closure failed") })
    }));
    assert!(result.is_err());

    // The only reader slot is free again
    assert_eq!(get_root(&env, b"key").unwrap(), b"value");
}

#[test]
fn test_panic_in_sub_aborts_child() {
    let (_dir, env) = setup_test_env();

    env.update(|txn| -> Result<()> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, b"parent", b"1", WriteFlags::empty())?;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            txn.sub(|child| -> Result<()> {
                child.put(dbi, b"child", b"2", WriteFlags::empty())?;
                panic!("child failed");
            })
        }));
        assert!(result.is_err());

        // The parent is still usable and the child's write is gone
        assert!(txn.get(dbi, b"child").unwrap_err().is_not_found());
        assert_eq!(txn.get(dbi, b"parent")?, *b"1");
        txn.put(dbi, b"parent", b"3", WriteFlags::empty())
    })
    .unwrap();

    assert_eq!(get_root(&env, b"parent").unwrap(), b"3");
    assert!(get_root(&env, b"child").unwrap_err().is_not_found());
}

#[test]
fn test_commit_failure_is_returned() {
    let (_dir, env) = setup_test_env();

    let result = env.update(|txn| -> Result<i32> {
        let dbi = txn.open_root(DbFlags::empty())?;
        txn.put(dbi, b"key", b"value", WriteFlags::empty())?;
        txn.env().close()?;
        Ok(7)
    });
    let err = result.unwrap_err();
    assert_eq!(err.op(), Some("mdbx_txn_commit"));
    assert_eq!(err.errno(), Some(Errno::BadTxn));
    assert!(!ThreadLock::is_held());
}
