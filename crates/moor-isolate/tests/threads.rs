//! Thread entry and the isolate lock across threads.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::bounded;
use moor_core::{HandleError, UsageError};
use moor_isolate::{Isolate, IsolateConfig, Locker, Unlocker};
use moor_test_utils::{RecordingFatalHandler, TrackedObjects};

fn isolate() -> (Arc<Isolate>, Arc<RecordingFatalHandler>) {
    let handler = Arc::new(RecordingFatalHandler::new());
    let iso = Isolate::new(IsolateConfig::default().with_fatal_handler(handler.clone())).unwrap();
    (iso, handler)
}

#[test]
fn enter_twice_exit_twice() {
    let (iso, handler) = isolate();
    assert!(!iso.contains_threads());
    assert_eq!(iso.enter(), 1);
    assert_eq!(iso.enter(), 2);
    iso.exit().unwrap();
    assert!(iso.contains_threads());
    assert_eq!(iso.entry_count(), 1);
    iso.exit().unwrap();
    assert!(!iso.contains_threads());
    assert!(Isolate::current().is_none());
    assert_eq!(handler.count(), 0);
}

#[test]
fn guards_dropped_out_of_order_keep_current_consistent() {
    let (a, _) = isolate();
    let (b, handler) = isolate();
    let outer = a.entered();
    let inner = b.entered();
    drop(outer);
    assert_eq!(Isolate::current().map(|i| i.id()), Some(b.id()));
    assert!(!a.contains_threads());

    let scope = b.handle_scope().unwrap();
    let objs = TrackedObjects::new(1);
    scope.create(objs.get(0)).unwrap();
    drop(scope);
    assert_eq!(objs.dropped(), 1);

    drop(inner);
    assert!(Isolate::current().is_none());
    assert_eq!(handler.count(), 0);
}

#[test]
fn threads_enter_concurrently() {
    let (iso, _) = isolate();
    let (entered_tx, entered_rx) = bounded::<()>(0);
    let (leave_tx, leave_rx) = bounded::<()>(0);
    let other = Arc::clone(&iso);
    let worker = thread::spawn(move || {
        other.enter();
        entered_tx.send(()).unwrap();
        leave_rx.recv().unwrap();
        other.exit().unwrap();
    });
    entered_rx.recv().unwrap();
    assert!(iso.contains_threads());
    assert_eq!(iso.entry_count(), 0);
    assert_eq!(iso.stats().entered_threads, 1);
    leave_tx.send(()).unwrap();
    worker.join().unwrap();
    assert!(!iso.contains_threads());
}

/// T1 enters first and exits first while T2 is still entered; the lock is
/// handed back and forth with an `Unlocker`.
#[test]
fn non_lifo_entry_with_lock_handoff() {
    let (iso, handler) = isolate();
    let (go_tx, go_rx) = bounded::<()>(0);
    let (ready_tx, ready_rx) = bounded::<()>(0);
    let (t1_done_tx, t1_done_rx) = bounded::<()>(0);

    let t2 = {
        let iso = Arc::clone(&iso);
        thread::spawn(move || {
            go_rx.recv().unwrap();
            let _lock = Locker::new(&iso);
            iso.enter();
            let objs = TrackedObjects::new(1);
            let scope = iso.open_scope().unwrap();
            let local = iso.create_local(objs.get(0)).unwrap();
            {
                let _yield = Unlocker::new(&iso).unwrap();
                ready_tx.send(()).unwrap();
                t1_done_rx.recv().unwrap();
            }
            assert!(iso.get_local(local).unwrap().ptr_eq(objs.get(0)));
            iso.close_scope(scope).unwrap();
            assert_eq!(objs.dropped(), 1);
            iso.exit().unwrap();
            assert!(!iso.contains_threads());
        })
    };

    let objs = TrackedObjects::new(1);
    {
        let _lock = Locker::new(&iso);
        iso.enter();
        let scope = iso.open_scope().unwrap();
        let local = iso.create_local(objs.get(0)).unwrap();
        {
            let _yield = Unlocker::new(&iso).unwrap();
            go_tx.send(()).unwrap();
            ready_rx.recv().unwrap();
            let stats = iso.stats();
            assert_eq!(stats.entered_threads, 2);
            assert_eq!(stats.rooting_threads, 2);
        }
        assert!(iso.get_local(local).unwrap().ptr_eq(objs.get(0)));
        iso.close_scope(scope).unwrap();
        iso.exit().unwrap();
        assert!(iso.contains_threads());
    }
    assert_eq!(objs.dropped(), 1);
    t1_done_tx.send(()).unwrap();
    t2.join().unwrap();
    assert_eq!(handler.count(), 0);
    assert_eq!(iso.stats().rooting_threads, 0);
}

#[test]
fn scope_while_unlocked_is_usage_error() {
    let (iso, handler) = isolate();
    let _entered = iso.entered();
    let lock = Locker::new(&iso);
    let unlocker = Unlocker::new(&iso).unwrap();
    assert_eq!(
        iso.handle_scope().unwrap_err(),
        HandleError::Usage(UsageError::NotLocked { isolate: iso.id() })
    );
    assert_eq!(handler.locations(), vec!["HandleScope::new"]);
    drop(unlocker);
    drop(lock);
    assert!(!iso.is_locked_by_current_thread());
}
