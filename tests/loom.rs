#![allow(missing_docs)]
#![cfg(feature = "loom")]

use loom::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use nanopool::{
    config::PoolOptions,
    pool::Pool,
    task::{Payload, PayloadDeleter, WorkFn},
};

struct Ctx {
    state: Arc<AtomicUsize>,
}

impl Ctx {
    fn payload(state: &Arc<AtomicUsize>) -> Payload {
        let ptr = Box::into_raw(Box::new(Ctx {
            state: state.clone(),
        }));
        Payload::Owned {
            ptr: ptr.cast(),
            deleter: delete_ctx as PayloadDeleter,
        }
    }
}

unsafe fn delete_ctx(payload: *mut ()) {
    drop(unsafe { Box::from_raw(payload.cast::<Ctx>()) });
}

unsafe fn mark_one(_index: u32, payload: *mut ()) {
    let ctx = unsafe { &*payload.cast_const().cast::<Ctx>() };
    ctx.state
        .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
        .expect("parent must run first");
}

unsafe fn mark_two(_index: u32, payload: *mut ()) {
    let ctx = unsafe { &*payload.cast_const().cast::<Ctx>() };
    ctx.state
        .compare_exchange(1, 2, Ordering::SeqCst, Ordering::SeqCst)
        .expect("child must run after its parent");
}

unsafe fn bump(_index: u32, payload: *mut ()) {
    let ctx = unsafe { &*payload.cast_const().cast::<Ctx>() };
    ctx.state.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn loom_child_runs_after_parent_on_one_worker() {
    loom::model(|| {
        // A -> B on a single worker; the waiter may help with either unit.
        let pool = Pool::with_options(PoolOptions::new().size(1)).expect("pool");
        let state = Arc::new(AtomicUsize::new(0));

        let a = unsafe { pool.submit(0, Some(mark_one as WorkFn), Ctx::payload(&state)) }
            .expect("submit a")
            .expect("scheduled");
        let b = unsafe {
            pool.submit_dep(&[&a], 0, Some(mark_two as WorkFn), Ctx::payload(&state))
        }
        .expect("submit b")
        .expect("scheduled");

        b.wait();
        assert_eq!(state.load(Ordering::SeqCst), 2);

        drop(a);
        drop(b);
        assert_eq!(pool.allocated_tasks(), 0);
        drop(pool);
    });
}

#[test]
fn loom_helping_drains_a_workerless_pool() {
    loom::model(|| {
        let pool = Pool::with_options(PoolOptions::new().size(0)).expect("pool");
        let state = Arc::new(AtomicUsize::new(0));

        let task = unsafe { pool.submit(2, Some(bump as WorkFn), Ctx::payload(&state)) }
            .expect("submit")
            .expect("scheduled");
        task.join();

        assert_eq!(state.load(Ordering::SeqCst), 2);
        assert_eq!(pool.allocated_tasks(), 0);
        drop(pool);
    });
}

#[test]
fn loom_early_release_recycles_after_completion() {
    loom::model(|| {
        // A's handle is dropped while A may still be queued or running; the
        // record must survive until A completes and B no longer references
        // it.
        let pool = Pool::with_options(PoolOptions::new().size(1)).expect("pool");
        let state = Arc::new(AtomicUsize::new(0));

        let a = unsafe { pool.submit(0, Some(mark_one as WorkFn), Ctx::payload(&state)) }
            .expect("submit a")
            .expect("scheduled");
        let b = unsafe {
            pool.submit_dep(&[&a], 0, Some(mark_two as WorkFn), Ctx::payload(&state))
        }
        .expect("submit b")
        .expect("scheduled");
        drop(a);

        b.join();
        assert_eq!(state.load(Ordering::SeqCst), 2);
        assert_eq!(pool.allocated_tasks(), 0);
        drop(pool);
    });
}
