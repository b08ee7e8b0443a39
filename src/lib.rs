//! Thread pool with a task-graph API.
//!
//! This crate provides a pool of OS worker threads executing **tasks** that
//! expand into a caller-chosen number of independent **work units**. It:
//! - Lets a task declare **parent tasks** that must complete before any of
//!   its work units may start, forming an arbitrary dependency DAG.
//! - Hands back a refcounted [`task::Task`] handle that external threads can
//!   wait on; one captured work-unit failure per task is re-raised in the
//!   waiter's context.
//! - Makes waiting threads help: while blocked, a waiter executes ready work
//!   units of the pool, so a callback that submits and waits on new tasks
//!   cannot deadlock even a single-threaded pool.
//!
//! Key modules:
//! - `pool`: the pool facade (create/resize/destroy, submission entry
//!   points, worker threads) and the scheduler behind it.
//! - `task`: the erased callback/payload interface and the task handle.
//! - `parallel`: safe block-range loops and async closures layered on the
//!   erased interface.
//! - `config`: pool construction options.
//!
//! Quick start:
//! 1. Create a [`pool::Pool`] (or use [`pool::Pool::global`]).
//! 2. Run closures with [`parallel::parallel_for`], or chain stages with
//!    [`parallel::parallel_for_async`]/[`parallel::parallel_do_async`] and
//!    parent handles.
//! 3. Call [`task::Task::join`] on the last handle; a panic from any work
//!    unit of that task resurfaces there.
//!
//! Dependencies are acyclic by construction: a task can only name parents
//! that already exist. When the last work unit of a task finishes, the pool
//! releases the task's payload, arms any children whose final parent just
//! completed, and wakes every waiter with the appropriate happens-before
//! relations.

/// Pool construction options.
///
/// Exposes [`config::PoolOptions`], consumed by
/// [`pool::Pool::with_options`].
pub mod config;
/// Safe convenience wrappers over the erased task interface.
///
/// Block-range parallel loops (`parallel_for`, `parallel_for_async`) and
/// zero-argument async closures (`parallel_do_async`), each stuffing its
/// captured state into a payload behind the scenes.
pub mod parallel;
/// The thread pool and its scheduler.
///
/// Contains the pool facade (lifecycle, resizing, submission, worker
/// threads) plus the internal task records, ready queue and completion
/// logic that enforce dependency ordering.
pub mod pool;
mod sync;
/// The erased task interface and the task handle.
///
/// Defines the work-unit callback shape, the payload ownership modes and
/// the refcounted [`task::Task`] handle returned by submission.
pub mod task;
mod types;
mod utils;
