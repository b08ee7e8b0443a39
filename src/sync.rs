#[cfg(feature = "loom")]
mod imp {
    use std::io;

    pub(crate) use loom::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc, Condvar, Mutex, MutexGuard,
        },
        thread_local,
    };

    pub(crate) type WorkerHandle = loom::thread::JoinHandle<()>;

    pub(crate) fn available_parallelism() -> u32 {
        std::thread::available_parallelism().map_or(1, |n| n.get() as u32)
    }

    pub(crate) fn spawn_worker(
        _name: String,
        _stack_size: Option<usize>,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<WorkerHandle> {
        // Loom has no `thread::Builder`; names and stack sizes only matter on
        // real threads.
        Ok(loom::thread::spawn(f))
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    use std::{io, thread};

    pub(crate) use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc, Condvar, Mutex, MutexGuard,
        },
        thread_local,
    };

    pub(crate) type WorkerHandle = thread::JoinHandle<()>;

    pub(crate) fn available_parallelism() -> u32 {
        thread::available_parallelism().map_or(1, |n| n.get() as u32)
    }

    pub(crate) fn spawn_worker(
        name: String,
        stack_size: Option<usize>,
        f: impl FnOnce() + Send + 'static,
    ) -> io::Result<WorkerHandle> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(bytes) = stack_size {
            builder = builder.stack_size(bytes);
        }
        builder.spawn(f)
    }
}

pub(crate) use imp::*;
