// Copyright 2024-2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A fixed-size thread pool running tasks in submission order.

use super::queue::{Dequeued, Task};
use super::sync::{Notifier, PoolState, SharedContext};
use crate::error::{Error, Result};
use crate::macros::{log_debug, log_error, log_info, log_warn};
// Platforms that support `libc::sched_setaffinity()`.
#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
use nix::{
    sched::{sched_setaffinity, CpuSet},
    unistd::Pid,
};
#[cfg(feature = "log")]
use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Number of threads to spawn in a thread pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// Spawn the number of threads returned by
    /// [`std::thread::available_parallelism()`].
    AvailableParallelism,
    /// Spawn the given number of threads.
    Count(NonZeroUsize),
}

impl TryFrom<usize> for ThreadCount {
    type Error = Error;

    /// Fails with [`Error::InvalidThreadCount`] if the count is zero.
    fn try_from(thread_count: usize) -> Result<Self> {
        NonZeroUsize::new(thread_count)
            .map(ThreadCount::Count)
            .ok_or(Error::InvalidThreadCount)
    }
}

/// Policy to pin worker threads to CPUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuPinningPolicy {
    /// Don't pin worker threads to CPUs.
    No,
    /// Pin each worker thread to a CPU, if CPU pinning is supported and
    /// implemented on this platform.
    IfSupported,
    /// Pin each worker thread to a CPU. If CPU pinning isn't supported on this
    /// platform (or not implemented), or if it fails for any worker, building
    /// the pool fails with [`Error::CpuPinning`].
    Always,
}

/// A builder for [`TaskPool`].
#[derive(Clone, Copy, Debug)]
pub struct ThreadPoolBuilder {
    /// Number of worker threads to spawn in the pool.
    pub num_threads: ThreadCount,
    /// Policy to pin worker threads to CPUs.
    pub cpu_pinning: CpuPinningPolicy,
}

impl ThreadPoolBuilder {
    /// Spawns a task pool.
    ///
    /// This returns once every worker thread has started.
    ///
    /// ```
    /// # use fifo_pool::{CpuPinningPolicy, ThreadCount, ThreadPoolBuilder};
    /// # use std::sync::atomic::{AtomicU64, Ordering};
    /// # use std::sync::Arc;
    /// let pool = ThreadPoolBuilder {
    ///     num_threads: ThreadCount::AvailableParallelism,
    ///     cpu_pinning: CpuPinningPolicy::No,
    /// }
    /// .build()
    /// .unwrap();
    ///
    /// let sum = Arc::new(AtomicU64::new(0));
    /// for i in 1..=10 {
    ///     let sum = sum.clone();
    ///     pool.submit(move || {
    ///         sum.fetch_add(i, Ordering::Relaxed);
    ///     })
    ///     .unwrap();
    /// }
    /// pool.await_completion().unwrap();
    ///
    /// assert_eq!(sum.load(Ordering::Relaxed), 5 * 11);
    /// ```
    pub fn build(&self) -> Result<TaskPool> {
        TaskPool::spawn(self)
    }
}

/// A pool of worker threads executing tasks in FIFO order.
///
/// Tasks are submitted with [`submit()`](Self::submit), from any number of
/// threads. [`await_completion()`](Self::await_completion) waits for all the
/// submitted tasks to complete and then stops the worker threads: draining is
/// terminal, a drained pool rejects any new task.
///
/// A task that panics doesn't bring its worker thread down. The panic is
/// logged (with the `log` feature) and counted in
/// [`num_panicked_tasks()`](Self::num_panicked_tasks).
///
/// Dropping a pool that wasn't drained drains it, running all the tasks that
/// are still queued.
///
/// Draining (or dropping) a pool from within one of its own tasks deadlocks,
/// as the task waits for its own completion. There is no timeout: a task that
/// never returns blocks the drain forever.
pub struct TaskPool {
    /// Handles to all the worker threads in the pool. Emptied when the threads
    /// are joined.
    threads: Mutex<Vec<WorkerThreadHandle>>,
    /// Number of worker threads spawned in the pool.
    num_threads: NonZeroUsize,
    /// Context shared with the worker threads.
    shared_context: Arc<SharedContext>,
}

/// Handle to a worker thread in a task pool.
struct WorkerThreadHandle {
    /// Thread handle object.
    handle: JoinHandle<()>,
}

impl TaskPool {
    /// Creates a pool with the given number of worker threads, without CPU
    /// pinning.
    ///
    /// Fails with [`Error::InvalidThreadCount`] if `thread_count` is zero, in
    /// which case no thread is spawned.
    ///
    /// ```
    /// # use fifo_pool::{Error, TaskPool};
    /// assert!(matches!(TaskPool::new(0), Err(Error::InvalidThreadCount)));
    ///
    /// let pool = TaskPool::new(2).unwrap();
    /// assert_eq!(pool.num_threads().get(), 2);
    /// ```
    pub fn new(thread_count: usize) -> Result<Self> {
        ThreadPoolBuilder {
            num_threads: ThreadCount::try_from(thread_count)?,
            cpu_pinning: CpuPinningPolicy::No,
        }
        .build()
    }

    fn spawn(builder: &ThreadPoolBuilder) -> Result<Self> {
        let num_threads: NonZeroUsize = match builder.num_threads {
            ThreadCount::AvailableParallelism => {
                std::thread::available_parallelism().unwrap_or_else(|_e| {
                    log_warn!("Getting the available parallelism failed, using 1 thread: {_e}");
                    NonZeroUsize::MIN
                })
            }
            ThreadCount::Count(count) => count,
        };
        let cpu_pinning = builder.cpu_pinning;

        #[cfg(any(
            miri,
            not(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux"
            ))
        ))]
        match cpu_pinning {
            CpuPinningPolicy::No => (),
            CpuPinningPolicy::IfSupported => {
                log_warn!("Pinning threads to CPUs is not implemented on this platform.")
            }
            CpuPinningPolicy::Always => {
                return Err(Error::CpuPinning {
                    id: 0,
                    reason: "pinning threads to CPUs is not implemented on this platform"
                        .to_owned(),
                });
            }
        }

        let shared_context = Arc::new(SharedContext::new());
        let (startup_sender, startup_receiver) = mpsc::channel::<Result<()>>();

        let mut threads = Vec::with_capacity(num_threads.get());
        for id in 0..num_threads.get() {
            let context = ThreadContext {
                #[cfg(feature = "log")]
                id,
                shared_context: shared_context.clone(),
            };
            let startup = startup_sender.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("fifo-pool-worker-{id}"))
                .spawn(move || {
                    let pinned = pin_current_thread(id, cpu_pinning);
                    let ready = pinned.is_ok();
                    // The receiver outlives this send: the pool waits for one
                    // message per spawned thread.
                    let _ = startup.send(pinned);
                    drop(startup);
                    if ready {
                        context.run();
                    }
                });
            match spawned {
                Ok(handle) => threads.push(WorkerThreadHandle { handle }),
                Err(source) => {
                    log_error!("[main thread] Failed to spawn thread #{id}: {source}");
                    Self::abort(&shared_context, threads);
                    return Err(Error::Spawn { id, source });
                }
            }
        }
        drop(startup_sender);

        let mut failure = None;
        for _ in 0..threads.len() {
            match startup_receiver.recv() {
                Ok(Ok(())) => (),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                // All the senders are gone, nothing more to wait for.
                Err(_) => break,
            }
        }
        if let Some(e) = failure {
            log_error!("[main thread] A worker thread failed to start: {e}");
            Self::abort(&shared_context, threads);
            return Err(e);
        }

        log_info!("[main thread] Spawned {num_threads} worker threads");
        Ok(Self {
            threads: Mutex::new(threads),
            num_threads,
            shared_context,
        })
    }

    /// Stops and joins the given worker threads of a pool that failed to
    /// build.
    fn abort(shared_context: &SharedContext, threads: Vec<WorkerThreadHandle>) {
        shared_context.abort();
        join_workers(threads);
        shared_context.mark_stopped();
    }

    /// Returns the number of worker threads that have been spawned in this
    /// pool.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }

    /// Submits a task to the pool. Tasks are started in submission order, by
    /// the first available worker thread.
    ///
    /// Fails with [`Error::NotAccepting`] once
    /// [`await_completion()`](Self::await_completion) has been called, in
    /// which case the task is dropped without running.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.shared_context.submit(Box::new(task))
    }

    /// Waits until all the submitted tasks have completed, then stops and
    /// joins the worker threads.
    ///
    /// New submissions are rejected as soon as this function is called. Only
    /// the first call drains the pool: any later call returns
    /// [`Error::AlreadyDrained`] without waiting.
    ///
    /// ```
    /// # use fifo_pool::{Error, PoolState, TaskPool};
    /// let pool = TaskPool::new(4).unwrap();
    /// pool.submit(|| println!("hello")).unwrap();
    ///
    /// pool.await_completion().unwrap();
    /// assert_eq!(pool.state(), PoolState::Stopped);
    ///
    /// assert!(matches!(pool.await_completion(), Err(Error::AlreadyDrained)));
    /// assert!(pool.submit(|| ()).is_err());
    /// ```
    pub fn await_completion(&self) -> Result<()> {
        self.shared_context.drain()?;

        let threads = std::mem::take(
            &mut *self
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        join_workers(threads);
        self.shared_context.mark_stopped();
        log_info!("[main thread] Drained the pool.");
        Ok(())
    }

    /// Returns the current lifecycle state of the pool.
    pub fn state(&self) -> PoolState {
        self.shared_context.state()
    }

    /// Returns whether all worker threads have been joined.
    pub fn is_stopped(&self) -> bool {
        self.state() == PoolState::Stopped
    }

    /// Returns the number of tasks that are queued or running.
    pub fn active_tasks(&self) -> usize {
        self.shared_context.active_tasks()
    }

    /// Returns the number of tasks that are queued but not started yet.
    pub fn pending_tasks(&self) -> usize {
        self.shared_context.pending_tasks()
    }

    /// Returns the number of tasks that panicked.
    pub fn num_panicked_tasks(&self) -> usize {
        self.shared_context.num_panicked_tasks()
    }
}

impl Drop for TaskPool {
    /// Drains the pool if it wasn't drained yet.
    fn drop(&mut self) {
        if self.shared_context.state() == PoolState::Running {
            log_debug!("[main thread] Dropping a running pool, draining it first.");
            if let Err(_e) = self.await_completion() {
                log_error!("[main thread] Failed to drain the pool: {_e}");
            }
        }
    }
}

/// Joins the given worker threads.
#[allow(clippy::unused_enumerate_index)]
fn join_workers(threads: Vec<WorkerThreadHandle>) {
    log_debug!("[main thread] Joining threads in the pool...");
    for (_i, t) in threads.into_iter().enumerate() {
        let result = t.handle.join();
        match result {
            Ok(_) => log_debug!("[main thread] Thread {_i} joined with result: {result:?}"),
            Err(_) => log_error!("[main thread] Thread {_i} joined with result: {result:?}"),
        }
    }
    log_debug!("[main thread] Joined threads.");
}

#[cfg(all(
    not(miri),
    any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    )
))]
fn pin_current_thread(id: usize, cpu_pinning: CpuPinningPolicy) -> Result<()> {
    let pin = || -> nix::Result<()> {
        let mut cpu_set = CpuSet::new();
        cpu_set.set(id)?;
        sched_setaffinity(Pid::from_raw(0), &cpu_set)
    };
    match cpu_pinning {
        CpuPinningPolicy::No => (),
        CpuPinningPolicy::IfSupported => match pin() {
            Ok(()) => log_debug!("Pinned thread #{id} to CPU #{id}"),
            Err(_e) => log_warn!("Failed to set CPU affinity for thread #{id}: {_e}"),
        },
        CpuPinningPolicy::Always => {
            pin().map_err(|e| Error::CpuPinning {
                id,
                reason: e.to_string(),
            })?;
            log_debug!("Pinned thread #{id} to CPU #{id}");
        }
    }
    Ok(())
}

#[cfg(any(
    miri,
    not(any(
        target_os = "android",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "linux"
    ))
))]
fn pin_current_thread(_id: usize, _cpu_pinning: CpuPinningPolicy) -> Result<()> {
    // Unsupported policies were rejected before spawning.
    Ok(())
}

/// Context object owned by a worker thread.
struct ThreadContext {
    /// Thread index.
    #[cfg(feature = "log")]
    id: usize,
    /// Context shared with the pool and the other worker threads.
    shared_context: Arc<SharedContext>,
}

impl ThreadContext {
    /// Main function run by this thread.
    fn run(&self) {
        log_debug!("[thread {}] Waiting for tasks", self.id);
        loop {
            match self.shared_context.next_task() {
                Dequeued::Run(task) => self.execute(task),
                Dequeued::Exit => {
                    log_debug!("[thread {}] Received finish signal", self.id);
                    break;
                }
            }
        }
    }

    /// Runs the given task, containing any panic within it.
    fn execute(&self, task: Task) {
        // The task is accounted as completed when the notifier is dropped, after
        // the task returned or unwound.
        let notifier = Notifier {
            #[cfg(feature = "log")]
            id: self.id,
            shared_context: &self.shared_context,
        };

        if let Err(_payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            let _num_panicked = self.shared_context.record_panic();
            log_error!(
                "[thread {}] A task panicked ({} so far): {}",
                self.id,
                _num_panicked,
                panic_message(&*_payload)
            );
        }

        // Explicit drop for clarity.
        drop(notifier);
    }
}

/// Extracts the message of a panic payload.
#[cfg(feature = "log")]
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}
