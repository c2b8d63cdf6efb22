// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Synchronization between producers, worker threads and the draining thread.
//!
//! Two independent domains are used:
//! - the queue domain protects the pending tasks and the stop flag, and wakes
//!   up worker threads,
//! - the completion domain protects the number of active tasks and the
//!   [`PoolState`], and wakes up the draining thread.
//!
//! Lock order: a thread never holds both locks at the same time.

use super::queue::{Dequeued, Task, TaskQueue};
use super::util::Status;
use crate::error::{Error, Result};
use crate::macros::{log_debug, log_warn};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lifecycle of a [`TaskPool`](crate::TaskPool). Transitions only go forward:
/// `Running` → `Draining` → `Stopping` → `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    /// The pool accepts tasks.
    Running,
    /// [`await_completion()`](crate::TaskPool::await_completion) was called and
    /// waits for the active tasks to complete. New tasks are rejected.
    Draining,
    /// All tasks have completed and the worker threads are exiting.
    Stopping,
    /// All worker threads have been joined. This state is terminal.
    Stopped,
}

/// Value protected by the completion domain.
struct Completion {
    /// Number of tasks that are either queued or executing.
    active_tasks: usize,
    /// Current lifecycle state.
    state: PoolState,
}

/// Context shared between the pool handle and its worker threads.
pub struct SharedContext {
    /// Pending tasks and stop flag.
    queue: CachePadded<Status<TaskQueue>>,
    /// Active task counter and pool state.
    completion: CachePadded<Status<Completion>>,
    /// Number of tasks that panicked so far.
    num_panicked_tasks: CachePadded<AtomicUsize>,
}

impl SharedContext {
    /// Creates the context of a running pool without any task.
    pub fn new() -> Self {
        Self {
            queue: CachePadded::new(Status::new(TaskQueue::new())),
            completion: CachePadded::new(Status::new(Completion {
                active_tasks: 0,
                state: PoolState::Running,
            })),
            num_panicked_tasks: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Registers the task as active and pushes it to the queue, waking up one
    /// worker thread.
    ///
    /// The state check and the counter increment happen in the same critical
    /// section, and before the task becomes visible to the workers. A drain
    /// that starts afterwards therefore waits for this task.
    pub fn submit(&self, task: Task) -> Result<()> {
        {
            let mut completion = self.completion.lock();
            if completion.state != PoolState::Running {
                return Err(Error::NotAccepting(completion.state));
            }
            completion.active_tasks += 1;
        }
        self.queue.update_and_notify_one(|queue| queue.push(task));
        Ok(())
    }

    /// Stops accepting tasks, waits until all active tasks have completed and
    /// then tells the worker threads to exit.
    ///
    /// Only the first call succeeds, subsequent calls fail with
    /// [`Error::AlreadyDrained`] without waiting.
    pub fn drain(&self) -> Result<()> {
        {
            let mut completion = self.completion.lock();
            if completion.state != PoolState::Running {
                log_warn!(
                    "[main thread] Ignoring drain request, the pool is already {:?}",
                    completion.state
                );
                return Err(Error::AlreadyDrained);
            }
            completion.state = PoolState::Draining;
        }

        log_debug!("[main thread] Waiting for all active tasks to complete...");
        let mut completion = self.completion.wait_while(|c| c.active_tasks != 0);
        completion.state = PoolState::Stopping;
        drop(completion);

        log_debug!("[main thread] Notifying threads to finish...");
        self.queue.update_and_notify_all(TaskQueue::stop);
        Ok(())
    }

    /// Stops a pool whose construction failed. Worker threads that already
    /// started exit as soon as they observe the stop flag.
    pub fn abort(&self) {
        self.completion.lock().state = PoolState::Stopping;
        self.queue.update_and_notify_all(TaskQueue::stop);
    }

    /// Records that all worker threads have been joined.
    pub fn mark_stopped(&self) {
        self.completion.lock().state = PoolState::Stopped;
    }

    /// Blocks until a task is available or the pool stops.
    pub fn next_task(&self) -> Dequeued {
        self.queue.wait_for(TaskQueue::pop)
    }

    /// Records that a task panicked and returns the total number of panicked
    /// tasks.
    pub fn record_panic(&self) -> usize {
        self.num_panicked_tasks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn state(&self) -> PoolState {
        self.completion.lock().state
    }

    pub fn active_tasks(&self) -> usize {
        self.completion.lock().active_tasks
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.lock().num_pending()
    }

    pub fn num_panicked_tasks(&self) -> usize {
        self.num_panicked_tasks.load(Ordering::Relaxed)
    }
}

/// Object whose destructor marks a task as completed, waking up the draining
/// thread if it was the last active task.
///
/// Create it before running a task: the task is accounted for whether it
/// returns or unwinds.
pub struct Notifier<'a> {
    /// Index of the worker thread running the task.
    #[cfg(feature = "log")]
    pub id: usize,
    /// Context shared between the pool and the worker threads.
    pub shared_context: &'a SharedContext,
}

impl Drop for Notifier<'_> {
    fn drop(&mut self) {
        let last = self.shared_context.completion.notify_all_if(|completion| {
            assert!(completion.active_tasks > 0);
            completion.active_tasks -= 1;
            completion.active_tasks == 0
        });
        if last {
            #[cfg(feature = "log")]
            log_debug!(
                "[thread {}] Completed the last active task. Woke up the waiting threads.",
                self.id
            );
        }
    }
}
