// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! FIFO queue of pending tasks, shared by the worker threads.

use std::collections::VecDeque;

/// A unit of work submitted to the pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// What a worker thread should do after waiting on the queue.
pub enum Dequeued {
    /// Run the given task.
    Run(Task),
    /// The pool is stopping and no task is left: the worker must exit.
    Exit,
}

/// Pending tasks together with the stop flag. Both are only accessed under
/// the queue lock.
#[derive(Default)]
pub struct TaskQueue {
    /// Tasks in submission order.
    tasks: VecDeque<Task>,
    /// Set once when the pool stops. Never reset.
    stop: bool,
}

impl TaskQueue {
    /// Creates an empty queue that hasn't been stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a task at the tail of the queue.
    pub fn push(&mut self, task: Task) {
        debug_assert!(!self.stop, "pushed a task to a stopped queue");
        self.tasks.push_back(task);
    }

    /// Takes the task at the head of the queue, or returns [`None`] if the
    /// caller must wait for a task to be pushed or for the queue to stop.
    ///
    /// Remaining tasks are still handed out after the stop flag is set, so that
    /// workers only exit once the queue is empty.
    pub fn pop(&mut self) -> Option<Dequeued> {
        match self.tasks.pop_front() {
            Some(task) => Some(Dequeued::Run(task)),
            None if self.stop => Some(Dequeued::Exit),
            None => None,
        }
    }

    /// Raises the stop flag.
    pub fn stop(&mut self) {
        self.stop = true;
    }

    /// Number of tasks waiting to be picked up by a worker.
    pub fn num_pending(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn run(dequeued: Option<Dequeued>) -> bool {
        match dequeued {
            Some(Dequeued::Run(task)) => {
                task();
                true
            }
            Some(Dequeued::Exit) | None => false,
        }
    }

    #[test]
    fn queue_is_fifo() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut queue = TaskQueue::new();
        for i in 0..5 {
            let log = log.clone();
            queue.push(Box::new(move || log.lock().unwrap().push(i)));
        }
        assert_eq!(queue.num_pending(), 5);

        while run(queue.pop()) {}
        assert_eq!(*log.lock().unwrap(), [0, 1, 2, 3, 4]);
        assert_eq!(queue.num_pending(), 0);
    }

    #[test]
    fn empty_queue_is_idle_until_stopped() {
        let mut queue = TaskQueue::new();
        assert!(queue.pop().is_none());

        queue.stop();
        assert!(matches!(queue.pop(), Some(Dequeued::Exit)));
    }

    #[test]
    fn stopped_queue_drains_remaining_tasks_first() {
        let mut queue = TaskQueue::new();
        queue.push(Box::new(|| ()));
        queue.push(Box::new(|| ()));
        queue.stop();

        assert!(matches!(queue.pop(), Some(Dequeued::Run(_))));
        assert!(matches!(queue.pop(), Some(Dequeued::Run(_))));
        assert!(matches!(queue.pop(), Some(Dequeued::Exit)));
        // Exiting is sticky: every worker observes it.
        assert!(matches!(queue.pop(), Some(Dequeued::Exit)));
    }
}
