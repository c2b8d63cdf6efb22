// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors reported by a [`TaskPool`](crate::TaskPool).

use crate::PoolState;

/// Result type returned by fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned when building a [`TaskPool`](crate::TaskPool), submitting
/// work to it or draining it.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A task pool was configured with zero worker threads.
    #[error("invalid thread count: a task pool needs at least one worker thread")]
    InvalidThreadCount,

    /// The operating system failed to spawn a worker thread.
    #[error("failed to spawn worker thread #{id}: {source}")]
    Spawn {
        /// Index of the worker thread that couldn't be spawned.
        id: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A worker thread couldn't be pinned to its CPU while the
    /// [`CpuPinningPolicy::Always`](crate::CpuPinningPolicy::Always) policy was
    /// requested.
    #[error("failed to pin worker thread #{id} to a CPU: {reason}")]
    CpuPinning {
        /// Index of the worker thread that couldn't be pinned.
        id: usize,
        /// Description of the failure.
        reason: String,
    },

    /// A task was submitted after the pool started draining. The task was
    /// dropped without being executed.
    #[error("the task pool doesn't accept tasks anymore (state: {0:?})")]
    NotAccepting(PoolState),

    /// [`TaskPool::await_completion()`](crate::TaskPool::await_completion) was
    /// called more than once.
    #[error("the task pool has already been drained")]
    AlreadyDrained,
}
