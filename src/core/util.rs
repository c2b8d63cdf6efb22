// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// An ergonomic wrapper around a [`Mutex`]-[`Condvar`] pair.
///
/// The pool never leaves the protected value in an inconsistent state while
/// holding the lock (task bodies run outside of it), so a poisoned [`Mutex`] is
/// recovered from rather than propagated.
pub struct Status<T> {
    mutex: Mutex<T>,
    condvar: Condvar,
}

impl<T> Status<T> {
    /// Creates a new status initialized with the given value.
    pub fn new(t: T) -> Self {
        Self {
            mutex: Mutex::new(t),
            condvar: Condvar::new(),
        }
    }

    /// Locks the status without notifying anyone.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates the status with the given function and notifies one waiting
    /// thread.
    pub fn update_and_notify_one<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut *self.lock());
        self.condvar.notify_one();
        result
    }

    /// Updates the status with the given function and notifies all waiting
    /// threads.
    pub fn update_and_notify_all<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut *self.lock());
        self.condvar.notify_all();
        result
    }

    /// Updates the status with the given function, and notifies all waiting
    /// threads if it returns true.
    pub fn notify_all_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let mut locked = self.lock();
        let notify = f(&mut *locked);
        if notify {
            self.condvar.notify_all();
        }
        notify
    }

    /// Waits until the given function extracts a value from this status.
    ///
    /// The function is called with the lock held, once upfront and then after
    /// every wake-up.
    pub fn wait_for<R>(&self, mut f: impl FnMut(&mut T) -> Option<R>) -> R {
        let mut locked = self.lock();
        loop {
            if let Some(result) = f(&mut *locked) {
                return result;
            }
            locked = self
                .condvar
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Waits until the predicate is false on this status.
    ///
    /// This returns a [`MutexGuard`], allowing to further inspect or modify the
    /// status.
    pub fn wait_while(&self, predicate: impl FnMut(&mut T) -> bool) -> MutexGuard<'_, T> {
        self.condvar
            .wait_while(self.lock(), predicate)
            .unwrap_or_else(PoisonError::into_inner)
    }
}
