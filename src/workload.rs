// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Prime counting workload, used to compare a [`TaskPool`] against serial
//! code and against one thread per chunk of input.

use crate::error::Result;
use crate::TaskPool;
use rand::Rng;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Smallest value produced by [`generate_random_array()`].
pub const MIN_VALUE: u32 = 10_000;
/// Largest value produced by [`generate_random_array()`].
pub const MAX_VALUE: u32 = 100_000;

/// Outcome of a prime counting run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimeCount {
    /// Number of primes found in the input.
    pub count: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Generates `len` values uniformly distributed in
/// `MIN_VALUE..=MAX_VALUE`.
///
/// The caller owns the random number generator, so seeding happens once at
/// setup.
///
/// ```
/// # use fifo_pool::workload::{generate_random_array, MAX_VALUE, MIN_VALUE};
/// let input = generate_random_array(&mut rand::rng(), 1000);
/// assert_eq!(input.len(), 1000);
/// assert!(input.iter().all(|x| (MIN_VALUE..=MAX_VALUE).contains(x)));
/// ```
pub fn generate_random_array<R: Rng>(rng: &mut R, len: usize) -> Vec<u32> {
    (0..len)
        .map(|_| rng.random_range(MIN_VALUE..=MAX_VALUE))
        .collect()
}

/// Primality test by trial division.
pub fn is_prime(n: u32) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut divisor = 3;
    while divisor <= n / divisor {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Splits `0..len` into `parts` contiguous ranges of `len / parts` items. The
/// last range also takes the remainder.
pub fn partition(len: usize, parts: NonZeroUsize) -> impl Iterator<Item = Range<usize>> {
    let parts = parts.get();
    let chunk = len / parts;
    (0..parts).map(move |i| {
        let start = i * chunk;
        let end = if i == parts - 1 { len } else { start + chunk };
        start..end
    })
}

fn count_primes_in(input: &[u32]) -> u64 {
    input.iter().filter(|&&x| is_prime(x)).count() as u64
}

/// Counts the primes on the current thread.
pub fn count_primes_serial(input: &[u32]) -> PrimeCount {
    let start = Instant::now();
    let count = count_primes_in(input);
    PrimeCount {
        count,
        elapsed: start.elapsed(),
    }
}

/// Counts the primes by spawning one scoped thread per chunk of the input.
/// Each thread adds its local count to a shared total.
pub fn count_primes_scoped_threads(input: &[u32], num_threads: NonZeroUsize) -> PrimeCount {
    let start = Instant::now();
    let total = Mutex::new(0);
    std::thread::scope(|scope| {
        for range in partition(input.len(), num_threads) {
            let chunk = &input[range];
            let total = &total;
            scope.spawn(move || {
                let local_count = count_primes_in(chunk);
                *total.lock().unwrap_or_else(PoisonError::into_inner) += local_count;
            });
        }
    });
    PrimeCount {
        count: total.into_inner().unwrap_or_else(PoisonError::into_inner),
        elapsed: start.elapsed(),
    }
}

/// Counts the primes by submitting one task per chunk of the input to a new
/// [`TaskPool`] of `pool_size` threads, and draining it.
///
/// The measured time includes spawning and joining the pool.
///
/// ```
/// # use fifo_pool::workload::count_primes_with_pool;
/// # use std::num::NonZeroUsize;
/// let input: Vec<u32> = (0..100).collect();
/// let primes = count_primes_with_pool(input.into(), NonZeroUsize::new(4).unwrap()).unwrap();
/// assert_eq!(primes.count, 25);
/// ```
pub fn count_primes_with_pool(input: Arc<[u32]>, pool_size: NonZeroUsize) -> Result<PrimeCount> {
    let start = Instant::now();
    let total = Arc::new(Mutex::new(0));

    let pool = TaskPool::new(pool_size.get())?;
    for range in partition(input.len(), pool_size) {
        let input = input.clone();
        let total = total.clone();
        pool.submit(move || {
            let local_count = count_primes_in(&input[range]);
            *total.lock().unwrap_or_else(PoisonError::into_inner) += local_count;
        })?;
    }
    pool.await_completion()?;

    let count = *total.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(PrimeCount {
        count,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn test_is_prime() {
        let primes: Vec<u32> = (0..50).filter(|&n| is_prime(n)).collect();
        assert_eq!(
            primes,
            [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47]
        );
        assert!(is_prime(99_991));
        assert!(!is_prime(99_999));
        assert!(!is_prime(10_201)); // 101²
        assert!(is_prime(u32::MAX - 4)); // 4294967291
        assert!(!is_prime(u32::MAX));
    }

    #[test]
    fn test_partition() {
        let four = NonZeroUsize::new(4).unwrap();
        assert_eq!(
            partition(10, four).collect::<Vec<_>>(),
            [0..2, 2..4, 4..6, 6..10]
        );
        assert_eq!(
            partition(3, four).collect::<Vec<_>>(),
            [0..0, 0..0, 0..0, 0..3]
        );
        assert_eq!(
            partition(0, NonZeroUsize::MIN).collect::<Vec<_>>(),
            [0..0]
        );
    }

    #[test]
    fn test_generate_random_array_is_seeded() {
        let a = generate_random_array(&mut ChaCha12Rng::seed_from_u64(42), 10_000);
        let b = generate_random_array(&mut ChaCha12Rng::seed_from_u64(42), 10_000);
        assert_eq!(a, b);
        assert!(a.iter().all(|x| (MIN_VALUE..=MAX_VALUE).contains(x)));
        assert!(a.iter().any(|&x| is_prime(x)));
    }

    #[test]
    fn test_drivers_agree() {
        let input = generate_random_array(&mut ChaCha12Rng::seed_from_u64(7), 100_003);
        let expected = count_primes_serial(&input).count;
        assert!(expected > 0);

        for num_threads in [1, 2, 3, 8] {
            let num_threads = NonZeroUsize::new(num_threads).unwrap();
            assert_eq!(
                count_primes_scoped_threads(&input, num_threads).count,
                expected
            );
            assert_eq!(
                count_primes_with_pool(input.clone().into(), num_threads)
                    .unwrap()
                    .count,
                expected
            );
        }
    }

    #[test]
    fn test_drivers_empty_input() {
        let four = NonZeroUsize::new(4).unwrap();
        assert_eq!(count_primes_serial(&[]).count, 0);
        assert_eq!(count_primes_scoped_threads(&[], four).count, 0);
        assert_eq!(
            count_primes_with_pool(Arc::from(Vec::new()), four)
                .unwrap()
                .count,
            0
        );
    }
}
