// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use ::fifo_pool::CpuPinningPolicy;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::mem::size_of;

const NUM_THREADS: &[usize] = &[1, 2, 4, 8];
const LENGTHS: &[usize] = &[10_000, 100_000, 1_000_000];
const NUM_TASKS: &[usize] = &[100, 1_000, 10_000];
const SEED: u64 = 42;

fn count_primes(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_primes");
    for len in LENGTHS {
        group.throughput(Throughput::Bytes((len * size_of::<u32>()) as u64));
        group.bench_with_input(BenchmarkId::new("serial", len), len, serial::count_primes);
        for &num_threads in NUM_THREADS {
            group.bench_with_input(
                BenchmarkId::new(format!("scoped_threads@{num_threads}"), len),
                len,
                |bencher, len| scoped_threads::count_primes(bencher, num_threads, len),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("rayon@{num_threads}"), len),
                len,
                |bencher, len| rayon::count_primes(bencher, num_threads, len),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("fifo_pool@{num_threads}"), len),
                len,
                |bencher, len| fifo_pool::count_primes(bencher, num_threads, len),
            );
        }
    }
    group.finish();
}

fn submit_and_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_and_drain");
    for num_tasks in NUM_TASKS {
        group.throughput(Throughput::Elements(*num_tasks as u64));
        for &num_threads in NUM_THREADS {
            for (cpu_pinning, pinning_name) in [
                (CpuPinningPolicy::No, "unpinned"),
                (CpuPinningPolicy::IfSupported, "pinned"),
            ] {
                group.bench_with_input(
                    BenchmarkId::new(format!("fifo_pool_{pinning_name}@{num_threads}"), num_tasks),
                    num_tasks,
                    |bencher, num_tasks| {
                        fifo_pool::submit_and_drain(bencher, cpu_pinning, num_threads, num_tasks)
                    },
                );
            }
        }
    }
    group.finish();
}

fn random_input(len: usize) -> Vec<u32> {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha12Rng::seed_from_u64(SEED);
    ::fifo_pool::workload::generate_random_array(&mut rng, len)
}

/// Baseline benchmarks on the current thread (without any multi-threading
/// involved).
mod serial {
    use criterion::{black_box, Bencher};
    use fifo_pool::workload::is_prime;

    pub fn count_primes(bencher: &mut Bencher, len: &usize) {
        let input = super::random_input(*len);
        let input_slice = input.as_slice();
        bencher.iter(|| {
            black_box(input_slice)
                .iter()
                .filter(|&&x| is_prime(x))
                .count()
        });
    }
}

/// Benchmarks spawning one scoped thread per chunk of input.
mod scoped_threads {
    use criterion::{black_box, Bencher};
    use fifo_pool::workload::count_primes_scoped_threads;
    use std::num::NonZeroUsize;

    pub fn count_primes(bencher: &mut Bencher, num_threads: usize, len: &usize) {
        let input = super::random_input(*len);
        let input_slice = input.as_slice();
        let num_threads = NonZeroUsize::try_from(num_threads).unwrap();
        bencher.iter(|| count_primes_scoped_threads(black_box(input_slice), num_threads).count);
    }
}

/// Benchmarks using Rayon.
mod rayon {
    use criterion::{black_box, Bencher};
    use fifo_pool::workload::is_prime;
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

    pub fn count_primes(bencher: &mut Bencher, num_threads: usize, len: &usize) {
        let input = super::random_input(*len);
        let input_slice = input.as_slice();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .unwrap();
        thread_pool.install(|| {
            bencher.iter(|| {
                black_box(input_slice)
                    .par_iter()
                    .filter(|&&x| is_prime(x))
                    .count()
            })
        });
    }
}

/// Benchmarks using a task pool. A drained pool is terminal, so each iteration
/// spawns and joins its own worker threads.
mod fifo_pool {
    use criterion::{black_box, Bencher};
    use fifo_pool::workload::count_primes_with_pool;
    use fifo_pool::{CpuPinningPolicy, ThreadCount, ThreadPoolBuilder};
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub fn count_primes(bencher: &mut Bencher, num_threads: usize, len: &usize) {
        let input: Arc<[u32]> = super::random_input(*len).into();
        let num_threads = NonZeroUsize::try_from(num_threads).unwrap();
        bencher.iter(|| {
            count_primes_with_pool(black_box(input.clone()), num_threads)
                .unwrap()
                .count
        });
    }

    pub fn submit_and_drain(
        bencher: &mut Bencher,
        cpu_pinning: CpuPinningPolicy,
        num_threads: usize,
        num_tasks: &usize,
    ) {
        bencher.iter(|| {
            let pool = ThreadPoolBuilder {
                num_threads: ThreadCount::try_from(num_threads).unwrap(),
                cpu_pinning,
            }
            .build()
            .unwrap();
            let counter = Arc::new(AtomicUsize::new(0));
            for _ in 0..*num_tasks {
                let counter = counter.clone();
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            }
            pool.await_completion().unwrap();
            counter.load(Ordering::Relaxed)
        });
    }
}

criterion_group!(benches, count_primes, submit_and_drain);
criterion_main!(benches);
