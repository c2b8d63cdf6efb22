// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Simple program that counts the primes in a random array with a task pool.

use fifo_pool::workload::{generate_random_array, is_prime};
use fifo_pool::{CpuPinningPolicy, ThreadCount, ThreadPoolBuilder};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::sync::{Arc, Mutex};

fn main() {
    let pool = ThreadPoolBuilder {
        num_threads: ThreadCount::AvailableParallelism,
        cpu_pinning: CpuPinningPolicy::IfSupported,
    }
    .build()
    .unwrap();

    let input_size = 10_000_000;
    let chunk_size = 100_000;

    let mut rng = ChaCha12Rng::seed_from_u64(42);
    let input: Arc<[u32]> = generate_random_array(&mut rng, input_size).into();
    let total = Arc::new(Mutex::new(0u64));

    for start in (0..input_size).step_by(chunk_size) {
        let end = (start + chunk_size).min(input_size);
        let input = input.clone();
        let total = total.clone();
        pool.submit(move || {
            let count = input[start..end].iter().filter(|&&x| is_prime(x)).count();
            *total.lock().unwrap() += count as u64;
        })
        .unwrap();
    }
    pool.await_completion().unwrap();

    println!("primes = {}", total.lock().unwrap());
}
