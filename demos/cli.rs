// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI tool to count primes in a random array, serially, with one thread per
//! chunk or with a task pool.

use clap::{Parser, ValueEnum};
use fifo_pool::workload::{
    count_primes_scoped_threads, count_primes_serial, count_primes_with_pool,
    generate_random_array, PrimeCount,
};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let available_parallelism = std::thread::available_parallelism().ok();
    match available_parallelism {
        Some(cores) => println!("Logical processors: {cores}"),
        None => println!("Logical processors: unknown"),
    }
    let num_threads = cli
        .num_threads
        .or(available_parallelism)
        .unwrap_or(NonZeroUsize::MIN);

    println!("Generating an array of {} random numbers...", cli.input_size);
    let mut rng = match cli.seed {
        Some(seed) => ChaCha12Rng::seed_from_u64(seed),
        None => ChaCha12Rng::from_os_rng(),
    };
    let input: Arc<[u32]> = generate_random_array(&mut rng, cli.input_size).into();
    println!("Generation completed.");

    for _ in 0..cli.repetitions {
        match cli.mode {
            Mode::Serial => {
                let primes = count_primes_serial(&input);
                report("One thread", primes);
            }
            Mode::Threads => {
                let primes = count_primes_scoped_threads(&input, num_threads);
                report(&format!("Multithreaded mode ({num_threads} threads)"), primes);
            }
            Mode::Pool => match count_primes_with_pool(input.clone(), num_threads) {
                Ok(primes) => report(&format!("Thread pool ({num_threads} threads)"), primes),
                Err(e) => {
                    eprintln!("Thread pool failed: {e}");
                    return ExitCode::FAILURE;
                }
            },
        }
    }

    ExitCode::SUCCESS
}

fn report(label: &str, primes: PrimeCount) {
    println!(
        "{label}: number of primes = {}, time = {} ms",
        primes.count,
        primes.elapsed.as_millis()
    );
}

/// CLI tool to count primes in a random array.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(version)]
struct Cli {
    /// How to split the work.
    #[arg(long, value_enum, default_value_t = Mode::Pool)]
    mode: Mode,

    /// Number of threads. Default to the available parallelism.
    #[arg(long)]
    num_threads: Option<NonZeroUsize>,

    /// Number of items in the input.
    #[arg(long, default_value_t = 100_000_000)]
    input_size: usize,

    /// Number of times to count the primes.
    #[arg(long, default_value_t = 10)]
    repetitions: usize,

    /// Seed of the random input. Default to a seed from the operating system.
    #[arg(long)]
    seed: Option<u64>,
}

/// How to split the work.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Count all the primes on the main thread.
    Serial,
    /// Spawn one thread per chunk of the input.
    Threads,
    /// Submit one task per chunk of the input to a task pool.
    Pool,
}
