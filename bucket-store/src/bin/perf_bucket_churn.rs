//! Profiling binary for churn over a store full of holes.
//!
//! Fills the store, erases every other value, then repeatedly inserts into
//! the holes, walks the store and erases again.
//!
//! Run with:
//!   cargo build --release --bin perf_bucket_churn
//!   perf stat -e cycles,instructions,cache-misses,cache-references \
//!       ./target/release/perf_bucket_churn

use std::hint::black_box;

use bucket_store::{BucketStore, StoreBuilder};

const VALUES: usize = 100_000;
const ROUNDS: usize = 200;

fn main() {
    let mut store: BucketStore<u64> = StoreBuilder::default().block_capacity(64).build();
    let mut positions: Vec<_> = (0..VALUES as u64).map(|i| store.insert(i)).collect();

    for pos in positions.iter().step_by(2) {
        store.erase(*pos);
    }

    // Timed section - refill holes, traverse, punch them again
    for round in 0..ROUNDS {
        for (i, pos) in positions.iter_mut().enumerate().step_by(2) {
            *pos = store.insert((round * VALUES + i) as u64);
        }

        let sum: u64 = store.iter().sum();
        black_box(sum);

        for pos in positions.iter().step_by(2) {
            store.erase(*pos);
        }
    }

    black_box(store.len());
}
