//! Cycle-accurate latency profile using rdtscp.
//!
//! Per-operation cycle counts for bucket-store vs the slab crate: churn
//! (insert then erase) on a mostly-full store, and a single forward step
//! across a long run of erased values.
//!
//! Run with:
//!   cargo bench --bench profile_store
//!   taskset -c 0 ./target/release/deps/profile_store-*

use std::hint::black_box;

use bucket_store::{BucketStore, StoreBuilder};
use hdrhistogram::Histogram;

const CAPACITY: usize = 100_000;
const OPS: usize = 1_000_000;
const RUN: usize = 4_096;

#[inline(always)]
fn rdtscp() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        let mut aux: u32 = 0;
        std::arch::x86_64::__rdtscp(&mut aux)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

fn print_stats(name: &str, hist: &Histogram<u64>) {
    println!("{}", name);
    println!("  min:  {:>6} cycles", hist.min());
    println!("  p50:  {:>6} cycles", hist.value_at_quantile(0.50));
    println!("  p99:  {:>6} cycles", hist.value_at_quantile(0.99));
    println!("  p999: {:>6} cycles", hist.value_at_quantile(0.999));
    println!("  max:  {:>6} cycles", hist.max());
    println!("  avg:  {:>6.0} cycles", hist.mean());
}

fn filled_store() -> BucketStore<u64> {
    let mut store = StoreBuilder::default().block_capacity(64).build();
    for i in 0..CAPACITY as u64 {
        store.insert(i);
    }
    store
}

fn churn_bucket_store() -> Histogram<u64> {
    let mut store = filled_store();
    let mut hist = Histogram::<u64>::new(3).unwrap();

    // Warmup
    for i in 0..10_000u64 {
        let pos = store.insert(i);
        black_box(store.erase(pos));
    }

    for i in 0..OPS as u64 {
        let start = rdtscp();
        let pos = store.insert(i);
        black_box(store.erase(pos));
        let end = rdtscp();
        let _ = hist.record(end.wrapping_sub(start));
    }

    hist
}

fn churn_slab_crate() -> Histogram<u64> {
    let mut slab = slab::Slab::<u64>::with_capacity(CAPACITY + 1);
    for i in 0..CAPACITY as u64 {
        slab.insert(i);
    }
    let mut hist = Histogram::<u64>::new(3).unwrap();

    // Warmup
    for i in 0..10_000u64 {
        let key = slab.insert(i);
        black_box(slab.remove(key));
    }

    for i in 0..OPS as u64 {
        let start = rdtscp();
        let key = slab.insert(i);
        black_box(slab.remove(key));
        let end = rdtscp();
        let _ = hist.record(end.wrapping_sub(start));
    }

    hist
}

/// Cost of stepping from the value before a run of `RUN` erased values to
/// the value after it.
fn skip_bucket_store() -> Histogram<u64> {
    let mut store = filled_store();
    let positions: Vec<_> = store.positions().collect();
    for pos in &positions[1..=RUN] {
        store.erase(*pos);
    }
    let first = positions[0];
    let mut hist = Histogram::<u64>::new(3).unwrap();

    for _ in 0..OPS {
        let start = rdtscp();
        black_box(store.advance(black_box(first)));
        let end = rdtscp();
        let _ = hist.record(end.wrapping_sub(start));
    }

    hist
}

fn skip_slab_crate() -> Histogram<u64> {
    let mut slab = slab::Slab::<u64>::with_capacity(CAPACITY);
    let keys: Vec<_> = (0..CAPACITY as u64).map(|i| slab.insert(i)).collect();
    for key in &keys[1..=RUN] {
        slab.remove(*key);
    }
    let mut hist = Histogram::<u64>::new(3).unwrap();

    for _ in 0..OPS {
        let start = rdtscp();
        let mut iter = slab.iter();
        black_box(iter.next());
        black_box(iter.next());
        let end = rdtscp();
        let _ = hist.record(end.wrapping_sub(start));
    }

    hist
}

fn compare(label: &str, ours: &Histogram<u64>, theirs: &Histogram<u64>) {
    println!("{} latency ({} ops)", label, OPS);
    println!("========================================");
    print_stats("bucket-store:", ours);
    println!();
    print_stats("slab:", theirs);
    println!();

    let ours_p50 = ours.value_at_quantile(0.50);
    let theirs_p50 = theirs.value_at_quantile(0.50).max(1);

    println!("----------------------------------------");
    if ours_p50 < theirs_p50 {
        println!(
            "bucket-store p50 is {:.1}% FASTER",
            (1.0 - ours_p50 as f64 / theirs_p50 as f64) * 100.0
        );
    } else if ours_p50 > theirs_p50 {
        println!(
            "bucket-store p50 is {:.1}% SLOWER",
            (ours_p50 as f64 / theirs_p50 as f64 - 1.0) * 100.0
        );
    } else {
        println!("bucket-store p50 is EQUAL");
    }
    println!();
}

fn main() {
    compare("CHURN", &churn_bucket_store(), &churn_slab_crate());
    compare("SKIP RUN", &skip_bucket_store(), &skip_slab_crate());
}
