//! Growth and copy under allocation failure.
//!
//! Installs a global allocator that fails every request made from the current
//! thread while a failure window is open. Lives in its own test binary so the
//! allocator only affects these tests.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use bucket_store::{BucketStore, StoreError};

struct FailingAlloc;

thread_local! {
    static FAIL: Cell<bool> = const { Cell::new(false) };
}

fn failing_now() -> bool {
    FAIL.try_with(Cell::get).unwrap_or(false)
}

unsafe impl GlobalAlloc for FailingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if failing_now() {
            return std::ptr::null_mut();
        }
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: FailingAlloc = FailingAlloc;

/// Closes the failure window on drop.
struct FailureWindow;

impl Drop for FailureWindow {
    fn drop(&mut self) {
        FAIL.with(|flag| flag.set(false));
    }
}

/// Run `f` with every allocation on this thread failing.
fn with_alloc_failure<R>(f: impl FnOnce() -> R) -> R {
    FAIL.with(|flag| flag.set(true));
    let _window = FailureWindow;
    f()
}

fn contents(store: &BucketStore<u64>) -> Vec<u64> {
    store.iter().copied().collect()
}

// =============================================================================
// Growth
// =============================================================================

#[test]
fn first_block_failure_leaves_store_empty() {
    let mut store = BucketStore::<u64>::with_block_capacity(4);

    let result = with_alloc_failure(|| store.try_insert(1));

    assert_eq!(result, Err(StoreError::OutOfMemory { block_capacity: 4 }));
    assert_eq!(store.len(), 0);
    assert_eq!(store.capacity(), 0);
    assert_eq!(store.block_count(), 0);
    assert_eq!(store.begin(), store.end());

    // Nothing was left half-built.
    let pos = store.try_insert(1).unwrap();
    assert_eq!(store.get(pos), Some(&1));
    assert_eq!(store.capacity(), 4);
}

#[test]
fn growth_failure_leaves_existing_contents_untouched() {
    let mut store = BucketStore::<u64>::with_block_capacity(4);
    let pos: Vec<_> = (1..=4).map(|v| store.insert(v)).collect();
    store.erase(pos[1]);
    let refill = store.insert(20);

    let result = with_alloc_failure(|| store.try_insert(5));

    assert!(matches!(result, Err(StoreError::OutOfMemory { block_capacity: 4 })));
    assert_eq!(store.len(), 4);
    assert_eq!(store.capacity(), 4);
    assert_eq!(store.block_count(), 1);
    assert_eq!(contents(&store), vec![1, 20, 3, 4]);
    assert_eq!(store.get(refill), Some(&20));
    assert_eq!(store.get(pos[3]), Some(&4));

    let five = store.try_insert(5).unwrap();
    assert_eq!(store.capacity(), 8);
    assert_eq!(store.advance(pos[3]), five);
}

// =============================================================================
// Copy
// =============================================================================

#[test]
fn clone_failure_leaves_source_untouched() {
    let mut store = BucketStore::<u64>::with_block_capacity(4);
    let pos: Vec<_> = (0..6).map(|v| store.insert(v)).collect();
    store.erase(pos[2]);

    let result = with_alloc_failure(|| store.try_clone());

    assert!(matches!(result, Err(StoreError::OutOfMemory { .. })));
    drop(result);
    assert_eq!(contents(&store), vec![0, 1, 3, 4, 5]);

    let copy = store.try_clone().unwrap();
    assert_eq!(contents(&copy), contents(&store));
    assert_eq!(copy.get(pos[5]), Some(&5));
}
