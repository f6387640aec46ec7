//! Error type for fallible store operations.

use thiserror::Error;

/// Errors reported by the checked store operations.
///
/// The unchecked conveniences (`insert`, `erase`, `Clone`) never return
/// these: allocation failure aborts through
/// [`std::alloc::handle_alloc_error`], and an invalid erase is a silent
/// no-op that yields the end position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Allocating a block (or growing the block table) failed.
    ///
    /// The store is left exactly as it was before the call.
    #[error("out of memory allocating a block of {block_capacity} slots")]
    OutOfMemory {
        /// Slots per block of the store that failed to grow.
        block_capacity: usize,
    },

    /// The position does not name a currently occupied slot.
    #[error("position does not name an occupied slot")]
    InvalidPosition,
}
