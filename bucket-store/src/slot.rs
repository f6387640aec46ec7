//! Per-slot occupancy and skip metadata.
//!
//! Every slot in a block carries one `usize` of metadata alongside its
//! storage cell. The value space is partitioned into three states:
//!
//! ```text
//! 0                 occupied, the cell holds a live value
//! 1..usize::MAX     free, next occupied slot (or end) is exactly n steps ahead
//! usize::MAX        free, no forward distance known yet
//! ```
//!
//! Distances count slot-traversal steps (block-major, slot-minor) and may
//! cross block boundaries.

/// Raw metadata value of an occupied slot.
pub(crate) const OCCUPIED: usize = 0;

/// Raw metadata value of a free slot with no computed skip distance.
pub(crate) const FRESH_FREE: usize = usize::MAX;

/// Decoded view of a slot's metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// Slot holds a live value.
    Occupied,
    /// Slot is free; traversal must step over it one slot at a time.
    FreshFree,
    /// Slot is free; the next occupied slot is this many steps ahead.
    Skip(usize),
}

/// Packed slot metadata. See the module docs for the encoding.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct SlotMeta(usize);

impl SlotMeta {
    pub(crate) const OCCUPIED: Self = Self(OCCUPIED);
    pub(crate) const FRESH_FREE: Self = Self(FRESH_FREE);

    /// Free slot whose next occupied slot is `distance` steps ahead.
    ///
    /// `distance` must be in `1..usize::MAX`.
    #[inline]
    pub(crate) const fn skip(distance: usize) -> Self {
        debug_assert!(distance != OCCUPIED && distance != FRESH_FREE);
        Self(distance)
    }

    #[inline]
    pub(crate) const fn state(self) -> SlotState {
        match self.0 {
            OCCUPIED => SlotState::Occupied,
            FRESH_FREE => SlotState::FreshFree,
            n => SlotState::Skip(n),
        }
    }

    #[inline]
    pub(crate) const fn is_occupied(self) -> bool {
        self.0 == OCCUPIED
    }

    #[inline]
    pub(crate) const fn is_free(self) -> bool {
        self.0 != OCCUPIED
    }

    /// Number of slots to move forward from this slot when it is free.
    ///
    /// Fresh slots only know about their immediate successor.
    #[inline]
    pub(crate) const fn forward_step(self) -> usize {
        match self.0 {
            FRESH_FREE => 1,
            n => n,
        }
    }
}

impl std::fmt::Debug for SlotMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state() {
            SlotState::Occupied => write!(f, "Occupied"),
            SlotState::FreshFree => write!(f, "FreshFree"),
            SlotState::Skip(n) => write!(f, "Skip({n})"),
        }
    }
}
