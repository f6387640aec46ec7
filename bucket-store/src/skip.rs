//! Forward skip index over runs of free slots.
//!
//! A free slot may record how many traversal steps separate it from the next
//! occupied slot. Forward traversal that lands on such a slot jumps straight
//! to the target instead of probing every free slot in between.
//!
//! Distances are written by [`back_patch`]: given an occupied slot `p`, it
//! walks backward over the contiguous free run ending just before `p` and
//! points every slot in it at `p`. The walk is proportional to the run
//! length, so patching after a long run of removals is O(run).
//!
//! Stale distances are tolerated. A distance only ever points at or before
//! the true next occupied slot (values are never written past a free run),
//! so a jump can land on a free slot but never past an occupied one; the
//! traversal then keeps reading metadata from where it landed. Releasing a
//! block breaks that guarantee for distances spanning the block, so the run in
//! front of the released block is patched again.
//!
//! There is no backward index: going backward visits free slots one at a time.
//!
//! # Cost model
//!
//! The store patches in two places:
//!
//! - insert patches in front of the new value. Inserts fill the first free
//!   slot, so the slot before it is always occupied and this walks nothing.
//! - erase patches in front of the erased value's successor, covering the
//!   erased slot and every free slot before it. Erase is therefore O(run),
//!   where run is the length of the free run ending at the successor. Erasing
//!   the last value patches nothing.
//!
//! Forward traversal is O(1) per free run crossed, backward is O(run).

use crate::slot::SlotMeta;
use crate::table::BlockTable;

/// Point the free run immediately preceding `(block, slot)` at it.
///
/// `(block, slot)` may be any slot or the end position. Stops at the first
/// occupied slot or at the start of the table. Returns the number of slots
/// patched.
pub(crate) fn back_patch<T>(table: &mut BlockTable<T>, block: usize, slot: usize) -> usize {
    let target = table.linear(block, slot);
    let mut patched = 0;
    let mut cursor = (block, slot);

    while let Some((b, s)) = table.step_back(cursor.0, cursor.1) {
        if table.meta(b, s).is_occupied() {
            break;
        }
        let distance = target - table.linear(b, s);
        table.block_mut(b).set_free_meta(s, SlotMeta::skip(distance));
        patched += 1;
        cursor = (b, s);
    }

    if patched > 0 {
        tracing::trace!(block, slot, patched, "back-patched free run");
    }
    patched
}

/// Resolve a landing position to the next occupied slot at or after it.
///
/// Free slots are crossed using their recorded distance; fresh slots are
/// crossed one step at a time. Returns the end position `(len, 0)` when no
/// occupied slot remains.
pub(crate) fn settle_forward<T>(table: &BlockTable<T>, block: usize, slot: usize) -> (usize, usize) {
    let (mut block, mut slot) = (block, slot);
    while block < table.len() {
        let meta = table.meta(block, slot);
        if meta.is_occupied() {
            return (block, slot);
        }
        (block, slot) = table.step_forward(block, slot, meta.forward_step());
    }
    (table.len(), 0)
}

/// Resolve a landing position to the nearest occupied slot at or before it.
///
/// Free slots are visited one at a time. Returns `None` when the walk runs
/// off the start of the table.
pub(crate) fn settle_backward<T>(
    table: &BlockTable<T>,
    block: usize,
    slot: usize,
) -> Option<(usize, usize)> {
    let mut cursor = (block, slot);
    loop {
        if table.is_occupied(cursor.0, cursor.1) {
            return Some(cursor);
        }
        cursor = table.step_back(cursor.0, cursor.1)?;
    }
}

/// Count the free slots between `(block, slot)` and the next occupied slot
/// by probing each one. Reference for checking recorded distances.
#[cfg(test)]
pub(crate) fn naive_distance<T>(table: &BlockTable<T>, block: usize, slot: usize) -> usize {
    let mut steps = 0;
    let mut cursor = (block, slot);
    while cursor.0 < table.len() && !table.meta(cursor.0, cursor.1).is_occupied() {
        cursor = table.step_forward(cursor.0, cursor.1, 1);
        steps += 1;
    }
    steps
}

/// Every recorded distance agrees with a slot-by-slot scan.
#[cfg(test)]
pub(crate) fn distances_exact<T>(table: &BlockTable<T>) -> bool {
    (0..table.len()).all(|b| {
        (0..table.block_capacity()).all(|s| match table.meta(b, s).state() {
            crate::slot::SlotState::Skip(n) => n == naive_distance(table, b, s),
            _ => true,
        })
    })
}
