//! Row-address dependency tracking.
//!
//! NAND pages within a block must be programmed in ascending order, a page
//! must be programmed before it can be read, and a block must not be erased
//! while reads against it are still parked. This module keeps one record per
//! `(channel, way, block)` with the next page the block will accept for
//! programming (`permitted_prog_page`), the number of reads parked on pages
//! at or above that watermark, and whether an erase has been seen and parked.
//!
//! [`RowDependencyTable::check`] is the single admission gate. It is called in
//! [`Select`](RowCheckMode::Select) mode when a request first reaches dispatch
//! and in [`Release`](RowCheckMode::Release) mode when a parked request is
//! re-examined, and it updates the record as a side effect of the verdict:
//!
//! - **Read** passes once its page is below the watermark. A select-mode block
//!   counts the read as parked; the matching release-mode pass uncounts it.
//! - **Program** passes exactly at the watermark and advances it. Pages above
//!   the watermark wait; pages below it are a replay and rejected outright.
//! - **Erase** passes once the block is fully programmed and no reads are
//!   parked, and resets the record. A select-mode block arms `erase_pending`
//!   so a later read can force the erase through synchronously.

use tracing::trace;
use weir_error::{Result, WeirError};
use weir_types::{BlockIndex, ChannelId, Geometry, NandLocation, WayId};

/// Whether a [`check`](RowDependencyTable::check) is the first look at a
/// request or a re-examination of one already parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCheckMode {
    /// First admission attempt: blocking verdicts record the request in the
    /// table (parked reads are counted, parked erases arm the pending flag).
    Select,
    /// Re-examination of a parked request: passing verdicts undo the record
    /// made at select time.
    Release,
}

/// Row-level view of a flash operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOp {
    /// Page read.
    Read,
    /// Page program.
    Program,
    /// Block erase. `programmed_pages` is how many pages the block holds
    /// according to its owner; the erase is held back until the watermark
    /// catches up to it.
    Erase { programmed_pages: u32 },
}

/// Admission verdict for a row-checked request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Safe to dispatch now.
    Pass,
    /// Must wait for earlier row activity; park in the row-blocked queue.
    Blocked,
}

#[derive(Debug, Clone, Copy, Default)]
struct RowEntry {
    permitted_prog_page: u32,
    blocked_read_count: u32,
    erase_pending: bool,
}

/// Per-`(channel, way, block)` program-order and erase-order state.
#[derive(Debug)]
pub struct RowDependencyTable {
    ways: u8,
    blocks_per_die: u32,
    entries: Vec<RowEntry>,
}

impl RowDependencyTable {
    /// Build a table sized for `geometry`, with every block empty.
    #[must_use]
    pub fn new(geometry: &Geometry) -> Self {
        let lanes = usize::from(geometry.channels) * usize::from(geometry.ways);
        Self {
            ways: geometry.ways,
            blocks_per_die: geometry.blocks_per_die,
            entries: vec![RowEntry::default(); lanes * geometry.blocks_per_die as usize],
        }
    }

    fn idx(&self, channel: ChannelId, way: WayId, block: BlockIndex) -> usize {
        let lane = usize::from(channel.0) * usize::from(self.ways) + usize::from(way.0);
        lane * self.blocks_per_die as usize + block.0 as usize
    }

    /// Admission gate. See the module docs for the per-operation rules.
    ///
    /// # Errors
    ///
    /// [`WeirError::PageReplay`] when a program targets a page below the
    /// block's watermark. Order within a block is monotonic; a replay means
    /// the caller's address accounting is corrupt.
    pub fn check(
        &mut self,
        loc: NandLocation,
        op: RowOp,
        mode: RowCheckMode,
    ) -> Result<RowOutcome> {
        let i = self.idx(loc.channel, loc.way, loc.block);
        let entry = &mut self.entries[i];
        match op {
            RowOp::Read => match mode {
                RowCheckMode::Select => {
                    if loc.page.0 < entry.permitted_prog_page {
                        Ok(RowOutcome::Pass)
                    } else {
                        entry.blocked_read_count += 1;
                        Ok(RowOutcome::Blocked)
                    }
                }
                RowCheckMode::Release => {
                    if loc.page.0 < entry.permitted_prog_page {
                        debug_assert!(
                            entry.blocked_read_count > 0,
                            "released a read that was never counted as parked"
                        );
                        entry.blocked_read_count = entry.blocked_read_count.saturating_sub(1);
                        Ok(RowOutcome::Pass)
                    } else {
                        Ok(RowOutcome::Blocked)
                    }
                }
            },
            RowOp::Program => {
                if loc.page.0 == entry.permitted_prog_page {
                    entry.permitted_prog_page += 1;
                    Ok(RowOutcome::Pass)
                } else if loc.page.0 > entry.permitted_prog_page {
                    Ok(RowOutcome::Blocked)
                } else {
                    Err(WeirError::PageReplay {
                        channel: loc.channel.0,
                        way: loc.way.0,
                        block: loc.block.0,
                        page: loc.page.0,
                        permitted: entry.permitted_prog_page,
                    })
                }
            }
            RowOp::Erase { programmed_pages } => {
                if entry.permitted_prog_page == programmed_pages && entry.blocked_read_count == 0 {
                    entry.permitted_prog_page = 0;
                    entry.erase_pending = false;
                    trace!(
                        target: "weir::row",
                        channel = loc.channel.0,
                        way = loc.way.0,
                        block = loc.block.0,
                        "erase admitted; block watermark reset"
                    );
                    Ok(RowOutcome::Pass)
                } else {
                    if mode == RowCheckMode::Select {
                        entry.erase_pending = true;
                    }
                    Ok(RowOutcome::Blocked)
                }
            }
        }
    }

    /// Count a read that parked outside [`check`] (buffer-blocked admission).
    pub fn note_blocked_read(&mut self, loc: NandLocation) {
        let i = self.idx(loc.channel, loc.way, loc.block);
        self.entries[i].blocked_read_count += 1;
    }

    /// Arm the pending-erase flag outside [`check`] (buffer-blocked
    /// admission).
    pub fn note_pending_erase(&mut self, loc: NandLocation) {
        let i = self.idx(loc.channel, loc.way, loc.block);
        self.entries[i].erase_pending = true;
    }

    /// Clear a block's watermark and pending-erase flag after a forced
    /// synchronous erase. Parked-read accounting is untouched: the reads are
    /// still parked and release individually.
    pub fn reset_block(&mut self, channel: ChannelId, way: WayId, block: BlockIndex) {
        let i = self.idx(channel, way, block);
        self.entries[i].permitted_prog_page = 0;
        self.entries[i].erase_pending = false;
    }

    /// Next page the block will accept for programming.
    #[must_use]
    pub fn permitted_prog_page(&self, channel: ChannelId, way: WayId, block: BlockIndex) -> u32 {
        self.entries[self.idx(channel, way, block)].permitted_prog_page
    }

    /// Number of reads currently parked on this block.
    #[must_use]
    pub fn blocked_reads(&self, channel: ChannelId, way: WayId, block: BlockIndex) -> u32 {
        self.entries[self.idx(channel, way, block)].blocked_read_count
    }

    /// Whether an erase has been seen for this block and parked.
    #[must_use]
    pub fn erase_pending(&self, channel: ChannelId, way: WayId, block: BlockIndex) -> bool {
        self.entries[self.idx(channel, way, block)].erase_pending
    }
}
