//! Collaborator seams the scheduler is generic over.
//!
//! The scheduler owns one implementor of each trait and drives them from a
//! single thread. Everything a real controller would wire to hardware or to
//! the mapping layer sits behind one of these four seams, so the scheduling
//! core can be exercised against simulators in tests and benches.

use weir_error::Result;
use weir_types::{
    BlockIndex, BufBinding, BufEntryId, ChannelId, CmdTag, DmaPosition, Lsa, NandLocation,
    SlotTag, TempEntryId, Vsa, WayId,
};

/// Logical-to-physical mapping for slice-sized units.
///
/// The scheduler never interprets virtual slice addresses itself; it asks the
/// translator for the current mapping on reads, for a fresh destination on
/// writebacks, and for the flash coordinates behind a virtual address when a
/// request reaches dispatch.
pub trait AddressTranslator {
    /// Current mapping for `lsa`, or `None` if the slice has never been
    /// written back to flash.
    fn translate_read(&self, lsa: Lsa) -> Option<Vsa>;

    /// Allocate (or move) the physical slice a writeback of `lsa` lands in,
    /// and record the new mapping.
    fn translate_write(&mut self, lsa: Lsa) -> Vsa;

    /// Decompose a virtual slice address into flash coordinates. The result
    /// must stay within the geometry the scheduler was built with.
    fn decompose(&self, vsa: Vsa) -> NandLocation;
}

/// Slice-granularity data buffer with dirty tracking and per-entry blocking
/// chains.
///
/// The cache decides victim selection and recency on its own; the scheduler
/// only consumes the entry identity, the dirty bit, and the chain tail it
/// stores per entry. Chain tails are owned by the scheduler: the cache just
/// remembers them.
pub trait BufferCache {
    /// Look up the entry currently bound to `lsa`, bumping its recency on a
    /// hit.
    fn lookup(&mut self, lsa: Lsa) -> Option<BufEntryId>;

    /// Pick the entry to reuse for a miss. The caller writes back its dirty
    /// contents (if any) before rebinding it.
    fn allocate_victim(&mut self) -> BufEntryId;

    /// Bind `entry` to `lsa`, replacing whatever slice it held before.
    fn bind(&mut self, entry: BufEntryId, lsa: Lsa);

    /// The slice currently bound to `entry`, if any.
    fn slice_addr(&self, entry: BufEntryId) -> Option<Lsa>;

    /// Whether `entry` holds data newer than flash.
    fn is_dirty(&self, entry: BufEntryId) -> bool;

    /// Mark `entry` as holding data newer than flash.
    fn mark_dirty(&mut self, entry: BufEntryId);

    /// Mark `entry` as clean (a writeback for its contents has been queued).
    fn mark_clean(&mut self, entry: BufEntryId);

    /// Tail of the blocking chain anchored at `entry`.
    fn chain_tail(&self, entry: BufEntryId) -> Option<SlotTag>;

    /// Record a new blocking-chain tail for `entry`.
    fn set_chain_tail(&mut self, entry: BufEntryId, tail: Option<SlotTag>);

    /// Tail of the blocking chain anchored at temporary entry `entry`.
    fn temp_chain_tail(&self, entry: TempEntryId) -> Option<SlotTag>;

    /// Record a new blocking-chain tail for temporary entry `entry`.
    fn set_temp_chain_tail(&mut self, entry: TempEntryId, tail: Option<SlotTag>);
}

/// Host-side DMA rings.
///
/// Submission hands one host block at a time to the engine; completion is
/// observed by comparing the engine's progress cursor against the position
/// snapshotted at submit time. Positions wrap in lockstep with the ring, so
/// the lap counter disambiguates reuse of the same descriptor index.
pub trait HostDmaEngine {
    /// Queue one host-to-device block transfer into buffer block
    /// `block_in_slice` of `target`.
    fn submit_receive(
        &mut self,
        cmd_tag: CmdTag,
        dma_index: u16,
        target: BufBinding,
        block_in_slice: u16,
    ) -> Result<()>;

    /// Queue one device-to-host block transfer out of buffer block
    /// `block_in_slice` of `target`.
    fn submit_transmit(
        &mut self,
        cmd_tag: CmdTag,
        dma_index: u16,
        target: BufBinding,
        block_in_slice: u16,
    ) -> Result<()>;

    /// Ring position just past the most recently submitted receive descriptor.
    fn rx_submit_position(&self) -> DmaPosition;

    /// Ring position just past the most recently submitted transmit
    /// descriptor.
    fn tx_submit_position(&self) -> DmaPosition;

    /// Current receive-side progress cursor. Descriptors strictly before the
    /// cursor have been consumed by the engine.
    fn rx_progress(&mut self) -> DmaPosition;

    /// Current transmit-side progress cursor.
    fn tx_progress(&mut self) -> DmaPosition;
}

/// Flash execution back end.
///
/// Dispatch itself is queue-structured and asynchronous; the one operation the
/// scheduler needs synchronously is the forced completion of a parked erase
/// when a read would otherwise deadlock behind it.
pub trait NandExecutor {
    /// Run an erase of `block` on `(channel, way)` to completion before
    /// returning.
    fn erase_sync(&mut self, channel: ChannelId, way: WayId, block: BlockIndex) -> Result<()>;
}
