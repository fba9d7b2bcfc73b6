//! Host-command transformation: LBA-range splitting and slice-to-transfer
//! resolution.
//!
//! A host command covers an arbitrary block range; the scheduler works in
//! slice units. [`Scheduler::split_host_command`] cuts the range at slice
//! boundaries into per-slice requests parked in the slice queue, each carrying
//! its share of the command's DMA descriptor range. A later
//! [`Scheduler::drain_slice_queue`] resolves each slice against the buffer
//! cache (queuing writebacks and flash reads as needed), recodes the slice
//! request in place as the host transfer it ultimately is, and hands it to
//! dispatch.

use tracing::{debug, trace};

use weir_error::{Result, WeirError};
use weir_types::{
    BlockSpace, BufBinding, BufEntryId, DmaState, HostCommand, HostOpcode, Lba, Lsa, NandAddr,
    NandTarget, QueueId, ReqCode, ReqKind, ReqOptions, SlotTag,
};

use crate::scheduler::Scheduler;
use crate::traits::{AddressTranslator, BufferCache, HostDmaEngine, NandExecutor};

// ── Range splitting ─────────────────────────────────────────────────────────

/// One slice-aligned cut of a host command's block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SliceSpan {
    /// Slice the cut falls in.
    pub lsa: Lsa,
    /// Index of the cut's first block within the command's DMA descriptors.
    pub start_index: u16,
    /// Offset of the cut's first block within the slice.
    pub block_offset: u16,
    /// Blocks in the cut.
    pub block_count: u16,
}

/// Cut `[start_lba, start_lba + block_count)` at slice boundaries.
///
/// The first span absorbs the command's misalignment; interior spans cover
/// whole slices; a final partial span is emitted only when the range ends
/// mid-slice *and* crossed at least one boundary. The range's last block must
/// be addressable; [`Scheduler::split_host_command`] rejects commands whose
/// range runs past the end of the address space.
// Offsets and counts all fit the u16 descriptor budget callers enforce.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn slice_spans(blocks_per_slice: u16, start_lba: Lba, block_count: u32) -> Vec<SliceSpan> {
    debug_assert!(block_count > 0);
    debug_assert!(
        start_lba.0.checked_add(u64::from(block_count) - 1).is_some(),
        "range runs past the end of the block address space"
    );
    let bps = u64::from(blocks_per_slice);
    let offset = start_lba.0 % bps;
    let total = u64::from(block_count);
    let boundary_crossings = (offset + total) / bps;

    let first = (bps - offset).min(total);
    let mut spans = vec![SliceSpan {
        lsa: Lsa(start_lba.0 / bps),
        start_index: 0,
        block_offset: offset as u16,
        block_count: first as u16,
    }];

    if boundary_crossings > 0 {
        let mut next_index = first;
        // Incremented only for slices holding at least one covered block, so
        // the index never exceeds the last block's slice.
        let mut lsa = start_lba.0 / bps;
        for _ in 1..boundary_crossings {
            lsa += 1;
            spans.push(SliceSpan {
                lsa: Lsa(lsa),
                start_index: next_index as u16,
                block_offset: 0,
                block_count: blocks_per_slice,
            });
            next_index += bps;
        }
        // start_lba + total can wrap at the top of the address space; these
        // operands are already reduced.
        let tail = (offset + total) % bps;
        if tail != 0 {
            spans.push(SliceSpan {
                lsa: Lsa(lsa + 1),
                start_index: next_index as u16,
                block_offset: 0,
                block_count: tail as u16,
            });
        }
    }
    spans
}

// ── Transformation front end ────────────────────────────────────────────────

impl<A, B, D, N> Scheduler<A, B, D, N>
where
    A: AddressTranslator,
    B: BufferCache,
    D: HostDmaEngine,
    N: NandExecutor,
{
    /// Split a host command into per-slice requests parked in the slice
    /// queue.
    ///
    /// # Errors
    ///
    /// [`WeirError::EmptyHostCommand`] for zero-length commands,
    /// [`WeirError::OversizedHostCommand`] for ranges beyond the u16 DMA
    /// descriptor budget, and [`WeirError::OutOfRangeHostCommand`] for ranges
    /// running past the end of the block address space, plus allocation
    /// failures once the pool and the host-DMA reclaim path are both dry.
    pub fn split_host_command(&mut self, cmd: HostCommand) -> Result<()> {
        if cmd.block_count == 0 {
            return Err(WeirError::EmptyHostCommand {
                cmd_tag: cmd.cmd_tag.0,
            });
        }
        if cmd.block_count > u32::from(u16::MAX) {
            return Err(WeirError::OversizedHostCommand {
                cmd_tag: cmd.cmd_tag.0,
                blocks: cmd.block_count,
            });
        }
        if cmd.start_lba.0.checked_add(u64::from(cmd.block_count - 1)).is_none() {
            return Err(WeirError::OutOfRangeHostCommand {
                cmd_tag: cmd.cmd_tag.0,
                start_lba: cmd.start_lba.0,
                blocks: cmd.block_count,
            });
        }
        let code = match cmd.opcode {
            HostOpcode::Read => ReqCode::Read,
            HostOpcode::Write => ReqCode::Write,
            HostOpcode::PartialWrite => ReqCode::PartialWrite,
        };
        let spans = slice_spans(self.geometry().host_blocks_per_slice, cmd.start_lba, cmd.block_count);
        debug!(
            target: "weir::transform",
            cmd_tag = cmd.cmd_tag.0,
            opcode = %code,
            lba = cmd.start_lba.0,
            blocks = cmd.block_count,
            slices = spans.len(),
            "host command split"
        );
        for span in spans {
            let tag = self.allocate_slot()?;
            let slot = self.pool_mut().slot_mut(tag);
            slot.kind = ReqKind::Slice;
            slot.code = code;
            slot.cmd_tag = cmd.cmd_tag;
            slot.lsa = Some(span.lsa);
            slot.dma = DmaState {
                start_index: span.start_index,
                block_offset: span.block_offset,
                block_count: span.block_count,
                snapshot: None,
            };
            self.pool_mut().push(QueueId::Slice, tag);
        }
        Ok(())
    }

    /// Resolve every parked slice request against the buffer cache and hand
    /// each one to dispatch as a host transfer.
    ///
    /// On a miss the victim entry's dirty contents are written back to flash
    /// first, and the slice's current flash copy is read in when the request
    /// will not overwrite the whole slice. Writes dirty the entry. The slice
    /// request itself is recoded in place: writes become receive transfers,
    /// reads become transmit transfers, both chained behind whatever traffic
    /// the entry already has in flight.
    pub fn drain_slice_queue(&mut self) -> Result<()> {
        while let Some(tag) = self.pool_mut().pop_head(QueueId::Slice) {
            let lsa = self.pool().slot(tag).lsa.ok_or_else(|| self.unroutable(tag))?;
            let code = self.pool().slot(tag).code;

            let entry = match self.cache_mut().lookup(lsa) {
                Some(entry) => {
                    trace!(target: "weir::transform", lsa = lsa.0, entry = entry.0, "buffer hit");
                    entry
                }
                None => {
                    let victim = self.cache_mut().allocate_victim();
                    self.pool_mut().slot_mut(tag).buf = BufBinding::Entry(victim);
                    self.evict_buffer_entry(tag, victim)?;
                    self.cache_mut().bind(victim, lsa);
                    let full_overwrite = code == ReqCode::Write
                        && self.pool().slot(tag).dma.block_count
                            == self.geometry().host_blocks_per_slice;
                    match code {
                        ReqCode::Read | ReqCode::PartialWrite => {
                            self.populate_from_nand(tag, victim)?;
                        }
                        ReqCode::Write if !full_overwrite => {
                            self.populate_from_nand(tag, victim)?;
                        }
                        ReqCode::Write => {}
                        _ => return Err(self.unroutable(tag)),
                    }
                    victim
                }
            };

            let new_code = match code {
                ReqCode::Write | ReqCode::PartialWrite => ReqCode::RxDma,
                ReqCode::Read => ReqCode::TxDma,
                _ => return Err(self.unroutable(tag)),
            };
            if new_code == ReqCode::RxDma {
                self.cache_mut().mark_dirty(entry);
            }
            {
                let slot = self.pool_mut().slot_mut(tag);
                slot.kind = ReqKind::HostDma;
                slot.code = new_code;
                slot.buf = BufBinding::Entry(entry);
            }
            self.attach_to_chain(tag);
            self.select_low_level_queue(tag)?;
        }
        Ok(())
    }

    /// Queue a flash writeback for `entry`'s dirty contents so the entry can
    /// be rebound. No-op for clean entries.
    fn evict_buffer_entry(&mut self, origin: SlotTag, entry: BufEntryId) -> Result<()> {
        if !self.cache().is_dirty(entry) {
            return Ok(());
        }
        let lsa = self
            .cache()
            .slice_addr(entry)
            .ok_or(WeirError::MissingSliceBinding { entry: entry.0 })?;
        let vsa = self.translator_mut().translate_write(lsa);
        let cmd_tag = self.pool().slot(origin).cmd_tag;

        let tag = self.allocate_slot()?;
        {
            let slot = self.pool_mut().slot_mut(tag);
            slot.kind = ReqKind::Nand;
            slot.code = ReqCode::Write;
            slot.cmd_tag = cmd_tag;
            slot.lsa = Some(lsa);
            slot.opts = ReqOptions {
                ecc: true,
                ecc_warning: false,
                row_check: true,
                block_space: BlockSpace::Main,
            };
            slot.buf = BufBinding::Entry(entry);
            slot.nand = NandTarget {
                addr: Some(NandAddr::Vsa(vsa)),
                programmed_page_count: 0,
            };
        }
        self.attach_to_chain(tag);
        debug!(
            target: "weir::transform",
            entry = entry.0,
            lsa = lsa.0,
            vsa = vsa.0,
            "dirty entry written back before reuse"
        );
        self.select_low_level_queue(tag)?;
        self.cache_mut().mark_clean(entry);
        Ok(())
    }

    /// Queue a flash read filling `entry` with the current copy of `origin`'s
    /// slice. No-op when the slice has never been written back.
    fn populate_from_nand(&mut self, origin: SlotTag, entry: BufEntryId) -> Result<()> {
        let lsa = self.pool().slot(origin).lsa.ok_or_else(|| self.unroutable(origin))?;
        let Some(vsa) = self.translator().translate_read(lsa) else {
            return Ok(());
        };
        let cmd_tag = self.pool().slot(origin).cmd_tag;

        let tag = self.allocate_slot()?;
        {
            let slot = self.pool_mut().slot_mut(tag);
            slot.kind = ReqKind::Nand;
            slot.code = ReqCode::Read;
            slot.cmd_tag = cmd_tag;
            slot.lsa = Some(lsa);
            slot.opts = ReqOptions {
                ecc: true,
                ecc_warning: true,
                row_check: true,
                block_space: BlockSpace::Main,
            };
            slot.buf = BufBinding::Entry(entry);
            slot.nand = NandTarget {
                addr: Some(NandAddr::Vsa(vsa)),
                programmed_page_count: 0,
            };
        }
        self.attach_to_chain(tag);
        trace!(
            target: "weir::transform",
            entry = entry.0,
            lsa = lsa.0,
            vsa = vsa.0,
            "slice read in from flash"
        );
        self.select_low_level_queue(tag)?;
        Ok(())
    }
}
