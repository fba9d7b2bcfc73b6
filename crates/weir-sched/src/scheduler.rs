//! The scheduler proper: slot allocation, dispatch, and the two release
//! cascades (buffer chains and row-blocked queues).
//!
//! A request's life is a walk over arena queues. Slice requests enter through
//! the transformation front end (see `transform`), become host-DMA or flash
//! requests, and then pass through [`Scheduler::select_low_level_queue`]: the
//! single routing point that consults the blocking chain, the row table, and
//! the request's own options to decide which queue the request waits in next.
//! Completions run the reverse edges: freeing a slot hands its blocking-chain
//! successor back to the router, and flash completions reopen the row-blocked
//! queue for their lane.

use tracing::{debug, info, trace};

use weir_arena::{QueueCensus, RequestPool};
use weir_error::{Result, WeirError};
use weir_types::{
    BlockIndex, BufBinding, ChannelId, CmdTag, Geometry, Lsa, NandAddr, NandLocation, NandTarget,
    QueueId, ReqCode, ReqKind, ReqOptions, SlotTag, WayId,
};

use crate::row::{RowCheckMode, RowDependencyTable, RowOp, RowOutcome};
use crate::traits::{AddressTranslator, BufferCache, HostDmaEngine, NandExecutor};

// ── Raw flash submission ────────────────────────────────────────────────────

/// A flash request handed to the scheduler directly, bypassing the host
/// command front end. Internal maintenance traffic (writebacks, merges,
/// erases) enters this way.
#[derive(Debug, Clone, Copy)]
pub struct NandRequest {
    /// Host command this work is attributed to, if any.
    pub cmd_tag: CmdTag,
    /// Must be [`ReqCode::Read`], [`ReqCode::Write`], or [`ReqCode::Erase`].
    pub code: ReqCode,
    /// Slice the transfer belongs to, when one exists.
    pub lsa: Option<Lsa>,
    /// Where on flash the operation lands.
    pub addr: NandAddr,
    /// For erases: how many pages the block's owner believes are programmed.
    pub programmed_page_count: u32,
    /// ECC / row-check / block-space options.
    pub opts: ReqOptions,
    /// Buffer entry the transfer moves data through, if any.
    pub buf: BufBinding,
}

/// Outcome of row bookkeeping for a buffer-blocked flash request.
#[derive(Debug, PartialEq, Eq)]
enum AdmitReport {
    /// Bookkeeping recorded; caller parks the request in the buffer-blocked
    /// queue.
    Done,
    /// A forced erase cleared the request's own blocking dependency and the
    /// request was routed on the spot; caller must not park it.
    Sync,
}

// ── Scheduler ───────────────────────────────────────────────────────────────

/// Request-scheduling core, generic over its four collaborator seams.
///
/// Owns the slot arena, the row-dependency table, and one implementor of each
/// trait in [`crate::traits`]. All methods take `&mut self`; the scheduler is
/// driven from a single thread.
#[derive(Debug)]
pub struct Scheduler<A, B, D, N> {
    geometry: Geometry,
    pool: RequestPool,
    row_table: RowDependencyTable,
    translator: A,
    cache: B,
    dma: D,
    nand: N,
}

impl<A, B, D, N> Scheduler<A, B, D, N>
where
    A: AddressTranslator,
    B: BufferCache,
    D: HostDmaEngine,
    N: NandExecutor,
{
    /// Build a scheduler for `geometry` with every slot free.
    ///
    /// # Errors
    ///
    /// [`WeirError::Config`] when the geometry fails validation.
    pub fn new(geometry: Geometry, translator: A, cache: B, dma: D, nand: N) -> Result<Self> {
        geometry
            .validate()
            .map_err(|err| WeirError::Config(err.to_string()))?;
        info!(
            target: "weir::sched",
            channels = geometry.channels,
            ways = geometry.ways,
            slots = geometry.request_slots,
            "scheduler initialized"
        );
        Ok(Self {
            pool: RequestPool::new(geometry.request_slots, geometry.channels, geometry.ways),
            row_table: RowDependencyTable::new(&geometry),
            geometry,
            translator,
            cache,
            dma,
            nand,
        })
    }

    // ── Allocation ──────────────────────────────────────────────────────────

    /// Take a free slot, reclaiming finished host-DMA requests if the free
    /// queue is dry.
    pub(crate) fn allocate_slot(&mut self) -> Result<SlotTag> {
        loop {
            if let Some(tag) = self.pool.try_allocate() {
                return Ok(tag);
            }
            if self.pool.queue_len(QueueId::HostDma) == 0 {
                return Err(WeirError::PoolExhausted {
                    capacity: self.pool.capacity(),
                });
            }
            debug!(target: "weir::sched", "free queue dry; polling host DMA for reclaim");
            if self.poll_host_dma_completions()? == 0 {
                return Err(WeirError::PoolExhausted {
                    capacity: self.pool.capacity(),
                });
            }
        }
    }

    /// Submit a flash request directly, route it, and return its slot.
    ///
    /// The request joins the blocking chain of its buffer entry (if it names
    /// one) and then goes through the usual dispatch gates, so maintenance
    /// traffic obeys the same ordering rules as transformed host traffic.
    ///
    /// # Errors
    ///
    /// [`WeirError::UnroutableRequest`] when `code` is not a flash operation,
    /// plus anything allocation or routing can raise.
    pub fn submit_nand_request(&mut self, req: NandRequest) -> Result<SlotTag> {
        let tag = self.allocate_slot()?;
        {
            let slot = self.pool.slot_mut(tag);
            slot.kind = ReqKind::Nand;
            slot.code = req.code;
            slot.cmd_tag = req.cmd_tag;
            slot.lsa = req.lsa;
            slot.opts = req.opts;
            slot.buf = req.buf;
            slot.nand = NandTarget {
                addr: Some(req.addr),
                programmed_page_count: req.programmed_page_count,
            };
        }
        if !matches!(req.code, ReqCode::Read | ReqCode::Write | ReqCode::Erase) {
            let err = self.unroutable(tag);
            self.pool.release(tag);
            return Err(err);
        }
        self.attach_to_chain(tag);
        self.select_low_level_queue(tag)?;
        Ok(tag)
    }

    // ── Dispatch ────────────────────────────────────────────────────────────

    /// Route a loose request into the queue it must wait in next.
    ///
    /// An unblocked host-DMA request is issued to the engine and parked in the
    /// host-DMA queue. An unblocked flash request consults the row table (when
    /// its options ask for it) and lands in its lane's ready queue or
    /// row-blocked queue. A request whose blocking chain still has a
    /// predecessor parks in the buffer-blocked queue, after row bookkeeping
    /// for flash requests.
    ///
    /// # Errors
    ///
    /// [`WeirError::UnroutableRequest`] for requests that are not in a
    /// dispatchable state (slice kind, or a flash request with no address).
    pub fn select_low_level_queue(&mut self, tag: SlotTag) -> Result<()> {
        if !self.pool.chain_is_blocked(tag) {
            match self.pool.slot(tag).kind {
                ReqKind::HostDma => {
                    self.issue_host_dma(tag)?;
                    self.pool.push(QueueId::HostDma, tag);
                }
                ReqKind::Nand => {
                    let loc = self.resolve_nand_location(tag)?;
                    if self.pool.slot(tag).opts.row_check {
                        match self.check_row_dependency(tag, loc, RowCheckMode::Select)? {
                            RowOutcome::Pass => self.pool.push(
                                QueueId::Nand {
                                    channel: loc.channel,
                                    way: loc.way,
                                },
                                tag,
                            ),
                            RowOutcome::Blocked => self.pool.push(
                                QueueId::RowBlocked {
                                    channel: loc.channel,
                                    way: loc.way,
                                },
                                tag,
                            ),
                        }
                    } else {
                        self.pool.push(
                            QueueId::Nand {
                                channel: loc.channel,
                                way: loc.way,
                            },
                            tag,
                        );
                    }
                }
                ReqKind::Slice => return Err(self.unroutable(tag)),
            }
            return Ok(());
        }

        // Blocked behind an earlier request on the same buffer entry. Flash
        // requests still record themselves in the row table so erase gating
        // sees them while they wait.
        if self.pool.slot(tag).kind == ReqKind::Nand
            && self.pool.slot(tag).opts.row_check
            && self.admit_buffer_blocked(tag)? == AdmitReport::Sync
        {
            return Ok(());
        }
        self.pool.push(QueueId::BufBlocked, tag);
        Ok(())
    }

    /// Row-table admission for `tag`, running the forced-erase escape first
    /// when a select-mode read meets a block flagged with a pending erase.
    fn check_row_dependency(
        &mut self,
        tag: SlotTag,
        loc: NandLocation,
        mode: RowCheckMode,
    ) -> Result<RowOutcome> {
        let op = self.row_op(tag)?;
        if op == RowOp::Read
            && mode == RowCheckMode::Select
            && self.row_table.erase_pending(loc.channel, loc.way, loc.block)
        {
            self.force_release_pending_erase(loc.channel, loc.way, loc.block)?;
        }
        self.row_table.check(loc, op, mode)
    }

    fn row_op(&self, tag: SlotTag) -> Result<RowOp> {
        let slot = self.pool.slot(tag);
        match slot.code {
            ReqCode::Read => Ok(RowOp::Read),
            ReqCode::Write => Ok(RowOp::Program),
            ReqCode::Erase => Ok(RowOp::Erase {
                programmed_pages: slot.nand.programmed_page_count,
            }),
            _ => Err(self.unroutable(tag)),
        }
    }

    /// Row bookkeeping for a flash request that is parking buffer-blocked.
    ///
    /// Reads count themselves as parked; erases arm the pending flag. The one
    /// twist: when a buffer-blocked read meets a pending erase, the forced
    /// erase may complete the very predecessor the read was blocked on. In
    /// that case the read is routed immediately and [`AdmitReport::Sync`] is
    /// returned.
    fn admit_buffer_blocked(&mut self, tag: SlotTag) -> Result<AdmitReport> {
        let loc = self.resolve_nand_location(tag)?;
        match self.pool.slot(tag).code {
            ReqCode::Read => {
                if self.row_table.erase_pending(loc.channel, loc.way, loc.block) {
                    self.force_release_pending_erase(loc.channel, loc.way, loc.block)?;
                    if !self.pool.chain_is_blocked(tag) {
                        if loc.page.0
                            < self.row_table.permitted_prog_page(loc.channel, loc.way, loc.block)
                        {
                            self.pool.push(
                                QueueId::Nand {
                                    channel: loc.channel,
                                    way: loc.way,
                                },
                                tag,
                            );
                        } else {
                            self.row_table.note_blocked_read(loc);
                            self.pool.push(
                                QueueId::RowBlocked {
                                    channel: loc.channel,
                                    way: loc.way,
                                },
                                tag,
                            );
                        }
                        return Ok(AdmitReport::Sync);
                    }
                }
                self.row_table.note_blocked_read(loc);
            }
            ReqCode::Erase => self.row_table.note_pending_erase(loc),
            _ => {}
        }
        Ok(AdmitReport::Done)
    }

    /// Find the parked erase for `block` in its lane's row-blocked queue, run
    /// it synchronously, and reset the block's row record.
    ///
    /// If the erase is still waiting on a buffer dependency it is not in the
    /// row-blocked queue yet; the pending flag stays armed and nothing
    /// happens.
    fn force_release_pending_erase(
        &mut self,
        channel: ChannelId,
        way: WayId,
        block: BlockIndex,
    ) -> Result<()> {
        let queue = QueueId::RowBlocked { channel, way };
        let mut cur = self.pool.head(queue);
        while let Some(tag) = cur {
            cur = self.pool.next_of(tag);
            if self.pool.slot(tag).code != ReqCode::Erase {
                continue;
            }
            let loc = self.resolve_nand_location(tag)?;
            if loc.block != block {
                continue;
            }
            self.pool.detach(tag)?;
            self.nand.erase_sync(channel, way, block)?;
            self.row_table.reset_block(channel, way, block);
            debug!(
                target: "weir::sched",
                %channel,
                %way,
                %block,
                tag = tag.0,
                "parked erase forced to completion"
            );
            self.pool.release(tag);
            self.release_buffer_dependents(tag)?;
            return Ok(());
        }
        Ok(())
    }

    fn resolve_nand_location(&self, tag: SlotTag) -> Result<NandLocation> {
        match self.pool.slot(tag).nand.addr {
            Some(NandAddr::Vsa(vsa)) => Ok(self.translator.decompose(vsa)),
            Some(NandAddr::Physical(loc)) => Ok(loc),
            None => Err(self.unroutable(tag)),
        }
    }

    // ── Completion cascades ─────────────────────────────────────────────────

    /// Hand the blocking-chain successor of a freed request back to dispatch.
    ///
    /// Clears the chain-tail record on the completed request's buffer entry
    /// when the completed request *was* the tail, then re-routes the successor
    /// if one was waiting. Flash successors go through release-mode row
    /// admission. Called automatically by both completion paths; public so a
    /// custom execution layer can drive it for completions the scheduler never
    /// sees.
    pub fn release_buffer_dependents(&mut self, completed: SlotTag) -> Result<()> {
        let successor = self.pool.chain_take_successor(completed);

        match self.pool.slot(completed).buf {
            BufBinding::Entry(entry) => {
                if self.cache.chain_tail(entry) == Some(completed) {
                    self.cache.set_chain_tail(entry, None);
                }
            }
            BufBinding::Temp(temp) => {
                if self.cache.temp_chain_tail(temp) == Some(completed) {
                    self.cache.set_temp_chain_tail(temp, None);
                }
            }
            BufBinding::None => {}
        }

        let Some(next) = successor else {
            return Ok(());
        };
        if self.pool.slot(next).queue() != Some(QueueId::BufBlocked) {
            return Ok(());
        }
        self.pool.detach(next)?;
        trace!(target: "weir::sched", tag = next.0, "buffer dependency cleared");
        match self.pool.slot(next).kind {
            ReqKind::HostDma => {
                self.issue_host_dma(next)?;
                self.pool.push(QueueId::HostDma, next);
            }
            ReqKind::Nand => {
                let loc = self.resolve_nand_location(next)?;
                if self.pool.slot(next).opts.row_check {
                    match self.check_row_dependency(next, loc, RowCheckMode::Release)? {
                        RowOutcome::Pass => self.pool.push(
                            QueueId::Nand {
                                channel: loc.channel,
                                way: loc.way,
                            },
                            next,
                        ),
                        RowOutcome::Blocked => self.pool.push(
                            QueueId::RowBlocked {
                                channel: loc.channel,
                                way: loc.way,
                            },
                            next,
                        ),
                    }
                } else {
                    self.pool.push(
                        QueueId::Nand {
                            channel: loc.channel,
                            way: loc.way,
                        },
                        next,
                    );
                }
            }
            ReqKind::Slice => return Err(self.unroutable(next)),
        }
        Ok(())
    }

    /// Re-examine every request parked in `(channel, way)`'s row-blocked
    /// queue, moving the ones whose row dependency has cleared to the lane's
    /// ready queue. Call after flash completions on the lane.
    pub fn release_row_dependents(&mut self, channel: ChannelId, way: WayId) -> Result<()> {
        let queue = QueueId::RowBlocked { channel, way };
        let mut cur = self.pool.head(queue);
        while let Some(tag) = cur {
            cur = self.pool.next_of(tag);
            debug_assert!(self.pool.slot(tag).opts.row_check);
            let loc = self.resolve_nand_location(tag)?;
            if self.check_row_dependency(tag, loc, RowCheckMode::Release)? == RowOutcome::Pass {
                self.pool.detach(tag)?;
                self.pool.push(QueueId::Nand { channel, way }, tag);
                trace!(
                    target: "weir::sched",
                    %channel,
                    %way,
                    tag = tag.0,
                    "row dependency cleared"
                );
            }
        }
        Ok(())
    }

    /// Retire the oldest dispatched flash request on `(channel, way)`: free
    /// its slot, run the buffer cascade, and return its tag.
    ///
    /// Row-blocked requests on the lane are *not* re-examined here; drive
    /// [`release_row_dependents`](Self::release_row_dependents) separately
    /// once the lane has drained as far as it is going to.
    ///
    /// # Errors
    ///
    /// [`WeirError::EmptyQueue`] when the lane has nothing outstanding.
    pub fn complete_nand_head(&mut self, channel: ChannelId, way: WayId) -> Result<SlotTag> {
        let queue = QueueId::Nand { channel, way };
        let tag = self
            .pool
            .pop_head(queue)
            .ok_or_else(|| WeirError::EmptyQueue {
                queue: queue.to_string(),
            })?;
        debug!(
            target: "weir::sched",
            %channel,
            %way,
            tag = tag.0,
            code = %self.pool.slot(tag).code,
            "flash request completed"
        );
        self.pool.release(tag);
        self.release_buffer_dependents(tag)?;
        Ok(tag)
    }

    // ── Host DMA ────────────────────────────────────────────────────────────

    /// Push every block of `tag`'s transfer into the DMA engine and snapshot
    /// the ring position the request must wait for.
    fn issue_host_dma(&mut self, tag: SlotTag) -> Result<()> {
        let (cmd_tag, code, target, dma) = {
            let slot = self.pool.slot(tag);
            (slot.cmd_tag, slot.code, slot.buf, slot.dma)
        };
        match code {
            ReqCode::RxDma => {
                for i in 0..dma.block_count {
                    self.dma
                        .submit_receive(cmd_tag, dma.start_index + i, target, dma.block_offset + i)?;
                }
                self.pool.slot_mut(tag).dma.snapshot = Some(self.dma.rx_submit_position());
            }
            ReqCode::TxDma => {
                for i in 0..dma.block_count {
                    self.dma.submit_transmit(
                        cmd_tag,
                        dma.start_index + i,
                        target,
                        dma.block_offset + i,
                    )?;
                }
                self.pool.slot_mut(tag).dma.snapshot = Some(self.dma.tx_submit_position());
            }
            _ => return Err(self.unroutable(tag)),
        }
        trace!(
            target: "weir::sched",
            tag = tag.0,
            code = %code,
            blocks = dma.block_count,
            "host DMA issued"
        );
        Ok(())
    }

    /// Scan the host-DMA queue oldest-first and reclaim every request whose
    /// transfer the engine has finished. Returns the number reclaimed.
    ///
    /// Progress is checked at most once per direction per scan; once a
    /// direction's cursor has passed a request's snapshot it has necessarily
    /// passed every older snapshot in that direction too.
    ///
    /// # Errors
    ///
    /// [`WeirError::MissingDmaSnapshot`] when a queued request was never
    /// issued. The queue is only ever fed by the issue path, so this
    /// indicates slot-state corruption.
    pub fn poll_host_dma_completions(&mut self) -> Result<usize> {
        let mut rx_done = false;
        let mut tx_done = false;
        let mut reclaimed = 0_usize;
        let mut cur = self.pool.tail(QueueId::HostDma);
        while let Some(tag) = cur {
            cur = self.pool.prev_of(tag);
            let (code, snapshot) = {
                let slot = self.pool.slot(tag);
                (slot.code, slot.dma.snapshot)
            };
            let snapshot = snapshot.ok_or(WeirError::MissingDmaSnapshot { tag: tag.0 })?;
            let done = match code {
                ReqCode::RxDma => {
                    if !rx_done {
                        rx_done = self.dma.rx_progress() >= snapshot;
                    }
                    rx_done
                }
                ReqCode::TxDma => {
                    if !tx_done {
                        tx_done = self.dma.tx_progress() >= snapshot;
                    }
                    tx_done
                }
                _ => return Err(self.unroutable(tag)),
            };
            if done {
                self.pool.detach(tag)?;
                self.pool.release(tag);
                self.release_buffer_dependents(tag)?;
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            trace!(target: "weir::sched", reclaimed, "host DMA requests reclaimed");
        }
        Ok(reclaimed)
    }

    // ── Chains ──────────────────────────────────────────────────────────────

    /// Append `tag` to the blocking chain of its buffer binding, making it
    /// wait for whatever request currently owns the entry.
    pub(crate) fn attach_to_chain(&mut self, tag: SlotTag) {
        match self.pool.slot(tag).buf {
            BufBinding::Entry(entry) => {
                if let Some(tail) = self.cache.chain_tail(entry) {
                    self.pool.chain_append(tail, tag);
                }
                self.cache.set_chain_tail(entry, Some(tag));
            }
            BufBinding::Temp(temp) => {
                if let Some(tail) = self.cache.temp_chain_tail(temp) {
                    self.pool.chain_append(tail, tag);
                }
                self.cache.set_temp_chain_tail(temp, Some(tag));
            }
            BufBinding::None => {}
        }
    }

    pub(crate) fn unroutable(&self, tag: SlotTag) -> WeirError {
        let slot = self.pool.slot(tag);
        WeirError::UnroutableRequest {
            tag: tag.0,
            kind: slot.kind.to_string(),
            code: slot.code.to_string(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// Geometry the scheduler was built with.
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The slot arena, for inspection.
    #[must_use]
    pub fn pool(&self) -> &RequestPool {
        &self.pool
    }

    pub(crate) fn pool_mut(&mut self) -> &mut RequestPool {
        &mut self.pool
    }

    /// The row-dependency table, for inspection.
    #[must_use]
    pub fn row_table(&self) -> &RowDependencyTable {
        &self.row_table
    }

    /// Per-queue occupancy snapshot.
    #[must_use]
    pub fn census(&self) -> QueueCensus {
        self.pool.census()
    }

    /// True when every slot is back in the free queue.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.pool.is_quiescent()
    }

    /// The address translator.
    #[must_use]
    pub fn translator(&self) -> &A {
        &self.translator
    }

    /// The address translator, mutably.
    pub fn translator_mut(&mut self) -> &mut A {
        &mut self.translator
    }

    /// The buffer cache.
    #[must_use]
    pub fn cache(&self) -> &B {
        &self.cache
    }

    /// The buffer cache, mutably.
    pub fn cache_mut(&mut self) -> &mut B {
        &mut self.cache
    }

    /// The host-DMA engine.
    #[must_use]
    pub fn dma(&self) -> &D {
        &self.dma
    }

    /// The host-DMA engine, mutably.
    pub fn dma_mut(&mut self) -> &mut D {
        &mut self.dma
    }

    /// The flash execution back end.
    #[must_use]
    pub fn nand_executor(&self) -> &N {
        &self.nand
    }

    /// The flash execution back end, mutably.
    pub fn nand_executor_mut(&mut self) -> &mut N {
        &mut self.nand
    }
}
