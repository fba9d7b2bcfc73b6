#![forbid(unsafe_code)]
//! Fixed request-slot arena and the index-linked queues layered over it.
//!
//! Every request in flight occupies one [`RequestSlot`] in a pool sized once
//! at construction. Queues never own slots; they are doubly linked lists of
//! slot indices threaded through the slots themselves, so moving a request
//! between queues is a handful of index writes and never allocates.
//!
//! ## Invariants
//!
//! - A slot is a member of exactly one queue at any time, or of none only
//!   between a `detach`/`pop_head` and the following `push` within a single
//!   dispatch step.
//! - The per-queue lengths always sum to the pool capacity plus the number of
//!   currently detached slots; with no slots detached,
//!   [`QueueCensus::total`] equals [`RequestPool::capacity`].
//! - The blocking chain (`chain_prev`/`chain_next`) is a second, disjoint
//!   intrusive list used for buffer-entry ordering. Queue membership and
//!   chain membership are independent.
//!
//! Two running counters support quiescence checks without walking queues:
//! the number of dependency-blocked requests (buffer-blocked plus all
//! row-blocked queues) and the number of outstanding flash requests (all
//! per-channel/way ready queues).

use serde::Serialize;
use tracing::trace;
use weir_error::{Result, WeirError};
use weir_types::{
    BufBinding, ChannelId, CmdTag, DmaState, Lsa, NandTarget, QueueId, ReqCode, ReqKind,
    ReqOptions, SlotTag, WayId,
};

// ── Request slot ────────────────────────────────────────────────────────────

/// One arena slot: queue linkage, blocking-chain linkage, and the request
/// payload describing what the slot currently carries.
#[derive(Debug, Clone)]
pub struct RequestSlot {
    queue: Option<QueueId>,
    link_prev: Option<SlotTag>,
    link_next: Option<SlotTag>,
    chain_prev: Option<SlotTag>,
    chain_next: Option<SlotTag>,

    pub kind: ReqKind,
    pub code: ReqCode,
    pub cmd_tag: CmdTag,
    pub lsa: Option<Lsa>,
    pub opts: ReqOptions,
    pub buf: BufBinding,
    pub nand: NandTarget,
    pub dma: DmaState,
}

impl RequestSlot {
    fn vacant() -> Self {
        Self {
            queue: None,
            link_prev: None,
            link_next: None,
            chain_prev: None,
            chain_next: None,
            kind: ReqKind::Slice,
            code: ReqCode::Read,
            cmd_tag: CmdTag(0),
            lsa: None,
            opts: ReqOptions::default(),
            buf: BufBinding::None,
            nand: NandTarget::default(),
            dma: DmaState::default(),
        }
    }

    fn reset(&mut self) {
        self.chain_prev = None;
        self.chain_next = None;
        self.kind = ReqKind::Slice;
        self.code = ReqCode::Read;
        self.cmd_tag = CmdTag(0);
        self.lsa = None;
        self.opts = ReqOptions::default();
        self.buf = BufBinding::None;
        self.nand = NandTarget::default();
        self.dma = DmaState::default();
    }

    /// Queue this slot currently belongs to, if any.
    #[must_use]
    pub fn queue(&self) -> Option<QueueId> {
        self.queue
    }

    /// Earlier request on the same buffer entry that has not completed yet.
    #[must_use]
    pub fn chain_prev(&self) -> Option<SlotTag> {
        self.chain_prev
    }

    /// Later request waiting on this one for the same buffer entry.
    #[must_use]
    pub fn chain_next(&self) -> Option<SlotTag> {
        self.chain_next
    }
}

// ── Queue storage ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct QueueCore {
    head: Option<SlotTag>,
    tail: Option<SlotTag>,
    len: usize,
}

/// Per-queue population snapshot; sums to the capacity when no slot is
/// mid-transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueCensus {
    pub free: usize,
    pub slice: usize,
    pub buf_blocked: usize,
    pub row_blocked: usize,
    pub host_dma: usize,
    pub nand: usize,
}

impl QueueCensus {
    #[must_use]
    pub fn total(&self) -> usize {
        self.free + self.slice + self.buf_blocked + self.row_blocked + self.host_dma + self.nand
    }
}

// ── Request pool ────────────────────────────────────────────────────────────

/// Fixed arena of request slots plus every queue the scheduler moves them
/// through.
#[derive(Debug)]
pub struct RequestPool {
    slots: Vec<RequestSlot>,
    ways: u8,
    free: QueueCore,
    slice: QueueCore,
    buf_blocked: QueueCore,
    host_dma: QueueCore,
    row_blocked: Vec<QueueCore>,
    nand: Vec<QueueCore>,
    blocked: usize,
    nand_outstanding: usize,
}

impl RequestPool {
    /// Build a pool of `slot_count` slots with one row-blocked and one ready
    /// queue per `(channel, way)` pair. The free queue starts holding every
    /// slot, linked in index order.
    #[must_use]
    pub fn new(slot_count: u16, channels: u8, ways: u8) -> Self {
        let n = usize::from(slot_count);
        let mut slots = Vec::with_capacity(n);
        for i in 0..slot_count {
            let mut slot = RequestSlot::vacant();
            slot.queue = Some(QueueId::Free);
            slot.link_prev = i.checked_sub(1).map(SlotTag);
            slot.link_next = if i + 1 < slot_count {
                Some(SlotTag(i + 1))
            } else {
                None
            };
            slots.push(slot);
        }

        let free = if slot_count == 0 {
            QueueCore::default()
        } else {
            QueueCore {
                head: Some(SlotTag(0)),
                tail: Some(SlotTag(slot_count - 1)),
                len: n,
            }
        };

        let lanes = usize::from(channels) * usize::from(ways);
        Self {
            slots,
            ways,
            free,
            slice: QueueCore::default(),
            buf_blocked: QueueCore::default(),
            host_dma: QueueCore::default(),
            row_blocked: vec![QueueCore::default(); lanes],
            nand: vec![QueueCore::default(); lanes],
            blocked: 0,
            nand_outstanding: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn lane(&self, channel: ChannelId, way: WayId) -> usize {
        usize::from(channel.0) * usize::from(self.ways) + usize::from(way.0)
    }

    fn core(&self, queue: QueueId) -> &QueueCore {
        match queue {
            QueueId::Free => &self.free,
            QueueId::Slice => &self.slice,
            QueueId::BufBlocked => &self.buf_blocked,
            QueueId::HostDma => &self.host_dma,
            QueueId::RowBlocked { channel, way } => &self.row_blocked[self.lane(channel, way)],
            QueueId::Nand { channel, way } => &self.nand[self.lane(channel, way)],
        }
    }

    fn core_mut(&mut self, queue: QueueId) -> &mut QueueCore {
        match queue {
            QueueId::Free => &mut self.free,
            QueueId::Slice => &mut self.slice,
            QueueId::BufBlocked => &mut self.buf_blocked,
            QueueId::HostDma => &mut self.host_dma,
            QueueId::RowBlocked { channel, way } => {
                let lane = self.lane(channel, way);
                &mut self.row_blocked[lane]
            }
            QueueId::Nand { channel, way } => {
                let lane = self.lane(channel, way);
                &mut self.nand[lane]
            }
        }
    }

    fn note_entered(&mut self, queue: QueueId) {
        match queue {
            QueueId::BufBlocked | QueueId::RowBlocked { .. } => self.blocked += 1,
            QueueId::Nand { .. } => self.nand_outstanding += 1,
            _ => {}
        }
    }

    fn note_left(&mut self, queue: QueueId) {
        match queue {
            QueueId::BufBlocked | QueueId::RowBlocked { .. } => self.blocked -= 1,
            QueueId::Nand { .. } => self.nand_outstanding -= 1,
            _ => {}
        }
    }

    // ── Queue operations ────────────────────────────────────────────────────

    /// Append `tag` to the tail of `queue`. The slot must not currently be a
    /// member of any queue.
    pub fn push(&mut self, queue: QueueId, tag: SlotTag) {
        debug_assert!(
            self.slots[tag.index()].queue.is_none(),
            "slot {tag} pushed while still queued"
        );
        let old_tail = self.core(queue).tail;
        {
            let slot = &mut self.slots[tag.index()];
            slot.link_prev = old_tail;
            slot.link_next = None;
            slot.queue = Some(queue);
        }
        if let Some(prev) = old_tail {
            self.slots[prev.index()].link_next = Some(tag);
        }
        let core = self.core_mut(queue);
        core.tail = Some(tag);
        if core.head.is_none() {
            core.head = Some(tag);
        }
        core.len += 1;
        self.note_entered(queue);
        trace!(target: "weir::arena", tag = tag.0, queue = %queue, "enqueue");
    }

    /// Remove `tag` from whichever queue owns it, patching head/tail as
    /// needed, and return that queue.
    pub fn detach(&mut self, tag: SlotTag) -> Result<QueueId> {
        let (queue, prev, next) = {
            let slot = &self.slots[tag.index()];
            let queue = slot.queue.ok_or(WeirError::SlotNotQueued { tag: tag.0 })?;
            (queue, slot.link_prev, slot.link_next)
        };

        match prev {
            Some(p) => self.slots[p.index()].link_next = next,
            None => self.core_mut(queue).head = next,
        }
        match next {
            Some(n) => self.slots[n.index()].link_prev = prev,
            None => self.core_mut(queue).tail = prev,
        }
        {
            let slot = &mut self.slots[tag.index()];
            slot.queue = None;
            slot.link_prev = None;
            slot.link_next = None;
        }
        self.core_mut(queue).len -= 1;
        self.note_left(queue);
        trace!(target: "weir::arena", tag = tag.0, queue = %queue, "dequeue");
        Ok(queue)
    }

    /// Remove and return the head of `queue`, if any.
    pub fn pop_head(&mut self, queue: QueueId) -> Option<SlotTag> {
        let tag = self.core(queue).head?;
        self.detach(tag).ok()?;
        Some(tag)
    }

    /// Take a slot from the free queue and wipe its payload for reuse.
    /// Returns `None` when every slot is in flight.
    pub fn try_allocate(&mut self) -> Option<SlotTag> {
        let tag = self.pop_head(QueueId::Free)?;
        self.slots[tag.index()].reset();
        Some(tag)
    }

    /// Return a detached slot to the free queue.
    ///
    /// Blocking-chain linkage is left intact: completion paths free the slot
    /// first and walk its chain successor afterwards. The links are wiped on
    /// the next [`try_allocate`](Self::try_allocate).
    pub fn release(&mut self, tag: SlotTag) {
        self.push(QueueId::Free, tag);
    }

    // ── Blocking chain ──────────────────────────────────────────────────────

    /// Link `new` behind `tail` on a buffer entry's blocking chain.
    pub fn chain_append(&mut self, tail: SlotTag, new: SlotTag) {
        self.slots[new.index()].chain_prev = Some(tail);
        self.slots[tail.index()].chain_next = Some(new);
    }

    /// Whether an earlier request on the same buffer entry is still in
    /// flight.
    #[must_use]
    pub fn chain_is_blocked(&self, tag: SlotTag) -> bool {
        self.slots[tag.index()].chain_prev.is_some()
    }

    /// Unlink `tag` from its blocking chain on completion and hand back the
    /// successor that was waiting on it, now unblocked.
    pub fn chain_take_successor(&mut self, tag: SlotTag) -> Option<SlotTag> {
        let next = self.slots[tag.index()].chain_next.take()?;
        self.slots[next.index()].chain_prev = None;
        Some(next)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn slot(&self, tag: SlotTag) -> &RequestSlot {
        &self.slots[tag.index()]
    }

    pub fn slot_mut(&mut self, tag: SlotTag) -> &mut RequestSlot {
        &mut self.slots[tag.index()]
    }

    #[must_use]
    pub fn head(&self, queue: QueueId) -> Option<SlotTag> {
        self.core(queue).head
    }

    #[must_use]
    pub fn tail(&self, queue: QueueId) -> Option<SlotTag> {
        self.core(queue).tail
    }

    #[must_use]
    pub fn queue_len(&self, queue: QueueId) -> usize {
        self.core(queue).len
    }

    /// Next member toward the tail of the queue `tag` belongs to.
    #[must_use]
    pub fn next_of(&self, tag: SlotTag) -> Option<SlotTag> {
        self.slots[tag.index()].link_next
    }

    /// Previous member toward the head of the queue `tag` belongs to.
    #[must_use]
    pub fn prev_of(&self, tag: SlotTag) -> Option<SlotTag> {
        self.slots[tag.index()].link_prev
    }

    /// Requests parked behind a buffer or row dependency.
    #[must_use]
    pub fn blocked_requests(&self) -> usize {
        self.blocked
    }

    /// Requests sitting in per-channel/way ready queues awaiting flash
    /// execution.
    #[must_use]
    pub fn outstanding_nand(&self) -> usize {
        self.nand_outstanding
    }

    #[must_use]
    pub fn census(&self) -> QueueCensus {
        QueueCensus {
            free: self.free.len,
            slice: self.slice.len,
            buf_blocked: self.buf_blocked.len,
            row_blocked: self.row_blocked.iter().map(|q| q.len).sum(),
            host_dma: self.host_dma.len,
            nand: self.nand.iter().map(|q| q.len).sum(),
        }
    }

    /// True when every slot is back in the free queue.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.free.len == self.capacity()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    fn small_pool() -> RequestPool {
        RequestPool::new(8, 2, 1)
    }

    fn nand00() -> QueueId {
        QueueId::Nand {
            channel: ChannelId(0),
            way: WayId(0),
        }
    }

    fn row10() -> QueueId {
        QueueId::RowBlocked {
            channel: ChannelId(1),
            way: WayId(0),
        }
    }

    fn walk(pool: &RequestPool, queue: QueueId) -> Vec<u16> {
        let mut out = Vec::new();
        let mut cur = pool.head(queue);
        while let Some(tag) = cur {
            out.push(tag.0);
            cur = pool.next_of(tag);
        }
        out
    }

    fn walk_back(pool: &RequestPool, queue: QueueId) -> Vec<u16> {
        let mut out = Vec::new();
        let mut cur = pool.tail(queue);
        while let Some(tag) = cur {
            out.push(tag.0);
            cur = pool.prev_of(tag);
        }
        out.reverse();
        out
    }

    #[test]
    fn free_queue_starts_in_index_order() {
        let mut pool = small_pool();
        assert_eq!(pool.queue_len(QueueId::Free), 8);
        for expected in 0..8_u16 {
            assert_eq!(pool.try_allocate(), Some(SlotTag(expected)));
        }
        assert_eq!(pool.try_allocate(), None);
    }

    #[test]
    fn release_appends_to_free_tail() {
        let mut pool = small_pool();
        let mut tags = Vec::new();
        while let Some(tag) = pool.try_allocate() {
            tags.push(tag);
        }
        pool.release(tags[5]);
        pool.release(tags[1]);
        assert_eq!(pool.try_allocate(), Some(SlotTag(5)));
        assert_eq!(pool.try_allocate(), Some(SlotTag(1)));
    }

    #[test]
    fn push_and_pop_are_fifo() {
        let mut pool = small_pool();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        let c = pool.try_allocate().unwrap();
        pool.push(QueueId::Slice, a);
        pool.push(QueueId::Slice, b);
        pool.push(QueueId::Slice, c);
        assert_eq!(walk(&pool, QueueId::Slice), vec![0, 1, 2]);
        assert_eq!(pool.pop_head(QueueId::Slice), Some(a));
        assert_eq!(pool.pop_head(QueueId::Slice), Some(b));
        assert_eq!(pool.pop_head(QueueId::Slice), Some(c));
        assert_eq!(pool.pop_head(QueueId::Slice), None);
    }

    #[test]
    fn detach_patches_middle_head_and_tail() {
        let mut pool = small_pool();
        let tags: Vec<_> = (0..4).map(|_| pool.try_allocate().unwrap()).collect();
        for &tag in &tags {
            pool.push(QueueId::HostDma, tag);
        }

        // Middle member.
        assert_eq!(pool.detach(tags[1]).unwrap(), QueueId::HostDma);
        assert_eq!(walk(&pool, QueueId::HostDma), vec![0, 2, 3]);
        assert_eq!(walk_back(&pool, QueueId::HostDma), vec![0, 2, 3]);

        // Head member.
        assert_eq!(pool.detach(tags[0]).unwrap(), QueueId::HostDma);
        assert_eq!(walk(&pool, QueueId::HostDma), vec![2, 3]);

        // Tail member.
        assert_eq!(pool.detach(tags[3]).unwrap(), QueueId::HostDma);
        assert_eq!(walk(&pool, QueueId::HostDma), vec![2]);
        assert_eq!(pool.head(QueueId::HostDma), pool.tail(QueueId::HostDma));

        assert_eq!(pool.detach(tags[2]).unwrap(), QueueId::HostDma);
        assert_eq!(pool.head(QueueId::HostDma), None);
        assert_eq!(pool.tail(QueueId::HostDma), None);
    }

    #[test]
    fn detach_unqueued_slot_is_an_error() {
        let mut pool = small_pool();
        let tag = pool.try_allocate().unwrap();
        assert_eq!(
            pool.detach(tag),
            Err(WeirError::SlotNotQueued { tag: tag.0 })
        );
    }

    #[test]
    fn blocked_and_nand_counters_track_membership() {
        let mut pool = small_pool();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        let c = pool.try_allocate().unwrap();

        pool.push(QueueId::BufBlocked, a);
        pool.push(row10(), b);
        pool.push(nand00(), c);
        assert_eq!(pool.blocked_requests(), 2);
        assert_eq!(pool.outstanding_nand(), 1);

        pool.detach(a).unwrap();
        assert_eq!(pool.blocked_requests(), 1);
        pool.detach(b).unwrap();
        assert_eq!(pool.blocked_requests(), 0);
        pool.detach(c).unwrap();
        assert_eq!(pool.outstanding_nand(), 0);
    }

    #[test]
    fn census_conserves_capacity() {
        let mut pool = small_pool();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        pool.push(QueueId::Slice, a);
        pool.push(nand00(), b);
        let census = pool.census();
        assert_eq!(census.total(), pool.capacity());
        assert_eq!(census.free, 6);
        assert_eq!(census.slice, 1);
        assert_eq!(census.nand, 1);
        assert!(!pool.is_quiescent());

        pool.detach(a).unwrap();
        pool.release(a);
        pool.detach(b).unwrap();
        pool.release(b);
        assert!(pool.is_quiescent());
    }

    #[test]
    fn chain_append_and_take_successor() {
        let mut pool = small_pool();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        let c = pool.try_allocate().unwrap();

        pool.chain_append(a, b);
        pool.chain_append(b, c);
        assert!(!pool.chain_is_blocked(a));
        assert!(pool.chain_is_blocked(b));
        assert!(pool.chain_is_blocked(c));

        assert_eq!(pool.chain_take_successor(a), Some(b));
        assert!(!pool.chain_is_blocked(b));
        assert_eq!(pool.slot(a).chain_next(), None);

        assert_eq!(pool.chain_take_successor(b), Some(c));
        assert!(!pool.chain_is_blocked(c));
        assert_eq!(pool.chain_take_successor(c), None);
    }

    #[test]
    fn chain_successor_survives_release() {
        // Completion paths free the finished slot before walking its chain.
        let mut pool = small_pool();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        pool.chain_append(a, b);
        pool.push(nand00(), a);

        pool.detach(a).unwrap();
        pool.release(a);
        assert_eq!(pool.chain_take_successor(a), Some(b));
        assert!(!pool.chain_is_blocked(b));
        assert_eq!(pool.slot(a).chain_next(), None);
    }

    #[test]
    fn chain_survives_queue_moves() {
        // Queue membership and chain membership are independent lists.
        let mut pool = small_pool();
        let a = pool.try_allocate().unwrap();
        let b = pool.try_allocate().unwrap();
        pool.chain_append(a, b);
        pool.push(nand00(), a);
        pool.push(QueueId::BufBlocked, b);

        pool.detach(a).unwrap();
        assert!(pool.chain_is_blocked(b));
        assert_eq!(pool.chain_take_successor(a), Some(b));
        assert_eq!(pool.detach(b).unwrap(), QueueId::BufBlocked);
    }

    // ── Reference-model property test ───────────────────────────────────

    const MODEL_QUEUES: [QueueId; 7] = [
        QueueId::Slice,
        QueueId::BufBlocked,
        QueueId::HostDma,
        QueueId::RowBlocked {
            channel: ChannelId(0),
            way: WayId(0),
        },
        QueueId::RowBlocked {
            channel: ChannelId(1),
            way: WayId(0),
        },
        QueueId::Nand {
            channel: ChannelId(0),
            way: WayId(0),
        },
        QueueId::Nand {
            channel: ChannelId(1),
            way: WayId(0),
        },
    ];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn random_queue_ops_match_reference_model(
            ops in proptest::collection::vec((0_u8..5, 0_u16..64, 0_u16..64), 1..300),
        ) {
            const CAPACITY: u16 = 24;
            let mut pool = RequestPool::new(CAPACITY, 2, 1);
            let mut free_model: VecDeque<u16> = (0..CAPACITY).collect();
            let mut queue_model: Vec<VecDeque<u16>> =
                vec![VecDeque::new(); MODEL_QUEUES.len()];
            let mut loose: Vec<u16> = Vec::new();

            for (op, a, b) in ops {
                match op {
                    // Allocate from the free queue.
                    0 => {
                        let got = pool.try_allocate().map(|t| t.0);
                        prop_assert_eq!(got, free_model.pop_front());
                        if let Some(tag) = got {
                            loose.push(tag);
                        }
                    }
                    // Park a loose slot on some queue.
                    1 => {
                        if loose.is_empty() {
                            continue;
                        }
                        let tag = loose.swap_remove(usize::from(a) % loose.len());
                        let qi = usize::from(b) % MODEL_QUEUES.len();
                        pool.push(MODEL_QUEUES[qi], SlotTag(tag));
                        queue_model[qi].push_back(tag);
                    }
                    // Pop the head of some queue.
                    2 => {
                        let qi = usize::from(a) % MODEL_QUEUES.len();
                        let got = pool.pop_head(MODEL_QUEUES[qi]).map(|t| t.0);
                        prop_assert_eq!(got, queue_model[qi].pop_front());
                        if let Some(tag) = got {
                            loose.push(tag);
                        }
                    }
                    // Detach an arbitrary member of some queue.
                    3 => {
                        let qi = usize::from(a) % MODEL_QUEUES.len();
                        if queue_model[qi].is_empty() {
                            continue;
                        }
                        let pos = usize::from(b) % queue_model[qi].len();
                        let tag = queue_model[qi].remove(pos).unwrap();
                        prop_assert_eq!(pool.detach(SlotTag(tag)).unwrap(), MODEL_QUEUES[qi]);
                        loose.push(tag);
                    }
                    // Release a loose slot back to the free queue.
                    _ => {
                        if loose.is_empty() {
                            continue;
                        }
                        let tag = loose.swap_remove(usize::from(a) % loose.len());
                        pool.release(SlotTag(tag));
                        free_model.push_back(tag);
                    }
                }

                // Conservation: every slot is in exactly one place.
                let census = pool.census();
                prop_assert_eq!(
                    census.total() + loose.len(),
                    usize::from(CAPACITY),
                );
                prop_assert_eq!(census.free, free_model.len());
                prop_assert_eq!(
                    pool.blocked_requests(),
                    queue_model[1].len() + queue_model[3].len() + queue_model[4].len(),
                );
                prop_assert_eq!(
                    pool.outstanding_nand(),
                    queue_model[5].len() + queue_model[6].len(),
                );
            }

            // Every queue matches the model in both directions.
            for (qi, queue) in MODEL_QUEUES.iter().enumerate() {
                let expected: Vec<u16> = queue_model[qi].iter().copied().collect();
                prop_assert_eq!(&walk(&pool, *queue), &expected);
                prop_assert_eq!(&walk_back(&pool, *queue), &expected);
                prop_assert_eq!(pool.queue_len(*queue), expected.len());
            }
        }
    }
}
