#![forbid(unsafe_code)]
//! Deterministic simulators and workload harness for the weir scheduler.
//!
//! Provides in-memory implementors of the scheduler's four collaborator
//! seams, a quiescence driver that plays the role of the completion
//! interrupt handlers, and a seeded workload generator for end-to-end and
//! stress runs. Everything here is single-threaded and reproducible: the
//! same seed yields the same command stream, the same queue transitions,
//! and the same final census.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use weir_arena::QueueCensus;
use weir_sched::{AddressTranslator, BufferCache, HostDmaEngine, NandExecutor, Scheduler};
use weir_types::{
    BlockIndex, BufBinding, BufEntryId, ChannelId, CmdTag, DieId, DmaPosition, Geometry,
    HostCommand, HostOpcode, Lba, Lsa, NandLocation, PageIndex, QueueId, SlotTag, TempEntryId,
    Vsa, WayId,
};

// ── Simulated address translator ────────────────────────────────────────────

/// Bump-allocating logical-to-physical map.
///
/// Writebacks take virtual slice addresses in submission order, which keeps
/// per-block page programming monotonic the way a sequential-allocation FTL
/// would. Virtual addresses stripe across dies first, then pages, then
/// blocks.
#[derive(Debug)]
pub struct SimTranslator {
    geometry: Geometry,
    map: BTreeMap<u64, u64>,
    next_vsa: u64,
}

impl SimTranslator {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            map: BTreeMap::new(),
            next_vsa: 0,
        }
    }

    /// Number of slices with a live mapping.
    #[must_use]
    pub fn mapped_slices(&self) -> usize {
        self.map.len()
    }

    /// Current mapping for a slice, raw.
    #[must_use]
    pub fn mapping(&self, lsa: Lsa) -> Option<Vsa> {
        self.map.get(&lsa.0).copied().map(Vsa)
    }
}

impl AddressTranslator for SimTranslator {
    fn translate_read(&self, lsa: Lsa) -> Option<Vsa> {
        self.map.get(&lsa.0).copied().map(Vsa)
    }

    fn translate_write(&mut self, lsa: Lsa) -> Vsa {
        let vsa = Vsa(self.next_vsa);
        self.next_vsa += 1;
        self.map.insert(lsa.0, vsa.0);
        vsa
    }

    // Die-interleaved striping: consecutive virtual addresses land on
    // consecutive dies, wrapping into the next page once every die has one.
    #[allow(clippy::cast_possible_truncation)]
    fn decompose(&self, vsa: Vsa) -> NandLocation {
        let dies = u64::from(self.geometry.dies());
        let die = DieId((vsa.0 % dies) as u16);
        let per_die = vsa.0 / dies;
        let page = (per_die % u64::from(self.geometry.pages_per_block)) as u32;
        let block =
            ((per_die / u64::from(self.geometry.pages_per_block)) % u64::from(self.geometry.blocks_per_die)) as u32;
        NandLocation {
            die,
            channel: self.geometry.channel_of(die),
            way: self.geometry.way_of(die),
            block: BlockIndex(block),
            page: PageIndex(page),
        }
    }
}

// ── Simulated buffer cache ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct SimBufEntry {
    lsa: Option<Lsa>,
    dirty: bool,
    chain_tail: Option<SlotTag>,
    last_use: u64,
}

/// Fixed pool of slice buffers with least-recently-used victim selection.
#[derive(Debug)]
pub struct SimBufferCache {
    entries: Vec<SimBufEntry>,
    temp_tails: BTreeMap<u16, SlotTag>,
    clock: u64,
}

impl SimBufferCache {
    #[must_use]
    pub fn new(entry_count: u16) -> Self {
        Self {
            entries: vec![SimBufEntry::default(); usize::from(entry_count)],
            temp_tails: BTreeMap::new(),
            clock: 0,
        }
    }

    fn touch(&mut self, entry: BufEntryId) {
        self.clock += 1;
        self.entries[usize::from(entry.0)].last_use = self.clock;
    }

    /// Number of dirty entries.
    #[must_use]
    pub fn dirty_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.dirty).count()
    }
}

// Entry indices are constructed from a u16 entry count.
#[allow(clippy::cast_possible_truncation)]
impl BufferCache for SimBufferCache {
    fn lookup(&mut self, lsa: Lsa) -> Option<BufEntryId> {
        let hit = self
            .entries
            .iter()
            .position(|e| e.lsa == Some(lsa))
            .map(|i| BufEntryId(i as u16));
        if let Some(entry) = hit {
            self.touch(entry);
        }
        hit
    }

    fn allocate_victim(&mut self) -> BufEntryId {
        let coldest = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_use)
            .map_or(0, |(i, _)| i);
        let victim = BufEntryId(coldest as u16);
        self.touch(victim);
        victim
    }

    fn bind(&mut self, entry: BufEntryId, lsa: Lsa) {
        self.entries[usize::from(entry.0)].lsa = Some(lsa);
        self.touch(entry);
    }

    fn slice_addr(&self, entry: BufEntryId) -> Option<Lsa> {
        self.entries[usize::from(entry.0)].lsa
    }

    fn is_dirty(&self, entry: BufEntryId) -> bool {
        self.entries[usize::from(entry.0)].dirty
    }

    fn mark_dirty(&mut self, entry: BufEntryId) {
        self.entries[usize::from(entry.0)].dirty = true;
    }

    fn mark_clean(&mut self, entry: BufEntryId) {
        self.entries[usize::from(entry.0)].dirty = false;
    }

    fn chain_tail(&self, entry: BufEntryId) -> Option<SlotTag> {
        self.entries[usize::from(entry.0)].chain_tail
    }

    fn set_chain_tail(&mut self, entry: BufEntryId, tail: Option<SlotTag>) {
        self.entries[usize::from(entry.0)].chain_tail = tail;
    }

    fn temp_chain_tail(&self, entry: TempEntryId) -> Option<SlotTag> {
        self.temp_tails.get(&entry.0).copied()
    }

    fn set_temp_chain_tail(&mut self, entry: TempEntryId, tail: Option<SlotTag>) {
        match tail {
            Some(tag) => {
                self.temp_tails.insert(entry.0, tag);
            }
            None => {
                self.temp_tails.remove(&entry.0);
            }
        }
    }
}

// ── Simulated host DMA engine ───────────────────────────────────────────────

/// One submitted DMA descriptor, recorded for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimDmaRecord {
    pub cmd_tag: CmdTag,
    pub dma_index: u16,
    pub target: BufBinding,
    pub block_in_slice: u16,
}

/// Host DMA rings backed by counters.
///
/// In auto mode the engine consumes every descriptor the moment it is
/// submitted, so a poll right after issue reclaims the request. In manual
/// mode descriptors sit until the test advances the progress cursor, which
/// is how partial-completion and reclaim-under-pressure scenarios are
/// scripted.
#[derive(Debug)]
pub struct SimDmaEngine {
    ring: u16,
    auto_complete: bool,
    rx_submitted: u64,
    tx_submitted: u64,
    rx_consumed: u64,
    tx_consumed: u64,
    rx_log: Vec<SimDmaRecord>,
    tx_log: Vec<SimDmaRecord>,
}

impl SimDmaEngine {
    #[must_use]
    pub fn new(ring: u16, auto_complete: bool) -> Self {
        Self {
            ring,
            auto_complete,
            rx_submitted: 0,
            tx_submitted: 0,
            rx_consumed: 0,
            tx_consumed: 0,
            rx_log: Vec::new(),
            tx_log: Vec::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn position(&self, count: u64) -> DmaPosition {
        DmaPosition {
            lap: (count / u64::from(self.ring)) as u32,
            index: (count % u64::from(self.ring)) as u16,
        }
    }

    /// Consume `n` more receive descriptors (manual mode).
    pub fn advance_rx(&mut self, n: u64) {
        self.rx_consumed = (self.rx_consumed + n).min(self.rx_submitted);
    }

    /// Consume `n` more transmit descriptors (manual mode).
    pub fn advance_tx(&mut self, n: u64) {
        self.tx_consumed = (self.tx_consumed + n).min(self.tx_submitted);
    }

    /// Every receive descriptor submitted so far, oldest first.
    #[must_use]
    pub fn rx_log(&self) -> &[SimDmaRecord] {
        &self.rx_log
    }

    /// Every transmit descriptor submitted so far, oldest first.
    #[must_use]
    pub fn tx_log(&self) -> &[SimDmaRecord] {
        &self.tx_log
    }
}

impl HostDmaEngine for SimDmaEngine {
    fn submit_receive(
        &mut self,
        cmd_tag: CmdTag,
        dma_index: u16,
        target: BufBinding,
        block_in_slice: u16,
    ) -> weir_error::Result<()> {
        self.rx_log.push(SimDmaRecord {
            cmd_tag,
            dma_index,
            target,
            block_in_slice,
        });
        self.rx_submitted += 1;
        if self.auto_complete {
            self.rx_consumed = self.rx_submitted;
        }
        Ok(())
    }

    fn submit_transmit(
        &mut self,
        cmd_tag: CmdTag,
        dma_index: u16,
        target: BufBinding,
        block_in_slice: u16,
    ) -> weir_error::Result<()> {
        self.tx_log.push(SimDmaRecord {
            cmd_tag,
            dma_index,
            target,
            block_in_slice,
        });
        self.tx_submitted += 1;
        if self.auto_complete {
            self.tx_consumed = self.tx_submitted;
        }
        Ok(())
    }

    fn rx_submit_position(&self) -> DmaPosition {
        self.position(self.rx_submitted)
    }

    fn tx_submit_position(&self) -> DmaPosition {
        self.position(self.tx_submitted)
    }

    fn rx_progress(&mut self) -> DmaPosition {
        self.position(self.rx_consumed)
    }

    fn tx_progress(&mut self) -> DmaPosition {
        self.position(self.tx_consumed)
    }
}

// ── Simulated flash executor ────────────────────────────────────────────────

/// Records forced synchronous erases; never fails.
#[derive(Debug, Default)]
pub struct SimNandExecutor {
    erases: Vec<(ChannelId, WayId, BlockIndex)>,
}

impl SimNandExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every forced erase in execution order.
    #[must_use]
    pub fn erases(&self) -> &[(ChannelId, WayId, BlockIndex)] {
        &self.erases
    }
}

impl NandExecutor for SimNandExecutor {
    fn erase_sync(
        &mut self,
        channel: ChannelId,
        way: WayId,
        block: BlockIndex,
    ) -> weir_error::Result<()> {
        self.erases.push((channel, way, block));
        Ok(())
    }
}

// ── Scheduler assembly ──────────────────────────────────────────────────────

/// Scheduler wired to the four simulators.
pub type SimScheduler = Scheduler<SimTranslator, SimBufferCache, SimDmaEngine, SimNandExecutor>;

/// Knobs for assembling a simulated scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub geometry: Geometry,
    /// Slice buffers in the cache.
    pub buffer_entries: u16,
    /// Descriptors per DMA ring.
    pub dma_ring: u16,
    /// Whether the DMA engine consumes descriptors as they are submitted.
    pub dma_auto_complete: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            buffer_entries: 16,
            dma_ring: 64,
            dma_auto_complete: true,
        }
    }
}

/// Assemble a scheduler over fresh simulators.
///
/// # Errors
///
/// Propagates geometry validation failures, and rejects zero-sized buffer
/// pools and DMA rings.
pub fn sim_scheduler(config: &SimConfig) -> weir_error::Result<SimScheduler> {
    if config.buffer_entries == 0 {
        return Err(weir_error::WeirError::Config(
            "buffer_entries must be nonzero".to_owned(),
        ));
    }
    if config.dma_ring == 0 {
        return Err(weir_error::WeirError::Config(
            "dma_ring must be nonzero".to_owned(),
        ));
    }
    Scheduler::new(
        config.geometry,
        SimTranslator::new(config.geometry),
        SimBufferCache::new(config.buffer_entries),
        SimDmaEngine::new(config.dma_ring, config.dma_auto_complete),
        SimNandExecutor::new(),
    )
}

// ── Quiescence driver ───────────────────────────────────────────────────────

/// What one [`run_to_quiescence`] call retired.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunStats {
    pub nand_completed: usize,
    pub dma_reclaimed: usize,
    pub rounds: usize,
}

/// Play the completion side until no queue moves.
///
/// Each round retires every dispatched flash request lane by lane, re-examines
/// the lanes' row-blocked queues, and polls host-DMA completions. Rounds
/// repeat until a full round makes no progress, which with an auto-completing
/// DMA engine means the scheduler is as drained as it can get.
///
/// # Errors
///
/// Fails if progress is still being made after `max_rounds` rounds, and
/// propagates any scheduler error.
pub fn run_to_quiescence(sched: &mut SimScheduler, max_rounds: usize) -> Result<RunStats> {
    let mut stats = RunStats::default();
    let channels = sched.geometry().channels;
    let ways = sched.geometry().ways;

    loop {
        let mut progressed = false;
        for ch in 0..channels {
            for way in 0..ways {
                let channel = ChannelId(ch);
                let way = WayId(way);
                while sched.pool().queue_len(QueueId::Nand { channel, way }) > 0 {
                    sched.complete_nand_head(channel, way)?;
                    stats.nand_completed += 1;
                    progressed = true;
                }
                sched.release_row_dependents(channel, way)?;
                if sched.pool().queue_len(QueueId::Nand { channel, way }) > 0 {
                    progressed = true;
                }
            }
        }
        let reclaimed = sched.poll_host_dma_completions()?;
        stats.dma_reclaimed += reclaimed;
        if reclaimed > 0 {
            progressed = true;
        }

        stats.rounds += 1;
        if !progressed {
            return Ok(stats);
        }
        if stats.rounds >= max_rounds {
            bail!("no quiescence after {max_rounds} rounds (census: {:?})", sched.census());
        }
    }
}

// ── Deterministic workload generation ───────────────────────────────────────

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn below(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive <= 1 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }
}

/// Config for a seeded mixed read/write run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Commands to generate.
    pub command_count: u32,
    /// Seed for the command stream.
    pub seed: u64,
    /// Upper bound on blocks per command.
    pub max_blocks_per_command: u16,
    /// Commands are spread over `[0, lba_span)`.
    pub lba_span: u64,
    /// Run the completion side after every N commands.
    pub completion_interval: u32,
    pub sim: SimConfig,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            command_count: 512,
            seed: 0x5EED_0F1A_5000_0001,
            max_blocks_per_command: 32,
            lba_span: 4096,
            completion_interval: 1,
            sim: SimConfig::default(),
        }
    }
}

/// Aggregate result of a workload run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub commands: u32,
    pub reads: u32,
    pub writes: u32,
    pub partial_writes: u32,
    pub slices: usize,
    pub nand_completed: usize,
    pub dma_reclaimed: usize,
    pub forced_erases: usize,
    pub mapped_slices: usize,
    pub quiescent: bool,
    pub final_census: QueueCensus,
}

/// Generate `config.command_count` commands, feed them through the scheduler,
/// and drain everything.
///
/// # Errors
///
/// Propagates scheduler errors and a failure to reach quiescence at the end.
// Block counts are generated inside u16 range; command tags wrap at u16.
#[allow(clippy::cast_possible_truncation)]
pub fn run_workload(config: &WorkloadConfig) -> Result<WorkloadReport> {
    let mut sched = sim_scheduler(&config.sim)?;
    let mut rng = DeterministicRng::new(config.seed);

    let mut reads = 0_u32;
    let mut writes = 0_u32;
    let mut partial_writes = 0_u32;
    let mut slices = 0_usize;
    let mut nand_completed = 0_usize;
    let mut dma_reclaimed = 0_usize;

    for i in 0..config.command_count {
        let opcode = match rng.below(4) {
            0 | 1 => HostOpcode::Write,
            2 => HostOpcode::Read,
            _ => HostOpcode::PartialWrite,
        };
        match opcode {
            HostOpcode::Read => reads += 1,
            HostOpcode::Write => writes += 1,
            HostOpcode::PartialWrite => partial_writes += 1,
        }
        let block_count = 1 + rng.below(u64::from(config.max_blocks_per_command)) as u32;
        let start_lba = Lba(rng.below(config.lba_span.saturating_sub(u64::from(block_count)).max(1)));
        let cmd = HostCommand {
            cmd_tag: CmdTag(i as u16),
            start_lba,
            block_count,
            opcode,
        };

        sched.split_host_command(cmd)?;
        slices += sched.pool().queue_len(QueueId::Slice);
        sched.drain_slice_queue()?;

        if config.completion_interval > 0 && i % config.completion_interval == 0 {
            let stats = run_to_quiescence(&mut sched, 64)?;
            nand_completed += stats.nand_completed;
            dma_reclaimed += stats.dma_reclaimed;
        }
    }

    let stats = run_to_quiescence(&mut sched, 256)?;
    nand_completed += stats.nand_completed;
    dma_reclaimed += stats.dma_reclaimed;

    Ok(WorkloadReport {
        commands: config.command_count,
        reads,
        writes,
        partial_writes,
        slices,
        nand_completed,
        dma_reclaimed,
        forced_erases: sched.nand_executor().erases().len(),
        mapped_slices: sched.translator().mapped_slices(),
        quiescent: sched.is_quiescent(),
        final_census: sched.census(),
    })
}
