#![forbid(unsafe_code)]

//! Shared vocabulary types for the weir request scheduler.
//!
//! Everything here is a plain value type: tag/index newtypes that prevent
//! mixing the many small integers flowing through the scheduler (slot tags,
//! command tags, slice addresses, flash coordinates), the request descriptor
//! enums, and the validated [`Geometry`] configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── Tag and address newtypes ────────────────────────────────────────────────

/// Index of a request slot in the fixed arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotTag(pub u16);

impl SlotTag {
    /// Widen to a `Vec` index.
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Host command slot tag (one per outstanding host command).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CmdTag(pub u16);

/// Host logical block address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lba(pub u64);

/// Logical slice address: host LBA range divided down to cache granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsa(pub u64);

/// Virtual slice address: the translated, physical-side slice identity.
///
/// Consecutive values stripe across dies; see [`Geometry`] for the
/// decomposition helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vsa(pub u64);

/// Flash channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u8);

/// Way (chip-enable) number within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WayId(pub u8);

/// Die number in the channel-interleaved numbering (`way * channels + channel`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DieId(pub u16);

/// Flash block index within a die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockIndex(pub u32);

/// Page index within a flash block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageIndex(pub u32);

/// Data buffer entry index in the buffer cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BufEntryId(pub u16);

/// Temporary (out-of-cache) buffer entry index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TempEntryId(pub u16);

/// Fully resolved flash coordinates of one slice-sized page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NandLocation {
    pub die: DieId,
    pub channel: ChannelId,
    pub way: WayId,
    pub block: BlockIndex,
    pub page: PageIndex,
}

// ── Request descriptor model ────────────────────────────────────────────────

/// Coarse request class, deciding which dispatch path applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReqKind {
    /// Host command fragment at cache granularity, not yet resolved to a
    /// buffer entry.
    Slice,
    /// Flash operation (read, program, or erase).
    Nand,
    /// Host-side DMA transfer into or out of a buffer entry.
    HostDma,
}

/// Operation carried by a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReqCode {
    Read,
    Write,
    /// Host write that never covers a whole slice; always merged with flash
    /// contents on a cache miss.
    PartialWrite,
    Erase,
    /// Host-to-device DMA (host write data landing in a buffer entry).
    RxDma,
    /// Device-to-host DMA (read data leaving a buffer entry).
    TxDma,
}

/// Identity of the queue that owns a request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueId {
    Free,
    Slice,
    /// Waiting for an earlier request on the same buffer entry.
    BufBlocked,
    /// Waiting for row-address ordering on this channel/way.
    RowBlocked { channel: ChannelId, way: WayId },
    /// Ready for the flash execution layer on this channel/way.
    Nand { channel: ChannelId, way: WayId },
    HostDma,
}

/// Which buffer a request reads or writes, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufBinding {
    #[default]
    None,
    Entry(BufEntryId),
    Temp(TempEntryId),
}

/// Flash address in the form the submitter provided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandAddr {
    /// Virtual slice address; decomposed through the translator at dispatch.
    Vsa(Vsa),
    /// Pre-resolved physical coordinates.
    Physical(NandLocation),
}

/// Flash-side target of a NAND request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NandTarget {
    pub addr: Option<NandAddr>,
    /// For erase requests: pages the submitter expects to be programmed in
    /// the target block before the erase may proceed.
    pub programmed_page_count: u32,
}

/// Which portion of a block a physical operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlockSpace {
    /// User-visible capacity only.
    #[default]
    Main,
    /// Main plus extended (spare) capacity.
    Total,
}

/// Per-request knobs recorded at submission and honored at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReqOptions {
    pub ecc: bool,
    pub ecc_warning: bool,
    /// Whether the request participates in row-address ordering.
    pub row_check: bool,
    pub block_space: BlockSpace,
}

/// Position in a host DMA submission FIFO: overflow lap plus ring index.
///
/// The derived ordering is lexicographic `(lap, index)`, which is exactly the
/// wraparound-safe comparison the completion scan needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DmaPosition {
    pub lap: u32,
    pub index: u16,
}

/// Host DMA bookkeeping carried by a slice/DMA request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaState {
    /// Descriptor index of this fragment's first host block within the
    /// command transfer.
    pub start_index: u16,
    /// Host-block offset of the fragment inside its slice.
    pub block_offset: u16,
    /// Host blocks covered by the fragment.
    pub block_count: u16,
    /// Submission-FIFO position recorded when the transfer was issued.
    /// All of the request's descriptors sit strictly before this position.
    pub snapshot: Option<DmaPosition>,
}

// ── Host command surface ────────────────────────────────────────────────────

/// Host command opcode subset the scheduler transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostOpcode {
    Read,
    Write,
    PartialWrite,
}

/// One admitted host I/O command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCommand {
    pub cmd_tag: CmdTag,
    pub start_lba: Lba,
    /// Host blocks to transfer; must be nonzero.
    pub block_count: u32,
    pub opcode: HostOpcode,
}

// ── Geometry ────────────────────────────────────────────────────────────────

/// Invalid [`Geometry`] field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("geometry field `{field}` must be nonzero")]
    ZeroField { field: &'static str },
}

/// Static shape of the device the scheduler serves.
///
/// Validated once via [`Geometry::validate`]; every table and queue grid is
/// sized from these fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub channels: u8,
    pub ways: u8,
    pub blocks_per_die: u32,
    pub pages_per_block: u32,
    /// Host blocks per slice; the buffer-cache granularity.
    pub host_blocks_per_slice: u16,
    /// Request arena capacity.
    pub request_slots: u16,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            channels: 8,
            ways: 8,
            blocks_per_die: 4096,
            pages_per_block: 256,
            host_blocks_per_slice: 4,
            request_slots: 128,
        }
    }
}

impl Geometry {
    /// Check that every field is usable; all other methods assume this passed.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.channels == 0 {
            return Err(GeometryError::ZeroField { field: "channels" });
        }
        if self.ways == 0 {
            return Err(GeometryError::ZeroField { field: "ways" });
        }
        if self.blocks_per_die == 0 {
            return Err(GeometryError::ZeroField {
                field: "blocks_per_die",
            });
        }
        if self.pages_per_block == 0 {
            return Err(GeometryError::ZeroField {
                field: "pages_per_block",
            });
        }
        if self.host_blocks_per_slice == 0 {
            return Err(GeometryError::ZeroField {
                field: "host_blocks_per_slice",
            });
        }
        if self.request_slots == 0 {
            return Err(GeometryError::ZeroField {
                field: "request_slots",
            });
        }
        Ok(())
    }

    /// Total dies across all channels and ways.
    #[must_use]
    pub fn dies(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.ways)
    }

    /// Die number for a channel/way pair in the interleaved numbering.
    #[must_use]
    pub fn die_of(&self, channel: ChannelId, way: WayId) -> DieId {
        DieId(u16::from(way.0) * u16::from(self.channels) + u16::from(channel.0))
    }

    /// Channel component of a die number.
    #[must_use]
    pub fn channel_of(&self, die: DieId) -> ChannelId {
        ChannelId((die.0 % u16::from(self.channels)) as u8)
    }

    /// Way component of a die number.
    #[must_use]
    pub fn way_of(&self, die: DieId) -> WayId {
        WayId((die.0 / u16::from(self.channels)) as u8)
    }

    /// Slices addressable in the main block space.
    #[must_use]
    pub fn main_slices(&self) -> u64 {
        u64::from(self.dies()) * u64::from(self.blocks_per_die) * u64::from(self.pages_per_block)
    }
}

// ── Display impls ───────────────────────────────────────────────────────────

impl fmt::Display for SlotTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CmdTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Lba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Lsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Vsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BufEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TempEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DmaPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lap, self.index)
    }
}

impl fmt::Display for ReqKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReqKind::Slice => "slice",
            ReqKind::Nand => "nand",
            ReqKind::HostDma => "host-dma",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ReqCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReqCode::Read => "read",
            ReqCode::Write => "write",
            ReqCode::PartialWrite => "partial-write",
            ReqCode::Erase => "erase",
            ReqCode::RxDma => "rx-dma",
            ReqCode::TxDma => "tx-dma",
        };
        f.write_str(name)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueId::Free => f.write_str("free"),
            QueueId::Slice => f.write_str("slice"),
            QueueId::BufBlocked => f.write_str("buf-blocked"),
            QueueId::RowBlocked { channel, way } => {
                write!(f, "row-blocked({channel},{way})")
            }
            QueueId::Nand { channel, way } => write!(f, "nand({channel},{way})"),
            QueueId::HostDma => f.write_str("host-dma"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_default_is_valid() {
        assert!(Geometry::default().validate().is_ok());
    }

    #[test]
    fn test_geometry_rejects_zero_fields() {
        let mut g = Geometry::default();
        g.channels = 0;
        assert_eq!(
            g.validate(),
            Err(GeometryError::ZeroField { field: "channels" })
        );

        let mut g = Geometry::default();
        g.host_blocks_per_slice = 0;
        assert!(g.validate().is_err());

        let mut g = Geometry::default();
        g.request_slots = 0;
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_die_numbering_round_trip() {
        let g = Geometry {
            channels: 8,
            ways: 4,
            ..Geometry::default()
        };
        for way in 0..g.ways {
            for channel in 0..g.channels {
                let die = g.die_of(ChannelId(channel), WayId(way));
                assert_eq!(g.channel_of(die), ChannelId(channel));
                assert_eq!(g.way_of(die), WayId(way));
            }
        }
        assert_eq!(g.die_of(ChannelId(0), WayId(0)), DieId(0));
        assert_eq!(g.die_of(ChannelId(1), WayId(0)), DieId(1));
        assert_eq!(g.die_of(ChannelId(0), WayId(1)), DieId(8));
        assert_eq!(g.dies(), 32);
    }

    #[test]
    fn test_dma_position_ordering() {
        let early = DmaPosition { lap: 0, index: 40 };
        let late = DmaPosition { lap: 0, index: 41 };
        assert!(early < late);

        // A new lap dominates any index from the previous lap.
        let wrapped = DmaPosition { lap: 1, index: 0 };
        let high_index = DmaPosition {
            lap: 0,
            index: u16::MAX,
        };
        assert!(high_index < wrapped);

        let same = DmaPosition { lap: 3, index: 17 };
        assert!(same >= DmaPosition { lap: 3, index: 17 });
    }

    #[test]
    fn test_queue_id_display() {
        assert_eq!(QueueId::Free.to_string(), "free");
        assert_eq!(
            QueueId::Nand {
                channel: ChannelId(2),
                way: WayId(3)
            }
            .to_string(),
            "nand(2,3)"
        );
        assert_eq!(
            QueueId::RowBlocked {
                channel: ChannelId(0),
                way: WayId(1)
            }
            .to_string(),
            "row-blocked(0,1)"
        );
    }

    #[test]
    fn test_req_code_display() {
        assert_eq!(ReqCode::PartialWrite.to_string(), "partial-write");
        assert_eq!(ReqCode::RxDma.to_string(), "rx-dma");
        assert_eq!(ReqKind::HostDma.to_string(), "host-dma");
    }

    #[test]
    fn test_main_slices() {
        let g = Geometry {
            channels: 2,
            ways: 2,
            blocks_per_die: 10,
            pages_per_block: 4,
            ..Geometry::default()
        };
        assert_eq!(g.main_slices(), 160);
    }
}
