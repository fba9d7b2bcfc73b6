#![forbid(unsafe_code)]
//! Error types for the weir request scheduler.
//!
//! # Error Taxonomy
//!
//! The scheduler distinguishes three failure classes:
//!
//! | Class | Meaning | Caller policy |
//! |-------|---------|---------------|
//! | `ProtocolViolation` | An upstream layer broke a scheduling contract (replayed a programmed page, signaled completion on an empty queue, submitted a malformed request) | Halt. The queueing state is no longer trustworthy; discard the scheduler. |
//! | `ResourceExhaustion` | The request arena ran dry and reclamation could not free a slot | Halt. Surfaced only after reclamation was attempted and failed, which means the workload over-committed the arena. |
//! | `Config` | Invalid configuration rejected at construction time | Fix the configuration and rebuild. |
//!
//! Dependency stalls (a request waiting behind another) are *not* errors;
//! they are ordinary queue membership and never surface here.
//!
//! ## Design Constraints
//!
//! - `weir-error` MUST NOT depend on `weir-types` (no cyclic deps). Variants
//!   carry raw integers and owned strings; higher crates add typed context.
//! - The class mapping is exhaustive (no wildcard arms), so adding a variant
//!   without classifying it is a compile error.

use thiserror::Error;

/// Unified error type for all weir scheduling operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WeirError {
    /// The free queue is empty and polling the host DMA engine reclaimed
    /// nothing, so allocation cannot converge.
    #[error("request pool exhausted: all {capacity} slots in flight and none reclaimable")]
    PoolExhausted { capacity: usize },

    /// A queue operation addressed a slot that is not a member of any queue.
    #[error("request slot {tag} is not in any queue")]
    SlotNotQueued { tag: u16 },

    /// A completion was signaled for a queue with no outstanding requests.
    #[error("completion signaled on empty queue {queue}")]
    EmptyQueue { queue: String },

    /// A program was submitted for a page at or below the block's watermark,
    /// i.e. a page that has already been programmed since the last erase.
    #[error(
        "program replays page {page} of block {block} (channel {channel}, way {way}): \
         next permitted page is {permitted}"
    )]
    PageReplay {
        channel: u8,
        way: u8,
        block: u32,
        page: u32,
        permitted: u32,
    },

    /// A host DMA request reached the completion scan without a recorded
    /// submission position.
    #[error("request slot {tag} has no DMA submission snapshot")]
    MissingDmaSnapshot { tag: u16 },

    /// A buffer entry was scheduled for writeback without a bound slice
    /// address.
    #[error("buffer entry {entry} has no slice address to write back")]
    MissingSliceBinding { entry: u16 },

    /// A request's kind/code combination matches no dispatch path.
    #[error("request slot {tag} is unroutable: kind {kind}, code {code}")]
    UnroutableRequest {
        tag: u16,
        kind: String,
        code: String,
    },

    /// A host command with a zero block count was submitted.
    #[error("host command {cmd_tag} transfers zero blocks")]
    EmptyHostCommand { cmd_tag: u16 },

    /// A host command exceeds the per-command descriptor budget.
    #[error("host command {cmd_tag} transfers {blocks} blocks, exceeding the 65535 descriptor limit")]
    OversizedHostCommand { cmd_tag: u16, blocks: u32 },

    /// A host command's block range runs past the end of the address space.
    #[error(
        "host command {cmd_tag} runs past the end of the block address space: \
         start lba {start_lba}, {blocks} block(s)"
    )]
    OutOfRangeHostCommand {
        cmd_tag: u16,
        start_lba: u64,
        blocks: u32,
    },

    /// Invalid geometry or configuration, stringified at the boundary.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure class; see the crate docs for the caller policy per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    ProtocolViolation,
    ResourceExhaustion,
    Config,
}

impl WeirError {
    /// Classify this error. Exhaustive by construction.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::PoolExhausted { .. } => ErrorClass::ResourceExhaustion,
            Self::SlotNotQueued { .. }
            | Self::EmptyQueue { .. }
            | Self::PageReplay { .. }
            | Self::MissingDmaSnapshot { .. }
            | Self::MissingSliceBinding { .. }
            | Self::UnroutableRequest { .. }
            | Self::EmptyHostCommand { .. }
            | Self::OversizedHostCommand { .. }
            | Self::OutOfRangeHostCommand { .. } => ErrorClass::ProtocolViolation,
            Self::Config(_) => ErrorClass::Config,
        }
    }

    /// Whether this error indicates a broken scheduling contract, after which
    /// the scheduler's queueing state must be considered indeterminate.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        self.class() == ErrorClass::ProtocolViolation
    }
}

/// Result alias using `WeirError`.
pub type Result<T> = std::result::Result<T, WeirError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_mapping_covers_all_variants() {
        let cases: Vec<(WeirError, ErrorClass)> = vec![
            (
                WeirError::PoolExhausted { capacity: 128 },
                ErrorClass::ResourceExhaustion,
            ),
            (
                WeirError::SlotNotQueued { tag: 3 },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::EmptyQueue {
                    queue: "nand(0,0)".into(),
                },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::PageReplay {
                    channel: 0,
                    way: 1,
                    block: 7,
                    page: 3,
                    permitted: 4,
                },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::MissingDmaSnapshot { tag: 9 },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::MissingSliceBinding { entry: 2 },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::UnroutableRequest {
                    tag: 5,
                    kind: "slice".into(),
                    code: "erase".into(),
                },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::EmptyHostCommand { cmd_tag: 0 },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::OversizedHostCommand {
                    cmd_tag: 0,
                    blocks: 1 << 20,
                },
                ErrorClass::ProtocolViolation,
            ),
            (
                WeirError::OutOfRangeHostCommand {
                    cmd_tag: 4,
                    start_lba: u64::MAX - 1,
                    blocks: 4,
                },
                ErrorClass::ProtocolViolation,
            ),
            (WeirError::Config("bad".into()), ErrorClass::Config),
        ];

        for (error, expected) in &cases {
            assert_eq!(error.class(), *expected, "wrong class for {error:?}");
        }
    }

    #[test]
    fn display_formatting() {
        let replay = WeirError::PageReplay {
            channel: 1,
            way: 2,
            block: 40,
            page: 3,
            permitted: 4,
        };
        assert_eq!(
            replay.to_string(),
            "program replays page 3 of block 40 (channel 1, way 2): next permitted page is 4"
        );
        assert!(replay.is_protocol_violation());

        let pool = WeirError::PoolExhausted { capacity: 128 };
        assert!(pool.to_string().contains("128 slots"));
        assert!(!pool.is_protocol_violation());

        let queue = WeirError::EmptyQueue {
            queue: "host-dma".into(),
        };
        assert_eq!(
            queue.to_string(),
            "completion signaled on empty queue host-dma"
        );
    }
}
