#![forbid(unsafe_code)]
//! Request scheduling core: transformation, dependency tracking, dispatch.
//!
//! Host commands come in as block ranges and leave as flash operations and
//! host-DMA transfers, with every intermediate wait parked in an arena queue.
//! The scheduler enforces two ordering regimes on the way through: blocking
//! chains serialize requests touching the same buffer entry, and the row table
//! serializes page programs, reads, and erases within each flash block.

pub mod row;
pub mod scheduler;
pub mod traits;

mod transform;

pub use row::{RowCheckMode, RowDependencyTable, RowOp, RowOutcome};
pub use scheduler::{NandRequest, Scheduler};
pub use traits::{AddressTranslator, BufferCache, HostDmaEngine, NandExecutor};
