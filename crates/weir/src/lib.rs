#![forbid(unsafe_code)]
//! Weir public API facade.
//!
//! Re-exports the scheduler, the slot arena, and the shared vocabulary types
//! through one crate. Embedders that supply their own translator, buffer
//! cache, DMA engine, and flash executor need nothing else.

pub use weir_arena::{QueueCensus, RequestPool, RequestSlot};
pub use weir_error::{ErrorClass, Result, WeirError};
pub use weir_sched::{
    AddressTranslator, BufferCache, HostDmaEngine, NandExecutor, NandRequest, RowCheckMode,
    RowDependencyTable, RowOp, RowOutcome, Scheduler,
};
pub use weir_types::*;
