pub use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};
pub use clap::Parser;
pub use itertools::Itertools;
pub use rand::prelude::*;
pub use rand_chacha::ChaCha8Rng;
pub use thiserror::Error;

/// The unit for measuring offsets and sizes inside the simulated
/// range. Nothing here touches real memory, so one unsigned machine
/// word covers every workload we care about.
pub type Bytes = usize;

/// The stable name of an allocated block. Handles are minted by the
/// engine in increasing order, never reused while live, and stay valid
/// across compaction -- unlike offsets.
pub type BlockId = u32;

/// What an engine call can fail with. Failures are detected before any
/// mutation is applied, so a returned error guarantees the ledger is
/// exactly as the caller left it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The request did not name a positive number of bytes.
    #[error("invalid size: allocations must request at least one byte")]
    InvalidSize,
    /// No free block is large enough for the request.
    #[error("out of memory: no free block holds {0} bytes")]
    OutOfMemory(Bytes),
    /// The handle does not name a live allocation.
    #[error("invalid handle: no live block with id {0}")]
    InvalidHandle(BlockId),
}
