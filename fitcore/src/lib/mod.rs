//! Welcome to `fitcore`!
//!
//! The crate simulates a dynamic memory allocator over a fixed-size
//! address range. A [`Ledger`] keeps the range partitioned into
//! contiguous blocks, and an [`engine::Engine`] mutates exactly one
//! ledger through the public allocation contract: first-fit search
//! with eager coalescing of freed neighbors, plus compaction on
//! demand. [`harness`] drills randomized workloads through an engine
//! so that strategies can be compared on equal footing.

mod ledger;
pub mod engine;
pub mod harness;
pub mod utils;

pub use crate::utils::{BlockId, Bytes};

/// Occupancy of a [`Block`].
///
/// A `Free` block is anonymous: its identity is positional, and the
/// next split or merge may destroy it. An `Allocated` block carries the
/// handle under which it was granted, which is the only reference to it
/// that survives mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    Free,
    Allocated(BlockId),
}

/// A maximal contiguous region of the simulated range, tagged with its
/// occupancy.
///
/// > ***ATTENTION:*** `start` is a snapshot, not a name. Compaction
/// > relocates every live block, so the only thing a caller may hold
/// > onto across mutating operations is the handle inside
/// > [`BlockState::Allocated`]; offsets must be re-queried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub start:  Bytes,
    pub size:   Bytes,
    pub state:  BlockState,
}

/// The ordered partition of `[0, total)` into [`Block`]s.
///
/// Blocks are kept sorted by `start`, gapless and non-overlapping: the
/// sizes sum to `total` at all times, and each block begins where its
/// left neighbor ends. Once an operation has returned, no two adjacent
/// blocks are both free (merging is eager, never deferred).
///
/// The ledger is a pure splice structure. It hands out indices and
/// rearranges blocks; everything with a policy flavor to it lives in
/// [`engine::Engine`].
#[derive(Clone, Debug)]
pub struct Ledger {
    blocks: Vec<Block>,
    total:  Bytes,
}

pub use crate::engine::{Engine, Grant, Occupancy, Segment, Stats};
pub use crate::harness::{DrillConfig, OpKind, OpRecord, RunReport, DEFAULT_SIZES};
pub use crate::utils::*;
