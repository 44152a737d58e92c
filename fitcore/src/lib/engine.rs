use crate::utils::*;
use crate::{BlockState, Ledger};
use log::debug;
use serde::Serialize;

/// What a successful allocation hands back: the stable handle, and the
/// block's start offset as of this call. The offset is a snapshot --
/// stale after the next mutating call on the same engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grant {
    pub id:     BlockId,
    pub offset: Bytes,
}

/// One entry of a layout snapshot: how wide a block is and whether it
/// is taken. No ids and no offsets on purpose -- a consumer that wants
/// to find a block again must hold its handle and ask the engine.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub size:   Bytes,
    pub state:  Occupancy,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    Free,
    Allocated,
}

/// A consistent snapshot of the engine's derived counters. Built fresh
/// by [`Engine::stats`] on every call; nothing in here is cached across
/// mutations.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Stats {
    pub total_size:             Bytes,
    pub allocated_bytes:        Bytes,
    pub free_bytes:             Bytes,
    pub fragmentation:          f64,
    pub alloc_count:            u64,
    pub dealloc_count:          u64,
    /// Mean wall-clock duration of successful allocations, in
    /// milliseconds.
    pub avg_alloc_ms:           f64,
    pub peak_allocated_bytes:   Bytes,
}

/// The allocator proper: one [`Ledger`] plus the bookkeeping around
/// it. Each engine is a single logical resource: operations run one
/// at a time to completion, and a failed one leaves no partial
/// mutation behind.
#[derive(Clone, Debug)]
pub struct Engine {
    ledger:         Ledger,
    next_id:        BlockId,
    allocated:      Bytes,
    free:           Bytes,
    allocs:         u64,
    deallocs:       u64,
    peak:           Bytes,
    avg_alloc_ms:   f64,
}

impl Engine {
    pub fn new(total_size: Bytes) -> Self {
        Self {
            ledger:         Ledger::new(total_size),
            next_id:        1,
            allocated:      0,
            free:           total_size,
            allocs:         0,
            deallocs:       0,
            peak:           0,
            avg_alloc_ms:   0.0,
        }
    }

    #[inline]
    pub fn total_size(&self) -> Bytes {
        self.ledger.total()
    }

    /// Read access to the underlying partition. Mutation goes through
    /// the operations below, nothing else.
    #[inline]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Grants `size` bytes out of the lowest-addressed free block that
    /// fits. Fails with [`AllocError::InvalidSize`] on empty requests
    /// and [`AllocError::OutOfMemory`] when no block is wide enough;
    /// either way the ledger is untouched.
    pub fn allocate(&mut self, size: Bytes) -> Result<Grant, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidSize);
        }
        let clock = Instant::now();
        let index = self
            .ledger
            .find_first_fit(size)
            .ok_or(AllocError::OutOfMemory(size))?;
        let id = self.next_id;
        self.next_id += 1;
        let offset = self.ledger.split(index, size, id);
        self.allocs += 1;
        self.allocated += size;
        self.free -= size;
        if self.allocated > self.peak {
            self.peak = self.allocated;
        }
        let sample = clock.elapsed().as_secs_f64() * 1e3;
        self.avg_alloc_ms =
            (self.avg_alloc_ms * (self.allocs - 1) as f64 + sample) / self.allocs as f64;
        debug!("granted {size}B as block {id} at offset {offset}");

        Ok(Grant { id, offset })
    }

    /// Returns the block granted as `id` to the free pool, eagerly
    /// merging it with any free neighbor. Unknown and already-freed
    /// handles fail with [`AllocError::InvalidHandle`].
    pub fn free(&mut self, id: BlockId) -> Result<(), AllocError> {
        let index = self
            .ledger
            .position_of(id)
            .ok_or(AllocError::InvalidHandle(id))?;
        let size = self.ledger.mark_free(index);
        self.ledger.merge_adjacent_free(index);
        self.deallocs += 1;
        self.allocated -= size;
        self.free += size;
        debug!("released block {id} ({size}B)");

        Ok(())
    }

    /// Compacts the ledger: live blocks are packed at the bottom of
    /// the range, free capacity ends up as one trailing block. No
    /// bytes change hands, but every previously reported offset is now
    /// meaningless -- re-query through [`Engine::locate`].
    pub fn defragment(&mut self) {
        self.ledger.compact();
        debug!("compacted into {} blocks", self.ledger.blocks().len());
    }

    /// Back to the state of a freshly built engine: one free block
    /// spanning the range, every counter (peak included) at zero, and
    /// handles restarting from 1. No handle survives this, so none can
    /// collide with a reissued one.
    pub fn reset(&mut self) {
        *self = Engine::new(self.ledger.total());
    }

    /// The current offset of a live block. Compaction moves blocks
    /// around, so this is the one valid way to find one again.
    pub fn locate(&self, id: BlockId) -> Result<Bytes, AllocError> {
        self.ledger
            .position_of(id)
            .map(|i| self.ledger.blocks()[i].start)
            .ok_or(AllocError::InvalidHandle(id))
    }

    /// How much of the free capacity is out of reach for the single
    /// largest possible request: `1 - largest_free / total_free`, and
    /// zero whenever at most one free block exists.
    pub fn fragmentation_ratio(&self) -> f64 {
        let (mut fragments, mut total_free, mut largest) = (0u32, 0, 0);
        for b in self.ledger.blocks() {
            if b.state == BlockState::Free {
                fragments += 1;
                total_free += b.size;
                if b.size > largest {
                    largest = b.size;
                }
            }
        }
        if fragments <= 1 {
            0.0
        } else {
            1.0 - largest as f64 / total_free as f64
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total_size:             self.ledger.total(),
            allocated_bytes:        self.allocated,
            free_bytes:             self.free,
            fragmentation:          self.fragmentation_ratio(),
            alloc_count:            self.allocs,
            dealloc_count:          self.deallocs,
            avg_alloc_ms:           self.avg_alloc_ms,
            peak_allocated_bytes:   self.peak,
        }
    }

    /// The ledger in address order, as anonymous `{size, state}`
    /// pairs, recomputed fresh on every call. This is the only engine
    /// surface a rendering layer gets to consume.
    pub fn layout(&self) -> impl Iterator<Item = Segment> + '_ {
        self.ledger.blocks().iter().map(|b| Segment {
            size:  b.size,
            state: match b.state {
                BlockState::Free         => Occupancy::Free,
                BlockState::Allocated(_) => Occupancy::Allocated,
            },
        })
    }
}
