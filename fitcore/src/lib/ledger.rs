use crate::utils::*;
use crate::{Block, BlockState, Ledger};

/*
    Every public method below preserves the partition invariants:
    full coverage of [0, total), ascending starts with no gaps, and
    no two adjacent free blocks once the call returns.

    Preconditions are the engine's to guarantee. A violated one is a
    bug on this side of the API, so it panics instead of surfacing as
    a runtime error.
*/
impl Ledger {
    /// A fresh ledger is one free block covering the whole range.
    pub fn new(total: Bytes) -> Self {
        assert!(total > 0, "Zero-sized address range requested.");
        Self {
            blocks: vec![Block {
                start: 0,
                size:  total,
                state: BlockState::Free,
            }],
            total,
        }
    }

    #[inline]
    pub fn total(&self) -> Bytes {
        self.total
    }

    /// The partition in address order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// First-fit search: the free block with the lowest start address
    /// that can hold `size` bytes wins. Blocks are stored in address
    /// order, so scanning front-to-back is what makes the tie-break
    /// deterministic.
    pub fn find_first_fit(&self, size: Bytes) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.state == BlockState::Free && b.size >= size)
    }

    /// Consumes the low `size` bytes of the free block at `index` into
    /// a new allocated block stamped with `id`. If the host block was
    /// bigger, the leftover bytes become a free block right after it;
    /// an exact fit converts the block in place. Returns the granted
    /// block's start offset.
    pub fn split(&mut self, index: usize, size: Bytes, id: BlockId) -> Bytes {
        let host = self.blocks[index];
        if host.state != BlockState::Free || size == 0 || host.size < size {
            panic!("Bad split: {size} bytes out of {host:?}");
        }
        self.blocks[index].state = BlockState::Allocated(id);
        if host.size > size {
            self.blocks[index].size = size;
            self.blocks.insert(
                index + 1,
                Block {
                    start: host.start + size,
                    size:  host.size - size,
                    state: BlockState::Free,
                },
            );
        }

        host.start
    }

    /// Hands the allocated block at `index` back to the free pool and
    /// returns its size. Merging is the caller's next move.
    pub fn mark_free(&mut self, index: usize) -> Bytes {
        match self.blocks[index].state {
            BlockState::Allocated(_) => {
                self.blocks[index].state = BlockState::Free;
                self.blocks[index].size
            }
            BlockState::Free => {
                panic!("Tried to free an already-free block.");
            }
        }
    }

    /// Merges the free block at `index` with whichever of its
    /// immediate neighbors are also free, returning the merged block's
    /// index. At most two merges can happen here: merging was never
    /// deferred before this call, so no longer runs of free blocks
    /// exist.
    pub fn merge_adjacent_free(&mut self, index: usize) -> usize {
        let mut index = index;
        assert!(
            self.blocks[index].state == BlockState::Free,
            "Merge requested on an allocated block."
        );
        if index + 1 < self.blocks.len() && self.blocks[index + 1].state == BlockState::Free {
            self.blocks[index].size += self.blocks[index + 1].size;
            self.blocks.remove(index + 1);
        }
        if index > 0 && self.blocks[index - 1].state == BlockState::Free {
            self.blocks[index - 1].size += self.blocks[index].size;
            self.blocks.remove(index);
            index -= 1;
        }

        index
    }

    /// Rebuilds the partition with every allocated block packed at the
    /// bottom of the range, in unchanged relative order, and all free
    /// capacity consolidated into one trailing block (or none, when
    /// the range is fully consumed). Sizes and handles survive; start
    /// offsets do not.
    pub fn compact(&mut self) {
        let mut packed: Vec<Block> = Vec::with_capacity(self.blocks.len());
        let mut cursor = 0;
        for b in self.blocks.drain(..) {
            if let BlockState::Allocated(_) = b.state {
                packed.push(Block {
                    start: cursor,
                    size:  b.size,
                    state: b.state,
                });
                cursor += b.size;
            }
        }
        if cursor < self.total {
            packed.push(Block {
                start: cursor,
                size:  self.total - cursor,
                state: BlockState::Free,
            });
        }
        self.blocks = packed;
    }

    /// Where the block granted as `id` currently sits, if it is live.
    /// Linear in block count, like everything else here.
    pub fn position_of(&self, id: BlockId) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.state == BlockState::Allocated(id))
    }
}
