//! Bump (arena) allocator.
//!
//! ## Purpose
//! Fast allocation for payloads that are released all at once: each
//! allocation bumps a high-water mark inside the active block; when the
//! block overflows, a new block sized `max(block_size, request)` is chained
//! on. There is no per-allocation deallocate; memory returns only on
//! [`reset`](ArenaAllocator::reset) or drop.
//!
//! ## Modes
//! - **Owned** ([`with_capacity`](ArenaAllocator::with_capacity)): the arena
//!   allocates and frees its own blocks.
//! - **External** ([`with_external`](ArenaAllocator::with_external)): the
//!   arena bumps inside caller-provided memory, never grows, and frees
//!   nothing. The borrow ties the arena to the buffer's lifetime.
//!
//! ## Reset semantics
//! `reset` rewinds every block's high-water mark and rewinds the active
//! block to the first one; blocks are retained, so an identical allocation
//! sequence after a reset returns identical addresses. No destructors run:
//! the arena is for trivially-droppable payloads, or the caller drops
//! explicitly before resetting.
//!
//! ## Alignment
//! Requests are honored up to [`MAX_SCALAR_ALIGN`]; stricter alignments are
//! refused (a stricter allocator would pad instead).

use std::alloc::{alloc, dealloc, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::memory::{MemorySource, MAX_SCALAR_ALIGN};

/// Growth block size used when no larger request forces a bigger block.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

struct Block {
    base: NonNull<u8>,
    capacity: usize,
    used: usize,
    owned: bool,
}

impl Block {
    fn owned(capacity: usize) -> Option<Block> {
        let layout = Layout::from_size_align(capacity.max(1), MAX_SCALAR_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        Some(Block {
            base: NonNull::new(raw)?,
            capacity,
            used: 0,
            owned: true,
        })
    }

    /// Bumps the high-water mark, or `None` if the block cannot hold the
    /// request at the given alignment.
    fn bump(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let aligned = self.used.checked_add(align - 1)? & !(align - 1);
        let end = aligned.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.used = end;
        // SAFETY: `aligned + size <= capacity`, so the offset stays inside
        // the block allocation.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(aligned)) })
    }
}

/// Linked-block bump allocator. See the module docs for the contract.
pub struct ArenaAllocator<'m> {
    /// Blocks in creation order; `current` indexes the active one.
    blocks: Vec<Block>,
    current: usize,
    block_size: usize,
    external: bool,
    _borrow: PhantomData<&'m mut [u8]>,
}

impl ArenaAllocator<'static> {
    /// Creates an owned arena with an initial block of `byte_budget` bytes.
    pub fn with_capacity(byte_budget: usize) -> Self {
        let mut blocks = Vec::new();
        if byte_budget > 0 {
            if let Some(block) = Block::owned(byte_budget) {
                blocks.push(block);
            }
        }
        Self {
            blocks,
            current: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            external: false,
            _borrow: PhantomData,
        }
    }
}

impl<'m> ArenaAllocator<'m> {
    /// Creates an arena over caller-provided memory. The arena never grows
    /// beyond the buffer and never frees it.
    pub fn with_external(memory: &'m mut [u8]) -> Self {
        let capacity = memory.len();
        let base = NonNull::new(memory.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            blocks: vec![Block {
                base,
                capacity,
                used: 0,
                owned: false,
            }],
            current: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            external: true,
            _borrow: PhantomData,
        }
    }

    /// Total bytes currently bumped across all blocks.
    pub fn used(&self) -> usize {
        self.blocks.iter().map(|block| block.used).sum()
    }

    /// Total capacity of all blocks.
    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|block| block.capacity).sum()
    }

    /// Allocates `size` raw bytes (alignment 1), or `None` when an external
    /// arena is exhausted or the system refuses a growth block.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_aligned(size, 1)
    }

    /// Allocates space for `count` values of `T`, aligned for `T`.
    ///
    /// Refuses element alignments above [`MAX_SCALAR_ALIGN`]. The returned
    /// memory is uninitialized.
    pub fn allocate_array<T>(&mut self, count: usize) -> Option<NonNull<T>> {
        let size = std::mem::size_of::<T>().checked_mul(count)?;
        self.allocate_aligned(size, std::mem::align_of::<T>())
            .map(NonNull::cast)
    }

    fn allocate_aligned(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() || align > MAX_SCALAR_ALIGN {
            return None;
        }

        loop {
            if let Some(block) = self.blocks.get_mut(self.current) {
                if let Some(ptr) = block.bump(size, align) {
                    return Some(ptr);
                }
                // Rewound blocks from an earlier generation may follow.
                if self.current + 1 < self.blocks.len() {
                    self.current += 1;
                    continue;
                }
            }

            if self.external && !self.blocks.is_empty() {
                return None;
            }

            let block = Block::owned(self.block_size.max(size))?;
            self.blocks.push(block);
            self.current = self.blocks.len() - 1;
        }
    }

    /// Rewinds every block's high-water mark to its base and makes the first
    /// block active again. Blocks are retained; no memory is released.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.used = 0;
        }
        self.current = 0;
    }
}

impl Drop for ArenaAllocator<'_> {
    fn drop(&mut self) {
        for block in &self.blocks {
            if block.owned {
                let layout = Layout::from_size_align(block.capacity.max(1), MAX_SCALAR_ALIGN)
                    .expect("layout was valid at allocation time");
                // SAFETY: owned blocks were allocated with this exact layout.
                unsafe { dealloc(block.base.as_ptr(), layout) };
            }
        }
    }
}

impl MemorySource for ArenaAllocator<'_> {
    fn allocate(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        self.allocate_aligned(size, align)
    }

    unsafe fn deallocate(&mut self, _ptr: NonNull<u8>, _size: usize, _align: usize) {
        // Bulk-release source: individual deallocation is a no-op.
    }
}
