//! Two-level segregated-fit allocator.
//!
//! ## Purpose
//! General-purpose allocation over a contiguous arena with O(1) `allocate`
//! and `deallocate`. Free blocks are filed in size classes addressed by a
//! two-level index: the first level is `floor(log2(size))`, the second the
//! next [`SECOND_LEVEL_BITS`] bits below it. Bitmaps over both levels make
//! "first bin that can satisfy this request" a pair of bit scans.
//!
//! ## Block layout
//! The arena is tiled by boundary blocks:
//!
//! ```text
//! | header (16 B) | payload | end tag (8 B) |
//! ```
//!
//! The header carries the payload size, the used flag, and the free-list
//! links (arena offsets, not pointers). The end tag repeats the total block
//! span so the physically-previous block is reachable in O(1), which makes
//! coalescing constant-time in both directions.
//!
//! ## Invariants
//! - Blocks tile the arena exactly: the spans of all blocks sum to the
//!   usable capacity.
//! - A block is linked in exactly one free list iff its used flag is clear.
//! - A first-level bitmap bit is set iff some second-level bin below it is
//!   non-empty.
//!
//! [`TlsfAllocator::stats`] walks the physical chain so integration tests
//! can observe the conservation invariant.
//!
//! ## Concurrency
//! Single-threaded; wrap externally if shared.

use std::alloc::{alloc, dealloc, Layout};
use std::fmt::Write as _;
use std::ptr::NonNull;

use crate::memory::{MemorySource, MAX_SCALAR_ALIGN};

/// Number of second-level bits: each first-level class splits into
/// `2^SECOND_LEVEL_BITS` bins.
pub const SECOND_LEVEL_BITS: u32 = 4;

const BINS: usize = 1 << SECOND_LEVEL_BITS;
/// Smallest payload a block may carry; also the request floor.
const MIN_PAYLOAD: usize = 1 << SECOND_LEVEL_BITS;
/// Payload sizes and block offsets are kept in multiples of this.
const UNIT: usize = 8;

const HEADER_SIZE: usize = 16;
const END_TAG_SIZE: usize = 8;
/// Per-block bookkeeping bytes.
const OVERHEAD: usize = HEADER_SIZE + END_TAG_SIZE;

/// Empty free-list slot marker.
const NIL: u32 = u32::MAX;

#[repr(C)]
struct BlockHeader {
    payload_size: u32,
    used: u32,
    prev_free: u32,
    next_free: u32,
}

/// Physical-walk report over the arena. `used_bytes + free_bytes +
/// block_count * overhead` equals the usable capacity at all times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsfStats {
    /// Usable arena bytes (capacity rounded to the allocation unit).
    pub capacity: usize,
    /// Payload bytes of used blocks.
    pub used_bytes: usize,
    /// Payload bytes of free blocks.
    pub free_bytes: usize,
    /// Total number of boundary blocks.
    pub block_count: usize,
    /// Number of free boundary blocks.
    pub free_block_count: usize,
    /// Header + end-tag bytes per block.
    pub overhead_per_block: usize,
}

/// Two-level segregated-fit allocator over an owned arena.
pub struct TlsfAllocator {
    base: NonNull<u8>,
    /// Bytes reserved from the system (the construction request).
    raw_capacity: usize,
    /// Bytes actually tiled by blocks (rounded down to [`UNIT`]).
    usable: usize,
    /// Largest satisfiable payload.
    max_payload: usize,
    /// Highest first-level index in use.
    max_fl: u32,
    /// Free-list heads, one per `(first level, second level)` bin.
    free_heads: Vec<u32>,
    /// Bit `fl` set iff any bin under `fl` holds a free block.
    fl_bitmap: u64,
    /// Per-first-level occupancy of the second-level bins.
    sl_bitmaps: Vec<u32>,
}

#[inline]
fn floor_log2(value: usize) -> u32 {
    usize::BITS - 1 - value.leading_zeros()
}

#[inline]
fn round_up_unit(value: usize) -> usize {
    (value + (UNIT - 1)) & !(UNIT - 1)
}

impl TlsfAllocator {
    /// Creates an allocator owning a fresh arena of `capacity` bytes.
    ///
    /// ## Panics
    /// Panics if `capacity` cannot hold a single minimal block, exceeds the
    /// 32-bit offset range, or the system refuses the arena allocation.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= OVERHEAD + MIN_PAYLOAD,
            "TLSF arena of {capacity} bytes cannot hold one block"
        );
        assert!(
            capacity <= u32::MAX as usize,
            "TLSF arenas are limited to 32-bit offsets"
        );

        let layout = Layout::from_size_align(capacity, MAX_SCALAR_ALIGN)
            .expect("arena layout is valid");
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        let base = NonNull::new(raw).expect("system refused the TLSF arena");

        let usable = capacity & !(UNIT - 1);
        let max_payload = usable - OVERHEAD;
        let max_fl = floor_log2(max_payload);
        let fl_count = (max_fl - SECOND_LEVEL_BITS + 1) as usize;

        let mut allocator = Self {
            base,
            raw_capacity: capacity,
            usable,
            max_payload,
            max_fl,
            free_heads: vec![NIL; fl_count * BINS],
            fl_bitmap: 0,
            sl_bitmaps: vec![0; fl_count],
        };
        allocator.clear_all();
        allocator
    }

    /// Largest payload a single allocation can ever receive.
    pub fn max_allocation(&self) -> usize {
        self.max_payload
    }

    /// Re-initializes the arena as one free block spanning the whole
    /// capacity. All outstanding pointers become invalid.
    pub fn clear_all(&mut self) {
        self.free_heads.fill(NIL);
        self.fl_bitmap = 0;
        self.sl_bitmaps.fill(0);

        let payload = self.usable - OVERHEAD;
        // SAFETY: offset 0 and `payload` lie inside the arena by
        // construction.
        unsafe {
            self.write_block(0, payload as u32, 0);
        }
        self.insert_free(0);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Allocation
    // ─────────────────────────────────────────────────────────────────────

    /// Allocates `size` bytes, or `None` when no free block can satisfy the
    /// request. The returned payload is aligned to the allocation unit.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let payload = round_up_unit(size).max(MIN_PAYLOAD);
        if payload > self.max_payload {
            return None;
        }

        let (fl, sl) = self.mapping_search(payload);
        let (fl, sl) = self.find_suitable_bin(fl, sl)?;

        let off = self.free_heads[self.bin_index(fl, sl)];
        debug_assert_ne!(off, NIL, "occupied bitmap bin had an empty list");
        self.remove_free(off);

        // SAFETY: `off` came from a free list, so it heads a valid block.
        unsafe {
            let block_payload = (*self.header(off)).payload_size as usize;
            debug_assert!(block_payload >= payload, "size-class search returned a short block");

            if block_payload - payload >= OVERHEAD + MIN_PAYLOAD {
                // Split the tail into a new free block and file it.
                self.write_block(off, payload as u32, 1);

                let tail_off = off + (OVERHEAD + payload) as u32;
                let tail_payload = (block_payload - payload - OVERHEAD) as u32;
                self.write_block(tail_off, tail_payload, 0);
                self.insert_free(tail_off);
            } else {
                (*self.header(off)).used = 1;
            }

            Some(NonNull::new_unchecked(
                self.base.as_ptr().add(off as usize + HEADER_SIZE),
            ))
        }
    }

    /// Allocates space for `count` values of `T`. Refuses element alignments
    /// above the allocation unit. The returned memory is uninitialized.
    pub fn allocate_array<T>(&mut self, count: usize) -> Option<NonNull<T>> {
        if std::mem::align_of::<T>() > UNIT {
            return None;
        }
        let size = std::mem::size_of::<T>().checked_mul(count)?;
        self.allocate(size).map(NonNull::cast)
    }

    /// Returns a block to the allocator, coalescing with free physical
    /// neighbours. Always succeeds for pointers this allocator handed out.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on this allocator
    /// and must not be used afterwards (no double free).
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        let base = self.base.as_ptr() as usize;
        if addr < base + HEADER_SIZE || addr >= base + self.usable {
            debug_assert!(false, "deallocate of a pointer outside the arena");
            return false;
        }

        let mut off = (addr - base - HEADER_SIZE) as u32;

        // SAFETY (all accesses below): `off` walks block boundaries that
        // were written by `write_block`, and coalescing only follows spans
        // recorded in headers and end tags inside the arena.
        unsafe {
            (*self.header(off)).used = 0;

            // Right neighbour: merge while it is free.
            let next_off = off + self.span(off);
            if (next_off as usize) < self.usable && (*self.header(next_off)).used == 0 {
                self.remove_free(next_off);
                let merged = (*self.header(off)).payload_size + self.span(next_off);
                self.write_block(off, merged, 0);
            }

            // Left neighbour via its end tag; the surviving block is the
            // left one.
            if off > 0 {
                let prev_span = self.read_end_tag(off);
                let prev_off = off - prev_span;
                if (*self.header(prev_off)).used == 0 {
                    self.remove_free(prev_off);
                    let merged = (*self.header(prev_off)).payload_size + self.span(off);
                    self.write_block(prev_off, merged, 0);
                    off = prev_off;
                }
            }
        }

        self.insert_free(off);
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────

    /// Walks the physical block chain and reports byte accounting.
    pub fn stats(&self) -> TlsfStats {
        let mut stats = TlsfStats {
            capacity: self.usable,
            used_bytes: 0,
            free_bytes: 0,
            block_count: 0,
            free_block_count: 0,
            overhead_per_block: OVERHEAD,
        };

        let mut off = 0u32;
        while (off as usize) < self.usable {
            // SAFETY: the walk follows spans written by `write_block`.
            let (payload, used) = unsafe {
                let header = self.header(off);
                ((*header).payload_size as usize, (*header).used != 0)
            };
            stats.block_count += 1;
            if used {
                stats.used_bytes += payload;
            } else {
                stats.free_bytes += payload;
                stats.free_block_count += 1;
            }
            off += (payload + OVERHEAD) as u32;
        }

        stats
    }

    /// Debug introspection: the physical block chain and the occupied bins.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "arena: {} usable of {} raw bytes", self.usable, self.raw_capacity);

        let mut off = 0u32;
        while (off as usize) < self.usable {
            // SAFETY: the walk follows spans written by `write_block`.
            let (payload, used) = unsafe {
                let header = self.header(off);
                ((*header).payload_size, (*header).used != 0)
            };
            let _ = writeln!(
                out,
                "  block @{off:>10} payload {payload:>10} {}",
                if used { "used" } else { "free" }
            );
            off += payload + OVERHEAD as u32;
        }

        for fl in SECOND_LEVEL_BITS..=self.max_fl {
            for sl in 0..BINS as u32 {
                let head = self.free_heads[self.bin_index(fl, sl)];
                if head != NIL {
                    let _ = writeln!(out, "  bin ({fl:>2},{sl:>2}) -> @{head}");
                }
            }
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────────
    // Size-class mapping
    // ─────────────────────────────────────────────────────────────────────

    #[inline]
    fn bin_index(&self, fl: u32, sl: u32) -> usize {
        ((fl - SECOND_LEVEL_BITS) as usize) * BINS + sl as usize
    }

    /// Class of a block of `size` bytes, for filing.
    #[inline]
    fn mapping_insert(size: usize) -> (u32, u32) {
        let fl = floor_log2(size);
        let sl = ((size >> (fl - SECOND_LEVEL_BITS)) as u32) & (BINS as u32 - 1);
        (fl, sl)
    }

    /// Class to search for a request of `size` bytes. Rounds the request up
    /// by one second-level step so every block in the found bin fits.
    #[inline]
    fn mapping_search(&self, size: usize) -> (u32, u32) {
        let fl = floor_log2(size);
        let rounded = size + (1usize << (fl - SECOND_LEVEL_BITS)) - 1;
        Self::mapping_insert(rounded)
    }

    /// First non-empty bin at `(fl, ≥sl)`, else the lowest bin of the next
    /// non-empty first level above.
    fn find_suitable_bin(&self, fl: u32, sl: u32) -> Option<(u32, u32)> {
        if fl > self.max_fl {
            return None;
        }

        let sl_map = self.sl_bitmaps[(fl - SECOND_LEVEL_BITS) as usize] & (!0u32 << sl);
        if sl_map != 0 {
            return Some((fl, sl_map.trailing_zeros()));
        }

        let fl_map = self.fl_bitmap & (!0u64).checked_shl(fl + 1).unwrap_or(0);
        if fl_map == 0 {
            return None;
        }
        let fl = fl_map.trailing_zeros();
        let sl_map = self.sl_bitmaps[(fl - SECOND_LEVEL_BITS) as usize];
        debug_assert_ne!(sl_map, 0, "first-level bit set over empty second level");
        Some((fl, sl_map.trailing_zeros()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Free-list maintenance
    // ─────────────────────────────────────────────────────────────────────

    fn insert_free(&mut self, off: u32) {
        // SAFETY: callers pass offsets of valid block headers.
        unsafe {
            let payload = (*self.header(off)).payload_size as usize;
            let (fl, sl) = Self::mapping_insert(payload);
            let index = self.bin_index(fl, sl);

            let old_head = self.free_heads[index];
            (*self.header(off)).prev_free = NIL;
            (*self.header(off)).next_free = old_head;
            if old_head != NIL {
                (*self.header(old_head)).prev_free = off;
            }
            self.free_heads[index] = off;

            self.sl_bitmaps[(fl - SECOND_LEVEL_BITS) as usize] |= 1 << sl;
            self.fl_bitmap |= 1 << fl;
        }
    }

    fn remove_free(&mut self, off: u32) {
        // SAFETY: callers pass offsets of blocks currently on a free list.
        unsafe {
            let payload = (*self.header(off)).payload_size as usize;
            let (fl, sl) = Self::mapping_insert(payload);
            let index = self.bin_index(fl, sl);

            let prev = (*self.header(off)).prev_free;
            let next = (*self.header(off)).next_free;

            if prev != NIL {
                (*self.header(prev)).next_free = next;
            } else {
                debug_assert_eq!(self.free_heads[index], off, "unlinked block was not the head");
                self.free_heads[index] = next;
            }
            if next != NIL {
                (*self.header(next)).prev_free = prev;
            }

            (*self.header(off)).prev_free = NIL;
            (*self.header(off)).next_free = NIL;

            if self.free_heads[index] == NIL {
                self.sl_bitmaps[(fl - SECOND_LEVEL_BITS) as usize] &= !(1 << sl);
                if self.sl_bitmaps[(fl - SECOND_LEVEL_BITS) as usize] == 0 {
                    self.fl_bitmap &= !(1u64 << fl);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Raw block access
    // ─────────────────────────────────────────────────────────────────────

    #[inline]
    unsafe fn header(&self, off: u32) -> *mut BlockHeader {
        debug_assert!((off as usize) + HEADER_SIZE <= self.usable);
        // SAFETY: caller guarantees `off` heads a block inside the arena.
        unsafe { self.base.as_ptr().add(off as usize).cast::<BlockHeader>() }
    }

    /// Total span of the block at `off` (header + payload + end tag).
    #[inline]
    unsafe fn span(&self, off: u32) -> u32 {
        // SAFETY: per `header`.
        unsafe { (*self.header(off)).payload_size + OVERHEAD as u32 }
    }

    /// Writes a block's header fields and its end tag in one step.
    unsafe fn write_block(&mut self, off: u32, payload: u32, used: u32) {
        // SAFETY: caller guarantees the block `[off, off + payload +
        // OVERHEAD)` lies inside the arena.
        unsafe {
            let header = self.header(off);
            (*header).payload_size = payload;
            (*header).used = used;
            (*header).prev_free = NIL;
            (*header).next_free = NIL;

            let span = payload + OVERHEAD as u32;
            let tag = self
                .base
                .as_ptr()
                .add((off + span) as usize - END_TAG_SIZE)
                .cast::<u64>();
            tag.write(span as u64);
        }
    }

    /// Reads the end tag that sits immediately before the block at `off`,
    /// yielding the span of the physically-previous block.
    #[inline]
    unsafe fn read_end_tag(&self, off: u32) -> u32 {
        debug_assert!(off as usize >= END_TAG_SIZE);
        // SAFETY: a block precedes `off`, so its tag occupies the 8 bytes
        // before it.
        unsafe {
            self.base
                .as_ptr()
                .add(off as usize - END_TAG_SIZE)
                .cast::<u64>()
                .read() as u32
        }
    }
}

impl Drop for TlsfAllocator {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.raw_capacity, MAX_SCALAR_ALIGN)
            .expect("layout was valid at construction time");
        // SAFETY: the arena was allocated with this exact layout.
        unsafe { dealloc(self.base.as_ptr(), layout) };
    }
}

impl MemorySource for TlsfAllocator {
    fn allocate(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if align > UNIT {
            return None;
        }
        TlsfAllocator::allocate(self, size)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, _size: usize, _align: usize) {
        // SAFETY: forwarded contract; ptr came from allocate on this source.
        unsafe {
            TlsfAllocator::deallocate(self, ptr);
        }
    }
}
