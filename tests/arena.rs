//! Arena allocator: bump behavior, growth, reset, external memory.

use sim_runtime::{ArenaAllocator, MemorySource, MAX_SCALAR_ALIGN};

const MEMORY_SIZE: usize = 1024 * 1024;

#[test]
fn allocations_are_distinct_and_forward() {
    let mut arena = ArenaAllocator::with_capacity(MEMORY_SIZE);

    let p1 = arena.allocate(128).unwrap();
    let p2 = arena.allocate(256).unwrap();

    assert_ne!(p1, p2);
    assert!((p1.as_ptr() as usize) < (p2.as_ptr() as usize));
    assert!(p2.as_ptr() as usize >= p1.as_ptr() as usize + 128);
}

#[test]
fn reset_reuses_addresses() {
    let mut arena = ArenaAllocator::with_capacity(MEMORY_SIZE);

    let p1 = arena.allocate(256).unwrap();
    arena.reset();
    let p2 = arena.allocate(256).unwrap();

    assert_eq!(p1, p2);
    assert_eq!(arena.used(), 256);
}

#[test]
fn reset_replays_a_multi_block_sequence_identically() {
    // Small budget so the sequence spills into growth blocks.
    let mut arena = ArenaAllocator::with_capacity(512);

    let first: Vec<_> = (0..8).map(|_| arena.allocate(200).unwrap()).collect();
    arena.reset();
    let second: Vec<_> = (0..8).map(|_| arena.allocate(200).unwrap()).collect();

    assert_eq!(first, second);
}

#[test]
fn owned_arena_grows_on_overflow() {
    let mut arena = ArenaAllocator::with_capacity(64);

    assert!(arena.allocate(48).is_some());
    // Larger than both the remaining space and the default block size.
    let big = arena.allocate(4096);
    assert!(big.is_some());
    assert!(arena.capacity() >= 64 + 4096);
}

#[test]
fn external_arena_never_grows() {
    let mut memory = vec![0u8; 4096];
    let mut arena = ArenaAllocator::with_external(&mut memory);

    let mut allocations = 0;
    while arena.allocate(256).is_some() {
        allocations += 1;
    }
    assert_eq!(allocations, 16);

    arena.reset();
    assert!(arena.allocate(256).is_some());
}

#[test]
fn external_reset_reuses_the_buffer_start() {
    let mut memory = vec![0u8; 1024];
    let base = memory.as_ptr() as usize;
    let mut arena = ArenaAllocator::with_external(&mut memory);

    let p1 = arena.allocate(100).unwrap();
    assert_eq!(p1.as_ptr() as usize, base);

    arena.reset();
    let p2 = arena.allocate(100).unwrap();
    assert_eq!(p1, p2);
}

#[test]
fn typed_allocations_are_aligned() {
    let mut arena = ArenaAllocator::with_capacity(MEMORY_SIZE);

    let _pad = arena.allocate(3).unwrap();
    let doubles = arena.allocate_array::<f64>(16).unwrap();
    assert_eq!(doubles.as_ptr() as usize % std::mem::align_of::<f64>(), 0);

    // Written values survive (the memory really is ours).
    unsafe {
        for i in 0..16 {
            doubles.as_ptr().add(i).write(i as f64);
        }
        for i in 0..16 {
            assert_eq!(doubles.as_ptr().add(i).read(), i as f64);
        }
    }
}

#[test]
fn oversized_alignment_is_refused() {
    #[repr(align(64))]
    struct Overaligned([u8; 64]);

    let mut arena = ArenaAllocator::with_capacity(MEMORY_SIZE);
    assert!(arena.allocate_array::<Overaligned>(1).is_none());
    assert!(MemorySource::allocate(&mut arena, 64, MAX_SCALAR_ALIGN * 2).is_none());
}

#[test]
fn memory_source_deallocate_is_a_no_op() {
    let mut arena = ArenaAllocator::with_capacity(MEMORY_SIZE);

    let p1 = MemorySource::allocate(&mut arena, 128, 8).unwrap();
    let used_before = arena.used();
    unsafe { MemorySource::deallocate(&mut arena, p1, 128, 8) };
    assert_eq!(arena.used(), used_before);

    // The freed region is not recycled; the next allocation moves forward.
    let p2 = MemorySource::allocate(&mut arena, 128, 8).unwrap();
    assert_ne!(p1, p2);
}

#[test]
fn zero_budget_arena_still_allocates() {
    let mut arena = ArenaAllocator::with_capacity(0);
    assert!(arena.allocate(16).is_some());
}
