//! Range-splitting helpers over a [`JobPool`].
//!
//! Each helper divides an index range into one chunk per worker (the
//! remainder is spread one index per worker over the leading workers),
//! submits one job per non-empty chunk and blocks in
//! [`JobPool::wait`] until every chunk ran. Zero-length ranges submit
//! nothing and return immediately.
//!
//! The 2-D variants split the longer axis; the other axis is walked in full
//! by every job.
//!
//! Callbacks may borrow local state (`F` need not be `'static`): the
//! borrow is smuggled across the job boundary as a raw pointer, and the
//! trailing `wait` guarantees no job outlives the call.

use crate::jobs::pool::JobPool;
use crate::profiling::profiler;

/// Borrowed callback handed to `'static` jobs.
///
/// Type-erased so the capture is `'static` even when `F` is not; the
/// monomorphized trampoline recovers the concrete type. Soundness rests on
/// the `wait` barrier at the end of every helper: the pointee outlives all
/// submitted jobs.
struct TaskRef<A> {
    data: *const (),
    call: unsafe fn(*const (), A),
}

impl<A> Clone for TaskRef<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A> Copy for TaskRef<A> {}

// SAFETY: the referent is `Sync` (enforced by `TaskRef::new`) and outlives
// every job (wait barrier), so sharing the pointer across workers is sound.
unsafe impl<A> Send for TaskRef<A> {}

impl<A: 'static> TaskRef<A> {
    fn new<F: Fn(A) + Sync>(f: &F) -> Self {
        unsafe fn trampoline<F: Fn(A), A>(data: *const (), args: A) {
            // SAFETY: `data` was created from an `&F` in `new` and is still
            // live (wait barrier).
            let f = unsafe { &*data.cast::<F>() };
            f(args);
        }
        Self {
            data: (f as *const F).cast::<()>(),
            call: trampoline::<F, A>,
        }
    }

    /// # Safety
    /// Must only run before the helper's `wait` returns.
    unsafe fn invoke(&self, args: A) {
        // SAFETY: forwarded to the trampoline contract.
        unsafe { (self.call)(self.data, args) }
    }
}

/// Chunk bounds for worker `i`: the even share plus one remainder index for
/// the leading `remainder` workers, mirrored by every helper below.
#[inline]
fn even_chunk(start: u32, range: u32, workers: u32, i: u32) -> (u32, u32) {
    let chunk = range / workers;
    (start + i * chunk, start + (i + 1) * chunk)
}

/// Runs `f(i)` for every `i` in `[start, end)`, split across the pool.
pub fn parallel_for<F>(start: u32, end: u32, f: F, pool: &JobPool)
where
    F: Fn(u32) + Sync,
{
    let _span = profiler::span("parallel_for");
    assert!(end >= start, "descending range");
    assert!(pool.worker_count() > 0);

    let range = end - start;
    if range == 0 {
        return;
    }

    let workers = pool.worker_count() as u32;
    let remainder = range % workers;
    let rem_start = end - remainder;
    let task = TaskRef::new(&f);

    for i in 0..workers {
        let (chunk_start, chunk_end) = even_chunk(start, range, workers, i);
        let extra = (i < remainder).then(|| rem_start + i);
        if chunk_start == chunk_end && extra.is_none() {
            break;
        }

        pool.submit(move || {
            for index in chunk_start..chunk_end {
                // SAFETY: the wait barrier below keeps `f` alive.
                unsafe { task.invoke(index) };
            }
            if let Some(extra) = extra {
                // SAFETY: as above.
                unsafe { task.invoke(extra) };
            }
        });
    }

    pool.wait();
}

/// Runs `f(chunk_start, chunk_end)` once per non-empty chunk of
/// `[start, end)`.
pub fn parallel_for_chunk<F>(start: u32, end: u32, f: F, pool: &JobPool)
where
    F: Fn(u32, u32) + Sync,
{
    let _span = profiler::span("parallel_for_chunk");
    assert!(end >= start, "descending range");
    assert!(pool.worker_count() > 0);

    let range = end - start;
    if range == 0 {
        return;
    }

    let workers = pool.worker_count() as u32;
    let remainder = range % workers;
    let adapter = |args: (u32, u32)| f(args.0, args.1);
    let task = TaskRef::new(&adapter);

    let mut cursor = start;
    for i in 0..workers {
        let chunk = range / workers + u32::from(i < remainder);
        if chunk == 0 {
            break;
        }
        let bounds = (cursor, cursor + chunk);
        pool.submit(move || {
            // SAFETY: the wait barrier below keeps the callback alive.
            unsafe { task.invoke(bounds) };
        });
        cursor += chunk;
    }

    pool.wait();
}

/// Runs `f(x, y)` for every cell of the rectangle `[start, end)`, splitting
/// the longer axis across the pool.
pub fn parallel_for_2d<F>(start: (u32, u32), end: (u32, u32), f: F, pool: &JobPool)
where
    F: Fn(u32, u32) + Sync,
{
    let _span = profiler::span("parallel_for_2d");
    assert!(end.0 >= start.0 && end.1 >= start.1, "descending range");
    assert!(pool.worker_count() > 0);

    let range_x = end.0 - start.0;
    let range_y = end.1 - start.1;
    if range_x == 0 || range_y == 0 {
        return;
    }

    let workers = pool.worker_count() as u32;
    let adapter = |args: (u32, u32)| f(args.0, args.1);
    let task = TaskRef::new(&adapter);
    let split_x = range_x >= range_y;
    let (split_range, split_start) = if split_x {
        (range_x, start.0)
    } else {
        (range_y, start.1)
    };
    let remainder = split_range % workers;

    let mut cursor = split_start;
    for i in 0..workers {
        let chunk = split_range / workers + u32::from(i < remainder);
        if chunk == 0 {
            break;
        }
        let slab = (cursor, cursor + chunk);
        pool.submit(move || {
            if split_x {
                for x in slab.0..slab.1 {
                    for y in start.1..end.1 {
                        // SAFETY: the wait barrier below keeps `f` alive.
                        unsafe { task.invoke((x, y)) };
                    }
                }
            } else {
                for x in start.0..end.0 {
                    for y in slab.0..slab.1 {
                        // SAFETY: as above.
                        unsafe { task.invoke((x, y)) };
                    }
                }
            }
        });
        cursor += chunk;
    }

    pool.wait();
}

/// Runs `f(tile_start, tile_end)` once per tile of the rectangle
/// `[start, end)`; tiles are slabs of the longer axis.
pub fn parallel_for_2d_chunk<F>(start: (u32, u32), end: (u32, u32), f: F, pool: &JobPool)
where
    F: Fn((u32, u32), (u32, u32)) + Sync,
{
    let _span = profiler::span("parallel_for_2d_chunk");
    assert!(end.0 >= start.0 && end.1 >= start.1, "descending range");
    assert!(pool.worker_count() > 0);

    let range_x = end.0 - start.0;
    let range_y = end.1 - start.1;
    if range_x == 0 || range_y == 0 {
        return;
    }

    let workers = pool.worker_count() as u32;
    let adapter = |args: ((u32, u32), (u32, u32))| f(args.0, args.1);
    let task = TaskRef::new(&adapter);
    let split_x = range_x >= range_y;
    let (split_range, split_start) = if split_x {
        (range_x, start.0)
    } else {
        (range_y, start.1)
    };
    let remainder = split_range % workers;

    let mut cursor = split_start;
    for i in 0..workers {
        let chunk = split_range / workers + u32::from(i < remainder);
        if chunk == 0 {
            break;
        }
        let slab = (cursor, cursor + chunk);
        let tile = if split_x {
            ((slab.0, start.1), (slab.1, end.1))
        } else {
            ((start.0, slab.0), (end.0, slab.1))
        };
        pool.submit(move || {
            // SAFETY: the wait barrier below keeps the callback alive.
            unsafe { task.invoke(tile) };
        });
        cursor += chunk;
    }

    pool.wait();
}
