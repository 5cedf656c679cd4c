//! Worker pool with dependency-graph dispatch.
//!
//! ## Model
//! A fixed set of worker threads (default: hardware parallelism − 1, at
//! least one) shares a LIFO stack of *ready* jobs guarded by one mutex and
//! one condition variable. A job is a closure plus a dependency counter and
//! a child list; a child becomes ready only when its last parent finishes.
//!
//! ## Submission
//! [`JobPool::submit`] wraps a closure in a fresh parentless job.
//! [`JobPool::submit_job`] pushes a pre-built graph root; its transitive
//! descendants are counted exactly once (a seen-set deduplicates diamonds)
//! so [`JobPool::wait`] knows when the whole graph has drained.
//!
//! ## Ordering
//! No fairness guarantee; LIFO is acceptable. The only cross-job ordering
//! is the happens-before edge from a parent's completion to each child's
//! first instruction, carried by the release/acquire decrement of the
//! child's dependency counter.
//!
//! ## Failure
//! A panicking closure is caught and reported to stderr; the outstanding
//! counter and the children's dependency counts still advance, so `wait`
//! terminates and dependents stay runnable.
//!
//! ## Lifecycle
//! [`JobPool::stop`] drains ready work, joins all workers and clears
//! bookkeeping; [`JobPool::restart`] respawns them. Submitting while no
//! workers are live is a debug-asserted no-op returning `false`.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::profiling::profiler;

type Payload = Box<dyn FnOnce() + Send>;

pub(crate) struct JobNode {
    payload: Mutex<Option<Payload>>,
    /// Unsatisfied parents; reaching zero makes the job ready.
    dependencies: AtomicUsize,
    children: Mutex<Vec<Arc<JobNode>>>,
}

/// A pre-built job: a closure plus dependency edges, submitted through
/// [`JobPool::submit_job`].
pub struct Job {
    node: Arc<JobNode>,
}

impl Job {
    fn new(payload: Payload) -> Self {
        Self {
            node: Arc::new(JobNode {
                payload: Mutex::new(Some(payload)),
                dependencies: AtomicUsize::new(0),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Declares `child` to run only after this job completes.
    ///
    /// A job may have several parents; it runs once all of them finished.
    /// Cycles are the caller's responsibility and will never become ready.
    pub fn add_child(&self, child: &Job) {
        child.node.dependencies.fetch_add(1, Ordering::Relaxed);
        self.node.children.lock().push(Arc::clone(&child.node));
    }
}

struct PoolState {
    ready: Vec<Arc<JobNode>>,
    stop: bool,
    /// Descendants already counted toward `outstanding` by graph submits;
    /// keyed by node address, cleared by `wait`/`stop`.
    counted: HashSet<usize>,
}

struct PoolShared {
    state: Mutex<PoolState>,
    work_available: Condvar,
    /// Submitted-but-unfinished jobs, including not-yet-ready descendants.
    outstanding: AtomicUsize,
    live_workers: AtomicUsize,
}

/// Fixed worker pool executing closure jobs with dependency dispatch.
pub struct JobPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    worker_target: usize,
}

impl Default for JobPool {
    fn default() -> Self {
        Self::new()
    }
}

impl JobPool {
    /// Creates a pool with `hardware parallelism − 1` workers (at least 1).
    pub fn new() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(2);
        Self::with_workers(parallelism.saturating_sub(1))
    }

    /// Creates a pool with `workers` threads (clamped to at least 1).
    pub fn with_workers(workers: usize) -> Self {
        let mut pool = Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    ready: Vec::new(),
                    stop: false,
                    counted: HashSet::new(),
                }),
                work_available: Condvar::new(),
                outstanding: AtomicUsize::new(0),
                live_workers: AtomicUsize::new(0),
            }),
            workers: Vec::new(),
            worker_target: workers.max(1),
        };
        pool.restart();
        pool
    }

    /// Number of worker threads this pool runs when started.
    pub fn worker_count(&self) -> usize {
        self.worker_target
    }

    /// Wraps a closure in an unsubmitted job, ready for edge building.
    pub fn create_job(&self, f: impl FnOnce() + Send + 'static) -> Job {
        Job::new(Box::new(f))
    }

    /// Submits a parentless closure job.
    ///
    /// Returns `false` (debug builds assert) when no workers are live.
    pub fn submit(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.push_root(Job::new(Box::new(f)).node)
    }

    /// Submits a pre-built root job and accounts for its whole graph.
    ///
    /// Every transitive descendant not seen by an earlier submit is counted
    /// once, which establishes the termination condition [`wait`](Self::wait)
    /// observes. Descendants become ready as their parents finish.
    pub fn submit_job(&self, root: &Job) -> bool {
        self.push_root(Arc::clone(&root.node))
    }

    fn push_root(&self, node: Arc<JobNode>) -> bool {
        if self.shared.live_workers.load(Ordering::Acquire) == 0 {
            debug_assert!(false, "submit on a stopped pool");
            return false;
        }

        let mut state = self.shared.state.lock();

        // Count unseen descendants exactly once across submits.
        let mut new_descendants = 0usize;
        let mut pending: Vec<Arc<JobNode>> = node.children.lock().clone();
        while let Some(descendant) = pending.pop() {
            let key = Arc::as_ptr(&descendant) as usize;
            if !state.counted.insert(key) {
                continue;
            }
            new_descendants += 1;
            pending.extend(descendant.children.lock().iter().cloned());
        }

        self.shared
            .outstanding
            .fetch_add(1 + new_descendants, Ordering::Relaxed);
        state.ready.push(node);
        drop(state);

        self.shared.work_available.notify_one();
        true
    }

    /// Blocks until the ready stack is empty and every counted job has run,
    /// then resets the graph bookkeeping.
    pub fn wait(&self) {
        let _span = profiler::span("JobPool::wait");

        loop {
            if self.shared.state.lock().ready.is_empty() {
                break;
            }
            std::thread::yield_now();
        }

        while self.shared.outstanding.load(Ordering::Acquire) != 0 {
            std::thread::yield_now();
        }

        self.shared.outstanding.store(0, Ordering::Relaxed);
        self.shared.state.lock().counted.clear();
    }

    /// Signals stop, drains ready work, joins every worker and clears
    /// bookkeeping. The pool is reusable via [`restart`](Self::restart).
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.stop = true;
        }
        self.shared.work_available.notify_all();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }

        let mut state = self.shared.state.lock();
        state.stop = false;
        state.counted.clear();
        state.ready.clear();
        drop(state);
        self.shared.outstanding.store(0, Ordering::Relaxed);
    }

    /// Respawns the worker threads after a [`stop`](Self::stop).
    pub fn restart(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        self.shared
            .live_workers
            .store(self.worker_target, Ordering::Release);
        for _ in 0..self.worker_target {
            let shared = Arc::clone(&self.shared);
            self.workers.push(std::thread::spawn(move || {
                worker_loop(&shared);
                shared.live_workers.fetch_sub(1, Ordering::Release);
            }));
        }
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let node = {
            let mut state = shared.state.lock();
            loop {
                if let Some(node) = state.ready.pop() {
                    break node;
                }
                // Exit only once ready work has drained.
                if state.stop {
                    return;
                }
                shared.work_available.wait(&mut state);
            }
        };

        // Run outside the lock. The payload is taken so a node can never
        // execute twice.
        if let Some(payload) = node.payload.lock().take() {
            if catch_unwind(AssertUnwindSafe(payload)).is_err() {
                eprintln!("sim_runtime: job panicked; releasing its dependents");
            }
        }

        shared.outstanding.fetch_sub(1, Ordering::Release);

        // Release children whose last parent just finished. The AcqRel
        // decrement publishes this job's writes to the child.
        let children = node.children.lock();
        for child in children.iter() {
            if child.dependencies.fetch_sub(1, Ordering::AcqRel) == 1 {
                shared.state.lock().ready.push(Arc::clone(child));
                shared.work_available.notify_one();
            }
        }
    }
}
