//! The agent owning a top-level realm's job queue.
//!
//! ## Ordering Guarantees
//!
//! - FIFO: first enqueued, first run
//! - `run_jobs` drains until the queue is empty, including jobs enqueued by
//!   running jobs
//! - A failing job does not stop the drain; the first error is returned

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tern_vm_core::VmResult;

/// A pending job (promise reaction, cleanup callback, ...)
pub type Job = Box<dyn FnOnce() -> VmResult<()> + Send>;

/// Job queue shared by a top-level realm and its children
pub struct Agent {
    queue: Mutex<VecDeque<Job>>,
    len: AtomicUsize,
    can_block: bool,
}

impl Agent {
    /// Empty agent. `can_block` comes from `agent-can-block`.
    pub fn new(can_block: bool) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            can_block,
        }
    }

    /// Append a job
    pub fn enqueue_job<F>(&self, job: F)
    where
        F: FnOnce() -> VmResult<()> + Send + 'static,
    {
        self.queue.lock().push_back(Box::new(job));
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    fn dequeue(&self) -> Option<Job> {
        let job = self.queue.lock().pop_front();
        if job.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        job
    }

    /// Run queued jobs until none remain. Returns the number run.
    pub fn run_jobs(&self) -> VmResult<usize> {
        let mut ran = 0;
        let mut first_error = None;
        // The lock is released before each job runs so jobs may enqueue more.
        while let Some(job) = self.dequeue() {
            ran += 1;
            if let Err(e) = job() {
                tracing::debug!(target: "tern::realm", error = %e, "job failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(ran),
        }
    }

    /// Number of queued jobs
    #[inline]
    pub fn pending_jobs(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether `Atomics.wait` may block this agent
    pub fn can_block(&self) -> bool {
        self.can_block
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("pending_jobs", &self.pending_jobs())
            .field("can_block", &self.can_block)
            .finish()
    }
}
