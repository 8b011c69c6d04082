//! A fixed pool of worker threads draining a shared job queue.
//!
//! Network reads and store staging both run here; completions are posted
//! back to the dispatcher as events, never handled on a worker.
use std::io;
use std::thread;

use crossbeam_channel as chan;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A cloneable handle for submitting jobs to the pool.
#[derive(Clone)]
pub struct Runner {
    jobs: chan::Sender<Job>,
}

impl Runner {
    /// Queue a job. Jobs submitted after shutdown are silently dropped.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.jobs.send(Box::new(job)).ok();
    }
}

/// The pool itself. One thread per worker; threads exit when every
/// [`Runner`] handle has been dropped and the queue is drained.
pub struct Pool {
    jobs: chan::Sender<Job>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl Pool {
    /// Spawn `capacity` named worker threads.
    pub fn with(capacity: usize, name: &str) -> io::Result<Self> {
        let (jobs, queue) = chan::unbounded::<Job>();
        let mut threads = Vec::with_capacity(capacity);

        for i in 0..capacity {
            let queue = queue.clone();
            let thread = thread::Builder::new()
                .name(format!("{name}#{i}"))
                .spawn(move || {
                    while let Ok(job) = queue.recv() {
                        job();
                    }
                })?;
            threads.push(thread);
        }
        Ok(Self { jobs, threads })
    }

    pub fn runner(&self) -> Runner {
        Runner {
            jobs: self.jobs.clone(),
        }
    }

    /// Shut the pool down, blocking until queued jobs finish and all worker
    /// threads have exited. Every outstanding [`Runner`] must be dropped
    /// first, or this will wait for it.
    pub fn run(self) {
        drop(self.jobs);
        for (i, thread) in self.threads.into_iter().enumerate() {
            if thread.join().is_err() {
                log::error!(target: "pool", "worker #{i} panicked");
            }
        }
        log::debug!(target: "pool", "worker pool shut down");
    }
}
