/// Background executor: a fixed pool of worker threads draining a shared
/// job channel.
///
/// Jobs are opaque closures; submission order is preserved by the channel
/// but execution order across workers is not guaranteed. Shutdown closes
/// the channel, lets workers finish the jobs already queued, and joins
/// them.
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::thread::JoinHandle;
use tracing::{debug, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Executor {
    tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub(crate) fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(threads);
        for idx in 0..threads {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bg-worker-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                    debug!(worker = idx, "background worker exiting");
                })
                .unwrap_or_else(|e| panic!("failed to spawn background worker: {e}"));
            workers.push(handle);
        }

        Self {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a job. Jobs submitted after shutdown are dropped with a
    /// warning.
    pub(crate) fn schedule(&self, job: Job) {
        match &*self.tx.lock() {
            Some(tx) => {
                let _ = tx.send(job);
            }
            None => warn!("job submitted after executor shutdown, dropping"),
        }
    }

    /// Closes the queue and joins the workers. Idempotent.
    pub(crate) fn shutdown(&self) {
        let sender = self.tx.lock().take();
        drop(sender);

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
