use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads fed from a shared queue.
///
/// Jobs run in submission order when the pool has one worker, which is what
/// gives the snapshot pool its deterministic ordering. Dropping the pool
/// closes the queue and joins every worker.
pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(name: &str, size: usize) -> Self {
        debug_assert!(size > 0, "a pool needs at least one worker");
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..size)
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || worker_loop(receiver))
                    .expect("worker thread spawn")
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub(crate) fn execute(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            // Send only fails when every worker is gone, i.e. during teardown.
            let _ = sender.send(Box::new(job));
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let Ok(guard) = receiver.lock() else {
                warn!("pool queue lock poisoned, worker shutting down");
                return;
            };
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            Err(_) => {
                debug!("worker queue closed, shutting down");
                break;
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
