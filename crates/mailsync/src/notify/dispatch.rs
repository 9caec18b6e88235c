//! Bounded sync-job dispatcher
//!
//! A fixed worker pool drains a bounded queue. When the queue is full the
//! job is dropped with a warning; the provider redelivers notifications and
//! the next one catches the account up, so dropping is safe back-pressure.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::models::{AccountId, SequencePosition};
use crate::sync::SyncService;

/// A queued request to sync one account
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub account_id: AccountId,
    /// Position claimed by the triggering notification; a job found stale
    /// against the stored position at execution time is dropped
    pub claimed_sequence: SequencePosition,
}

/// Where accepted notifications go. Implemented by `SyncDispatcher`; tests
/// substitute a recording sink.
pub trait JobSink: Send + Sync {
    /// False means the job was dropped (queue full or shut down)
    fn submit(&self, job: SyncJob) -> bool;
}

/// Worker pool behind a bounded queue
pub struct SyncDispatcher {
    sender: Mutex<Option<SyncSender<SyncJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncDispatcher {
    /// Spawn `worker_count` threads draining a queue of `queue_depth` slots
    pub fn start(service: Arc<SyncService>, worker_count: usize, queue_depth: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<SyncJob>(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    loop {
                        // Hold the receiver lock only while taking a job
                        let job = { receiver.lock().unwrap().recv() };
                        match job {
                            Ok(job) => {
                                service.run_job(&job.account_id, &job.claimed_sequence)
                            }
                            // Channel closed: dispatcher is shutting down
                            Err(_) => break,
                        }
                    }
                })
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queue a job without blocking; a full queue drops it with a warning
    pub fn enqueue(&self, job: SyncJob) -> bool {
        let sender = self.sender.lock().unwrap();
        let Some(sender) = sender.as_ref() else {
            return false;
        };

        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                log::warn!(
                    "Sync queue full, dropping job for account {}",
                    job.account_id.as_str()
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Let the workers drain everything queued, then join them. Idempotent.
    pub fn shutdown(&self) {
        // Dropping the sender ends the workers' recv loops
        drop(self.sender.lock().unwrap().take());

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl JobSink for SyncDispatcher {
    fn submit(&self, job: SyncJob) -> bool {
        self.enqueue(job)
    }
}

impl Drop for SyncDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
