// SPDX-License-Identifier: MIT

//! The FIFO handoff between the producers (spool watcher, stale-job scan)
//! and the worker pool.
//!
//! Also closes a startup race: the watcher is armed before the stale scan
//! runs its directory listing, so a bundle that arrives in between could
//! otherwise be enqueued twice. Rather than tolerate the race by letting a
//! second unzip attempt fail, this dedupes by bundle name: a push for a
//! name already queued or being processed is dropped, and the name is
//! released for re-enqueueing only once its job finishes.

use std::collections::HashSet;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use vqm_core::Job;

pub struct AssignmentQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Job>>,
    in_flight: SyncMutex<HashSet<String>>,
}

impl AssignmentQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: AsyncMutex::new(rx),
            in_flight: SyncMutex::new(HashSet::new()),
        }
    }

    /// Enqueue `job` unless its bundle name is already queued or in
    /// progress. Returns whether it was actually enqueued.
    pub fn push(&self, job: Job) -> bool {
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(job.bundle_name.clone()) {
                tracing::debug!(
                    bundle = %job.bundle_name,
                    "bundle already queued or in progress; dropping duplicate arrival"
                );
                return false;
            }
        }
        // The receiver lives alongside every sender clone in this struct,
        // so the channel can never be closed out from under a push.
        let _ = self.tx.send(job);
        true
    }

    /// Await the next job. Never resolves to `None` while `self` is alive.
    pub async fn recv(&self) -> Option<Job> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Release `bundle_name` so a later arrival with the same name may be
    /// enqueued again. Called by the Worker Pool once a job's pipeline has
    /// fully finished (success or failure).
    pub fn mark_complete(&self, bundle_name: &str) {
        self.in_flight.lock().remove(bundle_name);
    }
}

impl Default for AssignmentQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vqm_core::PathRegistry;

    fn job(name: &str) -> Job {
        Job::new("/var/spool/vqm", name, Arc::new(PathRegistry::new("/tmp/unzip")))
    }

    #[tokio::test]
    async fn recv_returns_pushed_jobs_in_order() {
        let queue = AssignmentQueue::new();
        assert!(queue.push(job("a.zip")));
        assert!(queue.push(job("b.zip")));
        assert_eq!(queue.recv().await.unwrap().bundle_name, "a.zip");
        assert_eq!(queue.recv().await.unwrap().bundle_name, "b.zip");
    }

    #[tokio::test]
    async fn duplicate_push_while_in_flight_is_dropped() {
        let queue = AssignmentQueue::new();
        assert!(queue.push(job("a.zip")));
        assert!(!queue.push(job("a.zip")));

        let received = queue.recv().await.unwrap();
        assert_eq!(received.bundle_name, "a.zip");

        queue.mark_complete("a.zip");
        assert!(queue.push(job("a.zip")));
    }
}
