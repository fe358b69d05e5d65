// SPDX-License-Identifier: MIT

//! Spawns `num_workers` tokio tasks, each looping receive-process-repeat
//! against the shared [`AssignmentQueue`]. Workers
//! are not specialized by VM identity — VM-level serialization is entirely
//! the [`crate::slot_registry::VmSlotRegistry`]'s job.

use std::sync::Arc;

use tokio::task::JoinHandle;

use vqm_adapters::CallbackClient;

use crate::queue::AssignmentQueue;
use crate::processor::JobProcessor;

/// Spawn `num_workers` worker tasks. Each runs until `queue` is dropped and
/// drained (`recv` returns `None`), at which point its task ends.
pub fn spawn<C: CallbackClient + 'static>(
    num_workers: usize,
    queue: Arc<AssignmentQueue>,
    processor: Arc<JobProcessor<C>>,
) -> Vec<JoinHandle<()>> {
    (0..num_workers)
        .map(|worker_id| {
            let queue = queue.clone();
            let processor = processor.clone();
            tokio::spawn(async move {
                loop {
                    let Some(job) = queue.recv().await else {
                        tracing::debug!(worker_id, "assignment queue closed; worker exiting");
                        break;
                    };
                    let bundle_name = job.bundle_name.clone();
                    tracing::debug!(worker_id, bundle = %bundle_name, "picked up job");
                    processor.process(job).await;
                    queue.mark_complete(&bundle_name);
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vqm_adapters::FakeCallbackClient;
    use vqm_core::{Job, PathRegistry};

    #[tokio::test]
    async fn worker_pool_drains_the_queue() {
        let spool = tempfile::tempdir().unwrap();
        std::fs::write(spool.path().join("bad.zip"), b"not a zip").unwrap();

        let unzip_root = tempfile::tempdir().unwrap();
        let paths = Arc::new(PathRegistry::new(unzip_root.path()));
        let job = Job::new(spool.path(), "bad.zip", paths);

        let queue = Arc::new(AssignmentQueue::new());
        queue.push(job);

        let registry = Arc::new(crate::slot_registry::VmSlotRegistry::empty());
        let callback = Arc::new(FakeCallbackClient::new());
        let processor = Arc::new(JobProcessor::new(registry, callback, Duration::from_secs(5)));

        let handles = spawn(2, queue.clone(), processor);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!spool.path().join("bad.zip").exists());

        for handle in handles {
            handle.abort();
        }
    }
}
