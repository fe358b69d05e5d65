// SPDX-License-Identifier: MIT

//! VM slot registry: the reservation/release protocol over per-VM pools of
//! slot tokens.
//!
//! Implemented as a concurrent get-or-create map (`parking_lot::Mutex`
//! guarding only the insertion step) over independently-synchronized
//! per-VM queues, rather than a coarse lock held for the whole reservation —
//! a bounded `tokio::sync::mpsc` channel already gives a VM's queue its own
//! dequeue/enqueue concurrency once it exists, so the registry-wide lock
//! only needs to be held long enough to look up or insert that queue.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use vqm_core::{CourseConfig, SlotToken, VmIdentity};

/// One VM identity's pool of slot tokens. Capacity is fixed at creation:
/// the number of duplicate instances configured for this identity, or one
/// for a default-mode identity.
struct SlotQueue {
    tx: mpsc::Sender<SlotToken>,
    rx: AsyncMutex<mpsc::Receiver<SlotToken>>,
}

impl SlotQueue {
    fn seeded(tokens: Vec<SlotToken>) -> Self {
        let capacity = tokens.len().max(1);
        let (tx, rx) = mpsc::channel(capacity);
        for token in tokens {
            // Capacity always covers the seed set; this can't block.
            tx.try_send(token).ok();
        }
        Self {
            tx,
            rx: AsyncMutex::new(rx),
        }
    }

    async fn pop(&self) -> SlotToken {
        let mut rx = self.rx.lock().await;
        rx.recv()
            .await
            .expect("slot queue sender is held by the same SlotQueue and never dropped")
    }

    async fn push(&self, token: SlotToken) {
        // The receiving half outlives every sender clone (both live in this
        // struct), so the channel can't be closed out from under us.
        let _ = self.tx.send(token).await;
    }
}

/// Tracks one per-VM-identity slot pool, created lazily on first reservation
/// ("Default mode") or seeded at startup from the course config's declared
/// duplicates ("Duplicated mode").
pub struct VmSlotRegistry {
    queues: SyncMutex<HashMap<VmIdentity, Arc<SlotQueue>>>,
    duplicates: HashMap<VmIdentity, Vec<SlotToken>>,
}

impl VmSlotRegistry {
    pub fn new(config: &CourseConfig) -> Self {
        Self {
            queues: SyncMutex::new(HashMap::new()),
            duplicates: config.slot_tokens(),
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn empty() -> Self {
        Self {
            queues: SyncMutex::new(HashMap::new()),
            duplicates: HashMap::new(),
        }
    }

    fn get_or_create(&self, vm: &VmIdentity) -> Arc<SlotQueue> {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get(vm) {
            return queue.clone();
        }
        let tokens = self
            .duplicates
            .get(vm)
            .cloned()
            .unwrap_or_else(|| vec![SlotToken::default_token()]);
        let queue = Arc::new(SlotQueue::seeded(tokens));
        queues.insert(vm.clone(), queue.clone());
        queue
    }

    /// Reserve one token for `vm`, blocking (asynchronously) until one is
    /// available.
    pub async fn reserve(&self, vm: &VmIdentity) -> SlotToken {
        self.get_or_create(vm).pop().await
    }

    /// Return a previously reserved token to `vm`'s pool.
    pub async fn release(&self, vm: &VmIdentity, token: SlotToken) {
        self.get_or_create(vm).push(token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config_with_duplicates() -> CourseConfig {
        let body = r#"
spool_dir = "/tmp/spool"
unzip_dir = "/tmp/unzip"
num_workers = 2
executor_timeout_secs = 60
callback_base_url = "https://submissions.example.edu/api"
duplicated_vms = ["deb1"]

[deb1a]
mac = "AA"

[deb1b]
mac = "BB"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("course.toml");
        std::fs::write(&path, body).unwrap();
        CourseConfig::load(&path).unwrap()
    }

    #[tokio::test]
    async fn default_mode_vm_gets_exactly_one_token() {
        let registry = VmSlotRegistry::empty();
        let vm = VmIdentity::new("win1");
        let token = registry.reserve(&vm).await;
        assert_eq!(token.worker_id, "default");

        // A second reservation must wait for the release.
        let reserve_again = tokio::time::timeout(Duration::from_millis(50), registry.reserve(&vm)).await;
        assert!(reserve_again.is_err(), "second reservation should block while the only token is out");

        registry.release(&vm, token).await;
        let token2 = tokio::time::timeout(Duration::from_millis(50), registry.reserve(&vm))
            .await
            .unwrap();
        assert_eq!(token2.worker_id, "default");
    }

    #[tokio::test]
    async fn duplicated_vm_draws_from_both_tokens() {
        let config = config_with_duplicates();
        let registry = VmSlotRegistry::new(&config);
        let vm = VmIdentity::new("deb1");

        let t1 = registry.reserve(&vm).await;
        let t2 = registry.reserve(&vm).await;
        let mut worker_ids = vec![t1.worker_id.clone(), t2.worker_id.clone()];
        worker_ids.sort();
        assert_eq!(worker_ids, vec!["a", "b"]);

        let blocked = tokio::time::timeout(Duration::from_millis(50), registry.reserve(&vm)).await;
        assert!(blocked.is_err());

        registry.release(&vm, t1).await;
        let t3 = tokio::time::timeout(Duration::from_millis(50), registry.reserve(&vm))
            .await
            .unwrap();
        assert_eq!(t3.worker_id, "a");
    }
}
