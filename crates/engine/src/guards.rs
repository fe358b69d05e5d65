// SPDX-License-Identifier: MIT

//! Scoped resource guards for the job-processing pipeline: RAII wrappers
//! that tie an unpack directory or a reserved slot to a Rust value's
//! lifetime instead of a manual cleanup block.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vqm_core::{SlotToken, VmIdentity};

use crate::slot_registry::VmSlotRegistry;

/// Owns a job's unpack directory and removes it on drop, so every early
/// return in the pipeline (unpack failure, missing submission-config,
/// reservation failure) still cleans up instead of leaking a temp
/// directory. Step 8 of the pipeline removes it explicitly on the happy
/// path; this is the backstop for every other path.
pub struct UnpackDir {
    path: PathBuf,
}

impl UnpackDir {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnpackDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!(
                    dir = %self.path.display(),
                    error = %e,
                    "failed to remove unpack directory"
                );
            }
        }
    }
}

/// A reserved [`SlotToken`], released exactly once via [`ReservedSlot::release`].
///
/// Modeled as an owned value consumed by an explicit async `release()` call
/// at the right point in the pipeline rather than a synchronous `Drop`,
/// since returning the token to its registry is itself an async operation
/// (it may wake a waiting reservation). The `Drop` impl is a last-resort
/// safety net: it must never fire with a token still held on any pipeline
/// path, and only logs a warning if a future bug leaves one stranded.
pub struct ReservedSlot {
    registry: Arc<VmSlotRegistry>,
    vm: VmIdentity,
    token: Option<SlotToken>,
}

impl ReservedSlot {
    pub fn new(registry: Arc<VmSlotRegistry>, vm: VmIdentity, token: SlotToken) -> Self {
        Self {
            registry,
            vm,
            token: Some(token),
        }
    }

    pub fn token(&self) -> &SlotToken {
        self.token
            .as_ref()
            .expect("token is only taken by release(), which consumes self")
    }

    /// Return the token to its VM's pool. Consumes `self`, so a released
    /// slot cannot be released twice.
    pub async fn release(mut self) {
        if let Some(token) = self.token.take() {
            self.registry.release(&self.vm, token).await;
        }
    }
}

impl Drop for ReservedSlot {
    fn drop(&mut self) {
        if self.token.is_some() {
            tracing::warn!(
                vm = %self.vm,
                "slot token dropped without being released; this is a pipeline bug"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_dir_guard_removes_directory_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("job-unpack");
        std::fs::create_dir_all(&dir).unwrap();
        {
            let _guard = UnpackDir::new(dir.clone());
        }
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn reserved_slot_release_returns_token_to_registry() {
        let registry = Arc::new(VmSlotRegistry::empty());
        let vm = VmIdentity::new("win1");
        let token = registry.reserve(&vm).await;
        let reserved = ReservedSlot::new(registry.clone(), vm.clone(), token);
        reserved.release().await;

        let reacquired = tokio::time::timeout(std::time::Duration::from_millis(50), registry.reserve(&vm))
            .await
            .expect("token should have been returned by release()");
        assert_eq!(reacquired.worker_id, "default");
    }
}
