// SPDX-License-Identifier: MIT

//! The eight-step pipeline each assignment-queue job runs through. Steps
//! 1-7 never propagate an error out of the worker —
//! every failure is logged and falls through toward cleanup; step 8 always
//! runs, enforced by the [`UnpackDir`] guard rather than a manual
//! `finally`-style block.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use vqm_adapters::{download_external_files, unpack_bundle, CallbackClient, ExecutorSupervisor};
use vqm_core::{Job, SubmissionConfig};

use crate::guards::{ReservedSlot, UnpackDir};
use crate::slot_registry::VmSlotRegistry;

pub struct JobProcessor<C: CallbackClient> {
    registry: Arc<VmSlotRegistry>,
    callback: Arc<C>,
    executor_timeout: Duration,
}

impl<C: CallbackClient> JobProcessor<C> {
    pub fn new(registry: Arc<VmSlotRegistry>, callback: Arc<C>, executor_timeout: Duration) -> Self {
        Self {
            registry,
            callback,
            executor_timeout,
        }
    }

    /// Run the full pipeline for `job`. Always returns; every control path
    /// is handled internally.
    pub async fn process(&self, job: Job) {
        let span = tracing::info_span!("job", bundle = %job.bundle_name);
        let _guard = span.enter();

        let Some(unpack_dir) = self.step1_unpack(&job).await else {
            self.unlink_bundle(&job).await;
            return;
        };

        // Step 2: prepare (advisory, never fails the job).
        download_external_files(unpack_dir.path()).await;

        let Some((vm, submission)) = self.open_submission(unpack_dir.path()) else {
            self.unlink_bundle(&job).await;
            return;
        };

        // Step 3: reserve.
        let token = self.registry.reserve(&vm).await;
        if !token.overrides.is_empty() {
            let mut submission = submission;
            if let Err(e) = submission.apply_overrides(&token.overrides) {
                tracing::warn!(error = %e, "failed to apply slot overrides to submission-config");
            }
        }
        let reserved = ReservedSlot::new(self.registry.clone(), vm, token);

        // Step 4: announce.
        if let Err(e) = self.callback.announce_processing(&job.bundle_name).await {
            tracing::warn!(error = %e, "failed to announce PROCESSING status; continuing");
        }

        // Step 5: execute.
        let outcome = ExecutorSupervisor::run(unpack_dir.path(), self.executor_timeout).await;
        tracing::info!(?outcome, "executor run finished");

        // Step 6: release.
        reserved.release().await;

        // Step 7: report.
        let vmr_files = collect_vmr_files(unpack_dir.path());
        let vmr_refs: Vec<&Path> = vmr_files.iter().map(PathBuf::as_path).collect();
        if let Err(e) = self.callback.report_done(&job.bundle_name, &vmr_refs).await {
            tracing::warn!(error = %e, "failed to report DONE status");
        }

        // Step 8: cleanup. Dropping the guard removes the unpack directory
        // before the bundle itself is unlinked, matching the "unlink
        // strictly after DONE callback, after the temp dir is gone" law.
        drop(unpack_dir);
        self.unlink_bundle(&job).await;
    }

    async fn step1_unpack(&self, job: &Job) -> Option<UnpackDir> {
        let disambiguator = Uuid::new_v4().simple().to_string();
        let dest = job.paths.unpack_dir_for(&job.bundle_name, &disambiguator);
        if let Err(e) = std::fs::create_dir_all(&dest) {
            tracing::error!(dir = %dest.display(), error = %e, "failed to create unpack directory");
            return None;
        }
        let guard = UnpackDir::new(dest);

        if let Err(e) = unpack_bundle(&job.bundle_path(), guard.path()) {
            tracing::error!(bundle = %job.bundle_name, error = %e, "failed to unpack bundle; skipping job");
            return None;
        }
        Some(guard)
    }

    fn open_submission(&self, unpack_dir: &Path) -> Option<(vqm_core::VmIdentity, SubmissionConfig)> {
        let submission = match SubmissionConfig::open(unpack_dir) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to open submission-config; skipping job");
                return None;
            }
        };
        let vm = match submission.vm_identity() {
            Ok(vm) => vm,
            Err(e) => {
                tracing::error!(error = %e, "submission-config missing [Assignment].Machine; skipping job");
                return None;
            }
        };
        Some((vm, submission))
    }

    async fn unlink_bundle(&self, job: &Job) {
        if let Err(e) = tokio::fs::remove_file(job.bundle_path()).await {
            tracing::warn!(bundle = %job.bundle_name, error = %e, "failed to unlink bundle from spool");
        }
    }
}

/// Collect every `*.vmr` file under `unpack_dir`, recursively, for the
/// `DONE` callback's artifact attachments.
fn collect_vmr_files(unpack_dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![unpack_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "vmr") {
                out.push(path);
            }
        }
    }
    out
}
