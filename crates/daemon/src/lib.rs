// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vqm-daemon: the `vmchecker-queue-managerd` binary's process wiring —
//! CLI parsing, stdio redirection, course-config resolution, logging setup,
//! and startup of the Spool Watcher / Stale-Job Scanner / Worker Pool.
//!
//! Everything here is glue; the actual scheduling fabric lives in
//! `vqm-engine` and the external collaborators in `vqm-adapters`.

pub mod cli;
pub mod logging;
pub mod redirect;
pub mod stale_scan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use vqm_adapters::{BundleEvent, HttpCallbackClient, SpoolWatcher};
use vqm_core::{CourseConfig, ConfigError, Job, PathRegistry};
use vqm_engine::{AssignmentQueue, JobProcessor, VmSlotRegistry};

/// Environment variable naming the directory that holds `<course_id>.toml`
/// course config files.
pub const CONFIG_DIR_ENV: &str = "VQM_CONFIG_DIR";

/// Fallback course-config root used when `VQM_CONFIG_DIR` is unset.
const DEFAULT_CONFIG_DIR: &str = "/etc/vqm/courses";

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to arm spool watcher: {0}")]
    Watch(#[from] vqm_adapters::WatcherError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

/// Resolve the path to a course's config file from `VQM_CONFIG_DIR` (or the
/// built-in fallback) and the course id.
pub fn course_config_path(course_id: &str) -> PathBuf {
    let root = std::env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
    Path::new(&root).join(format!("{course_id}.toml"))
}

/// Run the daemon to completion: arm the watcher, run the stale-job scan,
/// spawn the worker pool, and dispatch jobs until SIGINT/SIGTERM.
///
/// Never returns an error once startup succeeds — every per-job failure is
/// handled internally by the engine; this only surfaces startup-time
/// configuration or OS-level failures.
pub async fn run(config: CourseConfig) -> Result<(), DaemonError> {
    let paths = Arc::new(PathRegistry::new(config.unzip_dir.clone()));
    let registry = Arc::new(VmSlotRegistry::new(&config));
    let callback = Arc::new(HttpCallbackClient::new(config.callback_base_url.clone()));
    let processor = Arc::new(JobProcessor::new(
        registry,
        callback,
        config.executor_timeout,
    ));
    let queue = Arc::new(AssignmentQueue::new());

    vqm_engine::worker_pool::spawn(config.num_workers, queue.clone(), processor);

    // Arm the watcher first, then run the stale scan — any bundle arriving
    // in the gap is caught by the watcher; the assignment queue's
    // dedupe-by-name handles the rare double-observation.
    let mut watcher = SpoolWatcher::start(&config.spool_dir)?;

    for bundle_name in stale_scan::scan(&config.spool_dir) {
        tracing::info!(bundle = %bundle_name, "recovered stale bundle from spool at startup");
        queue.push(Job::new(config.spool_dir.clone(), bundle_name, paths.clone()));
    }

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(DaemonError::Signal)?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(DaemonError::Signal)?;

    tracing::info!(spool = %config.spool_dir.display(), "queue manager ready");

    loop {
        tokio::select! {
            event = watcher.recv() => {
                match event {
                    Some(BundleEvent { bundle_name }) => {
                        queue.push(Job::new(config.spool_dir.clone(), bundle_name, paths.clone()));
                    }
                    None => {
                        tracing::error!("spool watcher channel closed unexpectedly; shutting down");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    // No cooperative cancellation of in-flight jobs: process termination is
    // the only shutdown path. In-flight bundles remain in the spool and are
    // picked up by the stale-job scanner on next startup.
    Ok(())
}
