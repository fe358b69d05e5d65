// SPDX-License-Identifier: MIT

//! Spool directory watcher.
//!
//! Watches for the "write-closed" signal an upstream bundle producer emits
//! once it has finished writing an archive atomically into the spool. On a
//! `close(W_OK)`-granular backend (inotify on Linux, the common deployment
//! target) `notify` reports this directly as
//! `EventKind::Access(AccessKind::Close(AccessMode::Write))`. Backends that
//! only report coarser `Create`/`Modify` events are handled by debouncing:
//! an observed arrival is only emitted once its file size has been stable
//! across two ticks of the settle window, so a still-in-progress upload
//! (mere opens/partial writes) is never mistaken for a completed bundle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How long a candidate bundle's size must remain unchanged before it is
/// considered a completed write (debounce window for coarse-grained
/// backends; irrelevant on inotify where close-write already fires once).
const SETTLE_WINDOW: Duration = Duration::from_millis(250);

/// How often the settle loop re-checks pending candidates.
const SETTLE_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("failed to watch spool directory {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// One completed-bundle arrival, ready to become a [`vqm_core::Job`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEvent {
    pub bundle_name: String,
}

/// Watches a spool directory and emits one [`BundleEvent`] per completed
/// bundle arrival. A single logical producer — never blocks on the
/// assignment queue's capacity, since the queue it feeds is unbounded.
pub struct SpoolWatcher {
    // Held only to keep the underlying OS watch alive; dropping it stops
    // notifications.
    _inner: RecommendedWatcher,
    events: mpsc::Receiver<BundleEvent>,
}

impl SpoolWatcher {
    /// Arm the watcher on `spool_dir`. Once this returns, arrival events are
    /// being captured — callers should run the stale-job scan immediately
    /// after this call returns.
    pub fn start(spool_dir: &Path) -> Result<Self, WatcherError> {
        let spool_dir = spool_dir.to_path_buf();
        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Event>();

        let mut inner = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })
        .map_err(|source| WatcherError::Watch {
            path: spool_dir.clone(),
            source,
        })?;

        inner
            .watch(&spool_dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatcherError::Watch {
                path: spool_dir.clone(),
                source,
            })?;

        let (events_tx, events_rx) = mpsc::channel(256);
        tokio::task::spawn_blocking(move || settle_loop(spool_dir, raw_rx, events_tx));

        Ok(Self {
            _inner: inner,
            events: events_rx,
        })
    }

    /// Await the next completed bundle arrival.
    pub async fn recv(&mut self) -> Option<BundleEvent> {
        self.events.recv().await
    }
}

/// Is this event kind a candidate arrival signal? Ignores bare opens and
/// metadata-only modifications — those indicate a still-in-progress upload.
fn is_arrival_signal(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

fn settle_loop(
    spool_dir: PathBuf,
    raw_rx: std::sync::mpsc::Receiver<notify::Event>,
    events_tx: mpsc::Sender<BundleEvent>,
) {
    let mut pending: HashMap<String, PendingArrival> = HashMap::new();

    loop {
        match raw_rx.recv_timeout(SETTLE_TICK) {
            Ok(event) => {
                if !is_arrival_signal(&event.kind) {
                    continue;
                }
                for path in &event.paths {
                    let Some(name) = bundle_name_of(&spool_dir, path) else {
                        continue;
                    };
                    let entry = pending.entry(name).or_insert_with(PendingArrival::new);
                    entry.last_event = Instant::now();
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let ready: Vec<String> = pending
            .iter()
            .filter(|(name, candidate)| candidate.is_settled(&spool_dir, name))
            .map(|(name, _)| name.clone())
            .collect();

        for name in ready {
            pending.remove(&name);
            if events_tx
                .blocking_send(BundleEvent { bundle_name: name })
                .is_err()
            {
                return;
            }
        }
    }
}

/// Ignores events whose path isn't a direct child of the spool directory
/// (defends against recursive-watcher surprises on some platforms).
fn bundle_name_of(spool_dir: &Path, path: &Path) -> Option<String> {
    if path.parent() != Some(spool_dir) {
        return None;
    }
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

struct PendingArrival {
    last_event: Instant,
    last_size: Option<u64>,
}

impl PendingArrival {
    fn new() -> Self {
        Self {
            last_event: Instant::now(),
            last_size: None,
        }
    }

    /// Settled once the settle window has elapsed since the last event for
    /// this name AND the file's size hasn't changed since the previous
    /// check (a no-op check on backends that already report close-write,
    /// since in that case there is exactly one event per arrival and the
    /// window has always elapsed by the next tick).
    fn is_settled(&mut self, spool_dir: &Path, name: &str) -> bool {
        if self.last_event.elapsed() < SETTLE_WINDOW {
            return false;
        }
        let size = std::fs::metadata(spool_dir.join(name))
            .ok()
            .map(|m| m.len());
        let settled = size.is_some() && size == self.last_size;
        self.last_size = size;
        settled
    }
}
