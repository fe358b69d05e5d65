// SPDX-License-Identifier: MIT

//! A pending unit of work: one bundle dropped into the spool.

use std::path::PathBuf;
use std::sync::Arc;

/// Shared, read-only paths every job needs to compute its own working
/// locations, handed to each [`Job`] instead of threaded through every call
/// site individually.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    /// Root directory the tester unpacks bundles under; each job gets its
    /// own fresh subdirectory here.
    pub unzip_root: PathBuf,
}

impl PathRegistry {
    pub fn new(unzip_root: impl Into<PathBuf>) -> Self {
        Self {
            unzip_root: unzip_root.into(),
        }
    }

    /// A fresh, not-yet-created unpack directory for `bundle_name`.
    ///
    /// Includes a short random suffix so two jobs for bundles that happen to
    /// share a name (e.g. after a prior crash left a stale bundle with the
    /// same filename re-submitted) never collide on the same directory.
    pub fn unpack_dir_for(&self, bundle_name: &str, disambiguator: &str) -> PathBuf {
        self.unzip_root
            .join(format!("{bundle_name}-{disambiguator}"))
    }
}

/// A pending unit of work: one bundle archive sitting in the spool,
/// discovered either by the Spool Watcher or the Stale-Job Scanner.
///
/// The bundle file itself is the durable representation of this job — there
/// is no separate persisted job record. Destroyed (the bundle unlinked) only
/// after the Job Processor fully finalizes it.
#[derive(Debug, Clone)]
pub struct Job {
    pub spool_dir: PathBuf,
    pub bundle_name: String,
    pub paths: Arc<PathRegistry>,
}

impl Job {
    pub fn new(spool_dir: impl Into<PathBuf>, bundle_name: impl Into<String>, paths: Arc<PathRegistry>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            bundle_name: bundle_name.into(),
            paths,
        }
    }

    /// Full path to the bundle archive file in the spool.
    pub fn bundle_path(&self) -> PathBuf {
        self.spool_dir.join(&self.bundle_name)
    }
}
