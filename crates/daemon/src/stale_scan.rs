// SPDX-License-Identifier: MIT

//! Enumerates every bundle already sitting in the spool directory at
//! startup and feeds each into the assignment queue.
//!
//! Must run *after* the spool watcher has armed but *before* the daemon
//! settles into steady-state dispatch, so that the union of "already
//! present at scan time" and "arrives after the watch was armed" covers
//! every bundle with at most one harmless double-attempt — see
//! `AssignmentQueue`'s dedupe-by-name handling of that overlap.

use std::path::Path;

/// List every regular file directly under `spool_dir`, sorted by name for
/// deterministic ordering. Directories and unreadable entries are skipped
/// and logged; a missing or unreadable spool directory itself is logged and
/// treated as "nothing stale" rather than aborting startup.
pub fn scan(spool_dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(spool_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(dir = %spool_dir.display(), error = %e, "failed to scan spool directory for stale bundles");
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_regular_files_only_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.zip"), b"x").unwrap();
        std::fs::write(dir.path().join("a.zip"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let found = scan(dir.path());
        assert_eq!(found, vec!["a.zip".to_string(), "b.zip".to_string()]);
    }

    #[test]
    fn missing_spool_dir_yields_empty_list() {
        let found = scan(Path::new("/nonexistent/spool/dir"));
        assert!(found.is_empty());
    }
}
