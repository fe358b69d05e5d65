// SPDX-License-Identifier: MIT

//! Reading and patching a bundle's `submission-config` file.
//!
//! The format is a plain INI file (matching the original Python
//! `ConfigParser`-based implementation): at minimum an `[Assignment]`
//! section with a `Machine` key, and a `[Machine]` section whose keys may be
//! overridden by a slot token's overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::ids::VmIdentity;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("failed to read submission-config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("submission-config {path} has no [Assignment].Machine key")]
    MissingMachine { path: PathBuf },
    #[error("failed to write submission-config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A handle to a bundle's `submission-config` file.
pub struct SubmissionConfig {
    path: PathBuf,
    ini: Ini,
}

impl SubmissionConfig {
    /// Read `submission-config` from `unpack_dir`.
    pub fn open(unpack_dir: &Path) -> Result<Self, SubmissionError> {
        let path = unpack_dir.join("submission-config");
        let ini = Ini::load_from_file(&path).map_err(|source| SubmissionError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, ini })
    }

    /// `[Assignment].Machine` — the VM identity this submission targets.
    pub fn vm_identity(&self) -> Result<VmIdentity, SubmissionError> {
        self.ini
            .get_from(Some("Assignment"), "Machine")
            .map(VmIdentity::new)
            .ok_or_else(|| SubmissionError::MissingMachine {
                path: self.path.clone(),
            })
    }

    /// Apply a duplicate's overrides to the `[Machine]` section, for each
    /// override key already present there, and rewrite the file in place.
    /// Keys absent from `[Machine]` are left untouched — only existing keys
    /// are overwritten.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) -> Result<(), SubmissionError> {
        let existing_keys: Vec<String> = self
            .ini
            .section(Some("Machine"))
            .map(|section| section.iter().map(|(k, _)| k.to_string()).collect())
            .unwrap_or_default();

        for key in existing_keys {
            if let Some(value) = overrides.get(&key) {
                self.ini
                    .set_to(Some("Machine"), key, value.clone());
            }
        }

        self.ini
            .write_to_file(&self.path)
            .map_err(|source| SubmissionError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_submission_config(dir: &Path, body: &str) {
        let mut f = std::fs::File::create(dir.join("submission-config")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn reads_machine_key_from_assignment_section() {
        let dir = tempfile::tempdir().unwrap();
        write_submission_config(
            dir.path(),
            "[Assignment]\nMachine=deb1\n[Machine]\nmac=00:00\n",
        );
        let cfg = SubmissionConfig::open(dir.path()).unwrap();
        assert_eq!(cfg.vm_identity().unwrap(), VmIdentity::new("deb1"));
    }

    #[test]
    fn missing_machine_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_submission_config(dir.path(), "[Assignment]\n");
        let cfg = SubmissionConfig::open(dir.path()).unwrap();
        assert!(matches!(
            cfg.vm_identity(),
            Err(SubmissionError::MissingMachine { .. })
        ));
    }

    #[test]
    fn overrides_only_overwrite_existing_machine_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_submission_config(
            dir.path(),
            "[Assignment]\nMachine=deb1\n[Machine]\nmac=00:00\ndisk=/orig.qcow2\n",
        );
        let mut cfg = SubmissionConfig::open(dir.path()).unwrap();
        let mut overrides = HashMap::new();
        overrides.insert("mac".to_string(), "AA:AA".to_string());
        overrides.insert("not_present".to_string(), "ignored".to_string());
        cfg.apply_overrides(&overrides).unwrap();

        let reloaded = Ini::load_from_file(dir.path().join("submission-config")).unwrap();
        assert_eq!(reloaded.get_from(Some("Machine"), "mac"), Some("AA:AA"));
        assert_eq!(
            reloaded.get_from(Some("Machine"), "disk"),
            Some("/orig.qcow2")
        );
        assert_eq!(reloaded.get_from(Some("Machine"), "not_present"), None);
    }
}
