// SPDX-License-Identifier: MIT

//! Course configuration loader.
//!
//! Reads one TOML file per course, resolved by the daemon binary from the
//! configured course-config directory (see `DESIGN.md`).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ids::VmIdentity;
use crate::slot::SlotToken;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read course config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse course config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}

/// One declared duplicate instance of a duplicated VM identity, read from a
/// `[<vm><suffix>]` table in the course config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDuplicate {
    pub worker_id: String,
    pub overrides: HashMap<String, String>,
}

/// Everything the queue manager's core reads out of a course's config file.
#[derive(Debug, Clone)]
pub struct CourseConfig {
    pub spool_dir: PathBuf,
    pub unzip_dir: PathBuf,
    pub num_workers: usize,
    pub executor_timeout: Duration,
    /// Base URL of the upstream submission service's callback endpoint
    /// used to announce and report a job's status to the upstream service.
    pub callback_base_url: String,
    /// VM identities with a statically configured, finite set of duplicate
    /// instances ("Duplicated mode"). Identities not present here operate
    /// in default mode.
    pub duplicated_vms: HashMap<VmIdentity, Vec<VmDuplicate>>,
}

#[derive(Debug, Deserialize)]
struct RawCourseConfig {
    spool_dir: PathBuf,
    unzip_dir: PathBuf,
    num_workers: usize,
    executor_timeout_secs: u64,
    callback_base_url: String,
    #[serde(default)]
    duplicated_vms: Vec<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

impl CourseConfig {
    /// Load and parse a course config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawCourseConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawCourseConfig) -> Self {
        let mut duplicated_vms: HashMap<VmIdentity, Vec<VmDuplicate>> = raw
            .duplicated_vms
            .iter()
            .map(|name| (VmIdentity::new(name.as_str()), Vec::new()))
            .collect();

        // Every top-level table whose name begins with a declared VM
        // identity (and isn't the identity itself) defines one duplicate;
        // the table's key/value pairs become its override map.
        for (section_name, value) in &raw.extra {
            let Some(vm_name) = raw
                .duplicated_vms
                .iter()
                .find(|vm| section_name != *vm && section_name.starts_with(vm.as_str()))
            else {
                continue;
            };
            let Some(table) = value.as_table() else {
                continue;
            };
            let overrides: HashMap<String, String> = table
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
            let worker_id = section_name[vm_name.as_str().len()..].to_string();
            duplicated_vms
                .entry(VmIdentity::new(vm_name.as_str()))
                .or_default()
                .push(VmDuplicate {
                    worker_id,
                    overrides,
                });
        }

        Self {
            spool_dir: raw.spool_dir,
            unzip_dir: raw.unzip_dir,
            num_workers: raw.num_workers,
            executor_timeout: Duration::from_secs(raw.executor_timeout_secs),
            callback_base_url: raw.callback_base_url,
            duplicated_vms,
        }
    }

    /// Convert the declared duplicates into the slot tokens the VM Slot
    /// Registry populates at startup.
    pub fn slot_tokens(&self) -> HashMap<VmIdentity, Vec<SlotToken>> {
        self.duplicated_vms
            .iter()
            .map(|(vm, dups)| {
                let tokens = dups
                    .iter()
                    .map(|d| SlotToken::new(d.worker_id.clone(), d.overrides.clone()))
                    .collect();
                (vm.clone(), tokens)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
spool_dir = "/var/spool/vqm/cs101"
unzip_dir = "/var/lib/vqm/cs101/unpack"
num_workers = 4
executor_timeout_secs = 600
callback_base_url = "https://submissions.example.edu/api"
duplicated_vms = ["deb1"]

[deb1a]
mac = "AA:AA:AA:AA:AA:AA"
disk = "/var/lib/vqm/disks/deb1a.qcow2"

[deb1b]
mac = "BB:BB:BB:BB:BB:BB"
disk = "/var/lib/vqm/disks/deb1b.qcow2"
"#;

    #[test]
    fn parses_scalar_fields() {
        let cfg = CourseConfig::parse(SAMPLE, Path::new("cs101.toml")).unwrap();
        assert_eq!(cfg.num_workers, 4);
        assert_eq!(cfg.executor_timeout, Duration::from_secs(600));
        assert_eq!(cfg.spool_dir, PathBuf::from("/var/spool/vqm/cs101"));
    }

    #[test]
    fn collects_duplicate_sections_by_prefix() {
        let cfg = CourseConfig::parse(SAMPLE, Path::new("cs101.toml")).unwrap();
        let dups = cfg.duplicated_vms.get("deb1").unwrap();
        assert_eq!(dups.len(), 2);
        let a = dups.iter().find(|d| d.worker_id == "a").unwrap();
        assert_eq!(a.overrides.get("mac").unwrap(), "AA:AA:AA:AA:AA:AA");
        let b = dups.iter().find(|d| d.worker_id == "b").unwrap();
        assert_eq!(b.overrides.get("mac").unwrap(), "BB:BB:BB:BB:BB:BB");
    }

    #[test]
    fn vm_not_in_duplicated_list_has_no_entry() {
        let cfg = CourseConfig::parse(SAMPLE, Path::new("cs101.toml")).unwrap();
        assert!(cfg.duplicated_vms.get("win1").is_none());
    }

    #[yare::parameterized(
        single_letter_suffix = { "a", "a" },
        word_suffix          = { "primary", "primary" },
        numeric_suffix       = { "2", "2" },
    )]
    fn duplicate_worker_id_is_the_section_name_minus_the_vm_prefix(suffix: &str, expected: &str) {
        let body = format!(
            r#"
spool_dir = "/var/spool/vqm/cs101"
unzip_dir = "/var/lib/vqm/cs101/unpack"
num_workers = 1
executor_timeout_secs = 60
callback_base_url = "https://submissions.example.edu/api"
duplicated_vms = ["deb1"]

[deb1{suffix}]
mac = "AA"
"#
        );
        let cfg = CourseConfig::parse(&body, Path::new("cs101.toml")).unwrap();
        let dups = cfg.duplicated_vms.get("deb1").unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].worker_id, expected);
    }

    #[test]
    fn slot_tokens_carry_worker_id_and_overrides() {
        let cfg = CourseConfig::parse(SAMPLE, Path::new("cs101.toml")).unwrap();
        let tokens = cfg.slot_tokens();
        let deb1_tokens = tokens.get(&VmIdentity::new("deb1")).unwrap();
        assert_eq!(deb1_tokens.len(), 2);
        assert!(deb1_tokens.iter().any(|t| t.worker_id == "a"));
    }

    #[test]
    fn rejects_unreadable_path() {
        let err = CourseConfig::load(Path::new("/nonexistent/cs101.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
