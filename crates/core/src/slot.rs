// SPDX-License-Identifier: MIT

//! Worker slot tokens — units of concurrent capacity against a VM identity.

use std::collections::HashMap;

/// A token representing one unit of concurrent capacity against a VM
/// identity. Carries a mapping of `[Machine]` config keys to the override
/// values this duplicate should apply before the executor runs.
///
/// Default-mode VMs (no declared duplicates) get a single token with
/// `worker_id = "default"` and an empty override map, created lazily on
/// first reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotToken {
    pub worker_id: String,
    pub overrides: HashMap<String, String>,
}

impl SlotToken {
    pub fn new(worker_id: impl Into<String>, overrides: HashMap<String, String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            overrides,
        }
    }

    /// The lazily-created single token for a VM identity with no declared
    /// duplicates ("Default mode").
    pub fn default_token() -> Self {
        Self {
            worker_id: "default".to_string(),
            overrides: HashMap::new(),
        }
    }
}
