// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for the queue manager's external collaborators: the spool
//! watcher, the archive unpacker, the download-prerequisites helper, the
//! executor supervisor, and the upstream callback client.

pub mod callback;
pub mod executor;
pub mod prepare;
pub mod unpack;
pub mod watcher;

pub use callback::{CallbackClient, CallbackError, HttpCallbackClient};
pub use executor::{ExecutorOutcome, ExecutorSupervisor};
pub use prepare::download_external_files;
pub use unpack::{unpack_bundle, UnpackError};
pub use watcher::{BundleEvent, SpoolWatcher, WatcherError};

#[cfg(any(test, feature = "test-support"))]
pub use callback::{FakeCallbackClient, RecordedCallback};
