// SPDX-License-Identifier: MIT

//! Invocation of the advisory `vmchecker-download-external-files` helper.
//! Missing binary or nonzero exit is logged but never fails the job — the
//! helper is purely advisory.

use std::path::Path;

const DOWNLOAD_HELPER_BIN: &str = "vmchecker-download-external-files";

/// Run the download-external-files helper against `unpack_dir`, synchronously.
/// Always returns — failures are logged, never propagated.
pub async fn download_external_files(unpack_dir: &Path) {
    let result = tokio::process::Command::new(DOWNLOAD_HELPER_BIN)
        .arg(unpack_dir)
        .status()
        .await;

    match result {
        Ok(status) if status.success() => {
            tracing::debug!(dir = %unpack_dir.display(), "download-external-files completed");
        }
        Ok(status) => {
            tracing::warn!(
                dir = %unpack_dir.display(),
                ?status,
                "download-external-files exited non-zero; continuing (advisory only)"
            );
        }
        Err(e) => {
            tracing::warn!(
                dir = %unpack_dir.display(),
                error = %e,
                "download-external-files missing or unexecutable; continuing (advisory only)"
            );
        }
    }
}
