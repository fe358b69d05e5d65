// SPDX-License-Identifier: MIT

//! Applies the `-0/-1/-2` stdio redirections by `dup2`-ing an opened file
//! onto the process's real file descriptors 0/1/2, so every subsequent
//! write to stdout/stderr (including the logging layer set up afterward)
//! lands in the requested file.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::unistd::dup2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("failed to open {path} for redirection: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dup2 failed redirecting fd {fd}: {source}")]
    Dup2 { fd: i32, source: nix::Error },
}

/// Redirect stdin to read from `path`, if given.
pub fn redirect_stdin(path: &Path) -> Result<(), RedirectError> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|source| RedirectError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    dup2(file.as_raw_fd(), 0).map_err(|source| RedirectError::Dup2 { fd: 0, source })?;
    Ok(())
}

/// Redirect stdout to append to `path`, if given.
pub fn redirect_stdout(path: &Path) -> Result<(), RedirectError> {
    let file = open_append(path)?;
    dup2(file.as_raw_fd(), 1).map_err(|source| RedirectError::Dup2 { fd: 1, source })?;
    Ok(())
}

/// Redirect stderr to append to `path`, if given.
pub fn redirect_stderr(path: &Path) -> Result<(), RedirectError> {
    let file = open_append(path)?;
    dup2(file.as_raw_fd(), 2).map_err(|source| RedirectError::Dup2 { fd: 2, source })?;
    Ok(())
}

fn open_append(path: &Path) -> Result<std::fs::File, RedirectError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| RedirectError::Open {
            path: path.to_path_buf(),
            source,
        })
}
