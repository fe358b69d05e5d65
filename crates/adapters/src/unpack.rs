// SPDX-License-Identifier: MIT

//! Safe archive unpacking.
//!
//! Refuses any entry whose normalized path would escape the destination
//! directory, guarding against zip-slip style traversal attacks from a
//! malicious or corrupt bundle.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("failed to open bundle archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt or non-archive bundle {path}: {source}")]
    BadArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry {entry} would traverse outside the unpack directory")]
    Traversal { entry: String },
    #[error("failed to extract entry {entry} into {dest}: {source}")]
    Extract {
        entry: String,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Decompress `archive_path` into `dest_dir`, which must already exist and
/// be empty. Every entry is checked against traversal before being written.
pub fn unpack_bundle(archive_path: &Path, dest_dir: &Path) -> Result<(), UnpackError> {
    let file = std::fs::File::open(archive_path).map_err(|source| UnpackError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| UnpackError::BadArchive {
        path: archive_path.to_path_buf(),
        source,
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|source| UnpackError::BadArchive {
            path: archive_path.to_path_buf(),
            source,
        })?;
        let raw_name = entry.name().to_string();
        let safe_rel = safe_relative_path(&raw_name).ok_or_else(|| UnpackError::Traversal {
            entry: raw_name.clone(),
        })?;
        let out_path = dest_dir.join(&safe_rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|source| UnpackError::Extract {
                entry: raw_name.clone(),
                dest: out_path.clone(),
                source,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| UnpackError::Extract {
                entry: raw_name.clone(),
                dest: out_path.clone(),
                source,
            })?;
        }
        let mut out_file = std::fs::File::create(&out_path).map_err(|source| UnpackError::Extract {
            entry: raw_name.clone(),
            dest: out_path.clone(),
            source,
        })?;
        std::io::copy(&mut entry, &mut out_file).map_err(|source| UnpackError::Extract {
            entry: raw_name,
            dest: out_path,
            source,
        })?;
    }

    Ok(())
}

/// Reject absolute paths and any `..` component; return the normalized
/// relative path otherwise.
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        parent_dir_traversal = { "../../etc/passwd" },
        absolute_path        = { "/etc/passwd" },
        embedded_parent_dir  = { "tests/../../etc/passwd" },
        bare_root            = { "/" },
    )]
    fn rejects_unsafe_entry_names(name: &str) {
        assert!(safe_relative_path(name).is_none());
    }

    #[test]
    fn accepts_plain_relative_paths() {
        assert_eq!(
            safe_relative_path("submission-config"),
            Some(PathBuf::from("submission-config"))
        );
        assert_eq!(
            safe_relative_path("tests/test1.py"),
            Some(PathBuf::from("tests/test1.py"))
        );
    }

    #[test]
    fn corrupt_archive_is_reported_as_bad_archive() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-a-zip.zip");
        std::fs::write(&bogus, b"this is not a zip file at all").unwrap();
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        let err = unpack_bundle(&bogus, &dest).unwrap_err();
        assert!(matches!(err, UnpackError::BadArchive { .. }));
    }

    #[test]
    fn unpacks_a_valid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("bundle.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let opts: zip::write::FileOptions<()> = zip::write::FileOptions::default();
            writer.start_file("submission-config", opts).unwrap();
            std::io::Write::write_all(&mut writer, b"[Assignment]\nMachine=deb1\n").unwrap();
            writer.finish().unwrap();
        }
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        unpack_bundle(&archive_path, &dest).unwrap();
        let contents = std::fs::read_to_string(dest.join("submission-config")).unwrap();
        assert!(contents.contains("Machine=deb1"));
    }
}
