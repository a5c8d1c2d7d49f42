//! Inspection and extraction of `.tar.gz` resources

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use tracing::debug;

use crate::error::PackageError;

fn archive_error(path: &Path, err: impl std::fmt::Display) -> PackageError {
    PackageError::ArchiveError {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn open(path: &Path) -> Result<Archive<GzDecoder<File>>, PackageError> {
    let file = File::open(path).map_err(|e| archive_error(path, e))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Name of the top-level directory of a `.tar.gz` archive
///
/// # Errors
/// Returns an error if the archive cannot be read or is empty
pub fn tar_root(path: &Path) -> Result<String, PackageError> {
    let mut archive = open(path)?;
    let mut entries = archive.entries().map_err(|e| archive_error(path, e))?;

    let first = entries
        .next()
        .ok_or_else(|| archive_error(path, "archive is empty"))?
        .map_err(|e| archive_error(path, e))?;
    let entry_path = first.path().map_err(|e| archive_error(path, e))?;

    entry_path
        .components()
        .find_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .ok_or_else(|| archive_error(path, "archive has no root directory"))
}

/// Extract an archive into `destination`, returning the path of its root directory
///
/// # Errors
/// Returns an error if the archive cannot be read or unpacked
pub fn extract(path: &Path, destination: &Path) -> Result<PathBuf, PackageError> {
    let root = tar_root(path)?;
    std::fs::create_dir_all(destination)?;

    debug!(archive = %path.display(), destination = %destination.display(), "extracting");
    open(path)?
        .unpack(destination)
        .map_err(|e| archive_error(path, e))?;

    Ok(destination.join(root))
}

/// Hex-encoded SHA-256 of a file's content
///
/// # Errors
/// Returns an error if the file cannot be read
pub fn file_digest(path: &Path) -> Result<String, PackageError> {
    let mut file = File::open(path).map_err(|e| archive_error(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
