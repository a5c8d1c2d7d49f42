//! Content fingerprints of directory trees

use std::collections::BTreeMap;
use std::path::Path;

use ngxps_core::ActionError;
use sha2::{Digest, Sha256};

/// Map of every file under `root` (relative path) to the SHA-256 of its content
///
/// A missing `root` yields an empty map.
///
/// # Errors
/// Returns an error if a directory or file cannot be read
pub fn tree(root: &Path) -> Result<BTreeMap<String, String>, ActionError> {
    let mut files = BTreeMap::new();
    if root.is_dir() {
        walk(root, root, &mut files)?;
    }
    Ok(files)
}

fn walk(
    root: &Path,
    dir: &Path,
    files: &mut BTreeMap<String, String>,
) -> Result<(), ActionError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ActionError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ActionError::io(dir, e))?.path();
        if path.is_dir() {
            walk(root, &path, files)?;
            continue;
        }

        let content = std::fs::read(&path).map_err(|e| ActionError::io(&path, e))?;
        let relative = path.strip_prefix(root).unwrap_or(&path);
        files.insert(
            relative.display().to_string(),
            hex::encode(Sha256::digest(&content)),
        );
    }
    Ok(())
}
