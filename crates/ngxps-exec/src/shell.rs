//! Quoting for paths spliced into `sh -c` command lines

use std::path::Path;

/// `path` as a single shell word
///
/// Plain paths come back unchanged, anything else is single-quoted.
#[must_use]
pub fn quote(path: &Path) -> String {
    shell_words::quote(&path.to_string_lossy()).into_owned()
}
