//! The pagespeed cache tmpfs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ngxps_core::ActionError;
use ngxps_exec::{CommandExecutor, quote};
use tracing::{info, instrument};

const OWNER: &str = "nobody";
const GROUP: &str = "nogroup";

/// fstab entry for a tmpfs of `size_mb` at `path`
#[must_use]
pub fn fstab_entry(path: &Path, size_mb: u64) -> String {
    format!(
        "tmpfs {} tmpfs rw,uid={OWNER},gid={GROUP},size={size_mb}m,mode=0775,noatime 0 0",
        mount_field(path)
    )
}

/// `path` as it appears in fstab and `/proc/mounts`, whitespace octal-escaped
fn mount_field(path: &Path) -> String {
    let mut field = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            ' ' => field.push_str("\\040"),
            '\t' => field.push_str("\\011"),
            '\n' => field.push_str("\\012"),
            '\\' => field.push_str("\\134"),
            c => field.push(c),
        }
    }
    field
}

/// `fstab` with every entry mounted at `path` replaced by `entry`
#[must_use]
pub fn replace_entry(fstab: &str, path: &Path, entry: &str) -> String {
    let target = mount_field(path);
    let mut lines: Vec<&str> = fstab
        .lines()
        .filter(|line| mount_point(line) != Some(target.as_str()))
        .collect();
    lines.push(entry);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Whether the mount table lists `path`
#[must_use]
pub fn is_mounted(mounts: &str, path: &Path) -> bool {
    let target = mount_field(path);
    mounts
        .lines()
        .any(|line| mount_point(line) == Some(target.as_str()))
}

fn mount_point(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.starts_with('#') {
        return None;
    }
    line.split_whitespace().nth(1)
}

/// Mounts the cache path as a tmpfs through fstab
pub struct CacheMount {
    executor: Arc<dyn CommandExecutor>,
    path: PathBuf,
    fstab: PathBuf,
    mounts: PathBuf,
}

impl CacheMount {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        path: impl Into<PathBuf>,
        fstab: impl Into<PathBuf>,
        mounts: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            path: path.into(),
            fstab: fstab.into(),
            mounts: mounts.into(),
        }
    }

    /// Write the fstab entry for `size_mb` and (re)mount the cache
    ///
    /// # Errors
    /// Returns an error if fstab cannot be updated or a mount command fails
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn create(&self, size_mb: u64) -> Result<(), ActionError> {
        std::fs::create_dir_all(&self.path).map_err(|e| ActionError::io(&self.path, e))?;
        self.executor
            .run_checked(&format!("chown {OWNER}:{GROUP} {}", quote(&self.path)))
            .await?;

        let current = match std::fs::read_to_string(&self.fstab) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ActionError::io(&self.fstab, e)),
        };
        let updated = replace_entry(&current, &self.path, &fstab_entry(&self.path, size_mb));
        if let Some(parent) = self.fstab.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
        }
        std::fs::write(&self.fstab, updated).map_err(|e| ActionError::io(&self.fstab, e))?;

        let mounts = std::fs::read_to_string(&self.mounts).unwrap_or_default();
        if is_mounted(&mounts, &self.path) {
            self.executor
                .run_checked(&format!("umount {}", quote(&self.path)))
                .await?;
        }

        self.executor
            .run_checked(&format!(
                "mount -T {} {}",
                quote(&self.fstab),
                quote(&self.path)
            ))
            .await?;

        info!(size_mb, "cache tmpfs mounted");
        Ok(())
    }
}
