//! Fakes and fixtures shared by the unit tests

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use ngxps_exec::{CommandExecutor, CommandResult, ExecError};

/// Records commands; commands containing a failing pattern exit with 1
///
/// A successful command matching a `produces` pattern writes that file, the
/// way `checkinstall` leaves a package behind.
pub(crate) struct ScriptedExecutor {
    commands: Mutex<Vec<String>>,
    failing: Vec<String>,
    produces: Vec<(String, PathBuf)>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Self::failing(&[])
    }

    pub(crate) fn failing(patterns: &[&str]) -> Arc<Self> {
        Self::scripted(patterns, &[])
    }

    pub(crate) fn scripted(failing: &[&str], produces: &[(&str, &Path)]) -> Arc<Self> {
        Arc::new(Self {
            commands: Mutex::new(Vec::new()),
            failing: failing.iter().map(|p| (*p).to_string()).collect(),
            produces: produces
                .iter()
                .map(|(p, path)| ((*p).to_string(), path.to_path_buf()))
                .collect(),
        })
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.commands.lock().unwrap().push(cmd.to_string());
        let mut result = CommandResult::ok(cmd, "");
        if self.failing.iter().any(|p| cmd.contains(p.as_str())) {
            result.status = 1;
            result.stderr = "scripted failure".to_string();
            return Ok(result);
        }
        for (pattern, path) in &self.produces {
            if cmd.contains(pattern.as_str()) {
                std::fs::write(path, cmd).unwrap();
            }
        }
        Ok(result)
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        _timeout: Duration,
    ) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    fn executor_type(&self) -> &'static str {
        "scripted"
    }
}

/// Write a `.tar.gz` holding `<root>/README` to `path`
pub(crate) fn write_archive(path: &Path, root: &str) {
    let mut builder = tar::Builder::new(GzEncoder::new(
        File::create(path).unwrap(),
        Compression::fast(),
    ));

    let mut header = tar::Header::new_gnu();
    header.set_size(root.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{root}/README"), root.as_bytes())
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap();
}
