//! Diffie-Hellman parameters for TLS

use std::path::Path;

use ngxps_core::ActionError;
use ngxps_exec::{CommandExecutor, quote};
use tracing::{info, instrument};

/// Seed file openssl writes while generating
const RANDFILE: &str = "/root/.rnd";

/// `openssl dhparam` invocation writing `bits` parameters to `path`
#[must_use]
pub fn command(path: &Path, bits: u32) -> String {
    format!(
        "RANDFILE={RANDFILE} openssl dhparam -out {} {bits} > /dev/null",
        quote(path)
    )
}

/// Generate fresh parameters at `path`, replacing any existing file
///
/// # Errors
/// Returns an error if the directory cannot be created or openssl fails
#[instrument(skip(executor))]
pub async fn generate(
    executor: &dyn CommandExecutor,
    path: &Path,
    bits: u32,
) -> Result<(), ActionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
    }

    info!(bits, "generating dh parameters");
    executor.run_checked(&command(path, bits)).await?;
    Ok(())
}
