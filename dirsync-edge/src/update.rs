//! The self-update exchange, edge side.
//!
//! On every (re)connect the edge asks the hub for its executable hash. A
//! mismatch triggers a binary request; the reply is decoded, staged in a
//! scratch directory next to the executable, renamed into place atomically,
//! and the process re-executes itself. Any failure leaves the old build
//! running; the next connect retries.

use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dirsync_types::binary;

use crate::EdgeError;

/// Scratch directory for the staged binary, created beside the executable.
const SCRATCH_DIR: &str = ".dirsync-update";

/// Whether this build's hash matches the hub's reported one.
pub(crate) fn is_up_to_date(hub_version: &str) -> Result<bool, EdgeError> {
    Ok(binary::executable_version()?.as_str() == hub_version)
}

/// Replace the running executable with the received build and re-exec.
///
/// Returns only on failure; on success the process image is replaced.
pub(crate) fn self_update(encoded: &[u8]) -> Result<std::convert::Infallible, EdgeError> {
    let target = binary::executable_path()?;
    install(encoded, &target)?;
    tracing::info!("installed new build at {}, re-executing", target.display());
    Err(reexec(&target))
}

/// Decode and atomically install the new executable at `target`.
pub(crate) fn install(encoded: &[u8], target: &Path) -> Result<(), EdgeError> {
    let bytes = BASE64.decode(encoded)?;

    let scratch = target
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(SCRATCH_DIR);
    std::fs::create_dir_all(&scratch)?;

    let mut staged = tempfile::NamedTempFile::new_in(&scratch)?;
    staged.write_all(&bytes)?;
    staged.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o755))?;
    }

    // Same filesystem as the target, so persist is an atomic rename.
    staged
        .persist(target)
        .map_err(|err| EdgeError::Io(err.error))?;

    let _ = std::fs::remove_dir_all(&scratch);
    Ok(())
}

/// Replace the process image with the freshly installed binary, preserving
/// argv and environment.
#[cfg(unix)]
fn reexec(target: &Path) -> EdgeError {
    use std::os::unix::process::CommandExt;
    let err = std::process::Command::new(target)
        .args(std::env::args_os().skip(1))
        .exec();
    EdgeError::Io(err)
}

/// Where the executable cannot be exec'd over, spawn the new build and bow
/// out of its way.
#[cfg(not(unix))]
fn reexec(target: &Path) -> EdgeError {
    match std::process::Command::new(target)
        .args(std::env::args_os().skip(1))
        .spawn()
    {
        Ok(_) => std::process::exit(0),
        Err(err) => EdgeError::Io(err),
    }
}
