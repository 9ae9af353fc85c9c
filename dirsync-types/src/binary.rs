//! Helpers for reading the running executable.
//!
//! The self-update exchange identifies a build by the SHA-512 of its
//! executable bytes: the hub serves its own binary, the edge compares and
//! replaces its own. Both sides use these helpers.

use std::path::PathBuf;

use crate::{Checksum, WireError};

/// Canonical path of the currently running executable.
pub fn executable_path() -> Result<PathBuf, WireError> {
    std::env::current_exe().map_err(WireError::Executable)
}

/// The bytes of the currently running executable.
pub fn executable_bytes() -> Result<Vec<u8>, WireError> {
    let path = executable_path()?;
    std::fs::read(path).map_err(WireError::Executable)
}

/// The version of the running build: hex SHA-512 of its executable bytes.
pub fn executable_version() -> Result<Checksum, WireError> {
    Ok(Checksum::of(&executable_bytes()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_is_readable() {
        let bytes = executable_bytes().unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn version_is_stable_within_a_run() {
        assert_eq!(executable_version().unwrap(), executable_version().unwrap());
    }
}
