use std::fs;

use camino::Utf8Path;
use md5::{Digest, Md5};

use crate::error::RepairError;

/// MD5 of the file contents as lowercase hex, or None when the file is
/// absent. Absence is an expected state (pre-download, failed
/// generation), not an error.
pub fn md5_hex(path: &Utf8Path) -> Result<Option<String>, RepairError> {
    if !path.as_std_path().is_file() {
        return Ok(None);
    }
    let bytes =
        fs::read(path.as_std_path()).map_err(|err| RepairError::Filesystem(err.to_string()))?;
    let digest = Md5::digest(&bytes);
    Ok(Some(format!("{digest:x}")))
}

pub fn file_size(path: &Utf8Path) -> Result<u64, RepairError> {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.len())
        .map_err(|err| RepairError::Filesystem(err.to_string()))
}
