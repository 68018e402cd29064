use std::fs::{self, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::Profile;
use crate::error::RepairError;

/// Zero-byte `<file>.fix` markers under a per-profile directory. A
/// marker's presence is the sole gate that skips upload and publish for
/// that file on later runs; markers are never removed automatically.
#[derive(Debug, Clone)]
pub struct FixTracker {
    root: Utf8PathBuf,
}

impl FixTracker {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn marker_path(&self, profile: Profile, file_name: &str) -> Utf8PathBuf {
        self.root
            .join(profile.as_str())
            .join(format!("{file_name}.fix"))
    }

    pub fn is_fixed(&self, profile: Profile, file_name: &str) -> bool {
        self.marker_path(profile, file_name).as_std_path().is_file()
    }

    pub fn mark_fixed(&self, profile: Profile, file_name: &str) -> Result<(), RepairError> {
        let path = self.marker_path(profile, file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| RepairError::Filesystem(err.to_string()))?;
        }
        fs::write(path.as_std_path(), b"").map_err(|err| RepairError::Filesystem(err.to_string()))
    }
}

/// The operator-facing record of a run: a plain-text error log and a
/// TSV mismatch log. Both start empty and are appended to as records
/// are processed.
#[derive(Debug, Clone)]
pub struct RunLog {
    error_log: Utf8PathBuf,
    mismatch_log: Utf8PathBuf,
}

impl RunLog {
    pub fn create(error_log: &Utf8Path, mismatch_log: &Utf8Path) -> Result<Self, RepairError> {
        truncate(error_log)?;
        truncate(mismatch_log)?;
        Ok(Self {
            error_log: error_log.to_path_buf(),
            mismatch_log: mismatch_log.to_path_buf(),
        })
    }

    pub fn error(&self, line: &str) -> Result<(), RepairError> {
        append_line(&self.error_log, line)
    }

    /// One line per disagreement, columns fixed as
    /// project, analysis, store digest, SONG digest, local digest.
    pub fn mismatch(
        &self,
        project_code: &str,
        analysis_id: &str,
        store_md5: Option<&str>,
        song_md5: &str,
        local_md5: Option<&str>,
    ) -> Result<(), RepairError> {
        let line = format!(
            "{project_code}\t{analysis_id}\t{}\t{song_md5}\t{}",
            store_md5.unwrap_or("-"),
            local_md5.unwrap_or("-"),
        );
        append_line(&self.mismatch_log, &line)
    }
}

fn truncate(path: &Utf8Path) -> Result<(), RepairError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RepairError::Filesystem(err.to_string()))?;
    }
    fs::write(path.as_std_path(), b"").map_err(|err| RepairError::Filesystem(err.to_string()))
}

fn append_line(path: &Utf8Path, line: &str) -> Result<(), RepairError> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path.as_std_path())
        .map_err(|err| RepairError::Filesystem(err.to_string()))?;
    writeln!(file, "{line}").map_err(|err| RepairError::Filesystem(err.to_string()))
}
