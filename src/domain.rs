use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RepairError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Collab,
    Aws,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Collab => "collab",
            Profile::Aws => "aws",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Profile {
    type Err = RepairError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "collab" => Ok(Profile::Collab),
            "aws" => Ok(Profile::Aws),
            other => Err(RepairError::InvalidProfile(other.to_string())),
        }
    }
}

/// One row of a per-profile manifest: what SONG believes about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestRecord {
    pub project_code: String,
    pub object_id: String,
    pub analysis_id: String,
    pub file_name: String,
    pub declared_md5: String,
}

impl ManifestRecord {
    /// EGA bundle records are the only ones whose XML can be regenerated
    /// from a transfer job rather than downloaded.
    pub fn is_ega_bundle(&self) -> bool {
        self.analysis_id.starts_with("EGA") && self.file_name.starts_with("bundle")
    }
}

/// One row of the EGA transfer-job file, keyed by analysis id. Trailing
/// identifiers may be empty; the generator container accepts blanks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EgaTransferJob {
    pub bundle_id: String,
    pub metadata_repo: String,
    pub project_code: String,
    pub output_file: String,
    pub dataset_id: String,
    pub analysis_id: String,
    pub experiment_id: String,
    pub run_id: String,
    pub sample_id: String,
    pub study_id: String,
}
