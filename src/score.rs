use std::path::PathBuf;

use camino::Utf8Path;

use crate::domain::Profile;
use crate::error::RepairError;
use crate::process::{find_in_path, run_checked};

pub trait ScoreClient: Send + Sync {
    fn download(
        &self,
        profile: Profile,
        object_id: &str,
        output_dir: &Utf8Path,
    ) -> Result<(), RepairError>;
    fn upload(
        &self,
        profile: Profile,
        object_id: &str,
        file: &Utf8Path,
        md5: &str,
    ) -> Result<(), RepairError>;
}

#[derive(Clone)]
pub struct SystemScoreClient {
    score_client: Option<PathBuf>,
}

impl SystemScoreClient {
    pub fn new() -> Self {
        Self {
            score_client: find_in_path("score-client"),
        }
    }

    fn require(&self) -> Result<&PathBuf, RepairError> {
        self.score_client
            .as_ref()
            .ok_or_else(|| RepairError::MissingTool("score-client".to_string()))
    }
}

impl Default for SystemScoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreClient for SystemScoreClient {
    fn download(
        &self,
        profile: Profile,
        object_id: &str,
        output_dir: &Utf8Path,
    ) -> Result<(), RepairError> {
        let score = self.require()?;
        let args = vec![
            "--profile".to_string(),
            profile.as_str().to_string(),
            "download".to_string(),
            "--object-id".to_string(),
            object_id.to_string(),
            "--validate".to_string(),
            "false".to_string(),
            "--force".to_string(),
            "--output-dir".to_string(),
            output_dir.to_string(),
        ];
        run_checked(score.as_path(), &args).map_err(RepairError::ScoreCommand)
    }

    fn upload(
        &self,
        profile: Profile,
        object_id: &str,
        file: &Utf8Path,
        md5: &str,
    ) -> Result<(), RepairError> {
        let score = self.require()?;
        let args = vec![
            "--profile".to_string(),
            profile.as_str().to_string(),
            "upload".to_string(),
            "--md5".to_string(),
            md5.to_string(),
            "--file".to_string(),
            file.to_string(),
            "--object-id".to_string(),
            object_id.to_string(),
            "--force".to_string(),
        ];
        run_checked(score.as_path(), &args).map_err(RepairError::ScoreCommand)
    }
}
