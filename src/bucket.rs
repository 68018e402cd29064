use std::path::PathBuf;

use camino::Utf8Path;

use crate::domain::Profile;
use crate::error::RepairError;
use crate::process::{find_in_path, run_checked};

pub trait BucketClient: Send + Sync {
    fn copy(
        &self,
        profile: Profile,
        file: &Utf8Path,
        destination_url: &str,
    ) -> Result<(), RepairError>;
}

/// Copies files into the open-metadata bucket through the aws CLI. The
/// collab back-end is an S3-compatible store behind a custom endpoint;
/// the aws back-end goes through the billing profile for the paid
/// account.
#[derive(Clone)]
pub struct SystemBucketClient {
    aws: Option<PathBuf>,
    collab_endpoint_url: String,
}

impl SystemBucketClient {
    pub fn new(collab_endpoint_url: &str) -> Self {
        Self {
            aws: find_in_path("aws"),
            collab_endpoint_url: collab_endpoint_url.to_string(),
        }
    }

    fn require(&self) -> Result<&PathBuf, RepairError> {
        self.aws
            .as_ref()
            .ok_or_else(|| RepairError::MissingTool("aws".to_string()))
    }
}

impl BucketClient for SystemBucketClient {
    fn copy(
        &self,
        profile: Profile,
        file: &Utf8Path,
        destination_url: &str,
    ) -> Result<(), RepairError> {
        let aws = self.require()?;
        let args = match profile {
            Profile::Collab => vec![
                "--endpoint-url".to_string(),
                self.collab_endpoint_url.clone(),
                "--profile".to_string(),
                "collab".to_string(),
                "s3".to_string(),
                "cp".to_string(),
                file.to_string(),
                destination_url.to_string(),
            ],
            Profile::Aws => vec![
                "--profile".to_string(),
                "amazon_pay".to_string(),
                "s3".to_string(),
                "cp".to_string(),
                file.to_string(),
                destination_url.to_string(),
            ],
        };
        run_checked(aws.as_path(), &args).map_err(RepairError::BucketCommand)
    }
}
