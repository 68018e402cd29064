use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::Profile;
use crate::ega::DEFAULT_CONTAINER_IMAGE;
use crate::error::RepairError;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub manifests: Manifests,
    pub ega_jobs: String,
    pub xml_dir: String,
    pub ega_xml_dir: String,
    pub fix_dir: String,
    pub error_log: String,
    pub mismatch_log: String,
    pub meta_bucket_url: String,
    pub endpoints: Endpoints,
    pub song: SongEndpoints,
    #[serde(default)]
    pub aws_approved: Vec<String>,
    #[serde(default)]
    pub container_image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Manifests {
    pub collab: String,
    #[serde(default)]
    pub aws: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Endpoints {
    pub collab: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SongEndpoints {
    pub collab: String,
    #[serde(default)]
    pub aws: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub collab_manifest: Utf8PathBuf,
    pub aws_manifest: Option<Utf8PathBuf>,
    pub ega_jobs: Utf8PathBuf,
    pub xml_dir: Utf8PathBuf,
    pub ega_xml_dir: Utf8PathBuf,
    pub fix_dir: Utf8PathBuf,
    pub error_log: Utf8PathBuf,
    pub mismatch_log: Utf8PathBuf,
    pub meta_bucket_url: String,
    pub collab_endpoint_url: String,
    pub collab_song_url: String,
    pub aws_song_url: Option<String>,
    pub aws_approved: Vec<String>,
    pub container_image: String,
}

impl ResolvedConfig {
    pub fn manifest_path(&self, profile: Profile) -> Result<&Utf8Path, RepairError> {
        match profile {
            Profile::Collab => Ok(&self.collab_manifest),
            Profile::Aws => self
                .aws_manifest
                .as_deref()
                .ok_or_else(|| RepairError::MissingManifest(profile.to_string())),
        }
    }

    pub fn song_url(&self, profile: Profile) -> Result<&str, RepairError> {
        match profile {
            Profile::Collab => Ok(&self.collab_song_url),
            Profile::Aws => self
                .aws_song_url
                .as_deref()
                .ok_or_else(|| RepairError::MissingSongUrl(profile.to_string())),
        }
    }

    /// Markers are scoped per destination so a collab fix never hides
    /// pending aws work.
    pub fn fix_dir_for(&self, profile: Profile) -> Utf8PathBuf {
        self.fix_dir.join(profile.as_str())
    }

    pub fn bucket_destination(&self, object_id: &str) -> String {
        format!("{}{object_id}", self.meta_bucket_url)
    }

    pub fn is_aws_approved(&self, project_code: &str) -> bool {
        self.aws_approved.iter().any(|code| code == project_code)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, RepairError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from("meta-repair.yaml"),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Err(RepairError::MissingConfig);
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| RepairError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|err| RepairError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, RepairError> {
        Ok(ResolvedConfig {
            collab_manifest: Utf8PathBuf::from(config.manifests.collab),
            aws_manifest: config.manifests.aws.map(Utf8PathBuf::from),
            ega_jobs: Utf8PathBuf::from(config.ega_jobs),
            xml_dir: Utf8PathBuf::from(config.xml_dir),
            ega_xml_dir: Utf8PathBuf::from(config.ega_xml_dir),
            fix_dir: Utf8PathBuf::from(config.fix_dir),
            error_log: Utf8PathBuf::from(config.error_log),
            mismatch_log: Utf8PathBuf::from(config.mismatch_log),
            meta_bucket_url: config.meta_bucket_url,
            collab_endpoint_url: config.endpoints.collab,
            collab_song_url: config.song.collab,
            aws_song_url: config.song.aws,
            aws_approved: config.aws_approved,
            container_image: config
                .container_image
                .unwrap_or_else(|| DEFAULT_CONTAINER_IMAGE.to_string()),
        })
    }
}
