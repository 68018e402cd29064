use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8Path;

use crate::domain::EgaTransferJob;
use crate::error::RepairError;
use crate::process::{find_in_path, run_checked};

pub const DEFAULT_CONTAINER_IMAGE: &str = "quay.io/baminou/dckr_prepare_metadata_xml";

pub trait XmlGenerator: Send + Sync {
    fn generate(&self, job: &EgaTransferJob, out_dir: &Utf8Path) -> Result<(), RepairError>;
}

/// Regenerates EGA bundle XML by running the metadata-preparation
/// container with the output directory mounted at /app.
pub struct DockerXmlGenerator {
    docker: Option<PathBuf>,
    image: String,
    pulled: AtomicBool,
}

impl DockerXmlGenerator {
    pub fn new(image: &str) -> Self {
        Self {
            docker: find_in_path("docker"),
            image: image.to_string(),
            pulled: AtomicBool::new(false),
        }
    }

    fn require(&self) -> Result<&PathBuf, RepairError> {
        self.docker
            .as_ref()
            .ok_or_else(|| RepairError::MissingTool("docker".to_string()))
    }

    fn ensure_pulled(&self) -> Result<(), RepairError> {
        if self.pulled.load(Ordering::Relaxed) {
            return Ok(());
        }
        let docker = self.require()?;
        let args = vec!["pull".to_string(), self.image.clone()];
        run_checked(docker.as_path(), &args).map_err(RepairError::DockerCommand)?;
        self.pulled.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl XmlGenerator for DockerXmlGenerator {
    fn generate(&self, job: &EgaTransferJob, out_dir: &Utf8Path) -> Result<(), RepairError> {
        self.ensure_pulled()?;
        let docker = self.require()?;
        let args = vec![
            "run".to_string(),
            "-v".to_string(),
            format!("{out_dir}:/app"),
            self.image.clone(),
            "-i".to_string(),
            job.metadata_repo.clone(),
            "-p".to_string(),
            job.project_code.clone(),
            "-o".to_string(),
            format!("/app/{}", job.output_file),
            "-d".to_string(),
            job.dataset_id.clone(),
            "-a".to_string(),
            job.analysis_id.clone(),
            "-e".to_string(),
            job.experiment_id.clone(),
            "-r".to_string(),
            job.run_id.clone(),
            "-sa".to_string(),
            job.sample_id.clone(),
            "-st".to_string(),
            job.study_id.clone(),
        ];
        run_checked(docker.as_path(), &args).map_err(RepairError::DockerCommand)
    }
}
