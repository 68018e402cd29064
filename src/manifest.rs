use std::collections::{HashMap, HashSet};
use std::fs;

use camino::Utf8Path;

use crate::domain::{EgaTransferJob, ManifestRecord};
use crate::error::RepairError;

pub fn read_manifest(path: &Utf8Path) -> Result<Vec<ManifestRecord>, RepairError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| RepairError::ManifestRead(path.to_path_buf()))?;

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != 5 {
            return Err(RepairError::ManifestParse {
                path: path.to_path_buf(),
                line: index + 1,
                message: format!("expected 5 tab-separated fields, got {}", fields.len()),
            });
        }
        records.push(ManifestRecord {
            project_code: fields[0].to_string(),
            object_id: fields[1].to_string(),
            analysis_id: fields[2].to_string(),
            file_name: fields[3].to_string(),
            declared_md5: fields[4].to_string(),
        });
    }
    Ok(records)
}

/// Transfer jobs keyed by analysis id; the first column of the job file
/// is the bundle id, the sixth the analysis id the manifests refer to.
pub fn read_ega_jobs(path: &Utf8Path) -> Result<HashMap<String, EgaTransferJob>, RepairError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| RepairError::ManifestRead(path.to_path_buf()))?;

    let mut jobs = HashMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != 10 {
            return Err(RepairError::ManifestParse {
                path: path.to_path_buf(),
                line: index + 1,
                message: format!("expected 10 tab-separated fields, got {}", fields.len()),
            });
        }
        let job = EgaTransferJob {
            bundle_id: fields[0].to_string(),
            metadata_repo: fields[1].to_string(),
            project_code: fields[2].to_string(),
            output_file: fields[3].to_string(),
            dataset_id: fields[4].to_string(),
            analysis_id: fields[5].to_string(),
            experiment_id: fields[6].to_string(),
            run_id: fields[7].to_string(),
            sample_id: fields[8].to_string(),
            study_id: fields[9].to_string(),
        };
        jobs.insert(job.analysis_id.clone(), job);
    }
    Ok(jobs)
}

pub fn object_id_set(records: &[ManifestRecord]) -> HashSet<String> {
    records
        .iter()
        .map(|record| record.object_id.clone())
        .collect()
}
