use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use serde::Serialize;

use crate::bucket::BucketClient;
use crate::checksum::{file_size, md5_hex};
use crate::config::ResolvedConfig;
use crate::domain::{ManifestRecord, Profile};
use crate::ega::XmlGenerator;
use crate::error::RepairError;
use crate::manifest::{object_id_set, read_ega_jobs, read_manifest};
use crate::score::ScoreClient;
use crate::song::{FileUpdate, SongClient};
use crate::tracker::{FixTracker, RunLog};

#[derive(Debug, Clone, Copy)]
pub struct RepairOptions {
    pub profile: Profile,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub profile: String,
    pub started_at: String,
    pub items: Vec<RecordOutcome>,
}

impl RunReport {
    pub fn fixed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.action == "fixed")
            .count()
    }

    pub fn mismatch_count(&self) -> usize {
        self.items.iter().filter(|item| item.mismatch).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub project_code: String,
    pub analysis_id: String,
    pub object_id: String,
    pub file_name: String,
    pub action: String,
    pub mismatch: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<S: SongClient, T: ScoreClient, B: BucketClient, G: XmlGenerator> {
    config: ResolvedConfig,
    song: S,
    score: T,
    bucket: B,
    generator: G,
}

struct RunContext {
    profile: Profile,
    dry_run: bool,
    aws_objects: Option<HashSet<String>>,
    ega_jobs: std::collections::HashMap<String, crate::domain::EgaTransferJob>,
    tracker: FixTracker,
    log: Option<RunLog>,
}

impl RunContext {
    fn log_error(&self, line: &str) -> Result<(), RepairError> {
        match &self.log {
            Some(log) => log.error(line),
            None => Ok(()),
        }
    }

    fn log_mismatch(
        &self,
        record: &ManifestRecord,
        store_md5: Option<&str>,
        local_md5: Option<&str>,
    ) -> Result<(), RepairError> {
        match &self.log {
            Some(log) => log.mismatch(
                &record.project_code,
                &record.analysis_id,
                store_md5,
                &record.declared_md5,
                local_md5,
            ),
            None => Ok(()),
        }
    }
}

impl<S: SongClient, T: ScoreClient, B: BucketClient, G: XmlGenerator> App<S, T, B, G> {
    pub fn new(config: ResolvedConfig, song: S, score: T, bucket: B, generator: G) -> Self {
        Self {
            config,
            song,
            score,
            bucket,
            generator,
        }
    }

    pub fn run(
        &self,
        options: RepairOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, RepairError> {
        let started_at = iso_timestamp();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; reading manifests for {}", options.profile),
            elapsed: None,
        });

        let records = read_manifest(self.config.manifest_path(Profile::Collab)?)?;
        let aws_objects = match options.profile {
            Profile::Aws => Some(object_id_set(&read_manifest(
                self.config.manifest_path(Profile::Aws)?,
            )?)),
            Profile::Collab => None,
        };
        let ega_jobs = read_ega_jobs(&self.config.ega_jobs)?;

        let log = if options.dry_run {
            None
        } else {
            Some(RunLog::create(
                &self.config.error_log,
                &self.config.mismatch_log,
            )?)
        };
        if !options.dry_run {
            fs::create_dir_all(self.config.xml_dir.as_std_path())
                .map_err(|err| RepairError::Filesystem(err.to_string()))?;
        }

        let ctx = RunContext {
            profile: options.profile,
            dry_run: options.dry_run,
            aws_objects,
            ega_jobs,
            tracker: FixTracker::new(self.config.fix_dir.clone()),
            log,
        };

        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            items.push(self.process_record(record, &ctx, sink)?);
        }

        Ok(RunReport {
            profile: options.profile.to_string(),
            started_at,
            items,
        })
    }

    fn process_record(
        &self,
        record: &ManifestRecord,
        ctx: &RunContext,
        sink: &dyn ProgressSink,
    ) -> Result<RecordOutcome, RepairError> {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {}::{}",
                record.project_code, record.analysis_id
            ),
            elapsed: None,
        });

        // The aws back-end only holds objects for approved projects, and
        // only those its own manifest lists. The two conditions are
        // checked independently so each anomaly class gets its own line.
        if let Some(aws_objects) = &ctx.aws_objects {
            let approved = self.config.is_aws_approved(&record.project_code);
            let present = aws_objects.contains(&record.object_id);
            match (approved, present) {
                (true, true) => {}
                (true, false) => {
                    ctx.log_error(&format!(
                        "{}::{} object {}: is missing from the AWS manifest",
                        record.project_code, record.analysis_id, record.object_id
                    ))?;
                    return Ok(outcome(record, "skipped-missing-from-aws", false));
                }
                (false, true) => {
                    ctx.log_error(&format!(
                        "{}::{} object {}: is not allowed in AWS",
                        record.project_code, record.analysis_id, record.object_id
                    ))?;
                    return Ok(outcome(record, "skipped-not-allowed", false));
                }
                (false, false) => {
                    return Ok(outcome(record, "skipped-out-of-scope", false));
                }
            }
        }

        // Only download when there is no local copy yet.
        let mut local_path = self.config.xml_dir.join(&record.file_name);
        if !local_path.as_std_path().is_file() && !ctx.dry_run {
            sink.event(ProgressEvent {
                message: format!("phase=Download; object {}", record.object_id),
                elapsed: None,
            });
            self.score
                .download(ctx.profile, &record.object_id, &self.config.xml_dir)?;
        }
        let store_md5 = md5_hex(&local_path)?;

        if record.is_ega_bundle() {
            let Some(job) = ctx.ega_jobs.get(&record.analysis_id) else {
                tracing::info!(
                    project = %record.project_code,
                    analysis = %record.analysis_id,
                    "ega transfer job missing"
                );
                ctx.log_error(&format!(
                    "{}::{}: the ega transfer job is missing in the completed folder",
                    record.project_code, record.analysis_id
                ))?;
                return Ok(outcome(record, "skipped-missing-job", false));
            };

            local_path = self.config.ega_xml_dir.join(&record.file_name);
            if !local_path.as_std_path().is_file() && !ctx.dry_run {
                fs::create_dir_all(self.config.ega_xml_dir.as_std_path())
                    .map_err(|err| RepairError::Filesystem(err.to_string()))?;
                sink.event(ProgressEvent {
                    message: format!("phase=Generate; bundle {}", job.bundle_id),
                    elapsed: None,
                });
                // Generation failure is non-fatal; the missing output
                // surfaces as a mismatch below.
                if let Err(err) = self.generator.generate(job, &self.config.ega_xml_dir) {
                    ctx.log_error(&format!(
                        "{}::{}: {err}",
                        record.project_code, job.bundle_id
                    ))?;
                }
            }
        }

        let local_md5 = md5_hex(&local_path)?;
        let mismatch = local_md5.as_deref() != Some(record.declared_md5.as_str())
            || local_md5 != store_md5;
        if mismatch {
            ctx.log_mismatch(record, store_md5.as_deref(), local_md5.as_deref())?;
        }

        if ctx.tracker.is_fixed(ctx.profile, &record.file_name) {
            return Ok(outcome(record, "already-fixed", mismatch));
        }

        if ctx.dry_run {
            return Ok(outcome(record, "would-fix", mismatch));
        }

        // A record without a local file cannot be remediated; leave it
        // unmarked so the next run picks it up again.
        let Some(local_md5) = local_md5 else {
            ctx.log_error(&format!(
                "{}::{}: local file {} is missing, skipping remediation",
                record.project_code, record.analysis_id, record.file_name
            ))?;
            return Ok(outcome(record, "skipped-missing-file", mismatch));
        };

        sink.event(ProgressEvent {
            message: format!("phase=Upload; object {}", record.object_id),
            elapsed: None,
        });
        self.score
            .upload(ctx.profile, &record.object_id, &local_path, &local_md5)?;
        self.bucket.copy(
            ctx.profile,
            &local_path,
            &self.config.bucket_destination(&record.object_id),
        )?;

        if local_md5 != record.declared_md5 {
            let update = FileUpdate {
                file_size: file_size(&local_path)?,
                file_md5sum: local_md5.clone(),
            };
            self.song
                .update_file(&record.project_code, &record.object_id, &update)?;
        }

        sink.event(ProgressEvent {
            message: format!("phase=Publish; analysis {}", record.analysis_id),
            elapsed: None,
        });
        let state = self
            .song
            .get_analysis_state(&record.project_code, &record.analysis_id)?;
        if state != "PUBLISHED" {
            if let Err(err) = self
                .song
                .publish(&record.project_code, &record.analysis_id)
            {
                tracing::warn!(
                    project = %record.project_code,
                    analysis = %record.analysis_id,
                    error = %err,
                    "publish failed"
                );
                ctx.log_error(&format!(
                    "{}::{}: can not be published",
                    record.project_code, record.analysis_id
                ))?;
                // No marker: the record must be retried on the next run.
                return Ok(outcome(record, "publish-failed", mismatch));
            }
        }

        ctx.tracker.mark_fixed(ctx.profile, &record.file_name)?;
        Ok(outcome(record, "fixed", mismatch))
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn outcome(record: &ManifestRecord, action: &str, mismatch: bool) -> RecordOutcome {
    RecordOutcome {
        project_code: record.project_code.clone(),
        analysis_id: record.analysis_id.clone(),
        object_id: record.object_id.clone(),
        file_name: record.file_name.clone(),
        action: action.to_string(),
        mismatch,
    }
}
