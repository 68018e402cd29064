use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use meta_repair::app::{App, RepairOptions};
use meta_repair::bucket::BucketClient;
use meta_repair::checksum::md5_hex;
use meta_repair::config::ResolvedConfig;
use meta_repair::domain::{EgaTransferJob, Profile};
use meta_repair::ega::XmlGenerator;
use meta_repair::error::RepairError;
use meta_repair::output::JsonOutput;
use meta_repair::score::ScoreClient;
use meta_repair::song::{FileUpdate, SongClient};

#[derive(Default)]
struct SongState {
    states: Mutex<HashMap<String, String>>,
    updates: Mutex<Vec<(String, FileUpdate)>>,
    publishes: Mutex<Vec<String>>,
    fail_publish: bool,
}

#[derive(Default, Clone)]
struct MockSong {
    inner: Arc<SongState>,
}

impl MockSong {
    fn failing_publish() -> Self {
        Self {
            inner: Arc::new(SongState {
                fail_publish: true,
                ..SongState::default()
            }),
        }
    }
}

impl SongClient for MockSong {
    fn get_analysis_state(&self, _project: &str, analysis_id: &str) -> Result<String, RepairError> {
        let states = self.inner.states.lock().unwrap();
        Ok(states
            .get(analysis_id)
            .cloned()
            .unwrap_or_else(|| "UNPUBLISHED".to_string()))
    }

    fn update_file(
        &self,
        _project: &str,
        object_id: &str,
        update: &FileUpdate,
    ) -> Result<(), RepairError> {
        self.inner
            .updates
            .lock()
            .unwrap()
            .push((object_id.to_string(), update.clone()));
        Ok(())
    }

    fn publish(&self, _project: &str, analysis_id: &str) -> Result<(), RepairError> {
        if self.inner.fail_publish {
            return Err(RepairError::SongStatus {
                status: 409,
                message: "analysis is not in a publishable state".to_string(),
            });
        }
        self.inner
            .publishes
            .lock()
            .unwrap()
            .push(analysis_id.to_string());
        self.inner
            .states
            .lock()
            .unwrap()
            .insert(analysis_id.to_string(), "PUBLISHED".to_string());
        Ok(())
    }
}

#[derive(Default)]
struct ScoreState {
    downloads: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, String)>>,
    // objectId -> (fileName, content) materialized on download
    remote: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

#[derive(Default, Clone)]
struct MockScore {
    inner: Arc<ScoreState>,
}

impl MockScore {
    fn with_remote(&self, object_id: &str, file_name: &str, content: &[u8]) {
        self.inner.remote.lock().unwrap().insert(
            object_id.to_string(),
            (file_name.to_string(), content.to_vec()),
        );
    }
}

impl ScoreClient for MockScore {
    fn download(
        &self,
        _profile: Profile,
        object_id: &str,
        output_dir: &Utf8Path,
    ) -> Result<(), RepairError> {
        self.inner
            .downloads
            .lock()
            .unwrap()
            .push(object_id.to_string());
        if let Some((file_name, content)) = self.inner.remote.lock().unwrap().get(object_id) {
            std::fs::create_dir_all(output_dir.as_std_path()).unwrap();
            std::fs::write(output_dir.join(file_name).as_std_path(), content).unwrap();
        }
        Ok(())
    }

    fn upload(
        &self,
        _profile: Profile,
        object_id: &str,
        _file: &Utf8Path,
        md5: &str,
    ) -> Result<(), RepairError> {
        self.inner
            .uploads
            .lock()
            .unwrap()
            .push((object_id.to_string(), md5.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct BucketState {
    copies: Mutex<Vec<(String, String)>>,
}

#[derive(Default, Clone)]
struct MockBucket {
    inner: Arc<BucketState>,
}

impl BucketClient for MockBucket {
    fn copy(
        &self,
        _profile: Profile,
        file: &Utf8Path,
        destination_url: &str,
    ) -> Result<(), RepairError> {
        self.inner
            .copies
            .lock()
            .unwrap()
            .push((file.to_string(), destination_url.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct GeneratorState {
    calls: Mutex<usize>,
    content: Option<Vec<u8>>,
    fail: bool,
}

#[derive(Default, Clone)]
struct MockGenerator {
    inner: Arc<GeneratorState>,
}

impl MockGenerator {
    fn producing(content: &[u8]) -> Self {
        Self {
            inner: Arc::new(GeneratorState {
                content: Some(content.to_vec()),
                ..GeneratorState::default()
            }),
        }
    }

    fn failing() -> Self {
        Self {
            inner: Arc::new(GeneratorState {
                fail: true,
                ..GeneratorState::default()
            }),
        }
    }

    fn calls(&self) -> usize {
        *self.inner.calls.lock().unwrap()
    }
}

impl XmlGenerator for MockGenerator {
    fn generate(&self, job: &EgaTransferJob, out_dir: &Utf8Path) -> Result<(), RepairError> {
        *self.inner.calls.lock().unwrap() += 1;
        if self.inner.fail {
            return Err(RepairError::DockerCommand("exit status 1".to_string()));
        }
        if let Some(content) = &self.inner.content {
            std::fs::write(out_dir.join(&job.output_file).as_std_path(), content).unwrap();
        }
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: Utf8PathBuf,
    config: ResolvedConfig,
    song: MockSong,
    score: MockScore,
    bucket: MockBucket,
    generator: MockGenerator,
}

impl Fixture {
    fn new() -> Self {
        Self::with_collaborators(MockSong::default(), MockGenerator::default())
    }

    fn with_collaborators(song: MockSong, generator: MockGenerator) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let config = ResolvedConfig {
            collab_manifest: root.join("collab.tsv"),
            aws_manifest: Some(root.join("aws.tsv")),
            ega_jobs: root.join("ega_jobs.tsv"),
            xml_dir: root.join("xml"),
            ega_xml_dir: root.join("ega_xml"),
            fix_dir: root.join("fixed"),
            error_log: root.join("logs/errors.log"),
            mismatch_log: root.join("logs/mismatch.tsv"),
            meta_bucket_url: "s3://meta.bucket/".to_string(),
            collab_endpoint_url: "https://collab.example:9080".to_string(),
            collab_song_url: "https://song.collab.example".to_string(),
            aws_song_url: Some("https://song.aws.example".to_string()),
            aws_approved: vec!["PACA-CA".to_string()],
            container_image: "quay.io/example/xmlgen".to_string(),
        };
        let fixture = Self {
            _dir: dir,
            root,
            config,
            song,
            score: MockScore::default(),
            bucket: MockBucket::default(),
            generator,
        };
        fixture.write(&fixture.config.collab_manifest.clone(), "");
        fixture.write(&fixture.config.aws_manifest.clone().unwrap(), "");
        fixture.write(&fixture.config.ega_jobs.clone(), "");
        fixture
    }

    fn write(&self, path: &Utf8Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path()).unwrap();
        }
        std::fs::write(path.as_std_path(), content).unwrap();
    }

    fn write_local_xml(&self, file_name: &str, content: &[u8]) -> String {
        std::fs::create_dir_all(self.config.xml_dir.as_std_path()).unwrap();
        let path = self.config.xml_dir.join(file_name);
        std::fs::write(path.as_std_path(), content).unwrap();
        md5_hex(&path).unwrap().unwrap()
    }

    fn app(&self) -> App<MockSong, MockScore, MockBucket, MockGenerator> {
        App::new(
            self.config.clone(),
            self.song.clone(),
            self.score.clone(),
            self.bucket.clone(),
            self.generator.clone(),
        )
    }

    fn error_log(&self) -> String {
        std::fs::read_to_string(self.config.error_log.as_std_path()).unwrap_or_default()
    }

    fn mismatch_log(&self) -> String {
        std::fs::read_to_string(self.config.mismatch_log.as_std_path()).unwrap_or_default()
    }
}

fn collab_options() -> RepairOptions {
    RepairOptions {
        profile: Profile::Collab,
        dry_run: false,
    }
}

#[test]
fn matching_digests_produce_no_mismatch_entry() {
    let fixture = Fixture::new();
    let md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].action, "fixed");
    assert!(!report.items[0].mismatch);
    assert_eq!(fixture.mismatch_log(), "");
    // digests agreed, so the SONG file record needed no update
    assert!(fixture.song.inner.updates.lock().unwrap().is_empty());
    assert_eq!(
        fixture.song.inner.publishes.lock().unwrap().as_slice(),
        ["a1"]
    );
    assert_eq!(
        fixture.score.inner.uploads.lock().unwrap().as_slice(),
        [("o1".to_string(), md5)]
    );
}

#[test]
fn preexisting_marker_suppresses_side_effects() {
    let fixture = Fixture::new();
    let md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );
    fixture.write(
        &fixture.config.fix_dir.join("collab/analysis.a1.xml.fix"),
        "",
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items[0].action, "already-fixed");
    assert!(fixture.score.inner.uploads.lock().unwrap().is_empty());
    assert!(fixture.bucket.inner.copies.lock().unwrap().is_empty());
    assert!(fixture.song.inner.publishes.lock().unwrap().is_empty());
    assert!(fixture.song.inner.updates.lock().unwrap().is_empty());
}

#[test]
fn missing_transfer_job_skips_record_with_one_log_line() {
    let fixture = Fixture::new();
    let md5 = fixture.write_local_xml("bundle.EGAZ1.xml", b"<stale/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("LIRI-JP\to1\tEGAZ1\tbundle.EGAZ1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items[0].action, "skipped-missing-job");
    assert_eq!(fixture.generator.calls(), 0);
    assert!(
        !fixture
            .config
            .ega_xml_dir
            .join("bundle.EGAZ1.xml")
            .as_std_path()
            .exists()
    );
    let log = fixture.error_log();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("LIRI-JP::EGAZ1: the ega transfer job is missing"));
    assert!(fixture.score.inner.uploads.lock().unwrap().is_empty());
}

#[test]
fn mismatch_is_logged_once_and_local_digest_propagates() {
    let fixture = Fixture::new();
    let local_md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis version=\"2\"/>");
    let stale_md5 = "d41d8cd98f00b204e9800998ecf8427e";
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{stale_md5}\n"),
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items[0].action, "fixed");
    assert!(report.items[0].mismatch);

    let mismatches = fixture.mismatch_log();
    assert_eq!(mismatches.lines().count(), 1);
    assert_eq!(
        mismatches.trim_end(),
        format!("PACA-CA\ta1\t{local_md5}\t{stale_md5}\t{local_md5}")
    );

    // the freshly computed digest is pushed everywhere
    assert_eq!(
        fixture.score.inner.uploads.lock().unwrap().as_slice(),
        [("o1".to_string(), local_md5.clone())]
    );
    let updates = fixture.song.inner.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "o1");
    assert_eq!(updates[0].1.file_md5sum, local_md5);
    assert_eq!(updates[0].1.file_size, b"<analysis version=\"2\"/>".len() as u64);
}

#[test]
fn absent_local_copy_is_downloaded_first() {
    let fixture = Fixture::new();
    fixture.score.with_remote("o1", "analysis.a1.xml", b"<analysis/>");
    let md5 = {
        // digest the same bytes the mock will materialize
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("probe")).unwrap();
        std::fs::write(path.as_std_path(), b"<analysis/>").unwrap();
        md5_hex(&path).unwrap().unwrap()
    };
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(
        fixture.score.inner.downloads.lock().unwrap().as_slice(),
        ["o1"]
    );
    assert_eq!(report.items[0].action, "fixed");
    assert!(!report.items[0].mismatch);
}

#[test]
fn generated_bundle_xml_is_uploaded() {
    let generator = MockGenerator::producing(b"<bundle/>");
    let fixture = Fixture::with_collaborators(MockSong::default(), generator);
    let md5 = fixture.write_local_xml("bundle.EGAZ1.xml", b"<bundle/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("LIRI-JP\to1\tEGAZ1\tbundle.EGAZ1.xml\t{md5}\n"),
    );
    fixture.write(
        &fixture.config.ega_jobs.clone(),
        "b1\thttps://ega.example/repo\tLIRI-JP\tbundle.EGAZ1.xml\tEGAD1\tEGAZ1\t\t\tEGAN1\tEGAS1\n",
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items[0].action, "fixed");
    assert_eq!(fixture.generator.calls(), 1);
    assert!(
        fixture
            .config
            .ega_xml_dir
            .join("bundle.EGAZ1.xml")
            .as_std_path()
            .is_file()
    );
    // upload reads the regenerated copy, not the download cache
    let copies = fixture.bucket.inner.copies.lock().unwrap();
    assert!(copies[0].0.contains("ega_xml"));
    assert_eq!(copies[0].1, "s3://meta.bucket/o1");
}

#[test]
fn generation_failure_is_logged_and_record_left_unmarked() {
    let fixture = Fixture::with_collaborators(MockSong::default(), MockGenerator::failing());
    let md5 = fixture.write_local_xml("bundle.EGAZ1.xml", b"<stale/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("LIRI-JP\to1\tEGAZ1\tbundle.EGAZ1.xml\t{md5}\n"),
    );
    fixture.write(
        &fixture.config.ega_jobs.clone(),
        "b1\thttps://ega.example/repo\tLIRI-JP\tbundle.EGAZ1.xml\tEGAD1\tEGAZ1\t\t\tEGAN1\tEGAS1\n",
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items[0].action, "skipped-missing-file");
    assert!(report.items[0].mismatch);
    assert!(fixture.error_log().contains("LIRI-JP::b1:"));
    assert!(fixture.score.inner.uploads.lock().unwrap().is_empty());
    assert!(
        !fixture
            .config
            .fix_dir
            .join("collab/bundle.EGAZ1.xml.fix")
            .as_std_path()
            .exists()
    );
}

#[test]
fn aws_gate_combinations() {
    let fixture = Fixture::new();
    let md5_allowed = fixture.write_local_xml("a.xml", b"<a/>");
    let md5_missing = fixture.write_local_xml("b.xml", b"<b/>");
    let md5_denied = fixture.write_local_xml("c.xml", b"<c/>");
    let md5_outside = fixture.write_local_xml("d.xml", b"<d/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!(
            "PACA-CA\to1\ta1\ta.xml\t{md5_allowed}\n\
             PACA-CA\to2\ta2\tb.xml\t{md5_missing}\n\
             LIRI-JP\to3\ta3\tc.xml\t{md5_denied}\n\
             LIRI-JP\to4\ta4\td.xml\t{md5_outside}\n"
        ),
    );
    // only o1 and o3 exist on the aws back-end
    fixture.write(
        &fixture.config.aws_manifest.clone().unwrap(),
        &format!("PACA-CA\to1\ta1\ta.xml\t{md5_allowed}\nLIRI-JP\to3\ta3\tc.xml\t{md5_denied}\n"),
    );

    let app = fixture.app();
    let report = app
        .run(
            RepairOptions {
                profile: Profile::Aws,
                dry_run: false,
            },
            &JsonOutput,
        )
        .unwrap();

    let actions: Vec<&str> = report.items.iter().map(|item| item.action.as_str()).collect();
    assert_eq!(
        actions,
        [
            "fixed",
            "skipped-missing-from-aws",
            "skipped-not-allowed",
            "skipped-out-of-scope",
        ]
    );

    let log = fixture.error_log();
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains("PACA-CA::a2 object o2: is missing from the AWS manifest"));
    assert!(log.contains("LIRI-JP::a3 object o3: is not allowed in AWS"));

    // only the approved-and-present record was remediated
    assert_eq!(
        fixture.score.inner.uploads.lock().unwrap().as_slice(),
        [("o1".to_string(), md5_allowed)]
    );
}

#[test]
fn second_run_is_a_no_op() {
    let fixture = Fixture::new();
    let md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let first = app.run(collab_options(), &JsonOutput).unwrap();
    assert_eq!(first.items[0].action, "fixed");

    let second = app.run(collab_options(), &JsonOutput).unwrap();
    assert_eq!(second.items[0].action, "already-fixed");
    assert_eq!(fixture.score.inner.uploads.lock().unwrap().len(), 1);
    assert_eq!(fixture.bucket.inner.copies.lock().unwrap().len(), 1);
    assert_eq!(fixture.song.inner.publishes.lock().unwrap().len(), 1);
}

#[test]
fn failed_publish_leaves_record_unmarked_for_retry() {
    let fixture = Fixture::with_collaborators(MockSong::failing_publish(), MockGenerator::default());
    let md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let first = app.run(collab_options(), &JsonOutput).unwrap();
    assert_eq!(first.items[0].action, "publish-failed");
    assert!(fixture.error_log().contains("PACA-CA::a1: can not be published"));
    assert!(
        !fixture
            .config
            .fix_dir
            .join("collab/analysis.a1.xml.fix")
            .as_std_path()
            .exists()
    );

    // next run retries the whole record instead of treating it as done
    let second = app.run(collab_options(), &JsonOutput).unwrap();
    assert_eq!(second.items[0].action, "publish-failed");
    assert_eq!(fixture.score.inner.uploads.lock().unwrap().len(), 2);
}

#[test]
fn already_published_analysis_is_not_republished() {
    let fixture = Fixture::new();
    fixture
        .song
        .inner
        .states
        .lock()
        .unwrap()
        .insert("a1".to_string(), "PUBLISHED".to_string());
    let md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let report = app.run(collab_options(), &JsonOutput).unwrap();

    assert_eq!(report.items[0].action, "fixed");
    assert!(fixture.song.inner.publishes.lock().unwrap().is_empty());
}

#[test]
fn dry_run_reports_without_side_effects() {
    let fixture = Fixture::new();
    let md5 = fixture.write_local_xml("analysis.a1.xml", b"<analysis/>");
    fixture.write(
        &fixture.config.collab_manifest.clone(),
        &format!("PACA-CA\to1\ta1\tanalysis.a1.xml\t{md5}\n"),
    );

    let app = fixture.app();
    let report = app
        .run(
            RepairOptions {
                profile: Profile::Collab,
                dry_run: true,
            },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(report.items[0].action, "would-fix");
    assert!(fixture.score.inner.uploads.lock().unwrap().is_empty());
    assert!(fixture.song.inner.publishes.lock().unwrap().is_empty());
    assert!(!fixture.config.error_log.as_std_path().exists());
    assert!(!fixture.root.join("fixed").as_std_path().exists());
}
