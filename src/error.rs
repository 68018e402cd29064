use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RepairError {
    #[error("missing config file meta-repair.yaml in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse YAML config: {0}")]
    ConfigParse(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("no manifest configured for profile {0}")]
    MissingManifest(String),

    #[error("no SONG endpoint configured for profile {0}")]
    MissingSongUrl(String),

    #[error("failed to read manifest {0}")]
    ManifestRead(Utf8PathBuf),

    #[error("malformed record at {path}:{line}: {message}")]
    ManifestParse {
        path: Utf8PathBuf,
        line: usize,
        message: String,
    },

    #[error("SONG request failed: {0}")]
    SongHttp(String),

    #[error("SONG returned status {status}: {message}")]
    SongStatus { status: u16, message: String },

    #[error("score-client failed: {0}")]
    ScoreCommand(String),

    #[error("aws s3 copy failed: {0}")]
    BucketCommand(String),

    #[error("docker failed: {0}")]
    DockerCommand(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
