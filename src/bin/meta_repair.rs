use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use meta_repair::app::{App, RepairOptions, RunReport};
use meta_repair::bucket::SystemBucketClient;
use meta_repair::config::ConfigLoader;
use meta_repair::domain::Profile;
use meta_repair::ega::DockerXmlGenerator;
use meta_repair::error::RepairError;
use meta_repair::output::{JsonOutput, OutputMode, StderrProgress};
use meta_repair::process::{find_in_path, tool_version};
use meta_repair::score::SystemScoreClient;
use meta_repair::song::SongHttpClient;

#[derive(Parser)]
#[command(name = "meta-repair")]
#[command(about = "Reconcile genomic metadata XML between SONG, object storage and the local cache")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the remediation batch (default)")]
    Run(RunArgs),
    #[command(about = "Report availability of the external tools")]
    Check,
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(long, short = 'c')]
    config: Option<String>,

    #[arg(long, short = 'p', value_enum, default_value_t = Profile::Collab)]
    profile: Profile,

    #[arg(long, short = 't', env = "ACCESSTOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RepairError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RepairError) -> u8 {
    match error {
        RepairError::MissingConfig
        | RepairError::ConfigRead(_)
        | RepairError::ConfigParse(_)
        | RepairError::InvalidProfile(_)
        | RepairError::MissingManifest(_)
        | RepairError::MissingSongUrl(_)
        | RepairError::ManifestRead(_)
        | RepairError::ManifestParse { .. } => 2,
        RepairError::SongHttp(_)
        | RepairError::SongStatus { .. }
        | RepairError::ScoreCommand(_)
        | RepairError::BucketCommand(_)
        | RepairError::DockerCommand(_)
        | RepairError::MissingTool(_) => 3,
        RepairError::Filesystem(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Some(Commands::Run(args)) => run_batch(args, output_mode),
        Some(Commands::Check) => run_check(output_mode),
        None => run_batch(
            RunArgs {
                config: None,
                profile: Profile::Collab,
                access_token: std::env::var("ACCESSTOKEN").ok(),
                dry_run: false,
            },
            output_mode,
        ),
    }
}

fn run_batch(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref()).into_diagnostic()?;

    let song = SongHttpClient::new(
        config.song_url(args.profile).into_diagnostic()?,
        args.access_token.as_deref(),
    )
    .into_diagnostic()?;
    let score = SystemScoreClient::new();
    let bucket = SystemBucketClient::new(&config.collab_endpoint_url);
    let generator = DockerXmlGenerator::new(&config.container_image);

    let options = RepairOptions {
        profile: args.profile,
        dry_run: args.dry_run,
    };
    let app = App::new(config, song, score, bucket, generator);

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(options, &JsonOutput).into_diagnostic()?;
            JsonOutput::print_run(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let result = app.run(options, &StderrProgress).into_diagnostic()?;
            print_run_summary(&result);
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct ToolReport {
    docker: Option<String>,
    score_client: Option<String>,
    aws: Option<String>,
}

fn run_check(output_mode: OutputMode) -> miette::Result<()> {
    let report = ToolReport {
        docker: find_in_path("docker").and_then(|path| tool_version(&path, &["--version"])),
        score_client: find_in_path("score-client").map(|path| path.display().to_string()),
        aws: find_in_path("aws").and_then(|path| tool_version(&path, &["--version"])),
    };

    match output_mode {
        OutputMode::NonInteractive => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).into_diagnostic()?
            );
        }
        OutputMode::Interactive => {
            print_tool_line("docker", report.docker.as_deref());
            print_tool_line("score-client", report.score_client.as_deref());
            print_tool_line("aws", report.aws.as_deref());
        }
    }
    Ok(())
}

fn print_tool_line(name: &str, detail: Option<&str>) {
    match detail {
        Some(detail) => println!("\x1b[32m✔ {name}: {detail}\x1b[0m"),
        None => println!("\x1b[31m✘ {name}: not found on PATH\x1b[0m"),
    }
}

fn print_run_summary(result: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}meta-repair summary ({}){reset}", result.profile);
    println!("{green}fixed: {}{reset}", result.fixed_count());
    println!("{yellow}mismatches logged: {}{reset}", result.mismatch_count());

    for item in &result.items {
        let color = match item.action.as_str() {
            "fixed" | "would-fix" => green,
            "already-fixed" | "skipped-out-of-scope" => cyan,
            _ => yellow,
        };
        println!(
            "{color}  {}::{} {} ({}){reset}",
            item.project_code, item.analysis_id, item.file_name, item.action
        );
    }
}
