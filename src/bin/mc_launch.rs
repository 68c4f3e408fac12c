use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mc_train_launcher::config::ConfigLoader;
use mc_train_launcher::error::LaunchError;
use mc_train_launcher::launcher::{LaunchHandler, LaunchSettings};
use mc_train_launcher::output::JsonOutput;
use mc_train_launcher::runner::{CommandRunner, SystemRunner};
use mc_train_launcher::token::{TokenLayout, TokenManager};

#[derive(Parser)]
#[command(name = "mc-launch")]
#[command(about = "Submitter for download and merge of MC train output")]
#[command(version, author)]
struct Cli {
    #[arg(short = 'o', long = "outputdir", help = "Output directory (default: current directory)")]
    outputdir: Option<Utf8PathBuf>,

    #[arg(short, long, help = "Year of the sample")]
    year: u32,

    #[arg(short, long, help = "Train run (only main number)")]
    trainrun: u32,

    #[arg(short, long, default_value = "PWGJE/Jets_EMC_pp_MC", help = "Name of the lego train")]
    legotrain: String,

    #[arg(short, long, default_value = "", help = "Copy only subsample")]
    subsample: String,

    #[arg(short, long, default_value = "long", help = "Partition for download")]
    partition: String,

    #[arg(short, long, help = "Debug mode")]
    debug: bool,

    #[arg(long, help = "JSON config file (default: ./mc-launch.json if present)")]
    config: Option<String>,

    #[arg(long, help = "Repository with the download script (default: directory of this executable)")]
    repo: Option<Utf8PathBuf>,

    #[arg(long, help = "Print the submitted jobs as JSON")]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());

    let layout = TokenLayout::for_current_user(config.token_dir.clone(), config.token_tmp_dir.clone())?;
    let tokens = TokenManager::new(
        layout,
        runner.clone(),
        config.tools.token_info.clone(),
        config.tools.token_init.clone(),
    );
    let tokens = tokens.obtain().inspect_err(|err| {
        error!("Failed generating tokens ...: {err}");
    })?;

    let output_base = match cli.outputdir {
        Some(dir) => dir,
        None => current_dir()?,
    };
    let repo = match cli.repo {
        Some(dir) => dir,
        None => executable_dir()?,
    };

    let settings = LaunchSettings::from_config(repo, output_base, &config);
    let mut handler = LaunchHandler::new(
        settings,
        &cli.legotrain,
        cli.trainrun,
        config.samples.clone(),
        runner,
    );
    handler.set_credentials(tokens.cert, tokens.key);
    handler.set_partition_for_download(&cli.partition);

    // Submission failures are logged by the handler and do not change the
    // exit code.
    if let Ok(summary) = handler.submit(cli.year, &cli.subsample) {
        if cli.json {
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf, LaunchError> {
    let cwd = std::env::current_dir().map_err(|err| LaunchError::Filesystem(err.to_string()))?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| LaunchError::Filesystem("invalid working directory".to_string()))
}

fn executable_dir() -> Result<Utf8PathBuf, LaunchError> {
    let exe = std::env::current_exe().map_err(|err| LaunchError::Filesystem(err.to_string()))?;
    let dir = exe
        .parent()
        .ok_or_else(|| LaunchError::Filesystem("executable has no parent directory".to_string()))?;
    Utf8PathBuf::from_path_buf(dir.to_path_buf())
        .map_err(|_| LaunchError::Filesystem("invalid executable path".to_string()))
}
