//! globtail - follow every file matching a set of glob patterns.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use globtail::config::{CliOverrides, ConfigError, ConfigLoader, TailConfig};
use globtail::display::{ColorChoice, OutputSink};
use globtail::watcher::WatcherError;
use globtail::Tailer;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => ColorChoice::Auto,
            ColorArg::Always => ColorChoice::Always,
            ColorArg::Never => ColorChoice::Never,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "globtail",
    about = "Tail every file matching a set of glob patterns",
    version
)]
struct Cli {
    /// Glob patterns of files to follow (`*`, `?` and `**` are supported).
    #[arg(value_name = "GLOB_PATTERN")]
    patterns: Vec<String>,

    /// Interval to poll files for new content [default: 500ms].
    #[arg(long, value_parser = humantime::parse_duration)]
    poll_interval: Option<Duration>,

    /// Interval to scan for new files matching the patterns [default: 3s].
    #[arg(long, value_parser = humantime::parse_duration)]
    scan_interval: Option<Duration>,

    /// Interval for showing no files changed, 0 disables it [default: 1m].
    #[arg(long, value_parser = humantime::parse_duration)]
    disp_interval: Option<Duration>,

    /// Configuration file (defaults to ./.globtail.toml, then the user config dir).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// When to color separator lines.
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Error creating directory watcher: {0}")]
    Watcher(#[from] WatcherError),
}

fn init_tracing(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let loader = match cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let file_config = loader.load()?;

    let config = TailConfig::from_sources(
        file_config,
        CliOverrides {
            patterns: cli.patterns,
            poll_interval: cli.poll_interval,
            scan_interval: cli.scan_interval,
            disp_interval: cli.disp_interval,
        },
    )?;
    tracing::debug!(
        patterns = ?config.patterns,
        poll_interval = ?config.poll_interval,
        scan_interval = ?config.scan_interval,
        disp_interval = ?config.disp_interval,
        "Starting globtail"
    );

    let tailer = Tailer::with_notify(Arc::new(config))?;

    let shutdown = tailer.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received");
            shutdown.cancel();
        }
    });

    tailer.run(OutputSink::stdout(cli.color.into())).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(StartupError::Config(ConfigError::NoPatterns)) => {
            eprintln!("{}", Cli::command().render_usage());
            eprintln!("Error: at least one glob pattern is required");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
