use std::{fs::OpenOptions, path::PathBuf, sync::Mutex};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dirs_next::data_dir;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod app;
mod batch;
mod commands;
mod config;
mod engine;
mod error;
mod history;
mod player;
mod providers;
mod routes;
mod selection;
#[cfg(test)]
mod testing;
mod types;
mod validate;
mod view;

use app::App;
use config::{CliOverrides, Settings, config_path};
use history::{HistoryStore, history_path};
use player::{MpvSink, detect_player};
use providers::allanime::AllAnimeProvider;
use routes::Services;

#[derive(Debug, Parser)]
#[command(
    name = "anicli",
    about = "Search anime, pick episodes and stream them in mpv.",
    version
)]
struct Cli {
    /// Prefer dubbed releases
    #[arg(long)]
    dub: bool,

    /// Preferred video quality, e.g. 720 or 1080
    #[arg(short, long, value_name = "QUALITY")]
    quality: Option<u32>,

    /// Episodes per mpv playlist when playing a slice
    #[arg(long, value_name = "N")]
    m3u_size: Option<usize>,

    /// Extra mpv arguments, shell quoted
    #[arg(long, value_name = "OPTS", allow_hyphen_values = true)]
    mpv_opts: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also log to stderr
    #[arg(long)]
    debug: bool,

    /// Command to run before the prompt opens, e.g. `search lain`
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    command: Vec<String>,
}

fn log_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join("anicli").join("anicli.log"))
}

fn setup_logging(debug: bool) -> Result<()> {
    let path = log_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,anicli=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(debug.then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = setup_logging(cli.debug) {
        eprintln!("Warning: Could not set up logging: {err:#}");
    }

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_path()?,
    };
    let mut settings = Settings::load(&path)?;
    settings.apply(&CliOverrides {
        dub: cli.dub,
        quality: cli.quality,
        m3u_size: cli.m3u_size,
        mpv_opts: cli.mpv_opts.clone(),
    })?;
    info!(config = %path.display(), "starting anicli");

    if !settings.provider.eq_ignore_ascii_case("allanime") {
        warn!(provider = %settings.provider, "unsupported provider");
        println!(
            "Warning: Only 'allanime' is supported. Switching from '{}' to 'allanime'.",
            settings.provider
        );
        settings.provider = "allanime".to_string();
    }

    let services = Services {
        provider: AllAnimeProvider::new(settings.translation)?,
        sink: MpvSink::new(detect_player(&settings.player)),
        history: HistoryStore::new(history_path()?, settings.history_limit),
    };
    info!(history = %services.history.path().display(), "history file");
    let initial = (!cli.command.is_empty()).then(|| cli.command.join(" "));

    let mut app = App::new(settings, services)?;
    app.run(initial).await
}
