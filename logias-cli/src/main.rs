//! Logias CLI
//!
//! Command-line interface for the Logias monitoring agent.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logias_core::{HostLoader, LogSink, TargetKind};
use logias_engine::{open_sink, LuaDispatcher, LuaLoader};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "logias")]
#[command(about = "Logias - log, command and script monitoring agent", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor every configured target until interrupted
    Run {
        /// Lua configuration document
        #[arg(short, long, default_value = "/etc/logias/logias.lua")]
        config: PathBuf,
    },

    /// Load and validate a configuration, then print its targets
    Validate {
        /// Lua configuration document
        #[arg(short, long, default_value = "/etc/logias/logias.lua")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(config).await?,
        Commands::Validate { config } => validate(config)?,
    }

    Ok(())
}

fn subscriber<W>(writer: W, level: LevelFilter) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .with_ansi(false)
        .finish()
}

fn setup_logging(sink: LogSink, level: LevelFilter) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(sink, level))
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    Ok(())
}

async fn run(path: PathBuf) -> Result<()> {
    let loader = LuaLoader::file(&path);

    // log_file and log_level are only known once the document ran
    let loaded = tracing::subscriber::with_default(subscriber(std::io::stdout, LevelFilter::INFO), || {
        loader.load()
    })
    .with_context(|| format!("failed to load {}", path.display()))?;
    let sink = open_sink(&loaded.config)?;
    setup_logging(sink.clone(), loaded.config.log_level.level_filter())?;

    let dispatcher = LuaDispatcher::from_loaded(&loader, loaded, sink)
        .with_context(|| format!("failed to initialize {}", path.display()))?;

    info!(
        config = %path.display(),
        targets = dispatcher.worker_count(),
        "Starting Logias"
    );

    #[cfg(unix)]
    tokio::spawn(reopen_on_sigusr1(dispatcher.sink().clone()));

    let report = dispatcher.run(shutdown_requested()).await;
    if report.acknowledged < report.workers {
        warn!(
            workers = report.workers,
            acknowledged = report.acknowledged,
            "Some workers did not acknowledge shutdown"
        );
    }
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_requested() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                    _ = term.recv() => info!("Terminated"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for SIGINT, shutting down");
    }
}

#[cfg(unix)]
async fn reopen_on_sigusr1(sink: LogSink) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGUSR1, log rotation disabled");
            return;
        }
    };
    while usr1.recv().await.is_some() {
        match sink.reopen() {
            Ok(()) => info!("Log file reopened"),
            Err(e) => warn!(error = %e, "Failed to reopen log file"),
        }
    }
}

fn validate(path: PathBuf) -> Result<()> {
    setup_logging(LogSink::open(None)?, LevelFilter::WARN)?;

    let loader = LuaLoader::file(&path);
    let loaded = loader
        .load()
        .with_context(|| format!("failed to load {}", path.display()))?;
    let config = &loaded.config;
    // runs every initializer
    let dispatcher = LuaDispatcher::with_sink(&loader, LogSink::open(None)?.quiet())
        .with_context(|| format!("failed to initialize {}", path.display()))?;

    println!("{}: OK", path.display());
    println!("  stat_dir:  {}", config.stat_dir.display());
    match &config.log_file {
        Some(file) => println!("  log_file:  {}", file.display()),
        None => println!("  log_file:  (stdout)"),
    }
    println!("  log_level: {}", config.log_level);
    println!("  targets:   {}", dispatcher.worker_count());
    for target in &config.targets {
        let extra = match target.kind {
            TargetKind::File => format!(", stat {}", target.persistence_key()),
            TargetKind::Cmd | TargetKind::Script => String::new(),
        };
        println!(
            "  - [{}] {} every {:?}, {} filter group(s){}",
            target.kind,
            target.path,
            target.interval,
            target.filter_groups.len(),
            extra
        );
    }

    Ok(())
}
