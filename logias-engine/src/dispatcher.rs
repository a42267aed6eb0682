//! Dispatcher: owns the shared log sink and the shutdown channel, runs one
//! worker per target and coordinates shutdown.

use crate::worker::Worker;
use crate::EngineError;
use logias_core::{
    Config, HostLoader, Loaded, LogLevel, LogSink, ScriptHost, ShutdownChannel, ShutdownReport,
};
use std::future::Future;
use std::path::Path;
use tokio::task::JoinSet;
use tracing::{error, info};

pub struct Dispatcher<H: ScriptHost> {
    sink: LogSink,
    log_level: LogLevel,
    channel: ShutdownChannel,
    workers: Vec<Worker<H>>,
}

impl<H: ScriptHost> Dispatcher<H> {
    /// Load the configuration once for the shared context, then build one
    /// worker per target, each from its own load.
    pub fn new<L>(loader: &L) -> Result<Self, EngineError>
    where
        L: HostLoader<Host = H>,
    {
        let loaded = loader.load()?;
        let sink = open_sink(&loaded.config)?;
        Self::from_loaded(loader, loaded, sink)
    }

    /// Like [`Dispatcher::new`] with a caller-provided log sink
    pub fn with_sink<L>(loader: &L, sink: LogSink) -> Result<Self, EngineError>
    where
        L: HostLoader<Host = H>,
    {
        let loaded = loader.load()?;
        Self::from_loaded(loader, loaded, sink)
    }

    /// Build the workers for a configuration the caller already loaded, so
    /// logging can be set up from it before any worker exists.
    pub fn from_loaded<L>(loader: &L, loaded: Loaded<H>, sink: LogSink) -> Result<Self, EngineError>
    where
        L: HostLoader<Host = H>,
    {
        let config = &loaded.config;
        let channel = ShutdownChannel::new();

        let workers = config
            .targets
            .iter()
            .map(|target| Worker::new(loader, &target.path, channel.subscribe()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(workers = workers.len(), "Dispatcher ready");

        Ok(Self {
            sink,
            log_level: config.log_level,
            channel,
            workers,
        })
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn target_paths(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.path().to_string()).collect()
    }

    /// Run every worker until `exit` resolves, then fan out the shutdown
    /// wait group and block until each worker acknowledged it.
    pub async fn run<F>(self, exit: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        let Self {
            sink,
            channel,
            workers,
            ..
        } = self;

        let mut tasks = JoinSet::new();
        for worker in workers {
            tasks.spawn(worker.run());
        }

        exit.await;
        info!(workers = tasks.len(), "Shutdown requested");

        let report = channel.shutdown().await;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }

        info!(
            workers = report.workers,
            acknowledged = report.acknowledged,
            "All workers stopped"
        );
        if let Err(e) = sink.close() {
            error!(error = %e, "Failed to close log file");
        }
        report
    }
}

/// Log sink for the configured `log_file`
pub fn open_sink<C>(config: &Config<C>) -> Result<LogSink, EngineError> {
    let log_file = config.log_file.as_deref();
    LogSink::open(log_file)
        .map_err(|e| EngineError::LogFile(log_file.map(Path::to_path_buf).unwrap_or_default(), e))
}
