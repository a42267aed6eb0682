//! Worker: the polling loop of one target
//!
//! Each worker owns its own script host, loaded independently from the same
//! configuration source, together with the target's State. Ticks run
//! strictly one after another; between ticks the worker waits for either the
//! target's interval or the shutdown signal.

use crate::downtime::{DowntimeGate, Transition};
use crate::escalate::{escalate, Escalation, SYSTEM_ERROR_LEVEL};
use crate::pipeline::Pipeline;
use crate::EngineError;
use logias_core::{
    Config, ConfigError, FileTail, HostLoader, LineFlow, Loaded, ScriptHost, ShutdownListener,
    Target, TargetKind, WaitGroup,
};
use tracing::{debug, error, info, warn};

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Running,
    Stopping,
    Stopped,
}

enum Wakeup {
    Tick,
    Shutdown(Option<WaitGroup>),
}

pub struct Worker<H: ScriptHost> {
    /// Shared settings; the target list is emptied once ours is taken
    config: Config<H::Callback>,
    target: Target<H::Callback>,
    state: H::Value,
    gate: DowntimeGate,
    pending_reset: bool,
    tail: Option<FileTail>,
    shutdown: ShutdownListener,
    phase: WorkerPhase,
    /// Dropped after every value it created
    host: H,
}

impl<H: ScriptHost> Worker<H> {
    /// Load a dedicated host for `path` and create its initial State.
    pub fn new<L>(loader: &L, path: &str, shutdown: ShutdownListener) -> Result<Self, EngineError>
    where
        L: HostLoader<Host = H>,
    {
        let Loaded { host, mut config } = loader.load()?;
        let target = config.take_target(path)?;
        config.targets.clear();

        let state = host
            .call(&target.initial_state, Vec::new())
            .map_err(|source| ConfigError::Initializer {
                target: target.path.clone(),
                source,
            })?;

        let tail = (target.kind == TargetKind::File)
            .then(|| FileTail::new(&target.path, &config.stat_dir));

        debug!(
            target_path = %target.path,
            kind = %target.kind,
            interval_ms = target.interval.as_millis() as u64,
            "Worker created"
        );

        Ok(Self {
            config,
            target,
            state,
            gate: DowntimeGate::new(),
            pending_reset: false,
            tail,
            shutdown,
            phase: WorkerPhase::Running,
            host,
        })
    }

    pub fn path(&self) -> &str {
        &self.target.path
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Current State of the target
    pub fn state(&self) -> &H::Value {
        &self.state
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn in_downtime(&self) -> bool {
        self.gate.in_downtime()
    }

    /// A State reset is owed from leaving downtime
    pub fn pending_reset(&self) -> bool {
        self.pending_reset
    }

    /// Poll until shutdown, then acknowledge it.
    ///
    /// Tick bodies run user callbacks and file I/O synchronously, so they
    /// are moved to the blocking pool; a slow target never holds a runtime
    /// thread other targets' timers depend on.
    pub async fn run(mut self) -> WorkerPhase {
        info!(target_path = %self.target.path, kind = %self.target.kind, "Worker started");

        loop {
            let wakeup = tokio::select! {
                wg = self.shutdown.recv() => Wakeup::Shutdown(wg),
                _ = tokio::time::sleep(self.target.interval) => Wakeup::Tick,
            };

            match wakeup {
                Wakeup::Tick => match self.tick_offloaded().await {
                    Some(worker) => self = worker,
                    None => return WorkerPhase::Stopping,
                },
                Wakeup::Shutdown(wg) => {
                    self.phase = WorkerPhase::Stopping;
                    debug!(target_path = %self.target.path, "Worker stopping");
                    self.phase = WorkerPhase::Stopped;
                    info!(target_path = %self.target.path, "Worker stopped");
                    if let Some(wg) = wg {
                        wg.done();
                    }
                    return self.phase;
                }
            }
        }
    }

    /// One poll of the target, run inline on the calling task
    pub async fn tick(&mut self) {
        if !self.enter_tick() {
            return;
        }

        match self.target.kind {
            TargetKind::Cmd => {
                let output = run_command(&self.target.path).await;
                self.handle_output(output);
            }
            TargetKind::File | TargetKind::Script => self.poll_local(),
        }
    }

    /// [`Worker::tick`] with the synchronous steps on the blocking pool.
    /// `None` when the runtime is shutting down.
    async fn tick_offloaded(self) -> Option<Self> {
        let (mut worker, proceed) = offload(self, Self::enter_tick).await?;
        if !proceed {
            return Some(worker);
        }

        if worker.target.kind == TargetKind::Cmd {
            // the child process is awaited on the runtime, parsing is not
            let output = run_command(&worker.target.path).await;
            worker = offload(worker, move |w| w.handle_output(output)).await?.0;
            return Some(worker);
        }
        offload(worker, Self::poll_local).await.map(|(worker, ())| worker)
    }

    /// Downtime gate and pending State reset. `false` abandons the tick.
    fn enter_tick(&mut self) -> bool {
        let in_downtime = match DowntimeGate::query(&self.host, self.config.downtime.as_ref()) {
            Ok(down) => down,
            Err(e) => {
                self.escalate(&format!("downtime check failed for {}: {}", self.target.path, e));
                false
            }
        };

        match self.gate.update(in_downtime) {
            Transition::Entered => info!(target_path = %self.target.path, "Entering downtime"),
            Transition::Resumed => {
                info!(target_path = %self.target.path, "Leaving downtime, resetting state");
                self.pending_reset = true;
            }
            Transition::Unchanged => {}
        }
        self.host.set_downtime(in_downtime);

        if self.pending_reset {
            match self.host.call(&self.target.initial_state, Vec::new()) {
                Ok(state) => {
                    self.state = state;
                    self.pending_reset = false;
                }
                Err(e) => {
                    self.escalate(&format!("initializer failed for {}: {}", self.target.path, e));
                    return false;
                }
            }
        }
        true
    }

    fn poll_local(&mut self) {
        match self.target.kind {
            TargetKind::File => self.poll_file(),
            TargetKind::Script => self.poll_script(),
            TargetKind::Cmd => {}
        }
    }

    fn handle_output(&mut self, output: Result<String, String>) {
        match output {
            Ok(output) if output.is_empty() => {
                debug!(target_path = %self.target.path, "Command produced no output");
            }
            Ok(output) => {
                self.handle_line(&output);
            }
            Err(message) => {
                self.escalate(&message);
            }
        }
    }

    fn poll_file(&self) {
        let Some(tail) = &self.tail else {
            return;
        };
        match tail.poll(|line| self.handle_line(line)) {
            Ok(outcome) if outcome.lines > 0 => {
                debug!(
                    target_path = %self.target.path,
                    lines = outcome.lines,
                    offset = outcome.position.offset,
                    "Lines processed"
                );
            }
            Ok(_) => {}
            Err(e) => {
                self.escalate(&e.to_string());
            }
        }
    }

    fn poll_script(&self) {
        let Some(script) = &self.target.script else {
            return;
        };
        match self.host.call(script, Vec::new()) {
            Ok(object) => {
                let line = self.host.render(&object);
                debug!(target_path = %self.target.path, result = %line, "Script result");
                self.process(&line, &object);
            }
            Err(e) => {
                self.escalate(&format!("script failed for {}: {}", self.target.path, e));
            }
        }
    }

    /// Parse one line and run the filter groups. A parse failure stops the
    /// current batch.
    fn handle_line(&self, line: &str) -> LineFlow {
        let object = match &self.target.parser {
            None => self.host.nil(),
            Some(parser) => {
                let parsed = self
                    .host
                    .string(line)
                    .and_then(|arg| self.host.call(parser, vec![arg]));
                match parsed {
                    Ok(object) => object,
                    Err(e) => {
                        self.escalate(&format!("parser failed for {}: {}", self.target.path, e));
                        return LineFlow::Stop;
                    }
                }
            }
        };
        self.process(line, &object);
        LineFlow::Continue
    }

    fn process(&self, line: &str, object: &H::Value) {
        let pipeline = Pipeline::new(
            &self.host,
            &self.config,
            &self.target,
            &self.state,
            self.gate.in_downtime(),
        );
        let report = pipeline.evaluate(line, object);
        if report.delivered + report.suppressed + report.errors > 0 {
            debug!(
                target_path = %self.target.path,
                delivered = report.delivered,
                suppressed = report.suppressed,
                errors = report.errors,
                "Event evaluated"
            );
        }
    }

    fn escalate(&self, message: &str) -> Escalation {
        escalate(
            &self.host,
            &self.config,
            &self.target.path,
            SYSTEM_ERROR_LEVEL,
            message,
        )
    }
}

/// Run `f` against `worker` on the blocking pool and hand the worker back.
/// A panic inside `f` is resumed on the calling task.
async fn offload<H, T, F>(worker: Worker<H>, f: F) -> Option<(Worker<H>, T)>
where
    H: ScriptHost,
    T: Send + 'static,
    F: FnOnce(&mut Worker<H>) -> T + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let mut worker = worker;
        let out = f(&mut worker);
        (worker, out)
    })
    .await;

    match joined {
        Ok(pair) => Some(pair),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            error!(error = %e, "Tick cancelled");
            None
        }
    }
}

/// Run `command` through the platform shell; stdout trimmed on success.
pub async fn run_command(command: &str) -> Result<String, String> {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = tokio::process::Command::new("cmd");
        c.arg("/c").arg(command);
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = tokio::process::Command::new("/bin/sh");
        c.arg("-c").arg(command);
        c
    };
    cmd.kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| format!("failed to run `{}`: {}", command, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(command, status = %output.status, "Command failed");
        return Err(format!(
            "command `{}` failed with {}: {}",
            command,
            output.status,
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .trim_matches(|c| c == ' ' || c == '\t' || c == '\n')
        .to_string())
}
