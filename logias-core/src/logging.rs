//! Shared log sink
//!
//! Every worker logs through the same `tracing` subscriber, whose writer is a
//! [`LogSink`]. Writes are serialized by a single lock, and log rotation swaps
//! the file handle under that same lock.

use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

/// Log level names accepted by the configuration document and `log()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Logged as ERROR with `critical = true`
    Crit,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Crit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Crit => "CRIT",
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Crit => LevelFilter::ERROR,
        }
    }

    /// Emit a script-originated message at this level
    pub fn emit(&self, message: &str) {
        match self {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
            LogLevel::Crit => error!(critical = true, "{}", message),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "CRIT" | "CRITICAL" => Ok(LogLevel::Crit),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug)]
struct SinkState {
    path: Option<PathBuf>,
    file: Option<File>,
    echo_stdout: bool,
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Lock-guarded log destination
#[derive(Debug, Clone)]
pub struct LogSink {
    inner: Arc<Mutex<SinkState>>,
}

impl LogSink {
    /// Log to `path` (when given) and echo to stdout
    pub fn open(path: Option<&Path>) -> io::Result<Self> {
        let file = path.map(open_append).transpose()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(SinkState {
                path: path.map(Path::to_path_buf),
                file,
                echo_stdout: true,
            })),
        })
    }

    /// Disable the stdout echo
    pub fn quiet(self) -> Self {
        self.inner.lock().echo_stdout = false;
        self
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().path.clone()
    }

    /// Close and reopen the log file, e.g. after it was rotated away
    pub fn reopen(&self) -> io::Result<()> {
        let mut state = self.inner.lock();
        let Some(path) = state.path.clone() else {
            return Ok(());
        };
        if let Some(mut old) = state.file.take() {
            old.flush()?;
        }
        state.file = Some(open_append(&path)?);
        Ok(())
    }

    /// Flush and release the file. Later writes only reach stdout.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.inner.lock();
        match state.file.take() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Writer handed out per log event
pub struct SinkWriter {
    inner: Arc<Mutex<SinkState>>,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.lock();
        if state.echo_stdout {
            io::stdout().write_all(buf)?;
        }
        if let Some(file) = state.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.inner.lock();
        if let Some(file) = state.file.as_mut() {
            file.flush()?;
        }
        io::stdout().flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}
