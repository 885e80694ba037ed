//! Log destination selection and subscriber construction.

use super::level::Level;
use crate::closers::Closers;
use crate::error::LogError;
use crate::format::Format;
use crate::stream::Stream;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{Dispatch, debug};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter, writer::MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// How the process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    /// A person at a terminal. Logs default to the application's log file.
    #[default]
    Interactive,
    /// Scripts and test harnesses. Logs default to stderr.
    Noninteractive,
}

/// Where log records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    Stdout,
    File(PathBuf),
    /// File plus a mirror on stderr, used with `--debug`.
    FileAndStderr(PathBuf),
}

impl LogDestination {
    pub fn file(&self) -> Option<&Path> {
        match self {
            LogDestination::File(path) | LogDestination::FileAndStderr(path) => Some(path),
            LogDestination::Stderr | LogDestination::Stdout => None,
        }
    }
}

/// Inputs to [`LogRouter::route`], taken from the resolved global options.
#[derive(Debug, Clone, Copy)]
pub struct LogRequest<'a> {
    /// Value of `--log`; `None` when no source set it.
    pub path: Option<&'a str>,
    pub mode: RuntimeMode,
    pub debug: bool,
    pub level: Level,
    pub format: Format,
    pub color: bool,
}

/// An installed-ready logger: where it writes and the dispatcher to run under.
#[derive(Clone)]
pub struct LogSink {
    destination: LogDestination,
    level: Level,
    format: Format,
    dispatch: Dispatch,
}

impl LogSink {
    pub fn destination(&self) -> &LogDestination {
        &self.destination
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.destination.file()
    }
}

/// Builds the logger for one lifecycle.
pub struct LogRouter<'a> {
    stdout: &'a Stream,
    stderr: &'a Stream,
    closers: &'a Closers,
}

impl<'a> LogRouter<'a> {
    pub fn new(stdout: &'a Stream, stderr: &'a Stream, closers: &'a Closers) -> Self {
        Self {
            stdout,
            stderr,
            closers,
        }
    }

    /// Pick the destination, open it, and build a dispatcher that encodes
    /// records as JSON or text and drops those below the threshold.
    ///
    /// `default_path` is consulted only for interactive runs that did not
    /// name a destination. A log file is opened truncated and its closer is
    /// registered before this returns.
    pub fn route(
        &self,
        request: LogRequest<'_>,
        default_path: impl FnOnce() -> Result<PathBuf, LogError>,
    ) -> Result<LogSink, LogError> {
        let destination = match request.path.map(str::trim) {
            Some("stdout") => LogDestination::Stdout,
            Some("stderr") | Some("") => LogDestination::Stderr,
            Some(path) => file_destination(PathBuf::from(path), request.debug),
            None => match request.mode {
                RuntimeMode::Noninteractive => LogDestination::Stderr,
                RuntimeMode::Interactive => file_destination(default_path()?, request.debug),
            },
        };

        let (writer, ansi) = match &destination {
            LogDestination::Stderr => (
                maker(self.stderr.clone()),
                request.color && self.stderr.is_process_stream(),
            ),
            LogDestination::Stdout => (
                maker(self.stdout.clone()),
                request.color && self.stdout.is_process_stream(),
            ),
            LogDestination::File(path) => (maker(self.open(path)?), false),
            LogDestination::FileAndStderr(path) => {
                let file = self.open(path)?;
                let stderr = self.stderr.clone();
                let tee = (move || file.clone()).and(move || stderr.clone());
                (BoxMakeWriter::new(tee), false)
            }
        };

        let level = request.level;
        let filter = filter_fn(move |meta| level.enables(meta));
        let layer: Box<dyn Layer<Registry> + Send + Sync> = match request.format {
            Format::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            Format::Human => fmt::layer()
                .with_ansi(ansi)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        };
        let dispatch = Dispatch::new(Registry::default().with(layer));

        Ok(LogSink {
            destination,
            level,
            format: request.format,
            dispatch,
        })
    }

    fn open(&self, path: &Path) -> Result<Stream, LogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| LogError::DirCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| LogError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "opened log file");

        let stream = Stream::new(file);
        let closer = stream.clone();
        self.closers
            .register(format!("log file {}", path.display()), move || closer.close());
        Ok(stream)
    }
}

fn file_destination(path: PathBuf, debug: bool) -> LogDestination {
    if debug {
        LogDestination::FileAndStderr(path)
    } else {
        LogDestination::File(path)
    }
}

fn maker(stream: Stream) -> BoxMakeWriter {
    BoxMakeWriter::new(move || stream.clone())
}
