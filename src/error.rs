//! Error taxonomy and exit code classification.
//!
//! Every failure that reaches the top of the lifecycle is one of the
//! variants of [`Error`]. [`classify`] turns the outcome of a run into the
//! process exit code.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a successful run.
pub const SUCCESS: i32 = 0;

/// Exit code reserved for commands that intentionally short-circuit and ask
/// the caller to act (e.g. "re-run after logging in").
pub const ACTION_REQUESTED: i32 = 1;

/// Exit code for any failure that does not carry its own code.
pub const FATAL: i32 = 2;

/// Failures while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to resolve default config directory: {0}")]
    DirResolution(#[source] anyhow::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value {value:?} for {key} from {origin}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        origin: &'static str,
        reason: String,
    },

    #[error("flag --{0} is declared more than once")]
    DuplicateFlag(String),

    #[error("required flag \"--{0}\" not set")]
    MissingRequired(String),

    #[error("failed to decode configuration: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validate(#[source] anyhow::Error),

    #[error("failed to create config directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while setting up the log destination.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to resolve default log directory: {0}")]
    DirResolution(#[source] anyhow::Error),

    #[error("failed to create log directory {path}: {source}")]
    DirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error a command can return to choose the process exit status.
///
/// Leaf actions return `anyhow::Result`, so this is usually constructed and
/// converted with `?` or `Err(CommandError::new(..).into())`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub message: String,
    pub exit_code: i32,
}

impl CommandError {
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// A short-circuit that asks the caller to take some action.
    pub fn action_requested(message: impl Into<String>) -> Self {
        Self::new(message, ACTION_REQUESTED)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandError {}

/// Top-level error observed by the lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),

    /// Command line rejected by the parser (unknown flag, bad value,
    /// missing required flag).
    #[error("{}", usage_message(.0))]
    Usage(#[from] clap::Error),

    /// Raised by leaf command logic.
    #[error("{0:#}")]
    Command(anyhow::Error),
}

impl Error {
    /// Explicit exit code carried by the error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::Command(err) => err
                .chain()
                .find_map(|cause| cause.downcast_ref::<CommandError>())
                .map(|cmd| cmd.exit_code),
            _ => None,
        }
    }
}

/// Clap renders with an `error: ` prefix and trailing usage hints; keep the
/// message itself.
fn usage_message(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let trimmed = rendered.trim_end();
    trimmed
        .strip_prefix("error: ")
        .unwrap_or(trimmed)
        .to_string()
}

/// Map the outcome of a run to a process exit code.
pub fn classify(result: &Result<(), Error>) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(err) => err.exit_code().unwrap_or(FATAL),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
