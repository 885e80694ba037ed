//! Command-line application scaffold.
//!
//! `cmdkit` resolves configuration from flags, environment variables, a
//! config file and defaults; routes structured logs to a stream or file;
//! and runs one subcommand per invocation, turning its outcome into an
//! exit code.

pub mod cli;
pub mod closers;
pub mod config;
pub mod error;
pub mod format;
pub mod lifecycle;
pub mod logging;
pub mod stream;
pub mod version;

pub use cli::{Context, Subcommand};
pub use config::{AppConfig, ConfigSchema, Field, NoConfig, ResolvedConfig};
pub use error::{CommandError, Error, classify};
pub use format::{Format, Printer};
pub use lifecycle::{Lifecycle, Phase};
pub use logging::{Level, LogDestination, RuntimeMode};
pub use stream::{SharedBuffer, Stream};
pub use version::Version;
