//! Logging: severity levels and the per-run log router.

mod level;
mod router;

pub use level::{FATAL_TARGET, Level, ParseLevelError};
pub use router::{LogDestination, LogRequest, LogRouter, LogSink, RuntimeMode};
