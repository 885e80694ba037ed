//! Build metadata and its rendering.

use serde::Serialize;

/// Release metadata embedded at build time. Self-compiled binaries leave
/// every field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Version {
    pub version: String,
    pub commit: String,
    pub build_date: String,
    pub rust_version: String,
    pub platform: String,
}

impl Version {
    /// Metadata for a released build.
    pub fn new(
        version: impl Into<String>,
        commit: impl Into<String>,
        build_date: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            commit: commit.into(),
            build_date: build_date.into(),
            rust_version: String::new(),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }

    pub fn rust_version(mut self, rust_version: impl Into<String>) -> Self {
        self.rust_version = rust_version.into();
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// No metadata was embedded.
    pub fn is_unset(&self) -> bool {
        self.version.is_empty()
            && self.commit.is_empty()
            && self.build_date.is_empty()
            && self.platform.is_empty()
    }

    /// One-line human rendering.
    pub fn render(&self, cli: &str) -> String {
        if self.version.is_empty() {
            return format!("{cli} version (built from source)");
        }
        format!(
            "{cli} version {} (build date: {}, git commit: {}, rust version: {}, build platform: {})",
            self.version,
            or_unknown(&self.build_date),
            or_unknown(&self.commit),
            or_unknown(&self.rust_version),
            or_unknown(&self.platform),
        )
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "unknown" } else { value }
}

/// Hidden `version` subcommand registered on every root command.
pub(crate) fn command() -> clap::Command {
    clap::Command::new("version")
        .about("Print version information")
        .hide(true)
}
