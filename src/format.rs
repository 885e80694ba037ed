//! Presentation format and the printer handed to commands.

use crate::stream::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

/// Output format for command results, errors and log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Human,
    Json,
}

impl Format {
    pub const NAMES: &'static [&'static str] = &["human", "json"];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Human => "human",
            Format::Json => "json",
        }
    }

    pub fn is_json(self) -> bool {
        self == Format::Json
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Format::Human),
            "json" => Ok(Format::Json),
            other => Err(format!("unknown format {other:?}")),
        }
    }
}

/// Render a top-level error: `{"error": "..."}` for JSON, `Error: ...`
/// otherwise. Always newline-terminated.
pub fn render_error(format: Format, message: &str) -> String {
    match format {
        Format::Json => format!(
            "{{\"error\": {}}}\n",
            serde_json::Value::from(message)
        ),
        Format::Human => format!("Error: {message}\n"),
    }
}

/// Writes command output to the lifecycle's stdout in the active format.
#[derive(Clone)]
pub struct Printer {
    format: Format,
    no_color: bool,
    out: Stream,
}

impl Printer {
    pub fn new(format: Format, no_color: bool, out: Stream) -> Self {
        Self {
            format,
            no_color,
            out,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn no_color(&self) -> bool {
        self.no_color
    }

    /// Print a line of plain text.
    pub fn println(&self, text: impl fmt::Display) -> io::Result<()> {
        let mut out = self.out.clone();
        writeln!(out, "{text}")
    }

    /// Print a serializable value: pretty JSON in JSON format, YAML otherwise.
    pub fn print_resource<T: Serialize + ?Sized>(&self, value: &T) -> io::Result<()> {
        let rendered = match self.format {
            Format::Json => serde_json::to_string_pretty(value).map_err(io::Error::other)?,
            Format::Human => serde_yaml::to_string(value).map_err(io::Error::other)?,
        };
        let mut out = self.out.clone();
        writeln!(out, "{}", rendered.trim_end())
    }
}
