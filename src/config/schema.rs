//! Declarative configuration schema.
//!
//! A [`ConfigSchema`] lists the fields an application exposes as global
//! flags, how each is typed, and where the default config and log files
//! live. The resolver walks this list instead of introspecting the target
//! struct: each field's flag name doubles as its key in the config file and
//! in the merged document the application config is deserialized from.

use crate::error::ConfigError;
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction};
use heck::ToShoutySnakeCase;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Semantic type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Bool,
    /// One of a fixed set of lowercase names, matched case-insensitively.
    Enum(&'static [&'static str]),
}

/// One configuration field bound to a global flag.
#[derive(Debug, Clone)]
pub struct Field {
    pub flag: &'static str,
    pub kind: FieldKind,
    pub help: &'static str,
    pub short: Option<char>,
    pub default: Option<&'static str>,
    pub required: bool,
}

impl Field {
    pub fn new(flag: &'static str, kind: FieldKind, help: &'static str) -> Self {
        Self {
            flag,
            kind,
            help,
            short: None,
            default: None,
            required: false,
        }
    }

    pub fn string(flag: &'static str, help: &'static str) -> Self {
        Self::new(flag, FieldKind::String, help)
    }

    pub fn int(flag: &'static str, help: &'static str) -> Self {
        Self::new(flag, FieldKind::Int, help)
    }

    pub fn bool(flag: &'static str, help: &'static str) -> Self {
        Self::new(flag, FieldKind::Bool, help)
    }

    pub fn enumeration(
        flag: &'static str,
        values: &'static [&'static str],
        help: &'static str,
    ) -> Self {
        Self::new(flag, FieldKind::Enum(values), help)
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn default_value(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark the field as required. A value from the environment or the config
    /// file satisfies the requirement just like the flag does.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Build the global clap argument for this field.
    ///
    /// Defaults are not attached to the argument: they are merged as the
    /// lowest layer so an unset flag never shadows the environment or file.
    pub fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.flag)
            .long(self.flag)
            .help(self.help)
            .global(true);
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        match self.kind {
            FieldKind::String => arg.value_name("VALUE").action(ArgAction::Set),
            FieldKind::Int => arg
                .value_name("INT")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(i64)),
            FieldKind::Bool => arg.action(ArgAction::SetTrue),
            FieldKind::Enum(values) => arg
                .action(ArgAction::Set)
                .value_parser(PossibleValuesParser::new(values.iter().copied()))
                .ignore_case(true),
        }
    }

    /// Convert a raw string from any source into its typed JSON form.
    pub fn coerce(&self, raw: &str) -> Result<Value, String> {
        match self.kind {
            FieldKind::String => Ok(Value::String(raw.to_string())),
            FieldKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| e.to_string()),
            FieldKind::Bool => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| "expected a boolean".to_string()),
            FieldKind::Enum(values) => values
                .iter()
                .find(|v| v.eq_ignore_ascii_case(raw.trim()))
                .map(|v| Value::String(v.to_string()))
                .ok_or_else(|| format!("expected one of [{}]", values.join(", "))),
        }
    }

    /// Coerce a value read from a config file. Scalars are stringified first
    /// so `port: "8080"` and `port: 8080` are treated alike.
    pub fn coerce_value(&self, value: &Value) -> Result<Value, String> {
        match scalar_to_string(value) {
            Some(raw) => self.coerce(&raw),
            None => Err("expected a scalar value".to_string()),
        }
    }
}

/// Render a scalar document value as the string a flag would carry.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Lenient boolean parsing shared by env values and file values.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Environment variable name for a flag: `APP_FLAG_NAME`.
pub fn env_var_name(app: &str, flag: &str) -> String {
    format!("{}_{}", app.to_shouty_snake_case(), flag.to_shouty_snake_case())
}

type DirResolver = Arc<dyn Fn() -> anyhow::Result<PathBuf> + Send + Sync>;

/// Application-level description of configuration.
#[derive(Clone)]
pub struct ConfigSchema {
    app: String,
    fields: Vec<Field>,
    config_dir: DirResolver,
    config_file: String,
    log_dir: DirResolver,
    log_file: String,
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSchema")
            .field("app", &self.app)
            .field("fields", &self.fields)
            .field("config_file", &self.config_file)
            .field("log_file", &self.log_file)
            .finish_non_exhaustive()
    }
}

impl ConfigSchema {
    /// Create a schema for `app` with platform default locations:
    /// `<config dir>/<app>/config.yaml` and `<state dir>/<app>/logs/<app>.log`.
    pub fn new(app: impl Into<String>) -> Self {
        let app = app.into();
        let config_app = app.clone();
        let log_app = app.clone();
        Self {
            config_file: "config.yaml".to_string(),
            log_file: format!("{app}.log"),
            app,
            fields: Vec::new(),
            config_dir: Arc::new(move || {
                dirs::config_dir()
                    .map(|dir| dir.join(&config_app))
                    .ok_or_else(|| anyhow::anyhow!("no configuration directory for this platform"))
            }),
            log_dir: Arc::new(move || {
                dirs::state_dir()
                    .or_else(dirs::data_local_dir)
                    .map(|dir| dir.join(&log_app).join("logs"))
                    .ok_or_else(|| anyhow::anyhow!("no state directory for this platform"))
            }),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn config_dir<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> anyhow::Result<PathBuf> + Send + Sync + 'static,
    {
        self.config_dir = Arc::new(resolver);
        self
    }

    pub fn config_file(mut self, name: impl Into<String>) -> Self {
        self.config_file = name.into();
        self
    }

    pub fn log_dir<F>(mut self, resolver: F) -> Self
    where
        F: Fn() -> anyhow::Result<PathBuf> + Send + Sync + 'static,
    {
        self.log_dir = Arc::new(resolver);
        self
    }

    pub fn log_file(mut self, name: impl Into<String>) -> Self {
        self.log_file = name.into();
        self
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn find(&self, flag: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.flag == flag)
    }

    pub fn default_config_dir(&self) -> anyhow::Result<PathBuf> {
        (self.config_dir)()
    }

    pub fn default_config_file(&self) -> &str {
        &self.config_file
    }

    pub fn default_log_dir(&self) -> anyhow::Result<PathBuf> {
        (self.log_dir)()
    }

    pub fn default_log_file(&self) -> &str {
        &self.log_file
    }

    pub fn env_var(&self, flag: &str) -> String {
        env_var_name(&self.app, flag)
    }

    /// Check that no two fields share a flag name, including the reserved
    /// global flags.
    pub fn check(&self, reserved: &[&str]) -> Result<(), ConfigError> {
        let mut seen: HashSet<&str> = reserved.iter().copied().collect();
        for field in &self.fields {
            if !seen.insert(field.flag) {
                return Err(ConfigError::DuplicateFlag(field.flag.to_string()));
            }
        }
        Ok(())
    }
}

/// Application configuration populated by the resolver.
///
/// The merged document is deserialized into `Self`, so field names must
/// match the schema's flag names (usually `#[serde(rename_all = "kebab-case")]`).
pub trait AppConfig: Serialize + DeserializeOwned + Default {
    /// Semantic checks run once after all sources are merged.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Configuration for applications that only use the global options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct NoConfig {}

impl AppConfig for NoConfig {}
