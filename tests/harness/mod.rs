//! Shared harness for lifecycle integration tests.
//!
//! Every run gets its own temp config and log directories, captured stdout
//! and stderr, a fixed environment, and non-interactive mode unless asked
//! otherwise.

#![allow(dead_code)]

use cmdkit::config::{ResolvedConfig, env_from};
use cmdkit::{
    AppConfig, ConfigSchema, Context, Field, Level, Lifecycle, LogDestination, Phase,
    RuntimeMode, SharedBuffer, Subcommand, Version,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const APP: &str = "test";
pub const COLORS: &[&str] = &["red", "green", "blue"];

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TestConfig {
    pub name: String,
    pub port: i64,
    pub verbose: bool,
    pub color: String,
}

impl AppConfig for TestConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.port < 0 {
            anyhow::bail!("port must not be negative");
        }
        Ok(())
    }
}

/// Result of one lifecycle run.
pub struct Outcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    pub resolved: Option<ResolvedConfig<TestConfig>>,
    pub level: Option<Level>,
    pub destination: Option<LogDestination>,
    pub closers_left: usize,
    pub phase: Phase,
}

impl Outcome {
    pub fn config(&self) -> &TestConfig {
        &self
            .resolved
            .as_ref()
            .expect("configuration was not resolved")
            .app
    }
}

pub struct Harness {
    temp: TempDir,
    env: Vec<(String, String)>,
    fields: Vec<Field>,
    version: Version,
    mode: RuntimeMode,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("temp dir"),
            env: vec![("TEST_DISABLE_DEV_WARNING".to_string(), "true".to_string())],
            fields: Vec::new(),
            version: Version::default(),
            mode: RuntimeMode::Noninteractive,
        }
    }

    /// Harness that leaves the dev-build warning enabled.
    pub fn with_dev_warning() -> Self {
        let mut harness = Self::new();
        harness.env.clear();
        harness
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.env.retain(|(k, _)| k != name);
        self.env.push((name.to_string(), value.to_string()));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.mode = RuntimeMode::Interactive;
        self
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn config_dir(&self) -> PathBuf {
        self.temp.path().join("config")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.temp.path().join("logs")
    }

    pub fn default_log_file(&self) -> PathBuf {
        self.log_dir().join(format!("{APP}.log"))
    }

    /// Write a file into the default config directory.
    pub fn write_config(&self, name: &str, contents: &str) -> PathBuf {
        let dir = self.config_dir();
        std::fs::create_dir_all(&dir).expect("create config dir");
        let path = dir.join(name);
        std::fs::write(&path, contents).expect("write config");
        path
    }

    fn schema(&self) -> ConfigSchema {
        let config_dir = self.config_dir();
        let log_dir = self.log_dir();
        let schema = ConfigSchema::new(APP)
            .field(Field::string("name", "Name"))
            .field(Field::int("port", "Port").default_value("8080"))
            .field(Field::bool("verbose", "Verbose output"))
            .field(Field::enumeration("color", COLORS, "Color").default_value("red"))
            .config_dir(move || Ok(config_dir.clone()))
            .log_dir(move || Ok(log_dir.clone()));
        self.fields.iter().cloned().fold(schema, ConfigSchema::field)
    }

    /// Run `test <args>` with a `run` subcommand executing `action`.
    pub fn run<F>(&self, args: &[&str], action: F) -> Outcome
    where
        F: Fn(&Context<'_, TestConfig>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.run_command(args, Subcommand::new("run").action(action))
    }

    /// Run `test <args>` with a caller-built subcommand.
    pub fn run_command(&self, args: &[&str], command: Subcommand<TestConfig>) -> Outcome {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let mut lifecycle = Lifecycle::new(self.schema(), self.version.clone())
            .with_env(env_from(self.env.clone()))
            .with_output(stdout.stream(), stderr.stream())
            .subcommand(command);

        let argv = std::iter::once(APP).chain(args.iter().copied());
        let code = lifecycle.execute(argv, self.mode);

        Outcome {
            code,
            stdout: stdout.contents(),
            stderr: stderr.contents(),
            resolved: lifecycle.resolved().cloned(),
            level: lifecycle.log_level(),
            destination: lifecycle.log_destination().cloned(),
            closers_left: lifecycle.closers().len(),
            phase: lifecycle.phase(),
        }
    }
}

/// Action that does nothing.
pub fn noop(_: &Context<'_, TestConfig>) -> anyhow::Result<()> {
    Ok(())
}
