//! Command lifecycle: dev-build warning, configuration, logging, dispatch
//! and exit code classification, in that order, once per instance.

use crate::cli::{self, Context, RESERVED_FLAGS, Subcommand};
use crate::closers::Closers;
use crate::config::{
    AppConfig, ConfigResolver, ConfigSchema, EnvLookup, Field, ResolvedConfig, parse_bool,
    process_env,
};
use crate::error::{self, Error, FATAL, LogError, Result};
use crate::format::{Format, Printer, render_error};
use crate::logging::{Level, LogDestination, LogRequest, LogRouter, LogSink, RuntimeMode};
use crate::stream::Stream;
use crate::version::Version;
use clap::{ArgMatches, Command};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where an instance is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Initializing,
    Executing,
    Classifying,
    Terminated,
}

/// Orchestrates one invocation of an application's command tree.
///
/// ```no_run
/// use cmdkit::{ConfigSchema, Lifecycle, NoConfig, RuntimeMode, Subcommand, Version};
///
/// let mut app: Lifecycle<NoConfig> = Lifecycle::new(ConfigSchema::new("tool"), Version::default())
///     .subcommand(Subcommand::new("hello").action(|ctx| {
///         ctx.printer().println("hello")?;
///         Ok(())
///     }));
/// std::process::exit(app.execute(std::env::args_os(), RuntimeMode::Interactive));
/// ```
pub struct Lifecycle<T: AppConfig> {
    schema: ConfigSchema,
    version: Version,
    about: Option<String>,
    globals: Vec<Field>,
    tree: Vec<Subcommand<T>>,
    env: EnvLookup,
    stdout: Stream,
    stderr: Stream,
    closers: Closers,
    phase: Phase,
    format: Format,
    resolved: Option<ResolvedConfig<T>>,
    sink: Option<LogSink>,
}

impl<T: AppConfig> Lifecycle<T> {
    pub fn new(schema: ConfigSchema, version: Version) -> Self {
        Self {
            schema,
            version,
            about: None,
            globals: cli::global_fields(),
            tree: Vec::new(),
            env: process_env(),
            stdout: Stream::stdout(),
            stderr: Stream::stderr(),
            closers: Closers::new(),
            phase: Phase::NotStarted,
            format: Format::default(),
            resolved: None,
            sink: None,
        }
    }

    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    pub fn subcommand(mut self, subcommand: Subcommand<T>) -> Self {
        self.tree.push(subcommand);
        self
    }

    /// Replace the environment lookup (the process environment by default).
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Replace the process stdout and stderr.
    pub fn with_output(mut self, stdout: Stream, stderr: Stream) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn closers(&self) -> &Closers {
        &self.closers
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Configuration of the last run, once resolution succeeded.
    pub fn resolved(&self) -> Option<&ResolvedConfig<T>> {
        self.resolved.as_ref()
    }

    pub fn log_destination(&self) -> Option<&LogDestination> {
        self.sink.as_ref().map(LogSink::destination)
    }

    pub fn log_level(&self) -> Option<Level> {
        self.sink.as_ref().map(LogSink::level)
    }

    /// Run the command line and return the process exit code.
    ///
    /// Errors are printed to stderr in the active format. Registered
    /// closers run before this returns, whatever the outcome. An instance
    /// runs once; later calls fail with the fatal code.
    pub fn execute<I, A>(&mut self, args: I, mode: RuntimeMode) -> i32
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        if self.phase != Phase::NotStarted {
            self.report("command already executed");
            return FATAL;
        }
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let guard = self.closers.guard();

        self.phase = Phase::Initializing;
        self.warn_dev_build();
        let result = self.run(args, mode);

        self.phase = Phase::Classifying;
        let code = error::classify(&result);
        if let Err(err) = &result {
            self.report(&err.to_string());
        }
        drop(guard);
        self.phase = Phase::Terminated;
        code
    }

    fn warn_dev_build(&self) {
        if !self.version.is_unset() {
            return;
        }
        let var = self.schema.env_var("disable-dev-warning");
        if (self.env)(&var).as_deref().and_then(parse_bool) == Some(true) {
            return;
        }
        let _ = write!(
            self.stderr.clone(),
            "!! WARNING: You are using a self-compiled binary which is not officially supported.\n\
             !! To dismiss this warning, set {var}=true\n\n"
        );
    }

    fn report(&self, message: &str) {
        let _ = self
            .stderr
            .clone()
            .write_all(render_error(self.format, message).as_bytes());
    }

    fn command(&self) -> Command {
        cli::root_command(&self.schema, self.about.as_deref(), &self.globals, &self.tree)
    }

    fn run(&mut self, args: Vec<OsString>, mode: RuntimeMode) -> Result<()> {
        self.schema.check(RESERVED_FLAGS)?;
        let root = self.command();

        // Best-effort parse for what is needed before configuration exists.
        let probe = root.clone().ignore_errors(true).try_get_matches_from(args.clone());
        let probe_root = probe.as_ref().ok();
        let probe_leaf = probe_root.map(|m| cli::leaf_matches(m).1);
        let explicit_config = probe_leaf.and_then(|m| get_path(m, "config"));
        let typed_format = probe_leaf.and_then(|m| raw_value(m, "format"));
        if let Some(format) = typed_format.as_deref().and_then(|f| f.parse::<Format>().ok()) {
            self.format = format;
        }
        let version_requested = probe_root
            .and_then(|m| m.try_get_one::<bool>("version").ok().flatten())
            .copied()
            .unwrap_or(false);
        if version_requested {
            writeln!(self.stdout.clone(), "{}", self.version.render(self.schema.app()))
                .map_err(|e| Error::Command(e.into()))?;
            return Ok(());
        }

        let resolver = ConfigResolver::new(&self.schema, &self.globals, self.env.clone());
        let sources = resolver.load(explicit_config.as_deref())?;
        if typed_format.is_none()
            && let Some(format) = sources
                .lookup("format")
                .and_then(|(_, value)| value.parse::<Format>().ok())
        {
            self.format = format;
        }

        let mut cmd = sources.preset_flags(root);
        let matches = match cmd.clone().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(err) if !err.use_stderr() => {
                write!(self.stdout.clone(), "{}", err.render())
                    .map_err(|e| Error::Command(e.into()))?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let (path, leaf) = cli::leaf_matches(&matches);
        if path.is_empty() {
            write!(self.stdout.clone(), "{}", cmd.render_help())
                .map_err(|e| Error::Command(e.into()))?;
            return Ok(());
        }

        let mut resolved: ResolvedConfig<T> = resolver.resolve(&sources, leaf)?;
        self.format = resolved.options.format;
        debug!(
            config_file = ?resolved.config_file,
            format = %self.format,
            "configuration resolved"
        );

        let sink = self.route(&resolved, mode)?;
        resolved.log_file = sink.log_file().map(Path::to_path_buf);
        self.sink = Some(sink.clone());

        self.phase = Phase::Executing;
        let printer = Printer::new(self.format, resolved.options.no_color, self.stdout.clone());
        let result = tracing::dispatcher::with_default(sink.dispatch(), || {
            self.dispatch(&path, leaf, &resolved, &printer)
        });
        self.resolved = Some(resolved);
        result
    }

    fn route(&self, resolved: &ResolvedConfig<T>, mode: RuntimeMode) -> Result<LogSink> {
        let options = &resolved.options;
        let request = LogRequest {
            path: options.log.as_deref(),
            mode,
            debug: options.debug,
            level: options.level(),
            format: options.format,
            color: !options.no_color,
        };
        let sink = LogRouter::new(&self.stdout, &self.stderr, &self.closers).route(request, || {
            self.schema
                .default_log_dir()
                .map(|dir| dir.join(self.schema.default_log_file()))
                .map_err(LogError::DirResolution)
        })?;
        Ok(sink)
    }

    fn dispatch(
        &self,
        path: &[String],
        leaf: &ArgMatches,
        resolved: &ResolvedConfig<T>,
        printer: &Printer,
    ) -> Result<()> {
        debug!(command = %path.join(" "), "running command");
        let Some((head, rest)) = path.split_first() else {
            return Ok(());
        };
        let node = self
            .tree
            .iter()
            .find(|node| node.name() == head)
            .and_then(|node| node.find(rest));

        match node {
            Some(node) => match node.get_action() {
                Some(action) => {
                    action(&Context::new(resolved, printer, leaf)).map_err(Error::Command)
                }
                None => printer
                    .println(node.to_command().render_help())
                    .map_err(|e| Error::Command(e.into())),
            },
            None if *path == ["version"] => self.print_version(printer),
            None => Err(Error::Command(anyhow::anyhow!(
                "unknown command {:?}",
                path.join(" ")
            ))),
        }
    }

    fn print_version(&self, printer: &Printer) -> Result<()> {
        let written = match printer.format() {
            Format::Json => printer.print_resource(&self.version),
            Format::Human => printer.println(self.version.render(self.schema.app())),
        };
        written.map_err(|e| Error::Command(e.into()))
    }
}

fn get_path(matches: &ArgMatches, id: &str) -> Option<PathBuf> {
    matches.try_get_one::<PathBuf>(id).ok().flatten().cloned()
}

fn raw_value(matches: &ArgMatches, id: &str) -> Option<String> {
    let mut raw = matches.try_get_raw(id).ok().flatten()?;
    raw.next().map(|v| v.to_string_lossy().into_owned())
}
