//! Command tree declaration.
//!
//! Applications describe their subcommands with [`Subcommand`]; the
//! lifecycle turns the tree into a clap [`Command`] carrying the global
//! flags, and hands the selected leaf a [`Context`].

use crate::config::{ConfigSchema, Field, GlobalOptions, ResolvedConfig};
use crate::format::{Format, Printer};
use crate::logging::Level;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;

/// Flags with special handling that application fields may not reuse.
pub const RESERVED_FLAGS: &[&str] = &[
    "config", "version", "help", "log", "format", "debug", "log-level", "no-color",
];

/// Global options every application gets. They are resolved through the
/// same precedence as application fields.
pub fn global_fields() -> Vec<Field> {
    vec![
        Field::string("log", "Log destination: a file path, stdout, or stderr"),
        Field::enumeration("format", Format::NAMES, "Output format")
            .short('f')
            .default_value("human"),
        Field::bool("debug", "Trace-level logging, mirrored to stderr"),
        Field::enumeration("log-level", Level::NAMES, "Log severity threshold"),
        Field::bool("no-color", "Disable colored output"),
    ]
}

/// `--config <path>`, read before anything else.
pub fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .value_name("PATH")
        .help("Path to configuration file")
        .value_parser(clap::value_parser!(PathBuf))
        .global(true)
}

/// `--version`, short-circuits before configuration is resolved.
pub fn version_arg() -> Arg {
    Arg::new("version")
        .long("version")
        .help("Print version information")
        .action(ArgAction::SetTrue)
}

/// Leaf command body.
pub type Action<T> = Arc<dyn Fn(&Context<'_, T>) -> anyhow::Result<()> + Send + Sync>;

/// A node in the command tree. Nodes with an action are runnable leaves;
/// nodes with children group further subcommands.
pub struct Subcommand<T> {
    name: String,
    about: Option<String>,
    args: Vec<Arg>,
    action: Option<Action<T>>,
    children: Vec<Subcommand<T>>,
}

impl<T> Clone for Subcommand<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            about: self.about.clone(),
            args: self.args.clone(),
            action: self.action.clone(),
            children: self.children.clone(),
        }
    }
}

impl<T> Subcommand<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: None,
            args: Vec::new(),
            action: None,
            children: Vec::new(),
        }
    }

    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Add a flag local to this subcommand.
    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// Require positional arguments, in order. A missing one is a usage
    /// error naming `<name>`; leaves read them with [`Context::value`].
    pub fn required_args(mut self, names: &[&'static str]) -> Self {
        self.args.extend(
            names
                .iter()
                .map(|name| Arg::new(*name).value_name(*name).required(true)),
        );
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Context<'_, T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn subcommand(mut self, child: Subcommand<T>) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn get_action(&self) -> Option<&Action<T>> {
        self.action.as_ref()
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.name.clone());
        if let Some(about) = &self.about {
            cmd = cmd.about(about.clone());
        }
        cmd = cmd.args(self.args.iter().cloned());
        if self.action.is_none() && !self.children.is_empty() {
            cmd = cmd.subcommand_required(true).arg_required_else_help(true);
        }
        cmd.subcommands(self.children.iter().map(Subcommand::to_command))
    }

    /// Follow `path` down from this node.
    pub(crate) fn find(&self, path: &[String]) -> Option<&Subcommand<T>> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self
                .children
                .iter()
                .find(|child| &child.name == head)
                .and_then(|child| child.find(rest)),
        }
    }
}

/// Root command with global flags and the built-in `version` subcommand.
pub fn root_command<T>(
    schema: &ConfigSchema,
    about: Option<&str>,
    globals: &[Field],
    tree: &[Subcommand<T>],
) -> Command {
    let mut cmd = Command::new(schema.app().to_string())
        .disable_version_flag(true)
        .arg(config_arg())
        .arg(version_arg())
        .args(globals.iter().chain(schema.fields()).map(Field::to_arg))
        .subcommand(crate::version::command())
        .subcommands(tree.iter().map(Subcommand::to_command));
    if let Some(about) = about {
        cmd = cmd.about(about.to_string());
    }
    cmd
}

/// Names of the selected subcommands, outermost first, and the matches of
/// the innermost one.
pub fn leaf_matches(matches: &ArgMatches) -> (Vec<String>, &ArgMatches) {
    let mut path = Vec::new();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        path.push(name.to_string());
        current = sub;
    }
    (path, current)
}

/// What a leaf action sees.
pub struct Context<'a, T> {
    resolved: &'a ResolvedConfig<T>,
    printer: &'a Printer,
    matches: &'a ArgMatches,
}

impl<'a, T> Context<'a, T> {
    pub(crate) fn new(
        resolved: &'a ResolvedConfig<T>,
        printer: &'a Printer,
        matches: &'a ArgMatches,
    ) -> Self {
        Self {
            resolved,
            printer,
            matches,
        }
    }

    /// The application's resolved configuration.
    pub fn config(&self) -> &'a T {
        &self.resolved.app
    }

    pub fn resolved(&self) -> &'a ResolvedConfig<T> {
        self.resolved
    }

    pub fn options(&self) -> &'a GlobalOptions {
        &self.resolved.options
    }

    pub fn printer(&self) -> &'a Printer {
        self.printer
    }

    /// Matches of the leaf subcommand, including its own flags.
    pub fn matches(&self) -> &'a ArgMatches {
        self.matches
    }

    pub fn debug(&self) -> bool {
        self.resolved.options.debug
    }

    /// Value of a string flag declared on the leaf.
    pub fn value(&self, id: &str) -> Option<&'a str> {
        self.matches
            .try_get_one::<String>(id)
            .ok()
            .flatten()
            .map(String::as_str)
    }
}
