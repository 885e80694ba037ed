//! Configuration resolution with field-by-field precedence.
//!
//! Sources, lowest to highest priority:
//! 1. **Defaults** - the config struct's `Default` plus field defaults
//! 2. **File** - discovered or `--config` file (YAML, JSON or TOML)
//! 3. **Environment** - `<APP>_<FLAG>` variables, read when merging
//! 4. **Flags** - only flags the user actually typed

use super::files;
use super::merge::{deep_merge_all, get_path, set_path};
use super::schema::{AppConfig, ConfigSchema, Field, parse_bool, scalar_to_string};
use crate::error::ConfigError;
use crate::format::Format;
use crate::logging::Level;
use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, Command};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Flags never preset from other sources.
const PRESET_EXCLUDED: &[&str] = &["config", "help", "version"];

/// Lazy environment lookup, consulted every time a value is needed.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment lookup backed by the process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

/// Environment lookup backed by a fixed set of variables.
pub fn env_from<I, K, V>(vars: I) -> EnvLookup
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars: HashMap<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    Arc::new(move |name| vars.get(name).cloned())
}

/// Where a resolved value came from (lowest to highest priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    Default = 0,
    File = 1,
    Environment = 2,
    Flag = 3,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "config file",
            ConfigSource::Environment => "environment",
            ConfigSource::Flag => "flag",
        }
    }
}

/// Options every application gets, resolved through the same precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalOptions {
    /// Log destination: a path, `stdout`, `stderr`, or empty for stderr.
    pub log: Option<String>,
    pub format: Format,
    pub debug: bool,
    pub log_level: Option<Level>,
    pub no_color: bool,
}

impl GlobalOptions {
    /// Effective severity threshold. `--debug` always means trace.
    pub fn level(&self) -> Level {
        if self.debug {
            Level::Trace
        } else {
            self.log_level.unwrap_or_default()
        }
    }
}

/// Fully merged configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ResolvedConfig<T> {
    pub app: T,
    pub options: GlobalOptions,
    /// Config file that was read or named by `--config`.
    pub config_file: Option<PathBuf>,
    /// Active log file, `None` when logging to a stream.
    pub log_file: Option<PathBuf>,
}

/// Non-flag sources loaded for one invocation.
#[derive(Clone)]
pub struct ConfigSources {
    app: String,
    env: EnvLookup,
    path: Option<PathBuf>,
    dir: Option<PathBuf>,
    document: Value,
    /// Typed fields, used to keep invalid values out of clap's defaults.
    fields: Vec<Field>,
}

impl fmt::Debug for ConfigSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSources")
            .field("app", &self.app)
            .field("path", &self.path)
            .field("dir", &self.dir)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl ConfigSources {
    /// Sources with no config file.
    pub fn empty(app: impl Into<String>, env: EnvLookup) -> Self {
        Self {
            app: app.into(),
            env,
            path: None,
            dir: None,
            document: Value::Object(Map::new()),
            fields: Vec::new(),
        }
    }

    /// The config file in use, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw parsed config file (empty mapping when there is none).
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Non-empty environment value for a flag.
    pub fn env_value(&self, flag: &str) -> Option<String> {
        let name = super::schema::env_var_name(&self.app, flag);
        (self.env)(&name).filter(|v| !v.is_empty())
    }

    /// Config file value for a flag.
    pub fn file_value(&self, flag: &str) -> Option<&Value> {
        get_path(&self.document, flag).filter(|v| !v.is_null())
    }

    /// First value available outside the command line: environment, then file.
    pub fn lookup(&self, flag: &str) -> Option<(ConfigSource, String)> {
        if let Some(value) = self.env_value(flag) {
            return Some((ConfigSource::Environment, value));
        }
        self.file_value(flag)
            .and_then(scalar_to_string)
            .filter(|v| !v.is_empty())
            .map(|value| (ConfigSource::File, value))
    }

    /// Highest-priority source that supplies `field`.
    pub fn source_of(&self, field: &Field, matches: &ArgMatches) -> Option<ConfigSource> {
        if flag_value(matches, field.flag).is_some() {
            Some(ConfigSource::Flag)
        } else if self.env_value(field.flag).is_some() {
            Some(ConfigSource::Environment)
        } else if self.file_value(field.flag).is_some() {
            Some(ConfigSource::File)
        } else if field.default.is_some() {
            Some(ConfigSource::Default)
        } else {
            None
        }
    }

    /// Give every long flag in the tree that was not typed on the command
    /// line the value found in the environment or config file, and drop its
    /// `required` marker, so clap's required-argument check accepts it.
    ///
    /// Must run before the command line is parsed. Recurses into every
    /// subcommand; global flags are preset once on the command declaring
    /// them and propagate to children.
    ///
    /// A value that does not fit its schema field is left out, so the merge
    /// reports it against the environment or file it came from instead of
    /// clap blaming a flag nobody typed.
    pub fn preset_flags(&self, mut cmd: Command) -> Command {
        let presets: Vec<(String, String)> = cmd
            .get_arguments()
            .filter_map(|arg| {
                let long = arg.get_long()?;
                if PRESET_EXCLUDED.contains(&long) {
                    return None;
                }
                let (origin, value) = self.lookup(long)?;
                if let Some(field) = self.fields.iter().find(|f| f.flag == long)
                    && field.coerce(&value).is_err()
                {
                    debug!(flag = %long, %origin, "not presetting invalid value");
                    return None;
                }
                let value = match arg.get_action() {
                    ArgAction::SetTrue | ArgAction::SetFalse => parse_bool(&value)?.to_string(),
                    ArgAction::Set | ArgAction::Append => value,
                    _ => return None,
                };
                Some((arg.get_id().to_string(), value))
            })
            .collect();

        for (id, value) in presets {
            debug!(flag = %id, "presetting flag from configuration");
            cmd = cmd.mut_arg(id, |arg| arg.default_value(value).required(false));
        }

        let children: Vec<String> = cmd
            .get_subcommands()
            .map(|sub| sub.get_name().to_string())
            .collect();
        for name in children {
            cmd = cmd.mut_subcommand(name, |sub| self.preset_flags(sub));
        }
        cmd
    }

    /// Merge all sources for `fields` over the `base` layers.
    pub fn merge<'f>(
        &self,
        fields: impl IntoIterator<Item = &'f Field>,
        matches: &ArgMatches,
        base: impl IntoIterator<Item = Value>,
    ) -> Result<Value, ConfigError> {
        let mut defaults = Map::new();
        let mut file = Map::new();
        let mut env = Map::new();
        let mut flags = Map::new();

        for field in fields {
            if let Some(raw) = field.default {
                set_path(&mut defaults, field.flag, coerce(field, raw, ConfigSource::Default)?);
            }
            if let Some(value) = self.file_value(field.flag) {
                let typed = field.coerce_value(value).map_err(|reason| ConfigError::InvalidValue {
                    key: field.flag.to_string(),
                    value: scalar_to_string(value)
                        .unwrap_or_else(|| value.to_string()),
                    origin: ConfigSource::File.as_str(),
                    reason,
                })?;
                set_path(&mut file, field.flag, typed);
            }
            if let Some(raw) = self.env_value(field.flag) {
                set_path(&mut env, field.flag, coerce(field, &raw, ConfigSource::Environment)?);
            }
            if let Some(raw) = flag_value(matches, field.flag) {
                set_path(&mut flags, field.flag, coerce(field, &raw, ConfigSource::Flag)?);
            }
        }

        let mut layers: Vec<Value> = base.into_iter().collect();
        layers.push(Value::Object(defaults));
        layers.push(self.document.clone());
        layers.push(Value::Object(file));
        layers.push(Value::Object(env));
        layers.push(Value::Object(flags));
        Ok(deep_merge_all(layers))
    }
}

fn coerce(field: &Field, raw: &str, origin: ConfigSource) -> Result<Value, ConfigError> {
    field.coerce(raw).map_err(|reason| ConfigError::InvalidValue {
        key: field.flag.to_string(),
        value: raw.to_string(),
        origin: origin.as_str(),
        reason,
    })
}

/// Raw value of a flag, only if the user typed it.
fn flag_value(matches: &ArgMatches, id: &str) -> Option<String> {
    let mut raw = matches.try_get_raw(id).ok().flatten()?;
    let first = raw.next()?;
    (matches.value_source(id) == Some(ValueSource::CommandLine))
        .then(|| first.to_string_lossy().into_owned())
}

/// Resolves configuration for one application schema.
pub struct ConfigResolver<'a> {
    schema: &'a ConfigSchema,
    global: &'a [Field],
    env: EnvLookup,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(schema: &'a ConfigSchema, global: &'a [Field], env: EnvLookup) -> Self {
        Self { schema, global, env }
    }

    fn fields(&self) -> impl Iterator<Item = &'a Field> + 'a {
        self.global.iter().chain(self.schema.fields())
    }

    /// Locate and parse the config file.
    ///
    /// An explicit path is used verbatim; otherwise the schema's default
    /// directory is searched for the default file name with any recognized
    /// extension. A missing file is not an error.
    pub fn load(&self, explicit: Option<&Path>) -> Result<ConfigSources, ConfigError> {
        let (path, dir) = match explicit {
            Some(path) => (
                Some(path.to_path_buf()),
                path.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf),
            ),
            None => {
                let dir = self
                    .schema
                    .default_config_dir()
                    .map_err(ConfigError::DirResolution)?;
                (
                    files::discover(&dir, self.schema.default_config_file()),
                    Some(dir),
                )
            }
        };

        let document = match &path {
            Some(path) => files::load(path)?,
            None => None,
        };

        match (&path, &document) {
            (Some(path), Some(_)) => debug!(path = %path.display(), "loaded config file"),
            (Some(path), None) => debug!(path = %path.display(), "config file not found"),
            (None, _) => debug!("no config file found"),
        }

        let mut sources = ConfigSources::empty(self.schema.app(), self.env.clone());
        sources.fields = self.fields().cloned().collect();
        sources.path = if explicit.is_some() || document.is_some() {
            path
        } else {
            None
        };
        sources.dir = dir;
        if let Some(document) = document {
            sources.document = document;
        }
        Ok(sources)
    }

    /// Merge every source into the global options and the application
    /// config, validate, and make sure the config directory exists.
    ///
    /// `matches` should be the innermost subcommand's matches so global
    /// flags typed after a subcommand are seen.
    pub fn resolve<T: AppConfig>(
        &self,
        sources: &ConfigSources,
        matches: &ArgMatches,
    ) -> Result<ResolvedConfig<T>, ConfigError> {
        for field in self.fields().filter(|f| f.required) {
            if sources.source_of(field, matches).is_none() {
                return Err(ConfigError::MissingRequired(field.flag.to_string()));
            }
        }

        let base = [
            serde_json::to_value(GlobalOptions::default()).map_err(ConfigError::Decode)?,
            serde_json::to_value(T::default()).map_err(ConfigError::Decode)?,
        ];
        let merged = sources.merge(self.fields(), matches, base)?;

        let options: GlobalOptions =
            serde_json::from_value(merged.clone()).map_err(ConfigError::Decode)?;
        let app: T = serde_json::from_value(merged).map_err(ConfigError::Decode)?;
        app.validate().map_err(ConfigError::Validate)?;

        if let Some(dir) = &sources.dir {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::DirCreate {
                path: dir.clone(),
                source,
            })?;
        }

        Ok(ResolvedConfig {
            app,
            options,
            config_file: sources.path.clone(),
            log_file: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;
    use serde_json::json;
    use tempfile::TempDir;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "kebab-case", default)]
    struct Settings {
        name: String,
        port: i64,
        verbose: bool,
    }

    impl AppConfig for Settings {
        fn validate(&self) -> anyhow::Result<()> {
            if self.port < 0 {
                anyhow::bail!("port must not be negative");
            }
            Ok(())
        }
    }

    fn no_env() -> EnvLookup {
        env_from(Vec::<(String, String)>::new())
    }

    fn schema(dir: &Path) -> ConfigSchema {
        let dir = dir.to_path_buf();
        ConfigSchema::new("app")
            .field(Field::string("name", "name"))
            .field(Field::int("port", "port").default_value("80"))
            .field(Field::bool("verbose", "verbose"))
            .config_dir(move || Ok(dir.clone()))
    }

    fn command(schema: &ConfigSchema) -> Command {
        schema
            .fields()
            .iter()
            .fold(Command::new("app"), |cmd, field| cmd.arg(field.to_arg()))
    }

    fn resolve(
        schema: &ConfigSchema,
        env: EnvLookup,
        args: &[&str],
    ) -> Result<ResolvedConfig<Settings>, ConfigError> {
        let resolver = ConfigResolver::new(schema, &[], env);
        let sources = resolver.load(None)?;
        let matches = sources
            .preset_flags(command(schema))
            .try_get_matches_from(args)
            .unwrap();
        resolver.resolve(&sources, &matches)
    }

    #[test]
    fn test_defaults_only() {
        let temp = TempDir::new().unwrap();
        let resolved = resolve(&schema(temp.path()), no_env(), &["app"]).unwrap();
        assert_eq!(resolved.app.port, 80);
        assert_eq!(resolved.app.name, "");
        assert!(resolved.config_file.is_none());
    }

    #[test]
    fn test_flag_beats_env_and_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.yaml"), "port: 1\nname: file\n").unwrap();
        let env = env_from([("APP_PORT", "2"), ("APP_NAME", "env")]);
        let resolved = resolve(&schema(temp.path()), env, &["app", "--port", "3"]).unwrap();
        assert_eq!(resolved.app.port, 3);
        assert_eq!(resolved.app.name, "env");
        assert_eq!(resolved.config_file, Some(temp.path().join("config.yaml")));
    }

    #[test]
    fn test_env_beats_file_per_field() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.yaml"), "port: 1\nverbose: true\n").unwrap();
        let env = env_from([("APP_PORT", "2"), ("APP_VERBOSE", "")]);
        let resolved = resolve(&schema(temp.path()), env, &["app"]).unwrap();
        assert_eq!(resolved.app.port, 2);
        assert!(resolved.app.verbose, "empty env value must not hide the file");
    }

    #[test]
    fn test_file_values_are_typed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "port = \"8080\"\n").unwrap();
        let resolved = resolve(&schema(temp.path()), no_env(), &["app"]).unwrap();
        assert_eq!(resolved.app.port, 8080);
    }

    #[test]
    fn test_invalid_env_value() {
        let temp = TempDir::new().unwrap();
        let env = env_from([("APP_PORT", "eighty")]);
        let err = resolve(&schema(temp.path()), env, &["app"]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "port"));
        assert!(err.to_string().contains("environment"));
    }

    #[test]
    fn test_invalid_file_value_names_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.yaml"), "port: lots\n").unwrap();
        let err = resolve(&schema(temp.path()), no_env(), &["app"]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, origin: "config file", .. } if key == "port"
        ));
    }

    #[test]
    fn test_invalid_values_are_not_preset() {
        let temp = TempDir::new().unwrap();
        let schema = schema(temp.path());
        let resolver = ConfigResolver::new(&schema, &[], env_from([("APP_PORT", "eighty")]));
        let sources = resolver.load(None).unwrap();
        let matches = sources
            .preset_flags(command(&schema))
            .try_get_matches_from(["app"])
            .unwrap();
        assert_eq!(matches.value_source("port"), None);
    }

    #[test]
    fn test_validate_failure() {
        let temp = TempDir::new().unwrap();
        let err = resolve(&schema(temp.path()), no_env(), &["app", "--port=-5"]);
        assert!(matches!(err, Err(ConfigError::Validate(_))));
    }

    #[test]
    fn test_malformed_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.yaml"), "port: [unclosed\n").unwrap();
        let schema = schema(temp.path());
        let resolver = ConfigResolver::new(&schema, &[], no_env());
        assert!(matches!(resolver.load(None), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_explicit_file_is_recorded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("custom.yaml");
        let schema = schema(temp.path());
        let resolver = ConfigResolver::new(&schema, &[], no_env());
        let sources = resolver.load(Some(&path)).unwrap();
        assert_eq!(sources.path(), Some(path.as_path()));
        let matches = command(&schema).try_get_matches_from(["app"]).unwrap();
        let resolved: ResolvedConfig<Settings> = resolver.resolve(&sources, &matches).unwrap();
        assert_eq!(resolved.config_file, Some(path.clone()));
        assert!(temp.path().join("nested").is_dir());
    }

    #[test]
    fn test_dir_resolution_failure() {
        let schema = ConfigSchema::new("app").config_dir(|| anyhow::bail!("no home"));
        let resolver = ConfigResolver::new(&schema, &[], no_env());
        assert!(matches!(resolver.load(None), Err(ConfigError::DirResolution(_))));
    }

    #[test]
    fn test_required_field_satisfied_by_env() {
        let temp = TempDir::new().unwrap();
        let schema = schema(temp.path()).field(Field::string("token", "token").required());
        let resolver = ConfigResolver::new(&schema, &[], no_env());
        let sources = resolver.load(None).unwrap();
        let matches = command(&schema).try_get_matches_from(["app"]).unwrap();
        let err = resolver.resolve::<Settings>(&sources, &matches).unwrap_err();
        assert_eq!(err.to_string(), "required flag \"--token\" not set");

        let resolver = ConfigResolver::new(&schema, &[], env_from([("APP_TOKEN", "t")]));
        let sources = resolver.load(None).unwrap();
        assert!(resolver.resolve::<Settings>(&sources, &matches).is_ok());
    }

    #[test]
    fn test_preset_satisfies_subcommand_required_flag() {
        let sources = ConfigSources {
            app: "app".to_string(),
            env: env_from([("APP_REGION", "eu")]),
            path: None,
            dir: None,
            document: json!({"force": "yes"}),
            fields: Vec::new(),
        };
        let cmd = Command::new("app").subcommand(
            Command::new("deploy").subcommand(
                Command::new("now")
                    .arg(Arg::new("region").long("region").required(true))
                    .arg(Arg::new("force").long("force").action(ArgAction::SetTrue)),
            ),
        );
        assert!(cmd.clone().try_get_matches_from(["app", "deploy", "now"]).is_err());

        let matches = sources
            .preset_flags(cmd)
            .try_get_matches_from(["app", "deploy", "now"])
            .unwrap();
        let (_, deploy) = matches.subcommand().unwrap();
        let (_, now) = deploy.subcommand().unwrap();
        assert_eq!(now.get_one::<String>("region").map(String::as_str), Some("eu"));
        assert!(now.get_flag("force"));
        assert_eq!(now.value_source("region"), Some(ValueSource::DefaultValue));
    }

    #[test]
    fn test_global_options_level() {
        let mut options = GlobalOptions::default();
        assert_eq!(options.level(), Level::Info);
        options.log_level = Some(Level::Warn);
        assert_eq!(options.level(), Level::Warn);
        options.debug = true;
        assert_eq!(options.level(), Level::Trace);
    }
}
