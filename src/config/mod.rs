//! Layered configuration.
//!
//! An application describes its settings once with a [`ConfigSchema`]; the
//! [`ConfigResolver`] merges them field by field from four sources:
//! 1. **Flags** - explicitly typed on the command line (highest)
//! 2. **Environment** - `<APP>_<FLAG>` with `-` and `.` mapped to `_`
//! 3. **File** - `--config` or the default file in the default directory
//! 4. **Defaults** - field defaults and the config struct's `Default` (lowest)

mod files;
mod loader;
mod merge;
mod schema;

pub use files::{ConfigFormat, discover};
pub use loader::{
    ConfigResolver, ConfigSource, ConfigSources, EnvLookup, GlobalOptions, ResolvedConfig,
    env_from, process_env,
};
pub use merge::{deep_merge, deep_merge_all};
pub use schema::{
    AppConfig, ConfigSchema, Field, FieldKind, NoConfig, env_var_name, parse_bool,
};
