//! Demo application built on cmdkit.
//!
//! ```text
//! cmdkit-demo greet --name Ada
//! CMDKIT_DEMO_NAME=Ada cmdkit-demo greet --format json
//! cmdkit-demo fail --code 4
//! ```

use anyhow::Result;
use clap::Arg;
use cmdkit::{
    AppConfig, CommandError, ConfigSchema, Context, Field, Format, Lifecycle, RuntimeMode,
    Subcommand, Version,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct DemoConfig {
    greeting: String,
    repeat: i64,
}

impl AppConfig for DemoConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.repeat) {
            anyhow::bail!("repeat must be between 1 and 10, got {}", self.repeat);
        }
        Ok(())
    }
}

fn build_version() -> Version {
    match (
        option_env!("CMDKIT_DEMO_VERSION"),
        option_env!("CMDKIT_DEMO_COMMIT"),
    ) {
        (Some(version), Some(commit)) => Version::new(
            version,
            commit,
            option_env!("CMDKIT_DEMO_BUILD_DATE").unwrap_or_default(),
        ),
        _ => Version::default(),
    }
}

fn greet(ctx: &Context<'_, DemoConfig>) -> Result<()> {
    let name = ctx.value("name").unwrap_or("world");
    let config = ctx.config();
    debug!(repeat = config.repeat, "greeting");
    for _ in 0..config.repeat {
        match ctx.printer().format() {
            Format::Json => ctx
                .printer()
                .print_resource(&json!({ "greeting": config.greeting, "name": name }))?,
            Format::Human => ctx.printer().println(format!("{}, {name}!", config.greeting))?,
        }
    }
    info!(name, "greeted");
    Ok(())
}

fn fail(ctx: &Context<'_, DemoConfig>) -> Result<()> {
    let code = ctx
        .matches()
        .get_one::<i64>("code")
        .copied()
        .unwrap_or(3);
    let code = i32::try_from(code)?;
    Err(CommandError::new(format!("failure requested with exit code {code}"), code).into())
}

fn main() {
    let schema = ConfigSchema::new("cmdkit-demo")
        .field(Field::string("greeting", "Greeting to use").default_value("Hello"))
        .field(Field::int("repeat", "How many times to greet").default_value("1"));

    let mut app = Lifecycle::<DemoConfig>::new(schema, build_version())
        .about("Demonstrates layered configuration and exit codes")
        .subcommand(
            Subcommand::new("greet")
                .about("Greet someone")
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Who to greet (or CMDKIT_DEMO_NAME)")
                        .required(true),
                )
                .action(greet),
        )
        .subcommand(
            Subcommand::new("fail")
                .about("Exit with a chosen code")
                .arg(
                    Arg::new("code")
                        .long("code")
                        .value_parser(clap::value_parser!(i64))
                        .default_value("3"),
                )
                .action(fail),
        );

    std::process::exit(app.execute(std::env::args_os(), RuntimeMode::Interactive));
}
