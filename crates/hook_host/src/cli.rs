//! Command-line arguments.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Options that override the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub plugin_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    /// Skip plugin loading regardless of `plugins.auto_load`.
    pub no_plugins: bool,
}

fn command() -> Command {
    Command::new("hook_host")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Standalone host driving the hook dispatch engine from a console")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("hook_host.toml"),
        )
        .arg(
            Arg::new("plugins")
                .short('p')
                .long("plugins")
                .value_name("DIR")
                .help("Plugin directory path"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-plugins")
                .long("no-plugins")
                .help("Start without loading plugins")
                .action(ArgAction::SetTrue),
        )
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("hook_host.toml")),
            plugin_dir: matches.get_one::<String>("plugins").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            no_plugins: matches.get_flag("no-plugins"),
        }
    }
}
