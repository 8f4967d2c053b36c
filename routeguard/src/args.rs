use std::{borrow::Cow, fmt, io::IsTerminal, path::PathBuf, str::FromStr, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use config::Config;
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "Routeguard", version, long_about = concat!("Routeguard v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, env = "ROUTEGUARD_CONFIG_PATH", default_value = "./routeguard.toml")]
    pub config: PathBuf,
    /// Set the logging level
    #[arg(long = "log", env = "ROUTEGUARD_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "ROUTEGUARD_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        let config = if self.config.exists() {
            Config::load(&self.config)?
        } else {
            Config::default()
        };

        Ok(config)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Count calls to a route against its limit and print each decision
    Check(CheckArgs),
    /// List the statically configured route limits
    Routes,
}

#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    /// Route to check
    pub route: String,
    /// Limit to register for the route if it has none
    #[arg(long)]
    pub threshold: Option<u32>,
    /// Window of the registered limit, e.g. "60s". Without it the window never resets.
    #[arg(long, value_parser = parse_duration, requires = "threshold")]
    pub window: Option<Duration>,
    /// Number of calls to make
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    duration_str::parse(value)
}

/// Format of log lines written to stderr.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Text with colored levels, the default on a terminal
    Color,
    /// Plain text, the default otherwise
    Text,
    /// One JSON object per line
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stderr().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

/// Verbosity of the workspace crates. Dependencies only log warnings and errors.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogLevel {
    /// Nothing at all
    Off,
    Error,
    #[default]
    Warn,
    Info,
    /// Every decision and window start
    Debug,
    Trace,
}

impl LogLevel {
    pub fn env_filter(self) -> EnvFilter {
        let filter = match self {
            LogLevel::Off => Cow::Borrowed("off"),
            level => Cow::Owned(format!(
                "warn,routeguard={level},rate_limit={level},config={level},telemetry={level}"
            )),
        };

        EnvFilter::from_str(&filter).expect("filters built from level names are valid")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value_name(self, f)
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value_name(self, f)
    }
}

/// Writes the name clap accepts for `value`, so defaults print the way they are typed.
fn write_value_name(value: &impl ValueEnum, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value.to_possible_value() {
        Some(possible) => f.write_str(possible.get_name()),
        None => Err(fmt::Error),
    }
}
