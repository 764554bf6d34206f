use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::datetime::parse_timezone;
use crate::projection::HorizonKind;
use crate::render::{ColorChoice, OutputFormat};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cadence",
    version,
    about = "Preview how many routine tasks a recurrence generates",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Settings file (TOML). Defaults to <config dir>/cadence/config.toml.
    #[arg(long, env = "CADENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Roster file (JSON array, {"users": [...]}, or JSON lines); `-` reads stdin.
    #[arg(long)]
    pub roster: Option<PathBuf>,

    #[arg(long, value_enum, ignore_case = true)]
    pub horizon: Option<HorizonKind>,

    #[arg(long, value_enum, ignore_case = true)]
    pub format: Option<OutputFormat>,

    #[arg(long, value_enum, ignore_case = true)]
    pub color: Option<ColorChoice>,

    /// IANA zone that decides which calendar day is "today".
    #[arg(long, env = "CADENCE_TIMEZONE")]
    pub timezone: Option<String>,

    /// Command followed by `key:value` recurrence arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

impl GlobalCli {
    /// Config file settings with this invocation's flags laid over them.
    #[tracing::instrument(skip(self))]
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(roster) = &self.roster {
            settings.roster = Some(roster.clone());
        }
        if let Some(raw) = &self.timezone {
            settings.timezone = Some(parse_timezone(raw)?);
        }
        settings.horizon = self.horizon.unwrap_or(settings.horizon);
        settings.format = self.format.unwrap_or(settings.format);
        settings.color = self.color.unwrap_or(settings.color);
        debug!(?settings, "effective settings");
        Ok(settings)
    }
}

/// `-q` lowers and `-v` raises the level; quiet wins when both are given.
fn log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (0, 0) | (1, _) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
        _ => "error",
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level(verbose, quiet))
            .map_err(|err| anyhow!("invalid log filter: {err}"))?,
    };

    let stderr_is_tty = std::io::stderr().is_terminal();
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(stderr_is_tty)
        .try_init()
    {
        debug!(error = %err, "tracing already initialized");
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    /// Splits off the first token when it names a command (unique prefixes
    /// allowed); otherwise everything is an argument to `default_command`.
    #[tracing::instrument(skip(rest))]
    pub fn parse(default_command: &str, rest: Vec<String>) -> Self {
        let known = crate::commands::known_command_names();
        if let Some(first) = rest.first()
            && let Some(full) = crate::commands::expand_command_abbrev(first, &known)
        {
            debug!(token = %first, expanded = %full, "resolved command token");
            return Self {
                command: full.to_string(),
                command_args: rest[1..].to_vec(),
            };
        }

        debug!(command = %default_command, "no explicit command, using default");
        Self {
            command: default_command.to_string(),
            command_args: rest,
        }
    }
}
