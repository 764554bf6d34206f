pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod population;
pub mod projection;
pub mod recurrence;
pub mod render;
pub mod roster;

use std::ffi::OsString;

use clap::Parser;
use tracing::{
  debug,
  info
};

pub use population::{
  PopulationSelector,
  Role,
  TargetCategory,
  User,
  UserId
};
pub use config::Settings;
pub use projection::{
  Horizon,
  HorizonKind,
  Projection,
  project,
  project_now
};
pub use recurrence::{
  Recurrence,
  RecurrenceInput,
  Unit
};
pub use render::{
  ColorChoice,
  OutputFormat
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting cadence"
  );

  let settings = cli.settings()?;
  debug!(
    config = ?settings.source,
    roster = ?settings.roster,
    "resolved settings"
  );

  let renderer =
    render::Renderer::new(
      settings.color
    );
  let inv = cli::Invocation::parse(
    &settings.default_command,
    cli.rest
  );

  commands::dispatch(
    &settings, &renderer, inv
  )?;

  info!("done");
  Ok(())
}
