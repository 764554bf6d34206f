use std::fmt;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::Context;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  info
};

use crate::datetime::parse_timezone;
use crate::projection::HorizonKind;
use crate::render::{
  ColorChoice,
  OutputFormat
};

const CONFIG_DIR_NAME: &str = "cadence";
const CONFIG_FILE_NAME: &str =
  "config.toml";
const STDIN_MARKER: &str = "-";

/// Effective settings after the config file and command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub roster:          Option<PathBuf>,
  pub timezone:        Option<Tz>,
  pub default_command: String,
  pub horizon:         HorizonKind,
  pub format:          OutputFormat,
  pub color:           ColorChoice,
  /// File the settings were read from, if any.
  pub source:          Option<PathBuf>
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      roster:          None,
      timezone:        None,
      default_command: "preview"
        .to_string(),
      horizon:         HorizonKind::Rolling,
      format:          OutputFormat::Text,
      color:           ColorChoice::Auto,
      source:          None
    }
  }
}

// On-disk shape:
//
//   roster = "~/staff/roster.json"
//   timezone = "Europe/Berlin"
//
//   [defaults]
//   command = "preview"
//   horizon = "endOfMonth"
//   format = "text"
//   color = "auto"
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
  roster:   Option<PathBuf>,
  timezone: Option<String>,
  defaults: DefaultsSection
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DefaultsSection {
  command: Option<String>,
  horizon: Option<HorizonKind>,
  format:  Option<OutputFormat>,
  color:   Option<ColorChoice>
}

impl Settings {
  /// Reads `explicit` if given, else the per-user config file when it
  /// exists, else returns defaults.
  #[tracing::instrument]
  pub fn load(
    explicit: Option<&Path>
  ) -> anyhow::Result<Self> {
    let path = match explicit {
      | Some(path) => {
        Some(expand_home(path))
      }
      | None => {
        default_config_path()
          .filter(|path| path.exists())
      }
    };

    let Some(path) = path else {
      debug!(
        "no config file; using defaults"
      );
      return Ok(Self::default());
    };

    info!(file = %path.display(), "loading settings");
    let raw = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read config {}",
          path.display()
        )
      })?;
    let mut settings =
      Self::from_toml(
        &raw,
        path.parent()
      )
      .with_context(|| {
        format!(
          "invalid config {}",
          path.display()
        )
      })?;
    settings.source = Some(path);
    Ok(settings)
  }

  /// Parses settings text. A relative `roster` is resolved against
  /// `base_dir`.
  pub fn from_toml(
    raw: &str,
    base_dir: Option<&Path>
  ) -> anyhow::Result<Self> {
    let file: SettingsFile =
      toml::from_str(raw)?;
    let defaults = Self::default();

    let timezone = file
      .timezone
      .as_deref()
      .map(parse_timezone)
      .transpose()?;
    let roster =
      file.roster.map(|path| {
        resolve_roster(&path, base_dir)
      });
    let default_command = file
      .defaults
      .command
      .map(|cmd| cmd.trim().to_string())
      .filter(|cmd| !cmd.is_empty())
      .unwrap_or(
        defaults.default_command
      );

    Ok(Self {
      roster,
      timezone,
      default_command,
      horizon: file
        .defaults
        .horizon
        .unwrap_or(defaults.horizon),
      format: file
        .defaults
        .format
        .unwrap_or(defaults.format),
      color: file
        .defaults
        .color
        .unwrap_or(defaults.color),
      source: None
    })
  }
}

impl fmt::Display for Settings {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let show_path =
      |path: &Option<PathBuf>| {
        path
          .as_ref()
          .map(|p| {
            p.display().to_string()
          })
          .unwrap_or_else(|| {
            "(none)".to_string()
          })
      };
    writeln!(
      f,
      "config           {}",
      show_path(&self.source)
    )?;
    writeln!(
      f,
      "roster           {}",
      show_path(&self.roster)
    )?;
    writeln!(
      f,
      "timezone         {}",
      self
        .timezone
        .map(|tz| tz.name().to_string())
        .unwrap_or_else(|| {
          "(host local)".to_string()
        })
    )?;
    writeln!(
      f,
      "default.command  {}",
      self.default_command
    )?;
    writeln!(
      f,
      "default.horizon  {}",
      self.horizon
    )?;
    writeln!(
      f,
      "default.format   {}",
      self.format.as_str()
    )?;
    write!(
      f,
      "color            {}",
      self.color.as_str()
    )
  }
}

fn default_config_path()
-> Option<PathBuf> {
  dirs::config_dir().map(|dir| {
    dir
      .join(CONFIG_DIR_NAME)
      .join(CONFIG_FILE_NAME)
  })
}

fn resolve_roster(
  path: &Path,
  base_dir: Option<&Path>
) -> PathBuf {
  if path == Path::new(STDIN_MARKER) {
    return path.to_path_buf();
  }
  let path = expand_home(path);
  match base_dir {
    | Some(base) if path.is_relative() => {
      base.join(path)
    }
    | _ => path
  }
}

/// Replaces a leading `~` component with the home directory.
fn expand_home(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn typed_settings_from_file() {
    let temp =
      tempdir().expect("tempdir");
    let path =
      temp.path().join("cadence.toml");
    fs::write(
      &path,
      "roster = \"staff/roster.json\"\n\
       timezone = \"Europe/Berlin\"\n\
       \n\
       [defaults]\n\
       command = \"dates\"\n\
       horizon = \"endOfMonth\"\n\
       format = \"json\"\n\
       color = \"off\"\n"
    )
    .expect("write config");

    let settings = Settings::load(Some(
      path.as_path()
    ))
    .expect("load settings");
    assert_eq!(
      settings.roster,
      Some(
        temp
          .path()
          .join("staff/roster.json")
      )
    );
    assert_eq!(
      settings.timezone,
      Some(chrono_tz::Europe::Berlin)
    );
    assert_eq!(
      settings.default_command,
      "dates"
    );
    assert_eq!(
      settings.horizon,
      HorizonKind::EndOfMonth
    );
    assert_eq!(
      settings.format,
      OutputFormat::Json
    );
    assert_eq!(
      settings.color,
      ColorChoice::Never
    );
    assert_eq!(
      settings.source.as_deref(),
      Some(path.as_path())
    );
  }

  #[test]
  fn empty_file_gives_defaults() {
    let settings =
      Settings::from_toml("", None)
        .expect("empty config");
    assert_eq!(
      settings,
      Settings::default()
    );
  }

  #[test]
  fn absolute_and_stdin_rosters_are_kept()
  {
    let base = Path::new("/etc/cadence");
    let absolute = Settings::from_toml(
      "roster = \"/srv/roster.json\"",
      Some(base)
    )
    .expect("absolute roster");
    assert_eq!(
      absolute.roster,
      Some(PathBuf::from(
        "/srv/roster.json"
      ))
    );

    let stdin = Settings::from_toml(
      "roster = \"-\"",
      Some(base)
    )
    .expect("stdin roster");
    assert_eq!(
      stdin.roster,
      Some(PathBuf::from("-"))
    );
  }

  #[test]
  fn rejects_typos_and_bad_values() {
    assert!(
      Settings::from_toml(
        "rooster = \"a.json\"",
        None
      )
      .is_err()
    );
    assert!(
      Settings::from_toml(
        "[defaults]\nhorizon = \
         \"fortnight\"",
        None
      )
      .is_err()
    );
    assert!(
      Settings::from_toml(
        "timezone = \"Mars/Olympus\"",
        None
      )
      .is_err()
    );
  }

  #[test]
  fn missing_explicit_file_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    assert!(
      Settings::load(Some(
        temp
          .path()
          .join("absent.toml")
          .as_path()
      ))
      .is_err()
    );
  }

  #[test]
  fn display_lists_effective_values() {
    let text =
      Settings::default().to_string();
    assert!(
      text.contains(
        "default.horizon  rolling"
      )
    );
    assert!(
      text.contains("(host local)")
    );
  }
}
