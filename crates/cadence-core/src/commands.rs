use std::io;

use anyhow::anyhow;
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::cli::Invocation;
use crate::config::Settings;
use crate::datetime::{
  parse_weekday_token,
  weekday_index
};
use crate::population::{
  PopulationSelector,
  TargetCategory
};
use crate::projection::{
  HorizonKind,
  Projection,
  project_now
};
use crate::recurrence::{
  RecurrenceInput,
  Unit
};
use crate::render::{
  OutputFormat,
  Renderer
};
use crate::roster;

pub fn known_command_names()
-> Vec<&'static str> {
  vec![
    "preview",
    "dates",
    "breakdown",
    "candidates",
    "_commands",
    "_show",
    "help",
    "version",
  ]
}

pub fn expand_command_abbrev<'a>(
  token: &'a str,
  known: &[&'a str]
) -> Option<&'a str> {
  if known.contains(&token) {
    return Some(token);
  }
  if token.is_empty() {
    return None;
  }

  let mut matches = known
    .iter()
    .copied()
    .filter(|name| {
      name.starts_with(token)
    });
  let first = matches.next()?;
  if matches.next().is_some() {
    None
  } else {
    Some(first)
  }
}

#[instrument(skip(
  settings, renderer, inv
))]
pub fn dispatch(
  settings: &Settings,
  renderer: &Renderer,
  inv: Invocation
) -> anyhow::Result<()> {
  let command = inv.command.as_str();
  debug!(
    command,
    args = ?inv.command_args,
    "dispatching command"
  );

  match command {
    | "preview" | "dates"
    | "breakdown" | "candidates" => {
      let request = Request::parse(
        settings,
        &inv.command_args
      )?;
      let users =
        roster::load_optional(
          settings.roster.as_deref()
        )?;
      cmd_projection(
        renderer, command, &request,
        &users
      )
    }
    | "_commands" => cmd_commands(),
    | "_show" => {
      println!("{settings}");
      Ok(())
    }
    | "help" => cmd_help(),
    | "version" => {
      println!(
        "{}",
        env!("CARGO_PKG_VERSION")
      );
      Ok(())
    }
    | other => {
      Err(anyhow!(
        "unknown command: {other}"
      ))
    }
  }
}

#[instrument(skip(
  renderer, request, users
))]
fn cmd_projection(
  renderer: &Renderer,
  command: &str,
  request: &Request,
  users: &[crate::population::User]
) -> anyhow::Result<()> {
  info!("command {command}");
  let out = io::stdout().lock();

  if command == "candidates" {
    let candidates = request
      .selector
      .candidates(users);
    return renderer.write_candidates(
      out,
      &candidates,
      request.format
    );
  }

  let projection: Projection =
    project_now(
      &request.input,
      &request.selector,
      users,
      request.horizon,
      request.timezone
    );

  match command {
    | "dates" => {
      renderer.write_dates(
        out,
        &projection,
        request.format
      )
    }
    | "breakdown" => {
      renderer.write_breakdown(
        out,
        &projection,
        request.format
      )
    }
    | _ => {
      renderer.write_preview(
        out,
        &projection,
        request.format
      )
    }
  }
}

fn cmd_commands() -> anyhow::Result<()>
{
  for command in known_command_names()
  {
    println!("{command}");
  }
  Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
  println!(
    "Commands: preview (default), \
     dates, breakdown, candidates\n\
     Arguments: start:<date> \
     every:<n> unit:<day|week|month|\
     year> days:<mon,wed|1,3> \
     category:<tag|all> \
     users:<id,id>\n\
     Flags: --horizon \
     <rolling|end-of-month> --format \
     <text|json> --roster <path> \
     --config <path> --timezone <zone>"
  );
  Ok(())
}

#[derive(Debug, Clone)]
enum Arg {
  Start(String),
  Interval(String),
  Unit(Unit),
  Days(Vec<i64>),
  Category(TargetCategory),
  Users(Vec<String>)
}

/// Everything one projection command needs: the recurrence and population
/// from `key:value` arguments, the rest from settings.
#[derive(Debug, Clone)]
struct Request {
  input:    RecurrenceInput,
  selector: PopulationSelector,
  horizon:  HorizonKind,
  format:   OutputFormat,
  timezone: Option<Tz>
}

impl Request {
  #[instrument(skip(settings, args))]
  fn parse(
    settings: &Settings,
    args: &[String]
  ) -> anyhow::Result<Self> {
    let mut request = Self {
      input:    RecurrenceInput::default(),
      selector: PopulationSelector::default(),
      horizon:  settings.horizon,
      format:   settings.format,
      timezone: settings.timezone
    };

    for arg in args {
      match parse_one_arg(arg)? {
        | Some(parsed) => {
          request.apply(parsed)
        }
        | None => {
          warn!(arg = %arg, "unrecognized argument ignored");
        }
      }
    }

    Ok(request)
  }

  fn apply(&mut self, arg: Arg) {
    match arg {
      | Arg::Start(raw) => {
        self.input.start_date = Some(raw);
      }
      | Arg::Interval(raw) => {
        self.input.interval =
          Some(Value::String(raw));
      }
      | Arg::Unit(unit) => {
        self.input.unit = unit;
      }
      | Arg::Days(days) => {
        self.input.days_of_week = days;
      }
      | Arg::Category(category) => {
        self.selector.target_category =
          category;
      }
      | Arg::Users(ids) => {
        self.selector =
          std::mem::take(
            &mut self.selector
          )
          .with_users(ids);
      }
    }
  }
}

fn parse_one_arg(
  tok: &str
) -> anyhow::Result<Option<Arg>> {
  // Values may contain either separator (`start=2026-02-16T09:00:00Z`),
  // so only the first one splits.
  let Some(at) = tok.find([':', '='])
  else {
    return Ok(None);
  };
  let key =
    tok[..at].to_ascii_lowercase();
  let value = &tok[at + 1..];

  match key.as_str() {
    | "start" | "from" => {
      Ok(Some(Arg::Start(
        value.to_string()
      )))
    }
    | "every" | "interval" => {
      Ok(Some(Arg::Interval(
        value.to_string()
      )))
    }
    | "unit" => {
      Ok(Some(Arg::Unit(value.parse()?)))
    }
    | "days" | "on" => {
      Ok(Some(Arg::Days(parse_days(
        value
      ))))
    }
    | "category" | "cat" => {
      Ok(Some(Arg::Category(
        TargetCategory::parse(value)
      )))
    }
    | "users" | "user" => {
      Ok(Some(Arg::Users(
        split_list(value)
      )))
    }
    | _ => Ok(None)
  }
}

// Out-of-range numbers pass through; normalization drops them.
fn parse_days(raw: &str) -> Vec<i64> {
  split_list(raw)
    .into_iter()
    .filter_map(|token| {
      if let Ok(idx) =
        token.parse::<i64>()
      {
        return Some(idx);
      }
      match parse_weekday_token(&token)
      {
        | Some(day) => {
          Some(i64::from(weekday_index(
            day
          )))
        }
        | None => {
          warn!(token = %token, "unknown weekday ignored");
          None
        }
      }
    })
    .collect()
}

fn split_list(
  raw: &str
) -> Vec<String> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .map(str::to_string)
    .collect()
}
