use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  Duration,
  NaiveDate,
  Weekday
};
use serde::{
  Deserialize,
  Deserializer,
  Serialize
};
use serde_json::{
  Number,
  Value
};
use tracing::{
  debug,
  warn
};

use crate::datetime::{
  add_months,
  parse_date_expr,
  parse_weekday_token,
  weekday_abbrev,
  weekday_from_index,
  weekday_index,
  week_start_sunday
};

/// Upper bound on loop iterations for one enumeration.
pub const MAX_SCAN_STEPS: u64 = 4000;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
  #[default]
  Day,
  Week,
  Month,
  Year
}

impl Unit {
  pub fn as_str(self) -> &'static str {
    match self {
      | Unit::Day => "day",
      | Unit::Week => "week",
      | Unit::Month => "month",
      | Unit::Year => "year"
    }
  }

  pub fn abbrev(self) -> &'static str {
    match self {
      | Unit::Day => "d",
      | Unit::Week => "wk",
      | Unit::Month => "mo",
      | Unit::Year => "yr"
    }
  }
}

impl fmt::Display for Unit {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Unit {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "d" | "day" | "days"
      | "daily" => Ok(Unit::Day),
      | "w" | "wk" | "week"
      | "weeks" | "weekly" => {
        Ok(Unit::Week)
      }
      | "m" | "mo" | "month"
      | "months" | "monthly" => {
        Ok(Unit::Month)
      }
      | "y" | "yr" | "year"
      | "years" | "yearly"
      | "annual" => Ok(Unit::Year),
      | other => {
        Err(anyhow!(
          "unknown recurrence unit: \
           {other} (expected day, \
           week, month or year)"
        ))
      }
    }
  }
}

/// A routine definition as it arrives from an authoring form.
///
/// Fields may be blank or malformed mid-edit. Deserialization never
/// rejects a field's shape: anything unusable becomes "unset", and
/// `Recurrence::normalize` substitutes defaults.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
)]
pub struct RecurrenceInput {
  #[serde(
    default,
    alias = "startDate",
    deserialize_with = "lenient_text"
  )]
  pub start_date:   Option<String>,
  #[serde(default)]
  pub interval:     Option<Value>,
  #[serde(
    default,
    deserialize_with = "lenient_unit"
  )]
  pub unit:         Unit,
  #[serde(
    default,
    alias = "daysOfWeek",
    deserialize_with = "lenient_days"
  )]
  pub days_of_week: Vec<i64>
}

fn lenient_text<'de, D>(
  de: D
) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>
{
  Ok(match Value::deserialize(de)? {
    | Value::String(s) => Some(s),
    | Value::Number(n) => {
      Some(n.to_string())
    }
    | _ => None
  })
}

fn lenient_unit<'de, D>(
  de: D
) -> Result<Unit, D::Error>
where
  D: Deserializer<'de>
{
  let raw = Value::deserialize(de)?;
  let unit = raw
    .as_str()
    .and_then(|s| s.parse::<Unit>().ok());
  if unit.is_none() {
    debug!(
      raw = %raw,
      "unusable unit; using day"
    );
  }
  Ok(unit.unwrap_or_default())
}

// Entries may be numbers, numeric strings or weekday names; anything else
// is dropped. Range checks happen in `normalize`.
fn lenient_days<'de, D>(
  de: D
) -> Result<Vec<i64>, D::Error>
where
  D: Deserializer<'de>
{
  let Value::Array(items) =
    Value::deserialize(de)?
  else {
    return Ok(vec![]);
  };

  Ok(
    items
      .iter()
      .filter_map(|item| match item {
        | Value::Number(n) => {
          number_to_i64(n)
        }
        | Value::String(s) => {
          integer_text(s).or_else(|| {
            parse_weekday_token(s).map(
              |day| {
                i64::from(weekday_index(
                  day
                ))
              }
            )
          })
        }
        | _ => None
      })
      .collect()
  )
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct Recurrence {
  pub start:    NaiveDate,
  pub interval: u32,
  pub unit:     Unit,
  /// Sorted Sunday-first; empty unless `unit` is `Week`.
  pub days:     Vec<Weekday>
}

impl Recurrence {
  #[tracing::instrument(skip(input))]
  pub fn normalize(
    input: &RecurrenceInput,
    today: NaiveDate
  ) -> Self {
    let start =
      normalize_start(
        input.start_date.as_deref(),
        today
      );
    let interval = normalize_interval(
      input.interval.as_ref()
    );
    let days = if input.unit
      == Unit::Week
    {
      effective_days(
        &input.days_of_week,
        start
      )
    } else {
      vec![]
    };

    debug!(
      %start,
      interval,
      unit = %input.unit,
      days = ?days,
      "normalized recurrence"
    );

    Self {
      start,
      interval,
      unit: input.unit,
      days
    }
  }

  /// Every occurrence from the start date through `last_day`, inclusive.
  pub fn occurrences(
    &self,
    last_day: NaiveDate
  ) -> Vec<NaiveDate> {
    if last_day < self.start {
      return vec![];
    }

    let interval = u64::from(
      self.interval
    );
    match self.unit {
      | Unit::Day => {
        self.stepped(last_day, |k| {
          let days = i64::try_from(
            k.checked_mul(interval)?
          )
          .ok()?;
          self.start.checked_add_signed(
            Duration::try_days(days)?
          )
        })
      }
      | Unit::Week => {
        self.scan_weeks(last_day)
      }
      | Unit::Month => {
        self.stepped(last_day, |k| {
          let months = u32::try_from(
            k.checked_mul(interval)?
          )
          .ok()?;
          add_months(self.start, months)
        })
      }
      | Unit::Year => {
        self.stepped(last_day, |k| {
          let months = u32::try_from(
            k.checked_mul(interval)?
              .checked_mul(12)?
          )
          .ok()?;
          add_months(self.start, months)
        })
      }
    }
  }

  pub fn count_until(
    &self,
    last_day: NaiveDate
  ) -> u64 {
    self.occurrences(last_day).len()
      as u64
  }

  /// Short form such as `every 2 wk on Mon, Wed from 2026-10-05`.
  pub fn label(&self) -> String {
    let mut out = format!(
      "every {} {}",
      self.interval,
      self.unit.abbrev()
    );
    if !self.days.is_empty() {
      let days = self
        .days
        .iter()
        .map(|day| weekday_abbrev(*day))
        .collect::<Vec<_>>()
        .join(", ");
      out.push_str(" on ");
      out.push_str(&days);
    }
    out.push_str(&format!(
      " from {}",
      self.start.format("%Y-%m-%d")
    ));
    out
  }

  fn stepped<F>(
    &self,
    last_day: NaiveDate,
    nth: F
  ) -> Vec<NaiveDate>
  where
    F: Fn(u64) -> Option<NaiveDate>
  {
    let mut out = Vec::new();
    for k in 0..MAX_SCAN_STEPS {
      let Some(date) = nth(k) else {
        return out;
      };
      if date > last_day {
        return out;
      }
      out.push(date);
    }

    warn!(
      unit = %self.unit,
      interval = self.interval,
      %last_day,
      cap = MAX_SCAN_STEPS,
      "occurrence scan hit step cap"
    );
    out
  }

  fn scan_weeks(
    &self,
    last_day: NaiveDate
  ) -> Vec<NaiveDate> {
    let reference =
      week_start_sunday(self.start);
    let interval =
      i64::from(self.interval);
    let mut out = Vec::new();
    let mut current = self.start;

    for _ in 0..MAX_SCAN_STEPS {
      if current > last_day {
        return out;
      }

      let week_offset = (current
        - reference)
        .num_days()
        / 7;
      if week_offset % interval == 0
        && self
          .days
          .contains(&current.weekday())
      {
        out.push(current);
      }

      let Some(next) = current.succ_opt()
      else {
        return out;
      };
      current = next;
    }

    warn!(
      interval = self.interval,
      %last_day,
      cap = MAX_SCAN_STEPS,
      "weekly day scan hit step cap"
    );
    out
  }
}

fn normalize_start(
  raw: Option<&str>,
  today: NaiveDate
) -> NaiveDate {
  let Some(raw) = raw
    .map(str::trim)
    .filter(|s| !s.is_empty())
  else {
    return today;
  };

  match parse_date_expr(raw, today) {
    | Ok(date) => date,
    | Err(err) => {
      debug!(
        raw,
        error = %err,
        "unparseable start date; using today"
      );
      today
    }
  }
}

fn normalize_interval(
  raw: Option<&Value>
) -> u32 {
  let parsed = match raw {
    | Some(Value::Number(n)) => {
      number_to_i64(n)
    }
    | Some(Value::String(s)) => {
      integer_text(s)
    }
    | _ => None
  };

  match parsed {
    | Some(n) if n >= 1 => {
      u32::try_from(n)
        .unwrap_or(u32::MAX)
    }
    | _ => 1
  }
}

/// Fractional values truncate toward zero.
fn number_to_i64(n: &Number) -> Option<i64> {
  n.as_i64().or_else(|| {
    n.as_f64()
      .filter(|f| f.is_finite())
      .map(|f| f.trunc() as i64)
  })
}

fn integer_text(raw: &str) -> Option<i64> {
  let raw = raw.trim();
  raw.parse::<i64>().ok().or_else(|| {
    raw
      .parse::<f64>()
      .ok()
      .filter(|f| f.is_finite())
      .map(|f| f.trunc() as i64)
  })
}

fn effective_days(
  raw: &[i64],
  start: NaiveDate
) -> Vec<Weekday> {
  let mut days: Vec<Weekday> = raw
    .iter()
    .filter_map(|idx| {
      weekday_from_index(*idx)
    })
    .collect();
  days.sort_by_key(|day| {
    weekday_index(*day)
  });
  days.dedup();

  if days.is_empty() {
    days.push(start.weekday());
  }
  days
}
