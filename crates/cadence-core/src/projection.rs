use std::fmt;

use chrono::{
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use clap::ValueEnum;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info
};

use crate::datetime::{
  add_days,
  add_months,
  last_day_of_month,
  today
};
use crate::population::{
  PopulationSelector,
  User,
  UserId
};
use crate::recurrence::{
  Recurrence,
  RecurrenceInput,
  Unit
};

const ROLLING_DAY_SPAN: i64 = 30;
const ROLLING_WEEK_COUNT: i64 = 4;

/// Which window the preview counts over.
///
/// `Rolling` backs the create form, `EndOfMonth` the edit form.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  ValueEnum,
)]
#[serde(rename_all = "camelCase")]
pub enum HorizonKind {
  #[default]
  #[serde(alias = "create")]
  #[value(alias = "create")]
  Rolling,
  #[serde(
    alias = "end-of-month",
    alias = "eom",
    alias = "edit"
  )]
  #[value(
    name = "end-of-month",
    aliases = ["endofmonth", "eom", "month", "edit"]
  )]
  EndOfMonth
}

impl fmt::Display for HorizonKind {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | HorizonKind::Rolling => {
        f.write_str("rolling")
      }
      | HorizonKind::EndOfMonth => {
        f.write_str("endOfMonth")
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Horizon {
  pub kind:     HorizonKind,
  pub start:    NaiveDate,
  /// Inclusive.
  pub last_day: NaiveDate,
  pub label:    String
}

impl Horizon {
  pub fn resolve(
    kind: HorizonKind,
    recurrence: &Recurrence
  ) -> Self {
    let start = recurrence.start;
    let (last_day, label) = match kind {
      | HorizonKind::EndOfMonth => {
        (
          last_day_of_month(start),
          format!(
            "the rest of {}",
            start.format("%B %Y")
          )
        )
      }
      | HorizonKind::Rolling => {
        match recurrence.unit {
          | Unit::Day => {
            (
              add_days(
                start,
                ROLLING_DAY_SPAN
              ),
              format!(
                "the next \
                 {ROLLING_DAY_SPAN} days"
              )
            )
          }
          // Four whole weeks, counting the start day as day one.
          | Unit::Week => {
            (
              add_days(
                start,
                ROLLING_WEEK_COUNT * 7 - 1
              ),
              format!(
                "the next \
                 {ROLLING_WEEK_COUNT} \
                 weeks"
              )
            )
          }
          | Unit::Month => {
            (
              add_months(start, 1)
                .unwrap_or(
                  NaiveDate::MAX
                ),
              "the next month"
                .to_string()
            )
          }
          | Unit::Year => {
            (
              add_months(start, 12)
                .unwrap_or(
                  NaiveDate::MAX
                ),
              "the next year"
                .to_string()
            )
          }
        }
      }
    };

    Self {
      kind,
      start,
      last_day,
      label
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct UserShare {
  pub id:          UserId,
  pub category:    Option<String>,
  pub occurrences: u64
}

/// Preview numbers for one recurrence definition and population.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
  pub recurrence:           Recurrence,
  pub horizon:              Horizon,
  pub per_user_occurrences: u64,
  /// Raw candidate set size; may be zero.
  pub candidate_count:      usize,
  /// Never below one, so the preview total does not read as zero while
  /// nobody is selected yet.
  pub user_count:           u64,
  pub total_occurrences:    u64,
  pub breakdown:            Vec<UserShare>
}

impl Projection {
  pub fn horizon_label(&self) -> &str {
    &self.horizon.label
  }

  pub fn schedule_label(&self) -> String {
    self.recurrence.label()
  }

  pub fn summary(&self) -> String {
    format!(
      "approximately {} tasks per \
       person × {} people = {} tasks \
       within {}",
      self.per_user_occurrences,
      self.user_count,
      self.total_occurrences,
      self.horizon.label
    )
  }

  /// Concrete dates one person receives inside the horizon.
  pub fn occurrence_dates(
    &self
  ) -> Vec<NaiveDate> {
    self
      .recurrence
      .occurrences(self.horizon.last_day)
  }
}

#[tracing::instrument(skip(
  input, selector, roster
))]
pub fn project(
  input: &RecurrenceInput,
  selector: &PopulationSelector,
  roster: &[User],
  kind: HorizonKind,
  today: NaiveDate
) -> Projection {
  let recurrence =
    Recurrence::normalize(input, today);
  let horizon =
    Horizon::resolve(kind, &recurrence);
  let per_user_occurrences =
    recurrence
      .count_until(horizon.last_day);

  let candidates =
    selector.candidates(roster);
  let candidate_count = candidates.len();
  let user_count =
    (candidate_count as u64).max(1);
  let total_occurrences =
    per_user_occurrences
      .saturating_mul(user_count);

  let breakdown = candidates
    .iter()
    .map(|user| {
      UserShare {
        id:          user.id.clone(),
        category:    user.category.clone(),
        occurrences: per_user_occurrences
      }
    })
    .collect();

  debug!(
    start = %horizon.start,
    last_day = %horizon.last_day,
    per_user_occurrences,
    candidate_count,
    total_occurrences,
    "projected occurrences"
  );

  Projection {
    recurrence,
    horizon,
    per_user_occurrences,
    candidate_count,
    user_count,
    total_occurrences,
    breakdown
  }
}

/// `project` against today's date in `timezone`, or in host local time.
pub fn project_now(
  input: &RecurrenceInput,
  selector: &PopulationSelector,
  roster: &[User],
  kind: HorizonKind,
  timezone: Option<Tz>
) -> Projection {
  let today = today(Utc::now(), timezone);
  info!(%today, %kind, "projecting");
  project(
    input, selector, roster, kind,
    today
  )
}
