use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  Months,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

const WEEKDAY_ABBREVS: [&str; 7] = [
  "Sun", "Mon", "Tue", "Wed", "Thu",
  "Fri", "Sat"
];

/// Calendar date of `now` in `timezone`, or in host local time.
///
/// Recurrence math never converts between zones; the zone only picks
/// which calendar day counts as today.
#[must_use]
pub fn today(
  now: DateTime<Utc>,
  timezone: Option<Tz>
) -> NaiveDate {
  match timezone {
    | Some(tz) => {
      now.with_timezone(&tz).date_naive()
    }
    | None => {
      now.with_timezone(&Local)
        .date_naive()
    }
  }
}

pub fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  trimmed.parse::<Tz>().map_err(|err| {
    anyhow!(
      "unknown timezone {trimmed:?}: \
       {err}"
    )
  })
}

/// Parses a start-date expression relative to `today`.
///
/// Accepts `today`/`tomorrow`/`yesterday`, weekday names (next such
/// day), month names (first of the next such month), `+Nd`/`-Nw`
/// offsets, `YYYY-MM-DD` and RFC3339 timestamps (date part only).
#[tracing::instrument(skip(today))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  keyword_date(&lower, today)
    .or_else(|| {
      parse_weekday_name(&lower).map(
        |day| next_weekday_date(today, day)
      )
    })
    .or_else(|| {
      parse_month_name(&lower).and_then(
        |month| {
          next_month_start(today, month)
        }
      )
    })
    .or_else(|| {
      relative_date(&lower, today)
    })
    .or_else(|| {
      NaiveDate::parse_from_str(
        token, "%Y-%m-%d"
      )
      .ok()
    })
    .or_else(|| {
      DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|dt| dt.date_naive())
    })
    .ok_or_else(|| {
      anyhow!(
        "unrecognized date expression: \
         {input}"
      )
    })
    .context(
      "supported formats: \
       today/tomorrow/yesterday, weekday \
       names, month names, +Nd/-Nw, \
       YYYY-MM-DD, RFC3339"
    )
}

fn keyword_date(
  token: &str,
  today: NaiveDate
) -> Option<NaiveDate> {
  match token {
    | "now" | "today" => Some(today),
    | "tomorrow" => {
      today.succ_opt()
    }
    | "yesterday" => {
      today.pred_opt()
    }
    | _ => None
  }
}

fn next_month_start(
  today: NaiveDate,
  month: u32
) -> Option<NaiveDate> {
  let year = if month <= today.month() {
    today.year().checked_add(1)?
  } else {
    today.year()
  };
  NaiveDate::from_ymd_opt(year, month, 1)
}

fn relative_date(
  token: &str,
  today: NaiveDate
) -> Option<NaiveDate> {
  let re =
    Regex::new(r"^([+-])(\d{1,6})([dw])$")
      .ok()?;
  let caps = re.captures(token)?;
  let amount: i64 =
    caps.get(2)?.as_str().parse().ok()?;
  let days = match caps.get(3)?.as_str() {
    | "w" => amount * 7,
    | _ => amount
  };
  let signed =
    match caps.get(1)?.as_str() {
      | "-" => -days,
      | _ => days
    };
  today.checked_add_signed(
    Duration::try_days(signed)?
  )
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = weekday_index(
    from.weekday()
  ) as i64;
  let target_idx =
    weekday_index(target) as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}

fn parse_month_name(
  token: &str
) -> Option<u32> {
  match token.trim() {
    | "january" | "jan" => Some(1),
    | "february" | "feb" => Some(2),
    | "march" | "mar" => Some(3),
    | "april" | "apr" => Some(4),
    | "may" => Some(5),
    | "june" | "jun" => Some(6),
    | "july" | "jul" => Some(7),
    | "august" | "aug" => Some(8),
    | "september" | "sep" | "sept" => {
      Some(9)
    }
    | "october" | "oct" => Some(10),
    | "november" | "nov" => Some(11),
    | "december" | "dec" => Some(12),
    | _ => None
  }
}

/// Weekday from a Sunday-based index (0 = Sunday .. 6 = Saturday).
pub fn weekday_from_index(
  idx: i64
) -> Option<Weekday> {
  match idx {
    | 0 => Some(Weekday::Sun),
    | 1 => Some(Weekday::Mon),
    | 2 => Some(Weekday::Tue),
    | 3 => Some(Weekday::Wed),
    | 4 => Some(Weekday::Thu),
    | 5 => Some(Weekday::Fri),
    | 6 => Some(Weekday::Sat),
    | _ => None
  }
}

pub fn weekday_index(
  day: Weekday
) -> u32 {
  day.num_days_from_sunday()
}

/// Index 0..=6 or a weekday name.
pub fn parse_weekday_token(
  token: &str
) -> Option<Weekday> {
  let trimmed = token.trim();
  if let Ok(idx) = trimmed.parse::<i64>()
  {
    return weekday_from_index(idx);
  }
  parse_weekday_name(
    &trimmed.to_ascii_lowercase()
  )
}

pub fn weekday_abbrev(
  day: Weekday
) -> &'static str {
  WEEKDAY_ABBREVS
    [weekday_index(day) as usize]
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .unwrap_or(date)
}

/// Adds calendar months, clamping the day to the target month's length.
///
/// Returns `None` past the representable calendar.
pub fn add_months(
  date: NaiveDate,
  months: u32
) -> Option<NaiveDate> {
  date.checked_add_months(
    Months::new(months)
  )
}

pub fn last_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  let first = date
    .with_day(1)
    .unwrap_or(date);
  add_months(first, 1)
    .map(|next| add_days(next, -1))
    .unwrap_or(NaiveDate::MAX)
}

/// Sunday on or before `day`.
pub fn week_start_sunday(
  day: NaiveDate
) -> NaiveDate {
  let diff =
    weekday_index(day.weekday()) as i64;
  add_days(day, -diff)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    Weekday
  };

  use super::*;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_weekday_name() {
    let parsed = parse_date_expr(
      "wednesday",
      date(2026, 2, 17)
    )
    .expect("parse weekday");
    assert_eq!(
      parsed,
      date(2026, 2, 18)
    );
  }

  #[test]
  fn parses_month_name() {
    let parsed = parse_date_expr(
      "march",
      date(2026, 2, 17)
    )
    .expect("parse month");
    assert_eq!(parsed, date(2026, 3, 1));

    let wrapped = parse_date_expr(
      "jan",
      date(2026, 2, 17)
    )
    .expect("parse month");
    assert_eq!(
      wrapped,
      date(2027, 1, 1)
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_date_expr("+3d", today)
        .expect("parse +3d"),
      date(2026, 2, 20)
    );
    assert_eq!(
      parse_date_expr("-1w", today)
        .expect("parse -1w"),
      date(2026, 2, 10)
    );
  }

  #[test]
  fn parses_iso_and_rfc3339() {
    let today = date(2026, 2, 17);
    assert_eq!(
      parse_date_expr(
        "2026-10-05",
        today
      )
      .expect("iso"),
      date(2026, 10, 5)
    );
    assert_eq!(
      parse_date_expr(
        "2026-10-05T23:30:00+09:00",
        today
      )
      .expect("rfc3339"),
      date(2026, 10, 5)
    );
  }

  #[test]
  fn rejects_garbage() {
    assert!(
      parse_date_expr(
        "not-a-date",
        date(2026, 2, 17)
      )
      .is_err()
    );
  }

  #[test]
  fn month_arithmetic_clamps() {
    assert_eq!(
      add_months(date(2026, 1, 31), 1),
      Some(date(2026, 2, 28))
    );
    assert_eq!(
      add_months(date(2024, 2, 29), 12),
      Some(date(2025, 2, 28))
    );
    assert_eq!(
      last_day_of_month(date(
        2024, 2, 10
      )),
      date(2024, 2, 29)
    );
    assert_eq!(
      last_day_of_month(date(
        2026, 12, 3
      )),
      date(2026, 12, 31)
    );
  }

  #[test]
  fn week_starts_on_sunday() {
    // 2026-02-18 is a Wednesday.
    assert_eq!(
      week_start_sunday(date(
        2026, 2, 18
      )),
      date(2026, 2, 15)
    );
    assert_eq!(
      week_start_sunday(date(
        2026, 2, 15
      )),
      date(2026, 2, 15)
    );
  }

  #[test]
  fn weekday_tokens() {
    assert_eq!(
      parse_weekday_token("0"),
      Some(Weekday::Sun)
    );
    assert_eq!(
      parse_weekday_token("Fri"),
      Some(Weekday::Fri)
    );
    assert_eq!(
      parse_weekday_token("7"),
      None
    );
    assert_eq!(
      weekday_abbrev(Weekday::Sat),
      "Sat"
    );
  }

  #[test]
  fn today_follows_configured_zone() {
    let now = DateTime::parse_from_rfc3339(
      "2026-10-16T23:30:00Z"
    )
    .expect("timestamp")
    .with_timezone(&Utc);
    let tokyo = parse_timezone(
      " Asia/Tokyo "
    )
    .expect("known zone");
    assert_eq!(
      today(now, Some(tokyo)),
      date(2026, 10, 17)
    );
    assert_eq!(
      today(now, Some(chrono_tz::UTC)),
      date(2026, 10, 16)
    );
    assert!(
      parse_timezone("Mars/Olympus")
        .is_err()
    );
  }

  #[test]
  fn keywords_and_large_offsets() {
    let today = date(2026, 2, 28);
    assert_eq!(
      parse_date_expr("Tomorrow", today)
        .expect("tomorrow"),
      date(2026, 3, 1)
    );
    assert!(
      parse_date_expr(
        "+99999999d",
        today
      )
      .is_err()
    );
  }
}
