use std::io::{self, IsTerminal, Write};

use chrono::Datelike;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

use crate::datetime::weekday_abbrev;
use crate::population::User;
use crate::projection::Projection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[value(alias = "plain")]
    Text,
    Json,
}

/// When to emit ANSI color on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    #[default]
    #[serde(alias = "on")]
    #[value(alias = "on")]
    Auto,
    Always,
    #[serde(alias = "off")]
    #[value(alias = "off")]
    Never,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

impl ColorChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(choice: ColorChoice) -> Self {
        let color = match choice {
            ColorChoice::Auto => io::stdout().is_terminal(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };
        Self { color }
    }

    #[tracing::instrument(skip_all)]
    pub fn write_preview<W: Write>(
        &self,
        mut out: W,
        projection: &Projection,
        format: OutputFormat,
    ) -> anyhow::Result<()> {
        if format == OutputFormat::Json {
            return write_json(out, projection);
        }

        let horizon = &projection.horizon;
        writeln!(out, "schedule  {}", self.paint(&projection.schedule_label(), "36"))?;
        writeln!(
            out,
            "window    {} .. {} ({})",
            horizon.start.format("%Y-%m-%d"),
            horizon.last_day.format("%Y-%m-%d"),
            horizon.label
        )?;
        if projection.candidate_count == 0 {
            writeln!(out, "people    none selected yet (counting one)")?;
        } else {
            writeln!(out, "people    {}", projection.candidate_count)?;
        }
        writeln!(out, "{}", self.paint(&projection.summary(), "1"))?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn write_dates<W: Write>(
        &self,
        mut out: W,
        projection: &Projection,
        format: OutputFormat,
    ) -> anyhow::Result<()> {
        let dates = projection.occurrence_dates();
        if format == OutputFormat::Json {
            return write_json(out, &dates);
        }

        let headers = vec!["#".to_string(), "Date".to_string(), "Day".to_string()];
        let rows = dates
            .iter()
            .enumerate()
            .map(|(idx, date)| {
                vec![
                    self.paint(&(idx + 1).to_string(), "33"),
                    date.format("%Y-%m-%d").to_string(),
                    weekday_abbrev(date.weekday()).to_string(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(
            out,
            "{} occurrences within {}",
            dates.len(),
            projection.horizon.label
        )?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn write_breakdown<W: Write>(
        &self,
        mut out: W,
        projection: &Projection,
        format: OutputFormat,
    ) -> anyhow::Result<()> {
        if format == OutputFormat::Json {
            return write_json(out, &projection.breakdown);
        }

        let headers = vec![
            "User".to_string(),
            "Category".to_string(),
            "Tasks".to_string(),
        ];
        let rows = projection
            .breakdown
            .iter()
            .map(|share| {
                vec![
                    self.paint(share.id.as_str(), "33"),
                    share.category.clone().unwrap_or_default(),
                    share.occurrences.to_string(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{}", projection.summary())?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn write_candidates<W: Write>(
        &self,
        mut out: W,
        users: &[&User],
        format: OutputFormat,
    ) -> anyhow::Result<()> {
        if format == OutputFormat::Json {
            return write_json(out, &users);
        }
        for user in users {
            writeln!(out, "{}", user.id)?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_json<W: Write, T: serde::Serialize + ?Sized>(mut out: W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::population::{PopulationSelector, User};
    use crate::projection::{HorizonKind, project};
    use crate::recurrence::{RecurrenceInput, Unit};

    fn sample(roster: &[User]) -> Projection {
        let today = NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date");
        project(
            &RecurrenceInput {
                start_date: Some("2026-02-16".to_string()),
                interval: Some(json!(1)),
                unit: Unit::Week,
                days_of_week: vec![1, 4],
            },
            &PopulationSelector::default(),
            roster,
            HorizonKind::Rolling,
            today,
        )
    }

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> anyhow::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn preview_mentions_schedule_and_summary() {
        let projection = sample(&[]);
        let text = render(|buf| {
            Renderer::new(ColorChoice::Never).write_preview(buf, &projection, OutputFormat::Text)
        });
        assert!(text.contains("every 1 wk on Mon, Thu from 2026-02-16"));
        assert!(text.contains("2026-02-16 .. 2026-03-15"));
        assert!(text.contains("none selected yet"));
        assert!(text.contains("approximately 8 tasks per person × 1 people = 8 tasks"));
    }

    #[test]
    fn dates_table_lists_each_occurrence() {
        let projection = sample(&[]);
        let text = render(|buf| Renderer::new(ColorChoice::Never).write_dates(buf, &projection, OutputFormat::Text));
        assert!(text.lines().next().is_some_and(|line| line.starts_with("#")));
        assert!(text.contains("2026-02-19 Thu"));
        assert!(text.contains("8 occurrences within the next 4 weeks"));
    }

    #[test]
    fn breakdown_json_is_an_array() {
        let roster = vec![User::employee("a", Some("ops")), User::employee("b", None)];
        let projection = sample(&roster);
        let text = render(|buf| {
            Renderer::new(ColorChoice::Never).write_breakdown(buf, &projection, OutputFormat::Json)
        });
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[0]["occurrences"], json!(8));
    }

    #[test]
    fn table_pads_around_ansi() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["\x1b[33mxyz\x1b[0m".to_string(), "1".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A   B ");
        assert_eq!(lines[1], "--- - ");
        assert_eq!(strip_ansi(lines[2]), "xyz 1 ");
    }

    #[test]
    fn color_choice_controls_escapes() {
        let projection = sample(&[]);
        let painted = render(|buf| {
            Renderer::new(ColorChoice::Always).write_preview(buf, &projection, OutputFormat::Text)
        });
        assert!(painted.contains("\x1b[36m"));

        let plain = render(|buf| {
            Renderer::new(ColorChoice::Never).write_preview(buf, &projection, OutputFormat::Text)
        });
        assert!(!plain.contains('\x1b'));
        assert_eq!(strip_ansi(&painted), plain);

        let parsed: ColorChoice = serde_json::from_value(json!("off")).expect("alias");
        assert_eq!(parsed, ColorChoice::Never);
    }
}
