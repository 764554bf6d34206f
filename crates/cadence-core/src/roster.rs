use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::population::User;

const STDIN_MARKER: &str = "-";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RosterDoc {
    List(Vec<User>),
    Wrapped { users: Vec<User> },
}

/// Loads the roster at `location`, or an empty roster when none is configured.
#[tracing::instrument]
pub fn load_optional(location: Option<&Path>) -> anyhow::Result<Vec<User>> {
    let Some(path) = location else {
        warn!("no roster configured; previewing for a single person");
        return Ok(vec![]);
    };
    load(path)
}

/// Reads a roster file. `-` reads stdin.
///
/// Accepts a JSON array of users, an object with a `users` array, or
/// JSON lines with one user per line.
#[tracing::instrument(skip(path), fields(file = %path.display()))]
pub fn load(path: &Path) -> anyhow::Result<Vec<User>> {
    if path.as_os_str() == STDIN_MARKER {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read roster from stdin")?;
        return parse(&raw, "<stdin>");
    }

    let label = path.display().to_string();
    let raw = fs::read_to_string(path).with_context(|| format!("failed reading roster {label}"))?;
    let users = parse(&raw, &label)?;

    info!(count = users.len(), roster = %label, "loaded roster");
    Ok(users)
}

/// Parses roster text in any of the formats `load` accepts.
pub fn parse(raw: &str, label: &str) -> anyhow::Result<Vec<User>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return parse_document(trimmed, label);
    }
    if trimmed.starts_with('{')
        && let Ok(users) = parse_document(trimmed, label)
    {
        return Ok(users);
    }

    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let user: User = serde_json::from_str(line)
            .with_context(|| format!("failed parsing {label} line {}", idx + 1))?;
        out.push(user);
    }

    debug!(count = out.len(), "parsed roster lines");
    Ok(out)
}

fn parse_document(raw: &str, label: &str) -> anyhow::Result<Vec<User>> {
    let doc: RosterDoc =
        serde_json::from_str(raw).with_context(|| format!("failed parsing roster {label}"))?;
    Ok(match doc {
        RosterDoc::List(users) => users,
        RosterDoc::Wrapped { users } => users,
    })
}
