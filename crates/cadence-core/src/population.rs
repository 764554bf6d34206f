use std::collections::BTreeSet;
use std::fmt;

use serde::{
  Deserialize,
  Deserializer,
  Serialize
};
use tracing::debug;

const ALL_CATEGORIES: &str = "all";

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for UserId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for UserId {
  fn from(value: &str) -> Self {
    Self(value.trim().to_string())
  }
}

impl<'de> Deserialize<'de> for UserId {
  fn deserialize<D>(
    deserializer: D
  ) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>
  {
    // Roster exports carry ids as either JSON strings or numbers.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Text(String),
      Int(i64),
      Uint(u64)
    }

    Ok(match Raw::deserialize(
      deserializer
    )? {
      | Raw::Text(s) => {
        UserId::from(s.as_str())
      }
      | Raw::Int(n) => {
        UserId(n.to_string())
      }
      | Raw::Uint(n) => {
        UserId(n.to_string())
      }
    })
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Admin,
  #[serde(alias = "user", alias = "staff")]
  Employee,
  #[serde(other)]
  Other
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
pub struct User {
  pub id:       UserId,
  pub role:     Role,
  #[serde(default)]
  pub category: Option<String>
}

impl User {
  pub fn employee(
    id: &str,
    category: Option<&str>
  ) -> Self {
    Self {
      id:       UserId::from(id),
      role:     Role::Employee,
      category: category
        .map(str::to_string)
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Default,
)]
pub enum TargetCategory {
  #[default]
  All,
  Category(String)
}

impl TargetCategory {
  /// Blank input and the `all` sentinel both select every category.
  pub fn parse(raw: &str) -> Self {
    let trimmed = raw.trim();
    if trimmed.is_empty()
      || trimmed.eq_ignore_ascii_case(
        ALL_CATEGORIES
      )
    {
      Self::All
    } else {
      Self::Category(trimmed.to_string())
    }
  }

  fn admits(
    &self,
    user: &User
  ) -> bool {
    match self {
      | TargetCategory::All => true,
      | TargetCategory::Category(
        wanted
      ) => {
        user.category.as_deref()
          == Some(wanted.as_str())
      }
    }
  }
}

impl fmt::Display for TargetCategory {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | TargetCategory::All => {
        f.write_str(ALL_CATEGORIES)
      }
      | TargetCategory::Category(
        tag
      ) => f.write_str(tag)
    }
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct PopulationSelector {
  pub target_category:   TargetCategory,
  pub explicit_user_ids: BTreeSet<UserId>
}

impl PopulationSelector {
  pub fn new(
    target_category: TargetCategory
  ) -> Self {
    Self {
      target_category,
      explicit_user_ids: BTreeSet::new()
    }
  }

  #[must_use]
  pub fn with_users<I, S>(
    mut self,
    ids: I
  ) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>
  {
    self.explicit_user_ids.extend(
      ids
        .into_iter()
        .map(|id| UserId::from(id.as_ref()))
        .filter(|id| !id.0.is_empty())
    );
    self
  }

  /// Standard employees in the target category, narrowed to the explicit
  /// subset when one is given. Roster order is kept.
  #[tracing::instrument(skip_all, fields(
    category = %self.target_category,
    explicit = self.explicit_user_ids.len()
  ))]
  pub fn candidates<'a>(
    &self,
    roster: &'a [User]
  ) -> Vec<&'a User> {
    let selected: Vec<&User> = roster
      .iter()
      .filter(|user| {
        user.role == Role::Employee
      })
      .filter(|user| {
        self
          .target_category
          .admits(user)
      })
      .filter(|user| {
        self.explicit_user_ids.is_empty()
          || self
            .explicit_user_ids
            .contains(&user.id)
      })
      .collect();

    debug!(
      roster = roster.len(),
      selected = selected.len(),
      "derived candidate set"
    );
    selected
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn roster() -> Vec<User> {
    vec![
      User::employee("1", Some("ops")),
      User::employee("2", Some("ops")),
      User::employee(
        "3",
        Some("finance")
      ),
      User::employee("4", None),
      User {
        id:       UserId::from("9"),
        role:     Role::Admin,
        category: Some("ops".to_string())
      },
    ]
  }

  fn ids(users: &[&User]) -> Vec<String> {
    users
      .iter()
      .map(|user| user.id.to_string())
      .collect()
  }

  #[test]
  fn all_category_excludes_admins() {
    let roster = roster();
    let selector =
      PopulationSelector::default();
    assert_eq!(
      ids(&selector.candidates(&roster)),
      vec!["1", "2", "3", "4"]
    );
  }

  #[test]
  fn category_filter_matches_exactly()
  {
    let roster = roster();
    let selector =
      PopulationSelector::new(
        TargetCategory::parse("ops")
      );
    assert_eq!(
      ids(&selector.candidates(&roster)),
      vec!["1", "2"]
    );
  }

  #[test]
  fn explicit_ids_intersect() {
    let roster = roster();
    let selector =
      PopulationSelector::new(
        TargetCategory::parse("ops")
      )
      .with_users(["2", "3", "9", ""]);
    assert_eq!(
      ids(&selector.candidates(&roster)),
      vec!["2"]
    );
  }

  #[test]
  fn sentinel_parsing() {
    assert_eq!(
      TargetCategory::parse(" ALL "),
      TargetCategory::All
    );
    assert_eq!(
      TargetCategory::parse(""),
      TargetCategory::All
    );
    assert_eq!(
      TargetCategory::parse("ops"),
      TargetCategory::Category(
        "ops".to_string()
      )
    );
  }

  #[test]
  fn users_deserialize_from_loose_json()
  {
    let users: Vec<User> =
      serde_json::from_value(json!([
        { "id": 7, "role": "user", "category": "ops" },
        { "id": "a-1", "role": "admin" },
        { "id": "x", "role": "contractor" }
      ]))
      .expect("deserialize roster");

    assert_eq!(
      users[0].id,
      UserId::from("7")
    );
    assert_eq!(
      users[0].role,
      Role::Employee
    );
    assert_eq!(users[1].category, None);
    assert_eq!(users[2].role, Role::Other);
  }
}
