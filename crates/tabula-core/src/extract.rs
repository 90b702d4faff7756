//! Pull one titled SQL statement out of free-form oracle text.
//!
//! The reply is expected to carry a fenced block whose opening fence reads
//! `` ```<title> sql ``. Only the first such block counts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static FENCED_SQL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?s)```[ \t]*([^\n`]+?)[ \t]+(?i:sql)[ \t]*\r?\n(.*?)```")
    .expect("fenced sql pattern is valid")
});

/// Title and statement recovered from a reply. Both absent means the reply
/// proposed no query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSql {
  pub title: Option<String>,
  pub sql:   Option<String>,
}

impl ExtractedSql {
  pub fn is_empty(&self) -> bool { self.title.is_none() && self.sql.is_none() }
}

pub fn extract_sql(reply: &str) -> ExtractedSql {
  let Some(caps) = FENCED_SQL.captures(reply) else {
    return ExtractedSql::default();
  };
  let non_empty = |s: &str| {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
  };
  ExtractedSql {
    title: caps.get(1).and_then(|m| non_empty(m.as_str())),
    sql:   caps.get(2).and_then(|m| non_empty(m.as_str())),
  }
}
