//! Chats and their messages — the persisted side of a conversation.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Role::System => "system",
      Role::User => "user",
      Role::Assistant => "assistant",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "system" => Ok(Role::System),
      "user" => Ok(Role::User),
      "assistant" => Ok(Role::Assistant),
      other => Err(Error::Validation(format!("unknown role: {other:?}"))),
    }
  }
}

/// One (role, content) turn as handed to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
  pub role:    Role,
  pub content: String,
}

impl Turn {
  pub fn new(role: Role, content: impl Into<String>) -> Self {
    Self { role, content: content.into() }
  }
}

/// How the client would like a result charted. Stored, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationHint {
  Table,
  Bar,
  Line,
  Pie,
  Scatter,
}

impl VisualizationHint {
  pub fn as_str(self) -> &'static str {
    match self {
      VisualizationHint::Table => "table",
      VisualizationHint::Bar => "bar",
      VisualizationHint::Line => "line",
      VisualizationHint::Pie => "pie",
      VisualizationHint::Scatter => "scatter",
    }
  }
}

impl FromStr for VisualizationHint {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "table" => Ok(VisualizationHint::Table),
      "bar" => Ok(VisualizationHint::Bar),
      "line" => Ok(VisualizationHint::Line),
      "pie" => Ok(VisualizationHint::Pie),
      "scatter" => Ok(VisualizationHint::Scatter),
      other => Err(Error::Validation(format!("unknown visualization: {other:?}"))),
    }
  }
}

/// A conversation about one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
  pub chat_id:    Uuid,
  pub dataset_id: Uuid,
  pub owner_id:   String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub message_id:    Uuid,
  pub chat_id:       Uuid,
  pub role:          Role,
  pub content:       String,
  pub title:         Option<String>,
  pub sql:           Option<String>,
  pub visualization: Option<VisualizationHint>,
  pub error:         Option<String>,
  pub created_at:    DateTime<Utc>,
}

impl ChatMessage {
  /// Only role and content are forwarded to the oracle as history.
  pub fn to_turn(&self) -> Turn { Turn::new(self.role, self.content.clone()) }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
  pub chat_id:       Uuid,
  pub role:          Role,
  pub content:       String,
  pub title:         Option<String>,
  pub sql:           Option<String>,
  pub visualization: Option<VisualizationHint>,
  pub error:         Option<String>,
}
