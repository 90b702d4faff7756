//! One question/answer exchange about a dataset.
//!
//! ```text
//! AwaitingDataset → SchemaLoaded → PromptBuilt → OracleInvoked → ResponseRecorded
//! ```
//!
//! [`Conversation::ask`] never returns an error. Every failure ends the run
//! in a terminal [`Answer`] carrying the stage it stopped at, a status and a
//! readable message. Runs are not resumable; each request starts over at
//! `AwaitingDataset`.

use std::sync::Arc;

use serde::Serialize;
use tabula_core::{
  Error as CoreError, ErrorKind,
  blob::BlobStore,
  chat::{Chat, ChatMessage, NewMessage, Role, Turn, VisualizationHint},
  extract::extract_sql,
  oracle::Oracle,
  store::MetadataStore,
  table::DatabaseSchema,
};
use uuid::Uuid;

use crate::{
  Error,
  sandbox::{QueryResult, Sandbox},
};

#[derive(Debug, Clone)]
pub struct AskRequest {
  pub owner_id:      String,
  pub dataset_id:    Uuid,
  /// Continue this chat; a new one is opened when absent.
  pub chat_id:       Option<Uuid>,
  pub question:      String,
  pub visualization: Option<VisualizationHint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  AwaitingDataset,
  SchemaLoaded,
  PromptBuilt,
  OracleInvoked,
  ResponseRecorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
  /// The oracle replied and the reply was recorded. A failed query still
  /// counts; see [`Answer::error`].
  Answered,
  Invalid,
  NotFound,
  PermissionDenied,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
  pub status:        AnswerStatus,
  pub stage:         Stage,
  pub chat_id:       Option<Uuid>,
  /// The oracle's reply verbatim, or a description of why the run stopped.
  pub content:       String,
  pub title:         Option<String>,
  pub sql:           Option<String>,
  pub visualization: Option<VisualizationHint>,
  pub result:        Option<QueryResult>,
  pub error:         Option<String>,
}

/// Why a run stopped early.
struct Halt {
  status:  AnswerStatus,
  message: String,
}

impl Halt {
  fn new(status: AnswerStatus, message: impl Into<String>) -> Self {
    Self { status, message: message.into() }
  }

  fn from_error(e: &Error) -> Self {
    let status = match e.kind() {
      ErrorKind::Validation => AnswerStatus::Invalid,
      ErrorKind::NotFound => AnswerStatus::NotFound,
      ErrorKind::PermissionDenied => AnswerStatus::PermissionDenied,
      ErrorKind::Upstream | ErrorKind::PartialFailure | ErrorKind::Integrity => {
        AnswerStatus::Failed
      }
    };
    Self::new(status, e.to_string())
  }
}

/// Progress of one run, kept outside the fallible body so a halt still
/// reports how far it got.
struct Run {
  stage:   Stage,
  chat_id: Option<Uuid>,
}

// ─── Prompt ──────────────────────────────────────────────────────────────────

const INSTRUCTIONS: &str = r#"When a query would help answer the question, include exactly one fenced block. Its opening fence carries a short title followed by the word sql, like this:

```Average age sql
SELECT AVG(age) FROM users;
```

Write a single read-only SELECT statement using only the tables and columns listed above. Explain the answer in plain prose outside the block."#;

/// System prompt with the schema, then prior turns (role and content only),
/// then the new question.
pub fn build_prompt(schema: &DatabaseSchema, history: &[ChatMessage], question: &str) -> Vec<Turn> {
  let tables = if schema.is_empty() {
    "(the database has no tables)\n".to_string()
  } else {
    schema.to_string()
  };
  let system = format!(
    "You are a data analyst answering questions about a SQLite database.\n\nThe database has these tables:\n{tables}\n{INSTRUCTIONS}"
  );

  let mut turns = Vec::with_capacity(history.len() + 2);
  turns.push(Turn::new(Role::System, system));
  turns.extend(history.iter().filter(|m| m.role != Role::System).map(ChatMessage::to_turn));
  turns.push(Turn::new(Role::User, question));
  turns
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct Conversation<B, M, O> {
  meta:    Arc<M>,
  sandbox: Sandbox<B>,
  oracle:  Arc<O>,
}

impl<B, M, O> Clone for Conversation<B, M, O> {
  fn clone(&self) -> Self {
    Self { meta: self.meta.clone(), sandbox: self.sandbox.clone(), oracle: self.oracle.clone() }
  }
}

impl<B: BlobStore, M: MetadataStore, O: Oracle> Conversation<B, M, O> {
  pub fn new(meta: Arc<M>, sandbox: Sandbox<B>, oracle: Arc<O>) -> Self {
    Self { meta, sandbox, oracle }
  }

  pub async fn ask(&self, request: AskRequest) -> Answer {
    let mut run = Run { stage: Stage::AwaitingDataset, chat_id: request.chat_id };
    let visualization = request.visualization;

    match self.drive(&mut run, request).await {
      Ok(answer) => answer,
      Err(halt) => {
        tracing::debug!(stage = ?run.stage, status = ?halt.status, "conversation stopped");
        Answer {
          status: halt.status,
          stage: run.stage,
          chat_id: run.chat_id,
          content: halt.message.clone(),
          title: None,
          sql: None,
          visualization,
          result: None,
          error: Some(halt.message),
        }
      }
    }
  }

  async fn drive(&self, run: &mut Run, req: AskRequest) -> Result<Answer, Halt> {
    let question = req.question.trim();
    if question.is_empty() {
      return Err(Halt::new(AnswerStatus::Invalid, "question is empty"));
    }

    // AwaitingDataset
    let dataset = self
      .meta
      .get_dataset(req.dataset_id)
      .await
      .map_err(|e| Halt::from_error(&Error::metadata(e)))?
      .ok_or_else(|| Halt::new(AnswerStatus::NotFound, format!("dataset {} not found", req.dataset_id)))?;
    if !dataset.is_owned_by(&req.owner_id) {
      return Err(Halt::new(AnswerStatus::PermissionDenied, "dataset belongs to another user"));
    }
    let existing = self.existing_chat(&req).await?;

    let schema = self
      .sandbox
      .introspect_schema(&dataset.storage_key)
      .await
      .map_err(|e| Halt::from_error(&e))?;
    run.stage = Stage::SchemaLoaded;

    // A new chat is only opened once the dataset proved readable.
    let chat = match existing {
      Some(chat) => chat,
      None => self
        .meta
        .create_chat(req.dataset_id, req.owner_id.clone())
        .await
        .map_err(|e| Halt::from_error(&Error::metadata(e)))?,
    };
    run.chat_id = Some(chat.chat_id);

    let history = self
      .meta
      .list_messages(chat.chat_id)
      .await
      .map_err(|e| Halt::from_error(&Error::metadata(e)))?;
    let turns = build_prompt(&schema, &history, question);
    run.stage = Stage::PromptBuilt;

    self
      .record(NewMessage {
        chat_id:       chat.chat_id,
        role:          Role::User,
        content:       question.to_string(),
        title:         None,
        sql:           None,
        visualization: req.visualization,
        error:         None,
      })
      .await?;

    let reply = self.oracle.complete(turns).await.map_err(|e| {
      tracing::error!(chat_id = %chat.chat_id, error = %e, "oracle call failed");
      Halt::from_error(&Error::oracle(e))
    })?;
    run.stage = Stage::OracleInvoked;

    let extracted = extract_sql(&reply);
    let (result, error) = match &extracted.sql {
      Some(sql) => match self.sandbox.execute(&dataset.storage_key, sql).await {
        Ok(result) => (Some(result), None),
        Err(e) => {
          tracing::debug!(chat_id = %chat.chat_id, error = %e, "proposed query failed");
          (None, Some(format!("query failed: {e}")))
        }
      },
      None => (None, None),
    };

    self
      .record(NewMessage {
        chat_id:       chat.chat_id,
        role:          Role::Assistant,
        content:       reply.clone(),
        title:         extracted.title.clone(),
        sql:           extracted.sql.clone(),
        visualization: req.visualization,
        error:         error.clone(),
      })
      .await?;
    run.stage = Stage::ResponseRecorded;

    Ok(Answer {
      status: AnswerStatus::Answered,
      stage: run.stage,
      chat_id: run.chat_id,
      content: reply,
      title: extracted.title,
      sql: extracted.sql,
      visualization: req.visualization,
      result,
      error,
    })
  }

  /// The requested chat if it belongs to this owner and dataset, otherwise a
  /// fresh one.
  /// The chat named by the request, checked against its owner and dataset.
  async fn existing_chat(&self, req: &AskRequest) -> Result<Option<Chat>, Halt> {
    let Some(chat_id) = req.chat_id else {
      return Ok(None);
    };

    let chat = self
      .meta
      .get_chat(chat_id)
      .await
      .map_err(|e| Halt::from_error(&Error::metadata(e)))?
      .ok_or_else(|| Halt::new(AnswerStatus::NotFound, format!("chat {chat_id} not found")))?;
    if chat.owner_id != req.owner_id {
      return Err(Halt::new(AnswerStatus::PermissionDenied, "chat belongs to another user"));
    }
    if chat.dataset_id != req.dataset_id {
      return Err(Halt::from_error(
        &CoreError::Validation(format!("chat {chat_id} is about a different dataset")).into(),
      ));
    }
    Ok(Some(chat))
  }

  async fn record(&self, message: NewMessage) -> Result<ChatMessage, Halt> {
    self
      .meta
      .add_message(message)
      .await
      .map_err(|e| Halt::from_error(&Error::metadata(e)))
  }
}
