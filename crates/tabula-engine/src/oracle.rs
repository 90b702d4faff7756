//! [`HttpOracle`]: an OpenAI-compatible chat-completions client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tabula_core::{chat::Turn, oracle::Oracle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("completion endpoint returned {status}: {body}")]
  Status { status: reqwest::StatusCode, body: String },

  #[error("completion reply had no content")]
  EmptyReply,
}

/// Connection settings for the completion endpoint.
#[derive(Debug, Clone)]
pub struct OracleConfig {
  /// e.g. `https://api.openai.com/v1`
  pub base_url:    String,
  pub api_key:     String,
  pub model:       String,
  pub timeout:     Duration,
  pub temperature: f32,
}

impl OracleConfig {
  pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      base_url:    base_url.into(),
      api_key:     api_key.into(),
      model:       model.into(),
      timeout:     Duration::from_secs(60),
      temperature: 0.0,
    }
  }
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpOracle {
  client: Client,
  config: OracleConfig,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
  model:       &'a str,
  messages:    &'a [Turn],
  temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
  content: Option<String>,
}

impl HttpOracle {
  pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  fn url(&self) -> String {
    format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
  }
}

impl Oracle for HttpOracle {
  type Error = OracleError;

  async fn complete(&self, turns: Vec<Turn>) -> Result<String, OracleError> {
    let body = CompletionRequest {
      model:       &self.config.model,
      messages:    &turns,
      temperature: self.config.temperature,
    };

    let resp = self
      .client
      .post(self.url())
      .bearer_auth(&self.config.api_key)
      .json(&body)
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      tracing::error!(%status, "completion request failed");
      return Err(OracleError::Status { status, body });
    }

    let reply: CompletionResponse = resp.json().await?;
    reply
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or(OracleError::EmptyReply)
  }
}

#[cfg(test)]
mod tests {
  use tabula_core::chat::Role;

  use super::*;

  #[test]
  fn url_tolerates_trailing_slash() {
    let oracle = HttpOracle::new(OracleConfig::new("http://localhost:8080/v1/", "k", "m")).unwrap();
    assert_eq!(oracle.url(), "http://localhost:8080/v1/chat/completions");
  }

  #[test]
  fn request_body_uses_chat_message_shape() {
    let turns = vec![Turn::new(Role::System, "schema"), Turn::new(Role::User, "how many?")];
    let body = CompletionRequest { model: "gpt-4o-mini", messages: &turns, temperature: 0.0 };
    assert_eq!(
      serde_json::to_value(&body).unwrap(),
      serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [
          {"role": "system", "content": "schema"},
          {"role": "user", "content": "how many?"},
        ],
        "temperature": 0.0,
      })
    );
  }

  #[test]
  fn reply_without_content_is_empty() {
    let reply: CompletionResponse =
      serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
        .unwrap();
    assert!(reply.choices[0].message.content.is_none());
  }
}
