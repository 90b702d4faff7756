//! The text-completion oracle: ordered turns in, one text reply out.
//!
//! Replies carry no structural guarantee; see [`crate::extract`].

use std::future::Future;

use crate::chat::Turn;

pub trait Oracle: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn complete(
    &self,
    turns: Vec<Turn>,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;
}
