//! Scratch files that delete themselves.
//!
//! Each path embeds a freshly minted unique id and belongs to exactly one
//! operation. Removal happens on drop, on both the success and the error
//! path; a failed removal is logged and swallowed.

use std::path::{Path, PathBuf};

pub struct ScratchFile {
  path: PathBuf,
}

impl ScratchFile {
  /// Reserve `dir/name`. Nothing is created until the caller writes to it.
  pub fn new(dir: &Path, name: &str) -> Self { Self { path: dir.join(name) } }

  pub fn path(&self) -> &Path { &self.path }
}

impl Drop for ScratchFile {
  fn drop(&mut self) {
    match std::fs::remove_file(&self.path) {
      Ok(()) => tracing::debug!(path = %self.path.display(), "removed scratch file"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => {
        tracing::warn!(path = %self.path.display(), error = %e, "scratch cleanup failed")
      }
    }
  }
}

/// Make sure the scratch directory exists.
pub async fn ensure_dir(dir: &Path) -> std::io::Result<()> { tokio::fs::create_dir_all(dir).await }
