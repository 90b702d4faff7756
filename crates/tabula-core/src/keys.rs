//! Storage-key and scratch-file naming conventions.
//!
//! | Thing | Shape |
//! |-------|-------|
//! | durable dataset key | `<prefix>/<ownerId>/<uniqueId>_<fileName>` |
//! | generated database file | `<uniqueId>_<baseName>.db` |
//!
//! Every name embeds a freshly minted unique id, so concurrent uploads by the
//! same owner never collide.

use uuid::Uuid;

use crate::{Error, Result};

/// Default prefix for private dataset keys.
pub const DEFAULT_PRIVATE_PREFIX: &str = "private/datasets";

/// A fresh 32-hex-digit identifier. Contains no `_` or `/`.
pub fn unique_id() -> String { Uuid::new_v4().simple().to_string() }

/// Reduce a client-supplied file name to a single safe path segment.
pub fn sanitize_file_name(name: &str) -> String {
  let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
  let cleaned: String = last
    .chars()
    .map(|c| if c.is_control() { '_' } else { c })
    .collect();
  match cleaned.as_str() {
    "" | "." | ".." => "upload".to_string(),
    _ => cleaned,
  }
}

/// File name without its final extension: `sales.2024.csv` → `sales.2024`.
pub fn base_name(file_name: &str) -> &str {
  match file_name.rsplit_once('.') {
    Some((stem, _)) if !stem.is_empty() => stem,
    _ => file_name,
  }
}

/// A table name derived from an upload's file name.
pub fn table_name_for(file_name: &str) -> String {
  let stem = base_name(&sanitize_file_name(file_name)).to_string();
  let name: String = stem
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
    .collect();
  if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
    format!("t_{name}")
  } else {
    name
  }
}

pub fn owner_prefix(prefix: &str, owner_id: &str) -> String {
  format!("{}/{}/", prefix.trim_end_matches('/'), owner_id)
}

pub fn dataset_key(prefix: &str, owner_id: &str, unique: &str, file_name: &str) -> String {
  format!("{}{}_{}", owner_prefix(prefix, owner_id), unique, sanitize_file_name(file_name))
}

/// Mint a brand-new durable key for `file_name` under `owner_id`.
pub fn new_dataset_key(prefix: &str, owner_id: &str, file_name: &str) -> String {
  dataset_key(prefix, owner_id, &unique_id(), file_name)
}

pub fn database_file_name(unique: &str, original: &str) -> String {
  format!("{}_{}.db", unique, base_name(&sanitize_file_name(original)))
}

/// Swap the trailing name of a dataset key, keeping its directory and unique
/// prefix: `p/u1/abc_old.csv` + `new.csv` → `p/u1/abc_new.csv`.
pub fn renamed_key(old_key: &str, new_name: &str) -> Result<String> {
  let (dir, file) = old_key
    .rsplit_once('/')
    .ok_or_else(|| Error::Validation(format!("malformed storage key: {old_key:?}")))?;
  let (unique, _) = file
    .split_once('_')
    .filter(|(unique, _)| !unique.is_empty())
    .ok_or_else(|| Error::Validation(format!("storage key has no unique prefix: {old_key:?}")))?;
  Ok(format!("{dir}/{unique}_{}", sanitize_file_name(new_name)))
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn dataset_key_layout() {
    assert_eq!(
      dataset_key(DEFAULT_PRIVATE_PREFIX, "u1", "abc", "sales.csv"),
      "private/datasets/u1/abc_sales.csv"
    );
  }

  #[test]
  fn rename_swaps_trailing_name_only() {
    let key = renamed_key("private/datasets/u1/abc_old.csv", "new.csv").unwrap();
    assert_eq!(key, "private/datasets/u1/abc_new.csv");
  }

  #[test]
  fn rename_keeps_underscores_in_new_name() {
    let key = renamed_key("private/datasets/u1/abc_old_name.csv", "my_data.csv").unwrap();
    assert_eq!(key, "private/datasets/u1/abc_my_data.csv");
  }

  #[test]
  fn rename_rejects_keys_without_unique_prefix() {
    assert!(renamed_key("nodir.csv", "x.csv").is_err());
    assert!(renamed_key("private/datasets/u1/plain.csv", "x.csv").is_err());
  }

  #[test]
  fn generated_keys_are_pairwise_distinct() {
    let keys: HashSet<String> = (0..10_000)
      .map(|_| new_dataset_key(DEFAULT_PRIVATE_PREFIX, "u1", "same.csv"))
      .collect();
    assert_eq!(keys.len(), 10_000);
  }

  #[test]
  fn file_names_are_reduced_to_one_segment() {
    assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
    assert_eq!(sanitize_file_name("C:\\data\\x.csv"), "x.csv");
    assert_eq!(sanitize_file_name(".."), "upload");
    assert_eq!(sanitize_file_name(""), "upload");
  }

  #[test]
  fn database_file_name_uses_base_name() {
    assert_eq!(database_file_name("abc", "people.json"), "abc_people.db");
  }

  #[test]
  fn table_names_are_identifier_safe() {
    assert_eq!(table_name_for("sales report.csv"), "sales_report");
    assert_eq!(table_name_for("2024.csv"), "t_2024");
  }
}
