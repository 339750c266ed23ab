//! Per-user JSON file mirror of the memory index.
//!
//! Layout: `{base_dir}/{user_id}/{id}.json`. Vectors are never written and
//! every file carries a `saved_at` stamp. The mirror is a backup and debugging
//! aid; the index stays authoritative.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::dates;
use super::types::MemoryDocument;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FileMirror {
    base_dir: PathBuf,
}

/// Ids and user ids become path components, so they must not escape the base dir.
fn check_component(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(&['/', '\\', '\0'][..]);
    if bad {
        return Err(Error::validation(format!(
            "{kind} {value:?} cannot be used as a file name"
        )));
    }
    Ok(())
}

impl FileMirror {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, user_id: &str, id: &str) -> Result<PathBuf> {
        check_component("user id", user_id)?;
        check_component("memory id", id)?;
        Ok(self.base_dir.join(user_id).join(format!("{id}.json")))
    }

    /// Write `doc` under `id`, replacing any earlier copy.
    pub async fn save(&self, id: &str, doc: &MemoryDocument) -> Result<PathBuf> {
        let path = self.path_for(&doc.user_id, id)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut value = serde_json::to_value(doc)?;
        if let Value::Object(map) = &mut value {
            map.remove("embedding");
            map.insert(
                "saved_at".into(),
                Value::String(dates::format_timestamp(&dates::now(doc.updated_at.timezone()))),
            );
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(&value)?).await?;

        tracing::debug!(path = %path.display(), "mirrored memory");
        Ok(path)
    }

    pub async fn load(&self, user_id: &str, id: &str) -> Result<Option<Value>> {
        let path = self.path_for(user_id, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `false` if there was no file.
    pub async fn remove(&self, user_id: &str, id: &str) -> Result<bool> {
        let path = self.path_for(user_id, id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
