//! File-based store: one pretty-printed JSON document per session.
//!
//! Storage location: `~/.statewright/sessions/<session>.json` by default.
//! Writes go to a sibling temp file that is then renamed over the target.

use async_trait::async_trait;
use serde_json::Value;
use statewright_core::error::StoreError;
use statewright_core::store::{StateStore, StoreOperation, StoreRequest};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file-backed store for one session.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store for `session_id` under `dir`.
    ///
    /// The session id is sanitized so it is always a single file name.
    pub fn new(dir: impl AsRef<Path>, session_id: &str) -> Self {
        let file_name: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let file_name = if file_name.is_empty() { "default".to_string() } else { file_name };
        Self {
            path: dir.as_ref().join(format!("{file_name}.json")),
        }
    }

    /// The file backing this session.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<Value>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::InvalidPayload(format!("Corrupted state file: {e}")))
    }

    async fn write(&self, content: &str) -> Result<(), StoreError> {
        let state = crate::parse_state_content(content)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create state directory: {e}"))
            })?;
        }

        let pretty = serde_json::to_string_pretty(&state)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize state: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, pretty)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write state file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace state file: {e}")))?;

        debug!(path = %self.path.display(), "State file written");
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn call(&self, request: StoreRequest) -> Result<Option<Value>, StoreError> {
        match request.operation {
            StoreOperation::Get => self.read().await,
            StoreOperation::Set => {
                self.write(&request.content).await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "s1");
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path(), "trip-42");
            store
                .set(r#"{"destination":"Tokyo","budget":null}"#.into())
                .await
                .unwrap();
        }
        let reopened = FileStore::new(dir.path(), "trip-42");
        assert_eq!(
            reopened.get().await.unwrap(),
            Some(json!({"destination": "Tokyo", "budget": null}))
        );
    }

    #[tokio::test]
    async fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileStore::new(&nested, "s");
        store.set("{}".into()).await.unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn session_id_is_sanitized() {
        let store = FileStore::new("/tmp/sessions", "../../etc/passwd");
        assert_eq!(store.path().parent().unwrap(), Path::new("/tmp/sessions"));
        assert!(!store.path().to_string_lossy().contains(".."));
    }

    #[tokio::test]
    async fn corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "bad");
        std::fs::write(store.path(), "{ nope").unwrap();
        let err = store.get().await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
    }
}
