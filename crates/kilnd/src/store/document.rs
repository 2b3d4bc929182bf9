//! Typed document store - parse on read, serialize on write.

use std::io;
use std::path::{Path, PathBuf};

use kiln_core::HistoryDocument;

use super::writer::{spawn_writer, PendingWrite, WriterHandle};
use super::StoreError;

/// Typed wrapper over the atomic writer for the history document.
///
/// Reads decode the file into a [`HistoryDocument`]; the first read of a
/// nonexistent file yields the empty document. Writes encode and delegate to
/// the writer actor, inheriting its coalescing and atomicity guarantees.
#[derive(Clone)]
pub struct DocumentStore {
    path: PathBuf,
    writer: WriterHandle,
}

impl DocumentStore {
    /// Opens a store for the document at `path`, spawning its writer actor.
    ///
    /// The file itself is not touched until the first read or write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let writer = spawn_writer(&path);
        Self { path, writer }
    }

    /// Returns the document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and decodes the document.
    ///
    /// # Errors
    ///
    /// - `StoreError::Decode` if the file exists but is not a valid
    ///   history document (surfaced distinctly - the read fails rather than
    ///   silently resetting recorded history)
    /// - `StoreError::Io` for any read failure other than the file not
    ///   existing yet
    pub async fn read(&self) -> Result<HistoryDocument, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HistoryDocument::default()),
            Err(e) => Err(StoreError::Io {
                path: self.path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Encodes the document and synchronously enqueues it with the writer.
    ///
    /// Callers that mutate under a lock submit before unlocking, so the
    /// persisted order always matches the mutation order; the durable
    /// outcome is awaited afterwards via [`PendingWrite::outcome`].
    ///
    /// # Errors
    ///
    /// - `StoreError::Encode` if the document cannot be serialized
    pub fn submit(&self, document: &HistoryDocument) -> Result<PendingWrite, StoreError> {
        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(self.writer.submit(content))
    }

    /// Encodes the document and persists it via the atomic writer.
    pub async fn write(&self, document: &HistoryDocument) -> Result<(), StoreError> {
        self.submit(document)?.outcome().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kiln_core::{FiringSession, SessionId};
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, DocumentStore) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = DocumentStore::open(dir.path().join("history.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_read_missing_file_yields_empty_document() {
        let (_dir, store) = temp_store();
        let doc = store.read().await.unwrap();
        assert!(doc.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (_dir, store) = temp_store();

        let mut doc = HistoryDocument::default();
        doc.insert_front(FiringSession::new(SessionId::new(1700000000000), Utc::now()));
        store.write(&doc).await.unwrap();

        let read_back = store.read().await.unwrap();
        assert_eq!(read_back, doc);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_decode_error() {
        let (dir, store) = temp_store();
        std::fs::write(dir.path().join("history.json"), "{not json").unwrap();

        let result = store.read().await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_a_decode_error() {
        let (dir, store) = temp_store();
        std::fs::write(dir.path().join("history.json"), r#"{"sessions": 42}"#).unwrap();

        let result = store.read().await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }
}
