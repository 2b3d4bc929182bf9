//! Session repository - the in-memory history document and its durable mirror.
//!
//! The repository owns the single writable copy of the history document.
//! Every mutation updates memory and enqueues a snapshot with the document
//! store while still holding the lock, so the persisted order always matches
//! the mutation order even across racing mutators; the durable outcome is
//! awaited after unlock. Readers always observe the in-memory state, which
//! may run ahead of what is durably on disk: an event is visible to history
//! reads before its write is confirmed, and the writer actor coalesces
//! bursts into bounded disk I/O.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use kiln_core::{
    FiringSession, HistoryDocument, HistoryError, HistoryResult, SessionId, SessionStatus,
};

use crate::store::{DocumentStore, StoreError};

/// Repository of firing sessions.
///
/// Unknown session ids on [`add_session_event`](Self::add_session_event) and
/// [`end_session`](Self::end_session) are silent no-ops: a late or duplicate
/// hardware event arriving after a restart is a benign race, not a caller
/// bug. External lookups via [`get_session`](Self::get_session) do report
/// misses.
pub struct SessionRepository {
    /// The single writable copy of the history.
    document: Mutex<HistoryDocument>,

    /// Durable mirror of `document`.
    store: DocumentStore,
}

impl SessionRepository {
    /// Loads the repository from the store's document.
    ///
    /// The document is read into memory and written straight back, so the
    /// file exists (as `{"sessions":[]}`) from first startup onward.
    ///
    /// # Errors
    ///
    /// - `StoreError::Decode` if an existing file is malformed; startup
    ///   fails rather than silently discarding recorded history
    pub async fn load(store: DocumentStore) -> Result<Self, StoreError> {
        let document = store.read().await?;
        store.write(&document).await?;

        debug!(
            path = %store.path().display(),
            sessions = document.sessions.len(),
            "History loaded"
        );

        Ok(Self {
            document: Mutex::new(document),
            store,
        })
    }

    /// Creates a new running session and persists it.
    ///
    /// The id is the creation time in epoch milliseconds, bumped by one when
    /// two sessions would otherwise land in the same millisecond, keeping
    /// ids strictly increasing.
    pub async fn create_session(&self) -> Result<FiringSession, StoreError> {
        let now = Utc::now();

        let (session, pending) = {
            let mut doc = self.lock_document();

            let mut id = SessionId::from_timestamp(now);
            if let Some(newest) = doc.sessions.first() {
                if newest.id >= id {
                    id = newest.id.next();
                }
            }

            let session = FiringSession::new(id, now);
            doc.insert_front(session.clone());
            (session, self.store.submit(&doc)?)
        };

        pending.outcome().await?;
        Ok(session)
    }

    /// Appends a hardware message to a session's event log and persists.
    ///
    /// Unknown ids are silently dropped.
    pub async fn add_session_event(
        &self,
        id: SessionId,
        message: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();

        let pending = {
            let mut doc = self.lock_document();
            match doc.find_mut(id) {
                Some(session) => {
                    session.record_event(message, now);
                    Some(self.store.submit(&doc)?)
                }
                None => {
                    debug!(session_id = %id, "Dropped event for unknown session");
                    None
                }
            }
        };

        match pending {
            Some(pending) => pending.outcome().await,
            None => Ok(()),
        }
    }

    /// Finalizes a session and persists. Idempotent.
    ///
    /// Only applies while the session is still running; repeated calls and
    /// unknown ids are silent no-ops.
    pub async fn end_session(
        &self,
        id: SessionId,
        final_status: SessionStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now();

        let pending = {
            let mut doc = self.lock_document();
            match doc.find_mut(id) {
                Some(session) => {
                    if session.finalize(final_status, now) {
                        Some(self.store.submit(&doc)?)
                    } else {
                        debug!(session_id = %id, "Session already finalized");
                        None
                    }
                }
                None => {
                    debug!(session_id = %id, "Cannot finalize unknown session");
                    None
                }
            }
        };

        match pending {
            Some(pending) => pending.outcome().await,
            None => Ok(()),
        }
    }

    /// Removes all recorded sessions and persists. Irreversible.
    pub async fn clear_history(&self) -> Result<(), StoreError> {
        let pending = {
            let mut doc = self.lock_document();
            doc.clear();
            self.store.submit(&doc)?
        };

        pending.outcome().await
    }

    /// Returns all sessions, newest first. Pure in-memory read.
    pub fn list_sessions(&self) -> Vec<FiringSession> {
        self.lock_document().sessions.clone()
    }

    /// Looks up a session by id on behalf of an external caller.
    ///
    /// # Errors
    ///
    /// - `HistoryError::SessionNotFound` if no session has this id
    pub fn get_session(&self, id: SessionId) -> HistoryResult<FiringSession> {
        self.lock_document()
            .find(id)
            .cloned()
            .ok_or(HistoryError::SessionNotFound { id })
    }

    /// Locks the document, recovering from a poisoned mutex.
    ///
    /// Mutations under the lock are small and non-panicking; if a panic ever
    /// does poison the lock, the document is still structurally valid.
    fn lock_document(&self) -> std::sync::MutexGuard<'_, HistoryDocument> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
