//! Atomic writer actor - serializes all writes to one document file.
//!
//! The writer is the one component in the daemon requiring explicit mutual
//! exclusion. It runs as a single task owning the document path; at most one
//! write is physically in flight at a time. Writes that arrive while one is
//! in flight coalesce last-write-wins: only the most recent queued content is
//! written next, and every caller waiting on the coalesced write resolves
//! with that write's outcome. Superseded intermediate contents are dropped by
//! design.
//!
//! Enqueueing is synchronous and the channel is unbounded, so a caller can
//! submit while holding a lock and the persisted order always matches the
//! submission order. Coalescing keeps the unbounded queue from translating
//! into unbounded disk I/O.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::StoreError;

/// Maximum rename attempts before a write is reported failed.
pub const RENAME_ATTEMPTS: u32 = 10;

/// Fixed delay between rename attempts, absorbing transient filesystem
/// contention (editors, backup scanners holding the target briefly).
const RENAME_RETRY_DELAY: Duration = Duration::from_millis(100);

/// One pending write request.
struct WriteRequest {
    content: String,
    respond_to: oneshot::Sender<Result<(), StoreError>>,
}

// ============================================================================
// Writer Handle
// ============================================================================

/// Cheap-to-clone handle for submitting writes to the writer actor.
#[derive(Clone)]
pub struct WriterHandle {
    sender: mpsc::UnboundedSender<WriteRequest>,
}

impl WriterHandle {
    /// Enqueues `content` as the document's next full contents.
    ///
    /// The enqueue itself is synchronous: two `submit` calls made in
    /// sequence (for instance under one lock) are guaranteed to reach the
    /// writer in that order, so the last mutation always persists last.
    /// Await [`PendingWrite::outcome`] for the durable result.
    pub fn submit(&self, content: String) -> PendingWrite {
        let (tx, rx) = oneshot::channel();

        // A failed send means the actor is gone; the dropped respond_to
        // surfaces as ChannelClosed when the outcome is awaited
        let _ = self.sender.send(WriteRequest {
            content,
            respond_to: tx,
        });

        PendingWrite { receiver: rx }
    }

    /// Durably persists `content` as the document's full contents.
    ///
    /// Resolves when the content (or a newer content that superseded it
    /// while queued) has been renamed into place. All callers coalesced
    /// into one physical write receive the same outcome.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the temporary file cannot be written
    /// - `StoreError::RenameFailed` if the rename retry budget is exhausted
    /// - `StoreError::ChannelClosed` if the actor has shut down
    pub async fn write(&self, content: String) -> Result<(), StoreError> {
        self.submit(content).outcome().await
    }
}

/// A write that has been enqueued but not yet confirmed durable.
pub struct PendingWrite {
    receiver: oneshot::Receiver<Result<(), StoreError>>,
}

impl PendingWrite {
    /// Waits for the submitted write (or the newer write that superseded
    /// it) to complete.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` if the temporary file cannot be written
    /// - `StoreError::RenameFailed` if the rename retry budget is exhausted
    /// - `StoreError::ChannelClosed` if the actor has shut down
    pub async fn outcome(self) -> Result<(), StoreError> {
        self.receiver.await.map_err(|_| StoreError::ChannelClosed)?
    }
}

/// Spawns the writer actor for one document path and returns its handle.
pub fn spawn_writer(path: impl Into<PathBuf>) -> WriterHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = AtomicWriter::new(path, rx);
    tokio::spawn(writer.run());
    WriterHandle { sender: tx }
}

// ============================================================================
// Writer Actor
// ============================================================================

/// The writer actor - owns the document path and its temporary sibling.
struct AtomicWriter {
    /// Target document path.
    path: PathBuf,

    /// Temporary path written first, then renamed over `path`.
    tmp_path: PathBuf,

    /// Incoming write requests.
    receiver: mpsc::UnboundedReceiver<WriteRequest>,
}

impl AtomicWriter {
    fn new(path: impl Into<PathBuf>, receiver: mpsc::UnboundedReceiver<WriteRequest>) -> Self {
        let path = path.into();
        let mut tmp_os = path.clone().into_os_string();
        tmp_os.push(".tmp");
        let tmp_path = PathBuf::from(tmp_os);
        Self {
            path,
            tmp_path,
            receiver,
        }
    }

    /// Runs the actor loop until the channel closes (all handles dropped).
    async fn run(mut self) {
        while let Some(req) = self.receiver.recv().await {
            let mut content = req.content;
            let mut waiters = vec![req.respond_to];

            loop {
                let result = self.write_once(&content).await;

                // Everything that queued while the write was in flight
                // coalesces into a single follow-up write carrying the most
                // recent content. Superseded callers resolve together with
                // that follow-up write's outcome.
                let mut next: Option<(String, Vec<oneshot::Sender<Result<(), StoreError>>>)> =
                    None;
                while let Ok(queued) = self.receiver.try_recv() {
                    match next.as_mut() {
                        Some((pending, pending_waiters)) => {
                            *pending = queued.content;
                            pending_waiters.push(queued.respond_to);
                        }
                        None => next = Some((queued.content, vec![queued.respond_to])),
                    }
                }

                for waiter in waiters {
                    // Caller may have dropped the receiver
                    let _ = waiter.send(result.clone());
                }

                match next {
                    Some((pending, pending_waiters)) => {
                        content = pending;
                        waiters = pending_waiters;
                    }
                    None => break,
                }
            }
        }

        debug!(path = %self.path.display(), "Atomic writer stopped");
    }

    /// Performs one full write: temporary file, then atomic rename.
    async fn write_once(&self, content: &str) -> Result<(), StoreError> {
        tokio::fs::write(&self.tmp_path, content)
            .await
            .map_err(|e| StoreError::Io {
                path: self.tmp_path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut last_error = String::new();
        for attempt in 1..=RENAME_ATTEMPTS {
            match tokio::fs::rename(&self.tmp_path, &self.path).await {
                Ok(()) => {
                    debug!(
                        path = %self.path.display(),
                        bytes = content.len(),
                        "Document persisted"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        max = RENAME_ATTEMPTS,
                        error = %e,
                        "Rename failed"
                    );
                    last_error = e.to_string();
                    if attempt < RENAME_ATTEMPTS {
                        tokio::time::sleep(RENAME_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(StoreError::RenameFailed {
            attempts: RENAME_ATTEMPTS,
            message: last_error,
        })
    }
}
