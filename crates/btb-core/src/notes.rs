use async_trait::async_trait;

use crate::{
    domain::{NoteId, NoteKind},
    Result,
};

/// Remote note API port.
///
/// Every call carries the caller's own decrypted token; the relay never holds
/// a shared service credential.
#[async_trait]
pub trait NoteClient: Send + Sync {
    /// Create a note and return its remote id. Any non-2xx response is a
    /// failure, never a silent success.
    async fn create(&self, token: &str, text: &str, kind: NoteKind) -> Result<NoteId>;

    /// Update an existing note. Returns the id, which the remote may reissue;
    /// a stale id fails with `NotFound` so the caller can fall back to create.
    async fn update(&self, token: &str, note_id: &NoteId, text: &str, kind: NoteKind)
        -> Result<NoteId>;

    /// Cheap token check used by `/configure` and `/status`.
    async fn verify(&self, token: &str) -> Result<()>;
}
